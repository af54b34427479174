use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use escape_shim::shim::{EscapeBuffer, EscapeError, EscapeToken, EscapeTransport, InitError};
use spin::Mutex;

/// Records every request instead of reaching a host.
pub struct RecordingTransport {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_open: AtomicBool,
    next_handle: AtomicU64,
    live: Mutex<Vec<u64>>,
    messages: Mutex<Vec<String>>,
    stale: AtomicUsize,
}

impl RecordingTransport {
    pub const fn new() -> Self {
        Self {
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            fail_open: AtomicBool::new(false),
            next_handle: AtomicU64::new(1),
            live: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            stale: AtomicUsize::new(0),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn stale_submissions(&self) -> usize {
        self.stale.load(Ordering::SeqCst)
    }
}

impl EscapeTransport for RecordingTransport {
    fn open(&self) -> Result<EscapeToken, InitError> {
        let _ = self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(InitError::DriverNotLoaded);
        }
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.live.lock().push(handle);
        Ok(EscapeToken::new(handle, 0))
    }

    fn submit_escape(
        &self,
        token: &EscapeToken,
        buffer: &EscapeBuffer<'_>,
    ) -> Result<(), EscapeError> {
        if !self.live.lock().contains(&token.handle()) {
            let _ = self.stale.fetch_add(1, Ordering::SeqCst);
        }
        self.messages.lock().push(buffer.payload().to_owned());
        Ok(())
    }

    fn close(&self, token: EscapeToken) {
        let _ = self.closes.fetch_add(1, Ordering::SeqCst);
        self.live.lock().retain(|&h| h != token.handle());
    }
}
