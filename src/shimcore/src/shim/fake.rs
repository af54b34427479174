//! An in-memory transport recording everything a channel asks of it.

use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::{string::String, thread, time::Duration, vec::Vec};

use spin::Mutex;

use super::transport::{EscapeBuffer, EscapeError, EscapeToken, EscapeTransport, InitError};

pub(crate) struct FakeTransport {
    opens: AtomicUsize,
    closes: AtomicUsize,
    next_handle: AtomicU64,
    live: Mutex<Vec<u64>>,
    messages: Mutex<Vec<String>>,
    stale_submissions: AtomicUsize,
    open_error: Mutex<Option<InitError>>,
    fail_submit: AtomicBool,
    open_delay_ms: AtomicU64,
    submit_delay_ms: AtomicU64,
}

impl FakeTransport {
    pub(crate) const fn new() -> Self {
        Self {
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            next_handle: AtomicU64::new(1),
            live: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            stale_submissions: AtomicUsize::new(0),
            open_error: Mutex::new(None),
            fail_submit: AtomicBool::new(false),
            open_delay_ms: AtomicU64::new(0),
            submit_delay_ms: AtomicU64::new(0),
        }
    }

    pub(crate) fn failing_open(error: InitError) -> Self {
        let transport = Self::new();
        *transport.open_error.lock() = Some(error);
        transport
    }

    pub(crate) fn set_open_error(&self, error: Option<InitError>) {
        *self.open_error.lock() = error;
    }

    pub(crate) fn set_fail_submit(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::Relaxed);
    }

    pub(crate) fn set_open_delay(&self, delay: Duration) {
        self.open_delay_ms
            .store(delay.as_millis().try_into().unwrap(), Ordering::Relaxed);
    }

    pub(crate) fn set_submit_delay(&self, delay: Duration) {
        self.submit_delay_ms
            .store(delay.as_millis().try_into().unwrap(), Ordering::Relaxed);
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn live_tokens(&self) -> usize {
        self.live.lock().len()
    }

    pub(crate) fn stale_submissions(&self) -> usize {
        self.stale_submissions.load(Ordering::SeqCst)
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl EscapeTransport for FakeTransport {
    fn open(&self) -> Result<EscapeToken, InitError> {
        let _ = self.opens.fetch_add(1, Ordering::SeqCst);
        let delay = self.open_delay_ms.load(Ordering::Relaxed);
        if delay != 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        if let Some(error) = *self.open_error.lock() {
            return Err(error);
        }
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.live.lock().push(handle);
        Ok(EscapeToken::new(handle, !handle))
    }

    fn submit_escape(
        &self,
        token: &EscapeToken,
        buffer: &EscapeBuffer<'_>,
    ) -> Result<(), EscapeError> {
        if !self.live.lock().contains(&token.handle()) {
            let _ = self.stale_submissions.fetch_add(1, Ordering::SeqCst);
        }
        let delay = self.submit_delay_ms.load(Ordering::Relaxed);
        if delay != 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        // Check again: the token must stay live for the whole submission.
        if !self.live.lock().contains(&token.handle()) {
            let _ = self.stale_submissions.fetch_add(1, Ordering::SeqCst);
        }
        if self.fail_submit.load(Ordering::Relaxed) {
            return Err(EscapeError::Rejected { step: "submit" });
        }
        self.messages.lock().push(buffer.payload().into());
        Ok(())
    }

    fn close(&self, token: EscapeToken) {
        let _ = self.closes.fetch_add(1, Ordering::SeqCst);
        self.live.lock().retain(|&handle| handle != token.handle());
    }
}
