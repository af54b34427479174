//! The log channel: the open/closed state of the path to the host and the
//! escape resource backing it.

use core::{
    fmt,
    hint::spin_loop,
    sync::atomic::{AtomicU8, AtomicU64, Ordering},
};

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use spin::{Mutex, RwLock};

use super::{
    config::ShimConfig,
    message::{MAX_MESSAGE_LEN, MessageBuffer, truncate},
    transport::{EscapeBuffer, EscapeError, EscapeToken, EscapeTransport, InitError},
};

/// The externally observable state of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum ChannelState {
    /// Messages are dropped without reaching the transport.
    Closed,
    /// Messages are forwarded to the host.
    Open,
}

// The transient states exist only while an acquisition or a release is in
// progress. Opening and Closing are reported as Closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
enum RawState {
    Closed,
    Opening,
    Open,
    Closing,
}

/// A path from guest driver code to the host, over the transport `T`.
///
/// All operations take `&self` and may be called from any number of threads.
/// `log` never fails; `init` reports a failure exactly to its callers.
pub struct LogChannel<T> {
    transport: T,
    config: ShimConfig,
    state: AtomicU8,
    // Held shared for the whole submission; taken exclusively to release it.
    token: RwLock<Option<EscapeToken>>,
    last_error: Mutex<Option<InitError>>,
    stats: ChannelStats,
}

impl<T> LogChannel<T> {
    /// Creates a closed channel with the default configuration.
    pub const fn new(transport: T) -> Self {
        Self::with_config(transport, ShimConfig::DEFAULT)
    }

    /// Creates a closed channel.
    pub const fn with_config(transport: T, config: ShimConfig) -> Self {
        Self {
            transport,
            config,
            state: AtomicU8::new(RawState::Closed as u8),
            token: RwLock::new(None),
            last_error: Mutex::new(None),
            stats: ChannelStats::new(),
        }
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &ShimConfig {
        &self.config
    }

    /// Returns the transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the current state.
    pub fn state(&self) -> ChannelState {
        match self.raw_state() {
            RawState::Open => ChannelState::Open,
            RawState::Closed | RawState::Opening | RawState::Closing => ChannelState::Closed,
        }
    }

    /// Returns whether messages are currently forwarded.
    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn raw_state(&self) -> RawState {
        decode(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: RawState, to: RawState) -> Result<(), RawState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(decode)
    }
}

impl<T: EscapeTransport> LogChannel<T> {
    /// Acquires the escape resource unless the channel is already open.
    ///
    /// When several threads call this at once, exactly one of them acquires
    /// the resource and all of them report its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] if the transport could not be opened. The channel
    /// stays closed and nothing is retried.
    pub fn init(&self) -> Result<(), InitError> {
        loop {
            match self.transition(RawState::Closed, RawState::Opening) {
                Ok(()) => return self.acquire(),
                Err(RawState::Open) => return Ok(()),
                Err(RawState::Opening) => return self.wait_for_acquisition(),
                Err(RawState::Closing | RawState::Closed) => spin_loop(),
            }
        }
    }

    /// Releases the escape resource if the channel is open.
    ///
    /// Submissions already in flight complete before the resource is released.
    pub fn terminate(&self) {
        loop {
            match self.transition(RawState::Open, RawState::Closing) {
                Ok(()) => {
                    self.release();
                    return;
                }
                Err(RawState::Closed) => return,
                Err(RawState::Opening | RawState::Closing | RawState::Open) => spin_loop(),
            }
        }
    }

    /// Forwards `message` to the host if the channel is open.
    pub fn log(&self, message: &str) {
        if !self.is_open() {
            self.stats.dropped();
            return;
        }
        let (message, truncated) = truncate(message, self.message_limit());
        self.submit(&EscapeBuffer::debug_print(message, truncated));
    }

    /// Formats `args` and forwards the result like [`Self::log`].
    pub fn log_formatted(&self, args: fmt::Arguments<'_>) {
        if let Some(message) = args.as_str() {
            return self.log(message);
        }
        if !self.is_open() {
            self.stats.dropped();
            return;
        }
        let buffer = MessageBuffer::<MAX_MESSAGE_LEN>::from_args(args);
        let (message, truncated) = truncate(buffer.as_str(), self.message_limit());
        self.submit(&EscapeBuffer::debug_print(
            message,
            truncated || buffer.is_truncated(),
        ));
    }

    // A configuration built as a struct literal may exceed the hard limit.
    fn message_limit(&self) -> usize {
        self.config.max_message_len.min(MAX_MESSAGE_LEN)
    }

    fn acquire(&self) -> Result<(), InitError> {
        match self.transport.open() {
            Ok(token) => {
                *self.token.write() = Some(token);
                *self.last_error.lock() = None;
                self.stats.acquired();
                self.state.store(RawState::Open as u8, Ordering::Release);
                log::debug!("Opened the escape channel");
                Ok(())
            }
            Err(error) => {
                *self.last_error.lock() = Some(error);
                self.state.store(RawState::Closed as u8, Ordering::Release);
                log::warn!("Failed to open the escape channel: {error}");
                Err(error)
            }
        }
    }

    fn wait_for_acquisition(&self) -> Result<(), InitError> {
        loop {
            match self.raw_state() {
                RawState::Opening => spin_loop(),
                RawState::Open | RawState::Closing => return Ok(()),
                RawState::Closed => {
                    return match *self.last_error.lock() {
                        Some(error) => Err(error),
                        None => Ok(()),
                    };
                }
            }
        }
    }

    // Must only be called by the thread that moved the state to Closing.
    fn release(&self) {
        let token = self.token.write().take();
        if let Some(token) = token {
            self.transport.close(token);
        }
        self.state.store(RawState::Closed as u8, Ordering::Release);
        log::debug!("Closed the escape channel");
    }

    fn submit(&self, buffer: &EscapeBuffer<'_>) {
        let result = {
            let token = self.token.read();
            let Some(token) = token.as_ref() else {
                self.stats.dropped();
                return;
            };
            self.transport.submit_escape(token, buffer)
        };

        match result {
            Ok(()) => self.stats.forwarded(),
            Err(error) => {
                self.stats.failed();
                if self.config.close_on_transport_error {
                    self.degrade(error);
                }
            }
        }
    }

    fn degrade(&self, error: EscapeError) {
        if self.transition(RawState::Open, RawState::Closing).is_ok() {
            self.release();
            log::warn!("Closed the escape channel after a failed submission: {error}");
        }
    }
}

impl<T> fmt::Debug for LogChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogChannel")
            .field("state", &self.raw_state())
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

fn decode(raw: u8) -> RawState {
    // Only values of RawState are ever stored.
    RawState::from_u8(raw).unwrap_or(RawState::Closed)
}

/// Counters of a channel since it was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Successful resource acquisitions.
    pub acquisitions: u64,
    /// Messages accepted by the transport.
    pub forwarded: u64,
    /// Messages dropped because the channel was not open.
    pub dropped: u64,
    /// Messages the transport failed to deliver.
    pub transport_failures: u64,
}

struct ChannelStats {
    acquisitions: AtomicU64,
    forwarded: AtomicU64,
    dropped: AtomicU64,
    transport_failures: AtomicU64,
}

impl ChannelStats {
    const fn new() -> Self {
        Self {
            acquisitions: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
        }
    }

    fn acquired(&self) {
        let _ = self.acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    fn forwarded(&self) {
        let _ = self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    fn dropped(&self) {
        let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn failed(&self) {
        let _ = self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
        }
    }
}
