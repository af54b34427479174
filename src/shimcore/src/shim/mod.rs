//! This module implements the platform agnostic escape shim: a best effort
//! path from guest driver code to a listener on the host.
//!
//! A driver owns one or more [`LogChannel`]s, usually in `static`s, and may
//! [`install`] one of them as the shim of the driver. The free functions of
//! this module, and [`ENTRY_POINTS`], then operate on the installed channel,
//! so callback tables can refer to them without knowing the channel.

#[cfg(all(target_arch = "x86_64", feature = "backdoor"))]
pub mod backdoor;
mod channel;
mod config;
#[cfg(test)]
pub(crate) mod fake;
mod hooks;
mod logger;
mod message;
mod transport;

use core::{
    ffi::{CStr, c_char},
    fmt,
};

use spin::Once;

pub use self::{
    channel::{ChannelState, LogChannel, StatsSnapshot},
    config::ShimConfig,
    hooks::{HookId, HookRegistry, LogSinkFn, RegistryError},
    logger::EscapeLogger,
    message::{MAX_MESSAGE_LEN, MessageBuffer, truncate},
    transport::{EscapeBuffer, EscapeCode, EscapeError, EscapeToken, EscapeTransport, InitError},
};

/// An object safe view of a [`LogChannel`], so that channels over different
/// transports can be installed and referred to uniformly.
pub trait EscapeShim: Sync {
    /// See [`LogChannel::init`].
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] if the escape resource cannot be acquired.
    fn init(&self) -> Result<(), InitError>;

    /// See [`LogChannel::terminate`].
    fn terminate(&self);

    /// See [`LogChannel::log`].
    fn log(&self, message: &str);

    /// See [`LogChannel::log_formatted`].
    fn log_formatted(&self, args: fmt::Arguments<'_>);

    /// See [`LogChannel::state`].
    fn state(&self) -> ChannelState;

    /// See [`LogChannel::stats`].
    fn stats(&self) -> StatsSnapshot;

    /// See [`LogChannel::config`].
    fn config(&self) -> &ShimConfig;
}

impl<T: EscapeTransport> EscapeShim for LogChannel<T> {
    fn init(&self) -> Result<(), InitError> {
        LogChannel::init(self)
    }

    fn terminate(&self) {
        LogChannel::terminate(self);
    }

    fn log(&self, message: &str) {
        LogChannel::log(self, message);
    }

    fn log_formatted(&self, args: fmt::Arguments<'_>) {
        LogChannel::log_formatted(self, args);
    }

    fn state(&self) -> ChannelState {
        LogChannel::state(self)
    }

    fn stats(&self) -> StatsSnapshot {
        LogChannel::stats(self)
    }

    fn config(&self) -> &ShimConfig {
        LogChannel::config(self)
    }
}

/// The reasons [`install`] fails.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallError {
    /// [`install`] already succeeded once.
    #[error("a shim is already installed")]
    AlreadyInstalled,
}

static SHIM: Once<&'static dyn EscapeShim> = Once::new();

/// Installs `shim` as the shim of this driver. Can be done only once.
///
/// # Errors
///
/// Returns [`InstallError::AlreadyInstalled`] on any call after the first.
pub fn install(shim: &'static dyn EscapeShim) -> Result<(), InstallError> {
    let mut installed = false;
    let _ = SHIM.call_once(|| {
        installed = true;
        shim
    });
    if installed {
        Ok(())
    } else {
        Err(InstallError::AlreadyInstalled)
    }
}

fn installed() -> Option<&'static dyn EscapeShim> {
    SHIM.get().copied()
}

/// Opens the installed shim.
///
/// # Errors
///
/// Returns [`InitError::NotInstalled`] before [`install`], or the error of
/// the transport.
pub fn init() -> Result<(), InitError> {
    installed().ok_or(InitError::NotInstalled)?.init()
}

/// Closes the installed shim, if any.
pub fn terminate() {
    if let Some(shim) = installed() {
        shim.terminate();
    }
}

/// Forwards `message` through the installed shim, if any.
pub fn log(message: &str) {
    if let Some(shim) = installed() {
        shim.log(message);
    }
}

/// Formats and forwards `args` through the installed shim, if any.
pub fn log_formatted(args: fmt::Arguments<'_>) {
    if let Some(shim) = installed() {
        shim.log_formatted(args);
    }
}

/// Returns the state of the installed shim. Closed when none is installed.
pub fn state() -> ChannelState {
    installed().map_or(ChannelState::Closed, |shim| shim.state())
}

/// The log sink of the shim, with the [`LogSinkFn`] signature, for
/// notification tables and [`HookRegistry`].
pub fn on_host_log_request(message: &str) {
    log(message);
}

/// The log sink of the shim for C callers.
///
/// Invalid UTF-8 ends the message at the first invalid byte.
///
/// # Safety
///
/// `message` must be null or point to a NUL terminated string that stays
/// valid for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn shim_on_host_log_request(message: *const c_char) {
    if message.is_null() {
        return;
    }
    let bytes = unsafe { CStr::from_ptr(message) }.to_bytes();
    let text = match core::str::from_utf8(bytes) {
        Ok(text) => text,
        // SAFETY: the prefix was just validated.
        Err(e) => unsafe { core::str::from_utf8_unchecked(&bytes[..e.valid_up_to()]) },
    };
    on_host_log_request(text);
}

/// The registration interface handed to an owning driver.
#[derive(Clone, Copy, Debug)]
pub struct ShimEntryPoints {
    /// Opens the installed shim.
    pub init: fn() -> Result<(), InitError>,
    /// Closes the installed shim.
    pub terminate: fn(),
    /// Forwards a message.
    pub log: fn(&str),
    /// Formats and forwards a message.
    pub log_formatted: fn(fmt::Arguments<'_>),
    /// Callback compatible log sink.
    pub log_sink: LogSinkFn,
}

/// The entry points of the installed shim.
pub const ENTRY_POINTS: ShimEntryPoints = ShimEntryPoints {
    init,
    terminate,
    log,
    log_formatted,
    log_sink: on_host_log_request,
};

/// Formats and forwards a message through the installed shim.
#[macro_export]
macro_rules! shim_log {
    ($($arg:tt)*) => {
        ($crate::shim::log_formatted(format_args!($($arg)*)))
    };
}
