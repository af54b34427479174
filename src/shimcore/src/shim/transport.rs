//! The capability a channel uses to reach the host: acquiring an escape
//! resource, submitting escape buffers through it and releasing it.

use core::fmt;

/// A set of platform specific API to submit escape requests to the host.
///
/// Implementations wrap a blocking and opaque facility such as a miniport
/// escape call or a hypervisor backdoor. Each call is expected to return within
/// a bound enforced by that facility.
pub trait EscapeTransport: Sync {
    /// Acquires the underlying escape resource.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] if the resource cannot be obtained.
    fn open(&self) -> Result<EscapeToken, InitError>;

    /// Submits `buffer` through the resource represented by `token`.
    ///
    /// # Errors
    ///
    /// Returns [`EscapeError`] if the facility rejects the request.
    fn submit_escape(&self, token: &EscapeToken, buffer: &EscapeBuffer<'_>)
    -> Result<(), EscapeError>;

    /// Releases the resource. The token is consumed and cannot be used again.
    fn close(&self, token: EscapeToken);
}

/// An acquired escape resource.
///
/// The meaning of the two words is up to the transport, for example a handle
/// and a cookie.
// Not Copy: a token is consumed when its resource is released.
#[allow(missing_copy_implementations)]
#[derive(Debug, PartialEq, Eq)]
pub struct EscapeToken {
    handle: u64,
    cookie: u64,
}

impl EscapeToken {
    /// Creates a token. Only transports are expected to call this.
    #[must_use]
    pub const fn new(handle: u64, cookie: u64) -> Self {
        Self { handle, cookie }
    }

    /// Returns the handle word.
    #[must_use]
    pub const fn handle(&self) -> u64 {
        self.handle
    }

    /// Returns the cookie word.
    #[must_use]
    pub const fn cookie(&self) -> u64 {
        self.cookie
    }
}

/// The operation requested from the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
#[repr(u32)]
pub enum EscapeCode {
    /// Prints the payload into the host side log.
    #[display("debug-print")]
    DebugPrint = 0x0001_0001,
}

/// A single escape request. Borrowed for the duration of the submission only.
#[derive(Clone, Copy, Debug)]
pub struct EscapeBuffer<'a> {
    code: EscapeCode,
    truncated: bool,
    payload: &'a str,
}

impl<'a> EscapeBuffer<'a> {
    /// Creates a debug print request for `payload`.
    #[must_use]
    pub const fn debug_print(payload: &'a str, truncated: bool) -> Self {
        Self {
            code: EscapeCode::DebugPrint,
            truncated,
            payload,
        }
    }

    /// Returns the requested operation.
    #[must_use]
    pub const fn code(&self) -> EscapeCode {
        self.code
    }

    /// Returns whether the payload was cut to fit the message limit.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Returns the message text.
    #[must_use]
    pub const fn payload(&self) -> &'a str {
        self.payload
    }
}

impl fmt::Display for EscapeBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes", self.code, self.payload.len())?;
        if self.truncated {
            f.write_str(", truncated")?;
        }
        f.write_str(")")
    }
}

/// The reasons an escape resource cannot be acquired.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitError {
    /// No shim was installed before calling the global entry points.
    #[error("no shim has been installed")]
    NotInstalled,

    /// The hypervisor the transport talks to is not running this system.
    #[error("the expected hypervisor is not present")]
    HypervisorNotPresent,

    /// The host declined to open a channel.
    #[error("the host refused to open a channel")]
    ChannelRefused,

    /// The caller lacks the privilege the facility requires.
    #[error("access to the escape facility was denied")]
    PermissionDenied,

    /// The driver exposing the facility is absent.
    #[error("the driver providing the escape facility is not loaded")]
    DriverNotLoaded,

    /// Any other failure reported by the operating system.
    #[error("the escape facility failed with status {status:#x}")]
    Os {
        /// The raw status code, eg, an `NTSTATUS`.
        status: i32,
    },
}

/// The reasons a submission fails. Never surfaced to the caller of `log`.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscapeError {
    /// The host answered a step of the exchange without the success bit.
    #[error("the host rejected the `{step}` step")]
    Rejected {
        /// The step that failed.
        step: &'static str,
    },

    /// The escape call itself failed.
    #[error("the escape call failed with status {status:#x}")]
    Os {
        /// The raw status code, eg, an `NTSTATUS`.
        status: i32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn buffer_display() {
        let buffer = EscapeBuffer::debug_print("hello", false);
        assert_eq!(buffer.to_string(), "debug-print (5 bytes)");

        let buffer = EscapeBuffer::debug_print("hell", true);
        assert_eq!(buffer.to_string(), "debug-print (4 bytes, truncated)");
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            InitError::Os { status: -1_073_741_790 }.to_string(),
            "the escape facility failed with status 0xc0000022"
        );
        assert_eq!(
            EscapeError::Rejected { step: "send-size" }.to_string(),
            "the host rejected the `send-size` step"
        );
    }
}
