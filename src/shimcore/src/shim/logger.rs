//! The `log` crate backend on top of a shim.

use core::fmt;

use super::{ChannelState, EscapeShim};

/// A `log` crate backend forwarding records to the host through a shim.
///
/// Records above the `level` of the shim's [`super::ShimConfig`] are ignored.
#[derive(Clone, Copy)]
pub struct EscapeLogger {
    shim: &'static dyn EscapeShim,
}

impl EscapeLogger {
    /// Creates a logger forwarding records to `shim`.
    pub const fn new(shim: &'static dyn EscapeShim) -> Self {
        Self { shim }
    }

    /// Registers this logger with the `log` crate.
    ///
    /// # Errors
    ///
    /// Returns an error if another logger has already been registered.
    pub fn install(&'static self) -> Result<(), log::SetLoggerError> {
        log::set_logger(self).map(|()| log::set_max_level(self.shim.config().level))
    }
}

impl log::Log for EscapeLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= self.shim.config().level
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) && self.shim.state() == ChannelState::Open {
            self.shim.log_formatted(format_args!(
                "{:>5}: {} ({}:{})",
                record.level(),
                record.args(),
                record.file().unwrap_or("<unknown>"),
                record.line().unwrap_or(0),
            ));
        }
    }

    fn flush(&self) {}
}

impl fmt::Debug for EscapeLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EscapeLogger")
            .field("state", &self.shim.state())
            .field("level", &self.shim.config().level)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::boxed::Box;

    use log::{Level, LevelFilter, Log, Record};

    use super::*;
    use crate::shim::{LogChannel, ShimConfig, fake::FakeTransport};

    fn leaked_channel(level: LevelFilter) -> &'static LogChannel<FakeTransport> {
        let config = ShimConfig::DEFAULT.with_level(level);
        Box::leak(Box::new(LogChannel::with_config(FakeTransport::new(), config)))
    }

    #[test]
    fn formats_records() {
        let channel = leaked_channel(LevelFilter::Info);
        channel.init().unwrap();
        let logger = EscapeLogger::new(channel);

        logger.log(
            &Record::builder()
                .args(format_args!("Loaded {}", "win_shim.sys"))
                .level(Level::Info)
                .file(Some("lib.rs"))
                .line(Some(42))
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("no location"))
                .level(Level::Warn)
                .build(),
        );

        assert_eq!(
            channel.transport().messages(),
            [
                " INFO: Loaded win_shim.sys (lib.rs:42)",
                " WARN: no location (<unknown>:0)"
            ]
        );
    }

    #[test]
    fn filters_by_level() {
        let channel = leaked_channel(LevelFilter::Warn);
        channel.init().unwrap();
        let logger = EscapeLogger::new(channel);

        assert!(logger.enabled(&log::Metadata::builder().level(Level::Error).build()));
        assert!(!logger.enabled(&log::Metadata::builder().level(Level::Info).build()));

        logger.log(
            &Record::builder()
                .args(format_args!("too chatty"))
                .level(Level::Debug)
                .build(),
        );
        assert!(channel.transport().messages().is_empty());
    }

    #[test]
    fn closed_channel_skips_formatting() {
        let channel = leaked_channel(LevelFilter::Trace);
        let logger = EscapeLogger::new(channel);

        logger.log(
            &Record::builder()
                .args(format_args!("dropped"))
                .level(Level::Error)
                .build(),
        );
        assert!(channel.transport().messages().is_empty());
        assert_eq!(channel.stats().dropped, 0);
    }
}
