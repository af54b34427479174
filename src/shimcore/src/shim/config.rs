//! Runtime configuration of a channel.

use log::LevelFilter;

use super::message::MAX_MESSAGE_LEN;

/// Runtime knobs of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShimConfig {
    /// Messages longer than this are truncated. Never above [`MAX_MESSAGE_LEN`].
    pub max_message_len: usize,

    /// Closes the channel after the first failed submission instead of
    /// retrying the transport for every subsequent message.
    pub close_on_transport_error: bool,

    /// The most verbose level forwarded when the channel backs the `log` crate.
    pub level: LevelFilter,
}

impl ShimConfig {
    /// The configuration used unless a driver asks otherwise.
    pub const DEFAULT: Self = Self {
        max_message_len: MAX_MESSAGE_LEN,
        close_on_transport_error: true,
        level: LevelFilter::Info,
    };

    /// Sets the message limit, clamped to [`MAX_MESSAGE_LEN`].
    #[must_use]
    pub const fn with_max_message_len(mut self, len: usize) -> Self {
        self.max_message_len = if len > MAX_MESSAGE_LEN {
            MAX_MESSAGE_LEN
        } else {
            len
        };
        self
    }

    /// Sets whether a failed submission closes the channel.
    #[must_use]
    pub const fn with_close_on_transport_error(mut self, close: bool) -> Self {
        self.close_on_transport_error = close;
        self
    }

    /// Sets the `log` crate level filter.
    #[must_use]
    pub const fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_message_len() {
        let config = ShimConfig::DEFAULT.with_max_message_len(MAX_MESSAGE_LEN * 4);
        assert_eq!(config.max_message_len, MAX_MESSAGE_LEN);

        let config = ShimConfig::DEFAULT.with_max_message_len(16);
        assert_eq!(config.max_message_len, 16);
    }

    #[test]
    fn builder() {
        let config = ShimConfig::default()
            .with_close_on_transport_error(false)
            .with_level(LevelFilter::Trace);
        assert!(!config.close_on_transport_error);
        assert_eq!(config.level, LevelFilter::Trace);
        assert_eq!(config.max_message_len, MAX_MESSAGE_LEN);
    }
}
