//! Bounded message text. Nothing here allocates, so messages can be built in
//! contexts where no heap is available yet.

use core::fmt;

/// The largest message, in bytes, that a channel ever forwards.
pub const MAX_MESSAGE_LEN: usize = 512;

/// Returns the longest prefix of `text` that is at most `limit` bytes and ends
/// on a character boundary, and whether anything was cut.
#[must_use]
pub fn truncate(text: &str, limit: usize) -> (&str, bool) {
    if text.len() <= limit {
        return (text, false);
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (&text[..end], true)
}

/// A fixed size text buffer that silently truncates what does not fit.
///
/// Formatting into it never fails, which `core::fmt::Write` would otherwise
/// report when a message is longer than the buffer.
#[derive(Clone)]
pub struct MessageBuffer<const N: usize = MAX_MESSAGE_LEN> {
    bytes: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> MessageBuffer<N> {
    /// Creates an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: [0; N],
            len: 0,
            truncated: false,
        }
    }

    /// Formats `args` into a new buffer.
    #[must_use]
    pub fn from_args(args: fmt::Arguments<'_>) -> Self {
        let mut buffer = Self::new();
        let _ = fmt::Write::write_fmt(&mut buffer, args);
        buffer
    }

    /// Returns the text written so far.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Only whole characters are ever copied in.
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or_default()
    }

    /// Returns the number of bytes written so far.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns whether nothing has been written.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns whether any text was dropped.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Empties the buffer.
    pub fn clear(&mut self) {
        self.len = 0;
        self.truncated = false;
    }
}

impl<const N: usize> Default for MessageBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for MessageBuffer<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Ok(());
        }
        let (fitting, truncated) = truncate(s, N - self.len);
        self.bytes[self.len..self.len + fitting.len()].copy_from_slice(fitting.as_bytes());
        self.len += fitting.len();
        self.truncated = truncated;
        Ok(())
    }
}

impl<const N: usize> fmt::Debug for MessageBuffer<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBuffer")
            .field("text", &self.as_str())
            .field("truncated", &self.truncated)
            .finish()
    }
}
