//! RX Line Buffer
//!
//! Capped FIFO of the peripheral's raw serial output plus the coalescing
//! window that throttles "data received" notifications.

use std::time::Duration;
use tokio::time::Instant;

/// What the owner should do after an append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxNotify {
    /// Bytes were discarded (cache disabled) or nothing was appended
    None,
    /// Raise the notification now
    Now,
    /// A notification is pending; raise it at the given deadline
    Deferred(Instant),
}

#[derive(Debug)]
pub struct RxLineBuffer {
    data: Vec<u8>,
    capacity: usize,
    cache_enabled: bool,
    window: Duration,
    last_notified: Option<Instant>,
    pending: bool,
}

impl RxLineBuffer {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            data: Vec::new(),
            capacity: capacity.max(1),
            cache_enabled: false,
            window,
            last_notified: None,
            pending: false,
        }
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    /// Disabling keeps existing content; re-enabling does not replay
    /// anything discarded in between.
    pub fn set_cache_enabled(&mut self, enabled: bool) {
        self.cache_enabled = enabled;
        if !enabled {
            self.pending = false;
        }
    }

    pub fn append(&mut self, bytes: &[u8], now: Instant) -> RxNotify {
        if !self.cache_enabled || bytes.is_empty() {
            return RxNotify::None;
        }

        self.data.extend_from_slice(bytes);
        if self.data.len() > self.capacity {
            let mut excess = self.data.len() - self.capacity;
            // Don't leave half a character at the front; a UTF-8 sequence has
            // at most three continuation bytes
            let limit = (excess + 3).min(self.data.len());
            while excess < limit && is_utf8_continuation(self.data[excess]) {
                excess += 1;
            }
            self.data.drain(..excess);
        }

        match self.last_notified {
            Some(last) if now.duration_since(last) < self.window => {
                self.pending = true;
                RxNotify::Deferred(last + self.window)
            }
            _ => {
                self.mark_notified(now);
                RxNotify::Now
            }
        }
    }

    /// Deadline of the pending coalesced notification, if any
    pub fn pending_deadline(&self) -> Option<Instant> {
        match (self.pending, self.last_notified) {
            (true, Some(last)) => Some(last + self.window),
            _ => None,
        }
    }

    /// Consume the pending notification if its window has elapsed
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.pending_deadline() {
            Some(deadline) if now >= deadline => {
                self.mark_notified(now);
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.data.clear();
        self.pending = false;
    }

    /// Buffer contents with at most one trailing CR or LF removed
    pub fn snapshot(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.data).into_owned();
        if text.ends_with('\n') || text.ends_with('\r') {
            text.pop();
        }
        text
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn mark_notified(&mut self, now: Instant) {
        self.last_notified = Some(now);
        self.pending = false;
    }
}

fn is_utf8_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(300);

    fn enabled_buffer(capacity: usize) -> RxLineBuffer {
        let mut buffer = RxLineBuffer::new(capacity, WINDOW);
        buffer.set_cache_enabled(true);
        buffer
    }

    #[test]
    fn test_snapshot_strips_single_terminator() {
        let now = Instant::now();

        let mut buffer = enabled_buffer(64);
        buffer.append(b"abc\n", now);
        assert_eq!(buffer.snapshot(), "abc");

        let mut buffer = enabled_buffer(64);
        buffer.append(b"abc", now);
        assert_eq!(buffer.snapshot(), "abc");

        let mut buffer = enabled_buffer(64);
        buffer.append(b"abc\n\n", now);
        assert_eq!(buffer.snapshot(), "abc\n");

        let mut buffer = enabled_buffer(64);
        buffer.append(b"abc\r", now);
        assert_eq!(buffer.snapshot(), "abc");
    }

    #[test]
    fn test_disabled_cache_discards() {
        let now = Instant::now();
        let mut buffer = enabled_buffer(64);
        buffer.append(b"kept", now);

        buffer.set_cache_enabled(false);
        assert_eq!(buffer.append(b" dropped", now), RxNotify::None);
        assert_eq!(buffer.snapshot(), "kept");

        buffer.set_cache_enabled(true);
        buffer.append(b"!", now + WINDOW);
        assert_eq!(buffer.snapshot(), "kept!");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let now = Instant::now();
        let mut buffer = enabled_buffer(5);
        buffer.append(b"abc", now);
        buffer.append(b"defg", now);
        assert_eq!(buffer.snapshot(), "cdefg");

        buffer.append(b"0123456789", now);
        assert_eq!(buffer.snapshot(), "56789");
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_eviction_keeps_characters_whole() {
        let now = Instant::now();
        let mut buffer = enabled_buffer(4);
        buffer.append("aé".as_bytes(), now);
        buffer.append(b"bcd", now);
        assert_eq!(buffer.snapshot(), "bcd");
        assert_eq!(buffer.len(), 3);

        let mut buffer = enabled_buffer(3);
        buffer.append("éé".as_bytes(), now);
        assert_eq!(buffer.snapshot(), "é");
    }

    #[test]
    fn test_reset_clears() {
        let mut buffer = enabled_buffer(16);
        buffer.append(b"hello", Instant::now());
        buffer.reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.snapshot(), "");
    }

    #[test]
    fn test_notifications_are_coalesced() {
        let start = Instant::now();
        let mut buffer = enabled_buffer(64);

        assert_eq!(buffer.append(b"a", start), RxNotify::Now);
        let deadline = start + WINDOW;
        assert_eq!(
            buffer.append(b"b", start + Duration::from_millis(10)),
            RxNotify::Deferred(deadline)
        );
        assert_eq!(
            buffer.append(b"c", start + Duration::from_millis(20)),
            RxNotify::Deferred(deadline)
        );
        assert_eq!(buffer.pending_deadline(), Some(deadline));

        assert!(!buffer.take_due(start + Duration::from_millis(100)));
        assert!(buffer.take_due(deadline));
        assert!(!buffer.take_due(deadline));
        assert_eq!(buffer.pending_deadline(), None);

        assert_eq!(buffer.append(b"d", deadline + WINDOW), RxNotify::Now);
    }
}
