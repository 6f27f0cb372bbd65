//! Length-Prefixed Framing Buffer
//!
//! Fixed-capacity byte queue that batches small messages for the next
//! outgoing packet. Each frame is `[len:u8][payload:len]`; the queue is
//! always terminated by a zero length byte.
//!
//! Batching is redundancy, not the primary delivery path: every message
//! appended here has already been sent on its own. A frame that does not
//! fit is refused and nothing is mutated.

use thiserror::Error;

/// Capacity of one framing buffer in bytes.
pub const FRAME_BUFFER_CAPACITY: usize = 4096;

/// Largest payload a single frame can carry (length is one byte).
pub const MAX_FRAME_PAYLOAD: usize = u8::MAX as usize;

/// Why a frame was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FramingError {
    /// Zero-length payloads would be read back as the terminator.
    #[error("empty payload")]
    Empty,

    /// Payload does not fit in a one-byte length prefix.
    #[error("payload of {len} bytes exceeds frame limit")]
    TooLarge {
        /// Offending payload length.
        len: usize,
    },

    /// Not enough room left in the buffer.
    #[error("buffer full: need {needed} bytes, {available} available")]
    Full {
        /// Bytes the frame would occupy including prefix and terminator.
        needed: usize,
        /// Bytes left before capacity.
        available: usize,
    },
}

/// Fixed-capacity queue of length-prefixed frames.
#[derive(Clone)]
pub struct FrameBuffer {
    data: Box<[u8; FRAME_BUFFER_CAPACITY]>,
    write_offset: usize,
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("write_offset", &self.write_offset)
            .finish()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            data: Box::new([0u8; FRAME_BUFFER_CAPACITY]),
            write_offset: 0,
        }
    }

    /// Forget all queued frames.
    pub fn clear(&mut self) {
        self.write_offset = 0;
        self.data[0] = 0;
    }

    /// Bytes currently occupied by frames (terminator excluded).
    #[inline]
    pub fn len(&self) -> usize {
        self.write_offset
    }

    /// True when no frame is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.write_offset == 0
    }

    /// Queued bytes including the trailing terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..=self.write_offset]
    }

    /// Queue one frame.
    ///
    /// Room for the prefix and the terminator must remain, so a frame of
    /// `n` bytes needs `write_offset + n + 2 <= capacity`.
    pub fn append(&mut self, payload: &[u8]) -> Result<(), FramingError> {
        let len = payload.len();
        if len == 0 {
            return Err(FramingError::Empty);
        }
        if len > MAX_FRAME_PAYLOAD {
            return Err(FramingError::TooLarge { len });
        }

        let needed = len + 2;
        let available = FRAME_BUFFER_CAPACITY - self.write_offset;
        if needed > available {
            return Err(FramingError::Full { needed, available });
        }

        let start = self.write_offset;
        self.data[start] = len as u8;
        self.data[start + 1..start + 1 + len].copy_from_slice(payload);
        self.write_offset += len + 1;
        self.data[self.write_offset] = 0;
        Ok(())
    }

    /// Move whole frames into `out` while they fit in `max_bytes`.
    ///
    /// Only payload bytes are copied and counted against the budget. A frame
    /// larger than what is left stays at the front for the next call.
    /// Returns the unused budget.
    pub fn drain_up_to(&mut self, out: &mut Vec<u8>, max_bytes: usize) -> usize {
        let mut remaining = max_bytes;
        if self.write_offset == 0 {
            return remaining;
        }

        let mut cursor = 0;
        loop {
            let chunk = self.data[cursor] as usize;
            if chunk == 0 || chunk > remaining {
                break;
            }
            out.extend_from_slice(&self.data[cursor + 1..cursor + 1 + chunk]);
            cursor += chunk + 1;
            remaining -= chunk;
        }

        // Shift the unconsumed tail (terminator included) to the front.
        self.data.copy_within(cursor..=self.write_offset, 0);
        self.write_offset -= cursor;
        remaining
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_append_then_drain_all() {
        let mut buf = FrameBuffer::new();
        buf.append(b"abc").unwrap();
        buf.append(b"de").unwrap();

        let mut out = Vec::new();
        let left = buf.drain_up_to(&mut out, usize::MAX);
        assert_eq!(out, b"abcde");
        assert_eq!(left, usize::MAX - 5);
        assert!(buf.is_empty());
        assert_eq!(buf.as_bytes(), &[0]);
    }

    #[test]
    fn test_drain_stops_at_frame_that_does_not_fit() {
        let mut buf = FrameBuffer::new();
        buf.append(b"1234").unwrap();
        buf.append(b"567890").unwrap();

        let mut out = Vec::new();
        let left = buf.drain_up_to(&mut out, 8);
        assert_eq!(out, b"1234");
        assert_eq!(left, 4);
        assert_eq!(buf.len(), 7);
        assert_eq!(buf.as_bytes()[0], 6);

        out.clear();
        buf.drain_up_to(&mut out, 6);
        assert_eq!(out, b"567890");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_drain_empty_buffer_keeps_budget() {
        let mut buf = FrameBuffer::new();
        let mut out = Vec::new();
        assert_eq!(buf.drain_up_to(&mut out, 100), 100);
        assert!(out.is_empty());
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        let mut buf = FrameBuffer::new();
        assert_eq!(buf.append(&[]), Err(FramingError::Empty));
        assert_eq!(
            buf.append(&[0u8; 256]),
            Err(FramingError::TooLarge { len: 256 })
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_capacity_boundary() {
        let mut buf = FrameBuffer::new();
        let frame = [7u8; 255];
        // 16 frames of 256 bytes = 4096, the 16th would leave no room for the terminator.
        for _ in 0..15 {
            buf.append(&frame).unwrap();
        }
        assert_eq!(buf.len(), 3840);

        let before = buf.as_bytes().to_vec();
        assert!(matches!(buf.append(&frame), Err(FramingError::Full { .. })));
        assert_eq!(buf.as_bytes(), &before[..]);

        // 3840 + 254 + 2 == 4096 still fits.
        buf.append(&[1u8; 254]).unwrap();
        assert!(matches!(buf.append(&[1u8]), Err(FramingError::Full { .. })));
    }

    fn payloads() -> impl Strategy<Value = Vec<Vec<u8>>> {
        prop::collection::vec(prop::collection::vec(any::<u8>(), 1..=255), 0..40)
    }

    proptest! {
        #[test]
        fn prop_full_drain_returns_concatenation(frames in payloads()) {
            let mut buf = FrameBuffer::new();
            let mut expected = Vec::new();
            for f in &frames {
                if buf.append(f).is_ok() {
                    expected.extend_from_slice(f);
                }
            }
            let mut out = Vec::new();
            buf.drain_up_to(&mut out, usize::MAX);
            prop_assert_eq!(out, expected);
            prop_assert!(buf.is_empty());
        }

        #[test]
        fn prop_rejected_append_is_noop(frames in payloads(), extra in prop::collection::vec(any::<u8>(), 1..=255)) {
            let mut buf = FrameBuffer::new();
            for f in &frames {
                let _ = buf.append(f);
            }
            let before = buf.as_bytes().to_vec();
            let len = buf.len();
            if buf.append(&extra).is_err() {
                prop_assert_eq!(buf.as_bytes(), &before[..]);
                prop_assert_eq!(buf.len(), len);
            }
        }

        #[test]
        fn prop_shrinking_budgets_never_split_frames(
            frames in payloads(),
            budgets in prop::collection::vec(0usize..600, 1..20),
        ) {
            let mut buf = FrameBuffer::new();
            let mut accepted = Vec::new();
            for f in &frames {
                if buf.append(f).is_ok() {
                    accepted.push(f.clone());
                }
            }

            let mut out = Vec::new();
            let mut boundaries = vec![0usize];
            let mut acc = 0;
            for f in &accepted {
                acc += f.len();
                boundaries.push(acc);
            }

            for budget in budgets {
                buf.drain_up_to(&mut out, budget);
                prop_assert!(boundaries.contains(&out.len()));
            }
            buf.drain_up_to(&mut out, usize::MAX);
            prop_assert_eq!(out, accepted.concat());
        }
    }
}
