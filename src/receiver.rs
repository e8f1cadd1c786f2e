//! The per-bus receive ring (spec §4.2): accumulate bytes from the
//! transport, XOR them on ingress, and drain decoded frames out in order.

use crate::codec::{decode_one, Decoded};
use crate::frame::XOR_MASK;
use crate::frame::Frame;

/// Ring capacity in bytes (spec §3 "Bus").
pub(crate) const RING_SIZE: usize = 512;
/// Compaction only happens once `start` has drifted past this many bytes.
const LOW_WATERMARK: usize = RING_SIZE / 2;

/// Owns one bus's receive ring.
///
/// `append` and `drain` are the only entry points; both are meant to be
/// called under the bus's short ring lock (spec §4.2, §5) — this type
/// itself holds no lock, that's the caller's job (see [`crate::bus::Bus`]).
pub(crate) struct Receiver {
    buffer: Vec<u8>,
    start: usize,
    end: usize,
}

impl Receiver {
    pub(crate) fn new() -> Self {
        Self {
            buffer: vec![0u8; RING_SIZE],
            start: 0,
            end: 0,
        }
    }

    /// Append as many bytes of `data` as fit in the remaining ring capacity,
    /// XORing each on the way in. Returns the number of bytes actually
    /// stored; callers must re-present any excess themselves (spec §4.2).
    pub(crate) fn append(&mut self, data: &[u8]) -> usize {
        let room = RING_SIZE - self.end;
        let n = data.len().min(room);
        for (i, &b) in data[..n].iter().enumerate() {
            self.buffer[self.end + i] = b ^ XOR_MASK;
        }
        self.end += n;
        n
    }

    fn is_empty(&self) -> bool {
        self.start == self.end
    }

    fn compact_if_low(&mut self) {
        if self.is_empty() && self.start >= LOW_WATERMARK {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Run the codec over the occupied region until no further frame can be
    /// decoded, invoking `on_frame` for each one in arrival order.
    ///
    /// Idempotent: calling this again with no new bytes appended yields no
    /// additional frames (spec §4.2).
    pub(crate) fn drain(&mut self, mut on_frame: impl FnMut(Frame)) {
        loop {
            let window = &self.buffer[self.start..self.end];
            match decode_one(window) {
                Decoded::Frame { frame, consumed } => {
                    self.start += consumed;
                    on_frame(frame);
                }
                Decoded::Skip { skip, reason } => {
                    debug!("mcubus: dropping {} corrupt byte(s): {}", skip, reason);
                    self.start += skip;
                }
                Decoded::NeedMoreData => break,
            }
        }
        self.compact_if_low();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_frame;
    use crate::frame::FrameKind;

    fn wire(frame: &Frame) -> Vec<u8> {
        encode_frame(frame)
    }

    #[test]
    fn detect_is_idempotent() {
        let mut rx = Receiver::new();
        rx.append(&wire(&Frame::keepalive(FrameKind::Ping)));

        let mut seen = 0;
        rx.drain(|_| seen += 1);
        assert_eq!(seen, 1);

        // No new bytes: a second drain must not re-emit anything.
        rx.drain(|_| seen += 1);
        assert_eq!(seen, 1);
    }

    #[test]
    fn append_truncates_when_ring_is_full() {
        let mut rx = Receiver::new();
        let first = rx.append(&vec![0u8; RING_SIZE]);
        assert_eq!(first, RING_SIZE);
        let second = rx.append(&[1, 2, 3]);
        assert_eq!(second, 0);
    }

    #[test]
    fn compaction_resets_once_drained_past_watermark() {
        let mut rx = Receiver::new();
        // Push enough ping frames to push `start` past the low watermark,
        // draining each time so the ring empties.
        let ping = wire(&Frame::keepalive(FrameKind::Ping));
        let frames_needed = LOW_WATERMARK / ping.len() + 1;
        for _ in 0..frames_needed {
            rx.append(&ping);
            rx.drain(|_| {});
        }
        assert!(rx.start >= LOW_WATERMARK);
        // One more drain with no new bytes triggers the reset because the
        // ring is already empty.
        rx.drain(|_| {});
        assert_eq!(rx.start, 0);
        assert_eq!(rx.end, 0);
    }

    #[test]
    fn resynchronizes_across_noise_and_multiple_frames() {
        let mut rx = Receiver::new();
        let mut raw = vec![0xFF, 0x00];
        raw.extend(wire(&Frame::keepalive(FrameKind::Ping)).iter().map(|b| b ^ XOR_MASK));
        raw.extend(
            wire(&Frame::control(FrameKind::Request, 1, 2, &[3]).unwrap())
                .iter()
                .map(|b| b ^ XOR_MASK),
        );

        rx.append(&raw);
        let mut frames = Vec::new();
        rx.drain(|f| frames.push(f));

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].kind, FrameKind::Ping);
        assert_eq!(frames[1].kind, FrameKind::Request);
    }
}
