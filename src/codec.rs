//! Pure encode/decode of frames (spec §4.1). Allocation-minimal, no
//! internal state — the only stateful piece of the protocol is the
//! receiver's ring ([`crate::receiver::Receiver`]).

use crate::error::FrameError;
use crate::frame::{
    CHECKSUM_NULL, Frame, FrameKind, HEADER_LEN, MAGIC0, MAGIC1, MAX_PAYLOAD, XOR_MASK,
};

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Encode a frame into a freshly allocated, XOR-obfuscated byte buffer ready
/// to hand to [`crate::transport::Transport::write`].
///
/// Header fields (including both checksums) are filled into a plain buffer
/// first; the *entire* frame is XORed exactly once afterward. Obfuscating
/// first and computing checksums over the obfuscated bytes — as one variant
/// of the original driver did — would make every checksum meaningless; this
/// is the ordering spec §9 calls out and this encoder avoids.
pub(crate) fn encode_frame(frame: &Frame) -> Vec<u8> {
    let length = frame.payload.len();
    debug_assert!(length <= MAX_PAYLOAD);

    let mut buf = Vec::with_capacity(HEADER_LEN + length);
    buf.push(MAGIC0);
    buf.push(MAGIC1);
    buf.push(length as u8);
    buf.push(frame.kind.as_byte());
    let msg_cksum = if length == 0 {
        CHECKSUM_NULL
    } else {
        checksum(&frame.payload)
    };
    buf.push(msg_cksum);
    let hdr_cksum = checksum(&buf[0..5]);
    buf.push(hdr_cksum);
    buf.extend_from_slice(&frame.payload);

    for b in buf.iter_mut() {
        *b ^= XOR_MASK;
    }

    buf
}

/// Outcome of attempting to decode one frame from the front of a buffer.
pub(crate) enum Decoded {
    /// A valid frame was found; `consumed` bytes (counted from the start of
    /// the window passed in) should be dropped by the caller.
    Frame { frame: Frame, consumed: usize },
    /// No magic pair was found, or a candidate was found but rejected; `skip`
    /// bytes should be dropped and decoding retried.
    Skip { skip: usize, reason: FrameError },
    /// Not enough bytes are buffered yet to tell; the caller should wait for
    /// more bytes and retry without consuming anything.
    NeedMoreData,
}

/// Scan `buf` (already de-obfuscated) for the earliest valid frame.
///
/// Mirrors the original driver's `__mcu_packet_detect`: scan for the magic
/// pair, validate length and both checksums, and on any failure advance by
/// one byte and keep scanning rather than giving up on the whole buffer.
pub(crate) fn decode_one(buf: &[u8]) -> Decoded {
    let Some(offset) = find_magic(buf) else {
        // No magic pair anywhere; nothing to skip past a possible dangling
        // MAGIC0 at the very end, which the next append's bytes might complete.
        let skip = buf.len().saturating_sub(1);
        return if skip == 0 {
            Decoded::NeedMoreData
        } else {
            Decoded::Skip {
                skip,
                reason: FrameError::NoMagic,
            }
        };
    };

    let candidate = &buf[offset..];

    if candidate.len() < HEADER_LEN {
        return Decoded::NeedMoreData;
    }

    let length = candidate[2] as usize;
    if length > MAX_PAYLOAD {
        return Decoded::Skip {
            skip: offset + 1,
            reason: FrameError::LengthOverflow,
        };
    }

    let total = HEADER_LEN + length;
    if candidate.len() < total {
        return Decoded::NeedMoreData;
    }

    let hdr_cksum = checksum(&candidate[0..5]);
    if hdr_cksum != candidate[5] {
        return Decoded::Skip {
            skip: offset + 1,
            reason: FrameError::BadHeaderChecksum,
        };
    }

    let payload = &candidate[HEADER_LEN..total];
    let expected_msg_cksum = if length == 0 {
        CHECKSUM_NULL
    } else {
        checksum(payload)
    };
    if expected_msg_cksum != candidate[4] {
        return Decoded::Skip {
            skip: offset + 1,
            reason: FrameError::BadMessageChecksum,
        };
    }

    let Some(kind) = FrameKind::from_byte(candidate[3]) else {
        return Decoded::Skip {
            skip: offset + 1,
            reason: FrameError::UnknownKind(candidate[3]),
        };
    };

    if matches!(kind, FrameKind::Request | FrameKind::Response) && length < 2 {
        return Decoded::Skip {
            skip: offset + 1,
            reason: FrameError::ShortControlPayload,
        };
    }

    Decoded::Frame {
        frame: Frame {
            kind,
            payload: payload.to_vec(),
        },
        consumed: offset + total,
    }
}

fn find_magic(buf: &[u8]) -> Option<usize> {
    if buf.len() < 2 {
        return None;
    }
    buf.windows(2).position(|w| w[0] == MAGIC0 && w[1] == MAGIC1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameKind;

    #[test]
    fn round_trip_ping() {
        let frame = Frame::keepalive(FrameKind::Ping);
        let wire = encode_frame(&frame);

        let plain: Vec<u8> = wire.iter().map(|b| b ^ XOR_MASK).collect();
        match decode_one(&plain) {
            Decoded::Frame { frame: decoded, consumed } => {
                assert_eq!(consumed, plain.len());
                assert_eq!(decoded, frame);
            }
            _ => panic!("expected a decoded frame"),
        }
    }

    #[test]
    fn round_trip_control_with_payload() {
        let frame = Frame::control(FrameKind::Request, 0x02, b'C', &[]).unwrap();
        let wire = encode_frame(&frame);
        assert_eq!(wire.len(), HEADER_LEN + 2);

        let plain: Vec<u8> = wire.iter().map(|b| b ^ XOR_MASK).collect();
        assert_eq!(plain[2], 2); // length
        assert_eq!(plain[4], checksum(&[0x02, b'C']));

        match decode_one(&plain) {
            Decoded::Frame { frame: decoded, .. } => assert_eq!(decoded, frame),
            _ => panic!("expected a decoded frame"),
        }
    }

    #[test]
    fn round_trip_every_length() {
        for len in 0..=MAX_PAYLOAD - 2 {
            let detail = vec![0xAB; len];
            let frame = Frame::control(FrameKind::Response, 5, 9, &detail).unwrap();
            let wire = encode_frame(&frame);
            let plain: Vec<u8> = wire.iter().map(|b| b ^ XOR_MASK).collect();
            match decode_one(&plain) {
                Decoded::Frame { frame: decoded, consumed } => {
                    assert_eq!(consumed, plain.len());
                    assert_eq!(decoded, frame);
                }
                _ => panic!("expected a decoded frame at len {len}"),
            }
        }
    }

    #[test]
    fn corruption_before_valid_frame_is_skipped() {
        let frame = Frame::control(FrameKind::Request, 1, 2, &[9]).unwrap();
        let wire = encode_frame(&frame);
        let plain: Vec<u8> = wire.iter().map(|b| b ^ XOR_MASK).collect();

        let mut buf = vec![0x00, 0x00, 0x00];
        buf.extend_from_slice(&plain);

        let mut skipped = 0;
        loop {
            match decode_one(&buf[skipped..]) {
                Decoded::Frame { frame: decoded, consumed } => {
                    assert_eq!(decoded, frame);
                    assert_eq!(skipped, 3);
                    assert_eq!(skipped + consumed, buf.len());
                    break;
                }
                Decoded::Skip { skip, .. } => skipped += skip,
                Decoded::NeedMoreData => panic!("ran out of bytes before finding the frame"),
            }
        }
    }

    #[test]
    fn truncated_frame_requests_more_data() {
        let frame = Frame::control(FrameKind::Request, 1, 2, &[9, 9, 9]).unwrap();
        let wire = encode_frame(&frame);
        let plain: Vec<u8> = wire.iter().map(|b| b ^ XOR_MASK).collect();

        assert!(matches!(decode_one(&plain[..plain.len() - 1]), Decoded::NeedMoreData));
    }

    #[test]
    fn oversized_length_byte_is_rejected() {
        let mut buf = vec![MAGIC0, MAGIC1, 251, 0x71, 0, 0];
        buf.extend_from_slice(&[0u8; 251]);
        match decode_one(&buf) {
            Decoded::Skip { skip, reason } => {
                assert_eq!(skip, 1);
                assert_eq!(reason, FrameError::LengthOverflow);
            }
            _ => panic!("expected a skip"),
        }
    }

    #[test]
    fn bad_header_checksum_is_skipped() {
        let frame = Frame::keepalive(FrameKind::Ping);
        let wire = encode_frame(&frame);
        let mut plain: Vec<u8> = wire.iter().map(|b| b ^ XOR_MASK).collect();
        plain[5] ^= 0xFF;
        match decode_one(&plain) {
            Decoded::Skip { skip, reason } => {
                assert_eq!(skip, 1);
                assert_eq!(reason, FrameError::BadHeaderChecksum);
            }
            _ => panic!("expected a skip"),
        }
    }

    #[test]
    fn short_control_payload_is_rejected() {
        // Length-0 request: header checksum and the null message checksum
        // both check out, but a request needs a device_id and control_code.
        let mut buf = vec![MAGIC0, MAGIC1, 0, 0x71, CHECKSUM_NULL, 0];
        buf[5] = checksum(&buf[0..5]);
        match decode_one(&buf) {
            Decoded::Skip { skip, reason } => {
                assert_eq!(skip, 1);
                assert_eq!(reason, FrameError::ShortControlPayload);
            }
            _ => panic!("expected a skip"),
        }

        // Length-1 response: one byte present, still short of the two-byte
        // device_id/control_code prefix.
        let mut buf = vec![MAGIC0, MAGIC1, 1, 0x72, 0, 0, 0xAB];
        buf[4] = checksum(&buf[6..7]);
        buf[5] = checksum(&buf[0..5]);
        match decode_one(&buf) {
            Decoded::Skip { skip, reason } => {
                assert_eq!(skip, 1);
                assert_eq!(reason, FrameError::ShortControlPayload);
            }
            _ => panic!("expected a skip"),
        }
    }

    #[test]
    fn earliest_valid_frame_wins_tie_break() {
        let a = Frame::keepalive(FrameKind::Ping);
        let b = Frame::keepalive(FrameKind::Pong);
        let mut buf: Vec<u8> = encode_frame(&a).iter().map(|x| x ^ XOR_MASK).collect();
        buf.extend(encode_frame(&b).iter().map(|x| x ^ XOR_MASK));

        match decode_one(&buf) {
            Decoded::Frame { frame, .. } => assert_eq!(frame, a),
            _ => panic!("expected a decoded frame"),
        }
    }
}
