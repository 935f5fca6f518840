use bytes::{BufMut, Bytes, BytesMut};
use edcp_fec::crc::{crc16, crc_ok};
use tracing::debug;

use crate::error::{FrameError, Result};
use crate::payload_type::PayloadType;

/// Header: sync (2) + length (4) + sequence (2) + revision (1) + type (1).
pub const HEADER_SIZE: usize = 10;

/// Trailing CRC size.
pub const CRC_SIZE: usize = 2;

/// Sync bytes: "AF".
pub const SYNC: [u8; 2] = *b"AF";

const CRC_FLAG: u8 = 0x80;

/// Parsed AF frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AfHeader {
    /// Declared payload length.
    pub length: u32,
    pub sequence: u16,
    /// Whether the trailing CRC is meaningful.
    pub crc_flag: bool,
    /// Protocol revision, 3 bits.
    pub major: u8,
    /// Protocol revision, 4 bits.
    pub minor: u8,
    pub payload_type: PayloadType,
}

impl AfHeader {
    /// Header for a revision 1.0 frame with the CRC flag set.
    pub fn new(sequence: u16, payload_type: PayloadType) -> Self {
        Self {
            length: 0,
            sequence,
            crc_flag: true,
            major: 1,
            minor: 0,
            payload_type,
        }
    }

    fn revision_byte(&self) -> u8 {
        let cf = if self.crc_flag { CRC_FLAG } else { 0 };
        cf | ((self.major & 0x07) << 4) | (self.minor & 0x0F)
    }

    fn parse(buf: &[u8]) -> Self {
        let ar = buf[8];
        Self {
            length: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
            sequence: u16::from_be_bytes([buf[6], buf[7]]),
            crc_flag: ar & CRC_FLAG != 0,
            major: (ar >> 4) & 0x07,
            minor: ar & 0x0F,
            payload_type: PayloadType::from(buf[9]),
        }
    }
}

/// How the declared payload length compares with the bytes received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthCheck {
    Exact,
    /// The frame ends before `declared` payload bytes and the CRC.
    Truncated { declared: usize, available: usize },
    /// Bytes follow the CRC.
    TrailingBytes { count: usize },
}

/// Result of checking the trailing CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcStatus {
    /// The CRC flag is clear.
    NotPresent,
    Valid,
    Invalid,
    /// The frame is truncated; the CRC cannot be checked.
    Unavailable,
}

/// A decoded AF frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AfFrame {
    pub header: AfHeader,
    /// Payload, clamped to the bytes actually present.
    pub payload: Bytes,
    /// The CRC as transmitted, when the frame is long enough to carry one.
    pub crc: Option<u16>,
    pub crc_status: CrcStatus,
    pub length_check: LengthCheck,
}

impl AfFrame {
    /// True when the frame has its full declared length and no failed CRC.
    pub fn is_intact(&self) -> bool {
        !matches!(self.length_check, LengthCheck::Truncated { .. })
            && matches!(self.crc_status, CrcStatus::Valid | CrcStatus::NotPresent)
    }

    /// Re-encode the frame with a freshly computed CRC.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        encode_af(&self.header, &self.payload, dst)
    }
}

/// Decode one AF frame.
///
/// Only a missing or short header and a wrong sync are errors. Length and
/// CRC problems are reported on the returned frame.
pub fn decode_af(frame: Bytes) -> Result<AfFrame> {
    if frame.len() < SYNC.len() {
        return Err(FrameError::Truncated {
            needed: HEADER_SIZE,
            available: frame.len(),
        });
    }
    if frame[..2] != SYNC {
        return Err(FrameError::InvalidSync {
            found: [frame[0], frame[1]],
        });
    }
    if frame.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            needed: HEADER_SIZE,
            available: frame.len(),
        });
    }

    let header = AfHeader::parse(&frame[..HEADER_SIZE]);
    let declared = header.length as usize;
    let body = frame.len() - HEADER_SIZE;

    let complete = declared
        .checked_add(CRC_SIZE)
        .filter(|&needed| needed <= body);

    let decoded = match complete {
        Some(needed) => {
            let end = HEADER_SIZE + declared;
            let crc = u16::from_be_bytes([frame[end], frame[end + 1]]);
            let length_check = match body - needed {
                0 => LengthCheck::Exact,
                count => LengthCheck::TrailingBytes { count },
            };
            let crc_status = if !header.crc_flag {
                CrcStatus::NotPresent
            } else if crc_ok(&frame[..HEADER_SIZE + needed]) {
                CrcStatus::Valid
            } else {
                CrcStatus::Invalid
            };
            AfFrame {
                header,
                payload: frame.slice(HEADER_SIZE..end),
                crc: Some(crc),
                crc_status,
                length_check,
            }
        }
        None => {
            let available = body.saturating_sub(CRC_SIZE);
            debug!(declared, available, "AF frame truncated");
            let crc = (body >= CRC_SIZE).then(|| {
                let at = frame.len() - CRC_SIZE;
                u16::from_be_bytes([frame[at], frame[at + 1]])
            });
            AfFrame {
                header,
                payload: frame.slice(HEADER_SIZE..HEADER_SIZE + available),
                crc,
                crc_status: if header.crc_flag {
                    CrcStatus::Unavailable
                } else {
                    CrcStatus::NotPresent
                },
                length_check: LengthCheck::Truncated {
                    declared,
                    available,
                },
            }
        }
    };

    Ok(decoded)
}

/// Encode an AF frame.
///
/// The length field is taken from `payload`, not from `header.length`.
/// The CRC is always computed and written; the flag only tells receivers
/// whether to check it.
///
/// Wire format:
/// ```text
/// ┌──────┬───────────┬──────────┬─────┬─────┬──────────────┬──────────┐
/// │ "AF" │ LEN (4B)  │ SEQ (2B) │ AR  │ PT  │ payload[LEN] │ CRC (2B) │
/// └──────┴───────────┴──────────┴─────┴─────┴──────────────┴──────────┘
/// ```
pub fn encode_af(header: &AfHeader, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let length = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;

    let start = dst.len();
    dst.reserve(HEADER_SIZE + payload.len() + CRC_SIZE);
    dst.put_slice(&SYNC);
    dst.put_u32(length);
    dst.put_u16(header.sequence);
    dst.put_u8(header.revision_byte());
    dst.put_u8(header.payload_type.as_byte());
    dst.put_slice(payload);
    let crc = crc16(&dst[start..]);
    dst.put_u16(crc);
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn encoded(header: &AfHeader, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_af(header, payload, &mut buf).unwrap();
        buf
    }

    #[test]
    fn decode_valid_frame() {
        let header = AfHeader::new(0x1234, PayloadType::Tag);
        let buf = encoded(&header, b"payload");
        assert_eq!(buf.len(), HEADER_SIZE + 7 + CRC_SIZE);

        let frame = decode_af(buf.freeze()).unwrap();
        assert_eq!(frame.header.sequence, 0x1234);
        assert_eq!(frame.header.length, 7);
        assert_eq!(frame.header.major, 1);
        assert_eq!(frame.header.minor, 0);
        assert_eq!(frame.header.payload_type, PayloadType::Tag);
        assert_eq!(frame.payload.as_ref(), b"payload");
        assert_eq!(frame.crc_status, CrcStatus::Valid);
        assert_eq!(frame.length_check, LengthCheck::Exact);
        assert!(frame.is_intact());
    }

    #[test]
    fn revision_bits() {
        let mut buf = encoded(&AfHeader::new(1, PayloadType::Tag), b"");
        buf[8] = 0x80 | 0x50 | 0x0A;
        let frame = decode_af(buf.freeze()).unwrap();
        assert!(frame.header.crc_flag);
        assert_eq!(frame.header.major, 5);
        assert_eq!(frame.header.minor, 10);
        // Revision byte changed after the CRC was computed.
        assert_eq!(frame.crc_status, CrcStatus::Invalid);
    }

    #[test]
    fn corrupted_payload_is_flagged_not_rejected() {
        let mut buf = encoded(&AfHeader::new(7, PayloadType::Tag), b"abcdef");
        buf[HEADER_SIZE + 2] ^= 0x01;
        let frame = decode_af(buf.freeze()).unwrap();
        assert_eq!(frame.crc_status, CrcStatus::Invalid);
        assert_eq!(frame.payload.as_ref(), b"abddef");
        assert!(!frame.is_intact());
    }

    #[test]
    fn crc_flag_clear_skips_check() {
        let mut header = AfHeader::new(7, PayloadType::Other(b'X'));
        header.crc_flag = false;
        let mut buf = encoded(&header, b"abc");
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        let frame = decode_af(buf.freeze()).unwrap();
        assert_eq!(frame.crc_status, CrcStatus::NotPresent);
        assert!(frame.is_intact());
    }

    #[test]
    fn truncated_payload_is_clamped() {
        let mut buf = encoded(&AfHeader::new(7, PayloadType::Tag), b"0123456789");
        buf.truncate(HEADER_SIZE + 6);
        let frame = decode_af(buf.freeze()).unwrap();
        assert_eq!(
            frame.length_check,
            LengthCheck::Truncated {
                declared: 10,
                available: 4
            }
        );
        assert_eq!(frame.payload.as_ref(), b"0123");
        assert_eq!(frame.crc_status, CrcStatus::Unavailable);
        assert!(!frame.is_intact());
    }

    #[test]
    fn huge_declared_length_does_not_overflow() {
        let mut buf = encoded(&AfHeader::new(7, PayloadType::Tag), b"xy");
        buf[2..6].copy_from_slice(&u32::MAX.to_be_bytes());
        let frame = decode_af(buf.freeze()).unwrap();
        assert!(matches!(frame.length_check, LengthCheck::Truncated { available: 2, .. }));
    }

    #[test]
    fn trailing_bytes_are_reported() {
        let mut buf = encoded(&AfHeader::new(7, PayloadType::Tag), b"abc");
        buf.put_slice(&[0xAA, 0xBB, 0xCC]);
        let frame = decode_af(buf.freeze()).unwrap();
        assert_eq!(frame.length_check, LengthCheck::TrailingBytes { count: 3 });
        assert_eq!(frame.crc_status, CrcStatus::Valid);
        assert_eq!(frame.payload.as_ref(), b"abc");
    }

    #[test]
    fn rejects_wrong_sync() {
        let result = decode_af(Bytes::from_static(b"PF\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00"));
        assert_eq!(result, Err(FrameError::InvalidSync { found: *b"PF" }));
    }

    #[test]
    fn rejects_short_header() {
        let result = decode_af(Bytes::from_static(b"AF\x00\x00"));
        assert_eq!(
            result,
            Err(FrameError::Truncated {
                needed: HEADER_SIZE,
                available: 4
            })
        );
        assert!(decode_af(Bytes::new()).is_err());
    }

    proptest! {
        #[test]
        fn decode_then_encode_reproduces_frame(
            sequence in any::<u16>(),
            pt in any::<u8>(),
            major in 0u8..8,
            minor in 0u8..16,
            payload in prop::collection::vec(any::<u8>(), 0..512),
        ) {
            let header = AfHeader {
                length: 0,
                sequence,
                crc_flag: true,
                major,
                minor,
                payload_type: PayloadType::from(pt),
            };
            let wire = encoded(&header, &payload).freeze();

            let frame = decode_af(wire.clone()).unwrap();
            prop_assert_eq!(frame.crc_status, CrcStatus::Valid);
            prop_assert_eq!(frame.header.major, major);
            prop_assert_eq!(frame.header.minor, minor);

            let mut again = BytesMut::new();
            frame.encode(&mut again).unwrap();
            prop_assert_eq!(again.freeze(), wire);
        }
    }
}
