use bytes::{BufMut, Bytes, BytesMut};
use edcp_fec::crc::{crc16, crc_ok};

use crate::error::{PftError, Result};

/// Sync bytes: "PF".
pub const SYNC: [u8; 2] = *b"PF";

/// Fixed part: sync, sequence, index, count, flags and length.
pub const BASE_HEADER_SIZE: usize = 12;

/// Smallest possible header (no FEC, no address, with HCRC).
pub const MIN_HEADER_SIZE: usize = BASE_HEADER_SIZE + 2;

const FEC_FLAG: u16 = 0x8000;
const ADDR_FLAG: u16 = 0x4000;
const LEN_MASK: u16 = 0x3FFF;
const U24_MAX: u32 = 0x00FF_FFFF;

/// Reed-Solomon parameters of a protected message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FecParams {
    /// Data symbols per codeword.
    pub rs_k: u8,
    /// Padding bytes at the end of the last codeword.
    pub rs_z: u8,
}

/// Transport addressing carried when the ADDR flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PftAddress {
    pub source: u16,
    pub dest: u16,
}

/// A parsed PFT fragment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PftHeader {
    pub sequence: u16,
    /// 24-bit fragment index.
    pub index: u32,
    /// 24-bit fragment count.
    pub count: u32,
    pub fec: Option<FecParams>,
    pub address: Option<PftAddress>,
    /// Payload length as declared (14 bits).
    pub declared_len: u16,
    pub hcrc: u16,
    /// Whether the header CRC checked out. Advisory only.
    pub hcrc_ok: bool,
}

impl PftHeader {
    /// Header size on the wire for these flags.
    pub fn wire_size(&self) -> usize {
        let mut size = MIN_HEADER_SIZE;
        if self.fec.is_some() {
            size += 2;
        }
        if self.address.is_some() {
            size += 4;
        }
        size
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index.saturating_add(1) == self.count
    }

    /// Write the header for `payload_len` bytes of payload, with its CRC.
    ///
    /// `declared_len` and `hcrc` are ignored; both are derived.
    pub fn encode(&self, payload_len: usize, dst: &mut BytesMut) -> Result<()> {
        if payload_len > LEN_MASK as usize {
            return Err(PftError::FieldOverflow {
                field: "payload length",
                value: payload_len,
                max: LEN_MASK as usize,
            });
        }
        for (field, value) in [("fragment index", self.index), ("fragment count", self.count)] {
            if value > U24_MAX {
                return Err(PftError::FieldOverflow {
                    field,
                    value: value as usize,
                    max: U24_MAX as usize,
                });
            }
        }

        let mut flags = payload_len as u16;
        if self.fec.is_some() {
            flags |= FEC_FLAG;
        }
        if self.address.is_some() {
            flags |= ADDR_FLAG;
        }

        let start = dst.len();
        dst.reserve(self.wire_size());
        dst.put_slice(&SYNC);
        dst.put_u16(self.sequence);
        dst.put_uint(u64::from(self.index), 3);
        dst.put_uint(u64::from(self.count), 3);
        dst.put_u16(flags);
        if let Some(fec) = self.fec {
            dst.put_u8(fec.rs_k);
            dst.put_u8(fec.rs_z);
        }
        if let Some(addr) = self.address {
            dst.put_u16(addr.source);
            dst.put_u16(addr.dest);
        }
        let crc = crc16(&dst[start..]);
        dst.put_u16(crc);
        Ok(())
    }
}

/// A fragment: header plus every byte after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PftFragment {
    pub header: PftHeader,
    pub payload: Bytes,
}

impl PftFragment {
    /// True when the payload is as long as the header says.
    pub fn length_matches(&self) -> bool {
        self.payload.len() == self.header.declared_len as usize
    }
}

fn u24(b: &[u8]) -> u32 {
    u32::from_be_bytes([0, b[0], b[1], b[2]])
}

/// Parse one PFT datagram.
///
/// The payload is whatever follows the header; a declared length that
/// disagrees is kept for reporting. A bad header CRC is recorded, not
/// rejected.
pub fn parse_pft(datagram: Bytes) -> Result<PftFragment> {
    if datagram.len() < SYNC.len() {
        return Err(PftError::TruncatedHeader {
            needed: MIN_HEADER_SIZE,
            available: datagram.len(),
        });
    }
    if datagram[..2] != SYNC {
        return Err(PftError::InvalidSync {
            found: [datagram[0], datagram[1]],
        });
    }
    if datagram.len() < BASE_HEADER_SIZE {
        return Err(PftError::TruncatedHeader {
            needed: MIN_HEADER_SIZE,
            available: datagram.len(),
        });
    }

    let sequence = u16::from_be_bytes([datagram[2], datagram[3]]);
    let index = u24(&datagram[4..7]);
    let count = u24(&datagram[7..10]);
    let flags = u16::from_be_bytes([datagram[10], datagram[11]]);

    let mut size = MIN_HEADER_SIZE;
    if flags & FEC_FLAG != 0 {
        size += 2;
    }
    if flags & ADDR_FLAG != 0 {
        size += 4;
    }
    if datagram.len() < size {
        return Err(PftError::TruncatedHeader {
            needed: size,
            available: datagram.len(),
        });
    }

    let mut at = BASE_HEADER_SIZE;
    let fec = (flags & FEC_FLAG != 0).then(|| {
        let params = FecParams {
            rs_k: datagram[at],
            rs_z: datagram[at + 1],
        };
        at += 2;
        params
    });
    let address = (flags & ADDR_FLAG != 0).then(|| {
        let addr = PftAddress {
            source: u16::from_be_bytes([datagram[at], datagram[at + 1]]),
            dest: u16::from_be_bytes([datagram[at + 2], datagram[at + 3]]),
        };
        at += 4;
        addr
    });
    let hcrc = u16::from_be_bytes([datagram[at], datagram[at + 1]]);

    let header = PftHeader {
        sequence,
        index,
        count,
        fec,
        address,
        declared_len: flags & LEN_MASK,
        hcrc,
        hcrc_ok: crc_ok(&datagram[..size]),
    };

    Ok(PftFragment {
        header,
        payload: datagram.slice(size..),
    })
}

/// Encode one fragment: header with CRC, then payload.
pub fn encode_pft(header: &PftHeader, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    header.encode(payload.len(), dst)?;
    dst.put_slice(payload);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(index: u32, count: u32) -> PftHeader {
        PftHeader {
            sequence: 0x0102,
            index,
            count,
            fec: None,
            address: None,
            declared_len: 0,
            hcrc: 0,
            hcrc_ok: false,
        }
    }

    fn wire(h: &PftHeader, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        encode_pft(h, payload, &mut buf).unwrap();
        buf.freeze()
    }

    #[test]
    fn plain_header_roundtrip() {
        let frag = parse_pft(wire(&header(3, 10), b"abcde")).unwrap();
        assert_eq!(frag.header.sequence, 0x0102);
        assert_eq!(frag.header.index, 3);
        assert_eq!(frag.header.count, 10);
        assert_eq!(frag.header.declared_len, 5);
        assert!(frag.header.fec.is_none());
        assert!(frag.header.address.is_none());
        assert!(frag.header.hcrc_ok);
        assert!(frag.length_matches());
        assert_eq!(frag.payload.as_ref(), b"abcde");
        assert_eq!(frag.header.wire_size(), MIN_HEADER_SIZE);
    }

    #[test]
    fn fec_and_address_fields() {
        let mut h = header(0, 4);
        h.fec = Some(FecParams { rs_k: 207, rs_z: 12 });
        h.address = Some(PftAddress {
            source: 0xBEEF,
            dest: 0x0042,
        });
        let frag = parse_pft(wire(&h, &[0u8; 30])).unwrap();
        assert_eq!(frag.header.fec, h.fec);
        assert_eq!(frag.header.address, h.address);
        assert_eq!(frag.header.wire_size(), MIN_HEADER_SIZE + 6);
        assert!(frag.header.hcrc_ok);
        assert!(frag.header.is_first());
        assert!(!frag.header.is_last());
    }

    #[test]
    fn bad_hcrc_is_recorded() {
        let mut buf = BytesMut::from(&wire(&header(1, 2), b"xy")[..]);
        buf[5] ^= 0x10;
        let frag = parse_pft(buf.freeze()).unwrap();
        assert!(!frag.header.hcrc_ok);
        assert_eq!(frag.header.index, 0x1001);
    }

    #[test]
    fn length_mismatch_keeps_real_payload() {
        let mut buf = BytesMut::new();
        header(0, 2).encode(100, &mut buf).unwrap();
        buf.put_slice(b"short");
        let frag = parse_pft(buf.freeze()).unwrap();
        assert_eq!(frag.header.declared_len, 100);
        assert_eq!(frag.payload.as_ref(), b"short");
        assert!(!frag.length_matches());
    }

    #[test]
    fn truncated_optional_fields() {
        let mut h = header(0, 2);
        h.address = Some(PftAddress { source: 1, dest: 2 });
        let full = wire(&h, b"");
        let cut = full.slice(..MIN_HEADER_SIZE + 1);
        assert_eq!(
            parse_pft(cut),
            Err(PftError::TruncatedHeader {
                needed: MIN_HEADER_SIZE + 4,
                available: MIN_HEADER_SIZE + 1
            })
        );
    }

    #[test]
    fn rejects_af_sync() {
        let result = parse_pft(Bytes::from_static(b"AF\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00"));
        assert_eq!(result, Err(PftError::InvalidSync { found: *b"AF" }));
    }

    #[test]
    fn encode_rejects_oversized_fields() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            header(0, 2).encode(0x4000, &mut buf),
            Err(PftError::FieldOverflow { .. })
        ));
        assert!(matches!(
            header(0, 0x0100_0000).encode(1, &mut buf),
            Err(PftError::FieldOverflow { .. })
        ));
    }

    #[test]
    fn last_fragment_flag() {
        assert!(header(9, 10).is_last());
        assert!(!header(8, 10).is_last());
        assert!(!header(0, 0).is_last());
    }
}
