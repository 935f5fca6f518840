//! TAG items: `name[4] bits:u32 value[ceil(bits / 8)]`, back to back.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{self, FrameError, TagError};

/// Item header: name (4) + bit length (4).
pub const ITEM_HEADER_SIZE: usize = 8;

/// A four-byte tag name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagName(pub [u8; 4]);

impl TagName {
    /// The protocol pointer item.
    pub const PTR: TagName = TagName(*b"*ptr");

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl From<[u8; 4]> for TagName {
    fn from(name: [u8; 4]) -> Self {
        Self(name)
    }
}

/// One TAG item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub name: TagName,
    /// Declared value length in bits.
    pub bits: u32,
    /// Offset of the item header within the packet.
    pub offset: usize,
    pub value: Bytes,
}

/// Iterator over the items of a TAG packet.
///
/// Yields at most one error, after which it is exhausted.
#[derive(Debug, Clone)]
pub struct TagIter {
    buf: Bytes,
    offset: usize,
    done: bool,
}

/// Walk the items of a TAG packet.
pub fn walk_tags(packet: Bytes) -> TagIter {
    TagIter {
        buf: packet,
        offset: 0,
        done: false,
    }
}

impl Iterator for TagIter {
    type Item = Result<TagRecord, TagError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.buf.len() {
            return None;
        }

        let offset = self.offset;
        let available = self.buf.len() - offset;
        if available < ITEM_HEADER_SIZE {
            self.done = true;
            return Some(Err(TagError::TruncatedHeader { offset, available }));
        }

        let head = &self.buf[offset..offset + ITEM_HEADER_SIZE];
        let name = TagName([head[0], head[1], head[2], head[3]]);
        let bits = u32::from_be_bytes([head[4], head[5], head[6], head[7]]);
        let needed = u64::from(bits.div_ceil(8));
        let remaining = available - ITEM_HEADER_SIZE;

        if needed > remaining as u64 {
            self.done = true;
            return Some(Err(TagError::ValueOverrun {
                tag: name.to_string(),
                offset,
                needed,
                available: remaining,
            }));
        }

        let start = offset + ITEM_HEADER_SIZE;
        let end = start + needed as usize;
        self.offset = end;
        trace!(tag = %name, bits, offset, "tag item");

        Some(Ok(TagRecord {
            name,
            bits,
            offset,
            value: self.buf.slice(start..end),
        }))
    }
}

/// Value of a `*ptr` item: the protocol carried by the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolPointer {
    pub protocol: TagName,
    pub major: u16,
    pub minor: u16,
}

impl ProtocolPointer {
    pub fn parse(value: &[u8]) -> Result<Self, TagError> {
        if value.len() < 8 {
            return Err(TagError::MalformedPointer { len: value.len() });
        }
        Ok(Self {
            protocol: TagName([value[0], value[1], value[2], value[3]]),
            major: u16::from_be_bytes([value[4], value[5]]),
            minor: u16::from_be_bytes([value[6], value[7]]),
        })
    }
}

/// A fully walked TAG packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPacket {
    /// The packet as received.
    pub raw: Bytes,
    pub records: Vec<TagRecord>,
    /// The last `*ptr` item, if any.
    pub pointer: Option<ProtocolPointer>,
}

impl TagPacket {
    /// Walk every item. Any bounds error rejects the whole packet.
    pub fn parse(packet: Bytes) -> Result<Self, TagError> {
        let mut records = Vec::new();
        let mut pointer = None;
        for record in walk_tags(packet.clone()) {
            let record = record?;
            if record.name == TagName::PTR {
                pointer = Some(ProtocolPointer::parse(&record.value)?);
            }
            records.push(record);
        }
        Ok(Self {
            raw: packet,
            records,
            pointer,
        })
    }

    /// First item with the given name.
    pub fn find(&self, name: TagName) -> Option<&TagRecord> {
        self.records.iter().find(|r| r.name == name)
    }
}

/// Bit length of a value of `len` bytes, if it fits the 32-bit field.
fn value_bits(len: usize) -> error::Result<u32> {
    u32::try_from(len)
        .ok()
        .and_then(|len| len.checked_mul(8))
        .ok_or(FrameError::PayloadTooLarge {
            size: len,
            max: (u32::MAX / 8) as usize,
        })
}

/// Append one TAG item. `bits` is `value.len() * 8`.
///
/// Values too long for the bit length field are rejected and nothing is
/// written.
pub fn encode_tag(name: TagName, value: &[u8], dst: &mut BytesMut) -> error::Result<()> {
    let bits = value_bits(value.len())?;
    dst.reserve(ITEM_HEADER_SIZE + value.len());
    dst.put_slice(name.as_bytes());
    dst.put_u32(bits);
    dst.put_slice(value);
    Ok(())
}
