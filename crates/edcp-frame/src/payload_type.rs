//! AF payload types.
//!
//! The payload type byte selects the layer carried inside an AF frame.
//! Only `'T'` (TAG items) is defined by DCP itself; any other value is
//! left to a handler registered by the application.

/// Payload type byte for TAG packets.
pub const TAG: u8 = b'T';

/// Payload type of an AF frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    /// `'T'`: a sequence of TAG items.
    Tag,
    /// Any other byte.
    Other(u8),
}

impl PayloadType {
    /// The byte as it appears on the wire.
    pub fn as_byte(self) -> u8 {
        match self {
            PayloadType::Tag => TAG,
            PayloadType::Other(b) => b,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            PayloadType::Tag => "TAG",
            PayloadType::Other(_) => "UNKNOWN",
        }
    }
}

impl From<u8> for PayloadType {
    fn from(byte: u8) -> Self {
        match byte {
            TAG => PayloadType::Tag,
            other => PayloadType::Other(other),
        }
    }
}

impl From<PayloadType> for u8 {
    fn from(pt: PayloadType) -> Self {
        pt.as_byte()
    }
}
