//! AF framing and TAG items for ETSI DCP (TS 102 821).
//!
//! An AF frame wraps one payload with:
//! - the "AF" sync bytes
//! - a 4-byte big-endian payload length and a 2-byte sequence counter
//! - a revision byte (CRC flag, major and minor version) and a payload type
//! - a trailing CRC-16 over everything before it
//!
//! A payload of type `'T'` is a run of TAG items, walked by [`tag`].

pub mod af;
pub mod error;
pub mod payload_type;
pub mod tag;

pub use af::{decode_af, encode_af, AfFrame, AfHeader, CrcStatus, LengthCheck};
pub use error::{FrameError, Result, TagError};
pub use payload_type::{PayloadType, TAG};
pub use tag::{encode_tag, walk_tags, ProtocolPointer, TagIter, TagName, TagPacket, TagRecord};
