//! ETSI DCP (TS 102 821) datagram decoding.
//!
//! Feed each UDP payload of a DCP stream to a [`DcpDecoder`]. PFT fragments are
//! reassembled (with Reed-Solomon recovery where the sender added it), AF frames
//! are checked, and TAG packets are walked and handed to whichever
//! [`ProtocolHandler`] their `*ptr` item names.
//!
//! # Crate Structure
//!
//! - [`fec`]: CRC, RS(255, 207) codec, interleaving
//! - [`frame`]: AF framing and TAG items
//! - [`pft`]: PFT headers, reassembly store and decoder
//! - [`pipeline`]: datagram sniffing and the layered decoder
//! - [`registry`]: handlers for payloads the library does not decode

/// Re-export FEC types.
pub mod fec {
    pub use edcp_fec::*;
}

/// Re-export AF and TAG types.
pub mod frame {
    pub use edcp_frame::*;
}

/// Re-export PFT types.
pub mod pft {
    pub use edcp_pft::*;
}

pub mod error;
pub mod pipeline;
pub mod registry;

pub use error::{DecodeError, HandlerError, RegistryError};
pub use pipeline::{sniff, AfReport, DcpDecoder, DecodeReport, PayloadReport, Sync};
pub use registry::{HandlerRegistry, HandoffOutcome, PayloadHandler, ProtocolHandler};
