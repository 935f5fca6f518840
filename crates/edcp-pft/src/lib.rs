//! PFT (protection, fragmentation and transport) layer of ETSI DCP.
//!
//! A PFT datagram carries one fragment of an AF frame:
//! - "PF" sync, 16-bit sequence, 24-bit fragment index and count
//! - FEC and ADDR flags with a 14-bit payload length
//! - optional Reed-Solomon parameters and source/destination addresses
//! - a header CRC
//!
//! [`PftDecoder`] collects fragments per sequence in a [`ReassemblyStore`]
//! and, for FEC-protected messages, recovers missing fragments once enough
//! have arrived.

pub mod decoder;
pub mod error;
pub mod header;
pub mod store;

pub use decoder::{
    FecReport, FecRetryPolicy, PftConfig, PftDecoder, PftOutcome, PftReport, Undelivered,
};
pub use error::{PftError, ReassemblyError, Result};
pub use header::{encode_pft, parse_pft, FecParams, PftAddress, PftFragment, PftHeader};
pub use store::{
    AbandonReason, Abandoned, Finished, PartialMessage, ReassemblyKey, ReassemblyOutcome,
    ReassemblyStore, StoreConfig, DEFAULT_MAX_FRAGMENTS, FRAGMENT_OVERHEAD,
};
