//! Integrity and forward error correction primitives for ETSI DCP.
//!
//! This is the lowest layer of the edcp workspace. It knows nothing about
//! AF frames or PFT fragments; it works on byte slices:
//! - [`crc`]: the 16-bit CRC protecting AF frames and PFT headers
//! - [`rs`]: an RS(255, 207) errors-and-erasures codec behind [`ErasureDecoder`]
//! - [`interleave`]: byte interleaving between fragments and codewords
//! - [`codec`]: block geometry (`c_max`, `rx_min`) and all-or-nothing correction

pub mod codec;
pub mod crc;
pub mod error;
mod gf;
pub mod interleave;
pub mod rs;

pub use codec::{correct, protect, Correction, FecLayout};
pub use crc::{checksum, crc16, crc_ok, CrcParams, CRC_GOOD, DCP_CRC16};
pub use error::{CodewordError, FecError, Result};
pub use interleave::{deinterleave, deinterleave_into, interleave};
pub use rs::{ErasureDecoder, Rs255, CODEWORD_LEN, MAX_DATA_LEN, PARITY_LEN};
