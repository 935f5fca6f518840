//! CRC used by the AF and PFT layers.
//!
//! DCP protects AF frames and PFT headers with a 16-bit CRC (polynomial
//! `x^16 + x^12 + x^5 + 1`, register preset to all ones, output inverted).
//! Running the same CRC over a block *including* its transmitted checksum
//! leaves the constant residue [`CRC_GOOD`] when the block is intact.

/// Parameters of a bitwise, MSB-first CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcParams {
    /// Register width in bits (1..=32).
    pub width: u32,
    /// Generator polynomial including the leading `x^width` term.
    pub poly: u64,
    /// Initial register value.
    pub seed: u64,
    /// Invert the register before returning it.
    pub invert: bool,
}

/// CRC-16 as specified for DCP (and DRM): poly 0x11021, seed 0xFFFF, inverted.
pub const DCP_CRC16: CrcParams = CrcParams {
    width: 16,
    poly: 0x11021,
    seed: 0xFFFF,
    invert: true,
};

/// Checksum of a block that ends with its own correct CRC.
pub const CRC_GOOD: u16 = 0xE2F0;

/// Compute a CRC over `data` with explicit parameters.
pub fn checksum(data: &[u8], params: &CrcParams) -> u64 {
    let width = params.width.clamp(1, 32);
    let ones = (1u64 << width) - 1;
    let mut reg = params.seed & ones;

    for &byte in data {
        for bit in (0..8).rev() {
            reg <<= 1;
            let msb = (reg >> width) & 1;
            let data_bit = u64::from(byte >> bit) & 1;
            if msb ^ data_bit != 0 {
                reg ^= params.poly;
            }
            reg &= ones;
        }
    }

    if params.invert {
        reg ^= ones;
    }
    reg
}

/// DCP CRC-16 of `data`, as written on the wire.
pub fn crc16(data: &[u8]) -> u16 {
    checksum(data, &DCP_CRC16) as u16
}

/// True when `block` (payload followed by its big-endian CRC) is intact.
pub fn crc_ok(block: &[u8]) -> bool {
    crc16(block) == CRC_GOOD
}
