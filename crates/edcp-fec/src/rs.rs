//! Reed-Solomon RS(255, 207) over GF(2^8).
//!
//! Codewords are stored highest-degree symbol first: data symbols at
//! `[0, 207)`, parity at `[207, 255)`. Shortened codes keep their `k` data
//! symbols at `[0, k)` and zero the rest of the data part. The generator
//! polynomial has roots `alpha^0 .. alpha^47`.

use crate::error::{CodewordError, FecError, Result};
use crate::gf;

/// Symbols per codeword.
pub const CODEWORD_LEN: usize = 255;

/// Maximum data symbols per codeword.
pub const MAX_DATA_LEN: usize = 207;

/// Parity symbols per codeword.
pub const PARITY_LEN: usize = CODEWORD_LEN - MAX_DATA_LEN;

/// Decodes one full-length codeword in place.
///
/// `erasures` lists codeword positions known to be unreliable. On success
/// the number of symbols that were changed is returned.
pub trait ErasureDecoder {
    fn decode(
        &self,
        codeword: &mut [u8; CODEWORD_LEN],
        erasures: &[usize],
    ) -> std::result::Result<usize, CodewordError>;
}

impl<T: ErasureDecoder + ?Sized> ErasureDecoder for &T {
    fn decode(
        &self,
        codeword: &mut [u8; CODEWORD_LEN],
        erasures: &[usize],
    ) -> std::result::Result<usize, CodewordError> {
        (**self).decode(codeword, erasures)
    }
}

impl<T: ErasureDecoder + ?Sized> ErasureDecoder for Box<T> {
    fn decode(
        &self,
        codeword: &mut [u8; CODEWORD_LEN],
        erasures: &[usize],
    ) -> std::result::Result<usize, CodewordError> {
        (**self).decode(codeword, erasures)
    }
}

/// Errors-and-erasures RS(255, 207) codec.
#[derive(Debug, Clone)]
pub struct Rs255 {
    /// Generator polynomial, highest degree first (`generator[0] == 1`).
    generator: [u8; PARITY_LEN + 1],
}

impl Default for Rs255 {
    fn default() -> Self {
        Self::new()
    }
}

impl Rs255 {
    pub fn new() -> Self {
        let mut generator = [0u8; PARITY_LEN + 1];
        generator[0] = 1;
        // Multiply in (x + alpha^i) one root at a time.
        for i in 0..PARITY_LEN {
            let root = gf::alpha_pow(i);
            for j in (1..=i + 1).rev() {
                generator[j] ^= gf::mul(generator[j - 1], root);
            }
        }
        Self { generator }
    }

    /// Compute the parity symbols for up to 207 data symbols.
    ///
    /// The data is laid out exactly as [`ErasureDecoder::decode`] expects it:
    /// data first, zero padding up to 207 symbols.
    pub fn encode_parity(&self, data: &[u8]) -> Result<[u8; PARITY_LEN]> {
        if data.len() > MAX_DATA_LEN {
            return Err(FecError::DataTooLong {
                len: data.len(),
                max: MAX_DATA_LEN,
            });
        }

        let mut work = [0u8; CODEWORD_LEN];
        work[..data.len()].copy_from_slice(data);
        for i in 0..MAX_DATA_LEN {
            let coef = work[i];
            if coef == 0 {
                continue;
            }
            for (j, &g) in self.generator.iter().enumerate().skip(1) {
                work[i + j] ^= gf::mul(g, coef);
            }
        }

        let mut parity = [0u8; PARITY_LEN];
        parity.copy_from_slice(&work[MAX_DATA_LEN..]);
        Ok(parity)
    }

    /// Build a complete codeword from data and its parity.
    pub fn encode_codeword(&self, data: &[u8]) -> Result<[u8; CODEWORD_LEN]> {
        let parity = self.encode_parity(data)?;
        let mut codeword = [0u8; CODEWORD_LEN];
        codeword[..data.len()].copy_from_slice(data);
        codeword[MAX_DATA_LEN..].copy_from_slice(&parity);
        Ok(codeword)
    }
}

fn syndromes(codeword: &[u8; CODEWORD_LEN]) -> [u8; PARITY_LEN] {
    let mut syn = [0u8; PARITY_LEN];
    for (i, s) in syn.iter_mut().enumerate() {
        *s = gf::eval_high_first(codeword, gf::alpha_pow(i));
    }
    syn
}

/// Locator value `X = alpha^(n-1-position)` for a codeword position.
fn locator(position: usize) -> u8 {
    gf::alpha_pow(CODEWORD_LEN - 1 - position)
}

impl ErasureDecoder for Rs255 {
    fn decode(
        &self,
        codeword: &mut [u8; CODEWORD_LEN],
        erasures: &[usize],
    ) -> std::result::Result<usize, CodewordError> {
        let mut erased: Vec<usize> = erasures.to_vec();
        erased.sort_unstable();
        erased.dedup();
        if let Some(&position) = erased.iter().find(|&&p| p >= CODEWORD_LEN) {
            return Err(CodewordError::ErasureOutOfRange { position });
        }
        if erased.len() > PARITY_LEN {
            return Err(CodewordError::TooManyErasures {
                count: erased.len(),
                max: PARITY_LEN,
            });
        }

        let syn = syndromes(codeword);
        if syn.iter().all(|&s| s == 0) {
            return Ok(0);
        }

        // Locator polynomials are stored lowest degree first.
        let mut lambda = [0u8; PARITY_LEN + 1];
        lambda[0] = 1;
        for (deg, &position) in erased.iter().enumerate() {
            let x = locator(position);
            for i in (1..=deg + 1).rev() {
                lambda[i] ^= gf::mul(lambda[i - 1], x);
            }
        }

        // Berlekamp-Massey, seeded with the erasure locator.
        let num_erasures = erased.len();
        let mut b = lambda;
        let mut el = num_erasures;
        for r in (num_erasures + 1)..=PARITY_LEN {
            let mut discr = 0u8;
            for i in 0..r {
                discr ^= gf::mul(lambda[i], syn[r - i - 1]);
            }

            if discr == 0 {
                b.copy_within(0..PARITY_LEN, 1);
                b[0] = 0;
                continue;
            }

            let mut t = lambda;
            for i in 1..=PARITY_LEN {
                t[i] ^= gf::mul(discr, b[i - 1]);
            }
            if 2 * el <= r + num_erasures - 1 {
                el = r + num_erasures - el;
                let scale = gf::inv(discr);
                for (bi, &li) in b.iter_mut().zip(lambda.iter()) {
                    *bi = gf::mul(li, scale);
                }
            } else {
                b.copy_within(0..PARITY_LEN, 1);
                b[0] = 0;
            }
            lambda = t;
        }

        let degree = lambda.iter().rposition(|&c| c != 0).unwrap_or(0);

        // Chien search over every codeword position.
        let mut positions = Vec::with_capacity(degree);
        for position in 0..CODEWORD_LEN {
            let x_inv = gf::inv(locator(position));
            if gf::eval_low_first(&lambda[..=degree], x_inv) == 0 {
                positions.push(position);
            }
        }
        if positions.len() != degree {
            return Err(CodewordError::LocatorMismatch {
                roots: positions.len(),
                degree,
            });
        }

        // Error evaluator: omega = syndrome * lambda mod x^PARITY_LEN.
        let mut omega = [0u8; PARITY_LEN];
        for (i, o) in omega.iter_mut().enumerate() {
            let mut acc = 0u8;
            for j in 0..=i.min(degree) {
                acc ^= gf::mul(syn[i - j], lambda[j]);
            }
            *o = acc;
        }

        // Formal derivative keeps only the odd terms in characteristic 2.
        let mut derivative = [0u8; PARITY_LEN];
        for i in (1..=degree).step_by(2) {
            derivative[i - 1] = lambda[i];
        }

        let mut changed = 0usize;
        for &position in &positions {
            let x = locator(position);
            let x_inv = gf::inv(x);
            let den = gf::eval_low_first(&derivative, x_inv);
            if den == 0 {
                return Err(CodewordError::ZeroDerivative { position });
            }
            let num = gf::eval_low_first(&omega, x_inv);
            let magnitude = gf::mul(x, gf::div(num, den));
            if magnitude != 0 {
                codeword[position] ^= magnitude;
                changed += 1;
            }
        }

        if syndromes(codeword).iter().any(|&s| s != 0) {
            return Err(CodewordError::ResidualSyndrome);
        }

        Ok(changed)
    }
}
