use tracing::{debug, trace};

use crate::error::{CodewordError, FecError, Result};
use crate::interleave::interleave;
use crate::rs::{ErasureDecoder, Rs255, CODEWORD_LEN, MAX_DATA_LEN, PARITY_LEN};

/// Geometry of one Reed-Solomon protected PFT message.
///
/// `fragment_count` fragments of `fragment_len` bytes carry `codeword_count`
/// shortened codewords of `k` data plus [`PARITY_LEN`] parity symbols each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FecLayout {
    fragment_len: usize,
    fragment_count: usize,
    k: usize,
}

impl FecLayout {
    /// Validate the parameters carried in a PFT header.
    pub fn new(fragment_len: usize, fragment_count: usize, k: usize) -> Result<Self> {
        if fragment_len == 0 {
            return Err(FecError::InvalidParameters("zero fragment length".into()));
        }
        if fragment_count == 0 {
            return Err(FecError::InvalidParameters("zero fragment count".into()));
        }
        if k == 0 || k > MAX_DATA_LEN {
            return Err(FecError::InvalidParameters(format!(
                "RS k {k} outside 1..={MAX_DATA_LEN}"
            )));
        }
        if fragment_len.checked_mul(fragment_count).is_none() {
            return Err(FecError::InvalidParameters(format!(
                "{fragment_count} fragments of {fragment_len} bytes overflow"
            )));
        }
        Ok(Self {
            fragment_len,
            fragment_count,
            k,
        })
    }

    pub fn fragment_len(&self) -> usize {
        self.fragment_len
    }

    pub fn fragment_count(&self) -> usize {
        self.fragment_count
    }

    /// Data symbols per codeword.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Symbols per transmitted (shortened) codeword.
    pub fn codeword_len(&self) -> usize {
        self.k + PARITY_LEN
    }

    /// Size of the whole fragment matrix.
    pub fn total_len(&self) -> usize {
        self.fragment_len * self.fragment_count
    }

    /// `c_max`: complete codewords carried by the fragments.
    pub fn codeword_count(&self) -> usize {
        self.total_len() / self.codeword_len()
    }

    /// `rx_min`: fragments needed before correction can succeed.
    pub fn min_fragments(&self) -> usize {
        (self.codeword_count() * self.k).div_ceil(self.fragment_len)
    }

    /// Bytes of payload recovered by a successful correction.
    pub fn data_len(&self) -> usize {
        self.codeword_count() * self.k
    }

    /// Codeword position of symbol `b` of a shortened codeword.
    fn codeword_position(&self, b: usize) -> usize {
        if b < self.k {
            b
        } else {
            MAX_DATA_LEN + (b - self.k)
        }
    }
}

/// Summary of a successful block correction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Correction {
    /// Codewords decoded.
    pub codewords: usize,
    /// Symbols rewritten across all codewords.
    pub corrected_symbols: usize,
    /// Symbols that were declared erased.
    pub erased_symbols: usize,
}

/// Correct a deinterleaved block, all or nothing.
///
/// `missing` flags fragments that were synthesized as zero filler; their
/// bytes are handed to the decoder as erasures. Pass an empty slice when
/// every fragment is real. On success `output` holds exactly
/// [`FecLayout::data_len`] corrected bytes. On failure `output` is left
/// empty.
pub fn correct<D: ErasureDecoder + ?Sized>(
    decoder: &D,
    layout: &FecLayout,
    deinterleaved: &[u8],
    missing: &[bool],
    output: &mut Vec<u8>,
) -> Result<Correction> {
    if deinterleaved.len() != layout.total_len() {
        return Err(FecError::LengthMismatch {
            expected: layout.total_len(),
            actual: deinterleaved.len(),
        });
    }
    if !missing.is_empty() && missing.len() != layout.fragment_count {
        return Err(FecError::LengthMismatch {
            expected: layout.fragment_count,
            actual: missing.len(),
        });
    }

    output.clear();
    output.reserve(layout.data_len());

    let n = layout.codeword_len();
    let mut summary = Correction::default();
    let mut erasures = Vec::with_capacity(PARITY_LEN);
    let mut codeword = [0u8; CODEWORD_LEN];

    for (index, chunk) in deinterleaved
        .chunks_exact(n)
        .take(layout.codeword_count())
        .enumerate()
    {
        codeword.fill(0);
        codeword[..layout.k].copy_from_slice(&chunk[..layout.k]);
        codeword[MAX_DATA_LEN..].copy_from_slice(&chunk[layout.k..]);

        erasures.clear();
        if !missing.is_empty() {
            let base = index * n;
            for b in 0..n {
                if missing[(base + b) % layout.fragment_count] {
                    erasures.push(layout.codeword_position(b));
                }
            }
        }

        let fixed = match decoder.decode(&mut codeword, &erasures) {
            Ok(fixed) => fixed,
            Err(source) => {
                debug!(codeword = index, erasures = erasures.len(), %source, "codeword uncorrectable");
                output.clear();
                return Err(FecError::Uncorrectable { index, source });
            }
        };

        if let Some(offset) = codeword[layout.k..MAX_DATA_LEN].iter().position(|&b| b != 0) {
            output.clear();
            return Err(FecError::Uncorrectable {
                index,
                source: CodewordError::CorrectionInPadding {
                    position: layout.k + offset,
                },
            });
        }

        trace!(codeword = index, fixed, "codeword decoded");
        summary.codewords += 1;
        summary.corrected_symbols += fixed;
        summary.erased_symbols += erasures.len();
        output.extend_from_slice(&codeword[..layout.k]);
    }

    Ok(summary)
}

/// Protect `data` for transmission: encode codewords and interleave them.
///
/// Returns the fragment-major matrix of [`FecLayout::total_len`] bytes;
/// fragment `f` is `result[f * fragment_len..(f + 1) * fragment_len]`.
/// `data` may be shorter than [`FecLayout::data_len`]; the rest is zero.
pub fn protect(encoder: &Rs255, layout: &FecLayout, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() > layout.data_len() {
        return Err(FecError::DataTooLong {
            len: data.len(),
            max: layout.data_len(),
        });
    }

    let mut coded = Vec::with_capacity(layout.total_len());
    let mut chunk = vec![0u8; layout.k];
    for index in 0..layout.codeword_count() {
        chunk.fill(0);
        let start = (index * layout.k).min(data.len());
        let end = ((index + 1) * layout.k).min(data.len());
        chunk[..end - start].copy_from_slice(&data[start..end]);

        let parity = encoder.encode_parity(&chunk)?;
        coded.extend_from_slice(&chunk);
        coded.extend_from_slice(&parity);
    }
    coded.resize(layout.total_len(), 0);

    interleave(&coded, layout.fragment_len, layout.fragment_count)
}
