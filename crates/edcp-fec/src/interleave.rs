//! Byte interleaving between PFT fragments and Reed-Solomon codewords.
//!
//! Codewords are spread across fragments: fragment `f` carries byte `r` of
//! the coded block at `f + r * fragment_count`. Received fragments sit
//! fragment-major (`f * fragment_len + r`); deinterleaving restores the
//! codeword-major order.

use crate::error::{FecError, Result};

fn check_len(len: usize, fragment_len: usize, fragment_count: usize) -> Result<()> {
    let expected = fragment_len.checked_mul(fragment_count).ok_or_else(|| {
        FecError::InvalidParameters(format!(
            "{fragment_count} fragments of {fragment_len} bytes overflow"
        ))
    })?;
    if len != expected {
        return Err(FecError::LengthMismatch {
            expected,
            actual: len,
        });
    }
    Ok(())
}

/// Fragment-major to codeword-major, writing into a reusable buffer.
pub fn deinterleave_into(
    input: &[u8],
    fragment_len: usize,
    fragment_count: usize,
    output: &mut Vec<u8>,
) -> Result<()> {
    check_len(input.len(), fragment_len, fragment_count)?;
    output.clear();
    output.resize(input.len(), 0);
    for (f, fragment) in input.chunks_exact(fragment_len.max(1)).enumerate() {
        for (r, &byte) in fragment.iter().enumerate() {
            output[f + r * fragment_count] = byte;
        }
    }
    Ok(())
}

/// `output[f + r * fragment_count] = input[f * fragment_len + r]`.
pub fn deinterleave(input: &[u8], fragment_len: usize, fragment_count: usize) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    deinterleave_into(input, fragment_len, fragment_count, &mut output)?;
    Ok(output)
}

/// Inverse of [`deinterleave`]: codeword-major back to fragment-major.
pub fn interleave(input: &[u8], fragment_len: usize, fragment_count: usize) -> Result<Vec<u8>> {
    check_len(input.len(), fragment_len, fragment_count)?;
    let mut output = vec![0u8; input.len()];
    for (f, fragment) in output.chunks_exact_mut(fragment_len.max(1)).enumerate() {
        for (r, byte) in fragment.iter_mut().enumerate() {
            *byte = input[f + r * fragment_count];
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn transposes_small_matrix() {
        // Three fragments of two bytes: a0 a1 | b0 b1 | c0 c1
        let input = [0xA0, 0xA1, 0xB0, 0xB1, 0xC0, 0xC1];
        let out = deinterleave(&input, 2, 3).unwrap();
        assert_eq!(out, vec![0xA0, 0xB0, 0xC0, 0xA1, 0xB1, 0xC1]);
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(
            deinterleave(&[0u8; 5], 2, 3),
            Err(FecError::LengthMismatch {
                expected: 6,
                actual: 5
            })
        );
    }

    #[test]
    fn rejects_overflowing_dimensions() {
        assert!(matches!(
            deinterleave(&[], usize::MAX, 2),
            Err(FecError::InvalidParameters(_))
        ));
    }

    #[test]
    fn empty_matrix_is_fine() {
        assert!(deinterleave(&[], 0, 4).unwrap().is_empty());
        assert!(interleave(&[], 8, 0).unwrap().is_empty());
    }

    #[test]
    fn scratch_buffer_is_reset() {
        let mut scratch = vec![0xFF; 64];
        deinterleave_into(&[1, 2, 3, 4], 2, 2, &mut scratch).unwrap();
        assert_eq!(scratch, vec![1, 3, 2, 4]);
    }

    proptest! {
        #[test]
        fn interleave_inverts_deinterleave(
            (fragment_len, fragment_count, data) in (1usize..40, 1usize..40)
                .prop_flat_map(|(len, count)| {
                    (Just(len), Just(count), prop::collection::vec(any::<u8>(), len * count))
                })
        ) {
            let deinterleaved = deinterleave(&data, fragment_len, fragment_count).unwrap();
            let restored = interleave(&deinterleaved, fragment_len, fragment_count).unwrap();
            prop_assert_eq!(restored, data);
        }
    }
}
