/// Errors raised while verifying or correcting protected DCP data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FecError {
    /// The Reed-Solomon layout described by a PFT header is unusable.
    #[error("invalid FEC parameters: {0}")]
    InvalidParameters(String),

    /// A buffer does not have the length implied by its layout.
    #[error("buffer length mismatch (expected {expected} bytes, got {actual})")]
    LengthMismatch { expected: usize, actual: usize },

    /// More data than fits in the data part of one codeword.
    #[error("data too long for one codeword ({len} bytes, max {max})")]
    DataTooLong { len: usize, max: usize },

    /// A codeword could not be corrected; the whole block is rejected.
    #[error("codeword {index} uncorrectable: {source}")]
    Uncorrectable {
        index: usize,
        #[source]
        source: CodewordError,
    },
}

/// Why a single 255-symbol codeword could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodewordError {
    /// More erasures than parity symbols.
    #[error("too many erasures ({count}, max {max})")]
    TooManyErasures { count: usize, max: usize },

    /// An erasure position lies outside the codeword.
    #[error("erasure position {position} out of range")]
    ErasureOutOfRange { position: usize },

    /// The error locator degree does not match the roots found.
    #[error("error locator has {roots} roots for degree {degree}")]
    LocatorMismatch { roots: usize, degree: usize },

    /// Forney evaluation hit a zero locator derivative.
    #[error("zero locator derivative at position {position}")]
    ZeroDerivative { position: usize },

    /// The corrected word still has a non-zero syndrome.
    #[error("residual syndrome after correction")]
    ResidualSyndrome,

    /// The decoder rewrote a symbol that must be zero in a shortened codeword.
    #[error("correction landed in codeword padding at position {position}")]
    CorrectionInPadding { position: usize },
}

pub type Result<T> = std::result::Result<T, FecError>;
