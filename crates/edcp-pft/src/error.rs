use edcp_fec::FecError;

/// Errors raised while decoding PFT fragments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PftError {
    /// The datagram does not start with the "PF" sync bytes.
    #[error("invalid PFT sync (expected \"PF\", found {found:02x?})")]
    InvalidSync { found: [u8; 2] },

    /// Not enough bytes for the fragment header its flags describe.
    #[error("truncated PFT header ({available} bytes, need {needed})")]
    TruncatedHeader { needed: usize, available: usize },

    /// A header field does not fit its wire width.
    #[error("{field} out of range ({value}, max {max})")]
    FieldOverflow {
        field: &'static str,
        value: usize,
        max: usize,
    },

    /// Reassembly rejected the fragment.
    #[error("reassembly failed: {0}")]
    Reassembly(#[from] ReassemblyError),

    /// Reed-Solomon recovery failed.
    #[error("FEC failed: {0}")]
    Fec(#[from] FecError),

    /// A protected message would exceed the configured size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A fragment's length differs from the rest of its FEC message.
    #[error("fragment {index} is {actual} bytes, expected {expected}")]
    FragmentLength {
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// A fragment's FEC flag differs from the rest of its message.
    #[error("fragment {index} disagrees with its message on FEC protection")]
    FecFlagMismatch { index: usize },

    /// Every fragment arrived, or the stream ended, without enough data.
    #[error("insufficient fragments ({received} received, {needed} needed)")]
    InsufficientFragments { received: usize, needed: usize },
}

/// Errors raised by the reassembly store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReassemblyError {
    /// The declared fragment count exceeds the per-message cap.
    #[error("too many fragments ({total}, max {max})")]
    TooManyFragments { total: usize, max: usize },

    /// The fragment index is not below the declared count.
    #[error("fragment index {index} out of range for {total} fragments")]
    IndexOutOfRange { index: usize, total: usize },

    /// The fragment is flagged last but is not the final index.
    #[error("fragment {index} marked last of {total}")]
    InconsistentLast { index: usize, total: usize },

    /// A fragment of a multi-fragment message carries no payload.
    #[error("fragment {index} is empty")]
    EmptyFragment { index: usize },

    /// Buffering the fragment would exceed the byte budget.
    #[error("buffer limit exceeded ({needed} bytes, max {max})")]
    BufferLimit { needed: usize, max: usize },

    /// The store is configured to hold no messages.
    #[error("no room for messages in flight")]
    NoCapacity,
}

impl ReassemblyError {
    /// Whether the error discards the message the fragment belongs to.
    pub fn aborts_message(&self) -> bool {
        matches!(
            self,
            ReassemblyError::TooManyFragments { .. } | ReassemblyError::BufferLimit { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PftError>;
