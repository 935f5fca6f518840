/// Errors that can occur while decoding or encoding AF frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The frame does not start with the "AF" sync bytes.
    #[error("invalid AF sync (expected \"AF\", found {found:02x?})")]
    InvalidSync { found: [u8; 2] },

    /// Not enough bytes for a frame header.
    #[error("truncated AF header ({available} bytes, need {needed})")]
    Truncated { needed: usize, available: usize },

    /// The payload does not fit the 32-bit length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Errors raised while walking the items of a TAG packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    /// Fewer than eight bytes remain where an item header should start.
    #[error("truncated tag header at offset {offset} ({available} bytes left)")]
    TruncatedHeader { offset: usize, available: usize },

    /// The declared bit length runs past the end of the packet.
    #[error("tag {tag} at offset {offset} needs {needed} value bytes, {available} available")]
    ValueOverrun {
        tag: String,
        offset: usize,
        needed: u64,
        available: usize,
    },

    /// A `*ptr` item shorter than protocol name plus revision.
    #[error("*ptr value too short ({len} bytes, need 8)")]
    MalformedPointer { len: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
