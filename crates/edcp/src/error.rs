use edcp_frame::FrameError;
use edcp_pft::PftError;

/// Errors that stop a datagram from yielding an AF frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// PFT layer error.
    #[error("PFT error: {0}")]
    Pft(#[from] PftError),

    /// AF layer error.
    #[error("AF error: {0}")]
    Frame(#[from] FrameError),
}

/// Errors raised by a payload or protocol handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{handler}: {message}")]
pub struct HandlerError {
    pub handler: String,
    pub message: String,
}

impl HandlerError {
    pub fn new(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while registering handlers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The payload type is decoded by the library itself.
    #[error("payload type {0:#04x} is reserved")]
    ReservedPayloadType(u8),
}
