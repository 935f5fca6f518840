//! Caller-owned handlers for payloads the library does not decode itself.
//!
//! Two extension points exist: AF payload types other than `'T'`, and the
//! protocol named by a TAG packet's `*ptr` item. Handlers are registered on a
//! [`HandlerRegistry`] value that is handed to the decoder at construction.

use std::collections::HashMap;

use edcp_frame::{AfFrame, PayloadType, ProtocolPointer, TagName, TagPacket, TAG};
use tracing::debug;

use crate::error::{HandlerError, RegistryError};

/// Handles AF payloads of one payload type.
pub trait PayloadHandler: Send {
    fn name(&self) -> &str;

    fn handle(&mut self, frame: &AfFrame) -> Result<(), HandlerError>;
}

/// Handles TAG packets whose `*ptr` names one protocol.
///
/// The handler sees the whole packet, not just the `*ptr` item.
pub trait ProtocolHandler: Send {
    fn name(&self) -> &str;

    fn handle(&mut self, pointer: &ProtocolPointer, packet: &TagPacket)
        -> Result<(), HandlerError>;
}

/// What a registered handler did with a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffOutcome {
    pub handler: String,
    pub result: Result<(), HandlerError>,
}

/// Payload-type and protocol handlers, keyed by their discriminator.
#[derive(Default)]
pub struct HandlerRegistry {
    payloads: HashMap<u8, Box<dyn PayloadHandler>>,
    protocols: HashMap<TagName, Box<dyn ProtocolHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut payloads: Vec<_> = self.payloads.keys().copied().collect();
        payloads.sort_unstable();
        let mut protocols: Vec<_> = self.protocols.keys().map(ToString::to_string).collect();
        protocols.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("payloads", &payloads)
            .field("protocols", &protocols)
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an AF payload type, replacing any previous one.
    ///
    /// `'T'` is decoded by the library and cannot be claimed.
    pub fn register_payload(
        &mut self,
        payload_type: u8,
        handler: Box<dyn PayloadHandler>,
    ) -> Result<(), RegistryError> {
        if payload_type == TAG {
            return Err(RegistryError::ReservedPayloadType(payload_type));
        }
        self.payloads.insert(payload_type, handler);
        Ok(())
    }

    /// Register a handler for a `*ptr` protocol name, replacing any previous one.
    pub fn register_protocol(&mut self, protocol: TagName, handler: Box<dyn ProtocolHandler>) {
        self.protocols.insert(protocol, handler);
    }

    pub fn has_payload(&self, payload_type: u8) -> bool {
        self.payloads.contains_key(&payload_type)
    }

    pub fn has_protocol(&self, protocol: &TagName) -> bool {
        self.protocols.contains_key(protocol)
    }

    /// Hand a non-TAG frame to its handler. `None` when nobody claims it.
    pub fn dispatch_payload(&mut self, frame: &AfFrame) -> Option<HandoffOutcome> {
        let PayloadType::Other(byte) = frame.header.payload_type else {
            return None;
        };
        let handler = self.payloads.get_mut(&byte)?;
        debug!(payload_type = byte, handler = handler.name(), "payload handoff");
        Some(HandoffOutcome {
            handler: handler.name().to_string(),
            result: handler.handle(frame),
        })
    }

    /// Hand a TAG packet to the handler its `*ptr` selects.
    pub fn dispatch_protocol(&mut self, packet: &TagPacket) -> Option<HandoffOutcome> {
        let pointer = packet.pointer?;
        let handler = self.protocols.get_mut(&pointer.protocol)?;
        debug!(protocol = %pointer.protocol, handler = handler.name(), "protocol handoff");
        Some(HandoffOutcome {
            handler: handler.name().to_string(),
            result: handler.handle(&pointer, packet),
        })
    }
}
