use bytes::Bytes;
use edcp_fec::{ErasureDecoder, Rs255};
use edcp_frame::{decode_af, AfFrame, PayloadType, TagError, TagPacket};
use edcp_pft::{Abandoned, PftConfig, PftDecoder, PftReport, Undelivered};
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::registry::{HandlerRegistry, HandoffOutcome};

/// Shortest datagram considered DCP.
pub const MIN_DATAGRAM_LEN: usize = 11;

/// Layer a datagram starts at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sync {
    Af,
    Pft,
}

impl Sync {
    pub fn name(self) -> &'static str {
        match self {
            Sync::Af => "AF",
            Sync::Pft => "PFT",
        }
    }
}

/// Recognise a DCP datagram by its first two bytes.
pub fn sniff(datagram: &[u8]) -> Option<Sync> {
    if datagram.len() < MIN_DATAGRAM_LEN {
        return None;
    }
    match &datagram[..2] {
        b"AF" => Some(Sync::Af),
        b"PF" => Some(Sync::Pft),
        _ => None,
    }
}

/// What became of an AF payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadReport {
    /// A TAG packet, and the handoff its `*ptr` selected.
    Tags {
        packet: TagPacket,
        handoff: Option<HandoffOutcome>,
    },
    /// A TAG packet that could not be walked.
    TagError(TagError),
    /// Another payload type, taken by a registered handler.
    Handled(HandoffOutcome),
    /// Another payload type nobody registered for.
    Undissected,
}

/// A decoded AF frame and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AfReport {
    pub frame: AfFrame,
    pub payload: PayloadReport,
}

/// Everything learned from one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeReport {
    pub sync: Sync,
    /// Present for PFT datagrams that parsed.
    pub pft: Option<PftReport>,
    /// Present when an AF frame was available and parsed.
    pub af: Option<AfReport>,
    pub error: Option<DecodeError>,
}

/// Decodes the datagrams of one DCP stream.
///
/// Owns the PFT reassembly state and the handler registry. Use one decoder
/// per stream; decoders can be moved between threads.
#[derive(Debug)]
pub struct DcpDecoder<D = Rs255> {
    pft: PftDecoder<D>,
    registry: HandlerRegistry,
}

impl DcpDecoder<Rs255> {
    pub fn new(config: PftConfig, registry: HandlerRegistry) -> Self {
        Self {
            pft: PftDecoder::new(config),
            registry,
        }
    }
}

impl<D: ErasureDecoder> DcpDecoder<D> {
    /// A decoder with an injected Reed-Solomon primitive.
    pub fn with_decoder(config: PftConfig, registry: HandlerRegistry, decoder: D) -> Self {
        Self {
            pft: PftDecoder::with_decoder(config, decoder),
            registry,
        }
    }

    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    pub fn pft(&self) -> &PftDecoder<D> {
        &self.pft
    }

    /// Decode one datagram. `None` when it is not DCP at all.
    pub fn decode(&mut self, datagram: Bytes) -> Option<DecodeReport> {
        let sync = sniff(&datagram)?;
        let mut report = DecodeReport {
            sync,
            pft: None,
            af: None,
            error: None,
        };

        let frame = match sync {
            Sync::Af => Some(datagram),
            Sync::Pft => match self.pft.push(datagram) {
                Ok(pft) => {
                    let frame = pft.frame().cloned();
                    report.pft = Some(pft);
                    frame
                }
                Err(err) => {
                    debug!(%err, "PFT datagram rejected");
                    report.error = Some(err.into());
                    None
                }
            },
        };

        if let Some(frame) = frame {
            match decode_af(frame) {
                Ok(frame) => {
                    let payload = self.dispatch(&frame);
                    report.af = Some(AfReport { frame, payload });
                }
                Err(err) => {
                    warn!(%err, "AF frame rejected");
                    report.error = Some(err.into());
                }
            }
        }

        Some(report)
    }

    /// Messages evicted from reassembly since the last call.
    pub fn take_abandoned(&mut self) -> Vec<Abandoned> {
        self.pft.take_abandoned()
    }

    /// End of stream: give up on incomplete messages.
    pub fn drain(&mut self) -> Vec<Undelivered> {
        self.pft.drain()
    }

    fn dispatch(&mut self, frame: &AfFrame) -> PayloadReport {
        match frame.header.payload_type {
            PayloadType::Tag => match TagPacket::parse(frame.payload.clone()) {
                Ok(packet) => {
                    let handoff = self.registry.dispatch_protocol(&packet);
                    PayloadReport::Tags { packet, handoff }
                }
                Err(err) => {
                    warn!(%err, sequence = frame.header.sequence, "TAG packet malformed");
                    PayloadReport::TagError(err)
                }
            },
            PayloadType::Other(_) => match self.registry.dispatch_payload(frame) {
                Some(outcome) => PayloadReport::Handled(outcome),
                None => PayloadReport::Undissected,
            },
        }
    }
}
