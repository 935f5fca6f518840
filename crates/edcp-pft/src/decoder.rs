use bytes::Bytes;
use edcp_fec::{correct, deinterleave_into, ErasureDecoder, FecError, FecLayout, Rs255};
use tracing::{debug, warn};

use crate::error::{PftError, Result};
use crate::header::{parse_pft, FecParams, PftHeader};
use crate::store::{
    Abandoned, AbandonReason, ReassemblyKey, ReassemblyOutcome, ReassemblyStore,
    StoreConfig,
};

/// What to do with a message after a failed FEC attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FecRetryPolicy {
    /// Keep the fragments and try again when another one arrives.
    #[default]
    RetryOnNewFragment,
    /// Drop the message and ignore its remaining fragments.
    FailPermanently,
}

/// Configuration for a [`PftDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PftConfig {
    pub store: StoreConfig,
    pub fec_retry: FecRetryPolicy,
    /// Largest FEC block (`fragment count * fragment length`) accepted.
    pub max_message_bytes: usize,
    /// Attempt correction before every fragment has arrived.
    pub fec_with_gaps: bool,
}

impl Default for PftConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            fec_retry: FecRetryPolicy::default(),
            max_message_bytes: 16 * 1024 * 1024,
            fec_with_gaps: true,
        }
    }
}

/// Details of a Reed-Solomon recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FecReport {
    pub params: FecParams,
    /// `c_max`: codewords in the block.
    pub codewords: usize,
    /// `rx_min`: fragments needed to attempt correction.
    pub min_fragments: usize,
    /// Fragments that were actually received.
    pub received: usize,
    /// Missing fragments replaced by zero filler.
    pub placeholders: usize,
    /// Symbols the decoder changed.
    pub corrected_symbols: usize,
}

/// Result of feeding one fragment to the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PftOutcome {
    /// A single-fragment message: the payload is the AF frame.
    Unfragmented(Bytes),
    /// Stored; `needed` fragments are required before anything can happen.
    Incomplete { received: usize, needed: usize },
    /// A reconstructed AF frame.
    Delivered { frame: Bytes, fec: Option<FecReport> },
    /// A duplicate, or a straggler of a message that already finished.
    Duplicate,
    /// The message could not be delivered (yet).
    ///
    /// `aborted` is false when the fragments are kept for another attempt.
    Failed { reason: PftError, aborted: bool },
}

/// A decoded fragment and what it led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PftReport {
    pub header: PftHeader,
    /// Bytes after the header.
    pub payload_len: usize,
    pub outcome: PftOutcome,
}

impl PftReport {
    /// The reconstructed AF frame, if this fragment produced one.
    pub fn frame(&self) -> Option<&Bytes> {
        match &self.outcome {
            PftOutcome::Unfragmented(frame) | PftOutcome::Delivered { frame, .. } => Some(frame),
            _ => None,
        }
    }
}

/// Why a message left in flight could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Undelivered {
    pub key: ReassemblyKey,
    pub reason: AbandonReason,
    pub error: PftError,
}

/// Working buffers for FEC attempts, reused across calls.
#[derive(Debug, Default)]
struct Scratch {
    matrix: Vec<u8>,
    deinterleaved: Vec<u8>,
    missing: Vec<bool>,
    corrected: Vec<u8>,
}

/// Per-message FEC bookkeeping the store does not keep.
#[derive(Debug, Clone, Copy)]
struct FecState {
    key: ReassemblyKey,
    layout: FecLayout,
}

/// Turns PFT fragments of one stream back into AF frames.
///
/// The decoder owns its reassembly store. Use one decoder per stream.
#[derive(Debug)]
pub struct PftDecoder<D = Rs255> {
    config: PftConfig,
    store: ReassemblyStore,
    decoder: D,
    scratch: Scratch,
    fec_layouts: Vec<FecState>,
}

impl PftDecoder<Rs255> {
    /// A decoder using the built-in RS(255, 207) codec.
    pub fn new(config: PftConfig) -> Self {
        Self::with_decoder(config, Rs255::new())
    }
}

impl Default for PftDecoder<Rs255> {
    fn default() -> Self {
        Self::new(PftConfig::default())
    }
}

impl<D: ErasureDecoder> PftDecoder<D> {
    /// A decoder using an injected erasure decoder.
    pub fn with_decoder(config: PftConfig, decoder: D) -> Self {
        Self {
            store: ReassemblyStore::new(config.store),
            config,
            decoder,
            scratch: Scratch::default(),
            fec_layouts: Vec::new(),
        }
    }

    pub fn config(&self) -> &PftConfig {
        &self.config
    }

    pub fn store(&self) -> &ReassemblyStore {
        &self.store
    }

    /// Decode one PFT datagram.
    ///
    /// Only an unparseable header is an error. Everything that goes wrong
    /// with the message it belongs to is reported in the outcome.
    pub fn push(&mut self, datagram: Bytes) -> Result<PftReport> {
        let fragment = parse_pft(datagram)?;
        let header = fragment.header;
        let payload_len = fragment.payload.len();

        if !header.hcrc_ok {
            warn!(sequence = header.sequence, index = header.index, "PFT header CRC mismatch");
        }
        if !fragment.length_matches() {
            debug!(
                sequence = header.sequence,
                declared = header.declared_len,
                actual = payload_len,
                "PFT payload length mismatch"
            );
        }

        let outcome = if header.count <= 1 {
            PftOutcome::Unfragmented(fragment.payload)
        } else {
            self.reassemble(&header, fragment.payload)
        };

        Ok(PftReport {
            header,
            payload_len,
            outcome,
        })
    }

    /// Give up on everything in flight and say why each message failed.
    pub fn drain(&mut self) -> Vec<Undelivered> {
        let abandoned = self.store.drain();
        let layouts = std::mem::take(&mut self.fec_layouts);
        abandoned
            .into_iter()
            .map(|a| {
                let needed = layouts
                    .iter()
                    .find(|s| s.key == a.key)
                    .map_or(a.total, |s| s.layout.min_fragments());
                Undelivered {
                    key: a.key,
                    reason: a.reason,
                    error: PftError::InsufficientFragments {
                        received: a.received,
                        needed,
                    },
                }
            })
            .collect()
    }

    /// Messages the store evicted or restarted since the last call.
    pub fn take_abandoned(&mut self) -> Vec<Abandoned> {
        let abandoned = self.store.take_abandoned();
        for a in &abandoned {
            self.forget_layout(&a.key);
        }
        abandoned
    }

    fn reassemble(&mut self, header: &PftHeader, payload: Bytes) -> PftOutcome {
        let key = ReassemblyKey {
            sequence: header.sequence,
            address: header.address,
        };
        let index = header.index as usize;
        let total = header.count as usize;

        if self.store.finished_state(&key).is_none() {
            let same_message = self
                .store
                .message(&key)
                .is_some_and(|message| message.total() == total);
            let protected = self.fec_layouts.iter().any(|s| s.key == key);
            if same_message && protected != header.fec.is_some() {
                return self.fail(key, PftError::FecFlagMismatch { index }, true);
            }
            if !same_message && header.fec.is_none() {
                self.forget_layout(&key);
            }
        }

        let layout = match header.fec {
            Some(params) if self.store.finished_state(&key).is_none() => {
                match self.layout_for(key, params, index, payload.len(), total) {
                    Ok(layout) => Some(layout),
                    Err(reason) => return self.fail(key, reason, true),
                }
            }
            _ => None,
        };

        let outcome = match self
            .store
            .add_fragment(key, index, total, header.is_last(), payload)
        {
            Ok(outcome) => outcome,
            Err(err) => {
                let aborted = err.aborts_message();
                warn!(sequence = key.sequence, index, %err, "fragment rejected");
                if aborted {
                    self.forget_layout(&key);
                }
                return PftOutcome::Failed {
                    reason: err.into(),
                    aborted,
                };
            }
        };

        match (outcome, layout) {
            (ReassemblyOutcome::DuplicateIgnored, _) => PftOutcome::Duplicate,
            (ReassemblyOutcome::Complete(frame), None) => {
                debug!(sequence = key.sequence, len = frame.len(), "message reassembled");
                PftOutcome::Delivered { frame, fec: None }
            }
            (ReassemblyOutcome::Complete(block), Some(layout)) => {
                self.forget_layout(&key);
                self.correct_complete(key, header, layout, &block)
            }
            (ReassemblyOutcome::Incomplete { received, total }, None) => PftOutcome::Incomplete {
                received,
                needed: total,
            },
            (ReassemblyOutcome::Incomplete { received, .. }, Some(layout)) => {
                let needed = layout.min_fragments();
                if self.config.fec_with_gaps && received >= needed {
                    self.correct_with_gaps(key, header, layout)
                } else {
                    PftOutcome::Incomplete { received, needed }
                }
            }
        }
    }

    /// Validate the FEC geometry and pin it to the message.
    fn layout_for(
        &mut self,
        key: ReassemblyKey,
        params: FecParams,
        index: usize,
        fragment_len: usize,
        total: usize,
    ) -> std::result::Result<FecLayout, PftError> {
        if let Some(state) = self.fec_layouts.iter().find(|s| s.key == key) {
            if state.layout.fragment_count() == total {
                if state.layout.fragment_len() != fragment_len {
                    return Err(PftError::FragmentLength {
                        index,
                        expected: state.layout.fragment_len(),
                        actual: fragment_len,
                    });
                }
                return Ok(state.layout);
            }
        }

        let size = fragment_len.saturating_mul(total);
        if size > self.config.max_message_bytes {
            return Err(PftError::MessageTooLarge {
                size,
                max: self.config.max_message_bytes,
            });
        }
        let layout = FecLayout::new(fragment_len, total, usize::from(params.rs_k))?;
        if layout.codeword_count() == 0 {
            return Err(FecError::InvalidParameters(format!(
                "{size} bytes hold no complete codeword"
            ))
            .into());
        }

        let store = &self.store;
        self.fec_layouts
            .retain(|s| s.key != key && store.message(&s.key).is_some());
        self.fec_layouts.push(FecState { key, layout });
        Ok(layout)
    }

    fn forget_layout(&mut self, key: &ReassemblyKey) {
        self.fec_layouts.retain(|s| &s.key != key);
    }

    fn correct_complete(
        &mut self,
        key: ReassemblyKey,
        header: &PftHeader,
        layout: FecLayout,
        block: &[u8],
    ) -> PftOutcome {
        self.scratch.missing.clear();
        let received = layout.fragment_count();
        match self.run_correction(&layout, block, 0) {
            Ok(corrected) => self.delivered(header, layout, received, 0, corrected),
            Err(reason) => {
                // The store already released the fragments.
                self.store.mark_failed(key);
                warn!(sequence = key.sequence, %reason, "complete FEC message uncorrectable");
                PftOutcome::Failed {
                    reason,
                    aborted: true,
                }
            }
        }
    }

    /// Try to recover a message with fragments still missing.
    ///
    /// Missing fragments are zero filled in scratch memory and passed to the
    /// decoder as erasures. The store is not touched unless this succeeds.
    fn correct_with_gaps(
        &mut self,
        key: ReassemblyKey,
        header: &PftHeader,
        layout: FecLayout,
    ) -> PftOutcome {
        let Some(message) = self.store.message(&key) else {
            return PftOutcome::Duplicate;
        };
        let fragment_len = layout.fragment_len();
        let count = layout.fragment_count();

        let scratch = &mut self.scratch;
        scratch.matrix.clear();
        scratch.matrix.resize(layout.total_len(), 0);
        scratch.missing.clear();
        scratch.missing.resize(count, true);

        let mut bad_length = None;
        for (index, bytes) in message.fragments() {
            if bytes.len() != fragment_len {
                bad_length = Some(PftError::FragmentLength {
                    index,
                    expected: fragment_len,
                    actual: bytes.len(),
                });
                break;
            }
            scratch.matrix[index * fragment_len..(index + 1) * fragment_len].copy_from_slice(bytes);
            scratch.missing[index] = false;
        }
        let received = message.received();
        if let Some(reason) = bad_length {
            return self.fail(key, reason, true);
        }

        let placeholders = count - received;
        debug!(
            sequence = key.sequence,
            received,
            placeholders,
            "attempting FEC with missing fragments"
        );

        let matrix = std::mem::take(&mut self.scratch.matrix);
        let result = self.run_correction(&layout, &matrix, placeholders);
        self.scratch.matrix = matrix;

        match result {
            Ok(corrected) => {
                self.store.mark_delivered(key);
                self.forget_layout(&key);
                self.delivered(header, layout, received, placeholders, corrected)
            }
            Err(reason) => {
                let aborted = self.config.fec_retry == FecRetryPolicy::FailPermanently;
                warn!(sequence = key.sequence, %reason, aborted, "FEC attempt failed");
                if aborted {
                    self.store.mark_failed(key);
                    self.forget_layout(&key);
                }
                PftOutcome::Failed { reason, aborted }
            }
        }
    }

    /// Deinterleave `matrix` and correct it. `scratch.missing` must be set up.
    fn run_correction(
        &mut self,
        layout: &FecLayout,
        matrix: &[u8],
        placeholders: usize,
    ) -> std::result::Result<usize, PftError> {
        let scratch = &mut self.scratch;
        deinterleave_into(
            matrix,
            layout.fragment_len(),
            layout.fragment_count(),
            &mut scratch.deinterleaved,
        )?;
        let missing: &[bool] = if placeholders == 0 { &[] } else { &scratch.missing };
        let summary = correct(
            &self.decoder,
            layout,
            &scratch.deinterleaved,
            missing,
            &mut scratch.corrected,
        )?;
        Ok(summary.corrected_symbols)
    }

    fn delivered(
        &mut self,
        header: &PftHeader,
        layout: FecLayout,
        received: usize,
        placeholders: usize,
        corrected_symbols: usize,
    ) -> PftOutcome {
        let mut frame = std::mem::take(&mut self.scratch.corrected);
        frame.resize(layout.total_len(), 0);
        debug!(
            sequence = header.sequence,
            len = frame.len(),
            corrected_symbols,
            "message recovered through FEC"
        );
        let fec = header.fec.map(|params| FecReport {
            params,
            codewords: layout.codeword_count(),
            min_fragments: layout.min_fragments(),
            received,
            placeholders,
            corrected_symbols,
        });
        PftOutcome::Delivered {
            frame: Bytes::from(frame),
            fec,
        }
    }

    fn fail(&mut self, key: ReassemblyKey, reason: PftError, aborted: bool) -> PftOutcome {
        warn!(sequence = key.sequence, %reason, "aborting message");
        if aborted {
            self.store.mark_failed(key);
            self.forget_layout(&key);
        }
        PftOutcome::Failed { reason, aborted }
    }
}
