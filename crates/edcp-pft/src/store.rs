//! Keyed reassembly of fragmented messages.
//!
//! Fragments are held per [`ReassemblyKey`] until every index is present,
//! the decoder recovers the message through FEC, or the message is aborted
//! or evicted. Finished keys are remembered for a while so stragglers are
//! not mistaken for a new message.

use std::collections::{BTreeMap, HashMap, VecDeque};

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::error::ReassemblyError;
use crate::header::PftAddress;

/// Default cap on fragments per message: 1 MiB worth of 4-byte slots.
pub const DEFAULT_MAX_FRAGMENTS: usize = (1 << 20) / 4;

/// Budget charged per held fragment on top of its payload.
pub const FRAGMENT_OVERHEAD: usize = std::mem::size_of::<(usize, Bytes)>();

/// Identifies one message under reassembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReassemblyKey {
    pub sequence: u16,
    /// PFT addressing, when the ADDR flag is set.
    pub address: Option<PftAddress>,
}

/// Limits for a [`ReassemblyStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Largest fragment count a message may declare.
    pub max_fragments_per_message: usize,
    /// Messages held at once; the oldest is evicted to make room.
    pub max_in_flight: usize,
    /// Bytes held across all messages, counting [`FRAGMENT_OVERHEAD`] per fragment.
    pub max_buffered_bytes: usize,
    /// Finished keys remembered for duplicate detection.
    pub finished_history: usize,
    /// Abandoned messages kept for [`ReassemblyStore::take_abandoned`]; older ones are dropped.
    pub abandoned_history: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_fragments_per_message: DEFAULT_MAX_FRAGMENTS,
            max_in_flight: 64,
            max_buffered_bytes: 32 * 1024 * 1024,
            finished_history: 64,
            abandoned_history: 256,
        }
    }
}

/// Result of adding one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyOutcome {
    /// Stored; more fragments are needed.
    Incomplete { received: usize, total: usize },
    /// Every index is present: the payload in index order.
    Complete(Bytes),
    /// Already held, or the message already finished.
    DuplicateIgnored,
}

/// How a message left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finished {
    Delivered,
    Failed,
}

/// Why an in-flight message was dropped without delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// Evicted to make room for a newer message.
    Evicted,
    /// Dropped by [`ReassemblyStore::drain`].
    Drained,
    /// Replaced by a fragment declaring a different count.
    Restarted,
}

/// A message dropped before completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abandoned {
    pub key: ReassemblyKey,
    pub received: usize,
    pub total: usize,
    pub reason: AbandonReason,
}

/// Fragments received so far for one message.
#[derive(Debug, Default)]
pub struct PartialMessage {
    total: usize,
    fragments: BTreeMap<usize, Bytes>,
    bytes: usize,
    charged: usize,
}

impl PartialMessage {
    /// Declared fragment count.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Distinct fragments held.
    pub fn received(&self) -> usize {
        self.fragments.len()
    }

    /// Payload bytes held.
    pub fn buffered_bytes(&self) -> usize {
        self.bytes
    }

    pub fn fragment(&self, index: usize) -> Option<&Bytes> {
        self.fragments.get(&index)
    }

    /// Held fragments in index order.
    pub fn fragments(&self) -> impl Iterator<Item = (usize, &Bytes)> {
        self.fragments.iter().map(|(&i, b)| (i, b))
    }

    fn is_complete(&self) -> bool {
        self.fragments.len() == self.total
    }

    fn assemble(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.bytes);
        for chunk in self.fragments.values() {
            buf.extend_from_slice(chunk);
        }
        buf.freeze()
    }
}

/// In-progress and recently finished messages for one stream.
#[derive(Debug)]
pub struct ReassemblyStore {
    config: StoreConfig,
    messages: HashMap<ReassemblyKey, PartialMessage>,
    order: VecDeque<ReassemblyKey>,
    finished: VecDeque<(ReassemblyKey, Finished)>,
    abandoned: VecDeque<Abandoned>,
    buffered_bytes: usize,
}

impl Default for ReassemblyStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl ReassemblyStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            messages: HashMap::new(),
            order: VecDeque::new(),
            finished: VecDeque::new(),
            abandoned: VecDeque::new(),
            buffered_bytes: 0,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Add one fragment.
    ///
    /// A count above the per-message cap, or a fragment that would exceed
    /// the byte budget, aborts the message and returns an error. Other
    /// messages are untouched. Empty fragments of multi-fragment messages are
    /// rejected.
    pub fn add_fragment(
        &mut self,
        key: ReassemblyKey,
        index: usize,
        total: usize,
        is_last: bool,
        payload: Bytes,
    ) -> Result<ReassemblyOutcome, ReassemblyError> {
        if total > self.config.max_fragments_per_message {
            warn!(sequence = key.sequence, total, "fragment count over cap, aborting message");
            self.remove(&key);
            self.finish(key, Finished::Failed);
            return Err(ReassemblyError::TooManyFragments {
                total,
                max: self.config.max_fragments_per_message,
            });
        }
        if index >= total {
            return Err(ReassemblyError::IndexOutOfRange { index, total });
        }
        if is_last && index + 1 != total {
            return Err(ReassemblyError::InconsistentLast { index, total });
        }
        if payload.is_empty() && total > 1 {
            return Err(ReassemblyError::EmptyFragment { index });
        }
        if self.finished_state(&key).is_some() {
            debug!(sequence = key.sequence, index, "fragment of finished message");
            return Ok(ReassemblyOutcome::DuplicateIgnored);
        }

        if let Some(existing) = self.messages.get(&key) {
            if existing.total != total {
                warn!(
                    sequence = key.sequence,
                    was = existing.total,
                    now = total,
                    "fragment count changed, restarting message"
                );
                self.abandon(key, AbandonReason::Restarted);
            } else if existing.fragments.contains_key(&index) {
                debug!(sequence = key.sequence, index, "duplicate fragment");
                return Ok(ReassemblyOutcome::DuplicateIgnored);
            }
        }

        let charge = payload.len().saturating_add(FRAGMENT_OVERHEAD);
        let needed = self.buffered_bytes.saturating_add(charge);
        if needed > self.config.max_buffered_bytes {
            warn!(sequence = key.sequence, needed, "buffer limit exceeded, aborting message");
            self.remove(&key);
            self.finish(key, Finished::Failed);
            return Err(ReassemblyError::BufferLimit {
                needed,
                max: self.config.max_buffered_bytes,
            });
        }

        if !self.messages.contains_key(&key) {
            if self.config.max_in_flight == 0 {
                return Err(ReassemblyError::NoCapacity);
            }
            while self.messages.len() >= self.config.max_in_flight {
                let Some(oldest) = self.order.front().copied() else {
                    break;
                };
                warn!(sequence = oldest.sequence, "evicting oldest incomplete message");
                self.abandon(oldest, AbandonReason::Evicted);
            }
            self.order.push_back(key);
        }

        let message = self.messages.entry(key).or_insert_with(|| PartialMessage {
            total,
            ..PartialMessage::default()
        });
        message.bytes += payload.len();
        message.charged += charge;
        self.buffered_bytes += charge;
        message.fragments.insert(index, payload);
        debug!(
            sequence = key.sequence,
            index,
            received = message.fragments.len(),
            total,
            "fragment stored"
        );

        if message.is_complete() {
            let full = message.assemble();
            self.remove(&key);
            self.finish(key, Finished::Delivered);
            return Ok(ReassemblyOutcome::Complete(full));
        }

        Ok(ReassemblyOutcome::Incomplete {
            received: message.fragments.len(),
            total,
        })
    }

    /// The partial message held for `key`.
    pub fn message(&self, key: &ReassemblyKey) -> Option<&PartialMessage> {
        self.messages.get(key)
    }

    /// Whether `key` finished recently, and how.
    pub fn finished_state(&self, key: &ReassemblyKey) -> Option<Finished> {
        self.finished
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|&(_, state)| state)
    }

    /// Drop a message that was recovered outside the store.
    pub fn mark_delivered(&mut self, key: ReassemblyKey) {
        self.remove(&key);
        self.finish(key, Finished::Delivered);
    }

    /// Drop a message that can never be delivered; later fragments are ignored.
    pub fn mark_failed(&mut self, key: ReassemblyKey) {
        self.remove(&key);
        self.finish(key, Finished::Failed);
    }

    /// Abandon every in-flight message, oldest first.
    pub fn drain(&mut self) -> Vec<Abandoned> {
        let mut drained: Vec<_> = self.abandoned.drain(..).collect();
        while let Some(key) = self.order.pop_front() {
            if let Some(message) = self.messages.remove(&key) {
                drained.push(Abandoned {
                    key,
                    received: message.received(),
                    total: message.total,
                    reason: AbandonReason::Drained,
                });
            }
        }
        self.messages.clear();
        self.buffered_bytes = 0;
        drained
    }

    /// Messages evicted or restarted since the last call, oldest first.
    ///
    /// At most `abandoned_history` are kept between calls.
    pub fn take_abandoned(&mut self) -> Vec<Abandoned> {
        self.abandoned.drain(..).collect()
    }

    pub fn in_flight(&self) -> usize {
        self.messages.len()
    }

    /// Bytes charged against the budget, fragment overhead included.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    fn abandon(&mut self, key: ReassemblyKey, reason: AbandonReason) {
        let Some(message) = self.remove(&key) else {
            return;
        };
        if self.config.abandoned_history == 0 {
            return;
        }
        while self.abandoned.len() >= self.config.abandoned_history {
            self.abandoned.pop_front();
        }
        self.abandoned.push_back(Abandoned {
            key,
            received: message.received(),
            total: message.total,
            reason,
        });
    }

    fn remove(&mut self, key: &ReassemblyKey) -> Option<PartialMessage> {
        let message = self.messages.remove(key)?;
        self.order.retain(|k| k != key);
        self.buffered_bytes = self.buffered_bytes.saturating_sub(message.charged);
        Some(message)
    }

    fn finish(&mut self, key: ReassemblyKey, state: Finished) {
        if self.config.finished_history == 0 {
            return;
        }
        while self.finished.len() >= self.config.finished_history {
            self.finished.pop_front();
        }
        self.finished.push_back((key, state));
    }
}
