// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Writer history cache.
//!
//! Owned by exactly one writer. Stores serialized samples by writer-local
//! sequence number with a secondary per-key index, lends them out through
//! reference-counted borrows for retransmission, and evicts on
//! acknowledgment. A borrowed sample is never freed in place: eviction
//! marks it deferred and the entry disappears when the last borrow is
//! returned.
//!
//! History policy governs eviction: keep-all drops samples only once acked
//! (up to the caller's `max_drop_seq`), keep-last(depth) additionally drops
//! the oldest same-key samples on insert to honour the per-key depth bound.
//! Resource limits make `insert` block up to the reliability
//! max-blocking-time, then time out.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::core::serdata::Serdata;
use crate::core::types::{InstanceHandle, KeyHash, SequenceNumber};
use crate::qos::policy::{History, ResourceLimits, LENGTH_UNLIMITED};
use crate::retcode::{ReturnCode, Result};
use crate::time::{Duration, Time};

/// Aggregate cache state reported to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WhcState {
    /// Smallest live sequence number, 0 when empty.
    pub min_seq: SequenceNumber,
    /// Largest live sequence number, 0 when empty.
    pub max_seq: SequenceNumber,
    /// Bytes held for samples not yet acknowledged.
    pub unacked_bytes: usize,
}

/// A sample lent out of the cache. Must be given back via
/// [`WriterHistoryCache::return_sample`].
#[derive(Debug)]
pub struct BorrowedSample {
    pub seq: SequenceNumber,
    pub serdata: Arc<Serdata>,
    pub instance: InstanceHandle,
    /// Times this sample has been retransmitted.
    pub rexmit_count: u32,
    pub expire_at: Time,
}

/// Sequence numbers whose freeing was deferred to an active borrower.
pub type DeferredFreeList = Vec<SequenceNumber>;

#[derive(Debug)]
struct WhcNode {
    serdata: Arc<Serdata>,
    instance: InstanceHandle,
    keyhash: KeyHash,
    expire_at: Time,
    borrow_count: u32,
    /// Evicted while borrowed; node disappears when the borrow returns.
    pending_free: bool,
    rexmit_count: u32,
    last_rexmit: Option<Time>,
}

#[derive(Debug, Default)]
struct WhcInner {
    by_seq: BTreeMap<SequenceNumber, WhcNode>,
    /// Live (non-deferred) sequence numbers per key, ascending.
    by_key: HashMap<KeyHash, VecDeque<SequenceNumber>>,
    /// Monotone high-water mark; survives the cache emptying.
    max_seq_ever: SequenceNumber,
    live_count: usize,
    unacked_bytes: usize,
}

impl WhcInner {
    fn live_min(&self) -> SequenceNumber {
        self.by_seq
            .iter()
            .find(|(_, n)| !n.pending_free)
            .map_or(0, |(s, _)| *s)
    }

    fn live_max(&self) -> SequenceNumber {
        self.by_seq
            .iter()
            .rev()
            .find(|(_, n)| !n.pending_free)
            .map_or(0, |(s, _)| *s)
    }

    fn state(&self) -> WhcState {
        WhcState {
            min_seq: self.live_min(),
            max_seq: self.live_max(),
            unacked_bytes: self.unacked_bytes,
        }
    }

    /// Evict one sequence number. Borrowed nodes are only marked; the
    /// caller decides whether their seq goes on a deferred list.
    fn evict(&mut self, seq: SequenceNumber) -> bool {
        let Some(node) = self.by_seq.get_mut(&seq) else {
            return false;
        };
        if node.pending_free {
            return false;
        }
        self.unacked_bytes = self.unacked_bytes.saturating_sub(node.serdata.size());
        self.live_count -= 1;
        let keyhash = node.keyhash;
        if let Some(seqs) = self.by_key.get_mut(&keyhash) {
            seqs.retain(|s| *s != seq);
            if seqs.is_empty() {
                self.by_key.remove(&keyhash);
            }
        }
        if node.borrow_count > 0 {
            node.pending_free = true;
            true
        } else {
            self.by_seq.remove(&seq);
            false
        }
    }
}

/// Per-writer history cache.
#[derive(Debug)]
pub struct WriterHistoryCache {
    inner: Mutex<WhcInner>,
    space: Condvar,
    history: History,
    limits: ResourceLimits,
    max_blocking_time: Duration,
}

impl WriterHistoryCache {
    #[must_use]
    pub fn new(history: History, limits: ResourceLimits, max_blocking_time: Duration) -> Self {
        WriterHistoryCache {
            inner: Mutex::new(WhcInner::default()),
            space: Condvar::new(),
            history,
            limits,
            max_blocking_time,
        }
    }

    /// Add a sample at a fresh sequence number.
    ///
    /// Rejects non-monotone sequence numbers with `PreconditionNotMet`.
    /// When resource limits are hit the call blocks up to the configured
    /// max-blocking-time, then returns `Timeout`.
    pub fn insert(
        &self,
        max_drop_seq: SequenceNumber,
        seq: SequenceNumber,
        expire_at: Time,
        serdata: Arc<Serdata>,
        instance: InstanceHandle,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        if seq <= inner.max_seq_ever {
            return Err(ReturnCode::PreconditionNotMet);
        }

        let keyhash = serdata.keyhash;

        // Keep-last evicts the oldest same-key samples to honour depth,
        // independent of acknowledgment state.
        if let History::KeepLast(depth) = self.history {
            let depth = depth.max(1) as usize;
            loop {
                let oldest = inner
                    .by_key
                    .get(&keyhash)
                    .filter(|seqs| seqs.len() >= depth)
                    .and_then(|seqs| seqs.front().copied());
                match oldest {
                    Some(s) => {
                        inner.evict(s);
                    }
                    None => break,
                }
            }
        }

        // Resource limits; `max_drop_seq` is not consulted here, the limit
        // applies to what is actually held.
        let deadline = self.max_blocking_time.to_std().map(|d| Instant::now() + d);
        while self.over_limits(&inner, &keyhash) {
            if self.max_blocking_time == Duration::ZERO {
                return Err(ReturnCode::Timeout);
            }
            match deadline {
                None => self.space.wait(&mut inner),
                Some(deadline) => {
                    if self.space.wait_until(&mut inner, deadline).timed_out()
                        && self.over_limits(&inner, &keyhash)
                    {
                        return Err(ReturnCode::Timeout);
                    }
                }
            }
        }
        let _ = max_drop_seq;

        inner.unacked_bytes += serdata.size();
        inner.live_count += 1;
        inner.max_seq_ever = seq;
        inner.by_key.entry(keyhash).or_default().push_back(seq);
        inner.by_seq.insert(
            seq,
            WhcNode {
                serdata,
                instance,
                keyhash,
                expire_at,
                borrow_count: 0,
                pending_free: false,
                rexmit_count: 0,
                last_rexmit: None,
            },
        );
        Ok(())
    }

    fn over_limits(&self, inner: &WhcInner, keyhash: &KeyHash) -> bool {
        if self.limits.max_samples != LENGTH_UNLIMITED
            && inner.live_count >= self.limits.max_samples as usize
        {
            return true;
        }
        if self.limits.max_instances != LENGTH_UNLIMITED
            && !inner.by_key.contains_key(keyhash)
            && inner.by_key.len() >= self.limits.max_instances as usize
        {
            return true;
        }
        if self.limits.max_samples_per_instance != LENGTH_UNLIMITED {
            let count = inner.by_key.get(keyhash).map_or(0, VecDeque::len);
            if count >= self.limits.max_samples_per_instance as usize {
                return true;
            }
        }
        false
    }

    /// Smallest stored live sequence number greater than `seq`, or `None`.
    #[must_use]
    pub fn next_seq(&self, seq: SequenceNumber) -> Option<SequenceNumber> {
        let inner = self.inner.lock();
        inner
            .by_seq
            .range(seq.saturating_add(1)..)
            .find(|(_, n)| !n.pending_free)
            .map(|(s, _)| *s)
    }

    /// Lend out the sample at `seq`. Deferred-free entries stay borrowable
    /// until their outstanding borrow is returned.
    #[must_use]
    pub fn borrow_sample(&self, seq: SequenceNumber) -> Option<BorrowedSample> {
        let mut inner = self.inner.lock();
        let node = inner.by_seq.get_mut(&seq)?;
        node.borrow_count += 1;
        Some(BorrowedSample {
            seq,
            serdata: Arc::clone(&node.serdata),
            instance: node.instance,
            rexmit_count: node.rexmit_count,
            expire_at: node.expire_at,
        })
    }

    /// Lend out the most recent live sample of the key.
    #[must_use]
    pub fn borrow_sample_key(&self, keyhash: &KeyHash) -> Option<BorrowedSample> {
        let seq = {
            let inner = self.inner.lock();
            inner.by_key.get(keyhash).and_then(|s| s.back().copied())?
        };
        self.borrow_sample(seq)
    }

    /// Give back a borrow, optionally recording a retransmission.
    pub fn return_sample(&self, borrow: BorrowedSample, update_retransmit_info: bool) {
        let mut inner = self.inner.lock();
        let remove = match inner.by_seq.get_mut(&borrow.seq) {
            Some(node) => {
                node.borrow_count = node.borrow_count.saturating_sub(1);
                if update_retransmit_info {
                    node.rexmit_count += 1;
                    node.last_rexmit = Some(crate::time::now());
                }
                node.pending_free && node.borrow_count == 0
            }
            None => false,
        };
        if remove {
            inner.by_seq.remove(&borrow.seq);
            drop(inner);
            self.space.notify_all();
        }
    }

    /// Drop every sample with `seq <= max_drop_seq`. Returns the number of
    /// samples evicted and the deferred-free list of entries still borrowed.
    pub fn remove_acked_messages(
        &self,
        max_drop_seq: SequenceNumber,
        state_out: &mut WhcState,
    ) -> (usize, DeferredFreeList) {
        let mut inner = self.inner.lock();
        let doomed: Vec<SequenceNumber> = inner
            .by_seq
            .range(..=max_drop_seq)
            .filter(|(_, n)| !n.pending_free)
            .map(|(s, _)| *s)
            .collect();
        let mut deferred = Vec::new();
        for seq in &doomed {
            if inner.evict(*seq) {
                deferred.push(*seq);
            }
        }
        *state_out = inner.state();
        drop(inner);
        if !doomed.is_empty() {
            self.space.notify_all();
        }
        (doomed.len(), deferred)
    }

    /// Release deferred entries whose borrows have already been returned.
    /// Entries still borrowed disappear when their borrow is returned.
    pub fn free_deferred_free_list(&self, deferred: DeferredFreeList) {
        let mut inner = self.inner.lock();
        for seq in deferred {
            let remove = inner
                .by_seq
                .get(&seq)
                .is_some_and(|n| n.pending_free && n.borrow_count == 0);
            if remove {
                inner.by_seq.remove(&seq);
            }
        }
    }

    /// Drop live samples whose lifespan expired at `now`. Borrow-safe like
    /// acknowledgment eviction.
    pub fn remove_expired(&self, now: Time) -> usize {
        let mut inner = self.inner.lock();
        let doomed: Vec<SequenceNumber> = inner
            .by_seq
            .iter()
            .filter(|(_, n)| !n.pending_free && n.expire_at <= now)
            .map(|(s, _)| *s)
            .collect();
        for seq in &doomed {
            inner.evict(*seq);
        }
        let n = doomed.len();
        drop(inner);
        if n > 0 {
            self.space.notify_all();
        }
        n
    }

    pub fn get_state(&self, state_out: &mut WhcState) {
        *state_out = self.inner.lock().state();
    }

    /// Start a non-destructive scan in sequence order.
    #[must_use]
    pub fn sample_iter_init(&self) -> WhcSampleIter<'_> {
        WhcSampleIter { whc: self, last: 0 }
    }
}

/// Borrow-returning iterator over live samples in sequence order.
pub struct WhcSampleIter<'a> {
    whc: &'a WriterHistoryCache,
    last: SequenceNumber,
}

impl WhcSampleIter<'_> {
    /// Borrow the next sample; the caller must return it.
    #[must_use]
    pub fn borrow_next(&mut self) -> Option<BorrowedSample> {
        let seq = self.whc.next_seq(self.last)?;
        self.last = seq;
        self.whc.borrow_sample(seq)
    }
}
