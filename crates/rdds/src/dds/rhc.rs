// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Reader history cache.
//!
//! Holds received samples grouped by instance, tracks sample/view/instance
//! state and generation counts, and implements the read/take access
//! semantics: `read` marks samples READ, `take` removes them; both fill at
//! most `max_samples` entries filtered by a combined state mask and an
//! optional specific instance.
//!
//! Instance lifecycle: a dispose moves the instance to NOT_ALIVE_DISPOSED
//! and bumps its disposed generation; loss of its last writer moves it to
//! NOT_ALIVE_NO_WRITERS and bumps the no-writers generation; a new write
//! revives it. Samples snapshot the instance state and generations at
//! arrival.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::serdata::Serdata;
use crate::core::types::{Guid, InstanceHandle};
use crate::qos::policy::{DestinationOrderKind, History, ResourceLimits, LENGTH_UNLIMITED};
use crate::time::Time;

// Sample state.
pub const READ_SAMPLE_STATE: u32 = 1 << 0;
pub const NOT_READ_SAMPLE_STATE: u32 = 1 << 1;
pub const ANY_SAMPLE_STATE: u32 = READ_SAMPLE_STATE | NOT_READ_SAMPLE_STATE;

// View state.
pub const NEW_VIEW_STATE: u32 = 1 << 2;
pub const NOT_NEW_VIEW_STATE: u32 = 1 << 3;
pub const ANY_VIEW_STATE: u32 = NEW_VIEW_STATE | NOT_NEW_VIEW_STATE;

// Instance state.
pub const ALIVE_INSTANCE_STATE: u32 = 1 << 4;
pub const NOT_ALIVE_DISPOSED_INSTANCE_STATE: u32 = 1 << 5;
pub const NOT_ALIVE_NO_WRITERS_INSTANCE_STATE: u32 = 1 << 6;
pub const ANY_INSTANCE_STATE: u32 = ALIVE_INSTANCE_STATE
    | NOT_ALIVE_DISPOSED_INSTANCE_STATE
    | NOT_ALIVE_NO_WRITERS_INSTANCE_STATE;

/// Every state bit: the default read/take filter.
pub const ANY_STATE: u32 = ANY_SAMPLE_STATE | ANY_VIEW_STATE | ANY_INSTANCE_STATE;

/// Per-sample metadata delivered alongside the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    pub valid_data: bool,
    pub sample_state: u32,
    pub view_state: u32,
    pub instance_state: u32,
    pub source_timestamp: Time,
    pub instance_handle: InstanceHandle,
    /// Instance handle of the writer that produced the sample.
    pub publication_handle: InstanceHandle,
    pub disposed_generation_count: u32,
    pub no_writers_generation_count: u32,
    pub sample_rank: u32,
    pub generation_rank: u32,
    pub absolute_generation_rank: u32,
}

impl Default for SampleInfo {
    fn default() -> Self {
        SampleInfo {
            valid_data: false,
            sample_state: NOT_READ_SAMPLE_STATE,
            view_state: NEW_VIEW_STATE,
            instance_state: ALIVE_INSTANCE_STATE,
            source_timestamp: Time::ZERO,
            instance_handle: InstanceHandle::NIL,
            publication_handle: InstanceHandle::NIL,
            disposed_generation_count: 0,
            no_writers_generation_count: 0,
            sample_rank: 0,
            generation_rank: 0,
            absolute_generation_rank: 0,
        }
    }
}

/// Why a sample could not be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RhcStoreResult {
    Stored,
    RejectedBySamplesLimit,
    RejectedByInstancesLimit,
    RejectedBySamplesPerInstanceLimit,
}

#[derive(Debug)]
struct RhcSample {
    serdata: Arc<Serdata>,
    read: bool,
    valid: bool,
    instance_state: u32,
    disposed_generation: u32,
    no_writers_generation: u32,
    source_timestamp: Time,
    publication_handle: InstanceHandle,
}

#[derive(Debug)]
struct RhcInstance {
    handle: InstanceHandle,
    state: u32,
    is_new: bool,
    disposed_generation: u32,
    no_writers_generation: u32,
    samples: VecDeque<RhcSample>,
    writers: HashSet<Guid>,
}

#[derive(Debug, Default)]
struct RhcInner {
    instances: BTreeMap<InstanceHandle, RhcInstance>,
    total_samples: usize,
}

/// One reader's history.
#[derive(Debug)]
pub struct ReaderHistoryCache {
    inner: Mutex<RhcInner>,
    history: History,
    limits: ResourceLimits,
    destination_order: DestinationOrderKind,
}

/// One entry produced by read/take.
#[derive(Debug)]
pub struct RhcEntry {
    pub serdata: Arc<Serdata>,
    pub info: SampleInfo,
}

impl ReaderHistoryCache {
    #[must_use]
    pub fn new(
        history: History,
        limits: ResourceLimits,
        destination_order: DestinationOrderKind,
    ) -> Self {
        ReaderHistoryCache {
            inner: Mutex::new(RhcInner::default()),
            history,
            limits,
            destination_order,
        }
    }

    /// Store an incoming serdata under its instance.
    pub fn store(
        &self,
        serdata: Arc<Serdata>,
        instance_handle: InstanceHandle,
        publication_handle: InstanceHandle,
        writer: Guid,
    ) -> RhcStoreResult {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if !inner.instances.contains_key(&instance_handle) {
            if self.limits.max_instances != LENGTH_UNLIMITED
                && inner.instances.len() >= self.limits.max_instances as usize
            {
                return RhcStoreResult::RejectedByInstancesLimit;
            }
            inner.instances.insert(
                instance_handle,
                RhcInstance {
                    handle: instance_handle,
                    state: ALIVE_INSTANCE_STATE,
                    is_new: true,
                    disposed_generation: 0,
                    no_writers_generation: 0,
                    samples: VecDeque::new(),
                    writers: HashSet::new(),
                },
            );
        }

        let total_samples = inner.total_samples;
        let mut dropped = 0usize;
        let instance = inner
            .instances
            .get_mut(&instance_handle)
            .expect("instance inserted above");

        let is_dispose = serdata.is_dispose();
        let is_unregister = serdata.is_unregister();
        let valid = !is_dispose && !is_unregister;

        if valid {
            // Revival from a not-alive state.
            if instance.state != ALIVE_INSTANCE_STATE {
                instance.state = ALIVE_INSTANCE_STATE;
                instance.is_new = true;
            }
            instance.writers.insert(writer);
        } else if is_dispose {
            instance.state = NOT_ALIVE_DISPOSED_INSTANCE_STATE;
            instance.disposed_generation += 1;
        } else {
            instance.writers.remove(&writer);
            if instance.writers.is_empty() && instance.state == ALIVE_INSTANCE_STATE {
                instance.state = NOT_ALIVE_NO_WRITERS_INSTANCE_STATE;
                instance.no_writers_generation += 1;
            }
        }

        // History bound per instance: the depth counts data samples, so a
        // dispose/unregister notification never evicts the data it follows.
        if let History::KeepLast(depth) = self.history {
            if valid {
                let mut valid_count = instance.samples.iter().filter(|s| s.valid).count();
                while valid_count >= depth.max(1) as usize {
                    match instance.samples.iter().position(|s| s.valid) {
                        Some(oldest) => {
                            instance.samples.remove(oldest);
                            dropped += 1;
                            valid_count -= 1;
                        }
                        None => break,
                    }
                }
            }
        } else {
            if self.limits.max_samples != LENGTH_UNLIMITED
                && total_samples >= self.limits.max_samples as usize
            {
                return RhcStoreResult::RejectedBySamplesLimit;
            }
            if self.limits.max_samples_per_instance != LENGTH_UNLIMITED
                && instance.samples.len() >= self.limits.max_samples_per_instance as usize
            {
                return RhcStoreResult::RejectedBySamplesPerInstanceLimit;
            }
        }

        let sample = RhcSample {
            read: false,
            valid,
            instance_state: instance.state,
            disposed_generation: instance.disposed_generation,
            no_writers_generation: instance.no_writers_generation,
            source_timestamp: serdata.source_timestamp,
            publication_handle,
            serdata,
        };

        // By-source ordering inserts by timestamp; by-reception appends.
        let at = match self.destination_order {
            DestinationOrderKind::ByReceptionTimestamp => instance.samples.len(),
            DestinationOrderKind::BySourceTimestamp => instance
                .samples
                .iter()
                .position(|s| s.source_timestamp > sample.source_timestamp)
                .unwrap_or(instance.samples.len()),
        };
        instance.samples.insert(at, sample);
        inner.total_samples = inner.total_samples + 1 - dropped;
        RhcStoreResult::Stored
    }

    /// A writer went away; instances it was writing may lose liveliness.
    pub fn remove_writer(&self, writer: &Guid) -> Vec<InstanceHandle> {
        let mut inner = self.inner.lock();
        let mut transitioned = Vec::new();
        for instance in inner.instances.values_mut() {
            if instance.writers.remove(writer)
                && instance.writers.is_empty()
                && instance.state == ALIVE_INSTANCE_STATE
            {
                instance.state = NOT_ALIVE_NO_WRITERS_INSTANCE_STATE;
                instance.no_writers_generation += 1;
                transitioned.push(instance.handle);
            }
        }
        transitioned
    }

    fn sample_matches(mask: u32, instance: &RhcInstance, sample: &RhcSample) -> bool {
        let sample_bit = if sample.read {
            READ_SAMPLE_STATE
        } else {
            NOT_READ_SAMPLE_STATE
        };
        let view_bit = if instance.is_new {
            NEW_VIEW_STATE
        } else {
            NOT_NEW_VIEW_STATE
        };
        mask & sample_bit != 0 && mask & view_bit != 0 && mask & sample.instance_state != 0
    }

    /// Normalize a caller mask: missing groups default to "any".
    fn effective_mask(mask: u32) -> u32 {
        let mut m = mask & ANY_STATE;
        if m & ANY_SAMPLE_STATE == 0 {
            m |= ANY_SAMPLE_STATE;
        }
        if m & ANY_VIEW_STATE == 0 {
            m |= ANY_VIEW_STATE;
        }
        if m & ANY_INSTANCE_STATE == 0 {
            m |= ANY_INSTANCE_STATE;
        }
        m
    }

    /// Shared read/take walk.
    fn access(
        &self,
        max_samples: usize,
        mask: u32,
        specific: Option<InstanceHandle>,
        take: bool,
    ) -> Vec<RhcEntry> {
        let mask = Self::effective_mask(mask);
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let mut out: Vec<RhcEntry> = Vec::new();
        let mut touched_instances: Vec<InstanceHandle> = Vec::new();
        let mut removed = 0usize;

        let handles: Vec<InstanceHandle> = match specific {
            Some(h) => inner.instances.contains_key(&h).then_some(h).into_iter().collect(),
            None => inner.instances.keys().copied().collect(),
        };

        for handle in handles {
            if out.len() >= max_samples {
                break;
            }
            let instance = inner.instances.get_mut(&handle).expect("listed above");
            let mrs_disposed = instance.disposed_generation;
            let mrs_no_writers = instance.no_writers_generation;
            let mut picked_indices: Vec<usize> = Vec::new();
            for (idx, sample) in instance.samples.iter().enumerate() {
                if out.len() + picked_indices.len() >= max_samples {
                    break;
                }
                if Self::sample_matches(mask, instance, sample) {
                    picked_indices.push(idx);
                }
            }
            if picked_indices.is_empty() {
                continue;
            }
            touched_instances.push(handle);

            let view_bit = if instance.is_new {
                NEW_VIEW_STATE
            } else {
                NOT_NEW_VIEW_STATE
            };
            let n = picked_indices.len();
            // Most-recent generation within the returned set, for ranks.
            let mrsic = picked_indices
                .iter()
                .map(|&i| {
                    let s = &instance.samples[i];
                    s.disposed_generation + s.no_writers_generation
                })
                .max()
                .unwrap_or(0);

            for (k, &idx) in picked_indices.iter().enumerate() {
                let sample = &mut instance.samples[idx];
                let sample_bit = if sample.read {
                    READ_SAMPLE_STATE
                } else {
                    NOT_READ_SAMPLE_STATE
                };
                let gen = sample.disposed_generation + sample.no_writers_generation;
                let info = SampleInfo {
                    valid_data: sample.valid,
                    sample_state: sample_bit,
                    view_state: view_bit,
                    instance_state: sample.instance_state,
                    source_timestamp: sample.source_timestamp,
                    instance_handle: handle,
                    publication_handle: sample.publication_handle,
                    disposed_generation_count: sample.disposed_generation,
                    no_writers_generation_count: sample.no_writers_generation,
                    sample_rank: (n - 1 - k) as u32,
                    generation_rank: mrsic - gen,
                    absolute_generation_rank: (mrs_disposed + mrs_no_writers) - gen,
                };
                if !take {
                    sample.read = true;
                }
                out.push(RhcEntry {
                    serdata: Arc::clone(&sample.serdata),
                    info,
                });
            }

            if take {
                // Remove in reverse so earlier indices stay valid.
                for &idx in picked_indices.iter().rev() {
                    instance.samples.remove(idx);
                }
                removed += picked_indices.len();
            }
        }

        inner.total_samples -= removed;

        // Accessing an instance retires its NEW view state; take drops
        // empty dead instances.
        for handle in touched_instances {
            let drop_instance = match inner.instances.get_mut(&handle) {
                Some(instance) => {
                    instance.is_new = false;
                    take && instance.samples.is_empty() && instance.state != ALIVE_INSTANCE_STATE
                }
                None => false,
            };
            if drop_instance {
                inner.instances.remove(&handle);
            }
        }
        out
    }

    pub fn read(
        &self,
        max_samples: usize,
        mask: u32,
        specific: Option<InstanceHandle>,
    ) -> Vec<RhcEntry> {
        self.access(max_samples, mask, specific, false)
    }

    pub fn take(
        &self,
        max_samples: usize,
        mask: u32,
        specific: Option<InstanceHandle>,
    ) -> Vec<RhcEntry> {
        self.access(max_samples, mask, specific, true)
    }

    /// Does any sample match the mask? Trigger predicate for conditions.
    #[must_use]
    pub fn has_matching(&self, mask: u32) -> bool {
        let mask = Self::effective_mask(mask);
        let inner = self.inner.lock();
        inner.instances.values().any(|instance| {
            instance
                .samples
                .iter()
                .any(|s| Self::sample_matches(mask, instance, s))
        })
    }

    /// Matching samples with a caller predicate over the serdata (query
    /// conditions).
    #[must_use]
    pub fn has_matching_where(
        &self,
        mask: u32,
        predicate: &(dyn Fn(&Serdata) -> bool + Send + Sync),
    ) -> bool {
        let mask = Self::effective_mask(mask);
        let inner = self.inner.lock();
        inner.instances.values().any(|instance| {
            instance
                .samples
                .iter()
                .any(|s| Self::sample_matches(mask, instance, s) && predicate(&s.serdata))
        })
    }

    /// Instance handle of the first stored instance matching a key hash.
    #[must_use]
    pub fn lookup_instance_by_hash(&self, keyhash: &crate::core::types::KeyHash) -> Option<InstanceHandle> {
        let inner = self.inner.lock();
        inner
            .instances
            .values()
            .find(|i| i.samples.iter().any(|s| s.serdata.keyhash == *keyhash))
            .map(|i| i.handle)
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .instances
            .values()
            .map(|i| i.samples.iter().filter(|s| !s.read).count())
            .sum()
    }

    #[must_use]
    pub fn total_samples(&self) -> usize {
        self.inner.lock().total_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::serdata::{STATUSINFO_DISPOSE, STATUSINFO_UNREGISTER};
    use crate::core::types::KeyHash;

    fn data(ts: i64) -> Arc<Serdata> {
        Serdata::new_data(
            vec![1, 2, 3],
            vec![1],
            KeyHash([1; 16]),
            Time::from_nanos(ts),
            Guid::NIL,
        )
    }

    fn dispose(ts: i64) -> Arc<Serdata> {
        Serdata::new_key(
            vec![1],
            KeyHash([1; 16]),
            Time::from_nanos(ts),
            Guid::NIL,
            STATUSINFO_DISPOSE,
        )
    }

    fn rhc() -> ReaderHistoryCache {
        ReaderHistoryCache::new(
            History::KeepAll,
            ResourceLimits::default(),
            DestinationOrderKind::ByReceptionTimestamp,
        )
    }

    const IH: InstanceHandle = InstanceHandle(10);
    const PUB: InstanceHandle = InstanceHandle(77);

    fn wr() -> Guid {
        let mut g = [0u8; 16];
        g[0] = 1;
        Guid(g)
    }

    #[test]
    fn test_store_and_read() {
        let cache = rhc();
        assert_eq!(cache.store(data(1), IH, PUB, wr()), RhcStoreResult::Stored);
        let got = cache.read(32, ANY_STATE, None);
        assert_eq!(got.len(), 1);
        let info = got[0].info;
        assert!(info.valid_data);
        assert_eq!(info.sample_state, NOT_READ_SAMPLE_STATE);
        assert_eq!(info.view_state, NEW_VIEW_STATE);
        assert_eq!(info.instance_state, ALIVE_INSTANCE_STATE);
        assert_eq!(info.instance_handle, IH);
        assert_eq!(info.publication_handle, PUB);
    }

    #[test]
    fn test_read_marks_read_exactly_once() {
        let cache = rhc();
        cache.store(data(1), IH, PUB, wr());

        let first = cache.read(32, ANY_STATE, None);
        assert_eq!(first[0].info.sample_state, NOT_READ_SAMPLE_STATE);

        let second = cache.read(32, ANY_STATE, None);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].info.sample_state, READ_SAMPLE_STATE);
        // View state also retires after the first access.
        assert_eq!(second[0].info.view_state, NOT_NEW_VIEW_STATE);
    }

    #[test]
    fn test_take_then_read_empty() {
        let cache = rhc();
        cache.store(data(1), IH, PUB, wr());
        cache.store(data(2), IH, PUB, wr());

        let taken = cache.take(32, ANY_STATE, None);
        assert_eq!(taken.len(), 2);
        assert!(cache.read(32, ANY_STATE, None).is_empty());
        assert_eq!(cache.total_samples(), 0);
    }

    #[test]
    fn test_read_not_read_mask() {
        let cache = rhc();
        cache.store(data(1), IH, PUB, wr());
        let _ = cache.read(32, ANY_STATE, None);
        cache.store(data(2), IH, PUB, wr());

        let unread = cache.read(32, NOT_READ_SAMPLE_STATE | ANY_VIEW_STATE | ANY_INSTANCE_STATE, None);
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].info.source_timestamp, Time::from_nanos(2));
    }

    #[test]
    fn test_keep_last_depth() {
        let cache = ReaderHistoryCache::new(
            History::KeepLast(2),
            ResourceLimits::default(),
            DestinationOrderKind::ByReceptionTimestamp,
        );
        for ts in 1..=3 {
            cache.store(data(ts), IH, PUB, wr());
        }
        let got = cache.read(32, ANY_STATE, None);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].info.source_timestamp, Time::from_nanos(2));
        assert_eq!(got[1].info.source_timestamp, Time::from_nanos(3));
    }

    #[test]
    fn test_keep_last_depth_ignores_invalid_samples() {
        let cache = ReaderHistoryCache::new(
            History::KeepLast(1),
            ResourceLimits::default(),
            DestinationOrderKind::ByReceptionTimestamp,
        );
        cache.store(data(1), IH, PUB, wr());
        // The dispose notification must not evict the data sample.
        cache.store(dispose(2), IH, PUB, wr());
        let got = cache.read(32, ANY_STATE, None);
        assert_eq!(got.len(), 2);
        assert!(got[0].info.valid_data);
        assert!(!got[1].info.valid_data);
    }

    #[test]
    fn test_sample_rank() {
        let cache = rhc();
        for ts in 1..=3 {
            cache.store(data(ts), IH, PUB, wr());
        }
        let got = cache.read(32, ANY_STATE, None);
        assert_eq!(got[0].info.sample_rank, 2);
        assert_eq!(got[1].info.sample_rank, 1);
        assert_eq!(got[2].info.sample_rank, 0);
    }

    #[test]
    fn test_dispose_transitions_and_generation() {
        let cache = rhc();
        cache.store(data(1), IH, PUB, wr());
        cache.store(dispose(2), IH, PUB, wr());

        let got = cache.read(32, ANY_STATE, None);
        assert_eq!(got.len(), 2);
        assert!(got[0].info.valid_data);
        assert_eq!(got[0].info.instance_state, ALIVE_INSTANCE_STATE);
        assert_eq!(got[0].info.disposed_generation_count, 0);
        assert!(!got[1].info.valid_data);
        assert_eq!(got[1].info.instance_state, NOT_ALIVE_DISPOSED_INSTANCE_STATE);
        assert_eq!(got[1].info.disposed_generation_count, 1);
    }

    #[test]
    fn test_revival_after_dispose() {
        let cache = rhc();
        cache.store(data(1), IH, PUB, wr());
        cache.store(dispose(2), IH, PUB, wr());
        cache.store(data(3), IH, PUB, wr());

        let got = cache.read(32, ANY_STATE, None);
        let last = &got[got.len() - 1].info;
        assert_eq!(last.instance_state, ALIVE_INSTANCE_STATE);
        assert_eq!(last.disposed_generation_count, 1);
        // Revival marks the instance NEW again.
        assert_eq!(last.view_state, NEW_VIEW_STATE);
    }

    #[test]
    fn test_unregister_last_writer_no_writers() {
        let cache = rhc();
        cache.store(data(1), IH, PUB, wr());
        let unreg = Serdata::new_key(
            vec![1],
            KeyHash([1; 16]),
            Time::from_nanos(2),
            Guid::NIL,
            STATUSINFO_UNREGISTER,
        );
        cache.store(unreg, IH, PUB, wr());
        let got = cache.read(32, ANY_STATE, None);
        assert_eq!(
            got.last().expect("samples present").info.instance_state,
            NOT_ALIVE_NO_WRITERS_INSTANCE_STATE
        );
    }

    #[test]
    fn test_specific_instance_access() {
        let cache = rhc();
        cache.store(data(1), InstanceHandle(1), PUB, wr());
        cache.store(data(2), InstanceHandle(2), PUB, wr());

        let got = cache.read(32, ANY_STATE, Some(InstanceHandle(2)));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].info.instance_handle, InstanceHandle(2));
        // Unknown instance reads nothing.
        assert!(cache.read(32, ANY_STATE, Some(InstanceHandle(99))).is_empty());
    }

    #[test]
    fn test_max_samples_cap() {
        let cache = rhc();
        for ts in 1..=5 {
            cache.store(data(ts), IH, PUB, wr());
        }
        assert_eq!(cache.read(3, ANY_STATE, None).len(), 3);
    }

    #[test]
    fn test_instances_limit() {
        let cache = ReaderHistoryCache::new(
            History::KeepAll,
            ResourceLimits {
                max_samples: LENGTH_UNLIMITED,
                max_instances: 1,
                max_samples_per_instance: LENGTH_UNLIMITED,
            },
            DestinationOrderKind::ByReceptionTimestamp,
        );
        assert_eq!(
            cache.store(data(1), InstanceHandle(1), PUB, wr()),
            RhcStoreResult::Stored
        );
        assert_eq!(
            cache.store(data(2), InstanceHandle(2), PUB, wr()),
            RhcStoreResult::RejectedByInstancesLimit
        );
    }

    #[test]
    fn test_by_source_timestamp_reorders() {
        let cache = ReaderHistoryCache::new(
            History::KeepAll,
            ResourceLimits::default(),
            DestinationOrderKind::BySourceTimestamp,
        );
        cache.store(data(5), IH, PUB, wr());
        cache.store(data(2), IH, PUB, wr());
        cache.store(data(9), IH, PUB, wr());
        let got = cache.read(32, ANY_STATE, None);
        let ts: Vec<i64> = got.iter().map(|e| e.info.source_timestamp.as_nanos()).collect();
        assert_eq!(ts, vec![2, 5, 9]);
    }

    #[test]
    fn test_has_matching_and_unread_count() {
        let cache = rhc();
        assert!(!cache.has_matching(ANY_STATE));
        cache.store(data(1), IH, PUB, wr());
        assert!(cache.has_matching(NOT_READ_SAMPLE_STATE));
        assert_eq!(cache.unread_count(), 1);
        let _ = cache.read(32, ANY_STATE, None);
        assert!(!cache.has_matching(NOT_READ_SAMPLE_STATE | ANY_VIEW_STATE | ANY_INSTANCE_STATE));
        assert_eq!(cache.unread_count(), 0);
    }
}
