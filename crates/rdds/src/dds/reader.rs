// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Data readers.
//!
//! `read` and `take` drain the reader history cache into loaned samples:
//! each [`Sample`] owns VM-allocated sample memory (deep-freed when the
//! loan drops) plus its [`SampleInfo`]. Outstanding loans block reader
//! deletion. Invalid-data samples (dispose/unregister notifications) carry
//! only their reconstructed key fields.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::builtin::EndpointBuiltinTopicData;
use super::entity::{
    lookup_kind, raise, register_entity, registry, EntityKind, EntityRec, EntitySpecific,
    NewEntity,
};
use super::listener::{Listener, StatusEvent};
use super::rhc::{ReaderHistoryCache, RhcEntry, SampleInfo, ANY_STATE};
use super::topic::descriptor_of;
use super::Entity;
use crate::core::ser::deserialize::deserialize_sample;
use crate::core::ser::free::{free_sample, FreeScope};
use crate::core::ser::key::{key_cdr_into_sample, keyhash_from_sample};
use crate::core::ser::sample::alloc_raw;
use crate::core::ser::TopicType;
use crate::core::types::{Guid, InstanceHandle};
use crate::qos::Qos;
use crate::retcode::{ReturnCode, Result};
use crate::time::{Duration, Time};

/// Per-reader state.
pub(crate) struct ReaderRec {
    pub topic: Entity,
    pub rhc: ReaderHistoryCache,
    /// Matched local writer handles.
    pub matched: Mutex<Vec<Entity>>,
    /// Outstanding loaned samples; deletion requires zero.
    pub loans: Arc<AtomicUsize>,
    /// Per-instance last reception, for requested-deadline tracking.
    pub last_recv: Mutex<HashMap<InstanceHandle, Time>>,
}

/// A loaned sample: deserialized data plus its metadata. The loan returns
/// (and the sample memory is deep-freed) on drop.
pub struct Sample<T: TopicType> {
    ptr: *mut u8,
    pub info: SampleInfo,
    loans: Arc<AtomicUsize>,
    _marker: std::marker::PhantomData<T>,
}

// The sample memory is exclusively owned by the loan.
unsafe impl<T: TopicType + Send> Send for Sample<T> {}
unsafe impl<T: TopicType + Sync> Sync for Sample<T> {}

impl<T: TopicType> Deref for Sample<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: ptr is a live sample of T's layout for the loan lifetime.
        unsafe { &*(self.ptr as *const T) }
    }
}

impl<T: TopicType> Drop for Sample<T> {
    fn drop(&mut self) {
        // SAFETY: exclusively owned sample allocated through the VM.
        unsafe {
            let _ = free_sample(T::descriptor(), self.ptr, FreeScope::Sample);
        }
        self.loans.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Create a reader under a subscriber, or under a participant (which
/// implicitly creates/reuses the participant's subscriber).
pub fn create_reader(
    parent: Entity,
    topic: Entity,
    qos: Option<Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    let parent_rec = lookup_kind(parent, &[EntityKind::Participant, EntityKind::Subscriber])?;
    let subscriber = if super::entity::kind_of(&parent_rec) == EntityKind::Participant {
        super::subscriber::find_or_create_implicit_subscriber(parent)?
    } else {
        parent
    };
    let sub_rec = lookup_kind(subscriber, &[EntityKind::Subscriber])?;
    let trec = lookup_kind(topic, &[EntityKind::Topic])?;

    let (participant, domain_id) = {
        let c = sub_rec.common.lock();
        (c.participant, c.domain_id)
    };
    if trec.common.lock().participant != participant {
        return Err(ReturnCode::PreconditionNotMet);
    }

    let mut effective = qos.unwrap_or_default();
    effective.validate()?;
    effective.merge_missing(&trec.common.lock().qos, !0u64);
    // Group-level policies inherit from the subscriber.
    effective.merge_missing(
        &sub_rec.common.lock().qos,
        crate::qos::QP_PARTITION | crate::qos::QP_PRESENTATION | crate::qos::QP_GROUP_DATA,
    );
    effective.merge_missing(&Qos::default_reader(), !0u64);
    effective.check_consistency()?;

    let (sub_enabled, autoenable) = {
        let c = sub_rec.common.lock();
        (
            c.enabled,
            c.qos.entity_factory_autoenable().unwrap_or(true),
        )
    };

    let rhc = ReaderHistoryCache::new(
        effective.history().unwrap_or_default(),
        effective.resource_limits().unwrap_or_default(),
        effective.destination_order().unwrap_or_default(),
    );

    let entity_name = match effective.entity_name() {
        Some(n) => n.to_string(),
        None => match registry().lookup(participant) {
            Ok(prec) => match &prec.specific {
                EntitySpecific::Participant(p) => p.default_name(),
                _ => String::new(),
            },
            Err(_) => String::new(),
        },
    };

    let enabled = sub_enabled && autoenable;
    let (handle, rec) = register_entity(NewEntity {
        kind: EntityKind::Reader,
        parent: subscriber,
        participant,
        domain_id,
        qos: effective,
        listener,
        enabled,
        implicit: false,
        guid: Guid::generate(),
        name: entity_name,
        specific: EntitySpecific::Reader(ReaderRec {
            topic,
            rhc,
            matched: Mutex::new(Vec::new()),
            loans: Arc::new(AtomicUsize::new(0)),
            last_recv: Mutex::new(HashMap::new()),
        }),
    })?;
    super::domain_registry::register_reader(handle, domain_id);
    if enabled {
        super::domain_registry::match_endpoint(handle, &rec);
    }
    Ok(handle)
}

fn reader_rec(reader: Entity) -> Result<Arc<EntityRec>> {
    lookup_kind(reader, &[EntityKind::Reader])
}

fn access<T: TopicType>(
    reader: Entity,
    max_samples: usize,
    mask: u32,
    instance: Option<InstanceHandle>,
    take_samples: bool,
) -> Result<Vec<Sample<T>>> {
    if max_samples == 0 {
        return Err(ReturnCode::BadParameter);
    }
    let rec = reader_rec(reader)?;
    let EntitySpecific::Reader(r) = &rec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    if !rec.common.lock().enabled {
        return Err(ReturnCode::NotEnabled);
    }
    let desc = descriptor_of(r.topic)?;
    if !std::ptr::eq(desc, T::descriptor()) {
        return Err(ReturnCode::BadParameter);
    }

    let entries: Vec<RhcEntry> = if take_samples {
        r.rhc.take(max_samples, mask, instance)
    } else {
        r.rhc.read(max_samples, mask, instance)
    };

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let ptr = alloc_raw(desc);
        if ptr.is_null() {
            return Err(ReturnCode::OutOfResources);
        }
        // SAFETY: freshly zeroed sample of the descriptor's layout.
        let fill = unsafe {
            if entry.info.valid_data {
                deserialize_sample(desc, &entry.serdata.payload, ptr, 0)
            } else {
                key_cdr_into_sample(desc, &entry.serdata.key_cdr, ptr)
            }
        };
        if let Err(e) = fill {
            // SAFETY: partially filled samples free cleanly.
            unsafe {
                let _ = free_sample(desc, ptr, FreeScope::Sample);
            }
            return Err(e.into());
        }
        r.loans.fetch_add(1, Ordering::AcqRel);
        out.push(Sample {
            ptr,
            info: entry.info,
            loans: Arc::clone(&r.loans),
            _marker: std::marker::PhantomData,
        });
    }

    // Reading consumes the data-available trigger.
    rec.common.lock().status_changes &= !super::status::DATA_AVAILABLE_STATUS;
    Ok(out)
}

/// Read up to `max_samples` without consuming them.
pub fn read<T: TopicType>(reader: Entity, max_samples: usize) -> Result<Vec<Sample<T>>> {
    access(reader, max_samples, ANY_STATE, None, false)
}

/// Read with a sample/view/instance state mask.
pub fn read_mask<T: TopicType>(
    reader: Entity,
    max_samples: usize,
    mask: u32,
) -> Result<Vec<Sample<T>>> {
    access(reader, max_samples, mask, None, false)
}

/// Read a single instance.
pub fn read_instance<T: TopicType>(
    reader: Entity,
    max_samples: usize,
    instance: InstanceHandle,
) -> Result<Vec<Sample<T>>> {
    access(reader, max_samples, ANY_STATE, Some(instance), false)
}

/// Read a single instance with a state mask.
pub fn read_instance_mask<T: TopicType>(
    reader: Entity,
    max_samples: usize,
    instance: InstanceHandle,
    mask: u32,
) -> Result<Vec<Sample<T>>> {
    access(reader, max_samples, mask, Some(instance), false)
}

/// Take up to `max_samples`, removing them from the cache.
pub fn take<T: TopicType>(reader: Entity, max_samples: usize) -> Result<Vec<Sample<T>>> {
    access(reader, max_samples, ANY_STATE, None, true)
}

pub fn take_mask<T: TopicType>(
    reader: Entity,
    max_samples: usize,
    mask: u32,
) -> Result<Vec<Sample<T>>> {
    access(reader, max_samples, mask, None, true)
}

pub fn take_instance<T: TopicType>(
    reader: Entity,
    max_samples: usize,
    instance: InstanceHandle,
) -> Result<Vec<Sample<T>>> {
    access(reader, max_samples, ANY_STATE, Some(instance), true)
}

pub fn take_instance_mask<T: TopicType>(
    reader: Entity,
    max_samples: usize,
    instance: InstanceHandle,
    mask: u32,
) -> Result<Vec<Sample<T>>> {
    access(reader, max_samples, mask, Some(instance), true)
}

/// Explicitly return loaned samples (dropping them has the same effect).
pub fn return_loan<T: TopicType>(samples: Vec<Sample<T>>) {
    drop(samples);
}

/// Instance handle for a sample's key at this endpoint; NIL when the
/// instance was never seen.
pub fn lookup_instance<T: TopicType>(entity: Entity, data: &T) -> Result<InstanceHandle> {
    let rec = lookup_kind(entity, &[EntityKind::Reader, EntityKind::Writer])?;
    let (topic, domain_id) = match &rec.specific {
        EntitySpecific::Reader(r) => (r.topic, rec.common.lock().domain_id),
        EntitySpecific::Writer(w) => (w.topic, rec.common.lock().domain_id),
        _ => return Err(ReturnCode::IllegalOperation),
    };
    let desc = descriptor_of(topic)?;
    if !std::ptr::eq(desc, T::descriptor()) {
        return Err(ReturnCode::BadParameter);
    }
    let qos = rec.common.lock().qos.clone();
    let version = super::topic::preferred_representation(&qos);
    // SAFETY: `data` is a live `T` matching the descriptor.
    let (_, keyhash) = unsafe { keyhash_from_sample(desc, (data as *const T).cast(), version) }
        .map_err(ReturnCode::from)?;
    let domain = registry()
        .domains
        .get(&domain_id)
        .map(|d| *d)
        .ok_or(ReturnCode::PreconditionNotMet)?;
    let drec = registry().lookup(domain)?;
    let EntitySpecific::Domain(d) = &drec.specific else {
        return Err(ReturnCode::Error);
    };
    Ok(d.tkmap.lookup(&keyhash).unwrap_or(InstanceHandle::NIL))
}

/// Block until historical data from transient-local writers has arrived.
/// Local replay happens synchronously at match time, so this validates and
/// returns.
pub fn wait_for_historical_data(reader: Entity, timeout: Duration) -> Result<()> {
    if timeout.is_negative() {
        return Err(ReturnCode::BadParameter);
    }
    let rec = reader_rec(reader)?;
    if !rec.common.lock().enabled {
        return Err(ReturnCode::NotEnabled);
    }
    Ok(())
}

/// Instance handles of the currently matched writers; `None` probes the
/// count.
pub fn get_matched_publications(
    reader: Entity,
    out: Option<&mut [InstanceHandle]>,
) -> Result<usize> {
    let rec = reader_rec(reader)?;
    let EntitySpecific::Reader(r) = &rec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    let matched = r.matched.lock().clone();
    let handles: Vec<InstanceHandle> = matched
        .iter()
        .filter_map(|w| registry().lookup(*w).ok())
        .map(|w| w.common.lock().iid)
        .collect();
    if let Some(out) = out {
        for (slot, handle) in out.iter_mut().zip(handles.iter()) {
            *slot = *handle;
        }
    }
    Ok(handles.len())
}

/// Builtin-topic sample for one matched writer, by its instance handle.
pub fn get_matched_publication_data(
    reader: Entity,
    publication: InstanceHandle,
) -> Result<EndpointBuiltinTopicData> {
    let rec = reader_rec(reader)?;
    let EntitySpecific::Reader(r) = &rec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    let matched = r.matched.lock().clone();
    for writer in matched {
        let Ok(wrec) = registry().lookup(writer) else {
            continue;
        };
        if wrec.common.lock().iid == publication {
            return super::builtin::endpoint_data(&wrec);
        }
    }
    Err(ReturnCode::BadParameter)
}

/// Requested-deadline bookkeeping, called from delivery.
pub(crate) fn check_requested_deadline(
    rec: &Arc<EntityRec>,
    r: &ReaderRec,
    instance: InstanceHandle,
    now: Time,
) {
    let deadline = match rec.common.lock().qos.deadline() {
        Some(d) if !d.is_infinite() => d,
        _ => return,
    };
    let mut last = r.last_recv.lock();
    if let Some(prev) = last.get(&instance) {
        let gap = now.duration_since(*prev);
        if gap > deadline {
            let missed = (gap.as_nanos() / deadline.as_nanos().max(1)) as u32;
            raise(rec, |c| {
                let st = &mut c.statuses.requested_deadline_missed;
                st.total_count += missed;
                st.total_count_change += missed as i32;
                st.last_instance_handle = instance;
                StatusEvent::RequestedDeadlineMissed(c.handle, *st)
            });
        }
    }
    last.insert(instance, now);
}
