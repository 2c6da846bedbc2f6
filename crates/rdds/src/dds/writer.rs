// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Data writers.
//!
//! `write` runs the serializer VM over the sample, registers the instance
//! in the domain's key map, appends the serdata to the writer history cache
//! at a fresh sequence number, and hands it to delivery (immediately, or
//! deferred into an open coherent set, or into the write batch when
//! `whc_batch` is configured; `flush` forces the batch out).
//!
//! Dispose and unregister travel the same path as key-only serdatas with
//! status bits; unregistering autodisposes per WRITER_DATA_LIFECYCLE.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::builtin::EndpointBuiltinTopicData;
use super::entity::{
    lookup_kind, raise, registry, EntityKind, EntityRec, EntitySpecific, NewEntity,
    register_entity,
};
use super::listener::{Listener, StatusEvent};
use super::topic::{descriptor_of, preferred_representation};
use super::Entity;
use crate::core::ser::key::{keyhash_from_key_cdr, keyhash_from_sample, key_cdr_into_sample};
use crate::core::ser::serialize::serialize_sample;
use crate::core::ser::TopicType;
use crate::core::serdata::{Serdata, STATUSINFO_DISPOSE, STATUSINFO_UNREGISTER};
use crate::core::types::{Guid, InstanceHandle, KeyHash};
use crate::qos::{Qos, QP_DURABILITY};
use crate::retcode::{ReturnCode, Result};
use crate::time::{Duration, Time};
use crate::whc::WriterHistoryCache;

/// Per-writer state.
pub(crate) struct WriterRec {
    pub topic: Entity,
    pub whc: WriterHistoryCache,
    /// Last used sequence number; the next write takes `seq + 1`.
    pub seq: AtomicU64,
    /// Matched local reader handles.
    pub matched: Mutex<Vec<Entity>>,
    /// Deliveries staged by the process-wide write batching toggle.
    pub batch: Mutex<Vec<(Arc<Serdata>, InstanceHandle)>>,
    pub registered: Mutex<HashSet<InstanceHandle>>,
    /// Serializes sequence allocation, cache insert and delivery so
    /// per-writer sample order holds across concurrent writes.
    pub write_lock: Mutex<()>,
    pub last_liveliness_assert: Mutex<Time>,
    /// Per-instance last write, for offered-deadline tracking.
    pub last_write: Mutex<HashMap<InstanceHandle, Time>>,
}

/// Create a writer under a publisher, or under a participant (which
/// implicitly creates/reuses the participant's publisher).
pub fn create_writer(
    parent: Entity,
    topic: Entity,
    qos: Option<Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    let parent_rec = lookup_kind(parent, &[EntityKind::Participant, EntityKind::Publisher])?;
    let publisher = if super::entity::kind_of(&parent_rec) == EntityKind::Participant {
        super::publisher::find_or_create_implicit_publisher(parent)?
    } else {
        parent
    };
    let pub_rec = lookup_kind(publisher, &[EntityKind::Publisher])?;
    let trec = lookup_kind(topic, &[EntityKind::Topic])?;

    let (participant, domain_id) = {
        let c = pub_rec.common.lock();
        (c.participant, c.domain_id)
    };
    if trec.common.lock().participant != participant {
        return Err(ReturnCode::PreconditionNotMet);
    }

    let mut effective = qos.unwrap_or_default();
    effective.validate()?;
    effective.merge_missing(&trec.common.lock().qos, !0u64);
    // Group-level policies inherit from the publisher.
    effective.merge_missing(
        &pub_rec.common.lock().qos,
        crate::qos::QP_PARTITION | crate::qos::QP_PRESENTATION | crate::qos::QP_GROUP_DATA,
    );
    effective.merge_missing(&Qos::default_writer(), !0u64);
    effective.check_consistency()?;

    let (pub_enabled, autoenable) = {
        let c = pub_rec.common.lock();
        (
            c.enabled,
            c.qos.entity_factory_autoenable().unwrap_or(true),
        )
    };

    let reliability = effective.reliability().unwrap_or_default();
    let whc = WriterHistoryCache::new(
        effective.history().unwrap_or_default(),
        effective.resource_limits().unwrap_or_default(),
        reliability.max_blocking_time,
    );

    let entity_name = match effective.entity_name() {
        Some(n) => n.to_string(),
        None => participant_default_name(participant),
    };

    let enabled = pub_enabled && autoenable;
    let (handle, rec) = register_entity(NewEntity {
        kind: EntityKind::Writer,
        parent: publisher,
        participant,
        domain_id,
        qos: effective,
        listener,
        enabled,
        implicit: false,
        guid: Guid::generate(),
        name: entity_name,
        specific: EntitySpecific::Writer(WriterRec {
            topic,
            whc,
            seq: AtomicU64::new(0),
            matched: Mutex::new(Vec::new()),
            batch: Mutex::new(Vec::new()),
            registered: Mutex::new(HashSet::new()),
            write_lock: Mutex::new(()),
            last_liveliness_assert: Mutex::new(crate::time::now()),
            last_write: Mutex::new(HashMap::new()),
        }),
    })?;
    super::domain_registry::register_writer(handle, domain_id);
    if enabled {
        super::domain_registry::match_endpoint(handle, &rec);
    }
    Ok(handle)
}

fn participant_default_name(participant: Entity) -> String {
    match registry().lookup(participant) {
        Ok(prec) => match &prec.specific {
            EntitySpecific::Participant(p) => p.default_name(),
            _ => String::new(),
        },
        Err(_) => String::new(),
    }
}

fn writer_rec(writer: Entity) -> Result<Arc<EntityRec>> {
    lookup_kind(writer, &[EntityKind::Writer])
}

fn writer_context(rec: &EntityRec) -> Result<(&WriterRec, Entity, u32, Qos, bool)> {
    let EntitySpecific::Writer(w) = &rec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    let c = rec.common.lock();
    Ok((w, c.parent, c.domain_id, c.qos.clone(), c.enabled))
}

fn domain_rec(domain_id: u32) -> Result<Arc<EntityRec>> {
    let domain = registry()
        .domains
        .get(&domain_id)
        .map(|d| *d)
        .ok_or(ReturnCode::PreconditionNotMet)?;
    registry().lookup(domain)
}

/// Check the offered deadline for an instance and raise the status when
/// update gaps exceeded it.
fn check_offered_deadline(
    rec: &Arc<EntityRec>,
    w: &WriterRec,
    qos: &Qos,
    instance: InstanceHandle,
    now: Time,
) {
    let Some(deadline) = qos.deadline() else {
        return;
    };
    if deadline.is_infinite() {
        return;
    }
    let mut last = w.last_write.lock();
    if let Some(prev) = last.get(&instance) {
        let gap = now.duration_since(*prev);
        if gap > deadline {
            let missed = (gap.as_nanos() / deadline.as_nanos().max(1)) as u32;
            raise(rec, |c| {
                let st = &mut c.statuses.offered_deadline_missed;
                st.total_count += missed;
                st.total_count_change += missed as i32;
                st.last_instance_handle = instance;
                StatusEvent::OfferedDeadlineMissed(c.handle, *st)
            });
        }
    }
    last.insert(instance, now);
}

/// Core of every write-path operation. `sample` is the in-memory value for
/// data writes (content filters use it) and `None` for key-only traffic.
fn write_serdata(
    writer: Entity,
    rec: &Arc<EntityRec>,
    serdata: Arc<Serdata>,
    instance: InstanceHandle,
    lifespan: Duration,
    publisher: Entity,
    whc_batch: bool,
    sample: Option<*const u8>,
) -> Result<()> {
    let EntitySpecific::Writer(w) = &rec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    let _write_guard = w.write_lock.lock();
    // Sequence numbers burned on a failed insert are never reused.
    let seq = w.seq.fetch_add(1, Ordering::Relaxed) + 1;
    let expire_at = serdata.source_timestamp.checked_add_duration(lifespan);
    w.whc.insert(0, seq, expire_at, Arc::clone(&serdata), instance)?;

    if super::publisher::stash_if_coherent(publisher, writer, &serdata, instance) {
        return Ok(());
    }
    if whc_batch {
        w.batch.lock().push((serdata, instance));
        return Ok(());
    }
    super::domain_registry::deliver_with_sample(writer, &serdata, instance, sample);
    Ok(())
}

/// Publish one sample with the current time as source timestamp.
pub fn write<T: TopicType>(writer: Entity, data: &T) -> Result<()> {
    write_ts(writer, data, crate::time::now())
}

/// Publish one sample with an explicit source timestamp.
pub fn write_ts<T: TopicType>(writer: Entity, data: &T, timestamp: Time) -> Result<()> {
    let rec = writer_rec(writer)?;
    let (w, publisher, domain_id, qos, enabled) = writer_context(&rec)?;
    if !enabled {
        return Err(ReturnCode::NotEnabled);
    }
    let desc = descriptor_of(w.topic)?;
    if !std::ptr::eq(desc, T::descriptor()) {
        return Err(ReturnCode::BadParameter);
    }
    let drec = domain_rec(domain_id)?;
    let EntitySpecific::Domain(d) = &drec.specific else {
        return Err(ReturnCode::Error);
    };
    let cfg = d.config.snapshot();

    let version = preferred_representation(&qos);
    let sample_ptr = (data as *const T).cast::<u8>();
    // SAFETY: `data` is a live `T` and the descriptor is `T`'s by contract.
    let payload = unsafe { serialize_sample(desc, sample_ptr, version, cfg.max_sample_size) }
        .map_err(ReturnCode::from)?;
    let (key_cdr, keyhash) = unsafe { keyhash_from_sample(desc, sample_ptr, version) }
        .map_err(ReturnCode::from)?;
    let instance = d.tkmap.lookup_or_register(keyhash, &key_cdr);

    let guid = rec.common.lock().guid;
    let serdata = Serdata::new_data(payload, key_cdr, keyhash, timestamp, guid);

    check_offered_deadline(&rec, w, &qos, instance, timestamp);
    let lifespan = qos.lifespan().unwrap_or(Duration::INFINITY);
    write_serdata(
        writer,
        &rec,
        serdata,
        instance,
        lifespan,
        publisher,
        cfg.whc_batch,
        Some(sample_ptr),
    )
}

fn write_key(writer: Entity, keyhash: KeyHash, key_cdr: Vec<u8>, timestamp: Time, statusinfo: u32) -> Result<()> {
    let rec = writer_rec(writer)?;
    let (_, publisher, domain_id, qos, enabled) = writer_context(&rec)?;
    if !enabled {
        return Err(ReturnCode::NotEnabled);
    }
    let drec = domain_rec(domain_id)?;
    let EntitySpecific::Domain(d) = &drec.specific else {
        return Err(ReturnCode::Error);
    };
    let cfg = d.config.snapshot();
    let instance = d.tkmap.lookup_or_register(keyhash, &key_cdr);
    let guid = rec.common.lock().guid;
    let serdata = Serdata::new_key(key_cdr, keyhash, timestamp, guid, statusinfo);
    let lifespan = qos.lifespan().unwrap_or(Duration::INFINITY);
    write_serdata(
        writer,
        &rec,
        serdata,
        instance,
        lifespan,
        publisher,
        cfg.whc_batch,
        None,
    )
}

fn key_of_sample<T: TopicType>(writer: Entity, data: &T) -> Result<(KeyHash, Vec<u8>)> {
    let rec = writer_rec(writer)?;
    let EntitySpecific::Writer(w) = &rec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    let desc = descriptor_of(w.topic)?;
    if !std::ptr::eq(desc, T::descriptor()) {
        return Err(ReturnCode::BadParameter);
    }
    let qos = rec.common.lock().qos.clone();
    let version = preferred_representation(&qos);
    let sample_ptr = (data as *const T).cast::<u8>();
    // SAFETY: `data` is a live `T` matching the descriptor.
    let (key_cdr, keyhash) =
        unsafe { keyhash_from_sample(desc, sample_ptr, version) }.map_err(ReturnCode::from)?;
    Ok((keyhash, key_cdr))
}

/// Dispose the instance identified by the sample's key.
pub fn dispose<T: TopicType>(writer: Entity, data: &T) -> Result<()> {
    dispose_ts(writer, data, crate::time::now())
}

pub fn dispose_ts<T: TopicType>(writer: Entity, data: &T, timestamp: Time) -> Result<()> {
    let (keyhash, key_cdr) = key_of_sample(writer, data)?;
    write_key(writer, keyhash, key_cdr, timestamp, STATUSINFO_DISPOSE)
}

/// Dispose by previously returned instance handle.
pub fn dispose_instance(writer: Entity, instance: InstanceHandle) -> Result<()> {
    let rec = writer_rec(writer)?;
    let (w, _, domain_id, _, _) = writer_context(&rec)?;
    let drec = domain_rec(domain_id)?;
    let EntitySpecific::Domain(d) = &drec.specific else {
        return Err(ReturnCode::Error);
    };
    let key_cdr = d.tkmap.key_cdr(instance).ok_or(ReturnCode::BadParameter)?;
    let desc = descriptor_of(w.topic)?;
    let version = preferred_representation(&rec.common.lock().qos);
    let keyhash = keyhash_from_key_cdr(&key_cdr, !desc.fixed_key(version));
    write_key(writer, keyhash, key_cdr, crate::time::now(), STATUSINFO_DISPOSE)
}

/// Register an instance, returning its handle.
pub fn register_instance<T: TopicType>(writer: Entity, data: &T) -> Result<InstanceHandle> {
    let (keyhash, key_cdr) = key_of_sample(writer, data)?;
    let rec = writer_rec(writer)?;
    let (w, _, domain_id, _, enabled) = writer_context(&rec)?;
    if !enabled {
        return Err(ReturnCode::NotEnabled);
    }
    let drec = domain_rec(domain_id)?;
    let EntitySpecific::Domain(d) = &drec.specific else {
        return Err(ReturnCode::Error);
    };
    let instance = d.tkmap.lookup_or_register(keyhash, &key_cdr);
    w.registered.lock().insert(instance);
    Ok(instance)
}

/// Unregister an instance. Autodisposes per WRITER_DATA_LIFECYCLE.
pub fn unregister_instance<T: TopicType>(writer: Entity, data: &T) -> Result<()> {
    let (keyhash, key_cdr) = key_of_sample(writer, data)?;
    let rec = writer_rec(writer)?;
    let qos = rec.common.lock().qos.clone();
    let mut statusinfo = STATUSINFO_UNREGISTER;
    if qos.autodispose_unregistered {
        statusinfo |= STATUSINFO_DISPOSE;
    }
    if let EntitySpecific::Writer(w) = &rec.specific {
        let drec = domain_rec(rec.common.lock().domain_id)?;
        if let EntitySpecific::Domain(d) = &drec.specific {
            if let Some(instance) = d.tkmap.lookup(&keyhash) {
                w.registered.lock().remove(&instance);
            }
        }
    }
    write_key(writer, keyhash, key_cdr, crate::time::now(), statusinfo)
}

/// Force out any writes staged by the batching toggle.
pub fn flush(writer: Entity) -> Result<()> {
    let rec = writer_rec(writer)?;
    let EntitySpecific::Writer(w) = &rec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    let staged: Vec<_> = w.batch.lock().drain(..).collect();
    for (serdata, instance) in staged {
        super::domain_registry::deliver(writer, &serdata, instance);
    }
    Ok(())
}

/// Block until all matched readers acknowledged delivery. Local delivery is
/// synchronous, so this validates and returns.
pub fn wait_for_acks(entity: Entity, timeout: Duration) -> Result<()> {
    if timeout.is_negative() {
        return Err(ReturnCode::BadParameter);
    }
    let rec = lookup_kind(entity, &[EntityKind::Writer, EntityKind::Publisher])?;
    if !rec.common.lock().enabled {
        return Err(ReturnCode::NotEnabled);
    }
    Ok(())
}

/// Reconstruct the key fields of an instance into `sample`.
///
/// `sample` must be in its default (zeroed) state; key fields are written,
/// everything else is left untouched.
pub fn instance_get_key<T: TopicType>(
    entity: Entity,
    instance: InstanceHandle,
    sample: &mut T,
) -> Result<()> {
    let rec = lookup_kind(entity, &[EntityKind::Writer, EntityKind::Reader])?;
    let (topic, domain_id) = match &rec.specific {
        EntitySpecific::Writer(w) => (w.topic, rec.common.lock().domain_id),
        EntitySpecific::Reader(r) => (r.topic, rec.common.lock().domain_id),
        _ => return Err(ReturnCode::IllegalOperation),
    };
    let desc = descriptor_of(topic)?;
    if !std::ptr::eq(desc, T::descriptor()) {
        return Err(ReturnCode::BadParameter);
    }
    let drec = domain_rec(domain_id)?;
    let EntitySpecific::Domain(d) = &drec.specific else {
        return Err(ReturnCode::Error);
    };
    let key_cdr = d.tkmap.key_cdr(instance).ok_or(ReturnCode::BadParameter)?;
    // SAFETY: `sample` is a live zero-default `T` matching the descriptor.
    unsafe { key_cdr_into_sample(desc, &key_cdr, (sample as *mut T).cast()) }
        .map_err(ReturnCode::from)
}

/// Snapshot the writer's history-cache state (diagnostics).
pub fn whc_state(writer: Entity) -> Result<crate::whc::WhcState> {
    let rec = writer_rec(writer)?;
    let EntitySpecific::Writer(w) = &rec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    let mut st = crate::whc::WhcState::default();
    w.whc.get_state(&mut st);
    Ok(st)
}

/// Instance handles of the currently matched readers. `None` probes the
/// count without filling anything.
pub fn get_matched_subscriptions(
    writer: Entity,
    out: Option<&mut [InstanceHandle]>,
) -> Result<usize> {
    let rec = writer_rec(writer)?;
    let EntitySpecific::Writer(w) = &rec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    let matched = w.matched.lock().clone();
    let handles: Vec<InstanceHandle> = matched
        .iter()
        .filter_map(|r| registry().lookup(*r).ok())
        .map(|r| r.common.lock().iid)
        .collect();
    if let Some(out) = out {
        for (slot, handle) in out.iter_mut().zip(handles.iter()) {
            *slot = *handle;
        }
    }
    Ok(handles.len())
}

/// Builtin-topic sample for one matched reader, by its instance handle.
pub fn get_matched_subscription_data(
    writer: Entity,
    subscription: InstanceHandle,
) -> Result<EndpointBuiltinTopicData> {
    let rec = writer_rec(writer)?;
    let EntitySpecific::Writer(w) = &rec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    let matched = w.matched.lock().clone();
    for reader in matched {
        let Ok(rrec) = registry().lookup(reader) else {
            continue;
        };
        if rrec.common.lock().iid == subscription {
            return super::builtin::endpoint_data(&rrec);
        }
    }
    Err(ReturnCode::BadParameter)
}

/// Durability contract for late-joiner replay: both sides at least
/// transient-local.
pub(crate) fn wants_historical(rd_qos: &Qos, wr_qos: &Qos) -> bool {
    use crate::qos::policy::DurabilityKind;
    rd_qos.is_present(QP_DURABILITY)
        && wr_qos.is_present(QP_DURABILITY)
        && rd_qos.durability >= DurabilityKind::TransientLocal
        && wr_qos.durability >= DurabilityKind::TransientLocal
}
