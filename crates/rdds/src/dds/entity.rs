// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Entity registry and the operations common to every entity kind.
//!
//! Entities live in a process-wide registry indexed by handle; parent and
//! child references are handles, so a back-reference can always fail with
//! `AlreadyDeleted` instead of dangling. Handles are allocated from a
//! monotone counter and never reused within the library lifetime: a
//! positive handle below the allocation point that is absent from the
//! registry belonged to a deleted entity.
//!
//! Lock discipline: at most one entity's state lock is held at a time
//! (parent and child are locked in sequence, never nested), and no lock is
//! held across listener callbacks or waitset wakeups.

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::condition::{GuardCondRec, QueryCondRec, ReadCondRec};
use super::domain::DomainRec;
use super::listener::{Listener, StatusEvent};
use super::participant::ParticipantRec;
use super::reader::ReaderRec;
use super::status::{StatusId, StatusSet, ANY_STATUS};
use super::topic::TopicRec;
use super::waitset::WaitsetRec;
use super::writer::WriterRec;
use super::{Entity, MIN_PSEUDO_HANDLE};
use crate::core::types::{Guid, InstanceHandle};
use crate::qos::{Qos, QP_CHANGEABLE_MASK};
use crate::retcode::{ReturnCode, Result};

/// Kind tag of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Domain,
    Participant,
    Topic,
    Publisher,
    Subscriber,
    Reader,
    Writer,
    ReadCondition,
    QueryCondition,
    GuardCondition,
    Waitset,
}

/// State shared by every entity kind.
pub(crate) struct EntityCommon {
    pub handle: Entity,
    pub kind: EntityKind,
    pub parent: Entity,
    /// Nearest participant ancestor; 0 for domains and participants
    /// themselves.
    pub participant: Entity,
    pub domain_id: u32,
    pub children: Vec<Entity>,
    pub qos: Qos,
    pub enabled: bool,
    /// Created by the library (implicit publisher/subscriber, domain);
    /// deleted when the last explicit child goes.
    pub implicit: bool,
    pub guid: Guid,
    pub iid: InstanceHandle,
    pub name: String,
    /// Statuses contributing to trigger conditions.
    pub status_mask: u32,
    /// Currently raised statuses.
    pub status_changes: u32,
    pub statuses: StatusSet,
    pub listener: Listener,
    /// Waitsets this entity is attached to.
    pub waitsets: Vec<Entity>,
}

/// Kind-specific state. Immutable after creation; interior mutability lives
/// inside the records.
pub(crate) enum EntitySpecific {
    Domain(DomainRec),
    Participant(ParticipantRec),
    Topic(TopicRec),
    Publisher(super::publisher::PublisherRec),
    Subscriber,
    Reader(ReaderRec),
    Writer(WriterRec),
    ReadCondition(ReadCondRec),
    QueryCondition(QueryCondRec),
    GuardCondition(GuardCondRec),
    Waitset(WaitsetRec),
}

pub(crate) struct EntityRec {
    pub common: Mutex<EntityCommon>,
    pub specific: EntitySpecific,
}

pub(crate) struct Registry {
    pub entities: DashMap<Entity, Arc<EntityRec>>,
    pub domains: DashMap<u32, Entity>,
    next_handle: AtomicI32,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static NEXT_IID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Registry {
        entities: DashMap::new(),
        domains: DashMap::new(),
        next_handle: AtomicI32::new(1),
    })
}

/// Fresh instance handle for entities without a network GUID.
pub(crate) fn next_iid() -> InstanceHandle {
    InstanceHandle(NEXT_IID.fetch_add(1, Ordering::Relaxed))
}

impl Registry {
    fn alloc_handle(&self) -> Result<Entity> {
        let h = self.next_handle.fetch_add(1, Ordering::Relaxed);
        if h <= 0 || h >= MIN_PSEUDO_HANDLE {
            log::error!("[entity] handle space exhausted");
            return Err(ReturnCode::OutOfResources);
        }
        Ok(h)
    }

    /// Resolve a handle, distinguishing never-valid from deleted.
    pub(crate) fn lookup(&self, entity: Entity) -> Result<Arc<EntityRec>> {
        if entity <= 0 || entity >= MIN_PSEUDO_HANDLE {
            return Err(ReturnCode::BadParameter);
        }
        match self.entities.get(&entity) {
            Some(rec) => Ok(Arc::clone(&rec)),
            None if entity < self.next_handle.load(Ordering::Relaxed) => {
                Err(ReturnCode::AlreadyDeleted)
            }
            None => Err(ReturnCode::BadParameter),
        }
    }
}

/// Creation input for [`register_entity`].
pub(crate) struct NewEntity {
    pub kind: EntityKind,
    pub parent: Entity,
    pub participant: Entity,
    pub domain_id: u32,
    pub qos: Qos,
    pub listener: Option<Listener>,
    pub enabled: bool,
    pub implicit: bool,
    pub guid: Guid,
    pub name: String,
    pub specific: EntitySpecific,
}

pub(crate) fn register_entity(new: NewEntity) -> Result<(Entity, Arc<EntityRec>)> {
    let reg = registry();
    let handle = reg.alloc_handle()?;
    let iid = if new.guid == Guid::NIL {
        next_iid()
    } else {
        new.guid.as_instance_handle()
    };
    let rec = Arc::new(EntityRec {
        common: Mutex::new(EntityCommon {
            handle,
            kind: new.kind,
            parent: new.parent,
            participant: new.participant,
            domain_id: new.domain_id,
            children: Vec::new(),
            qos: {
                let mut q = new.qos;
                q.unalias();
                q
            },
            enabled: new.enabled,
            implicit: new.implicit,
            guid: new.guid,
            iid,
            name: new.name,
            status_mask: ANY_STATUS,
            status_changes: 0,
            statuses: StatusSet::default(),
            listener: new.listener.unwrap_or_default(),
            waitsets: Vec::new(),
        }),
        specific: new.specific,
    });
    reg.entities.insert(handle, Arc::clone(&rec));
    if new.parent != 0 {
        match reg.lookup(new.parent) {
            Ok(parent) => parent.common.lock().children.push(handle),
            Err(rc) => {
                reg.entities.remove(&handle);
                return Err(rc);
            }
        }
    }
    log::trace!("[entity] created {:?} handle {}", new.kind, handle);
    Ok((handle, rec))
}

pub(crate) fn kind_of(rec: &EntityRec) -> EntityKind {
    rec.common.lock().kind
}

/// Resolve a handle and require one of the given kinds.
pub(crate) fn lookup_kind(entity: Entity, kinds: &[EntityKind]) -> Result<Arc<EntityRec>> {
    let rec = registry().lookup(entity)?;
    let kind = kind_of(&rec);
    if kinds.contains(&kind) {
        Ok(rec)
    } else {
        Err(ReturnCode::IllegalOperation)
    }
}

// ---------------------------------------------------------------------------
// Status plumbing.
// ---------------------------------------------------------------------------

/// Apply a status mutation under the entity lock, then fan out: wake the
/// attached waitsets and queue the listener event on the participant's
/// dispatch thread.
pub(crate) fn raise<F>(rec: &Arc<EntityRec>, make_event: F)
where
    F: FnOnce(&mut EntityCommon) -> StatusEvent,
{
    let (event, waitsets, participant, handle, kind) = {
        let mut c = rec.common.lock();
        let event = make_event(&mut c);
        c.status_changes |= event.status_id().mask();
        (
            event,
            c.waitsets.clone(),
            c.participant,
            c.handle,
            c.kind,
        )
    };
    for ws in waitsets {
        super::waitset::notify(ws);
    }
    let dispatcher_owner = if kind == EntityKind::Participant {
        handle
    } else {
        participant
    };
    if dispatcher_owner == 0 {
        return;
    }
    if !listener_chain_has_slot(event.entity(), event.status_id()) {
        return;
    }
    if let Ok(prec) = registry().lookup(dispatcher_owner) {
        if let EntitySpecific::Participant(p) = &prec.specific {
            p.dispatcher.post(event);
        }
    }
}

/// Set a status bit and wake waitsets without queueing a listener event.
pub(crate) fn raise_silent(rec: &Arc<EntityRec>, id: StatusId) {
    let waitsets = {
        let mut c = rec.common.lock();
        c.status_changes |= id.mask();
        c.waitsets.clone()
    };
    for ws in waitsets {
        super::waitset::notify(ws);
    }
}

/// Does any table from `entity` up to its participant fill this slot?
pub(crate) fn listener_chain_has_slot(entity: Entity, id: StatusId) -> bool {
    let mut cur = entity;
    loop {
        let Ok(rec) = registry().lookup(cur) else {
            return false;
        };
        let (has, parent, kind) = {
            let c = rec.common.lock();
            (c.listener.has_slot(id), c.parent, c.kind)
        };
        if has {
            return true;
        }
        if kind == EntityKind::Participant || parent == 0 {
            return false;
        }
        cur = parent;
    }
}

/// Invoke the most specific callback for a queued event. Runs on the
/// participant's dispatch thread.
pub(crate) fn dispatch_listener_event(event: &StatusEvent) {
    let id = event.status_id();
    let mut cur = event.entity();
    loop {
        let Ok(rec) = registry().lookup(cur) else {
            return;
        };
        let (listener, parent, kind) = {
            let c = rec.common.lock();
            (c.listener.clone(), c.parent, c.kind)
        };
        if listener.has_slot(id) {
            event.invoke(&listener);
            if listener.reset_on_invoke & id.mask() != 0 {
                if let Ok(origin) = registry().lookup(event.entity()) {
                    origin.common.lock().status_changes &= !id.mask();
                }
            }
            return;
        }
        if kind == EntityKind::Participant || parent == 0 {
            return;
        }
        cur = parent;
    }
}

// ---------------------------------------------------------------------------
// Generic entity operations.
// ---------------------------------------------------------------------------

/// Delete an entity and its whole subtree, depth first.
///
/// Fails with `PreconditionNotMet` when any reader in the subtree still has
/// outstanding loans; otherwise children, conditions, listener tables and
/// waitset attachments are all torn down before the handle dies.
pub fn delete(entity: Entity) -> Result<()> {
    let reg = registry();
    reg.lookup(entity)?;
    check_no_loans(entity)?;
    delete_tree(entity);
    Ok(())
}

fn check_no_loans(entity: Entity) -> Result<()> {
    let Ok(rec) = registry().lookup(entity) else {
        return Ok(());
    };
    if let EntitySpecific::Reader(r) = &rec.specific {
        if r.loans.load(Ordering::Acquire) > 0 {
            return Err(ReturnCode::PreconditionNotMet);
        }
    }
    let children = rec.common.lock().children.clone();
    for child in children {
        check_no_loans(child)?;
    }
    Ok(())
}

fn delete_tree(entity: Entity) {
    let reg = registry();
    let Some(rec) = reg.entities.get(&entity).map(|r| Arc::clone(&r)) else {
        return;
    };

    // Children first, newest first.
    let children = rec.common.lock().children.clone();
    for child in children.into_iter().rev() {
        delete_tree(child);
    }

    // Kind-specific teardown while the record is still resolvable.
    match &rec.specific {
        EntitySpecific::Writer(w) => super::domain_registry::unregister_writer(entity, &rec, w),
        EntitySpecific::Reader(r) => super::domain_registry::unregister_reader(entity, &rec, r),
        EntitySpecific::Participant(p) => p.dispatcher.shutdown(),
        EntitySpecific::Waitset(ws) => ws.close(),
        EntitySpecific::Domain(_) => {
            let domain_id = rec.common.lock().domain_id;
            reg.domains.remove(&domain_id);
        }
        _ => {}
    }

    // Detach from waitsets; blocked waiters re-evaluate without us.
    let (waitsets, parent) = {
        let c = rec.common.lock();
        (c.waitsets.clone(), c.parent)
    };
    for ws in waitsets {
        super::waitset::detach_silent(ws, entity);
    }

    reg.entities.remove(&entity);
    log::trace!("[entity] deleted handle {}", entity);

    if parent != 0 {
        if let Some(prec) = reg.entities.get(&parent).map(|r| Arc::clone(&r)) {
            let delete_parent = {
                let mut pc = prec.common.lock();
                pc.children.retain(|c| *c != entity);
                pc.implicit && pc.children.is_empty()
            };
            if delete_parent {
                delete_tree(parent);
            }
        }
    }
}

/// Enable a disabled entity; enabling is idempotent and monotonic.
pub fn enable(entity: Entity) -> Result<()> {
    let rec = registry().lookup(entity)?;
    let (was_enabled, parent, kind) = {
        let c = rec.common.lock();
        (c.enabled, c.parent, c.kind)
    };
    if was_enabled {
        return Ok(());
    }
    if parent != 0 {
        let prec = registry().lookup(parent)?;
        if !prec.common.lock().enabled {
            return Err(ReturnCode::PreconditionNotMet);
        }
    }
    let autoenable_children = {
        let mut c = rec.common.lock();
        c.enabled = true;
        c.qos.entity_factory_autoenable().unwrap_or(true)
    };
    // Endpoints start matching once enabled.
    if matches!(kind, EntityKind::Reader | EntityKind::Writer) {
        super::domain_registry::match_endpoint(entity, &rec);
    }
    if autoenable_children {
        let children = rec.common.lock().children.clone();
        for child in children {
            let _ = enable(child);
        }
    }
    Ok(())
}

pub fn get_parent(entity: Entity) -> Result<Entity> {
    let rec = registry().lookup(entity)?;
    let parent = rec.common.lock().parent;
    Ok(parent)
}

/// Children in creation order.
pub fn get_children(entity: Entity) -> Result<Vec<Entity>> {
    let rec = registry().lookup(entity)?;
    let children = rec.common.lock().children.clone();
    Ok(children)
}

/// Nearest participant ancestor (or the entity itself).
pub fn get_participant(entity: Entity) -> Result<Entity> {
    let rec = registry().lookup(entity)?;
    let c = rec.common.lock();
    match c.kind {
        EntityKind::Participant => Ok(c.handle),
        EntityKind::Domain => Err(ReturnCode::IllegalOperation),
        _ => Ok(c.participant),
    }
}

fn nearest_ancestor(entity: Entity, kind: EntityKind) -> Result<Entity> {
    let mut cur = entity;
    loop {
        let rec = registry().lookup(cur)?;
        let (k, parent) = {
            let c = rec.common.lock();
            (c.kind, c.parent)
        };
        if k == kind {
            return Ok(cur);
        }
        if parent == 0 {
            return Err(ReturnCode::IllegalOperation);
        }
        cur = parent;
    }
}

/// Nearest publisher above a writer.
pub fn get_publisher(writer: Entity) -> Result<Entity> {
    lookup_kind(writer, &[EntityKind::Writer])?;
    nearest_ancestor(writer, EntityKind::Publisher)
}

/// Nearest subscriber above a reader or read/query condition.
pub fn get_subscriber(entity: Entity) -> Result<Entity> {
    let rec = registry().lookup(entity)?;
    let start = match &rec.specific {
        EntitySpecific::Reader(_) => entity,
        EntitySpecific::ReadCondition(rc) => rc.reader,
        EntitySpecific::QueryCondition(qc) => qc.reader,
        _ => return Err(ReturnCode::IllegalOperation),
    };
    nearest_ancestor(start, EntityKind::Subscriber)
}

/// The topic behind a reader, writer, or read/query condition.
pub fn get_topic(entity: Entity) -> Result<Entity> {
    let rec = registry().lookup(entity)?;
    match &rec.specific {
        EntitySpecific::Reader(r) => Ok(r.topic),
        EntitySpecific::Writer(w) => Ok(w.topic),
        EntitySpecific::ReadCondition(rc) => get_topic(rc.reader),
        EntitySpecific::QueryCondition(qc) => get_topic(qc.reader),
        _ => Err(ReturnCode::IllegalOperation),
    }
}

pub fn get_domain_id(entity: Entity) -> Result<u32> {
    let rec = registry().lookup(entity)?;
    let domain_id = rec.common.lock().domain_id;
    Ok(domain_id)
}

pub fn get_instance_handle(entity: Entity) -> Result<InstanceHandle> {
    let rec = registry().lookup(entity)?;
    let iid = rec.common.lock().iid;
    Ok(iid)
}

pub fn get_guid(entity: Entity) -> Result<Guid> {
    let rec = lookup_kind(
        entity,
        &[EntityKind::Participant, EntityKind::Reader, EntityKind::Writer, EntityKind::Topic],
    )?;
    let guid = rec.common.lock().guid;
    Ok(guid)
}

pub fn get_entity_name(entity: Entity) -> Result<String> {
    let rec = registry().lookup(entity)?;
    let name = rec.common.lock().name.clone();
    Ok(name)
}

pub fn get_qos(entity: Entity) -> Result<Qos> {
    let rec = registry().lookup(entity)?;
    let qos = rec.common.lock().qos.deep_clone();
    Ok(qos)
}

/// Change an entity's QoS.
///
/// Immutable policies may only change while the entity is disabled; on an
/// enabled entity a change outside the mutable subset fails with
/// `ImmutablePolicy` and leaves the entity untouched. The change is applied
/// against the current set under the entity lock, so two racing conflicting
/// mutations serialize and the loser sees the winner's values.
pub fn set_qos(entity: Entity, qos: &Qos) -> Result<()> {
    qos.validate()?;
    let rec = registry().lookup(entity)?;
    let mut c = rec.common.lock();
    let mut merged = c.qos.clone();
    // Policies present in the argument override; the rest stay.
    let mut incoming = qos.deep_clone();
    incoming.merge_missing(&merged, !0u64);
    if c.enabled && merged.delta(&incoming, !QP_CHANGEABLE_MASK) != 0 {
        return Err(ReturnCode::ImmutablePolicy);
    }
    incoming.check_consistency()?;
    merged = incoming;
    c.qos = merged;
    Ok(())
}

pub fn get_listener(entity: Entity) -> Result<Listener> {
    let rec = registry().lookup(entity)?;
    let listener = rec.common.lock().listener.clone();
    Ok(listener)
}

pub fn set_listener(entity: Entity, listener: Option<Listener>) -> Result<()> {
    let rec = registry().lookup(entity)?;
    rec.common.lock().listener = listener.unwrap_or_default();
    Ok(())
}

pub fn get_status_mask(entity: Entity) -> Result<u32> {
    let rec = registry().lookup(entity)?;
    let status_mask = rec.common.lock().status_mask;
    Ok(status_mask)
}

/// Select which statuses contribute to trigger conditions.
pub fn set_status_mask(entity: Entity, mask: u32) -> Result<()> {
    if mask & !ANY_STATUS != 0 {
        return Err(ReturnCode::BadParameter);
    }
    let rec = registry().lookup(entity)?;
    let waitsets = {
        let mut c = rec.common.lock();
        c.status_mask = mask;
        c.waitsets.clone()
    };
    for ws in waitsets {
        super::waitset::notify(ws);
    }
    Ok(())
}

/// Currently raised statuses, unfiltered.
pub fn get_status_changes(entity: Entity) -> Result<u32> {
    let rec = registry().lookup(entity)?;
    let status_changes = rec.common.lock().status_changes;
    Ok(status_changes)
}

/// Sample the raised statuses in `mask` without clearing them.
pub fn read_status(entity: Entity, mask: u32) -> Result<u32> {
    let rec = registry().lookup(entity)?;
    let status_changes = rec.common.lock().status_changes;
    Ok(status_changes & mask)
}

/// Sample and clear the raised statuses in `mask`.
pub fn take_status(entity: Entity, mask: u32) -> Result<u32> {
    let rec = registry().lookup(entity)?;
    let mut c = rec.common.lock();
    let out = c.status_changes & mask;
    c.status_changes &= !mask;
    Ok(out)
}

/// Whether the entity's trigger predicate currently holds.
pub fn triggered(entity: Entity) -> Result<bool> {
    let rec = registry().lookup(entity)?;
    Ok(super::waitset::entity_trigger(entity, &rec))
}

// ---------------------------------------------------------------------------
// Status getters: retrieve the structure and reset the change counters.
// ---------------------------------------------------------------------------

macro_rules! status_getter {
    ($fn_name:ident, $field:ident, $ty:ty, $id:expr, [$($kind:expr),+], [$($change:ident),+]) => {
        /// Retrieve the status structure; change counters reset and the
        /// status-changes bit clears.
        pub fn $fn_name(entity: Entity) -> Result<$ty> {
            let rec = lookup_kind(entity, &[$($kind),+])?;
            let mut c = rec.common.lock();
            let out = c.statuses.$field;
            $( c.statuses.$field.$change = 0; )+
            c.status_changes &= !$id.mask();
            Ok(out)
        }
    };
}

use super::status::{
    InconsistentTopicStatus, LivelinessChangedStatus, LivelinessLostStatus,
    OfferedDeadlineMissedStatus, OfferedIncompatibleQosStatus, PublicationMatchedStatus,
    RequestedDeadlineMissedStatus, RequestedIncompatibleQosStatus, SampleLostStatus,
    SampleRejectedStatus, SubscriptionMatchedStatus,
};

status_getter!(
    get_inconsistent_topic_status,
    inconsistent_topic,
    InconsistentTopicStatus,
    StatusId::InconsistentTopic,
    [EntityKind::Topic],
    [total_count_change]
);
status_getter!(
    get_offered_deadline_missed_status,
    offered_deadline_missed,
    OfferedDeadlineMissedStatus,
    StatusId::OfferedDeadlineMissed,
    [EntityKind::Writer],
    [total_count_change]
);
status_getter!(
    get_requested_deadline_missed_status,
    requested_deadline_missed,
    RequestedDeadlineMissedStatus,
    StatusId::RequestedDeadlineMissed,
    [EntityKind::Reader],
    [total_count_change]
);
status_getter!(
    get_offered_incompatible_qos_status,
    offered_incompatible_qos,
    OfferedIncompatibleQosStatus,
    StatusId::OfferedIncompatibleQos,
    [EntityKind::Writer],
    [total_count_change]
);
status_getter!(
    get_requested_incompatible_qos_status,
    requested_incompatible_qos,
    RequestedIncompatibleQosStatus,
    StatusId::RequestedIncompatibleQos,
    [EntityKind::Reader],
    [total_count_change]
);
status_getter!(
    get_sample_lost_status,
    sample_lost,
    SampleLostStatus,
    StatusId::SampleLost,
    [EntityKind::Reader],
    [total_count_change]
);
status_getter!(
    get_sample_rejected_status,
    sample_rejected,
    SampleRejectedStatus,
    StatusId::SampleRejected,
    [EntityKind::Reader],
    [total_count_change]
);
status_getter!(
    get_liveliness_lost_status,
    liveliness_lost,
    LivelinessLostStatus,
    StatusId::LivelinessLost,
    [EntityKind::Writer],
    [total_count_change]
);
status_getter!(
    get_liveliness_changed_status,
    liveliness_changed,
    LivelinessChangedStatus,
    StatusId::LivelinessChanged,
    [EntityKind::Reader],
    [alive_count_change, not_alive_count_change]
);
status_getter!(
    get_publication_matched_status,
    publication_matched,
    PublicationMatchedStatus,
    StatusId::PublicationMatched,
    [EntityKind::Writer],
    [total_count_change, current_count_change]
);
status_getter!(
    get_subscription_matched_status,
    subscription_matched,
    SubscriptionMatchedStatus,
    StatusId::SubscriptionMatched,
    [EntityKind::Reader],
    [total_count_change, current_count_change]
);
