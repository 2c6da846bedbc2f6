// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Read, query and guard conditions.
//!
//! Read and query conditions share their reader's history: reading or
//! taking through any associated entity updates sample states for all of
//! them, so a condition's trigger reflects the cache as it stands, not a
//! private copy. Guard conditions are plain application-owned booleans.

use std::sync::atomic::{AtomicBool, Ordering};

use super::entity::{
    lookup_kind, register_entity, EntityKind, EntitySpecific, NewEntity,
};
use super::rhc::ANY_STATE;
use super::Entity;
use crate::core::ser::deserialize::deserialize_sample;
use crate::core::ser::free::{free_sample, FreeScope};
use crate::core::ser::sample::alloc_raw;
use crate::core::ser::TopicType;
use crate::core::serdata::{Serdata, SerdataKind};
use crate::core::types::Guid;
use crate::qos::Qos;
use crate::retcode::{ReturnCode, Result};

/// Serdata-level predicate for query conditions.
pub(crate) type SerdataPredicate = Box<dyn Fn(&Serdata) -> bool + Send + Sync>;

pub(crate) struct ReadCondRec {
    pub reader: Entity,
    pub mask: u32,
}

pub(crate) struct QueryCondRec {
    pub reader: Entity,
    pub mask: u32,
    pub predicate: SerdataPredicate,
}

#[derive(Debug, Default)]
pub(crate) struct GuardCondRec {
    pub trigger: AtomicBool,
}

fn condition_parent(reader: Entity) -> Result<(Entity, u32)> {
    let rec = lookup_kind(reader, &[EntityKind::Reader])?;
    let c = rec.common.lock();
    Ok((c.participant, c.domain_id))
}

/// Create a read condition on a reader with a sample/view/instance state
/// mask (zero selects everything).
pub fn create_readcondition(reader: Entity, mask: u32) -> Result<Entity> {
    if mask & !ANY_STATE != 0 {
        return Err(ReturnCode::BadParameter);
    }
    let (participant, domain_id) = condition_parent(reader)?;
    let (handle, _) = register_entity(NewEntity {
        kind: EntityKind::ReadCondition,
        parent: reader,
        participant,
        domain_id,
        qos: Qos::new(),
        listener: None,
        enabled: true,
        implicit: false,
        guid: Guid::NIL,
        name: String::new(),
        specific: EntitySpecific::ReadCondition(ReadCondRec { reader, mask }),
    })?;
    Ok(handle)
}

/// Create a query condition: a read condition with a typed sample filter.
///
/// The filter runs against deserialized valid samples; invalid (key-only)
/// samples never satisfy it.
pub fn create_querycondition<T, F>(reader: Entity, mask: u32, filter: F) -> Result<Entity>
where
    T: TopicType,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    if mask & !ANY_STATE != 0 {
        return Err(ReturnCode::BadParameter);
    }
    let (participant, domain_id) = condition_parent(reader)?;
    let desc = T::descriptor();
    let predicate: SerdataPredicate = Box::new(move |sd: &Serdata| {
        if sd.kind != SerdataKind::Data {
            return false;
        }
        let sample = alloc_raw(desc);
        if sample.is_null() {
            return false;
        }
        // SAFETY: freshly zero-allocated sample matching the descriptor.
        let verdict = unsafe {
            match deserialize_sample(desc, &sd.payload, sample, 0) {
                Ok(()) => filter(&*(sample as *const T)),
                Err(_) => false,
            }
        };
        // SAFETY: sample allocated above; partially filled state frees
        // cleanly because deserialization nulls what it did not reach.
        unsafe {
            let _ = free_sample(desc, sample, FreeScope::Sample);
        }
        verdict
    });
    let (handle, _) = register_entity(NewEntity {
        kind: EntityKind::QueryCondition,
        parent: reader,
        participant,
        domain_id,
        qos: Qos::new(),
        listener: None,
        enabled: true,
        implicit: false,
        guid: Guid::NIL,
        name: String::new(),
        specific: EntitySpecific::QueryCondition(QueryCondRec {
            reader,
            mask,
            predicate,
        }),
    })?;
    Ok(handle)
}

/// Create a guard condition owned by a participant, triggered by the
/// application.
pub fn create_guardcondition(participant: Entity) -> Result<Entity> {
    let prec = lookup_kind(participant, &[EntityKind::Participant])?;
    let domain_id = prec.common.lock().domain_id;
    let (handle, _) = register_entity(NewEntity {
        kind: EntityKind::GuardCondition,
        parent: participant,
        participant,
        domain_id,
        qos: Qos::new(),
        listener: None,
        enabled: true,
        implicit: false,
        guid: Guid::NIL,
        name: String::new(),
        specific: EntitySpecific::GuardCondition(GuardCondRec::default()),
    })?;
    Ok(handle)
}

/// Set a guard condition's trigger value.
pub fn set_guardcondition(guard: Entity, value: bool) -> Result<()> {
    let rec = lookup_kind(guard, &[EntityKind::GuardCondition])?;
    let EntitySpecific::GuardCondition(g) = &rec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    g.trigger.store(value, Ordering::Release);
    if value {
        let waitsets = rec.common.lock().waitsets.clone();
        for ws in waitsets {
            super::waitset::notify(ws);
        }
    }
    Ok(())
}

/// Read the trigger value without changing it.
pub fn read_guardcondition(guard: Entity) -> Result<bool> {
    let rec = lookup_kind(guard, &[EntityKind::GuardCondition])?;
    let EntitySpecific::GuardCondition(g) = &rec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    Ok(g.trigger.load(Ordering::Acquire))
}

/// Read the trigger value and reset it to false.
pub fn take_guardcondition(guard: Entity) -> Result<bool> {
    let rec = lookup_kind(guard, &[EntityKind::GuardCondition])?;
    let EntitySpecific::GuardCondition(g) = &rec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    Ok(g.trigger.swap(false, Ordering::AcqRel))
}

/// The state mask of a read or query condition.
pub fn get_mask(condition: Entity) -> Result<u32> {
    let rec = lookup_kind(
        condition,
        &[EntityKind::ReadCondition, EntityKind::QueryCondition],
    )?;
    match &rec.specific {
        EntitySpecific::ReadCondition(rc) => Ok(rc.mask),
        EntitySpecific::QueryCondition(qc) => Ok(qc.mask),
        _ => Err(ReturnCode::IllegalOperation),
    }
}
