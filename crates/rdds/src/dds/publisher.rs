// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Publishers.
//!
//! A publisher groups writers and scopes the PARTITION and PRESENTATION
//! policies. `begin_coherent`/`end_coherent` bracket a coherent set: while
//! open, samples written by the publisher's writers are buffered and become
//! visible to readers atomically at the close.

use std::sync::Arc;

use parking_lot::Mutex;

use super::entity::{
    lookup_kind, register_entity, registry, EntityKind, EntitySpecific, NewEntity,
};
use super::listener::Listener;
use super::Entity;
use crate::core::serdata::Serdata;
use crate::core::types::{Guid, InstanceHandle};
use crate::qos::Qos;
use crate::retcode::{ReturnCode, Result};

/// One delivery buffered inside an open coherent set.
pub(crate) struct PendingCoherent {
    pub writer: Entity,
    pub serdata: Arc<Serdata>,
    pub instance: InstanceHandle,
}

/// Per-publisher state.
#[derive(Default)]
pub(crate) struct PublisherRec {
    /// `Some` while a coherent set is open.
    pub coherent: Mutex<Option<Vec<PendingCoherent>>>,
}

/// Create a publisher on a participant.
pub fn create_publisher(
    participant: Entity,
    qos: Option<Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    create_publisher_impl(participant, qos, listener, false)
}

pub(crate) fn create_publisher_impl(
    participant: Entity,
    qos: Option<Qos>,
    listener: Option<Listener>,
    implicit: bool,
) -> Result<Entity> {
    let prec = lookup_kind(participant, &[EntityKind::Participant])?;
    let mut effective = qos.unwrap_or_default();
    effective.validate()?;
    effective.merge_missing(&Qos::default_publisher(), !0u64);
    effective.check_consistency()?;
    let (domain_id, enabled, autoenable) = {
        let c = prec.common.lock();
        (
            c.domain_id,
            c.enabled,
            c.qos.entity_factory_autoenable().unwrap_or(true),
        )
    };
    let entity_name = match effective.entity_name() {
        Some(n) => n.to_string(),
        None => match &prec.specific {
            EntitySpecific::Participant(p) => p.default_name(),
            _ => String::new(),
        },
    };
    let (handle, _) = register_entity(NewEntity {
        kind: EntityKind::Publisher,
        parent: participant,
        participant,
        domain_id,
        qos: effective,
        listener,
        enabled: enabled && autoenable,
        implicit,
        guid: Guid::NIL,
        name: entity_name,
        specific: EntitySpecific::Publisher(PublisherRec::default()),
    })?;
    Ok(handle)
}

/// Reuse the participant's implicit publisher or create it.
pub(crate) fn find_or_create_implicit_publisher(participant: Entity) -> Result<Entity> {
    let prec = lookup_kind(participant, &[EntityKind::Participant])?;
    let children = prec.common.lock().children.clone();
    for child in children {
        if let Ok(crec) = registry().lookup(child) {
            let c = crec.common.lock();
            if c.kind == EntityKind::Publisher && c.implicit {
                return Ok(child);
            }
        }
    }
    create_publisher_impl(participant, None, None, true)
}

fn publisher_of(entity: Entity) -> Result<Entity> {
    let rec = registry().lookup(entity)?;
    let kind = rec.common.lock().kind;
    match kind {
        EntityKind::Publisher => Ok(entity),
        EntityKind::Writer => Ok(rec.common.lock().parent),
        EntityKind::Subscriber | EntityKind::Reader => Err(ReturnCode::IllegalOperation),
        _ => Err(ReturnCode::IllegalOperation),
    }
}

/// Open a coherent set on a publisher (or a writer's publisher). Requires
/// coherent access in the PRESENTATION policy.
pub fn begin_coherent(entity: Entity) -> Result<()> {
    // Subscriber-side access bracketing is a separate surface; accept
    // subscribers as a no-op validation there.
    let rec = registry().lookup(entity)?;
    let kind = rec.common.lock().kind;
    if matches!(kind, EntityKind::Subscriber | EntityKind::Reader) {
        return super::subscriber::begin_access(entity);
    }
    let publisher = publisher_of(entity)?;
    let prec = lookup_kind(publisher, &[EntityKind::Publisher])?;
    if !prec.common.lock().qos.presentation.coherent_access {
        return Err(ReturnCode::PreconditionNotMet);
    }
    let EntitySpecific::Publisher(p) = &prec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    let mut coherent = p.coherent.lock();
    if coherent.is_none() {
        *coherent = Some(Vec::new());
    }
    Ok(())
}

/// Close the coherent set; all buffered samples become visible together.
pub fn end_coherent(entity: Entity) -> Result<()> {
    let rec = registry().lookup(entity)?;
    let kind = rec.common.lock().kind;
    if matches!(kind, EntityKind::Subscriber | EntityKind::Reader) {
        return super::subscriber::end_access(entity);
    }
    let publisher = publisher_of(entity)?;
    let prec = lookup_kind(publisher, &[EntityKind::Publisher])?;
    let EntitySpecific::Publisher(p) = &prec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    let pending = p.coherent.lock().take();
    let Some(pending) = pending else {
        return Err(ReturnCode::PreconditionNotMet);
    };
    for item in pending {
        super::domain_registry::deliver(item.writer, &item.serdata, item.instance);
    }
    Ok(())
}

/// Buffer a delivery if the writer's publisher has a coherent set open.
/// Returns true when buffered.
pub(crate) fn stash_if_coherent(
    publisher: Entity,
    writer: Entity,
    serdata: &Arc<Serdata>,
    instance: InstanceHandle,
) -> bool {
    let Ok(prec) = registry().lookup(publisher) else {
        return false;
    };
    let EntitySpecific::Publisher(p) = &prec.specific else {
        return false;
    };
    let mut coherent = p.coherent.lock();
    match coherent.as_mut() {
        Some(buf) => {
            buf.push(PendingCoherent {
                writer,
                serdata: Arc::clone(serdata),
                instance,
            });
            true
        }
        None => false,
    }
}
