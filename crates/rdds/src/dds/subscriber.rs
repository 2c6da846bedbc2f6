// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Subscribers.

use super::entity::{
    lookup_kind, raise, register_entity, registry, EntityKind, EntitySpecific, NewEntity,
};
use super::listener::{Listener, StatusEvent};
use super::Entity;
use crate::core::types::Guid;
use crate::qos::Qos;
use crate::retcode::{ReturnCode, Result};

/// Create a subscriber on a participant.
pub fn create_subscriber(
    participant: Entity,
    qos: Option<Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    create_subscriber_impl(participant, qos, listener, false)
}

pub(crate) fn create_subscriber_impl(
    participant: Entity,
    qos: Option<Qos>,
    listener: Option<Listener>,
    implicit: bool,
) -> Result<Entity> {
    let prec = lookup_kind(participant, &[EntityKind::Participant])?;
    let mut effective = qos.unwrap_or_default();
    effective.validate()?;
    effective.merge_missing(&Qos::default_subscriber(), !0u64);
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
        kind: EntityKind::Subscriber,
        parent: participant,
        participant,
        domain_id,
        qos: effective,
        listener,
        enabled: enabled && autoenable,
        implicit,
        guid: Guid::NIL,
        name: entity_name,
        specific: EntitySpecific::Subscriber,
    })?;
    Ok(handle)
}

/// Reuse the participant's implicit subscriber or create it.
pub(crate) fn find_or_create_implicit_subscriber(participant: Entity) -> Result<Entity> {
    let prec = lookup_kind(participant, &[EntityKind::Participant])?;
    let children = prec.common.lock().children.clone();
    for child in children {
        if let Ok(crec) = registry().lookup(child) {
            let c = crec.common.lock();
            if c.kind == EntityKind::Subscriber && c.implicit {
                return Ok(child);
            }
        }
    }
    create_subscriber_impl(participant, None, None, true)
}

/// Re-raise DATA_AVAILABLE for every reader that currently holds unread
/// data.
pub fn notify_readers(subscriber: Entity) -> Result<()> {
    let srec = lookup_kind(subscriber, &[EntityKind::Subscriber])?;
    let children = srec.common.lock().children.clone();
    for child in children {
        let Ok(crec) = registry().lookup(child) else {
            continue;
        };
        if let EntitySpecific::Reader(r) = &crec.specific {
            if r.rhc.unread_count() > 0 {
                raise(&crec, |_| StatusEvent::DataAvailable(child));
                super::domain_registry::notify_reader_conditions(child);
            }
        }
    }
    Ok(())
}

/// Subscriber-side access bracketing for coherent/ordered access. The
/// reader cache delivers coherent sets atomically already, so the brackets
/// validate state without buffering.
pub(crate) fn begin_access(entity: Entity) -> Result<()> {
    let subscriber = match lookup_kind(entity, &[EntityKind::Subscriber, EntityKind::Reader]) {
        Ok(rec) => {
            let c = rec.common.lock();
            if c.kind == EntityKind::Subscriber {
                entity
            } else {
                c.parent
            }
        }
        Err(rc) => return Err(rc),
    };
    let srec = lookup_kind(subscriber, &[EntityKind::Subscriber])?;
    if !srec.common.lock().qos.presentation.coherent_access {
        return Err(ReturnCode::PreconditionNotMet);
    }
    Ok(())
}

pub(crate) fn end_access(entity: Entity) -> Result<()> {
    begin_access(entity)
}
