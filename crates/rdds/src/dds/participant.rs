// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Domain participants.
//!
//! A participant is the application's entry into a domain and the factory
//! for every other entity. Creating the first participant in a domain
//! implicitly creates the domain entity (holding configuration, the
//! instance-handle map and the type library); deleting the last one tears
//! the domain down.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::domain::DomainRec;
use super::entity::{
    lookup_kind, register_entity, registry, EntityKind, EntitySpecific, NewEntity,
};
use super::listener::{Listener, ListenerDispatcher};
use super::{Entity, MIN_PSEUDO_HANDLE};
use crate::config::{resolve_config, DomainConfig, EntityNamingMode};
use crate::core::types::Guid;
use crate::qos::Qos;
use crate::retcode::{ReturnCode, Result};
use crate::rt::prng::{fancy_name, Prng, PrngSeed};
use crate::time::Time;

/// Per-participant state.
pub(crate) struct ParticipantRec {
    pub dispatcher: ListenerDispatcher,
    /// Seeded name generator for this participant's children.
    pub prng: Mutex<Prng>,
    pub naming_mode: EntityNamingMode,
    pub last_liveliness_assert: Mutex<Time>,
}

impl ParticipantRec {
    /// Draw a default name for a child entity; empty unless fancy naming is
    /// configured.
    pub(crate) fn default_name(&self) -> String {
        match self.naming_mode {
            EntityNamingMode::Empty => String::new(),
            EntityNamingMode::Fancy => fancy_name(&mut self.prng.lock()),
        }
    }
}

fn find_or_create_domain(domain_id: u32, config: Option<DomainConfig>) -> Result<Entity> {
    let reg = registry();
    if let Some(existing) = reg.domains.get(&domain_id) {
        return Ok(*existing);
    }
    let mut cfg = resolve_config(config, None)?;
    cfg.domain_id = domain_id;
    let (handle, _) = register_entity(NewEntity {
        kind: EntityKind::Domain,
        parent: 0,
        participant: 0,
        domain_id,
        qos: Qos::new(),
        listener: None,
        enabled: true,
        implicit: true,
        guid: Guid::NIL,
        name: String::new(),
        specific: EntitySpecific::Domain(DomainRec::new(cfg)),
    })?;
    // Another thread may have raced us; keep the winner.
    match reg.domains.entry(domain_id) {
        dashmap::mapref::entry::Entry::Occupied(e) => {
            let winner = *e.get();
            drop(e);
            super::entity::delete(handle).ok();
            Ok(winner)
        }
        dashmap::mapref::entry::Entry::Vacant(v) => {
            v.insert(handle);
            Ok(handle)
        }
    }
}

/// Create a participant in `domain_id` with the default domain
/// configuration.
pub fn create_participant(
    domain_id: u32,
    qos: Option<Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    create_participant_impl(domain_id, None, qos, listener)
}

/// Create a participant, supplying the domain configuration record. The
/// record only takes effect for the first participant of the domain.
pub fn create_participant_with_config(
    config: DomainConfig,
    qos: Option<Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    config.validate()?;
    let domain_id = config.domain_id;
    create_participant_impl(domain_id, Some(config), qos, listener)
}

/// Create a participant configuring its domain from an XML fragment. The
/// fragment only takes effect for the first participant of the domain.
pub fn create_participant_with_xml(
    xml: &str,
    qos: Option<Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    let config = resolve_config(None, Some(xml))?;
    let domain_id = config.domain_id;
    create_participant_impl(domain_id, Some(config), qos, listener)
}

fn create_participant_impl(
    domain_id: u32,
    config: Option<DomainConfig>,
    qos: Option<Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    let mut effective = qos.unwrap_or_default();
    effective.validate()?;
    effective.merge_missing(&Qos::default_participant(), !0u64);
    effective.check_consistency()?;

    let domain = find_or_create_domain(domain_id, config)?;
    let drec = registry().lookup(domain)?;
    let EntitySpecific::Domain(d) = &drec.specific else {
        return Err(ReturnCode::Error);
    };
    let cfg = d.config.snapshot();

    let seed = if cfg.entity_naming_seed != 0 {
        PrngSeed::from_u64(cfg.entity_naming_seed)
    } else {
        PrngSeed::make().unwrap_or_else(|_| PrngSeed::from_u64(crate::time::now().as_nanos() as u64))
    };
    let mut prng = Prng::new(seed);

    let name = match effective.entity_name() {
        Some(n) => n.to_string(),
        None => match cfg.entity_naming_mode {
            EntityNamingMode::Empty => String::new(),
            EntityNamingMode::Fancy => fancy_name(&mut prng),
        },
    };

    static DISPATCHER_ID: AtomicU64 = AtomicU64::new(1);
    let dispatcher = ListenerDispatcher::start(DISPATCHER_ID.fetch_add(1, Ordering::Relaxed) as Entity);

    let (handle, _) = register_entity(NewEntity {
        kind: EntityKind::Participant,
        parent: domain,
        participant: 0,
        domain_id,
        qos: effective,
        listener,
        enabled: true,
        implicit: false,
        guid: Guid::generate(),
        name,
        specific: EntitySpecific::Participant(ParticipantRec {
            dispatcher,
            prng: Mutex::new(prng),
            naming_mode: cfg.entity_naming_mode,
            last_liveliness_assert: Mutex::new(crate::time::now()),
        }),
    })?;
    log::debug!("[participant] created handle {} in domain {}", handle, domain_id);
    Ok(handle)
}

/// Explicit liveliness assertion for the manual liveliness kinds. Asserting
/// on a participant covers its manual-by-participant writers; asserting on
/// a writer covers just that writer. The automatic kind needs no calls.
pub fn assert_liveliness(entity: Entity) -> Result<()> {
    let rec = lookup_kind(entity, &[EntityKind::Participant, EntityKind::Writer])?;
    let now = crate::time::now();
    match &rec.specific {
        EntitySpecific::Participant(p) => {
            *p.last_liveliness_assert.lock() = now;
        }
        EntitySpecific::Writer(w) => {
            *w.last_liveliness_assert.lock() = now;
        }
        _ => return Err(ReturnCode::IllegalOperation),
    }
    Ok(())
}

/// Total participants currently alive in a domain (diagnostics).
pub fn participant_count(domain_id: u32) -> usize {
    let reg = registry();
    let Some(domain) = reg.domains.get(&domain_id).map(|d| *d) else {
        return 0;
    };
    match reg.lookup(domain) {
        Ok(drec) => drec
            .common
            .lock()
            .children
            .iter()
            .filter(|c| {
                reg.lookup(**c)
                    .map(|r| super::entity::kind_of(&r) == EntityKind::Participant)
                    .unwrap_or(false)
            })
            .count(),
        Err(_) => 0,
    }
}

/// The fixed pseudo-handle range never collides with real entities.
#[allow(dead_code)]
const _: () = assert!(MIN_PSEUDO_HANDLE > 0);
