// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Waitsets: blocking wait on attached entity triggers.
//!
//! A waitset holds an unordered set of attached entities, each with a
//! caller-chosen attachment token. `wait` blocks until at least one attached
//! entity's trigger predicate is true, returning the tokens of the triggered
//! attachments. Trigger predicates:
//!
//! - plain entities fire when any enabled status bit is raised,
//! - read/query conditions fire when their reader holds matching samples,
//! - guard conditions fire on their boolean,
//! - a waitset attached to itself fires on its own trigger flag.
//!
//! Wakeups use a generation counter: notifiers bump it under the waitset
//! lock, waiters re-evaluate whenever it moves, so a trigger can't slip
//! between evaluation and sleep. Deleting a waitset wakes every blocked
//! waiter with `AlreadyDeleted`.

use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use super::entity::{
    lookup_kind, register_entity, registry, EntityKind, EntityRec, EntitySpecific, NewEntity,
};
use super::Entity;
use crate::core::types::Guid;
use crate::qos::Qos;
use crate::retcode::{ReturnCode, Result};
use crate::time::{Duration, Time};

#[derive(Debug, Default)]
pub(crate) struct WaitsetState {
    attachments: Vec<(Entity, i64)>,
    closed: bool,
    /// Self-attachment trigger flag.
    trigger: bool,
    /// Bumped on every notification; guards against missed wakeups.
    generation: u64,
}

#[derive(Debug, Default)]
pub(crate) struct WaitsetRec {
    pub state: Mutex<WaitsetState>,
    pub cond: Condvar,
}

impl WaitsetRec {
    pub(crate) fn close(&self) {
        let mut st = self.state.lock();
        st.closed = true;
        st.generation += 1;
        self.cond.notify_all();
    }

    fn bump(&self) {
        let mut st = self.state.lock();
        st.generation += 1;
        self.cond.notify_all();
    }
}

/// Create a waitset owned by a participant.
pub fn create_waitset(participant: Entity) -> Result<Entity> {
    let prec = lookup_kind(participant, &[EntityKind::Participant])?;
    let (domain_id, enabled) = {
        let c = prec.common.lock();
        (c.domain_id, c.enabled)
    };
    if !enabled {
        return Err(ReturnCode::NotEnabled);
    }
    let (handle, _) = register_entity(NewEntity {
        kind: EntityKind::Waitset,
        parent: participant,
        participant,
        domain_id,
        qos: Qos::new(),
        listener: None,
        enabled: true,
        implicit: false,
        guid: Guid::NIL,
        name: String::new(),
        specific: EntitySpecific::Waitset(WaitsetRec::default()),
    })?;
    Ok(handle)
}

fn waitset_rec(waitset: Entity) -> Result<std::sync::Arc<EntityRec>> {
    lookup_kind(waitset, &[EntityKind::Waitset])
}

/// Attach an entity with a caller token. Re-attaching the same entity is
/// rejected.
pub fn waitset_attach(waitset: Entity, entity: Entity, token: i64) -> Result<()> {
    let wrec = waitset_rec(waitset)?;
    let erec = registry().lookup(entity)?;
    let EntitySpecific::Waitset(ws) = &wrec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    {
        let mut st = ws.state.lock();
        if st.closed {
            return Err(ReturnCode::AlreadyDeleted);
        }
        if st.attachments.iter().any(|(e, _)| *e == entity) {
            return Err(ReturnCode::PreconditionNotMet);
        }
        st.attachments.push((entity, token));
    }
    if entity != waitset {
        erec.common.lock().waitsets.push(waitset);
    }
    // The new attachment may already be triggered.
    ws.bump();
    Ok(())
}

pub fn waitset_detach(waitset: Entity, entity: Entity) -> Result<()> {
    let wrec = waitset_rec(waitset)?;
    let EntitySpecific::Waitset(ws) = &wrec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    {
        let mut st = ws.state.lock();
        let before = st.attachments.len();
        st.attachments.retain(|(e, _)| *e != entity);
        if st.attachments.len() == before {
            return Err(ReturnCode::PreconditionNotMet);
        }
    }
    if let Ok(erec) = registry().lookup(entity) {
        erec.common.lock().waitsets.retain(|w| *w != waitset);
    }
    ws.bump();
    Ok(())
}

/// Set the waitset's own trigger flag (observable when attached to itself).
pub fn waitset_set_trigger(waitset: Entity, value: bool) -> Result<()> {
    let wrec = waitset_rec(waitset)?;
    let EntitySpecific::Waitset(ws) = &wrec.specific else {
        return Err(ReturnCode::IllegalOperation);
    };
    {
        let mut st = ws.state.lock();
        st.trigger = value;
        st.generation += 1;
    }
    ws.cond.notify_all();
    Ok(())
}

/// Block until an attached entity triggers; returns the triggered tokens.
pub fn waitset_wait(waitset: Entity, timeout: Duration) -> Result<Vec<i64>> {
    let deadline = timeout.to_std().map(|d| Instant::now() + d);
    wait_impl(waitset, deadline, timeout == Duration::ZERO)
}

/// As [`waitset_wait`] with an absolute wall-clock deadline.
pub fn waitset_wait_until(waitset: Entity, deadline: Time) -> Result<Vec<i64>> {
    if deadline.is_never() {
        return wait_impl(waitset, None, false);
    }
    let remaining = deadline.duration_since(crate::time::now());
    let instant = remaining.to_std().map(|d| Instant::now() + d);
    wait_impl(waitset, instant, remaining == Duration::ZERO)
}

fn wait_impl(waitset: Entity, deadline: Option<Instant>, nonblocking: bool) -> Result<Vec<i64>> {
    loop {
        let wrec = waitset_rec(waitset)?;
        let EntitySpecific::Waitset(ws) = &wrec.specific else {
            return Err(ReturnCode::IllegalOperation);
        };

        let (attachments, generation) = {
            let st = ws.state.lock();
            if st.closed {
                return Err(ReturnCode::AlreadyDeleted);
            }
            (st.attachments.clone(), st.generation)
        };

        // Evaluate triggers without holding the waitset lock; the
        // generation check below catches anything that fired meanwhile.
        let mut triggered = Vec::new();
        for (entity, token) in &attachments {
            let fired = if *entity == waitset {
                ws.state.lock().trigger
            } else {
                match registry().lookup(*entity) {
                    Ok(rec) => entity_trigger(*entity, &rec),
                    Err(_) => false,
                }
            };
            if fired {
                triggered.push(*token);
            }
        }
        if !triggered.is_empty() {
            return Ok(triggered);
        }
        if nonblocking {
            return Err(ReturnCode::Timeout);
        }

        let mut st = ws.state.lock();
        if st.closed {
            return Err(ReturnCode::AlreadyDeleted);
        }
        if st.generation != generation {
            // Something fired while we were evaluating; go around.
            continue;
        }
        match deadline {
            None => ws.cond.wait(&mut st),
            Some(deadline) => {
                if ws.cond.wait_until(&mut st, deadline).timed_out() {
                    return Err(ReturnCode::Timeout);
                }
            }
        }
    }
}

/// Wake a waitset so its waiters re-evaluate triggers.
pub(crate) fn notify(waitset: Entity) {
    if let Ok(wrec) = registry().lookup(waitset) {
        if let EntitySpecific::Waitset(ws) = &wrec.specific {
            ws.bump();
        }
    }
}

/// Drop an attachment during entity deletion (no error when absent).
pub(crate) fn detach_silent(waitset: Entity, entity: Entity) {
    if let Ok(wrec) = registry().lookup(waitset) {
        if let EntitySpecific::Waitset(ws) = &wrec.specific {
            ws.state.lock().attachments.retain(|(e, _)| *e != entity);
            ws.bump();
        }
    }
}

/// Trigger predicate of one attached entity.
pub(crate) fn entity_trigger(entity: Entity, rec: &EntityRec) -> bool {
    match &rec.specific {
        EntitySpecific::GuardCondition(g) => g.trigger.load(std::sync::atomic::Ordering::Acquire),
        EntitySpecific::Waitset(w) => w.state.lock().trigger,
        EntitySpecific::ReadCondition(rc) => match registry().lookup(rc.reader) {
            Ok(reader) => match &reader.specific {
                EntitySpecific::Reader(r) => r.rhc.has_matching(rc.mask),
                _ => false,
            },
            Err(_) => false,
        },
        EntitySpecific::QueryCondition(qc) => match registry().lookup(qc.reader) {
            Ok(reader) => match &reader.specific {
                EntitySpecific::Reader(r) => {
                    r.rhc.has_matching_where(qc.mask, qc.predicate.as_ref())
                }
                _ => false,
            },
            Err(_) => false,
        },
        _ => {
            let c = rec.common.lock();
            let _ = entity;
            c.status_changes & c.status_mask != 0
        }
    }
}
