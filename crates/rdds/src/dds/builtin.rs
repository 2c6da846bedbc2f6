// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Builtin-topic projection.
//!
//! Four pseudo-topics with fixed handles expose discovered participants,
//! topics and endpoints as readable snapshots. Keys are network-stable
//! GUIDs, so a builtin sample identifies the same remote entity across
//! reads and processes.

use std::sync::Arc;

use super::entity::{lookup_kind, registry, EntityKind, EntityRec};
use super::{Entity, MIN_PSEUDO_HANDLE};
use crate::core::types::{Guid, InstanceHandle};
use crate::qos::Qos;
use crate::retcode::{ReturnCode, Result};

/// Pseudo-handle of the participants builtin topic.
pub const BUILTIN_TOPIC_DCPSPARTICIPANT: Entity = MIN_PSEUDO_HANDLE + 1;
/// Pseudo-handle of the topics builtin topic.
pub const BUILTIN_TOPIC_DCPSTOPIC: Entity = MIN_PSEUDO_HANDLE + 2;
/// Pseudo-handle of the publications builtin topic.
pub const BUILTIN_TOPIC_DCPSPUBLICATION: Entity = MIN_PSEUDO_HANDLE + 3;
/// Pseudo-handle of the subscriptions builtin topic.
pub const BUILTIN_TOPIC_DCPSSUBSCRIPTION: Entity = MIN_PSEUDO_HANDLE + 4;
/// Pseudo-handle selecting plain heap allocation in loan-aware allocators.
pub const DATA_ALLOCATOR_ALLOC_ON_HEAP: Entity = MIN_PSEUDO_HANDLE + 257;

/// One discovered participant.
#[derive(Debug, Clone)]
pub struct ParticipantBuiltinTopicData {
    pub key: Guid,
    pub user_data: Vec<u8>,
    pub entity_name: String,
}

/// One discovered topic.
#[derive(Debug, Clone)]
pub struct TopicBuiltinTopicData {
    pub key: Guid,
    pub topic_name: String,
    pub type_name: String,
    pub qos: Qos,
}

/// One discovered endpoint (publication or subscription).
#[derive(Debug, Clone)]
pub struct EndpointBuiltinTopicData {
    pub key: Guid,
    pub participant_key: Guid,
    pub participant_instance_handle: InstanceHandle,
    pub topic_name: String,
    pub type_name: String,
    pub qos: Qos,
}

/// Build the builtin-endpoint sample for a reader or writer record.
pub(crate) fn endpoint_data(rec: &Arc<EntityRec>) -> Result<EndpointBuiltinTopicData> {
    let (key, participant, qos) = {
        let c = rec.common.lock();
        (c.guid, c.participant, c.qos.deep_clone())
    };
    let prec = registry().lookup(participant)?;
    let (participant_key, participant_iid) = {
        let c = prec.common.lock();
        (c.guid, c.iid)
    };
    Ok(EndpointBuiltinTopicData {
        key,
        participant_key,
        participant_instance_handle: participant_iid,
        topic_name: qos.topic_name().unwrap_or("").to_string(),
        type_name: qos.type_name().unwrap_or("").to_string(),
        qos,
    })
}

fn domain_children(participant: Entity) -> Result<(u32, Vec<Entity>)> {
    let prec = lookup_kind(participant, &[EntityKind::Participant])?;
    let domain_id = prec.common.lock().domain_id;
    let domain = registry()
        .domains
        .get(&domain_id)
        .map(|d| *d)
        .ok_or(ReturnCode::PreconditionNotMet)?;
    let drec = registry().lookup(domain)?;
    let children = drec.common.lock().children.clone();
    Ok((domain_id, children))
}

fn walk_entities(root: Entity, out: &mut Vec<Entity>) {
    let Ok(rec) = registry().lookup(root) else {
        return;
    };
    out.push(root);
    let children = rec.common.lock().children.clone();
    for child in children {
        walk_entities(child, out);
    }
}

/// Snapshot the participants visible in the caller's domain.
pub fn read_participants(participant: Entity) -> Result<Vec<ParticipantBuiltinTopicData>> {
    let (_, participants) = domain_children(participant)?;
    let mut out = Vec::new();
    for p in participants {
        let Ok(prec) = registry().lookup(p) else {
            continue;
        };
        let c = prec.common.lock();
        if c.kind != EntityKind::Participant {
            continue;
        }
        out.push(ParticipantBuiltinTopicData {
            key: c.guid,
            user_data: c.qos.user_data().unwrap_or(&[]).to_vec(),
            entity_name: c.name.clone(),
        });
    }
    Ok(out)
}

/// Snapshot the topics visible in the caller's domain.
pub fn read_topics(participant: Entity) -> Result<Vec<TopicBuiltinTopicData>> {
    let samples = collect_kind(participant, EntityKind::Topic)?;
    Ok(samples
        .into_iter()
        .filter_map(|e| {
            let rec = registry().lookup(e).ok()?;
            let c = rec.common.lock();
            Some(TopicBuiltinTopicData {
                key: c.guid,
                topic_name: c.qos.topic_name().unwrap_or("").to_string(),
                type_name: c.qos.type_name().unwrap_or("").to_string(),
                qos: c.qos.deep_clone(),
            })
        })
        .collect())
}

/// Snapshot the publications visible in the caller's domain.
pub fn read_publications(participant: Entity) -> Result<Vec<EndpointBuiltinTopicData>> {
    let writers = collect_kind(participant, EntityKind::Writer)?;
    writers
        .into_iter()
        .filter_map(|e| registry().lookup(e).ok())
        .map(|rec| endpoint_data(&rec))
        .collect()
}

/// Snapshot the subscriptions visible in the caller's domain.
pub fn read_subscriptions(participant: Entity) -> Result<Vec<EndpointBuiltinTopicData>> {
    let readers = collect_kind(participant, EntityKind::Reader)?;
    readers
        .into_iter()
        .filter_map(|e| registry().lookup(e).ok())
        .map(|rec| endpoint_data(&rec))
        .collect()
}

fn collect_kind(participant: Entity, kind: EntityKind) -> Result<Vec<Entity>> {
    let (_, participants) = domain_children(participant)?;
    let mut all = Vec::new();
    for p in participants {
        walk_entities(p, &mut all);
    }
    Ok(all
        .into_iter()
        .filter(|e| {
            registry()
                .lookup(*e)
                .map(|r| r.common.lock().kind == kind)
                .unwrap_or(false)
        })
        .collect())
}

/// Whether a handle names one of the four builtin pseudo-topics.
#[must_use]
pub fn is_builtin_topic(entity: Entity) -> bool {
    (BUILTIN_TOPIC_DCPSPARTICIPANT..=BUILTIN_TOPIC_DCPSSUBSCRIPTION).contains(&entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pseudo_handles_fixed_and_distinct() {
        assert_eq!(BUILTIN_TOPIC_DCPSPARTICIPANT, 0x7fff_0001);
        assert_eq!(BUILTIN_TOPIC_DCPSTOPIC, 0x7fff_0002);
        assert_eq!(BUILTIN_TOPIC_DCPSPUBLICATION, 0x7fff_0003);
        assert_eq!(BUILTIN_TOPIC_DCPSSUBSCRIPTION, 0x7fff_0004);
    }

    #[test]
    fn test_is_builtin_topic() {
        assert!(is_builtin_topic(BUILTIN_TOPIC_DCPSPARTICIPANT));
        assert!(is_builtin_topic(BUILTIN_TOPIC_DCPSSUBSCRIPTION));
        assert!(!is_builtin_topic(1));
        assert!(!is_builtin_topic(MIN_PSEUDO_HANDLE + 5));
    }
}
