// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Topics.
//!
//! A topic binds a name to a type descriptor and a QoS set within one
//! participant. Creating a second topic with the same name but a different
//! type raises INCONSISTENT_TOPIC on the existing one and fails.
//!
//! A topic may carry a content filter in one of four shapes. Filters are
//! fixed at creation time; mutating a filter on a topic shared by live
//! readers is not supported (the construction-time-only rule sidesteps the
//! thread-safety hazard of swapping filters under concurrent delivery).

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use super::entity::{
    lookup_kind, raise, register_entity, registry, EntityKind, EntitySpecific, NewEntity,
};
use super::listener::{Listener, StatusEvent};
use super::rhc::SampleInfo;
use super::Entity;
use crate::core::ser::{TypeDescriptor, TOPIC_RESTRICT_DATA_REPRESENTATION};
use crate::core::types::Guid;
use crate::qos::policy::DataRepresentationId;
use crate::qos::{Qos, QP_DATA_REPRESENTATION};
use crate::retcode::{ReturnCode, Result};
use crate::time::Duration;

/// Opaque filter argument shared into the filter calls.
pub type FilterArg = Arc<dyn Any + Send + Sync>;

type SampleFn = Arc<dyn Fn(*const u8) -> bool + Send + Sync>;
type SampleArgFn = Arc<dyn Fn(*const u8, &FilterArg) -> bool + Send + Sync>;
type SampleInfoArgFn = Arc<dyn Fn(&SampleInfo, &FilterArg) -> bool + Send + Sync>;
type SampleInfoSampleArgFn = Arc<dyn Fn(*const u8, &SampleInfo, &FilterArg) -> bool + Send + Sync>;

/// Content filter attached to a topic, in one of the four supported shapes.
#[derive(Clone, Default)]
pub enum TopicFilter {
    #[default]
    None,
    /// `sample -> bool`
    Sample(SampleFn),
    /// `(sample, arg) -> bool`
    SampleArg(SampleArgFn, FilterArg),
    /// `(sample_info, arg) -> bool`
    SampleInfoArg(SampleInfoArgFn, FilterArg),
    /// `(sample, sample_info, arg) -> bool`
    SampleSampleInfoArg(SampleInfoSampleArgFn, FilterArg),
}

impl TopicFilter {
    /// Typed one-argument filter.
    pub fn sample<T: 'static>(f: impl Fn(&T) -> bool + Send + Sync + 'static) -> TopicFilter {
        TopicFilter::Sample(Arc::new(move |p| {
            // SAFETY: delivery always passes a sample of the topic's type.
            f(unsafe { &*(p as *const T) })
        }))
    }

    /// Typed filter with an application argument.
    pub fn sample_arg<T: 'static>(
        f: impl Fn(&T, &FilterArg) -> bool + Send + Sync + 'static,
        arg: FilterArg,
    ) -> TopicFilter {
        TopicFilter::SampleArg(
            Arc::new(move |p, a| {
                // SAFETY: as above.
                f(unsafe { &*(p as *const T) }, a)
            }),
            arg,
        )
    }

    /// Evaluate against a sample pointer and its (possibly minimal) info.
    pub(crate) fn eval(&self, sample: *const u8, info: &SampleInfo) -> bool {
        match self {
            TopicFilter::None => true,
            TopicFilter::Sample(f) => f(sample),
            TopicFilter::SampleArg(f, arg) => f(sample, arg),
            TopicFilter::SampleInfoArg(f, arg) => f(info, arg),
            TopicFilter::SampleSampleInfoArg(f, arg) => f(sample, info, arg),
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, TopicFilter::None)
    }
}

/// Per-topic state.
pub(crate) struct TopicRec {
    pub descriptor: &'static TypeDescriptor,
    pub filter: TopicFilter,
}

/// Check a QoS data-representation list against a descriptor restriction.
fn check_representation_restriction(desc: &TypeDescriptor, qos: &Qos) -> Result<()> {
    if desc.flagset & TOPIC_RESTRICT_DATA_REPRESENTATION == 0 {
        return Ok(());
    }
    if let Some(ids) = qos.data_representation() {
        for id in ids {
            let bit = match id {
                DataRepresentationId::Xcdr1 => 1 << 0,
                DataRepresentationId::Xml => 1 << 1,
                DataRepresentationId::Xcdr2 => 1 << 2,
            };
            if desc.restrict_data_representation & bit == 0 {
                return Err(ReturnCode::BadParameter);
            }
        }
    }
    Ok(())
}

/// Create a topic on a participant.
pub fn create_topic(
    participant: Entity,
    descriptor: &'static TypeDescriptor,
    name: &str,
    qos: Option<Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    create_topic_with_filter(participant, descriptor, name, qos, listener, TopicFilter::None)
}

/// Create a topic carrying a content filter. The filter is fixed for the
/// topic's lifetime.
pub fn create_topic_with_filter(
    participant: Entity,
    descriptor: &'static TypeDescriptor,
    name: &str,
    qos: Option<Qos>,
    listener: Option<Listener>,
    filter: TopicFilter,
) -> Result<Entity> {
    if name.is_empty() {
        return Err(ReturnCode::BadParameter);
    }
    let prec = lookup_kind(participant, &[EntityKind::Participant])?;
    let mut effective = qos.unwrap_or_default();
    effective.validate()?;
    effective.merge_missing(&Qos::default_topic(), !0u64);
    effective.set_topic_name(name);
    effective.set_type_name(descriptor.type_name);
    effective.check_consistency()?;
    check_representation_restriction(descriptor, &effective)?;

    // A same-named topic must carry the same type.
    let children = prec.common.lock().children.clone();
    for child in children {
        let Ok(crec) = registry().lookup(child) else {
            continue;
        };
        if let EntitySpecific::Topic(t) = &crec.specific {
            let existing_name = crec.common.lock().qos.topic_name().unwrap_or("").to_string();
            if existing_name == name {
                if t.descriptor.type_name == descriptor.type_name {
                    // Topics are shared per name; hand back the existing one.
                    return Ok(child);
                }
                raise(&crec, |c| {
                    c.statuses.inconsistent_topic.total_count += 1;
                    c.statuses.inconsistent_topic.total_count_change += 1;
                    StatusEvent::InconsistentTopic(child, c.statuses.inconsistent_topic)
                });
                log::warn!(
                    "[topic] inconsistent type for '{}': {} vs {}",
                    name,
                    t.descriptor.type_name,
                    descriptor.type_name
                );
                return Err(ReturnCode::PreconditionNotMet);
            }
        }
    }

    let domain_id = prec.common.lock().domain_id;
    let entity_name = match effective.entity_name() {
        Some(n) => n.to_string(),
        None => match &prec.specific {
            EntitySpecific::Participant(p) => p.default_name(),
            _ => String::new(),
        },
    };

    let (handle, _) = register_entity(NewEntity {
        kind: EntityKind::Topic,
        parent: participant,
        participant,
        domain_id,
        qos: effective,
        listener,
        enabled: true,
        implicit: false,
        guid: Guid::generate(),
        name: entity_name,
        specific: EntitySpecific::Topic(TopicRec { descriptor, filter }),
    })?;
    Ok(handle)
}

/// Find a topic by name, waiting up to `timeout` for it to appear.
pub fn find_topic(participant: Entity, name: &str, timeout: Duration) -> Result<Entity> {
    let deadline = timeout.to_std().map(|d| Instant::now() + d);
    loop {
        let prec = lookup_kind(participant, &[EntityKind::Participant])?;
        let children = prec.common.lock().children.clone();
        for child in children {
            let Ok(crec) = registry().lookup(child) else {
                continue;
            };
            if matches!(crec.specific, EntitySpecific::Topic(_))
                && crec.common.lock().qos.topic_name() == Some(name)
            {
                return Ok(child);
            }
        }
        match deadline {
            Some(deadline) if Instant::now() >= deadline => return Err(ReturnCode::Timeout),
            None if timeout.is_infinite() => {}
            None => return Err(ReturnCode::Timeout),
            _ => {}
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
}

/// Descriptor of the type behind a topic.
pub(crate) fn descriptor_of(topic: Entity) -> Result<&'static TypeDescriptor> {
    let rec = lookup_kind(topic, &[EntityKind::Topic])?;
    match &rec.specific {
        EntitySpecific::Topic(t) => Ok(t.descriptor),
        _ => Err(ReturnCode::IllegalOperation),
    }
}

/// The data representation a writer of this topic puts on the wire: the
/// first entry of its QoS list.
pub(crate) fn preferred_representation(qos: &Qos) -> crate::core::ser::XcdrVersion {
    let first = if qos.is_present(QP_DATA_REPRESENTATION) {
        qos.data_representation().and_then(|ids| ids.first().copied())
    } else {
        None
    };
    match first {
        Some(DataRepresentationId::Xcdr2) => crate::core::ser::XcdrVersion::Xcdr2,
        _ => crate::core::ser::XcdrVersion::Xcdr1,
    }
}
