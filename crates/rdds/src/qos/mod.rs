// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Sparse QoS policy sets.
//!
//! A [`Qos`] is a sparse map from policy to value: a policy either has an
//! explicit value (its bit in the *present* mask is set) or falls back to
//! the DDS default on use. The *aliased* mask marks policies whose heap
//! values are still shared with another set and must be made exclusive
//! before the set outlives the source ([`Qos::unalias`]).
//!
//! Entity creation merges the user-supplied set over the per-kind default
//! set, so downstream consumers (matcher, caches) always see the relevant
//! policies present.

pub mod matcher;
pub mod policy;

use std::sync::Arc;

use crate::core::typelib::TypeInformation;
use crate::retcode::{ReturnCode, Result};
use crate::time::Duration;
use policy::{
    DataRepresentationId, DestinationOrderKind, DurabilityKind, DurabilityService, History,
    IgnoreLocalKind, Liveliness, LivelinessKind, OwnershipKind, Presentation, PropertyList,
    ReaderDataLifecycle, Reliability, ReliabilityKind, ResourceLimits, TypeConsistency,
};

/// Identifies a single policy, notably as the "reason" of a failed match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum QosPolicyId {
    Invalid = 0,
    UserData = 1,
    Durability = 2,
    Presentation = 3,
    Deadline = 4,
    LatencyBudget = 5,
    Ownership = 6,
    OwnershipStrength = 7,
    Liveliness = 8,
    TimeBasedFilter = 9,
    Partition = 10,
    Reliability = 11,
    DestinationOrder = 12,
    History = 13,
    ResourceLimits = 14,
    EntityFactory = 15,
    WriterDataLifecycle = 16,
    ReaderDataLifecycle = 17,
    TopicData = 18,
    GroupData = 19,
    TransportPriority = 20,
    Lifespan = 21,
    DurabilityService = 22,
    Property = 23,
    TypeConsistencyEnforcement = 24,
    DataRepresentation = 25,
}

// Present/aliased mask bit per policy. Topic name, type name, type
// information and entity name travel with the set though they are not
// policies proper.
pub const QP_TOPIC_NAME: u64 = 1 << 0;
pub const QP_TYPE_NAME: u64 = 1 << 1;
pub const QP_PRESENTATION: u64 = 1 << 2;
pub const QP_PARTITION: u64 = 1 << 3;
pub const QP_GROUP_DATA: u64 = 1 << 4;
pub const QP_TOPIC_DATA: u64 = 1 << 5;
pub const QP_DURABILITY: u64 = 1 << 6;
pub const QP_DURABILITY_SERVICE: u64 = 1 << 7;
pub const QP_DEADLINE: u64 = 1 << 8;
pub const QP_LATENCY_BUDGET: u64 = 1 << 9;
pub const QP_LIVELINESS: u64 = 1 << 10;
pub const QP_RELIABILITY: u64 = 1 << 11;
pub const QP_DESTINATION_ORDER: u64 = 1 << 12;
pub const QP_HISTORY: u64 = 1 << 13;
pub const QP_RESOURCE_LIMITS: u64 = 1 << 14;
pub const QP_TRANSPORT_PRIORITY: u64 = 1 << 15;
pub const QP_LIFESPAN: u64 = 1 << 16;
pub const QP_USER_DATA: u64 = 1 << 17;
pub const QP_OWNERSHIP: u64 = 1 << 18;
pub const QP_OWNERSHIP_STRENGTH: u64 = 1 << 19;
pub const QP_TIME_BASED_FILTER: u64 = 1 << 20;
pub const QP_WRITER_DATA_LIFECYCLE: u64 = 1 << 21;
pub const QP_READER_DATA_LIFECYCLE: u64 = 1 << 22;
pub const QP_ENTITY_FACTORY: u64 = 1 << 27;
pub const QP_IGNORE_LOCAL: u64 = 1 << 30;
pub const QP_PROPERTY: u64 = 1 << 31;
pub const QP_TYPE_CONSISTENCY: u64 = 1 << 32;
pub const QP_TYPE_INFORMATION: u64 = 1 << 33;
pub const QP_DATA_REPRESENTATION: u64 = 1 << 35;
pub const QP_ENTITY_NAME: u64 = 1 << 36;

/// Every defined bit.
pub const QP_ANY: u64 = QP_TOPIC_NAME
    | QP_TYPE_NAME
    | QP_PRESENTATION
    | QP_PARTITION
    | QP_GROUP_DATA
    | QP_TOPIC_DATA
    | QP_DURABILITY
    | QP_DURABILITY_SERVICE
    | QP_DEADLINE
    | QP_LATENCY_BUDGET
    | QP_LIVELINESS
    | QP_RELIABILITY
    | QP_DESTINATION_ORDER
    | QP_HISTORY
    | QP_RESOURCE_LIMITS
    | QP_TRANSPORT_PRIORITY
    | QP_LIFESPAN
    | QP_USER_DATA
    | QP_OWNERSHIP
    | QP_OWNERSHIP_STRENGTH
    | QP_TIME_BASED_FILTER
    | QP_WRITER_DATA_LIFECYCLE
    | QP_READER_DATA_LIFECYCLE
    | QP_ENTITY_FACTORY
    | QP_IGNORE_LOCAL
    | QP_PROPERTY
    | QP_TYPE_CONSISTENCY
    | QP_TYPE_INFORMATION
    | QP_DATA_REPRESENTATION
    | QP_ENTITY_NAME;

/// Policies the matcher compares requested-vs-offered.
pub const QP_RXO_MASK: u64 = QP_DURABILITY
    | QP_PRESENTATION
    | QP_DEADLINE
    | QP_LATENCY_BUDGET
    | QP_OWNERSHIP
    | QP_LIVELINESS
    | QP_RELIABILITY
    | QP_DESTINATION_ORDER
    | QP_DATA_REPRESENTATION;

/// Policies that may change after the entity is enabled.
pub const QP_CHANGEABLE_MASK: u64 = QP_USER_DATA
    | QP_TOPIC_DATA
    | QP_GROUP_DATA
    | QP_DEADLINE
    | QP_LATENCY_BUDGET
    | QP_OWNERSHIP_STRENGTH
    | QP_TIME_BASED_FILTER
    | QP_PARTITION
    | QP_TRANSPORT_PRIORITY
    | QP_LIFESPAN
    | QP_ENTITY_FACTORY
    | QP_WRITER_DATA_LIFECYCLE
    | QP_READER_DATA_LIFECYCLE;

/// Sparse QoS policy set.
#[derive(Debug, Clone)]
pub struct Qos {
    pub(crate) present: u64,
    pub(crate) aliased: u64,

    pub(crate) topic_name: String,
    pub(crate) type_name: String,
    pub(crate) entity_name: String,

    pub(crate) user_data: Arc<Vec<u8>>,
    pub(crate) topic_data: Arc<Vec<u8>>,
    pub(crate) group_data: Arc<Vec<u8>>,

    pub(crate) durability: DurabilityKind,
    pub(crate) durability_service: DurabilityService,
    pub(crate) presentation: Presentation,
    pub(crate) deadline: Duration,
    pub(crate) latency_budget: Duration,
    pub(crate) liveliness: Liveliness,
    pub(crate) reliability: Reliability,
    pub(crate) destination_order: DestinationOrderKind,
    pub(crate) history: History,
    pub(crate) resource_limits: ResourceLimits,
    pub(crate) transport_priority: i32,
    pub(crate) lifespan: Duration,
    pub(crate) ownership: OwnershipKind,
    pub(crate) ownership_strength: i32,
    pub(crate) time_based_filter: Duration,
    pub(crate) autodispose_unregistered: bool,
    pub(crate) reader_data_lifecycle: ReaderDataLifecycle,
    pub(crate) autoenable_created: bool,
    pub(crate) ignore_local: IgnoreLocalKind,
    pub(crate) partition: Arc<Vec<String>>,
    pub(crate) property: Arc<PropertyList>,
    pub(crate) type_consistency: TypeConsistency,
    pub(crate) type_information: Option<Arc<TypeInformation>>,
    pub(crate) data_representation: Arc<Vec<DataRepresentationId>>,
}

impl Default for Qos {
    fn default() -> Self {
        Self::new()
    }
}

impl Qos {
    /// Empty set: nothing present, everything defaulting on use.
    #[must_use]
    pub fn new() -> Self {
        Qos {
            present: 0,
            aliased: 0,
            topic_name: String::new(),
            type_name: String::new(),
            entity_name: String::new(),
            user_data: Arc::new(Vec::new()),
            topic_data: Arc::new(Vec::new()),
            group_data: Arc::new(Vec::new()),
            durability: DurabilityKind::Volatile,
            durability_service: DurabilityService::default(),
            presentation: Presentation::default(),
            deadline: Duration::INFINITY,
            latency_budget: Duration::ZERO,
            liveliness: Liveliness::default(),
            reliability: Reliability::default(),
            destination_order: DestinationOrderKind::ByReceptionTimestamp,
            history: History::KeepLast(1),
            resource_limits: ResourceLimits::default(),
            transport_priority: 0,
            lifespan: Duration::INFINITY,
            ownership: OwnershipKind::Shared,
            ownership_strength: 0,
            time_based_filter: Duration::ZERO,
            autodispose_unregistered: true,
            reader_data_lifecycle: ReaderDataLifecycle::default(),
            autoenable_created: true,
            ignore_local: IgnoreLocalKind::None,
            partition: Arc::new(Vec::new()),
            property: Arc::new(PropertyList::default()),
            type_consistency: TypeConsistency::default(),
            type_information: None,
            data_representation: Arc::new(vec![
                DataRepresentationId::Xcdr1,
                DataRepresentationId::Xcdr2,
            ]),
        }
    }

    #[must_use]
    pub const fn present_mask(&self) -> u64 {
        self.present
    }

    #[must_use]
    pub const fn aliased_mask(&self) -> u64 {
        self.aliased
    }

    #[must_use]
    pub const fn is_present(&self, bit: u64) -> bool {
        (self.present & bit) != 0
    }

    // ------------------------------------------------------------------
    // Setters. Each marks the policy present and owned (non-aliased).
    // ------------------------------------------------------------------

    pub fn set_topic_name(&mut self, name: &str) {
        self.topic_name = name.to_string();
        self.present |= QP_TOPIC_NAME;
        self.aliased &= !QP_TOPIC_NAME;
    }

    pub fn set_type_name(&mut self, name: &str) {
        self.type_name = name.to_string();
        self.present |= QP_TYPE_NAME;
        self.aliased &= !QP_TYPE_NAME;
    }

    pub fn set_entity_name(&mut self, name: &str) {
        self.entity_name = name.to_string();
        self.present |= QP_ENTITY_NAME;
        self.aliased &= !QP_ENTITY_NAME;
    }

    pub fn set_user_data(&mut self, data: &[u8]) {
        self.user_data = Arc::new(data.to_vec());
        self.present |= QP_USER_DATA;
        self.aliased &= !QP_USER_DATA;
    }

    /// Share a caller-owned buffer without copying. The policy is marked
    /// aliased; call [`Qos::unalias`] before the set outlives the caller's
    /// copy.
    pub fn set_user_data_shared(&mut self, data: Arc<Vec<u8>>) {
        self.user_data = data;
        self.present |= QP_USER_DATA;
        self.aliased |= QP_USER_DATA;
    }

    pub fn set_topic_data(&mut self, data: &[u8]) {
        self.topic_data = Arc::new(data.to_vec());
        self.present |= QP_TOPIC_DATA;
        self.aliased &= !QP_TOPIC_DATA;
    }

    pub fn set_group_data(&mut self, data: &[u8]) {
        self.group_data = Arc::new(data.to_vec());
        self.present |= QP_GROUP_DATA;
        self.aliased &= !QP_GROUP_DATA;
    }

    pub fn set_durability(&mut self, kind: DurabilityKind) {
        self.durability = kind;
        self.present |= QP_DURABILITY;
    }

    pub fn set_durability_service(&mut self, ds: DurabilityService) {
        self.durability_service = ds;
        self.present |= QP_DURABILITY_SERVICE;
    }

    pub fn set_presentation(&mut self, p: Presentation) {
        self.presentation = p;
        self.present |= QP_PRESENTATION;
    }

    pub fn set_deadline(&mut self, period: Duration) {
        self.deadline = period;
        self.present |= QP_DEADLINE;
    }

    pub fn set_latency_budget(&mut self, budget: Duration) {
        self.latency_budget = budget;
        self.present |= QP_LATENCY_BUDGET;
    }

    pub fn set_liveliness(&mut self, kind: LivelinessKind, lease: Duration) {
        self.liveliness = Liveliness {
            kind,
            lease_duration: lease,
        };
        self.present |= QP_LIVELINESS;
    }

    pub fn set_reliability(&mut self, kind: ReliabilityKind, max_blocking_time: Duration) {
        self.reliability = Reliability {
            kind,
            max_blocking_time,
        };
        self.present |= QP_RELIABILITY;
    }

    pub fn set_destination_order(&mut self, kind: DestinationOrderKind) {
        self.destination_order = kind;
        self.present |= QP_DESTINATION_ORDER;
    }

    pub fn set_history(&mut self, history: History) {
        self.history = history;
        self.present |= QP_HISTORY;
    }

    pub fn set_resource_limits(&mut self, limits: ResourceLimits) {
        self.resource_limits = limits;
        self.present |= QP_RESOURCE_LIMITS;
    }

    pub fn set_transport_priority(&mut self, priority: i32) {
        self.transport_priority = priority;
        self.present |= QP_TRANSPORT_PRIORITY;
    }

    pub fn set_lifespan(&mut self, lifespan: Duration) {
        self.lifespan = lifespan;
        self.present |= QP_LIFESPAN;
    }

    pub fn set_ownership(&mut self, kind: OwnershipKind) {
        self.ownership = kind;
        self.present |= QP_OWNERSHIP;
    }

    pub fn set_ownership_strength(&mut self, strength: i32) {
        self.ownership_strength = strength;
        self.present |= QP_OWNERSHIP_STRENGTH;
    }

    pub fn set_time_based_filter(&mut self, separation: Duration) {
        self.time_based_filter = separation;
        self.present |= QP_TIME_BASED_FILTER;
    }

    pub fn set_writer_data_lifecycle(&mut self, autodispose: bool) {
        self.autodispose_unregistered = autodispose;
        self.present |= QP_WRITER_DATA_LIFECYCLE;
    }

    pub fn set_reader_data_lifecycle(&mut self, lifecycle: ReaderDataLifecycle) {
        self.reader_data_lifecycle = lifecycle;
        self.present |= QP_READER_DATA_LIFECYCLE;
    }

    pub fn set_entity_factory(&mut self, autoenable: bool) {
        self.autoenable_created = autoenable;
        self.present |= QP_ENTITY_FACTORY;
    }

    pub fn set_ignore_local(&mut self, kind: IgnoreLocalKind) {
        self.ignore_local = kind;
        self.present |= QP_IGNORE_LOCAL;
    }

    pub fn set_partition(&mut self, names: &[&str]) {
        self.partition = Arc::new(names.iter().map(|s| (*s).to_string()).collect());
        self.present |= QP_PARTITION;
        self.aliased &= !QP_PARTITION;
    }

    /// See [`Qos::set_user_data_shared`].
    pub fn set_partition_shared(&mut self, names: Arc<Vec<String>>) {
        self.partition = names;
        self.present |= QP_PARTITION;
        self.aliased |= QP_PARTITION;
    }

    pub fn set_property(&mut self, property: PropertyList) {
        self.property = Arc::new(property);
        self.present |= QP_PROPERTY;
        self.aliased &= !QP_PROPERTY;
    }

    pub fn set_type_consistency(&mut self, tce: TypeConsistency) {
        self.type_consistency = tce;
        self.present |= QP_TYPE_CONSISTENCY;
    }

    pub fn set_type_information(&mut self, info: Arc<TypeInformation>) {
        self.type_information = Some(info);
        self.present |= QP_TYPE_INFORMATION;
    }

    pub fn set_data_representation(&mut self, ids: &[DataRepresentationId]) {
        self.data_representation = Arc::new(ids.to_vec());
        self.present |= QP_DATA_REPRESENTATION;
        self.aliased &= !QP_DATA_REPRESENTATION;
    }

    // ------------------------------------------------------------------
    // Getters: `None` when the policy is unset.
    // ------------------------------------------------------------------

    #[must_use]
    pub fn topic_name(&self) -> Option<&str> {
        self.is_present(QP_TOPIC_NAME).then_some(self.topic_name.as_str())
    }

    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        self.is_present(QP_TYPE_NAME).then_some(self.type_name.as_str())
    }

    #[must_use]
    pub fn entity_name(&self) -> Option<&str> {
        self.is_present(QP_ENTITY_NAME).then_some(self.entity_name.as_str())
    }

    #[must_use]
    pub fn user_data(&self) -> Option<&[u8]> {
        self.is_present(QP_USER_DATA).then_some(self.user_data.as_slice())
    }

    #[must_use]
    pub fn durability(&self) -> Option<DurabilityKind> {
        self.is_present(QP_DURABILITY).then_some(self.durability)
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.is_present(QP_DEADLINE).then_some(self.deadline)
    }

    #[must_use]
    pub fn latency_budget(&self) -> Option<Duration> {
        self.is_present(QP_LATENCY_BUDGET).then_some(self.latency_budget)
    }

    #[must_use]
    pub fn lifespan(&self) -> Option<Duration> {
        self.is_present(QP_LIFESPAN).then_some(self.lifespan)
    }

    #[must_use]
    pub fn liveliness(&self) -> Option<Liveliness> {
        self.is_present(QP_LIVELINESS).then_some(self.liveliness)
    }

    #[must_use]
    pub fn reliability(&self) -> Option<Reliability> {
        self.is_present(QP_RELIABILITY).then_some(self.reliability)
    }

    #[must_use]
    pub fn destination_order(&self) -> Option<DestinationOrderKind> {
        self.is_present(QP_DESTINATION_ORDER).then_some(self.destination_order)
    }

    #[must_use]
    pub fn history(&self) -> Option<History> {
        self.is_present(QP_HISTORY).then_some(self.history)
    }

    #[must_use]
    pub fn resource_limits(&self) -> Option<ResourceLimits> {
        self.is_present(QP_RESOURCE_LIMITS).then_some(self.resource_limits)
    }

    #[must_use]
    pub fn ownership(&self) -> Option<OwnershipKind> {
        self.is_present(QP_OWNERSHIP).then_some(self.ownership)
    }

    #[must_use]
    pub fn partition(&self) -> Option<&[String]> {
        self.is_present(QP_PARTITION).then_some(self.partition.as_slice())
    }

    #[must_use]
    pub fn property(&self) -> Option<&PropertyList> {
        self.is_present(QP_PROPERTY).then(|| self.property.as_ref())
    }

    #[must_use]
    pub fn type_consistency(&self) -> Option<TypeConsistency> {
        self.is_present(QP_TYPE_CONSISTENCY).then_some(self.type_consistency)
    }

    #[must_use]
    pub fn type_information(&self) -> Option<&TypeInformation> {
        if self.is_present(QP_TYPE_INFORMATION) {
            self.type_information.as_deref()
        } else {
            None
        }
    }

    #[must_use]
    pub fn data_representation(&self) -> Option<&[DataRepresentationId]> {
        self.is_present(QP_DATA_REPRESENTATION)
            .then_some(self.data_representation.as_slice())
    }

    #[must_use]
    pub fn entity_factory_autoenable(&self) -> Option<bool> {
        self.is_present(QP_ENTITY_FACTORY).then_some(self.autoenable_created)
    }

    // ------------------------------------------------------------------
    // Set algebra.
    // ------------------------------------------------------------------

    /// Deep copy with no aliasing left in the result.
    #[must_use]
    pub fn deep_clone(&self) -> Qos {
        let mut q = self.clone();
        q.unalias();
        q
    }

    /// Make every aliased heap value exclusive and clear the aliased mask.
    pub fn unalias(&mut self) {
        if self.aliased == 0 {
            return;
        }
        if self.aliased & QP_USER_DATA != 0 {
            self.user_data = Arc::new(self.user_data.as_ref().clone());
        }
        if self.aliased & QP_TOPIC_DATA != 0 {
            self.topic_data = Arc::new(self.topic_data.as_ref().clone());
        }
        if self.aliased & QP_GROUP_DATA != 0 {
            self.group_data = Arc::new(self.group_data.as_ref().clone());
        }
        if self.aliased & QP_PARTITION != 0 {
            self.partition = Arc::new(self.partition.as_ref().clone());
        }
        if self.aliased & QP_PROPERTY != 0 {
            self.property = Arc::new(self.property.as_ref().clone());
        }
        self.aliased = 0;
    }

    /// Copy from `src` every policy that is in `mask`, present in `src`, and
    /// absent here. Present policies are never overwritten.
    pub fn merge_missing(&mut self, src: &Qos, mask: u64) {
        let wanted = mask & src.present & !self.present;
        if wanted == 0 {
            return;
        }
        macro_rules! take {
            ($bit:expr, $($field:ident),+) => {
                if wanted & $bit != 0 {
                    $( self.$field = src.$field.clone(); )+
                    self.present |= $bit;
                    self.aliased &= !$bit;
                }
            };
        }
        take!(QP_TOPIC_NAME, topic_name);
        take!(QP_TYPE_NAME, type_name);
        take!(QP_ENTITY_NAME, entity_name);
        take!(QP_USER_DATA, user_data);
        take!(QP_TOPIC_DATA, topic_data);
        take!(QP_GROUP_DATA, group_data);
        take!(QP_DURABILITY, durability);
        take!(QP_DURABILITY_SERVICE, durability_service);
        take!(QP_PRESENTATION, presentation);
        take!(QP_DEADLINE, deadline);
        take!(QP_LATENCY_BUDGET, latency_budget);
        take!(QP_LIVELINESS, liveliness);
        take!(QP_RELIABILITY, reliability);
        take!(QP_DESTINATION_ORDER, destination_order);
        take!(QP_HISTORY, history);
        take!(QP_RESOURCE_LIMITS, resource_limits);
        take!(QP_TRANSPORT_PRIORITY, transport_priority);
        take!(QP_LIFESPAN, lifespan);
        take!(QP_OWNERSHIP, ownership);
        take!(QP_OWNERSHIP_STRENGTH, ownership_strength);
        take!(QP_TIME_BASED_FILTER, time_based_filter);
        take!(QP_WRITER_DATA_LIFECYCLE, autodispose_unregistered);
        take!(QP_READER_DATA_LIFECYCLE, reader_data_lifecycle);
        take!(QP_ENTITY_FACTORY, autoenable_created);
        take!(QP_IGNORE_LOCAL, ignore_local);
        take!(QP_PARTITION, partition);
        take!(QP_PROPERTY, property);
        take!(QP_TYPE_CONSISTENCY, type_consistency);
        take!(QP_TYPE_INFORMATION, type_information);
        take!(QP_DATA_REPRESENTATION, data_representation);
    }

    /// Bitmask of policies, within `mask`, whose presence or value differs.
    #[must_use]
    pub fn delta(&self, other: &Qos, mask: u64) -> u64 {
        let mut d = (self.present ^ other.present) & mask;
        let both = self.present & other.present & mask;
        macro_rules! diff {
            ($bit:expr, $($field:ident),+) => {
                if both & $bit != 0 && ($( self.$field != other.$field )||+) {
                    d |= $bit;
                }
            };
        }
        diff!(QP_TOPIC_NAME, topic_name);
        diff!(QP_TYPE_NAME, type_name);
        diff!(QP_ENTITY_NAME, entity_name);
        diff!(QP_USER_DATA, user_data);
        diff!(QP_TOPIC_DATA, topic_data);
        diff!(QP_GROUP_DATA, group_data);
        diff!(QP_DURABILITY, durability);
        diff!(QP_DURABILITY_SERVICE, durability_service);
        diff!(QP_PRESENTATION, presentation);
        diff!(QP_DEADLINE, deadline);
        diff!(QP_LATENCY_BUDGET, latency_budget);
        diff!(QP_LIVELINESS, liveliness);
        diff!(QP_RELIABILITY, reliability);
        diff!(QP_DESTINATION_ORDER, destination_order);
        diff!(QP_HISTORY, history);
        diff!(QP_RESOURCE_LIMITS, resource_limits);
        diff!(QP_TRANSPORT_PRIORITY, transport_priority);
        diff!(QP_LIFESPAN, lifespan);
        diff!(QP_OWNERSHIP, ownership);
        diff!(QP_OWNERSHIP_STRENGTH, ownership_strength);
        diff!(QP_TIME_BASED_FILTER, time_based_filter);
        diff!(QP_WRITER_DATA_LIFECYCLE, autodispose_unregistered);
        diff!(QP_READER_DATA_LIFECYCLE, reader_data_lifecycle);
        diff!(QP_ENTITY_FACTORY, autoenable_created);
        diff!(QP_IGNORE_LOCAL, ignore_local);
        diff!(QP_PARTITION, partition);
        diff!(QP_PROPERTY, property);
        diff!(QP_TYPE_CONSISTENCY, type_consistency);
        diff!(QP_TYPE_INFORMATION, type_information);
        diff!(QP_DATA_REPRESENTATION, data_representation);
        d
    }

    // ------------------------------------------------------------------
    // Validation.
    // ------------------------------------------------------------------

    /// Check each present policy value in isolation.
    pub fn validate(&self) -> Result<()> {
        fn dur_ok(d: Duration) -> bool {
            !d.is_negative()
        }
        if self.is_present(QP_DEADLINE) && !dur_ok(self.deadline) {
            return Err(ReturnCode::BadParameter);
        }
        if self.is_present(QP_LATENCY_BUDGET) && !dur_ok(self.latency_budget) {
            return Err(ReturnCode::BadParameter);
        }
        if self.is_present(QP_LIFESPAN) && !dur_ok(self.lifespan) {
            return Err(ReturnCode::BadParameter);
        }
        if self.is_present(QP_TIME_BASED_FILTER) && !dur_ok(self.time_based_filter) {
            return Err(ReturnCode::BadParameter);
        }
        if self.is_present(QP_LIVELINESS) && !dur_ok(self.liveliness.lease_duration) {
            return Err(ReturnCode::BadParameter);
        }
        if self.is_present(QP_RELIABILITY) && !dur_ok(self.reliability.max_blocking_time) {
            return Err(ReturnCode::BadParameter);
        }
        if self.is_present(QP_READER_DATA_LIFECYCLE) {
            let rdl = self.reader_data_lifecycle;
            if !dur_ok(rdl.autopurge_nowriter_samples_delay)
                || !dur_ok(rdl.autopurge_disposed_samples_delay)
            {
                return Err(ReturnCode::BadParameter);
            }
        }
        if self.is_present(QP_HISTORY) {
            if let History::KeepLast(depth) = self.history {
                if depth < 1 {
                    return Err(ReturnCode::BadParameter);
                }
            }
        }
        if self.is_present(QP_RESOURCE_LIMITS) && !resource_limits_valid(&self.resource_limits) {
            return Err(ReturnCode::BadParameter);
        }
        if self.is_present(QP_DURABILITY_SERVICE) {
            let ds = &self.durability_service;
            if !dur_ok(ds.service_cleanup_delay) || !resource_limits_valid(&ds.resource_limits) {
                return Err(ReturnCode::BadParameter);
            }
            if let History::KeepLast(depth) = ds.history {
                if depth < 1 {
                    return Err(ReturnCode::BadParameter);
                }
            }
        }
        if self.is_present(QP_DATA_REPRESENTATION) && self.data_representation.is_empty() {
            return Err(ReturnCode::BadParameter);
        }
        Ok(())
    }

    /// Cross-policy consistency, checked when an entity freezes its QoS.
    pub fn check_consistency(&self) -> Result<()> {
        if self.is_present(QP_HISTORY) && self.is_present(QP_RESOURCE_LIMITS) {
            if let History::KeepLast(depth) = self.history {
                let per_instance = self.resource_limits.max_samples_per_instance;
                if per_instance != policy::LENGTH_UNLIMITED && depth > per_instance {
                    return Err(ReturnCode::InconsistentPolicy);
                }
            }
        }
        if self.is_present(QP_RESOURCE_LIMITS) {
            let rl = &self.resource_limits;
            if rl.max_samples != policy::LENGTH_UNLIMITED
                && rl.max_samples_per_instance != policy::LENGTH_UNLIMITED
                && rl.max_samples < rl.max_samples_per_instance
            {
                return Err(ReturnCode::InconsistentPolicy);
            }
        }
        if self.is_present(QP_TIME_BASED_FILTER)
            && self.is_present(QP_DEADLINE)
            && self.time_based_filter > self.deadline
        {
            return Err(ReturnCode::InconsistentPolicy);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Per-kind default sets. Entity creation merges user QoS over these.
    // ------------------------------------------------------------------

    #[must_use]
    pub fn default_participant() -> Qos {
        let mut q = Qos::new();
        q.set_user_data(&[]);
        q.set_entity_factory(true);
        q.set_property(PropertyList::default());
        q
    }

    #[must_use]
    pub fn default_topic() -> Qos {
        let mut q = Qos::new();
        q.set_topic_data(&[]);
        q.set_durability(DurabilityKind::Volatile);
        q.set_durability_service(DurabilityService::default());
        q.set_deadline(Duration::INFINITY);
        q.set_latency_budget(Duration::ZERO);
        q.set_liveliness(LivelinessKind::Automatic, Duration::INFINITY);
        q.set_reliability(ReliabilityKind::BestEffort, Duration::from_millis(100));
        q.set_destination_order(DestinationOrderKind::ByReceptionTimestamp);
        q.set_history(History::KeepLast(1));
        q.set_resource_limits(ResourceLimits::default());
        q.set_transport_priority(0);
        q.set_lifespan(Duration::INFINITY);
        q.set_ownership(OwnershipKind::Shared);
        q.set_data_representation(&[DataRepresentationId::Xcdr1, DataRepresentationId::Xcdr2]);
        q
    }

    #[must_use]
    pub fn default_publisher() -> Qos {
        let mut q = Qos::new();
        q.set_presentation(Presentation::default());
        q.set_partition(&[]);
        q.set_group_data(&[]);
        q.set_entity_factory(true);
        q
    }

    #[must_use]
    pub fn default_subscriber() -> Qos {
        Self::default_publisher()
    }

    #[must_use]
    pub fn default_writer() -> Qos {
        let mut q = Qos::default_topic();
        q.set_user_data(&[]);
        q.set_ownership_strength(0);
        q.set_writer_data_lifecycle(true);
        // Writers offer reliable delivery unless told otherwise.
        q.set_reliability(ReliabilityKind::Reliable, Duration::from_millis(100));
        q.set_ignore_local(IgnoreLocalKind::None);
        q.set_type_consistency(TypeConsistency::default());
        q
    }

    #[must_use]
    pub fn default_reader() -> Qos {
        let mut q = Qos::default_topic();
        q.set_user_data(&[]);
        q.set_time_based_filter(Duration::ZERO);
        q.set_reader_data_lifecycle(ReaderDataLifecycle::default());
        q.set_ignore_local(IgnoreLocalKind::None);
        q.set_type_consistency(TypeConsistency::default());
        q
    }
}

fn resource_limits_valid(rl: &ResourceLimits) -> bool {
    fn limit_ok(v: i32) -> bool {
        v > 0 || v == policy::LENGTH_UNLIMITED
    }
    limit_ok(rl.max_samples) && limit_ok(rl.max_instances) && limit_ok(rl.max_samples_per_instance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_empty() {
        let q = Qos::new();
        assert_eq!(q.present_mask(), 0);
        assert_eq!(q.aliased_mask(), 0);
        assert_eq!(q.durability(), None);
        assert_eq!(q.reliability(), None);
    }

    #[test]
    fn test_set_marks_present() {
        let mut q = Qos::new();
        q.set_durability(DurabilityKind::TransientLocal);
        assert!(q.is_present(QP_DURABILITY));
        assert_eq!(q.durability(), Some(DurabilityKind::TransientLocal));
    }

    #[test]
    fn test_copy_law_delta_zero() {
        let mut a = Qos::default_writer();
        a.set_partition(&["p1", "p2"]);
        a.set_user_data(b"hello");
        let b = a.deep_clone();
        assert_eq!(a.delta(&b, !0u64), 0);
    }

    #[test]
    fn test_delta_self_is_zero() {
        let q = Qos::default_reader();
        assert_eq!(q.delta(&q, !0u64), 0);
    }

    #[test]
    fn test_delta_reports_presence_difference() {
        let a = Qos::new();
        let mut b = Qos::new();
        b.set_durability(DurabilityKind::Persistent);
        assert_eq!(a.delta(&b, !0u64), QP_DURABILITY);
        assert_eq!(a.delta(&b, QP_RELIABILITY), 0);
    }

    #[test]
    fn test_delta_reports_value_difference() {
        let mut a = Qos::new();
        let mut b = Qos::new();
        a.set_deadline(Duration::from_secs(1));
        b.set_deadline(Duration::from_secs(2));
        assert_eq!(a.delta(&b, !0u64), QP_DEADLINE);
    }

    #[test]
    fn test_merge_missing_respects_present() {
        let mut dst = Qos::new();
        dst.set_durability(DurabilityKind::Persistent);
        let mut src = Qos::new();
        src.set_durability(DurabilityKind::Volatile);
        src.set_deadline(Duration::from_secs(5));

        dst.merge_missing(&src, !0u64);

        // Present policy untouched, absent policy taken from src.
        assert_eq!(dst.durability(), Some(DurabilityKind::Persistent));
        assert_eq!(dst.deadline(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_merge_missing_respects_mask() {
        let mut dst = Qos::new();
        let mut src = Qos::new();
        src.set_deadline(Duration::from_secs(5));
        src.set_lifespan(Duration::from_secs(9));

        dst.merge_missing(&src, QP_DEADLINE);

        assert!(dst.is_present(QP_DEADLINE));
        assert!(!dst.is_present(QP_LIFESPAN));
    }

    #[test]
    fn test_aliased_cleared_by_unalias() {
        let shared = Arc::new(vec!["a".to_string()]);
        let mut q = Qos::new();
        q.set_partition_shared(Arc::clone(&shared));
        assert_eq!(q.aliased_mask(), QP_PARTITION);

        q.unalias();
        assert_eq!(q.aliased_mask(), 0);
        // Value is preserved but no longer shares the caller's allocation.
        assert_eq!(q.partition(), Some(&["a".to_string()][..]));
        assert_eq!(Arc::strong_count(&shared), 1);
    }

    #[test]
    fn test_deep_clone_drops_aliased() {
        let mut q = Qos::new();
        q.set_user_data_shared(Arc::new(b"x".to_vec()));
        let c = q.deep_clone();
        assert_eq!(c.aliased_mask(), 0);
        assert_eq!(c.user_data(), Some(&b"x"[..]));
    }

    #[test]
    fn test_validate_negative_duration() {
        let mut q = Qos::new();
        q.set_deadline(Duration::from_nanos(-1));
        assert_eq!(q.validate(), Err(ReturnCode::BadParameter));
    }

    #[test]
    fn test_validate_keep_last_zero() {
        let mut q = Qos::new();
        q.set_history(History::KeepLast(0));
        assert_eq!(q.validate(), Err(ReturnCode::BadParameter));
    }

    #[test]
    fn test_validate_bad_resource_limits() {
        let mut q = Qos::new();
        q.set_resource_limits(ResourceLimits {
            max_samples: 0,
            ..Default::default()
        });
        assert_eq!(q.validate(), Err(ReturnCode::BadParameter));
    }

    #[test]
    fn test_validate_empty_data_representation() {
        let mut q = Qos::new();
        q.set_data_representation(&[]);
        assert_eq!(q.validate(), Err(ReturnCode::BadParameter));
    }

    #[test]
    fn test_consistency_depth_vs_limits() {
        let mut q = Qos::new();
        q.set_history(History::KeepLast(10));
        q.set_resource_limits(ResourceLimits {
            max_samples: policy::LENGTH_UNLIMITED,
            max_instances: policy::LENGTH_UNLIMITED,
            max_samples_per_instance: 5,
        });
        assert!(q.validate().is_ok());
        assert_eq!(q.check_consistency(), Err(ReturnCode::InconsistentPolicy));
    }

    #[test]
    fn test_consistency_filter_vs_deadline() {
        let mut q = Qos::new();
        q.set_time_based_filter(Duration::from_secs(2));
        q.set_deadline(Duration::from_secs(1));
        assert_eq!(q.check_consistency(), Err(ReturnCode::InconsistentPolicy));
    }

    #[test]
    fn test_default_sets_validate() {
        for q in [
            Qos::default_participant(),
            Qos::default_topic(),
            Qos::default_publisher(),
            Qos::default_subscriber(),
            Qos::default_writer(),
            Qos::default_reader(),
        ] {
            assert!(q.validate().is_ok());
            assert!(q.check_consistency().is_ok());
        }
    }

    #[test]
    fn test_writer_defaults_reliable_reader_best_effort() {
        let w = Qos::default_writer();
        let r = Qos::default_reader();
        assert_eq!(
            w.reliability().map(|x| x.kind),
            Some(policy::ReliabilityKind::Reliable)
        );
        assert_eq!(
            r.reliability().map(|x| x.kind),
            Some(policy::ReliabilityKind::BestEffort)
        );
    }
}
