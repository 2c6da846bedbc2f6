// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! QoS policy value types.
//!
//! Ordinal kinds (durability, reliability, liveliness, presentation scope,
//! destination order) derive `PartialOrd`/`Ord` because the matcher compares
//! them directly: "offered >= requested" is an ordinary `>=` on the kind.

use crate::time::Duration;

/// Sentinel for "no limit" in resource-limit style counters.
pub const LENGTH_UNLIMITED: i32 = -1;

/// DURABILITY: how long samples persist for late-joining readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u32)]
pub enum DurabilityKind {
    #[default]
    Volatile = 0,
    TransientLocal = 1,
    Transient = 2,
    Persistent = 3,
}

/// RELIABILITY kind. Max-blocking-time travels alongside in [`Reliability`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u32)]
pub enum ReliabilityKind {
    #[default]
    BestEffort = 0,
    Reliable = 1,
}

/// RELIABILITY policy value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reliability {
    pub kind: ReliabilityKind,
    /// Upper bound on how long `write` may block when resource limits are
    /// hit under reliable delivery.
    pub max_blocking_time: Duration,
}

impl Default for Reliability {
    fn default() -> Self {
        Reliability {
            kind: ReliabilityKind::BestEffort,
            max_blocking_time: Duration::from_millis(100),
        }
    }
}

/// OWNERSHIP kind; must match exactly between reader and writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum OwnershipKind {
    #[default]
    Shared = 0,
    Exclusive = 1,
}

/// LIVELINESS assertion kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u32)]
pub enum LivelinessKind {
    #[default]
    Automatic = 0,
    ManualByParticipant = 1,
    ManualByTopic = 2,
}

/// LIVELINESS policy value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveliness {
    pub kind: LivelinessKind,
    pub lease_duration: Duration,
}

impl Default for Liveliness {
    fn default() -> Self {
        Liveliness {
            kind: LivelinessKind::Automatic,
            lease_duration: Duration::INFINITY,
        }
    }
}

/// PRESENTATION access scope ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u32)]
pub enum PresentationAccessScope {
    #[default]
    Instance = 0,
    Topic = 1,
    Group = 2,
}

/// PRESENTATION policy value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Presentation {
    pub access_scope: PresentationAccessScope,
    pub coherent_access: bool,
    pub ordered_access: bool,
}

/// DESTINATION_ORDER kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u32)]
pub enum DestinationOrderKind {
    #[default]
    ByReceptionTimestamp = 0,
    BySourceTimestamp = 1,
}

/// HISTORY policy: bounded per-key depth or keep-everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum History {
    /// Keep the most recent `depth` samples per instance.
    KeepLast(i32),
    /// Keep all samples, within resource limits.
    KeepAll,
}

impl Default for History {
    fn default() -> Self {
        History::KeepLast(1)
    }
}

/// RESOURCE_LIMITS policy value. `LENGTH_UNLIMITED` disables a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_samples: i32,
    pub max_instances: i32,
    pub max_samples_per_instance: i32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        ResourceLimits {
            max_samples: LENGTH_UNLIMITED,
            max_instances: LENGTH_UNLIMITED,
            max_samples_per_instance: LENGTH_UNLIMITED,
        }
    }
}

/// DURABILITY_SERVICE: retention configuration for the durability service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurabilityService {
    pub service_cleanup_delay: Duration,
    pub history: History,
    pub resource_limits: ResourceLimits,
}

impl Default for DurabilityService {
    fn default() -> Self {
        DurabilityService {
            service_cleanup_delay: Duration::ZERO,
            history: History::KeepLast(1),
            resource_limits: ResourceLimits::default(),
        }
    }
}

/// READER_DATA_LIFECYCLE autopurge delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderDataLifecycle {
    pub autopurge_nowriter_samples_delay: Duration,
    pub autopurge_disposed_samples_delay: Duration,
}

impl Default for ReaderDataLifecycle {
    fn default() -> Self {
        ReaderDataLifecycle {
            autopurge_nowriter_samples_delay: Duration::INFINITY,
            autopurge_disposed_samples_delay: Duration::INFINITY,
        }
    }
}

/// IGNORELOCAL: suppress matching against local endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum IgnoreLocalKind {
    #[default]
    None = 0,
    Participant = 1,
    Process = 2,
}

/// TYPE_CONSISTENCY_ENFORCEMENT coercion policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TypeConsistencyKind {
    DisallowTypeCoercion = 0,
    AllowTypeCoercion = 1,
}

/// TYPE_CONSISTENCY_ENFORCEMENT policy value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeConsistency {
    pub kind: TypeConsistencyKind,
    pub ignore_sequence_bounds: bool,
    pub ignore_string_bounds: bool,
    pub ignore_member_names: bool,
    pub prevent_type_widening: bool,
    pub force_type_validation: bool,
}

impl Default for TypeConsistency {
    fn default() -> Self {
        TypeConsistency {
            kind: TypeConsistencyKind::AllowTypeCoercion,
            ignore_sequence_bounds: true,
            ignore_string_bounds: true,
            ignore_member_names: false,
            prevent_type_widening: false,
            force_type_validation: false,
        }
    }
}

/// DATA_REPRESENTATION identifiers, per the XTypes encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum DataRepresentationId {
    Xcdr1 = 0,
    Xml = 1,
    Xcdr2 = 2,
}

/// PROPERTY policy: textual and binary name/value pairs. Binary entries are
/// carried on discovery but excluded from matching.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyList {
    pub values: Vec<(String, String)>,
    pub binary_values: Vec<(String, Vec<u8>)>,
}

impl PropertyList {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, name: &str, value: &str) {
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.values.push((name.to_string(), value.to_string())),
        }
    }

    #[must_use]
    pub fn get_binary(&self, name: &str) -> Option<&[u8]> {
        self.binary_values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn set_binary(&mut self, name: &str, value: &[u8]) {
        match self.binary_values.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_vec(),
            None => self.binary_values.push((name.to_string(), value.to_vec())),
        }
    }
}
