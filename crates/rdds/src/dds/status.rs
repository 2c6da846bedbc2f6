// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Communication statuses.
//!
//! Thirteen status conditions, each with a bit in the entity's
//! status-changes mask and (for most) a counter structure. Total counters
//! are monotone over the entity's lifetime; `*_change` fields report the
//! delta since the previous `get_<status>_status` call, which resets them.

use crate::core::types::InstanceHandle;
use crate::qos::QosPolicyId;

/// Status condition identifiers; the bit position in status masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StatusId {
    InconsistentTopic = 0,
    OfferedDeadlineMissed = 1,
    RequestedDeadlineMissed = 2,
    OfferedIncompatibleQos = 3,
    RequestedIncompatibleQos = 4,
    SampleLost = 5,
    SampleRejected = 6,
    DataOnReaders = 7,
    DataAvailable = 8,
    LivelinessLost = 9,
    LivelinessChanged = 10,
    PublicationMatched = 11,
    SubscriptionMatched = 12,
}

impl StatusId {
    #[must_use]
    pub const fn mask(self) -> u32 {
        1 << self as u32
    }
}

pub const INCONSISTENT_TOPIC_STATUS: u32 = 1 << StatusId::InconsistentTopic as u32;
pub const OFFERED_DEADLINE_MISSED_STATUS: u32 = 1 << StatusId::OfferedDeadlineMissed as u32;
pub const REQUESTED_DEADLINE_MISSED_STATUS: u32 = 1 << StatusId::RequestedDeadlineMissed as u32;
pub const OFFERED_INCOMPATIBLE_QOS_STATUS: u32 = 1 << StatusId::OfferedIncompatibleQos as u32;
pub const REQUESTED_INCOMPATIBLE_QOS_STATUS: u32 = 1 << StatusId::RequestedIncompatibleQos as u32;
pub const SAMPLE_LOST_STATUS: u32 = 1 << StatusId::SampleLost as u32;
pub const SAMPLE_REJECTED_STATUS: u32 = 1 << StatusId::SampleRejected as u32;
pub const DATA_ON_READERS_STATUS: u32 = 1 << StatusId::DataOnReaders as u32;
pub const DATA_AVAILABLE_STATUS: u32 = 1 << StatusId::DataAvailable as u32;
pub const LIVELINESS_LOST_STATUS: u32 = 1 << StatusId::LivelinessLost as u32;
pub const LIVELINESS_CHANGED_STATUS: u32 = 1 << StatusId::LivelinessChanged as u32;
pub const PUBLICATION_MATCHED_STATUS: u32 = 1 << StatusId::PublicationMatched as u32;
pub const SUBSCRIPTION_MATCHED_STATUS: u32 = 1 << StatusId::SubscriptionMatched as u32;

/// Every defined status bit.
pub const ANY_STATUS: u32 = (1 << 13) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InconsistentTopicStatus {
    pub total_count: u32,
    pub total_count_change: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OfferedDeadlineMissedStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub last_instance_handle: InstanceHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestedDeadlineMissedStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub last_instance_handle: InstanceHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferedIncompatibleQosStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub last_policy_id: QosPolicyId,
}

impl Default for OfferedIncompatibleQosStatus {
    fn default() -> Self {
        OfferedIncompatibleQosStatus {
            total_count: 0,
            total_count_change: 0,
            last_policy_id: QosPolicyId::Invalid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedIncompatibleQosStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub last_policy_id: QosPolicyId,
}

impl Default for RequestedIncompatibleQosStatus {
    fn default() -> Self {
        RequestedIncompatibleQosStatus {
            total_count: 0,
            total_count_change: 0,
            last_policy_id: QosPolicyId::Invalid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleLostStatus {
    pub total_count: u32,
    pub total_count_change: i32,
}

/// Reason carried by [`SampleRejectedStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleRejectedKind {
    #[default]
    NotRejected,
    RejectedByInstancesLimit,
    RejectedBySamplesLimit,
    RejectedBySamplesPerInstanceLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleRejectedStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub last_reason: SampleRejectedKind,
    pub last_instance_handle: InstanceHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LivelinessLostStatus {
    pub total_count: u32,
    pub total_count_change: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LivelinessChangedStatus {
    pub alive_count: u32,
    pub not_alive_count: u32,
    pub alive_count_change: i32,
    pub not_alive_count_change: i32,
    pub last_publication_handle: InstanceHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublicationMatchedStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub current_count: u32,
    pub current_count_change: i32,
    pub last_subscription_handle: InstanceHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriptionMatchedStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub current_count: u32,
    pub current_count_change: i32,
    pub last_publication_handle: InstanceHandle,
}

/// All status structures of one entity.
#[derive(Debug, Clone, Default)]
pub struct StatusSet {
    pub inconsistent_topic: InconsistentTopicStatus,
    pub offered_deadline_missed: OfferedDeadlineMissedStatus,
    pub requested_deadline_missed: RequestedDeadlineMissedStatus,
    pub offered_incompatible_qos: OfferedIncompatibleQosStatus,
    pub requested_incompatible_qos: RequestedIncompatibleQosStatus,
    pub sample_lost: SampleLostStatus,
    pub sample_rejected: SampleRejectedStatus,
    pub liveliness_lost: LivelinessLostStatus,
    pub liveliness_changed: LivelinessChangedStatus,
    pub publication_matched: PublicationMatchedStatus,
    pub subscription_matched: SubscriptionMatchedStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_bits_are_distinct() {
        let bits = [
            INCONSISTENT_TOPIC_STATUS,
            OFFERED_DEADLINE_MISSED_STATUS,
            REQUESTED_DEADLINE_MISSED_STATUS,
            OFFERED_INCOMPATIBLE_QOS_STATUS,
            REQUESTED_INCOMPATIBLE_QOS_STATUS,
            SAMPLE_LOST_STATUS,
            SAMPLE_REJECTED_STATUS,
            DATA_ON_READERS_STATUS,
            DATA_AVAILABLE_STATUS,
            LIVELINESS_LOST_STATUS,
            LIVELINESS_CHANGED_STATUS,
            PUBLICATION_MATCHED_STATUS,
            SUBSCRIPTION_MATCHED_STATUS,
        ];
        let mut acc = 0u32;
        for b in bits {
            assert_eq!(acc & b, 0);
            acc |= b;
        }
        assert_eq!(acc, ANY_STATUS);
    }

    #[test]
    fn test_status_id_mask() {
        assert_eq!(StatusId::InconsistentTopic.mask(), 1);
        assert_eq!(StatusId::DataAvailable.mask(), 1 << 8);
        assert_eq!(StatusId::SubscriptionMatched.mask(), 1 << 12);
    }

    #[test]
    fn test_incompatible_defaults_to_invalid_policy() {
        assert_eq!(
            OfferedIncompatibleQosStatus::default().last_policy_id,
            QosPolicyId::Invalid
        );
    }
}
