// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! # DDS entity API
//!
//! The entity layer: participants, topics, publishers/subscribers, readers
//! and writers form a typed tree addressed by process-unique positive
//! handles. Conditions and waitsets hang off the same tree. All operations
//! are free functions over [`Entity`] handles; a handle stays valid until
//! its entity (or an ancestor) is deleted, after which every operation on
//! it reports `AlreadyDeleted`.
//!
//! ## Entity hierarchy
//!
//! ```text
//! Domain
//! +-- Participant
//!     +-- Topic
//!     +-- Publisher
//!     |   +-- DataWriter ------> Topic
//!     +-- Subscriber
//!         +-- DataReader <------ Topic
//!             +-- ReadCondition / QueryCondition
//! ```
//!
//! Creating a reader or writer directly under a participant implicitly
//! creates its subscriber/publisher parent.

pub mod builtin;
pub mod condition;
pub mod domain;
pub(crate) mod domain_registry;
pub mod entity;
pub mod listener;
pub mod participant;
pub mod publisher;
pub mod reader;
pub mod rhc;
pub mod status;
pub mod subscriber;
pub mod topic;
pub mod waitset;
pub mod writer;

/// Entity handle: positive for live entities, the pseudo-handle range is
/// reserved for builtin topics.
pub type Entity = i32;

/// Start of the reserved pseudo-handle range.
pub const MIN_PSEUDO_HANDLE: Entity = 0x7fff_0000;

pub use condition::{
    create_guardcondition, create_querycondition, create_readcondition, read_guardcondition,
    set_guardcondition, take_guardcondition,
};
pub use entity::{
    delete, enable, get_children, get_domain_id, get_entity_name, get_guid,
    get_inconsistent_topic_status, get_instance_handle, get_listener, get_liveliness_changed_status,
    get_liveliness_lost_status, get_offered_deadline_missed_status,
    get_offered_incompatible_qos_status, get_parent, get_participant, get_publication_matched_status,
    get_publisher, get_qos, get_requested_deadline_missed_status,
    get_requested_incompatible_qos_status, get_sample_lost_status, get_sample_rejected_status,
    get_status_changes, get_status_mask, get_subscriber, get_subscription_matched_status, get_topic,
    read_status, set_listener, set_qos, set_status_mask, take_status, triggered, EntityKind,
};
pub use listener::Listener;
pub use participant::{
    assert_liveliness, create_participant, create_participant_with_config,
    create_participant_with_xml,
};
pub use publisher::{begin_coherent, create_publisher, end_coherent};
pub use reader::{
    create_reader, get_matched_publication_data, get_matched_publications, lookup_instance, read,
    read_instance, read_instance_mask, read_mask, return_loan, take, take_instance,
    take_instance_mask, take_mask, wait_for_historical_data, Sample,
};
pub use rhc::SampleInfo;
pub use status::StatusId;
pub use subscriber::{create_subscriber, notify_readers};
pub use topic::{create_topic, create_topic_with_filter, find_topic, TopicFilter};
pub use waitset::{
    create_waitset, waitset_attach, waitset_detach, waitset_set_trigger, waitset_wait,
    waitset_wait_until,
};
pub use writer::{
    create_writer, dispose, dispose_instance, dispose_ts, flush, get_matched_subscription_data,
    get_matched_subscriptions, instance_get_key, register_instance, unregister_instance,
    wait_for_acks, write, write_ts,
};
