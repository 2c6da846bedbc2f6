// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! # RDDS - Data Distribution Service core in pure Rust
//!
//! The hard core of a DDS runtime: the QoS model and compatibility
//! matcher, the entity graph with listener/status/waitset machinery, the
//! writer history cache behind reliable delivery, and the serializer
//! instruction VM that (de)serializes every sample from a flat opcode
//! program.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rdds::{self as dds, Qos};
//!
//! let participant = dds::create_participant(0, None, None)?;
//! let topic = dds::create_topic(participant, MyType::descriptor_ref(), "sensors", None, None)?;
//! let writer = dds::create_writer(participant, topic, None, None)?;
//! let reader = dds::create_reader(participant, topic, None, None)?;
//!
//! dds::write(writer, &MyType { k: 1, value: 42.0 })?;
//! for sample in dds::take::<MyType>(reader, 16)? {
//!     println!("k={} value={}", sample.k, sample.value);
//! }
//! # Ok::<(), rdds::ReturnCode>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Entity graph (dds)                          |
//! |  Participant -> Publisher/Subscriber -> Writer/Reader -> Topic     |
//! |  statuses | listeners | waitsets | conditions | builtin topics     |
//! +--------------------------------------------------------------------+
//! |   QoS store & matcher (qos)    |   Serializer VM (core::ser)       |
//! |   sparse policy sets, RxO      |   opcode programs, XCDR1/XCDR2,   |
//! |   rules, reason reporting      |   key extraction, deep free       |
//! +--------------------------------------------------------------------+
//! |   Writer history cache (whc)   |   Reader history cache (dds::rhc) |
//! |   seq-indexed, borrow/return,  |   instances, sample/view/instance |
//! |   ack-driven eviction          |   states, generations             |
//! +--------------------------------------------------------------------+
//! ```
//!
//! Wire transports, discovery protocols and security plugins are external
//! collaborators; delivery inside a process flows through the domain
//! endpoint registry.
//!
//! ## Modules Overview
//!
//! - [`dds`] - entity API (start here)
//! - [`qos`] - QoS policies, validation, matching
//! - [`core`] - identifiers, type library, serdata, the serializer VM
//! - [`whc`] - writer history cache
//! - [`config`] - domain configuration (record or XML fragment)
//! - [`rt`] - thread utilities and the naming PRNG

/// Domain configuration (initializer record and XML fragment surface).
pub mod config;
/// Core runtime pieces: identifiers, type library, serdata, serializer VM.
pub mod core;
/// Entity API: participants, topics, endpoints, statuses, waitsets.
pub mod dds;
/// QoS policy sets, validation and the compatibility matcher.
pub mod qos;
/// Return-code taxonomy.
pub mod retcode;
/// Runtime support: threads with cleanup stacks, seeded PRNG.
pub mod rt;
/// Nanosecond time types.
pub mod time;
/// Writer history cache.
pub mod whc;

pub use config::DomainConfig;
pub use dds::*;
pub use qos::{matcher::MatchResult, Qos, QosPolicyId};
pub use retcode::{ReturnCode, Result};
pub use time::{Duration, Time};

pub use crate::core::ser::{KeyDescriptor, TopicType, TypeDescriptor};
pub use crate::core::types::{Guid, InstanceHandle};

/// RDDS version string.
pub const VERSION: &str = "0.4.2";
