// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Serialized sample envelope.
//!
//! A [`Serdata`] is the refcounted unit passed between the writer, its
//! history cache and reader caches: the encapsulated CDR payload plus the
//! canonical key stream, key hash, source timestamp and lifecycle status
//! bits. Key-kind serdatas carry only the key (dispose/unregister traffic).

use std::sync::Arc;

use crate::core::types::{Guid, KeyHash};
use crate::time::Time;

/// Dispose bit in [`Serdata::statusinfo`].
pub const STATUSINFO_DISPOSE: u32 = 1 << 0;
/// Unregister bit in [`Serdata::statusinfo`].
pub const STATUSINFO_UNREGISTER: u32 = 1 << 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerdataKind {
    /// Full sample payload.
    Data,
    /// Key fields only.
    Key,
}

/// One serialized sample crossing the core boundary.
#[derive(Debug)]
pub struct Serdata {
    pub kind: SerdataKind,
    /// Encapsulated CDR payload; empty for key-only serdatas.
    pub payload: Vec<u8>,
    /// Canonical big-endian key stream.
    pub key_cdr: Vec<u8>,
    pub keyhash: KeyHash,
    pub source_timestamp: Time,
    pub writer_guid: Guid,
    /// Dispose/unregister bits.
    pub statusinfo: u32,
}

impl Serdata {
    #[must_use]
    pub fn new_data(
        payload: Vec<u8>,
        key_cdr: Vec<u8>,
        keyhash: KeyHash,
        source_timestamp: Time,
        writer_guid: Guid,
    ) -> Arc<Serdata> {
        Arc::new(Serdata {
            kind: SerdataKind::Data,
            payload,
            key_cdr,
            keyhash,
            source_timestamp,
            writer_guid,
            statusinfo: 0,
        })
    }

    #[must_use]
    pub fn new_key(
        key_cdr: Vec<u8>,
        keyhash: KeyHash,
        source_timestamp: Time,
        writer_guid: Guid,
        statusinfo: u32,
    ) -> Arc<Serdata> {
        Arc::new(Serdata {
            kind: SerdataKind::Key,
            payload: Vec::new(),
            key_cdr,
            keyhash,
            source_timestamp,
            writer_guid,
            statusinfo,
        })
    }

    /// Bytes this serdata accounts for in cache budgets.
    #[must_use]
    pub fn size(&self) -> usize {
        self.payload.len() + self.key_cdr.len()
    }

    #[must_use]
    pub fn is_dispose(&self) -> bool {
        self.statusinfo & STATUSINFO_DISPOSE != 0
    }

    #[must_use]
    pub fn is_unregister(&self) -> bool {
        self.statusinfo & STATUSINFO_UNREGISTER != 0
    }
}
