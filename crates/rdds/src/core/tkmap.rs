// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Key-to-instance-handle map.
//!
//! Folds 16-byte key hashes into stable 64-bit instance handles and keeps
//! the reverse association (including the unhashed key stream) so
//! `get_key`-style operations can reconstruct key fields from a handle.
//!
//! The candidate handle is the first eight bytes of the key hash; when the
//! fold collides with a different key the map probes linearly upward. The
//! assignment is stable for the map's lifetime.

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::core::types::{InstanceHandle, KeyHash};

#[derive(Debug, Clone)]
struct TkEntry {
    handle: InstanceHandle,
    key_cdr: Vec<u8>,
}

/// Instance-handle registry, shared per domain.
#[derive(Debug, Default)]
pub struct TkMap {
    by_hash: DashMap<KeyHash, TkEntry>,
    by_handle: DashMap<u64, KeyHash>,
    /// Serializes the insert/probe path; lookups stay lock-free.
    reg: Mutex<()>,
}

impl TkMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn fold(keyhash: &KeyHash) -> u64 {
        let mut hi = [0u8; 8];
        hi.copy_from_slice(&keyhash.0[0..8]);
        let v = u64::from_be_bytes(hi);
        // Zero is the nil handle; nudge off it.
        if v == 0 {
            1
        } else {
            v
        }
    }

    /// Handle for a key hash, registering it on first sight.
    pub fn lookup_or_register(&self, keyhash: KeyHash, key_cdr: &[u8]) -> InstanceHandle {
        if let Some(entry) = self.by_hash.get(&keyhash) {
            return entry.handle;
        }
        let _guard = self.reg.lock();
        // Re-check under the registration lock.
        if let Some(entry) = self.by_hash.get(&keyhash) {
            return entry.handle;
        }
        let mut candidate = Self::fold(&keyhash);
        while self.by_handle.contains_key(&candidate) {
            candidate = candidate.wrapping_add(1).max(1);
        }
        let handle = InstanceHandle(candidate);
        self.by_handle.insert(candidate, keyhash);
        self.by_hash.insert(
            keyhash,
            TkEntry {
                handle,
                key_cdr: key_cdr.to_vec(),
            },
        );
        handle
    }

    /// Handle for a key hash if registered.
    #[must_use]
    pub fn lookup(&self, keyhash: &KeyHash) -> Option<InstanceHandle> {
        self.by_hash.get(keyhash).map(|e| e.handle)
    }

    /// The unhashed key stream behind a handle.
    #[must_use]
    pub fn key_cdr(&self, handle: InstanceHandle) -> Option<Vec<u8>> {
        let keyhash = *self.by_handle.get(&handle.0)?;
        self.by_hash.get(&keyhash).map(|e| e.key_cdr.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}
