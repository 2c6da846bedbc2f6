// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Local type library.
//!
//! Endpoints advertise XTypes type identifiers; the library records which of
//! them have been resolved (their full type object is known locally) and
//! which reader/writer type pairs are assignable under coercion. When the
//! matcher needs an unresolved type it reports "not yet decidable" and the
//! caller is expected to issue a type-lookup request; the pending set keeps
//! those requests from being issued twice.

use std::collections::HashSet;

use parking_lot::Mutex;

/// Opaque equivalence-hash identifier for one type representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub [u8; 16]);

impl TypeId {
    /// Derive an identifier from a serialized type object.
    #[must_use]
    pub fn from_blob(blob: &[u8]) -> TypeId {
        use md5::{Digest, Md5};
        let mut hasher = Md5::new();
        hasher.update(blob);
        let digest = hasher.finalize();
        let mut id = [0u8; 16];
        id.copy_from_slice(&digest);
        TypeId(id)
    }
}

/// The minimal/complete identifier pair an endpoint carries on discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeInformation {
    pub minimal: TypeId,
    pub complete: TypeId,
}

/// Per-domain registry of resolved types and assignability facts.
#[derive(Debug, Default)]
pub struct TypeLibrary {
    resolved: Mutex<HashSet<TypeId>>,
    /// (reader minimal id, writer minimal id) pairs known assignable.
    assignable: Mutex<HashSet<(TypeId, TypeId)>>,
    /// Lookup requests issued but not yet answered.
    pending: Mutex<HashSet<TypeId>>,
}

impl TypeLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a type as locally resolved and drop any pending lookup.
    pub fn mark_resolved(&self, id: TypeId) {
        self.resolved.lock().insert(id);
        self.pending.lock().remove(&id);
    }

    #[must_use]
    pub fn is_resolved(&self, id: TypeId) -> bool {
        self.resolved.lock().contains(&id)
    }

    /// Record that `wr` samples may be coerced into `rd` samples.
    pub fn record_assignable(&self, rd: TypeId, wr: TypeId) {
        self.assignable.lock().insert((rd, wr));
    }

    /// Assignability under coercion. Identity is always assignable; anything
    /// else must have been recorded from a type-object comparison.
    #[must_use]
    pub fn is_assignable_from(&self, rd: &TypeInformation, wr: &TypeInformation) -> bool {
        if rd.minimal == wr.minimal {
            return true;
        }
        self.assignable.lock().contains(&(rd.minimal, wr.minimal))
    }

    /// Note that a lookup request should go out for `id`. Returns true the
    /// first time, false while a request is already pending.
    pub fn request_lookup(&self, id: TypeId) -> bool {
        if self.is_resolved(id) {
            return false;
        }
        self.pending.lock().insert(id)
    }

    #[must_use]
    pub fn lookup_pending(&self, id: TypeId) -> bool {
        self.pending.lock().contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(b: u8) -> TypeId {
        TypeId([b; 16])
    }

    #[test]
    fn test_type_id_from_blob_stable() {
        assert_eq!(TypeId::from_blob(b"abc"), TypeId::from_blob(b"abc"));
        assert_ne!(TypeId::from_blob(b"abc"), TypeId::from_blob(b"abd"));
    }

    #[test]
    fn test_resolution() {
        let lib = TypeLibrary::new();
        assert!(!lib.is_resolved(tid(1)));
        lib.mark_resolved(tid(1));
        assert!(lib.is_resolved(tid(1)));
    }

    #[test]
    fn test_identity_is_assignable() {
        let lib = TypeLibrary::new();
        let info = TypeInformation {
            minimal: tid(1),
            complete: tid(2),
        };
        assert!(lib.is_assignable_from(&info, &info));
    }

    #[test]
    fn test_recorded_assignability() {
        let lib = TypeLibrary::new();
        let rd = TypeInformation {
            minimal: tid(1),
            complete: tid(2),
        };
        let wr = TypeInformation {
            minimal: tid(3),
            complete: tid(4),
        };
        assert!(!lib.is_assignable_from(&rd, &wr));
        lib.record_assignable(rd.minimal, wr.minimal);
        assert!(lib.is_assignable_from(&rd, &wr));
        // Directional: the reverse pair was never recorded.
        assert!(!lib.is_assignable_from(&wr, &rd));
    }

    #[test]
    fn test_request_lookup_once() {
        let lib = TypeLibrary::new();
        assert!(lib.request_lookup(tid(9)));
        assert!(!lib.request_lookup(tid(9)));
        assert!(lib.lookup_pending(tid(9)));
        lib.mark_resolved(tid(9));
        assert!(!lib.lookup_pending(tid(9)));
        assert!(!lib.request_lookup(tid(9)));
    }
}
