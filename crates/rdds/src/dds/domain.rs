// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Domain records.
//!
//! A domain entity is created implicitly when the first participant joins
//! its domain id and deleted with the last one. It owns the shared
//! per-domain collaborators: the configuration snapshot, the instance
//! handle map and the type library.

use crate::config::{ConfigStore, DomainConfig};
use crate::core::tkmap::TkMap;
use crate::core::typelib::TypeLibrary;

/// Per-domain shared state.
#[derive(Debug)]
pub(crate) struct DomainRec {
    pub config: ConfigStore,
    pub tkmap: TkMap,
    pub typelib: TypeLibrary,
}

impl DomainRec {
    pub(crate) fn new(config: DomainConfig) -> DomainRec {
        DomainRec {
            config: ConfigStore::new(config),
            tkmap: TkMap::new(),
            typelib: TypeLibrary::new(),
        }
    }
}
