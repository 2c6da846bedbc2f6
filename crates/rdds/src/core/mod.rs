// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Core runtime pieces shared by the entity layer: identifiers, the type
//! library, the instance-handle map, serialized-sample envelopes and the
//! serializer VM.

pub mod ser;
pub mod serdata;
pub mod tkmap;
pub mod typelib;
pub mod types;
