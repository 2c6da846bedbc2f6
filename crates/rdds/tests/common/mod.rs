// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Shared test type: a keyed (i32 key, string value) sample with a
//! hand-written descriptor, the way the type compiler would emit it.

use rdds::core::ser::sample::{alloc_string, free_string, string_bytes};
use rdds::core::ser::{
    KeyDescriptor, Op, TopicType, TypeCode, TypeDescriptor, FLAG_KEY, FLAG_SGN, TOPIC_FIXED_KEY,
    TOPIC_FIXED_KEY_XCDR2,
};

/// `struct KeyedValue { @key k: i32; v: string; }`
#[repr(C)]
pub struct KeyedValue {
    pub k: i32,
    pub v: *mut u8,
}

const ADR: u32 = Op::Adr as u32;
const RTS: u32 = Op::Rts as u32;
const KOF: u32 = Op::Kof as u32;

const fn ty(code: TypeCode) -> u32 {
    (code as u32) << 16
}

static KEYED_VALUE_OPS: &[u32] = &[
    ADR | ty(TypeCode::FourBytes) | FLAG_KEY | FLAG_SGN, // 0
    0,                                                   // 1: offsetof k
    ADR | ty(TypeCode::Str),                             // 2
    8,                                                   // 3: offsetof v
    RTS,                                                 // 4
    KOF | 1,                                             // 5
    0,                                                   // 6
];

static KEYED_VALUE_KEYS: &[KeyDescriptor] = &[KeyDescriptor {
    name: "k",
    ops_offset: 5,
    index: 0,
}];

static KEYED_VALUE_DESC: TypeDescriptor = TypeDescriptor {
    size: 16,
    align: 8,
    flagset: TOPIC_FIXED_KEY | TOPIC_FIXED_KEY_XCDR2,
    type_name: "KeyedValue",
    keys: KEYED_VALUE_KEYS,
    ops: KEYED_VALUE_OPS,
    type_information: None,
    type_mapping: None,
    restrict_data_representation: 0,
};

// SAFETY: the descriptor above describes this #[repr(C)] layout exactly.
unsafe impl TopicType for KeyedValue {
    fn descriptor() -> &'static TypeDescriptor {
        &KEYED_VALUE_DESC
    }
}

impl KeyedValue {
    pub fn new(k: i32, v: &str) -> KeyedValue {
        KeyedValue {
            k,
            v: alloc_string(v),
        }
    }

    /// Key-only sample (null value string).
    pub fn key(k: i32) -> KeyedValue {
        KeyedValue {
            k,
            v: std::ptr::null_mut(),
        }
    }

    pub fn value(&self) -> String {
        if self.v.is_null() {
            String::new()
        } else {
            // SAFETY: v is a NUL-terminated buffer owned by this sample.
            String::from_utf8_lossy(unsafe { string_bytes(self.v) }).into_owned()
        }
    }
}

impl Drop for KeyedValue {
    fn drop(&mut self) {
        // SAFETY: v is owned; free_string tolerates null.
        unsafe { free_string(self.v) };
        self.v = std::ptr::null_mut();
    }
}
