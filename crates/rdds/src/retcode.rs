// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Return-code taxonomy shared by every fallible operation.
//!
//! All errors travel as `ReturnCode` values inside `Result<T>`; there is no
//! out-of-band signalling. For interop with handle-returning surfaces the
//! codes also have a stable signed-integer encoding: success is non-negative
//! (often a handle or a count), errors are the negative values produced by
//! [`ReturnCode::as_retcode`].

use std::fmt;

/// Error half of the return-code taxonomy.
///
/// The discriminants are the absolute values of the wire encoding; the
/// encoded form is the negation (see [`ReturnCode::as_retcode`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ReturnCode {
    /// Unspecified internal error.
    Error = 1,
    /// Operation not supported by this build or entity.
    Unsupported = 2,
    /// A supplied parameter is invalid.
    BadParameter = 3,
    /// A precondition for the operation is not met.
    PreconditionNotMet = 4,
    /// A resource limit prevented the operation.
    OutOfResources = 5,
    /// The entity is not yet enabled.
    NotEnabled = 6,
    /// Attempt to modify an immutable QoS policy on an enabled entity.
    ImmutablePolicy = 7,
    /// The supplied QoS policies are mutually inconsistent.
    InconsistentPolicy = 8,
    /// The entity has already been deleted.
    AlreadyDeleted = 9,
    /// The operation did not complete within the allotted time.
    Timeout = 10,
    /// No data available to read or take.
    NoData = 11,
    /// The operation is invoked on an inappropriate kind of entity.
    IllegalOperation = 12,
    /// The security configuration denies the operation.
    NotAllowedBySecurity = 13,
    /// The requested object does not exist.
    NotFound = 14,
}

impl ReturnCode {
    /// Signed-integer encoding: always negative.
    #[must_use]
    pub const fn as_retcode(self) -> i32 {
        -(self as i32)
    }

    /// Decode a negative return value; `None` for non-negative or unknown codes.
    #[must_use]
    pub fn from_retcode(rc: i32) -> Option<Self> {
        match -rc {
            1 => Some(Self::Error),
            2 => Some(Self::Unsupported),
            3 => Some(Self::BadParameter),
            4 => Some(Self::PreconditionNotMet),
            5 => Some(Self::OutOfResources),
            6 => Some(Self::NotEnabled),
            7 => Some(Self::ImmutablePolicy),
            8 => Some(Self::InconsistentPolicy),
            9 => Some(Self::AlreadyDeleted),
            10 => Some(Self::Timeout),
            11 => Some(Self::NoData),
            12 => Some(Self::IllegalOperation),
            13 => Some(Self::NotAllowedBySecurity),
            14 => Some(Self::NotFound),
            _ => None,
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Error => "internal error",
            Self::Unsupported => "unsupported operation",
            Self::BadParameter => "bad parameter",
            Self::PreconditionNotMet => "precondition not met",
            Self::OutOfResources => "out of resources",
            Self::NotEnabled => "entity not enabled",
            Self::ImmutablePolicy => "immutable policy",
            Self::InconsistentPolicy => "inconsistent policy",
            Self::AlreadyDeleted => "already deleted",
            Self::Timeout => "timeout",
            Self::NoData => "no data",
            Self::IllegalOperation => "illegal operation",
            Self::NotAllowedBySecurity => "not allowed by security",
            Self::NotFound => "not found",
        };
        f.write_str(s)
    }
}

impl std::error::Error for ReturnCode {}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, ReturnCode>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retcode_encoding_negative() {
        assert_eq!(ReturnCode::Error.as_retcode(), -1);
        assert_eq!(ReturnCode::BadParameter.as_retcode(), -3);
        assert_eq!(ReturnCode::AlreadyDeleted.as_retcode(), -9);
        assert_eq!(ReturnCode::NotFound.as_retcode(), -14);
    }

    #[test]
    fn test_retcode_roundtrip() {
        for rc in [
            ReturnCode::Error,
            ReturnCode::Unsupported,
            ReturnCode::BadParameter,
            ReturnCode::PreconditionNotMet,
            ReturnCode::OutOfResources,
            ReturnCode::NotEnabled,
            ReturnCode::ImmutablePolicy,
            ReturnCode::InconsistentPolicy,
            ReturnCode::AlreadyDeleted,
            ReturnCode::Timeout,
            ReturnCode::NoData,
            ReturnCode::IllegalOperation,
            ReturnCode::NotAllowedBySecurity,
            ReturnCode::NotFound,
        ] {
            assert_eq!(ReturnCode::from_retcode(rc.as_retcode()), Some(rc));
        }
    }

    #[test]
    fn test_retcode_from_positive_is_none() {
        assert_eq!(ReturnCode::from_retcode(0), None);
        assert_eq!(ReturnCode::from_retcode(42), None);
    }

    #[test]
    fn test_retcode_display() {
        assert_eq!(ReturnCode::Timeout.to_string(), "timeout");
        assert_eq!(ReturnCode::NoData.to_string(), "no data");
    }
}
