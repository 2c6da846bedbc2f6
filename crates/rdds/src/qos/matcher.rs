// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Reader/writer QoS compatibility.
//!
//! Matching walks the policies in a fixed order and stops at the first
//! failure, reporting that policy as the reason. Ordinal policies require
//! offered >= requested; deadline and latency budget require
//! requested >= offered; ownership must match exactly; partitions match on
//! glob-style intersection; the writer's preferred data representation must
//! appear in the reader's list.
//!
//! Type compatibility depends on what both ends advertise. With type
//! information on both sides the reader's TYPE_CONSISTENCY_ENFORCEMENT
//! selects minimal-id equality or library-backed assignability; if a needed
//! type is not yet resolved locally the verdict is deferred and the caller
//! is told which side needs a type lookup. Without type information the
//! type names are compared byte for byte.

use crate::core::typelib::TypeLibrary;
use crate::qos::policy::TypeConsistencyKind;
use crate::qos::{
    Qos, QosPolicyId, QP_DATA_REPRESENTATION, QP_DEADLINE, QP_DESTINATION_ORDER, QP_DURABILITY,
    QP_LATENCY_BUDGET, QP_LIVELINESS, QP_OWNERSHIP, QP_PARTITION, QP_PRESENTATION, QP_RELIABILITY,
    QP_TOPIC_NAME, QP_TYPE_NAME,
};

/// Outcome of a compatibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// The endpoints are compatible.
    Match,
    /// Incompatible; the id names the first policy that failed. Topic-name
    /// and type-name mismatches carry `QosPolicyId::Invalid` since they are
    /// not policies proper.
    Mismatch(QosPolicyId),
    /// Not yet decidable: a type must be resolved first. The flags tell the
    /// caller which side needs a type-lookup request.
    Deferred {
        rd_lookup_needed: bool,
        wr_lookup_needed: bool,
    },
}

impl MatchResult {
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, MatchResult::Match)
    }
}

/// Glob match: `*` and `?` wildcards in `pat`, literal `name`.
fn patmatch(pat: &str, name: &str) -> bool {
    let p: Vec<char> = pat.chars().collect();
    let n: Vec<char> = name.chars().collect();
    patmatch_at(&p, &n)
}

fn patmatch_at(pat: &[char], name: &[char]) -> bool {
    match pat.first() {
        None => name.is_empty(),
        Some('*') => {
            // Greedily consume; try every possible split.
            (0..=name.len()).any(|i| patmatch_at(&pat[1..], &name[i..]))
        }
        Some('?') => !name.is_empty() && patmatch_at(&pat[1..], &name[1..]),
        Some(c) => name.first() == Some(c) && patmatch_at(&pat[1..], &name[1..]),
    }
}

fn is_wildcard(s: &str) -> bool {
    s.contains('*') || s.contains('?')
}

/// Pattern match where only the pattern side may carry wildcards.
fn partition_patmatch(pat: &str, name: &str) -> bool {
    if !is_wildcard(pat) {
        pat == name
    } else if is_wildcard(name) {
        // Wildcard on both sides never matches.
        false
    } else {
        patmatch(pat, name)
    }
}

/// No partitions, or any pattern matching the empty default partition name.
fn partitions_match_default(qos: &Qos) -> bool {
    if !qos.is_present(QP_PARTITION) || qos.partition.is_empty() {
        return true;
    }
    qos.partition.iter().any(|p| partition_patmatch(p, ""))
}

/// Symmetric partition intersection with wildcard support.
fn partitions_match(a: &Qos, b: &Qos) -> bool {
    if !a.is_present(QP_PARTITION) || a.partition.is_empty() {
        partitions_match_default(b)
    } else if !b.is_present(QP_PARTITION) || b.partition.is_empty() {
        partitions_match_default(a)
    } else {
        a.partition.iter().any(|pa| {
            b.partition
                .iter()
                .any(|pb| partition_patmatch(pa, pb) || partition_patmatch(pb, pa))
        })
    }
}

/// The writer uses only its first representation identifier; the reader
/// accepts it if the id appears anywhere in its own list.
fn data_representation_match(rd: &Qos, wr: &Qos) -> bool {
    let Some(&wr_first) = wr.data_representation.first() else {
        return false;
    };
    rd.data_representation.contains(&wr_first)
}

/// Full compatibility check, equivalent to a mask of all ones.
pub fn qos_match(typelib: &TypeLibrary, rd: &Qos, wr: &Qos) -> MatchResult {
    qos_match_mask(typelib, rd, wr, !0u64)
}

/// Compatibility restricted to the policies in `mask`.
pub fn qos_match_mask(typelib: &TypeLibrary, rd: &Qos, wr: &Qos, mask: u64) -> MatchResult {
    let mask = mask & rd.present & wr.present;

    if mask & QP_TOPIC_NAME != 0 && rd.topic_name != wr.topic_name {
        return MatchResult::Mismatch(QosPolicyId::Invalid);
    }
    if mask & QP_RELIABILITY != 0 && rd.reliability.kind > wr.reliability.kind {
        return MatchResult::Mismatch(QosPolicyId::Reliability);
    }
    if mask & QP_DURABILITY != 0 && rd.durability > wr.durability {
        return MatchResult::Mismatch(QosPolicyId::Durability);
    }
    if mask & QP_PRESENTATION != 0 {
        let (rp, wp) = (&rd.presentation, &wr.presentation);
        if rp.access_scope > wp.access_scope
            || (rp.coherent_access && !wp.coherent_access)
            || (rp.ordered_access && !wp.ordered_access)
        {
            return MatchResult::Mismatch(QosPolicyId::Presentation);
        }
    }
    if mask & QP_DEADLINE != 0 && rd.deadline < wr.deadline {
        return MatchResult::Mismatch(QosPolicyId::Deadline);
    }
    if mask & QP_LATENCY_BUDGET != 0 && rd.latency_budget < wr.latency_budget {
        return MatchResult::Mismatch(QosPolicyId::LatencyBudget);
    }
    if mask & QP_OWNERSHIP != 0 && rd.ownership != wr.ownership {
        return MatchResult::Mismatch(QosPolicyId::Ownership);
    }
    if mask & QP_LIVELINESS != 0 {
        if rd.liveliness.kind > wr.liveliness.kind {
            return MatchResult::Mismatch(QosPolicyId::Liveliness);
        }
        if rd.liveliness.lease_duration < wr.liveliness.lease_duration {
            return MatchResult::Mismatch(QosPolicyId::Liveliness);
        }
    }
    if mask & QP_DESTINATION_ORDER != 0 && rd.destination_order > wr.destination_order {
        return MatchResult::Mismatch(QosPolicyId::DestinationOrder);
    }
    if mask & QP_PARTITION != 0 && !partitions_match(rd, wr) {
        return MatchResult::Mismatch(QosPolicyId::Partition);
    }
    if mask & QP_DATA_REPRESENTATION != 0 && !data_representation_match(rd, wr) {
        return MatchResult::Mismatch(QosPolicyId::DataRepresentation);
    }

    match (rd.type_information(), wr.type_information()) {
        (Some(rd_info), Some(wr_info)) => {
            let tce = rd.type_consistency;
            if tce.kind == TypeConsistencyKind::DisallowTypeCoercion {
                if rd_info.minimal != wr_info.minimal {
                    return MatchResult::Mismatch(QosPolicyId::TypeConsistencyEnforcement);
                }
            } else {
                let rd_unresolved = !typelib.is_resolved(rd_info.minimal);
                let wr_unresolved = !typelib.is_resolved(wr_info.minimal);
                if rd_unresolved || wr_unresolved {
                    return MatchResult::Deferred {
                        rd_lookup_needed: rd_unresolved,
                        wr_lookup_needed: wr_unresolved,
                    };
                }
                if !typelib.is_assignable_from(rd_info, wr_info) {
                    return MatchResult::Mismatch(QosPolicyId::TypeConsistencyEnforcement);
                }
            }
        }
        _ => {
            // At least one side has no type information.
            if rd.type_consistency.force_type_validation {
                return MatchResult::Mismatch(QosPolicyId::TypeConsistencyEnforcement);
            }
            if mask & QP_TYPE_NAME != 0 && rd.type_name != wr.type_name {
                return MatchResult::Mismatch(QosPolicyId::Invalid);
            }
        }
    }

    MatchResult::Match
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::typelib::{TypeId, TypeInformation};
    use crate::qos::policy::{
        DataRepresentationId, DurabilityKind, OwnershipKind, ReliabilityKind, TypeConsistency,
    };
    use crate::time::Duration;
    use std::sync::Arc;

    fn endpoint_pair() -> (Qos, Qos) {
        let mut rd = Qos::default_reader();
        let mut wr = Qos::default_writer();
        for q in [&mut rd, &mut wr] {
            q.set_topic_name("T");
            q.set_type_name("Ty");
        }
        (rd, wr)
    }

    #[test]
    fn test_default_endpoints_match() {
        let lib = TypeLibrary::new();
        let (rd, wr) = endpoint_pair();
        assert_eq!(qos_match(&lib, &rd, &wr), MatchResult::Match);
    }

    #[test]
    fn test_match_is_deterministic() {
        let lib = TypeLibrary::new();
        let (mut rd, wr) = endpoint_pair();
        rd.set_reliability(ReliabilityKind::Reliable, Duration::from_millis(100));
        rd.set_durability(DurabilityKind::Persistent);
        let first = qos_match(&lib, &rd, &wr);
        for _ in 0..10 {
            assert_eq!(qos_match(&lib, &rd, &wr), first);
        }
    }

    #[test]
    fn test_reliability_mismatch() {
        let lib = TypeLibrary::new();
        let (mut rd, mut wr) = endpoint_pair();
        rd.set_reliability(ReliabilityKind::Reliable, Duration::from_millis(100));
        wr.set_reliability(ReliabilityKind::BestEffort, Duration::from_millis(100));
        assert_eq!(
            qos_match(&lib, &rd, &wr),
            MatchResult::Mismatch(QosPolicyId::Reliability)
        );
    }

    #[test]
    fn test_durability_ordinal() {
        let lib = TypeLibrary::new();
        let (mut rd, mut wr) = endpoint_pair();
        rd.set_durability(DurabilityKind::TransientLocal);
        wr.set_durability(DurabilityKind::Volatile);
        assert_eq!(
            qos_match(&lib, &rd, &wr),
            MatchResult::Mismatch(QosPolicyId::Durability)
        );
        // Offered above requested is fine.
        wr.set_durability(DurabilityKind::Persistent);
        assert_eq!(qos_match(&lib, &rd, &wr), MatchResult::Match);
    }

    #[test]
    fn test_deadline_direction() {
        let lib = TypeLibrary::new();
        let (mut rd, mut wr) = endpoint_pair();
        // Reader requires updates every second, writer only promises 2s.
        rd.set_deadline(Duration::from_secs(1));
        wr.set_deadline(Duration::from_secs(2));
        assert_eq!(
            qos_match(&lib, &rd, &wr),
            MatchResult::Mismatch(QosPolicyId::Deadline)
        );
        rd.set_deadline(Duration::from_secs(3));
        assert_eq!(qos_match(&lib, &rd, &wr), MatchResult::Match);
    }

    #[test]
    fn test_ownership_exact_and_symmetric() {
        let lib = TypeLibrary::new();
        let (mut rd, mut wr) = endpoint_pair();
        rd.set_ownership(OwnershipKind::Exclusive);
        wr.set_ownership(OwnershipKind::Shared);
        let fwd = qos_match(&lib, &rd, &wr);
        assert_eq!(fwd, MatchResult::Mismatch(QosPolicyId::Ownership));

        // Swapping the kinds yields the same verdict.
        rd.set_ownership(OwnershipKind::Shared);
        wr.set_ownership(OwnershipKind::Exclusive);
        assert_eq!(qos_match(&lib, &rd, &wr), fwd);
    }

    #[test]
    fn test_topic_name_mismatch_has_no_policy_reason() {
        let lib = TypeLibrary::new();
        let (mut rd, wr) = endpoint_pair();
        rd.set_topic_name("Other");
        assert_eq!(
            qos_match(&lib, &rd, &wr),
            MatchResult::Mismatch(QosPolicyId::Invalid)
        );
    }

    #[test]
    fn test_mask_restricts_checks() {
        let lib = TypeLibrary::new();
        let (mut rd, mut wr) = endpoint_pair();
        rd.set_reliability(ReliabilityKind::Reliable, Duration::from_millis(100));
        wr.set_reliability(ReliabilityKind::BestEffort, Duration::from_millis(100));
        // With reliability masked out the pair is compatible.
        assert_eq!(
            qos_match_mask(&lib, &rd, &wr, !0u64 & !QP_RELIABILITY),
            MatchResult::Match
        );
    }

    #[test]
    fn test_partition_wildcards() {
        let lib = TypeLibrary::new();
        let (mut rd, mut wr) = endpoint_pair();

        rd.set_partition(&["A*"]);
        wr.set_partition(&["Anything"]);
        assert_eq!(qos_match(&lib, &rd, &wr), MatchResult::Match);

        // Identical wildcard strings compare literally.
        wr.set_partition(&["A*"]);
        assert_eq!(qos_match(&lib, &rd, &wr), MatchResult::Match);

        wr.set_partition(&["B*"]);
        assert_eq!(
            qos_match(&lib, &rd, &wr),
            MatchResult::Mismatch(QosPolicyId::Partition)
        );
    }

    #[test]
    fn test_partition_empty_vs_pattern() {
        let lib = TypeLibrary::new();
        let (mut rd, mut wr) = endpoint_pair();
        // Writer with no partitions holds the single empty name; a reader
        // whose pattern matches "" still matches it.
        rd.set_partition(&["*"]);
        wr.set_partition(&[]);
        assert_eq!(qos_match(&lib, &rd, &wr), MatchResult::Match);

        rd.set_partition(&["X?"]);
        assert_eq!(
            qos_match(&lib, &rd, &wr),
            MatchResult::Mismatch(QosPolicyId::Partition)
        );
    }

    #[test]
    fn test_partition_symmetry() {
        let lib = TypeLibrary::new();
        let (mut rd, mut wr) = endpoint_pair();
        rd.set_partition(&["sensors"]);
        wr.set_partition(&["sen*"]);
        assert_eq!(qos_match(&lib, &rd, &wr), MatchResult::Match);

        rd.set_partition(&["sen*"]);
        wr.set_partition(&["sensors"]);
        assert_eq!(qos_match(&lib, &rd, &wr), MatchResult::Match);
    }

    #[test]
    fn test_data_representation_first_id_rule() {
        let lib = TypeLibrary::new();
        let (mut rd, mut wr) = endpoint_pair();
        wr.set_data_representation(&[DataRepresentationId::Xcdr2, DataRepresentationId::Xcdr1]);
        rd.set_data_representation(&[DataRepresentationId::Xcdr1]);
        // Writer prefers XCDR2, reader only accepts XCDR1: mismatch even
        // though the writer could also do XCDR1.
        assert_eq!(
            qos_match(&lib, &rd, &wr),
            MatchResult::Mismatch(QosPolicyId::DataRepresentation)
        );

        rd.set_data_representation(&[DataRepresentationId::Xcdr1, DataRepresentationId::Xcdr2]);
        assert_eq!(qos_match(&lib, &rd, &wr), MatchResult::Match);
    }

    #[test]
    fn test_type_name_fallback() {
        let lib = TypeLibrary::new();
        let (mut rd, wr) = endpoint_pair();
        rd.set_type_name("SomethingElse");
        assert_eq!(
            qos_match(&lib, &rd, &wr),
            MatchResult::Mismatch(QosPolicyId::Invalid)
        );
    }

    #[test]
    fn test_force_type_validation_without_info() {
        let lib = TypeLibrary::new();
        let (mut rd, wr) = endpoint_pair();
        rd.set_type_consistency(TypeConsistency {
            force_type_validation: true,
            ..Default::default()
        });
        assert_eq!(
            qos_match(&lib, &rd, &wr),
            MatchResult::Mismatch(QosPolicyId::TypeConsistencyEnforcement)
        );
    }

    #[test]
    fn test_type_lookup_deferral() {
        let lib = TypeLibrary::new();
        let (mut rd, mut wr) = endpoint_pair();
        let rd_info = TypeInformation {
            minimal: TypeId([1; 16]),
            complete: TypeId([2; 16]),
        };
        let wr_info = TypeInformation {
            minimal: TypeId([3; 16]),
            complete: TypeId([4; 16]),
        };
        rd.set_type_information(Arc::new(rd_info));
        wr.set_type_information(Arc::new(wr_info));

        // Nothing resolved: both sides need lookups.
        assert_eq!(
            qos_match(&lib, &rd, &wr),
            MatchResult::Deferred {
                rd_lookup_needed: true,
                wr_lookup_needed: true,
            }
        );

        lib.mark_resolved(rd_info.minimal);
        assert_eq!(
            qos_match(&lib, &rd, &wr),
            MatchResult::Deferred {
                rd_lookup_needed: false,
                wr_lookup_needed: true,
            }
        );

        // Both resolved but not assignable.
        lib.mark_resolved(wr_info.minimal);
        assert_eq!(
            qos_match(&lib, &rd, &wr),
            MatchResult::Mismatch(QosPolicyId::TypeConsistencyEnforcement)
        );

        // Finally assignable.
        lib.record_assignable(rd_info.minimal, wr_info.minimal);
        assert_eq!(qos_match(&lib, &rd, &wr), MatchResult::Match);
    }

    #[test]
    fn test_disallow_coercion_compares_ids() {
        let lib = TypeLibrary::new();
        let (mut rd, mut wr) = endpoint_pair();
        let info = TypeInformation {
            minimal: TypeId([7; 16]),
            complete: TypeId([8; 16]),
        };
        rd.set_type_information(Arc::new(info));
        wr.set_type_information(Arc::new(info));
        rd.set_type_consistency(TypeConsistency {
            kind: TypeConsistencyKind::DisallowTypeCoercion,
            ..Default::default()
        });
        // Equal ids need no resolution at all.
        assert_eq!(qos_match(&lib, &rd, &wr), MatchResult::Match);

        let other = TypeInformation {
            minimal: TypeId([9; 16]),
            complete: TypeId([10; 16]),
        };
        wr.set_type_information(Arc::new(other));
        assert_eq!(
            qos_match(&lib, &rd, &wr),
            MatchResult::Mismatch(QosPolicyId::TypeConsistencyEnforcement)
        );
    }

    #[test]
    fn test_patmatch_basics() {
        assert!(patmatch("a*c", "abc"));
        assert!(patmatch("a*c", "ac"));
        assert!(patmatch("a?c", "abc"));
        assert!(!patmatch("a?c", "ac"));
        assert!(patmatch("*", ""));
        assert!(!patmatch("b*", "abc"));
    }
}
