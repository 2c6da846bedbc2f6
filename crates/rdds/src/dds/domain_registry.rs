// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Intra-process endpoint registry, matching engine and delivery fan-out.
//!
//! Every enabled reader and writer registers here per domain. Endpoint
//! creation, enabling and deletion drive the matcher; a verdict updates the
//! `*_MATCHED` / `*_INCOMPATIBLE_QOS` statuses on both sides, wires the
//! delivery fan-out, and replays transient-local history to late joiners.
//! Delivery walks the writer's matched readers, applies the reader topic's
//! content filter, stores into the reader cache and raises the data
//! statuses (DATA_ON_READERS on the subscriber preempting DATA_AVAILABLE
//! listeners on the reader).

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::entity::{
    listener_chain_has_slot, raise, raise_silent, registry, EntityKind, EntityRec, EntitySpecific,
};
use super::listener::StatusEvent;
use super::reader::{check_requested_deadline, ReaderRec};
use super::rhc::{RhcStoreResult, SampleInfo};
use super::status::{SampleRejectedKind, StatusId};
use super::writer::{wants_historical, WriterRec};
use super::Entity;
use crate::core::ser::deserialize::deserialize_sample;
use crate::core::ser::free::{free_sample, FreeScope};
use crate::core::ser::sample::alloc_raw;
use crate::core::serdata::Serdata;
use crate::core::types::InstanceHandle;
use crate::qos::matcher::{qos_match, MatchResult};
use crate::qos::policy::IgnoreLocalKind;
use crate::qos::QosPolicyId;

#[derive(Debug, Default)]
struct DomainEndpoints {
    writers: Vec<Entity>,
    readers: Vec<Entity>,
}

fn endpoints() -> &'static DashMap<u32, Mutex<DomainEndpoints>> {
    static ENDPOINTS: OnceLock<DashMap<u32, Mutex<DomainEndpoints>>> = OnceLock::new();
    ENDPOINTS.get_or_init(DashMap::new)
}

pub(crate) fn register_writer(writer: Entity, domain_id: u32) {
    endpoints()
        .entry(domain_id)
        .or_default()
        .lock()
        .writers
        .push(writer);
}

pub(crate) fn register_reader(reader: Entity, domain_id: u32) {
    endpoints()
        .entry(domain_id)
        .or_default()
        .lock()
        .readers
        .push(reader);
}

/// Run the matcher for a just-enabled endpoint against every opposite
/// endpoint in its domain.
pub(crate) fn match_endpoint(entity: Entity, rec: &Arc<EntityRec>) {
    let (kind, domain_id) = {
        let c = rec.common.lock();
        (c.kind, c.domain_id)
    };
    let Some(eps) = endpoints().get(&domain_id) else {
        return;
    };
    let (writers, readers) = {
        let e = eps.lock();
        (e.writers.clone(), e.readers.clone())
    };
    drop(eps);
    match kind {
        EntityKind::Writer => {
            for reader in readers {
                try_match(reader, entity);
            }
        }
        EntityKind::Reader => {
            for writer in writers {
                try_match(entity, writer);
            }
        }
        _ => {}
    }
}

/// Skip matching against local endpoints per IGNORELOCAL.
fn ignore_local(
    rd_kind: IgnoreLocalKind,
    wr_kind: IgnoreLocalKind,
    same_participant: bool,
) -> bool {
    for kind in [rd_kind, wr_kind] {
        match kind {
            IgnoreLocalKind::None => {}
            IgnoreLocalKind::Participant if same_participant => return true,
            IgnoreLocalKind::Participant => {}
            // Everything in this registry is the same process.
            IgnoreLocalKind::Process => return true,
        }
    }
    false
}

fn try_match(reader: Entity, writer: Entity) {
    let Ok(rrec) = registry().lookup(reader) else {
        return;
    };
    let Ok(wrec) = registry().lookup(writer) else {
        return;
    };
    let (rd_qos, rd_enabled, rd_participant, rd_iid, rd_domain) = {
        let c = rrec.common.lock();
        (c.qos.clone(), c.enabled, c.participant, c.iid, c.domain_id)
    };
    let (wr_qos, wr_enabled, wr_participant, wr_iid) = {
        let c = wrec.common.lock();
        (c.qos.clone(), c.enabled, c.participant, c.iid)
    };
    if !rd_enabled || !wr_enabled {
        return;
    }
    if ignore_local(
        rd_qos.ignore_local,
        wr_qos.ignore_local,
        rd_participant == wr_participant,
    ) {
        return;
    }

    let Some(domain) = registry().domains.get(&rd_domain).map(|d| *d) else {
        return;
    };
    let Ok(drec) = registry().lookup(domain) else {
        return;
    };
    let EntitySpecific::Domain(d) = &drec.specific else {
        return;
    };

    match qos_match(&d.typelib, &rd_qos, &wr_qos) {
        MatchResult::Match => {
            let (EntitySpecific::Reader(r), EntitySpecific::Writer(w)) =
                (&rrec.specific, &wrec.specific)
            else {
                return;
            };
            // Guard against re-running the pair.
            {
                let mut matched = r.matched.lock();
                if matched.contains(&writer) {
                    return;
                }
                matched.push(writer);
            }
            w.matched.lock().push(reader);

            raise(&wrec, |c| {
                let st = &mut c.statuses.publication_matched;
                st.total_count += 1;
                st.total_count_change += 1;
                st.current_count += 1;
                st.current_count_change += 1;
                st.last_subscription_handle = rd_iid;
                StatusEvent::PublicationMatched(c.handle, *st)
            });
            raise(&rrec, |c| {
                let st = &mut c.statuses.subscription_matched;
                st.total_count += 1;
                st.total_count_change += 1;
                st.current_count += 1;
                st.current_count_change += 1;
                st.last_publication_handle = wr_iid;
                StatusEvent::SubscriptionMatched(c.handle, *st)
            });
            raise(&rrec, |c| {
                let st = &mut c.statuses.liveliness_changed;
                st.alive_count += 1;
                st.alive_count_change += 1;
                st.last_publication_handle = wr_iid;
                StatusEvent::LivelinessChanged(c.handle, *st)
            });
            log::debug!("[match] reader {} <-> writer {}", reader, writer);

            if wants_historical(&rd_qos, &wr_qos) {
                replay_history(reader, &rrec, writer, &wrec, w);
            }
        }
        MatchResult::Mismatch(QosPolicyId::Invalid) => {
            // Different topic or type name: not a QoS incompatibility.
        }
        MatchResult::Mismatch(reason) => {
            raise(&wrec, |c| {
                let st = &mut c.statuses.offered_incompatible_qos;
                st.total_count += 1;
                st.total_count_change += 1;
                st.last_policy_id = reason;
                StatusEvent::OfferedIncompatibleQos(c.handle, *st)
            });
            raise(&rrec, |c| {
                let st = &mut c.statuses.requested_incompatible_qos;
                st.total_count += 1;
                st.total_count_change += 1;
                st.last_policy_id = reason;
                StatusEvent::RequestedIncompatibleQos(c.handle, *st)
            });
            log::debug!(
                "[match] reader {} !! writer {} ({:?})",
                reader,
                writer,
                reason
            );
        }
        MatchResult::Deferred {
            rd_lookup_needed,
            wr_lookup_needed,
        } => {
            if rd_lookup_needed {
                if let Some(info) = rd_qos.type_information() {
                    d.typelib.request_lookup(info.minimal);
                }
            }
            if wr_lookup_needed {
                if let Some(info) = wr_qos.type_information() {
                    d.typelib.request_lookup(info.minimal);
                }
            }
            log::debug!(
                "[match] reader {} ?? writer {} awaiting type resolution",
                reader,
                writer
            );
        }
    }
}

/// Replay the writer's history cache into one late-joining reader.
fn replay_history(
    reader: Entity,
    rrec: &Arc<EntityRec>,
    writer: Entity,
    wrec: &Arc<EntityRec>,
    w: &WriterRec,
) {
    let EntitySpecific::Reader(r) = &rrec.specific else {
        return;
    };
    let (wr_guid, wr_iid) = {
        let c = wrec.common.lock();
        (c.guid, c.iid)
    };
    let mut it = w.whc.sample_iter_init();
    let mut delivered = 0usize;
    while let Some(borrow) = it.borrow_next() {
        let serdata = Arc::clone(&borrow.serdata);
        let instance = borrow.instance;
        w.whc.return_sample(borrow, false);
        if r.rhc.store(serdata, instance, wr_iid, wr_guid) == RhcStoreResult::Stored {
            delivered += 1;
        }
    }
    if delivered > 0 {
        log::debug!(
            "[match] replayed {} historical samples from writer {} to reader {}",
            delivered,
            writer,
            reader
        );
        raise_data_available(reader, rrec);
    }
}

/// Deliver a serdata to every matched reader.
pub(crate) fn deliver(writer: Entity, serdata: &Arc<Serdata>, instance: InstanceHandle) {
    deliver_with_sample(writer, serdata, instance, None);
}

/// Delivery with the original in-memory sample available for content
/// filters (the write path has it; batched/coherent paths do not and
/// reconstruct on demand).
pub(crate) fn deliver_with_sample(
    writer: Entity,
    serdata: &Arc<Serdata>,
    instance: InstanceHandle,
    sample: Option<*const u8>,
) {
    let Ok(wrec) = registry().lookup(writer) else {
        return;
    };
    let EntitySpecific::Writer(w) = &wrec.specific else {
        return;
    };
    let (wr_guid, wr_iid) = {
        let c = wrec.common.lock();
        (c.guid, c.iid)
    };
    let matched = w.matched.lock().clone();
    let now = crate::time::now();

    for reader in matched {
        let Ok(rrec) = registry().lookup(reader) else {
            continue;
        };
        let EntitySpecific::Reader(r) = &rrec.specific else {
            continue;
        };

        if !reader_filter_accepts(r, serdata, sample) {
            continue;
        }

        match r.rhc.store(Arc::clone(serdata), instance, wr_iid, wr_guid) {
            RhcStoreResult::Stored => {
                check_requested_deadline(&rrec, r, instance, now);
                raise_data_available(reader, &rrec);
            }
            rejected => {
                let reason = match rejected {
                    RhcStoreResult::RejectedByInstancesLimit => {
                        SampleRejectedKind::RejectedByInstancesLimit
                    }
                    RhcStoreResult::RejectedBySamplesPerInstanceLimit => {
                        SampleRejectedKind::RejectedBySamplesPerInstanceLimit
                    }
                    _ => SampleRejectedKind::RejectedBySamplesLimit,
                };
                raise(&rrec, |c| {
                    let st = &mut c.statuses.sample_rejected;
                    st.total_count += 1;
                    st.total_count_change += 1;
                    st.last_reason = reason;
                    st.last_instance_handle = instance;
                    StatusEvent::SampleRejected(c.handle, *st)
                });
            }
        }
    }
}

/// Evaluate the reader topic's content filter on the write path. The
/// sample info is minimally populated here: valid-data and the source
/// timestamp.
fn reader_filter_accepts(
    r: &ReaderRec,
    serdata: &Arc<Serdata>,
    sample: Option<*const u8>,
) -> bool {
    let Ok(trec) = registry().lookup(r.topic) else {
        return true;
    };
    let EntitySpecific::Topic(t) = &trec.specific else {
        return true;
    };
    if t.filter.is_none() {
        return true;
    }

    let info = SampleInfo {
        valid_data: serdata.kind == crate::core::serdata::SerdataKind::Data,
        source_timestamp: serdata.source_timestamp,
        ..Default::default()
    };

    match sample {
        Some(ptr) => t.filter.eval(ptr, &info),
        None => {
            // Reconstruct a sample just for the filter.
            if !info.valid_data {
                return true;
            }
            let desc = t.descriptor;
            let ptr = alloc_raw(desc);
            if ptr.is_null() {
                return true;
            }
            // SAFETY: fresh zeroed sample of the topic's layout.
            let verdict = unsafe {
                match deserialize_sample(desc, &serdata.payload, ptr, 0) {
                    Ok(()) => t.filter.eval(ptr, &info),
                    Err(_) => true,
                }
            };
            // SAFETY: allocated above; partial fills free cleanly.
            unsafe {
                let _ = free_sample(desc, ptr, FreeScope::Sample);
            }
            verdict
        }
    }
}

/// Raise the data statuses for a reader that just received data.
///
/// DATA_ON_READERS on the subscriber preempts DATA_AVAILABLE listeners: if
/// any table from the subscriber up handles it, reader-level callbacks are
/// suppressed (status bits and waitset triggers fire on both regardless).
pub(crate) fn raise_data_available(reader: Entity, rrec: &Arc<EntityRec>) {
    let subscriber = rrec.common.lock().parent;

    let preempted = if let Ok(srec) = registry().lookup(subscriber) {
        if listener_chain_has_slot(subscriber, StatusId::DataOnReaders) {
            raise(&srec, |c| StatusEvent::DataOnReaders(c.handle));
            true
        } else {
            raise_silent(&srec, StatusId::DataOnReaders);
            false
        }
    } else {
        false
    };

    if preempted {
        raise_silent(rrec, StatusId::DataAvailable);
    } else {
        raise(rrec, |c| StatusEvent::DataAvailable(c.handle));
    }
    notify_reader_conditions(reader);
}

/// Wake the waitsets of a reader's read/query conditions.
pub(crate) fn notify_reader_conditions(reader: Entity) {
    let Ok(rrec) = registry().lookup(reader) else {
        return;
    };
    let children = rrec.common.lock().children.clone();
    for child in children {
        let Ok(crec) = registry().lookup(child) else {
            continue;
        };
        let is_condition = matches!(
            crec.specific,
            EntitySpecific::ReadCondition(_) | EntitySpecific::QueryCondition(_)
        );
        if is_condition {
            let waitsets = crec.common.lock().waitsets.clone();
            for ws in waitsets {
                super::waitset::notify(ws);
            }
        }
    }
}

/// Tear down a writer: autodispose its registered instances, unmatch every
/// reader, unregister from the domain.
pub(crate) fn unregister_writer(writer: Entity, wrec: &Arc<EntityRec>, w: &WriterRec) {
    let (domain_id, wr_guid, wr_iid, qos) = {
        let c = wrec.common.lock();
        (c.domain_id, c.guid, c.iid, c.qos.clone())
    };

    // Autodispose registered instances while delivery still works.
    if qos.autodispose_unregistered {
        let registered: Vec<InstanceHandle> = w.registered.lock().iter().copied().collect();
        if !registered.is_empty() {
            if let Some(domain) = registry().domains.get(&domain_id).map(|d| *d) {
                if let Ok(drec) = registry().lookup(domain) {
                    if let EntitySpecific::Domain(d) = &drec.specific {
                        let force_md5 = super::topic::descriptor_of(w.topic)
                            .map(|desc| !desc.fixed_key(crate::core::ser::XcdrVersion::Xcdr1))
                            .unwrap_or(true);
                        for instance in registered {
                            if let Some(key_cdr) = d.tkmap.key_cdr(instance) {
                                let keyhash = crate::core::ser::key::keyhash_from_key_cdr(
                                    &key_cdr, force_md5,
                                );
                                let sd = Serdata::new_key(
                                    key_cdr,
                                    keyhash,
                                    crate::time::now(),
                                    wr_guid,
                                    crate::core::serdata::STATUSINFO_DISPOSE
                                        | crate::core::serdata::STATUSINFO_UNREGISTER,
                                );
                                deliver(writer, &sd, instance);
                            }
                        }
                    }
                }
            }
        }
    }

    if let Some(eps) = endpoints().get(&domain_id) {
        eps.lock().writers.retain(|e| *e != writer);
    }

    let matched = w.matched.lock().clone();
    for reader in matched {
        let Ok(rrec) = registry().lookup(reader) else {
            continue;
        };
        let EntitySpecific::Reader(r) = &rrec.specific else {
            continue;
        };
        r.matched.lock().retain(|e| *e != writer);
        raise(&rrec, |c| {
            let st = &mut c.statuses.subscription_matched;
            st.current_count = st.current_count.saturating_sub(1);
            st.current_count_change -= 1;
            st.last_publication_handle = wr_iid;
            StatusEvent::SubscriptionMatched(c.handle, *st)
        });
        raise(&rrec, |c| {
            let st = &mut c.statuses.liveliness_changed;
            st.alive_count = st.alive_count.saturating_sub(1);
            st.alive_count_change -= 1;
            st.last_publication_handle = wr_iid;
            StatusEvent::LivelinessChanged(c.handle, *st)
        });
        // Instances this writer was keeping alive may now have no writers.
        let transitioned = r.rhc.remove_writer(&wr_guid);
        if !transitioned.is_empty() {
            raise_data_available(reader, &rrec);
        }
    }
}

/// Tear down a reader: unmatch every writer, unregister from the domain.
pub(crate) fn unregister_reader(reader: Entity, rrec: &Arc<EntityRec>, r: &ReaderRec) {
    let (domain_id, rd_iid) = {
        let c = rrec.common.lock();
        (c.domain_id, c.iid)
    };
    if let Some(eps) = endpoints().get(&domain_id) {
        eps.lock().readers.retain(|e| *e != reader);
    }
    let matched = r.matched.lock().clone();
    for writer in matched {
        let Ok(wrec) = registry().lookup(writer) else {
            continue;
        };
        let EntitySpecific::Writer(w) = &wrec.specific else {
            continue;
        };
        w.matched.lock().retain(|e| *e != reader);
        raise(&wrec, |c| {
            let st = &mut c.statuses.publication_matched;
            st.current_count = st.current_count.saturating_sub(1);
            st.current_count_change -= 1;
            st.last_subscription_handle = rd_iid;
            StatusEvent::PublicationMatched(c.handle, *st)
        });
    }
}
