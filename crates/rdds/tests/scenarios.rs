// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! End-to-end scenarios over the public entity API. Each test uses its own
//! domain id so parallel tests never cross-match.

mod common;

use common::KeyedValue;
use rdds::dds::rhc::{
    ALIVE_INSTANCE_STATE, NOT_ALIVE_DISPOSED_INSTANCE_STATE, NOT_READ_SAMPLE_STATE,
};
use rdds::dds::status::DATA_AVAILABLE_STATUS;
use rdds::qos::policy::{History, ReliabilityKind};
use rdds::qos::QosPolicyId;
use rdds::{self as dds, Duration, Qos, ReturnCode, TopicType};

fn setup(domain: u32, topic_name: &str) -> (i32, i32) {
    let participant = dds::create_participant(domain, None, None).expect("participant");
    let topic = dds::create_topic(
        participant,
        KeyedValue::descriptor(),
        topic_name,
        None,
        None,
    )
    .expect("topic");
    (participant, topic)
}

#[test]
fn test_s1_basic_match() {
    let (participant, topic) = setup(100, "S1Topic");
    let reader = dds::create_reader(participant, topic, None, None).expect("reader");
    let writer = dds::create_writer(participant, topic, None, None).expect("writer");

    let pm = dds::get_publication_matched_status(writer).expect("pm status");
    assert_eq!(pm.current_count, 1);
    assert_eq!(pm.total_count, 1);

    let sm = dds::get_subscription_matched_status(reader).expect("sm status");
    assert_eq!(sm.current_count, 1);
    assert_eq!(sm.total_count, 1);

    dds::delete(participant).expect("delete");
}

#[test]
fn test_s2_reliability_mismatch() {
    let (participant, topic) = setup(101, "S2Topic");

    let mut rd_qos = Qos::new();
    rd_qos.set_reliability(ReliabilityKind::Reliable, Duration::from_millis(100));
    let reader = dds::create_reader(participant, topic, Some(rd_qos), None).expect("reader");

    let mut wr_qos = Qos::new();
    wr_qos.set_reliability(ReliabilityKind::BestEffort, Duration::from_millis(100));
    let writer = dds::create_writer(participant, topic, Some(wr_qos), None).expect("writer");

    let riq = dds::get_requested_incompatible_qos_status(reader).expect("riq status");
    assert_eq!(riq.total_count, 1);
    assert_eq!(riq.last_policy_id, QosPolicyId::Reliability);

    let oiq = dds::get_offered_incompatible_qos_status(writer).expect("oiq status");
    assert_eq!(oiq.total_count, 1);
    assert_eq!(oiq.last_policy_id, QosPolicyId::Reliability);

    // No match happened.
    let pm = dds::get_publication_matched_status(writer).expect("pm status");
    assert_eq!(pm.current_count, 0);

    dds::delete(participant).expect("delete");
}

#[test]
fn test_s3_key_round_trip() {
    let (participant, topic) = setup(102, "S3Topic");
    let writer = dds::create_writer(participant, topic, None, None).expect("writer");

    let msg = KeyedValue::new(1, "payload");
    dds::write(writer, &msg).expect("write");

    let handle = dds::lookup_instance(writer, &KeyedValue::key(1)).expect("lookup");
    assert!(!handle.is_nil());
    // Fixed-key type: the instance handle folds the zero-padded big-endian
    // key stream.
    assert_eq!(handle.0, u64::from_be_bytes([0, 0, 0, 1, 0, 0, 0, 0]));

    let mut out = KeyedValue::key(0);
    dds::instance_get_key(writer, handle, &mut out).expect("get key");
    assert_eq!(out.k, 1);

    dds::delete(participant).expect("delete");
}

#[test]
fn test_s4_history_depth() {
    let (participant, topic) = setup(103, "S4Topic");

    let mut qos = Qos::new();
    qos.set_history(History::KeepLast(2));
    let reader = dds::create_reader(participant, topic, Some(qos.clone()), None).expect("reader");
    let writer = dds::create_writer(participant, topic, Some(qos), None).expect("writer");

    for v in ["one", "two", "three"] {
        let msg = KeyedValue::new(1, v);
        dds::write(writer, &msg).expect("write");
    }

    let samples = dds::read::<KeyedValue>(reader, 16).expect("read");
    let values: Vec<String> = samples.iter().map(|s| s.value()).collect();
    assert_eq!(values, vec!["two".to_string(), "three".to_string()]);

    // The writer history also holds exactly the last two sequence numbers.
    let st = dds::writer::whc_state(writer).expect("whc state");
    assert_eq!(st.max_seq - st.min_seq, 1);

    drop(samples);
    dds::delete(participant).expect("delete");
}

#[test]
fn test_s5_waitset_wakes_on_write() {
    let (participant, topic) = setup(104, "S5Topic");
    let reader = dds::create_reader(participant, topic, None, None).expect("reader");
    let writer = dds::create_writer(participant, topic, None, None).expect("writer");

    // Only data availability should trigger the wait.
    dds::set_status_mask(reader, DATA_AVAILABLE_STATUS).expect("mask");
    let _ = dds::take_status(reader, !0).expect("clear");

    let ws = dds::create_waitset(participant).expect("waitset");
    dds::waitset_attach(ws, reader, 0xBEEF).expect("attach");

    let writer_thread = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(50));
        let msg = KeyedValue::new(1, "wake");
        dds::write(writer, &msg).expect("write");
    });

    let tokens = dds::waitset_wait(ws, Duration::from_millis(2000)).expect("wait");
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0], 0xBEEF);

    writer_thread.join().expect("writer thread");
    dds::delete(participant).expect("delete");
}

#[test]
fn test_s6_disposal_generations() {
    let (participant, topic) = setup(105, "S6Topic");
    let reader = dds::create_reader(participant, topic, None, None).expect("reader");
    let writer = dds::create_writer(participant, topic, None, None).expect("writer");

    let msg = KeyedValue::new(1, "alive");
    let handle = dds::register_instance(writer, &msg).expect("register");
    assert!(!handle.is_nil());
    dds::write(writer, &msg).expect("write");
    dds::dispose(writer, &msg).expect("dispose");

    let samples = dds::read::<KeyedValue>(reader, 16).expect("read");
    assert_eq!(samples.len(), 2);

    let first = &samples[0];
    assert!(first.info.valid_data);
    assert_eq!(first.info.instance_state, ALIVE_INSTANCE_STATE);
    assert_eq!(first.info.disposed_generation_count, 0);
    assert_eq!(first.value(), "alive");

    let second = &samples[1];
    assert!(!second.info.valid_data);
    assert_eq!(second.info.instance_state, NOT_ALIVE_DISPOSED_INSTANCE_STATE);
    assert_eq!(second.info.disposed_generation_count, 1);
    // The invalid sample still carries the key.
    assert_eq!(second.k, 1);

    drop(samples);
    dds::delete(participant).expect("delete");
}

#[test]
fn test_read_take_equivalence() {
    let (participant, topic) = setup(106, "RWTopic");
    let reader = dds::create_reader(participant, topic, None, None).expect("reader");
    let writer = dds::create_writer(participant, topic, None, None).expect("writer");

    for k in 1..=3 {
        let msg = KeyedValue::new(k, "x");
        dds::write(writer, &msg).expect("write");
    }

    // read -> read returns the same samples, NOT_READ exactly once.
    let first = dds::read::<KeyedValue>(reader, 16).expect("read 1");
    assert_eq!(first.len(), 3);
    assert!(first
        .iter()
        .all(|s| s.info.sample_state == NOT_READ_SAMPLE_STATE));
    drop(first);

    let second = dds::read::<KeyedValue>(reader, 16).expect("read 2");
    assert_eq!(second.len(), 3);
    assert!(second
        .iter()
        .all(|s| s.info.sample_state != NOT_READ_SAMPLE_STATE));
    drop(second);

    // take -> read returns nothing for the taken set.
    let taken = dds::take::<KeyedValue>(reader, 16).expect("take");
    assert_eq!(taken.len(), 3);
    drop(taken);
    let after = dds::read::<KeyedValue>(reader, 16).expect("read 3");
    assert!(after.is_empty());

    dds::delete(participant).expect("delete");
}

#[test]
fn test_transient_local_replay() {
    let (participant, topic) = setup(107, "TLTopic");

    let mut qos = Qos::new();
    qos.set_durability(rdds::qos::policy::DurabilityKind::TransientLocal);
    qos.set_history(History::KeepLast(8));
    let writer = dds::create_writer(participant, topic, Some(qos.clone()), None).expect("writer");

    let msg = KeyedValue::new(5, "early");
    dds::write(writer, &msg).expect("write");

    // Late joiner sees the historical sample.
    let reader = dds::create_reader(participant, topic, Some(qos), None).expect("reader");
    let samples = dds::take::<KeyedValue>(reader, 16).expect("take");
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].k, 5);
    assert_eq!(samples[0].value(), "early");

    drop(samples);
    dds::delete(participant).expect("delete");
}

#[test]
fn test_listener_publication_matched_fires() {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    let (participant, topic) = setup(108, "ListenerTopic");

    let hits = Arc::new(AtomicU32::new(0));
    let hits2 = Arc::clone(&hits);
    let listener = dds::Listener::new().on_publication_matched(move |_, status| {
        if status.current_count == 1 {
            hits2.fetch_add(1, Ordering::SeqCst);
        }
    });
    let writer = dds::create_writer(participant, topic, None, Some(listener)).expect("writer");
    let _reader = dds::create_reader(participant, topic, None, None).expect("reader");

    // Listener dispatch runs on a library thread; give it a moment.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while hits.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let _ = writer;
    dds::delete(participant).expect("delete");
}

#[test]
fn test_guard_condition_and_waitset() {
    let participant = dds::create_participant(109, None, None).expect("participant");
    let guard = dds::create_guardcondition(participant).expect("guard");
    let ws = dds::create_waitset(participant).expect("waitset");
    dds::waitset_attach(ws, guard, 7).expect("attach");

    // Nothing triggered yet.
    assert_eq!(
        dds::waitset_wait(ws, Duration::ZERO),
        Err(ReturnCode::Timeout)
    );

    dds::set_guardcondition(guard, true).expect("set");
    let tokens = dds::waitset_wait(ws, Duration::from_millis(500)).expect("wait");
    assert_eq!(tokens, vec![7]);

    assert!(dds::take_guardcondition(guard).expect("take"));
    assert!(!dds::read_guardcondition(guard).expect("read"));

    dds::delete(participant).expect("delete");
}

#[test]
fn test_read_condition_trigger() {
    let (participant, topic) = setup(110, "CondTopic");
    let reader = dds::create_reader(participant, topic, None, None).expect("reader");
    let writer = dds::create_writer(participant, topic, None, None).expect("writer");

    let cond = dds::create_readcondition(reader, NOT_READ_SAMPLE_STATE).expect("cond");
    let ws = dds::create_waitset(participant).expect("waitset");
    dds::waitset_attach(ws, cond, 11).expect("attach");

    assert_eq!(
        dds::waitset_wait(ws, Duration::ZERO),
        Err(ReturnCode::Timeout)
    );

    let msg = KeyedValue::new(2, "cond");
    dds::write(writer, &msg).expect("write");

    let tokens = dds::waitset_wait(ws, Duration::from_millis(500)).expect("wait");
    assert_eq!(tokens, vec![11]);

    // Reading through the reader retires the condition's trigger.
    let samples = dds::read::<KeyedValue>(reader, 16).expect("read");
    assert_eq!(samples.len(), 1);
    drop(samples);
    assert_eq!(
        dds::waitset_wait(ws, Duration::ZERO),
        Err(ReturnCode::Timeout)
    );

    dds::delete(participant).expect("delete");
}

#[test]
fn test_query_condition_filters() {
    let (participant, topic) = setup(111, "QueryTopic");
    let reader = dds::create_reader(participant, topic, None, None).expect("reader");
    let writer = dds::create_writer(participant, topic, None, None).expect("writer");

    let cond = dds::create_querycondition::<KeyedValue, _>(reader, 0, |s| s.k >= 10)
        .expect("querycondition");

    let msg = KeyedValue::new(1, "small");
    dds::write(writer, &msg).expect("write");
    assert!(!dds::triggered(cond).expect("triggered"));

    let msg = KeyedValue::new(12, "big");
    dds::write(writer, &msg).expect("write");
    assert!(dds::triggered(cond).expect("triggered"));

    dds::delete(participant).expect("delete");
}

#[test]
fn test_matched_queries_and_builtin_data() {
    let (participant, topic) = setup(112, "MatchedTopic");
    let reader = dds::create_reader(participant, topic, None, None).expect("reader");
    let writer = dds::create_writer(participant, topic, None, None).expect("writer");

    // Size probe with the null-ok idiom.
    let count = dds::get_matched_subscriptions(writer, None).expect("probe");
    assert_eq!(count, 1);

    let mut handles = [rdds::InstanceHandle::NIL; 4];
    let filled = dds::get_matched_subscriptions(writer, Some(&mut handles)).expect("fill");
    assert_eq!(filled, 1);
    assert!(!handles[0].is_nil());

    let data = dds::get_matched_subscription_data(writer, handles[0]).expect("data");
    assert_eq!(data.topic_name, "MatchedTopic");
    assert_eq!(data.type_name, "KeyedValue");

    let rd_count = dds::reader::get_matched_publications(reader, None).expect("probe");
    assert_eq!(rd_count, 1);

    dds::delete(participant).expect("delete");
}

#[test]
fn test_content_filtered_delivery() {
    let participant = dds::create_participant(113, None, None).expect("participant");
    let filter = dds::TopicFilter::sample::<KeyedValue>(|s| s.k % 2 == 0);
    let topic = dds::create_topic_with_filter(
        participant,
        KeyedValue::descriptor(),
        "EvenTopic",
        None,
        None,
        filter,
    )
    .expect("topic");
    let reader = dds::create_reader(participant, topic, None, None).expect("reader");
    let writer = dds::create_writer(participant, topic, None, None).expect("writer");

    for k in 1..=6 {
        let msg = KeyedValue::new(k, "f");
        dds::write(writer, &msg).expect("write");
    }

    let samples = dds::take::<KeyedValue>(reader, 16).expect("take");
    let keys: Vec<i32> = samples.iter().map(|s| s.k).collect();
    assert_eq!(keys, vec![2, 4, 6]);

    drop(samples);
    dds::delete(participant).expect("delete");
}

#[test]
fn test_coherent_set_delivery() {
    let (participant, topic) = setup(114, "CoherentTopic");
    let mut pub_qos = Qos::new();
    pub_qos.set_presentation(rdds::qos::policy::Presentation {
        access_scope: rdds::qos::policy::PresentationAccessScope::Topic,
        coherent_access: true,
        ordered_access: false,
    });
    let publisher = dds::create_publisher(participant, Some(pub_qos), None).expect("publisher");
    let reader = dds::create_reader(participant, topic, None, None).expect("reader");
    let writer = dds::create_writer(publisher, topic, None, None).expect("writer");

    dds::begin_coherent(publisher).expect("begin");
    for k in 1..=2 {
        let msg = KeyedValue::new(k, "c");
        dds::write(writer, &msg).expect("write");
    }
    // Nothing visible until the set closes.
    assert!(dds::read::<KeyedValue>(reader, 16).expect("read").is_empty());

    dds::end_coherent(publisher).expect("end");
    let samples = dds::read::<KeyedValue>(reader, 16).expect("read");
    assert_eq!(samples.len(), 2);

    drop(samples);
    dds::delete(participant).expect("delete");
}

#[test]
fn test_write_batching_flush() {
    let participant = dds::create_participant_with_config(
        rdds::DomainConfig {
            domain_id: 115,
            whc_batch: true,
            ..Default::default()
        },
        None,
        None,
    )
    .expect("participant");
    let topic = dds::create_topic(
        participant,
        KeyedValue::descriptor(),
        "BatchTopic",
        None,
        None,
    )
    .expect("topic");
    let reader = dds::create_reader(participant, topic, None, None).expect("reader");
    let writer = dds::create_writer(participant, topic, None, None).expect("writer");

    let msg = KeyedValue::new(1, "batched");
    dds::write(writer, &msg).expect("write");
    // Held in the batch until flushed.
    assert!(dds::read::<KeyedValue>(reader, 16).expect("read").is_empty());

    dds::flush(writer).expect("flush");
    let samples = dds::read::<KeyedValue>(reader, 16).expect("read");
    assert_eq!(samples.len(), 1);

    drop(samples);
    dds::delete(participant).expect("delete");
}

#[test]
fn test_partition_isolation() {
    let (participant, topic) = setup(116, "PartTopic");

    let mut rd_qos = Qos::new();
    rd_qos.set_partition(&["telemetry*"]);
    let reader = dds::create_reader(participant, topic, Some(rd_qos), None).expect("reader");

    let mut wr_qos = Qos::new();
    wr_qos.set_partition(&["control"]);
    let writer = dds::create_writer(participant, topic, Some(wr_qos), None).expect("writer");

    let sm = dds::get_subscription_matched_status(reader).expect("sm");
    assert_eq!(sm.current_count, 0);

    let mut wr2_qos = Qos::new();
    wr2_qos.set_partition(&["telemetry_imu"]);
    let _writer2 = dds::create_writer(participant, topic, Some(wr2_qos), None).expect("writer2");

    let sm = dds::get_subscription_matched_status(reader).expect("sm");
    assert_eq!(sm.current_count, 1);

    let _ = writer;
    dds::delete(participant).expect("delete");
}
