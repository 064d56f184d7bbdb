// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DataWriter QoS lifecycle: sequence numbering, history depth, deadline,
//! lifespan, QoS consistency and mutability, instance lifecycle.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{discovered_pair, fast_config, knows, wait_until, Blob, Reading};
use rtps_core::dds::WriterListener;
use rtps_core::{
    ChangeKind, DataReaderQos, DataWriterQos, DomainParticipant, Error, InstanceHandle,
    LoopbackHub, Reliability, ResourceLimits, TypeSupport,
};

fn participant() -> (Arc<LoopbackHub>, DomainParticipant) {
    let hub = LoopbackHub::new();
    let p = DomainParticipant::new(fast_config("qos"), hub.transport()).expect("participant");
    (hub, p)
}

// ============================================================================
// Sequence numbers and history
// ============================================================================

#[test]
fn test_sequence_numbers_strictly_increase() {
    let (_hub, p) = participant();
    let writer = p
        .create_writer::<Reading>("seq", DataWriterQos::default().keep_last(5))
        .expect("writer");

    let mut last = writer.last_sequence_number();
    for i in 0..20 {
        writer.write(&Reading::new(i % 3, i)).expect("write");
        let seq = writer.last_sequence_number();
        assert!(seq > last, "seq {} not above {}", seq, last);
        last = seq;
    }

    // Instance state changes consume sequence numbers too.
    writer.dispose(&Reading::new(0, 0)).expect("dispose");
    assert!(writer.last_sequence_number() > last);
}

#[test]
fn test_keep_last_evicts_oldest_per_instance() {
    let (_hub, p) = participant();
    let writer = p
        .create_writer::<Reading>("depth", DataWriterQos::default().keep_last(3))
        .expect("writer");

    for i in 0..4 {
        writer.write(&Reading::new(7, i)).expect("write");
    }
    assert_eq!(writer.history_len(), 3);
    let latest = writer
        .get_key_value(Reading::new(7, 0).get_key())
        .expect("key value");
    assert_eq!(latest.index, 3);

    // Another instance has its own depth.
    writer.write(&Reading::new(8, 0)).expect("write");
    assert_eq!(writer.history_len(), 4);
}

#[test]
fn test_reader_keep_last_keeps_most_recent() {
    let (_hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Blob>(
            "reader_depth",
            DataWriterQos::default().keep_all().resource_limits(ResourceLimits::unlimited()),
        )
        .expect("writer");
    let reader = b
        .create_reader::<Blob>("reader_depth", DataReaderQos::default().reliable().keep_last(2))
        .expect("reader");
    assert!(wait_until(Duration::from_secs(5), || {
        !writer.matched_subscriptions().is_empty() && !reader.matched_publications().is_empty()
    }));

    for i in 0..5 {
        writer.write(&Blob::new(i)).expect("write");
    }
    writer
        .wait_for_acknowledgments(Duration::from_secs(5))
        .expect("acked");

    let indices: Vec<u32> = reader
        .take()
        .into_iter()
        .filter_map(|s| s.data.map(|d| d.index))
        .collect();
    assert_eq!(indices, vec![3, 4]);
}

// ============================================================================
// Deadline
// ============================================================================

#[test]
fn test_deadline_missed_once_per_period() {
    let (_hub, p) = participant();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_cb = Arc::clone(&calls);
    let listener = WriterListener::new().on_offered_deadline_missed(move |_, status| {
        assert!(status.total_count >= 1);
        calls_cb.fetch_add(1, Ordering::SeqCst);
    });
    let writer = p
        .create_writer_with_listener::<Reading>(
            "deadline",
            DataWriterQos::default().deadline(Duration::from_millis(100)),
            Some(listener),
        )
        .expect("writer");

    writer.write(&Reading::new(1, 0)).expect("write");
    thread::sleep(Duration::from_millis(350));

    let status = writer.get_offered_deadline_missed_status();
    assert!(
        (2..=4).contains(&status.total_count),
        "missed {} times",
        status.total_count
    );
    assert_eq!(calls.load(Ordering::SeqCst), status.total_count);
    // The listener consumed every change.
    assert_eq!(status.total_count_change, 0);
    assert_eq!(status.last_instance_handle, Reading::new(1, 0).get_key());
}

#[test]
fn test_deadline_met_by_regular_writes() {
    let (_hub, p) = participant();
    let writer = p
        .create_writer::<Reading>(
            "deadline_met",
            DataWriterQos::default().deadline(Duration::from_millis(150)),
        )
        .expect("writer");

    for i in 0..8 {
        writer.write(&Reading::new(1, i)).expect("write");
        thread::sleep(Duration::from_millis(30));
    }
    assert_eq!(writer.get_offered_deadline_missed_status().total_count, 0);
}

#[test]
fn test_deadline_disabled_by_set_qos() {
    let (_hub, p) = participant();
    let qos = DataWriterQos::default().deadline(Duration::from_millis(50));
    let writer = p.create_writer::<Reading>("deadline_off", qos.clone()).expect("writer");
    writer.write(&Reading::new(1, 0)).expect("write");

    writer
        .set_qos(qos.deadline(rtps_core::dds::qos::INFINITE))
        .expect("deadline is mutable");
    let before = writer.get_offered_deadline_missed_status().total_count;
    thread::sleep(Duration::from_millis(200));
    assert_eq!(writer.get_offered_deadline_missed_status().total_count, before);
}

// ============================================================================
// Lifespan
// ============================================================================

#[test]
fn test_lifespan_purges_history() {
    let (_hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Blob>(
            "lifespan",
            DataWriterQos::default()
                .keep_all()
                .resource_limits(ResourceLimits::unlimited())
                .lifespan(Duration::from_millis(200)),
        )
        .expect("writer");

    for i in 0..3 {
        writer.write(&Blob::new(i)).expect("write");
    }
    assert_eq!(writer.history_len(), 3);
    assert!(
        wait_until(Duration::from_secs(2), || writer.history_len() == 0),
        "expired samples still held"
    );

    // A late joiner asking for history gets nothing.
    let reader = b
        .create_reader::<Blob>("lifespan", DataReaderQos::default().reliable().transient_local())
        .expect("reader");
    assert!(wait_until(Duration::from_secs(5), || {
        !writer.matched_subscriptions().is_empty()
    }));
    assert!(!reader.wait_for_data(Duration::from_millis(300)));

    // Fresh samples still flow.
    writer.write(&Blob::new(10)).expect("write");
    assert!(reader.wait_for_data(Duration::from_secs(2)));
    let sample = reader.take_next_sample().expect("sample");
    assert_eq!(sample.data.map(|d| d.index), Some(10));
}

// ============================================================================
// Consistency and mutability
// ============================================================================

#[test]
fn test_best_effort_exclusive_is_inconsistent() {
    let (_hub, p) = participant();
    let qos = DataWriterQos::default().best_effort().exclusive_ownership(5);
    match p.create_writer::<Reading>("exclusive", qos) {
        Err(Error::InconsistentPolicy(_)) => {}
        other => panic!("expected InconsistentPolicy, got {:?}", other.map(|_| ())),
    }

    let writer = p
        .create_writer::<Reading>("exclusive", DataWriterQos::default())
        .expect("writer");
    let bad = writer.get_qos().best_effort().exclusive_ownership(5);
    assert!(matches!(
        writer.set_qos(bad),
        Err(Error::InconsistentPolicy(_))
    ));

    let reader_qos = DataReaderQos::default().best_effort().exclusive_ownership();
    assert!(matches!(
        p.create_reader::<Reading>("exclusive", reader_qos),
        Err(Error::InconsistentPolicy(_))
    ));
}

#[test]
fn test_reliability_kind_is_immutable() {
    let (_hub, p) = participant();
    let writer = p
        .create_writer::<Reading>("immutable", DataWriterQos::default().reliable())
        .expect("writer");

    let before = writer.get_qos();
    let changed = before.clone().best_effort();
    match writer.set_qos(changed) {
        Err(Error::ImmutablePolicy(msg)) => assert!(msg.contains("reliability")),
        other => panic!("expected ImmutablePolicy, got {:?}", other),
    }
    assert_eq!(writer.get_qos(), before);
    assert_eq!(writer.get_qos().reliability, Reliability::Reliable);
}

#[test]
fn test_mutable_policies_apply() {
    let (_hub, p) = participant();
    let writer = p
        .create_writer::<Reading>("mutable", DataWriterQos::default())
        .expect("writer");
    let qos = writer
        .get_qos()
        .heartbeat_period(Duration::from_millis(40))
        .lifespan(Duration::from_secs(10));
    writer.set_qos(qos.clone()).expect("mutable policies");
    assert_eq!(writer.get_qos(), qos);
}

#[test]
fn test_empty_topic_rejected() {
    let (_hub, p) = participant();
    assert!(matches!(
        p.create_writer::<Reading>("", DataWriterQos::default()),
        Err(Error::BadParameter(_))
    ));
}

// ============================================================================
// Instance lifecycle
// ============================================================================

#[test]
fn test_instance_lifecycle_reaches_reader() {
    let (_hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Reading>("lifecycle", DataWriterQos::default().keep_last(4))
        .expect("writer");
    let reader = b
        .create_reader::<Reading>("lifecycle", DataReaderQos::default().reliable().keep_last(4))
        .expect("reader");
    assert!(wait_until(Duration::from_secs(5), || {
        !writer.matched_subscriptions().is_empty() && !reader.matched_publications().is_empty()
    }));

    let sample = Reading::new(42, 1);
    let handle = writer.register_instance(&sample).expect("register");
    assert_eq!(handle, sample.get_key());
    assert_eq!(writer.lookup_instance(&sample), handle);
    writer.write_w_handle(&sample, handle).expect("write");
    writer.dispose(&sample).expect("dispose");
    writer
        .unregister_instance(&sample, false)
        .expect("unregister");
    writer
        .wait_for_acknowledgments(Duration::from_secs(5))
        .expect("acked");

    let kinds: Vec<ChangeKind> = reader.take().into_iter().map(|s| s.info.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ChangeKind::Alive,
            ChangeKind::NotAliveDisposed,
            // autodispose_unregistered_instances defaults to true
            ChangeKind::NotAliveDisposedUnregistered,
        ]
    );
}

#[test]
fn test_unregister_without_autodispose() {
    let (_hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Reading>(
            "unregister_only",
            DataWriterQos::default()
                .keep_last(4)
                .autodispose_unregistered_instances(false),
        )
        .expect("writer");
    let reader = b
        .create_reader::<Reading>(
            "unregister_only",
            DataReaderQos::default().reliable().keep_last(4),
        )
        .expect("reader");
    assert!(wait_until(Duration::from_secs(5), || {
        !writer.matched_subscriptions().is_empty() && !reader.matched_publications().is_empty()
    }));

    let sample = Reading::new(7, 1);
    writer.write(&sample).expect("write");
    writer
        .unregister_instance(&sample, false)
        .expect("unregister");
    writer
        .wait_for_acknowledgments(Duration::from_secs(5))
        .expect("acked");

    let kinds: Vec<ChangeKind> = reader.take().into_iter().map(|s| s.info.kind).collect();
    assert_eq!(kinds, vec![ChangeKind::Alive, ChangeKind::NotAliveUnregistered]);
    assert_eq!(writer.lookup_instance(&sample), InstanceHandle::NIL);
}

#[test]
fn test_instance_errors() {
    let (_hub, p) = participant();
    let writer = p
        .create_writer::<Reading>("instance_errors", DataWriterQos::default())
        .expect("writer");

    let unknown = Reading::new(99, 0);
    assert!(matches!(
        writer.unregister_instance(&unknown, false),
        Err(Error::PreconditionNotMet(_))
    ));
    assert!(matches!(writer.dispose(&unknown), Err(Error::PreconditionNotMet(_))));
    assert_eq!(writer.lookup_instance(&unknown), InstanceHandle::NIL);
    assert!(matches!(
        writer.write_w_handle(&unknown, InstanceHandle::NIL),
        Err(Error::BadParameter(_))
    ));
    assert!(matches!(
        writer.write_w_handle(&unknown, Reading::new(1, 0).get_key()),
        Err(Error::PreconditionNotMet(_))
    ));

    let blobs = p
        .create_writer::<Blob>("unkeyed", DataWriterQos::default())
        .expect("writer");
    assert!(matches!(
        blobs.register_instance(&Blob::new(0)),
        Err(Error::PreconditionNotMet(_))
    ));
}

#[test]
fn test_closed_writer_refuses_writes() {
    let (_hub, p) = participant();
    let writer = p
        .create_writer::<Reading>("closed", DataWriterQos::default())
        .expect("writer");
    writer.close();
    assert!(matches!(
        writer.write(&Reading::new(1, 1)),
        Err(Error::AlreadyDeleted)
    ));

    p.close();
    assert!(matches!(
        p.create_writer::<Reading>("closed", DataWriterQos::default()),
        Err(Error::AlreadyDeleted)
    ));
}

#[test]
fn test_writer_waits_for_enable() {
    let hub = LoopbackHub::new();
    let a = DomainParticipant::new(
        fast_config("manual_enable").with_autoenable_created_entities(false),
        hub.transport(),
    )
    .expect("participant a");
    let b = DomainParticipant::new(fast_config("auto_enable"), hub.transport())
        .expect("participant b");
    assert!(wait_until(Duration::from_secs(5), || {
        knows(&a, b.guid().prefix) && knows(&b, a.guid().prefix)
    }));

    let writer = a
        .create_writer::<Reading>("enable", DataWriterQos::default().keep_last(4))
        .expect("writer");
    let reader = b
        .create_reader::<Reading>("enable", DataReaderQos::default().reliable().keep_last(4))
        .expect("reader");
    assert!(!writer.is_enabled());

    let sample = Reading::new(3, 1);
    assert!(matches!(writer.write(&sample), Err(Error::NotEnabled)));
    assert!(matches!(writer.register_instance(&sample), Err(Error::NotEnabled)));
    assert!(matches!(writer.dispose(&sample), Err(Error::NotEnabled)));
    assert!(matches!(
        writer.unregister_instance(&sample, false),
        Err(Error::NotEnabled)
    ));
    thread::sleep(Duration::from_millis(300));
    assert!(reader.matched_publications().is_empty());

    writer.enable().expect("enable");
    writer.enable().expect("enable twice");
    assert!(writer.is_enabled());
    assert!(wait_until(Duration::from_secs(5), || {
        reader.matched_publications() == vec![writer.guid()]
    }));
    writer.write(&sample).expect("write");
    writer
        .wait_for_acknowledgments(Duration::from_secs(5))
        .expect("acked");
    let received: Vec<Reading> = reader.take().into_iter().filter_map(|s| s.data).collect();
    assert_eq!(received, vec![sample]);
}
