// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Simple discovery: participant announcements, endpoint matching,
//! incompatible QoS, participant removal and writer liveliness.

mod common;

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{discovered_pair, fast_config, knows, wait_until, Blob, Reading};
use parking_lot::Mutex;
use rtps_core::dds::{ParticipantDiscoveryStatus, ParticipantListener};
use rtps_core::{
    DataReaderQos, DataWriterQos, DomainParticipant, GuidPrefix, Liveliness, LivelinessKind,
    LoopbackHub, Partition, QosPolicyId, ReaderListener, WriterListener,
};

#[test]
fn test_participants_discover_each_other() {
    let hub = LoopbackHub::new();
    let events: Arc<Mutex<Vec<(ParticipantDiscoveryStatus, GuidPrefix)>>> =
        Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);

    let a = DomainParticipant::new(fast_config("a"), hub.transport()).expect("a");
    a.set_listener(Some(ParticipantListener::new().on_participant_discovery(
        move |info| sink.lock().push((info.status, info.data.guid.prefix)),
    )));
    let b = DomainParticipant::new(fast_config("b").with_name("named-b"), hub.transport())
        .expect("b");

    assert!(wait_until(Duration::from_secs(5), || knows(&a, b.guid().prefix)));
    assert!(wait_until(Duration::from_secs(5), || knows(&b, a.guid().prefix)));

    let remote = a
        .discovered_participants()
        .into_iter()
        .find(|p| p.guid.prefix == b.guid().prefix)
        .expect("b known");
    assert_eq!(remote.name, "named-b");
    assert_eq!(remote.domain_id, 0);
    assert!(!remote.metatraffic_unicast_locators.is_empty());
    assert!(events
        .lock()
        .contains(&(ParticipantDiscoveryStatus::Discovered, b.guid().prefix)));

    b.close();
    assert!(wait_until(Duration::from_secs(5), || {
        events
            .lock()
            .contains(&(ParticipantDiscoveryStatus::Removed, b.guid().prefix))
    }));
    assert!(!knows(&a, b.guid().prefix));
}

#[test]
fn test_other_domain_is_ignored() {
    let hub = LoopbackHub::new();
    let a = DomainParticipant::new(fast_config("a"), hub.transport()).expect("a");
    let mut config = fast_config("b");
    config.domain_id = 1;
    let b = DomainParticipant::new(config, hub.transport()).expect("b");
    let c = DomainParticipant::new(fast_config("c"), hub.transport()).expect("c");

    assert!(wait_until(Duration::from_secs(5), || knows(&a, c.guid().prefix)));
    thread::sleep(Duration::from_millis(300));
    assert!(!knows(&a, b.guid().prefix));
    assert!(!knows(&b, a.guid().prefix));
}

#[test]
fn test_silent_participant_is_dropped() {
    let hub = LoopbackHub::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);

    let a = DomainParticipant::new(fast_config("a"), hub.transport()).expect("a");
    a.set_listener(Some(ParticipantListener::new().on_participant_discovery(
        move |info| sink.lock().push((info.status, info.data.guid.prefix)),
    )));
    let b_transport = hub.transport();
    let b = DomainParticipant::new(
        fast_config("b").with_lease_duration(Duration::from_millis(600)),
        b_transport.clone(),
    )
    .expect("b");
    assert!(wait_until(Duration::from_secs(5), || knows(&a, b.guid().prefix)));

    b_transport.set_online(false);
    assert!(wait_until(Duration::from_secs(5), || {
        events
            .lock()
            .contains(&(ParticipantDiscoveryStatus::Dropped, b.guid().prefix))
    }));
    assert!(!knows(&a, b.guid().prefix));

    b_transport.set_online(true);
    assert!(wait_until(Duration::from_secs(5), || knows(&a, b.guid().prefix)));
}

#[test]
fn test_match_listeners_fire_on_both_sides() {
    let (_hub, a, b) = discovered_pair();

    let writer_change = Arc::new(AtomicI32::new(0));
    let reader_change = Arc::new(AtomicI32::new(0));
    let w = Arc::clone(&writer_change);
    let r = Arc::clone(&reader_change);

    let writer = a
        .create_writer_with_listener::<Reading>(
            "scenario_b",
            DataWriterQos::default().keep_last(1),
            Some(WriterListener::new().on_publication_matched(move |_, status| {
                assert_eq!(status.current_count, 1);
                w.store(status.current_count_change, Ordering::SeqCst);
            })),
        )
        .expect("writer");
    let reader = b
        .create_reader_with_listener::<Reading>(
            "scenario_b",
            DataReaderQos::default().reliable(),
            Some(ReaderListener::new().on_subscription_matched(move |_, status| {
                assert_eq!(status.current_count, 1);
                r.store(status.current_count_change, Ordering::SeqCst);
            })),
        )
        .expect("reader");

    assert!(wait_until(Duration::from_secs(5), || {
        writer_change.load(Ordering::SeqCst) == 1 && reader_change.load(Ordering::SeqCst) == 1
    }));
    assert_eq!(writer.matched_subscriptions(), vec![reader.guid()]);
    assert_eq!(reader.matched_publications(), vec![writer.guid()]);

    // Listeners consumed the changes.
    let status = writer.get_publication_matched_status();
    assert_eq!(status.total_count, 1);
    assert_eq!(status.current_count_change, 0);
    assert_eq!(status.last_subscription_handle, Some(reader.guid()));
}

#[test]
fn test_unmatch_on_endpoint_and_participant_removal() {
    let (_hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Reading>("unmatch", DataWriterQos::default())
        .expect("writer");
    let reader = b
        .create_reader::<Reading>("unmatch", DataReaderQos::default().reliable())
        .expect("reader");
    assert!(wait_until(Duration::from_secs(5), || {
        !writer.matched_subscriptions().is_empty() && !reader.matched_publications().is_empty()
    }));

    reader.close();
    assert!(wait_until(Duration::from_secs(5), || {
        writer.matched_subscriptions().is_empty()
    }));
    let status = writer.get_publication_matched_status();
    assert_eq!(status.current_count, 0);
    assert_eq!(status.total_count, 1);

    let reader = b
        .create_reader::<Reading>("unmatch", DataReaderQos::default().reliable())
        .expect("reader");
    assert!(wait_until(Duration::from_secs(5), || {
        writer.matched_subscriptions() == vec![reader.guid()]
    }));

    a.close();
    assert!(wait_until(Duration::from_secs(5), || {
        reader.matched_publications().is_empty()
    }));
    let status = reader.get_subscription_matched_status();
    assert_eq!(status.current_count, 0);
}

#[test]
fn test_incompatible_qos_is_reported() {
    let (_hub, a, b) = discovered_pair();
    let offered = Arc::new(AtomicU32::new(0));
    let offered_cb = Arc::clone(&offered);

    let writer = a
        .create_writer_with_listener::<Reading>(
            "incompatible",
            DataWriterQos::default().best_effort().volatile(),
            Some(
                WriterListener::new().on_offered_incompatible_qos(move |_, status| {
                    offered_cb.store(status.last_policy_id, Ordering::SeqCst);
                }),
            ),
        )
        .expect("writer");
    let reader = b
        .create_reader::<Reading>("incompatible", DataReaderQos::default().reliable())
        .expect("reader");

    assert!(wait_until(Duration::from_secs(5), || {
        offered.load(Ordering::SeqCst) == QosPolicyId::Reliability.id()
    }));
    assert!(writer.matched_subscriptions().is_empty());
    assert!(reader.matched_publications().is_empty());
    assert!(writer
        .get_offered_incompatible_qos_status()
        .count_for(QosPolicyId::Reliability)
        >= 1);
}

#[test]
fn test_incompatible_policies_counted_per_policy() {
    let (_hub, a, b) = discovered_pair();
    let reader = b
        .create_reader::<Reading>(
            "per_policy",
            DataReaderQos::default().reliable().transient_local(),
        )
        .expect("reader");
    let _writer = a
        .create_writer::<Reading>("per_policy", DataWriterQos::default().best_effort().volatile())
        .expect("writer");

    let mut status = reader.get_requested_incompatible_qos_status();
    assert!(wait_until(Duration::from_secs(5), || {
        let next = reader.get_requested_incompatible_qos_status();
        if next.total_count > 0 {
            status = next;
            true
        } else {
            false
        }
    }));
    assert!(status.count_for(QosPolicyId::Reliability) >= 1);
    assert!(status.count_for(QosPolicyId::Durability) >= 1);
    assert_eq!(status.count_for(QosPolicyId::Ownership), 0);
}

#[test]
fn test_topic_type_and_partition_filter_matching() {
    let (_hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Reading>(
            "filtered",
            DataWriterQos::default().partition(Partition::new(["left"])),
        )
        .expect("writer");
    let other_partition = b
        .create_reader::<Reading>(
            "filtered",
            DataReaderQos::default().partition(Partition::new(["right"])),
        )
        .expect("reader");
    let other_type = b
        .create_reader::<Blob>(
            "filtered",
            DataReaderQos::default().partition(Partition::new(["left"])),
        )
        .expect("reader");
    let matching = b
        .create_reader::<Reading>(
            "filtered",
            DataReaderQos::default().partition(Partition::new(["left", "right"])),
        )
        .expect("reader");

    assert!(wait_until(Duration::from_secs(5), || {
        writer.matched_subscriptions() == vec![matching.guid()]
    }));
    thread::sleep(Duration::from_millis(200));
    assert_eq!(writer.matched_subscriptions(), vec![matching.guid()]);
    assert!(other_partition.matched_publications().is_empty());
    assert!(other_type.matched_publications().is_empty());
    // A type mismatch is not a QoS incompatibility.
    assert_eq!(other_type.get_requested_incompatible_qos_status().total_count, 0);
}

#[test]
fn test_wildcard_partition_delivers() {
    let (_hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Reading>(
            "zones",
            DataWriterQos::default().partition(Partition::new(["zone[0-3]"])),
        )
        .expect("writer");
    let reader = b
        .create_reader::<Reading>(
            "zones",
            DataReaderQos::default()
                .reliable()
                .partition(Partition::new(["zone2"])),
        )
        .expect("reader");
    let outside = b
        .create_reader::<Reading>(
            "zones",
            DataReaderQos::default().partition(Partition::new(["zone9"])),
        )
        .expect("reader");

    assert!(wait_until(Duration::from_secs(5), || {
        writer.matched_subscriptions() == vec![reader.guid()]
    }));
    writer.write(&Reading::new(2, 1)).expect("write");
    assert!(wait_until(Duration::from_secs(5), || {
        reader.take().iter().any(|s| s.data.as_ref().map(|r| r.index) == Some(1))
    }));
    assert!(outside.matched_publications().is_empty());
}

// ============================================================================
// Liveliness
// ============================================================================

#[test]
fn test_manual_by_topic_liveliness_lost_and_recovered() {
    let (_hub, a, b) = discovered_pair();
    let lease = Duration::from_millis(300);
    let lost = Arc::new(AtomicU32::new(0));
    let lost_cb = Arc::clone(&lost);

    let writer = a
        .create_writer_with_listener::<Reading>(
            "manual",
            DataWriterQos::default().liveliness(Liveliness::new(LivelinessKind::ManualByTopic, lease)),
            Some(WriterListener::new().on_liveliness_lost(move |_, status| {
                lost_cb.store(status.total_count, Ordering::SeqCst);
            })),
        )
        .expect("writer");
    let reader = b
        .create_reader::<Reading>("manual", DataReaderQos::default().reliable())
        .expect("reader");
    assert!(wait_until(Duration::from_secs(5), || {
        !writer.matched_subscriptions().is_empty() && !reader.matched_publications().is_empty()
    }));

    assert!(wait_until(Duration::from_secs(3), || {
        reader.get_liveliness_changed_status().not_alive_count == 1
    }));
    assert!(wait_until(Duration::from_secs(3), || lost.load(Ordering::SeqCst) >= 1));

    writer.assert_liveliness().expect("assert");
    assert!(wait_until(Duration::from_secs(3), || {
        let status = reader.get_liveliness_changed_status();
        status.alive_count == 1 && status.not_alive_count == 0
    }));

    // Writing also asserts.
    assert!(wait_until(Duration::from_secs(3), || {
        reader.get_liveliness_changed_status().not_alive_count == 1
    }));
    writer.write(&Reading::new(1, 1)).expect("write");
    assert!(wait_until(Duration::from_secs(3), || {
        reader.get_liveliness_changed_status().alive_count == 1
    }));
}

#[test]
fn test_automatic_liveliness_stays_alive() {
    let (_hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Reading>(
            "automatic",
            DataWriterQos::default().liveliness(Liveliness::new(
                LivelinessKind::Automatic,
                Duration::from_millis(400),
            )),
        )
        .expect("writer");
    let reader = b
        .create_reader::<Reading>("automatic", DataReaderQos::default().reliable())
        .expect("reader");
    assert!(wait_until(Duration::from_secs(5), || {
        !writer.matched_subscriptions().is_empty() && !reader.matched_publications().is_empty()
    }));

    thread::sleep(Duration::from_millis(1200));
    let status = reader.get_liveliness_changed_status();
    assert_eq!(status.alive_count, 1);
    assert_eq!(status.not_alive_count, 0);
    assert_eq!(writer.get_liveliness_lost_status().total_count, 0);
}

#[test]
fn test_manual_by_participant_asserted_by_participant() {
    let (_hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Reading>(
            "by_participant",
            DataWriterQos::default().liveliness(Liveliness::new(
                LivelinessKind::ManualByParticipant,
                Duration::from_millis(300),
            )),
        )
        .expect("writer");
    let reader = b
        .create_reader::<Reading>("by_participant", DataReaderQos::default().reliable())
        .expect("reader");
    assert!(wait_until(Duration::from_secs(5), || {
        !writer.matched_subscriptions().is_empty() && !reader.matched_publications().is_empty()
    }));

    assert!(wait_until(Duration::from_secs(3), || {
        reader.get_liveliness_changed_status().not_alive_count == 1
    }));
    a.assert_liveliness().expect("assert");
    assert!(wait_until(Duration::from_secs(3), || {
        reader.get_liveliness_changed_status().alive_count == 1
    }));
}
