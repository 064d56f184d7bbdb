// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reliable delivery end to end over the loopback hub: ordering, loss
//! repair, fragmentation and late joiners.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{discovered_pair, fast_config, wait_until, Blob};
use rtps_core::protocol::{decode_message, Submessage};
use rtps_core::{
    DataReader, DataReaderQos, DataWriter, DataWriterQos, DomainParticipant, LinkConditions,
    Error, LoopbackHub, ResourceLimits,
};

fn keep_all_writer() -> DataWriterQos {
    DataWriterQos::default()
        .reliable()
        .keep_all()
        .resource_limits(ResourceLimits::unlimited())
}

fn keep_all_reader() -> DataReaderQos {
    DataReaderQos::default()
        .reliable()
        .keep_all()
        .resource_limits(ResourceLimits::unlimited())
}

fn wait_matched(writer: &DataWriter<Blob>, reader: &DataReader<Blob>) {
    assert!(
        wait_until(Duration::from_secs(5), || {
            writer.matched_subscriptions().contains(&reader.guid())
                && reader.matched_publications().contains(&writer.guid())
        }),
        "endpoints did not match"
    );
}

/// Take until `count` samples arrived or `timeout` elapsed.
fn collect(reader: &DataReader<Blob>, count: usize, timeout: Duration) -> Vec<Blob> {
    let mut received = Vec::new();
    wait_until(timeout, || {
        received.extend(reader.take().into_iter().filter_map(|s| s.data));
        received.len() >= count
    });
    received
}

fn indices(samples: &[Blob]) -> Vec<u32> {
    samples.iter().map(|s| s.index).collect()
}

#[test]
fn test_keep_last_ten_delivers_all_in_order() {
    let (_hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Blob>("scenario_a", DataWriterQos::default().reliable().keep_last(10))
        .expect("writer");
    let reader = b
        .create_reader::<Blob>("scenario_a", keep_all_reader())
        .expect("reader");
    wait_matched(&writer, &reader);

    for i in 0..20 {
        writer.write(&Blob::new(i)).expect("write");
        assert!(writer.history_len() <= 10);
    }

    let received = collect(&reader, 20, Duration::from_secs(5));
    assert_eq!(indices(&received), (0..20).collect::<Vec<_>>());
    writer
        .wait_for_acknowledgments(Duration::from_secs(5))
        .expect("acked");
    assert_eq!(writer.history_len(), 10);
}

#[test]
fn test_random_loss_is_repaired_in_order() {
    let (hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Blob>(
            "lossy",
            keep_all_writer().heartbeat_period(Duration::from_millis(30)),
        )
        .expect("writer");
    let reader = b.create_reader::<Blob>("lossy", keep_all_reader()).expect("reader");
    wait_matched(&writer, &reader);

    hub.set_conditions(LinkConditions::lossy(0.25));
    for i in 0..60 {
        writer.write(&Blob::new(i)).expect("write");
    }
    let received = collect(&reader, 60, Duration::from_secs(15));
    hub.set_conditions(LinkConditions::default());

    assert_eq!(indices(&received), (0..60).collect::<Vec<_>>());
    assert!(hub.stats().messages_dropped > 0);
    writer
        .wait_for_acknowledgments(Duration::from_secs(5))
        .expect("acked");
}

fn carries_user_data(bytes: &[u8], seq: u64) -> bool {
    decode_message(bytes)
        .map(|msg| {
            msg.submessages.iter().any(|sub| match sub {
                Submessage::Data(data) => !data.writer_id.is_builtin() && data.seq == seq,
                _ => false,
            })
        })
        .unwrap_or(false)
}

#[test]
fn test_dropped_sample_is_retransmitted() {
    let (hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Blob>(
            "repair",
            keep_all_writer().heartbeat_period(Duration::from_millis(30)),
        )
        .expect("writer");
    let reader = b.create_reader::<Blob>("repair", keep_all_reader()).expect("reader");
    wait_matched(&writer, &reader);

    let dropped = Arc::new(AtomicBool::new(false));
    let dropped_flag = Arc::clone(&dropped);
    hub.set_drop_filter(move |_, bytes| {
        carries_user_data(bytes, 3) && !dropped_flag.swap(true, Ordering::SeqCst)
    });

    for i in 0..6 {
        writer.write(&Blob::new(i)).expect("write");
    }
    let received = collect(&reader, 6, Duration::from_secs(5));
    hub.clear_drop_filter();

    assert!(dropped.load(Ordering::SeqCst), "filter never saw seq 3");
    assert_eq!(indices(&received), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn test_wait_for_acknowledgments_times_out_without_acks() {
    let (hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Blob>(
            "unacked",
            keep_all_writer().heartbeat_period(Duration::from_millis(30)),
        )
        .expect("writer");
    let reader = b.create_reader::<Blob>("unacked", keep_all_reader()).expect("reader");
    wait_matched(&writer, &reader);

    // The reader never sees the sample, so it can never acknowledge it
    hub.set_drop_filter(|_, bytes| {
        decode_message(bytes)
            .map(|msg| {
                msg.submessages.iter().any(|sub| {
                    matches!(sub, Submessage::Data(data) if !data.writer_id.is_builtin())
                })
            })
            .unwrap_or(false)
    });
    writer.write(&Blob::new(0)).expect("write");
    assert!(matches!(
        writer.wait_for_acknowledgments(Duration::from_millis(300)),
        Err(Error::Timeout(_))
    ));
    assert_eq!(writer.history_len(), 1);

    hub.clear_drop_filter();
    writer
        .wait_for_acknowledgments(Duration::from_secs(5))
        .expect("acked once the link heals");
    assert_eq!(indices(&collect(&reader, 1, Duration::from_secs(5))), vec![0]);
}

#[test]
fn test_large_samples_are_fragmented() {
    let hub = LoopbackHub::with_max_message_size(4096);
    let a = DomainParticipant::new(fast_config("frag_a"), hub.transport()).expect("a");
    let b = DomainParticipant::new(fast_config("frag_b"), hub.transport()).expect("b");
    let writer = a
        .create_writer::<Blob>("fragments", keep_all_writer())
        .expect("writer");
    let reader = b
        .create_reader::<Blob>("fragments", keep_all_reader())
        .expect("reader");
    wait_matched(&writer, &reader);

    let sent: Vec<Blob> = (0..3).map(|i| Blob::sized(i, 20_000 + i as usize)).collect();
    for blob in &sent {
        writer.write(blob).expect("write");
    }
    let received = collect(&reader, 3, Duration::from_secs(5));
    assert_eq!(received, sent);
}

#[test]
fn test_fragments_survive_loss() {
    let hub = LoopbackHub::with_max_message_size(4096);
    let a = DomainParticipant::new(fast_config("frag_a"), hub.transport()).expect("a");
    let b = DomainParticipant::new(fast_config("frag_b"), hub.transport()).expect("b");
    let writer = a
        .create_writer::<Blob>(
            "fragments_lossy",
            keep_all_writer().heartbeat_period(Duration::from_millis(30)),
        )
        .expect("writer");
    let reader = b
        .create_reader::<Blob>("fragments_lossy", keep_all_reader())
        .expect("reader");
    wait_matched(&writer, &reader);

    hub.set_conditions(LinkConditions::lossy(0.1));
    let sent = Blob::sized(7, 40_000);
    writer.write(&sent).expect("write");
    let received = collect(&reader, 1, Duration::from_secs(15));
    hub.set_conditions(LinkConditions::default());
    assert_eq!(received, vec![sent]);
}

#[test]
fn test_transient_local_late_joiner_gets_history() {
    let (_hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Blob>(
            "late_joiner",
            DataWriterQos::default().transient_local().keep_last(5),
        )
        .expect("writer");
    for i in 0..8 {
        writer.write(&Blob::new(i)).expect("write");
    }

    let late = b
        .create_reader::<Blob>("late_joiner", keep_all_reader().transient_local())
        .expect("reader");
    let volatile = b
        .create_reader::<Blob>("late_joiner", keep_all_reader())
        .expect("reader");
    wait_matched(&writer, &late);
    wait_matched(&writer, &volatile);

    let received = collect(&late, 5, Duration::from_secs(5));
    assert_eq!(indices(&received), vec![3, 4, 5, 6, 7]);
    assert!(!volatile.wait_for_data(Duration::from_millis(300)));

    writer.write(&Blob::new(8)).expect("write");
    let received = collect(&volatile, 1, Duration::from_secs(5));
    assert_eq!(indices(&received), vec![8]);
}

#[test]
fn test_best_effort_delivery() {
    let (_hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Blob>("best_effort", DataWriterQos::default().best_effort().volatile())
        .expect("writer");
    let reader = b
        .create_reader::<Blob>("best_effort", DataReaderQos::default().keep_last(50))
        .expect("reader");
    wait_matched(&writer, &reader);

    for i in 0..10 {
        writer.write(&Blob::new(i)).expect("write");
    }
    let received = collect(&reader, 10, Duration::from_secs(3));
    assert_eq!(indices(&received), (0..10).collect::<Vec<_>>());
}

#[test]
fn test_read_keeps_and_take_removes() {
    let (_hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Blob>("read_take", keep_all_writer())
        .expect("writer");
    let reader = b
        .create_reader::<Blob>("read_take", keep_all_reader())
        .expect("reader");
    wait_matched(&writer, &reader);

    writer.write(&Blob::new(1)).expect("write");
    writer.write(&Blob::new(2)).expect("write");
    writer
        .wait_for_acknowledgments(Duration::from_secs(5))
        .expect("acked");

    let read = reader.read();
    assert_eq!(read.len(), 2);
    assert!(read.iter().all(|s| s.info.valid_data()));
    assert_eq!(read[0].info.publication_handle, writer.guid());
    assert!(read[0].info.sequence_number < read[1].info.sequence_number);
    assert_eq!(reader.available(), 2);

    let first = reader.take_next_sample().expect("sample");
    assert_eq!(first.data.map(|d| d.index), Some(1));
    assert_eq!(reader.take().len(), 1);
    assert_eq!(reader.available(), 0);
    assert!(reader.take_next_sample().is_none());
}

#[test]
fn test_reader_resource_limits_reject_overflow() {
    let (_hub, a, b) = discovered_pair();
    let writer = a
        .create_writer::<Blob>("limits", keep_all_writer())
        .expect("writer");
    let limits = ResourceLimits {
        max_samples: 3,
        max_instances: 1,
        max_samples_per_instance: 3,
    };
    let reader = b
        .create_reader::<Blob>(
            "limits",
            DataReaderQos::default().reliable().keep_all().resource_limits(limits),
        )
        .expect("reader");
    wait_matched(&writer, &reader);

    for i in 0..5 {
        writer.write(&Blob::new(i)).expect("write");
    }
    writer
        .wait_for_acknowledgments(Duration::from_secs(5))
        .expect("acked");

    assert_eq!(reader.available(), 3);
    assert_eq!(reader.rejected_count(), 2);
    let kept: Vec<Blob> = reader.take().into_iter().filter_map(|s| s.data).collect();
    assert_eq!(indices(&kept), vec![0, 1, 2]);
}
