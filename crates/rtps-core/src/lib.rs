// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # rtps-core - DDS/RTPS protocol core
//!
//! Participants discover each other over SPDP (simple multicast or through
//! a discovery server), exchange endpoint descriptions over SEDP, match
//! compatible writers and readers, and move samples between them with
//! best-effort or reliable (HEARTBEAT/ACKNACK/GAP) delivery.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rtps_core::{
//!     DataReaderQos, DataWriterQos, DomainParticipant, LoopbackHub, ParticipantConfig,
//!     Result, TypeSupport,
//! };
//!
//! struct Temperature(f64);
//!
//! impl TypeSupport for Temperature {
//!     fn type_name() -> &'static str {
//!         "Temperature"
//!     }
//!     fn serialized_size(&self) -> usize {
//!         8
//!     }
//!     fn serialize(&self, buf: &mut Vec<u8>) -> Result<()> {
//!         buf.extend_from_slice(&self.0.to_le_bytes());
//!         Ok(())
//!     }
//!     fn deserialize(buf: &[u8]) -> Result<Self> {
//!         let bytes = buf.get(..8).ok_or(rtps_core::Error::SerializationError)?;
//!         let mut raw = [0u8; 8];
//!         raw.copy_from_slice(bytes);
//!         Ok(Self(f64::from_le_bytes(raw)))
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let hub = LoopbackHub::new();
//!     let a = DomainParticipant::new(ParticipantConfig::new(0), hub.transport())?;
//!     let b = DomainParticipant::new(ParticipantConfig::new(0), hub.transport())?;
//!
//!     let writer = a.create_writer::<Temperature>("sensors/temperature", DataWriterQos::default().reliable())?;
//!     let reader = b.create_reader::<Temperature>("sensors/temperature", DataReaderQos::default().reliable())?;
//!
//!     writer.write(&Temperature(21.5))?;
//!     if reader.wait_for_data(std::time::Duration::from_secs(1)) {
//!         for sample in reader.take() {
//!             println!("{:?}", sample.data.map(|t| t.0));
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Layers
//!
//! ```text
//! +---------------------------------------------------------------+
//! |  dds          DomainParticipant, DataWriter, DataReader, QoS   |
//! +---------------------------------------------------------------+
//! |  discovery    PDP (simple / client / server), EDP, WLP         |
//! +---------------------------------------------------------------+
//! |  reliability  History, RtpsWriter, RtpsReader, fragments       |
//! +---------------------------------------------------------------+
//! |  protocol     message codec     congestion  flow controllers   |
//! +---------------------------------------------------------------+
//! |  transport    Transport trait, loopback hub                    |
//! +---------------------------------------------------------------+
//! ```

/// Protocol constants, port mapping and participant configuration.
pub mod config;
/// Flow controllers and token buckets.
pub mod congestion;
/// GUIDs, locators, discovery and runtime services (timers).
pub mod core;
/// DDS entities and QoS.
pub mod dds;
/// Discovery Server client and relay.
pub mod discovery_server;
/// RTPS message model and wire codec.
pub mod protocol;
/// History cache and the reliable writer/reader state machines.
pub mod reliability;
/// Per-endpoint key material bookkeeping.
pub mod security;
/// Transport abstraction.
pub mod transport;

pub use config::{DiscoveryMode, ParticipantConfig};
pub use core::guid::{EntityId, GuidPrefix, InstanceHandle, GUID};
pub use core::locator::Locator;
pub use dds::qos::{
    DataReaderQos, DataWriterQos, DestinationOrderKind, Durability, Liveliness, LivelinessKind,
    OwnershipKind, Partition, QosPolicyId, Reliability, WriterDataLifecycle,
};
pub use dds::{
    DataReader, DataWriter, DomainParticipant, Error, ReaderListener, Result, Sample, SampleInfo,
    StatusMask, TypeSupport, WriterListener,
};
pub use discovery_server::{DiscoveryServerConfig, RemoteServer};
pub use reliability::{ChangeKind, HistoryKind, ResourceLimits, WriteParams};
pub use transport::{LinkConditions, LoopbackHub, Transport};
