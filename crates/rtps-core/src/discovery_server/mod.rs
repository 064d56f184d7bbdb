// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery Server support.
//!
//! Instead of multicast announcements, clients exchange their participant
//! and endpoint data with one or more well-known servers, which relay it to
//! every other client.
//!
//! # Use Cases
//!
//! - Cloud/Kubernetes environments without multicast
//! - Corporate networks with multicast disabled
//! - WAN deployments
//!
//! # Example
//!
//! ```no_run
//! use std::net::Ipv4Addr;
//! use rtps_core::config::{DiscoveryMode, ParticipantConfig};
//! use rtps_core::core::guid::GuidPrefix;
//! use rtps_core::core::locator::Locator;
//! use rtps_core::discovery_server::{DiscoveryServerConfig, RemoteServer};
//!
//! let server = RemoteServer::new(
//!     GuidPrefix([0x44; 12]),
//!     Locator::udpv4(Ipv4Addr::new(10, 0, 0, 1), 7410),
//! );
//! let config = ParticipantConfig::new(0)
//!     .with_discovery(DiscoveryMode::Client(DiscoveryServerConfig::new(server)));
//! # let _ = config;
//! ```

mod client;
mod config;
mod server;

pub use client::DiscoveryServerClient;
pub use config::{DiscoveryServerConfig, RemoteServer, DEFAULT_SYNC_PERIOD};
pub use server::Relay;
