// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global configuration: RTPS constants and participant attributes.
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: compile-time constants (port mapping, default
//!   periods, sizes). Nothing else in the crate hardcodes these values.
//! - **Level 2 (Dynamic)**: [`ParticipantConfig`], built with `with_*`
//!   methods and checked by [`ParticipantConfig::validate`].

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::congestion::ThroughputController;
use crate::core::locator::{ExternalLocator, Locator};
use crate::dds::{Error, Result};
use crate::discovery_server::DiscoveryServerConfig;

// =======================================================================
// RTPS v2.5 Port Mapping (OMG DDS-RTPS Sec.9.6.1.1)
// =======================================================================

/// Base port (PB).
pub const PORT_BASE: u16 = 7400;

/// Domain id gain (DG).
pub const DOMAIN_ID_GAIN: u16 = 250;

/// Participant id gain (PG).
pub const PARTICIPANT_ID_GAIN: u16 = 2;

/// Offset d0: metatraffic multicast.
pub const OFFSET_METATRAFFIC_MULTICAST: u16 = 0;
/// Offset d1: metatraffic unicast.
pub const OFFSET_METATRAFFIC_UNICAST: u16 = 10;
/// Offset d2: user multicast.
pub const OFFSET_USER_MULTICAST: u16 = 1;
/// Offset d3: user unicast.
pub const OFFSET_USER_UNICAST: u16 = 11;

/// Maximum domain ID allowed by the port mapping.
pub const MAX_DOMAIN_ID: u32 = 232;

/// Maximum participant id on one host for one domain.
pub const MAX_PARTICIPANT_ID: u32 = 119;

/// Standard RTPS multicast address (239.255.0.1).
pub const DEFAULT_MULTICAST_ADDRESS: Ipv4Addr = Ipv4Addr::new(239, 255, 0, 1);

/// SPDP multicast port: `PB + DG * domain + d0`.
pub fn spdp_multicast_port(domain_id: u32) -> u16 {
    PORT_BASE + DOMAIN_ID_GAIN * domain_id as u16 + OFFSET_METATRAFFIC_MULTICAST
}

/// Metatraffic unicast port: `PB + DG * domain + d1 + PG * participant`.
pub fn metatraffic_unicast_port(domain_id: u32, participant_id: u32) -> u16 {
    PORT_BASE
        + DOMAIN_ID_GAIN * domain_id as u16
        + OFFSET_METATRAFFIC_UNICAST
        + PARTICIPANT_ID_GAIN * participant_id as u16
}

/// User unicast port: `PB + DG * domain + d3 + PG * participant`.
pub fn user_unicast_port(domain_id: u32, participant_id: u32) -> u16 {
    PORT_BASE
        + DOMAIN_ID_GAIN * domain_id as u16
        + OFFSET_USER_UNICAST
        + PARTICIPANT_ID_GAIN * participant_id as u16
}

// =======================================================================
// Timing & Lease defaults
// =======================================================================

/// SPDP announcement period.
pub const SPDP_ANNOUNCEMENT_PERIOD: Duration = Duration::from_secs(3);

/// Participant lease duration (10x announcement period).
pub const PARTICIPANT_LEASE_DURATION: Duration = Duration::from_secs(30);

/// Frequency of the participant lease check.
pub const LEASE_CHECK_PERIOD: Duration = Duration::from_secs(1);

/// Number of announcements sent right after enable, before settling to
/// the regular period.
pub const INITIAL_ANNOUNCEMENTS: u32 = 5;

/// Period of the initial announcement burst.
pub const INITIAL_ANNOUNCEMENT_PERIOD: Duration = Duration::from_millis(100);

/// Reliable writer heartbeat period.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_millis(100);

/// Default `max_blocking_time` of the reliability policy.
pub const MAX_BLOCKING_TIME: Duration = Duration::from_millis(100);

// =======================================================================
// Sizes
// =======================================================================

/// Default maximum message size of a transport.
pub const MAX_MESSAGE_SIZE: usize = 65_500;

/// Bytes reserved for message + submessage headers when sizing fragments.
pub const MESSAGE_OVERHEAD: usize = 100;

/// Maximum pending fragmented samples per reader.
pub const FRAGMENT_BUFFER_SIZE: usize = 64;

/// Vendor id stamped into generated GUID prefixes.
pub const VENDOR_ID: [u8; 2] = [0x01, 0xAA];

// =======================================================================
// Participant configuration
// =======================================================================

/// Discovery topology of a participant.
#[derive(Debug, Clone, Default)]
pub enum DiscoveryMode {
    /// Multicast SPDP + SEDP.
    #[default]
    Simple,
    /// Discovery through one or more discovery servers.
    Client(DiscoveryServerConfig),
    /// Act as a discovery server for clients.
    Server,
}

/// Participant attributes.
#[derive(Debug, Clone)]
pub struct ParticipantConfig {
    pub domain_id: u32,
    pub participant_id: u32,
    pub name: String,
    /// Lease advertised to remote participants.
    pub lease_duration: Duration,
    /// Period of the participant announcement.
    pub announcement_period: Duration,
    /// How often expired remote leases are looked for.
    pub lease_check_period: Duration,
    pub discovery: DiscoveryMode,
    /// Extra unicast locators announcements are sent to.
    pub initial_peers: Vec<Locator>,
    /// Participant-wide send budget, `None` for unlimited.
    pub throughput_controller: Option<ThroughputController>,
    /// Addresses to announce for NAT traversal.
    pub external_locators: Vec<ExternalLocator>,
    /// Fixed GUID prefix (tests, servers with well-known identities).
    pub guid_prefix: Option<crate::core::guid::GuidPrefix>,
    /// Enable writers at creation. When off, a writer stays invisible to
    /// discovery and refuses samples until `DataWriter::enable`.
    pub autoenable_created_entities: bool,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            domain_id: 0,
            participant_id: 0,
            name: String::from("rtps-participant"),
            lease_duration: PARTICIPANT_LEASE_DURATION,
            announcement_period: SPDP_ANNOUNCEMENT_PERIOD,
            lease_check_period: LEASE_CHECK_PERIOD,
            discovery: DiscoveryMode::Simple,
            initial_peers: Vec::new(),
            throughput_controller: None,
            external_locators: Vec::new(),
            guid_prefix: None,
            autoenable_created_entities: true,
        }
    }
}

impl ParticipantConfig {
    pub fn new(domain_id: u32) -> Self {
        Self {
            domain_id,
            ..Default::default()
        }
    }

    pub fn with_participant_id(mut self, id: u32) -> Self {
        self.participant_id = id;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_lease_duration(mut self, lease: Duration) -> Self {
        self.lease_duration = lease;
        self
    }

    pub fn with_announcement_period(mut self, period: Duration) -> Self {
        self.announcement_period = period;
        self
    }

    pub fn with_lease_check_period(mut self, period: Duration) -> Self {
        self.lease_check_period = period;
        self
    }

    pub fn with_discovery(mut self, mode: DiscoveryMode) -> Self {
        self.discovery = mode;
        self
    }

    pub fn with_initial_peer(mut self, locator: Locator) -> Self {
        self.initial_peers.push(locator);
        self
    }

    pub fn with_throughput_controller(mut self, controller: ThroughputController) -> Self {
        self.throughput_controller = Some(controller);
        self
    }

    pub fn with_external_locator(mut self, locator: ExternalLocator) -> Self {
        self.external_locators.push(locator);
        self
    }

    pub fn with_guid_prefix(mut self, prefix: crate::core::guid::GuidPrefix) -> Self {
        self.guid_prefix = Some(prefix);
        self
    }

    pub fn with_autoenable_created_entities(mut self, autoenable: bool) -> Self {
        self.autoenable_created_entities = autoenable;
        self
    }

    /// Metatraffic unicast locator on the loopback interface.
    pub fn metatraffic_unicast_locator(&self) -> Locator {
        Locator::udpv4(
            Ipv4Addr::LOCALHOST,
            metatraffic_unicast_port(self.domain_id, self.participant_id),
        )
    }

    /// Default (user traffic) unicast locator on the loopback interface.
    pub fn default_unicast_locator(&self) -> Locator {
        Locator::udpv4(
            Ipv4Addr::LOCALHOST,
            user_unicast_port(self.domain_id, self.participant_id),
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.domain_id > MAX_DOMAIN_ID {
            return Err(Error::Config(format!(
                "domain_id {} out of range (0-{})",
                self.domain_id, MAX_DOMAIN_ID
            )));
        }
        if self.participant_id > MAX_PARTICIPANT_ID {
            return Err(Error::Config(format!(
                "participant_id {} out of range (0-{})",
                self.participant_id, MAX_PARTICIPANT_ID
            )));
        }
        if self.announcement_period.is_zero() || self.lease_check_period.is_zero() {
            return Err(Error::Config("periods must be non-zero".into()));
        }
        if self.lease_duration <= self.announcement_period {
            return Err(Error::Config(
                "lease_duration must exceed announcement_period".into(),
            ));
        }
        if let DiscoveryMode::Client(ds) = &self.discovery {
            ds.validate().map_err(|e| Error::Config(e.to_string()))?;
        }
        if let Some(tc) = &self.throughput_controller {
            tc.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_mapping_domain0() {
        assert_eq!(spdp_multicast_port(0), 7400);
        assert_eq!(metatraffic_unicast_port(0, 0), 7410);
        assert_eq!(user_unicast_port(0, 0), 7411);
        assert_eq!(metatraffic_unicast_port(0, 1), 7412);
    }

    #[test]
    fn test_port_mapping_domain1() {
        assert_eq!(spdp_multicast_port(1), 7650);
        assert_eq!(user_unicast_port(1, 2), 7650 + 11 + 4);
    }

    #[test]
    fn test_validate_defaults() {
        assert!(ParticipantConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        assert!(ParticipantConfig::new(233).validate().is_err());
        assert!(ParticipantConfig::new(0)
            .with_participant_id(120)
            .validate()
            .is_err());
        assert!(ParticipantConfig::new(0)
            .with_lease_duration(Duration::from_secs(1))
            .with_announcement_period(Duration::from_secs(2))
            .validate()
            .is_err());
    }

    #[test]
    fn test_loopback_locators() {
        let cfg = ParticipantConfig::new(0).with_participant_id(3);
        assert_eq!(cfg.metatraffic_unicast_locator().physical_port(), 7416);
        assert_eq!(cfg.default_unicast_locator().physical_port(), 7417);
        assert!(cfg.default_unicast_locator().is_loopback());
    }
}
