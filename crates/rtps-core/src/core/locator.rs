// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport-agnostic locators.
//!
//! A [`Locator`] names one place a participant can be reached: transport
//! kind, port and a 16-byte address (IPv4 lives in the last 4 bytes). It is
//! a plain value type; equality, ordering and hashing are structural.
//!
//! # TCP ports
//!
//! Stream transports multiplex several logical endpoints over one
//! connection, so the 32-bit port is split: the *physical* port (the socket)
//! occupies the low 16 bits and the *logical* port the high 16 bits.
//!
//! # Wire layout (24 bytes, little endian)
//!
//! ```text
//! +--------+--------+------------------+
//! | kind   | port   | address[16]      |
//! | i32    | u32    |                  |
//! +--------+--------+------------------+
//! ```

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use crate::config;

/// Encoded size of a locator.
pub const LOCATOR_SIZE: usize = 24;

/// Transport kind of a locator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocatorKind {
    Udpv4,
    Udpv6,
    Tcpv4,
    Tcpv6,
    Shm,
}

impl LocatorKind {
    /// RTPS numeric code.
    pub fn code(self) -> i32 {
        match self {
            LocatorKind::Udpv4 => 1,
            LocatorKind::Udpv6 => 2,
            LocatorKind::Tcpv4 => 4,
            LocatorKind::Tcpv6 => 8,
            LocatorKind::Shm => 16,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(LocatorKind::Udpv4),
            2 => Some(LocatorKind::Udpv6),
            4 => Some(LocatorKind::Tcpv4),
            8 => Some(LocatorKind::Tcpv6),
            16 => Some(LocatorKind::Shm),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            LocatorKind::Udpv4 => "UDPv4",
            LocatorKind::Udpv6 => "UDPv6",
            LocatorKind::Tcpv4 => "TCPv4",
            LocatorKind::Tcpv6 => "TCPv6",
            LocatorKind::Shm => "SHM",
        }
    }

    fn is_v4(self) -> bool {
        matches!(self, LocatorKind::Udpv4 | LocatorKind::Tcpv4)
    }

    fn is_tcp(self) -> bool {
        matches!(self, LocatorKind::Tcpv4 | LocatorKind::Tcpv6)
    }
}

/// Transport endpoint address.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator {
    pub kind: LocatorKind,
    pub port: u32,
    pub address: [u8; 16],
}

impl Locator {
    pub fn new(kind: LocatorKind, port: u32, address: [u8; 16]) -> Self {
        Self {
            kind,
            port,
            address,
        }
    }

    pub fn udpv4(ip: Ipv4Addr, port: u16) -> Self {
        Self::new(LocatorKind::Udpv4, u32::from(port), v4_bytes(ip))
    }

    pub fn udpv6(ip: Ipv6Addr, port: u16) -> Self {
        Self::new(LocatorKind::Udpv6, u32::from(port), ip.octets())
    }

    /// TCPv4 locator with separate physical and logical ports.
    pub fn tcpv4(ip: Ipv4Addr, physical: u16, logical: u16) -> Self {
        let mut loc = Self::new(LocatorKind::Tcpv4, 0, v4_bytes(ip));
        loc.set_physical_port(physical);
        loc.set_logical_port(logical);
        loc
    }

    pub fn tcpv6(ip: Ipv6Addr, physical: u16, logical: u16) -> Self {
        let mut loc = Self::new(LocatorKind::Tcpv6, 0, ip.octets());
        loc.set_physical_port(physical);
        loc.set_logical_port(logical);
        loc
    }

    /// Shared-memory locator; the port names the segment.
    pub fn shm(port: u32) -> Self {
        Self::new(LocatorKind::Shm, port, [0; 16])
    }

    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::udpv4(*v4.ip(), v4.port()),
            SocketAddr::V6(v6) => Self::udpv6(*v6.ip(), v6.port()),
        }
    }

    /// Default SPDP multicast locator for a domain.
    pub fn spdp_multicast(domain_id: u32) -> Self {
        Self::udpv4(
            config::DEFAULT_MULTICAST_ADDRESS,
            config::spdp_multicast_port(domain_id),
        )
    }

    /// Physical (socket) port: the whole port for datagram kinds.
    pub fn physical_port(&self) -> u16 {
        (self.port & 0xFFFF) as u16
    }

    /// Logical port of a stream locator (0 for datagram kinds).
    pub fn logical_port(&self) -> u16 {
        if self.kind.is_tcp() {
            (self.port >> 16) as u16
        } else {
            0
        }
    }

    pub fn set_physical_port(&mut self, port: u16) {
        self.port = (self.port & 0xFFFF_0000) | u32::from(port);
    }

    pub fn set_logical_port(&mut self, port: u16) {
        self.port = (self.port & 0x0000_FFFF) | (u32::from(port) << 16);
    }

    pub fn ip(&self) -> Option<IpAddr> {
        match self.kind {
            LocatorKind::Udpv4 | LocatorKind::Tcpv4 => {
                let a = &self.address;
                Some(IpAddr::V4(Ipv4Addr::new(a[12], a[13], a[14], a[15])))
            }
            LocatorKind::Udpv6 | LocatorKind::Tcpv6 => Some(IpAddr::V6(Ipv6Addr::from(self.address))),
            LocatorKind::Shm => None,
        }
    }

    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        self.ip()
            .map(|ip| SocketAddr::new(ip, self.physical_port()))
    }

    pub fn is_multicast(&self) -> bool {
        self.ip().map(|ip| ip.is_multicast()).unwrap_or(false)
    }

    pub fn is_loopback(&self) -> bool {
        self.ip().map(|ip| ip.is_loopback()).unwrap_or(false)
    }

    /// A locator is valid when it has a port (SHM) or an address and a port.
    pub fn is_valid(&self) -> bool {
        match self.kind {
            LocatorKind::Shm => true,
            _ => self.physical_port() != 0,
        }
    }

    /// Compare the first `mask` bits of the address of two same-family locators.
    pub fn same_network(&self, other: &Locator, mask: u8) -> bool {
        if self.kind.is_v4() != other.kind.is_v4() {
            return false;
        }
        // IPv4 addresses start at byte 12, masks count from there
        let (a, b, max_bits) = if self.kind.is_v4() {
            (&self.address[12..], &other.address[12..], 32u32)
        } else {
            (&self.address[..], &other.address[..], 128u32)
        };
        let bits = u32::from(mask).min(max_bits);
        let full = (bits / 8) as usize;
        if a[..full] != b[..full] {
            return false;
        }
        let rem = bits % 8;
        if rem == 0 {
            return true;
        }
        let m = 0xFFu8 << (8 - rem);
        (a[full] & m) == (b[full] & m)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.kind.code().to_le_bytes());
        out.extend_from_slice(&self.port.to_le_bytes());
        out.extend_from_slice(&self.address);
    }

    /// Decode a locator; `None` on short buffer or unknown kind.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < LOCATOR_SIZE {
            return None;
        }
        let kind = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let kind = LocatorKind::from_code(kind)?;
        let port = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let mut address = [0u8; 16];
        address.copy_from_slice(&buf[8..24]);
        Some(Self::new(kind, port, address))
    }
}

fn v4_bytes(ip: Ipv4Addr) -> [u8; 16] {
    let mut address = [0u8; 16];
    address[12..16].copy_from_slice(&ip.octets());
    address
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip() {
            Some(ip) if self.kind.is_tcp() => write!(
                f,
                "{}:[{}]:{}-{}",
                self.kind.label(),
                ip,
                self.physical_port(),
                self.logical_port()
            ),
            Some(ip) => write!(f, "{}:[{}]:{}", self.kind.label(), ip, self.port),
            None => write!(f, "{}:{}", self.kind.label(), self.port),
        }
    }
}

/// Error parsing a locator string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorParseError(pub String);

impl fmt::Display for LocatorParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid locator: {}", self.0)
    }
}

impl std::error::Error for LocatorParseError {}

impl FromStr for Locator {
    type Err = LocatorParseError;

    /// Parses the `Display` format, e.g. `UDPv4:[127.0.0.1]:7400`,
    /// `TCPv4:[10.0.0.1]:5100-7410` or `SHM:7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || LocatorParseError(s.to_string());
        let (kind_str, rest) = s.split_once(':').ok_or_else(err)?;
        let kind = match kind_str {
            "UDPv4" => LocatorKind::Udpv4,
            "UDPv6" => LocatorKind::Udpv6,
            "TCPv4" => LocatorKind::Tcpv4,
            "TCPv6" => LocatorKind::Tcpv6,
            "SHM" => LocatorKind::Shm,
            _ => return Err(err()),
        };
        if kind == LocatorKind::Shm {
            let port = rest.parse::<u32>().map_err(|_| err())?;
            return Ok(Locator::shm(port));
        }

        let rest = rest.strip_prefix('[').ok_or_else(err)?;
        let (addr_str, port_str) = rest.split_once("]:").ok_or_else(err)?;
        let ip: IpAddr = addr_str.parse().map_err(|_| err())?;

        match (kind, ip) {
            (LocatorKind::Udpv4, IpAddr::V4(v4)) => {
                let port = port_str.parse::<u16>().map_err(|_| err())?;
                Ok(Locator::udpv4(v4, port))
            }
            (LocatorKind::Udpv6, IpAddr::V6(v6)) => {
                let port = port_str.parse::<u16>().map_err(|_| err())?;
                Ok(Locator::udpv6(v6, port))
            }
            (LocatorKind::Tcpv4, IpAddr::V4(v4)) => {
                let (phys, logical) = split_tcp_ports(port_str).ok_or_else(err)?;
                Ok(Locator::tcpv4(v4, phys, logical))
            }
            (LocatorKind::Tcpv6, IpAddr::V6(v6)) => {
                let (phys, logical) = split_tcp_ports(port_str).ok_or_else(err)?;
                Ok(Locator::tcpv6(v6, phys, logical))
            }
            _ => Err(err()),
        }
    }
}

fn split_tcp_ports(s: &str) -> Option<(u16, u16)> {
    match s.split_once('-') {
        Some((p, l)) => Some((p.parse().ok()?, l.parse().ok()?)),
        None => Some((s.parse().ok()?, 0)),
    }
}

/// Locator announced for a NAT'd or multi-homed host.
///
/// `externality` 0 is the local host; higher values are further out
/// (LAN, then WAN). `cost` breaks ties inside one externality level and
/// `mask` is the network prefix length used for reachability checks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExternalLocator {
    pub locator: Locator,
    pub externality: u8,
    pub cost: u8,
    pub mask: u8,
}

impl ExternalLocator {
    pub fn new(locator: Locator, externality: u8, cost: u8, mask: u8) -> Self {
        Self {
            locator,
            externality,
            cost,
            mask,
        }
    }

    /// Reachable when one of our own locators lies in the same network.
    pub fn is_reachable_from(&self, local: &[Locator]) -> bool {
        local
            .iter()
            .any(|l| l.same_network(&self.locator, self.mask))
    }
}

/// Pick the best-reachable address among a remote's external locators.
///
/// Reachable candidates win, lowest `(externality, cost)` first. When none is
/// reachable the most external candidate (lowest cost among equals) is used.
pub fn select_external<'a>(
    candidates: &'a [ExternalLocator],
    local: &[Locator],
) -> Option<&'a Locator> {
    let reachable = candidates
        .iter()
        .filter(|c| c.is_reachable_from(local))
        .min_by_key(|c| (c.externality, c.cost));
    if let Some(best) = reachable {
        return Some(&best.locator);
    }
    candidates
        .iter()
        .min_by_key(|c| (std::cmp::Reverse(c.externality), c.cost))
        .map(|c| &c.locator)
}

/// Ordered, duplicate-free list of locators.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct LocatorList(Vec<Locator>);

impl LocatorList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, locator: Locator) {
        if !self.0.contains(&locator) {
            self.0.push(locator);
        }
    }

    pub fn extend<I: IntoIterator<Item = Locator>>(&mut self, iter: I) {
        for l in iter {
            self.push(l);
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Locator> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Locator] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, locator: &Locator) -> bool {
        self.0.contains(locator)
    }
}

impl From<Vec<Locator>> for LocatorList {
    fn from(v: Vec<Locator>) -> Self {
        let mut list = LocatorList::new();
        list.extend(v);
        list
    }
}

impl FromIterator<Locator> for LocatorList {
    fn from_iter<I: IntoIterator<Item = Locator>>(iter: I) -> Self {
        let mut list = LocatorList::new();
        list.extend(iter);
        list
    }
}

impl<'a> IntoIterator for &'a LocatorList {
    type Item = &'a Locator;
    type IntoIter = std::slice::Iter<'a, Locator>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
