// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fixtures for the integration tests: sample types, fast
//! participant configuration and polling helpers.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rtps_core::{
    DomainParticipant, Error, GuidPrefix, InstanceHandle, LoopbackHub, ParticipantConfig, Result,
    TypeSupport,
};

/// Keyed sample: `sensor` is the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub sensor: u32,
    pub index: u32,
}

impl Reading {
    pub fn new(sensor: u32, index: u32) -> Self {
        Self { sensor, index }
    }
}

impl TypeSupport for Reading {
    fn type_name() -> &'static str {
        "test::Reading"
    }

    fn serialized_size(&self) -> usize {
        8
    }

    fn serialize(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&self.sensor.to_le_bytes());
        buf.extend_from_slice(&self.index.to_le_bytes());
        Ok(())
    }

    fn deserialize(buf: &[u8]) -> Result<Self> {
        if buf.len() < 8 {
            return Err(Error::SerializationError);
        }
        let sensor = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let index = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Ok(Self { sensor, index })
    }

    fn get_key(&self) -> InstanceHandle {
        let mut key = [0u8; 16];
        key[..4].copy_from_slice(&self.sensor.to_be_bytes());
        key[15] = 1;
        InstanceHandle(key)
    }

    fn is_keyed() -> bool {
        true
    }
}

/// Unkeyed sample carrying an index and an arbitrary body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub index: u32,
    pub body: Vec<u8>,
}

impl Blob {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            body: Vec::new(),
        }
    }

    pub fn sized(index: u32, len: usize) -> Self {
        let body = (0..len).map(|i| (i % 251) as u8).collect();
        Self { index, body }
    }
}

impl TypeSupport for Blob {
    fn type_name() -> &'static str {
        "test::Blob"
    }

    fn serialized_size(&self) -> usize {
        4 + self.body.len()
    }

    fn serialize(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&self.index.to_le_bytes());
        buf.extend_from_slice(&self.body);
        Ok(())
    }

    fn deserialize(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(Error::SerializationError);
        }
        Ok(Self {
            index: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            body: buf[4..].to_vec(),
        })
    }
}

/// Short periods so discovery settles in a few hundred milliseconds.
pub fn fast_config(name: &str) -> ParticipantConfig {
    ParticipantConfig::new(0)
        .with_name(name)
        .with_announcement_period(Duration::from_millis(200))
        .with_lease_check_period(Duration::from_millis(50))
}

/// Poll `cond` every 10 ms until it holds or `timeout` elapses.
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

pub fn knows(participant: &DomainParticipant, prefix: GuidPrefix) -> bool {
    participant
        .discovered_participants()
        .iter()
        .any(|p| p.guid.prefix == prefix)
}

/// Two participants on a fresh hub that discovered each other.
pub fn discovered_pair() -> (Arc<LoopbackHub>, DomainParticipant, DomainParticipant) {
    let hub = LoopbackHub::new();
    let a = DomainParticipant::new(fast_config("a"), hub.transport()).expect("participant a");
    let b = DomainParticipant::new(fast_config("b"), hub.transport()).expect("participant b");
    assert!(
        wait_until(Duration::from_secs(5), || {
            knows(&a, b.guid().prefix) && knows(&b, a.guid().prefix)
        }),
        "participants did not discover each other"
    );
    (hub, a, b)
}
