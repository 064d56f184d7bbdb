// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Send pacing for writers.
//!
//! A writer may carry its own [`ThroughputController`] and the participant
//! may carry one shared by all its writers. A datagram is sent only when
//! both budgets allow it; otherwise the writer keeps the change unsent and
//! retries after [`FlowController::try_acquire`]'s suggested delay.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::token_bucket::TokenBucket;
use crate::dds::{Error, Result};

/// Throughput limit: at most `bytes_per_period` bytes every `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputController {
    pub bytes_per_period: u32,
    pub period: Duration,
}

impl ThroughputController {
    pub fn new(bytes_per_period: u32, period: Duration) -> Self {
        Self {
            bytes_per_period,
            period,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bytes_per_period == 0 {
            return Err(Error::Config(
                "throughput controller bytes_per_period must be > 0".into(),
            ));
        }
        if self.period.is_zero() {
            return Err(Error::Config(
                "throughput controller period must be > 0".into(),
            ));
        }
        Ok(())
    }

    fn bucket(&self) -> TokenBucket {
        TokenBucket::new(u64::from(self.bytes_per_period), self.period)
    }
}

/// Participant-wide budget shared by every writer of one participant.
pub type SharedBucket = Arc<Mutex<TokenBucket>>;

pub fn shared_bucket(controller: &ThroughputController) -> SharedBucket {
    Arc::new(Mutex::new(controller.bucket()))
}

/// Combined writer + participant budget.
#[derive(Debug, Default)]
pub struct FlowController {
    writer: Option<Mutex<TokenBucket>>,
    writer_limit: Option<ThroughputController>,
    participant: Option<SharedBucket>,
}

impl FlowController {
    pub fn new(writer: Option<ThroughputController>, participant: Option<SharedBucket>) -> Self {
        Self {
            writer: writer.map(|c| Mutex::new(c.bucket())),
            writer_limit: writer,
            participant,
        }
    }

    /// No pacing at all.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn is_limited(&self) -> bool {
        self.writer.is_some() || self.participant.is_some()
    }

    /// Largest datagram this controller can ever let through.
    pub fn max_payload(&self) -> Option<usize> {
        let writer = self.writer.as_ref().map(|b| b.lock().capacity());
        let participant = self.participant.as_ref().map(|b| b.lock().capacity());
        match (writer, participant) {
            (Some(w), Some(p)) => Some(w.min(p) as usize),
            (Some(w), None) => Some(w as usize),
            (None, Some(p)) => Some(p as usize),
            (None, None) => None,
        }
    }

    pub fn writer_limit(&self) -> Option<ThroughputController> {
        self.writer_limit
    }

    /// Take `bytes` from every budget, or none of them.
    ///
    /// On refusal returns the delay after which a retry may succeed.
    pub fn try_acquire(&self, bytes: usize) -> std::result::Result<(), Duration> {
        let bytes = bytes as u64;
        // Lock order: writer, then participant
        let mut writer = self.writer.as_ref().map(|b| b.lock());
        let mut participant = self.participant.as_ref().map(|b| b.lock());

        let wait_writer = writer
            .as_mut()
            .map(|b| b.time_until_available(bytes))
            .unwrap_or(Duration::ZERO);
        let wait_participant = participant
            .as_mut()
            .map(|b| b.time_until_available(bytes))
            .unwrap_or(Duration::ZERO);
        let wait = wait_writer.max(wait_participant);
        if !wait.is_zero() {
            return Err(wait);
        }

        if let Some(b) = writer.as_mut() {
            b.try_consume(bytes);
        }
        if let Some(b) = participant.as_mut() {
            b.try_consume(bytes);
        }
        Ok(())
    }
}
