// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process transport hub.
//!
//! Every [`LoopbackTransport`] created from one hub gets its own loopback
//! address (`127.0.x.y`) so several participants can share a process
//! without port collisions. Multicast locators fan out to every input
//! opened on them.
//!
//! Impairments for tests:
//! - random loss ([`LinkConditions::loss_rate`])
//! - a drop filter deciding per destination + datagram
//! - taking one transport offline (it neither sends nor receives)

use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use arc_swap::ArcSwapOption;
use crossbeam::channel::{self, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;

use super::{ReceiveCallback, ReceiverGuard, Transport, TransportStats};
use crate::config::MAX_MESSAGE_SIZE;
use crate::core::locator::Locator;

/// Decides whether a datagram sent to a locator is dropped (`true`).
pub type DropFilter = Box<dyn Fn(&Locator, &[u8]) -> bool + Send + Sync>;

/// Simulated link impairments.
#[derive(Debug, Clone, Default)]
pub struct LinkConditions {
    /// Datagram loss probability (0.0 - 1.0).
    pub loss_rate: f64,
}

impl LinkConditions {
    /// Create conditions for a lossy link.
    pub fn lossy(loss_rate: f64) -> Self {
        Self { loss_rate }
    }
}

struct Input {
    id: u64,
    tx: Sender<Vec<u8>>,
    online: Arc<AtomicBool>,
}

#[derive(Default)]
struct HubStats {
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,
}

/// Shared in-memory "network".
pub struct LoopbackHub {
    inputs: DashMap<Locator, Vec<Input>>,
    next_input: AtomicU64,
    next_host: AtomicU32,
    max_message_size: usize,
    drop_filter: ArcSwapOption<DropFilter>,
    conditions: Mutex<LinkConditions>,
    rng: Mutex<fastrand::Rng>,
    stats: HubStats,
}

impl LoopbackHub {
    pub fn new() -> Arc<Self> {
        Self::with_max_message_size(MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max_message_size: usize) -> Arc<Self> {
        Arc::new(Self {
            inputs: DashMap::new(),
            next_input: AtomicU64::new(1),
            next_host: AtomicU32::new(1),
            max_message_size,
            drop_filter: ArcSwapOption::empty(),
            conditions: Mutex::new(LinkConditions::default()),
            rng: Mutex::new(fastrand::Rng::with_seed(0x1234_5678_9ABC_DEF0)),
            stats: HubStats::default(),
        })
    }

    /// New transport endpoint attached to this hub.
    pub fn transport(self: &Arc<Self>) -> Arc<LoopbackTransport> {
        let host = self.next_host.fetch_add(1, Ordering::Relaxed);
        let address = Ipv4Addr::new(127, 0, (host >> 8) as u8, host as u8);
        Arc::new(LoopbackTransport {
            hub: Arc::clone(self),
            address,
            online: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn set_conditions(&self, conditions: LinkConditions) {
        *self.conditions.lock() = conditions;
    }

    pub fn set_drop_filter<F>(&self, filter: F)
    where
        F: Fn(&Locator, &[u8]) -> bool + Send + Sync + 'static,
    {
        self.drop_filter.store(Some(Arc::new(Box::new(filter))));
    }

    pub fn clear_drop_filter(&self) {
        self.drop_filter.store(None);
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.stats.bytes_sent.load(Ordering::Relaxed),
            messages_received: self.stats.messages_received.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
        }
    }

    /// Number of open inputs on `locator`.
    pub fn input_count(&self, locator: &Locator) -> usize {
        self.inputs.get(locator).map(|v| v.len()).unwrap_or(0)
    }

    fn should_drop(&self, locator: &Locator, bytes: &[u8]) -> bool {
        if let Some(filter) = &*self.drop_filter.load() {
            if (**filter)(locator, bytes) {
                return true;
            }
        }
        let loss = self.conditions.lock().loss_rate;
        loss > 0.0 && self.rng.lock().f64() < loss
    }

    fn deliver(&self, locator: &Locator, bytes: &[u8]) {
        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_sent
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);

        if self.should_drop(locator, bytes) {
            self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let targets: Vec<Sender<Vec<u8>>> = match self.inputs.get(locator) {
            Some(inputs) => inputs
                .iter()
                .filter(|i| i.online.load(Ordering::Acquire))
                .map(|i| i.tx.clone())
                .collect(),
            None => Vec::new(),
        };
        for tx in targets {
            if tx.send(bytes.to_vec()).is_ok() {
                self.stats.messages_received.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn remove_input(&self, locator: &Locator, id: u64) {
        let now_empty = match self.inputs.get_mut(locator) {
            Some(mut inputs) => {
                inputs.retain(|i| i.id != id);
                inputs.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.inputs.remove_if(locator, |_, v| v.is_empty());
        }
    }
}

/// One participant's view of a [`LoopbackHub`].
pub struct LoopbackTransport {
    hub: Arc<LoopbackHub>,
    address: Ipv4Addr,
    online: Arc<AtomicBool>,
}

impl LoopbackTransport {
    /// Offline transports drop everything they send or would receive.
    pub fn set_online(&self, online: bool) {
        log::debug!("[loopback] {} online={}", self.address, online);
        self.online.store(online, Ordering::Release);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn hub(&self) -> &Arc<LoopbackHub> {
        &self.hub
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, locators: &[Locator], bytes: &[u8]) -> io::Result<()> {
        if bytes.len() > self.hub.max_message_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "datagram of {} bytes exceeds {}",
                    bytes.len(),
                    self.hub.max_message_size
                ),
            ));
        }
        if !self.is_online() {
            self.hub
                .stats
                .messages_dropped
                .fetch_add(locators.len() as u64, Ordering::Relaxed);
            return Ok(());
        }
        for locator in locators {
            self.hub.deliver(locator, bytes);
        }
        Ok(())
    }

    fn on_receive(&self, locator: Locator, callback: ReceiveCallback) -> io::Result<ReceiverGuard> {
        let id = self.hub.next_input.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = channel::unbounded::<Vec<u8>>();

        let handle = thread::Builder::new()
            .name("rtps-recv".to_string())
            .spawn(move || {
                while let Ok(datagram) = rx.recv() {
                    callback(&datagram);
                }
            })?;

        self.hub.inputs.entry(locator).or_default().push(Input {
            id,
            tx,
            online: Arc::clone(&self.online),
        });
        log::trace!("[loopback] input {} opened on {}", id, locator);

        let hub = Arc::clone(&self.hub);
        Ok(ReceiverGuard::new(move || {
            hub.remove_input(&locator, id);
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }))
    }

    fn max_message_size(&self) -> usize {
        self.hub.max_message_size
    }

    fn local_address(&self) -> Ipv4Addr {
        self.address
    }

    fn stats(&self) -> TransportStats {
        self.hub.stats()
    }
}
