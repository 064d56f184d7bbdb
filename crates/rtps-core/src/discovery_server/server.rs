// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server-side relay of discovery data.
//!
//! A server stores what its clients announce and republishes it through its
//! own reliable, transient-local builtin writers, one instance per announced
//! entity. Clients matched with the server therefore learn about each other
//! (including late joiners, from the writer history).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::discovery::publish;
use crate::core::guid::{InstanceHandle, GUID};
use crate::reliability::{ChangeKind, RtpsWriter};

/// Republishes remote announcements on one builtin writer.
#[derive(Debug)]
pub struct Relay {
    writer: Arc<RtpsWriter>,
    forwarded: AtomicU64,
    retracted: AtomicU64,
}

impl Relay {
    pub fn new(writer: Arc<RtpsWriter>) -> Self {
        Self {
            writer,
            forwarded: AtomicU64::new(0),
            retracted: AtomicU64::new(0),
        }
    }

    /// Republish the announcement of `guid`.
    pub fn forward(&self, guid: GUID, payload: Vec<u8>) -> bool {
        let sent = publish(&self.writer, ChangeKind::Alive, guid.into(), payload);
        if sent {
            self.forwarded.fetch_add(1, Ordering::Relaxed);
            log::trace!("[DS-SERVER] relayed {} on {}", guid, self.writer.guid());
        }
        sent
    }

    /// Dispose a previously forwarded entity. Entities that were never
    /// forwarded, or are already disposed, are ignored.
    pub fn retract(&self, guid: GUID) -> bool {
        let instance = InstanceHandle::from(guid);
        let alive = self.writer.with_history(|h| {
            h.iter()
                .rev()
                .find(|c| c.instance_handle == instance)
                .is_some_and(|c| c.kind.is_alive())
        });
        if !alive {
            return false;
        }
        let sent = publish(
            &self.writer,
            ChangeKind::NotAliveDisposedUnregistered,
            instance,
            Vec::new(),
        );
        if sent {
            self.retracted.fetch_add(1, Ordering::Relaxed);
            log::debug!("[DS-SERVER] retracted {}", guid);
        }
        sent
    }

    pub fn forwarded_count(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn retracted_count(&self) -> u64 {
        self.retracted.load(Ordering::Relaxed)
    }
}
