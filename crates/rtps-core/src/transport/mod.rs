// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport seam.
//!
//! The core treats a transport as best-effort datagram delivery to a
//! locator; reliability is built above it. Byte-level UDP/TCP/SHM
//! transports plug in behind [`Transport`]. [`LoopbackHub`] is the
//! in-process implementation used by tests and single-process systems.
//!
//! # Transport Trait
//!
//! ```ignore
//! pub trait Transport: Send + Sync {
//!     fn send(&self, locators: &[Locator], bytes: &[u8]) -> io::Result<()>;
//!     fn on_receive(&self, locator: Locator, cb: ReceiveCallback) -> io::Result<ReceiverGuard>;
//!     fn max_message_size(&self) -> usize;
//! }
//! ```

mod loopback;

pub use loopback::{DropFilter, LinkConditions, LoopbackHub, LoopbackTransport};

use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::core::guid::GuidPrefix;
use crate::core::locator::Locator;
use crate::protocol::{encode_message, Message, Submessage};

/// Receive callback. Invoked on the input's receive thread with one
/// complete datagram.
pub type ReceiveCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Transport statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransportStats {
    /// Datagrams handed to `send` (counted once per destination).
    pub messages_sent: u64,
    /// Total bytes sent.
    pub bytes_sent: u64,
    /// Datagrams delivered to an input.
    pub messages_received: u64,
    /// Datagrams dropped (loss injection, filter, offline).
    pub messages_dropped: u64,
}

/// Open input channel. Dropping it closes the input and joins its
/// receive thread.
pub struct ReceiverGuard {
    close: Option<Box<dyn FnOnce() + Send>>,
}

impl ReceiverGuard {
    pub fn new(close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            close: Some(Box::new(close)),
        }
    }

    /// Close the input now.
    pub fn close(mut self) {
        if let Some(close) = self.close.take() {
            close();
        }
    }
}

impl Drop for ReceiverGuard {
    fn drop(&mut self) {
        if let Some(close) = self.close.take() {
            close();
        }
    }
}

impl std::fmt::Debug for ReceiverGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverGuard")
            .field("open", &self.close.is_some())
            .finish()
    }
}

/// Datagram transport used by participants.
pub trait Transport: Send + Sync {
    /// Send `bytes` to every locator in `locators`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the datagram exceeds [`Transport::max_message_size`]
    /// or the transport is closed.
    fn send(&self, locators: &[Locator], bytes: &[u8]) -> io::Result<()>;

    /// Start receiving datagrams addressed to `locator`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the locator cannot be opened.
    fn on_receive(&self, locator: Locator, callback: ReceiveCallback) -> io::Result<ReceiverGuard>;

    /// Largest datagram the transport accepts.
    fn max_message_size(&self) -> usize;

    /// Unicast address of this host on the transport.
    fn local_address(&self) -> Ipv4Addr {
        Ipv4Addr::LOCALHOST
    }

    /// Get transport statistics.
    ///
    /// Default implementation returns empty statistics.
    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

/// Encodes messages from one participant and hands them to its transport.
#[derive(Clone)]
pub struct MessageSender {
    prefix: GuidPrefix,
    transport: Arc<dyn Transport>,
}

impl MessageSender {
    pub fn new(prefix: GuidPrefix, transport: Arc<dyn Transport>) -> Self {
        Self { prefix, transport }
    }

    pub fn prefix(&self) -> GuidPrefix {
        self.prefix
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn max_message_size(&self) -> usize {
        self.transport.max_message_size()
    }

    /// Send `submessages` in one message. Transport failures are logged:
    /// delivery guarantees are handled above the transport.
    pub fn send(
        &self,
        destination: Option<GuidPrefix>,
        submessages: Vec<Submessage>,
        locators: &[Locator],
    ) -> bool {
        if locators.is_empty() || submessages.is_empty() {
            return false;
        }
        let msg = Message {
            sender: self.prefix,
            destination,
            submessages,
        };
        let bytes = encode_message(&msg);
        match self.transport.send(locators, &bytes) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[transport] send of {} bytes failed: {}", bytes.len(), e);
                false
            }
        }
    }
}

impl std::fmt::Debug for MessageSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSender")
            .field("prefix", &self.prefix)
            .finish()
    }
}
