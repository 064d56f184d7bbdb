// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # RTPS Reliable Delivery Protocol
//!
//! Writer and reader endpoints keeping their histories synchronized over a
//! lossy datagram transport.
//!
//! ## Protocol Flow
//!
//! ```text
//! Writer                                    Reader
//!   |                                          |
//!   |--- DATA (seq=1) ------------------------>|
//!   |--- DATA (seq=2) ----------X (lost)       |
//!   |--- DATA (seq=3) ------------------------>|  (3 held back)
//!   |                                          |
//!   |--- HEARTBEAT (first=1, last=3) -------->|
//!   |                                          |  (seq=2 missing)
//!   |<-- ACKNACK (base=2, missing: [2]) ------|
//!   |                                          |
//!   |--- DATA (seq=2) [retransmit] ---------->|  (2, 3 delivered)
//!   |--- GAP (seq) for removed changes ------>|
//! ```
//!
//! ## Components
//!
//! | Component | Role |
//! |-----------|------|
//! | `History` | Bounded, instance-indexed change store (KEEP_LAST / KEEP_ALL) |
//! | `RtpsWriter` | Sends changes, heartbeats and GAPs; tracks acknowledgments |
//! | `ReaderProxy` | Writer-side state for one matched reader |
//! | `RtpsReader` | Delivers changes in order, answers heartbeats |
//! | `WriterProxy` | Reader-side state for one matched writer |
//! | `GapTracker` | Missing sequence numbers of one writer |
//! | `FragmentAssembler` | DATA_FRAG reassembly |

mod fragment;
mod gap_tracker;
mod history;
mod reader;
mod reader_proxy;
mod writer;
mod writer_proxy;

pub use fragment::FragmentAssembler;
pub use gap_tracker::GapTracker;
pub use history::{
    Admission, CacheChange, ChangeKind, History, HistoryKind, ResourceLimits, SampleIdentity,
    WriteParams, LENGTH_UNLIMITED,
};
pub use reader::{DeliverFn, ReaderAttributes, RtpsReader, WriterActivityFn};
pub use reader_proxy::{ReaderProxy, RemoteReaderInfo};
pub use writer::{RtpsWriter, WriterAttributes};
pub use writer_proxy::{RemoteWriterInfo, WriterProxy};
