// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flow control for outgoing user data.
//!
//! ```text
//! RtpsWriter --try_acquire(bytes)--> FlowController
//!                                     +-- writer TokenBucket      (optional)
//!                                     +-- participant TokenBucket (optional, shared)
//! ```

pub mod flow_controller;
pub mod token_bucket;

pub use flow_controller::{shared_bucket, FlowController, SharedBucket, ThroughputController};
pub use token_bucket::TokenBucket;
