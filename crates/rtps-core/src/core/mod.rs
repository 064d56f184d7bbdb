// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Core RTPS building blocks: identities, addresses, discovery and the
//! participant runtime.

/// Participant and endpoint discovery (SPDP, SEDP, WLP).
pub mod discovery;
/// GUID, GUID prefix, entity ids and instance handles.
pub mod guid;
/// Transport addresses and NAT-aware selection.
pub mod locator;
/// Clocks and the participant timer scheduler.
pub mod rt;
