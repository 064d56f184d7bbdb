// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # DDS entity API
//!
//! Application-facing entities built on the RTPS core:
//!
//! - **DomainParticipant**: owns the scheduler, transport inputs, discovery
//!   database and key table; factory for writers and readers
//! - **DataWriter/DataReader**: typed endpoints bound to a topic
//! - **QoS**: policies controlling delivery, checked at creation and on
//!   `set_qos`
//!
//! ## Entity Hierarchy
//!
//! ```text
//! DomainParticipant
//! +-- DataWriter<T>  --(RtpsWriter)--> matched readers
//! +-- DataReader<T>  <--(RtpsReader)-- matched writers
//! ```

/// Listener closures and status structures.
pub mod listener;
/// Domain participant and its shared context.
pub mod participant;
/// QoS policies and consistency checks.
pub mod qos;
mod reader;
mod writer;

pub use listener::{
    LivelinessChangedStatus, LivelinessLostStatus, OfferedDeadlineMissedStatus,
    OfferedIncompatibleQosStatus, ParticipantDiscoveryInfo, ParticipantDiscoveryStatus,
    ParticipantListener, PublicationMatchedStatus, ReaderListener,
    RequestedIncompatibleQosStatus, StatusMask, SubscriptionMatchedStatus, WriterListener,
};
pub use participant::{DomainParticipant, ParticipantContext};
pub use qos::{DataReaderQos, DataWriterQos};
pub use reader::{DataReader, Sample, SampleInfo};
pub use writer::DataWriter;

use crate::core::guid::InstanceHandle;
use crate::protocol::DecodeError;

/// Errors returned by DDS and RTPS operations.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid participant or transport configuration.
    Config(String),
    /// QoS value out of range.
    InvalidQos(String),
    /// QoS policies contradict each other (e.g. BEST_EFFORT + EXCLUSIVE).
    InconsistentPolicy(String),
    /// Attempt to change a policy that is fixed once the entity is enabled.
    ImmutablePolicy(String),
    /// Requested feature or QoS value is not supported.
    Unsupported(String),

    // ========================================================================
    // Entity Errors
    // ========================================================================
    /// Entity is not enabled yet.
    NotEnabled,
    /// Entity was deleted or its participant closed.
    AlreadyDeleted,
    /// Operation not allowed in the current state.
    InvalidState(String),
    /// Operation precondition does not hold (e.g. unknown instance).
    PreconditionNotMet(String),
    /// Argument is invalid (e.g. undefined instance handle).
    BadParameter(String),

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// I/O error with underlying cause.
    IoError(std::io::Error),
    /// Transport refused the operation.
    Transport(String),

    // ========================================================================
    // Data Errors
    // ========================================================================
    /// Serialization of user data failed.
    SerializationError,
    /// Received bytes could not be decoded.
    Decode(DecodeError),

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// Resource limit exceeded (max_samples, max_instances...).
    ResourceLimitExceeded(String),
    /// A blocking operation ran out of time.
    Timeout(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Configuration
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::InvalidQos(msg) => write!(f, "Invalid QoS: {}", msg),
            Error::InconsistentPolicy(msg) => write!(f, "Inconsistent QoS policy: {}", msg),
            Error::ImmutablePolicy(msg) => write!(f, "Immutable QoS policy: {}", msg),
            Error::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            // Entity
            Error::NotEnabled => write!(f, "Entity not enabled"),
            Error::AlreadyDeleted => write!(f, "Entity already deleted"),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::PreconditionNotMet(msg) => write!(f, "Precondition not met: {}", msg),
            Error::BadParameter(msg) => write!(f, "Bad parameter: {}", msg),
            // Transport
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::Transport(msg) => write!(f, "Transport error: {}", msg),
            // Data
            Error::SerializationError => write!(f, "Serialization failed"),
            Error::Decode(e) => write!(f, "Decode error: {}", e),
            // Resource
            Error::ResourceLimitExceeded(msg) => write!(f, "Resource limit exceeded: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

/// Convenient alias for API results using the public `Error` type.
pub type Result<T> = core::result::Result<T, Error>;

/// Type support contract: how the core serializes user samples and
/// computes their instance key. The encoding itself is up to the type.
pub trait TypeSupport: Sized + Send + Sync + 'static {
    /// Registered type name, compared during endpoint matching.
    fn type_name() -> &'static str;

    /// Upper bound of the serialized size, used to pre-allocate.
    fn serialized_size(&self) -> usize;

    /// Append the serialized form of `self` to `buf`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the value cannot be encoded.
    fn serialize(&self, buf: &mut Vec<u8>) -> Result<()>;

    /// Decode a sample from `buf`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the buffer is truncated or contains invalid data.
    fn deserialize(buf: &[u8]) -> Result<Self>;

    /// Instance key hash. Unkeyed types keep the default `NIL`.
    fn get_key(&self) -> InstanceHandle {
        InstanceHandle::NIL
    }

    /// Returns true if this type has key fields.
    #[must_use]
    fn is_keyed() -> bool {
        false
    }
}
