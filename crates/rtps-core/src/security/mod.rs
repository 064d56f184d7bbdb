// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Key-management seam.
//!
//! The participant owns a single [`KeyMaterialTable`] and registers itself,
//! every matched remote participant and every matched remote endpoint in it.
//! Each record carries the session bookkeeping of one crypto handle:
//!
//! ```text
//! GUID --> KeyMaterial { session_id, session_counter, blocks_encoded,
//!                        max_blocks_per_session, master_key, session_key }
//! ```
//!
//! A session is rotated once `blocks_encoded` reaches
//! `max_blocks_per_session`: the session id advances and a new session key
//! is derived from the master key.
//!
//! Key derivation (HKDF-SHA256) and payload protection (AES-256-GCM) are
//! provided by `ring` and require the `security` feature. Without it the
//! table still tracks handles and sessions, but `encode`/`decode` return
//! [`Error::Unsupported`].

#[cfg(feature = "security")]
mod crypto;

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::core::guid::GUID;
use crate::dds::{Error, Result};

/// Default number of encoded blocks before a session key is rotated.
pub const DEFAULT_MAX_BLOCKS_PER_SESSION: u64 = 1 << 20;

/// Kind of entity a crypto handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    LocalParticipant,
    RemoteParticipant,
    RemoteWriter,
    RemoteReader,
}

/// Crypto handle: the GUID the material is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CryptoHandle(pub GUID);

/// Key-management service used by the participant.
pub trait KeyService: Send + Sync {
    /// Create the local participant's master key.
    fn register_local_participant(&self, guid: GUID) -> Result<CryptoHandle>;

    /// Track a remote participant once it is discovered.
    fn register_matched_remote_participant(
        &self,
        local: CryptoHandle,
        remote: GUID,
    ) -> Result<CryptoHandle>;

    /// Track a remote writer matched with one of our readers.
    fn register_matched_remote_writer(
        &self,
        participant: CryptoHandle,
        writer: GUID,
    ) -> Result<CryptoHandle>;

    /// Track a remote reader matched with one of our writers.
    fn register_matched_remote_reader(
        &self,
        participant: CryptoHandle,
        reader: GUID,
    ) -> Result<CryptoHandle>;

    /// Protect `plain` with the current session key of `handle`.
    fn encode(&self, handle: CryptoHandle, plain: &[u8]) -> Result<Vec<u8>>;

    /// Reverse [`KeyService::encode`].
    fn decode(&self, handle: CryptoHandle, protected: &[u8]) -> Result<Vec<u8>>;

    /// Drop the material of `handle`. Returns false if it was unknown.
    fn unregister(&self, handle: CryptoHandle) -> bool;
}

/// Session bookkeeping of one crypto handle.
#[derive(Clone)]
pub struct KeyMaterial {
    pub kind: HandleKind,
    pub session_id: u32,
    /// Number of sessions started so far, including the current one.
    pub session_counter: u64,
    pub blocks_encoded: u64,
    pub max_blocks_per_session: u64,
    master_key: Option<[u8; 32]>,
    session_key: Option<[u8; 32]>,
}

impl KeyMaterial {
    fn new(kind: HandleKind, master_key: Option<[u8; 32]>, max_blocks: u64) -> Self {
        let mut material = Self {
            kind,
            session_id: 0,
            session_counter: 0,
            blocks_encoded: 0,
            max_blocks_per_session: max_blocks,
            master_key,
            session_key: None,
        };
        material.start_session();
        material
    }

    fn start_session(&mut self) {
        self.session_id = self.session_id.wrapping_add(1);
        self.session_counter += 1;
        self.blocks_encoded = 0;
        self.session_key = derive_session_key(self.master_key.as_ref(), self.session_id);
    }

    /// Count one encoded block, rotating the session when the threshold is
    /// reached. Returns true if a rotation happened.
    fn note_block_encoded(&mut self) -> bool {
        self.blocks_encoded += 1;
        if self.blocks_encoded >= self.max_blocks_per_session {
            self.start_session();
            return true;
        }
        false
    }

    pub fn has_keys(&self) -> bool {
        self.session_key.is_some()
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        wipe(&mut self.master_key);
        wipe(&mut self.session_key);
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("kind", &self.kind)
            .field("session_id", &self.session_id)
            .field("session_counter", &self.session_counter)
            .field("blocks_encoded", &self.blocks_encoded)
            .field("max_blocks_per_session", &self.max_blocks_per_session)
            .finish_non_exhaustive()
    }
}

/// Key material of every registered handle, owned by one participant.
pub struct KeyMaterialTable {
    entries: RwLock<HashMap<GUID, KeyMaterial>>,
    max_blocks_per_session: u64,
}

impl Default for KeyMaterialTable {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BLOCKS_PER_SESSION)
    }
}

impl KeyMaterialTable {
    pub fn new(max_blocks_per_session: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_blocks_per_session: max_blocks_per_session.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, guid: GUID) -> bool {
        self.entries.read().contains_key(&guid)
    }

    /// Snapshot of the session counters of `guid`.
    pub fn session(&self, guid: GUID) -> Option<(u32, u64, u64)> {
        self.entries
            .read()
            .get(&guid)
            .map(|m| (m.session_id, m.session_counter, m.blocks_encoded))
    }

    /// Count `blocks` encoded blocks for `handle` without touching payloads.
    /// Returns the number of rotations that happened.
    pub fn record_blocks(&self, handle: CryptoHandle, blocks: u64) -> Result<u32> {
        let mut entries = self.entries.write();
        let material = entries
            .get_mut(&handle.0)
            .ok_or_else(|| Error::PreconditionNotMet(format!("unknown crypto handle {}", handle.0)))?;
        let mut rotations = 0;
        for _ in 0..blocks {
            if material.note_block_encoded() {
                rotations += 1;
            }
        }
        if rotations > 0 {
            log::debug!(
                "[security] {} rotated to session {}",
                handle.0,
                material.session_id
            );
        }
        Ok(rotations)
    }

    fn insert(&self, guid: GUID, kind: HandleKind, master_key: Option<[u8; 32]>) -> CryptoHandle {
        let material = KeyMaterial::new(kind, master_key, self.max_blocks_per_session);
        self.entries.write().insert(guid, material);
        log::trace!("[security] registered {:?} {}", kind, guid);
        CryptoHandle(guid)
    }

    fn master_of(&self, handle: CryptoHandle) -> Result<Option<[u8; 32]>> {
        self.entries
            .read()
            .get(&handle.0)
            .map(|m| m.master_key)
            .ok_or_else(|| Error::PreconditionNotMet(format!("unknown crypto handle {}", handle.0)))
    }
}

impl KeyService for KeyMaterialTable {
    fn register_local_participant(&self, guid: GUID) -> Result<CryptoHandle> {
        let master = generate_master_key()?;
        Ok(self.insert(guid, HandleKind::LocalParticipant, master))
    }

    fn register_matched_remote_participant(
        &self,
        local: CryptoHandle,
        remote: GUID,
    ) -> Result<CryptoHandle> {
        let master = self.master_of(local)?;
        Ok(self.insert(remote, HandleKind::RemoteParticipant, master))
    }

    fn register_matched_remote_writer(
        &self,
        participant: CryptoHandle,
        writer: GUID,
    ) -> Result<CryptoHandle> {
        let master = self.master_of(participant)?;
        Ok(self.insert(writer, HandleKind::RemoteWriter, master))
    }

    fn register_matched_remote_reader(
        &self,
        participant: CryptoHandle,
        reader: GUID,
    ) -> Result<CryptoHandle> {
        let master = self.master_of(participant)?;
        Ok(self.insert(reader, HandleKind::RemoteReader, master))
    }

    fn encode(&self, handle: CryptoHandle, plain: &[u8]) -> Result<Vec<u8>> {
        let mut entries = self.entries.write();
        let material = entries
            .get_mut(&handle.0)
            .ok_or_else(|| Error::PreconditionNotMet(format!("unknown crypto handle {}", handle.0)))?;
        let protected = seal(material, plain)?;
        if material.note_block_encoded() {
            log::debug!(
                "[security] {} rotated to session {}",
                handle.0,
                material.session_id
            );
        }
        Ok(protected)
    }

    fn decode(&self, handle: CryptoHandle, protected: &[u8]) -> Result<Vec<u8>> {
        let entries = self.entries.read();
        let material = entries
            .get(&handle.0)
            .ok_or_else(|| Error::PreconditionNotMet(format!("unknown crypto handle {}", handle.0)))?;
        open(material, protected)
    }

    fn unregister(&self, handle: CryptoHandle) -> bool {
        let removed = self.entries.write().remove(&handle.0).is_some();
        if removed {
            log::trace!("[security] unregistered {}", handle.0);
        }
        removed
    }
}

impl std::fmt::Debug for KeyMaterialTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterialTable")
            .field("entries", &self.len())
            .field("max_blocks_per_session", &self.max_blocks_per_session)
            .finish()
    }
}

// ============================================================================
// Backend selection
// ============================================================================

#[cfg(feature = "security")]
fn generate_master_key() -> Result<Option<[u8; 32]>> {
    crypto::generate_master_key().map(Some)
}

#[cfg(not(feature = "security"))]
fn generate_master_key() -> Result<Option<[u8; 32]>> {
    Ok(None)
}

#[cfg(feature = "security")]
fn derive_session_key(master: Option<&[u8; 32]>, session_id: u32) -> Option<[u8; 32]> {
    let master = master?;
    match crypto::derive_session_key(master, session_id) {
        Ok(key) => Some(key),
        Err(e) => {
            log::error!("[security] session key derivation failed: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "security"))]
fn derive_session_key(_master: Option<&[u8; 32]>, _session_id: u32) -> Option<[u8; 32]> {
    None
}

#[cfg(feature = "security")]
fn seal(material: &KeyMaterial, plain: &[u8]) -> Result<Vec<u8>> {
    let key = material
        .session_key
        .as_ref()
        .ok_or_else(|| Error::InvalidState("no session key".into()))?;
    crypto::seal(key, material.session_id, plain)
}

#[cfg(not(feature = "security"))]
fn seal(_material: &KeyMaterial, _plain: &[u8]) -> Result<Vec<u8>> {
    Err(Error::Unsupported("built without the security feature".into()))
}

#[cfg(feature = "security")]
fn open(material: &KeyMaterial, protected: &[u8]) -> Result<Vec<u8>> {
    let master = material
        .master_key
        .as_ref()
        .ok_or_else(|| Error::InvalidState("no master key".into()))?;
    crypto::open(master, protected)
}

#[cfg(not(feature = "security"))]
fn open(_material: &KeyMaterial, _protected: &[u8]) -> Result<Vec<u8>> {
    Err(Error::Unsupported("built without the security feature".into()))
}

#[cfg(feature = "security")]
fn wipe(key: &mut Option<[u8; 32]>) {
    use zeroize::Zeroize;
    if let Some(k) = key.as_mut() {
        k.zeroize();
    }
}

#[cfg(not(feature = "security"))]
fn wipe(key: &mut Option<[u8; 32]>) {
    *key = None;
}
