// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HKDF session keys and AES-256-GCM payload protection (`ring`).
//!
//! Protected layout:
//!
//! ```text
//! [session_id: u32 LE][nonce: 12 bytes][ciphertext || tag: 16 bytes]
//! ```
//!
//! The session id doubles as additional authenticated data, so a payload
//! cannot be replayed under another session.

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::hkdf::{Salt, HKDF_SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroize;

use crate::dds::{Error, Result};

const SESSION_KEY_INFO: &[u8] = b"rtps-core session key";
const HEADER_LEN: usize = 4 + NONCE_LEN;

fn crypto_error(what: &str) -> Error {
    Error::InvalidState(format!("crypto: {}", what))
}

pub(super) fn generate_master_key() -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    SystemRandom::new()
        .fill(&mut key)
        .map_err(|_| crypto_error("random generator failed"))?;
    Ok(key)
}

pub(super) fn derive_session_key(master: &[u8; 32], session_id: u32) -> Result<[u8; 32]> {
    let salt = Salt::new(HKDF_SHA256, &session_id.to_le_bytes());
    let prk = salt.extract(master);
    let mut key = [0u8; 32];
    prk.expand(&[SESSION_KEY_INFO], HKDF_SHA256)
        .map_err(|_| crypto_error("HKDF expand failed"))?
        .fill(&mut key)
        .map_err(|_| crypto_error("HKDF fill failed"))?;
    Ok(key)
}

pub(super) fn seal(session_key: &[u8; 32], session_id: u32, plain: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| crypto_error("random generator failed"))?;
    let key = LessSafeKey::new(
        UnboundKey::new(&AES_256_GCM, session_key).map_err(|_| crypto_error("bad key"))?,
    );

    let header = session_id.to_le_bytes();
    let mut in_out = plain.to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce),
        Aad::from(header),
        &mut in_out,
    )
    .map_err(|_| crypto_error("seal failed"))?;

    let mut out = Vec::with_capacity(HEADER_LEN + in_out.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&in_out);
    Ok(out)
}

pub(super) fn open(master: &[u8; 32], protected: &[u8]) -> Result<Vec<u8>> {
    if protected.len() < HEADER_LEN {
        return Err(Error::BadParameter("protected payload too short".into()));
    }
    let mut header = [0u8; 4];
    header.copy_from_slice(&protected[..4]);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&protected[4..HEADER_LEN]);

    let mut session_key = derive_session_key(master, u32::from_le_bytes(header))?;
    let key = LessSafeKey::new(
        UnboundKey::new(&AES_256_GCM, &session_key).map_err(|_| crypto_error("bad key"))?,
    );
    session_key.zeroize();

    let mut in_out = protected[HEADER_LEN..].to_vec();
    let plain_len = key
        .open_in_place(Nonce::assume_unique_for_key(nonce), Aad::from(header), &mut in_out)
        .map_err(|_| Error::BadParameter("authentication failed".into()))?
        .len();
    in_out.truncate(plain_len);
    Ok(in_out)
}
