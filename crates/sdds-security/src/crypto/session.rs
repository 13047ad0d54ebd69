// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-sender session state for the AES-GCM/GMAC transforms.
//!
//! Each (crypto handle, key index) pair owns one session: a 4-byte session
//! id, an 8-byte IV suffix, a block counter, and the session key derived
//! from the master key by HMAC-SHA256. A session covers at most
//! `MAX_BLOCKS_PER_SESSION` 16-byte plaintext blocks before the id rotates
//! and the key is re-derived.

use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroize;

use super::key_material::{KeyMaterial, BLOCK_LEN_BYTES, MAX_BLOCKS_PER_SESSION};
use super::wire::CryptoHeader;
use crate::error::{SecurityError, SecurityResult};

/// Derivation cookie, NUL excluded.
const SESSION_KEY_COOKIE: &[u8] = b"SessionKey";

/// Mutable session state. Created lazily on first use of a key.
#[derive(Default)]
pub(crate) struct Session {
    id: [u8; 4],
    iv_suffix: [u8; 8],
    key: Vec<u8>,
    counter: u32,
}

impl Session {
    /// Sender side: advance the session for one outgoing message of
    /// `plain_len` bytes. Creates the session on first use, rotates the
    /// session id when the block budget would be exceeded, and otherwise
    /// increments the IV suffix.
    pub fn prepare(&mut self, master: &KeyMaterial, plain_len: usize) -> SecurityResult<()> {
        let blocks = plain_len.div_ceil(BLOCK_LEN_BYTES) as u32;

        if self.key.is_empty() {
            self.create_key(master)?;
        } else if self.counter + blocks > MAX_BLOCKS_PER_SESSION {
            self.next_id(master)?;
        } else {
            self.inc_iv();
            self.counter += blocks;
        }
        Ok(())
    }

    /// Receiver side: the session key for the header's session id, derived
    /// on demand and cached until the sender rotates.
    pub fn key_for(&mut self, master: &KeyMaterial, header: &CryptoHeader) -> Vec<u8> {
        if !self.key.is_empty() && self.id == header.session_id {
            return self.key.clone();
        }
        self.id = header.session_id;
        self.derive_key(master);
        self.key.clone()
    }

    pub fn id(&self) -> [u8; 4] {
        self.id
    }

    pub fn iv_suffix(&self) -> [u8; 8] {
        self.iv_suffix
    }

    /// The 12-byte GCM IV for the current session state.
    pub fn iv(&self) -> [u8; 12] {
        let mut iv = [0u8; 12];
        iv[..4].copy_from_slice(&self.id);
        iv[4..].copy_from_slice(&self.iv_suffix);
        iv
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    fn create_key(&mut self, master: &KeyMaterial) -> SecurityResult<()> {
        let rng = SystemRandom::new();
        rng.fill(&mut self.id)
            .map_err(|_| SecurityError::new(-1, 0, "session id generation failed"))?;
        rng.fill(&mut self.iv_suffix)
            .map_err(|_| SecurityError::new(-1, 0, "IV suffix generation failed"))?;
        self.derive_key(master);
        self.counter = 0;
        Ok(())
    }

    fn next_id(&mut self, master: &KeyMaterial) -> SecurityResult<()> {
        inc32(&mut self.id);
        SystemRandom::new()
            .fill(&mut self.iv_suffix)
            .map_err(|_| SecurityError::new(-1, 0, "IV suffix generation failed"))?;
        self.derive_key(master);
        self.counter = 0;
        Ok(())
    }

    /// Increment the IV suffix as a little-endian 64-bit integer.
    fn inc_iv(&mut self) {
        let (low, high) = self.iv_suffix.split_at_mut(4);
        if inc32(low) {
            inc32(high);
        }
    }

    /// Session key = first 32 bytes of HMAC-SHA256 keyed by the master
    /// sender key over "SessionKey" || master_salt || session_id.
    fn derive_key(&mut self, master: &KeyMaterial) {
        let hmac_key = hmac::Key::new(hmac::HMAC_SHA256, &master.master_sender_key);
        let mut ctx = hmac::Context::with_key(&hmac_key);
        ctx.update(SESSION_KEY_COOKIE);
        ctx.update(&master.master_salt);
        ctx.update(&self.id);
        let tag = ctx.sign();

        self.key.zeroize();
        self.key = tag.as_ref().to_vec();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Increment a little-endian counter in place; true on wrap-around.
fn inc32(bytes: &mut [u8]) -> bool {
    for b in bytes.iter_mut() {
        if *b != 0xFF {
            *b += 1;
            return false;
        }
        *b = 0;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_material::make_key;

    #[test]
    fn test_inc32_simple() {
        let mut bytes = [0, 0, 0, 0];
        assert!(!inc32(&mut bytes));
        assert_eq!(bytes, [1, 0, 0, 0]);
    }

    #[test]
    fn test_inc32_carry() {
        let mut bytes = [0xFF, 0, 0, 0];
        assert!(!inc32(&mut bytes));
        assert_eq!(bytes, [0, 1, 0, 0]);
    }

    #[test]
    fn test_inc32_wraps() {
        let mut bytes = [0xFF; 4];
        assert!(inc32(&mut bytes));
        assert_eq!(bytes, [0; 4]);
    }

    #[test]
    fn test_first_prepare_creates_session() {
        let master = make_key(1, true).unwrap();
        let mut sess = Session::default();
        assert!(sess.key().is_empty());
        sess.prepare(&master, 100).unwrap();
        assert_eq!(sess.key().len(), 32);
        assert_eq!(sess.counter, 0);
    }

    #[test]
    fn test_prepare_increments_iv_and_counter() {
        let master = make_key(1, true).unwrap();
        let mut sess = Session::default();
        sess.prepare(&master, 16).unwrap();
        let first_iv = sess.iv_suffix();
        let id = sess.id();

        sess.prepare(&master, 16).unwrap();
        assert_eq!(sess.id(), id);
        assert_eq!(sess.counter, 1);
        assert_eq!(
            u64::from_le_bytes(sess.iv_suffix()),
            u64::from_le_bytes(first_iv).wrapping_add(1)
        );
    }

    #[test]
    fn test_prepare_rotates_after_block_budget() {
        let master = make_key(1, true).unwrap();
        let mut sess = Session::default();
        let full_session = MAX_BLOCKS_PER_SESSION as usize * BLOCK_LEN_BYTES;

        sess.prepare(&master, full_session).unwrap();
        let id = sess.id();
        let key = sess.key().to_vec();

        // Second message fills the budget exactly; no rotation yet.
        sess.prepare(&master, full_session).unwrap();
        assert_eq!(sess.id(), id);
        assert_eq!(sess.counter, MAX_BLOCKS_PER_SESSION);

        // Third message exceeds the budget: id increments, key re-derives.
        sess.prepare(&master, 16).unwrap();
        let mut expected = id;
        inc32(&mut expected);
        assert_eq!(sess.id(), expected);
        assert_ne!(sess.key(), key.as_slice());
        assert_eq!(sess.counter, 0);
    }

    #[test]
    fn test_derive_key_is_deterministic_per_session_id() {
        let master = make_key(1, true).unwrap();
        let mut a = Session::default();
        let mut b = Session::default();
        let header = CryptoHeader {
            session_id: [9, 9, 9, 9],
            ..CryptoHeader::default()
        };
        assert_eq!(a.key_for(&master, &header), b.key_for(&master, &header));
    }

    #[test]
    fn test_key_for_rederives_on_session_change() {
        let master = make_key(1, true).unwrap();
        let mut sess = Session::default();
        let header_a = CryptoHeader {
            session_id: [1, 0, 0, 0],
            ..CryptoHeader::default()
        };
        let header_b = CryptoHeader {
            session_id: [2, 0, 0, 0],
            ..CryptoHeader::default()
        };
        let key_a = sess.key_for(&master, &header_a);
        let key_b = sess.key_for(&master, &header_b);
        assert_ne!(key_a, key_b);
        // Cached when the id is unchanged.
        assert_eq!(sess.key_for(&master, &header_b), key_b);
    }
}
