// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! AES-GCM/GMAC key material (DDS Security v1.1 Sec.9.5.2.1.1).
//!
//! A `KeyMaterial` record holds one 256-bit master key together with the
//! transformation kind that selects the algorithm, the sender key id that
//! names it on the wire, and the (unused in this profile) receiver-specific
//! fields kept for wire compatibility.

use crate::cdr::{CdrReader, CdrWriter};
use crate::error::{SecurityError, SecurityResult};
use crate::types::CryptoHandle;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroize;

use super::wire::CryptoHeader;

/// No transformation.
pub const CRYPTO_TRANSFORMATION_KIND_NONE: u8 = 0;
/// AES-128 in GMAC (authentication-only) mode.
pub const CRYPTO_TRANSFORMATION_KIND_AES128_GMAC: u8 = 1;
/// AES-128 in GCM (authenticated encryption) mode.
pub const CRYPTO_TRANSFORMATION_KIND_AES128_GCM: u8 = 2;
/// AES-256 in GMAC (authentication-only) mode.
pub const CRYPTO_TRANSFORMATION_KIND_AES256_GMAC: u8 = 3;
/// AES-256 in GCM (authenticated encryption) mode.
pub const CRYPTO_TRANSFORMATION_KIND_AES256_GCM: u8 = 4;

/// Index of the algorithm-selecting byte within the 4-byte kind field.
pub(crate) const TRANSFORM_KIND_INDEX: usize = 3;

/// RTPS vendor id of this implementation. The volatile placeholder key is
/// the only registry entry whose kind carries these vendor bytes.
pub const SDDS_VENDOR_ID: [u8; 2] = [0x01, 0xAB];

/// Master key and salt length for real traffic keys.
pub(crate) const KEY_LEN_BYTES: usize = 32;
/// AES block length; sessions count plaintext in these units.
pub(crate) const BLOCK_LEN_BYTES: usize = 16;
/// Block budget of one session before the session id rotates.
pub(crate) const MAX_BLOCKS_PER_SESSION: u32 = 1024;

/// One master key record, as exchanged in crypto tokens.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct KeyMaterial {
    pub transformation_kind: [u8; 4],
    pub master_salt: Vec<u8>,
    pub sender_key_id: [u8; 4],
    pub master_sender_key: Vec<u8>,
    pub receiver_specific_key_id: [u8; 4],
    pub master_receiver_specific_key: Vec<u8>,
}

impl KeyMaterial {
    /// Big-endian CDR serialization used by the token codec.
    pub(crate) fn write_cdr(&self, w: &mut CdrWriter) {
        w.write_bytes(&self.transformation_kind);
        write_octet_seq(w, &self.master_salt);
        w.write_bytes(&self.sender_key_id);
        write_octet_seq(w, &self.master_sender_key);
        w.write_bytes(&self.receiver_specific_key_id);
        write_octet_seq(w, &self.master_receiver_specific_key);
    }

    pub(crate) fn read_cdr(r: &mut CdrReader<'_>) -> SecurityResult<Self> {
        Ok(Self {
            transformation_kind: r.read_array()?,
            master_salt: read_octet_seq(r)?,
            sender_key_id: r.read_array()?,
            master_sender_key: read_octet_seq(r)?,
            receiver_specific_key_id: r.read_array()?,
            master_receiver_specific_key: read_octet_seq(r)?,
        })
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.master_salt.zeroize();
        self.master_sender_key.zeroize();
        self.master_receiver_specific_key.zeroize();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key bytes stay out of logs.
        f.debug_struct("KeyMaterial")
            .field("transformation_kind", &self.transformation_kind)
            .field("sender_key_id", &self.sender_key_id)
            .field("master_salt_len", &self.master_salt.len())
            .field("master_sender_key_len", &self.master_sender_key.len())
            .finish()
    }
}

fn write_octet_seq(w: &mut CdrWriter, bytes: &[u8]) {
    w.write_u32(bytes.len() as u32);
    w.write_bytes(bytes);
}

fn read_octet_seq(r: &mut CdrReader<'_>) -> SecurityResult<Vec<u8>> {
    let n = r.read_u32()? as usize;
    Ok(r.read_bytes(n)?.to_vec())
}

/// Create a fresh random master key named `key_id`, GCM when `encrypt`.
pub(crate) fn make_key(key_id: CryptoHandle, encrypt: bool) -> SecurityResult<KeyMaterial> {
    let rng = SystemRandom::new();
    let mut salt = vec![0u8; KEY_LEN_BYTES];
    rng.fill(&mut salt)
        .map_err(|_| SecurityError::new(-1, 0, "master salt generation failed"))?;
    let mut key = vec![0u8; KEY_LEN_BYTES];
    rng.fill(&mut key)
        .map_err(|_| SecurityError::new(-1, 0, "master key generation failed"))?;

    let kind = if encrypt {
        CRYPTO_TRANSFORMATION_KIND_AES256_GCM
    } else {
        CRYPTO_TRANSFORMATION_KIND_AES256_GMAC
    };

    Ok(KeyMaterial {
        transformation_kind: [0, 0, 0, kind],
        master_salt: salt,
        sender_key_id: (key_id as u32).to_le_bytes(),
        master_sender_key: key,
        receiver_specific_key_id: [0; 4],
        master_receiver_specific_key: Vec::new(),
    })
}

/// Sentinel stored for a built-in volatile endpoint at registration time.
///
/// Not an actual key: it marks the handle so the real key can be derived
/// from the authentication shared secret when the endpoint is matched.
pub(crate) fn make_volatile_placeholder() -> KeyMaterial {
    KeyMaterial {
        transformation_kind: [SDDS_VENDOR_ID[0], SDDS_VENDOR_ID[1], 0, 1],
        master_salt: Vec::new(),
        sender_key_id: [0; 4],
        master_sender_key: Vec::new(),
        receiver_specific_key_id: [0; 4],
        master_receiver_specific_key: Vec::new(),
    }
}

pub(crate) fn is_volatile_placeholder(key: &KeyMaterial) -> bool {
    key.transformation_kind == [SDDS_VENDOR_ID[0], SDDS_VENDOR_ID[1], 0, 1]
}

/// True when the kind selects an authenticated-encryption (GCM) transform.
pub(crate) fn encrypts(key: &KeyMaterial) -> bool {
    let kind = &key.transformation_kind;
    kind[0] == 0
        && kind[1] == 0
        && kind[2] == 0
        && (kind[TRANSFORM_KIND_INDEX] == CRYPTO_TRANSFORMATION_KIND_AES128_GCM
            || kind[TRANSFORM_KIND_INDEX] == CRYPTO_TRANSFORMATION_KIND_AES256_GCM)
}

/// True when the kind selects an authentication-only (GMAC) transform.
pub(crate) fn authenticates(key: &KeyMaterial) -> bool {
    let kind = &key.transformation_kind;
    kind[0] == 0
        && kind[1] == 0
        && kind[2] == 0
        && (kind[TRANSFORM_KIND_INDEX] == CRYPTO_TRANSFORMATION_KIND_AES128_GMAC
            || kind[TRANSFORM_KIND_INDEX] == CRYPTO_TRANSFORMATION_KIND_AES256_GMAC)
}

/// True when `key` is the one named by the header's transform identifier.
pub(crate) fn matches(key: &KeyMaterial, header: &CryptoHeader) -> bool {
    key.transformation_kind == header.transformation_kind
        && key.sender_key_id == header.transformation_key_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_key_gcm() {
        let key = make_key(7, true).unwrap();
        assert_eq!(
            key.transformation_kind,
            [0, 0, 0, CRYPTO_TRANSFORMATION_KIND_AES256_GCM]
        );
        assert_eq!(key.sender_key_id, [7, 0, 0, 0]);
        assert_eq!(key.master_salt.len(), KEY_LEN_BYTES);
        assert_eq!(key.master_sender_key.len(), KEY_LEN_BYTES);
        assert!(key.master_receiver_specific_key.is_empty());
        assert!(encrypts(&key));
        assert!(!authenticates(&key));
    }

    #[test]
    fn test_make_key_gmac() {
        let key = make_key(0x0102_0304, false).unwrap();
        assert_eq!(
            key.transformation_kind,
            [0, 0, 0, CRYPTO_TRANSFORMATION_KIND_AES256_GMAC]
        );
        assert_eq!(key.sender_key_id, [0x04, 0x03, 0x02, 0x01]);
        assert!(authenticates(&key));
        assert!(!encrypts(&key));
    }

    #[test]
    fn test_volatile_placeholder_is_neither() {
        let placeholder = make_volatile_placeholder();
        assert!(is_volatile_placeholder(&placeholder));
        assert!(!encrypts(&placeholder));
        assert!(!authenticates(&placeholder));
        assert!(placeholder.master_sender_key.is_empty());
    }

    #[test]
    fn test_cdr_roundtrip() {
        let key = make_key(42, true).unwrap();
        let mut w = CdrWriter::new();
        key.write_cdr(&mut w);
        let bytes = w.into_vec();
        // kind(4) + len(4)+salt(32) + id(4) + len(4)+key(32) + id(4) + len(4)
        assert_eq!(bytes.len(), 88);

        let decoded = KeyMaterial::read_cdr(&mut CdrReader::new(&bytes)).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_cdr_truncated_fails() {
        let key = make_key(42, true).unwrap();
        let mut w = CdrWriter::new();
        key.write_cdr(&mut w);
        let bytes = w.into_vec();
        assert!(KeyMaterial::read_cdr(&mut CdrReader::new(&bytes[..40])).is_err());
    }

    #[test]
    fn test_matches_header() {
        let key = make_key(9, true).unwrap();
        let header = CryptoHeader {
            transformation_kind: key.transformation_kind,
            transformation_key_id: key.sender_key_id,
            session_id: [0; 4],
            initialization_vector_suffix: [0; 8],
        };
        assert!(matches(&key, &header));

        let other = make_key(10, true).unwrap();
        assert!(!matches(&other, &header));
    }
}
