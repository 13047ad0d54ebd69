// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot AES-256-GCM and AES-256-GMAC transforms.
//!
//! GMAC is GCM with the data fed as additional authenticated data and an
//! empty ciphertext: only the 16-byte tag is produced. The IV is supplied
//! by the session engine (session id || IV suffix), never generated here.

use ring::aead::{
    Aad, BoundKey, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey, AES_256_GCM,
};
use ring::error::Unspecified;

use super::wire::MAC_LEN;
use crate::error::{SecurityError, SecurityResult};

/// Single-use nonce sequence for ring's BoundKey API.
///
/// Nonces are constructed by the session engine, one per message; the
/// sequence yields it once and fails on any further advance.
struct OneShotNonce {
    nonce: Option<[u8; 12]>,
}

impl OneShotNonce {
    fn new(nonce: [u8; 12]) -> Self {
        Self { nonce: Some(nonce) }
    }
}

impl NonceSequence for OneShotNonce {
    fn advance(&mut self) -> Result<Nonce, Unspecified> {
        let bytes = self.nonce.take().ok_or(Unspecified)?;
        Nonce::try_assume_unique_for_key(&bytes)
    }
}

fn sealing_key(key: &[u8], iv: [u8; 12]) -> SecurityResult<SealingKey<OneShotNonce>> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| SecurityError::new(-1, 0, "AES-256-GCM key setup failed"))?;
    Ok(SealingKey::new(unbound, OneShotNonce::new(iv)))
}

fn opening_key(key: &[u8], iv: [u8; 12]) -> SecurityResult<OpeningKey<OneShotNonce>> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| SecurityError::new(-1, 0, "AES-256-GCM key setup failed"))?;
    Ok(OpeningKey::new(unbound, OneShotNonce::new(iv)))
}

/// Encrypt `plain`, returning the ciphertext and the 16-byte tag.
pub(crate) fn encrypt(
    key: &[u8],
    iv: [u8; 12],
    plain: &[u8],
) -> SecurityResult<(Vec<u8>, [u8; MAC_LEN])> {
    let mut sealing = sealing_key(key, iv)?;
    let mut in_out = plain.to_vec();
    let tag = sealing
        .seal_in_place_separate_tag(Aad::empty(), &mut in_out)
        .map_err(|_| SecurityError::new(-1, 0, "AES-256-GCM encryption failed"))?;
    let mut mac = [0u8; MAC_LEN];
    mac.copy_from_slice(tag.as_ref());
    Ok((in_out, mac))
}

/// Authenticate `data` without encrypting it (GMAC), returning the tag.
pub(crate) fn authtag(key: &[u8], iv: [u8; 12], data: &[u8]) -> SecurityResult<[u8; MAC_LEN]> {
    let mut sealing = sealing_key(key, iv)?;
    let tag = sealing
        .seal_in_place_separate_tag(Aad::from(data), &mut [])
        .map_err(|_| SecurityError::new(-1, 0, "AES-256-GMAC tag computation failed"))?;
    let mut mac = [0u8; MAC_LEN];
    mac.copy_from_slice(tag.as_ref());
    Ok(mac)
}

/// Decrypt `ciphertext` and verify the tag.
pub(crate) fn decrypt(
    key: &[u8],
    iv: [u8; 12],
    ciphertext: &[u8],
    mac: &[u8; MAC_LEN],
) -> SecurityResult<Vec<u8>> {
    let mut opening = opening_key(key, iv)?;
    let mut in_out = Vec::with_capacity(ciphertext.len() + MAC_LEN);
    in_out.extend_from_slice(ciphertext);
    in_out.extend_from_slice(mac);
    let plain_len = opening
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| {
            SecurityError::new(
                -1,
                0,
                "AES-256-GCM decryption failed (authentication tag mismatch)",
            )
        })?
        .len();
    in_out.truncate(plain_len);
    Ok(in_out)
}

/// Verify a GMAC tag over `data`.
pub(crate) fn verify(
    key: &[u8],
    iv: [u8; 12],
    data: &[u8],
    mac: &[u8; MAC_LEN],
) -> SecurityResult<()> {
    let mut opening = opening_key(key, iv)?;
    let mut tag = mac.to_vec();
    opening
        .open_in_place(Aad::from(data), &mut tag)
        .map_err(|_| SecurityError::new(-1, 0, "AES-256-GMAC verification failed"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];
    const IV: [u8; 12] = [7; 12];

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let plain = b"protected submessage content";
        let (ciphertext, mac) = encrypt(&KEY, IV, plain).unwrap();
        assert_eq!(ciphertext.len(), plain.len());
        assert_ne!(&ciphertext[..], &plain[..]);

        let decrypted = decrypt(&KEY, IV, &ciphertext, &mac).unwrap();
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn test_decrypt_tampered_ciphertext_fails() {
        let (mut ciphertext, mac) = encrypt(&KEY, IV, b"payload").unwrap();
        ciphertext[0] ^= 0x01;
        assert!(decrypt(&KEY, IV, &ciphertext, &mac).is_err());
    }

    #[test]
    fn test_decrypt_tampered_tag_fails() {
        let (ciphertext, mut mac) = encrypt(&KEY, IV, b"payload").unwrap();
        mac[15] ^= 0x80;
        assert!(decrypt(&KEY, IV, &ciphertext, &mac).is_err());
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let (ciphertext, mac) = encrypt(&KEY, IV, b"payload").unwrap();
        let other = [0xFF; 32];
        assert!(decrypt(&other, IV, &ciphertext, &mac).is_err());
    }

    #[test]
    fn test_gmac_verify_roundtrip() {
        let data = b"authenticated, not encrypted";
        let mac = authtag(&KEY, IV, data).unwrap();
        verify(&KEY, IV, data, &mac).unwrap();
    }

    #[test]
    fn test_gmac_verify_bitflip_fails() {
        let data = b"authenticated, not encrypted";
        let mac = authtag(&KEY, IV, data).unwrap();

        let mut flipped = data.to_vec();
        flipped[3] ^= 0x01;
        assert!(verify(&KEY, IV, &flipped, &mac).is_err());

        let mut bad_mac = mac;
        bad_mac[0] ^= 0x01;
        assert!(verify(&KEY, IV, data, &bad_mac).is_err());
    }

    #[test]
    fn test_gmac_differs_per_iv() {
        let data = b"same data";
        let mac_a = authtag(&KEY, IV, data).unwrap();
        let mac_b = authtag(&KEY, [8; 12], data).unwrap();
        assert_ne!(mac_a, mac_b);
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(encrypt(&KEY[..16], IV, b"x").is_err());
    }
}
