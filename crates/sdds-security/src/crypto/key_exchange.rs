// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Key exchange: the crypto token codec and the volatile endpoint
//! key-agreement path (DDS Security v1.1 Sec.8.5.1.7-8.5.1.8, Sec.9.5.2).
//!
//! Master keys travel between matched participants and endpoints as
//! `DDS:Crypto:AES_GCM_GMAC` tokens; transport is up to the caller. The
//! built-in volatile discovery endpoints never exchange tokens: both sides
//! derive the same key from the authentication challenges and shared
//! secret.

use ring::{digest, hmac};

use super::key_material::{KeyMaterial, CRYPTO_TRANSFORMATION_KIND_AES256_GCM};
use super::CryptoBuiltin;
use crate::cdr::{CdrReader, CdrWriter};
use crate::error::{SecurityError, SecurityResult};
use crate::types::{
    BinaryProperty, CryptoToken, DatareaderCryptoHandle, DatawriterCryptoHandle,
    ParticipantCryptoHandle, SharedSecretHandle, HANDLE_NIL,
};

/// Class id of every token this plugin emits or accepts.
pub const CRYPTO_TOKEN_CLASS_ID: &str = "DDS:Crypto:AES_GCM_GMAC";

/// Name of the single binary property carrying the CDR-encoded key material.
pub const TOKEN_KEYMAT_NAME: &str = "dds.cryp.keymat";

/// Derivation cookies, 16 bytes each, NUL excluded.
const KX_SALT_COOKIE: &[u8; 16] = b"keyexchange salt";
const KX_KEY_COOKIE: &[u8; 16] = b"key exchange key";

/// One leg of the volatile key agreement: HMAC-SHA256 over the shared
/// secret, keyed by SHA-256(prefix || cookie || suffix).
fn kx_digest(prefix: &[u8], cookie: &[u8; 16], suffix: &[u8], shared_secret: &[u8]) -> Vec<u8> {
    let mut ctx = digest::Context::new(&digest::SHA256);
    ctx.update(prefix);
    ctx.update(cookie);
    ctx.update(suffix);
    let hashed = ctx.finish();

    let key = hmac::Key::new(hmac::HMAC_SHA256, hashed.as_ref());
    hmac::sign(&key, shared_secret).as_ref().to_vec()
}

/// Derive the master key for a matched volatile endpoint pair.
///
/// Both sides of the match compute the same material: the salt from
/// challenge1/challenge2 and the sender key with the challenges swapped.
pub(super) fn make_volatile_key(shared: &SharedSecretHandle) -> KeyMaterial {
    KeyMaterial {
        transformation_kind: [0, 0, 0, CRYPTO_TRANSFORMATION_KIND_AES256_GCM],
        master_salt: kx_digest(
            shared.challenge1(),
            KX_SALT_COOKIE,
            shared.challenge2(),
            shared.shared_secret(),
        ),
        sender_key_id: [0; 4],
        master_sender_key: kx_digest(
            shared.challenge2(),
            KX_KEY_COOKIE,
            shared.challenge1(),
            shared.shared_secret(),
        ),
        receiver_specific_key_id: [0; 4],
        master_receiver_specific_key: Vec::new(),
    }
}

/// Serialize a key list into crypto tokens, one token per key.
pub(crate) fn keys_to_tokens(keys: &[KeyMaterial]) -> Vec<CryptoToken> {
    keys.iter()
        .map(|key| {
            let mut w = CdrWriter::new();
            key.write_cdr(&mut w);
            CryptoToken {
                class_id: CRYPTO_TOKEN_CLASS_ID.to_string(),
                binary_properties: vec![BinaryProperty {
                    name: TOKEN_KEYMAT_NAME.to_string(),
                    value: w.into_vec(),
                    propagate: true,
                }],
            }
        })
        .collect()
}

/// Parse a token sequence back into a key list.
///
/// Tokens with a foreign class id or without the key-material property are
/// dropped, as is any token whose property fails to parse.
pub(crate) fn tokens_to_keys(tokens: &[CryptoToken]) -> Vec<KeyMaterial> {
    let mut keys = Vec::new();
    for token in tokens {
        if token.class_id != CRYPTO_TOKEN_CLASS_ID {
            continue;
        }
        let Some(prop) = token
            .binary_properties
            .iter()
            .find(|p| p.name == TOKEN_KEYMAT_NAME)
        else {
            continue;
        };
        match KeyMaterial::read_cdr(&mut CdrReader::new(&prop.value)) {
            Ok(key) => keys.push(key),
            Err(err) => {
                log::warn!("[security] dropping malformed crypto token: {}", err);
            }
        }
    }
    keys
}

impl CryptoBuiltin {
    /// Tokens for the local participant's keys, to be sent to a matched
    /// remote participant. Participants without keys yield an empty list.
    pub fn create_local_participant_crypto_tokens(
        &self,
        local_participant_crypto: ParticipantCryptoHandle,
        remote_participant_crypto: ParticipantCryptoHandle,
    ) -> SecurityResult<Vec<CryptoToken>> {
        if local_participant_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid local participant handle"));
        }
        if remote_participant_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid remote participant handle"));
        }
        let st = self.state.lock();
        Ok(st
            .keys
            .get(&local_participant_crypto)
            .map(|keys| keys_to_tokens(keys))
            .unwrap_or_default())
    }

    /// Install the key list received from a matched remote participant.
    pub fn set_remote_participant_crypto_tokens(
        &self,
        local_participant_crypto: ParticipantCryptoHandle,
        remote_participant_crypto: ParticipantCryptoHandle,
        remote_participant_tokens: &[CryptoToken],
    ) -> SecurityResult<()> {
        if local_participant_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid local participant handle"));
        }
        if remote_participant_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid remote participant handle"));
        }
        let mut st = self.state.lock();
        st.keys.insert(
            remote_participant_crypto,
            tokens_to_keys(remote_participant_tokens),
        );
        Ok(())
    }

    /// Tokens for a local datawriter's keys, to be sent to a matched
    /// remote datareader.
    pub fn create_local_datawriter_crypto_tokens(
        &self,
        local_datawriter_crypto: DatawriterCryptoHandle,
        remote_datareader_crypto: DatareaderCryptoHandle,
    ) -> SecurityResult<Vec<CryptoToken>> {
        if local_datawriter_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid local writer handle"));
        }
        if remote_datareader_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid remote reader handle"));
        }
        let st = self.state.lock();
        Ok(st
            .keys
            .get(&local_datawriter_crypto)
            .map(|keys| keys_to_tokens(keys))
            .unwrap_or_default())
    }

    /// Install the key list received from a matched remote datawriter.
    pub fn set_remote_datawriter_crypto_tokens(
        &self,
        local_datareader_crypto: DatareaderCryptoHandle,
        remote_datawriter_crypto: DatawriterCryptoHandle,
        remote_datawriter_tokens: &[CryptoToken],
    ) -> SecurityResult<()> {
        if local_datareader_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid local datareader handle"));
        }
        if remote_datawriter_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid remote datawriter handle"));
        }
        let mut st = self.state.lock();
        st.keys.insert(
            remote_datawriter_crypto,
            tokens_to_keys(remote_datawriter_tokens),
        );
        Ok(())
    }

    /// Tokens for a local datareader's keys, to be sent to a matched
    /// remote datawriter.
    pub fn create_local_datareader_crypto_tokens(
        &self,
        local_datareader_crypto: DatareaderCryptoHandle,
        remote_datawriter_crypto: DatawriterCryptoHandle,
    ) -> SecurityResult<Vec<CryptoToken>> {
        if local_datareader_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid local reader handle"));
        }
        if remote_datawriter_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid remote writer handle"));
        }
        let st = self.state.lock();
        Ok(st
            .keys
            .get(&local_datareader_crypto)
            .map(|keys| keys_to_tokens(keys))
            .unwrap_or_default())
    }

    /// Install the key list received from a matched remote datareader.
    pub fn set_remote_datareader_crypto_tokens(
        &self,
        local_datawriter_crypto: DatawriterCryptoHandle,
        remote_datareader_crypto: DatareaderCryptoHandle,
        remote_datareader_tokens: &[CryptoToken],
    ) -> SecurityResult<()> {
        if local_datawriter_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid local datawriter handle"));
        }
        if remote_datareader_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid remote datareader handle"));
        }
        let mut st = self.state.lock();
        st.keys.insert(
            remote_datareader_crypto,
            tokens_to_keys(remote_datareader_tokens),
        );
        Ok(())
    }

    /// Tokens are plain data in this plugin; returning them is a no-op.
    pub fn return_crypto_tokens(&self, _tokens: &[CryptoToken]) -> SecurityResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_material::make_key;

    fn shared_secret() -> SharedSecretHandle {
        SharedSecretHandle::new(vec![0x01; 32], vec![0x02; 32], vec![0x5A; 32])
    }

    #[test]
    fn test_token_roundtrip_single() {
        let key = make_key(5, true).unwrap();
        let tokens = keys_to_tokens(std::slice::from_ref(&key));
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].class_id, CRYPTO_TOKEN_CLASS_ID);
        assert_eq!(tokens[0].binary_properties.len(), 1);
        assert!(tokens[0].binary_properties[0].propagate);

        let keys = tokens_to_keys(&tokens);
        assert_eq!(keys, vec![key]);
    }

    #[test]
    fn test_token_roundtrip_preserves_order() {
        let originals = vec![
            make_key(1, true).unwrap(),
            make_key(2, false).unwrap(),
            make_key(3, true).unwrap(),
        ];
        let tokens = keys_to_tokens(&originals);
        assert_eq!(tokens_to_keys(&tokens), originals);
    }

    #[test]
    fn test_foreign_class_id_dropped() {
        let key = make_key(5, true).unwrap();
        let mut tokens = keys_to_tokens(std::slice::from_ref(&key));
        tokens[0].class_id = "DDS:Auth:PKI-DH".to_string();
        assert!(tokens_to_keys(&tokens).is_empty());
    }

    #[test]
    fn test_missing_property_dropped() {
        let tokens = vec![CryptoToken {
            class_id: CRYPTO_TOKEN_CLASS_ID.to_string(),
            binary_properties: Vec::new(),
        }];
        assert!(tokens_to_keys(&tokens).is_empty());
    }

    #[test]
    fn test_malformed_property_dropped() {
        let key = make_key(5, true).unwrap();
        let mut tokens = keys_to_tokens(std::slice::from_ref(&key));
        tokens[0].binary_properties[0].value.truncate(10);
        assert!(tokens_to_keys(&tokens).is_empty());
    }

    #[test]
    fn test_volatile_key_lengths() {
        let key = make_volatile_key(&shared_secret());
        assert_eq!(key.master_salt.len(), 32);
        assert_eq!(key.master_sender_key.len(), 32);
        assert_eq!(
            key.transformation_kind,
            [0, 0, 0, CRYPTO_TRANSFORMATION_KIND_AES256_GCM]
        );
        assert_eq!(key.sender_key_id, [0; 4]);
    }

    #[test]
    fn test_volatile_key_deterministic_and_salt_differs_from_key() {
        let a = make_volatile_key(&shared_secret());
        let b = make_volatile_key(&shared_secret());
        assert_eq!(a, b);
        assert_ne!(a.master_salt, a.master_sender_key);
    }

    #[test]
    fn test_volatile_key_sensitive_to_challenges() {
        let base = make_volatile_key(&shared_secret());
        let swapped = make_volatile_key(&SharedSecretHandle::new(
            vec![0x02; 32],
            vec![0x01; 32],
            vec![0x5A; 32],
        ));
        assert_ne!(base.master_sender_key, swapped.master_sender_key);
    }
}
