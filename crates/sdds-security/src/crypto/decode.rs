// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Decode pipelines: sender-key lookup for inbound secure submessages,
//! submessage unwrapping, and serialized-payload decryption (DDS Security
//! v1.1 Sec.8.5.1.9.6-8.5.1.9.9).

use super::key_material::{
    self, KeyMaterial, CRYPTO_TRANSFORMATION_KIND_AES256_GCM,
    CRYPTO_TRANSFORMATION_KIND_AES256_GMAC, TRANSFORM_KIND_INDEX,
};
use super::session::Session;
use super::wire::{CryptoFooter, CryptoHeader, CRYPTO_HEADER_LENGTH};
use super::{aes_gcm, CryptoBuiltin, EntityCategory};
use crate::cdr::CdrReader;
use crate::error::{SecurityError, SecurityResult};
use crate::rtps::{SubmessageHeader, RTPS_SUBMSG_HEADER_SIZE};
use crate::types::{
    CryptoHandle, DatareaderCryptoHandle, DatawriterCryptoHandle, ParticipantCryptoHandle,
    SecureSubmessageCategory, HANDLE_NIL,
};

impl CryptoBuiltin {
    /// Locate the sending entity for an inbound secure submessage.
    ///
    /// Parses the SEC_PREFIX crypto header and scans the entities
    /// registered under the sending participant for a key whose transform
    /// identifier matches; the first match decides whether a datawriter or
    /// datareader sent the submessage.
    pub fn preprocess_secure_submessage(
        &self,
        encoded_rtps_submessage: &[u8],
        receiving_participant_crypto: ParticipantCryptoHandle,
        sending_participant_crypto: ParticipantCryptoHandle,
    ) -> SecurityResult<SecureSubmessageCategory> {
        if receiving_participant_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid Receiving Participant"));
        }
        if sending_participant_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid Sending Participant"));
        }

        let mut r = CdrReader::new(encoded_rtps_submessage);
        let _prefix = SubmessageHeader::read(&mut r)?;
        let ch = CryptoHeader::read_cdr(&mut r)?;

        let st = self.state.lock();
        if let Some(entities) = st.participant_to_entity.get(&sending_participant_crypto) {
            for entity in entities {
                let Some(keyseq) = st.keys.get(&entity.handle) else {
                    continue;
                };
                if keyseq.iter().any(|key| key_material::matches(key, &ch)) {
                    log::debug!(
                        "[security] matched transform id to sending entity {}",
                        entity.handle
                    );
                    return Ok(match entity.category {
                        EntityCategory::DatawriterSubmessage => {
                            SecureSubmessageCategory::DatawriterSubmessage(entity.handle)
                        }
                        EntityCategory::DatareaderSubmessage => {
                            SecureSubmessageCategory::DatareaderSubmessage(entity.handle)
                        }
                    });
                }
            }
        }

        Err(SecurityError::new(
            -2,
            1,
            format!(
                "Crypto Key not registered: kind {:02x?} key id {:02x?}",
                ch.transformation_kind, ch.transformation_key_id
            ),
        ))
    }

    /// Unwrap and verify one secure submessage from `sender_handle`.
    fn decode_submessage(
        &self,
        encoded_rtps_submessage: &[u8],
        sender_handle: CryptoHandle,
    ) -> SecurityResult<Vec<u8>> {
        let mut r = CdrReader::new(encoded_rtps_submessage);
        let prefix = SubmessageHeader::read(&mut r)?;
        let ch = CryptoHeader::read_cdr(&mut r)?;
        let trailing = (prefix.octets_to_next as usize)
            .checked_sub(CRYPTO_HEADER_LENGTH)
            .ok_or_else(|| SecurityError::new(-1, 0, "malformed SEC_PREFIX submessage"))?;
        r.skip(trailing)?;

        // The next submessage is SEC_BODY when encrypting, or the wrapped
        // plaintext submessage itself in authentication-only mode.
        let body_header_offset = r.offset();
        let body = SubmessageHeader::read(&mut r)?;
        let footer_offset = r.offset() + body.octets_to_next as usize;
        if footer_offset > encoded_rtps_submessage.len() {
            return Err(SecurityError::new(-1, 0, "truncated secure submessage"));
        }

        let mut post = CdrReader::new(&encoded_rtps_submessage[footer_offset..]);
        let _postfix = SubmessageHeader::read(&mut post)?;
        let footer = CryptoFooter::read_cdr(&mut post)?;

        let mut st = self.state.lock();
        let st = &mut *st;
        let Some(keyseq) = st.keys.get(&sender_handle) else {
            return Err(SecurityError::new(-2, 1, "Crypto Key not found"));
        };

        for (idx, key) in keyseq.iter().enumerate() {
            if !key_material::matches(key, &ch) {
                continue;
            }
            let sess = st.sessions.entry((sender_handle, idx)).or_default();
            if key_material::encrypts(key) {
                let n = r.read_u32()? as usize;
                let ciphertext = r.read_bytes(n)?;
                return self.decrypt_with(key, sess, ciphertext, &ch, &footer);
            } else if key_material::authenticates(key) {
                let end = body_header_offset + RTPS_SUBMSG_HEADER_SIZE + body.octets_to_next as usize;
                let data = &encoded_rtps_submessage[body_header_offset..end];
                return self.verify_with(key, sess, data, &ch, &footer);
            } else {
                return Err(SecurityError::new(-2, 2, "Key transform kind unrecognized"));
            }
        }

        Err(SecurityError::new(-2, 1, "Crypto Key not found"))
    }

    /// Unwrap a secure submessage sent by a remote datawriter.
    ///
    /// The receiving reader handle may be nil: origin authentication is
    /// not implemented, so the writer's key alone verifies the MAC.
    pub fn decode_datawriter_submessage(
        &self,
        encoded_rtps_submessage: &[u8],
        receiving_datareader_crypto: DatareaderCryptoHandle,
        sending_datawriter_crypto: DatawriterCryptoHandle,
    ) -> SecurityResult<Vec<u8>> {
        if sending_datawriter_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid Datawriter handle"));
        }
        log::debug!(
            "[security] decode datawriter submessage: sender {} receiver {}",
            sending_datawriter_crypto,
            receiving_datareader_crypto
        );
        self.decode_submessage(encoded_rtps_submessage, sending_datawriter_crypto)
    }

    /// Unwrap a secure submessage sent by a remote datareader.
    pub fn decode_datareader_submessage(
        &self,
        encoded_rtps_submessage: &[u8],
        receiving_datawriter_crypto: DatawriterCryptoHandle,
        sending_datareader_crypto: DatareaderCryptoHandle,
    ) -> SecurityResult<Vec<u8>> {
        if sending_datareader_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid Datareader handle"));
        }
        log::debug!(
            "[security] decode datareader submessage: sender {} receiver {}",
            sending_datareader_crypto,
            receiving_datawriter_crypto
        );
        self.decode_submessage(encoded_rtps_submessage, sending_datareader_crypto)
    }

    /// Decrypt a protected serialized payload from `sending_datawriter_crypto`.
    ///
    /// Writers that do not protect payloads pass the buffer through.
    /// Authentication-only payload keys are rejected: the payload would
    /// travel in the clear with only a MAC, which this profile forbids.
    pub fn decode_serialized_payload(
        &self,
        encoded_buffer: &[u8],
        receiving_datareader_crypto: DatareaderCryptoHandle,
        sending_datawriter_crypto: DatawriterCryptoHandle,
    ) -> SecurityResult<Vec<u8>> {
        if sending_datawriter_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid Datawriter handle"));
        }
        log::debug!(
            "[security] decode serialized payload: sender {} receiver {}",
            sending_datawriter_crypto,
            receiving_datareader_crypto
        );

        let mut st = self.state.lock();
        let st = &mut *st;
        let payload_protected = st
            .encrypt_options
            .get(&sending_datawriter_crypto)
            .map(|o| o.is_payload_protected)
            .unwrap_or(false);
        if !payload_protected {
            return Ok(encoded_buffer.to_vec());
        }

        let mut r = CdrReader::new(encoded_buffer);
        let ch = CryptoHeader::read_cdr(&mut r)?;

        let Some(keyseq) = st.keys.get(&sending_datawriter_crypto) else {
            return Err(SecurityError::new(-3, 1, "Crypto Key not found"));
        };

        for (idx, key) in keyseq.iter().enumerate() {
            if !key_material::matches(key, &ch) {
                continue;
            }
            let sess = st
                .sessions
                .entry((sending_datawriter_crypto, idx))
                .or_default();
            if key_material::encrypts(key) {
                let n = r.read_u32()? as usize;
                let ciphertext = r.read_bytes(n)?;
                let footer = CryptoFooter::read_cdr(&mut r)?;
                return self.decrypt_with(key, sess, ciphertext, &ch, &footer);
            } else if key_material::authenticates(key) {
                return Err(SecurityError::new(
                    -3,
                    3,
                    "Auth-only payload transformation not supported",
                ));
            } else {
                return Err(SecurityError::new(-3, 2, "Key transform kind unrecognized"));
            }
        }

        Err(SecurityError::new(-3, 1, "Crypto Key not found"))
    }

    /// Whole-message RTPS protection is unsupported; decode is identity.
    pub fn decode_rtps_message(
        &self,
        encoded_buffer: &[u8],
        receiving_participant_crypto: ParticipantCryptoHandle,
        sending_participant_crypto: ParticipantCryptoHandle,
    ) -> SecurityResult<Vec<u8>> {
        if receiving_participant_crypto == HANDLE_NIL {
            return Err(SecurityError::new(
                -1,
                0,
                "Invalid Receiving Participant handle",
            ));
        }
        if sending_participant_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "No Sending Participant handle"));
        }
        Ok(encoded_buffer.to_vec())
    }

    /// Restore or derive the session key named by the header, then decrypt.
    fn decrypt_with(
        &self,
        master: &KeyMaterial,
        sess: &mut Session,
        ciphertext: &[u8],
        header: &CryptoHeader,
        footer: &CryptoFooter,
    ) -> SecurityResult<Vec<u8>> {
        let sess_key = sess.key_for(master, header);
        if sess_key.is_empty() {
            return Err(SecurityError::new(-1, 0, "no session key"));
        }
        if master.transformation_kind[TRANSFORM_KIND_INDEX] != CRYPTO_TRANSFORMATION_KIND_AES256_GCM
        {
            log::warn!(
                "[security] decrypt: unsupported transformation kind {}",
                master.transformation_kind[TRANSFORM_KIND_INDEX]
            );
            return Err(SecurityError::new(-1, 0, "unsupported transformation kind"));
        }

        if self.debug.fake_encryption {
            return Ok(ciphertext.to_vec());
        }

        aes_gcm::decrypt(&sess_key, header.iv(), ciphertext, &footer.common_mac)
    }

    /// Restore or derive the session key, verify the GMAC tag over `data`,
    /// and return the verified bytes.
    fn verify_with(
        &self,
        master: &KeyMaterial,
        sess: &mut Session,
        data: &[u8],
        header: &CryptoHeader,
        footer: &CryptoFooter,
    ) -> SecurityResult<Vec<u8>> {
        let sess_key = sess.key_for(master, header);
        if sess_key.is_empty() {
            return Err(SecurityError::new(-1, 0, "no session key"));
        }
        if master.transformation_kind[TRANSFORM_KIND_INDEX]
            != CRYPTO_TRANSFORMATION_KIND_AES256_GMAC
        {
            log::warn!(
                "[security] verify: unsupported transformation kind {}",
                master.transformation_kind[TRANSFORM_KIND_INDEX]
            );
            return Err(SecurityError::new(-1, 0, "unsupported transformation kind"));
        }

        aes_gcm::verify(&sess_key, header.iv(), data, &footer.common_mac)?;
        Ok(data.to_vec())
    }
}
