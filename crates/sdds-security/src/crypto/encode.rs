// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Encode pipelines: serialized-payload protection and the SEC_PREFIX /
//! SEC_BODY / SEC_POSTFIX submessage framing (DDS Security v1.1
//! Sec.8.5.1.9, Sec.9.5.3.3).

use super::key_material::{self, KeyMaterial};
use super::session::Session;
use super::wire::{CryptoFooter, CryptoHeader, CRYPTO_FOOTER_LENGTH, CRYPTO_HEADER_LENGTH};
use super::{aes_gcm, CryptoBuiltin};
use crate::cdr::CdrWriter;
use crate::error::{SecurityError, SecurityResult};
use crate::rtps::{
    SubmessageHeader, RTPS_FLAG_ENDIANNESS, RTPS_SUBMSG_HEADER_SIZE, RTPS_SUBMSG_SEC_BODY,
    RTPS_SUBMSG_SEC_POSTFIX, RTPS_SUBMSG_SEC_PREFIX,
};
use crate::types::{
    DatareaderCryptoHandle, DatawriterCryptoHandle, CryptoHandle, ParticipantCryptoHandle,
    HANDLE_NIL,
};

/// Key index used for submessage protection.
const SUBMSG_KEY_IDX: usize = 0;

impl CryptoBuiltin {
    /// Advance the session and encrypt one buffer, producing the framing
    /// header/footer and the ciphertext.
    fn encrypt_with(
        &self,
        master: &KeyMaterial,
        sess: &mut Session,
        plain: &[u8],
    ) -> SecurityResult<(CryptoHeader, CryptoFooter, Vec<u8>)> {
        sess.prepare(master, plain.len())?;
        let header = CryptoHeader {
            transformation_kind: master.transformation_kind,
            transformation_key_id: master.sender_key_id,
            session_id: sess.id(),
            initialization_vector_suffix: sess.iv_suffix(),
        };

        if self.debug.fake_encryption {
            return Ok((header, CryptoFooter::default(), plain.to_vec()));
        }

        let (ciphertext, mac) = aes_gcm::encrypt(sess.key(), sess.iv(), plain)?;
        Ok((header, CryptoFooter { common_mac: mac }, ciphertext))
    }

    /// Advance the session and MAC one buffer without encrypting it.
    fn authtag_with(
        &self,
        master: &KeyMaterial,
        sess: &mut Session,
        plain: &[u8],
    ) -> SecurityResult<(CryptoHeader, CryptoFooter)> {
        sess.prepare(master, plain.len())?;
        let header = CryptoHeader {
            transformation_kind: master.transformation_kind,
            transformation_key_id: master.sender_key_id,
            session_id: sess.id(),
            initialization_vector_suffix: sess.iv_suffix(),
        };

        let mac = aes_gcm::authtag(sess.key(), sess.iv(), plain)?;
        Ok((header, CryptoFooter { common_mac: mac }))
    }

    /// Protect a serialized payload for a datawriter.
    ///
    /// Writers without a payload key, or with payload protection disabled,
    /// pass the buffer through unchanged. The payload key is index 1 when
    /// the writer also holds a submessage key, index 0 otherwise. Output is
    /// `CryptoHeader`, the length-prefixed ciphertext (encrypting keys
    /// only; GMAC emits the plaintext unprefixed), then `CryptoFooter`.
    pub fn encode_serialized_payload(
        &self,
        plain_buffer: &[u8],
        sending_datawriter_crypto: DatawriterCryptoHandle,
    ) -> SecurityResult<Vec<u8>> {
        if sending_datawriter_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid datawriter handle"));
        }

        let mut st = self.state.lock();
        let st = &mut *st;
        let payload_protected = st
            .encrypt_options
            .get(&sending_datawriter_crypto)
            .map(|o| o.is_payload_protected)
            .unwrap_or(false);
        let keyseq = match st.keys.get(&sending_datawriter_crypto) {
            Some(keys) if payload_protected && !keys.is_empty() => keys,
            _ => return Ok(plain_buffer.to_vec()),
        };

        let key_idx = if keyseq.len() >= 2 { 1 } else { 0 };
        let master = &keyseq[key_idx];
        let sess = st
            .sessions
            .entry((sending_datawriter_crypto, key_idx))
            .or_default();

        let (header, footer, ciphertext) = if key_material::encrypts(master) {
            let (header, footer, ciphertext) = self.encrypt_with(master, sess, plain_buffer)?;
            (header, footer, Some(ciphertext))
        } else if key_material::authenticates(master) {
            let (header, footer) = self.authtag_with(master, sess, plain_buffer)?;
            (header, footer, None)
        } else {
            return Err(SecurityError::new(-1, 0, "Key transform kind unrecognized"));
        };

        let mut w = CdrWriter::with_capacity(
            plain_buffer.len() + CRYPTO_HEADER_LENGTH + CRYPTO_FOOTER_LENGTH + 8,
        );
        header.write_cdr(&mut w);
        match &ciphertext {
            Some(bytes) => {
                w.write_u32(bytes.len() as u32);
                w.write_bytes(bytes);
            }
            None => w.write_bytes(plain_buffer),
        }
        footer.write_cdr(&mut w);
        Ok(w.into_vec())
    }

    /// Wrap one plaintext submessage in the secure submessage triple.
    ///
    /// Senders without keys pass the buffer through. Encrypting keys emit
    /// SEC_BODY with the length-prefixed ciphertext; authentication-only
    /// keys emit the original submessage in place of SEC_BODY, patching a
    /// zero `submessageLength` to the real length first.
    fn encode_submessage(
        &self,
        plain_rtps_submessage: &[u8],
        sender_handle: CryptoHandle,
    ) -> SecurityResult<Vec<u8>> {
        let mut st = self.state.lock();
        let st = &mut *st;
        let keyseq = match st.keys.get(&sender_handle) {
            Some(keys) if !keys.is_empty() => keys,
            _ => return Ok(plain_rtps_submessage.to_vec()),
        };

        let master = &keyseq[SUBMSG_KEY_IDX];
        let sess = st
            .sessions
            .entry((sender_handle, SUBMSG_KEY_IDX))
            .or_default();

        let header;
        let footer;
        let body;
        let auth_only;
        if key_material::encrypts(master) {
            let (h, f, ciphertext) = self.encrypt_with(master, sess, plain_rtps_submessage)?;
            header = h;
            footer = f;
            body = ciphertext;
            auth_only = false;
        } else if key_material::authenticates(master) {
            let patched = patch_zero_submessage_length(plain_rtps_submessage)?;
            let (h, f) = self.authtag_with(master, sess, &patched)?;
            header = h;
            footer = f;
            body = patched;
            auth_only = true;
        } else {
            return Err(SecurityError::new(-1, 0, "Key transform kind unrecognized"));
        }

        let mut w = CdrWriter::with_capacity(body.len() + 3 * RTPS_SUBMSG_HEADER_SIZE + 48);
        SubmessageHeader {
            id: RTPS_SUBMSG_SEC_PREFIX,
            flags: 0,
            octets_to_next: CRYPTO_HEADER_LENGTH as u16,
        }
        .write(&mut w);
        header.write_cdr(&mut w);

        if !auth_only {
            let mut body_octets = 4 + body.len();
            if body.len() % 4 != 0 {
                body_octets += 4 - body.len() % 4;
            }
            SubmessageHeader {
                id: RTPS_SUBMSG_SEC_BODY,
                flags: 0,
                octets_to_next: body_octets as u16,
            }
            .write(&mut w);
            w.write_u32(body.len() as u32);
        }

        w.write_bytes(&body);
        w.align(4);

        SubmessageHeader {
            id: RTPS_SUBMSG_SEC_POSTFIX,
            flags: 0,
            octets_to_next: CRYPTO_FOOTER_LENGTH as u16,
        }
        .write(&mut w);
        footer.write_cdr(&mut w);

        Ok(w.into_vec())
    }

    /// Protect a datawriter submessage for the listed receivers.
    ///
    /// All intended receivers share the writer's key, so the list is
    /// consumed in one step: `receiving_datareader_crypto_list_index` is
    /// advanced to the list length on success. An empty list means "all
    /// associated readers". When the writer is a built-in volatile
    /// endpoint with a single receiver, the receiver's derived key is used
    /// instead of the placeholder.
    pub fn encode_datawriter_submessage(
        &self,
        plain_rtps_submessage: &[u8],
        sending_datawriter_crypto: DatawriterCryptoHandle,
        receiving_datareader_crypto_list: &[DatareaderCryptoHandle],
        receiving_datareader_crypto_list_index: &mut i32,
    ) -> SecurityResult<Vec<u8>> {
        if sending_datawriter_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid DataWriter handle"));
        }
        if *receiving_datareader_crypto_list_index < 0 {
            return Err(SecurityError::new(-1, 0, "Negative list index"));
        }
        let len = receiving_datareader_crypto_list.len() as i32;
        if len != 0 && *receiving_datareader_crypto_list_index >= len {
            return Err(SecurityError::new(-1, 0, "List index too large"));
        }
        if receiving_datareader_crypto_list
            .iter()
            .any(|h| *h == HANDLE_NIL)
        {
            return Err(SecurityError::new(-1, 0, "Invalid DataReader handle in list"));
        }

        let mut encode_handle = sending_datawriter_crypto;
        {
            let st = self.state.lock();
            let submessage_protected = st
                .encrypt_options
                .get(&encode_handle)
                .map(|o| o.is_submessage_protected)
                .unwrap_or(false);
            if !submessage_protected {
                *receiving_datareader_crypto_list_index = len;
                return Ok(plain_rtps_submessage.to_vec());
            }

            if receiving_datareader_crypto_list.len() == 1 {
                if let Some(dw_keys) = st.keys.get(&encode_handle) {
                    if dw_keys.len() == 1 && key_material::is_volatile_placeholder(&dw_keys[0]) {
                        encode_handle = receiving_datareader_crypto_list[0];
                    }
                }
            }
            // Lock dropped before the cipher work below.
        }

        let encoded = self.encode_submessage(plain_rtps_submessage, encode_handle)?;
        *receiving_datareader_crypto_list_index = len;
        Ok(encoded)
    }

    /// Protect a datareader submessage for the listed receivers.
    pub fn encode_datareader_submessage(
        &self,
        plain_rtps_submessage: &[u8],
        sending_datareader_crypto: DatareaderCryptoHandle,
        receiving_datawriter_crypto_list: &[DatawriterCryptoHandle],
    ) -> SecurityResult<Vec<u8>> {
        if sending_datareader_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid DataReader handle"));
        }
        if receiving_datawriter_crypto_list
            .iter()
            .any(|h| *h == HANDLE_NIL)
        {
            return Err(SecurityError::new(-1, 0, "Invalid DataWriter handle in list"));
        }

        let mut encode_handle = sending_datareader_crypto;
        if receiving_datawriter_crypto_list.len() == 1 {
            let st = self.state.lock();
            if let Some(dr_keys) = st.keys.get(&encode_handle) {
                if dr_keys.len() == 1 && key_material::is_volatile_placeholder(&dr_keys[0]) {
                    encode_handle = receiving_datawriter_crypto_list[0];
                }
            }
        }

        self.encode_submessage(plain_rtps_submessage, encode_handle)
    }

    /// Whole-message RTPS protection is unsupported: the message passes
    /// through unchanged and the receiver index is advanced.
    pub fn encode_rtps_message(
        &self,
        plain_rtps_message: &[u8],
        sending_participant_crypto: ParticipantCryptoHandle,
        receiving_participant_crypto_list: &[ParticipantCryptoHandle],
        receiving_participant_crypto_list_index: &mut i32,
    ) -> SecurityResult<Vec<u8>> {
        if sending_participant_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid Sending Participant handle"));
        }
        if receiving_participant_crypto_list.is_empty() {
            return Err(SecurityError::new(-1, 0, "No receiving participants specified"));
        }

        let index = *receiving_participant_crypto_list_index;
        let dest = if index >= 0 && (index as usize) < receiving_participant_crypto_list.len() {
            receiving_participant_crypto_list[index as usize]
        } else {
            HANDLE_NIL
        };
        if dest == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid receiver handle"));
        }

        *receiving_participant_crypto_list_index += 1;
        Ok(plain_rtps_message.to_vec())
    }
}

/// A wrapped submessage may carry `submessageLength == 0`, legal only for
/// the final submessage of an RTPS message. SEC_POSTFIX follows it here,
/// so the real length is patched in, honoring the byte-order flag.
fn patch_zero_submessage_length(plain: &[u8]) -> SecurityResult<Vec<u8>> {
    if plain.len() < RTPS_SUBMSG_HEADER_SIZE {
        return Err(SecurityError::new(-1, 0, "submessage too short to protect"));
    }

    let mut out = plain.to_vec();
    let little_endian = plain[1] & RTPS_FLAG_ENDIANNESS != 0;
    let current = if little_endian {
        u16::from_le_bytes([plain[2], plain[3]])
    } else {
        u16::from_be_bytes([plain[2], plain[3]])
    };

    if current == 0 {
        let actual = (plain.len() - RTPS_SUBMSG_HEADER_SIZE) as u16;
        let bytes = if little_endian {
            actual.to_le_bytes()
        } else {
            actual.to_be_bytes()
        };
        out[2] = bytes[0];
        out[3] = bytes[1];
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_zero_length_little_endian() {
        let mut submsg = vec![0u8; 40];
        submsg[0] = 0x15;
        submsg[1] = 0x01;
        let patched = patch_zero_submessage_length(&submsg).unwrap();
        assert_eq!(patched[2], 36);
        assert_eq!(patched[3], 0);
    }

    #[test]
    fn test_patch_zero_length_big_endian() {
        let mut submsg = vec![0u8; 40];
        submsg[0] = 0x15;
        let patched = patch_zero_submessage_length(&submsg).unwrap();
        assert_eq!(patched[2], 0);
        assert_eq!(patched[3], 36);
    }

    #[test]
    fn test_patch_nonzero_length_untouched() {
        let mut submsg = vec![0u8; 40];
        submsg[1] = 0x01;
        submsg[2] = 36;
        let patched = patch_zero_submessage_length(&submsg).unwrap();
        assert_eq!(patched, submsg);
    }

    #[test]
    fn test_patch_rejects_truncated_header() {
        assert!(patch_zero_submessage_length(&[0x15, 0x01]).is_err());
    }
}
