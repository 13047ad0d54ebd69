// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Built-in cryptographic plugin for DDS Security v1.1 (Sec.8.5, Sec.9.5).
//!
//! Implements the `DDS:Crypto:AES_GCM_GMAC` transformations: AES-256-GCM
//! authenticated encryption and AES-256-GMAC authentication-only protection
//! of RTPS submessages and serialized payloads, with per-session key
//! derivation and the SEC_PREFIX / SEC_BODY / SEC_POSTFIX wire framing.
//!
//! # Architecture
//!
//! ```text
//! CryptoBuiltin
//! +-- key factory    register/unregister participants and endpoints
//! +-- key exchange   crypto token codec, volatile key agreement
//! +-- transform      encode/decode pipelines (payload + submessage)
//! ```
//!
//! All registry state lives behind one mutex owned by the plugin instance;
//! callers share the instance and handles issued by it. Sessions for a
//! given sender handle are advanced under that mutex, so concurrent
//! encoders on the *same* handle serialize inside the plugin.
//!
//! # Unsupported
//!
//! Whole-message RTPS protection is rejected at participant registration;
//! the rtps-message encode/decode operations are identity transforms.
//! Origin authentication (receiver-specific MACs) is not implemented.

pub mod key_material;

mod aes_gcm;
mod decode;
mod encode;
mod key_exchange;
mod session;
mod wire;


pub use key_material::{
    KeyMaterial, CRYPTO_TRANSFORMATION_KIND_AES128_GCM, CRYPTO_TRANSFORMATION_KIND_AES128_GMAC,
    CRYPTO_TRANSFORMATION_KIND_AES256_GCM, CRYPTO_TRANSFORMATION_KIND_AES256_GMAC,
    CRYPTO_TRANSFORMATION_KIND_NONE, SDDS_VENDOR_ID,
};
pub use key_exchange::{CRYPTO_TOKEN_CLASS_ID, TOKEN_KEYMAT_NAME};
pub use wire::{CryptoFooter, CryptoHeader};

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::error::{SecurityError, SecurityResult};
use crate::types::{
    CryptoHandle, DatareaderCryptoHandle, DatawriterCryptoHandle, EndpointSecurityAttributes,
    IdentityHandle, ParticipantCryptoHandle, ParticipantSecurityAttributes, PermissionsHandle,
    Property, SharedSecretHandle, HANDLE_NIL,
};
use session::Session;

/// Property naming the built-in endpoint an endpoint registration is for.
const BUILTIN_ENDPOINT_NAME_PROPERTY: &str = "dds.sec.builtin_endpoint_name";
const VOLATILE_WRITER_NAME: &str = "BuiltinParticipantVolatileMessageSecureWriter";
const VOLATILE_READER_NAME: &str = "BuiltinParticipantVolatileMessageSecureReader";

/// Debug switches for the crypto plugin.
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoDebug {
    /// Skip the cipher and pass plaintext through the encrypted framing.
    /// Framing tests only; GMAC tags are still computed.
    pub fake_encryption: bool,
}

/// Which side of the exchange a registered entity handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityCategory {
    DatawriterSubmessage,
    DatareaderSubmessage,
}

#[derive(Debug, Clone, Copy)]
struct EntityInfo {
    category: EntityCategory,
    handle: CryptoHandle,
}

/// Registry state, all guarded by the plugin mutex.
struct RegistryState {
    next_handle: CryptoHandle,
    /// Ordered key list per handle. For local writers index 0 is the
    /// submessage key and index 1, when present, the payload key.
    keys: BTreeMap<CryptoHandle, Vec<KeyMaterial>>,
    /// Entities registered under each (local or remote) participant.
    participant_to_entity: BTreeMap<ParticipantCryptoHandle, Vec<EntityInfo>>,
    /// Protection options recorded at endpoint registration.
    encrypt_options: BTreeMap<CryptoHandle, EndpointSecurityAttributes>,
    /// Lazily created session state per (handle, key index).
    sessions: BTreeMap<(CryptoHandle, usize), Session>,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            next_handle: 1,
            keys: BTreeMap::new(),
            participant_to_entity: BTreeMap::new(),
            encrypt_options: BTreeMap::new(),
            sessions: BTreeMap::new(),
        }
    }

    fn alloc_handle(&mut self) -> CryptoHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    /// Remove every registry entry owned by `handle`: its key list, its
    /// options, its sessions, and its appearances under any participant.
    fn clear_endpoint_data(&mut self, handle: CryptoHandle) {
        self.keys.remove(&handle);
        self.encrypt_options.remove(&handle);
        for entities in self.participant_to_entity.values_mut() {
            entities.retain(|e| e.handle != handle);
        }
        self.sessions.retain(|(h, _), _| *h != handle);
    }
}

/// Built-in AES-GCM/GMAC cryptographic plugin.
///
/// One instance owns the process-wide key registry. All operations take
/// `&self`; interior state is mutex-protected.
pub struct CryptoBuiltin {
    state: Mutex<RegistryState>,
    debug: CryptoDebug,
}

impl CryptoBuiltin {
    pub fn new() -> Self {
        Self::with_debug(CryptoDebug::default())
    }

    pub fn with_debug(debug: CryptoDebug) -> Self {
        Self {
            state: Mutex::new(RegistryState::new()),
            debug,
        }
    }

    fn generate_handle(&self) -> CryptoHandle {
        self.state.lock().alloc_handle()
    }

    // ------------------------------------------------------------------
    // Key factory
    // ------------------------------------------------------------------

    /// Register the local participant. No key material is created for
    /// participants in this built-in profile.
    pub fn register_local_participant(
        &self,
        participant_identity: IdentityHandle,
        participant_permissions: PermissionsHandle,
        _participant_properties: &[Property],
        participant_security_attributes: &ParticipantSecurityAttributes,
    ) -> SecurityResult<ParticipantCryptoHandle> {
        if participant_identity == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid local participant ID"));
        }
        if participant_permissions == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid local permissions"));
        }
        if participant_security_attributes.is_rtps_protected {
            return Err(SecurityError::new(-1, 0, "RTPS protection is unsupported"));
        }
        Ok(self.generate_handle())
    }

    /// Register a matched remote participant. Its keys arrive later via
    /// `set_remote_participant_crypto_tokens`.
    pub fn register_matched_remote_participant(
        &self,
        local_participant_crypto: ParticipantCryptoHandle,
        remote_participant_identity: IdentityHandle,
        remote_participant_permissions: PermissionsHandle,
        shared_secret: &SharedSecretHandle,
    ) -> SecurityResult<ParticipantCryptoHandle> {
        if local_participant_crypto == HANDLE_NIL {
            return Err(SecurityError::new(
                -1,
                0,
                "Invalid local participant crypto handle",
            ));
        }
        if remote_participant_identity == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid remote participant ID"));
        }
        if remote_participant_permissions == HANDLE_NIL {
            return Err(SecurityError::new(
                -1,
                0,
                "Invalid remote participant permissions",
            ));
        }
        if shared_secret.shared_secret().is_empty() {
            return Err(SecurityError::new(-1, 0, "Invalid Shared Secret data"));
        }
        Ok(self.generate_handle())
    }

    /// Register a local datawriter, creating its master keys.
    ///
    /// Built-in volatile writers get the placeholder entry instead; their
    /// real key is derived when a remote reader is matched. Otherwise a
    /// submessage key (index 0) and/or payload key (index 1) is created
    /// per the security attributes.
    pub fn register_local_datawriter(
        &self,
        participant_crypto: ParticipantCryptoHandle,
        properties: &[Property],
        security_attributes: &EndpointSecurityAttributes,
    ) -> SecurityResult<DatawriterCryptoHandle> {
        if participant_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid Participant Crypto Handle"));
        }

        let handle = self.generate_handle();
        let plugin_attrs = security_attributes.plugin_endpoint_attributes;
        let mut keys = Vec::new();

        if is_builtin_volatile(properties) {
            keys.push(key_material::make_volatile_placeholder());
        } else {
            // Key list ordering is part of the contract: the submessage
            // key, when present, occupies index 0.
            let mut used_handle = false;
            if security_attributes.is_submessage_protected {
                let key = key_material::make_key(
                    handle,
                    plugin_attrs & crate::types::FLAG_IS_SUBMESSAGE_ENCRYPTED != 0,
                )?;
                log::debug!(
                    "[security] created submessage key id={:?} for local datawriter {}",
                    key.sender_key_id,
                    handle
                );
                keys.push(key);
                used_handle = true;
            }
            if security_attributes.is_payload_protected {
                let key_id = if used_handle {
                    self.generate_handle()
                } else {
                    handle
                };
                let key = key_material::make_key(
                    key_id,
                    plugin_attrs & crate::types::FLAG_IS_PAYLOAD_ENCRYPTED != 0,
                )?;
                log::debug!(
                    "[security] created payload key id={:?} for local datawriter {}",
                    key.sender_key_id,
                    handle
                );
                keys.push(key);
            }
        }

        let mut st = self.state.lock();
        st.keys.insert(handle, keys);
        st.participant_to_entity
            .entry(participant_crypto)
            .or_default()
            .push(EntityInfo {
                category: EntityCategory::DatawriterSubmessage,
                handle,
            });
        st.encrypt_options.insert(handle, *security_attributes);

        Ok(handle)
    }

    /// Register a remote datareader matched to a local datawriter.
    ///
    /// When the local writer is a built-in volatile endpoint, the reader's
    /// key is derived here from the authentication shared secret.
    pub fn register_matched_remote_datareader(
        &self,
        local_datawriter_crypto: DatawriterCryptoHandle,
        remote_participant_crypto: ParticipantCryptoHandle,
        shared_secret: &SharedSecretHandle,
        _relay_only: bool,
    ) -> SecurityResult<DatareaderCryptoHandle> {
        if local_datawriter_crypto == HANDLE_NIL {
            return Err(SecurityError::new(
                -1,
                0,
                "Invalid Local DataWriter Crypto Handle",
            ));
        }
        if remote_participant_crypto == HANDLE_NIL {
            return Err(SecurityError::new(
                -1,
                0,
                "Invalid Remote Participant Crypto Handle",
            ));
        }
        if shared_secret.shared_secret().is_empty() {
            return Err(SecurityError::new(-1, 0, "Invalid Shared Secret Handle"));
        }

        let handle = self.generate_handle();
        let mut st = self.state.lock();
        let Some(dw_keys) = st.keys.get(&local_datawriter_crypto) else {
            return Err(SecurityError::new(
                -1,
                0,
                "Invalid Local DataWriter Crypto Handle",
            ));
        };

        if dw_keys.len() == 1 && key_material::is_volatile_placeholder(&dw_keys[0]) {
            let key = key_exchange::make_volatile_key(shared_secret);
            if key.master_salt.is_empty() || key.master_sender_key.is_empty() {
                return Err(SecurityError::new(
                    -1,
                    0,
                    "Couldn't create key for volatile remote reader",
                ));
            }
            log::debug!(
                "[security] created volatile key for remote datareader {}",
                handle
            );
            st.keys.insert(handle, vec![key]);
        }

        let options = st
            .encrypt_options
            .get(&local_datawriter_crypto)
            .copied()
            .unwrap_or_default();
        st.participant_to_entity
            .entry(remote_participant_crypto)
            .or_default()
            .push(EntityInfo {
                category: EntityCategory::DatareaderSubmessage,
                handle,
            });
        st.encrypt_options.insert(handle, options);
        Ok(handle)
    }

    /// Register a local datareader, creating its submessage key.
    /// Readers never generate a payload key.
    pub fn register_local_datareader(
        &self,
        participant_crypto: ParticipantCryptoHandle,
        properties: &[Property],
        security_attributes: &EndpointSecurityAttributes,
    ) -> SecurityResult<DatareaderCryptoHandle> {
        if participant_crypto == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid Participant Crypto Handle"));
        }

        let handle = self.generate_handle();
        let plugin_attrs = security_attributes.plugin_endpoint_attributes;
        let mut keys = Vec::new();

        if is_builtin_volatile(properties) {
            keys.push(key_material::make_volatile_placeholder());
        } else if security_attributes.is_submessage_protected {
            let key = key_material::make_key(
                handle,
                plugin_attrs & crate::types::FLAG_IS_SUBMESSAGE_ENCRYPTED != 0,
            )?;
            log::debug!(
                "[security] created submessage key id={:?} for local datareader {}",
                key.sender_key_id,
                handle
            );
            keys.push(key);
        }

        let mut st = self.state.lock();
        st.keys.insert(handle, keys);
        st.participant_to_entity
            .entry(participant_crypto)
            .or_default()
            .push(EntityInfo {
                category: EntityCategory::DatareaderSubmessage,
                handle,
            });
        st.encrypt_options.insert(handle, *security_attributes);

        Ok(handle)
    }

    /// Register a remote datawriter matched to a local datareader.
    pub fn register_matched_remote_datawriter(
        &self,
        local_datareader_crypto: DatareaderCryptoHandle,
        remote_participant_crypto: ParticipantCryptoHandle,
        shared_secret: &SharedSecretHandle,
    ) -> SecurityResult<DatawriterCryptoHandle> {
        if local_datareader_crypto == HANDLE_NIL {
            return Err(SecurityError::new(
                -1,
                0,
                "Invalid Local DataReader Crypto Handle",
            ));
        }
        if remote_participant_crypto == HANDLE_NIL {
            return Err(SecurityError::new(
                -1,
                0,
                "Invalid Remote Participant Crypto Handle",
            ));
        }
        if shared_secret.shared_secret().is_empty() {
            return Err(SecurityError::new(-1, 0, "Invalid Shared Secret Handle"));
        }

        let handle = self.generate_handle();
        let mut st = self.state.lock();
        let Some(dr_keys) = st.keys.get(&local_datareader_crypto) else {
            return Err(SecurityError::new(
                -1,
                0,
                "Invalid Local DataReader Crypto Handle",
            ));
        };

        if dr_keys.len() == 1 && key_material::is_volatile_placeholder(&dr_keys[0]) {
            let key = key_exchange::make_volatile_key(shared_secret);
            if key.master_salt.is_empty() || key.master_sender_key.is_empty() {
                return Err(SecurityError::new(
                    -1,
                    0,
                    "Couldn't create key for volatile remote writer",
                ));
            }
            log::debug!(
                "[security] created volatile key for remote datawriter {}",
                handle
            );
            st.keys.insert(handle, vec![key]);
        }

        let options = st
            .encrypt_options
            .get(&local_datareader_crypto)
            .copied()
            .unwrap_or_default();
        st.participant_to_entity
            .entry(remote_participant_crypto)
            .or_default()
            .push(EntityInfo {
                category: EntityCategory::DatawriterSubmessage,
                handle,
            });
        st.encrypt_options.insert(handle, options);
        Ok(handle)
    }

    /// Unregister a participant, removing every registry entry keyed by
    /// the handle, including entities still listed under it.
    pub fn unregister_participant(
        &self,
        participant_crypto_handle: ParticipantCryptoHandle,
    ) -> SecurityResult<()> {
        if participant_crypto_handle == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid Crypto Handle"));
        }
        let mut st = self.state.lock();
        st.participant_to_entity.remove(&participant_crypto_handle);
        st.clear_endpoint_data(participant_crypto_handle);
        Ok(())
    }

    /// Unregister a datawriter and erase its keys, options, and sessions.
    pub fn unregister_datawriter(
        &self,
        datawriter_crypto_handle: DatawriterCryptoHandle,
    ) -> SecurityResult<()> {
        if datawriter_crypto_handle == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid Crypto Handle"));
        }
        self.state.lock().clear_endpoint_data(datawriter_crypto_handle);
        Ok(())
    }

    /// Unregister a datareader and erase its keys, options, and sessions.
    pub fn unregister_datareader(
        &self,
        datareader_crypto_handle: DatareaderCryptoHandle,
    ) -> SecurityResult<()> {
        if datareader_crypto_handle == HANDLE_NIL {
            return Err(SecurityError::new(-1, 0, "Invalid Crypto Handle"));
        }
        self.state.lock().clear_endpoint_data(datareader_crypto_handle);
        Ok(())
    }
}

impl Default for CryptoBuiltin {
    fn default() -> Self {
        Self::new()
    }
}

fn is_builtin_volatile(properties: &[Property]) -> bool {
    for prop in properties {
        if prop.name == BUILTIN_ENDPOINT_NAME_PROPERTY {
            return prop.value == VOLATILE_WRITER_NAME || prop.value == VOLATILE_READER_NAME;
        }
    }
    false
}
