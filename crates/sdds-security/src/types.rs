// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handle, attribute, and token types consumed by the crypto plugin.
//!
//! These mirror the DDS Security v1.1 service interfaces: opaque integer
//! handles issued by the plugins, security attributes produced by access
//! control, and the property/token containers exchanged during discovery.

use zeroize::Zeroize;

/// Opaque identifier for a registered participant or endpoint.
///
/// Handles are issued from a monotonically increasing counter and never
/// repeat within a process. Zero is the nil handle.
pub type CryptoHandle = i32;

/// The nil handle value.
pub const HANDLE_NIL: CryptoHandle = 0;

/// Handle for a registered (local or remote) participant.
pub type ParticipantCryptoHandle = CryptoHandle;
/// Handle for a registered (local or remote) datawriter.
pub type DatawriterCryptoHandle = CryptoHandle;
/// Handle for a registered (local or remote) datareader.
pub type DatareaderCryptoHandle = CryptoHandle;
/// Handle issued by the authentication plugin.
pub type IdentityHandle = i32;
/// Handle issued by the access control plugin.
pub type PermissionsHandle = i32;

/// Plugin endpoint attribute: submessages are encrypted, not just signed.
pub const FLAG_IS_SUBMESSAGE_ENCRYPTED: u32 = 0x0000_0001;
/// Plugin endpoint attribute: payloads are encrypted, not just signed.
pub const FLAG_IS_PAYLOAD_ENCRYPTED: u32 = 0x0000_0002;

/// Participant-level security attributes (from access control).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParticipantSecurityAttributes {
    /// Whole-message RTPS protection requested. Unsupported by this plugin;
    /// registration fails when set.
    pub is_rtps_protected: bool,
}

/// Endpoint-level security attributes (from access control).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointSecurityAttributes {
    /// Protect RTPS submessages from this endpoint.
    pub is_submessage_protected: bool,
    /// Protect serialized payloads from this endpoint (writers only).
    pub is_payload_protected: bool,
    /// `FLAG_IS_*_ENCRYPTED` mask selecting GCM over GMAC per scope.
    pub plugin_endpoint_attributes: u32,
}

/// Name/value configuration property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
    pub propagate: bool,
}

/// Name/bytes property carried inside tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryProperty {
    pub name: String,
    pub value: Vec<u8>,
    pub propagate: bool,
}

/// Opaque token exchanged between matched participants or endpoints.
///
/// The crypto plugin emits and accepts `DDS:Crypto:AES_GCM_GMAC` tokens;
/// transport of the token sequences is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoToken {
    pub class_id: String,
    pub binary_properties: Vec<BinaryProperty>,
}

/// Classification of a secure submessage found by the preprocess lookup,
/// carrying the matched sending entity's handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureSubmessageCategory {
    /// SEC_PREFIX protects a datawriter submessage.
    DatawriterSubmessage(DatawriterCryptoHandle),
    /// SEC_PREFIX protects a datareader submessage.
    DatareaderSubmessage(DatareaderCryptoHandle),
}

/// Outcome of the authentication handshake, consumed by the volatile
/// endpoint key-agreement path.
///
/// An empty `shared_secret` is the nil handle; registrations reject it.
#[derive(Clone)]
pub struct SharedSecretHandle {
    challenge1: Vec<u8>,
    challenge2: Vec<u8>,
    shared_secret: Vec<u8>,
}

impl SharedSecretHandle {
    pub fn new(challenge1: Vec<u8>, challenge2: Vec<u8>, shared_secret: Vec<u8>) -> Self {
        Self {
            challenge1,
            challenge2,
            shared_secret,
        }
    }

    pub fn challenge1(&self) -> &[u8] {
        &self.challenge1
    }

    pub fn challenge2(&self) -> &[u8] {
        &self.challenge2
    }

    pub fn shared_secret(&self) -> &[u8] {
        &self.shared_secret
    }
}

impl Drop for SharedSecretHandle {
    fn drop(&mut self) {
        self.shared_secret.zeroize();
    }
}

impl std::fmt::Debug for SharedSecretHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secret bytes stay out of logs; lengths are enough for diagnostics.
        f.debug_struct("SharedSecretHandle")
            .field("challenge1_len", &self.challenge1.len())
            .field("challenge2_len", &self.challenge2.len())
            .field("shared_secret_len", &self.shared_secret.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_secret_debug_redacts() {
        let secret = SharedSecretHandle::new(vec![1; 32], vec![2; 32], vec![0xAB; 32]);
        let printed = format!("{:?}", secret);
        assert_eq!(
            printed,
            "SharedSecretHandle { challenge1_len: 32, challenge2_len: 32, shared_secret_len: 32 }"
        );
    }
}
