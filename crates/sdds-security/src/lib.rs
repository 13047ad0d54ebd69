// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # SDDS Security - built-in DDS Security crypto plugin
//!
//! The `DDS:Crypto:AES_GCM_GMAC` cryptographic transform core for the SDDS
//! RTPS stack: AES-256-GCM authenticated encryption and AES-256-GMAC
//! authentication-only protection of RTPS submessages and serialized
//! payloads, per OMG DDS Security v1.1 Sec.8.5 / Sec.9.5.
//!
//! ## Quick Start
//!
//! ```rust
//! use sdds_security::{CryptoBuiltin, EndpointSecurityAttributes, FLAG_IS_PAYLOAD_ENCRYPTED};
//! use sdds_security::{ParticipantSecurityAttributes, SecurityResult};
//!
//! fn main() -> SecurityResult<()> {
//!     let plugin = CryptoBuiltin::new();
//!
//!     let participant = plugin.register_local_participant(
//!         1, 1, &[], &ParticipantSecurityAttributes::default())?;
//!
//!     let writer = plugin.register_local_datawriter(
//!         participant,
//!         &[],
//!         &EndpointSecurityAttributes {
//!             is_payload_protected: true,
//!             plugin_endpoint_attributes: FLAG_IS_PAYLOAD_ENCRYPTED,
//!             ..EndpointSecurityAttributes::default()
//!         },
//!     )?;
//!
//!     let encoded = plugin.encode_serialized_payload(b"sample", writer)?;
//!     let decoded = plugin.decode_serialized_payload(&encoded, 0, writer)?;
//!     assert_eq!(decoded, b"sample");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +------------------------------------------------------------------+
//! |                    Security plugin suite (external)              |
//! |   Authentication (handshake, SharedSecret) | Access Control      |
//! +------------------------------------------------------------------+
//! |                        CryptoBuiltin (this crate)                |
//! |   key factory | key exchange (tokens, volatile) | transforms     |
//! +------------------------------------------------------------------+
//! |   ring (AES-256-GCM, HMAC-SHA256, SHA-256, SystemRandom)         |
//! +------------------------------------------------------------------+
//! ```
//!
//! The identity/permissions handshake, token transport, and RTPS
//! serialization of application data are external collaborators; this
//! crate owns the key registry, the per-session key engine, and the
//! bit-exact SEC_PREFIX / SEC_BODY / SEC_POSTFIX wire framing.
//!
//! ## See Also
//!
//! - [DDS Security v1.1](https://www.omg.org/spec/DDS-SECURITY/1.1/)
//! - [RTPS v2.5](https://www.omg.org/spec/DDSI-RTPS/2.5/)

/// Big-endian CDR cursors for the crypto wire structures.
mod cdr;
/// The built-in AES-GCM/GMAC crypto plugin.
pub mod crypto;
/// Structured security exception type.
pub mod error;
/// RTPS secure submessage constants and header codec.
pub mod rtps;
/// Handle, attribute, and token types.
pub mod types;

pub use crypto::{CryptoBuiltin, CryptoDebug, CryptoFooter, CryptoHeader, KeyMaterial};
pub use error::{SecurityError, SecurityResult};
pub use types::{
    BinaryProperty, CryptoHandle, CryptoToken, DatareaderCryptoHandle, DatawriterCryptoHandle,
    EndpointSecurityAttributes, IdentityHandle, ParticipantCryptoHandle,
    ParticipantSecurityAttributes, PermissionsHandle, Property, SecureSubmessageCategory,
    SharedSecretHandle, FLAG_IS_PAYLOAD_ENCRYPTED, FLAG_IS_SUBMESSAGE_ENCRYPTED, HANDLE_NIL,
};
