// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crypto Header and Crypto Footer wire structures (DDS Security v1.1
//! Sec.9.5.2.3-9.5.2.5), big-endian CDR on the wire.

use crate::cdr::{CdrReader, CdrWriter};
use crate::error::{SecurityError, SecurityResult};

/// Serialized CryptoHeader size: transform identifier (8) + session id (4)
/// + IV suffix (8).
pub(crate) const CRYPTO_HEADER_LENGTH: usize = 20;

/// Serialized CryptoFooter size: common MAC (16) + receiver-specific MAC
/// count (4).
pub(crate) const CRYPTO_FOOTER_LENGTH: usize = 20;

/// Length of the GCM authentication tag.
pub(crate) const MAC_LEN: usize = 16;

/// Framing prefix naming the key and session used for one transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CryptoHeader {
    pub transformation_kind: [u8; 4],
    pub transformation_key_id: [u8; 4],
    pub session_id: [u8; 4],
    pub initialization_vector_suffix: [u8; 8],
}

impl CryptoHeader {
    pub(crate) fn write_cdr(&self, w: &mut CdrWriter) {
        w.write_bytes(&self.transformation_kind);
        w.write_bytes(&self.transformation_key_id);
        w.write_bytes(&self.session_id);
        w.write_bytes(&self.initialization_vector_suffix);
    }

    pub(crate) fn read_cdr(r: &mut CdrReader<'_>) -> SecurityResult<Self> {
        Ok(Self {
            transformation_kind: r.read_array()?,
            transformation_key_id: r.read_array()?,
            session_id: r.read_array()?,
            initialization_vector_suffix: r.read_array()?,
        })
    }

    /// The 12-byte GCM IV named by this header: session id then IV suffix.
    pub(crate) fn iv(&self) -> [u8; 12] {
        let mut iv = [0u8; 12];
        iv[..4].copy_from_slice(&self.session_id);
        iv[4..].copy_from_slice(&self.initialization_vector_suffix);
        iv
    }
}

/// Framing suffix carrying the common authentication tag.
///
/// The receiver-specific MAC list is always empty in this profile; the
/// zero count is still serialized for wire compatibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CryptoFooter {
    pub common_mac: [u8; MAC_LEN],
}

impl CryptoFooter {
    pub(crate) fn write_cdr(&self, w: &mut CdrWriter) {
        w.write_bytes(&self.common_mac);
        w.write_u32(0);
    }

    pub(crate) fn read_cdr(r: &mut CdrReader<'_>) -> SecurityResult<Self> {
        let common_mac: [u8; MAC_LEN] = r.read_array()?;
        let receiver_specific_count = r.read_u32()?;
        if receiver_specific_count != 0 {
            return Err(SecurityError::new(
                -1,
                0,
                "receiver-specific MACs not supported",
            ));
        }
        Ok(Self { common_mac })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = CryptoHeader {
            transformation_kind: [0, 0, 0, 4],
            transformation_key_id: [1, 0, 0, 0],
            session_id: [0xAA; 4],
            initialization_vector_suffix: [0xBB; 8],
        };
        let mut w = CdrWriter::new();
        header.write_cdr(&mut w);
        let bytes = w.into_vec();
        assert_eq!(bytes.len(), CRYPTO_HEADER_LENGTH);
        assert_eq!(&bytes[..4], &[0, 0, 0, 4]);
        assert_eq!(&bytes[8..12], &[0xAA; 4]);

        let decoded = CryptoHeader::read_cdr(&mut CdrReader::new(&bytes)).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_header_iv_concatenation() {
        let header = CryptoHeader {
            session_id: [1, 2, 3, 4],
            initialization_vector_suffix: [5, 6, 7, 8, 9, 10, 11, 12],
            ..CryptoHeader::default()
        };
        assert_eq!(header.iv(), [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_footer_roundtrip() {
        let footer = CryptoFooter {
            common_mac: [0xCC; MAC_LEN],
        };
        let mut w = CdrWriter::new();
        footer.write_cdr(&mut w);
        let bytes = w.into_vec();
        assert_eq!(bytes.len(), CRYPTO_FOOTER_LENGTH);
        assert_eq!(&bytes[16..], &[0, 0, 0, 0]);

        let decoded = CryptoFooter::read_cdr(&mut CdrReader::new(&bytes)).unwrap();
        assert_eq!(decoded, footer);
    }

    #[test]
    fn test_footer_rejects_receiver_macs() {
        let mut bytes = vec![0u8; CRYPTO_FOOTER_LENGTH];
        bytes[19] = 1;
        let err = CryptoFooter::read_cdr(&mut CdrReader::new(&bytes)).unwrap_err();
        assert_eq!((err.code, err.minor), (-1, 0));
    }
}
