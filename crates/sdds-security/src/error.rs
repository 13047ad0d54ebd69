// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Security exception type shared by all crypto plugin operations.

use std::fmt;

/// Structured security exception (DDS Security v1.1 Sec.8.3.2.2).
///
/// The built-in crypto plugin uses `code`/`minor` pairs consistently:
/// `-1/0` for handle validation and cipher failures, `-2/1` and `-2/2` for
/// submessage key lookup, `-3/x` for serialized-payload decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityError {
    /// Primary error code.
    pub code: i32,
    /// Minor error code, qualifying `code`.
    pub minor: i32,
    /// Human-readable description.
    pub message: String,
}

impl SecurityError {
    /// Create a new exception record.
    pub fn new(code: i32, minor: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            minor,
            message: message.into(),
        }
    }
}

impl fmt::Display for SecurityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "security error {}/{}: {}",
            self.code, self.minor, self.message
        )
    }
}

impl std::error::Error for SecurityError {}

/// Result type for all security plugin operations.
pub type SecurityResult<T> = Result<T, SecurityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_codes() {
        let err = SecurityError::new(-2, 1, "Crypto Key not found");
        assert_eq!(err.to_string(), "security error -2/1: Crypto Key not found");
    }
}
