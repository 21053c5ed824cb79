// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for veilsql
//!
//! Cipher, parser, policy and configuration failures are all mapped to
//! these variants so callers deal with a single error surface.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all veilsql operations
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum VeilError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Key material error: {message}")]
    KeyMaterial { message: String },

    #[error("Encryption error: {message}")]
    Cipher { message: String },

    #[error("Decryption failed: {message}")]
    Decrypt { message: String },

    #[error("SQL parse error: {message}")]
    Parse { message: String },

    #[error("Unsupported statement: {message}")]
    UnsupportedStatement { message: String },

    #[error("Policy error: {message}")]
    Policy { message: String },

    #[error("Statement execution error: {message}")]
    Execution { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl VeilError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config { message: msg.into() }
    }

    pub fn key(msg: impl Into<String>) -> Self {
        Self::KeyMaterial { message: msg.into() }
    }

    pub fn cipher(msg: impl Into<String>) -> Self {
        Self::Cipher { message: msg.into() }
    }

    pub fn decrypt(msg: impl Into<String>) -> Self {
        Self::Decrypt { message: msg.into() }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse { message: msg.into() }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedStatement { message: msg.into() }
    }

    pub fn policy(msg: impl Into<String>) -> Self {
        Self::Policy { message: msg.into() }
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution { message: msg.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation { message: msg.into() }
    }

    /// Returns true for errors raised while reading SQL text.
    ///
    /// The interception pipeline fails open on these and dispatches the
    /// statement unmodified.
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::UnsupportedStatement { .. })
    }
}

/// Result type alias for veilsql operations
pub type VeilResult<T> = Result<T, VeilError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_message() {
        let err = VeilError::decrypt("bad tag");
        assert_eq!(err.to_string(), "Decryption failed: bad tag");
    }

    #[test]
    fn parse_failures_are_classified() {
        assert!(VeilError::parse("x").is_parse_failure());
        assert!(VeilError::unsupported("x").is_parse_failure());
        assert!(!VeilError::decrypt("x").is_parse_failure());
    }

    #[test]
    fn errors_serialize_with_variant_tag() {
        let json = serde_json::to_string(&VeilError::key("missing")).unwrap();
        assert_eq!(json, r#"{"KeyMaterial":{"message":"missing"}}"#);
    }
}
