// SPDX-License-Identifier: Apache-2.0

//! Data key material
//!
//! The cipher key is an opaque, pre-provisioned 256-bit secret. It can come
//! from an environment variable, inline configuration, the OS keychain or an
//! Argon2id passphrase derivation. Anything that does not yield exactly 32
//! bytes is rejected so a pipeline is never built without a usable key.

use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use veil_core::{VeilError, VeilResult};

use crate::observability::Sensitive;
use crate::vault::backend::CredentialProvider;

pub const KEY_LEN: usize = 32;
pub const MIN_SALT_LEN: usize = 8;
pub const DEFAULT_KEY_VAR: &str = "VEILSQL_DATA_KEY";

/// A 256-bit AES key
#[derive(Clone, Debug)]
pub struct KeyMaterial {
    bytes: Sensitive<[u8; KEY_LEN]>,
}

impl KeyMaterial {
    pub fn from_bytes(bytes: &[u8]) -> VeilResult<Self> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            VeilError::key(format!(
                "expected a {}-byte key, got {} bytes",
                KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self {
            bytes: Sensitive::new(bytes),
        })
    }

    pub fn from_base64(encoded: &str) -> VeilResult<Self> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(VeilError::key("key material is empty"));
        }
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|e| VeilError::key(format!("key is not valid base64: {}", e)))?;
        Self::from_bytes(&decoded)
    }

    /// Fresh random key from the OS generator
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self {
            bytes: Sensitive::new(bytes),
        }
    }

    /// Derives a key from a passphrase with Argon2id (default parameters).
    pub fn from_passphrase(passphrase: &str, salt: &[u8]) -> VeilResult<Self> {
        if passphrase.is_empty() {
            return Err(VeilError::key("passphrase is empty"));
        }
        if salt.len() < MIN_SALT_LEN {
            return Err(VeilError::key(format!(
                "salt must be at least {} bytes",
                MIN_SALT_LEN
            )));
        }

        let mut bytes = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), salt, &mut bytes)
            .map_err(|e| VeilError::key(format!("key derivation failed: {}", e)))?;
        Ok(Self {
            bytes: Sensitive::new(bytes),
        })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes.expose())
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        self.bytes.expose()
    }
}

/// Where the data key is loaded from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum KeySource {
    /// Base64 key in an environment variable
    Env {
        #[serde(default = "default_key_var")]
        var: String,
    },
    /// Base64 key embedded in the configuration file
    Inline { base64: Sensitive<String> },
    /// Base64 key stored in the OS keychain
    Keyring { service: String, account: String },
    /// Passphrase read from an environment variable, stretched with Argon2id
    Passphrase { var: String, salt: String },
}

fn default_key_var() -> String {
    DEFAULT_KEY_VAR.to_string()
}

impl Default for KeySource {
    fn default() -> Self {
        Self::Env {
            var: default_key_var(),
        }
    }
}

impl KeySource {
    pub fn resolve(&self, provider: &dyn CredentialProvider) -> VeilResult<KeyMaterial> {
        match self {
            Self::Env { var } => KeyMaterial::from_base64(&read_env(var)?),
            Self::Inline { base64 } => KeyMaterial::from_base64(base64.expose()),
            Self::Keyring { service, account } => {
                let secret = provider.get_secret(service, account)?;
                KeyMaterial::from_base64(&secret)
            }
            Self::Passphrase { var, salt } => {
                KeyMaterial::from_passphrase(&read_env(var)?, salt.as_bytes())
            }
        }
    }
}

fn read_env(var: &str) -> VeilResult<String> {
    std::env::var(var)
        .map_err(|_| VeilError::key(format!("environment variable {} is not set", var)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::backend::MockProvider;

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            KeyMaterial::from_bytes(&[0u8; 16]),
            Err(VeilError::KeyMaterial { .. })
        ));
        assert!(KeyMaterial::from_base64("   ").is_err());
        assert!(KeyMaterial::from_base64("not base64!").is_err());
    }

    #[test]
    fn base64_round_trip() {
        let key = KeyMaterial::generate();
        let restored = KeyMaterial::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key.as_bytes(), restored.as_bytes());
    }

    #[test]
    fn debug_is_redacted() {
        let key = KeyMaterial::from_bytes(&[7u8; KEY_LEN]).unwrap();
        let rendered = format!("{:?}", key);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains('7'));
    }

    #[test]
    fn passphrase_derivation_is_stable() {
        let a = KeyMaterial::from_passphrase("correct horse", b"veilsql-salt").unwrap();
        let b = KeyMaterial::from_passphrase("correct horse", b"veilsql-salt").unwrap();
        let c = KeyMaterial::from_passphrase("correct horse", b"other-salt").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
        assert!(KeyMaterial::from_passphrase("x", b"short").is_err());
    }

    #[test]
    fn keyring_source_reads_provider() {
        let provider = MockProvider::new();
        let key = KeyMaterial::generate();
        provider
            .set_secret("veilsql", "primary", &key.to_base64())
            .unwrap();

        let source = KeySource::Keyring {
            service: "veilsql".into(),
            account: "primary".into(),
        };
        assert_eq!(source.resolve(&provider).unwrap().as_bytes(), key.as_bytes());

        let missing = KeySource::Keyring {
            service: "veilsql".into(),
            account: "absent".into(),
        };
        assert!(missing.resolve(&provider).is_err());
    }

    #[test]
    fn missing_env_var_is_key_error() {
        let source = KeySource::Env {
            var: "VEILSQL_TEST_KEY_THAT_IS_NEVER_SET".into(),
        };
        assert!(matches!(
            source.resolve(&MockProvider::new()),
            Err(VeilError::KeyMaterial { .. })
        ));
    }

    #[test]
    fn key_source_serde_shape() {
        let source: KeySource =
            serde_json::from_str(r#"{"source":"keyring","service":"s","account":"a"}"#).unwrap();
        assert!(matches!(source, KeySource::Keyring { .. }));

        let source: KeySource = serde_json::from_str(r#"{"source":"env"}"#).unwrap();
        assert!(matches!(source, KeySource::Env { ref var } if var == DEFAULT_KEY_VAR));
    }
}
