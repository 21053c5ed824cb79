// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use keyring::Entry;
use parking_lot::Mutex;

use veil_core::{VeilError, VeilResult};

/// Secret storage holding provisioned data keys
pub trait CredentialProvider: Send + Sync {
    fn set_secret(&self, service: &str, account: &str, secret: &str) -> VeilResult<()>;
    fn get_secret(&self, service: &str, account: &str) -> VeilResult<String>;
    fn delete_secret(&self, service: &str, account: &str) -> VeilResult<()>;
}

/// OS keychain backend
#[derive(Debug, Default)]
pub struct KeyringProvider;

impl KeyringProvider {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialProvider for KeyringProvider {
    fn set_secret(&self, service: &str, account: &str, secret: &str) -> VeilResult<()> {
        let entry = Entry::new(service, account)
            .map_err(|e| VeilError::key(format!("Keyring error: {}", e)))?;
        entry
            .set_password(secret)
            .map_err(|e| VeilError::key(format!("Failed to store key: {}", e)))
    }

    fn get_secret(&self, service: &str, account: &str) -> VeilResult<String> {
        let entry = Entry::new(service, account)
            .map_err(|e| VeilError::key(format!("Keyring error: {}", e)))?;
        match entry.get_password() {
            Ok(secret) => Ok(secret),
            Err(keyring::Error::NoEntry) => Err(VeilError::key(format!(
                "No key stored for {}/{}",
                service, account
            ))),
            Err(e) => Err(VeilError::key(format!("Failed to read key: {}", e))),
        }
    }

    fn delete_secret(&self, service: &str, account: &str) -> VeilResult<()> {
        // Missing entries are fine
        if let Ok(entry) = Entry::new(service, account) {
            let _ = entry.delete_credential();
        }
        Ok(())
    }
}

/// In-memory backend for tests
#[derive(Clone, Default)]
pub struct MockProvider {
    storage: Arc<Mutex<HashMap<String, String>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(service: &str, account: &str) -> String {
        format!("{}::{}", service, account)
    }
}

impl CredentialProvider for MockProvider {
    fn set_secret(&self, service: &str, account: &str, secret: &str) -> VeilResult<()> {
        self.storage
            .lock()
            .insert(Self::key(service, account), secret.to_string());
        Ok(())
    }

    fn get_secret(&self, service: &str, account: &str) -> VeilResult<String> {
        self.storage
            .lock()
            .get(&Self::key(service, account))
            .cloned()
            .ok_or_else(|| VeilError::key(format!("No key stored for {}/{}", service, account)))
    }

    fn delete_secret(&self, service: &str, account: &str) -> VeilResult<()> {
        self.storage.lock().remove(&Self::key(service, account));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_provider_stores_per_account() {
        let provider = MockProvider::new();
        provider.set_secret("veilsql", "orders", "a").unwrap();
        provider.set_secret("veilsql", "users", "b").unwrap();

        assert_eq!(provider.get_secret("veilsql", "orders").unwrap(), "a");
        provider.delete_secret("veilsql", "orders").unwrap();
        assert!(matches!(
            provider.get_secret("veilsql", "orders"),
            Err(VeilError::KeyMaterial { .. })
        ));
        assert_eq!(provider.get_secret("veilsql", "users").unwrap(), "b");
    }
}
