// SPDX-License-Identifier: Apache-2.0

//! Per-field codec
//!
//! Used for values that belong to a mapped entity: they are encoded when the
//! statement is bound and decoded when rows are read, so the caller's object
//! is never modified during statement preparation.

use std::sync::Arc;

use compact_str::CompactString;

use veil_core::{BoundValue, EncryptionMode, VeilError, VeilResult};

use crate::policy::EncryptionPolicy;
use crate::vault::FieldCipher;

#[derive(Debug, Clone)]
pub struct FieldHandler {
    column: CompactString,
    mode: EncryptionMode,
    /// Bound into a filter: outer `LIKE` wildcards stay outside the ciphertext
    search_operand: bool,
    cipher: Arc<FieldCipher>,
}

impl FieldHandler {
    pub fn new(cipher: Arc<FieldCipher>, policy: &EncryptionPolicy) -> Self {
        Self {
            column: policy.column.clone(),
            mode: policy.mode,
            search_operand: false,
            cipher,
        }
    }

    /// Encodes as a search operand, for values bound into `WHERE`/`HAVING`
    pub fn for_filter(mut self) -> Self {
        self.search_operand = true;
        self
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn mode(&self) -> EncryptionMode {
        self.mode
    }

    /// Bind form of `plain`: the storage form, or the search operand for a
    /// filter handler. Nulls stay null, ciphertext is kept as is.
    pub fn encode(&self, plain: &BoundValue) -> VeilResult<BoundValue> {
        let Some(text) = plain.as_text() else {
            return Ok(plain.clone());
        };
        let encoded = if self.search_operand {
            self.cipher.search_value(self.mode, &text)?
        } else {
            self.cipher.storage_value(self.mode, &text)?
        };
        Ok(BoundValue::Text(encoded))
    }

    /// Decodes a stored value. The column always holds ciphertext, so any
    /// failure is reported.
    pub fn decode(&self, stored: &str) -> VeilResult<String> {
        self.cipher.decrypt(stored).map_err(|e| {
            VeilError::decrypt(format!("column {}: {}", self.column, e))
        })
    }

    /// Decodes when possible, otherwise returns the stored value
    pub fn decode_lenient(&self, stored: &str) -> String {
        self.cipher.decrypt_lenient(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::KeyMaterial;

    fn handler(mode: EncryptionMode) -> FieldHandler {
        let cipher = Arc::new(FieldCipher::new(KeyMaterial::from_bytes(&[9u8; 32]).unwrap()).unwrap());
        let policy = EncryptionPolicy {
            column: "phone".into(),
            mode,
            replacement_column: None,
        };
        FieldHandler::new(cipher, &policy)
    }

    #[test]
    fn encode_then_decode() {
        let handler = handler(EncryptionMode::Fuzzy);
        let stored = handler.encode(&BoundValue::text("13800001111")).unwrap();
        let BoundValue::Text(stored) = stored else {
            panic!("expected text");
        };
        assert_eq!(handler.decode(&stored).unwrap(), "13800001111");
    }

    #[test]
    fn encode_is_idempotent_and_keeps_nulls() {
        let handler = handler(EncryptionMode::Overall);
        let once = handler.encode(&BoundValue::text("x")).unwrap();
        assert_eq!(handler.encode(&once).unwrap(), once);
        assert_eq!(handler.encode(&BoundValue::Null).unwrap(), BoundValue::Null);
        assert_eq!(handler.encode(&BoundValue::Bool(true)).unwrap(), BoundValue::Bool(true));
    }

    #[test]
    fn filter_handlers_keep_like_wildcards_outside() {
        let storage = handler(EncryptionMode::Fuzzy);
        let filter = handler(EncryptionMode::Fuzzy).for_filter();
        let core = storage.cipher.encrypt_fuzzy("abcd").unwrap();

        assert_eq!(
            filter.encode(&BoundValue::text("%abcd%")).unwrap(),
            BoundValue::Text(format!("%{}%", core))
        );
        // Stored values keep every character, wildcards included
        let stored = storage.encode(&BoundValue::text("50%")).unwrap();
        let BoundValue::Text(stored) = stored else {
            panic!("expected text");
        };
        assert_eq!(storage.decode(&stored).unwrap(), "50%");
    }

    #[test]
    fn strict_decode_fails_on_plaintext() {
        let handler = handler(EncryptionMode::Overall);
        let err = handler.decode("13800001111").unwrap_err();
        assert!(matches!(err, VeilError::Decrypt { .. }));
        assert!(err.to_string().contains("phone"));
        assert_eq!(handler.decode_lenient("13800001111"), "13800001111");
    }
}
