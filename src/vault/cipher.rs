// SPDX-License-Identifier: Apache-2.0

//! Searchable field cipher
//!
//! Every block is AES-256-GCM with a nonce derived from the key and the block
//! plaintext, so equal inputs always produce equal ciphertext. This equality
//! leak is what lets `=` and `LIKE` conditions run against encrypted columns.
//!
//! Wire format is `(base64(nonce ‖ ciphertext ‖ tag) '.')+`:
//!
//! - **Overall**: one block holding the whole value
//! - **Fuzzy**: one block per overlapping window. Window `i` starts at
//!   character `i` and grows while its byte budget (ASCII = 1, other = 2)
//!   fits the block size; the first window that reaches the end of the value
//!   is the last one.
//!
//! Decoding keeps the first character of every block but the last, plus the
//! last block in full, which handles both shapes uniformly.
//!
//! A substring search only matches when the needle covers at least one full
//! window and starts on a window boundary of the stored value. Shorter
//! needles are encrypted the same way but are not guaranteed to match.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

use veil_core::{EncryptionMode, VeilError, VeilResult};

use crate::vault::key::KeyMaterial;

/// Terminates every block; outside the base64 alphabet and not a SQL wildcard
pub const DELIMITER: char = '.';
/// Stands in for null or empty input
pub const EMPTY_SENTINEL: &str = "VEILSQL_EMPTY_DATA";
pub const DEFAULT_BLOCK_SIZE: usize = 4;
pub const MIN_BLOCK_SIZE: usize = 2;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

const WILDCARDS: [char; 2] = ['%', '_'];

pub struct FieldCipher {
    cipher: Aes256Gcm,
    key: KeyMaterial,
    block_size: usize,
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCipher")
            .field("key", &self.key)
            .field("block_size", &self.block_size)
            .finish()
    }
}

impl FieldCipher {
    pub fn new(key: KeyMaterial) -> VeilResult<Self> {
        Self::with_block_size(key, DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(key: KeyMaterial, block_size: usize) -> VeilResult<Self> {
        if block_size < MIN_BLOCK_SIZE {
            return Err(VeilError::config(format!(
                "fuzzy block size must be at least {}, got {}",
                MIN_BLOCK_SIZE, block_size
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| VeilError::key(format!("Invalid key: {}", e)))?;

        Ok(Self {
            cipher,
            key,
            block_size,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn encrypt(&self, mode: EncryptionMode, plain: &str) -> VeilResult<String> {
        match mode {
            EncryptionMode::Overall => self.encrypt_overall(plain),
            EncryptionMode::Fuzzy => self.encrypt_fuzzy(plain),
        }
    }

    /// Single-block encryption. Empty input encrypts the sentinel.
    pub fn encrypt_overall(&self, plain: &str) -> VeilResult<String> {
        let source = if plain.is_empty() { EMPTY_SENTINEL } else { plain };
        let mut out = self.encrypt_block(source)?;
        out.push(DELIMITER);
        Ok(out)
    }

    /// Window-per-block encryption. Empty input is the one-block sentinel.
    pub fn encrypt_fuzzy(&self, plain: &str) -> VeilResult<String> {
        if plain.is_empty() {
            return self.encrypt_overall(plain);
        }

        let mut out = String::new();
        for window in self.split_windows(plain) {
            out.push_str(&self.encrypt_block(window)?);
            out.push(DELIMITER);
        }
        Ok(out)
    }

    /// Overlapping windows used by fuzzy mode, in order.
    pub fn split_windows<'a>(&self, plain: &'a str) -> Vec<&'a str> {
        let chars: Vec<(usize, char)> = plain.char_indices().collect();
        let mut windows = Vec::new();

        for (n, &(start, _)) in chars.iter().enumerate() {
            let mut budget = 0;
            let mut end = start;
            for &(pos, c) in &chars[n..] {
                let cost = if c.is_ascii() { 1 } else { 2 };
                if budget + cost > self.block_size {
                    break;
                }
                budget += cost;
                end = pos + c.len_utf8();
            }

            windows.push(&plain[start..end]);
            if end == plain.len() {
                break;
            }
        }

        windows
    }

    pub fn decrypt(&self, cipher_text: &str) -> VeilResult<String> {
        let body = cipher_text.strip_suffix(DELIMITER).unwrap_or(cipher_text);
        if body.is_empty() {
            return Err(VeilError::decrypt("empty ciphertext"));
        }

        let blocks: Vec<&str> = body.split(DELIMITER).collect();
        let last = blocks.len() - 1;
        let mut out = String::new();

        for (i, block) in blocks.iter().enumerate() {
            let plain = self.decrypt_block(block)?;
            if i < last {
                let first = plain
                    .chars()
                    .next()
                    .ok_or_else(|| VeilError::decrypt("empty window in fuzzy ciphertext"))?;
                out.push(first);
            } else if last == 0 && plain == EMPTY_SENTINEL {
                return Ok(String::new());
            } else {
                out.push_str(&plain);
            }
        }

        Ok(out)
    }

    /// Decrypts values that look like ciphertext and returns everything else
    /// unchanged.
    pub fn decrypt_lenient(&self, value: &str) -> String {
        if !value.ends_with(DELIMITER) {
            return value.to_string();
        }
        self.decrypt(value).unwrap_or_else(|_| value.to_string())
    }

    /// Heuristic ciphertext detection: trailing delimiter, then a successful
    /// authenticated decrypt.
    pub fn check_encrypted(&self, value: &str) -> bool {
        value.len() > 1 && value.ends_with(DELIMITER) && self.decrypt(value).is_ok()
    }

    /// Prepares a search operand.
    ///
    /// One leading and one trailing `%`/`_` are kept outside the encryption;
    /// the rest is encrypted with `mode` unless it already is ciphertext.
    pub fn search_value(&self, mode: EncryptionMode, raw: &str) -> VeilResult<String> {
        let (prefix, core, suffix) = strip_wildcards(raw);
        if core.is_empty() && !raw.is_empty() {
            return Ok(raw.to_string());
        }

        let encoded = self.storage_value(mode, core)?;
        Ok(format!("{}{}{}", prefix, encoded, suffix))
    }

    /// Storage form of `plain`; values that already are ciphertext are
    /// returned unchanged.
    pub fn storage_value(&self, mode: EncryptionMode, plain: &str) -> VeilResult<String> {
        if self.check_encrypted(plain) {
            return Ok(plain.to_string());
        }
        self.encrypt(mode, plain)
    }

    fn encrypt_block(&self, plain: &str) -> VeilResult<String> {
        let nonce_bytes = self.derive_nonce(plain.as_bytes());
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plain.as_bytes())
            .map_err(|e| VeilError::cipher(format!("Encryption failed: {}", e)))?;

        let mut block = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        block.extend_from_slice(&nonce_bytes);
        block.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(block))
    }

    fn decrypt_block(&self, block: &str) -> VeilResult<String> {
        let bytes = STANDARD
            .decode(block)
            .map_err(|_| VeilError::decrypt("block is not valid base64"))?;
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(VeilError::decrypt("block too short"));
        }

        let (nonce_bytes, encrypted) = bytes.split_at(NONCE_SIZE);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), encrypted)
            .map_err(|_| VeilError::decrypt("authentication failed"))?;

        String::from_utf8(plain).map_err(|_| VeilError::decrypt("plaintext is not UTF-8"))
    }

    fn derive_nonce(&self, plaintext: &[u8]) -> [u8; NONCE_SIZE] {
        let mut hasher = Sha256::new();
        hasher.update(self.key.as_bytes());
        hasher.update(plaintext);
        let hash = hasher.finalize();

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&hash[..NONCE_SIZE]);
        nonce
    }
}

/// Splits off at most one leading and one trailing LIKE wildcard.
fn strip_wildcards(raw: &str) -> (&str, &str, &str) {
    let mut core = raw;
    let mut prefix = "";
    let mut suffix = "";

    if core.starts_with(WILDCARDS) {
        prefix = &core[..1];
        core = &core[1..];
    }
    if core.ends_with(WILDCARDS) {
        let cut = core.len() - 1;
        suffix = &core[cut..];
        core = &core[..cut];
    }

    (prefix, core, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> FieldCipher {
        FieldCipher::new(KeyMaterial::from_bytes(&[42u8; 32]).unwrap()).unwrap()
    }

    #[test]
    fn windows_respect_byte_budget() {
        let c = cipher();
        assert_eq!(c.split_windows("abcdef"), vec!["abcd", "bcde", "cdef"]);
        assert_eq!(c.split_windows("abc"), vec!["abc"]);
        assert_eq!(c.split_windows("张三丰"), vec!["张三", "三丰"]);
        assert_eq!(c.split_windows("a张b"), vec!["a张b"]);
        assert!(c.split_windows("").is_empty());
    }

    #[test]
    fn overall_is_one_block() {
        let c = cipher();
        let enc = c.encrypt_overall("17700000000").unwrap();
        assert!(enc.ends_with(DELIMITER));
        assert_eq!(enc.matches(DELIMITER).count(), 1);
        assert_eq!(c.decrypt(&enc).unwrap(), "17700000000");
    }

    #[test]
    fn empty_input_uses_sentinel() {
        let c = cipher();
        let overall = c.encrypt_overall("").unwrap();
        assert_eq!(c.encrypt_fuzzy("").unwrap(), overall);
        assert_eq!(overall, c.encrypt_overall(EMPTY_SENTINEL).unwrap());
        assert_eq!(c.decrypt(&overall).unwrap(), "");
    }

    #[test]
    fn fuzzy_decodes_mixed_scripts() {
        let c = cipher();
        for plain in ["a", "abcd", "hello world", "张三丰@example.com", "ab中cd文ef"] {
            let enc = c.encrypt_fuzzy(plain).unwrap();
            assert_eq!(c.decrypt(&enc).unwrap(), plain);
        }
    }

    #[test]
    fn encryption_is_deterministic_per_key() {
        let c = cipher();
        assert_eq!(c.encrypt_overall("x").unwrap(), c.encrypt_overall("x").unwrap());

        let other = FieldCipher::new(KeyMaterial::from_bytes(&[1u8; 32]).unwrap()).unwrap();
        let enc = c.encrypt_overall("x").unwrap();
        assert_ne!(enc, other.encrypt_overall("x").unwrap());
        assert!(matches!(other.decrypt(&enc), Err(VeilError::Decrypt { .. })));
    }

    #[test]
    fn check_encrypted_detects_ciphertext() {
        let c = cipher();
        assert!(c.check_encrypted(&c.encrypt_overall("secret").unwrap()));
        assert!(c.check_encrypted(&c.encrypt_fuzzy("secret").unwrap()));
        assert!(!c.check_encrypted("plain text"));
        assert!(!c.check_encrypted("ends with dot."));
        assert!(!c.check_encrypted("."));
    }

    #[test]
    fn lenient_decrypt_passes_plain_values_through() {
        let c = cipher();
        assert_eq!(c.decrypt_lenient("v1.2."), "v1.2.");
        assert_eq!(c.decrypt_lenient("plain"), "plain");
        assert_eq!(c.decrypt_lenient(&c.encrypt_overall("x").unwrap()), "x");
    }

    #[test]
    fn search_value_keeps_outer_wildcards() {
        let c = cipher();
        let enc = c.encrypt_fuzzy("abcd").unwrap();
        assert_eq!(c.search_value(EncryptionMode::Fuzzy, "%abcd%").unwrap(), format!("%{}%", enc));
        assert_eq!(c.search_value(EncryptionMode::Fuzzy, "_abcd").unwrap(), format!("_{}", enc));
        assert_eq!(c.search_value(EncryptionMode::Fuzzy, "%").unwrap(), "%");
        assert_eq!(c.search_value(EncryptionMode::Fuzzy, "%%").unwrap(), "%%");
        assert_eq!(
            c.search_value(EncryptionMode::Fuzzy, "").unwrap(),
            c.encrypt_overall("").unwrap()
        );
    }

    #[test]
    fn search_value_does_not_double_encrypt() {
        let c = cipher();
        let enc = c.encrypt_overall("17700000000").unwrap();
        assert_eq!(c.search_value(EncryptionMode::Overall, &enc).unwrap(), enc);
        assert_eq!(c.storage_value(EncryptionMode::Overall, &enc).unwrap(), enc);
        assert_eq!(c.storage_value(EncryptionMode::Overall, "50%").unwrap(), c.encrypt_overall("50%").unwrap());
    }

    #[test]
    fn fuzzy_substring_matches_stored_value() {
        let c = cipher();
        let stored = c.encrypt_fuzzy("user.name@example.com").unwrap();
        let needle = c.search_value(EncryptionMode::Fuzzy, "%name@exa%").unwrap();
        assert!(stored.contains(needle.trim_matches('%')));
    }

    #[test]
    fn block_size_is_validated() {
        let key = KeyMaterial::from_bytes(&[0u8; 32]).unwrap();
        assert!(FieldCipher::with_block_size(key.clone(), 1).is_err());
        let c = FieldCipher::with_block_size(key, 6).unwrap();
        assert_eq!(c.split_windows("abcdefg"), vec!["abcdef", "bcdefg"]);
    }

    #[test]
    fn debug_does_not_leak_key() {
        let rendered = format!("{:?}", cipher());
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("42"));
    }
}
