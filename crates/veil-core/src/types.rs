// SPDX-License-Identifier: Apache-2.0

//! Core types
//!
//! Value and classification types shared by the cipher, the condition
//! parser and the interception pipeline.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// How a protected column is encrypted at rest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMode {
    /// Single deterministic block; supports equality only
    Overall,
    /// Overlapping deterministic windows; supports equality and aligned substring search
    Fuzzy,
}

impl Default for EncryptionMode {
    fn default() -> Self {
        Self::Overall
    }
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overall => f.write_str("overall"),
            Self::Fuzzy => f.write_str("fuzzy"),
        }
    }
}

/// The clause an atomic condition was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClauseKind {
    Where,
    Having,
    /// An `UPDATE ... SET` assignment
    Set,
}

impl ClauseKind {
    /// Filter clauses may have their column redirected; assignments may not.
    pub fn is_filter(&self) -> bool {
        !matches!(self, Self::Set)
    }
}

/// Statement operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl Default for StatementKind {
    fn default() -> Self {
        Self::Other
    }
}

impl StatementKind {
    /// Classify a statement by its leading keyword
    pub fn classify(sql: &str) -> Self {
        let first_word = sql
            .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or("");

        if first_word.eq_ignore_ascii_case("SELECT") || first_word.eq_ignore_ascii_case("WITH") {
            Self::Select
        } else if first_word.eq_ignore_ascii_case("INSERT") {
            Self::Insert
        } else if first_word.eq_ignore_ascii_case("UPDATE") {
            Self::Update
        } else if first_word.eq_ignore_ascii_case("DELETE") {
            Self::Delete
        } else {
            Self::Other
        }
    }

    /// Returns true if condition rewriting applies to this statement kind.
    ///
    /// INSERT values are encoded by the per-field handlers at the mapping
    /// boundary, so only SELECT, UPDATE and DELETE are intercepted.
    pub fn is_interceptable(&self) -> bool {
        matches!(self, Self::Select | Self::Update | Self::Delete)
    }
}

/// A value bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl BoundValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Textual form used as cipher input.
    ///
    /// Numbers are rendered in their canonical decimal form so a phone number
    /// bound as an integer encrypts the same way as its string form. Nulls and
    /// booleans have no textual form and are never encrypted.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Text(s) => Some(Cow::Borrowed(s.as_str())),
            Self::Integer(i) => Some(Cow::Owned(i.to_string())),
            Self::Float(f) => Some(Cow::Owned(f.to_string())),
            Self::Null | Self::Bool(_) => None,
        }
    }
}

impl From<&str> for BoundValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for BoundValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for BoundValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl<T: Into<BoundValue>> From<Option<T>> for BoundValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_leading_keyword() {
        assert_eq!(StatementKind::classify("  select * from t"), StatementKind::Select);
        assert_eq!(StatementKind::classify("(SELECT 1)"), StatementKind::Select);
        assert_eq!(StatementKind::classify("UPDATE t SET a = 1"), StatementKind::Update);
        assert_eq!(StatementKind::classify("delete from t"), StatementKind::Delete);
        assert_eq!(StatementKind::classify("INSERT INTO t VALUES (1)"), StatementKind::Insert);
        assert_eq!(StatementKind::classify("DROP TABLE t"), StatementKind::Other);
        assert_eq!(StatementKind::classify(""), StatementKind::Other);
    }

    #[test]
    fn insert_is_not_interceptable() {
        assert!(StatementKind::Select.is_interceptable());
        assert!(StatementKind::Update.is_interceptable());
        assert!(StatementKind::Delete.is_interceptable());
        assert!(!StatementKind::Insert.is_interceptable());
        assert!(!StatementKind::Other.is_interceptable());
    }

    #[test]
    fn set_clauses_are_not_filters() {
        assert!(ClauseKind::Where.is_filter());
        assert!(ClauseKind::Having.is_filter());
        assert!(!ClauseKind::Set.is_filter());
    }

    #[test]
    fn bound_value_text_forms() {
        assert_eq!(BoundValue::text("abc").as_text().as_deref(), Some("abc"));
        assert_eq!(BoundValue::Integer(17700000000).as_text().as_deref(), Some("17700000000"));
        assert_eq!(BoundValue::Null.as_text(), None);
        assert_eq!(BoundValue::Bool(true).as_text(), None);
        assert_eq!(BoundValue::from(None::<String>), BoundValue::Null);
    }

    #[test]
    fn encryption_mode_serde_is_lowercase() {
        let mode: EncryptionMode = serde_json::from_str("\"fuzzy\"").unwrap();
        assert_eq!(mode, EncryptionMode::Fuzzy);
        assert_eq!(serde_json::to_string(&EncryptionMode::Overall).unwrap(), "\"overall\"");
    }
}
