// SPDX-License-Identifier: Apache-2.0

//! Redaction for key material and plaintext column values.
//!
//! Anything that could reveal a protected value before encryption, or the
//! data key itself, is wrapped in [`Sensitive`] so it can sit inside `Debug`
//! output, tracing fields and serialized config without leaking.

use std::fmt::{self, Debug, Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Shown by `Debug` and `Display`
const REDACTED: &str = "[REDACTED]";
/// Written in place of the value when serializing
const MASK: &str = "***";

/// A plaintext value or secret that never formats as itself.
///
/// Deserialization reads the real value, so key material can be loaded from
/// config; serialization writes a mask, so a loaded config can be dumped.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// The wrapped value. Callers must not log it.
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Debug for Sensitive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> Display for Sensitive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> Serialize for Sensitive<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(MASK)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Sensitive<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::BoundValue;

    #[test]
    fn bound_values_are_redacted() {
        let value = Sensitive::new(BoundValue::text("13800001111"));
        assert_eq!(format!("{:?}", value), "[REDACTED]");
        assert_eq!(format!("{}", value), "[REDACTED]");
        assert_eq!(value.expose(), &BoundValue::text("13800001111"));
    }

    #[test]
    fn key_bytes_are_masked_when_serialized() {
        let key = Sensitive::new([7u8; 32]);
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"***\"");
        assert_eq!(format!("{:?}", key), "[REDACTED]");
    }

    #[test]
    fn serializes_masked_and_deserializes_plain() {
        let key = Sensitive::new("c2VjcmV0".to_string());
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"***\"");

        let parsed: Sensitive<String> = serde_json::from_str("\"c2VjcmV0\"").unwrap();
        assert_eq!(parsed.into_inner(), "c2VjcmV0");
    }
}
