// SPDX-License-Identifier: Apache-2.0

//! Per-field encryption declarations and the sources that provide them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use veil_core::{EncryptionMode, VeilError, VeilResult};

use crate::config::TypePolicyConfig;

/// One protected property of a mapped type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDeclaration {
    /// Property name on the mapped type
    pub property: String,
    /// Column name; defaults to the property in snake_case
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub mode: EncryptionMode,
    /// Column that filter conditions are redirected to
    #[serde(default)]
    pub replacement_column: Option<String>,
}

impl FieldDeclaration {
    pub fn new(property: impl Into<String>, mode: EncryptionMode) -> Self {
        Self {
            property: property.into(),
            column: None,
            mode,
            replacement_column: None,
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_replacement(mut self, column: impl Into<String>) -> Self {
        self.replacement_column = Some(column.into());
        self
    }

    /// Physical column name
    pub fn column_name(&self) -> String {
        match &self.column {
            Some(column) => column.clone(),
            None => to_snake_case(&self.property),
        }
    }
}

/// `userPhone` -> `user_phone`
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// Everything declared for one mapped type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDeclarations {
    /// Table the type maps to, used when a statement carries no type
    #[serde(default)]
    pub table: Option<String>,
    pub fields: Vec<FieldDeclaration>,
}

/// Implemented by Rust types that map to a table with protected columns
pub trait EncryptedEntity {
    const MAPPED_TYPE: &'static str;

    fn table() -> Option<&'static str> {
        None
    }

    fn encrypted_fields() -> Vec<FieldDeclaration>;
}

/// The mapping layer's view of protected fields
pub trait PolicySource: Send + Sync {
    fn declarations(&self, mapped_type: &str) -> Option<TypeDeclarations>;

    /// Mapped type bound to `table`, if any
    fn mapped_type_for_table(&self, table: &str) -> Option<String>;
}

/// Declarations registered up front, keyed by mapped type
#[derive(Debug, Clone, Default)]
pub struct StaticPolicySource {
    types: HashMap<String, TypeDeclarations>,
    tables: HashMap<String, String>,
}

impl StaticPolicySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mapped_type: impl Into<String>, declarations: TypeDeclarations) {
        let mapped_type = mapped_type.into();
        if let Some(table) = &declarations.table {
            self.tables
                .insert(table.to_lowercase(), mapped_type.clone());
        }
        self.types.insert(mapped_type, declarations);
    }

    pub fn register<T: EncryptedEntity>(&mut self) -> &mut Self {
        self.insert(
            T::MAPPED_TYPE,
            TypeDeclarations {
                table: T::table().map(str::to_string),
                fields: T::encrypted_fields(),
            },
        );
        self
    }

    pub fn from_config(policies: &[TypePolicyConfig]) -> VeilResult<Self> {
        let mut source = Self::new();
        for policy in policies {
            if source.types.contains_key(&policy.mapped_type) {
                return Err(VeilError::config(format!(
                    "mapped type {} is declared twice",
                    policy.mapped_type
                )));
            }
            source.insert(
                policy.mapped_type.clone(),
                TypeDeclarations {
                    table: policy.table.clone(),
                    fields: policy.fields.clone(),
                },
            );
        }
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl PolicySource for StaticPolicySource {
    fn declarations(&self, mapped_type: &str) -> Option<TypeDeclarations> {
        self.types.get(mapped_type).cloned()
    }

    fn mapped_type_for_table(&self, table: &str) -> Option<String> {
        self.tables.get(&table.to_lowercase()).cloned()
    }
}
