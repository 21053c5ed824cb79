// SPDX-License-Identifier: Apache-2.0

//! Policy Registry
//!
//! Resolves a mapped type to its protected columns. Maps are built from the
//! [`PolicySource`] outside the lock and inserted whole, so concurrent first
//! resolutions may build the same map twice but never observe a partial one.

use std::collections::HashMap;
use std::sync::Arc;

use compact_str::CompactString;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use veil_core::{EncryptionMode, VeilError, VeilResult};

use super::declaration::{PolicySource, TypeDeclarations};

/// How one column is protected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionPolicy {
    pub column: CompactString,
    pub mode: EncryptionMode,
    #[serde(default)]
    pub replacement_column: Option<CompactString>,
}

/// Protected columns of one mapped type. Lookups ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyMap {
    mapped_type: String,
    table: Option<String>,
    by_column: HashMap<CompactString, EncryptionPolicy>,
    by_property: HashMap<String, CompactString>,
}

impl PolicyMap {
    pub fn build(mapped_type: &str, declarations: &TypeDeclarations) -> VeilResult<Self> {
        let mut map = Self {
            mapped_type: mapped_type.to_string(),
            table: declarations.table.clone(),
            ..Self::default()
        };

        for field in &declarations.fields {
            let column = field.column_name();
            if column.trim().is_empty() {
                return Err(VeilError::policy(format!(
                    "{}.{} has an empty column name",
                    mapped_type, field.property
                )));
            }
            if field
                .replacement_column
                .as_deref()
                .is_some_and(|c| c.trim().is_empty())
            {
                return Err(VeilError::policy(format!(
                    "{}.{} has an empty replacement column",
                    mapped_type, field.property
                )));
            }

            let key = CompactString::from(column.to_lowercase());
            if map.by_column.contains_key(&key) {
                return Err(VeilError::policy(format!(
                    "{} declares column {} more than once",
                    mapped_type, column
                )));
            }

            map.by_property.insert(field.property.clone(), key.clone());
            map.by_column.insert(
                key,
                EncryptionPolicy {
                    column: CompactString::from(column),
                    mode: field.mode,
                    replacement_column: field.replacement_column.as_deref().map(CompactString::from),
                },
            );
        }

        Ok(map)
    }

    pub fn mapped_type(&self) -> &str {
        &self.mapped_type
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn get(&self, column: &str) -> Option<&EncryptionPolicy> {
        if column.is_empty() {
            return None;
        }
        self.by_column.get(column.to_lowercase().as_str())
    }

    pub fn for_property(&self, property: &str) -> Option<&EncryptionPolicy> {
        self.by_property
            .get(property)
            .and_then(|key| self.by_column.get(key))
    }

    pub fn len(&self) -> usize {
        self.by_column.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_column.is_empty()
    }

    pub fn policies(&self) -> impl Iterator<Item = &EncryptionPolicy> {
        self.by_column.values()
    }

    /// Adds the entries of `other` that this map does not already have
    pub(crate) fn absorb(&mut self, other: &PolicyMap) {
        for (key, policy) in &other.by_column {
            self.by_column
                .entry(key.clone())
                .or_insert_with(|| policy.clone());
        }
        for (property, key) in &other.by_property {
            self.by_property
                .entry(property.clone())
                .or_insert_with(|| key.clone());
        }
    }
}

pub struct PolicyRegistry {
    source: Arc<dyn PolicySource>,
    cache: RwLock<HashMap<String, Arc<PolicyMap>>>,
}

impl PolicyRegistry {
    pub fn new(source: Arc<dyn PolicySource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Protected columns of `mapped_type`; types without declarations yield
    /// an empty map.
    pub fn resolve(&self, mapped_type: &str) -> VeilResult<Arc<PolicyMap>> {
        if let Some(map) = self.cache.read().get(mapped_type) {
            return Ok(Arc::clone(map));
        }

        let map = match self.source.declarations(mapped_type) {
            Some(declarations) => PolicyMap::build(mapped_type, &declarations)?,
            None => PolicyMap {
                mapped_type: mapped_type.to_string(),
                ..PolicyMap::default()
            },
        };
        let map = Arc::new(map);

        debug!(mapped_type, columns = map.len(), "Resolved encryption policies");
        self.cache
            .write()
            .insert(mapped_type.to_string(), Arc::clone(&map));
        Ok(map)
    }

    /// Resolves through the table a type is bound to
    pub fn resolve_table(&self, table: &str) -> VeilResult<Option<Arc<PolicyMap>>> {
        match self.source.mapped_type_for_table(table) {
            Some(mapped_type) => self.resolve(&mapped_type).map(Some),
            None => Ok(None),
        }
    }

    /// Drops the cached map so the next resolve rebuilds it
    pub fn invalidate(&self, mapped_type: &str) {
        self.cache.write().remove(mapped_type);
    }

    pub fn cached_types(&self) -> usize {
        self.cache.read().len()
    }
}
