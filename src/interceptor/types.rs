// SPDX-License-Identifier: Apache-2.0

//! Interceptor Types
//!
//! The statement model handed over by the mapping layer, the executor seam
//! and the interception outcome.

use std::fmt;

use serde::{Deserialize, Serialize};

use veil_core::{BoundValue, StatementKind, VeilResult};

use super::handler::FieldHandler;
use crate::observability::Sensitive;

/// Where a bound value came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum ParamOrigin {
    /// A plain call argument
    Argument,
    /// A property of a mapped entity
    EntityField { property: String },
}

/// One value bound to a `?` placeholder
#[derive(Clone)]
pub struct BoundParam {
    pub value: BoundValue,
    pub origin: ParamOrigin,
    /// Codec applied at bind time instead of rewriting `value`
    pub handler: Option<FieldHandler>,
}

impl fmt::Debug for BoundParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundParam")
            .field("value", &Sensitive::new(&self.value))
            .field("origin", &self.origin)
            .field("handler", &self.handler.as_ref().map(FieldHandler::column))
            .finish()
    }
}

impl BoundParam {
    pub fn argument(value: impl Into<BoundValue>) -> Self {
        Self {
            value: value.into(),
            origin: ParamOrigin::Argument,
            handler: None,
        }
    }

    pub fn entity_field(property: impl Into<String>, value: impl Into<BoundValue>) -> Self {
        Self {
            value: value.into(),
            origin: ParamOrigin::EntityField {
                property: property.into(),
            },
            handler: None,
        }
    }

    /// Value to send to the database
    pub fn bind_value(&self) -> VeilResult<BoundValue> {
        match &self.handler {
            Some(handler) => handler.encode(&self.value),
            None => Ok(self.value.clone()),
        }
    }
}

/// A statement on its way to the database
#[derive(Debug, Clone)]
pub struct BoundStatement {
    pub sql: String,
    pub kind: StatementKind,
    /// Entity type the statement was generated for, if known
    pub mapped_type: Option<String>,
    pub params: Vec<BoundParam>,
}

impl BoundStatement {
    pub fn new(sql: impl Into<String>, params: Vec<BoundParam>) -> Self {
        let sql = sql.into();
        Self {
            kind: StatementKind::classify(&sql),
            sql,
            mapped_type: None,
            params,
        }
    }

    pub fn with_mapped_type(mut self, mapped_type: impl Into<String>) -> Self {
        self.mapped_type = Some(mapped_type.into());
        self
    }

    /// Values in placeholder order with handlers applied
    pub fn bind_values(&self) -> VeilResult<Vec<BoundValue>> {
        self.params.iter().map(BoundParam::bind_value).collect()
    }
}

/// The execution layer
pub trait StatementExecutor {
    type Output;

    fn execute(&self, sql: &str, params: &[BoundValue]) -> VeilResult<Self::Output>;
}

/// Why a statement was dispatched unmodified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PassthroughReason {
    /// The caller disabled interception for this statement
    Disabled,
    NotInterceptable,
    NoConditions,
    NoPolicy,
    ParseFailed { message: String },
    ParamMismatch { placeholders: usize, bound: usize },
    RewriteFailed { message: String },
}

/// Result of intercepting one statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterceptOutcome {
    Passthrough(PassthroughReason),
    Rewritten {
        /// Clauses that matched a policy
        clauses: usize,
        text_edits: usize,
        params_encrypted: usize,
        handlers_attached: usize,
    },
}

impl InterceptOutcome {
    pub fn is_rewritten(&self) -> bool {
        matches!(self, Self::Rewritten { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_kind_is_classified() {
        let stmt = BoundStatement::new("update t set a = ?", vec![BoundParam::argument("x")]);
        assert_eq!(stmt.kind, StatementKind::Update);
        assert!(stmt.mapped_type.is_none());
        assert_eq!(stmt.with_mapped_type("T").mapped_type.as_deref(), Some("T"));
    }

    #[test]
    fn debug_redacts_values() {
        let param = BoundParam::entity_field("phone", "13800001111");
        let rendered = format!("{:?}", param);
        assert!(!rendered.contains("13800001111"));
        assert!(rendered.contains("phone"));
    }

    #[test]
    fn bind_without_handler_is_identity() {
        let stmt = BoundStatement::new(
            "select * from t where a = ? and b = ?",
            vec![BoundParam::argument(1i64), BoundParam::argument(None::<String>)],
        );
        assert_eq!(
            stmt.bind_values().unwrap(),
            vec![BoundValue::Integer(1), BoundValue::Null]
        );
    }

    #[test]
    fn outcome_serializes_reason() {
        let outcome = InterceptOutcome::Passthrough(PassthroughReason::NoPolicy);
        let json = serde_json::to_string(&outcome).unwrap();
        assert_eq!(json, r#"{"passthrough":{"reason":"no_policy"}}"#);
    }
}
