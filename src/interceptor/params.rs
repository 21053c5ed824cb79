// SPDX-License-Identifier: Apache-2.0

//! Parameter Rewriter
//!
//! Bound values never appear in the SQL text. Call arguments are replaced by
//! their ciphertext in the parameter list; values taken from a mapped entity
//! get a [`FieldHandler`] instead, so the entity itself is left untouched.

use std::sync::Arc;

use tracing::debug;

use veil_core::{BoundValue, VeilError, VeilResult};
use veil_sql::ConditionClause;

use super::handler::FieldHandler;
use super::types::{BoundParam, ParamOrigin};
use crate::policy::EncryptionPolicy;
use crate::vault::FieldCipher;

pub struct ParameterRewriter<'a> {
    cipher: &'a Arc<FieldCipher>,
    params_encrypted: usize,
    handlers_attached: usize,
}

impl<'a> ParameterRewriter<'a> {
    pub fn new(cipher: &'a Arc<FieldCipher>) -> Self {
        Self {
            cipher,
            params_encrypted: 0,
            handlers_attached: 0,
        }
    }

    /// Routes every parameter bound to `clause` through the policy's codec.
    ///
    /// Parameters that already carry a handler are skipped.
    pub fn rewrite(
        &mut self,
        params: &mut [BoundParam],
        clause: &ConditionClause,
        policy: &EncryptionPolicy,
    ) -> VeilResult<()> {
        let slots = clause.param_slots();
        let bound = params.len();
        let params = params.get_mut(slots.clone()).ok_or_else(|| {
            VeilError::validation(format!(
                "clause on {} uses parameters {:?} but only {} are bound",
                clause.column, slots, bound
            ))
        })?;

        for param in params {
            if param.handler.is_some() {
                continue;
            }

            match &param.origin {
                ParamOrigin::Argument => {
                    let Some(text) = param.value.as_text() else {
                        continue;
                    };
                    let encoded = if clause.is_assignment() {
                        self.cipher.storage_value(policy.mode, &text)?
                    } else {
                        self.cipher.search_value(policy.mode, &text)?
                    };
                    if encoded != text {
                        param.value = BoundValue::Text(encoded);
                        self.params_encrypted += 1;
                    }
                }
                ParamOrigin::EntityField { property } => {
                    debug!(column = %policy.column, property = %property, "Attached field handler");
                    let handler = FieldHandler::new(Arc::clone(self.cipher), policy);
                    param.handler = Some(if clause.kind.is_filter() {
                        handler.for_filter()
                    } else {
                        handler
                    });
                    self.handlers_attached += 1;
                }
            }
        }

        Ok(())
    }

    pub fn params_encrypted(&self) -> usize {
        self.params_encrypted
    }

    pub fn handlers_attached(&self) -> usize {
        self.handlers_attached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::KeyMaterial;
    use veil_core::{ClauseKind, EncryptionMode};

    fn cipher() -> Arc<FieldCipher> {
        Arc::new(FieldCipher::new(KeyMaterial::from_bytes(&[5u8; 32]).unwrap()).unwrap())
    }

    fn policy(mode: EncryptionMode) -> EncryptionPolicy {
        EncryptionPolicy {
            column: "email".into(),
            mode,
            replacement_column: None,
        }
    }

    #[test]
    fn arguments_are_encrypted_in_their_slots() {
        let cipher = cipher();
        let mut params = vec![
            BoundParam::argument(7i64),
            BoundParam::argument("%alice%"),
            BoundParam::argument(None::<String>),
        ];
        let clause = ConditionClause::new("email", "email LIKE ? OR ?", 0, ClauseKind::Where, 2)
            .with_param_index(1);

        let mut rewriter = ParameterRewriter::new(&cipher);
        rewriter
            .rewrite(&mut params, &clause, &policy(EncryptionMode::Fuzzy))
            .unwrap();

        assert_eq!(params[0].value, BoundValue::Integer(7));
        assert_eq!(
            params[1].value,
            BoundValue::Text(format!("%{}%", cipher.encrypt_fuzzy("alice").unwrap()))
        );
        assert_eq!(params[2].value, BoundValue::Null);
        assert_eq!(rewriter.params_encrypted(), 1);
    }

    #[test]
    fn entity_fields_get_handlers_not_ciphertext() {
        let cipher = cipher();
        let mut params = vec![BoundParam::entity_field("email", "a@b.c")];
        let clause = ConditionClause::new("email", "email = ?", 0, ClauseKind::Set, 1);

        let mut rewriter = ParameterRewriter::new(&cipher);
        rewriter
            .rewrite(&mut params, &clause, &policy(EncryptionMode::Overall))
            .unwrap();

        assert_eq!(params[0].value, BoundValue::text("a@b.c"));
        assert!(params[0].handler.is_some());
        assert_eq!(
            params[0].bind_value().unwrap(),
            BoundValue::Text(cipher.encrypt_overall("a@b.c").unwrap())
        );

        // A second pass must not stack another codec on top
        rewriter
            .rewrite(&mut params, &clause, &policy(EncryptionMode::Overall))
            .unwrap();
        assert_eq!(rewriter.handlers_attached(), 1);
        assert_eq!(params[0].value, BoundValue::text("a@b.c"));
    }

    #[test]
    fn entity_fields_in_filters_bind_as_search_operands() {
        let cipher = cipher();
        let mut params = vec![BoundParam::entity_field("email", "%alice%")];
        let clause = ConditionClause::new("email", "email LIKE ?", 0, ClauseKind::Where, 1);

        let mut rewriter = ParameterRewriter::new(&cipher);
        rewriter
            .rewrite(&mut params, &clause, &policy(EncryptionMode::Fuzzy))
            .unwrap();

        assert_eq!(params[0].value, BoundValue::text("%alice%"));
        assert_eq!(
            params[0].bind_value().unwrap(),
            BoundValue::Text(format!("%{}%", cipher.encrypt_fuzzy("alice").unwrap()))
        );
    }

    #[test]
    fn ciphertext_arguments_are_not_encrypted_twice() {
        let cipher = cipher();
        let encrypted = cipher.encrypt_overall("x").unwrap();
        let mut params = vec![BoundParam::argument(encrypted.as_str())];
        let clause = ConditionClause::new("email", "email = ?", 0, ClauseKind::Where, 1);

        let mut rewriter = ParameterRewriter::new(&cipher);
        rewriter
            .rewrite(&mut params, &clause, &policy(EncryptionMode::Overall))
            .unwrap();
        assert_eq!(params[0].value, BoundValue::Text(encrypted));
        assert_eq!(rewriter.params_encrypted(), 0);
    }

    #[test]
    fn missing_parameters_are_an_error() {
        let cipher = cipher();
        let mut params = vec![BoundParam::argument("x")];
        let clause = ConditionClause::new("email", "email IN (?, ?)", 0, ClauseKind::Where, 2);

        let mut rewriter = ParameterRewriter::new(&cipher);
        assert!(matches!(
            rewriter.rewrite(&mut params, &clause, &policy(EncryptionMode::Overall)),
            Err(VeilError::Validation { .. })
        ));
    }
}
