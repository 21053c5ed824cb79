// SPDX-License-Identifier: Apache-2.0

//! Interception Pipeline
//!
//! One synchronous pass per outgoing statement:
//! 1. Consume the caller's toggle; a disabled toggle passes through
//! 2. Classify and prefilter on condition keywords
//! 3. Parse into atomic clauses against the canonical rendering
//! 4. Resolve policies by mapped type, or by table when no type is given
//! 5. Rewrite clause text and bound parameters left to right
//!
//! Any failure after the toggle is logged and the statement is dispatched
//! exactly as the caller built it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use veil_core::VeilResult;
use veil_sql::{ConditionParser, ParsedStatement, SqlDialectKind};

use super::handler::FieldHandler;
use super::params::ParameterRewriter;
use super::rewriter::StatementRewriter;
use super::toggle::{CallContext, InterceptionToggle};
use super::types::{BoundParam, BoundStatement, InterceptOutcome, PassthroughReason, StatementExecutor};
use crate::config::VeilConfig;
use crate::policy::{PolicyMap, PolicyRegistry, StaticPolicySource};
use crate::vault::{CredentialProvider, FieldCipher};

pub struct InterceptionPipeline {
    cipher: Arc<FieldCipher>,
    registry: Arc<PolicyRegistry>,
    parser: ConditionParser,
}

/// Result of rewriting a parsed statement, applied only if complete
struct Rewrite {
    sql: Option<String>,
    params: Vec<BoundParam>,
    clauses: usize,
    text_edits: usize,
    params_encrypted: usize,
    handlers_attached: usize,
}

impl InterceptionPipeline {
    pub fn new(
        cipher: Arc<FieldCipher>,
        registry: Arc<PolicyRegistry>,
        dialect: SqlDialectKind,
    ) -> Self {
        Self {
            cipher,
            registry,
            parser: ConditionParser::new(dialect),
        }
    }

    /// Builds the pipeline from configuration. Fails when no usable key can
    /// be loaded.
    pub fn from_config(
        config: &VeilConfig,
        provider: &dyn CredentialProvider,
    ) -> VeilResult<Self> {
        config.validate()?;

        let key = config.key.resolve(provider)?;
        let cipher = Arc::new(FieldCipher::with_block_size(key, config.fuzzy_block_size)?);
        let source = StaticPolicySource::from_config(&config.policies)?;
        let registry = Arc::new(PolicyRegistry::new(Arc::new(source)));

        info!(
            dialect = ?config.dialect,
            types = config.policies.len(),
            block_size = config.fuzzy_block_size,
            "Interception pipeline initialized"
        );

        Ok(Self::new(cipher, registry, config.dialect))
    }

    pub fn cipher(&self) -> &Arc<FieldCipher> {
        &self.cipher
    }

    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    pub fn parser(&self) -> &ConditionParser {
        &self.parser
    }

    /// Rewrites `stmt` in place. Never fails: problems are reported as a
    /// passthrough outcome with the statement untouched.
    pub fn intercept(&self, stmt: &mut BoundStatement, ctx: &mut CallContext) -> InterceptOutcome {
        if ctx.consume() == InterceptionToggle::Disabled {
            debug!(kind = ?stmt.kind, "Interception disabled for this statement");
            return InterceptOutcome::Passthrough(PassthroughReason::Disabled);
        }

        if !stmt.kind.is_interceptable() {
            return InterceptOutcome::Passthrough(PassthroughReason::NotInterceptable);
        }
        if !ConditionParser::has_condition_keyword(&stmt.sql) {
            return InterceptOutcome::Passthrough(PassthroughReason::NoConditions);
        }

        let parsed = match self.parser.parse(&stmt.sql, stmt.kind) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(
                    kind = ?stmt.kind,
                    error = %e,
                    "Statement not understood, dispatching unmodified"
                );
                debug!(sql = %stmt.sql, "Unparsed statement");
                return InterceptOutcome::Passthrough(PassthroughReason::ParseFailed {
                    message: e.to_string(),
                });
            }
        };

        if parsed.clauses.is_empty() {
            return InterceptOutcome::Passthrough(PassthroughReason::NoConditions);
        }

        let policies = match self.policies_for(stmt, &parsed) {
            Ok(Some(policies)) => policies,
            Ok(None) => return InterceptOutcome::Passthrough(PassthroughReason::NoPolicy),
            Err(e) => {
                warn!(error = %e, "Policy resolution failed, dispatching unmodified");
                return InterceptOutcome::Passthrough(PassthroughReason::RewriteFailed {
                    message: e.to_string(),
                });
            }
        };

        if parsed.placeholders != stmt.params.len() {
            warn!(
                placeholders = parsed.placeholders,
                bound = stmt.params.len(),
                "Placeholder count does not match bound parameters, dispatching unmodified"
            );
            return InterceptOutcome::Passthrough(PassthroughReason::ParamMismatch {
                placeholders: parsed.placeholders,
                bound: stmt.params.len(),
            });
        }

        match self.rewrite(parsed, &policies, &stmt.params) {
            Ok(rewrite) if rewrite.clauses == 0 => {
                InterceptOutcome::Passthrough(PassthroughReason::NoPolicy)
            }
            Ok(rewrite) => {
                if let Some(sql) = rewrite.sql {
                    stmt.sql = sql;
                }
                stmt.params = rewrite.params;
                debug!(
                    clauses = rewrite.clauses,
                    text_edits = rewrite.text_edits,
                    params_encrypted = rewrite.params_encrypted,
                    handlers_attached = rewrite.handlers_attached,
                    "Statement rewritten"
                );
                InterceptOutcome::Rewritten {
                    clauses: rewrite.clauses,
                    text_edits: rewrite.text_edits,
                    params_encrypted: rewrite.params_encrypted,
                    handlers_attached: rewrite.handlers_attached,
                }
            }
            Err(e) => {
                warn!(kind = ?stmt.kind, error = %e, "Rewrite failed, dispatching unmodified");
                InterceptOutcome::Passthrough(PassthroughReason::RewriteFailed {
                    message: e.to_string(),
                })
            }
        }
    }

    /// Intercepts and hands the statement to the executor
    pub fn dispatch<E>(
        &self,
        mut stmt: BoundStatement,
        ctx: &mut CallContext,
        executor: &E,
    ) -> VeilResult<E::Output>
    where
        E: StatementExecutor + ?Sized,
    {
        self.intercept(&mut stmt, ctx);
        let values = stmt.bind_values()?;
        executor.execute(&stmt.sql, &values)
    }

    /// Read path for one column value.
    ///
    /// Protected columns of `mapped_type` must decrypt; every other value is
    /// decrypted only if it looks like ciphertext.
    pub fn decode_column(
        &self,
        mapped_type: Option<&str>,
        column: &str,
        value: &str,
    ) -> VeilResult<String> {
        if let Some(mapped_type) = mapped_type {
            let policies = self.registry.resolve(mapped_type)?;
            if let Some(policy) = policies.get(column) {
                return FieldHandler::new(Arc::clone(&self.cipher), policy).decode(value);
            }
        }
        Ok(self.cipher.decrypt_lenient(value))
    }

    fn policies_for(
        &self,
        stmt: &BoundStatement,
        parsed: &ParsedStatement,
    ) -> VeilResult<Option<Arc<PolicyMap>>> {
        if let Some(mapped_type) = &stmt.mapped_type {
            let map = self.registry.resolve(mapped_type)?;
            return Ok((!map.is_empty()).then_some(map));
        }

        let mut merged: Option<PolicyMap> = None;
        for table in &parsed.tables {
            let Some(map) = self.registry.resolve_table(table)? else {
                continue;
            };
            match merged.as_mut() {
                Some(existing) => existing.absorb(&map),
                None => merged = Some(PolicyMap::clone(&map)),
            }
        }
        Ok(merged.filter(|m| !m.is_empty()).map(Arc::new))
    }

    fn rewrite(
        &self,
        parsed: ParsedStatement,
        policies: &PolicyMap,
        params: &[BoundParam],
    ) -> VeilResult<Rewrite> {
        let mut text = StatementRewriter::new(&self.cipher, parsed.sql);
        let mut values = ParameterRewriter::new(&self.cipher);
        let mut params = params.to_vec();
        let mut matched = 0;

        for mut clause in parsed.clauses {
            let Some(policy) = policies.get(&clause.column) else {
                continue;
            };
            matched += 1;

            text.begin_clause(&mut clause)?;
            text.rewrite_column_name(&mut clause, policy)?;
            if clause.is_inline() {
                text.rewrite_literal_value(&mut clause, policy)?;
            } else {
                values.rewrite(&mut params, &clause, policy)?;
            }
        }

        let text_edits = text.text_edits();
        Ok(Rewrite {
            sql: (text_edits > 0).then(|| text.finish()),
            params,
            clauses: matched,
            text_edits,
            params_encrypted: values.params_encrypted(),
            handlers_attached: values.handlers_attached(),
        })
    }
}

impl std::fmt::Debug for InterceptionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptionPipeline")
            .field("cipher", &self.cipher)
            .field("dialect", &self.parser.dialect())
            .field("cached_types", &self.registry.cached_types())
            .finish()
    }
}
