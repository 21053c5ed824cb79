// SPDX-License-Identifier: Apache-2.0

//! Statement Rewriter
//!
//! Edits clause text in place: the column of a filter clause is redirected to
//! its replacement column and inline literals are replaced with ciphertext.
//! Every edit goes through the [`SqlBuffer`], which keeps the statement text
//! and the running offset delta consistent for the clauses still to come.

use tracing::debug;

use veil_core::VeilResult;
use veil_sql::lexer::quote_string;
use veil_sql::{ConditionClause, SqlBuffer};

use crate::policy::EncryptionPolicy;
use crate::vault::FieldCipher;

pub struct StatementRewriter<'a> {
    cipher: &'a FieldCipher,
    buffer: SqlBuffer,
    text_edits: usize,
}

impl<'a> StatementRewriter<'a> {
    pub fn new(cipher: &'a FieldCipher, sql: impl Into<String>) -> Self {
        Self {
            cipher,
            buffer: SqlBuffer::new(sql),
            text_edits: 0,
        }
    }

    /// Aligns a clause with the edits made so far. Call once per clause,
    /// in statement order, before rewriting it.
    pub fn begin_clause(&self, clause: &mut ConditionClause) -> VeilResult<()> {
        self.buffer.rebase(clause)
    }

    /// Redirects a filter clause to the policy's replacement column.
    ///
    /// Assignments are never redirected. Returns the change in length.
    pub fn rewrite_column_name(
        &mut self,
        clause: &mut ConditionClause,
        policy: &EncryptionPolicy,
    ) -> VeilResult<isize> {
        if !clause.kind.is_filter() {
            return Ok(0);
        }
        let Some(replacement) = policy.replacement_column.as_deref() else {
            return Ok(0);
        };
        let Some(token) = clause.column_token()? else {
            return Ok(0);
        };

        let rendered = token.render(replacement);
        if clause.source_text.get(token.span.clone()) == Some(rendered.as_str()) {
            return Ok(0);
        }

        let diff = self.buffer.splice(clause, token.span, &rendered)?;
        self.text_edits += 1;
        debug!(column = %policy.column, replacement, "Redirected condition column");
        Ok(diff)
    }

    /// Encrypts the inline literals of a clause without placeholders.
    ///
    /// Filter literals keep their outer `LIKE` wildcards; assignment values
    /// are encrypted whole. Literals made only of wildcards and values that
    /// already are ciphertext are left alone. Returns the change in length.
    pub fn rewrite_literal_value(
        &mut self,
        clause: &mut ConditionClause,
        policy: &EncryptionPolicy,
    ) -> VeilResult<isize> {
        if !clause.is_inline() {
            return Ok(0);
        }

        let mut total = 0;
        // Right to left so earlier spans stay valid
        for literal in clause.literals()?.into_iter().rev() {
            let encoded = if clause.is_assignment() {
                self.cipher.storage_value(policy.mode, &literal.value)?
            } else {
                self.cipher.search_value(policy.mode, &literal.value)?
            };
            if encoded == literal.value {
                continue;
            }
            total += self
                .buffer
                .splice(clause, literal.span, &quote_string(&encoded))?;
            self.text_edits += 1;
        }

        if total != 0 {
            debug!(column = %policy.column, mode = %policy.mode, "Encrypted inline literal");
        }
        Ok(total)
    }

    pub fn text_edits(&self) -> usize {
        self.text_edits
    }

    pub fn sql(&self) -> &str {
        self.buffer.as_str()
    }

    pub fn finish(self) -> String {
        self.buffer.into_string()
    }
}
