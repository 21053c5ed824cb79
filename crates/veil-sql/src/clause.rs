// SPDX-License-Identifier: Apache-2.0

//! Condition clauses
//!
//! An atomic condition (`WHERE`/`HAVING`) or assignment (`SET`) located in
//! a statement's canonical rendering.

use std::ops::Range;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use veil_core::{ClauseKind, VeilResult};

use crate::lexer::{self, TokenKind};

/// One atomic condition or assignment and where it sits in the statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionClause {
    /// Bare column name, alias prefix and quoting removed. Empty when the
    /// clause does not start with a plain column reference.
    pub column: CompactString,
    /// Verbatim clause text; updated in place as edits are applied
    pub source_text: String,
    /// Byte offset of `source_text` in the statement text
    pub source_start: usize,
    pub kind: ClauseKind,
    /// Number of `?` markers, i.e. bound parameters consumed by this clause
    pub placeholders: usize,
    /// Position of this clause's first bound parameter in the statement
    #[serde(default)]
    pub param_index: usize,
}

/// A literal value inside a clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralToken {
    /// Byte range relative to the clause text, including quotes
    pub span: Range<usize>,
    /// Unquoted value
    pub value: String,
    pub quoted: bool,
}

/// The column reference a clause is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnToken {
    /// Byte range relative to the clause text, including quotes
    pub span: Range<usize>,
    pub quote: Option<(char, char)>,
}

impl ColumnToken {
    /// Renders a replacement column name with the same quoting style
    pub fn render(&self, name: &str) -> String {
        match self.quote {
            Some((open, close)) => format!("{open}{name}{close}"),
            None => name.to_string(),
        }
    }
}

impl ConditionClause {
    pub fn new(
        column: impl Into<CompactString>,
        source_text: impl Into<String>,
        source_start: usize,
        kind: ClauseKind,
        placeholders: usize,
    ) -> Self {
        Self {
            column: column.into(),
            source_text: source_text.into(),
            source_start,
            kind,
            placeholders,
            param_index: 0,
        }
    }

    pub fn with_param_index(mut self, param_index: usize) -> Self {
        self.param_index = param_index;
        self
    }

    /// Bound parameter positions consumed by this clause
    pub fn param_slots(&self) -> Range<usize> {
        self.param_index..self.param_index + self.placeholders
    }

    pub fn source_end(&self) -> usize {
        self.source_start + self.source_text.len()
    }

    /// True when the clause compares against inline literals only
    pub fn is_inline(&self) -> bool {
        self.placeholders == 0
    }

    pub fn is_assignment(&self) -> bool {
        self.kind == ClauseKind::Set
    }

    /// The column reference at the head of the clause, as it currently reads
    pub fn column_token(&self) -> VeilResult<Option<ColumnToken>> {
        let tokens = lexer::tokenize(&self.source_text)?;
        Ok(lexer::subject_index(&tokens).map(|idx| ColumnToken {
            span: tokens[idx].span.clone(),
            quote: tokens[idx].quote_chars(),
        }))
    }

    /// String and numeric literals in the clause, left to right
    pub fn literals(&self) -> VeilResult<Vec<LiteralToken>> {
        let tokens = lexer::tokenize(&self.source_text)?;
        Ok(tokens
            .iter()
            .filter_map(|token| {
                let value = token.literal_value()?;
                Some(LiteralToken {
                    span: token.span.clone(),
                    value,
                    quoted: token.kind == TokenKind::String,
                })
            })
            .collect())
    }
}
