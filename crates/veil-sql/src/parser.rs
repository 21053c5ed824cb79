// SPDX-License-Identifier: Apache-2.0

//! Condition Parser
//!
//! Turns the condition-bearing clauses of a SELECT, UPDATE or DELETE into an
//! ordered list of atomic [`ConditionClause`]s:
//!
//! 1. Fast reject when the text has no `WHERE`, `HAVING` or `SET` word
//! 2. Parse with sqlparser and re-render the statement canonically
//! 3. Locate the top-level clause regions in the canonical text
//! 4. Split `WHERE`/`HAVING` on top-level `AND`/`OR` and `SET` on commas
//!
//! Offsets always refer to the canonical rendering, which is also the text
//! the rewriter must edit.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use sqlparser::ast::{SetExpr, Statement};
use sqlparser::parser::Parser;
use tracing::debug;
use veil_core::{ClauseKind, StatementKind, VeilError, VeilResult};

use crate::clause::ConditionClause;
use crate::dialect::SqlDialectKind;
use crate::lexer::{self, Token, TokenKind};
use crate::tables;

const SELECT_WHERE_END: &[&str] = &[
    "GROUP", "HAVING", "ORDER", "LIMIT", "OFFSET", "FETCH", "WINDOW", "QUALIFY", "FOR", "UNION",
    "EXCEPT", "INTERSECT",
];
const SELECT_HAVING_END: &[&str] = &[
    "ORDER", "LIMIT", "OFFSET", "FETCH", "WINDOW", "QUALIFY", "FOR", "UNION", "EXCEPT",
    "INTERSECT",
];
const UPDATE_SET_END: &[&str] = &["FROM", "WHERE", "RETURNING", "OUTPUT", "ORDER", "LIMIT"];
const MUTATION_WHERE_END: &[&str] = &["RETURNING", "OUTPUT", "ORDER", "LIMIT"];

fn condition_keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(where|having|set)\b").expect("condition keyword pattern is valid")
    })
}

/// Result of parsing one statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatement {
    /// Canonical rendering, or the input unchanged when prefiltered
    pub sql: String,
    pub kind: StatementKind,
    pub clauses: Vec<ConditionClause>,
    /// Total `?` markers anywhere in the statement
    pub placeholders: usize,
    /// Referenced tables, schema prefixes removed
    pub tables: Vec<String>,
}

impl ParsedStatement {
    fn unconditioned(sql: &str, kind: StatementKind) -> Self {
        Self {
            sql: sql.to_string(),
            kind,
            clauses: Vec::new(),
            placeholders: 0,
            tables: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionParser {
    dialect: SqlDialectKind,
}

enum Separator {
    /// Top-level `AND` / `OR`
    Connective,
    /// Top-level `,`
    Comma,
}

impl ConditionParser {
    pub fn new(dialect: SqlDialectKind) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> SqlDialectKind {
        self.dialect
    }

    /// Cheap check for a whole-word `WHERE`, `HAVING` or `SET`
    pub fn has_condition_keyword(sql: &str) -> bool {
        condition_keyword_regex().is_match(sql)
    }

    /// Parses `sql` into its atomic condition clauses.
    ///
    /// Returns an error for malformed SQL, for statements that are not the
    /// expected kind, and for constructs outside the supported subset (set
    /// operations, non-`?` placeholders).
    pub fn parse(&self, sql: &str, kind: StatementKind) -> VeilResult<ParsedStatement> {
        if !kind.is_interceptable() {
            return Err(VeilError::unsupported(format!(
                "{:?} statements carry no rewritable conditions",
                kind
            )));
        }

        if !Self::has_condition_keyword(sql) {
            return Ok(ParsedStatement::unconditioned(sql, kind));
        }

        let statement = self.parse_single(sql)?;
        let detected = statement_kind(&statement)?;
        if detected != kind {
            return Err(VeilError::unsupported(format!(
                "statement parsed as {:?} but was classified as {:?}",
                detected, kind
            )));
        }

        let canonical = statement.to_string();
        let tokens = lexer::tokenize(&canonical)?;
        if tokens.iter().any(|t| t.kind == TokenKind::ForeignPlaceholder) {
            return Err(VeilError::unsupported(
                "only `?` placeholders are supported",
            ));
        }

        let mut clauses = Vec::new();
        match kind {
            StatementKind::Select => {
                collect_filter(&canonical, &tokens, "WHERE", SELECT_WHERE_END, ClauseKind::Where, &mut clauses);
                collect_filter(&canonical, &tokens, "HAVING", SELECT_HAVING_END, ClauseKind::Having, &mut clauses);
            }
            StatementKind::Update => {
                if let Some(region) = clause_region(&tokens, "SET", UPDATE_SET_END) {
                    for part in split_top_level(&tokens, region, Separator::Comma) {
                        clauses.extend(build_clause(&canonical, &tokens, part, ClauseKind::Set));
                    }
                }
                collect_filter(&canonical, &tokens, "WHERE", MUTATION_WHERE_END, ClauseKind::Where, &mut clauses);
            }
            StatementKind::Delete => {
                collect_filter(&canonical, &tokens, "WHERE", MUTATION_WHERE_END, ClauseKind::Where, &mut clauses);
            }
            StatementKind::Insert | StatementKind::Other => {}
        }

        let placeholders = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Placeholder)
            .count();
        let tables = tables::collect_table_names(&statement, &canonical)?;

        debug!(kind = ?kind, clauses = clauses.len(), placeholders, "Parsed condition clauses");

        Ok(ParsedStatement {
            sql: canonical,
            kind,
            clauses,
            placeholders,
            tables,
        })
    }

    /// Names of the tables a statement reads or writes, schema prefixes removed
    pub fn table_names(&self, sql: &str) -> VeilResult<Vec<String>> {
        let statement = self.parse_single(sql)?;
        let canonical = statement.to_string();
        tables::collect_table_names(&statement, &canonical)
    }

    fn parse_single(&self, sql: &str) -> VeilResult<Statement> {
        let dialect = self.dialect.dialect();
        let mut statements = Parser::parse_sql(dialect.as_ref(), sql.trim())
            .map_err(|e| VeilError::parse(e.to_string()))?;

        if statements.len() != 1 {
            return Err(VeilError::unsupported(format!(
                "expected a single statement, found {}",
                statements.len()
            )));
        }

        Ok(statements.remove(0))
    }
}

fn statement_kind(statement: &Statement) -> VeilResult<StatementKind> {
    match statement {
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(_) => Ok(StatementKind::Select),
            _ => Err(VeilError::unsupported(
                "only plain SELECT bodies are rewritten",
            )),
        },
        Statement::Update { .. } => Ok(StatementKind::Update),
        Statement::Delete { .. } => Ok(StatementKind::Delete),
        Statement::Insert { .. } => Ok(StatementKind::Insert),
        _ => Ok(StatementKind::Other),
    }
}

fn collect_filter(
    canonical: &str,
    tokens: &[Token<'_>],
    keyword: &str,
    terminators: &[&str],
    kind: ClauseKind,
    out: &mut Vec<ConditionClause>,
) {
    let Some(region) = clause_region(tokens, keyword, terminators) else {
        return;
    };

    let mut parts = Vec::new();
    split_filter(tokens, region, &mut parts);
    out.extend(
        parts
            .into_iter()
            .filter_map(|part| build_clause(canonical, tokens, part, kind)),
    );
}

/// Token range following a top-level `keyword`, up to the next top-level terminator.
fn clause_region(tokens: &[Token<'_>], keyword: &str, terminators: &[&str]) -> Option<Range<usize>> {
    let mut depth = 0usize;
    let mut start = None;

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen => {
                depth += 1;
                continue;
            }
            TokenKind::RParen => {
                depth = depth.saturating_sub(1);
                continue;
            }
            _ => {}
        }
        if depth > 0 {
            continue;
        }

        match start {
            None if token.is_keyword(keyword) => start = Some(i + 1),
            Some(s) if token.is_any_keyword(terminators) => {
                return (s < i).then_some(s..i);
            }
            _ => {}
        }
    }

    start.filter(|&s| s < tokens.len()).map(|s| s..tokens.len())
}

/// Splits a filter expression into atomic conditions, descending into
/// parenthesised groups that themselves combine conditions.
fn split_filter(tokens: &[Token<'_>], range: Range<usize>, out: &mut Vec<Range<usize>>) {
    if range.is_empty() {
        return;
    }

    let inner = strip_enclosing_parens(tokens, range.clone());
    let parts = split_top_level(tokens, inner, Separator::Connective);
    if parts.len() <= 1 {
        out.push(range);
        return;
    }

    for part in parts {
        split_filter(tokens, part, out);
    }
}

fn strip_enclosing_parens(tokens: &[Token<'_>], mut range: Range<usize>) -> Range<usize> {
    while range.len() >= 2
        && tokens[range.start].kind == TokenKind::LParen
        && lexer::matching_paren(tokens, range.start) == Some(range.end - 1)
    {
        range = range.start + 1..range.end - 1;
    }
    range
}

fn split_top_level(tokens: &[Token<'_>], range: Range<usize>, separator: Separator) -> Vec<Range<usize>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = range.start;
    let mut open_between = false;

    for i in range.clone() {
        let token = &tokens[i];
        match token.kind {
            TokenKind::LParen => {
                depth += 1;
                continue;
            }
            TokenKind::RParen => {
                depth = depth.saturating_sub(1);
                continue;
            }
            _ => {}
        }
        if depth > 0 {
            continue;
        }

        let is_separator = match separator {
            Separator::Comma => token.kind == TokenKind::Comma,
            Separator::Connective => {
                if token.is_keyword("BETWEEN") {
                    open_between = true;
                    false
                } else if token.is_keyword("AND") && open_between {
                    // BETWEEN x AND y
                    open_between = false;
                    false
                } else {
                    token.is_any_keyword(&["AND", "OR"])
                }
            }
        };

        if is_separator {
            if start < i {
                parts.push(start..i);
            }
            start = i + 1;
        }
    }

    if start < range.end {
        parts.push(start..range.end);
    }
    parts
}

fn build_clause(
    canonical: &str,
    tokens: &[Token<'_>],
    range: Range<usize>,
    kind: ClauseKind,
) -> Option<ConditionClause> {
    let slice = tokens.get(range.clone())?;
    let start = slice.first()?.span.start;
    let end = slice.last()?.span.end;

    let column = lexer::subject_index(slice)
        .and_then(|idx| slice[idx].ident_value())
        .unwrap_or_default();
    let count_placeholders = |tokens: &[Token<'_>]| {
        tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Placeholder)
            .count()
    };
    let preceding = tokens.get(..range.start).map(count_placeholders)?;

    Some(
        ConditionClause::new(
            column,
            canonical.get(start..end)?,
            start,
            kind,
            count_placeholders(slice),
        )
        .with_param_index(preceding),
    )
}
