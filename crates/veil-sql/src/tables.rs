// SPDX-License-Identifier: Apache-2.0

//! Table name extraction
//!
//! Queries are walked through the sqlparser AST. UPDATE and DELETE shapes
//! differ between sqlparser releases, so those are scanned from the
//! canonical rendering instead.

use sqlparser::ast::{ObjectName, ObjectNamePart, Query, Select, SetExpr, Statement, TableFactor};
use veil_core::VeilResult;

use crate::lexer::{self, Token, TokenKind};

/// Keywords directly followed by a table reference in a mutation
const TABLE_INTRODUCERS: &[&str] = &["UPDATE", "FROM", "JOIN", "USING", "INTO"];

pub(crate) fn collect_table_names(statement: &Statement, canonical: &str) -> VeilResult<Vec<String>> {
    let mut names = Vec::new();
    match statement {
        Statement::Query(query) => collect_query(query, &mut names),
        _ => scan_mutation(&lexer::tokenize(canonical)?, &mut names),
    }

    let mut unique: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !unique.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            unique.push(name);
        }
    }
    Ok(unique)
}

fn last_part(name: &ObjectName) -> Option<String> {
    match name.0.last()? {
        ObjectNamePart::Identifier(ident) => Some(ident.value.clone()),
        _ => None,
    }
}

fn collect_query(query: &Query, names: &mut Vec<String>) {
    if let Some(ref with) = query.with {
        for cte in &with.cte_tables {
            collect_query(&cte.query, names);
        }
    }
    collect_set_expr(&query.body, names);
}

fn collect_set_expr(set_expr: &SetExpr, names: &mut Vec<String>) {
    match set_expr {
        SetExpr::Select(select) => collect_select(select, names),
        SetExpr::Query(query) => collect_query(query, names),
        SetExpr::SetOperation { left, right, .. } => {
            collect_set_expr(left, names);
            collect_set_expr(right, names);
        }
        _ => {}
    }
}

fn collect_select(select: &Select, names: &mut Vec<String>) {
    for twj in &select.from {
        collect_factor(&twj.relation, names);
        for join in &twj.joins {
            collect_factor(&join.relation, names);
        }
    }
}

fn collect_factor(factor: &TableFactor, names: &mut Vec<String>) {
    match factor {
        TableFactor::Table { name, .. } => names.extend(last_part(name)),
        TableFactor::Derived { subquery, .. } => collect_query(subquery, names),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            collect_factor(&table_with_joins.relation, names);
            for join in &table_with_joins.joins {
                collect_factor(&join.relation, names);
            }
        }
        _ => {}
    }
}

fn scan_mutation(tokens: &[Token<'_>], names: &mut Vec<String>) {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            _ if depth == 0 && token.is_any_keyword(TABLE_INTRODUCERS) => {
                names.extend(dotted_name_at(tokens, i + 1));
            }
            _ => {}
        }
    }
}

/// Last part of the dotted identifier chain starting at `start`.
fn dotted_name_at(tokens: &[Token<'_>], start: usize) -> Option<String> {
    let first = tokens.get(start)?;
    if !first.is_identifier() || first.is_any_keyword(TABLE_INTRODUCERS) {
        return None;
    }

    let mut last = start;
    while tokens.get(last + 1).is_some_and(|t| t.kind == TokenKind::Dot)
        && tokens.get(last + 2).is_some_and(Token::is_identifier)
    {
        last += 2;
    }

    // `UPDATE t SET ... FROM (SELECT ...)` and similar yield no name
    if tokens.get(last + 1).is_some_and(|t| t.kind == TokenKind::LParen) {
        return None;
    }
    tokens[last].ident_value()
}

#[cfg(test)]
mod tests {
    use crate::parser::ConditionParser;

    fn names(sql: &str) -> Vec<String> {
        ConditionParser::default().table_names(sql).unwrap()
    }

    #[test]
    fn query_tables_include_subqueries_and_ctes() {
        assert_eq!(
            names("WITH r AS (SELECT * FROM t_region) SELECT * FROM (SELECT * FROM t_user) x JOIN r ON r.id = x.rid"),
            vec!["t_region", "t_user", "r"]
        );
    }

    #[test]
    fn duplicates_are_removed_case_insensitively() {
        assert_eq!(names("SELECT * FROM t_user a JOIN T_USER b ON a.id = b.pid"), vec!["t_user"]);
    }

    #[test]
    fn mutation_tables_strip_schema_and_quotes() {
        assert_eq!(names("UPDATE app.\"t_user\" SET a = 1 WHERE id = 2"), vec!["t_user"]);
        assert_eq!(names("DELETE FROM `shop`.`orders` WHERE id = 2"), vec!["orders"]);
    }
}
