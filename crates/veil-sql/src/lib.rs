// SPDX-License-Identifier: Apache-2.0

//! SQL condition handling for veilsql
//!
//! Splits the `WHERE`, `HAVING` and `SET` clauses of a statement into atomic
//! conditions with exact byte offsets, and applies length-changing edits to
//! them while keeping later offsets valid.

pub mod buffer;
pub mod clause;
pub mod dialect;
pub mod lexer;
pub mod parser;
mod tables;

pub use buffer::SqlBuffer;
pub use clause::{ColumnToken, ConditionClause, LiteralToken};
pub use dialect::SqlDialectKind;
pub use parser::{ConditionParser, ParsedStatement};
