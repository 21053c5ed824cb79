// SPDX-License-Identifier: Apache-2.0

//! Splice buffer
//!
//! Holds the statement text being rewritten together with the running
//! length delta of every edit applied so far. Clauses are edited strictly
//! left to right: each clause is rebased once onto the current delta before
//! its first edit, and every edit then shifts only the clauses after it.

use std::ops::Range;

use veil_core::{VeilError, VeilResult};

use crate::clause::ConditionClause;

#[derive(Debug, Clone)]
pub struct SqlBuffer {
    text: String,
    delta: isize,
}

impl SqlBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            delta: 0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Net change in length across all edits applied so far
    pub fn delta(&self) -> isize {
        self.delta
    }

    /// Moves a clause's start offset onto the current baseline.
    ///
    /// Must be called exactly once per clause, before its first edit.
    pub fn rebase(&self, clause: &mut ConditionClause) -> VeilResult<()> {
        let shifted = clause.source_start as isize + self.delta;
        if shifted < 0 {
            return Err(VeilError::validation(format!(
                "clause offset {} shifted below zero by {}",
                clause.source_start, self.delta
            )));
        }
        clause.source_start = shifted as usize;
        self.check_in_sync(clause)
    }

    /// Replaces `range` (relative to the clause text) in both the clause and
    /// the statement text. Returns the change in length.
    pub fn splice(
        &mut self,
        clause: &mut ConditionClause,
        range: Range<usize>,
        replacement: &str,
    ) -> VeilResult<isize> {
        self.check_in_sync(clause)?;

        let valid = range.start <= range.end
            && range.end <= clause.source_text.len()
            && clause.source_text.is_char_boundary(range.start)
            && clause.source_text.is_char_boundary(range.end);
        if !valid {
            return Err(VeilError::validation(format!(
                "edit range {:?} outside clause of length {}",
                range,
                clause.source_text.len()
            )));
        }

        let absolute = clause.source_start + range.start..clause.source_start + range.end;
        let diff = replacement.len() as isize - range.len() as isize;

        clause.source_text.replace_range(range, replacement);
        self.text.replace_range(absolute, replacement);
        self.delta += diff;

        Ok(diff)
    }

    fn check_in_sync(&self, clause: &ConditionClause) -> VeilResult<()> {
        let current = self.text.get(clause.source_start..clause.source_end());
        if current != Some(clause.source_text.as_str()) {
            return Err(VeilError::validation(format!(
                "clause at offset {} no longer matches statement text",
                clause.source_start
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::ClauseKind;

    #[test]
    fn edits_shift_later_clauses() {
        let sql = "SELECT * FROM t WHERE a = 1 AND b = 2";
        let mut buffer = SqlBuffer::new(sql);
        let mut first = ConditionClause::new("a", "a = 1", 22, ClauseKind::Where, 0);
        let mut second = ConditionClause::new("b", "b = 2", 32, ClauseKind::Where, 0);

        buffer.rebase(&mut first).unwrap();
        assert_eq!(buffer.splice(&mut first, 0..1, "alpha").unwrap(), 4);
        assert_eq!(buffer.splice(&mut first, 8..9, "'x'").unwrap(), 2);
        assert_eq!(first.source_text, "alpha = 'x'");

        buffer.rebase(&mut second).unwrap();
        assert_eq!(second.source_start, 38);
        assert_eq!(buffer.splice(&mut second, 0..1, "c").unwrap(), 0);

        assert_eq!(buffer.as_str(), "SELECT * FROM t WHERE alpha = 'x' AND c = 2");
        assert_eq!(buffer.delta(), 6);
    }

    #[test]
    fn shrinking_edits_produce_negative_delta() {
        let mut buffer = SqlBuffer::new("WHERE long_name = 1 AND x = 2");
        let mut first = ConditionClause::new("long_name", "long_name = 1", 6, ClauseKind::Where, 0);
        let mut second = ConditionClause::new("x", "x = 2", 24, ClauseKind::Where, 0);

        buffer.rebase(&mut first).unwrap();
        assert_eq!(buffer.splice(&mut first, 0..9, "n").unwrap(), -8);
        buffer.rebase(&mut second).unwrap();
        assert_eq!(second.source_start, 16);
        assert_eq!(&buffer.as_str()[second.source_start..second.source_end()], "x = 2");
    }

    #[test]
    fn out_of_sync_clause_is_rejected() {
        let mut buffer = SqlBuffer::new("WHERE a = 1");
        let mut clause = ConditionClause::new("a", "a = 2", 6, ClauseKind::Where, 0);
        assert!(buffer.splice(&mut clause, 0..1, "b").is_err());
        assert_eq!(buffer.as_str(), "WHERE a = 1");
    }

    #[test]
    fn range_outside_clause_is_rejected() {
        let mut buffer = SqlBuffer::new("WHERE a = 1");
        let mut clause = ConditionClause::new("a", "a = 1", 6, ClauseKind::Where, 0);
        assert!(buffer.splice(&mut clause, 3..9, "b").is_err());
    }
}
