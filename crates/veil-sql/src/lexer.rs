// SPDX-License-Identifier: Apache-2.0

//! Restricted SQL lexer
//!
//! Tokenizes the canonical rendering produced by sqlparser so clause
//! boundaries, column identifiers, literals and placeholders can be located
//! by exact byte span. Only the grammar needed for condition splitting is
//! recognised; everything else becomes an `Operator` token.

use std::ops::Range;

use veil_core::{VeilError, VeilResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Unquoted identifier or keyword
    Word,
    /// `"ident"`, `` `ident` `` or `[ident]`
    QuotedIdent,
    /// `'text'`
    String,
    Number,
    /// The `?` bound-parameter marker
    Placeholder,
    /// `$1` or `:name` style markers, which are not supported
    ForeignPlaceholder,
    LParen,
    RParen,
    Comma,
    Dot,
    Operator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub span: Range<usize>,
}

impl<'a> Token<'a> {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_any_keyword(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|kw| self.is_keyword(kw))
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent)
    }

    /// Opening and closing quote characters of a quoted identifier
    pub fn quote_chars(&self) -> Option<(char, char)> {
        if self.kind != TokenKind::QuotedIdent {
            return None;
        }
        let open = self.text.chars().next()?;
        let close = self.text.chars().last()?;
        Some((open, close))
    }

    /// Identifier value with quoting removed
    pub fn ident_value(&self) -> Option<String> {
        match self.kind {
            TokenKind::Word => Some(self.text.to_string()),
            TokenKind::QuotedIdent => {
                let (_, close) = self.quote_chars()?;
                Some(unquote(self.text, close))
            }
            _ => None,
        }
    }

    /// Literal value of a string or number token
    pub fn literal_value(&self) -> Option<String> {
        match self.kind {
            TokenKind::String => Some(unquote(self.text, '\'')),
            TokenKind::Number => Some(self.text.to_string()),
            _ => None,
        }
    }
}

/// Strips the surrounding quote characters and collapses doubled closers.
fn unquote(text: &str, close: char) -> String {
    let mut chars = text.chars();
    chars.next();
    chars.next_back();
    let inner = chars.as_str();
    let doubled: String = [close, close].iter().collect();
    inner.replace(&doubled, &close.to_string())
}

/// Quotes a string literal, doubling embedded single quotes.
pub fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub fn tokenize(input: &str) -> VeilResult<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while let Some(c) = input[pos..].chars().next() {
        let start = pos;
        let next = input[pos + c.len_utf8()..].chars().next();

        let kind = match c {
            c if c.is_whitespace() => {
                pos += c.len_utf8();
                continue;
            }
            '\'' => {
                pos = scan_quoted(input, pos, '\'')?;
                TokenKind::String
            }
            '"' | '`' => {
                pos = scan_quoted(input, pos, c)?;
                TokenKind::QuotedIdent
            }
            '[' => {
                pos = scan_quoted(input, pos, ']')?;
                TokenKind::QuotedIdent
            }
            '?' => {
                pos += 1;
                TokenKind::Placeholder
            }
            '$' if next.is_some_and(|n| n.is_ascii_digit()) => {
                pos = scan_while(input, pos + 1, |ch| ch.is_ascii_digit());
                TokenKind::ForeignPlaceholder
            }
            ':' if next == Some(':') => {
                pos += 2;
                TokenKind::Operator
            }
            ':' if next.is_some_and(is_word_start) => {
                pos = scan_while(input, pos + 1, is_word_char);
                TokenKind::ForeignPlaceholder
            }
            '(' => {
                pos += 1;
                TokenKind::LParen
            }
            ')' => {
                pos += 1;
                TokenKind::RParen
            }
            ',' => {
                pos += 1;
                TokenKind::Comma
            }
            '.' => {
                pos += 1;
                TokenKind::Dot
            }
            c if c.is_ascii_digit() => {
                pos = scan_number(input, pos);
                TokenKind::Number
            }
            c if is_word_start(c) => {
                pos = scan_while(input, pos, is_word_char);
                TokenKind::Word
            }
            c => {
                pos += c.len_utf8();
                TokenKind::Operator
            }
        };

        tokens.push(Token {
            kind,
            text: &input[start..pos],
            span: start..pos,
        });
    }

    Ok(tokens)
}

fn scan_while(input: &str, from: usize, accept: impl Fn(char) -> bool) -> usize {
    input[from..]
        .char_indices()
        .find(|&(_, c)| !accept(c))
        .map(|(i, _)| from + i)
        .unwrap_or(input.len())
}

fn scan_number(input: &str, from: usize) -> usize {
    let mut end = from;
    let mut prev = '\0';
    for (i, c) in input[from..].char_indices() {
        let exponent_sign = (c == '+' || c == '-') && (prev == 'e' || prev == 'E');
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' || exponent_sign {
            end = from + i + c.len_utf8();
            prev = c;
        } else {
            break;
        }
    }
    end
}

/// Scans a quoted token starting at `from`; a doubled closer is an escape.
fn scan_quoted(input: &str, from: usize, close: char) -> VeilResult<usize> {
    let body_start = from + 1;
    let mut chars = input[body_start..].char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != close {
            continue;
        }
        if chars.peek().is_some_and(|&(_, n)| n == close) {
            chars.next();
            continue;
        }
        return Ok(body_start + i + c.len_utf8());
    }

    Err(VeilError::parse(format!(
        "unterminated quoted token starting at offset {}",
        from
    )))
}

/// Index of the parenthesis closing the one at `open`, if balanced.
pub fn matching_paren(tokens: &[Token<'_>], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Locates the column a condition or assignment is about.
///
/// Skips leading parentheses and `NOT`, then follows a dotted identifier
/// chain (`alias.column`, `schema.table.column`) and returns the index of its
/// last part. Function calls and non-identifier operands yield `None`.
pub fn subject_index(tokens: &[Token<'_>]) -> Option<usize> {
    let mut i = 0;
    while tokens
        .get(i)
        .is_some_and(|t| t.kind == TokenKind::LParen || t.is_keyword("NOT"))
    {
        i += 1;
    }

    if !tokens.get(i)?.is_identifier() {
        return None;
    }

    let mut last = i;
    while tokens.get(last + 1).is_some_and(|t| t.kind == TokenKind::Dot)
        && tokens.get(last + 2).is_some_and(Token::is_identifier)
    {
        last += 2;
    }

    if tokens.get(last + 1).is_some_and(|t| t.kind == TokenKind::LParen) {
        return None;
    }

    Some(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        tokenize(sql).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_condition() {
        use TokenKind::*;
        assert_eq!(
            kinds("u.phone = ? AND name LIKE '%a''b%'"),
            vec![Word, Dot, Word, Operator, Placeholder, Word, Word, Word, String]
        );
    }

    #[test]
    fn spans_are_byte_offsets() {
        let sql = "名字 = '张三'";
        let tokens = tokenize(sql).unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(&sql[tokens[0].span.clone()], "名字");
        assert_eq!(&sql[tokens[2].span.clone()], "'张三'");
        assert_eq!(tokens[2].literal_value().as_deref(), Some("张三"));
    }

    #[test]
    fn quoted_identifiers_are_unquoted() {
        let tokens = tokenize(r#""my""col" `b` [c d]"#).unwrap();
        assert!(tokens.iter().all(|t| t.kind == TokenKind::QuotedIdent));
        assert_eq!(tokens[0].ident_value().as_deref(), Some("my\"col"));
        assert_eq!(tokens[1].ident_value().as_deref(), Some("b"));
        assert_eq!(tokens[2].ident_value().as_deref(), Some("c d"));
        assert_eq!(tokens[2].quote_chars(), Some(('[', ']')));
    }

    #[test]
    fn foreign_placeholders_are_flagged() {
        use TokenKind::*;
        assert_eq!(kinds("a = $1"), vec![Word, Operator, ForeignPlaceholder]);
        assert_eq!(kinds("a = :name"), vec![Word, Operator, ForeignPlaceholder]);
        assert_eq!(kinds("a::INT"), vec![Word, Operator, Word]);
    }

    #[test]
    fn numbers_with_exponents() {
        let tokens = tokenize("x = 1.5e-3").unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Number);
        assert_eq!(tokens[2].text, "1.5e-3");
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(tokenize("a = 'oops").is_err());
    }

    #[test]
    fn subject_follows_alias_chain() {
        let tokens = tokenize("(NOT u.phone = ?)").unwrap();
        let idx = subject_index(&tokens).unwrap();
        assert_eq!(tokens[idx].text, "phone");

        let tokens = tokenize("CONCAT(a, b) = ?").unwrap();
        assert_eq!(subject_index(&tokens), None);

        let tokens = tokenize("'x' = phone").unwrap();
        assert_eq!(subject_index(&tokens), None);
    }

    #[test]
    fn matching_paren_handles_nesting() {
        let tokens = tokenize("(a IN (1, 2)) AND b").unwrap();
        assert_eq!(matching_paren(&tokens, 0), Some(8));
        assert_eq!(matching_paren(&tokens, 3), Some(7));
    }

    #[test]
    fn quote_string_doubles_quotes() {
        assert_eq!(quote_string("it's"), "'it''s'");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn quoted_literal_survives_tokenizing(value in "[^\\x00]{0,24}") {
            let clause = format!("col = {}", quote_string(&value));
            let tokens = tokenize(&clause).unwrap();
            prop_assert_eq!(tokens.len(), 3);
            prop_assert_eq!(tokens[2].kind, TokenKind::String);
            prop_assert_eq!(tokens[2].literal_value(), Some(value));
        }
    }
}
