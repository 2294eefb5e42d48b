//! Minimal schema compiler: turns a restricted `CREATE TABLE` fragment into
//! an ordered column descriptor vector and a fixed row stride.
//!
//! This is a tiny recognizer for one statement shape, not a general SQL
//! parser — the full tokenizer/AST machinery lives in the separate
//! general-purpose SQL engine, which is out of scope for this crate.

use crate::config::{DEFAULT_TEXT_LEN, MAX_COLUMNS, MAX_COLUMN_NAME_LEN, MAX_TEXT_LEN};
use crate::error::{RistrettoError, RistrettoResult};

/// On-disk type tag for a column. `Nullable` (4) is reserved by the file
/// format for a future per-row null bitmap; the current schema compiler
/// never emits it — see the Null-vs-zero design note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ColumnType {
    Integer = 1,
    Real = 2,
    Text = 3,
    Nullable = 4,
}

impl ColumnType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ColumnType::Integer),
            2 => Some(ColumnType::Real),
            3 => Some(ColumnType::Text),
            4 => Some(ColumnType::Nullable),
            _ => None,
        }
    }
}

/// A single column's shape and placement within a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Truncated/padded to `MAX_COLUMN_NAME_LEN` bytes on disk.
    pub name: String,
    pub col_type: ColumnType,
    /// Byte length of this column's slot within the row.
    pub length: u16,
    /// Byte offset of this column's slot within the row.
    pub offset: u16,
}

/// An ordered set of column descriptors and the resulting row stride.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<ColumnDescriptor>,
    pub row_stride: u32,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Compiles `CREATE TABLE <name> ( <col> [, <col> ...] )` into a [`TableSchema`].
///
/// `<col>` is `<ident> <type>`, `<type>` is one of `INTEGER`, `REAL`,
/// `TEXT(<N>)`, or bare `TEXT` (defaults to 64 bytes). Anything else —
/// unknown types, missing parens, a missing type, zero columns, or more
/// than [`MAX_COLUMNS`] columns — is rejected.
pub fn compile(schema_sql: &str) -> RistrettoResult<TableSchema> {
    let tokens = tokenize(schema_sql)?;
    let mut pos = 0usize;

    expect_keyword(&tokens, &mut pos, "CREATE")?;
    expect_keyword(&tokens, &mut pos, "TABLE")?;
    let _table_name = next_ident(&tokens, &mut pos)?;
    expect_punct(&tokens, &mut pos, "(")?;

    let mut columns = Vec::new();
    let mut offset: u32 = 0;

    loop {
        if peek_punct(&tokens, pos, ")") {
            break;
        }
        let col_name = next_ident(&tokens, &mut pos)?;
        let type_tok = next_token(&tokens, &mut pos)
            .ok_or_else(|| RistrettoError::Schema("expected column type".into()))?;

        let (col_type, length) = parse_type(&tokens, &mut pos, &type_tok)?;

        if columns.len() >= MAX_COLUMNS {
            return Err(RistrettoError::CapacityExceeded(format!(
                "schema defines more than {MAX_COLUMNS} columns"
            )));
        }

        let truncated_name: String = col_name.chars().take(MAX_COLUMN_NAME_LEN).collect();
        columns.push(ColumnDescriptor {
            name: truncated_name,
            col_type,
            length: length as u16,
            offset: offset as u16,
        });
        offset += length as u32;

        if peek_punct(&tokens, pos, ",") {
            pos += 1;
            continue;
        }
        break;
    }

    expect_punct(&tokens, &mut pos, ")")?;
    if pos != tokens.len() {
        return Err(RistrettoError::Schema(
            "unexpected trailing tokens after ')'".into(),
        ));
    }

    if columns.is_empty() {
        return Err(RistrettoError::Schema(
            "a table must declare at least one column".into(),
        ));
    }

    Ok(TableSchema {
        columns,
        row_stride: offset,
    })
}

fn parse_type(
    tokens: &[Token],
    pos: &mut usize,
    type_tok: &Token,
) -> RistrettoResult<(ColumnType, usize)> {
    let Token::Ident(name) = type_tok else {
        return Err(RistrettoError::Schema(format!(
            "expected a column type, found {type_tok:?}"
        )));
    };
    match name.to_ascii_uppercase().as_str() {
        "INTEGER" => Ok((ColumnType::Integer, 8)),
        "REAL" => Ok((ColumnType::Real, 8)),
        "TEXT" => {
            if peek_punct(tokens, *pos, "(") {
                *pos += 1;
                let n = next_integer(tokens, pos)?;
                expect_punct(tokens, pos, ")")?;
                let clamped = if n == 0 {
                    DEFAULT_TEXT_LEN
                } else {
                    n.min(MAX_TEXT_LEN as u64) as usize
                };
                Ok((ColumnType::Text, clamped))
            } else {
                Ok((ColumnType::Text, DEFAULT_TEXT_LEN))
            }
        }
        other => Err(RistrettoError::Schema(format!("unknown column type {other}"))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Integer(u64),
    Punct(char),
}

fn tokenize(sql: &str) -> RistrettoResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '(' || c == ')' || c == ',' {
            tokens.push(Token::Punct(c));
            chars.next();
            continue;
        }
        if c.is_ascii_digit() {
            let mut digits = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    digits.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value: u64 = digits
                .parse()
                .map_err(|_| RistrettoError::Schema(format!("invalid integer literal {digits}")))?;
            tokens.push(Token::Integer(value));
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(ident));
            continue;
        }
        return Err(RistrettoError::Schema(format!(
            "unexpected character '{c}' in schema"
        )));
    }

    Ok(tokens)
}

fn next_token(tokens: &[Token], pos: &mut usize) -> Option<Token> {
    let tok = tokens.get(*pos).cloned();
    if tok.is_some() {
        *pos += 1;
    }
    tok
}

fn expect_keyword(tokens: &[Token], pos: &mut usize, keyword: &str) -> RistrettoResult<()> {
    match tokens.get(*pos) {
        Some(Token::Ident(ident)) if ident.eq_ignore_ascii_case(keyword) => {
            *pos += 1;
            Ok(())
        }
        other => Err(RistrettoError::Schema(format!(
            "expected '{keyword}', found {other:?}"
        ))),
    }
}

fn next_ident(tokens: &[Token], pos: &mut usize) -> RistrettoResult<String> {
    match tokens.get(*pos) {
        Some(Token::Ident(ident)) => {
            *pos += 1;
            Ok(ident.clone())
        }
        other => Err(RistrettoError::Schema(format!(
            "expected an identifier, found {other:?}"
        ))),
    }
}

fn next_integer(tokens: &[Token], pos: &mut usize) -> RistrettoResult<u64> {
    match tokens.get(*pos) {
        Some(Token::Integer(n)) => {
            *pos += 1;
            Ok(*n)
        }
        other => Err(RistrettoError::Schema(format!(
            "expected an integer literal, found {other:?}"
        ))),
    }
}

fn expect_punct(tokens: &[Token], pos: &mut usize, p: &str) -> RistrettoResult<()> {
    let expected = p.chars().next().unwrap();
    match tokens.get(*pos) {
        Some(Token::Punct(c)) if *c == expected => {
            *pos += 1;
            Ok(())
        }
        other => Err(RistrettoError::Schema(format!(
            "expected '{p}', found {other:?}"
        ))),
    }
}

fn peek_punct(tokens: &[Token], pos: usize, p: &str) -> bool {
    let expected = p.chars().next().unwrap();
    matches!(tokens.get(pos), Some(Token::Punct(c)) if *c == expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_basic_schema() {
        let schema =
            compile("CREATE TABLE users (id INTEGER, name TEXT(32), age INTEGER)").unwrap();
        assert_eq!(schema.column_count(), 3);
        assert_eq!(schema.row_stride, 48);
        let offsets: Vec<u16> = schema.columns.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 8, 40]);
        let lengths: Vec<u16> = schema.columns.iter().map(|c| c.length).collect();
        assert_eq!(lengths, vec![8, 32, 8]);
        assert_eq!(schema.columns[0].col_type, ColumnType::Integer);
        assert_eq!(schema.columns[1].col_type, ColumnType::Text);
        assert_eq!(schema.columns[2].col_type, ColumnType::Integer);
    }

    #[test]
    fn bare_text_defaults_to_64() {
        let schema = compile("CREATE TABLE t (s TEXT)").unwrap();
        assert_eq!(schema.columns[0].length, 64);
    }

    #[test]
    fn text_length_is_clamped_to_255() {
        let schema = compile("CREATE TABLE t (s TEXT(9000))").unwrap();
        assert_eq!(schema.columns[0].length, 255);
    }

    #[test]
    fn text_zero_defaults_to_64_like_bare_text() {
        let schema = compile("CREATE TABLE t (s TEXT(0))").unwrap();
        assert_eq!(schema.columns[0].length, 64);
    }

    #[test]
    fn exactly_max_columns_compiles_and_fits_the_header() {
        let cols: Vec<String> = (0..MAX_COLUMNS).map(|i| format!("c{i} INTEGER")).collect();
        let sql = format!("CREATE TABLE x ({})", cols.join(", "));
        let schema = compile(&sql).unwrap();
        assert_eq!(schema.column_count(), MAX_COLUMNS);
        // Last descriptor must end at or before the header boundary: base + 16 <= 256.
        let last_base = 40 + (MAX_COLUMNS - 1) * crate::config::COLUMN_DESCRIPTOR_SIZE;
        assert!(last_base + crate::config::COLUMN_DESCRIPTOR_SIZE <= crate::config::HEADER_SIZE);
    }

    #[test]
    fn names_longer_than_eight_are_truncated() {
        let schema = compile("CREATE TABLE t (abcdefghij INTEGER)").unwrap();
        assert_eq!(schema.columns[0].name, "abcdefgh");
    }

    #[test]
    fn rejects_empty_string() {
        assert!(compile("").is_err());
    }

    #[test]
    fn rejects_zero_columns() {
        assert!(compile("CREATE TABLE x ()").is_err());
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(compile("CREATE TABLE x (a BLOB)").is_err());
    }

    #[test]
    fn rejects_more_than_max_columns() {
        let cols: Vec<String> = (0..15).map(|i| format!("c{i} INTEGER")).collect();
        let sql = format!("CREATE TABLE x ({})", cols.join(", "));
        assert!(compile(&sql).is_err());
    }

    #[test]
    fn rejects_missing_parens() {
        assert!(compile("CREATE TABLE x a INTEGER").is_err());
    }
}
