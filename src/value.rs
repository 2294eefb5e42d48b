//! Tagged value model and the row codec that packs/unpacks it against a
//! [`TableSchema`](crate::schema::TableSchema).

use tracing::warn;

use crate::error::{RistrettoError, RistrettoResult};
use crate::schema::{ColumnDescriptor, ColumnType, TableSchema};

/// A runtime value for one column. Not persisted directly — [`pack`] encodes
/// it into a column's slot, [`unpack`] decodes it back out.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    /// Owned bytes; the caller is responsible for the allocation produced
    /// by `unpack` (Rust's ownership makes "releasing" automatic on drop).
    Text(Vec<u8>),
    /// Encoded as all-zero bytes in the column's slot. Indistinguishable
    /// from a legitimately stored zero integer/real on unpack — see the
    /// null-vs-zero design note.
    Null,
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Null => "NULL",
        }
    }

    fn matches(&self, col_type: ColumnType) -> bool {
        match (self, col_type) {
            (Value::Null, _) => true,
            (Value::Integer(_), ColumnType::Integer) => true,
            (Value::Real(_), ColumnType::Real) => true,
            (Value::Text(_), ColumnType::Text) => true,
            _ => false,
        }
    }
}

/// Packs one row's values into `row_buf`, which must be exactly
/// `schema.row_stride` bytes. The buffer is zeroed first; every column not
/// explicitly set by a non-null value is left zeroed (observationally a
/// Null).
pub fn pack(schema: &TableSchema, values: &[Value], row_buf: &mut [u8]) -> RistrettoResult<()> {
    debug_assert_eq!(row_buf.len(), schema.row_stride as usize);
    if values.len() != schema.columns.len() {
        return Err(RistrettoError::Schema(format!(
            "expected {} values, got {}",
            schema.columns.len(),
            values.len()
        )));
    }
    for (value, col) in values.iter().zip(schema.columns.iter()) {
        if !value.matches(col.col_type) {
            return Err(RistrettoError::TypeMismatch {
                column: col.name.clone(),
                expected: col.col_type,
                got: value.type_name(),
            });
        }
    }

    row_buf.fill(0);
    for (value, col) in values.iter().zip(schema.columns.iter()) {
        let slot = &mut row_buf[col.offset as usize..(col.offset + col.length) as usize];
        pack_one(col, value, slot);
    }

    Ok(())
}

fn pack_one(col: &ColumnDescriptor, value: &Value, slot: &mut [u8]) {
    match value {
        Value::Null => {
            // slot is already zeroed.
        }
        Value::Integer(v) => slot.copy_from_slice(&v.to_ne_bytes()),
        Value::Real(v) => slot.copy_from_slice(&v.to_ne_bytes()),
        Value::Text(bytes) => {
            let max_len = slot.len() - 1; // last byte reserved for NUL
            let copy_len = bytes.len().min(max_len);
            if bytes.len() > max_len {
                warn!(
                    column = %col.name,
                    value_len = bytes.len(),
                    capacity = max_len,
                    "text value truncated to fit column"
                );
            }
            slot[..copy_len].copy_from_slice(&bytes[..copy_len]);
            slot[copy_len] = 0;
        }
    }
}

/// Unpacks one row's worth of column slots from `row_buf` into a fresh
/// `Vec<Value>`. Text columns allocate; Integer/Real/Null do not.
pub fn unpack(schema: &TableSchema, row_buf: &[u8]) -> Vec<Value> {
    debug_assert_eq!(row_buf.len(), schema.row_stride as usize);
    schema
        .columns
        .iter()
        .map(|col| {
            let slot = &row_buf[col.offset as usize..(col.offset + col.length) as usize];
            unpack_one(col, slot)
        })
        .collect()
}

fn unpack_one(col: &ColumnDescriptor, slot: &[u8]) -> Value {
    match col.col_type {
        ColumnType::Integer => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(slot);
            Value::Integer(i64::from_ne_bytes(buf))
        }
        ColumnType::Real => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(slot);
            Value::Real(f64::from_ne_bytes(buf))
        }
        ColumnType::Text => {
            let nul_at = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
            Value::Text(slot[..nul_at].to_vec())
        }
        ColumnType::Nullable => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::compile;

    #[test]
    fn round_trips_integer_and_real() {
        let schema = compile("CREATE TABLE t (a INTEGER, b REAL)").unwrap();
        let mut buf = vec![0u8; schema.row_stride as usize];
        pack(&schema, &[Value::Integer(-42), Value::Real(3.5)], &mut buf).unwrap();
        let values = unpack(&schema, &buf);
        assert_eq!(values, vec![Value::Integer(-42), Value::Real(3.5)]);
    }

    #[test]
    fn text_round_trips_up_to_capacity() {
        let schema = compile("CREATE TABLE t (s TEXT(8))").unwrap();
        let mut buf = vec![0u8; schema.row_stride as usize];
        pack(&schema, &[Value::Text(b"abcdefghij".to_vec())], &mut buf).unwrap();
        let values = unpack(&schema, &buf);
        assert_eq!(values, vec![Value::Text(b"abcdefg".to_vec())]);
    }

    #[test]
    fn null_leaves_slot_zeroed() {
        let schema = compile("CREATE TABLE t (a INTEGER)").unwrap();
        let mut buf = vec![0xFFu8; schema.row_stride as usize];
        pack(&schema, &[Value::Null], &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(unpack(&schema, &buf), vec![Value::Integer(0)]);
    }

    #[test]
    fn rejects_type_mismatch() {
        let schema = compile("CREATE TABLE t (a INTEGER)").unwrap();
        let mut buf = vec![0u8; schema.row_stride as usize];
        let err = pack(&schema, &[Value::Text(b"x".to_vec())], &mut buf).unwrap_err();
        assert!(matches!(err, RistrettoError::TypeMismatch { .. }));
    }
}
