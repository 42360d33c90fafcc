//! # Row Tuple Codec
//!
//! Rows are stored as B+tree values in a self-describing binary form:
//!
//! ```text
//! [column_count u32 LE]
//! per column:
//!   [type u8]
//!   Int    -> i64 LE
//!   Float  -> f64 LE
//!   Text   -> u32 LE length + UTF-8 bytes
//!   Blob   -> u32 LE length + bytes
//!   Json   -> u32 LE length + UTF-8 bytes
//!   Vector -> u32 LE dims + dims * f32 LE
//!   Null   -> nothing
//! ```
//!
//! Decoding bounds-checks every field and fails with `Corrupt` rather than
//! reading past the payload.

use eyre::Result;

use crate::error::{db_err, ErrorCode};
use crate::types::{Value, ValueType};

pub fn encode_row(values: &[Value]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + values.len() * 9);
    out.extend_from_slice(&(values.len() as u32).to_le_bytes());
    encode_values(&mut out, values);
    out
}

/// Appends the value payloads without the leading column count. Used both
/// by `encode_row` and by index key construction.
pub fn encode_values(out: &mut Vec<u8>, values: &[Value]) {
    for value in values {
        out.push(value.value_type() as u8);
        match value {
            Value::Null => {}
            Value::Int(i) => out.extend_from_slice(&i.to_le_bytes()),
            Value::Float(f) => out.extend_from_slice(&f.to_le_bytes()),
            Value::Text(s) | Value::Json(s) => {
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Value::Blob(b) => {
                out.extend_from_slice(&(b.len() as u32).to_le_bytes());
                out.extend_from_slice(b);
            }
            Value::Vector(v) => {
                out.extend_from_slice(&(v.len() as u32).to_le_bytes());
                for f in v {
                    out.extend_from_slice(&f.to_le_bytes());
                }
            }
        }
    }
}

pub fn decode_row(bytes: &[u8]) -> Result<Vec<Value>> {
    let mut reader = Reader { bytes, pos: 0 };
    let count = reader.u32()? as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(reader.value()?);
    }
    Ok(values)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| db_err(ErrorCode::Corrupt, "row payload truncated"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn value(&mut self) -> Result<Value> {
        let tag = self.u8()?;
        let ty = ValueType::from_byte(tag)
            .ok_or_else(|| db_err(ErrorCode::Corrupt, format!("unknown value tag {}", tag)))?;

        Ok(match ty {
            ValueType::Null => Value::Null,
            ValueType::Int => {
                let b = self.take(8)?;
                Value::Int(i64::from_le_bytes(b.try_into().unwrap()))
            }
            ValueType::Float => {
                let b = self.take(8)?;
                Value::Float(f64::from_le_bytes(b.try_into().unwrap()))
            }
            ValueType::Text | ValueType::Json => {
                let len = self.u32()? as usize;
                let raw = self.take(len)?;
                let text = std::str::from_utf8(raw)
                    .map_err(|_| db_err(ErrorCode::Corrupt, "row text is not valid UTF-8"))?
                    .to_string();
                if ty == ValueType::Json {
                    Value::Json(text)
                } else {
                    Value::Text(text)
                }
            }
            ValueType::Blob => {
                let len = self.u32()? as usize;
                Value::Blob(self.take(len)?.to_vec())
            }
            ValueType::Vector => {
                let dims = self.u32()? as usize;
                let raw = self.take(dims * 4)?;
                let mut v = Vec::with_capacity(dims);
                for chunk in raw.chunks_exact(4) {
                    v.push(f32::from_le_bytes(chunk.try_into().unwrap()));
                }
                Value::Vector(v)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        let row = vec![
            Value::Null,
            Value::Int(-42),
            Value::Float(3.25),
            Value::Text("hello".into()),
            Value::Blob(vec![0, 1, 2, 255]),
            Value::Json("{\"k\":1}".into()),
            Value::Vector(vec![1.0, -2.5]),
        ];

        let encoded = encode_row(&row);
        let decoded = decode_row(&encoded).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn truncated_payload_is_corrupt() {
        let row = vec![Value::Text("hello world".into())];
        let encoded = encode_row(&row);

        let err = decode_row(&encoded[..encoded.len() - 3]).unwrap_err();
        assert_eq!(crate::error::ErrorCode::of(&err), ErrorCode::Corrupt);
    }

    #[test]
    fn unknown_tag_is_corrupt() {
        let mut encoded = encode_row(&[Value::Int(1)]);
        encoded[4] = 0x7F;

        let err = decode_row(&encoded).unwrap_err();
        assert_eq!(crate::error::ErrorCode::of(&err), ErrorCode::Corrupt);
    }

    #[test]
    fn empty_row() {
        let encoded = encode_row(&[]);
        assert_eq!(decode_row(&encoded).unwrap(), Vec::<Value>::new());
    }
}
