//! # SQL Value Representation
//!
//! `Value` is the runtime representation of every SQL datum the engine
//! touches: literals in the AST, bound parameters, row tuples, and result
//! columns. Variants own their payload; `Clone` is a deep copy.
//!
//! ## Comparison Semantics
//!
//! `Value::cmp_sql` defines the total order used by the B+tree comparator,
//! ORDER BY and the comparison operators:
//!
//! - NULL sorts below every non-NULL value; NULL == NULL for ordering.
//! - Int vs Float compares after promoting the Int to f64.
//! - Text/Json and Blob compare bytewise, then by length.
//! - Values of incompatible types order by their type tag.
//!
//! Note this is an ordering, not SQL three-valued logic; the expression
//! evaluator applies NULL propagation before calling into it.

use std::borrow::Cow;
use std::cmp::Ordering;

use xxhash_rust::xxh64::xxh64;

use super::ValueType;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    Json(String),
    Vector(Vec<f32>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Text(_) => ValueType::Text,
            Value::Blob(_) => ValueType::Blob,
            Value::Json(_) => ValueType::Json,
            Value::Vector(_) => ValueType::Vector,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness for AND/OR/NOT and WHERE: non-zero numerics are true.
    /// NULL is neither true nor false; callers must special-case it.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Null => false,
            _ => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Size of the variable-length payload, zero for scalars.
    pub fn payload_len(&self) -> usize {
        match self {
            Value::Text(s) | Value::Json(s) => s.len(),
            Value::Blob(b) => b.len(),
            Value::Vector(v) => v.len() * 4,
            _ => 0,
        }
    }

    /// Total order over all values; see the module docs.
    pub fn cmp_sql(&self, other: &Value) -> Ordering {
        use Value::*;

        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,

            (Int(a), Int(b)) => a.cmp(b),
            (Int(_), Float(_)) | (Float(_), Int(_)) | (Float(_), Float(_)) => {
                let a = self.as_f64().unwrap();
                let b = other.as_f64().unwrap();
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }

            (Text(a), Text(b)) | (Json(a), Json(b)) => cmp_bytes(a.as_bytes(), b.as_bytes()),
            (Blob(a), Blob(b)) => cmp_bytes(a, b),
            (Vector(a), Vector(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.partial_cmp(y).unwrap_or(Ordering::Equal) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }

            _ => (self.value_type() as u8).cmp(&(other.value_type() as u8)),
        }
    }

    /// xxHash64 over the payload bytes. Used by hash grouping.
    pub fn hash64(&self) -> u64 {
        match self {
            Value::Null => 0,
            Value::Int(i) => xxh64(&i.to_le_bytes(), 0),
            Value::Float(f) => xxh64(&f.to_le_bytes(), 0),
            Value::Text(s) | Value::Json(s) => xxh64(s.as_bytes(), 0),
            Value::Blob(b) => xxh64(b, 0),
            Value::Vector(v) => {
                let mut bytes = Vec::with_capacity(v.len() * 4);
                for f in v {
                    bytes.extend_from_slice(&f.to_le_bytes());
                }
                xxh64(&bytes, 0)
            }
        }
    }

    /// Rendering used by the text column accessor and exec callbacks.
    pub fn to_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Null => None,
            Value::Int(i) => Some(Cow::Owned(i.to_string())),
            Value::Float(f) => Some(Cow::Owned(f.to_string())),
            Value::Text(s) | Value::Json(s) => Some(Cow::Borrowed(s)),
            Value::Blob(b) => Some(Cow::Owned(format!("<blob {} bytes>", b.len()))),
            Value::Vector(v) => Some(Cow::Owned(format!("<vector dim {}>", v.len()))),
        }
    }
}

fn cmp_bytes(a: &[u8], b: &[u8]) -> Ordering {
    let n = a.len().min(b.len());
    match a[..n].cmp(&b[..n]) {
        Ordering::Equal => a.len().cmp(&b.len()),
        ord => ord,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sorts_below_everything() {
        assert_eq!(Value::Null.cmp_sql(&Value::Int(i64::MIN)), Ordering::Less);
        assert_eq!(Value::Null.cmp_sql(&Value::Float(f64::MIN)), Ordering::Less);
        assert_eq!(
            Value::Null.cmp_sql(&Value::Text(String::new())),
            Ordering::Less
        );
        assert_eq!(Value::Null.cmp_sql(&Value::Null), Ordering::Equal);
    }

    #[test]
    fn numeric_cross_type_comparison_promotes() {
        assert_eq!(Value::Int(2).cmp_sql(&Value::Float(2.0)), Ordering::Equal);
        assert_eq!(Value::Int(2).cmp_sql(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::Float(3.5).cmp_sql(&Value::Int(3)), Ordering::Greater);
    }

    #[test]
    fn text_compares_bytes_then_length() {
        let a = Value::Text("abc".into());
        let b = Value::Text("abd".into());
        let c = Value::Text("abcd".into());

        assert_eq!(a.cmp_sql(&b), Ordering::Less);
        assert_eq!(a.cmp_sql(&c), Ordering::Less);
        assert_eq!(c.cmp_sql(&a), Ordering::Greater);
        assert_eq!(a.cmp_sql(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn comparator_is_antisymmetric_within_type() {
        let pairs = [
            (Value::Int(1), Value::Int(2)),
            (Value::Float(1.5), Value::Float(2.5)),
            (Value::Text("a".into()), Value::Text("b".into())),
            (Value::Blob(vec![1]), Value::Blob(vec![2])),
        ];
        for (a, b) in pairs {
            assert_eq!(a.cmp_sql(&b), b.cmp_sql(&a).reverse());
        }
    }

    #[test]
    fn clone_is_deep_for_variable_length_variants() {
        let original = Value::Blob(vec![1, 2, 3]);
        let copy = original.clone();
        match (original, copy) {
            (Value::Blob(a), Value::Blob(mut b)) => {
                b[0] = 99;
                assert_eq!(a[0], 1);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn hash_distinguishes_payloads() {
        assert_ne!(
            Value::Text("alpha".into()).hash64(),
            Value::Text("beta".into()).hash64()
        );
        assert_eq!(Value::Int(7).hash64(), Value::Int(7).hash64());
    }

    #[test]
    fn truthiness() {
        assert!(Value::Int(1).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::Text("".into()).is_truthy());
    }
}
