//! Scalar cell values

use std::fmt;
use std::hash::{Hash, Hasher};

/// The type of a column's values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Integer,
    Float,
    Text,
}

impl ValueType {
    /// Narrowest type able to hold values of both types
    pub fn unify(self, other: ValueType) -> ValueType {
        use ValueType::*;
        match (self, other) {
            (Integer, Integer) => Integer,
            (Text, _) | (_, Text) => Text,
            _ => Float,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
        };
        f.write_str(s)
    }
}

/// A single field of a record
///
/// Equality is structural and is what deduplication relies on: `Null`
/// equals `Null`, floats compare by canonical bit pattern (every NaN is
/// equal to every other NaN and `-0.0 == 0.0`), and values of different
/// variants are never equal.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

fn canonical_bits(f: f64) -> u64 {
    if f.is_nan() {
        f64::NAN.to_bits()
    } else if f == 0.0 {
        0
    } else {
        f.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => canonical_bits(*a) == canonical_bits(*b),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Int(i) => i.hash(state),
            Value::Float(f) => canonical_bits(*f).hash(state),
            Value::Text(s) => s.hash(state),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The value's type, or `None` for `Null`
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(ValueType::Integer),
            Value::Float(_) => Some(ValueType::Float),
            Value::Text(_) => Some(ValueType::Text),
        }
    }

    /// Convert to `target`, returning `None` when the conversion would lose
    /// information or the text does not parse.
    pub fn coerce(&self, target: ValueType) -> Option<Value> {
        match (self, target) {
            (Value::Null, _) => Some(Value::Null),
            (Value::Int(i), ValueType::Integer) => Some(Value::Int(*i)),
            (Value::Int(i), ValueType::Float) => Some(Value::Float(*i as f64)),
            (Value::Float(f), ValueType::Float) => Some(Value::Float(*f)),
            (Value::Float(f), ValueType::Integer) => {
                if f.fract() == 0.0 && f.is_finite() && f.abs() < i64::MAX as f64 {
                    Some(Value::Int(*f as i64))
                } else {
                    None
                }
            }
            (Value::Text(s), ValueType::Integer) => s.trim().parse().ok().map(Value::Int),
            (Value::Text(s), ValueType::Float) => s.trim().parse().ok().map(Value::Float),
            (Value::Text(s), ValueType::Text) => Some(Value::Text(s.clone())),
            (other, ValueType::Text) => Some(Value::Text(other.to_string())),
        }
    }

    /// Parse a raw delimited-text field into the narrowest scalar
    pub fn parse_field(raw: &str) -> Value {
        if is_missing_marker(raw) {
            return Value::Null;
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Text(raw.to_string())
    }
}

/// Render floats so they always read back as floats (`4.0`, not `4`)
pub fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Field contents treated as missing when reading delimited text
pub const MISSING_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

pub fn is_missing_marker(raw: &str) -> bool {
    MISSING_MARKERS.contains(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_null_equals_null() {
        assert_eq!(Value::Null, Value::Null);
        assert_ne!(Value::Null, Value::Float(4.0));
    }

    #[test]
    fn test_float_equality_is_canonical() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_eq!(Value::Float(-0.0), Value::Float(0.0));

        let mut set = HashSet::new();
        set.insert(Value::Float(-0.0));
        assert!(set.contains(&Value::Float(0.0)));
    }

    #[test]
    fn test_variants_never_equal() {
        assert_ne!(Value::Int(4), Value::Float(4.0));
        assert_ne!(Value::Int(4), Value::Text("4".into()));
    }

    #[test]
    fn test_parse_field() {
        assert_eq!(Value::parse_field("25"), Value::Int(25));
        assert_eq!(Value::parse_field("3.1"), Value::Float(3.1));
        assert_eq!(Value::parse_field("Male"), Value::Text("Male".into()));
        assert_eq!(Value::parse_field(""), Value::Null);
        assert_eq!(Value::parse_field("NA"), Value::Null);
    }

    #[test]
    fn test_coerce() {
        assert_eq!(Value::Int(3).coerce(ValueType::Float), Some(Value::Float(3.0)));
        assert_eq!(Value::Float(3.0).coerce(ValueType::Integer), Some(Value::Int(3)));
        assert_eq!(Value::Float(3.5).coerce(ValueType::Integer), None);
        assert_eq!(Value::Text("abc".into()).coerce(ValueType::Integer), None);
        assert_eq!(Value::Text(" 42 ".into()).coerce(ValueType::Integer), Some(Value::Int(42)));
        assert_eq!(Value::Float(4.0).coerce(ValueType::Text), Some(Value::Text("4.0".into())));
        assert_eq!(Value::Null.coerce(ValueType::Integer), Some(Value::Null));
    }

    #[test]
    fn test_unify() {
        assert_eq!(ValueType::Integer.unify(ValueType::Integer), ValueType::Integer);
        assert_eq!(ValueType::Integer.unify(ValueType::Float), ValueType::Float);
        assert_eq!(ValueType::Float.unify(ValueType::Text), ValueType::Text);
    }

    #[test]
    fn test_format_float_keeps_decimal_point() {
        assert_eq!(format_float(4.0), "4.0");
        assert_eq!(format_float(3.1), "3.1");
        assert_eq!(format_float(-0.5), "-0.5");
    }
}
