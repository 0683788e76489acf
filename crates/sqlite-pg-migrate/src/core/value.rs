//! Cell values and source rows.
//!
//! SQLite is dynamically typed, so a source cell can hold any storage class
//! regardless of the declared column type. [`Value`] mirrors those storage
//! classes, plus the exact decimal produced by numeric coercion.

use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 64-bit signed integer.
    Integer(i64),

    /// Double precision float.
    Real(f64),

    /// Exact decimal (numeric targets).
    Decimal(Decimal),

    /// Text data.
    Text(String),

    /// Binary data.
    Blob(Vec<u8>),
}

static NULL_VALUE: Value = Value::Null;

/// Longest value rendering kept in report context.
const MAX_DISPLAY_CHARS: usize = 64;

impl Value {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// NULL or a whitespace-only string.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Borrow the text content, if this is a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render this value as an identifier key.
    ///
    /// Integer ids and their text spellings map to the same key, so a foreign
    /// key stored as `'7'` still finds the row whose primary key is `7`.
    /// Returns `None` for blank values and for types that cannot identify a row.
    #[must_use]
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::Integer(v) => Some(v.to_string()),
            Value::Real(v) if v.is_finite() && v.fract() == 0.0 => Some(format!("{}", *v as i64)),
            Value::Real(v) if v.is_finite() => Some(v.to_string()),
            Value::Decimal(d) => Some(d.normalize().to_string()),
            Value::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            _ => None,
        }
    }

    /// Encode as a text parameter for PostgreSQL.
    ///
    /// Every value travels as text and is cast server-side to the column type,
    /// which keeps parameter binding independent of the target schema.
    #[must_use]
    pub fn to_param(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(if *b { "t" } else { "f" }.to_string()),
            Value::Integer(v) => Some(v.to_string()),
            Value::Real(v) => Some(v.to_string()),
            Value::Decimal(d) => Some(d.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Blob(b) => Some(format!("\\x{}", hex::encode(b))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Text(s) => {
                if s.chars().count() > MAX_DISPLAY_CHARS {
                    let head: String = s.chars().take(MAX_DISPLAY_CHARS).collect();
                    write!(f, "'{}…'", head)
                } else {
                    write!(f, "'{}'", s)
                }
            }
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One source row, addressed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: HashMap<String, Value>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of a column. Absent columns read as NULL.
    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&NULL_VALUE)
    }

    /// Whether the row carries the column at all.
    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Set a column value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    /// Number of columns in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
