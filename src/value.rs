use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// A value stored in a table cell, bound to a variable, or produced by an
/// expression.
///
/// # Type families
///
/// Comparison and arithmetic are only defined inside a family:
/// - **numeric**: `Int`, `Float`, `Year`
/// - **text**: `String`, `Enum`
/// - every other tag only meets itself
///
/// `Empty` is the null value. It equals only itself and never orders.
///
/// # Examples
///
/// ```
/// use qql_lang::{DataType, Value};
///
/// let age = DataType::Int.coerce(Value::Int(30)).unwrap();
/// assert_eq!(age, Value::Int(30));
///
/// let price = DataType::Float.coerce(Value::Int(3)).unwrap();
/// assert_eq!(price, Value::Float(3.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Year(i32),
    /// Opaque binary payload
    Object(Vec<u8>),
    Enum(String),
    Set(BTreeSet<String>),
    Json(serde_json::Value),
    /// Null
    Empty,
}

/// Declared type of a column, parameter, variable or function result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int,
    Float,
    String,
    Bool,
    Date,
    Time,
    DateTime,
    Year,
    Object,
    Enum,
    Set,
    Json,
    Empty,
}

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).ok()
}

pub fn parse_time(text: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
}

pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

impl DataType {
    /// Resolve a type keyword. `boolean` is an alias of `bool`.
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "int" => DataType::Int,
            "float" => DataType::Float,
            "string" => DataType::String,
            "bool" | "boolean" => DataType::Bool,
            "date" => DataType::Date,
            "time" => DataType::Time,
            "datetime" => DataType::DateTime,
            "year" => DataType::Year,
            "object" => DataType::Object,
            "enum" => DataType::Enum,
            "set" => DataType::Set,
            "json" => DataType::Json,
            "empty" => DataType::Empty,
            _ => return None,
        };
        Some(ty)
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::String => "string",
            DataType::Bool => "bool",
            DataType::Date => "date",
            DataType::Time => "time",
            DataType::DateTime => "datetime",
            DataType::Year => "year",
            DataType::Object => "object",
            DataType::Enum => "enum",
            DataType::Set => "set",
            DataType::Json => "json",
            DataType::Empty => "empty",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::Float | DataType::Year)
    }

    fn is_text(&self) -> bool {
        matches!(self, DataType::String | DataType::Enum)
    }

    /// Whether values of the two types may be compared with each other.
    pub fn comparable_with(&self, other: DataType) -> bool {
        *self == other
            || *self == DataType::Empty
            || other == DataType::Empty
            || (self.is_numeric() && other.is_numeric())
            || (self.is_text() && other.is_text())
    }

    /// Whether a value whose static type is `source` can be stored into a slot
    /// of this type without a lossy or parsing conversion.
    pub fn accepts(&self, source: DataType) -> bool {
        match (self, source) {
            (_, DataType::Empty) => true,
            (a, b) if *a == b => true,
            (DataType::Float, DataType::Int) => true,
            (DataType::Year, DataType::Int) | (DataType::Int, DataType::Year) => true,
            (DataType::Enum, DataType::String) | (DataType::String, DataType::Enum) => true,
            (DataType::DateTime, DataType::Date) => true,
            _ => false,
        }
    }

    /// Convert `value` into this type, or describe why it cannot be.
    ///
    /// Strings are parsed for the temporal types and `json`; `empty` is valid
    /// for every type.
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        let coerced = match (self, value) {
            (_, Value::Empty) => Value::Empty,
            (DataType::Int, Value::Int(n)) => Value::Int(n),
            (DataType::Int, Value::Year(y)) => Value::Int(i64::from(y)),
            (DataType::Float, Value::Float(n)) => Value::Float(n),
            (DataType::Float, Value::Int(n)) => Value::Float(n as f64),
            (DataType::String, Value::String(s)) => Value::String(s),
            (DataType::String, Value::Enum(s)) => Value::String(s),
            (DataType::Bool, Value::Bool(b)) => Value::Bool(b),
            (DataType::Date, Value::Date(d)) => Value::Date(d),
            (DataType::Date, Value::String(s)) => {
                Value::Date(parse_date(&s).ok_or_else(|| format!("\"{s}\" is not a date (YYYY-MM-DD)"))?)
            }
            (DataType::Time, Value::Time(t)) => Value::Time(t),
            (DataType::Time, Value::String(s)) => {
                Value::Time(parse_time(&s).ok_or_else(|| format!("\"{s}\" is not a time (HH:MM[:SS])"))?)
            }
            (DataType::DateTime, Value::DateTime(dt)) => Value::DateTime(dt),
            (DataType::DateTime, Value::Date(d)) => Value::DateTime(d.and_time(NaiveTime::MIN)),
            (DataType::DateTime, Value::String(s)) => Value::DateTime(
                parse_datetime(&s)
                    .ok_or_else(|| format!("\"{s}\" is not a datetime (YYYY-MM-DD HH:MM:SS)"))?,
            ),
            (DataType::Year, Value::Year(y)) => Value::Year(y),
            (DataType::Year, Value::Int(n)) => {
                if (0..=9999).contains(&n) {
                    Value::Year(n as i32)
                } else {
                    return Err(format!("{n} is not a valid year"));
                }
            }
            (DataType::Object, Value::Object(bytes)) => Value::Object(bytes),
            (DataType::Object, Value::String(s)) => Value::Object(s.into_bytes()),
            (DataType::Enum, Value::Enum(s)) => Value::Enum(s),
            (DataType::Enum, Value::String(s)) => Value::Enum(s),
            (DataType::Set, Value::Set(items)) => Value::Set(items),
            (DataType::Json, Value::Json(j)) => Value::Json(j),
            (DataType::Json, Value::String(s)) => Value::Json(
                serde_json::from_str(&s).map_err(|e| format!("invalid json: {e}"))?,
            ),
            (DataType::Json, Value::Int(n)) => Value::Json(n.into()),
            (DataType::Json, Value::Bool(b)) => Value::Json(b.into()),
            (DataType::Json, Value::Float(n)) => Value::Json(
                serde_json::Number::from_f64(n)
                    .map(serde_json::Value::Number)
                    .ok_or_else(|| format!("{n} cannot be represented as json"))?,
            ),
            (ty, value) => {
                return Err(format!(
                    "expected {}, found {} {}",
                    ty,
                    value.type_name(),
                    value
                ));
            }
        };
        Ok(coerced)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::String(_) => DataType::String,
            Value::Bool(_) => DataType::Bool,
            Value::Date(_) => DataType::Date,
            Value::Time(_) => DataType::Time,
            Value::DateTime(_) => DataType::DateTime,
            Value::Year(_) => DataType::Year,
            Value::Object(_) => DataType::Object,
            Value::Enum(_) => DataType::Enum,
            Value::Set(_) => DataType::Set,
            Value::Json(_) => DataType::Json,
            Value::Empty => DataType::Empty,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.data_type().name()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Get as float (numeric family only)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            Value::Year(y) => Some(f64::from(*y)),
            _ => None,
        }
    }

    /// Get as integer (integral numerics only)
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Year(y) => Some(i64::from(*y)),
            _ => None,
        }
    }

    /// Text content of `string` and `enum` values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    f.write_str("\"")?;
    for ch in text.chars() {
        if ch == '"' {
            f.write_str("\\\"")?;
        } else {
            write!(f, "{ch}")?;
        }
    }
    f.write_str("\"")
}

/// Values display in QQL literal syntax, so a rendered statement can be read
/// back by the lexer.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) if n.fract() == 0.0 && n.is_finite() => write!(f, "{n:.1}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::String(s) | Value::Enum(s) => write_quoted(f, s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "date\"{}\"", d.format(DATE_FORMAT)),
            Value::Time(t) => write!(f, "time\"{}\"", t.format("%H:%M:%S")),
            Value::DateTime(dt) => write!(f, "datetime\"{}\"", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::Year(y) => write!(f, "{y}"),
            Value::Object(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Value::Set(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_quoted(f, item)?;
                }
                f.write_str("}")
            }
            Value::Json(j) => write_quoted(f, &j.to_string()),
            Value::Empty => f.write_str("empty"),
        }
    }
}
