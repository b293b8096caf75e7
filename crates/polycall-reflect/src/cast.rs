//! Casting matrix between value tags.
//!
//! Numeric conversions follow native `as` semantics: integers wrap or
//! sign-extend, floats truncate toward zero before narrowing, and any tag
//! converts to `Bool` by comparing against its own zero. Conversions
//! involving strings are lexical and fail on malformed input.

use crate::error::CastError;
use crate::types::Type;
use crate::value::Value;
use crate::LOG_TARGET;
use tracing::debug;

/// Numeric view of a primitive value.
#[derive(Debug, Clone, Copy)]
enum Scalar {
    Int(i64),
    Float(f64),
}

impl Scalar {
    fn of(value: &Value) -> Option<Self> {
        match *value {
            Value::Bool(v) => Some(Scalar::Int(i64::from(v))),
            Value::Char(v) => Some(Scalar::Int(i64::from(v))),
            Value::Short(v) => Some(Scalar::Int(i64::from(v))),
            Value::Int(v) => Some(Scalar::Int(i64::from(v))),
            Value::Long(v) => Some(Scalar::Int(v)),
            Value::Float(v) => Some(Scalar::Float(f64::from(v))),
            Value::Double(v) => Some(Scalar::Float(v)),
            _ => None,
        }
    }

    /// Integer view; floats truncate toward zero and saturate at the `i64`
    /// bounds, NaN maps to zero.
    fn truncated(self) -> i64 {
        match self {
            Scalar::Int(v) => v,
            Scalar::Float(v) => v as i64,
        }
    }

    fn into_value(self, to: Type) -> Option<Value> {
        let value = match to {
            Type::Bool => Value::Bool(match self {
                Scalar::Int(v) => v != 0,
                Scalar::Float(v) => v != 0.0,
            }),
            Type::Char => Value::Char(self.truncated() as i8),
            Type::Short => Value::Short(self.truncated() as i16),
            Type::Int => Value::Int(self.truncated() as i32),
            Type::Long => Value::Long(self.truncated()),
            Type::Float => Value::Float(match self {
                Scalar::Int(v) => v as f32,
                Scalar::Float(v) => v as f32,
            }),
            Type::Double => Value::Double(match self {
                Scalar::Int(v) => v as f64,
                Scalar::Float(v) => v,
            }),
            _ => return None,
        };

        Some(value)
    }
}

fn format_primitive(value: &Value) -> Option<String> {
    let text = match *value {
        Value::Bool(v) => v.to_string(),
        // ASCII chars print as text, anything else as its number
        Value::Char(v) => match u8::try_from(v) {
            Ok(byte) => char::from(byte).to_string(),
            Err(_) => v.to_string(),
        },
        Value::Short(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        _ => return None,
    };

    Some(text)
}

fn parse_string(s: &str, to: Type) -> Option<Value> {
    let trimmed = s.trim();

    match to {
        Type::Bool => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        Type::Char => match s.as_bytes() {
            [byte] => Some(Value::Char(*byte as i8)),
            _ => trimmed.parse().ok().map(Value::Char),
        },
        Type::Short => trimmed.parse().ok().map(Value::Short),
        Type::Int => trimmed.parse().ok().map(Value::Int),
        Type::Long => trimmed.parse().ok().map(Value::Long),
        Type::Float => trimmed.parse().ok().map(Value::Float),
        Type::Double => trimmed.parse().ok().map(Value::Double),
        Type::Buffer => Some(Value::Buffer(s.as_bytes().to_vec())),
        _ => None,
    }
}

impl Value {
    /// Convert the value to another tag.
    ///
    /// The value is consumed. Casting to the current tag returns it
    /// unchanged, casting to `Null` always succeeds. On failure the original
    /// value is handed back inside the [`CastError`].
    pub fn cast(self, to: Type) -> Result<Value, CastError> {
        let from = self.ty();

        if from == to {
            return Ok(self);
        }

        if to == Type::Null {
            return Ok(Value::Null);
        }

        let converted = match (&self, to) {
            (v, Type::String) if from.is_numeric() => format_primitive(v).map(Value::String),
            (v, _) if from.is_numeric() => Scalar::of(v).and_then(|s| s.into_value(to)),
            (Value::String(s), _) => parse_string(s, to),
            (Value::Buffer(bytes), Type::String) => std::str::from_utf8(bytes)
                .ok()
                .map(|s| Value::String(s.to_owned())),
            (Value::Array(_) | Value::Map(_), Type::String) => self
                .to_json()
                .ok()
                .map(|json| Value::String(json.to_string())),
            (Value::Exception(e), Type::String) => Some(Value::String(e.message.clone())),
            _ => None,
        };

        converted.ok_or_else(|| {
            debug!(target: LOG_TARGET, "Invalid cast from {} to {}", from, to);
            CastError::new(self, to)
        })
    }
}
