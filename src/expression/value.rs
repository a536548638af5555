//! Runtime values of the condition language.
//!
//! Mirrors the loose typing of the expressions users write in the editor:
//! there is an `undefined` distinct from `null`, numbers are always `f64`,
//! and equality/comparison coerce between strings and numbers.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value as JsonValue};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<Value>),
    Object(Map<String, JsonValue>),
}

impl Value {
    /// Converts an optional JSON value; `None` becomes `undefined`.
    pub fn from_json(value: Option<&JsonValue>) -> Self {
        match value {
            None => Self::Undefined,
            Some(JsonValue::Null) => Self::Null,
            Some(JsonValue::Bool(b)) => Self::Bool(*b),
            Some(JsonValue::Number(n)) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Some(JsonValue::String(s)) => Self::Str(s.clone()),
            Some(JsonValue::Array(items)) => {
                Self::Array(items.iter().map(|v| Self::from_json(Some(v))).collect())
            }
            Some(JsonValue::Object(map)) => Self::Object(map.clone()),
        }
    }

    /// Converts back to JSON; `undefined` and non-finite numbers become `null`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Undefined | Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::Str(s) => JsonValue::String(s.clone()),
            Self::Array(items) => JsonValue::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => JsonValue::Object(map.clone()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::Array(_) | Self::Object(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Number(n) => *n,
            Self::Str(s) => parse_number(s),
            Self::Array(_) => parse_number(&self.to_display_string()),
            Self::Object(_) => f64::NAN,
        }
    }

    /// String conversion used by concatenation and string methods.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::Str(s) => s.clone(),
            Self::Array(items) => items
                .iter()
                .map(|v| {
                    if v.is_nullish() {
                        String::new()
                    } else {
                        v.to_display_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Self::Object(_) => "[object Object]".to_string(),
        }
    }

    fn is_compound(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Object(_))
    }

    /// `===` semantics. Compound values compare structurally.
    pub fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.strict_eq(y))
            }
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }

    /// `==` semantics with string/number/boolean coercion.
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Self::Number(_), Self::Str(_)) | (Self::Str(_), Self::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Self::Bool(_), _) => Self::Number(self.to_number()).loose_eq(other),
            (_, Self::Bool(_)) => self.loose_eq(&Self::Number(other.to_number())),
            (a, b) if a.is_compound() && !b.is_compound() => {
                Self::Str(a.to_display_string()).loose_eq(b)
            }
            (a, b) if !a.is_compound() && b.is_compound() => {
                a.loose_eq(&Self::Str(b.to_display_string()))
            }
            _ => self.strict_eq(other),
        }
    }

    /// Relational comparison. `None` when either side is not comparable (NaN).
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        let left = self.to_primitive();
        let right = other.to_primitive();
        match (&left, &right) {
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            _ => left.to_number().partial_cmp(&right.to_number()),
        }
    }

    fn to_primitive(&self) -> Self {
        if self.is_compound() {
            Self::Str(self.to_display_string())
        } else {
            self.clone()
        }
    }
}

/// Parses a numeric string the way the expression language coerces text.
///
/// Empty or whitespace-only text is zero; anything unparsable is NaN.
pub fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.starts_with("0x") || trimmed.starts_with("0X") => {
            i64::from_str_radix(&trimmed[2..], 16)
                .map(|n| n as f64)
                .unwrap_or(f64::NAN)
        }
        // Rust accepts "inf"/"nan" spellings that are not numbers here
        _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// Formats a number without a trailing `.0` for integral values.
///
/// ```
/// use nodeflow::expression::value::format_number;
///
/// assert_eq!(format_number(3.0), "3");
/// assert_eq!(format_number(2.5), "2.5");
/// ```
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

fn number_to_json(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        JsonValue::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(JsonValue::Number).unwrap_or(JsonValue::Null)
    }
}
