//! Cell value coercion by column type tag

use chrono::Local;
use regex::Regex;
use serde_json::{Number, Value};
use std::sync::LazyLock;

/// Excel serial day of 1970-01-01 in the 1900 date system
pub const EXCEL_UNIX_EPOCH_DAY: f64 = 25569.0;

/// Numeric strings this long (in UTF-16 code units) are rounded to counter precision loss
const PRECISION_LENGTH: usize = 18;

static DECIMAL_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap());

/// Value types a column may declare after `:`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Number,
    Boolean,
    Date,
    Auto,
}

impl ValueType {
    /// Case-insensitive lookup; unknown tags pass values through unchanged
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "number" | "num" => Some(Self::Number),
            "boolean" | "bool" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    pub fn coerce(self, raw: &str) -> Value {
        match self {
            Self::Number => to_number(raw),
            Self::Boolean => Value::Bool(to_boolean(raw)),
            Self::Date => to_date(raw),
            Self::Auto => to_auto(raw),
        }
    }
}

/// Coerce one cell value, or each `,`-separated piece when `split` is set
pub fn coerce(value_type: Option<ValueType>, raw: &str, split: bool) -> Value {
    let single = |piece: &str| match value_type {
        Some(t) => t.coerce(piece),
        None => Value::String(piece.to_string()),
    };
    if split {
        Value::Array(raw.split(',').map(single).collect())
    } else {
        single(raw)
    }
}

/// Numeric value of a string with numeric-literal rules (NaN when not numeric)
pub fn parse_numeric(raw: &str) -> f64 {
    let s = raw.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    if s.is_empty() {
        return 0.0;
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    let radix = match s.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let digits = &s[2..];
        if digits.is_empty() {
            return f64::NAN;
        }
        return digits.chars().try_fold(0f64, |acc, c| {
            c.to_digit(radix).map(|d| acc * radix as f64 + d as f64)
        })
        .unwrap_or(f64::NAN);
    }

    if DECIMAL_LITERAL.is_match(s) {
        s.parse::<f64>().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// JSON form of a number: integral values as integers, non-finite as `null`
pub fn number_value(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_992.0 {
        return Value::from(n as i64);
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

pub fn to_number(raw: &str) -> Value {
    let n = parse_numeric(raw);
    if raw.encode_utf16().count() >= PRECISION_LENGTH && n.is_finite() && n.abs() < 1e21 {
        let rounded = format!("{:.8}", n).parse::<f64>().unwrap_or(n);
        return number_value(rounded);
    }
    number_value(n)
}

/// True unless empty, `"0"` or case-insensitively `"false"`
pub fn to_boolean(raw: &str) -> bool {
    !raw.is_empty() && raw.to_lowercase() != "false" && raw != "0"
}

/// Excel serial date to epoch milliseconds, shifted by the host's current UTC offset
pub fn to_date(raw: &str) -> Value {
    let local_minus_utc = Local::now().offset().local_minus_utc();
    let offset_minutes = -(local_minus_utc as f64) / 60.0;
    date_with_offset(raw, offset_minutes)
}

/// Excel serial date to epoch milliseconds with an explicit `UTC - local` offset in minutes
pub fn date_with_offset(raw: &str, offset_minutes: f64) -> Value {
    let days = parse_numeric(raw);
    let hours = (days - EXCEL_UNIX_EPOCH_DAY) * 24.0 + offset_minutes / 60.0;
    let millis = (hours * 3_600_000.0 + 0.5).floor();
    number_value(millis)
}

pub fn to_auto(raw: &str) -> Value {
    if parse_numeric(raw).is_finite() {
        to_number(raw)
    } else {
        Value::String(raw.to_string())
    }
}
