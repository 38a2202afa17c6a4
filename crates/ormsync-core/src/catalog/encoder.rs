//! Column encoders for values whose stored form differs from their native form.
//!
//! Timestamps and durations are kept as formatted text so the database stays
//! readable with plain SQL tools; enums are stored by variant index.

use crate::error::{Error, Result};
use crate::value::Value;
use chrono::{DateTime, NaiveDateTime};
use std::fmt;
use std::sync::Arc;

/// Text layout used for stored timestamps (UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Converts between a column's native value and its stored value.
///
/// `Value::Null` never reaches an encoder; the column passes it through.
pub trait ColumnEncoder: Send + Sync + fmt::Debug {
    /// Stable name, also used by schema manifests.
    fn name(&self) -> &str;

    /// Convert a native value into its stored form.
    fn to_storage(&self, native: &Value) -> Result<Value>;

    /// Convert a stored value back into its native form.
    fn from_storage(&self, stored: &Value) -> Result<Value>;
}

/// Look up a built-in encoder by manifest name.
pub fn encoder_by_name(name: &str) -> Option<Arc<dyn ColumnEncoder>> {
    match name {
        "timestamp" => Some(Arc::new(TimestampEncoder)),
        "duration" => Some(Arc::new(DurationEncoder)),
        "bigint" => Some(Arc::new(BigIntEncoder)),
        _ => None,
    }
}

fn mismatch(encoder: &str, expected: &str, got: &Value) -> Error {
    Error::Encoding(format!(
        "{} encoder expected {}, got {}",
        encoder,
        expected,
        got.kind()
    ))
}

/// Parse a stored timestamp into unix milliseconds.
///
/// Accepts the native text layout and RFC 3339.
pub fn parse_timestamp(text: &str) -> Option<i64> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT) {
        return Some(naive.and_utc().timestamp_millis());
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Format unix milliseconds as stored timestamp text.
pub fn format_timestamp(millis: i64) -> Option<String> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
}

/// Timestamps: native unix milliseconds, stored as `YYYY-MM-DD HH:MM:SS.fff`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampEncoder;

impl ColumnEncoder for TimestampEncoder {
    fn name(&self) -> &str {
        "timestamp"
    }

    fn to_storage(&self, native: &Value) -> Result<Value> {
        match native {
            Value::Integer(millis) => format_timestamp(*millis)
                .map(Value::Text)
                .ok_or_else(|| Error::Encoding(format!("timestamp out of range: {}", millis))),
            Value::Text(text) => parse_timestamp(text)
                .and_then(format_timestamp)
                .map(Value::Text)
                .ok_or_else(|| Error::Encoding(format!("invalid timestamp: {}", text))),
            other => Err(mismatch(self.name(), "integer milliseconds", other)),
        }
    }

    fn from_storage(&self, stored: &Value) -> Result<Value> {
        match stored {
            Value::Text(text) => parse_timestamp(text)
                .map(Value::Integer)
                .ok_or_else(|| Error::Encoding(format!("invalid timestamp: {}", text))),
            Value::Integer(millis) => Ok(Value::Integer(*millis)),
            other => Err(mismatch(self.name(), "timestamp text", other)),
        }
    }
}

/// Durations: native milliseconds, stored as `[-]HH:MM:SS.fff`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DurationEncoder;

impl DurationEncoder {
    fn format(millis: i64) -> String {
        let sign = if millis < 0 { "-" } else { "" };
        let total = millis.unsigned_abs();
        let ms = total % 1000;
        let secs = total / 1000;
        format!(
            "{}{:02}:{:02}:{:02}.{:03}",
            sign,
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            ms
        )
    }

    fn parse(text: &str) -> Option<i64> {
        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let mut parts = body.split(':');
        let hours: u64 = parts.next()?.parse().ok()?;
        let minutes: u64 = parts.next()?.parse().ok()?;
        let seconds_part = parts.next()?;
        if parts.next().is_some() || minutes >= 60 {
            return None;
        }
        let (secs, frac) = match seconds_part.split_once('.') {
            Some((s, f)) => (s, f),
            None => (seconds_part, "0"),
        };
        let seconds: u64 = secs.parse().ok()?;
        if seconds >= 60 || frac.is_empty() || frac.len() > 3 {
            return None;
        }
        let millis: u64 = format!("{:0<3}", frac).parse().ok()?;
        let magnitude = hours
            .checked_mul(3600)?
            .checked_add(minutes * 60 + seconds)?
            .checked_mul(1000)?
            .checked_add(millis)?;
        // i64::MIN has no positive counterpart, so negate in i128.
        let signed = if negative {
            -i128::from(magnitude)
        } else {
            i128::from(magnitude)
        };
        i64::try_from(signed).ok()
    }
}

impl ColumnEncoder for DurationEncoder {
    fn name(&self) -> &str {
        "duration"
    }

    fn to_storage(&self, native: &Value) -> Result<Value> {
        match native {
            Value::Integer(millis) => Ok(Value::Text(Self::format(*millis))),
            other => Err(mismatch(self.name(), "integer milliseconds", other)),
        }
    }

    fn from_storage(&self, stored: &Value) -> Result<Value> {
        match stored {
            Value::Text(text) => Self::parse(text)
                .map(Value::Integer)
                .ok_or_else(|| Error::Encoding(format!("invalid duration: {}", text))),
            other => Err(mismatch(self.name(), "duration text", other)),
        }
    }
}

/// Unsigned 64-bit integers: native decimal text, stored zero padded to
/// twenty digits so text order matches numeric order.
#[derive(Debug, Clone, Copy, Default)]
pub struct BigIntEncoder;

impl ColumnEncoder for BigIntEncoder {
    fn name(&self) -> &str {
        "bigint"
    }

    fn to_storage(&self, native: &Value) -> Result<Value> {
        let n: u64 = match native {
            Value::Text(text) => text
                .parse()
                .map_err(|_| Error::Encoding(format!("invalid unsigned integer: {}", text)))?,
            Value::Integer(i) => u64::try_from(*i)
                .map_err(|_| Error::Encoding(format!("negative value for bigint: {}", i)))?,
            other => return Err(mismatch(self.name(), "unsigned integer", other)),
        };
        Ok(Value::Text(format!("{:020}", n)))
    }

    fn from_storage(&self, stored: &Value) -> Result<Value> {
        match stored {
            Value::Text(text) => text
                .parse::<u64>()
                .map(|n| Value::Text(n.to_string()))
                .map_err(|_| Error::Encoding(format!("invalid stored bigint: {}", text))),
            other => Err(mismatch(self.name(), "bigint text", other)),
        }
    }
}

/// Enumerations: native variant name, stored as the variant's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumEncoder {
    variants: Vec<String>,
}

impl EnumEncoder {
    /// Create an encoder over the given variants, in declaration order.
    pub fn new<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    /// Declared variants.
    pub fn variants(&self) -> &[String] {
        &self.variants
    }
}

impl ColumnEncoder for EnumEncoder {
    fn name(&self) -> &str {
        "enum"
    }

    fn to_storage(&self, native: &Value) -> Result<Value> {
        match native {
            Value::Text(name) => self
                .variants
                .iter()
                .position(|v| v == name)
                .map(|idx| Value::Integer(idx as i64))
                .ok_or_else(|| Error::Encoding(format!("unknown enum variant: {}", name))),
            Value::Integer(idx) if (0..self.variants.len() as i64).contains(idx) => {
                Ok(Value::Integer(*idx))
            }
            other => Err(mismatch(self.name(), "variant name", other)),
        }
    }

    fn from_storage(&self, stored: &Value) -> Result<Value> {
        match stored {
            Value::Integer(idx) => usize::try_from(*idx)
                .ok()
                .and_then(|i| self.variants.get(i))
                .map(|v| Value::Text(v.clone()))
                .ok_or_else(|| Error::Encoding(format!("enum index out of range: {}", idx))),
            other => Err(mismatch(self.name(), "variant index", other)),
        }
    }
}
