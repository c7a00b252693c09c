//! Column values and rows
//!
//! Rows coming back from the database are heterogeneous, so every cell is a
//! [`Value`]. Identifier columns are bigint in the database but travel as
//! strings everywhere else to avoid precision loss in JSON consumers.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Ordered column alias -> value map for one result row
pub type Row = IndexMap<String, Value>;

/// A single column value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Uuid(Uuid),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// JavaScript-style truthiness, used for soft-delete checks and optional guids
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Text(s) => !s.is_empty(),
            Self::Json(v) => !v.is_null(),
            _ => true,
        }
    }

    /// Render as a normalized identifier string, `None` for NULL
    pub fn to_id_string(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            Self::Uuid(u) => Some(u.to_string()),
            Self::Decimal(d) => Some(d.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Date(d) => Some(d.to_string()),
            Self::Timestamp(t) => Some(format_timestamp(t)),
            Self::Json(v) => Some(v.to_string()),
        }
    }

    /// Bind parameter for an identifier: bigint when numeric, text otherwise
    pub fn id_param(id: &str) -> Self {
        id.parse::<i64>()
            .map(Self::Int)
            .unwrap_or_else(|_| Self::Text(id.to_string()))
    }

    /// Identifier-like values normalized to strings, everything else as is
    pub(crate) fn normalize_id(self) -> Self {
        match self {
            Self::Null => Self::Null,
            other => match other.to_id_string() {
                Some(s) => Self::Text(s),
                None => Self::Null,
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Self::Null => J::Null,
            Self::Bool(b) => J::Bool(*b),
            Self::Int(i) => J::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(J::Null, J::Number),
            Self::Decimal(d) => J::String(d.to_string()),
            Self::Text(s) => J::String(s.clone()),
            Self::Uuid(u) => J::String(u.to_string()),
            Self::Date(d) => J::String(d.to_string()),
            Self::Timestamp(t) => J::String(format_timestamp(t)),
            Self::Json(v) => v.clone(),
        }
    }

    /// Map a JSON value onto a column value. Strings always stay text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value as J;
        match value {
            J::Null => Self::Null,
            J::Bool(b) => Self::Bool(*b),
            J::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            J::String(s) => Self::Text(s.clone()),
            other => Self::Json(other.clone()),
        }
    }

    /// Text holding an RFC 3339 instant becomes a timestamp
    pub fn parse_timestamp(self) -> Self {
        match self {
            Self::Text(s) => match DateTime::parse_from_rfc3339(&s) {
                Ok(t) => Self::Timestamp(t.with_timezone(&Utc)),
                Err(_) => Self::Text(s),
            },
            other => other,
        }
    }

    /// Text that parses as a UUID becomes a uuid
    pub fn parse_uuid(self) -> Self {
        match self {
            Self::Text(s) => match Uuid::parse_str(&s) {
                Ok(u) => Self::Uuid(u),
                Err(_) => Self::Text(s),
            },
            other => other,
        }
    }

    /// Canonical serialization used for deep equality
    pub(crate) fn canonical(&self) -> String {
        self.to_json().to_string()
    }

    pub(crate) fn to_sea_value(&self) -> sea_orm::Value {
        match self {
            Self::Null => sea_orm::Value::String(None),
            Self::Bool(b) => (*b).into(),
            Self::Int(i) => (*i).into(),
            Self::Float(f) => (*f).into(),
            Self::Decimal(d) => (*d).into(),
            Self::Text(s) => s.clone().into(),
            Self::Uuid(u) => (*u).into(),
            Self::Date(d) => (*d).into(),
            Self::Timestamp(t) => (*t).into(),
            Self::Json(v) => v.clone().into(),
        }
    }

    /// Inverse of [`to_sea_value`](Self::to_sea_value) for the types this crate binds.
    /// Typed NULLs and anything else come back as [`Value::Null`].
    pub(crate) fn from_sea_value(value: &sea_orm::Value) -> Self {
        use sea_orm::Value as V;
        match value {
            V::Bool(Some(b)) => Self::Bool(*b),
            V::TinyInt(Some(i)) => Self::Int((*i).into()),
            V::SmallInt(Some(i)) => Self::Int((*i).into()),
            V::Int(Some(i)) => Self::Int((*i).into()),
            V::BigInt(Some(i)) => Self::Int(*i),
            V::TinyUnsigned(Some(i)) => Self::Int((*i).into()),
            V::SmallUnsigned(Some(i)) => Self::Int((*i).into()),
            V::Unsigned(Some(i)) => Self::Int((*i).into()),
            V::BigUnsigned(Some(i)) => {
                i64::try_from(*i).map_or_else(|_| Self::Decimal((*i).into()), Self::Int)
            }
            V::Float(Some(f)) => Self::Float((*f).into()),
            V::Double(Some(f)) => Self::Float(*f),
            V::String(Some(s)) => Self::Text(s.as_ref().clone()),
            V::Char(Some(c)) => Self::Text(c.to_string()),
            V::Json(Some(v)) => Self::Json(v.as_ref().clone()),
            V::ChronoDate(Some(d)) => Self::Date(**d),
            V::ChronoDateTimeUtc(Some(t)) => Self::Timestamp(**t),
            V::ChronoDateTime(Some(t)) => Self::Timestamp(t.and_utc()),
            V::Uuid(Some(u)) => Self::Uuid(**u),
            V::Decimal(Some(d)) => Self::Decimal(**d),
            _ => Self::Null,
        }
    }
}

fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
