//! Result normalization
//!
//! Every source answers in its own shape, and the strategies of one source
//! often disagree with each other (BrasilAPI says `razao_social`, ReceitaWS
//! says `nome`). A [`Normalizer`] is a pure function from any of those raw
//! shapes to the common payload consumed by reports.
//!
//! The helpers here look fields up by a list of aliases so a single
//! normalizer can serve a whole fallback chain.

use crate::errors::NormalizationError;
use serde_json::{Map, Value};

/// Common payload shape carried by successful results
pub type Payload = Map<String, Value>;

/// Pure mapping from a raw response to a [`Payload`]
pub type Normalizer = fn(&Value) -> Result<Payload, NormalizationError>;

/// Pass-through for sources already answering with a JSON object
pub fn identity(raw: &Value) -> Result<Payload, NormalizationError> {
    match raw {
        Value::Object(map) => Ok(map.clone()),
        other => Err(NormalizationError::UnexpectedShape(format!(
            "expected object, found {}",
            kind_of(other)
        ))),
    }
}

/// First non-null value under any alias
///
/// Aliases may be dotted paths (`"estabelecimento.nome_fantasia"`).
pub fn first_value<'a>(raw: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|alias| lookup_path(raw, alias))
        .find(|v| !v.is_null())
}

/// First non-empty string under any alias; numbers are stringified
pub fn first_str(raw: &Value, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|alias| match lookup_path(raw, alias)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Like [`first_str`] but missing is an error reported under `field`
pub fn require_str(raw: &Value, field: &str, aliases: &[&str]) -> Result<String, NormalizationError> {
    first_str(raw, aliases).ok_or_else(|| NormalizationError::MissingField(field.to_string()))
}

/// First array under any alias; absent means empty
pub fn array_at<'a>(raw: &'a Value, aliases: &[&str]) -> &'a [Value] {
    aliases
        .iter()
        .filter_map(|alias| lookup_path(raw, alias))
        .find_map(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Keep only ASCII digits
pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Parse a Brazilian-formatted number (`1.234,56`) or a plain one
pub fn parse_decimal(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            let cleaned = if s.contains(',') {
                s.replace('.', "").replace(',', ".")
            } else {
                s.to_string()
            };
            cleaned.parse().ok()
        }
        _ => None,
    }
}

/// Require the raw payload to be an object
pub fn expect_object(raw: &Value) -> Result<&Map<String, Value>, NormalizationError> {
    raw.as_object().ok_or_else(|| {
        NormalizationError::UnexpectedShape(format!("expected object, found {}", kind_of(raw)))
    })
}

/// Like [`array_at`], but a root-level array also counts and absence is
/// an error
pub fn require_array<'a>(raw: &'a Value, aliases: &[&str]) -> Result<&'a [Value], NormalizationError> {
    if let Some(items) = raw.as_array() {
        return Ok(items.as_slice());
    }
    aliases
        .iter()
        .filter_map(|alias| lookup_path(raw, alias))
        .find_map(|v| v.as_array())
        .map(Vec::as_slice)
        .ok_or_else(|| {
            NormalizationError::UnexpectedShape(format!("expected a list under {:?}", aliases))
        })
}

fn lookup_path<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(raw, |current, key| match current {
        Value::Array(items) => items.get(key.parse::<usize>().ok()?),
        _ => current.get(key),
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Small builder over [`Payload`]
#[derive(Debug, Default, Clone)]
pub struct PayloadBuilder {
    map: Payload,
}

impl PayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.map.insert(key.to_string(), value.into());
        self
    }

    /// Insert only when present
    pub fn insert_opt<V: Into<Value>>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.map.insert(key.to_string(), v.into());
        }
        self
    }

    pub fn build(self) -> Payload {
        self.map
    }
}
