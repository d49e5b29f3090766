//! Eager parsing of JSON-mode generation output into typed values.
use serde::de::DeserializeOwned;

use ragctx_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredErrorKind {
    /// Output is not JSON at all.
    InvalidJson,
    /// Output is JSON but does not fit the expected shape.
    SchemaMismatch,
}

/// Parsed generation output, or the raw text that failed to parse.
#[derive(Debug, Clone, PartialEq)]
pub enum Structured<T> {
    Ok(T),
    Error { kind: StructuredErrorKind, message: String, raw: String },
}

impl<T> Structured<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Ok(v) => Ok(v),
            Self::Error { kind, message, raw } => Err(Error::parse(format!("{kind:?}: {message}"), raw)),
        }
    }
}

pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Structured<T> {
    let body = strip_code_fences(raw);
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return Structured::Error { kind: StructuredErrorKind::InvalidJson, message: e.to_string(), raw: raw.to_string() },
    };
    match serde_json::from_value(value) {
        Ok(v) => Structured::Ok(v),
        Err(e) => Structured::Error { kind: StructuredErrorKind::SchemaMismatch, message: e.to_string(), raw: raw.to_string() },
    }
}

/// Models sometimes wrap JSON in a markdown fence despite JSON mode.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else { return trimmed };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Score {
        overall_score: u32,
    }

    #[test]
    fn parses_plain_and_fenced_json() {
        assert_eq!(parse_structured::<Score>(r#"{"overall_score": 7}"#), Structured::Ok(Score { overall_score: 7 }));
        assert!(parse_structured::<Score>("```json\n{\"overall_score\": 7}\n```").is_ok());
    }

    #[test]
    fn classifies_failures_and_keeps_raw() {
        match parse_structured::<Score>("not json") {
            Structured::Error { kind, raw, .. } => {
                assert_eq!(kind, StructuredErrorKind::InvalidJson);
                assert_eq!(raw, "not json");
            }
            other => panic!("unexpected {other:?}"),
        }
        let mismatch = parse_structured::<Score>(r#"{"overall_score": "high"}"#);
        assert!(matches!(mismatch, Structured::Error { kind: StructuredErrorKind::SchemaMismatch, .. }));
        let err = mismatch.into_result().unwrap_err();
        assert_eq!(err.raw_output(), Some(r#"{"overall_score": "high"}"#));
    }
}
