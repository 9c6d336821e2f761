//! Unique-identifier derivation
//!
//! A schema declares an identifier format such as `"{email}-{timestamp}"`.
//! Derivation substitutes system tokens first, then field tokens resolved
//! from the document data, sanitizes the result to `[A-Za-z0-9_-/]`, and
//! uppercases it. A format without system tokens is a pure function of the
//! document data, which is what makes client-predictable identifiers work.

use chrono::{DateTime, Utc};
use loam_core::PathChain;
use serde_json::Value;
use uuid::Uuid;

/// System tokens resolved before any document field is consulted
const TOKEN_TIMESTAMP: &str = "timestamp";
const TOKEN_UUID: &str = "uuid";
const TOKEN_DATE: &str = "date";
const TOKEN_DATETIME: &str = "datetime";

/// Derives unique identifiers from a schema's declared format
pub struct IdentifierFormatter;

impl IdentifierFormatter {
    /// Derive an identifier using the current time and a fresh uuid
    pub fn derive(format: &str, data: &Value) -> String {
        Self::derive_at(format, data, Utc::now(), Uuid::new_v4())
    }

    /// Derive with an explicit clock and uuid
    ///
    /// The production path goes through [`derive`](Self::derive); this
    /// entry point exists so derivation stays testable deterministically.
    pub fn derive_at(format: &str, data: &Value, now: DateTime<Utc>, uuid: Uuid) -> String {
        let substituted = substitute(format, |token| match token {
            TOKEN_TIMESTAMP => now.timestamp_millis().to_string(),
            TOKEN_UUID => uuid.to_string(),
            TOKEN_DATE => now.format("%Y-%m-%d").to_string(),
            TOKEN_DATETIME => now.format("%Y%m%dT%H%M%S").to_string(),
            field => resolve_field(data, field),
        });
        sanitize(&substituted).to_ascii_uppercase()
    }
}

/// Replace each `{token}` with its resolved value; an unterminated brace
/// is kept literal
fn substitute(format: &str, resolve: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(format.len());
    let mut rest = format;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        match rest[open + 1..].find('}') {
            Some(close) => {
                let token = &rest[open + 1..open + 1 + close];
                out.push_str(&resolve(token));
                rest = &rest[open + close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// A field token is a dotted path into the document data; a missing or
/// non-scalar value renders empty
fn resolve_field(data: &Value, field: &str) -> String {
    let chain = match PathChain::parse(field) {
        Ok(chain) => chain,
        Err(_) => return String::new(),
    };
    match chain.resolve(data) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    fn fixed_uuid() -> Uuid {
        Uuid::parse_str("a1a2a3a4-b1b2-c1c2-d1d2-d3d4d5d6d7d8").unwrap()
    }

    #[test]
    fn field_tokens_resolve_from_document_data() {
        let data = json!({"email": "jane@example.com", "profile": {"region": "eu"}});
        let id = IdentifierFormatter::derive_at(
            "{email}-{profile.region}",
            &data,
            fixed_now(),
            fixed_uuid(),
        );
        assert_eq!(id, "JANE-EXAMPLE-COM-EU");
    }

    #[test]
    fn derivation_without_system_tokens_is_deterministic() {
        let data = json!({"sku": "ab-123"});
        let a = IdentifierFormatter::derive("{sku}", &data);
        let b = IdentifierFormatter::derive("{sku}", &data);
        assert_eq!(a, b);
        assert_eq!(a, "AB-123");
    }

    #[test]
    fn system_tokens_use_the_injected_clock_and_uuid() {
        let id = IdentifierFormatter::derive_at(
            "{date}/{timestamp}",
            &json!({}),
            fixed_now(),
            fixed_uuid(),
        );
        assert_eq!(id, format!("2026-03-14/{}", fixed_now().timestamp_millis()));

        let id = IdentifierFormatter::derive_at("{uuid}", &json!({}), fixed_now(), fixed_uuid());
        assert_eq!(id, "A1A2A3A4-B1B2-C1C2-D1D2-D3D4D5D6D7D8");
    }

    #[test]
    fn datetime_token_is_compact() {
        let id =
            IdentifierFormatter::derive_at("{datetime}", &json!({}), fixed_now(), fixed_uuid());
        assert_eq!(id, "20260314T092653");
    }

    #[test]
    fn system_tokens_shadow_document_fields() {
        // A document field named "uuid" never wins over the system token.
        let data = json!({"uuid": "not-this"});
        let id = IdentifierFormatter::derive_at("{uuid}", &data, fixed_now(), fixed_uuid());
        assert_eq!(id, "A1A2A3A4-B1B2-C1C2-D1D2-D3D4D5D6D7D8");
    }

    #[test]
    fn missing_fields_render_empty() {
        let id = IdentifierFormatter::derive_at(
            "x-{absent}-y",
            &json!({"other": 1}),
            fixed_now(),
            fixed_uuid(),
        );
        assert_eq!(id, "X--Y");
    }

    #[test]
    fn numeric_and_bool_fields_render_as_text() {
        let data = json!({"n": 42, "flag": true});
        let id = IdentifierFormatter::derive_at("{n}_{flag}", &data, fixed_now(), fixed_uuid());
        assert_eq!(id, "42_TRUE");
    }

    #[test]
    fn disallowed_characters_map_to_dashes() {
        let data = json!({"name": "a b.c@d"});
        let id = IdentifierFormatter::derive_at("{name}", &data, fixed_now(), fixed_uuid());
        assert_eq!(id, "A-B-C-D");
    }

    #[test]
    fn unterminated_brace_is_kept_literal() {
        let id = IdentifierFormatter::derive_at("{open", &json!({}), fixed_now(), fixed_uuid());
        assert_eq!(id, "-OPEN");
    }

    #[test]
    fn literal_text_survives_around_tokens() {
        let id = IdentifierFormatter::derive_at(
            "user/{email}",
            &json!({"email": "a@b"}),
            fixed_now(),
            fixed_uuid(),
        );
        assert_eq!(id, "USER/A-B");
    }
}
