//! JSON-Schema-compatible document validation
//!
//! Compiles a schema's validation document into a checker at upsert time,
//! so malformed schema documents are rejected before any document can
//! reference them. Validation returns the full list of violated rules.
//!
//! Supported keywords: `type`, `required`, `properties`,
//! `additionalProperties`, `items`, `enum`, `minimum`, `maximum`,
//! `exclusiveMinimum`, `exclusiveMaximum`, `minLength`, `maxLength`,
//! `minItems`, `maxItems`. Unknown keywords are ignored for forward
//! compatibility.

use loam_core::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// A compiled, reusable validation document
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    root: Rule,
}

/// One compiled schema node
#[derive(Debug, Clone, Default)]
struct Rule {
    types: Option<Vec<TypeName>>,
    required: Vec<String>,
    properties: BTreeMap<String, Rule>,
    additional_properties: bool,
    items: Option<Box<Rule>>,
    enum_values: Option<Vec<Value>>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    exclusive_minimum: Option<f64>,
    exclusive_maximum: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    min_items: Option<usize>,
    max_items: Option<usize>,
}

impl Rule {
    fn new() -> Self {
        Rule {
            additional_properties: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeName {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl TypeName {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "object" => Some(TypeName::Object),
            "array" => Some(TypeName::Array),
            "string" => Some(TypeName::String),
            "number" => Some(TypeName::Number),
            "integer" => Some(TypeName::Integer),
            "boolean" => Some(TypeName::Boolean),
            "null" => Some(TypeName::Null),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            TypeName::Object => "object",
            TypeName::Array => "array",
            TypeName::String => "string",
            TypeName::Number => "number",
            TypeName::Integer => "integer",
            TypeName::Boolean => "boolean",
            TypeName::Null => "null",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            TypeName::Object => value.is_object(),
            TypeName::Array => value.is_array(),
            TypeName::String => value.is_string(),
            TypeName::Number => value.is_number(),
            TypeName::Integer => value.is_i64() || value.is_u64(),
            TypeName::Boolean => value.is_boolean(),
            TypeName::Null => value.is_null(),
        }
    }
}

impl CompiledSchema {
    /// Compile a validation document, rejecting malformed schemas
    pub fn compile(document: &Value) -> Result<Self> {
        let root = compile_rule(document, "$")?;
        Ok(CompiledSchema { root })
    }

    /// Check a document, returning every violated rule
    pub fn validate(&self, data: &Value) -> Result<()> {
        let mut violations = Vec::new();
        check(&self.root, data, "$", &mut violations);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(violations))
        }
    }
}

fn compile_rule(document: &Value, at: &str) -> Result<Rule> {
    let map = document
        .as_object()
        .ok_or_else(|| Error::InvalidSchema(format!("{at}: schema node must be an object")))?;

    let mut rule = Rule::new();

    if let Some(type_value) = map.get("type") {
        let names: Vec<&str> = match type_value {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items
                .iter()
                .map(|v| {
                    v.as_str().ok_or_else(|| {
                        Error::InvalidSchema(format!("{at}.type: entries must be strings"))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            _ => {
                return Err(Error::InvalidSchema(format!(
                    "{at}.type: must be a string or array of strings"
                )))
            }
        };
        let mut types = Vec::new();
        for name in names {
            let parsed = TypeName::parse(name)
                .ok_or_else(|| Error::InvalidSchema(format!("{at}.type: unknown type '{name}'")))?;
            types.push(parsed);
        }
        rule.types = Some(types);
    }

    if let Some(required) = map.get("required") {
        let items = required.as_array().ok_or_else(|| {
            Error::InvalidSchema(format!("{at}.required: must be an array of strings"))
        })?;
        for item in items {
            let name = item.as_str().ok_or_else(|| {
                Error::InvalidSchema(format!("{at}.required: must be an array of strings"))
            })?;
            rule.required.push(name.to_string());
        }
    }

    if let Some(props) = map.get("properties") {
        let obj = props
            .as_object()
            .ok_or_else(|| Error::InvalidSchema(format!("{at}.properties: must be an object")))?;
        for (name, sub) in obj {
            let compiled = compile_rule(sub, &format!("{at}.properties.{name}"))?;
            rule.properties.insert(name.clone(), compiled);
        }
    }

    if let Some(additional) = map.get("additionalProperties") {
        rule.additional_properties = additional.as_bool().ok_or_else(|| {
            Error::InvalidSchema(format!("{at}.additionalProperties: must be a boolean"))
        })?;
    }

    if let Some(items) = map.get("items") {
        rule.items = Some(Box::new(compile_rule(items, &format!("{at}.items"))?));
    }

    if let Some(enum_values) = map.get("enum") {
        let values = enum_values
            .as_array()
            .ok_or_else(|| Error::InvalidSchema(format!("{at}.enum: must be an array")))?;
        if values.is_empty() {
            return Err(Error::InvalidSchema(format!("{at}.enum: must not be empty")));
        }
        rule.enum_values = Some(values.clone());
    }

    rule.minimum = numeric_keyword(map, "minimum", at)?;
    rule.maximum = numeric_keyword(map, "maximum", at)?;
    rule.exclusive_minimum = numeric_keyword(map, "exclusiveMinimum", at)?;
    rule.exclusive_maximum = numeric_keyword(map, "exclusiveMaximum", at)?;
    rule.min_length = count_keyword(map, "minLength", at)?;
    rule.max_length = count_keyword(map, "maxLength", at)?;
    rule.min_items = count_keyword(map, "minItems", at)?;
    rule.max_items = count_keyword(map, "maxItems", at)?;

    Ok(rule)
}

fn numeric_keyword(
    map: &serde_json::Map<String, Value>,
    keyword: &str,
    at: &str,
) -> Result<Option<f64>> {
    match map.get(keyword) {
        None => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| Error::InvalidSchema(format!("{at}.{keyword}: must be a number"))),
    }
}

fn count_keyword(
    map: &serde_json::Map<String, Value>,
    keyword: &str,
    at: &str,
) -> Result<Option<usize>> {
    match map.get(keyword) {
        None => Ok(None),
        Some(v) => v.as_u64().map(|n| Some(n as usize)).ok_or_else(|| {
            Error::InvalidSchema(format!("{at}.{keyword}: must be a non-negative integer"))
        }),
    }
}

fn check(rule: &Rule, value: &Value, at: &str, violations: &mut Vec<String>) {
    if let Some(types) = &rule.types {
        if !types.iter().any(|t| t.matches(value)) {
            let expected: Vec<&str> = types.iter().map(TypeName::as_str).collect();
            violations.push(format!("{at}: expected type {}", expected.join(" or ")));
            // Structural keywords below assume the right shape.
            return;
        }
    }

    if let Some(allowed) = &rule.enum_values {
        if !allowed.contains(value) {
            violations.push(format!("{at}: value not in enum"));
        }
    }

    if let Some(obj) = value.as_object() {
        for name in &rule.required {
            if !obj.contains_key(name) {
                violations.push(format!("{at}: missing required field '{name}'"));
            }
        }
        for (name, sub_rule) in &rule.properties {
            if let Some(sub_value) = obj.get(name) {
                check(sub_rule, sub_value, &format!("{at}.{name}"), violations);
            }
        }
        if !rule.additional_properties {
            for name in obj.keys() {
                if !rule.properties.contains_key(name) {
                    violations.push(format!("{at}: unexpected field '{name}'"));
                }
            }
        }
    }

    if let Some(arr) = value.as_array() {
        if let Some(min) = rule.min_items {
            if arr.len() < min {
                violations.push(format!("{at}: fewer than {min} items"));
            }
        }
        if let Some(max) = rule.max_items {
            if arr.len() > max {
                violations.push(format!("{at}: more than {max} items"));
            }
        }
        if let Some(item_rule) = &rule.items {
            for (i, item) in arr.iter().enumerate() {
                check(item_rule, item, &format!("{at}[{i}]"), violations);
            }
        }
    }

    if let Some(s) = value.as_str() {
        let len = s.chars().count();
        if let Some(min) = rule.min_length {
            if len < min {
                violations.push(format!("{at}: shorter than {min} characters"));
            }
        }
        if let Some(max) = rule.max_length {
            if len > max {
                violations.push(format!("{at}: longer than {max} characters"));
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                violations.push(format!("{at}: below minimum {min}"));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                violations.push(format!("{at}: above maximum {max}"));
            }
        }
        if let Some(min) = rule.exclusive_minimum {
            if n <= min {
                violations.push(format!("{at}: must be greater than {min}"));
            }
        }
        if let Some(max) = rule.exclusive_maximum {
            if n >= max {
                violations.push(format!("{at}: must be less than {max}"));
            }
        }
    }
}
