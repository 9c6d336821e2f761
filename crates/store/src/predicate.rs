//! The predicate compiler
//!
//! Pure functions, no side effects. Two responsibilities:
//! 1. Path chain compilation: a dotted/bracketed json-path becomes an
//!    ordered key-access chain (see [`loam_core::path`]); [`chain_expr`]
//!    renders the chain as the native JSONB accessor used by both query
//!    predicates and expression-index DDL.
//! 2. Predicate compilation: (path chain, operator, value) becomes a
//!    native filter condition. Numeric vs. textual comparison casts are
//!    chosen by the runtime type of the first value in the operand.
//!
//! Every compiled predicate also evaluates directly against an in-memory
//! JSON value with the same semantics as its SQL rendering, which is what
//! the reference backend executes.

use loam_core::{Error, Filter, FilterOp, LogicalOp, PathChain, PathSegment, Result};
use serde_json::Value;

/// Render a path chain as a JSONB accessor, e.g. `data->'a'->2->'b'`
///
/// With `as_text` the final access extracts text (`->>`), which is the
/// form comparison predicates cast from.
pub fn chain_expr(chain: &PathChain, as_text: bool) -> String {
    let mut expr = String::from("data");
    let segments = chain.segments();
    for (i, segment) in segments.iter().enumerate() {
        let arrow = if as_text && i + 1 == segments.len() {
            "->>"
        } else {
            "->"
        };
        match segment {
            PathSegment::Key(k) => {
                expr.push_str(arrow);
                expr.push('\'');
                expr.push_str(&k.replace('\'', "''"));
                expr.push('\'');
            }
            PathSegment::Index(i) => {
                expr.push_str(arrow);
                expr.push_str(&i.to_string());
            }
        }
    }
    expr
}

/// Comparison cast, chosen by the runtime type of the first operand value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cast {
    Numeric,
    Text,
}

fn cast_for(value: &Value) -> Cast {
    let probe = match value {
        Value::Array(items) => items.first().unwrap_or(&Value::Null),
        other => other,
    };
    if probe.is_number() {
        Cast::Numeric
    } else {
        Cast::Text
    }
}

fn sql_text_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn sql_scalar_literal(value: &Value, cast: Cast) -> String {
    match (cast, value) {
        (Cast::Numeric, Value::Number(n)) => n.to_string(),
        (_, Value::String(s)) => sql_text_literal(s),
        (_, other) => sql_text_literal(&other.to_string()),
    }
}

fn sql_jsonb_literal(value: &Value) -> String {
    format!("{}::jsonb", sql_text_literal(&value.to_string()))
}

/// One compiled predicate over the JSON column
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    chain: PathChain,
    op: FilterOp,
    value: Value,
}

impl Predicate {
    /// Compile a typed filter; malformed paths and operand shapes fail
    /// here, before any query executes
    pub fn compile(filter: &Filter) -> Result<Self> {
        let chain = PathChain::parse(&filter.path)?;

        match filter.op {
            FilterOp::InList | FilterOp::NotInList | FilterOp::HasAnyKey | FilterOp::HasAllKeys => {
                if !filter.value.is_array() {
                    return Err(Error::validation(vec![format!(
                        "operator {} requires an array operand",
                        filter.op
                    )]));
                }
            }
            FilterOp::HasKey | FilterOp::SubstringMatch => {
                if !filter.value.is_string() {
                    return Err(Error::validation(vec![format!(
                        "operator {} requires a string operand",
                        filter.op
                    )]));
                }
            }
            _ => {}
        }

        Ok(Predicate {
            chain,
            op: filter.op,
            value: filter.value.clone(),
        })
    }

    pub fn chain(&self) -> &PathChain {
        &self.chain
    }

    /// Render the native SQL filter condition
    pub fn to_sql(&self) -> String {
        let cast = cast_for(&self.value);
        let scalar_expr = match cast {
            Cast::Numeric => format!("({})::numeric", chain_expr(&self.chain, true)),
            Cast::Text => chain_expr(&self.chain, true),
        };
        let jsonb_expr = chain_expr(&self.chain, false);

        match self.op {
            FilterOp::Equals
            | FilterOp::NotEquals
            | FilterOp::LessThan
            | FilterOp::LessOrEqual
            | FilterOp::GreaterThan
            | FilterOp::GreaterOrEqual => {
                let token = self.op.sql_token().expect("scalar operator");
                format!(
                    "{scalar_expr} {token} {}",
                    sql_scalar_literal(&self.value, cast)
                )
            }
            FilterOp::InList | FilterOp::NotInList => {
                let keyword = if self.op == FilterOp::InList {
                    "IN"
                } else {
                    "NOT IN"
                };
                let items: Vec<String> = self
                    .value
                    .as_array()
                    .map(|a| a.iter().map(|v| sql_scalar_literal(v, cast)).collect())
                    .unwrap_or_default();
                format!("{scalar_expr} {keyword} ({})", items.join(", "))
            }
            FilterOp::ArrayContainsElement => {
                let element = Value::Array(vec![self.value.clone()]);
                format!("{jsonb_expr} @> {}", sql_jsonb_literal(&element))
            }
            FilterOp::ContainsSubdocument => {
                format!("{jsonb_expr} @> {}", sql_jsonb_literal(&self.value))
            }
            FilterOp::ContainedBy => {
                format!("{jsonb_expr} <@ {}", sql_jsonb_literal(&self.value))
            }
            FilterOp::HasKey => {
                let key = self.value.as_str().unwrap_or_default();
                format!("{jsonb_expr} ? {}", sql_text_literal(key))
            }
            FilterOp::HasAnyKey | FilterOp::HasAllKeys => {
                let op = if self.op == FilterOp::HasAnyKey {
                    "?|"
                } else {
                    "?&"
                };
                let keys: Vec<String> = self
                    .value
                    .as_array()
                    .map(|a| {
                        a.iter()
                            .map(|v| sql_text_literal(v.as_str().unwrap_or_default()))
                            .collect()
                    })
                    .unwrap_or_default();
                format!("{jsonb_expr} {op} array[{}]", keys.join(", "))
            }
            FilterOp::PathExists => format!("{jsonb_expr} IS NOT NULL"),
            FilterOp::PathMatches => {
                format!("{jsonb_expr} = {}", sql_jsonb_literal(&self.value))
            }
            FilterOp::SubstringMatch => {
                let needle = self.value.as_str().unwrap_or_default();
                let escaped = needle
                    .replace('\\', "\\\\")
                    .replace('%', "\\%")
                    .replace('_', "\\_");
                format!(
                    "{} LIKE {}",
                    chain_expr(&self.chain, true),
                    sql_text_literal(&format!("%{escaped}%"))
                )
            }
        }
    }

    /// Evaluate this predicate against a document's data, with the same
    /// semantics as the SQL rendering
    pub fn matches(&self, data: &Value) -> bool {
        let resolved = self.chain.resolve(data);

        match self.op {
            FilterOp::PathExists => return resolved.is_some(),
            _ => {}
        }

        let target = match resolved {
            Some(v) => v,
            None => return false,
        };

        match self.op {
            FilterOp::Equals => value_eq(target, &self.value),
            FilterOp::NotEquals => !value_eq(target, &self.value),
            FilterOp::LessThan => value_cmp(target, &self.value)
                .map(|o| o.is_lt())
                .unwrap_or(false),
            FilterOp::LessOrEqual => value_cmp(target, &self.value)
                .map(|o| o.is_le())
                .unwrap_or(false),
            FilterOp::GreaterThan => value_cmp(target, &self.value)
                .map(|o| o.is_gt())
                .unwrap_or(false),
            FilterOp::GreaterOrEqual => value_cmp(target, &self.value)
                .map(|o| o.is_ge())
                .unwrap_or(false),
            FilterOp::InList => self
                .value
                .as_array()
                .map(|items| items.iter().any(|v| value_eq(target, v)))
                .unwrap_or(false),
            FilterOp::NotInList => self
                .value
                .as_array()
                .map(|items| !items.iter().any(|v| value_eq(target, v)))
                .unwrap_or(false),
            FilterOp::ArrayContainsElement => target
                .as_array()
                .map(|items| items.iter().any(|v| value_eq(v, &self.value)))
                .unwrap_or(false),
            FilterOp::ContainsSubdocument => jsonb_contains(target, &self.value),
            FilterOp::ContainedBy => jsonb_contains(&self.value, target),
            FilterOp::HasKey => {
                let key = self.value.as_str().unwrap_or_default();
                target.as_object().map(|m| m.contains_key(key)).unwrap_or(false)
            }
            FilterOp::HasAnyKey => self
                .value
                .as_array()
                .zip(target.as_object())
                .map(|(keys, map)| {
                    keys.iter()
                        .filter_map(Value::as_str)
                        .any(|k| map.contains_key(k))
                })
                .unwrap_or(false),
            FilterOp::HasAllKeys => self
                .value
                .as_array()
                .zip(target.as_object())
                .map(|(keys, map)| {
                    keys.iter()
                        .filter_map(Value::as_str)
                        .all(|k| map.contains_key(k))
                })
                .unwrap_or(false),
            FilterOp::PathExists => unreachable!("handled above"),
            FilterOp::PathMatches => target == &self.value,
            FilterOp::SubstringMatch => {
                let needle = self.value.as_str().unwrap_or_default();
                target.as_str().map(|s| s.contains(needle)).unwrap_or(false)
            }
        }
    }
}

/// Equality with numeric coercion: 18 and 18.0 compare equal, matching
/// the numeric cast on the SQL side
fn value_eq(left: &Value, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return l == r;
    }
    left == right
}

fn value_cmp(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    if right.is_number() {
        return left.as_f64()?.partial_cmp(&right.as_f64()?);
    }
    // Text cast: both sides compare as text.
    let l = left.as_str()?;
    let r = right.as_str()?;
    Some(l.cmp(r))
}

/// JSONB containment: objects contain a subset of keys with contained
/// values; arrays contain every operand element; scalars contain equals
fn jsonb_contains(target: &Value, operand: &Value) -> bool {
    match (target, operand) {
        (Value::Object(t), Value::Object(o)) => o
            .iter()
            .all(|(k, v)| t.get(k).map(|tv| jsonb_contains(tv, v)).unwrap_or(false)),
        (Value::Array(t), Value::Array(o)) => o
            .iter()
            .all(|ov| t.iter().any(|tv| jsonb_contains(tv, ov))),
        (t, o) => value_eq(t, o),
    }
}

/// Compiled predicates combined under AND or OR
///
/// An empty condition matches everything: an empty filter list degrades
/// to a plain scoped listing.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Condition {
    pub fn empty() -> Self {
        Condition::All(Vec::new())
    }

    /// Compile and combine a filter list
    pub fn compile(filters: &[Filter], op: LogicalOp) -> Result<Self> {
        let predicates = filters
            .iter()
            .map(Predicate::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Condition::combine(predicates, op))
    }

    pub fn combine(predicates: Vec<Predicate>, op: LogicalOp) -> Self {
        match op {
            LogicalOp::And => Condition::All(predicates),
            LogicalOp::Or => Condition::Any(predicates),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Condition::All(p) | Condition::Any(p) => p.is_empty(),
        }
    }

    pub fn matches(&self, data: &Value) -> bool {
        match self {
            Condition::All(predicates) => predicates.iter().all(|p| p.matches(data)),
            // An empty disjunction still degrades to a plain listing.
            Condition::Any(predicates) => {
                predicates.is_empty() || predicates.iter().any(|p| p.matches(data))
            }
        }
    }

    /// Render the condition's SQL fragment, without the scope prefix
    pub fn to_sql(&self) -> String {
        let (parts, joiner): (&[Predicate], &str) = match self {
            Condition::All(p) => (p, " AND "),
            Condition::Any(p) => (p, " OR "),
        };
        if parts.is_empty() {
            return "TRUE".to_string();
        }
        parts
            .iter()
            .map(|p| format!("({})", p.to_sql()))
            .collect::<Vec<_>>()
            .join(joiner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pred(path: &str, op: FilterOp, value: Value) -> Predicate {
        Predicate::compile(&Filter::new(path, op, value)).unwrap()
    }

    // =========================================================================
    // Path chain rendering
    // =========================================================================

    #[test]
    fn chain_expr_renders_keys_and_indexes() {
        let chain = PathChain::parse("user.emails[0]").unwrap();
        assert_eq!(chain_expr(&chain, false), "data->'user'->'emails'->0");
        assert_eq!(chain_expr(&chain, true), "data->'user'->'emails'->>0");
    }

    #[test]
    fn chain_expr_for_wildcard_matches_container_expr() {
        let wild = PathChain::parse("items[*].value").unwrap();
        let container = PathChain::parse("items").unwrap();
        assert_eq!(chain_expr(&wild, false), chain_expr(&container, false));
    }

    #[test]
    fn chain_expr_escapes_quotes_in_keys() {
        let chain = PathChain::from_segments(vec![PathSegment::Key("o'brien".to_string())]);
        assert_eq!(chain_expr(&chain, false), "data->'o''brien'");
    }

    // =========================================================================
    // SQL rendering
    // =========================================================================

    #[test]
    fn numeric_operand_gets_numeric_cast() {
        let p = pred("age", FilterOp::GreaterOrEqual, json!(18));
        assert_eq!(p.to_sql(), "(data->>'age')::numeric >= 18");
    }

    #[test]
    fn text_operand_gets_text_comparison() {
        let p = pred("name", FilterOp::Equals, json!("ada"));
        assert_eq!(p.to_sql(), "data->>'name' = 'ada'");
    }

    #[test]
    fn in_list_cast_follows_first_element() {
        let numeric = pred("age", FilterOp::InList, json!([18, 21]));
        assert_eq!(numeric.to_sql(), "(data->>'age')::numeric IN (18, 21)");

        let textual = pred("plan", FilterOp::NotInList, json!(["free", "trial"]));
        assert_eq!(textual.to_sql(), "data->>'plan' NOT IN ('free', 'trial')");
    }

    #[test]
    fn containment_renders_jsonb_operators() {
        let p = pred("profile", FilterOp::ContainsSubdocument, json!({"vip": true}));
        assert_eq!(p.to_sql(), "data->'profile' @> '{\"vip\":true}'::jsonb");

        let p = pred("tags", FilterOp::ArrayContainsElement, json!("rust"));
        assert_eq!(p.to_sql(), "data->'tags' @> '[\"rust\"]'::jsonb");
    }

    #[test]
    fn key_operators_render_question_forms() {
        assert_eq!(
            pred("profile", FilterOp::HasKey, json!("email")).to_sql(),
            "data->'profile' ? 'email'"
        );
        assert_eq!(
            pred("profile", FilterOp::HasAnyKey, json!(["a", "b"])).to_sql(),
            "data->'profile' ?| array['a', 'b']"
        );
        assert_eq!(
            pred("profile", FilterOp::HasAllKeys, json!(["a", "b"])).to_sql(),
            "data->'profile' ?& array['a', 'b']"
        );
    }

    #[test]
    fn substring_match_escapes_like_wildcards() {
        let p = pred("name", FilterOp::SubstringMatch, json!("100%"));
        assert_eq!(p.to_sql(), "data->>'name' LIKE '%100\\%%'");
    }

    #[test]
    fn path_exists_is_a_null_check() {
        let p = pred("profile.email", FilterOp::PathExists, json!(null));
        assert_eq!(p.to_sql(), "data->'profile'->'email' IS NOT NULL");
    }

    // =========================================================================
    // Operand validation
    // =========================================================================

    #[test]
    fn list_operators_require_array_operands() {
        for op in [
            FilterOp::InList,
            FilterOp::NotInList,
            FilterOp::HasAnyKey,
            FilterOp::HasAllKeys,
        ] {
            let result = Predicate::compile(&Filter::new("a", op, json!("not-a-list")));
            assert!(matches!(result, Err(Error::Validation { .. })), "{op}");
        }
    }

    #[test]
    fn malformed_path_fails_before_query() {
        let result = Predicate::compile(&Filter::new("items[x]", FilterOp::Equals, json!(1)));
        assert!(matches!(result, Err(Error::InvalidPath { .. })));
    }

    // =========================================================================
    // In-memory evaluation
    // =========================================================================

    #[test]
    fn scalar_comparisons_match() {
        let doc = json!({"age": 30, "name": "ada"});
        assert!(pred("age", FilterOp::GreaterOrEqual, json!(18)).matches(&doc));
        assert!(pred("age", FilterOp::LessThan, json!(31)).matches(&doc));
        assert!(!pred("age", FilterOp::LessThan, json!(5)).matches(&doc));
        assert!(pred("name", FilterOp::Equals, json!("ada")).matches(&doc));
        assert!(pred("name", FilterOp::NotEquals, json!("bob")).matches(&doc));
    }

    #[test]
    fn numeric_equality_coerces_integer_and_float() {
        let doc = json!({"age": 18});
        assert!(pred("age", FilterOp::Equals, json!(18.0)).matches(&doc));
    }

    #[test]
    fn in_list_and_not_in_list() {
        let doc = json!({"plan": "pro"});
        assert!(pred("plan", FilterOp::InList, json!(["free", "pro"])).matches(&doc));
        assert!(!pred("plan", FilterOp::NotInList, json!(["free", "pro"])).matches(&doc));
    }

    #[test]
    fn array_contains_element() {
        let doc = json!({"tags": ["rust", "db"]});
        assert!(pred("tags", FilterOp::ArrayContainsElement, json!("rust")).matches(&doc));
        assert!(!pred("tags", FilterOp::ArrayContainsElement, json!("go")).matches(&doc));
    }

    #[test]
    fn containment_is_recursive() {
        let doc = json!({"profile": {"vip": true, "level": 3, "flags": ["a", "b"]}});
        assert!(pred(
            "profile",
            FilterOp::ContainsSubdocument,
            json!({"vip": true, "flags": ["a"]})
        )
        .matches(&doc));
        assert!(!pred(
            "profile",
            FilterOp::ContainsSubdocument,
            json!({"vip": false})
        )
        .matches(&doc));
        assert!(pred("profile", FilterOp::ContainedBy, json!({"vip": true, "level": 3, "flags": ["a", "b"], "extra": 1}))
            .matches(&json!({"profile": {"vip": true}})));
    }

    #[test]
    fn key_operators_match() {
        let doc = json!({"profile": {"email": "a@b.com", "age": 3}});
        assert!(pred("profile", FilterOp::HasKey, json!("email")).matches(&doc));
        assert!(pred("profile", FilterOp::HasAnyKey, json!(["missing", "age"])).matches(&doc));
        assert!(pred("profile", FilterOp::HasAllKeys, json!(["email", "age"])).matches(&doc));
        assert!(!pred("profile", FilterOp::HasAllKeys, json!(["email", "nope"])).matches(&doc));
    }

    #[test]
    fn path_exists_and_path_matches() {
        let doc = json!({"a": {"b": null}});
        assert!(pred("a.b", FilterOp::PathExists, json!(null)).matches(&doc));
        assert!(!pred("a.c", FilterOp::PathExists, json!(null)).matches(&doc));
        assert!(pred("a", FilterOp::PathMatches, json!({"b": null})).matches(&doc));
    }

    #[test]
    fn substring_match() {
        let doc = json!({"email": "ada@lovelace.org"});
        assert!(pred("email", FilterOp::SubstringMatch, json!("lovelace")).matches(&doc));
        assert!(!pred("email", FilterOp::SubstringMatch, json!("babbage")).matches(&doc));
    }

    #[test]
    fn wildcard_predicate_applies_to_container() {
        let doc = json!({"items": [{"v": 1}, {"v": 2}]});
        // items[*] truncates to items; containment against the array.
        let p = pred("items[*]", FilterOp::ContainsSubdocument, json!([{"v": 2}]));
        assert!(p.matches(&doc));
    }

    #[test]
    fn missing_path_never_matches_value_operators() {
        let doc = json!({"a": 1});
        assert!(!pred("b", FilterOp::Equals, json!(1)).matches(&doc));
        assert!(!pred("b", FilterOp::NotEquals, json!(1)).matches(&doc));
        assert!(!pred("b", FilterOp::InList, json!([1])).matches(&doc));
    }

    // =========================================================================
    // Conditions
    // =========================================================================

    #[test]
    fn and_requires_all_predicates() {
        let condition = Condition::compile(
            &[
                Filter::new("age", FilterOp::GreaterOrEqual, json!(18)),
                Filter::new("plan", FilterOp::Equals, json!("pro")),
            ],
            LogicalOp::And,
        )
        .unwrap();
        assert!(condition.matches(&json!({"age": 20, "plan": "pro"})));
        assert!(!condition.matches(&json!({"age": 20, "plan": "free"})));
    }

    #[test]
    fn or_requires_any_predicate() {
        let condition = Condition::compile(
            &[
                Filter::new("age", FilterOp::GreaterOrEqual, json!(18)),
                Filter::new("age", FilterOp::LessThan, json!(5)),
            ],
            LogicalOp::Or,
        )
        .unwrap();
        assert!(condition.matches(&json!({"age": 30})));
        assert!(condition.matches(&json!({"age": 3})));
        assert!(!condition.matches(&json!({"age": 10})));
    }

    #[test]
    fn empty_condition_matches_everything() {
        assert!(Condition::empty().matches(&json!({"anything": true})));
        assert!(Condition::combine(Vec::new(), LogicalOp::Or).matches(&json!({})));
    }

    #[test]
    fn condition_sql_joins_with_logical_operator() {
        let condition = Condition::compile(
            &[
                Filter::new("age", FilterOp::GreaterOrEqual, json!(18)),
                Filter::new("age", FilterOp::LessThan, json!(5)),
            ],
            LogicalOp::Or,
        )
        .unwrap();
        assert_eq!(
            condition.to_sql(),
            "((data->>'age')::numeric >= 18) OR ((data->>'age')::numeric < 5)"
        );
        assert_eq!(Condition::empty().to_sql(), "TRUE");
    }
}
