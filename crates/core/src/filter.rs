//! Typed search filters
//!
//! A search request is a flat conjunction or disjunction of typed
//! predicates, not arbitrary relational algebra. Each filter pairs a
//! json-path with an operator and an operand value; the store crate
//! compiles these into native predicates.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Predicate operators over the JSON column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOp {
    Equals,
    NotEquals,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    InList,
    NotInList,
    /// Array at path contains the operand as an element
    ArrayContainsElement,
    /// Value at path contains the operand sub-document (JSONB `@>`)
    ContainsSubdocument,
    /// Value at path is contained by the operand (JSONB `<@`)
    ContainedBy,
    /// Object at path has the operand string as a key (JSONB `?`)
    HasKey,
    /// Object at path has any of the operand keys (JSONB `?|`)
    HasAnyKey,
    /// Object at path has all of the operand keys (JSONB `?&`)
    HasAllKeys,
    /// The path resolves to any value at all
    PathExists,
    /// The path resolves to a value equal to the operand
    PathMatches,
    /// Text at path contains the operand as a substring
    SubstringMatch,
}

impl FilterOp {
    /// SQL comparison token for the scalar operators
    pub fn sql_token(&self) -> Option<&'static str> {
        match self {
            FilterOp::Equals => Some("="),
            FilterOp::NotEquals => Some("<>"),
            FilterOp::LessThan => Some("<"),
            FilterOp::LessOrEqual => Some("<="),
            FilterOp::GreaterThan => Some(">"),
            FilterOp::GreaterOrEqual => Some(">="),
            _ => None,
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterOp::Equals => "EQUALS",
            FilterOp::NotEquals => "NOT_EQUALS",
            FilterOp::LessThan => "LESS_THAN",
            FilterOp::LessOrEqual => "LESS_OR_EQUAL",
            FilterOp::GreaterThan => "GREATER_THAN",
            FilterOp::GreaterOrEqual => "GREATER_OR_EQUAL",
            FilterOp::InList => "IN_LIST",
            FilterOp::NotInList => "NOT_IN_LIST",
            FilterOp::ArrayContainsElement => "ARRAY_CONTAINS_ELEMENT",
            FilterOp::ContainsSubdocument => "CONTAINS_SUBDOCUMENT",
            FilterOp::ContainedBy => "CONTAINED_BY",
            FilterOp::HasKey => "HAS_KEY",
            FilterOp::HasAnyKey => "HAS_ANY_KEY",
            FilterOp::HasAllKeys => "HAS_ALL_KEYS",
            FilterOp::PathExists => "PATH_EXISTS",
            FilterOp::PathMatches => "PATH_MATCHES",
            FilterOp::SubstringMatch => "SUBSTRING_MATCH",
        };
        write!(f, "{}", name)
    }
}

/// One typed predicate: json-path, operator, operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub path: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(path: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            path: path.into(),
            op,
            value,
        }
    }
}

/// How multiple filters combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOp {
    #[default]
    And,
    Or,
}

/// Offset/limit pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page {
            offset: 0,
            limit: 50,
        }
    }
}
