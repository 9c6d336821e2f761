//! JSON path parsing and the compiled path chain
//!
//! A path is dotted/bracketed text (`user.profile.email`, `items[3].value`,
//! `tags[*]`) compiled into an ordered chain of key/index accesses into the
//! JSON column. The same chain feeds both query predicates and expression
//! indexes, so the two always agree on semantics.
//!
//! ## Wildcard truncation
//!
//! A wildcard segment (`items[*]`) truncates the chain at the array
//! container: `items[*].value` compiles to the chain ending at `items`.
//! Indexing or filtering the container is coarser than per-element access
//! but keeps one index per declared path instead of one per array element.
//!
//! ## Malformed paths
//!
//! Unbalanced brackets, nested brackets, a non-numeric non-`*` index, and
//! empty segments all fail with [`Error::InvalidPath`] before any query
//! executes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A segment in a compiled path chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    /// Object key access: `.foo`
    Key(String),
    /// Array element access: `[3]`
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, ".{}", k),
            PathSegment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// An ordered key-access chain into the JSON column
///
/// # Examples
///
/// ```
/// use loam_core::path::{PathChain, PathSegment};
///
/// let chain = PathChain::parse("user.profile.email").unwrap();
/// assert_eq!(chain.segments().len(), 3);
///
/// // Wildcards truncate at the container.
/// let wild = PathChain::parse("items[*].value").unwrap();
/// assert_eq!(wild, PathChain::parse("items").unwrap());
/// assert!(wild.truncated_at_wildcard());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathChain {
    segments: Vec<PathSegment>,
    /// True when a wildcard cut the chain short of the written path
    truncated: bool,
}

// Two chains are the same chain when their accesses are the same; whether a
// wildcard produced them is not part of their identity.
impl PartialEq for PathChain {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for PathChain {}

impl std::hash::Hash for PathChain {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl PathChain {
    /// Compile a dotted/bracketed path into a chain
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_path(text, "empty path"));
        }

        let opens = trimmed.chars().filter(|c| *c == '[').count();
        let closes = trimmed.chars().filter(|c| *c == ']').count();
        if opens != closes {
            return Err(Error::invalid_path(trimmed, "unbalanced brackets"));
        }

        let mut segments = Vec::new();
        let mut truncated = false;
        let chars: Vec<char> = trimmed.chars().collect();
        let mut i = 0;

        'outer: while i < chars.len() {
            match chars[i] {
                '.' => {
                    // A dot must be followed by a key or bracket segment
                    i += 1;
                    if i >= chars.len() {
                        return Err(Error::invalid_path(trimmed, "trailing dot"));
                    }
                    if chars[i] == '.' {
                        return Err(Error::invalid_path(trimmed, "empty segment"));
                    }
                }
                '[' => {
                    let idx_start = i + 1;
                    let mut j = idx_start;
                    while j < chars.len() && chars[j] != ']' {
                        if chars[j] == '[' {
                            return Err(Error::invalid_path(trimmed, "nested brackets"));
                        }
                        j += 1;
                    }
                    if j >= chars.len() {
                        return Err(Error::invalid_path(trimmed, "unbalanced brackets"));
                    }
                    let body: String = chars[idx_start..j].iter().collect();
                    if body == "*" {
                        // Wildcard: the chain stops at the container.
                        truncated = true;
                        break 'outer;
                    }
                    let idx = body.parse::<usize>().map_err(|_| {
                        Error::invalid_path(trimmed, format!("non-numeric index '{}'", body))
                    })?;
                    segments.push(PathSegment::Index(idx));
                    i = j + 1;
                }
                ']' => return Err(Error::invalid_path(trimmed, "unbalanced brackets")),
                _ => {
                    let key_start = i;
                    while i < chars.len() && chars[i] != '.' && chars[i] != '[' && chars[i] != ']'
                    {
                        i += 1;
                    }
                    let key: String = chars[key_start..i].iter().collect();
                    if key.is_empty() {
                        return Err(Error::invalid_path(trimmed, "empty segment"));
                    }
                    segments.push(PathSegment::Key(key));
                }
            }
        }

        if segments.is_empty() {
            return Err(Error::invalid_path(trimmed, "no addressable segment"));
        }

        Ok(PathChain {
            segments,
            truncated,
        })
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        PathChain {
            segments,
            truncated: false,
        }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when a wildcard cut this chain at its array container
    pub fn truncated_at_wildcard(&self) -> bool {
        self.truncated
    }

    /// The last key/index access in the chain
    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// Walk the chain into a JSON value, if every access resolves
    pub fn resolve<'a>(&self, root: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
        let mut current = root;
        for seg in &self.segments {
            current = match seg {
                PathSegment::Key(k) => current.as_object()?.get(k)?,
                PathSegment::Index(i) => current.as_array()?.get(*i)?,
            };
        }
        Some(current)
    }

    /// Canonical text form (wildcard suffix already removed)
    pub fn to_path_string(&self) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                PathSegment::Key(k) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(k);
                }
                PathSegment::Index(i) => {
                    out.push('[');
                    out.push_str(&i.to_string());
                    out.push(']');
                }
            }
        }
        out
    }
}

impl fmt::Display for PathChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_path_string())
    }
}

impl std::str::FromStr for PathChain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PathChain::parse(s)
    }
}
