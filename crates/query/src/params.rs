//! Raw query-string parsing.
//!
//! A [`QueryParams`] is built once per request and thrown away after the
//! store query has been composed. Control keys (`sort`, `fields`, `page`,
//! `limit`) are kept apart from filter keys; a control key given more than
//! once keeps its last value. So does a filter key repeated with the same
//! operator, unless the field is listed as repeatable, in which case every
//! value is kept and all of them must hold.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::plan::ComparisonOp;

/// Keys that drive sorting, projection and pagination. They never filter.
pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryParamsError {
    #[error("malformed query string: {0}")]
    Malformed(String),
}

/// Parsed query string: per-field operator/value pairs plus control keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    filters: BTreeMap<String, Vec<(ComparisonOp, String)>>,
    controls: BTreeMap<&'static str, String>,
    repeatable: &'static [&'static str],
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` query string (without
    /// the leading `?`).
    pub fn parse(raw: &str) -> Result<Self, QueryParamsError> {
        Self::parse_with(raw, &[])
    }

    /// Like [`QueryParams::parse`], keeping every value of the `repeatable`
    /// fields instead of only the last one.
    pub fn parse_with(
        raw: &str,
        repeatable: &'static [&'static str],
    ) -> Result<Self, QueryParamsError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw)
            .map_err(|e| QueryParamsError::Malformed(e.to_string()))?;
        let mut params = Self {
            repeatable,
            ..Self::default()
        };
        for (key, value) in pairs {
            params.push(&key, value);
        }
        Ok(params)
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.push(key.as_ref(), value);
        }
        params
    }

    /// Add one `key=value` pair as it appeared in the query string.
    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        let key = key.trim();
        if key.is_empty() {
            return;
        }
        if let Some(reserved) = reserved_key(key) {
            self.controls.insert(reserved, value.into());
            return;
        }

        let (field, op) = split_operator(key);
        // `sort[gte]=x` and friends: an operator on a control key is dropped.
        if reserved_key(field).is_some() {
            return;
        }
        let ops = self.filters.entry(field.to_string()).or_default();
        if !self.repeatable.contains(&field) {
            ops.retain(|(existing, _)| *existing != op);
        }
        ops.push((op, value.into()));
    }

    /// Replace whatever was given for `key`. Used by route aliases that
    /// pin a canned query (e.g. the five cheapest top-rated tours).
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        if let Some(reserved) = reserved_key(key) {
            self.controls.insert(reserved, value.into());
        } else {
            let (field, op) = split_operator(key);
            self.filters
                .insert(field.to_string(), vec![(op, value.into())]);
        }
    }

    pub fn sort(&self) -> Option<&str> {
        self.control("sort")
    }

    pub fn fields(&self) -> Option<&str> {
        self.control("fields")
    }

    pub fn page(&self) -> Option<&str> {
        self.control("page")
    }

    pub fn limit(&self) -> Option<&str> {
        self.control("limit")
    }

    /// Filter keys in field order, each with its operator/value pairs in the
    /// order they were given.
    pub fn filters(&self) -> impl Iterator<Item = (&str, &[(ComparisonOp, String)])> {
        self.filters
            .iter()
            .map(|(field, ops)| (field.as_str(), ops.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.controls.is_empty()
    }

    fn control(&self, key: &str) -> Option<&str> {
        self.controls.get(key).map(String::as_str)
    }
}

fn reserved_key(key: &str) -> Option<&'static str> {
    RESERVED_KEYS.iter().copied().find(|reserved| *reserved == key)
}

/// `price[gte]` -> (`price`, Gte). Anything that is not one of the four
/// range operators stays a literal field name compared for equality.
fn split_operator(key: &str) -> (&str, ComparisonOp) {
    if let Some((field, op)) = key.strip_suffix(']').and_then(|k| k.split_once('[')) {
        if !field.is_empty() {
            if let Some(op) = ComparisonOp::from_bracket(op) {
                return (field, op);
            }
        }
    }
    (key, ComparisonOp::Eq)
}
