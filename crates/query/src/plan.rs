//! Query plan: the store-independent form of a parsed query string.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::params::QueryParams;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 100;

/// Identity field, always part of an inclusion projection.
pub const IDENTITY_FIELD: &str = "id";

/// Comparison applied by a [`FilterClause`].
///
/// `Ne` is never produced from a query string; resources use it to express
/// base scopes such as "tours that are not secret".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Ne,
}

impl ComparisonOp {
    /// Operator named inside a `field[op]` key.
    pub fn from_bracket(op: &str) -> Option<Self> {
        match op {
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Ne => "ne",
        }
    }

    /// Whether `stored.cmp(wanted) == ordering` satisfies this operator.
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
        }
    }
}

/// One conjunct of a store filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    pub field: String,
    pub op: ComparisonOp,
    pub value: Value,
}

impl FilterClause {
    pub fn new(field: impl Into<String>, op: ComparisonOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ComparisonOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ComparisonOp::Ne, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

/// Ordered sort keys; earlier keys take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortSpec(Vec<SortKey>);

impl SortSpec {
    /// `"price,-ratingsAverage"` -> price ascending, then rating descending.
    /// Returns `None` when no usable token is present.
    pub fn parse(raw: &str) -> Option<Self> {
        let keys: Vec<SortKey> = raw
            .split(',')
            .map(str::trim)
            .filter_map(|token| match token.strip_prefix('-') {
                Some(field) if !field.is_empty() => Some(SortKey {
                    field: field.to_string(),
                    direction: Direction::Descending,
                }),
                Some(_) => None,
                None if token.is_empty() => None,
                None => Some(SortKey {
                    field: token.to_string(),
                    direction: Direction::Ascending,
                }),
            })
            .collect();
        (!keys.is_empty()).then_some(Self(keys))
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self(vec![SortKey {
            field: field.into(),
            direction: Direction::Descending,
        }])
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.0
    }
}

/// Which fields a query returns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Projection {
    /// Everything except the resource's internal fields.
    #[default]
    Default,
    /// Exactly these top-level fields plus the identity field.
    Include(Vec<String>),
    /// Everything except these fields (and the internal ones).
    Exclude(Vec<String>),
}

impl Projection {
    /// `"name,price"` includes, `"-description,-images"` excludes. In a mixed
    /// list the exclusions are ignored.
    pub fn parse(raw: &str) -> Self {
        let tokens: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty() && *t != "-")
            .collect();
        if tokens.is_empty() {
            return Self::Default;
        }

        if tokens.iter().all(|t| t.starts_with('-')) {
            Self::Exclude(tokens.iter().map(|t| top_level(&t[1..])).collect())
        } else {
            Self::Include(
                tokens
                    .iter()
                    .filter(|t| !t.starts_with('-'))
                    .map(|t| top_level(t))
                    .collect(),
            )
        }
    }

    /// Whether a top-level `field` survives this projection.
    pub fn retains(&self, field: &str, internal: &[&str]) -> bool {
        if field == IDENTITY_FIELD {
            return true;
        }
        match self {
            Self::Default => !internal.contains(&field),
            Self::Include(fields) => fields.iter().any(|f| f == field),
            Self::Exclude(fields) => {
                !internal.contains(&field) && !fields.iter().any(|f| f == field)
            }
        }
    }
}

fn top_level(token: &str) -> String {
    token.split('.').next().unwrap_or(token).to_string()
}

/// A page of results: `page` and `limit` are both at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    page: u64,
    limit: u64,
}

impl Default for PageWindow {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageWindow {
    /// Zero values fall back to the defaults.
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: if page == 0 { DEFAULT_PAGE } else { page },
            limit: if limit == 0 { DEFAULT_LIMIT } else { limit },
        }
    }

    /// Lenient parse of raw `page`/`limit` values: anything that is not a
    /// positive integer becomes the default.
    pub fn from_raw(page: Option<&str>, limit: Option<&str>) -> Self {
        Self::new(parse_positive(page), parse_positive(limit))
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

fn parse_positive(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok()).unwrap_or(0)
}

/// Composable store query. Each step returns the refined query; nothing
/// runs until the caller executes the final value.
pub trait QueryBuilder: Sized {
    /// Add clauses; all clauses (including any base scope) are conjunctive.
    fn filter(self, clauses: Vec<FilterClause>) -> Self;
    fn sort(self, spec: SortSpec) -> Self;
    /// Ordering used when the request names none.
    fn default_sort(self) -> Self;
    fn project(self, projection: Projection) -> Self;
    fn paginate(self, window: PageWindow) -> Self;
}

/// Everything a query string asks for, in store-independent form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPlan {
    pub filters: Vec<FilterClause>,
    pub sort: Option<SortSpec>,
    pub projection: Projection,
    pub window: PageWindow,
}

impl QueryPlan {
    pub fn from_params(params: &QueryParams) -> Self {
        let filters = params
            .filters()
            .flat_map(|(field, ops)| {
                ops.iter().map(move |(op, value)| {
                    FilterClause::new(field, *op, Value::String(value.clone()))
                })
            })
            .collect();

        Self {
            filters,
            sort: params.sort().and_then(SortSpec::parse),
            projection: params.fields().map(Projection::parse).unwrap_or_default(),
            window: PageWindow::from_raw(params.page(), params.limit()),
        }
    }

    /// Filter, then sort, then project, then paginate.
    pub fn apply<Q: QueryBuilder>(self, base: Q) -> Q {
        let query = base.filter(self.filters);
        let query = match self.sort {
            Some(spec) => query.sort(spec),
            None => query.default_sort(),
        };
        query.project(self.projection).paginate(self.window)
    }
}

/// Compose `params` onto an already-scoped base query.
pub fn translate<Q: QueryBuilder>(base: Q, params: &QueryParams) -> Q {
    let plan = QueryPlan::from_params(params);
    tracing::trace!(
        filters = plan.filters.len(),
        skip = plan.window.skip(),
        limit = plan.window.limit(),
        "translated query string"
    );
    plan.apply(base)
}
