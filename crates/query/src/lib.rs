//! `natours-query`: query-string translation.
//!
//! Turns an HTTP query string into a sequence of store operations (filter,
//! sort, projection, pagination) applied to any [`QueryBuilder`]. The crate
//! knows nothing about resources or storage backends.
//!
//! ```text
//! ?difficulty=easy&price[lte]=500&sort=-price&fields=name,price&page=2&limit=10
//!   -> filter [difficulty = easy, price <= 500]
//!   -> sort   [price desc]
//!   -> project {id, name, price}
//!   -> paginate skip 10, limit 10
//! ```

pub mod params;
pub mod plan;

pub use params::{QueryParams, QueryParamsError, RESERVED_KEYS};
pub use plan::{
    ComparisonOp, Direction, FilterClause, PageWindow, Projection, QueryBuilder, QueryPlan,
    SortKey, SortSpec, translate, DEFAULT_LIMIT, DEFAULT_PAGE, IDENTITY_FIELD,
};
