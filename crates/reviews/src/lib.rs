//! `natours-reviews`: user reviews of tours and the rating aggregates they
//! feed back into each tour.

pub mod rating;
pub mod review;

pub use rating::RatingSummary;
pub use review::{Review, ReviewDraft, ReviewPatch};
