//! `natours-tours`: the tour catalogue.
//!
//! - `tour`: the [`Tour`] resource, its validation rules and slug
//! - `stats`: read-side aggregations (per-difficulty statistics, monthly plan)

pub mod stats;
pub mod tour;

pub use stats::{DifficultyStats, MonthPlan, monthly_plan, tour_stats};
pub use tour::{
    DEFAULT_RATINGS_AVERAGE, Difficulty, Location, Tour, TourInput, round_rating, slugify,
};
