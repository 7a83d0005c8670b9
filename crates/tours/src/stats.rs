//! Read-side aggregations over the tour catalogue.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::Serialize;

use crate::tour::Tour;

/// Only well-rated tours count towards the statistics.
pub const STATS_MIN_RATING: f64 = 4.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyStats {
    /// Upper-cased difficulty (`EASY`).
    pub difficulty: String,
    pub num_tours: u32,
    pub num_ratings: u32,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// Per-difficulty statistics of tours rated at least 4.5, cheapest average
/// price first.
pub fn tour_stats(tours: &[Tour]) -> Vec<DifficultyStats> {
    #[derive(Default)]
    struct Acc {
        count: u32,
        ratings: u32,
        rating_sum: f64,
        price_sum: f64,
        min_price: Option<f64>,
        max_price: Option<f64>,
    }

    let mut groups: BTreeMap<&'static str, Acc> = BTreeMap::new();
    for tour in tours.iter().filter(|t| t.ratings_average >= STATS_MIN_RATING) {
        let acc = groups.entry(tour.difficulty.as_str()).or_default();
        acc.count += 1;
        acc.ratings += tour.ratings_quantity;
        acc.rating_sum += tour.ratings_average;
        acc.price_sum += tour.price;
        acc.min_price = Some(acc.min_price.map_or(tour.price, |m| m.min(tour.price)));
        acc.max_price = Some(acc.max_price.map_or(tour.price, |m| m.max(tour.price)));
    }

    let mut stats: Vec<DifficultyStats> = groups
        .into_iter()
        .map(|(difficulty, acc)| {
            let n = f64::from(acc.count);
            DifficultyStats {
                difficulty: difficulty.to_uppercase(),
                num_tours: acc.count,
                num_ratings: acc.ratings,
                avg_rating: acc.rating_sum / n,
                avg_price: acc.price_sum / n,
                min_price: acc.min_price.unwrap_or_default(),
                max_price: acc.max_price.unwrap_or_default(),
            }
        })
        .collect();
    stats.sort_by(|a, b| a.avg_price.total_cmp(&b.avg_price));
    stats
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthPlan {
    /// 1 = January.
    pub month: u32,
    pub num_tour_starts: u32,
    pub tours: Vec<String>,
}

/// Tour starts per month of `year`, busiest month first.
pub fn monthly_plan(tours: &[Tour], year: i32) -> Vec<MonthPlan> {
    let mut months: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for tour in tours {
        for start in tour.start_dates.iter().filter(|d| d.year() == year) {
            months.entry(start.month()).or_default().push(tour.name.clone());
        }
    }

    let mut plan: Vec<MonthPlan> = months
        .into_iter()
        .map(|(month, tours)| MonthPlan {
            month,
            num_tour_starts: tours.len() as u32,
            tours,
        })
        .collect();
    // Stable sort keeps calendar order between equally busy months.
    plan.sort_by(|a, b| b.num_tour_starts.cmp(&a.num_tour_starts));
    plan.truncate(12);
    plan
}
