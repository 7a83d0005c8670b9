//! Tour rating aggregates, recomputed after every review write.

use natours_tours::{DEFAULT_RATINGS_AVERAGE, Tour, round_rating};

use crate::Review;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    pub quantity: u32,
    pub average: f64,
}

impl RatingSummary {
    /// Count every review; average the ones that carry a rating. A tour with
    /// no ratings falls back to the default average.
    pub fn from_reviews<'a>(reviews: impl IntoIterator<Item = &'a Review>) -> Self {
        let mut quantity = 0u32;
        let mut rated = 0u32;
        let mut sum = 0.0;
        for review in reviews {
            quantity += 1;
            if let Some(rating) = review.rating {
                rated += 1;
                sum += rating;
            }
        }

        let average = if rated == 0 {
            DEFAULT_RATINGS_AVERAGE
        } else {
            round_rating(sum / f64::from(rated))
        };
        Self { quantity, average }
    }

    pub fn apply_to(&self, tour: &mut Tour) {
        tour.apply_rating_summary(self.quantity, self.average);
    }
}
