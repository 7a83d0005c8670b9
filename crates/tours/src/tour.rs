use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use natours_core::{DocumentId, DomainError, DomainResult, Resource, Violations};
use natours_query::FilterClause;

/// Rating shown for a tour nobody has reviewed yet.
pub const DEFAULT_RATINGS_AVERAGE: f64 = 4.5;

const NAME_MIN: usize = 10;
const NAME_MAX: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

impl Difficulty {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "difficult" => Some(Self::Difficult),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Difficult => "difficult",
        }
    }
}

/// GeoJSON point with some tour-specific extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "type", default = "point")]
    pub kind: String,
    /// `[longitude, latitude]`
    pub coordinates: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
}

fn point() -> String {
    "Point".to_string()
}

impl Location {
    fn is_valid(&self) -> bool {
        self.kind == "Point"
            && self.coordinates.len() == 2
            && (-180.0..=180.0).contains(&self.coordinates[0])
            && (-90.0..=90.0).contains(&self.coordinates[1])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: DocumentId,
    pub name: String,
    pub slug: String,
    pub duration: u32,
    pub max_group_size: u32,
    pub difficulty: Difficulty,
    pub ratings_average: f64,
    pub ratings_quantity: u32,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_discount: Option<f64>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image_cover: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(with = "natours_core::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "natours_core::timestamp::vec")]
    pub start_dates: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub secret_tour: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_location: Option<Location>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub guides: Vec<DocumentId>,
}

/// Create and update body. On create the required fields must be present; on
/// update every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourInput {
    pub name: Option<String>,
    pub duration: Option<u32>,
    pub max_group_size: Option<u32>,
    pub difficulty: Option<String>,
    pub ratings_average: Option<f64>,
    pub ratings_quantity: Option<u32>,
    pub price: Option<f64>,
    pub price_discount: Option<f64>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<DateTime<Utc>>>,
    pub secret_tour: Option<bool>,
    pub start_location: Option<Location>,
    pub locations: Option<Vec<Location>>,
    pub guides: Option<Vec<DocumentId>>,
}

impl Tour {
    pub fn duration_weeks(&self) -> f64 {
        f64::from(self.duration) / 7.0
    }

    /// Overwrite the review aggregates.
    pub fn apply_rating_summary(&mut self, quantity: u32, average: f64) {
        self.ratings_quantity = quantity;
        self.ratings_average = round_rating(average);
    }
}

impl Resource for Tour {
    type Draft = TourInput;
    type Patch = TourInput;

    const COLLECTION: &'static str = "tours";
    const NAME: &'static str = "tour";
    const INTERNAL_FIELDS: &'static [&'static str] = &["createdAt"];
    const UNIQUE_INDEXES: &'static [&'static [&'static str]] = &[&["name"]];
    const REPEATABLE_FILTERS: &'static [&'static str] = &[
        "duration",
        "ratingsAverage",
        "ratingsQuantity",
        "maxGroupSize",
        "difficulty",
        "price",
    ];
    const NUMERIC_FIELDS: &'static [&'static str] = &[
        "duration",
        "maxGroupSize",
        "ratingsAverage",
        "ratingsQuantity",
        "price",
        "priceDiscount",
    ];

    fn id(&self) -> DocumentId {
        self.id
    }

    fn create(input: TourInput, id: DocumentId, now: DateTime<Utc>) -> DomainResult<Self> {
        let mut v = Violations::new();
        let name = v.require(
            input.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            "A tour must have a name",
        );
        let duration = v.require(input.duration, "A tour must have a duration");
        let max_group_size = v.require(input.max_group_size, "A tour must have a group size");
        let difficulty = v
            .require(input.difficulty, "A tour must have a difficulty")
            .and_then(|d| parse_difficulty(&mut v, &d));
        let price = v.require(input.price, "A tour must have a price");
        let summary = v.require(
            input.summary.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            "A tour must have a summary",
        );
        let image_cover = v.require(input.image_cover, "A tour must have a cover image");
        v.finish()?;

        let (
            Some(name),
            Some(duration),
            Some(max_group_size),
            Some(difficulty),
            Some(price),
            Some(summary),
            Some(image_cover),
        ) = (name, duration, max_group_size, difficulty, price, summary, image_cover)
        else {
            return Err(DomainError::internal("tour draft passed validation with missing fields"));
        };

        let tour = Self {
            id,
            slug: slugify(&name),
            name,
            duration,
            max_group_size,
            difficulty,
            ratings_average: round_rating(input.ratings_average.unwrap_or(DEFAULT_RATINGS_AVERAGE)),
            ratings_quantity: input.ratings_quantity.unwrap_or(0),
            price,
            price_discount: input.price_discount,
            summary,
            description: input.description.map(|d| d.trim().to_string()),
            image_cover,
            images: input.images.unwrap_or_default(),
            created_at: now,
            start_dates: input.start_dates.unwrap_or_default(),
            secret_tour: input.secret_tour.unwrap_or(false),
            start_location: input.start_location,
            locations: input.locations.unwrap_or_default(),
            guides: input.guides.unwrap_or_default(),
        };
        tour.validate()?;
        Ok(tour)
    }

    fn apply_patch(&mut self, input: TourInput, _now: DateTime<Utc>) -> DomainResult<()> {
        let mut v = Violations::new();
        if let Some(name) = input.name {
            self.name = name.trim().to_string();
            self.slug = slugify(&self.name);
        }
        if let Some(difficulty) = input.difficulty.and_then(|d| parse_difficulty(&mut v, &d)) {
            self.difficulty = difficulty;
        }
        v.finish()?;

        if let Some(duration) = input.duration {
            self.duration = duration;
        }
        if let Some(size) = input.max_group_size {
            self.max_group_size = size;
        }
        if let Some(avg) = input.ratings_average {
            self.ratings_average = round_rating(avg);
        }
        if let Some(quantity) = input.ratings_quantity {
            self.ratings_quantity = quantity;
        }
        if let Some(price) = input.price {
            self.price = price;
        }
        if input.price_discount.is_some() {
            self.price_discount = input.price_discount;
        }
        if let Some(summary) = input.summary {
            self.summary = summary.trim().to_string();
        }
        if let Some(description) = input.description {
            self.description = Some(description.trim().to_string());
        }
        if let Some(cover) = input.image_cover {
            self.image_cover = cover;
        }
        if let Some(images) = input.images {
            self.images = images;
        }
        if let Some(dates) = input.start_dates {
            self.start_dates = dates;
        }
        if let Some(secret) = input.secret_tour {
            self.secret_tour = secret;
        }
        if input.start_location.is_some() {
            self.start_location = input.start_location;
        }
        if let Some(locations) = input.locations {
            self.locations = locations;
        }
        if let Some(guides) = input.guides {
            self.guides = guides;
        }
        self.validate()
    }

    fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        let name_len = self.name.chars().count();
        v.check(
            name_len <= NAME_MAX,
            format!("A tour name must have less or equal then {NAME_MAX} characters"),
        );
        v.check(
            name_len >= NAME_MIN,
            format!("A tour name must have more or equal then {NAME_MIN} characters"),
        );
        v.check(self.duration > 0, "A tour must last at least one day");
        v.check(self.max_group_size > 0, "A tour group must have room for someone");
        v.check(self.ratings_average >= 1.0, "Rating must be above 1.0");
        v.check(self.ratings_average <= 5.0, "Rating must be below 5.0");
        v.check(self.price >= 0.0, "A tour price cannot be negative");
        if let Some(discount) = self.price_discount {
            v.check(
                discount < self.price,
                format!("Discount price ({discount}) should be below regular price"),
            );
        }
        v.check(!self.summary.is_empty(), "A tour must have a summary");
        v.check(!self.image_cover.is_empty(), "A tour must have a cover image");
        let locations_ok = self.start_location.iter().chain(&self.locations).all(Location::is_valid);
        v.check(
            locations_ok,
            "Locations must be GeoJSON points with [longitude, latitude] coordinates",
        );
        v.finish()
    }

    fn base_scope() -> Vec<FilterClause> {
        vec![FilterClause::ne("secretTour", true)]
    }
}

fn parse_difficulty(v: &mut Violations, raw: &str) -> Option<Difficulty> {
    let parsed = Difficulty::parse(raw.trim());
    v.check(parsed.is_some(), "Difficulty is either: easy, medium, difficult");
    parsed
}

/// Round to one decimal place (4.666 -> 4.7).
pub fn round_rating(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// URL slug: lowercase ASCII letters and digits separated by single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if (ch.is_whitespace() || ch == '-' || ch == '_') && !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
