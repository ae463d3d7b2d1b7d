//! Search request types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::flags::{BoardSet, Purity, PuritySet};

/// Tolerance around a canonical ratio for the bounded aspect buckets.
pub const ASPECT_TOLERANCE: f64 = 0.03;

/// Lower bound of the open-ended ultrawide bucket.
pub const ULTRAWIDE_MIN_RATIO: f64 = 2.0;

/// Named width/height ratio bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectBucket {
    /// Taller than wide
    #[serde(rename = "portrait")]
    Portrait,
    #[serde(rename = "5x4")]
    Ratio5x4,
    #[serde(rename = "4x3")]
    Ratio4x3,
    #[serde(rename = "16x10")]
    Ratio16x10,
    #[serde(rename = "16x9")]
    Ratio16x9,
    /// Ratio at or above [`ULTRAWIDE_MIN_RATIO`]
    #[serde(rename = "ultrawide")]
    Ultrawide,
}

impl AspectBucket {
    pub const ALL: [AspectBucket; 6] = [
        AspectBucket::Portrait,
        AspectBucket::Ratio5x4,
        AspectBucket::Ratio4x3,
        AspectBucket::Ratio16x10,
        AspectBucket::Ratio16x9,
        AspectBucket::Ultrawide,
    ];

    /// Canonical ratio of a tolerance-window bucket.
    pub fn canonical_ratio(self) -> Option<f64> {
        match self {
            AspectBucket::Ratio5x4 => Some(5.0 / 4.0),
            AspectBucket::Ratio4x3 => Some(4.0 / 3.0),
            AspectBucket::Ratio16x10 => Some(16.0 / 10.0),
            AspectBucket::Ratio16x9 => Some(16.0 / 9.0),
            AspectBucket::Portrait | AspectBucket::Ultrawide => None,
        }
    }

    /// Bucket for an image of the given size, if any. Square images and
    /// ratios between windows belong to no bucket.
    pub fn classify(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        if width < height {
            return Some(AspectBucket::Portrait);
        }
        let ratio = f64::from(width) / f64::from(height);
        if ratio >= ULTRAWIDE_MIN_RATIO {
            return Some(AspectBucket::Ultrawide);
        }
        Self::ALL.into_iter().find(|bucket| {
            bucket
                .canonical_ratio()
                .is_some_and(|c| ratio >= c - ASPECT_TOLERANCE && ratio <= c + ASPECT_TOLERANCE)
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            AspectBucket::Portrait => "portrait",
            AspectBucket::Ratio5x4 => "5x4",
            AspectBucket::Ratio4x3 => "4x3",
            AspectBucket::Ratio16x10 => "16x10",
            AspectBucket::Ratio16x9 => "16x9",
            AspectBucket::Ultrawide => "ultrawide",
        }
    }
}

impl fmt::Display for AspectBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AspectBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(':', "x");
        Self::ALL
            .into_iter()
            .find(|b| b.name() == normalized)
            .ok_or_else(|| format!("unknown aspect ratio '{s}'"))
    }
}

/// How a resolution filter compares against entry dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Both dimensions equal
    Exact,
    /// Both dimensions greater than or equal
    AtLeast,
}

/// Requested resolution, e.g. `1920x1080`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionFilter {
    pub width: u32,
    pub height: u32,
    pub mode: ResolutionMode,
}

impl ResolutionFilter {
    pub fn exact(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mode: ResolutionMode::Exact,
        }
    }

    pub fn at_least(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mode: ResolutionMode::AtLeast,
        }
    }
}

/// Parses `WIDTHxHEIGHT` as an exact filter.
impl FromStr for ResolutionFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let width = w.trim().parse().map_err(|_| format!("invalid width '{w}'"))?;
        let height = h.trim().parse().map_err(|_| format!("invalid height '{h}'"))?;
        Ok(Self::exact(width, height))
    }
}

/// Sort key of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    /// Text-match rank, or the configured fallback without a query
    Relevancy,
    Date,
    Views,
    Favorites,
}

impl FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relevancy" | "relevance" => Ok(Order::Relevancy),
            "date" | "date_added" => Ok(Order::Date),
            "views" => Ok(Order::Views),
            "favorites" => Ok(Order::Favorites),
            other => Err(format!("unknown order '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            Direction::Asc => Direction::Desc,
            Direction::Desc => Direction::Asc,
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(format!("unknown sort direction '{other}'")),
        }
    }
}

/// A faceted search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Entries match only if all their boards are in this set
    pub boards: BoardSet,

    /// Entries match only if all their purity levels are in this set
    pub purity: PuritySet,

    /// Free text matched against tag names
    pub query: Option<String>,

    pub resolution: Option<ResolutionFilter>,
    pub aspect: Option<AspectBucket>,
    pub order: Order,
    pub direction: Direction,

    /// 1-based
    pub page: u32,
    pub page_size: u32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            boards: BoardSet::all(),
            purity: PuritySet::only(Purity::Sfw),
            query: None,
            resolution: None,
            aspect: None,
            order: Order::Date,
            direction: Direction::Desc,
            page: 1,
            page_size: 24,
        }
    }
}
