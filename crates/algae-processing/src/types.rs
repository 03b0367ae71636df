//! Core types for macroalgae observation datasets.
//!
//! Every downstream consumer works on [`Observation`] rather than on raw
//! table cells: the loader converts and validates once, and the typed
//! records are read-only afterwards.

use crate::error::ProcessingError;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Calendar
// =============================================================================

/// Climatic season used both as a model feature and as a lookup key for
/// default environmental values.
///
/// Variants are declared in alphabetical order so that the derived `Ord`
/// matches the ordering of their names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Cold,
    Dry,
    Rainy,
}

impl Season {
    /// All seasons in alphabetical order.
    pub const ALL: [Season; 3] = [Season::Cold, Season::Dry, Season::Rainy];

    /// Short name (`cold`, `dry`, `rainy`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Cold => "cold",
            Season::Dry => "dry",
            Season::Rainy => "rainy",
        }
    }

    /// Column label used in spreadsheets (`cold_season`, ...).
    pub fn sheet_label(&self) -> &'static str {
        match self {
            Season::Cold => "cold_season",
            Season::Dry => "dry_season",
            Season::Rainy => "rainy_season",
        }
    }

    /// Season a calendar month belongs to.
    ///
    /// December through February plus November are cold, March to June
    /// dry, July to October rainy. January is mapped to cold.
    pub fn from_month(month: Month) -> Season {
        match month {
            Month::Nov | Month::Dec | Month::Jan | Month::Feb => Season::Cold,
            Month::Mar | Month::Apr | Month::May | Month::Jun => Season::Dry,
            Month::Jul | Month::Aug | Month::Sep | Month::Oct => Season::Rainy,
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Season {
    type Err = ProcessingError;

    /// Accepts `cold`, `cold_season`, `Cold season`, `COLD-SEASON`, ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        let key = normalized.strip_suffix("_season").unwrap_or(&normalized);
        match key {
            "cold" => Ok(Season::Cold),
            "dry" => Ok(Season::Dry),
            "rainy" => Ok(Season::Rainy),
            _ => Err(ProcessingError::InvalidValue {
                column: "Season".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    /// All months in calendar order.
    pub const ALL: [Month; 12] = [
        Month::Jan,
        Month::Feb,
        Month::Mar,
        Month::Apr,
        Month::May,
        Month::Jun,
        Month::Jul,
        Month::Aug,
        Month::Sep,
        Month::Oct,
        Month::Nov,
        Month::Dec,
    ];

    /// Month from its 1-based number.
    pub fn from_number(number: u32) -> Option<Month> {
        match number {
            1..=12 => Some(Self::ALL[(number - 1) as usize]),
            _ => None,
        }
    }

    /// 1-based month number.
    pub fn number(&self) -> u32 {
        *self as u32 + 1
    }

    /// Month of a calendar date.
    pub fn of(date: NaiveDate) -> Month {
        Self::ALL[date.month0() as usize]
    }

    /// Three-letter English abbreviation.
    pub fn abbrev(&self) -> &'static str {
        match self {
            Month::Jan => "Jan",
            Month::Feb => "Feb",
            Month::Mar => "Mar",
            Month::Apr => "Apr",
            Month::May => "May",
            Month::Jun => "Jun",
            Month::Jul => "Jul",
            Month::Aug => "Aug",
            Month::Sep => "Sep",
            Month::Oct => "Oct",
            Month::Nov => "Nov",
            Month::Dec => "Dec",
        }
    }

    /// Full English name.
    pub fn name(&self) -> &'static str {
        match self {
            Month::Jan => "January",
            Month::Feb => "February",
            Month::Mar => "March",
            Month::Apr => "April",
            Month::May => "May",
            Month::Jun => "June",
            Month::Jul => "July",
            Month::Aug => "August",
            Month::Sep => "September",
            Month::Oct => "October",
            Month::Nov => "November",
            Month::Dec => "December",
        }
    }

    /// Season this month belongs to.
    pub fn season(&self) -> Season {
        Season::from_month(*self)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbrev())
    }
}

impl FromStr for Month {
    type Err = ProcessingError;

    /// Accepts `Mar`, `march`, `MARCH` or a number `3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(number) = trimmed.parse::<u32>() {
            return Month::from_number(number).ok_or_else(|| ProcessingError::InvalidValue {
                column: "Month".to_string(),
                value: s.to_string(),
            });
        }

        let lower = trimmed.to_ascii_lowercase();
        Month::ALL
            .into_iter()
            .find(|m| {
                lower == m.abbrev().to_ascii_lowercase() || lower == m.name().to_ascii_lowercase()
            })
            .ok_or_else(|| ProcessingError::InvalidValue {
                column: "Month".to_string(),
                value: s.to_string(),
            })
    }
}

// =============================================================================
// Observations
// =============================================================================

/// The environmental inputs a biomass model consumes.
///
/// Extracted from an [`Observation`] at training time and assembled from
/// defaults or user overrides at prediction time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalConditions {
    pub temperature: f64,
    pub din_min: f64,
    pub din_max: f64,
    pub nt_min: f64,
    pub nt_max: f64,
    pub season: Season,
}

impl EnvironmentalConditions {
    /// Names of the numeric fields, in feature order.
    pub const NUMERIC_FIELDS: [&'static str; 5] =
        ["temperature", "din_min", "din_max", "nt_min", "nt_max"];

    /// Numeric fields in the order given by [`Self::NUMERIC_FIELDS`].
    pub fn numeric_values(&self) -> [f64; 5] {
        [
            self.temperature,
            self.din_min,
            self.din_max,
            self.nt_min,
            self.nt_max,
        ]
    }
}

/// One biomass measurement of one species at one site and date, together
/// with the environmental conditions of that site and season.
///
/// Invariant: `biomass > 0` and every environmental field is finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub site: String,
    pub date: NaiveDate,
    pub month: Month,
    pub year: i32,
    pub season: Season,
    pub species: String,
    pub biomass: f64,
    pub din_min: f64,
    pub din_max: f64,
    pub nt_min: f64,
    pub nt_max: f64,
    pub temperature: f64,
}

impl Observation {
    /// Environmental feature inputs of this observation.
    pub fn conditions(&self) -> EnvironmentalConditions {
        EnvironmentalConditions {
            temperature: self.temperature,
            din_min: self.din_min,
            din_max: self.din_max,
            nt_min: self.nt_min,
            nt_max: self.nt_max,
            season: self.season,
        }
    }
}

// =============================================================================
// Summaries
// =============================================================================

/// Counts of what the loader kept and why it dropped the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub rows_read: usize,
    pub rows_kept: usize,
    /// Rows lacking biomass, temperature, or one of the nutrient bounds.
    pub dropped_missing: usize,
    /// Rows whose biomass was zero or negative.
    pub dropped_non_positive: usize,
    /// Rows whose date could not be parsed.
    pub dropped_bad_date: usize,
    /// Rows with a negative nutrient bound.
    #[serde(default)]
    pub dropped_negative_nutrient: usize,
}

/// First and last observation dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Distribution of biomass values for a set of observations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiomassStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (n - 1 denominator); 0 for a single value.
    pub std: f64,
}

/// Overview of a loaded dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_records: usize,
    pub n_species: usize,
    pub n_sites: usize,
    pub species_list: Vec<String>,
    pub sites_list: Vec<String>,
    pub species_counts: BTreeMap<String, usize>,
    pub site_counts: BTreeMap<String, usize>,
    pub date_range: Option<DateRange>,
    pub biomass_stats: Option<BiomassStats>,
}
