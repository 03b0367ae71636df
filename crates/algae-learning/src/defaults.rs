//! Fixed environmental lookup tables used when a prediction request does not
//! carry measured values.
//!
//! Two profiles exist. [`DefaultsProfile::Served`] is the table behind the
//! prediction endpoint; [`DefaultsProfile::Projection`] is the table used
//! for the monthly projections, which differs in December's temperature and
//! in the cold-season nutrient ranges.

use algae_processing::{EnvironmentalConditions, Month, Season};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigValidationError;

/// Default relative half-width of the DIN range built around a single value.
pub const DEFAULT_DIN_BAND: f64 = 0.10;
/// Default relative half-width of the NT range built around a single value.
pub const DEFAULT_NT_BAND: f64 = 0.15;

const SERVED_TEMPERATURES: [f64; 12] = [
    18.5, 17.5, 18.0, 20.0, 22.0, 25.0, 26.5, 27.0, 26.5, 25.0, 22.0, 26.5,
];
const PROJECTION_TEMPERATURES: [f64; 12] = [
    18.5, 17.5, 18.0, 20.0, 22.0, 25.0, 26.5, 27.0, 26.5, 25.0, 22.0, 19.5,
];

const DRY_NUTRIENTS: NutrientDefaults = NutrientDefaults {
    din_min: 4.0,
    din_max: 8.0,
    nt_min: 13.0,
    nt_max: 30.0,
};
const RAINY_NUTRIENTS: NutrientDefaults = NutrientDefaults {
    din_min: 4.5,
    din_max: 8.5,
    nt_min: 15.0,
    nt_max: 32.0,
};
const SERVED_COLD_NUTRIENTS: NutrientDefaults = NutrientDefaults {
    din_min: 1.5,
    din_max: 1.5,
    nt_min: 38.5,
    nt_max: 38.5,
};
const PROJECTION_COLD_NUTRIENTS: NutrientDefaults = NutrientDefaults {
    din_min: 3.5,
    din_max: 7.0,
    nt_min: 12.0,
    nt_max: 25.0,
};

/// Which table of defaults to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultsProfile {
    #[default]
    Served,
    Projection,
}

impl DefaultsProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Served => "served",
            Self::Projection => "projection",
        }
    }
}

impl fmt::Display for DefaultsProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefaultsProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "served" => Ok(Self::Served),
            "projection" => Ok(Self::Projection),
            other => Err(format!(
                "unknown defaults profile '{other}' (expected 'served' or 'projection')"
            )),
        }
    }
}

/// Nutrient ranges (μM) of one season.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutrientDefaults {
    pub din_min: f64,
    pub din_max: f64,
    pub nt_min: f64,
    pub nt_max: f64,
}

/// Environmental inputs after defaults and overrides have been applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedInputs {
    pub season: Season,
    pub temperature: f64,
    /// Point DIN value: the override, or the midpoint of the default range.
    pub din: f64,
    pub din_min: f64,
    pub din_max: f64,
    /// Point NT value: the override, or the midpoint of the default range.
    pub nt: f64,
    pub nt_min: f64,
    pub nt_max: f64,
}

impl ResolvedInputs {
    /// The model-facing subset of the inputs.
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

/// Month and season lookup tables plus the relative bands applied to single
/// DIN/NT overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalDefaults {
    profile: DefaultsProfile,
    temperatures: [f64; 12],
    cold: NutrientDefaults,
    dry: NutrientDefaults,
    rainy: NutrientDefaults,
    din_band: f64,
    nt_band: f64,
}

impl Default for SeasonalDefaults {
    fn default() -> Self {
        Self::for_profile(DefaultsProfile::default())
    }
}

impl SeasonalDefaults {
    pub fn for_profile(profile: DefaultsProfile) -> Self {
        let (temperatures, cold) = match profile {
            DefaultsProfile::Served => (SERVED_TEMPERATURES, SERVED_COLD_NUTRIENTS),
            DefaultsProfile::Projection => (PROJECTION_TEMPERATURES, PROJECTION_COLD_NUTRIENTS),
        };
        Self {
            profile,
            temperatures,
            cold,
            dry: DRY_NUTRIENTS,
            rainy: RAINY_NUTRIENTS,
            din_band: DEFAULT_DIN_BAND,
            nt_band: DEFAULT_NT_BAND,
        }
    }

    /// Replace the relative bands applied to DIN and NT overrides.
    pub fn with_bands(mut self, din_band: f64, nt_band: f64) -> Result<Self, ConfigValidationError> {
        for (field, value) in [("din_band", din_band), ("nt_band", nt_band)] {
            if !(0.0..1.0).contains(&value) {
                return Err(ConfigValidationError::InvalidBand {
                    field: field.to_string(),
                    value,
                });
            }
        }
        self.din_band = din_band;
        self.nt_band = nt_band;
        Ok(self)
    }

    pub fn profile(&self) -> DefaultsProfile {
        self.profile
    }

    pub fn din_band(&self) -> f64 {
        self.din_band
    }

    pub fn nt_band(&self) -> f64 {
        self.nt_band
    }

    /// Season of a month.
    pub fn season(&self, month: Month) -> Season {
        month.season()
    }

    /// Typical water temperature (°C) of a month.
    pub fn temperature(&self, month: Month) -> f64 {
        self.temperatures[month.number() as usize - 1]
    }

    /// Typical nutrient ranges of a season.
    pub fn nutrients(&self, season: Season) -> NutrientDefaults {
        match season {
            Season::Cold => self.cold,
            Season::Dry => self.dry,
            Season::Rainy => self.rainy,
        }
    }

    /// Fill in model inputs for a month, applying any overrides.
    ///
    /// A DIN override `v` becomes the range `v × (1 ∓ din_band)`; NT likewise
    /// with `nt_band`. Without an override the season's range is used and the
    /// point value is its midpoint.
    pub fn resolve(
        &self,
        month: Month,
        temperature: Option<f64>,
        din: Option<f64>,
        nt: Option<f64>,
    ) -> ResolvedInputs {
        let season = self.season(month);
        let nutrients = self.nutrients(season);

        let (din, din_min, din_max) = match din {
            Some(value) => (
                value,
                value * (1.0 - self.din_band),
                value * (1.0 + self.din_band),
            ),
            None => (
                (nutrients.din_min + nutrients.din_max) / 2.0,
                nutrients.din_min,
                nutrients.din_max,
            ),
        };
        let (nt, nt_min, nt_max) = match nt {
            Some(value) => (
                value,
                value * (1.0 - self.nt_band),
                value * (1.0 + self.nt_band),
            ),
            None => (
                (nutrients.nt_min + nutrients.nt_max) / 2.0,
                nutrients.nt_min,
                nutrients.nt_max,
            ),
        };

        ResolvedInputs {
            season,
            temperature: temperature.unwrap_or_else(|| self.temperature(month)),
            din,
            din_min,
            din_max,
            nt,
            nt_min,
            nt_max,
        }
    }
}
