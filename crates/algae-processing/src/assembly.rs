//! Wide-sheet assembly.
//!
//! The field laboratory keeps three sheets:
//!
//! - **biomass**: `Site`, `Date`, then one column per species;
//! - **nutrients**: `site`, `nutrient` (`DIN` or `NT`) and one column per
//!   season holding `"min, max"` or a single value;
//! - **temperatures**: `Site` plus one column per month abbreviation.
//!
//! [`SheetAssembler`] melts the biomass sheet into one row per
//! (site, date, species), attaches nutrient bounds on (site, season) and
//! temperatures on (site, month), and hands the result to the
//! [`DatasetLoader`] so that incomplete rows are dropped by the usual rules.

use crate::dataset::Dataset;
use crate::error::{ProcessingError, Result, ResultExt};
use crate::loader::{DatasetLoader, Field, read_text_table, text_cells};
use crate::types::{Month, Season};
use crate::utils::{is_error_marker, normalize_header, parse_date_cell, parse_numeric_cell};
use chrono::Datelike;
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Min/max bounds of one nutrient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NutrientRange {
    pub min: f64,
    pub max: f64,
}

impl NutrientRange {
    /// Parse `"min, max"` or a single value (min = max).
    ///
    /// Returns `Ok(None)` for an empty or error-marker cell.
    pub fn parse(cell: &str) -> Result<Option<Self>> {
        let trimmed = cell.trim();
        if trimmed.is_empty() || is_error_marker(trimmed) {
            return Ok(None);
        }

        let invalid =
            || ProcessingError::DataFormat(format!("unparsable nutrient cell '{cell}'"));
        let values = trimmed
            .split(',')
            .map(|part| parse_numeric_cell(part).ok_or_else(invalid))
            .collect::<Result<Vec<f64>>>()?;

        match values.as_slice() {
            [value] => Ok(Some(Self {
                min: *value,
                max: *value,
            })),
            [min, max] => Ok(Some(Self {
                min: *min,
                max: *max,
            })),
            _ => Err(invalid()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SiteNutrients {
    din: Option<NutrientRange>,
    nt: Option<NutrientRange>,
}

/// Joins the three laboratory sheets into a [`Dataset`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SheetAssembler;

impl SheetAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Assemble from three CSV files.
    pub fn assemble_csv(
        &self,
        biomass: impl AsRef<Path>,
        nutrients: impl AsRef<Path>,
        temperatures: impl AsRef<Path>,
    ) -> Result<Dataset> {
        let read = |path: &Path| -> Result<DataFrame> {
            let bytes = std::fs::read(path)
                .map_err(|e| ProcessingError::Io(e).with_context(path.display().to_string()))?;
            read_text_table(bytes).context(path.display().to_string())
        };

        self.assemble(
            &read(biomass.as_ref())?,
            &read(nutrients.as_ref())?,
            &read(temperatures.as_ref())?,
        )
    }

    /// Assemble from three already-loaded sheets.
    pub fn assemble(
        &self,
        biomass: &DataFrame,
        nutrients: &DataFrame,
        temperatures: &DataFrame,
    ) -> Result<Dataset> {
        let nutrients = nutrient_table(nutrients).context("Reading nutrient sheet")?;
        let temperatures = temperature_table(temperatures).context("Reading temperature sheet")?;
        let long = melt_biomass(biomass, &nutrients, &temperatures)
            .context("Reading biomass sheet")?;

        debug!("Melted biomass sheet into {} rows", long.height());
        let dataset = DatasetLoader::new().from_dataframe(&long)?;
        info!(
            "Assembled {} observations for {} species",
            dataset.len(),
            dataset.species_list().len()
        );
        Ok(dataset)
    }
}

// =============================================================================
// Sheet Readers
// =============================================================================

/// Header of `df` whose normalized form is one of `aliases`.
fn find_header(df: &DataFrame, aliases: &[&str]) -> Option<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .find(|name| aliases.contains(&normalize_header(name).as_str()))
}

fn require_header(df: &DataFrame, aliases: &[&str], label: &str) -> Result<String> {
    find_header(df, aliases)
        .ok_or_else(|| ProcessingError::DataFormat(format!("missing '{label}' column")))
}

fn nutrient_table(df: &DataFrame) -> Result<HashMap<(String, Season), SiteNutrients>> {
    let sites = text_cells(df, &require_header(df, &["site", "sitio"], "site")?)?;
    let kinds = text_cells(df, &require_header(df, &["nutrient"], "nutrient")?)?;

    let season_columns: Vec<(Season, Vec<Option<String>>)> = Season::ALL
        .into_iter()
        .filter_map(|season| {
            find_header(df, &[season.sheet_label()]).map(|name| (season, name))
        })
        .map(|(season, name)| Ok((season, text_cells(df, &name)?)))
        .collect::<Result<_>>()?;

    if season_columns.is_empty() {
        return Err(ProcessingError::DataFormat(
            "no season columns (cold_season, dry_season, rainy_season)".to_string(),
        ));
    }

    let mut table: HashMap<(String, Season), SiteNutrients> = HashMap::new();
    for row in 0..df.height() {
        let Some(site) = cell(&sites, row) else {
            continue;
        };
        let kind = cell(&kinds, row).map(str::to_ascii_uppercase);

        for (season, cells) in &season_columns {
            let parsed = match cell(cells, row) {
                Some(text) => NutrientRange::parse(text)?,
                None => None,
            };
            let Some(range) = parsed else {
                continue;
            };
            let entry = table.entry((site.to_string(), *season)).or_default();
            match kind.as_deref() {
                Some("DIN") => entry.din = Some(range),
                Some("NT") => entry.nt = Some(range),
                other => debug!("Ignoring nutrient row {:?} for site {}", other, site),
            }
        }
    }
    Ok(table)
}

fn temperature_table(df: &DataFrame) -> Result<HashMap<(String, Month), f64>> {
    let site_header = require_header(df, &["site", "sitio"], "Site")?;
    let sites = text_cells(df, &site_header)?;

    let mut month_columns = Vec::new();
    for name in df.get_column_names() {
        if name.as_str() == site_header {
            continue;
        }
        if let Ok(month) = name.trim().parse::<Month>() {
            month_columns.push((month, text_cells(df, name)?));
        }
    }

    let mut table = HashMap::new();
    for row in 0..df.height() {
        let Some(site) = cell(&sites, row) else {
            continue;
        };
        for (month, cells) in &month_columns {
            if let Some(value) = cell(cells, row).and_then(parse_numeric_cell) {
                table.insert((site.to_string(), *month), value);
            }
        }
    }
    Ok(table)
}

/// Melt the biomass sheet and attach nutrients and temperatures.
///
/// Produces a text table with the canonical headers.
fn melt_biomass(
    df: &DataFrame,
    nutrients: &HashMap<(String, Season), SiteNutrients>,
    temperatures: &HashMap<(String, Month), f64>,
) -> Result<DataFrame> {
    let site_header = require_header(df, &["site", "sitio"], "Site")?;
    let date_header = require_header(df, &["date", "fecha"], "Date")?;
    let sites = text_cells(df, &site_header)?;
    let dates = text_cells(df, &date_header)?;

    let skip = ["month", "year", "season"];
    let mut species_columns = Vec::new();
    for name in df.get_column_names() {
        let name = name.as_str();
        if name == site_header || name == date_header || skip.contains(&normalize_header(name).as_str())
        {
            continue;
        }
        species_columns.push((name.trim().to_string(), text_cells(df, name)?));
    }

    let mut rows = LongRows::default();
    for row in 0..df.height() {
        let site = cell(&sites, row).unwrap_or_default();
        let date_text = cell(&dates, row).unwrap_or_default();
        let date = parse_date_cell(date_text);
        let month = date.map(Month::of);
        let season = month.map(|m| m.season());

        let bounds = season
            .and_then(|s| nutrients.get(&(site.to_string(), s)))
            .copied()
            .unwrap_or_default();
        let temperature = month.and_then(|m| temperatures.get(&(site.to_string(), m)).copied());

        for (species, cells) in &species_columns {
            let Some(biomass) = cell(cells, row).and_then(parse_numeric_cell) else {
                continue;
            };
            if biomass <= 0.0 {
                continue;
            }
            rows.push(LongRow {
                site,
                date: date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| date_text.to_string()),
                month: month.map(|m| m.abbrev().to_string()),
                year: date.map(|d| d.year().to_string()),
                season: season.map(|s| s.sheet_label().to_string()),
                species,
                biomass,
                nutrients: bounds,
                temperature,
            });
        }
    }

    rows.into_dataframe()
}

struct LongRow<'a> {
    site: &'a str,
    date: String,
    month: Option<String>,
    year: Option<String>,
    season: Option<String>,
    species: &'a str,
    biomass: f64,
    nutrients: SiteNutrients,
    temperature: Option<f64>,
}

#[derive(Default)]
struct LongRows {
    site: Vec<String>,
    date: Vec<String>,
    month: Vec<Option<String>>,
    year: Vec<Option<String>>,
    season: Vec<Option<String>>,
    species: Vec<String>,
    biomass: Vec<String>,
    din_min: Vec<Option<String>>,
    din_max: Vec<Option<String>>,
    nt_min: Vec<Option<String>>,
    nt_max: Vec<Option<String>>,
    temperature: Vec<Option<String>>,
}

impl LongRows {
    fn push(&mut self, row: LongRow<'_>) {
        let number = |value: Option<f64>| value.map(|v| v.to_string());
        self.site.push(row.site.to_string());
        self.date.push(row.date);
        self.month.push(row.month);
        self.year.push(row.year);
        self.season.push(row.season);
        self.species.push(row.species.to_string());
        self.biomass.push(row.biomass.to_string());
        self.din_min.push(number(row.nutrients.din.map(|r| r.min)));
        self.din_max.push(number(row.nutrients.din.map(|r| r.max)));
        self.nt_min.push(number(row.nutrients.nt.map(|r| r.min)));
        self.nt_max.push(number(row.nutrients.nt.map(|r| r.max)));
        self.temperature.push(number(row.temperature));
    }

    fn into_dataframe(self) -> Result<DataFrame> {
        let column = |field: Field, values: Vec<Option<String>>| {
            Column::new(field.canonical().into(), values)
        };
        let required = |field: Field, values: Vec<String>| {
            Column::new(field.canonical().into(), values)
        };

        Ok(DataFrame::new(vec![
            required(Field::Site, self.site),
            required(Field::Date, self.date),
            column(Field::Month, self.month),
            column(Field::Year, self.year),
            column(Field::Season, self.season),
            required(Field::Species, self.species),
            required(Field::Biomass, self.biomass),
            column(Field::DinMax, self.din_max),
            column(Field::DinMin, self.din_min),
            column(Field::NtMax, self.nt_max),
            column(Field::NtMin, self.nt_min),
            column(Field::Temperature, self.temperature),
        ])?)
    }
}

/// Trimmed, non-empty text of a cell.
fn cell(column: &[Option<String>], row: usize) -> Option<&str> {
    column
        .get(row)
        .and_then(|c| c.as_deref())
        .map(str::trim)
        .filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sheets() -> (DataFrame, DataFrame, DataFrame) {
        let biomass = df! {
            "Sitio" => ["S1", "S1", "S2"],
            "Fecha" => ["2024-03-10", "2024-08-02", "2024-12-01"],
            "Ulva" => [Some("12.5"), Some("0"), Some("3")],
            "Gracilaria" => [None, Some("4.25"), Some("")],
        }
        .unwrap();
        let nutrients = df! {
            "site" => ["S1", "S1", "S2", "S2"],
            "nutrient" => ["DIN", "NT", "DIN", "NT"],
            "Cold season" => ["1.5", "38.5", "3.5, 7.0", "12.0, 25.0"],
            "Dry season" => ["4.0, 8.0", "13.0, 30.0", "4.0, 8.0", "13.0, 30.0"],
            "Rainy season" => ["4.5, 8.5", "15.0, 32.0", "4.5, 8.5", "15.0, 32.0"],
        }
        .unwrap();
        let temperatures = df! {
            "Site" => ["S1", "S2"],
            "Mar" => ["18.0", "18.5"],
            "Aug" => ["27.0", "27.5"],
            "Dec" => ["26.5", "19.5"],
        }
        .unwrap();
        (biomass, nutrients, temperatures)
    }

    #[test]
    fn test_nutrient_range_parse() {
        assert_eq!(
            NutrientRange::parse("4.0, 8.0").unwrap(),
            Some(NutrientRange { min: 4.0, max: 8.0 })
        );
        assert_eq!(
            NutrientRange::parse("1.5").unwrap(),
            Some(NutrientRange { min: 1.5, max: 1.5 })
        );
        assert_eq!(NutrientRange::parse("").unwrap(), None);
        assert!(NutrientRange::parse("low, high").is_err());
        assert!(NutrientRange::parse("1, 2, 3").is_err());
    }

    #[test]
    fn test_assemble_melts_and_joins() {
        let (biomass, nutrients, temperatures) = sheets();
        let dataset = SheetAssembler::new()
            .assemble(&biomass, &nutrients, &temperatures)
            .unwrap();

        // Ulva S1 Mar, Gracilaria S1 Aug, Ulva S2 Dec
        assert_eq!(dataset.len(), 3);
        let obs = dataset.observations();

        assert_eq!(obs[0].species, "Ulva");
        assert_eq!(obs[0].season, Season::Dry);
        assert_eq!(obs[0].temperature, 18.0);
        assert_eq!((obs[0].din_min, obs[0].din_max), (4.0, 8.0));

        assert_eq!(obs[1].species, "Gracilaria");
        assert_eq!(obs[1].biomass, 4.25);
        assert_eq!(obs[1].season, Season::Rainy);
        assert_eq!((obs[1].nt_min, obs[1].nt_max), (15.0, 32.0));

        assert_eq!(obs[2].site, "S2");
        assert_eq!(obs[2].season, Season::Cold);
        assert_eq!(obs[2].temperature, 19.5);
        assert_eq!((obs[2].din_min, obs[2].din_max), (3.5, 7.0));
    }

    #[test]
    fn test_rows_without_temperature_are_dropped() {
        let (biomass, nutrients, _) = sheets();
        let temperatures = df! {
            "Site" => ["S1"],
            "Mar" => ["18.0"],
        }
        .unwrap();
        let dataset = SheetAssembler::new()
            .assemble(&biomass, &nutrients, &temperatures)
            .unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.report().dropped_missing, 2);
    }

    #[test]
    fn test_malformed_nutrient_sheet() {
        let (biomass, _, temperatures) = sheets();
        let nutrients = df! {
            "site" => ["S1"],
            "Cold season" => ["1.5"],
        }
        .unwrap();
        let err = SheetAssembler::new()
            .assemble(&biomass, &nutrients, &temperatures)
            .unwrap_err();
        assert!(err.is_data_format());
    }

    #[test]
    fn test_unparsable_nutrient_cell_is_error() {
        let (biomass, _, temperatures) = sheets();
        let nutrients = df! {
            "site" => ["S1"],
            "nutrient" => ["DIN"],
            "Cold season" => ["a lot"],
        }
        .unwrap();
        let err = SheetAssembler::new()
            .assemble(&biomass, &nutrients, &temperatures)
            .unwrap_err();
        assert!(err.is_data_format());
        assert!(err.to_string().contains("a lot"));
    }
}
