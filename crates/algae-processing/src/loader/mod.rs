//! Dataset loading.
//!
//! Turns a tabular source (CSV file, reader or polars `DataFrame`) into a
//! [`Dataset`] of typed [`Observation`]s. Every cell is read as text and
//! converted here, so that spreadsheet artifacts (error markers, day-first
//! dates, numbers stored as text) are handled in one place.
//!
//! Rows are checked in this order, and each dropped row is counted once in
//! the [`LoadReport`]:
//!
//! 1. site, species, biomass, temperature and the four nutrient bounds must
//!    all be present (`dropped_missing`);
//! 2. the date must parse (`dropped_bad_date`);
//! 3. biomass must be strictly positive (`dropped_non_positive`);
//! 4. the nutrient bounds must not be negative (`dropped_negative_nutrient`).

mod columns;

pub use columns::{ColumnMap, Field};

use crate::dataset::Dataset;
use crate::error::{ProcessingError, Result};
use crate::types::{LoadReport, Month, Observation, Season};
use crate::utils::{parse_date_cell, parse_integer_cell, parse_numeric_cell};
use chrono::Datelike;
use polars::prelude::*;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, info, warn};

/// Loads observation tables into a [`Dataset`].
///
/// The loader holds no state; loading the same source twice yields equal
/// datasets.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetLoader;

impl DatasetLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a CSV file with a header row.
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<Dataset> {
        let path = path.as_ref();
        info!("Loading observations from {}", path.display());
        let bytes = std::fs::read(path)
            .map_err(|e| ProcessingError::Io(e).with_context(path.display().to_string()))?;
        self.load_bytes(bytes)
    }

    /// Load CSV content from any reader.
    pub fn load_reader<R: Read>(&self, mut reader: R) -> Result<Dataset> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.load_bytes(bytes)
    }

    /// Load observations from an already-built `DataFrame`.
    ///
    /// Columns of any dtype are accepted; they are cast to text and parsed
    /// with the same rules as CSV cells.
    pub fn from_dataframe(&self, df: &DataFrame) -> Result<Dataset> {
        let headers: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        let map = ColumnMap::resolve(&headers)?;
        let table = RawTable::extract(df, &map)?;
        Ok(table.into_dataset())
    }

    fn load_bytes(&self, bytes: Vec<u8>) -> Result<Dataset> {
        let df = read_text_table(bytes)?;
        self.from_dataframe(&df)
    }
}

/// Parse CSV content into a `DataFrame` whose columns are all text.
pub(crate) fn read_text_table(bytes: Vec<u8>) -> Result<DataFrame> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ProcessingError::DataFormat(
            "source is empty: no header row".to_string(),
        ));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| ProcessingError::DataFormat(format!("not a readable table: {e}")))?;

    debug!("Read table with {} rows and {} columns", df.height(), df.width());
    Ok(df)
}

// =============================================================================
// Row Conversion
// =============================================================================

/// Text cells of the resolved columns, one vector per field.
struct RawTable {
    height: usize,
    site: Vec<Option<String>>,
    date: Vec<Option<String>>,
    species: Vec<Option<String>>,
    biomass: Vec<Option<String>>,
    din_min: Vec<Option<String>>,
    din_max: Vec<Option<String>>,
    nt_min: Vec<Option<String>>,
    nt_max: Vec<Option<String>>,
    temperature: Vec<Option<String>>,
    season: Option<Vec<Option<String>>>,
    month: Option<Vec<Option<String>>>,
    year: Option<Vec<Option<String>>>,
}

impl RawTable {
    fn extract(df: &DataFrame, map: &ColumnMap) -> Result<Self> {
        let required = |field: Field| -> Result<Vec<Option<String>>> {
            text_cells(df, map.required(field)?)
        };
        let optional = |field: Field| -> Result<Option<Vec<Option<String>>>> {
            map.get(field).map(|name| text_cells(df, name)).transpose()
        };

        Ok(Self {
            height: df.height(),
            site: required(Field::Site)?,
            date: required(Field::Date)?,
            species: required(Field::Species)?,
            biomass: required(Field::Biomass)?,
            din_min: required(Field::DinMin)?,
            din_max: required(Field::DinMax)?,
            nt_min: required(Field::NtMin)?,
            nt_max: required(Field::NtMax)?,
            temperature: required(Field::Temperature)?,
            season: optional(Field::Season)?,
            month: optional(Field::Month)?,
            year: optional(Field::Year)?,
        })
    }

    fn into_dataset(self) -> Dataset {
        let mut report = LoadReport {
            rows_read: self.height,
            ..Default::default()
        };
        let mut observations = Vec::with_capacity(self.height);

        for row in 0..self.height {
            match self.convert_row(row) {
                RowOutcome::Kept(observation) => observations.push(*observation),
                RowOutcome::Missing => report.dropped_missing += 1,
                RowOutcome::BadDate => report.dropped_bad_date += 1,
                RowOutcome::NonPositive => report.dropped_non_positive += 1,
                RowOutcome::NegativeNutrient => report.dropped_negative_nutrient += 1,
            }
        }

        report.rows_kept = observations.len();
        let dropped = report.rows_read - report.rows_kept;
        if dropped > 0 {
            warn!(
                "Dropped {} of {} rows (missing: {}, bad date: {}, non-positive biomass: {}, negative nutrients: {})",
                dropped,
                report.rows_read,
                report.dropped_missing,
                report.dropped_bad_date,
                report.dropped_non_positive,
                report.dropped_negative_nutrient
            );
        }
        info!("Loaded {} observations", report.rows_kept);

        Dataset::new(observations, report)
    }

    fn convert_row(&self, row: usize) -> RowOutcome {
        let site = text(&self.site, row);
        let species = text(&self.species, row);
        let numbers = [
            &self.biomass,
            &self.temperature,
            &self.din_min,
            &self.din_max,
            &self.nt_min,
            &self.nt_max,
        ]
        .map(|column| text(column, row).and_then(parse_numeric_cell));

        let (Some(site), Some(species)) = (site, species) else {
            return RowOutcome::Missing;
        };
        let [
            Some(biomass),
            Some(temperature),
            Some(din_min),
            Some(din_max),
            Some(nt_min),
            Some(nt_max),
        ] = numbers
        else {
            return RowOutcome::Missing;
        };

        let Some(date) = text(&self.date, row).and_then(parse_date_cell) else {
            return RowOutcome::BadDate;
        };

        if biomass <= 0.0 {
            return RowOutcome::NonPositive;
        }
        if [din_min, din_max, nt_min, nt_max].iter().any(|v| *v < 0.0) {
            return RowOutcome::NegativeNutrient;
        }

        let month = optional_text(&self.month, row)
            .and_then(|cell| cell.parse::<Month>().ok())
            .unwrap_or_else(|| Month::of(date));
        let year = optional_text(&self.year, row)
            .and_then(parse_integer_cell)
            .unwrap_or_else(|| date.year());
        let season = optional_text(&self.season, row)
            .and_then(|cell| cell.parse::<Season>().ok())
            .unwrap_or_else(|| month.season());

        RowOutcome::Kept(Box::new(Observation {
            site: site.to_string(),
            date,
            month,
            year,
            season,
            species: species.to_string(),
            biomass,
            din_min,
            din_max,
            nt_min,
            nt_max,
            temperature,
        }))
    }
}

enum RowOutcome {
    Kept(Box<Observation>),
    Missing,
    BadDate,
    NonPositive,
    NegativeNutrient,
}

/// Trimmed, non-empty text of a cell.
fn text(column: &[Option<String>], row: usize) -> Option<&str> {
    column
        .get(row)
        .and_then(|cell| cell.as_deref())
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
}

fn optional_text(column: &Option<Vec<Option<String>>>, row: usize) -> Option<&str> {
    column.as_deref().and_then(|cells| text(cells, row))
}

/// Read a column as text cells regardless of its dtype.
pub(crate) fn text_cells(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|cell| cell.map(str::to_string))
        .collect())
}
