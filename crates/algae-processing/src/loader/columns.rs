//! Header resolution for observation tables.

use crate::error::{ProcessingError, Result};
use crate::utils::normalize_header;
use std::collections::HashMap;

/// A logical column of the observation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Site,
    Date,
    Species,
    Biomass,
    DinMin,
    DinMax,
    NtMin,
    NtMax,
    Temperature,
    Season,
    Month,
    Year,
}

impl Field {
    /// Fields the loader cannot work without.
    pub const REQUIRED: [Field; 9] = [
        Field::Site,
        Field::Date,
        Field::Species,
        Field::Biomass,
        Field::DinMin,
        Field::DinMax,
        Field::NtMin,
        Field::NtMax,
        Field::Temperature,
    ];

    /// Fields derived from the date when absent.
    pub const OPTIONAL: [Field; 3] = [Field::Season, Field::Month, Field::Year];

    /// Header written when exporting a dataset.
    pub fn canonical(&self) -> &'static str {
        match self {
            Field::Site => "Site",
            Field::Date => "Date",
            Field::Species => "Alga",
            Field::Biomass => "Biomass",
            Field::DinMin => "DIN_Min",
            Field::DinMax => "DIN_Max",
            Field::NtMin => "NT_Min",
            Field::NtMax => "NT_Max",
            Field::Temperature => "Temperature",
            Field::Season => "Season",
            Field::Month => "Month",
            Field::Year => "Year",
        }
    }

    /// Normalized header spellings accepted for this field.
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Field::Site => &["site", "sitio"],
            Field::Date => &["date", "fecha"],
            Field::Species => &["alga", "algae", "species"],
            Field::Biomass => &["biomass", "biomasa"],
            Field::DinMin => &["din_min"],
            Field::DinMax => &["din_max"],
            Field::NtMin => &["nt_min"],
            Field::NtMax => &["nt_max"],
            Field::Temperature => &["temperature", "temp"],
            Field::Season => &["season"],
            Field::Month => &["month"],
            Field::Year => &["year"],
        }
    }
}

/// Mapping from logical fields to the actual header names of one table.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    columns: HashMap<Field, String>,
}

impl ColumnMap {
    /// Resolve headers against the known aliases.
    ///
    /// The first header matching a field wins. Fails with a data format
    /// error listing every required field that has no matching header.
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Result<Self> {
        let mut columns = HashMap::new();

        for header in headers {
            let normalized = normalize_header(header.as_ref());
            let field = Field::REQUIRED
                .iter()
                .chain(Field::OPTIONAL.iter())
                .find(|f| f.aliases().contains(&normalized.as_str()));
            if let Some(field) = field {
                columns
                    .entry(*field)
                    .or_insert_with(|| header.as_ref().to_string());
            }
        }

        let missing: Vec<&str> = Field::REQUIRED
            .iter()
            .filter(|f| !columns.contains_key(*f))
            .map(|f| f.canonical())
            .collect();

        if !missing.is_empty() {
            return Err(ProcessingError::DataFormat(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        }

        Ok(Self { columns })
    }

    /// Header name for a field, if present.
    pub fn get(&self, field: Field) -> Option<&str> {
        self.columns.get(&field).map(String::as_str)
    }

    /// Header name for a required field.
    pub fn required(&self, field: Field) -> Result<&str> {
        self.get(field)
            .ok_or_else(|| ProcessingError::ColumnNotFound(field.canonical().to_string()))
    }
}
