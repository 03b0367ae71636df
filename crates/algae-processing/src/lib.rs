//! Macroalgae Biomass Dataset Library
//!
//! Loading, reshaping and querying of spreadsheet-derived macroalgae biomass
//! observations, built on Polars.
//!
//! # Overview
//!
//! - **Loading**: CSV files, readers or `DataFrame`s become typed
//!   [`Observation`]s, with Spanish/English header aliases and spreadsheet
//!   error markers handled on the way in
//! - **Assembly**: the biomass, nutrient and temperature sheets of the field
//!   laboratory are melted and joined into the same long table
//! - **Queries**: species and site listings, per-species filtering and a
//!   dataset summary with biomass statistics
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use algae_processing::DatasetLoader;
//!
//! let dataset = DatasetLoader::new().load_csv("dataset_completo.csv")?;
//!
//! println!("{} observations", dataset.len());
//! for species in dataset.species_list() {
//!     let stats = dataset.species_stats(&species)?;
//!     println!("{species}: {stats:?}");
//! }
//!
//! let report = dataset.report();
//! println!("dropped {} rows with missing values", report.dropped_missing);
//! ```
//!
//! # Assembling the laboratory sheets
//!
//! ```rust,ignore
//! use algae_processing::SheetAssembler;
//!
//! let dataset = SheetAssembler::new().assemble_csv(
//!     "HojaBiomasa.csv",
//!     "HojaNutrientes.csv",
//!     "HojaTemperaturas.csv",
//! )?;
//! dataset.write_csv("dataset_completo.csv")?;
//! ```

pub mod assembly;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod statistics;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use assembly::{NutrientRange, SheetAssembler};
pub use dataset::Dataset;
pub use error::{ProcessingError, Result as ProcessingResult, ResultExt};
pub use loader::{ColumnMap, DatasetLoader, Field};
pub use types::{
    BiomassStats, DatasetSummary, DateRange, EnvironmentalConditions, LoadReport, Month,
    Observation, Season,
};
pub use utils::{
    clean_numeric_string, is_error_marker, parse_date_cell, parse_integer_cell, parse_numeric_cell,
};

// Loaded data is shared read-only across threads by downstream services.
static_assertions::assert_impl_all!(Dataset: Send, Sync);
static_assertions::assert_impl_all!(Observation: Send, Sync);
