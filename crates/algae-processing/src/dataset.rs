//! The loaded observation table and its queries.

use crate::error::Result;
use crate::loader::Field;
use crate::statistics::biomass_stats;
use crate::types::{BiomassStats, DatasetSummary, DateRange, LoadReport, Observation};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::Path;
use tracing::info;

/// An ordered, read-only collection of observations plus the report of the
/// load that produced it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    observations: Vec<Observation>,
    report: LoadReport,
}

impl Dataset {
    pub fn new(observations: Vec<Observation>, report: LoadReport) -> Self {
        Self {
            observations,
            report,
        }
    }

    /// Wrap observations that did not come from a table.
    pub fn from_observations(observations: Vec<Observation>) -> Self {
        let report = LoadReport {
            rows_read: observations.len(),
            rows_kept: observations.len(),
            ..Default::default()
        };
        Self::new(observations, report)
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn into_observations(self) -> Vec<Observation> {
        self.observations
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Distinct species names, sorted.
    pub fn species_list(&self) -> Vec<String> {
        self.observations
            .iter()
            .map(|o| o.species.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct site names, sorted.
    pub fn sites_list(&self) -> Vec<String> {
        self.observations
            .iter()
            .map(|o| o.site.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Observations of one species, in dataset order.
    pub fn filter_by_species(&self, species: &str) -> Vec<&Observation> {
        self.observations
            .iter()
            .filter(|o| o.species == species)
            .collect()
    }

    /// Biomass distribution of one species; `None` if it has no rows.
    pub fn species_stats(&self, species: &str) -> Result<Option<BiomassStats>> {
        let values: Vec<f64> = self
            .filter_by_species(species)
            .into_iter()
            .map(|o| o.biomass)
            .collect();
        Ok(biomass_stats(&values)?)
    }

    /// Largest biomass recorded for one species.
    pub fn max_biomass(&self, species: &str) -> Option<f64> {
        self.filter_by_species(species)
            .into_iter()
            .map(|o| o.biomass)
            .reduce(f64::max)
    }

    /// Counts, ranges and biomass distribution of the whole dataset.
    pub fn summary(&self) -> Result<DatasetSummary> {
        let mut species_counts = BTreeMap::new();
        let mut site_counts = BTreeMap::new();
        for obs in &self.observations {
            *species_counts.entry(obs.species.clone()).or_insert(0) += 1;
            *site_counts.entry(obs.site.clone()).or_insert(0) += 1;
        }

        let date_range = self
            .observations
            .iter()
            .map(|o| o.date)
            .min()
            .zip(self.observations.iter().map(|o| o.date).max())
            .map(|(start, end)| DateRange { start, end });

        let values: Vec<f64> = self.observations.iter().map(|o| o.biomass).collect();

        Ok(DatasetSummary {
            total_records: self.observations.len(),
            n_species: species_counts.len(),
            n_sites: site_counts.len(),
            species_list: species_counts.keys().cloned().collect(),
            sites_list: site_counts.keys().cloned().collect(),
            species_counts,
            site_counts,
            date_range,
            biomass_stats: biomass_stats(&values)?,
        })
    }

    // =========================================================================
    // Export
    // =========================================================================

    /// Observations as a `DataFrame` with the canonical headers.
    ///
    /// Loading the result with [`crate::DatasetLoader::from_dataframe`]
    /// yields the same observations.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let obs = &self.observations;
        let strings = |f: fn(&Observation) -> String| obs.iter().map(f).collect::<Vec<_>>();
        let numbers = |f: fn(&Observation) -> f64| obs.iter().map(f).collect::<Vec<_>>();

        let columns = vec![
            Column::new(Field::Site.canonical().into(), strings(|o| o.site.clone())),
            Column::new(
                Field::Date.canonical().into(),
                strings(|o| o.date.format("%Y-%m-%d").to_string()),
            ),
            Column::new(
                Field::Month.canonical().into(),
                strings(|o| o.month.abbrev().to_string()),
            ),
            Column::new(
                Field::Year.canonical().into(),
                obs.iter().map(|o| o.year).collect::<Vec<i32>>(),
            ),
            Column::new(
                Field::Season.canonical().into(),
                strings(|o| o.season.sheet_label().to_string()),
            ),
            Column::new(Field::Species.canonical().into(), strings(|o| o.species.clone())),
            Column::new(Field::Biomass.canonical().into(), numbers(|o| o.biomass)),
            Column::new(Field::DinMax.canonical().into(), numbers(|o| o.din_max)),
            Column::new(Field::DinMin.canonical().into(), numbers(|o| o.din_min)),
            Column::new(Field::NtMax.canonical().into(), numbers(|o| o.nt_max)),
            Column::new(Field::NtMin.canonical().into(), numbers(|o| o.nt_min)),
            Column::new(Field::Temperature.canonical().into(), numbers(|o| o.temperature)),
        ];

        Ok(DataFrame::new(columns)?)
    }

    /// Write the observations as CSV with the canonical headers.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .finish(&mut df)?;
        info!("Dataset saved: {}", path.display());
        Ok(())
    }
}
