//! Descriptive statistics over biomass columns.

use crate::types::BiomassStats;
use polars::prelude::*;

/// Compute min/max/mean/median/std for a set of biomass values.
///
/// Returns `Ok(None)` for an empty slice.
pub fn biomass_stats(values: &[f64]) -> PolarsResult<Option<BiomassStats>> {
    if values.is_empty() {
        return Ok(None);
    }

    let series = Series::new("biomass".into(), values);
    let min = series.min::<f64>()?.unwrap_or(f64::NAN);
    let max = series.max::<f64>()?.unwrap_or(f64::NAN);
    let mean = series.mean().unwrap_or(f64::NAN);
    let median = series.median().unwrap_or(f64::NAN);
    let std = calculate_std(&series)?;

    Ok(Some(BiomassStats {
        count: values.len(),
        min,
        max,
        mean,
        median,
        std,
    }))
}

/// Calculate the sample standard deviation of a float series.
pub(crate) fn calculate_std(series: &Series) -> PolarsResult<f64> {
    let mean = series.mean().unwrap_or(0.0);
    let n = series.len() as f64;

    if n <= 1.0 {
        return Ok(0.0);
    }

    let float_series = series.f64()?;
    let variance: f64 = float_series
        .into_iter()
        .filter_map(|v| v.map(|val| (val - mean).powi(2)))
        .sum::<f64>()
        / (n - 1.0);

    Ok(variance.sqrt())
}
