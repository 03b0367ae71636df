//! Integration tests for training, artifact persistence and prediction.
//!
//! These tests load the CSV fixture, train into a temporary directory and
//! query the stored models through the public API.

use algae_learning::{
    FeatureEncoder, FsArtifactStore, LearningError, MetricKind, PredictionRequest,
    PredictionService, SUMMARY_KEY, SeasonalDefaults, SpeciesModel, SpeciesOutcome, Trainer,
    TrainingConfig, TrainingSummary, best_models,
};
use algae_processing::{Dataset, DatasetLoader, Season};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

const TRAINED: &str = "Ulva lactuca";
const SKIPPED: &str = "Caulerpa sertularioides";

fn fixture(filename: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(filename)
}

fn load_fixture() -> Dataset {
    DatasetLoader::new()
        .load_csv(fixture("training.csv"))
        .expect("fixture should load")
}

/// Train the fixture into a fresh directory.
fn train_fixture() -> (TempDir, Arc<FsArtifactStore>, TrainingSummary) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsArtifactStore::new(dir.path().join("models")));
    let config = TrainingConfig::builder()
        .min_samples(30)
        .models_dir(dir.path().join("models"))
        .build()
        .unwrap();

    let summary = Trainer::builder()
        .config(config)
        .store(store.clone())
        .build()
        .unwrap()
        .train_all(load_fixture().observations())
        .unwrap();
    (dir, store, summary)
}

// ============================================================================
// Training Tests
// ============================================================================

#[test]
fn test_fixture_loads_all_rows() {
    let dataset = load_fixture();
    assert_eq!(dataset.len(), 50);
    assert_eq!(dataset.species_list(), vec![SKIPPED, TRAINED]);
    assert_eq!(dataset.filter_by_species(TRAINED).len(), 40);
}

#[test]
fn test_train_all_outcomes() {
    let (_dir, _store, summary) = train_fixture();

    assert_eq!(summary.len(), load_fixture().species_list().len());
    assert_eq!(summary.successful(), vec![TRAINED]);

    let skipped = summary.get(SKIPPED).unwrap();
    assert_eq!(skipped.status(), "skipped");
    assert!(skipped.reason().unwrap().contains("10 < 30"));

    match summary.get(TRAINED).unwrap() {
        SpeciesOutcome::Success {
            n_samples,
            metrics,
            model_file,
            encoder_file,
        } => {
            assert_eq!(*n_samples, 40);
            assert_eq!(metrics.n_test_samples, 8);
            assert_eq!(metrics.n_train_samples, 32);
            assert_eq!(model_file, "model_Ulva_lactuca.json");
            assert_eq!(encoder_file, "encoder_Ulva_lactuca.json");
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn test_artifacts_are_written_and_loadable() {
    let (dir, _, summary) = train_fixture();
    let models = dir.path().join("models");

    assert!(models.join(SUMMARY_KEY).is_file());
    assert!(models.join("model_Ulva_lactuca.json").is_file());
    assert!(models.join("encoder_Ulva_lactuca.json").is_file());
    assert!(!models.join("model_Caulerpa_sertularioides.json").exists());

    let model_json = std::fs::read_to_string(models.join("model_Ulva_lactuca.json")).unwrap();
    let model = SpeciesModel::deserialize(&model_json).unwrap();
    assert_eq!(model.species(), TRAINED);
    assert_eq!(
        model.metrics(),
        summary.get(TRAINED).and_then(SpeciesOutcome::metrics)
    );

    let encoder_json = std::fs::read_to_string(models.join("encoder_Ulva_lactuca.json")).unwrap();
    let encoder = FeatureEncoder::deserialize(&encoder_json).unwrap();
    // three seasons: five numeric inputs plus two indicators, degree 2
    assert_eq!(encoder.feature_info().unwrap().n_polynomial_features, 35);

    let reloaded = TrainingSummary::load(&FsArtifactStore::new(&models)).unwrap();
    assert_eq!(reloaded, summary);
}

#[test]
fn test_training_is_reproducible() {
    let (_a, _, first) = train_fixture();
    let (_b, _, second) = train_fixture();
    assert_eq!(first, second);
}

#[test]
fn test_stored_model_predictions_match_in_memory_model() {
    let dataset = load_fixture();
    let rows = dataset.filter_by_species(TRAINED);

    let mut encoder = FeatureEncoder::new(2);
    let (x, y) = encoder.fit_transform(&rows).unwrap();
    let mut model = SpeciesModel::new(TRAINED, 1.0);
    model.train(&x, &y, 0.2, 42).unwrap();

    let encoder2 = FeatureEncoder::deserialize(&encoder.serialize().unwrap()).unwrap();
    let model2 = SpeciesModel::deserialize(&model.serialize().unwrap()).unwrap();

    let before = model.predict(&encoder.transform(&rows).unwrap()).unwrap();
    let after = model2.predict(&encoder2.transform(&rows).unwrap()).unwrap();
    assert_eq!(
        before.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
        after.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
    );
    assert!(before.iter().all(|v| *v >= 0.0));
}

// ============================================================================
// Prediction Tests
// ============================================================================

#[test]
fn test_predict_trained_species() {
    let (_dir, store, summary) = train_fixture();
    let service = PredictionService::new(store, SeasonalDefaults::default());

    let prediction = service
        .predict(&PredictionRequest::new(TRAINED, "S1", "2025-07-15"))
        .unwrap();

    assert_eq!(prediction.season, Season::Rainy);
    assert_eq!(prediction.inputs_used.temperature, 26.5);
    assert!(prediction.estimate >= 0.0);
    assert_eq!(prediction.estimate, (prediction.estimate * 100.0).round() / 100.0);

    let test = summary.get(TRAINED).unwrap().metrics().unwrap().test;
    assert_eq!(prediction.confidence.r2, (test.r2 * 10_000.0).round() / 10_000.0);
    assert_eq!(prediction.confidence.rmse, (test.rmse * 100.0).round() / 100.0);
    assert_eq!(prediction.confidence.mae, (test.mae * 100.0).round() / 100.0);
}

#[test]
fn test_predict_errors() {
    let (_dir, store, _) = train_fixture();
    let service = PredictionService::new(store, SeasonalDefaults::default());

    let err = service
        .predict(&PredictionRequest::new("Sargassum", "S1", "2025-07-15"))
        .unwrap_err();
    assert!(matches!(err, LearningError::UnknownSpecies(_)));

    let err = service
        .predict(&PredictionRequest::new(SKIPPED, "S1", "2025-07-15"))
        .unwrap_err();
    assert!(matches!(err, LearningError::UnknownSpecies(_)));

    let err = service
        .predict(&PredictionRequest::new(TRAINED, "S1", "15-07-2025"))
        .unwrap_err();
    assert!(matches!(err, LearningError::InvalidDate(_)));
    assert!(err.is_client_error());
}

#[test]
fn test_prediction_without_training_summary() {
    let dir = tempfile::tempdir().unwrap();
    let service = PredictionService::new(
        Arc::new(FsArtifactStore::new(dir.path())),
        SeasonalDefaults::default(),
    );
    let err = service
        .predict(&PredictionRequest::new(TRAINED, "S1", "2025-07-15"))
        .unwrap_err();
    assert_eq!(err.error_code(), "ARTIFACT_NOT_FOUND");
}

#[test]
fn test_projection_and_info() {
    let (_dir, store, _) = train_fixture();
    let service = PredictionService::new(store, SeasonalDefaults::default());

    let year = service.predict_year(TRAINED, 2026).unwrap();
    assert_eq!(year.len(), 12);
    assert_eq!(year[6].season, Season::Rainy);

    let dataset = load_fixture();
    let info = service.species_info(TRAINED, Some(&dataset)).unwrap();
    assert_eq!(info.total_samples, 40);
    let stats = info.biomass.unwrap();
    assert_eq!(stats.count, 40);
    assert_eq!(Some(stats.max), dataset.max_biomass(TRAINED));
}

// ============================================================================
// Ranking Tests
// ============================================================================

#[test]
fn test_best_models_from_stored_summary() {
    let (_dir, store, _) = train_fixture();
    let summary = TrainingSummary::load(store.as_ref()).unwrap();

    let ranked = best_models(&summary, 10, MetricKind::Rmse);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].species, TRAINED);
    assert_eq!(ranked[0].metric, MetricKind::Rmse);
    assert_eq!(ranked[0].value, ranked[0].rmse_test);
}
