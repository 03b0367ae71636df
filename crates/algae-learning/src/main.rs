//! CLI entry point for training and querying macroalgae biomass models.

use algae_learning::{
    DefaultsProfile, FsArtifactStore, MetricKind, PredictionRequest, PredictionService,
    SeasonalDefaults, Trainer, TrainingConfig, TrainingSummary, best_models,
};
use algae_processing::{Dataset, DatasetLoader, SheetAssembler};
use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable naming the default artifact directory.
const MODELS_DIR_ENV: &str = "ALGAE_MODELS_DIR";
/// Environment variable naming the default dataset file.
const DATA_ENV: &str = "ALGAE_DATA";

#[derive(Parser, Debug)]
#[command(
    author = "Algae Biomass Team",
    version,
    about = "Per-species biomass models for macroalgae cultivation",
    long_about = "Train one ridge polynomial model per algae species and predict biomass \
                  from temperature, nutrients and season.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  ALGAE_DATA          Default dataset CSV for `summary` and `train`\n  \
                  ALGAE_MODELS_DIR    Default artifact directory\n\n\
                  EXAMPLES:\n  \
                  algae-biomass train -i dataset_completo.csv -o trained_models\n  \
                  algae-biomass best -m trained_models --metric rmse\n  \
                  algae-biomass predict -m trained_models --species \"Ulva lactuca\" \\\n    \
                  --site Bahia --date 2025-07-15"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Suppress progress output (only show warnings and final result)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output JSON to stdout instead of human-readable text
    ///
    /// Disables all logging so stdout carries JSON only.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize a dataset
    Summary(DataArgs),

    /// Train a model for every species with enough observations
    Train(TrainArgs),

    /// Rank trained species by a holdout metric
    Best {
        #[command(flatten)]
        models: ModelsArgs,

        /// Number of species to list
        #[arg(long, default_value = "10")]
        top: usize,

        /// Ranking metric (r2, rmse, mae, mse)
        #[arg(long, default_value = "r2")]
        metric: MetricKind,
    },

    /// List successfully trained species, best R² first
    Species(ModelsArgs),

    /// Show model metrics and biomass statistics of one species
    Info {
        #[command(flatten)]
        models: ModelsArgs,

        #[arg(long)]
        species: String,

        /// Dataset for biomass statistics
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Predict biomass for one species, site and date
    Predict(PredictArgs),

    /// Project monthly biomass over a calendar year
    Project {
        #[command(flatten)]
        models: ModelsArgs,

        #[arg(long)]
        species: String,

        #[arg(long)]
        year: i32,
    },

    /// Build the long dataset from the biomass, nutrient and temperature sheets
    Assemble {
        #[arg(long)]
        biomass: PathBuf,

        #[arg(long)]
        nutrients: PathBuf,

        #[arg(long)]
        temperatures: PathBuf,

        /// Output CSV path
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Dataset CSV (default: $ALGAE_DATA)
    #[arg(short, long)]
    input: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ModelsArgs {
    /// Artifact directory (default: $ALGAE_MODELS_DIR or trained_models)
    #[arg(short, long)]
    models: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TrainArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Artifact directory (default: $ALGAE_MODELS_DIR or trained_models)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Polynomial degree of the feature expansion
    #[arg(long, default_value = "2")]
    degree: usize,

    /// Ridge penalty
    #[arg(long, default_value = "1.0")]
    alpha: f64,

    /// Minimum observations a species needs to be trained
    #[arg(long, default_value = "30")]
    min_samples: usize,

    /// Share of observations held out for evaluation
    #[arg(long, default_value = "0.2")]
    holdout: f64,

    /// Seed of the train/holdout shuffle
    #[arg(long, default_value = "42")]
    seed: u64,
}

#[derive(Args, Debug)]
struct PredictArgs {
    #[command(flatten)]
    models: ModelsArgs,

    #[arg(long)]
    species: String,

    #[arg(long)]
    site: String,

    /// Date as YYYY-MM-DD
    #[arg(long)]
    date: String,

    /// Water temperature override (°C)
    #[arg(long)]
    temperature: Option<f64>,

    /// DIN override (μM)
    #[arg(long)]
    din: Option<f64>,

    /// NT override (μM)
    #[arg(long)]
    nt: Option<f64>,

    /// Table of defaults for missing inputs (served, projection)
    #[arg(long, default_value = "served")]
    profile: DefaultsProfile,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is disabled so that stdout only
/// carries the JSON result.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.quiet, cli.json);

    // Load environment variables from .env file
    dotenv().ok();

    match &cli.command {
        Command::Summary(data) => run_summary(&cli, data),
        Command::Train(args) => run_train(&cli, args),
        Command::Best {
            models,
            top,
            metric,
        } => run_best(&cli, models, *top, *metric),
        Command::Species(models) => run_species(&cli, models),
        Command::Info {
            models,
            species,
            input,
        } => run_info(&cli, models, species, input.as_deref()),
        Command::Predict(args) => run_predict(&cli, args),
        Command::Project {
            models,
            species,
            year,
        } => run_project(&cli, models, species, *year),
        Command::Assemble {
            biomass,
            nutrients,
            temperatures,
            output,
        } => run_assemble(&cli, biomass, nutrients, temperatures, output),
    }
}

// =============================================================================
// Path resolution
// =============================================================================

fn resolve_data(input: Option<&Path>) -> Result<PathBuf> {
    let path = match input {
        Some(path) => path.to_path_buf(),
        None => std::env::var_os(DATA_ENV)
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("No dataset given: pass --input or set {DATA_ENV}"))?,
    };
    if !path.exists() {
        return Err(anyhow!("Input file not found: {}", path.display()));
    }
    Ok(path)
}

fn resolve_models(dir: Option<&Path>) -> PathBuf {
    dir.map(Path::to_path_buf)
        .or_else(|| std::env::var_os(MODELS_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(|| TrainingConfig::default().models_dir)
}

fn load_dataset(path: &Path) -> Result<Dataset> {
    info!("Loading dataset from: {}", path.display());
    let dataset = DatasetLoader::new()
        .load_csv(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    let report = dataset.report();
    info!(
        "Dataset loaded: {} of {} rows kept ({} missing values, {} non-positive biomass, {} bad dates, {} negative nutrients)",
        report.rows_kept,
        report.rows_read,
        report.dropped_missing,
        report.dropped_non_positive,
        report.dropped_bad_date,
        report.dropped_negative_nutrient
    );
    Ok(dataset)
}

fn prediction_service(models: &ModelsArgs, profile: DefaultsProfile) -> PredictionService {
    let dir = resolve_models(models.models.as_deref());
    debug!("Reading models from {}", dir.display());
    PredictionService::new(
        Arc::new(FsArtifactStore::new(dir)),
        SeasonalDefaults::for_profile(profile),
    )
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// Commands
// =============================================================================

fn run_summary(cli: &Cli, data: &DataArgs) -> Result<()> {
    let path = resolve_data(data.input.as_deref())?;
    let dataset = load_dataset(&path)?;
    let summary = dataset.summary()?;

    if cli.json {
        return print_json(&serde_json::json!({
            "summary": summary,
            "load_report": dataset.report(),
        }));
    }

    println!("\n{}", "=".repeat(60));
    println!("DATASET SUMMARY");
    println!("{}", "=".repeat(60));
    println!("  File:      {}", path.display());
    println!("  Records:   {}", summary.total_records);
    println!("  Species:   {}", summary.n_species);
    println!("  Sites:     {}", summary.n_sites);
    if let Some(range) = summary.date_range {
        println!("  Dates:     {} to {}", range.start, range.end);
    }
    if let Some(stats) = summary.biomass_stats {
        println!(
            "  Biomass:   min {:.2} | max {:.2} | mean {:.2} | median {:.2}",
            stats.min, stats.max, stats.mean, stats.median
        );
    }
    println!();
    println!("{:<40} {:>8}", "Species", "Records");
    println!("{}", "-".repeat(49));
    for (species, count) in &summary.species_counts {
        println!("{:<40} {:>8}", truncate_str(species, 39), count);
    }
    Ok(())
}

fn run_train(cli: &Cli, args: &TrainArgs) -> Result<()> {
    let path = resolve_data(args.data.input.as_deref())?;
    let models_dir = resolve_models(args.output.as_deref());

    let config = TrainingConfig::builder()
        .degree(args.degree)
        .alpha(args.alpha)
        .min_samples(args.min_samples)
        .holdout_fraction(args.holdout)
        .seed(args.seed)
        .models_dir(&models_dir)
        .build()?;

    let dataset = load_dataset(&path)?;

    if !cli.json {
        println!("{}", "=".repeat(60));
        println!("TRAINING PER-SPECIES BIOMASS MODELS");
        println!("{}", "=".repeat(60));
    }

    let trainer = Trainer::builder()
        .config(config)
        .store(Arc::new(FsArtifactStore::new(&models_dir)))
        .on_progress(|update| {
            debug!(
                "[{:>3.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        })
        .build()?;

    let summary = trainer.train_all(dataset.observations())?;

    if cli.json {
        return print_json(&summary);
    }

    let counts = summary.counts();
    println!("Models trained:        {}", counts.successful);
    println!("Models skipped/failed: {}", counts.skipped + counts.errors);
    println!("Species processed:     {}", counts.total);
    println!("Artifacts written to:  {}", models_dir.display());
    println!();
    print!("{}", summary.render_report());
    Ok(())
}

fn run_best(cli: &Cli, models: &ModelsArgs, top: usize, metric: MetricKind) -> Result<()> {
    let store = FsArtifactStore::new(resolve_models(models.models.as_deref()));
    let summary = TrainingSummary::load(&store)?;
    let ranked = best_models(&summary, top, metric);

    if cli.json {
        return print_json(&ranked);
    }

    println!("Top {} species by {}", ranked.len(), metric);
    println!("{}", "-".repeat(80));
    for (i, m) in ranked.iter().enumerate() {
        println!(
            "{:2}. {:40} | {}: {:.4} | R²: {:.4} | RMSE: {:.2} | N: {}",
            i + 1,
            truncate_str(&m.species, 40),
            m.metric,
            m.value,
            m.r2_test,
            m.rmse_test,
            m.n_samples
        );
    }
    Ok(())
}

fn run_species(cli: &Cli, models: &ModelsArgs) -> Result<()> {
    let service = prediction_service(models, DefaultsProfile::default());
    let catalog = service.species_catalog()?;

    if cli.json {
        return print_json(&catalog);
    }

    println!("{:<40} {:>8} {:>8}", "Species", "R²", "RMSE");
    println!("{}", "-".repeat(58));
    for entry in &catalog {
        println!(
            "{:<40} {:>8.4} {:>8.2}",
            truncate_str(&entry.species, 39),
            entry.r2,
            entry.rmse
        );
    }
    Ok(())
}

fn run_info(cli: &Cli, models: &ModelsArgs, species: &str, input: Option<&Path>) -> Result<()> {
    let service = prediction_service(models, DefaultsProfile::default());
    let dataset = match input {
        Some(path) => Some(load_dataset(&resolve_data(Some(path))?)?),
        None => None,
    };
    let info = service.species_info(species, dataset.as_ref())?;

    if cli.json {
        return print_json(&info);
    }

    println!("Species: {}", info.species);
    println!("  R²:    {:.4}", info.r2);
    println!("  RMSE:  {:.2}", info.rmse);
    println!("  MAE:   {:.2}", info.mae);
    println!(
        "  Samples: {} ({} train / {} test)",
        info.total_samples, info.train_samples, info.test_samples
    );
    if let Some(stats) = info.biomass {
        println!(
            "  Biomass: min {:.2} | max {:.2} | mean {:.2} | std {:.2}",
            stats.min, stats.max, stats.mean, stats.std
        );
    }
    Ok(())
}

fn run_predict(cli: &Cli, args: &PredictArgs) -> Result<()> {
    let service = prediction_service(&args.models, args.profile);
    let request = PredictionRequest {
        species: args.species.clone(),
        site: args.site.clone(),
        date: args.date.clone(),
        temperature: args.temperature,
        din: args.din,
        nt: args.nt,
    };
    let prediction = service.predict(&request)?;

    if cli.json {
        return print_json(&prediction);
    }

    let inputs = &prediction.inputs_used;
    println!("{} at {} on {}", prediction.species, prediction.site, prediction.date);
    println!("  Estimated biomass: {:.2} g/m²", prediction.estimate);
    println!("  Season:            {}", prediction.season);
    println!("  Temperature:       {:.2} °C", inputs.temperature);
    println!(
        "  DIN:               {:.2} μM ({:.2} - {:.2})",
        inputs.din, inputs.din_min, inputs.din_max
    );
    println!(
        "  NT:                {:.2} μM ({:.2} - {:.2})",
        inputs.nt, inputs.nt_min, inputs.nt_max
    );
    println!(
        "  Model:             R² {:.4} | RMSE {:.2} | MAE {:.2}",
        prediction.confidence.r2, prediction.confidence.rmse, prediction.confidence.mae
    );
    Ok(())
}

fn run_project(cli: &Cli, models: &ModelsArgs, species: &str, year: i32) -> Result<()> {
    let service = prediction_service(models, DefaultsProfile::Projection);
    let projections = service.predict_year(species, year)?;

    if cli.json {
        return print_json(&projections);
    }

    println!("Projected biomass for {species} in {year}");
    println!(
        "{:<12} {:<12} {:<8} {:>10} {:>15}",
        "Date", "Month", "Season", "Temp (°C)", "Biomass (g/m²)"
    );
    println!("{}", "-".repeat(61));
    for p in &projections {
        println!(
            "{:<12} {:<12} {:<8} {:>10.1} {:>15.2}",
            p.date.to_string(),
            p.month_name,
            p.season.as_str(),
            p.temperature,
            p.biomass
        );
    }
    Ok(())
}

fn run_assemble(
    cli: &Cli,
    biomass: &Path,
    nutrients: &Path,
    temperatures: &Path,
    output: &Path,
) -> Result<()> {
    let dataset = SheetAssembler::new().assemble_csv(biomass, nutrients, temperatures)?;
    dataset.write_csv(output)?;
    info!("Wrote {} observations to {}", dataset.len(), output.display());

    if cli.json {
        return print_json(dataset.report());
    }

    let report = dataset.report();
    println!(
        "Assembled {} observations ({} rows read) into {}",
        report.rows_kept,
        report.rows_read,
        output.display()
    );
    Ok(())
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
