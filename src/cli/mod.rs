//! velotune CLI Module
//!
//! Command-line interface for inspecting data, fitting a baseline, tuning a
//! workflow and predicting with a saved model.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::RunConfig;
use crate::data::{initial_split, ColumnKind, SplitConfig};
use crate::export::{ModelArtifact, ModelSerializer};
use crate::optimizer::{last_fit, tune_grid, LastFit, MetricSummary};
use crate::training::{Metric, MetricSet, ModelSpec};
use crate::utils::{DataLoader, DataSaver};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString {
    s.truecolor(100, 100, 100)
}
fn accent(s: &str) -> ColoredString {
    s.truecolor(120, 170, 255)
}
fn muted(s: &str) -> ColoredString {
    s.truecolor(140, 140, 140)
}
fn ok(s: &str) -> ColoredString {
    s.truecolor(100, 210, 120)
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn print_metrics(metrics: &[(Metric, f64)]) {
    for (metric, value) in metrics {
        println!(
            "  {:<16} {}",
            muted(metric.name()),
            format!("{:.4}", value).white().bold()
        );
    }
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "velotune")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cross-validated hyperparameter tuning for bike-rental regression")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show column kinds and summary statistics
    Info {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Columns to read as categorical
        #[arg(long, value_delimiter = ',')]
        nominal: Vec<String>,
    },

    /// Fit a baseline linear model and report test metrics
    Fit {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Outcome column
        #[arg(short, long, default_value = "cnt")]
        target: String,

        /// Columns to read as categorical (defaults to the bike-rental codes)
        #[arg(long, value_delimiter = ',')]
        nominal: Option<Vec<String>>,

        /// Fraction of rows used for training
        #[arg(long, default_value = "0.7")]
        prop: f64,

        /// Split seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output model file (.json for JSON, anything else for binary)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Tune a workflow over a grid with cross-validation
    Tune {
        /// Input CSV file (overrides the config)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Outcome column
        #[arg(short, long)]
        target: Option<String>,

        /// Run configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Model family (boost_tree, linear_reg)
        #[arg(short, long)]
        model: Option<String>,

        /// Number of cross-validation folds
        #[arg(long)]
        folds: Option<usize>,

        /// Cross-validation repeats
        #[arg(long)]
        repeats: Option<usize>,

        /// Levels per parameter in the regular grid
        #[arg(long)]
        levels: Option<usize>,

        /// Seed for the split, the folds and random grids
        #[arg(long)]
        seed: Option<u64>,

        /// Worker threads (1 = sequential)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Per-fit timeout in seconds
        #[arg(long)]
        timeout: Option<f64>,

        /// Rows of the ranked table to print
        #[arg(long, default_value = "5")]
        top: usize,

        /// Output model file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Predict with a saved model
    Predict {
        /// Saved model file
        #[arg(short, long)]
        model: PathBuf,

        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Output CSV file; printed when absent
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    pub fn run(self) -> anyhow::Result<()> {
        match self {
            Commands::Info { data, nominal } => cmd_info(&data, nominal),
            Commands::Fit {
                data,
                target,
                nominal,
                prop,
                seed,
                output,
            } => cmd_fit(&data, &target, nominal, prop, seed, output.as_deref()),
            Commands::Tune {
                data,
                target,
                config,
                model,
                folds,
                repeats,
                levels,
                seed,
                jobs,
                timeout,
                top,
                output,
            } => {
                let mut run = match config {
                    Some(path) => RunConfig::load(path)?,
                    None => RunConfig::bike_sharing()?,
                };
                if let Some(target) = target {
                    run = run.with_outcome(&target);
                }
                if let Some(model) = model {
                    run.model = default_spec(&model)?;
                    run.grid.parameters.clear();
                }
                if let Some(folds) = folds {
                    run.cv.folds = folds;
                }
                if let Some(repeats) = repeats {
                    run.cv.repeats = repeats;
                }
                if let Some(levels) = levels {
                    run.grid.levels = levels;
                }
                if let Some(seed) = seed {
                    run.split.seed = seed;
                    run.cv.seed = seed;
                    run.grid.seed = seed;
                }
                if let Some(jobs) = jobs {
                    run.tune = run.tune.with_n_jobs(jobs);
                }
                if let Some(timeout) = timeout {
                    run.tune = run.tune.with_fit_timeout(timeout);
                }
                cmd_tune(&run, data.as_deref(), top, output.as_deref())
            }
            Commands::Predict {
                model,
                data,
                output,
            } => cmd_predict(&model, &data, output.as_deref()),
        }
    }
}

/// Model spec with the usual tuning slots for `family`
fn default_spec(family: &str) -> anyhow::Result<ModelSpec> {
    let spec = match family {
        "boost_tree" => ModelSpec::boost_tree()
            .set_param("trees", 100)?
            .tune("tree_depth")?
            .tune("learn_rate")?,
        "linear_reg" => ModelSpec::linear_reg().tune("penalty")?,
        _ => anyhow::bail!("Invalid model family: {}", family),
    };
    Ok(spec)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_info(data_path: &Path, nominal: Vec<String>) -> anyhow::Result<()> {
    section("Data Info");

    let table = DataLoader::new()
        .with_nominal_columns(nominal)
        .load_table(data_path)?;

    println!("  {:<12} {}", muted("File"), data_path.display());
    println!("  {:<12} {}", muted("Rows"), table.n_rows());
    println!("  {:<12} {}", muted("Columns"), table.n_cols());
    println!();

    println!(
        "  {:<16} {:<8} {:>10} {:>10} {:>10} {:>10}",
        muted("Column"),
        muted("Kind"),
        muted("Mean"),
        muted("Std"),
        muted("Min"),
        muted("Max")
    );
    println!("  {}", dim(&"─".repeat(70)));

    let fmt = |v: Option<f64>| v.map(|x| format!("{:.3}", x)).unwrap_or_else(|| "-".to_string());
    for s in table.summary() {
        match s.kind {
            ColumnKind::Numeric => println!(
                "  {:<16} {:<8} {:>10} {:>10} {:>10} {:>10}",
                s.name,
                "numeric".truecolor(140, 140, 140),
                fmt(s.mean),
                fmt(s.std),
                fmt(s.min),
                fmt(s.max)
            ),
            ColumnKind::Nominal => {
                let levels = s.levels.unwrap_or_default();
                println!(
                    "  {:<16} {:<8} {}",
                    s.name,
                    "nominal".truecolor(140, 140, 140),
                    dim(&format!("{} levels: {}", levels.len(), levels.join(", ")))
                );
            }
        }
    }

    println!();
    Ok(())
}

pub fn cmd_fit(
    data_path: &Path,
    target: &str,
    nominal: Option<Vec<String>>,
    prop: f64,
    seed: u64,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Fit");

    let mut run = RunConfig::bike_sharing()?.with_outcome(target);
    if let Some(nominal) = nominal {
        run.data.nominal_columns = nominal;
    }
    run.split = SplitConfig::new(prop).with_strata(target).with_seed(seed);
    run.model = ModelSpec::linear_reg();

    step_run("Loading data");
    let start = Instant::now();
    let table = run.load_table(Some(data_path))?;
    step_done(&format!(
        "{} rows × {} cols in {:?}",
        table.n_rows(),
        table.n_cols(),
        start.elapsed()
    ));

    let split = initial_split(&table, &run.split)?;

    step_run(&format!("Fitting {}", "linear_reg".cyan()));
    let start = Instant::now();
    let fit = last_fit(&run.workflow(), &table, &split, &run.tune.metrics)?;
    step_done(&format!(
        "{} train / {} test in {:?}",
        split.train_indices().len(),
        split.test_indices().len(),
        start.elapsed()
    ));

    println!();
    print_metrics(&fit.metrics);
    save_artifact(&run, fit, output)?;
    println!();
    Ok(())
}

pub fn cmd_tune(
    run: &RunConfig,
    data_path: Option<&Path>,
    top: usize,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Tune");

    step_run("Loading data");
    let start = Instant::now();
    let table = run.load_table(data_path)?;
    step_done(&format!(
        "{} rows × {} cols in {:?}",
        table.n_rows(),
        table.n_cols(),
        start.elapsed()
    ));

    let split = initial_split(&table, &run.split)?;
    let train = split.training(&table)?;
    let resamples = run.cross_validator(&train)?.split(train.n_rows())?;
    let grid = run.build_grid()?;
    let workflow = run.workflow();

    println!("  {:<16} {}", muted("Model"), run.model.to_string().white());
    println!(
        "  {:<16} {} train / {} test",
        muted("Split"),
        split.train_indices().len(),
        split.test_indices().len()
    );
    println!(
        "  {:<16} {} folds × {} repeats",
        muted("Resamples"),
        resamples.v(),
        resamples.repeats()
    );
    println!("  {:<16} {} candidates", muted("Grid"), grid.len());
    println!();

    step_run(&format!("Tuning {} fits", grid.len() * resamples.len()));
    let results = tune_grid(&workflow, &train, &resamples, &grid, &run.tune)?;
    step_done(&format!(
        "{} failures in {:.2}s",
        results.failures().len(),
        results.elapsed_secs()
    ));

    print_ranking(&results.show_best(run.select_metric, top)?);

    let best = results.select_best(run.select_metric)?;
    println!("  {} {}", ok("best"), best.to_string().white().bold());

    step_run("Final fit on training rows");
    let start = Instant::now();
    let fit = last_fit(&workflow.finalize(&best)?, &table, &split, &run.tune.metrics)?;
    step_done(&format!("{:?}", start.elapsed()));

    section("Test metrics");
    print_metrics(&fit.metrics);
    save_artifact(run, fit, output)?;
    println!();
    Ok(())
}

fn print_ranking(rows: &[MetricSummary]) {
    let Some(first) = rows.first() else {
        return;
    };
    section(&format!("Ranked by {}", first.metric));
    println!(
        "  {:<10} {:<34} {:>10} {:>10} {:>4}",
        muted("Candidate"),
        muted("Parameters"),
        muted("Mean"),
        muted("Std err"),
        muted("n")
    );
    println!("  {}", dim(&"─".repeat(72)));

    for row in rows {
        let params: Vec<String> = row.params.iter().map(|(n, v)| format!("{}={}", n, v)).collect();
        println!(
            "  {:<10} {:<34} {:>10.4} {:>10} {:>4}",
            row.label,
            params.join(", "),
            row.mean,
            row.std_err
                .map(|s| format!("{:.4}", s))
                .unwrap_or_else(|| "-".to_string()),
            row.n
        );
    }
    println!();
}

fn save_artifact(run: &RunConfig, fit: LastFit, output: Option<&Path>) -> anyhow::Result<()> {
    let Some(path) = output else {
        return Ok(());
    };
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model")
        .to_string();
    let artifact = ModelArtifact::new(name, fit.fitted)
        .with_metrics(fit.metrics)
        .with_nominal_columns(run.data.nominal_columns.clone());
    ModelSerializer::for_path(path).save(&artifact, path)?;
    println!("  {} saved → {}", ok("✓"), path.display());
    Ok(())
}

pub fn cmd_predict(model_path: &Path, data_path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    section("Predict");

    let artifact = ModelSerializer::for_path(model_path).load(model_path)?;
    let table = DataLoader::new()
        .with_nominal_columns(artifact.metadata.nominal_columns.clone())
        .load_table(data_path)?;

    step_run(&format!("Predicting {} rows", table.n_rows()));
    let start = Instant::now();
    let predictions = artifact.workflow.predict(&table)?;
    step_done(&format!("{:?}", start.elapsed()));

    if table.has_column(&artifact.metadata.outcome) {
        let truth = table.vector(&artifact.metadata.outcome)?;
        let scored: Vec<(Metric, f64)> = MetricSet::default()
            .compute(&truth, &predictions)
            .into_iter()
            .filter_map(|(m, v)| v.ok().map(|v| (m, v)))
            .collect();
        println!();
        print_metrics(&scored);
    }

    match output {
        Some(path) => {
            DataSaver::save_columns_csv(vec![("prediction", predictions.to_vec())], path)?;
            println!("  {} saved → {}", ok("✓"), path.display());
        }
        None => {
            println!();
            for (i, p) in predictions.iter().enumerate() {
                println!("  {:>6} {:.2}", dim(&i.to_string()), p);
            }
        }
    }

    println!();
    Ok(())
}
