//! Integration test: split, resample, tune, select and refit on the bike table

mod common;

use common::{bike_recipe, bike_table, tunable_boost_workflow, N_DAYS};
use velotune::data::{initial_split, strata_keys, Column, Split, SplitConfig, Table};
use velotune::error::VelotuneError;
use velotune::preprocessing::{Recipe, Selector, Step};
use velotune::optimizer::{last_fit, tune_grid, FailureStage, GridBuilder, Parameter, TuneConfig};
use velotune::training::{
    CrossValidator, Metric, MetricSet, Mode, ModelSpec, Resamples, Workflow,
};

fn split_and_folds(table: &Table) -> (Split, Table, Resamples) {
    let split = initial_split(table, &SplitConfig::new(0.7).with_strata("cnt")).unwrap();
    let train = split.training(table).unwrap();
    let keys = strata_keys(&train, "cnt", 4).unwrap();
    let resamples = CrossValidator::new(5)
        .with_random_state(123)
        .with_strata(keys)
        .split(train.n_rows())
        .unwrap();
    (split, train, resamples)
}

#[test]
fn test_bike_tuning_end_to_end() {
    let table = bike_table();
    assert_eq!(table.n_rows(), N_DAYS);

    let (split, train, resamples) = split_and_folds(&table);
    assert_eq!(split.train_indices().len(), 511);
    assert_eq!(split.test_indices().len(), 220);
    assert_eq!(resamples.len(), 5);
    for fold in resamples.folds() {
        assert!((102..=103).contains(&fold.assessment.len()));
    }

    let grid = GridBuilder::new()
        .param("tree_depth")
        .unwrap()
        .param("learn_rate")
        .unwrap()
        .regular(5)
        .unwrap();
    assert_eq!(grid.len(), 25);

    let workflow = tunable_boost_workflow(10);
    let config = TuneConfig::new().with_metrics(vec![Metric::Rmse, Metric::Rsq]);
    let results = tune_grid(&workflow, &train, &resamples, &grid, &config).unwrap();

    assert!(results.failures().iter().all(|f| f.stage == FailureStage::Score));
    assert_eq!(results.records_for(Metric::Rmse).count(), 125);
    let rsq_failures = results
        .failures()
        .iter()
        .filter(|f| f.metric == Some(Metric::Rsq))
        .count();
    assert_eq!(results.records_for(Metric::Rsq).count() + rsq_failures, 125);

    let ranked = results.show_best(Metric::Rmse, 25).unwrap();
    assert_eq!(ranked.len(), 25);
    for pair in ranked.windows(2) {
        assert!(pair[0].mean <= pair[1].mean);
    }

    // The winner must beat every other aggregate
    let best = results.select_best(Metric::Rmse).unwrap();
    assert_eq!(best.id, ranked[0].candidate);
    let lr = best.get("learn_rate").unwrap().as_float();
    assert!(lr > 1e-3, "tiny learning rates cannot win, got {}", lr);

    let final_workflow = workflow.finalize(&best).unwrap();
    assert!(final_workflow.spec().is_resolved());

    let fit = last_fit(&final_workflow, &table, &split, &MetricSet::default()).unwrap();
    assert_eq!(fit.predictions.len(), 220);
    let test_rmse = fit.metric(Metric::Rmse).unwrap();
    assert!(test_rmse.is_finite() && test_rmse > 0.0);
}

#[test]
fn test_results_independent_of_worker_count() {
    let table = bike_table();
    let (_, train, resamples) = split_and_folds(&table);
    let grid = GridBuilder::new()
        .param("tree_depth")
        .unwrap()
        .param("learn_rate")
        .unwrap()
        .regular(2)
        .unwrap();
    let workflow = tunable_boost_workflow(5);

    let sequential = tune_grid(
        &workflow,
        &train,
        &resamples,
        &grid,
        &TuneConfig::new().with_n_jobs(1),
    )
    .unwrap();
    let parallel = tune_grid(
        &workflow,
        &train,
        &resamples,
        &grid,
        &TuneConfig::new().with_n_jobs(4),
    )
    .unwrap();
    let global = tune_grid(&workflow, &train, &resamples, &grid, &TuneConfig::new()).unwrap();

    assert_eq!(sequential.records(), parallel.records());
    assert_eq!(sequential.records(), global.records());
    assert_eq!(sequential.collect_metrics(), parallel.collect_metrics());
}

#[test]
fn test_linear_penalty_tuning() {
    let table = bike_table();
    let (_, train, resamples) = split_and_folds(&table);

    let workflow = Workflow::new(bike_recipe(), ModelSpec::linear_reg().tune("penalty").unwrap());
    let grid = GridBuilder::new().param("penalty").unwrap().regular(4).unwrap();
    let results = tune_grid(&workflow, &train, &resamples, &grid, &TuneConfig::new()).unwrap();

    assert!(results.failures().is_empty());
    assert_eq!(results.collect_metrics().len(), 4 * 2);
    let best = results.select_best(Metric::Rsq).unwrap();
    assert!(grid.candidate(best.id).is_some());
}

#[test]
fn test_configuration_errors_abort_before_fitting() {
    let table = bike_table();
    let (_, train, resamples) = split_and_folds(&table);
    let workflow = tunable_boost_workflow(5);

    // Grid missing a tunable parameter
    let partial = GridBuilder::new().param("tree_depth").unwrap().regular(3).unwrap();
    assert!(matches!(
        tune_grid(&workflow, &train, &resamples, &partial, &TuneConfig::new()),
        Err(VelotuneError::ConfigError(_))
    ));

    // Folds built for another table
    let other = CrossValidator::new(5).split(100).unwrap();
    let grid = GridBuilder::new()
        .param("tree_depth")
        .unwrap()
        .param("learn_rate")
        .unwrap()
        .regular(2)
        .unwrap();
    assert!(matches!(
        tune_grid(&workflow, &train, &other, &grid, &TuneConfig::new()),
        Err(VelotuneError::ShapeError { .. })
    ));

    // Too many folds
    assert!(matches!(
        CrossValidator::new(train.n_rows() + 1).split(train.n_rows()),
        Err(VelotuneError::InvalidFoldCount { .. })
    ));
}

#[test]
fn test_fully_failed_grid_has_no_usable_result() {
    let table = bike_table();
    let (_, train, resamples) = split_and_folds(&table);

    // Normalizing a constant column fails in every fold
    let recipe = Recipe::new("cnt")
        .with_step(Step::dummy(Selector::AllNominalPredictors))
        .with_step(Step::normalize(Selector::AllNumericPredictors));
    let n = train.n_rows();
    let train = train
        .with_column(Column::numeric("constant", vec![1.0; n]))
        .unwrap();
    let workflow = Workflow::new(recipe, ModelSpec::linear_reg().tune("penalty").unwrap());
    let grid = GridBuilder::new()
        .add(Parameter::values("penalty", vec![0.0.into(), 0.5.into()]))
        .regular(1)
        .unwrap();

    let results = tune_grid(&workflow, &train, &resamples, &grid, &TuneConfig::new()).unwrap();
    assert_eq!(results.failures().len(), 10);
    assert!(results.collect_metrics().is_empty());
    assert!(matches!(
        results.select_best(Metric::Rmse),
        Err(VelotuneError::NoUsableResult(_))
    ));
}

#[test]
fn test_timeout_is_recorded_as_fit_failure() {
    let table = bike_table();
    let (_, train, resamples) = split_and_folds(&table);
    let grid = GridBuilder::new()
        .param("tree_depth")
        .unwrap()
        .param("learn_rate")
        .unwrap()
        .regular(2)
        .unwrap();

    let config = TuneConfig::new().with_fit_timeout(0.0);
    let results = tune_grid(&tunable_boost_workflow(50), &train, &resamples, &grid, &config).unwrap();

    assert!(results.records().is_empty());
    assert_eq!(results.failures().len(), 4 * 5);
    assert!(results.failures().iter().all(|f| f.stage == FailureStage::Fit));
}

fn penalty_grid() -> velotune::optimizer::Grid {
    GridBuilder::new()
        .add(Parameter::values("penalty", vec![0.0.into(), 0.5.into()]))
        .regular(1)
        .unwrap()
}

#[test]
fn test_unknown_recipe_column_aborts_tuning() {
    let table = bike_table();
    let (_, train, resamples) = split_and_folds(&table);

    let recipe = bike_recipe().with_step(Step::remove(Selector::name("no_such_column")));
    let workflow = Workflow::new(recipe, ModelSpec::linear_reg().tune("penalty").unwrap());
    let result = tune_grid(&workflow, &train, &resamples, &penalty_grid(), &TuneConfig::new());
    assert!(matches!(result, Err(VelotuneError::UnknownColumn(ref c)) if c == "no_such_column"));
}

#[test]
fn test_columns_created_by_earlier_steps_are_selectable() {
    let table = bike_table();
    let (_, train, resamples) = split_and_folds(&table);

    // season_2 only exists after dummy encoding
    let recipe = bike_recipe().with_step(Step::remove(Selector::name("season_2")));
    let workflow = Workflow::new(recipe, ModelSpec::linear_reg().tune("penalty").unwrap());
    let results =
        tune_grid(&workflow, &train, &resamples, &penalty_grid(), &TuneConfig::new()).unwrap();
    assert!(results.failures().is_empty());
}

#[test]
fn test_unsupported_mode_aborts_tuning() {
    let table = bike_table();
    let (_, train, resamples) = split_and_folds(&table);

    // Only deserialization can bypass set_mode
    let mut json = serde_json::to_value(ModelSpec::linear_reg().tune("penalty").unwrap()).unwrap();
    json["mode"] = serde_json::to_value(Mode::Classification).unwrap();
    let spec: ModelSpec = serde_json::from_value(json).unwrap();
    assert_eq!(spec.mode(), Mode::Classification);

    let workflow = Workflow::new(bike_recipe(), spec);
    let result = tune_grid(&workflow, &train, &resamples, &penalty_grid(), &TuneConfig::new());
    assert!(matches!(result, Err(VelotuneError::UnsupportedMode { .. })));
}

fn seeded_run(table: &Table, seed: u64) -> (Vec<usize>, Vec<velotune::optimizer::MetricSummary>) {
    let split = initial_split(
        table,
        &SplitConfig::new(0.7).with_strata("cnt").with_seed(seed),
    )
    .unwrap();
    let train = split.training(table).unwrap();
    let resamples = CrossValidator::new(5)
        .with_repeats(2)
        .with_random_state(seed)
        .with_strata(strata_keys(&train, "cnt", 4).unwrap())
        .split(train.n_rows())
        .unwrap();
    let grid = GridBuilder::new()
        .param("tree_depth")
        .unwrap()
        .param("learn_rate")
        .unwrap()
        .regular(2)
        .unwrap();
    let results = tune_grid(
        &tunable_boost_workflow(5),
        &train,
        &resamples,
        &grid,
        &TuneConfig::new().with_n_jobs(4),
    )
    .unwrap();
    (split.train_indices().to_vec(), results.collect_metrics())
}

#[test]
fn test_same_seed_reproduces_whole_run() {
    let table = bike_table();

    let (rows_a, metrics_a) = seeded_run(&table, 99);
    let (rows_b, metrics_b) = seeded_run(&table, 99);
    assert_eq!(rows_a, rows_b);
    assert_eq!(metrics_a, metrics_b);
    let rmse: Vec<_> = metrics_a.iter().filter(|m| m.metric == Metric::Rmse).collect();
    assert_eq!(rmse.len(), 4);
    assert!(rmse.iter().all(|m| m.n == 10));

    let (rows_c, _) = seeded_run(&table, 100);
    assert_ne!(rows_a, rows_c);
}
