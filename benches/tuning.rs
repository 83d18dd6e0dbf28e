use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use velotune::data::{Column, Table};
use velotune::optimizer::{tune_grid, GridBuilder, Parameter, TuneConfig};
use velotune::preprocessing::{Recipe, Selector, Step};
use velotune::training::{CrossValidator, ModelSpec, Workflow};

fn create_regression_table(n_rows: usize, n_features: usize) -> Table {
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    let features: Vec<Vec<f64>> = (0..n_features)
        .map(|_| (0..n_rows).map(|_| rng.gen::<f64>() * 10.0).collect())
        .collect();

    // Target as sum of features + noise
    let target: Vec<f64> = (0..n_rows)
        .map(|i| features.iter().map(|f| f[i]).sum::<f64>() + rng.gen::<f64>() * 0.1)
        .collect();

    let mut columns: Vec<Column> = features
        .into_iter()
        .enumerate()
        .map(|(i, values)| Column::numeric(format!("feature_{}", i), values))
        .collect();
    columns.push(Column::numeric("target", target));

    Table::new(columns).unwrap()
}

fn workflow() -> Workflow {
    let spec = ModelSpec::boost_tree()
        .set_param("trees", 20)
        .unwrap()
        .tune("tree_depth")
        .unwrap()
        .tune("learn_rate")
        .unwrap();
    Workflow::new(
        Recipe::new("target").with_step(Step::normalize(Selector::AllNumericPredictors)),
        spec,
    )
}

fn bench_tuning(c: &mut Criterion) {
    let mut group = c.benchmark_group("tune_grid");
    group.sample_size(10);

    let table = create_regression_table(500, 10);
    let resamples = CrossValidator::new(5).split(table.n_rows()).unwrap();
    let grid = GridBuilder::new()
        .add(Parameter::range("tree_depth", 2.0, 6.0))
        .add(Parameter::values("learn_rate", vec![0.05.into(), 0.3.into()]))
        .regular(3)
        .unwrap();
    let wf = workflow();

    for jobs in [1usize, 4] {
        group.bench_with_input(BenchmarkId::new("jobs", jobs), &jobs, |b, &jobs| {
            let config = TuneConfig::new().with_n_jobs(jobs);
            b.iter(|| tune_grid(&wf, black_box(&table), &resamples, &grid, &config).unwrap())
        });
    }

    group.finish();
}

fn bench_folds(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_validation");

    for n_rows in [1000usize, 10000].iter() {
        group.bench_with_input(BenchmarkId::new("split", n_rows), n_rows, |b, &n| {
            let cv = CrossValidator::new(10).with_repeats(3);
            b.iter(|| cv.split(black_box(n)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tuning, bench_folds);
criterion_main!(benches);
