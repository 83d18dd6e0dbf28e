//! Shared fixtures: a deterministic daily bike-rental table

#![allow(dead_code)]

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::f64::consts::PI;
use velotune::data::{Column, Table};
use velotune::preprocessing::{Recipe, Selector, Step};
use velotune::training::{ModelSpec, Workflow};

pub const N_DAYS: usize = 731;

pub const NOMINAL: [&str; 7] = [
    "season",
    "yr",
    "mnth",
    "holiday",
    "weekday",
    "workingday",
    "weathersit",
];

/// Two years of daily observations, every column numeric (codes included)
pub fn bike_columns() -> Vec<(&'static str, Vec<f64>)> {
    let mut rng = ChaCha8Rng::seed_from_u64(2011);
    let mut cols: Vec<(&'static str, Vec<f64>)> = [
        "instant", "season", "yr", "mnth", "holiday", "weekday", "workingday", "weathersit",
        "temp", "atemp", "hum", "windspeed", "cnt",
    ]
    .iter()
    .map(|name| (*name, Vec::with_capacity(N_DAYS)))
    .collect();

    for i in 0..N_DAYS {
        let day = (i % 365) as f64;
        let yr = if i < 365 { 0.0 } else { 1.0 };
        let mnth = ((day / 30.5).floor() + 1.0).min(12.0);
        let season = ((day / 92.0).floor() + 1.0).min(4.0);
        let weekday = ((i + 6) % 7) as f64;
        let holiday = if i % 35 == 7 { 1.0 } else { 0.0 };
        let workingday = if (1.0..=5.0).contains(&weekday) && holiday == 0.0 {
            1.0
        } else {
            0.0
        };
        let weathersit = match rng.gen_range(0..10) {
            0..=6 => 1.0,
            7 | 8 => 2.0,
            _ => 3.0,
        };

        let temp = (0.5 - 0.3 * (2.0 * PI * day / 365.0).cos() + rng.gen_range(-0.05..0.05))
            .clamp(0.05, 0.95);
        let atemp = 0.9 * temp + rng.gen_range(-0.03..0.03);
        let hum = 0.6 + rng.gen_range(-0.2..0.2) + 0.05 * (weathersit - 1.0);
        let windspeed = 0.19 + rng.gen_range(-0.1..0.1);

        let cnt = (1500.0 + 2000.0 * yr + 5000.0 * temp - 1500.0 * hum - 2000.0 * windspeed
            - 600.0 * (weathersit - 1.0)
            - 300.0 * holiday
            + 150.0 * workingday
            + rng.gen_range(-300.0..300.0))
        .max(20.0)
        .round();

        let row = [
            (i + 1) as f64,
            season,
            yr,
            mnth,
            holiday,
            weekday,
            workingday,
            weathersit,
            temp,
            atemp,
            hum,
            windspeed,
            cnt,
        ];
        for (col, value) in cols.iter_mut().zip(row) {
            col.1.push(value);
        }
    }
    cols
}

/// The bike table with categorical codes as nominal columns and the id dropped
pub fn bike_table() -> Table {
    let columns = bike_columns()
        .into_iter()
        .filter(|(name, _)| *name != "instant")
        .map(|(name, values)| {
            if NOMINAL.contains(&name) {
                Column::nominal(name, values.iter().map(|v| format!("{}", v)).collect::<Vec<_>>())
            } else {
                Column::numeric(name, values)
            }
        })
        .collect();
    Table::new(columns).unwrap()
}

pub fn bike_recipe() -> Recipe {
    Recipe::new("cnt")
        .with_step(Step::dummy(Selector::AllNominalPredictors))
        .with_step(Step::nzv(Selector::AllNumericPredictors))
        .with_step(Step::normalize(Selector::AllNumericPredictors))
}

/// Small boosted model with tree depth and learning rate left for tuning
pub fn tunable_boost_workflow(trees: i64) -> Workflow {
    let spec = ModelSpec::boost_tree()
        .set_param("trees", trees)
        .unwrap()
        .tune("tree_depth")
        .unwrap()
        .tune("learn_rate")
        .unwrap();
    Workflow::new(bike_recipe(), spec)
}
