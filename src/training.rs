//! Offline training: split, fit, evaluate.

use anyhow::{Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::info;

use crate::dataset::Listing;
use crate::normalize::normalize;
use crate::pipeline::{ForestParams, Pipeline, Regressor};
use crate::schema::FeatureRow;

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub params: ForestParams,
    /// Fraction of listings held out for evaluation, in `[0, 1)`.
    pub test_size: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            params: ForestParams::default(),
            test_size: 0.2,
        }
    }
}

/// Hold-out quality on the log-price scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub n_test: usize,
    pub r2: f64,
    pub rmse: f64,
}

/// Shuffles `items` with `seed` and splits off `ceil(len * test_size)` for testing.
pub fn train_test_split<T>(mut items: Vec<T>, test_size: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    let n_test = ((items.len() as f64) * test_size).ceil() as usize;
    let n_test = n_test.min(items.len());
    let test = items.split_off(items.len() - n_test);
    (items, test)
}

/// Converts listings to pipeline rows and log-price targets.
pub fn to_training_set(listings: &[Listing]) -> (Vec<FeatureRow>, Vec<f64>) {
    listings
        .iter()
        .map(|l| (normalize(&l.features).row, l.selling_price.ln()))
        .unzip()
}

pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    let mse = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64;
    mse.sqrt()
}

/// Scores `pipeline` on held-out listings.
pub fn evaluate(pipeline: &Pipeline, test: &[Listing]) -> Result<Evaluation> {
    let (rows, actual) = to_training_set(test);
    let predicted = rows
        .iter()
        .map(|r| pipeline.predict(r))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Evaluation {
        n_test: test.len(),
        r2: r2_score(&actual, &predicted),
        rmse: rmse(&actual, &predicted),
    })
}

/// Splits, fits and evaluates. The evaluation is stored in the artifact metadata.
pub fn train(listings: Vec<Listing>, config: &TrainConfig) -> Result<(Pipeline, Option<Evaluation>)> {
    if !(0.0..1.0).contains(&config.test_size) {
        bail!("test size must be in [0, 1), got {}", config.test_size);
    }

    let (train_set, test_set) = train_test_split(listings, config.test_size, config.params.seed);
    if train_set.is_empty() {
        bail!("no listings left to train on");
    }
    info!(
        train = train_set.len(),
        test = test_set.len(),
        trees = config.params.n_trees,
        "Fitting pipeline"
    );

    let (rows, targets) = to_training_set(&train_set);
    let mut pipeline = Pipeline::fit(&rows, &targets, &config.params)?;

    let evaluation = if test_set.is_empty() {
        None
    } else {
        let eval = evaluate(&pipeline, &test_set)?;
        info!(r2 = eval.r2, rmse = eval.rmse, n_test = eval.n_test, "Hold-out evaluation");
        pipeline.metadata.n_test = Some(eval.n_test);
        pipeline.metadata.r2 = Some(eval.r2).filter(|v| v.is_finite());
        pipeline.metadata.rmse = Some(eval.rmse).filter(|v| v.is_finite());
        Some(eval)
    };

    Ok((pipeline, evaluation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::PredictionRequest;
    use crate::schema::Fuel;

    fn listings(n: usize) -> Vec<Listing> {
        (0..n)
            .map(|i| Listing {
                features: PredictionRequest {
                    year: Some(2000 + (i % 20) as i32),
                    km_driven: Some(1000.0 * i as f64),
                    fuel: Some(if i % 2 == 0 { Fuel::Petrol } else { Fuel::Diesel }),
                    brand: Some("Maruti".into()),
                    ..Default::default()
                },
                selling_price: 50_000.0 + 10_000.0 * (i % 20) as f64,
            })
            .collect()
    }

    #[test]
    fn test_split_sizes_and_determinism() {
        let items: Vec<usize> = (0..10).collect();
        let (train_a, test_a) = train_test_split(items.clone(), 0.2, 42);
        let (train_b, test_b) = train_test_split(items, 0.2, 42);

        assert_eq!(train_a.len(), 8);
        assert_eq!(test_a.len(), 2);
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
    }

    #[test]
    fn test_split_rounds_test_size_up() {
        let (train, test) = train_test_split((0..11).collect::<Vec<_>>(), 0.2, 1);
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 8);
    }

    #[test]
    fn test_metrics() {
        let actual = [1.0, 2.0, 3.0];
        assert_eq!(r2_score(&actual, &actual), 1.0);
        assert_eq!(rmse(&actual, &actual), 0.0);
        assert_eq!(r2_score(&actual, &[2.0, 2.0, 2.0]), 0.0);
        assert!((rmse(&actual, &[2.0, 2.0, 2.0]) - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_train_records_evaluation() {
        let config = TrainConfig {
            params: ForestParams {
                n_trees: 10,
                ..Default::default()
            },
            test_size: 0.25,
        };
        let (pipeline, eval) = train(listings(80), &config).unwrap();
        let eval = eval.unwrap();

        assert_eq!(eval.n_test, 20);
        assert_eq!(pipeline.metadata.n_train, 60);
        assert_eq!(pipeline.metadata.n_test, Some(20));
        assert!(eval.r2 > 0.5);
    }

    #[test]
    fn test_train_without_holdout() {
        let config = TrainConfig {
            params: ForestParams {
                n_trees: 2,
                ..Default::default()
            },
            test_size: 0.0,
        };
        let (pipeline, eval) = train(listings(10), &config).unwrap();
        assert!(eval.is_none());
        assert_eq!(pipeline.metadata.r2, None);
    }

    #[test]
    fn test_train_rejects_bad_test_size() {
        let config = TrainConfig {
            test_size: 1.0,
            ..Default::default()
        };
        assert!(train(listings(10), &config).is_err());
    }
}
