//! Forecast Ensemble: runs every configured model strategy against a tag's
//! canonical series, backtests each on a held-out tail, and serves the best
//! performer. Individual strategy failures are absorbed; the run only fails
//! when history is too short or nothing survives.
use crate::core::config::ForecastConfig;
use crate::core::error::CoreError;
use crate::core::merge::SeriesMerger;
use crate::core::models::ForecastModel;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Growing,
    Declining,
    Flat,
}

/// Backtest error of one strategy over the held-out tail. Missing tail
/// periods are excluded from every metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestScore {
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedPoint {
    pub period: NaiveDate,
    pub value: f64,
    /// 95% interval bounds derived from backtest residual spread.
    pub lower: f64,
    pub upper: f64,
}

/// Outcome of one strategy within a run, kept for auditability whether it
/// succeeded, failed to fit, or failed to backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAttempt {
    pub model: String,
    pub backtest: Option<BacktestScore>,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRun {
    pub tag: String,
    pub model_used: String,
    pub generated_at: DateTime<Utc>,
    pub horizon: usize,
    pub data_version: u64,
    pub trend: TrendDirection,
    pub points: Vec<PredictedPoint>,
    pub backtest: BacktestScore,
    pub attempts: Vec<ModelAttempt>,
}

pub struct ForecastEngine {
    merger: Arc<SeriesMerger>,
    models: Vec<Arc<dyn ForecastModel>>,
    policy: ForecastConfig,
    history: Mutex<HashMap<String, Vec<ForecastRun>>>,
    invocations: AtomicUsize,
}

impl ForecastEngine {
    pub fn new(
        merger: Arc<SeriesMerger>,
        models: Vec<Arc<dyn ForecastModel>>,
        policy: ForecastConfig,
    ) -> Self {
        Self {
            merger,
            models,
            policy,
            history: Mutex::new(HashMap::new()),
            invocations: AtomicUsize::new(0),
        }
    }

    /// Number of forecast computations started since construction. The
    /// cache layer relies on this staying flat for served-from-cache reads.
    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// All retained runs for a tag, oldest first.
    pub async fn run_history(&self, tag: &str) -> Vec<ForecastRun> {
        let history = self.history.lock().await;
        history.get(tag).cloned().unwrap_or_default()
    }

    /// Produces a forecast run for `tag` over `horizon` future periods.
    pub async fn forecast(&self, tag: &str, horizon: usize) -> Result<ForecastRun, CoreError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        let series = self
            .merger
            .series(tag)
            .await
            .ok_or_else(|| CoreError::UnknownTag(tag.to_string()))?;
        let data_version = self.merger.version(tag).await.unwrap_or(0);

        let values: Vec<Option<f64>> = series.iter().map(|point| point.value).collect();
        let observed_len = values.iter().flatten().count();
        if observed_len < self.policy.min_history {
            debug!(
                "Forecast for '{}' refused: {} observed points, {} required",
                tag, observed_len, self.policy.min_history
            );
            return Err(CoreError::InsufficientHistory {
                tag: tag.to_string(),
                required: self.policy.min_history,
                available: observed_len,
            });
        }

        // Short-but-sufficient histories still get a (smaller) holdout.
        let holdout = self.policy.holdout.min(observed_len / 3).max(1);
        let split = values.len() - holdout;
        let train = values[..split].to_vec();
        let tail = &values[split..];
        debug!(
            "Training {} strategies for '{}' on {} periods, {} held out",
            self.models.len(),
            tag,
            split,
            holdout
        );

        let fits = join_all(self.models.iter().map(|model| {
            let model = Arc::clone(model);
            let train = train.clone();
            async move {
                match tokio::task::spawn_blocking(move || model.fit(&train)).await {
                    Ok(Ok(fitted)) => Ok(fitted),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(e) => Err(format!("training task failed: {e}")),
                }
            }
        }))
        .await;

        let mut attempts: Vec<ModelAttempt> = Vec::new();
        let mut candidates: Vec<(Arc<dyn ForecastModel>, BacktestScore)> = Vec::new();
        for (model, fit_result) in self.models.iter().zip(fits) {
            let name = model.name().to_string();
            match fit_result {
                Ok(fitted) => {
                    let predictions = clamp_non_negative(fitted.predict(holdout));
                    match backtest(&predictions, tail) {
                        Some(score) => {
                            debug!(
                                "Backtested {} for '{}': mae={:.3} rmse={:.3}",
                                name, tag, score.mae, score.rmse
                            );
                            attempts.push(ModelAttempt {
                                model: name,
                                backtest: Some(score.clone()),
                                failure: None,
                            });
                            candidates.push((Arc::clone(model), score));
                        }
                        None => {
                            warn!("Excluding {} for '{}': holdout has no observed values", name, tag);
                            attempts.push(ModelAttempt {
                                model: name,
                                backtest: None,
                                failure: Some("holdout window has no observed values".to_string()),
                            });
                        }
                    }
                }
                Err(reason) => {
                    warn!("Excluding {} for '{}': {}", name, tag, reason);
                    attempts.push(ModelAttempt {
                        model: name,
                        backtest: None,
                        failure: Some(reason),
                    });
                }
            }
        }

        // Lowest RMSE wins; near-ties go to the strategy needing the least
        // history. The winner refits on the full series before serving.
        let selected = loop {
            if candidates.is_empty() {
                break None;
            }
            let index = select_best(&candidates, self.policy.rmse_epsilon);
            let (model, score) = candidates.remove(index);
            match model.fit(&values) {
                Ok(fitted) => break Some((model, score, fitted)),
                Err(e) => {
                    warn!("Refit of {} on full history failed: {}", model.name(), e);
                    attempts.push(ModelAttempt {
                        model: model.name().to_string(),
                        backtest: None,
                        failure: Some(format!("refit on full history failed: {e}")),
                    });
                }
            }
        };

        let Some((model, score, fitted)) = selected else {
            let failures = attempts
                .iter()
                .filter_map(|a| a.failure.as_ref().map(|f| (a.model.clone(), f.clone())))
                .collect();
            return Err(CoreError::AllModelsFailed {
                tag: tag.to_string(),
                failures,
            });
        };

        let predicted = clamp_non_negative(fitted.predict(horizon));
        let granularity = self.merger.granularity();
        let last_period = series
            .last()
            .map(|point| point.period)
            .unwrap_or_else(|| Utc::now().date_naive());
        let points = predicted
            .iter()
            .enumerate()
            .map(|(step, value)| PredictedPoint {
                period: granularity.step(last_period, (step + 1) as i64),
                value: *value,
                lower: (value - 1.96 * score.rmse).max(0.0),
                upper: value + 1.96 * score.rmse,
            })
            .collect();

        let run = ForecastRun {
            tag: tag.to_string(),
            model_used: model.name().to_string(),
            generated_at: Utc::now(),
            horizon,
            data_version,
            trend: trend_direction(&predicted),
            points,
            backtest: score,
            attempts,
        };
        debug!(
            "Forecast for '{}' done: {} over {} periods at version {}",
            tag, run.model_used, horizon, data_version
        );

        let mut history = self.history.lock().await;
        history
            .entry(tag.to_string())
            .or_default()
            .push(run.clone());
        Ok(run)
    }
}

fn clamp_non_negative(predictions: Vec<f64>) -> Vec<f64> {
    predictions.into_iter().map(|value| value.max(0.0)).collect()
}

fn backtest(predictions: &[f64], actual_tail: &[Option<f64>]) -> Option<BacktestScore> {
    let pairs: Vec<(f64, f64)> = predictions
        .iter()
        .zip(actual_tail)
        .filter_map(|(prediction, actual)| actual.map(|a| (*prediction, a)))
        .collect();
    if pairs.is_empty() {
        return None;
    }

    let n = pairs.len() as f64;
    let mae = pairs.iter().map(|(p, a)| (p - a).abs()).sum::<f64>() / n;
    let rmse = (pairs.iter().map(|(p, a)| (p - a).powi(2)).sum::<f64>() / n).sqrt();

    let nonzero: Vec<&(f64, f64)> = pairs.iter().filter(|(_, a)| *a != 0.0).collect();
    let mape = if nonzero.is_empty() {
        0.0
    } else {
        nonzero
            .iter()
            .map(|(p, a)| ((a - p) / a).abs())
            .sum::<f64>()
            / nonzero.len() as f64
            * 100.0
    };

    Some(BacktestScore { mae, rmse, mape })
}

fn select_best(candidates: &[(Arc<dyn ForecastModel>, BacktestScore)], epsilon: f64) -> usize {
    let best_rmse = candidates
        .iter()
        .map(|(_, score)| score.rmse)
        .fold(f64::INFINITY, f64::min);

    let mut chosen = 0;
    let mut chosen_need = usize::MAX;
    for (index, (model, score)) in candidates.iter().enumerate() {
        if score.rmse <= best_rmse + epsilon && model.min_history() < chosen_need {
            chosen = index;
            chosen_need = model.min_history();
        }
    }
    chosen
}

fn trend_direction(predictions: &[f64]) -> TrendDirection {
    let (Some(first), Some(last)) = (predictions.first(), predictions.last()) else {
        return TrendDirection::Flat;
    };
    let delta = last - first;
    if delta.abs() < 1e-9 {
        TrendDirection::Flat
    } else if delta > 0.0 {
        TrendDirection::Growing
    } else {
        TrendDirection::Declining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SourcesConfig;
    use crate::core::models::{FittedModel, ModelFitError, default_models};
    use crate::core::series::{Granularity, Observation, SourceId};
    use crate::store::KeyValueStore;
    use chrono::NaiveDate;

    fn policy() -> ForecastConfig {
        ForecastConfig {
            min_history: 5,
            holdout: 2,
            season_length: 2,
            rmse_epsilon: 0.5,
            timeout_secs: 30,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    async fn merger_with_series(counts: &[f64]) -> Arc<SeriesMerger> {
        let store = KeyValueStore::in_memory();
        let merger =
            Arc::new(SeriesMerger::open(&store, Granularity::Day, SourcesConfig::default()).await);
        let observations: Vec<Observation> = counts
            .iter()
            .enumerate()
            .map(|(i, count)| Observation {
                tag: "python".to_string(),
                source: SourceId::StackOverflow,
                date: day(1 + i as u32),
                count: *count,
            })
            .collect();
        merger.merge("python", &observations).await;
        merger
    }

    #[tokio::test]
    async fn test_insufficient_history_is_a_typed_failure() {
        let merger = merger_with_series(&[1.0, 2.0, 3.0]).await;
        let engine = ForecastEngine::new(merger, default_models(2), policy());

        let err = engine.forecast("python", 8).await.err().expect("must fail");
        match err {
            CoreError::InsufficientHistory {
                required,
                available,
                ..
            } => {
                assert_eq!(required, 5);
                assert_eq!(available, 3);
            }
            other => panic!("expected InsufficientHistory, got {other}"),
        }
        // The refusal still counts as an invocation.
        assert_eq!(engine.invocation_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tag() {
        let merger = merger_with_series(&[1.0; 10]).await;
        let engine = ForecastEngine::new(merger, default_models(2), policy());
        assert!(matches!(
            engine.forecast("cobol", 4).await.err(),
            Some(CoreError::UnknownTag(_))
        ));
    }

    #[tokio::test]
    async fn test_predictions_are_never_negative() {
        // Steeply declining series; an unclamped trend would go below zero.
        let merger = merger_with_series(&[50.0, 40.0, 30.0, 20.0, 10.0, 5.0, 2.0, 1.0]).await;
        let engine = ForecastEngine::new(merger, default_models(2), policy());

        let run = engine.forecast("python", 12).await.unwrap();
        assert_eq!(run.points.len(), 12);
        for point in &run.points {
            assert!(point.value >= 0.0);
            assert!(point.lower >= 0.0);
            assert!(point.upper >= point.value);
        }
    }

    #[tokio::test]
    async fn test_run_records_every_attempt() {
        let merger =
            merger_with_series(&[10.0, 12.0, 11.0, 13.0, 12.0, 14.0, 13.0, 15.0]).await;
        let engine = ForecastEngine::new(merger, default_models(2), policy());

        let run = engine.forecast("python", 4).await.unwrap();
        assert_eq!(run.attempts.len(), 3);
        assert!(run.attempts.iter().any(|a| a.model == run.model_used));
        assert_eq!(run.data_version, 1);

        let history = engine.run_history("python").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].model_used, run.model_used);
    }

    #[tokio::test]
    async fn test_forecast_periods_continue_the_series() {
        let merger = merger_with_series(&[5.0, 6.0, 7.0, 8.0, 9.0, 10.0]).await;
        let engine = ForecastEngine::new(merger, default_models(2), policy());

        let run = engine.forecast("python", 3).await.unwrap();
        assert_eq!(run.points[0].period, day(7));
        assert_eq!(run.points[1].period, day(8));
        assert_eq!(run.points[2].period, day(9));
        assert_eq!(run.trend, TrendDirection::Growing);
    }

    // Fixed-output stub for exercising selection order deterministically.
    struct ConstModel {
        name: &'static str,
        min_history: usize,
        value: f64,
    }

    struct FittedConst {
        value: f64,
    }

    impl ForecastModel for ConstModel {
        fn name(&self) -> &'static str {
            self.name
        }
        fn min_history(&self) -> usize {
            self.min_history
        }
        fn fit(&self, _series: &[Option<f64>]) -> Result<Box<dyn FittedModel>, ModelFitError> {
            Ok(Box::new(FittedConst { value: self.value }))
        }
    }

    impl FittedModel for FittedConst {
        fn predict(&self, horizon: usize) -> Vec<f64> {
            vec![self.value; horizon]
        }
    }

    struct FailingModel;

    impl ForecastModel for FailingModel {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn min_history(&self) -> usize {
            1
        }
        fn fit(&self, _series: &[Option<f64>]) -> Result<Box<dyn FittedModel>, ModelFitError> {
            Err(ModelFitError::InsufficientVariance)
        }
    }

    #[tokio::test]
    async fn test_tie_break_prefers_simpler_model() {
        let merger = merger_with_series(&[10.0; 8]).await;
        // Both stubs predict the truth exactly (RMSE 0 each); the one
        // needing less history must win.
        let models: Vec<Arc<dyn ForecastModel>> = vec![
            Arc::new(ConstModel {
                name: "complex",
                min_history: 9,
                value: 10.0,
            }),
            Arc::new(ConstModel {
                name: "simple",
                min_history: 2,
                value: 10.0,
            }),
        ];
        let engine = ForecastEngine::new(merger, models, policy());

        let run = engine.forecast("python", 2).await.unwrap();
        assert_eq!(run.model_used, "simple");
    }

    #[tokio::test]
    async fn test_single_model_failure_is_recovered() {
        let merger = merger_with_series(&[10.0; 8]).await;
        let models: Vec<Arc<dyn ForecastModel>> = vec![
            Arc::new(FailingModel),
            Arc::new(ConstModel {
                name: "stub",
                min_history: 2,
                value: 10.0,
            }),
        ];
        let engine = ForecastEngine::new(merger, models, policy());

        let run = engine.forecast("python", 2).await.unwrap();
        assert_eq!(run.model_used, "stub");
        let failed = run.attempts.iter().find(|a| a.model == "failing").unwrap();
        assert!(failed.failure.is_some());
    }

    #[tokio::test]
    async fn test_all_models_failing_surfaces_reasons() {
        let merger = merger_with_series(&[10.0; 8]).await;
        let models: Vec<Arc<dyn ForecastModel>> = vec![Arc::new(FailingModel)];
        let engine = ForecastEngine::new(merger, models, policy());

        let err = engine.forecast("python", 2).await.err().expect("must fail");
        match err {
            CoreError::AllModelsFailed { failures, .. } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].0, "failing");
            }
            other => panic!("expected AllModelsFailed, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_tail_periods_excluded_from_error() {
        // Canonical series with a missing marker inside the holdout tail.
        let store = KeyValueStore::in_memory();
        let merger =
            Arc::new(SeriesMerger::open(&store, Granularity::Day, SourcesConfig::default()).await);
        let mut observations = Vec::new();
        for (i, count) in [10.0, 10.0, 10.0, 10.0, 10.0, 10.0].iter().enumerate() {
            observations.push(Observation {
                tag: "python".to_string(),
                source: SourceId::StackOverflow,
                date: day(1 + i as u32),
                count: *count,
            });
        }
        // Day 7 missing, day 8 observed: the tail is [None, Some(10.0)].
        observations.push(Observation {
            tag: "python".to_string(),
            source: SourceId::StackOverflow,
            date: day(8),
            count: 10.0,
        });
        merger.merge("python", &observations).await;

        let engine = ForecastEngine::new(
            merger,
            vec![Arc::new(ConstModel {
                name: "stub",
                min_history: 2,
                value: 10.0,
            }) as Arc<dyn ForecastModel>],
            policy(),
        );

        let run = engine.forecast("python", 2).await.unwrap();
        // The one observed tail point matches exactly; the missing period
        // must not have been imputed to zero (which would give rmse > 0).
        assert_eq!(run.backtest.rmse, 0.0);
        assert_eq!(run.backtest.mae, 0.0);
    }
}
