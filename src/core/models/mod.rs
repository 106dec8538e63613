//! Forecasting model strategies. Every strategy implements the same
//! `{fit, predict}` capability pair so the ensemble can drive a closed,
//! configuration-driven set of models without knowing their internals.
pub mod seasonal;
pub mod smoothing;
pub mod trend;

use std::sync::Arc;
use thiserror::Error;

/// Why a single strategy refused to fit. Recovered by the ensemble per
/// model; only surfaces to callers when every strategy fails.
#[derive(Debug, Clone, Error)]
pub enum ModelFitError {
    #[error("needs at least {required} observed points, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[error("series has no usable variance")]
    InsufficientVariance,
}

/// A forecasting strategy. `fit` sees the canonical series with missing
/// markers intact; strategies skip gaps, they never impute zero.
pub trait ForecastModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Minimum observed points the strategy needs. Doubles as the
    /// simplicity rank when backtest scores tie.
    fn min_history(&self) -> usize;

    fn fit(&self, series: &[Option<f64>]) -> Result<Box<dyn FittedModel>, ModelFitError>;
}

/// A fitted strategy ready to extrapolate beyond the end of its
/// training series.
pub trait FittedModel: Send + Sync {
    fn predict(&self, horizon: usize) -> Vec<f64>;
}

/// The default ensemble: a linear trend, Holt smoothing and a seasonal
/// average, ordered by how little history they need.
pub fn default_models(season_length: usize) -> Vec<Arc<dyn ForecastModel>> {
    vec![
        Arc::new(trend::LinearTrend),
        Arc::new(smoothing::HoltSmoothing::default()),
        Arc::new(seasonal::SeasonalAverage::new(season_length)),
    ]
}

/// Observed `(index, value)` pairs with missing periods skipped.
pub(crate) fn observed(series: &[Option<f64>]) -> Vec<(usize, f64)> {
    series
        .iter()
        .enumerate()
        .filter_map(|(index, value)| value.map(|v| (index, v)))
        .collect()
}
