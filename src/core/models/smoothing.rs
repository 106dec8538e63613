//! Holt double exponential smoothing: a level plus a damped-free trend,
//! updated over the observed values in order.
use crate::core::models::{FittedModel, ForecastModel, ModelFitError, observed};

pub struct HoltSmoothing {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for HoltSmoothing {
    fn default() -> Self {
        HoltSmoothing {
            alpha: 0.5,
            beta: 0.3,
        }
    }
}

struct FittedHolt {
    level: f64,
    trend: f64,
}

impl ForecastModel for HoltSmoothing {
    fn name(&self) -> &'static str {
        "smoothing"
    }

    fn min_history(&self) -> usize {
        4
    }

    fn fit(&self, series: &[Option<f64>]) -> Result<Box<dyn FittedModel>, ModelFitError> {
        let points = observed(series);
        if points.len() < self.min_history() {
            return Err(ModelFitError::InsufficientData {
                required: self.min_history(),
                available: points.len(),
            });
        }

        let mut level = points[0].1;
        let mut trend = points[1].1 - points[0].1;
        for (_, value) in points.iter().skip(1) {
            let previous_level = level;
            level = self.alpha * value + (1.0 - self.alpha) * (level + trend);
            trend = self.beta * (level - previous_level) + (1.0 - self.beta) * trend;
        }

        Ok(Box::new(FittedHolt { level, trend }))
    }
}

impl FittedModel for FittedHolt {
    fn predict(&self, horizon: usize) -> Vec<f64> {
        (1..=horizon)
            .map(|step| self.level + self.trend * step as f64)
            .collect()
    }
}
