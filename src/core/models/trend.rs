//! Ordinary-least-squares linear trend, the classical baseline strategy.
use crate::core::models::{FittedModel, ForecastModel, ModelFitError, observed};

pub struct LinearTrend;

struct FittedTrend {
    slope: f64,
    intercept: f64,
    /// Index of the period right after the training series end.
    next_index: usize,
}

impl ForecastModel for LinearTrend {
    fn name(&self) -> &'static str {
        "trend"
    }

    fn min_history(&self) -> usize {
        3
    }

    fn fit(&self, series: &[Option<f64>]) -> Result<Box<dyn FittedModel>, ModelFitError> {
        let points = observed(series);
        if points.len() < self.min_history() {
            return Err(ModelFitError::InsufficientData {
                required: self.min_history(),
                available: points.len(),
            });
        }

        let n = points.len() as f64;
        let mean_x = points.iter().map(|(i, _)| *i as f64).sum::<f64>() / n;
        let mean_y = points.iter().map(|(_, v)| v).sum::<f64>() / n;

        let sxx: f64 = points
            .iter()
            .map(|(i, _)| (*i as f64 - mean_x).powi(2))
            .sum();
        if sxx == 0.0 {
            return Err(ModelFitError::InsufficientVariance);
        }
        let sxy: f64 = points
            .iter()
            .map(|(i, v)| (*i as f64 - mean_x) * (v - mean_y))
            .sum();

        let slope = sxy / sxx;
        Ok(Box::new(FittedTrend {
            slope,
            intercept: mean_y - slope * mean_x,
            next_index: series.len(),
        }))
    }
}

impl FittedModel for FittedTrend {
    fn predict(&self, horizon: usize) -> Vec<f64> {
        (0..horizon)
            .map(|step| self.intercept + self.slope * (self.next_index + step) as f64)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_exact_line() {
        // y = 2x + 1
        let series: Vec<Option<f64>> = (0..6).map(|i| Some(2.0 * i as f64 + 1.0)).collect();
        let fitted = LinearTrend.fit(&series).unwrap();

        let predictions = fitted.predict(3);
        assert!((predictions[0] - 13.0).abs() < 1e-9);
        assert!((predictions[1] - 15.0).abs() < 1e-9);
        assert!((predictions[2] - 17.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_periods_do_not_shift_the_line() {
        // Same line with an interior gap; the gap index must stay on-axis.
        let series = vec![Some(1.0), Some(3.0), None, Some(7.0), Some(9.0)];
        let fitted = LinearTrend.fit(&series).unwrap();

        let predictions = fitted.predict(1);
        assert!((predictions[0] - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_too_short_series_is_rejected() {
        let series = vec![Some(1.0), Some(2.0)];
        let err = LinearTrend.fit(&series).err().expect("fit should fail");
        match err {
            ModelFitError::InsufficientData {
                required,
                available,
            } => {
                assert_eq!(required, 3);
                assert_eq!(available, 2);
            }
            other => panic!("expected InsufficientData, got {other:?}"),
        }
    }
}
