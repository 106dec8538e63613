//! Seasonal-average strategy: per-phase means over a fixed season length,
//! the decomposition-style member of the ensemble.
use crate::core::models::{FittedModel, ForecastModel, ModelFitError, observed};

pub struct SeasonalAverage {
    season: usize,
}

impl SeasonalAverage {
    pub fn new(season: usize) -> Self {
        // A one-period season degenerates to a plain mean; keep at least 2.
        SeasonalAverage {
            season: season.max(2),
        }
    }
}

struct FittedSeasonal {
    phase_means: Vec<f64>,
    /// Phase of the first period after the training series end.
    next_phase: usize,
}

impl ForecastModel for SeasonalAverage {
    fn name(&self) -> &'static str {
        "seasonal"
    }

    fn min_history(&self) -> usize {
        2 * self.season
    }

    fn fit(&self, series: &[Option<f64>]) -> Result<Box<dyn FittedModel>, ModelFitError> {
        let points = observed(series);
        if points.len() < self.min_history() {
            return Err(ModelFitError::InsufficientData {
                required: self.min_history(),
                available: points.len(),
            });
        }

        let mut sums = vec![0.0; self.season];
        let mut counts = vec![0usize; self.season];
        for (index, value) in &points {
            sums[index % self.season] += value;
            counts[index % self.season] += 1;
        }

        // Phases that fall entirely on missing periods borrow the overall
        // mean rather than reading as zero demand.
        let overall = points.iter().map(|(_, v)| v).sum::<f64>() / points.len() as f64;
        let phase_means = sums
            .iter()
            .zip(&counts)
            .map(|(sum, count)| {
                if *count > 0 {
                    sum / *count as f64
                } else {
                    overall
                }
            })
            .collect();

        Ok(Box::new(FittedSeasonal {
            phase_means,
            next_phase: series.len() % self.season,
        }))
    }
}

impl FittedModel for FittedSeasonal {
    fn predict(&self, horizon: usize) -> Vec<f64> {
        (0..horizon)
            .map(|step| self.phase_means[(self.next_phase + step) % self.phase_means.len()])
            .collect()
    }
}
