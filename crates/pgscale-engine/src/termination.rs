//! Early termination: stop the run once bands clearly degrade.

use pgscale_core::config::EarlyTerminationConfig;
use pgscale_core::BandMetrics;
use pgscale_metrics::stats::{mean, ratio};

/// Evaluated after every completed band.
#[derive(Debug, Clone)]
pub struct EarlyTermination {
    config: EarlyTerminationConfig,
}

impl EarlyTermination {
    pub fn new(config: EarlyTerminationConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Reason to stop after the last band in `bands`, if any.
    pub fn evaluate(&self, bands: &[BandMetrics]) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        let last = bands.last()?;

        let window = self.config.window.max(1).min(bands.len());
        let rates: Vec<f64> = bands[bands.len() - window..]
            .iter()
            .map(BandMetrics::error_rate)
            .collect();
        let rolling = mean(&rates);
        if rolling > self.config.max_error_rate {
            return Some(format!(
                "rolling error rate {rolling:.1}% over the last {window} bands exceeds {:.1}%",
                self.config.max_error_rate
            ));
        }

        if last.health_score < self.config.min_health_score {
            return Some(format!(
                "band {} health score {:.2} is below {:.2}",
                last.band_id, last.health_score, self.config.min_health_score
            ));
        }

        if let [.., prev, _] = bands
            && prev.tps() > 0.0
        {
            let drop = ratio(prev.tps() - last.tps(), prev.tps());
            if drop > self.config.max_throughput_drop {
                return Some(format!(
                    "throughput fell {:.0}% from band {} to band {}",
                    drop * 100.0,
                    prev.band_id,
                    last.band_id
                ));
            }
        }

        None
    }
}
