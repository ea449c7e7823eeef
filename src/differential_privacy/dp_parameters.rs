use super::{budget::Budget, Error, Result};
use serde::{Deserialize, Serialize};

/// The parameters of a private reader
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DpParameters {
    epsilon: f64,
    /// The share of an AVG column budget spent on its SUM, the rest goes to its COUNT
    #[serde(default = "default_avg_sum_share")]
    avg_sum_share: f64,
    /// Clamp noisy counts to non-negative values
    #[serde(default)]
    clamp_counts: bool,
}

fn default_avg_sum_share() -> f64 {
    0.5
}

impl DpParameters {
    pub fn new(epsilon: f64, avg_sum_share: f64, clamp_counts: bool) -> DpParameters {
        DpParameters {
            epsilon,
            avg_sum_share,
            clamp_counts,
        }
    }

    pub fn from_epsilon(epsilon: f64) -> DpParameters {
        DpParameters::new(epsilon, default_avg_sum_share(), false)
    }

    pub fn with_epsilon(self, epsilon: f64) -> DpParameters {
        DpParameters { epsilon, ..self }
    }

    pub fn with_clamp_counts(self, clamp_counts: bool) -> DpParameters {
        DpParameters {
            clamp_counts,
            ..self
        }
    }

    pub fn with_avg_sum_share(self, avg_sum_share: f64) -> DpParameters {
        DpParameters {
            avg_sum_share,
            ..self
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn avg_sum_share(&self) -> f64 {
        self.avg_sum_share
    }

    pub fn clamp_counts(&self) -> bool {
        self.clamp_counts
    }

    /// The validated budget
    pub fn budget(&self) -> Result<Budget> {
        if !(self.avg_sum_share > 0. && self.avg_sum_share < 1.) {
            return Err(Error::invalid_budget(format!(
                "the AVG sum share must be in (0, 1), got {}",
                self.avg_sum_share
            )));
        }
        Budget::new(self.epsilon)
    }
}

impl Default for DpParameters {
    fn default() -> Self {
        DpParameters::from_epsilon(1.)
    }
}
