use super::{Error, Result};
use std::fmt;

/// Represent a simple privacy budget
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Budget {
    epsilon: f64,
}

impl Budget {
    /// A budget must be positive and finite
    pub fn new(epsilon: f64) -> Result<Budget> {
        if epsilon.is_finite() && epsilon > 0. {
            Ok(Budget { epsilon })
        } else {
            Err(Error::invalid_budget(format!(
                "epsilon must be positive and finite, got {epsilon}"
            )))
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// One of `n` equal parts of the budget
    pub fn split(&self, n: usize) -> Budget {
        Budget {
            epsilon: self.epsilon / n.max(1) as f64,
        }
    }

    /// A fraction of the budget, the fraction is in (0, 1]
    pub fn share(&self, fraction: f64) -> Budget {
        Budget {
            epsilon: self.epsilon * fraction,
        }
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ε={}", self.epsilon)
    }
}
