use itertools::Itertools;
use std::fmt;

/// An object inspired by Google's [DPEvent](https://github.com/google/differential-privacy/blob/main/python/dp_accounting/dp_event.py)
/// to represent the mechanisms applied by a private query
#[derive(Clone, Debug, PartialEq)]
pub enum DpEvent {
    /// Represents application of an operation with no privacy impact.
    ///
    /// Useful as the neutral element of composition.
    NoOp,
    /// Represents an application of the Laplace mechanism.
    ///
    /// For values v_i and noise z sampled coordinate-wise from the Laplace
    /// distribution L(0, s), this mechanism returns sum_i v_i + z.
    /// If the L_1 norm of the values are bounded ||v_i||_1 <= C, the noise_multiplier
    /// is defined as s / C.
    Laplace { noise_multiplier: f64 },
    /// Represents application of a series of composed mechanisms.
    Composed { events: Vec<DpEvent> },
}

impl DpEvent {
    pub fn no_op() -> Self {
        Self::NoOp
    }

    pub fn laplace(noise_multiplier: f64) -> Self {
        Self::Laplace { noise_multiplier }
    }

    /// The Laplace event spending `epsilon`
    pub fn laplace_from_epsilon(epsilon: f64) -> Self {
        Self::Laplace {
            noise_multiplier: 1. / epsilon,
        }
    }

    pub fn compose(self, other: Self) -> Self {
        if other.is_no_op() {
            self
        } else if self.is_no_op() {
            other
        } else {
            let (v1, v2) = match (self, other) {
                (DpEvent::Composed { events: v1 }, DpEvent::Composed { events: v2 }) => (v1, v2),
                (DpEvent::Composed { events: v }, other) => (v, vec![other]),
                (current, DpEvent::Composed { events: v }) => (vec![current], v),
                (current, other) => (vec![current], vec![other]),
            };
            DpEvent::Composed {
                events: v1.into_iter().chain(v2).collect(),
            }
        }
    }

    pub fn is_no_op(&self) -> bool {
        match self {
            DpEvent::NoOp => true,
            DpEvent::Laplace { noise_multiplier } => noise_multiplier.is_infinite(),
            DpEvent::Composed { events } => events.iter().all(|q| q.is_no_op()),
        }
    }

    /// The pure-DP epsilon spent, by simple composition
    pub fn epsilon(&self) -> f64 {
        match self {
            DpEvent::NoOp => 0.,
            DpEvent::Laplace { noise_multiplier } => 1. / noise_multiplier,
            DpEvent::Composed { events } => events.iter().map(DpEvent::epsilon).sum(),
        }
    }
}

impl fmt::Display for DpEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DpEvent::NoOp => write!(f, "NoOp"),
            DpEvent::Laplace { noise_multiplier } => write!(f, "Laplace ({noise_multiplier})"),
            DpEvent::Composed { events } => write!(
                f,
                "Composed ({})",
                events.iter().map(|dpe| format!("{}", dpe)).join(", ")
            ),
        }
    }
}

impl FromIterator<DpEvent> for DpEvent {
    fn from_iter<T: IntoIterator<Item = DpEvent>>(iter: T) -> Self {
        iter.into_iter()
            .fold(DpEvent::NoOp, |composed, event| composed.compose(event))
    }
}

impl From<Vec<DpEvent>> for DpEvent {
    fn from(v: Vec<DpEvent>) -> Self {
        v.into_iter().collect()
    }
}
