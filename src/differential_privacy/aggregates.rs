//! Plan and apply the noise of an aggregate query
//!
//! Each distinct (aggregate, argument) pair of the query gets an equal share
//! of the budget. `AVG` is released as a noisy `SUM` and a noisy `COUNT`
//! sharing the budget of the mean.
//!

use itertools::Itertools;
use rand::Rng;
use std::collections::HashMap;

use super::{mechanisms, sensitivity, DpEvent, DpParameters, Error, Result};
use crate::{
    data_type::{Bounds, DataType, Value},
    expr::{Aggregate, AggregateColumn},
    metadata::{Column, Table},
    sql::{OutputColumn, QueryDescriptor},
};

/// One Laplace measurement per row
#[derive(Clone, Debug, PartialEq)]
pub struct Release {
    aggregate: AggregateColumn,
    /// The sensitivity, contribution bound included
    sensitivity: f64,
    epsilon: f64,
}

impl Release {
    fn new(aggregate: AggregateColumn, sensitivity: f64, epsilon: f64) -> Self {
        Release {
            aggregate,
            sensitivity,
            epsilon,
        }
    }

    pub fn aggregate(&self) -> &AggregateColumn {
        &self.aggregate
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn variance(&self) -> f64 {
        mechanisms::laplace_variance(self.sensitivity, self.epsilon)
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        mechanisms::sample_noise(self.sensitivity, self.epsilon, rng)
    }
}

/// How an output column is computed from the exact row and the noise draws
#[derive(Clone, Debug, PartialEq)]
enum Planned {
    /// Copied from the exact result
    Key { exact: usize },
    /// COUNT, SUM, MIN or MAX
    Noisy {
        exact: usize,
        release: usize,
        aggregate: Aggregate,
        data_type: DataType,
        bounds: Bounds,
    },
    /// Ratio of a noisy SUM and a noisy COUNT
    Mean {
        sum: usize,
        count: usize,
        sum_release: usize,
        count_release: usize,
        bounds: Bounds,
    },
}

/// The noise to add to each row of the exact result of a query
#[derive(Clone, Debug, PartialEq)]
pub struct NoisePlan {
    columns: Vec<Planned>,
    releases: Vec<Release>,
    exact_width: usize,
    clamp_counts: bool,
}

impl NoisePlan {
    /// Compute sensitivities and budget shares, fails with `MissingRange`
    /// when an aggregate needs a range that is not declared
    pub fn new(
        descriptor: &QueryDescriptor,
        table: &Table,
        parameters: &DpParameters,
    ) -> Result<NoisePlan> {
        let budget = parameters.budget()?;
        let distinct = descriptor.distinct_aggregates();
        let column_budget = budget.split(distinct.len());
        let max_ids = table.max_ids() as f64;
        let mut releases = vec![];
        let mut release_index: HashMap<&AggregateColumn, usize> = HashMap::new();
        for aggregate in distinct {
            let column = argument_column(aggregate, table)?;
            release_index.insert(aggregate, releases.len());
            match aggregate.aggregate() {
                Aggregate::Mean => {
                    let sum = aggregate.with_aggregate(Aggregate::Sum);
                    let count = aggregate.with_aggregate(Aggregate::Count);
                    let sum_budget = column_budget.share(parameters.avg_sum_share());
                    let count_budget = column_budget.share(1. - parameters.avg_sum_share());
                    releases.push(Release::new(
                        sum,
                        sensitivity(Aggregate::Sum, column)? * max_ids,
                        sum_budget.epsilon(),
                    ));
                    releases.push(Release::new(
                        count,
                        sensitivity(Aggregate::Count, column)? * max_ids,
                        count_budget.epsilon(),
                    ));
                }
                function => releases.push(Release::new(
                    aggregate.clone(),
                    sensitivity(function, column)? * max_ids,
                    column_budget.epsilon(),
                )),
            }
        }
        let mut exact = 0;
        let mut columns = vec![];
        for output in descriptor.columns() {
            match output {
                OutputColumn::GroupingKey { .. } => {
                    columns.push(Planned::Key { exact });
                    exact += 1;
                }
                OutputColumn::Aggregate { aggregate, .. } => {
                    let release = release_index[aggregate];
                    let column = argument_column(aggregate, table)?;
                    let bounds = column.map_or(Bounds::Unbounded, Column::bounds);
                    if aggregate.aggregate() == Aggregate::Mean {
                        columns.push(Planned::Mean {
                            sum: exact,
                            count: exact + 1,
                            sum_release: release,
                            count_release: release + 1,
                            bounds,
                        });
                        exact += 2;
                    } else {
                        columns.push(Planned::Noisy {
                            exact,
                            release,
                            aggregate: aggregate.aggregate(),
                            data_type: column.map_or(DataType::Integer, Column::data_type),
                            bounds,
                        });
                        exact += 1;
                    }
                }
            }
        }
        let plan = NoisePlan {
            columns,
            releases,
            exact_width: exact,
            clamp_counts: parameters.clamp_counts(),
        };
        log::debug!(
            "Noise plan for {} ({budget}): {}",
            descriptor.table(),
            plan.releases
                .iter()
                .map(|r| format!(
                    "{} (sensitivity={}, ε={})",
                    r.aggregate, r.sensitivity, r.epsilon
                ))
                .join(", ")
        );
        Ok(plan)
    }

    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    /// The number of columns the exact result must have
    pub fn exact_width(&self) -> usize {
        self.exact_width
    }

    /// The total budget spent
    pub fn epsilon(&self) -> f64 {
        self.releases.iter().map(Release::epsilon).sum()
    }

    /// The mechanisms applied to each row
    pub fn dp_event(&self) -> DpEvent {
        self.releases
            .iter()
            .map(|r| DpEvent::laplace_from_epsilon(r.epsilon))
            .collect()
    }

    /// Turn an exact row into a private one.
    /// Identical aggregates share the same noise draw.
    pub fn privatize_row<R: Rng + ?Sized>(&self, row: &[Value], rng: &mut R) -> Result<Vec<Value>> {
        if row.len() != self.exact_width {
            return Err(Error::other(format!(
                "a row of {} values was returned where {} were expected",
                row.len(),
                self.exact_width
            )));
        }
        let noises = self
            .releases
            .iter()
            .map(|release| release.sample(&mut *rng))
            .collect::<Result<Vec<f64>>>()?;
        self.columns
            .iter()
            .map(|planned| match planned {
                Planned::Key { exact } => Ok(row[*exact].clone()),
                Planned::Noisy {
                    exact,
                    release,
                    aggregate,
                    data_type,
                    bounds,
                } => self.noisy_value(
                    &row[*exact],
                    noises[*release],
                    &self.releases[*release],
                    *aggregate,
                    *data_type,
                    bounds,
                ),
                Planned::Mean {
                    sum,
                    count,
                    sum_release,
                    count_release,
                    bounds,
                } => {
                    let noisy_sum = numeric(&row[*sum], &self.releases[*sum_release])?
                        .unwrap_or(0.)
                        + noises[*sum_release];
                    let noisy_count = numeric(&row[*count], &self.releases[*count_release])?
                        .unwrap_or(0.)
                        + noises[*count_release];
                    let mean = noisy_sum / noisy_count.max(1.);
                    Ok(Value::float(bounds.clamp(mean)))
                }
            })
            .collect()
    }

    fn noisy_value(
        &self,
        exact: &Value,
        noise: f64,
        release: &Release,
        aggregate: Aggregate,
        data_type: DataType,
        bounds: &Bounds,
    ) -> Result<Value> {
        let value = match (numeric(exact, release)?, aggregate) {
            (Some(value), _) => value,
            (None, Aggregate::Min | Aggregate::Max) => bounds.midpoint().unwrap_or(0.),
            (None, _) => 0.,
        };
        let mut noisy = value + noise;
        if aggregate == Aggregate::Count {
            if self.clamp_counts {
                noisy = noisy.max(0.);
            } else if noisy.round() <= 0. {
                log::warn!(
                    "Noisy {} is {} (exact value {exact})",
                    release.aggregate,
                    noisy.round()
                );
            }
        }
        let is_integer = match exact {
            Value::Integer(_) => true,
            Value::Float(_) => false,
            _ => aggregate == Aggregate::Count || data_type == DataType::Integer,
        };
        Ok(if is_integer {
            Value::integer(noisy.round() as i64)
        } else {
            Value::float(noisy)
        })
    }
}

/// The declared column an aggregate applies to, `None` for `COUNT(*)`
fn argument_column<'a>(aggregate: &AggregateColumn, table: &'a Table) -> Result<Option<&'a Column>> {
    aggregate
        .column_name()
        .map(|name| table.column(name).map_err(Error::other))
        .transpose()
}

/// The numeric value of an exact aggregate, `None` for NULL
fn numeric(value: &Value, release: &Release) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        value => value.to_f64().map(Some).ok_or_else(|| {
            Error::other(format!(
                "{} returned the non numeric value {value}",
                release.aggregate
            ))
        }),
    }
}
