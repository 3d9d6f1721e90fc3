//! # Aggregation Engine
//!
//! A `Stats:` line produces either a counting slot (a filter whose
//! matches are tallied) or a folding slot (a numeric column folded
//! through one of the fixed aggregation kinds). `StatsAnd`/`StatsOr`/
//! `StatsNegate` recombine counting slots through their embedded
//! filters.

use std::sync::Arc;

use super::column::Column;
use super::filter::Filter;
use super::ParseError;

/// The fixed set of aggregation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationKind {
    Sum,
    Min,
    Max,
    Avg,
    Std,
    SumInv,
    AvgInv,
}

impl AggregationKind {
    /// Look up an aggregation by its `Stats:` spelling. `None` means the
    /// token is a column name instead.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(Self::Sum),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "avg" => Some(Self::Avg),
            "std" => Some(Self::Std),
            "suminv" => Some(Self::SumInv),
            "avginv" => Some(Self::AvgInv),
            _ => None,
        }
    }
}

/// Mutable fold state over doubles. One instance per output group.
///
/// `min`/`max` keep a `first` flag instead of materializing the neutral
/// element, so an empty fold yields 0. `avg`/`avginv`/`std` over zero
/// updates divide by zero and yield NaN; `suminv`/`avginv` propagate
/// IEEE-754 infinities for zero-valued updates.
#[derive(Debug, Clone)]
pub struct Aggregation {
    kind: AggregationKind,
    count: u64,
    sum: f64,
    sum_of_squares: f64,
    first: bool,
}

impl Aggregation {
    pub fn new(kind: AggregationKind) -> Self {
        Self {
            kind,
            count: 0,
            sum: 0.0,
            sum_of_squares: 0.0,
            first: true,
        }
    }

    pub fn update(&mut self, value: f64) {
        match self.kind {
            AggregationKind::Sum => self.sum += value,
            AggregationKind::Min => {
                if self.first || value < self.sum {
                    self.sum = value;
                }
                self.first = false;
            }
            AggregationKind::Max => {
                if self.first || value > self.sum {
                    self.sum = value;
                }
                self.first = false;
            }
            AggregationKind::Avg => {
                self.count += 1;
                self.sum += value;
            }
            AggregationKind::Std => {
                self.count += 1;
                self.sum += value;
                self.sum_of_squares += value * value;
            }
            AggregationKind::SumInv => self.sum += 1.0 / value,
            AggregationKind::AvgInv => {
                self.count += 1;
                self.sum += 1.0 / value;
            }
        }
    }

    pub fn value(&self) -> f64 {
        match self.kind {
            AggregationKind::Sum
            | AggregationKind::Min
            | AggregationKind::Max
            | AggregationKind::SumInv => self.sum,
            AggregationKind::Avg | AggregationKind::AvgInv => self.sum / self.count as f64,
            AggregationKind::Std => {
                let mean = self.sum / self.count as f64;
                (self.sum_of_squares / self.count as f64 - mean * mean).sqrt()
            }
        }
    }
}

/// One `Stats:` output slot.
pub enum StatsColumn {
    /// Counts rows matching the embedded filter.
    Count(Filter),
    /// Folds a numeric column through an aggregation.
    Op {
        kind: AggregationKind,
        column: Arc<Column>,
    },
}

impl StatsColumn {
    /// Hand back the embedded filter for `StatsAnd`/`StatsOr`/
    /// `StatsNegate` combination. Folding slots have none.
    pub fn steal_filter(self) -> Result<Filter, ParseError> {
        match self {
            StatsColumn::Count(filter) => Ok(filter),
            StatsColumn::Op { .. } => Err(ParseError::StatsCombination),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folded(kind: AggregationKind, values: &[f64]) -> f64 {
        let mut agg = Aggregation::new(kind);
        for &v in values {
            agg.update(v);
        }
        agg.value()
    }

    #[test]
    fn test_sum() {
        assert_eq!(folded(AggregationKind::Sum, &[1.0, 2.0, 3.5]), 6.5);
        assert_eq!(folded(AggregationKind::Sum, &[]), 0.0);
    }

    #[test]
    fn test_min_max() {
        assert_eq!(folded(AggregationKind::Min, &[3.0, -1.0, 2.0]), -1.0);
        assert_eq!(folded(AggregationKind::Max, &[3.0, -1.0, 2.0]), 3.0);
        // Negative-only input must not be beaten by a phantom zero.
        assert_eq!(folded(AggregationKind::Max, &[-5.0, -2.0]), -2.0);
        assert_eq!(folded(AggregationKind::Min, &[5.0, 2.0]), 2.0);
    }

    #[test]
    fn test_min_max_empty_yield_zero() {
        assert_eq!(folded(AggregationKind::Min, &[]), 0.0);
        assert_eq!(folded(AggregationKind::Max, &[]), 0.0);
    }

    #[test]
    fn test_avg() {
        assert_eq!(folded(AggregationKind::Avg, &[1.0, 2.0, 3.0]), 2.0);
        assert!(folded(AggregationKind::Avg, &[]).is_nan());
    }

    #[test]
    fn test_std() {
        // Constant input has zero deviation.
        assert_eq!(folded(AggregationKind::Std, &[4.0, 4.0, 4.0]), 0.0);
        // {2, 4}: mean 3, variance 1.
        let std = folded(AggregationKind::Std, &[2.0, 4.0]);
        assert!((std - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_suminv_and_avginv() {
        assert_eq!(folded(AggregationKind::SumInv, &[2.0, 4.0]), 0.75);
        assert_eq!(folded(AggregationKind::AvgInv, &[2.0, 4.0]), 0.375);
        // Division by zero propagates per IEEE-754.
        assert!(folded(AggregationKind::SumInv, &[0.0]).is_infinite());
    }

    #[test]
    fn test_aggregation_names() {
        for (name, kind) in [
            ("sum", AggregationKind::Sum),
            ("min", AggregationKind::Min),
            ("max", AggregationKind::Max),
            ("avg", AggregationKind::Avg),
            ("std", AggregationKind::Std),
            ("suminv", AggregationKind::SumInv),
            ("avginv", AggregationKind::AvgInv),
        ] {
            assert_eq!(AggregationKind::from_name(name), Some(kind));
        }
        assert_eq!(AggregationKind::from_name("count"), None);
        assert_eq!(AggregationKind::from_name("SUM"), None);
    }

    #[test]
    fn test_steal_filter_from_op_fails() {
        let column = Column::int("num", "n", |_, _| 0);
        let sc = StatsColumn::Op {
            kind: AggregationKind::Sum,
            column,
        };
        assert!(matches!(sc.steal_filter(), Err(ParseError::StatsCombination)));
    }
}
