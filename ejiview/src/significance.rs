//! Welch two-sample test of whether geographies with a high vulnerability score have a
//! different mean outcome score from the rest.

use itertools::{izip, Itertools};
use log::debug;
use polars::prelude::DataFrame;
use serde::Serialize;

use crate::error::EjiResult;
use crate::metric::MetricId;
use crate::snapshot::numeric_column;
use crate::stats::{mean, sample_variance, students_t_two_sided_p};

/// p-values below this are reported as statistically significant. Not corrected for repeated
/// testing across years or metrics.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Default vulnerability score at or above which a geography is high burden.
pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// One geography's scores. Negative values are upstream sentinels for suppressed estimates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AssociationRow {
    pub vulnerability: Option<f64>,
    pub outcome: Option<f64>,
}

impl AssociationRow {
    pub fn new(vulnerability: Option<f64>, outcome: Option<f64>) -> Self {
        Self {
            vulnerability,
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample variance, NaN for a single member.
    pub variance: f64,
}

impl GroupSummary {
    fn from_values(values: &[f64]) -> Self {
        Self {
            count: values.len(),
            mean: mean(values),
            variance: sample_variance(values),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Significance {
    Significant,
    NotSignificant,
}

impl Significance {
    pub fn label(&self) -> &'static str {
        match self {
            Significance::Significant => "statistically significant",
            Significance::NotSignificant => "not significant",
        }
    }
}

/// Result of the test. A group with a single member has no variance, so `statistic`,
/// `degrees_of_freedom` and `p_value` are NaN. When both groups have zero variance the standard
/// error is zero: `statistic` is infinite if the means differ (NaN if they are equal) while
/// `degrees_of_freedom` and `p_value` are NaN. Either way the result reads as not significant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub threshold: f64,
    pub high_burden: GroupSummary,
    pub other: GroupSummary,
    pub statistic: f64,
    pub degrees_of_freedom: f64,
    pub p_value: f64,
}

impl TestResult {
    pub fn significance(&self) -> Significance {
        if self.p_value < SIGNIFICANCE_LEVEL {
            Significance::Significant
        } else {
            Significance::NotSignificant
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TestOutcome {
    Tested(TestResult),
    /// One of the groups had no members once invalid rows were dropped.
    InsufficientData { high_burden: usize, other: usize },
}

/// Welch's unequal-variance t-test of the outcome means of the high-burden and other groups.
///
/// Rows with a negative or missing outcome are discarded first. Rows whose vulnerability is
/// missing or negative cannot be classified and are left out of both groups.
pub fn test_vulnerability_association(rows: &[AssociationRow], threshold: f64) -> TestOutcome {
    let (high_burden, other): (Vec<f64>, Vec<f64>) = rows
        .iter()
        .filter_map(|row| {
            let outcome = row.outcome.filter(|o| *o >= 0.0)?;
            let vulnerability = row.vulnerability.filter(|v| *v >= 0.0)?;
            Some((vulnerability, outcome))
        })
        .partition_map(|(vulnerability, outcome)| {
            if vulnerability >= threshold {
                itertools::Either::Left(outcome)
            } else {
                itertools::Either::Right(outcome)
            }
        });
    debug!(
        "Partitioned {} rows into {} high burden and {} other",
        rows.len(),
        high_burden.len(),
        other.len()
    );
    if high_burden.is_empty() || other.is_empty() {
        return TestOutcome::InsufficientData {
            high_burden: high_burden.len(),
            other: other.len(),
        };
    }

    let high_burden = GroupSummary::from_values(&high_burden);
    let other = GroupSummary::from_values(&other);
    let high_se = high_burden.variance / high_burden.count as f64;
    let other_se = other.variance / other.count as f64;
    let standard_error = (high_se + other_se).sqrt();
    let statistic = (high_burden.mean - other.mean) / standard_error;
    // Welch–Satterthwaite
    let degrees_of_freedom = (high_se + other_se).powi(2)
        / (high_se.powi(2) / (high_burden.count - 1) as f64
            + other_se.powi(2) / (other.count - 1) as f64);
    let p_value = students_t_two_sided_p(statistic, degrees_of_freedom);

    TestOutcome::Tested(TestResult {
        threshold,
        high_burden,
        other,
        statistic,
        degrees_of_freedom,
        p_value,
    })
}

/// Rows for the test from a normalized table, one per geography.
pub fn rows_from_table(
    df: &DataFrame,
    vulnerability: MetricId,
    outcome: MetricId,
) -> EjiResult<Vec<AssociationRow>> {
    let vulnerability = numeric_column(df, vulnerability.column())?;
    let outcome = numeric_column(df, outcome.column())?;
    Ok(izip!(vulnerability, outcome)
        .map(|(v, o)| AssociationRow::new(v, o))
        .collect())
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;
    use crate::COL;

    fn rows(values: &[(Option<f64>, Option<f64>)]) -> Vec<AssociationRow> {
        values
            .iter()
            .map(|(v, o)| AssociationRow::new(*v, *o))
            .collect()
    }

    #[test]
    fn separated_groups_are_significant() {
        let rows = rows(&[
            (Some(0.80), Some(0.9)),
            (Some(0.80), Some(0.85)),
            (Some(0.10), Some(0.2)),
            (Some(0.20), Some(0.3)),
        ]);
        let TestOutcome::Tested(result) = test_vulnerability_association(&rows, DEFAULT_THRESHOLD)
        else {
            panic!("expected a test result");
        };
        assert!((result.high_burden.mean - 0.875).abs() < 1e-12);
        assert!((result.other.mean - 0.25).abs() < 1e-12);
        assert_eq!(result.high_burden.count, 2);
        assert!((result.statistic - 11.180_339_887).abs() < 1e-6);
        assert!((result.degrees_of_freedom - 1.470_588_235).abs() < 1e-6);
        assert!((result.p_value - 0.021_237_53).abs() < 1e-6);
        assert_eq!(result.significance(), Significance::Significant);
    }

    #[test]
    fn overlapping_groups_are_not_significant() {
        let rows = rows(&[
            (Some(0.9), Some(0.1)),
            (Some(0.9), Some(0.2)),
            (Some(0.9), Some(0.3)),
            (Some(0.9), Some(0.4)),
            (Some(0.1), Some(0.2)),
            (Some(0.1), Some(0.3)),
            (Some(0.1), Some(0.4)),
            (Some(0.1), Some(0.5)),
            (Some(0.1), Some(0.6)),
        ]);
        let TestOutcome::Tested(result) = test_vulnerability_association(&rows, 0.75) else {
            panic!("expected a test result");
        };
        assert!((result.statistic + 1.566_698_9).abs() < 1e-6);
        assert!((result.p_value - 0.161_285_9).abs() < 1e-6);
        assert_eq!(result.significance(), Significance::NotSignificant);
        assert_eq!(result.significance().label(), "not significant");
    }

    #[test]
    fn negative_outcomes_are_discarded() {
        let all_sentinels = rows(&[
            (Some(0.9), Some(-999.0)),
            (Some(0.1), Some(-999.0)),
            (Some(0.5), Some(-1.0)),
        ]);
        assert_eq!(
            test_vulnerability_association(&all_sentinels, DEFAULT_THRESHOLD),
            TestOutcome::InsufficientData {
                high_burden: 0,
                other: 0
            }
        );
    }

    #[test]
    fn unclassifiable_rows_are_excluded() {
        let rows = rows(&[
            (None, Some(0.9)),
            (Some(-999.0), Some(0.9)),
            (Some(0.1), Some(0.2)),
            (Some(0.3), None),
        ]);
        assert_eq!(
            test_vulnerability_association(&rows, DEFAULT_THRESHOLD),
            TestOutcome::InsufficientData {
                high_burden: 0,
                other: 1
            }
        );
    }

    #[test]
    fn threshold_is_inclusive_and_configurable() {
        let rows = rows(&[
            (Some(0.5), Some(0.9)),
            (Some(0.5), Some(0.8)),
            (Some(0.49), Some(0.1)),
            (Some(0.2), Some(0.2)),
        ]);
        assert!(matches!(
            test_vulnerability_association(&rows, 0.75),
            TestOutcome::InsufficientData { high_burden: 0, other: 4 }
        ));
        let TestOutcome::Tested(result) = test_vulnerability_association(&rows, 0.5) else {
            panic!("expected a test result");
        };
        assert_eq!(result.high_burden.count, 2);
        assert_eq!(result.other.count, 2);
    }

    #[test]
    fn single_member_group_is_undefined_but_not_an_error() {
        let rows = rows(&[
            (Some(0.9), Some(0.9)),
            (Some(0.1), Some(0.2)),
            (Some(0.1), Some(0.3)),
        ]);
        let TestOutcome::Tested(result) = test_vulnerability_association(&rows, 0.75) else {
            panic!("expected a test result");
        };
        assert!(result.p_value.is_nan());
        assert_eq!(result.significance(), Significance::NotSignificant);
    }

    #[test]
    fn constant_groups_have_infinite_statistic_and_no_p_value() {
        let rows = rows(&[
            (Some(0.9), Some(0.9)),
            (Some(0.8), Some(0.9)),
            (Some(0.1), Some(0.2)),
            (Some(0.2), Some(0.2)),
        ]);
        let TestOutcome::Tested(result) = test_vulnerability_association(&rows, 0.75) else {
            panic!("expected a test result");
        };
        assert_eq!(result.high_burden.variance, 0.0);
        assert_eq!(result.other.variance, 0.0);
        assert_eq!(result.statistic, f64::INFINITY);
        assert!(result.degrees_of_freedom.is_nan());
        assert!(result.p_value.is_nan());
        assert_eq!(result.significance(), Significance::NotSignificant);

        let rows = self::rows(&[
            (Some(0.9), Some(0.4)),
            (Some(0.8), Some(0.4)),
            (Some(0.1), Some(0.4)),
            (Some(0.2), Some(0.4)),
        ]);
        let TestOutcome::Tested(result) = test_vulnerability_association(&rows, 0.75) else {
            panic!("expected a test result");
        };
        assert!(result.statistic.is_nan());
        assert!(result.p_value.is_nan());
    }

    #[test]
    fn rows_are_read_from_table_columns() -> anyhow::Result<()> {
        let df = df!(
            COL::RPL_SVM => ["0.8", "", "0.1"],
            COL::RPL_HVM => ["0.9", "0.4", "-999"],
        )?;
        let rows = rows_from_table(
            &df,
            MetricId::SocialVulnerability,
            MetricId::HealthVulnerability,
        )?;
        assert_eq!(
            rows,
            vec![
                AssociationRow::new(Some(0.8), Some(0.9)),
                AssociationRow::new(None, Some(0.4)),
                AssociationRow::new(Some(0.1), Some(-999.0)),
            ]
        );
        Ok(())
    }
}
