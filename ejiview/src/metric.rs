//! The fixed metric vocabulary of the index, its display labels and palettes, and the
//! concern buckets used to color-code percentile ranks.

use std::fmt::Display;

use polars::frame::DataFrame;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, EnumString};

use crate::error::{EjiError, EjiResult};
use crate::COL;

/// Percentile at or above which a single cell is flagged as very high concern.
pub const VERY_HIGH_THRESHOLD: f64 = 0.76;

/// Recognized indicator columns, in display order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum MetricId {
    #[strum(serialize = "eji", serialize = "RPL_EJI")]
    OverallIndex,
    #[strum(serialize = "ebm", serialize = "RPL_EBM")]
    EnvironmentalBurden,
    #[strum(serialize = "svm", serialize = "RPL_SVM")]
    SocialVulnerability,
    #[strum(serialize = "hvm", serialize = "RPL_HVM")]
    HealthVulnerability,
    #[strum(serialize = "cbm", serialize = "RPL_CBM")]
    ClimateBurden,
    #[strum(serialize = "eji_cbm", serialize = "RPL_EJI_CBM")]
    IndexPlusClimateBurden,
}

/// Which side of a comparison a value is drawn for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Baseline,
    Comparison,
}

impl MetricId {
    /// Metrics published in every release.
    pub const BASE: [MetricId; 4] = [
        MetricId::OverallIndex,
        MetricId::EnvironmentalBurden,
        MetricId::SocialVulnerability,
        MetricId::HealthVulnerability,
    ];

    /// Metrics only published from the 2024 release onwards.
    pub const OPTIONAL: [MetricId; 2] = [MetricId::ClimateBurden, MetricId::IndexPlusClimateBurden];

    /// Canonical column name after normalization
    pub fn column(&self) -> &'static str {
        match self {
            MetricId::OverallIndex => COL::RPL_EJI,
            MetricId::EnvironmentalBurden => COL::RPL_EBM,
            MetricId::SocialVulnerability => COL::RPL_SVM,
            MetricId::HealthVulnerability => COL::RPL_HVM,
            MetricId::ClimateBurden => COL::RPL_CBM,
            MetricId::IndexPlusClimateBurden => COL::RPL_EJI_CBM,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MetricId::OverallIndex => "Overall EJI",
            MetricId::EnvironmentalBurden => "Environmental Burden",
            MetricId::SocialVulnerability => "Social Vulnerability",
            MetricId::HealthVulnerability => "Health Vulnerability",
            MetricId::ClimateBurden => "Climate Burden",
            MetricId::IndexPlusClimateBurden => "EJI + Climate Burden",
        }
    }

    pub fn is_optional(&self) -> bool {
        Self::OPTIONAL.contains(self)
    }

    /// Bar color of this metric. The baseline side is drawn darker than the comparison side.
    pub fn color(&self, side: Side) -> &'static str {
        let (baseline, comparison) = match self {
            MetricId::OverallIndex => ("#911eb4", "#b88be1"),
            MetricId::EnvironmentalBurden => ("#c55c29", "#D2B48C"),
            MetricId::SocialVulnerability => ("#4363d8", "#87a1e5"),
            MetricId::HealthVulnerability => ("#f032e6", "#f79be9"),
            MetricId::ClimateBurden => ("#469990", "#94c9c4"),
            MetricId::IndexPlusClimateBurden => ("#801650", "#f17cb0"),
        };
        match side {
            Side::Baseline => baseline,
            Side::Comparison => comparison,
        }
    }

    pub fn from_column(column: &str) -> Option<Self> {
        Self::iter().find(|metric| metric.column() == column)
    }
}

impl Display for MetricId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column())
    }
}

fn has_column(df: &DataFrame, column: &str) -> bool {
    df.column(column).is_ok()
}

/// Metrics usable for a view built from `tables`: the base metrics always, and each optional
/// metric only if every table has a column for it. Nothing is imputed for a table that lacks a
/// metric. With no tables only the base metrics are returned.
pub fn resolve_available_metrics(tables: &[&DataFrame]) -> Vec<MetricId> {
    let mut metrics = MetricId::BASE.to_vec();
    if tables.is_empty() {
        return metrics;
    }
    for metric in MetricId::OPTIONAL {
        if tables.iter().all(|df| has_column(df, metric.column())) {
            metrics.push(metric);
        }
    }
    metrics
}

/// Display categories of a percentile rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, EnumIter)]
pub enum ConcernBucket {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl ConcernBucket {
    /// Inclusive upper bound of the bucket. Each bucket's lower bound is exclusive, except for
    /// `Low` which starts at 0.
    pub fn upper_bound(&self) -> f64 {
        match self {
            ConcernBucket::Low => 0.25,
            ConcernBucket::Moderate => 0.50,
            ConcernBucket::High => 0.75,
            ConcernBucket::VeryHigh => 1.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConcernBucket::Low => "Low Concern",
            ConcernBucket::Moderate => "Moderate Concern",
            ConcernBucket::High => "High Concern",
            ConcernBucket::VeryHigh => "Very High Concern",
        }
    }

    pub fn color_name(&self) -> &'static str {
        match self {
            ConcernBucket::Low => "Green",
            ConcernBucket::Moderate => "Yellow",
            ConcernBucket::High => "Orange",
            ConcernBucket::VeryHigh => "Red",
        }
    }

    /// Background swatch used for the bucket
    pub fn color(&self) -> &'static str {
        match self {
            ConcernBucket::Low => "#d4f9d4",
            ConcernBucket::Moderate => "#fffcc2",
            ConcernBucket::High => "#ffd9b3",
            ConcernBucket::VeryHigh => "#ffb3b3",
        }
    }

    /// Percentile range as printed on the published scale.
    pub fn range_text(&self) -> &'static str {
        match self {
            ConcernBucket::Low => "0.00 – 0.25",
            ConcernBucket::Moderate => "0.26 – 0.50",
            ConcernBucket::High => "0.51 – 0.75",
            ConcernBucket::VeryHigh => "0.76 – 1.00",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConcernBucket::Low => {
                "Communities with the lowest combined environmental, social, and health burdens."
            }
            ConcernBucket::Moderate => {
                "Communities experiencing moderate cumulative burdens or vulnerabilities."
            }
            ConcernBucket::High => {
                "Communities facing substantial cumulative burdens and vulnerabilities."
            }
            ConcernBucket::VeryHigh => {
                "Communities with the highest combined environmental, social, and health burdens."
            }
        }
    }
}

/// Bucket of a percentile rank. Missing and NaN values have no bucket; values outside [0, 1]
/// are an upstream data defect and are reported rather than clamped.
pub fn classify(value: Option<f64>) -> EjiResult<Option<ConcernBucket>> {
    let Some(value) = value.filter(|v| !v.is_nan()) else {
        return Ok(None);
    };
    if !(0.0..=1.0).contains(&value) {
        return Err(EjiError::OutOfRange {
            column: "percentile".into(),
            value,
        });
    }
    Ok(ConcernBucket::iter().find(|bucket| value <= bucket.upper_bound()))
}

pub fn is_very_high(value: Option<f64>, threshold: f64) -> bool {
    value.is_some_and(|v| v >= threshold)
}
