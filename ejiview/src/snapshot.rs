//! Selecting one geography out of a loaded table as an immutable [`Snapshot`] of its metric
//! values.

use std::collections::BTreeMap;
use std::fmt::Display;

use itertools::Itertools;
use polars::prelude::{DataFrame, DataType};
use serde::{Deserialize, Serialize};

use crate::dataset::TableRole;
use crate::error::{EjiError, EjiResult};
use crate::metric::MetricId;
use crate::schema::normalize_county_name;
use crate::COL;

/// Cell contents the upstream files use for "no value".
const MISSING_TOKENS: [&str; 6] = ["", "NA", "N/A", "NaN", "nan", "null"];

/// A geography is identified by its display name only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Geography {
    State(String),
    County(String),
}

impl Geography {
    pub fn state(name: &str) -> Self {
        Geography::State(name.trim().to_string())
    }

    /// A county, with its name brought into the same canonical form as the loaded tables.
    pub fn county(name: &str) -> Self {
        Geography::County(normalize_county_name(name))
    }

    pub fn name(&self) -> &str {
        match self {
            Geography::State(name) | Geography::County(name) => name,
        }
    }

    /// Table the geography's row lives in
    pub fn role(&self) -> TableRole {
        match self {
            Geography::State(_) => TableRole::State,
            Geography::County(_) => TableRole::County,
        }
    }

    fn name_column(&self) -> &'static str {
        match self {
            Geography::State(_) => COL::STATE,
            Geography::County(_) => COL::COUNTY,
        }
    }
}

impl Display for Geography {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn parse_cell(column: &str, cell: &str) -> EjiResult<Option<f64>> {
    let cell = cell.trim();
    if MISSING_TOKENS.contains(&cell) {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(|v| (!v.is_nan()).then_some(v))
        .map_err(|_| EjiError::MalformedValue {
            column: column.into(),
            value: cell.into(),
        })
}

/// Values of a column as numbers. Text columns are parsed strictly: a cell that is neither a
/// number nor a missing marker is an error, never coerced. NaN becomes `None`.
pub fn numeric_column(df: &DataFrame, column: &str) -> EjiResult<Vec<Option<f64>>> {
    let series = df
        .column(column)
        .map_err(|_| EjiError::MissingColumn(column.into()))?;
    match series.dtype() {
        DataType::String => series
            .str()?
            .into_iter()
            .map(|cell| match cell {
                Some(cell) => parse_cell(column, cell),
                None => Ok(None),
            })
            .collect(),
        dtype if dtype.is_numeric() => {
            let values = series.cast(&DataType::Float64)?;
            let values = values
                .f64()?
                .into_iter()
                .map(|v| v.filter(|v| !v.is_nan()))
                .collect_vec();
            Ok(values)
        }
        dtype => Err(EjiError::MalformedValue {
            column: column.into(),
            value: format!("<{dtype}>"),
        }),
    }
}

/// Value of a single cell, parsed the same way as [`numeric_column`]. Other rows of the column
/// are not looked at, so a malformed value elsewhere does not affect this one.
pub fn numeric_cell(df: &DataFrame, column: &str, row: usize) -> EjiResult<Option<f64>> {
    let series = df
        .column(column)
        .map_err(|_| EjiError::MissingColumn(column.into()))?;
    match series.dtype() {
        DataType::String => match series.str()?.get(row) {
            Some(cell) => parse_cell(column, cell),
            None => Ok(None),
        },
        dtype if dtype.is_numeric() => {
            let values = series.cast(&DataType::Float64)?;
            let value = values.f64()?.get(row);
            Ok(value.filter(|v| !v.is_nan()))
        }
        dtype => Err(EjiError::MalformedValue {
            column: column.into(),
            value: format!("<{dtype}>"),
        }),
    }
}

/// Index of the row naming `geography`, compared trimmed and case-insensitively.
pub fn find_row(df: &DataFrame, geography: &Geography) -> EjiResult<Option<usize>> {
    let column = geography.name_column();
    let names = df
        .column(column)
        .map_err(|_| EjiError::MissingColumn(column.into()))?
        .str()?;
    let wanted = geography.name().trim().to_lowercase();
    Ok(names
        .into_iter()
        .position(|name| name.is_some_and(|n| n.trim().to_lowercase() == wanted)))
}

/// Sorted, de-duplicated names of the geographies in a table's name column.
pub fn geography_names(df: &DataFrame, column: &str) -> EjiResult<Vec<String>> {
    let names = df
        .column(column)
        .map_err(|_| EjiError::MissingColumn(column.into()))?
        .str()?;
    Ok(names
        .into_iter()
        .flatten()
        .map(str::to_string)
        .sorted()
        .dedup()
        .collect())
}

/// One geography's metric values at one point in time.
///
/// A metric without an entry is treated exactly like one whose value is missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    label: String,
    values: BTreeMap<MetricId, Option<f64>>,
}

impl Snapshot {
    /// Build a snapshot, rejecting percentile values outside [0, 1]. NaN is stored as missing.
    pub fn new<I>(label: &str, values: I) -> EjiResult<Self>
    where
        I: IntoIterator<Item = (MetricId, Option<f64>)>,
    {
        let values = values
            .into_iter()
            .map(|(metric, value)| {
                let value = value.filter(|v| !v.is_nan());
                match value {
                    Some(v) if !(0.0..=1.0).contains(&v) => Err(EjiError::OutOfRange {
                        column: metric.column().into(),
                        value: v,
                    }),
                    _ => Ok((metric, value)),
                }
            })
            .collect::<EjiResult<BTreeMap<_, _>>>()?;
        Ok(Self {
            label: label.into(),
            values,
        })
    }

    /// Snapshot of the row at `row` of a normalized table. Metrics the table has no column for
    /// are left out.
    pub fn from_row<'a>(
        df: &DataFrame,
        row: usize,
        label: &str,
        metrics: impl IntoIterator<Item = &'a MetricId>,
    ) -> EjiResult<Self> {
        let values = metrics
            .into_iter()
            .filter(|metric| df.column(metric.column()).is_ok())
            .map(|metric| Ok((*metric, numeric_cell(df, metric.column(), row)?)))
            .collect::<EjiResult<Vec<_>>>()?;
        Self::new(label, values)
    }

    /// Snapshot of the row naming `geography`, or `None` if the table has no such row.
    pub fn select<'a>(
        df: &DataFrame,
        geography: &Geography,
        label: &str,
        metrics: impl IntoIterator<Item = &'a MetricId>,
    ) -> EjiResult<Option<Self>> {
        find_row(df, geography)?
            .map(|row| Self::from_row(df, row, label, metrics))
            .transpose()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Value of a metric, `None` when missing or not recorded at all.
    pub fn get(&self, metric: MetricId) -> Option<f64> {
        self.values.get(&metric).copied().flatten()
    }

    pub fn has_metric(&self, metric: MetricId) -> bool {
        self.values.contains_key(&metric)
    }

    pub fn metrics(&self) -> impl Iterator<Item = MetricId> + '_ {
        self.values.keys().copied()
    }
}
