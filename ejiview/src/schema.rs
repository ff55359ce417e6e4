//! Normalization of the source tables onto the canonical column vocabulary.
//!
//! The published files name their metric columns differently depending on the release and the
//! table: summary tables of some years use `Mean_EJI`, tract tables use `RPL_THEME_SVM`, and the
//! rest already use the canonical `RPL_EJI`. The naming scheme is detected once per table when it
//! is loaded, and the matching [`SourceSchema`] renames its columns.

use enum_dispatch::enum_dispatch;
use itertools::Itertools;
use log::debug;
use polars::error::PolarsResult;
use polars::prelude::{DataFrame, NamedFrom, Series};
use serde::{Deserialize, Serialize};

use crate::metric::MetricId;
use crate::COL;

const COUNTY_SUFFIX: &str = "County";

#[enum_dispatch]
pub trait Normalize {
    fn normalize(&self, df: DataFrame) -> PolarsResult<DataFrame>;
}

#[enum_dispatch(Normalize)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceSchema {
    Canonical(CanonicalSchema),
    MeanPrefixed(MeanPrefixedSchema),
    ThemePrefixed(ThemePrefixedSchema),
}

/// Tables whose metric columns already use the `RPL_` names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CanonicalSchema;

/// Summary tables naming their metrics `Mean_<code>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MeanPrefixedSchema;

/// Tract tables naming their metrics `RPL_THEME_<code>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ThemePrefixedSchema;

/// Source column name of a metric under a prefixed scheme, e.g. `Mean_EJI_CBM`.
fn source_column(prefix: &str, metric: MetricId) -> String {
    let code = metric
        .column()
        .strip_prefix(COL::RANK_PREFIX)
        .unwrap_or(metric.column());
    format!("{prefix}{code}")
}

fn rename_prefixed(mut df: DataFrame, prefix: &str) -> PolarsResult<DataFrame> {
    for metric in MetricId::BASE.into_iter().chain(MetricId::OPTIONAL) {
        let source = source_column(prefix, metric);
        // A table carrying both spellings keeps its canonical column
        if df.column(&source).is_ok() && df.column(metric.column()).is_err() {
            debug!("Renaming column {source} to {}", metric.column());
            df.rename(&source, metric.column())?;
        }
    }
    Ok(df)
}

impl Normalize for CanonicalSchema {
    fn normalize(&self, df: DataFrame) -> PolarsResult<DataFrame> {
        Ok(df)
    }
}

impl Normalize for MeanPrefixedSchema {
    fn normalize(&self, df: DataFrame) -> PolarsResult<DataFrame> {
        rename_prefixed(df, COL::MEAN_PREFIX)
    }
}

impl Normalize for ThemePrefixedSchema {
    fn normalize(&self, df: DataFrame) -> PolarsResult<DataFrame> {
        rename_prefixed(df, COL::THEME_PREFIX)
    }
}

impl SourceSchema {
    /// Choose the naming scheme from the columns a table actually has.
    pub fn detect(df: &DataFrame) -> Self {
        let columns = df.get_column_names();
        if columns.iter().any(|c| c.starts_with(COL::MEAN_PREFIX)) {
            SourceSchema::MeanPrefixed(MeanPrefixedSchema)
        } else if columns.iter().any(|c| c.starts_with(COL::THEME_PREFIX)) {
            SourceSchema::ThemePrefixed(ThemePrefixedSchema)
        } else {
            SourceSchema::Canonical(CanonicalSchema)
        }
    }
}

/// Upper-case the first letter of every alphabetic run and lower-case the rest, the way
/// title-casing treats `doña ana` or `MCKINLEY`.
fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut previous_is_letter = false;
    for c in value.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            out.push(c);
            previous_is_letter = false;
        }
    }
    out
}

/// Canonical county name: trimmed, title-cased and always ending in "County".
pub fn normalize_county_name(name: &str) -> String {
    let name = title_case(name.trim());
    if name.to_lowercase().ends_with("county") {
        name
    } else {
        format!("{name} {COUNTY_SUFFIX}")
    }
}

/// Rewrite the geography name columns in place: county names are canonicalized and state names
/// trimmed, so tables from different releases can be joined on name.
pub fn normalize_geography_names(mut df: DataFrame) -> PolarsResult<DataFrame> {
    if df.column(COL::COUNTY).is_ok() {
        let names = df
            .column(COL::COUNTY)?
            .str()?
            .into_iter()
            .map(|name| name.map(normalize_county_name))
            .collect_vec();
        df.with_column(Series::new(COL::COUNTY, names))?;
    }
    if df.column(COL::STATE).is_ok() {
        let names = df
            .column(COL::STATE)?
            .str()?
            .into_iter()
            .map(|name| name.map(|n| n.trim().to_string()))
            .collect_vec();
        df.with_column(Series::new(COL::STATE, names))?;
    }
    Ok(df)
}

/// Detect the naming scheme of a freshly loaded table and bring it onto the canonical columns
/// and geography names.
pub fn normalize_table(df: DataFrame) -> PolarsResult<DataFrame> {
    let schema = SourceSchema::detect(&df);
    debug!("Detected source schema: {schema:?}");
    normalize_geography_names(schema.normalize(df)?)
}
