//! This module stores the column names used by the EJI source tables, both the canonical names
//! every table is normalized onto and the prefixes of the other naming schemes seen in the
//! published files.

pub const STATE: &str = "State";
pub const COUNTY: &str = "County";
pub const GEOID: &str = "GEOID";
pub const TRACT_FIPS: &str = "TRACT_FIPS";

pub const RPL_EJI: &str = "RPL_EJI";
pub const RPL_EBM: &str = "RPL_EBM";
pub const RPL_SVM: &str = "RPL_SVM";
pub const RPL_HVM: &str = "RPL_HVM";
pub const RPL_CBM: &str = "RPL_CBM";
pub const RPL_EJI_CBM: &str = "RPL_EJI_CBM";

/// Canonical prefix of every metric column.
pub const RANK_PREFIX: &str = "RPL_";
/// Prefix used by the state averages and county means of some years, e.g. `Mean_EJI`.
pub const MEAN_PREFIX: &str = "Mean_";
/// Prefix used by the raw tract tables of some years, e.g. `RPL_THEME_SVM`.
pub const THEME_PREFIX: &str = "RPL_THEME_";
