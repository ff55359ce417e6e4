use std::sync::Arc;

use log::{debug, warn};

use crate::config::Config;
use crate::dataset::{DatasetLoader, TableRole, YearData};
use crate::error::{EjiError, EjiResult};
use crate::metric::{resolve_available_metrics, MetricId};
use crate::significance::{rows_from_table, test_vulnerability_association};
use crate::snapshot::{Geography, Snapshot};
use crate::view::{AssociationReport, View, ViewMode};

// Re-exports
pub use column_names as COL;

// Modules
pub mod column_names;
pub mod compare;
pub mod config;
pub mod dataset;
pub mod error;
pub mod formatters;
pub mod metric;
pub mod schema;
pub mod significance;
pub mod snapshot;
pub mod stats;
pub mod view;

/// Type for EJI data and the views computed from it
pub struct Ejiview {
    loader: DatasetLoader,
}

impl Ejiview {
    /// Setup the Ejiview object with default configuration
    pub fn new() -> Self {
        Self::new_with_config(Config::default())
    }

    /// Setup the Ejiview object with custom configuration
    pub fn new_with_config(config: Config) -> Self {
        debug!("config: {config:?}");
        Self {
            loader: DatasetLoader::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        self.loader.config()
    }

    /// The state's own summary row, the default selection of a single view.
    pub fn home_state(&self) -> Geography {
        Geography::state(&self.config().state)
    }

    pub async fn load(&self, year: &str) -> EjiResult<Arc<YearData>> {
        self.loader.load(year).await
    }

    pub async fn states(&self, year: &str) -> EjiResult<Vec<String>> {
        self.load(year).await?.states()
    }

    pub async fn counties(&self, year: &str) -> EjiResult<Vec<String>> {
        self.load(year).await?.counties()
    }

    fn select(
        data: &YearData,
        geography: &Geography,
        label: &str,
        metrics: &[MetricId],
    ) -> EjiResult<Snapshot> {
        let table = data.require(geography.role())?;
        Snapshot::select(table, geography, label, metrics)?.ok_or_else(|| {
            let error = EjiError::EmptySelection {
                geography: geography.to_string(),
                year: data.year.clone(),
            };
            warn!("{error}");
            error
        })
    }

    /// Values of one geography in one year.
    pub async fn view(&self, year: &str, geography: &Geography) -> EjiResult<View> {
        let data = self.load(year).await?;
        let metrics = resolve_available_metrics(&[data.require(geography.role())?]);
        let snapshot = Self::select(&data, geography, geography.name(), &metrics)?;
        View::single(
            format!("EJI Metrics: {geography} ({year})"),
            &snapshot,
            &metrics,
            self.config().very_high_threshold,
        )
    }

    /// Two geographies of the same year. Optional metrics are compared only if both of their
    /// tables carry them.
    pub async fn compare_geographies(
        &self,
        year: &str,
        baseline: &Geography,
        comparison: &Geography,
    ) -> EjiResult<View> {
        let data = self.load(year).await?;
        let metrics = resolve_available_metrics(&[
            data.require(baseline.role())?,
            data.require(comparison.role())?,
        ]);
        let baseline_snapshot = Self::select(&data, baseline, baseline.name(), &metrics)?;
        let comparison_snapshot = Self::select(&data, comparison, comparison.name(), &metrics)?;
        View::comparison(
            ViewMode::CrossGeography,
            format!("EJI Metric Comparison: {baseline} vs {comparison} ({year})"),
            &baseline_snapshot,
            &comparison_snapshot,
            &metrics,
            self.config().very_high_threshold,
        )
    }

    /// One geography across two years. Optional metrics are compared only if they are
    /// published in the state and county tables of both years.
    pub async fn compare_years(
        &self,
        geography: &Geography,
        baseline_year: &str,
        comparison_year: &str,
    ) -> EjiResult<View> {
        let (baseline, comparison) = tokio::try_join!(
            self.load(baseline_year),
            self.load(comparison_year)
        )?;
        let metrics = resolve_available_metrics(&[
            &baseline.state,
            &baseline.county,
            &comparison.state,
            &comparison.county,
        ]);
        let baseline_snapshot = Self::select(&baseline, geography, baseline_year, &metrics)?;
        let comparison_snapshot = Self::select(&comparison, geography, comparison_year, &metrics)?;
        View::comparison(
            ViewMode::CrossYear,
            format!("EJI Metrics Comparison for {geography}: {baseline_year} vs {comparison_year}"),
            &baseline_snapshot,
            &comparison_snapshot,
            &metrics,
            self.config().very_high_threshold,
        )
    }

    /// Test whether high `vulnerability` geographies differ in `outcome`. Runs on the tract
    /// table when the year has one carrying both metrics, the county table otherwise.
    pub async fn test_association(
        &self,
        year: &str,
        vulnerability: MetricId,
        outcome: MetricId,
        threshold: Option<f64>,
    ) -> EjiResult<AssociationReport> {
        let data = self.load(year).await?;
        let role = match &data.tract {
            Some(tract)
                if [vulnerability, outcome]
                    .iter()
                    .all(|metric| tract.column(metric.column()).is_ok()) =>
            {
                TableRole::Tract
            }
            _ => TableRole::County,
        };
        let rows = rows_from_table(data.require(role)?, vulnerability, outcome)?;
        let threshold = threshold.unwrap_or(self.config().vulnerability_threshold);
        debug!("Testing {vulnerability} against {outcome} on {} {role} rows", rows.len());
        Ok(AssociationReport {
            year: year.to_string(),
            table: role,
            vulnerability,
            outcome,
            rows: rows.len(),
            result: test_vulnerability_association(&rows, threshold),
        })
    }
}

impl Default for Ejiview {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::compare::Direction;
    use crate::dataset::tests::write_fixtures;
    use crate::significance::{Significance, TestOutcome};

    use super::*;

    fn local_ejiview(dir: &std::path::Path) -> Ejiview {
        Ejiview::new_with_config(Config {
            base_path: dir.to_string_lossy().to_string(),
            ..Config::default()
        })
    }

    #[tokio::test]
    async fn state_view_of_one_year() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let ejiview = local_ejiview(dir.path());

        let view = ejiview.view("2022", &ejiview.home_state()).await.unwrap();
        assert_eq!(view.title, "EJI Metrics: New Mexico (2022)");
        assert_eq!(view.table.metrics().collect::<Vec<_>>(), MetricId::BASE);
        assert_eq!(view.table.rows[0].cells[0].text, "0.400");

        let view = ejiview.view("2024", &ejiview.home_state()).await.unwrap();
        assert_eq!(view.table.headers.len(), 6);
    }

    #[tokio::test]
    async fn year_over_year_change_uses_shared_metrics() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let ejiview = local_ejiview(dir.path());

        let view = ejiview
            .compare_years(&ejiview.home_state(), "2022", "2024")
            .await
            .unwrap();
        assert_eq!(view.mode, ViewMode::CrossYear);
        let deltas = view.deltas.unwrap();
        // Climate metrics are not published in 2022
        assert_eq!(deltas.entries.len(), 4);
        assert!(deltas.get(MetricId::ClimateBurden).is_none());

        let eji = deltas.get(MetricId::OverallIndex).unwrap();
        assert_eq!(eji.formatted(), "+0.150");
        assert_eq!(eji.direction(), Some(Direction::Increased));
        let ebm = deltas.get(MetricId::EnvironmentalBurden).unwrap();
        assert_eq!(ebm.direction(), Some(Direction::NoChange));
        assert_eq!(view.annotations.len(), 3);
    }

    #[tokio::test]
    async fn missing_county_value_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let ejiview = local_ejiview(dir.path());

        let view = ejiview
            .compare_years(&Geography::county("catron"), "2022", "2024")
            .await
            .unwrap();
        let eji = view.deltas.unwrap();
        let eji = eji.get(MetricId::OverallIndex).unwrap();
        assert_eq!(eji.delta, None);
        assert_eq!(eji.cell_text(), "No Data");
        assert_eq!(view.table.rows[0].cells[0].text, "No Data");
        assert!(view
            .annotations
            .iter()
            .all(|a| a.metric != MetricId::OverallIndex));
    }

    #[tokio::test]
    async fn county_against_state() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let ejiview = local_ejiview(dir.path());

        let view = ejiview
            .compare_geographies("2024", &Geography::county("Lea"), &ejiview.home_state())
            .await
            .unwrap();
        assert_eq!(view.mode, ViewMode::CrossGeography);
        assert_eq!(view.table.rows[0].label, "Lea County");
        assert_eq!(view.table.rows[1].label, "New Mexico");
        assert_eq!(view.deltas.unwrap().entries.len(), 6);
        // Lea County is very high on the overall index
        assert!(view.table.rows[0].cells[0].very_high);
        assert!(!view.table.rows[1].cells[0].very_high);
    }

    #[tokio::test]
    async fn unknown_geography_is_an_empty_selection() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let ejiview = local_ejiview(dir.path());

        let error = ejiview
            .view("2022", &Geography::county("Los Alamos"))
            .await
            .unwrap_err();
        assert!(error.is_empty_selection());
        assert_eq!(error.to_string(), "No data found for Los Alamos County in 2022.");
    }

    #[tokio::test]
    async fn association_uses_tracts_when_published() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let ejiview = local_ejiview(dir.path());

        let report = ejiview
            .test_association(
                "2024",
                MetricId::SocialVulnerability,
                MetricId::HealthVulnerability,
                None,
            )
            .await
            .unwrap();
        assert_eq!(report.table, TableRole::Tract);
        assert_eq!(report.rows, 6);
        let TestOutcome::Tested(result) = report.result else {
            panic!("expected a test result");
        };
        assert!((result.high_burden.mean - 0.875).abs() < 1e-12);
        assert!((result.other.mean - 0.25).abs() < 1e-12);
        assert_eq!(result.significance(), Significance::Significant);

        let report = ejiview
            .test_association(
                "2022",
                MetricId::SocialVulnerability,
                MetricId::HealthVulnerability,
                Some(0.9),
            )
            .await
            .unwrap();
        assert_eq!(report.table, TableRole::County);
        assert!(matches!(
            report.result,
            TestOutcome::InsufficientData { high_burden: 0, other: 3 }
        ));
    }

    #[tokio::test]
    async fn association_falls_back_to_counties_for_metrics_tracts_lack() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let ejiview = local_ejiview(dir.path());

        // The 2024 tract table has no environmental burden column
        let report = ejiview
            .test_association(
                "2024",
                MetricId::EnvironmentalBurden,
                MetricId::HealthVulnerability,
                None,
            )
            .await
            .unwrap();
        assert_eq!(report.table, TableRole::County);
        assert_eq!(report.rows, 3);
        let TestOutcome::Tested(result) = report.result else {
            panic!("expected a test result");
        };
        assert_eq!(result.high_burden.count, 1);
        assert_eq!(result.other.count, 2);
    }
}
