//! Render-ready views: value tables with per-cell concern buckets, optionally paired with the
//! deltas of a comparison, plus the other result bundles the crate hands to a renderer.

use itertools::Itertools;
use polars::df;
use polars::prelude::*;
use serde::Serialize;
use strum::IntoEnumIterator;

use crate::compare::{compute_deltas, Annotation, DeltaReport, NO_DATA};
use crate::dataset::TableRole;
use crate::error::EjiResult;
use crate::metric::{classify, is_very_high, ConcernBucket, MetricId, Side};
use crate::significance::TestOutcome;
use crate::snapshot::Snapshot;

/// Name of the first column of tabular outputs.
pub const LABEL_COLUMN: &str = "Label";
/// Label of the row holding the deltas of a comparison.
pub const DIFFERENCE_ROW: &str = "Difference";

/// Black or white, whichever reads better on the given background.
pub fn contrast_text_color(hex: &str) -> &'static str {
    let channel = |i: usize| {
        hex.trim_start_matches('#')
            .get(i..i + 2)
            .and_then(|c| u8::from_str_radix(c, 16).ok())
    };
    match (channel(0), channel(2), channel(4)) {
        (Some(r), Some(g), Some(b)) => {
            let brightness = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
            if brightness > 150.0 {
                "black"
            } else {
                "white"
            }
        }
        _ => "black",
    }
}

pub fn format_value(value: Option<f64>) -> String {
    value.map_or_else(|| NO_DATA.to_string(), |v| format!("{v:.3}"))
}

/// Column header of a metric, colored with the metric's baseline palette.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderCell {
    pub metric: MetricId,
    pub label: &'static str,
    pub background: &'static str,
    pub text_color: &'static str,
}

impl HeaderCell {
    fn new(metric: MetricId) -> Self {
        let background = metric.color(Side::Baseline);
        Self {
            metric,
            label: metric.label(),
            background,
            text_color: contrast_text_color(background),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCell {
    pub metric: MetricId,
    pub value: Option<f64>,
    pub text: String,
    pub bucket: Option<ConcernBucket>,
    /// Highlighted on its own, never the whole row.
    pub very_high: bool,
}

impl ValueCell {
    fn new(metric: MetricId, value: Option<f64>, threshold: f64) -> EjiResult<Self> {
        Ok(Self {
            metric,
            value,
            text: format_value(value),
            bucket: classify(value)?,
            very_high: is_very_high(value, threshold),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueRow {
    pub label: String,
    pub cells: Vec<ValueCell>,
}

/// One row per snapshot, one column per metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueTable {
    pub headers: Vec<HeaderCell>,
    pub rows: Vec<ValueRow>,
}

impl ValueTable {
    pub fn build(snapshots: &[&Snapshot], metrics: &[MetricId], threshold: f64) -> EjiResult<Self> {
        let rows = snapshots
            .iter()
            .map(|snapshot| {
                let cells = metrics
                    .iter()
                    .map(|&metric| ValueCell::new(metric, snapshot.get(metric), threshold))
                    .collect::<EjiResult<Vec<_>>>()?;
                Ok(ValueRow {
                    label: snapshot.label().to_string(),
                    cells,
                })
            })
            .collect::<EjiResult<Vec<_>>>()?;
        Ok(Self {
            headers: metrics.iter().copied().map(HeaderCell::new).collect(),
            rows,
        })
    }

    pub fn metrics(&self) -> impl Iterator<Item = MetricId> + '_ {
        self.headers.iter().map(|h| h.metric)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViewMode {
    Single,
    CrossGeography,
    CrossYear,
}

/// Everything a renderer needs for one selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct View {
    pub mode: ViewMode,
    pub title: String,
    pub table: ValueTable,
    pub deltas: Option<DeltaReport>,
    pub annotations: Vec<Annotation>,
}

impl View {
    pub fn single(title: String, snapshot: &Snapshot, metrics: &[MetricId], threshold: f64) -> EjiResult<Self> {
        Ok(Self {
            mode: ViewMode::Single,
            title,
            table: ValueTable::build(&[snapshot], metrics, threshold)?,
            deltas: None,
            annotations: vec![],
        })
    }

    /// A two-snapshot view. Both modes share the same delta computation, only the title and
    /// the snapshot labels differ.
    pub fn comparison(
        mode: ViewMode,
        title: String,
        baseline: &Snapshot,
        comparison: &Snapshot,
        metrics: &[MetricId],
        threshold: f64,
    ) -> EjiResult<Self> {
        let deltas = compute_deltas(baseline, comparison, metrics);
        Ok(Self {
            mode,
            title,
            table: ValueTable::build(&[baseline, comparison], metrics, threshold)?,
            annotations: deltas.annotations(),
            deltas: Some(deltas),
        })
    }

    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut labels = self.table.rows.iter().map(|r| r.label.clone()).collect_vec();
        if self.deltas.is_some() {
            labels.push(DIFFERENCE_ROW.to_string());
        }
        let mut columns = vec![Series::new(LABEL_COLUMN, labels)];
        for (i, metric) in self.table.metrics().enumerate() {
            let mut values = self
                .table
                .rows
                .iter()
                .map(|row| row.cells[i].text.clone())
                .collect_vec();
            if let Some(deltas) = &self.deltas {
                values.push(
                    deltas
                        .get(metric)
                        .map_or_else(|| NO_DATA.to_string(), |e| e.formatted()),
                );
            }
            columns.push(Series::new(metric.column(), values));
        }
        DataFrame::new(columns)
    }
}

/// The significance test together with what it was run on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssociationReport {
    pub year: String,
    pub table: TableRole,
    pub vulnerability: MetricId,
    pub outcome: MetricId,
    pub rows: usize,
    pub result: TestOutcome,
}

impl AssociationReport {
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let (high_n, other_n, high_mean, other_mean, statistic, dof, p_value, verdict) =
            match &self.result {
                TestOutcome::Tested(r) => (
                    r.high_burden.count as u32,
                    r.other.count as u32,
                    Some(r.high_burden.mean),
                    Some(r.other.mean),
                    Some(r.statistic),
                    Some(r.degrees_of_freedom),
                    Some(r.p_value),
                    r.significance().label().to_string(),
                ),
                TestOutcome::InsufficientData { high_burden, other } => (
                    *high_burden as u32,
                    *other as u32,
                    None,
                    None,
                    None,
                    None,
                    None,
                    "insufficient data".to_string(),
                ),
            };
        df!(
            "year" => [self.year.as_str()],
            "table" => [self.table.to_string()],
            "vulnerability" => [self.vulnerability.column()],
            "outcome" => [self.outcome.column()],
            "high_burden_n" => [high_n],
            "other_n" => [other_n],
            "high_burden_mean" => [high_mean],
            "other_mean" => [other_mean],
            "t_statistic" => [statistic],
            "degrees_of_freedom" => [dof],
            "p_value" => [p_value],
            "interpretation" => [verdict],
        )
    }
}

/// One line of the published concern scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleEntry {
    pub bucket: ConcernBucket,
    pub label: &'static str,
    pub range: &'static str,
    pub color_name: &'static str,
    pub color: &'static str,
    pub description: &'static str,
}

pub fn concern_scale() -> Vec<ScaleEntry> {
    ConcernBucket::iter()
        .map(|bucket| ScaleEntry {
            bucket,
            label: bucket.label(),
            range: bucket.range_text(),
            color_name: bucket.color_name(),
            color: bucket.color(),
            description: bucket.description(),
        })
        .collect()
}

/// Anything the crate can hand to an output formatter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Report {
    View(View),
    Association(AssociationReport),
    Scale(Vec<ScaleEntry>),
    Names(Vec<String>),
}

impl Report {
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        match self {
            Report::View(view) => view.to_dataframe(),
            Report::Association(report) => report.to_dataframe(),
            Report::Scale(entries) => df!(
                "category" => entries.iter().map(|e| e.label).collect_vec(),
                "range" => entries.iter().map(|e| e.range).collect_vec(),
                "color" => entries.iter().map(|e| e.color_name).collect_vec(),
                "hex" => entries.iter().map(|e| e.color).collect_vec(),
                "description" => entries.iter().map(|e| e.description).collect_vec(),
            ),
            Report::Names(names) => df!("name" => names),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::significance::{test_vulnerability_association, AssociationRow};
    use crate::COL;

    fn snapshot(label: &str, values: &[(MetricId, Option<f64>)]) -> Snapshot {
        Snapshot::new(label, values.iter().copied()).unwrap()
    }

    #[test]
    fn cells_carry_bucket_and_very_high_flag() {
        let s = snapshot(
            "Lea County",
            &[
                (MetricId::OverallIndex, Some(0.76)),
                (MetricId::EnvironmentalBurden, Some(0.755)),
                (MetricId::SocialVulnerability, None),
            ],
        );
        let view = View::single("t".into(), &s, &MetricId::BASE, 0.76).unwrap();
        let cells = &view.table.rows[0].cells;
        assert_eq!(cells.len(), 4);
        assert_eq!(cells[0].bucket, Some(ConcernBucket::VeryHigh));
        assert!(cells[0].very_high);
        // Very high bucket, but below the highlight threshold
        assert_eq!(cells[1].bucket, Some(ConcernBucket::VeryHigh));
        assert!(!cells[1].very_high);
        assert_eq!(cells[1].text, "0.755");
        assert_eq!(cells[2].text, NO_DATA);
        assert_eq!(cells[2].bucket, None);
        // Not recorded at all
        assert_eq!(cells[3].text, NO_DATA);
        assert!(view.deltas.is_none());
        assert!(view.annotations.is_empty());
    }

    #[test]
    fn comparison_table_has_difference_row() {
        let a = snapshot(
            "2022",
            &[
                (MetricId::OverallIndex, Some(0.40)),
                (MetricId::EnvironmentalBurden, Some(0.30)),
            ],
        );
        let b = snapshot(
            "2024",
            &[
                (MetricId::OverallIndex, Some(0.55)),
                (MetricId::EnvironmentalBurden, Some(0.30)),
            ],
        );
        let metrics = [MetricId::OverallIndex, MetricId::EnvironmentalBurden];
        let view = View::comparison(ViewMode::CrossYear, "t".into(), &a, &b, &metrics, 0.76).unwrap();
        assert_eq!(view.annotations.len(), 1);

        let df = view.to_dataframe().unwrap();
        assert_eq!(df.shape(), (3, 3));
        let labels = df.column(LABEL_COLUMN).unwrap().str().unwrap();
        assert_eq!(labels.get(2), Some(DIFFERENCE_ROW));
        let eji = df.column(COL::RPL_EJI).unwrap().str().unwrap();
        assert_eq!(eji.get(0), Some("0.400"));
        assert_eq!(eji.get(2), Some("+0.150"));
        let ebm = df.column(COL::RPL_EBM).unwrap().str().unwrap();
        assert_eq!(ebm.get(2), Some("+0.000"));
    }

    #[test]
    fn headers_use_readable_text_colors() {
        assert_eq!(contrast_text_color("#911eb4"), "white");
        assert_eq!(contrast_text_color("#D2B48C"), "black");
        assert_eq!(contrast_text_color("garbage"), "black");
        let header = HeaderCell::new(MetricId::HealthVulnerability);
        assert_eq!(header.label, "Health Vulnerability");
        assert_eq!(header.background, "#f032e6");
    }

    #[test]
    fn reports_convert_to_frames() {
        let rows = [
            AssociationRow::new(Some(0.8), Some(0.9)),
            AssociationRow::new(Some(0.8), Some(0.85)),
            AssociationRow::new(Some(0.1), Some(0.2)),
            AssociationRow::new(Some(0.2), Some(0.3)),
        ];
        let report = Report::Association(AssociationReport {
            year: "2024".into(),
            table: TableRole::Tract,
            vulnerability: MetricId::SocialVulnerability,
            outcome: MetricId::HealthVulnerability,
            rows: rows.len(),
            result: test_vulnerability_association(&rows, 0.75),
        });
        let df = report.to_dataframe().unwrap();
        assert_eq!(df.height(), 1);
        let verdict = df.column("interpretation").unwrap().str().unwrap();
        assert_eq!(verdict.get(0), Some("statistically significant"));

        let scale = Report::Scale(concern_scale()).to_dataframe().unwrap();
        assert_eq!(scale.height(), 4);
        let hex = scale.column("hex").unwrap().str().unwrap();
        assert_eq!(hex.get(3), Some("#ffb3b3"));

        let names = Report::Names(vec!["Lea County".into()]).to_dataframe().unwrap();
        assert_eq!(names.shape(), (1, 1));
    }
}
