//! The delta engine: per-metric differences between a baseline and a comparison snapshot,
//! their classification, and the arrow annotations a chart draws for them.
//!
//! Lower index values are always better, so a positive delta means the burden increased.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::metric::MetricId;
use crate::snapshot::Snapshot;

/// Text shown wherever a value or delta is missing.
pub const NO_DATA: &str = "No Data";

/// Horizontal offset of an arrow from its category center.
const ARROW_OFFSET: f64 = 0.1;
/// Additional horizontal offset of an arrow's label from the arrow.
const LABEL_OFFSET: f64 = 0.15;
/// Vertical lift of an arrow's label above the arrow's midpoint.
const LABEL_LIFT: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// The burden increased.
    Increased,
    /// The burden decreased.
    Decreased,
    NoChange,
}

impl Direction {
    pub fn glyph(&self) -> &'static str {
        match self {
            Direction::Increased => "↑",
            Direction::Decreased => "↓",
            Direction::NoChange => "",
        }
    }

    pub fn color(&self) -> Option<DeltaColor> {
        match self {
            Direction::Increased => Some(DeltaColor::Worse),
            Direction::Decreased => Some(DeltaColor::Better),
            Direction::NoChange => None,
        }
    }
}

/// The two colors a delta can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeltaColor {
    Worse,
    Better,
}

impl DeltaColor {
    /// Color of the arrow and its label
    pub fn token(&self) -> &'static str {
        match self {
            DeltaColor::Worse => "red",
            DeltaColor::Better => "lime",
        }
    }

    /// Background of the table cell holding the delta
    pub fn cell_background(&self) -> &'static str {
        match self {
            DeltaColor::Worse => "#ffcccc",
            DeltaColor::Better => "#ccffcc",
        }
    }
}

/// The delta of one metric. `delta` is `None` when either side is missing.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaEntry {
    pub metric: MetricId,
    pub baseline: Option<f64>,
    pub comparison: Option<f64>,
    pub delta: Option<f64>,
}

impl DeltaEntry {
    fn new(metric: MetricId, baseline: Option<f64>, comparison: Option<f64>) -> Self {
        let delta = baseline.zip(comparison).map(|(b, c)| c - b);
        Self {
            metric,
            baseline,
            comparison,
            delta,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        self.delta.map(|d| {
            if d > 0.0 {
                Direction::Increased
            } else if d < 0.0 {
                Direction::Decreased
            } else {
                Direction::NoChange
            }
        })
    }

    pub fn color(&self) -> Option<DeltaColor> {
        self.direction().and_then(|d| d.color())
    }

    /// Sign-prefixed delta such as `+0.045`, or "No Data".
    pub fn formatted(&self) -> String {
        match self.delta {
            Some(d) => format!("{d:+.3}"),
            None => NO_DATA.to_string(),
        }
    }

    /// Table cell text: the formatted delta followed by its direction glyph.
    pub fn cell_text(&self) -> String {
        match self.direction() {
            Some(direction) => format!("{} {}", self.formatted(), direction.glyph())
                .trim_end()
                .to_string(),
            None => NO_DATA.to_string(),
        }
    }
}

// Raw values followed by the presentation derived from them.
impl Serialize for DeltaEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let direction = self.direction();
        let color = self.color();
        let mut state = serializer.serialize_struct("DeltaEntry", 10)?;
        state.serialize_field("metric", &self.metric)?;
        state.serialize_field("baseline", &self.baseline)?;
        state.serialize_field("comparison", &self.comparison)?;
        state.serialize_field("delta", &self.delta)?;
        state.serialize_field("direction", &direction)?;
        state.serialize_field("glyph", direction.map_or("", |d| d.glyph()))?;
        state.serialize_field("formatted", &self.formatted())?;
        state.serialize_field("cell_text", &self.cell_text())?;
        state.serialize_field("color", &color.map(|c| c.token()))?;
        state.serialize_field("cell_background", &color.map(|c| c.cell_background()))?;
        state.end()
    }
}

/// An arrow from the baseline value to the comparison value of one metric, placed beside the
/// metric's bar group at category `position`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub metric: MetricId,
    pub position: usize,
    pub arrow_x: f64,
    pub from_y: f64,
    pub to_y: f64,
    pub label_x: f64,
    pub label_y: f64,
    pub text: String,
    pub color: DeltaColor,
}

/// Deltas for every requested metric, in the requested order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaReport {
    pub baseline: String,
    pub comparison: String,
    pub entries: Vec<DeltaEntry>,
}

impl DeltaReport {
    pub fn get(&self, metric: MetricId) -> Option<&DeltaEntry> {
        self.entries.iter().find(|e| e.metric == metric)
    }

    /// Chart annotations. Missing and zero deltas have none.
    pub fn annotations(&self) -> Vec<Annotation> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(position, entry)| {
                let (from_y, to_y) = entry.baseline.zip(entry.comparison)?;
                let direction = entry.direction()?;
                let color = direction.color()?;
                // Increases are drawn left of the category center, decreases right of it
                let side = match direction {
                    Direction::Increased => -1.0,
                    _ => 1.0,
                };
                let center = position as f64;
                Some(Annotation {
                    metric: entry.metric,
                    position,
                    arrow_x: center + side * ARROW_OFFSET,
                    from_y,
                    to_y,
                    label_x: center + side * (ARROW_OFFSET + LABEL_OFFSET),
                    label_y: (from_y + to_y) / 2.0 + LABEL_LIFT,
                    text: entry.cell_text(),
                    color,
                })
            })
            .collect()
    }
}

/// Compare two snapshots metric by metric. `metrics` is the set available to both sides,
/// resolved by the caller; a metric either snapshot lacks yields a missing delta rather than
/// an error.
pub fn compute_deltas(baseline: &Snapshot, comparison: &Snapshot, metrics: &[MetricId]) -> DeltaReport {
    let entries = metrics
        .iter()
        .map(|&metric| DeltaEntry::new(metric, baseline.get(metric), comparison.get(metric)))
        .collect();
    DeltaReport {
        baseline: baseline.label().to_string(),
        comparison: comparison.label().to_string(),
        entries,
    }
}
