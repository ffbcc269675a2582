//! Reshapes query results into a chart description for the browser.
//!
//! Everything here is pure: the same readings and settings always produce the
//! same [`ChartSpec`].

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::Config;
use crate::queries::Reading;

const TITLE_PREFIX: &str = "Black carbon readings";

/// Plotly's default qualitative palette.
const DEFAULT_PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Point {
    pub time: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Series {
    pub name: String,
    /// Sorted by time, ascending
    pub points: Vec<Point>,
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    Date,
    Linear,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RangeSlider {
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Axis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: AxisKind,
    pub autorange: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_slider: Option<RangeSlider>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LegendPosition {
    Below,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Legend {
    pub position: LegendPosition,
    pub horizontal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ChartSpec {
    pub title: String,
    pub x_axis: Axis,
    pub y_axis: Axis,
    pub legend: Legend,
    pub series: Vec<Series>,
    pub display_mode_bar: bool,
}

/// Name to color lookup with a deterministic fallback for unknown names.
#[derive(Debug, Clone, Default)]
pub struct SeriesColors {
    table: BTreeMap<String, String>,
}

impl SeriesColors {
    #[must_use]
    pub fn new(table: BTreeMap<String, String>) -> Self {
        Self { table }
    }

    /// Configured color for `name`, or a palette entry picked by a stable hash
    /// of the name. Never fails.
    #[must_use]
    pub fn color_for(&self, name: &str) -> &str {
        if let Some(color) = self.table.get(name) {
            return color;
        }
        let idx = (fnv1a(name.as_bytes()) as usize) % DEFAULT_PALETTE.len();
        DEFAULT_PALETTE[idx]
    }
}

// FNV-1a, 32 bit. std's hasher is randomly seeded per process.
fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811c_9dc5_u32, |hash, &b| {
        (hash ^ u32::from(b)).wrapping_mul(0x0100_0193)
    })
}

#[derive(Debug, Clone)]
pub struct ChartSettings {
    pub y_axis_label: String,
    pub colors: SeriesColors,
}

impl ChartSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            y_axis_label: config.chart_y_axis_label.clone(),
            colors: SeriesColors::new(config.series_colors.clone()),
        }
    }
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            y_axis_label: crate::config::DEFAULT_Y_AXIS_LABEL.to_string(),
            colors: SeriesColors::default(),
        }
    }
}

#[must_use]
pub fn chart_title(start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "{TITLE_PREFIX}, {} to {}",
        start.format("%b %-d, %Y"),
        end.format("%b %-d, %Y")
    )
}

/// Group readings by resolved site name and wrap them in a chart.
///
/// Sites that share a name are merged into one series; this keeps the
/// long-standing group-by-name behaviour of the dashboard even though it can
/// fold distinct sensors together. Series appear in order of first appearance
/// and each series is stably sorted by time.
#[must_use]
pub fn build_chart(
    readings: &[Reading],
    site_names: &HashMap<i32, String>,
    start: NaiveDate,
    end: NaiveDate,
    settings: &ChartSettings,
) -> ChartSpec {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Point>> = HashMap::new();

    for reading in readings {
        let Some(time) = DateTime::from_timestamp(reading.time, 0) else {
            tracing::warn!(
                site_id = reading.site_id,
                time = reading.time,
                "Skipping unrepresentable timestamp"
            );
            continue;
        };
        let name = site_names
            .get(&reading.site_id)
            .cloned()
            .unwrap_or_else(|| format!("Site {}", reading.site_id));

        groups
            .entry(name)
            .or_insert_with_key(|name| {
                order.push(name.clone());
                Vec::new()
            })
            .push(Point {
                time,
                value: reading.value,
            });
    }

    let series = order
        .into_iter()
        .map(|name| {
            let mut points = groups.remove(&name).unwrap_or_default();
            points.sort_by_key(|p| p.time);
            let color = settings.colors.color_for(&name).to_string();
            Series {
                name,
                points,
                color,
            }
        })
        .collect();

    ChartSpec {
        title: chart_title(start, end),
        x_axis: Axis {
            title: None,
            kind: AxisKind::Date,
            autorange: true,
            range_slider: Some(RangeSlider { visible: true }),
        },
        y_axis: Axis {
            title: Some(settings.y_axis_label.clone()),
            kind: AxisKind::Linear,
            autorange: true,
            range_slider: None,
        },
        legend: Legend {
            position: LegendPosition::Below,
            horizontal: true,
        },
        series,
        display_mode_bar: false,
    }
}
