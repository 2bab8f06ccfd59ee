use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::ops::Range;

use crate::classify::ContentKind;

/// Recovered, not-yet-validated datasets keyed by dataset id.
/// Insertion order follows scan order; a later insert replaces the value in place.
pub type DatasetMap = IndexMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArtifactType {
    #[serde(alias = "table", alias = "Table")]
    Table,
    #[serde(alias = "chart", alias = "Chart")]
    Chart,
    #[serde(alias = "report", alias = "Report")]
    Report,
    #[serde(alias = "document", alias = "Document", alias = "HTML", alias = "html")]
    Document,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Table => "TABLE",
            ArtifactType::Chart => "CHART",
            ArtifactType::Report => "REPORT",
            ArtifactType::Document => "DOCUMENT",
        }
    }
}

/// A normalized, renderable unit of output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "type")]
    pub artifact_type: ArtifactType,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Map<String, Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Artifact {
    pub fn new(artifact_type: ArtifactType, title: impl Into<String>) -> Self {
        Self {
            id: None,
            artifact_type,
            title: title.into(),
            description: None,
            content: Map::new(),
            data: None,
            created_at: None,
        }
    }

    /// Identity used for deduplication: `id` when present, else `title`.
    pub fn identity(&self) -> &str {
        match self.id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => &self.title,
        }
    }
}

/// Fixed set of chart kinds a renderer knows how to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Column,
    Line,
    Area,
    Pie,
    Radar,
    Scatter,
    Combo,
    Bubble,
}

impl ChartType {
    pub const ALL: [ChartType; 9] = [
        ChartType::Bar,
        ChartType::Column,
        ChartType::Line,
        ChartType::Area,
        ChartType::Pie,
        ChartType::Radar,
        ChartType::Scatter,
        ChartType::Combo,
        ChartType::Bubble,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Column => "column",
            ChartType::Line => "line",
            ChartType::Area => "area",
            ChartType::Pie => "pie",
            ChartType::Radar => "radar",
            ChartType::Scatter => "scatter",
            ChartType::Combo => "combo",
            ChartType::Bubble => "bubble",
        }
    }

    /// Exact (case-insensitive) match against the enum; no aliasing.
    pub fn parse(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == lower)
    }
}

/// Validated table shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// One point of a chart series. Numbers keep their JSON representation.
#[derive(Debug, Clone, PartialEq)]
pub enum DataPoint {
    Number(Number),
    /// Any object with a numeric `y`; `x` is absent for named points like `{name, y}`.
    Point {
        x: Option<Number>,
        y: Number,
        size: Option<Number>,
    },
    Other(Value),
}

impl From<&Value> for DataPoint {
    fn from(value: &Value) -> Self {
        match value {
            Value::Number(n) => DataPoint::Number(n.clone()),
            Value::Object(map) => match map.get("y") {
                Some(Value::Number(y)) => DataPoint::Point {
                    x: number_field(map, "x"),
                    y: y.clone(),
                    size: number_field(map, "size"),
                },
                _ => DataPoint::Other(value.clone()),
            },
            _ => DataPoint::Other(value.clone()),
        }
    }
}

fn number_field(map: &Map<String, Value>, key: &str) -> Option<Number> {
    match map.get(key) {
        Some(Value::Number(n)) => Some(n.clone()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub data: Vec<DataPoint>,
}

/// Validated chart shape.
///
/// `spec` keeps the whole dataset object (axis metadata, colors, anything the
/// model sent) so the renderer sees it verbatim; the typed fields are a view
/// over it for the builder.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartDataset {
    pub chart_type: ChartType,
    /// Dataset used the nested `chart: {type}` form.
    pub nested_chart: bool,
    pub title: Option<String>,
    pub categories: Vec<String>,
    pub series: Vec<Series>,
    pub spec: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    Table,
    Chart,
}

impl MarkerKind {
    pub fn tag_name(&self) -> &'static str {
        match self {
            MarkerKind::Table => "ui-table",
            MarkerKind::Chart => "ui-chart",
        }
    }
}

/// An inline reference to a dataset, in document order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerDescriptor {
    pub tag_kind: MarkerKind,
    pub data_id: String,
    /// Raw `type` attribute, kept verbatim even when it is not a known kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,
    /// Byte span of the marker in the text it was parsed from.
    #[serde(skip)]
    pub span: Range<usize>,
    /// Marker was an already-substituted placeholder rather than a `ui-*` tag.
    #[serde(skip)]
    pub from_placeholder: bool,
}

/// Counters describing one pass, for logging and metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    pub kind: ContentKind,
    pub blocks_found: usize,
    pub blocks_recovered: usize,
    pub blocks_failed: usize,
    pub markers: usize,
    pub artifacts_built: usize,
    pub prior_kept: usize,
}

/// Pipeline output handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedMessage {
    pub cleaned_text: String,
    pub artifacts: Vec<Artifact>,
    pub datasets: DatasetMap,
    pub report: ExtractionReport,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_artifact_accepts_type_alias() {
        let artifact: Artifact = serde_json::from_value(json!({
            "id": "a",
            "type": "chart",
            "title": "Revenue",
            "content": {"series": []}
        }))
        .unwrap();

        assert_eq!(artifact.artifact_type, ArtifactType::Chart);
        assert_eq!(artifact.identity(), "a");
    }

    #[test]
    fn test_artifact_serializes_uppercase_type() {
        let artifact = Artifact::new(ArtifactType::Table, "Projects");
        let value = serde_json::to_value(&artifact).unwrap();

        assert_eq!(value["artifact_type"], "TABLE");
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_identity_falls_back_to_title() {
        let mut artifact = Artifact::new(ArtifactType::Report, "Quarterly");
        assert_eq!(artifact.identity(), "Quarterly");

        artifact.id = Some(String::new());
        assert_eq!(artifact.identity(), "Quarterly");
    }

    #[test]
    fn test_chart_type_parse() {
        assert_eq!(ChartType::parse("Bar"), Some(ChartType::Bar));
        assert_eq!(ChartType::parse(" bubble "), Some(ChartType::Bubble));
        assert_eq!(ChartType::parse("heatmap"), None);
    }

    #[test]
    fn test_data_point_shapes() {
        assert_eq!(DataPoint::from(&json!(3)), DataPoint::Number(3.into()));
        assert_eq!(
            DataPoint::from(&json!({"x": 1, "y": 2, "size": 5})),
            DataPoint::Point { x: Some(1.into()), y: 2.into(), size: Some(5.into()) }
        );
        assert_eq!(DataPoint::from(&json!(null)), DataPoint::Other(Value::Null));
    }

    #[test]
    fn test_named_point_without_x() {
        assert_eq!(
            DataPoint::from(&json!({"name": "Energy", "y": 30})),
            DataPoint::Point { x: None, y: 30.into(), size: None }
        );
        assert!(matches!(
            DataPoint::from(&json!({"name": "Energy", "y": "high"})),
            DataPoint::Other(_)
        ));
    }

    #[test]
    fn test_large_integers_are_exact() {
        let big: u64 = 9_007_199_254_740_993;
        assert_eq!(DataPoint::from(&json!(big)), DataPoint::Number(big.into()));
    }
}
