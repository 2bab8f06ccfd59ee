use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::schema::{
    Artifact, ArtifactType, ChartDataset, ChartType, DataPoint, DatasetMap, MarkerDescriptor,
    MarkerKind, TableDataset,
};
use crate::validate::{chart_from_value, title_text, validate_chart, validate_table};

static PERIOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[QqHh]\d$").expect("period regex is valid"));

/// Pairs markers with validated datasets and produces artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactBuilder {
    auto_wrap_unreferenced: bool,
}

impl Default for ArtifactBuilder {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ArtifactBuilder {
    pub fn new(auto_wrap_unreferenced: bool) -> Self {
        Self {
            auto_wrap_unreferenced,
        }
    }

    pub fn build(&self, markers: &[MarkerDescriptor], datasets: &DatasetMap) -> Vec<Artifact> {
        let mut artifacts = Vec::new();
        let mut built: HashSet<&str> = HashSet::new();

        for marker in markers {
            if built.contains(marker.data_id.as_str()) {
                debug!(data_id = %marker.data_id, "Dataset already built for an earlier marker");
                continue;
            }

            let artifact = match marker.tag_kind {
                MarkerKind::Table => validate_table(&marker.data_id, datasets)
                    .map(|table| build_table_artifact(&marker.data_id, &table)),
                MarkerKind::Chart => validate_chart(&marker.data_id, datasets).map(|chart| {
                    build_chart_artifact(&marker.data_id, marker.chart_type.as_deref(), &chart)
                }),
            };

            match artifact {
                Ok(artifact) => {
                    built.insert(marker.data_id.as_str());
                    artifacts.push(artifact);
                }
                Err(reason) => {
                    warn!(
                        tag = marker.tag_kind.tag_name(),
                        data_id = %marker.data_id,
                        reason = %reason,
                        "Skipping marker: dataset not found or invalid"
                    );
                }
            }
        }

        if self.auto_wrap_unreferenced {
            let referenced: HashSet<&str> = markers.iter().map(|m| m.data_id.as_str()).collect();
            for (data_id, raw) in datasets {
                if !referenced.contains(data_id.as_str()) {
                    debug!(data_id = %data_id, "Auto-wrapping unreferenced dataset");
                    artifacts.push(wrap_unreferenced(data_id, raw));
                }
            }
        }

        artifacts
    }
}

/// Build with default settings.
pub fn build_artifacts(markers: &[MarkerDescriptor], datasets: &DatasetMap) -> Vec<Artifact> {
    ArtifactBuilder::default().build(markers, datasets)
}

pub fn build_table_artifact(data_id: &str, table: &TableDataset) -> Artifact {
    let title = infer_title(data_id);
    let mut content = Map::new();
    content.insert("chart".to_string(), json!({"type": "table"}));
    content.insert("title".to_string(), json!({"text": title}));
    content.insert("columns".to_string(), json!(table.columns));
    content.insert("rows".to_string(), json!(table.rows));

    Artifact {
        id: Some(data_id.to_string()),
        description: Some(format!("Table: {}", data_id)),
        content,
        ..Artifact::new(ArtifactType::Table, title)
    }
}

/// `marker_type` wins over the dataset's own kind; unknown names are normalized.
pub fn build_chart_artifact(data_id: &str, marker_type: Option<&str>, chart: &ChartDataset) -> Artifact {
    let chart_type = match marker_type {
        Some(raw) => normalize_chart_type(Some(raw)),
        None => chart.chart_type,
    };
    let title = chart.title.clone().unwrap_or_else(|| infer_title(data_id));

    let mut content = chart.spec.clone();
    if chart.nested_chart {
        if title_text(content.get("title")).is_none() {
            content.insert("title".to_string(), json!({"text": title}));
        }
    } else {
        content.insert("chart".to_string(), json!({"type": chart_type.as_str()}));
        content.insert("chart_type".to_string(), json!(chart_type.as_str()));
        content.insert("title".to_string(), json!({"text": title}));
        content
            .entry("xAxis")
            .or_insert_with(|| json!({"type": "category"}));
        content
            .entry("yAxis")
            .or_insert_with(|| json!({"title": {"text": "Value"}}));
    }

    Artifact {
        id: Some(data_id.to_string()),
        description: Some(format!("Chart: {}", data_id)),
        content,
        data: Some(flatten_chart_rows(chart)),
        ..Artifact::new(ArtifactType::Chart, title)
    }
}

/// A dataset nobody marked still becomes a chart so it is never dropped.
fn wrap_unreferenced(data_id: &str, raw: &Value) -> Artifact {
    if let Ok(chart) = chart_from_value(data_id, raw) {
        return build_chart_artifact(data_id, None, &chart);
    }

    let title = title_text(raw.get("title")).unwrap_or_else(|| infer_title(data_id));
    let content = match raw {
        Value::Object(obj) => obj.clone(),
        other => {
            let mut wrapped = Map::new();
            wrapped.insert("value".to_string(), other.clone());
            wrapped
        }
    };

    Artifact {
        id: Some(data_id.to_string()),
        description: Some(format!("Chart: {}", data_id)),
        content,
        ..Artifact::new(ArtifactType::Chart, title)
    }
}

/// Human-readable title from a dataset id.
///
/// `"sector-projects-2025-Q3"` becomes `"Sector Projects 2025 Q3"`: words split on
/// hyphens and capitalized, pure numbers kept, quarter/half notation upper-cased.
pub fn infer_title(data_id: &str) -> String {
    if data_id.is_empty() {
        return "Visualization".to_string();
    }

    data_id
        .split('-')
        .map(|word| {
            if !word.is_empty() && word.chars().all(|c| c.is_ascii_digit()) {
                word.to_string()
            } else if PERIOD_RE.is_match(word) {
                word.to_uppercase()
            } else {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str().to_lowercase()),
                    None => String::new(),
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map any chart-kind name onto the supported enum. Missing means `column`.
pub fn normalize_chart_type(raw: Option<&str>) -> ChartType {
    let Some(raw) = raw else {
        return ChartType::Column;
    };
    if let Some(kind) = ChartType::parse(raw) {
        return kind;
    }

    let lower = raw.trim().to_lowercase();
    let mapped = match lower.as_str() {
        "bullet" | "horizontal" | "bar_horizontal" | "progress" => Some(ChartType::Bar),
        "gauge" | "sunburst" => Some(ChartType::Pie),
        "heatmap" => Some(ChartType::Scatter),
        "sankey" | "flow" | "tree" | "treemap" | "waterfall" | "funnel" => Some(ChartType::Column),
        _ => None,
    };

    match mapped {
        Some(kind) => {
            warn!(requested = %lower, mapped = kind.as_str(), "Mapping unsupported chart type");
            kind
        }
        None => {
            warn!(requested = %lower, "Unknown chart type, falling back to column");
            ChartType::Column
        }
    }
}

/// One record per category with a field per series, for row-oriented renderers.
pub fn flatten_chart_rows(chart: &ChartDataset) -> Vec<Map<String, Value>> {
    let generated = chart.categories.is_empty();
    let categories: Vec<String> = if generated {
        let longest = chart.series.iter().map(|s| s.data.len()).max().unwrap_or(0);
        (0..longest).map(|i| i.to_string()).collect()
    } else {
        chart.categories.clone()
    };

    categories
        .into_iter()
        .enumerate()
        .map(|(idx, category)| {
            let mut row = Map::new();
            row.insert("category".to_string(), json!(category));

            for series in &chart.series {
                match series.data.get(idx) {
                    None | Some(DataPoint::Other(Value::Null)) => {
                        row.insert(series.name.clone(), json!(0));
                    }
                    Some(DataPoint::Number(n)) | Some(DataPoint::Point { y: n, .. }) => {
                        row.insert(series.name.clone(), Value::Number(n.clone()));
                    }
                    Some(DataPoint::Other(Value::Object(fields))) if fields.contains_key("y") => {
                        row.insert(series.name.clone(), fields["y"].clone());
                    }
                    Some(DataPoint::Other(Value::Object(fields))) => {
                        for (key, value) in fields {
                            if value.is_number() {
                                row.insert(key.clone(), value.clone());
                            } else if value.is_string() && key != "name" && generated {
                                let unset = row.get("category") == Some(&json!(idx.to_string()));
                                if unset {
                                    row.insert("category".to_string(), value.clone());
                                }
                            }
                        }
                    }
                    Some(DataPoint::Other(other)) => {
                        row.insert(series.name.clone(), other.clone());
                    }
                }
            }
            row
        })
        .collect()
}
