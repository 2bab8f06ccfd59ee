use serde_json::{Map, Value, json};
use tracing::debug;

use crate::builder::normalize_chart_type;
use crate::error::RejectReason;
use crate::schema::{ChartDataset, ChartType, DataPoint, DatasetMap, Series, TableDataset};

/// Look up `data_id` and confirm it is a table.
pub fn validate_table(data_id: &str, datasets: &DatasetMap) -> Result<TableDataset, RejectReason> {
    table_from_value(data_id, lookup(data_id, datasets)?)
}

/// Look up `data_id` and confirm it is a chart.
pub fn validate_chart(data_id: &str, datasets: &DatasetMap) -> Result<ChartDataset, RejectReason> {
    chart_from_value(data_id, lookup(data_id, datasets)?)
}

fn lookup<'a>(data_id: &str, datasets: &'a DatasetMap) -> Result<&'a Value, RejectReason> {
    datasets.get(data_id).ok_or_else(|| RejectReason::DatasetNotFound {
        data_id: data_id.to_string(),
        available: datasets.keys().cloned().collect(),
    })
}

/// The kind the dataset declares for itself (`kind`, else `type`), lowercased.
fn declared_kind(obj: &Map<String, Value>) -> Option<String> {
    obj.get("kind")
        .or_else(|| obj.get("type"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
}

fn describe(value: &Value) -> String {
    match value {
        Value::Object(obj) => declared_kind(obj).unwrap_or_else(|| "none".to_string()),
        Value::Array(_) => "array".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Null => "null".to_string(),
    }
}

pub fn table_from_value(data_id: &str, raw: &Value) -> Result<TableDataset, RejectReason> {
    let obj = raw
        .as_object()
        .filter(|obj| declared_kind(obj).as_deref() == Some("table"))
        .ok_or_else(|| RejectReason::KindMismatch {
            data_id: data_id.to_string(),
            expected: "table",
            found: describe(raw),
        })?;

    let columns: Vec<String> = match obj.get("columns") {
        Some(Value::Array(cols)) if !cols.is_empty() => cols
            .iter()
            .map(|c| match c {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => {
            return Err(RejectReason::MissingColumns {
                data_id: data_id.to_string(),
            });
        }
    };

    let rows_not_sequence = || RejectReason::RowsNotSequence {
        data_id: data_id.to_string(),
    };
    let rows = obj
        .get("rows")
        .and_then(Value::as_array)
        .ok_or_else(rows_not_sequence)?
        .iter()
        .map(|row| row.as_array().cloned().ok_or_else(rows_not_sequence))
        .collect::<Result<Vec<_>, _>>()?;

    // Ragged rows pass through; the renderer pads or truncates them.
    let ragged = rows.iter().filter(|r| r.len() != columns.len()).count();
    if ragged > 0 {
        debug!(data_id, ragged, columns = columns.len(), "Table has ragged rows");
    }

    Ok(TableDataset { columns, rows })
}

pub fn chart_from_value(data_id: &str, raw: &Value) -> Result<ChartDataset, RejectReason> {
    let mismatch = || RejectReason::KindMismatch {
        data_id: data_id.to_string(),
        expected: "chart",
        found: describe(raw),
    };
    let obj = raw.as_object().ok_or_else(mismatch)?;

    // Three accepted forms: nested `chart.type`, flat `type: <kind>`, legacy `type: "chart"` + `chart_type`.
    let nested = obj
        .get("chart")
        .and_then(|c| c.get("type"))
        .and_then(Value::as_str)
        .map(|s| s.to_lowercase());
    let flat = declared_kind(obj);
    let flat_is_kind = flat.as_deref().and_then(ChartType::parse).is_some();

    if nested.is_none() && flat.as_deref() != Some("chart") && !flat_is_kind {
        return Err(mismatch());
    }

    let raw_type = nested.clone().or(if flat_is_kind {
        flat
    } else {
        obj.get("chart_type").and_then(Value::as_str).map(str::to_string)
    });
    let chart_type = normalize_chart_type(raw_type.as_deref());
    let title = title_text(obj.get("title"));

    let series_value = match obj.get("series") {
        Some(series) => series.clone(),
        None => match obj.get("data") {
            Some(data) => json!([{
                "name": title.clone().unwrap_or_else(|| data_id.to_string()),
                "data": if data.is_array() { data.clone() } else { json!([]) },
            }]),
            None => Value::Null,
        },
    };

    let entries = series_value
        .as_array()
        .ok_or_else(|| RejectReason::SeriesNotSequence {
            data_id: data_id.to_string(),
        })?;

    let series = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let name = entry.get("name").and_then(Value::as_str).filter(|n| !n.is_empty());
            let data = entry.get("data").and_then(Value::as_array);
            match (name, data) {
                (Some(name), Some(data)) => Ok(Series {
                    name: name.to_string(),
                    data: data.iter().map(DataPoint::from).collect(),
                }),
                _ => Err(RejectReason::InvalidSeriesEntry {
                    data_id: data_id.to_string(),
                    index,
                }),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    let categories = obj
        .get("xAxis")
        .and_then(|x| x.get("categories"))
        .and_then(Value::as_array)
        .map(|cats| {
            cats.iter()
                .map(|c| match c {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let mut spec = obj.clone();
    spec.insert("series".to_string(), series_value);
    if nested.is_none() {
        spec.insert("type".to_string(), json!("chart"));
        spec.insert("chart_type".to_string(), json!(chart_type.as_str()));
    }

    Ok(ChartDataset {
        chart_type,
        nested_chart: nested.is_some(),
        title,
        categories,
        series,
        spec,
    })
}

/// `title` as either a plain string or `{ "text": ... }`.
pub(crate) fn title_text(title: Option<&Value>) -> Option<String> {
    match title? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(obj) => obj
            .get("text")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datasets(value: Value) -> DatasetMap {
        value
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[test]
    fn test_valid_table() {
        let map = datasets(json!({
            "x": {"type": "table", "columns": ["A", "B"], "rows": [[1, 2], [3, 4]]}
        }));
        let table = validate_table("x", &map).unwrap();

        assert_eq!(table.columns, vec!["A", "B"]);
        assert_eq!(table.rows, vec![vec![json!(1), json!(2)], vec![json!(3), json!(4)]]);
    }

    #[test]
    fn test_table_kind_field() {
        let map = datasets(json!({"x": {"kind": "table", "columns": ["A"], "rows": []}}));
        assert!(validate_table("x", &map).is_ok());
    }

    #[test]
    fn test_table_rejections() {
        let map = datasets(json!({
            "chart": {"type": "bar", "series": []},
            "nocols": {"type": "table", "columns": [], "rows": []},
            "norows": {"type": "table", "columns": ["A"], "rows": "oops"},
            "badrow": {"type": "table", "columns": ["A"], "rows": [[1], 2]}
        }));

        assert!(matches!(
            validate_table("missing", &map),
            Err(RejectReason::DatasetNotFound { .. })
        ));
        assert_eq!(
            validate_table("chart", &map),
            Err(RejectReason::KindMismatch {
                data_id: "chart".to_string(),
                expected: "table",
                found: "bar".to_string(),
            })
        );
        assert!(matches!(validate_table("nocols", &map), Err(RejectReason::MissingColumns { .. })));
        assert!(matches!(validate_table("norows", &map), Err(RejectReason::RowsNotSequence { .. })));
        assert!(matches!(validate_table("badrow", &map), Err(RejectReason::RowsNotSequence { .. })));
    }

    #[test]
    fn test_ragged_rows_accepted() {
        let map = datasets(json!({"x": {"type": "table", "columns": ["A", "B"], "rows": [[1], [1, 2, 3]]}}));
        assert_eq!(validate_table("x", &map).unwrap().rows.len(), 2);
    }

    #[test]
    fn test_chart_flat_kind() {
        let map = datasets(json!({
            "rev": {
                "type": "line",
                "title": "Revenue",
                "xAxis": {"categories": ["Q1", "Q2"]},
                "yAxis": {"title": {"text": "SAR"}},
                "series": [{"name": "2025", "data": [1, 2]}]
            }
        }));
        let chart = validate_chart("rev", &map).unwrap();

        assert_eq!(chart.chart_type, ChartType::Line);
        assert!(!chart.nested_chart);
        assert_eq!(chart.title.as_deref(), Some("Revenue"));
        assert_eq!(chart.categories, vec!["Q1", "Q2"]);
        assert_eq!(chart.series[0].data, vec![DataPoint::Number(1.into()), DataPoint::Number(2.into())]);
        assert_eq!(chart.spec["yAxis"], json!({"title": {"text": "SAR"}}));
        assert_eq!(chart.spec["chart_type"], "line");
    }

    #[test]
    fn test_chart_legacy_and_nested() {
        let map = datasets(json!({
            "legacy": {"type": "chart", "chart_type": "pie", "series": [{"name": "s", "data": []}]},
            "nested": {"chart": {"type": "Bubble"}, "series": [{"name": "s", "data": [{"x": 1, "y": 2, "size": 3}]}]}
        }));

        assert_eq!(validate_chart("legacy", &map).unwrap().chart_type, ChartType::Pie);

        let nested = validate_chart("nested", &map).unwrap();
        assert_eq!(nested.chart_type, ChartType::Bubble);
        assert!(nested.nested_chart);
        assert!(nested.spec.get("chart_type").is_none());
    }

    #[test]
    fn test_chart_data_becomes_series() {
        let map = datasets(json!({"sales": {"type": "bar", "data": [4, 5]}}));
        let chart = validate_chart("sales", &map).unwrap();

        assert_eq!(chart.series.len(), 1);
        assert_eq!(chart.series[0].name, "sales");
        assert_eq!(chart.spec["series"], json!([{"name": "sales", "data": [4, 5]}]));
    }

    #[test]
    fn test_chart_rejections() {
        let map = datasets(json!({
            "table": {"type": "table", "columns": ["A"], "rows": []},
            "noseries": {"type": "bar", "series": {"name": "s"}},
            "empty": {"type": "chart"},
            "unnamed": {"type": "bar", "series": [{"name": "ok", "data": []}, {"name": "", "data": [1]}]},
            "nodata": {"type": "bar", "series": [{"name": "s", "data": 3}]}
        }));

        assert!(matches!(validate_chart("table", &map), Err(RejectReason::KindMismatch { .. })));
        assert!(matches!(validate_chart("noseries", &map), Err(RejectReason::SeriesNotSequence { .. })));
        assert!(matches!(validate_chart("empty", &map), Err(RejectReason::SeriesNotSequence { .. })));
        assert_eq!(
            validate_chart("unnamed", &map),
            Err(RejectReason::InvalidSeriesEntry {
                data_id: "unnamed".to_string(),
                index: 1,
            })
        );
        assert!(matches!(validate_chart("nodata", &map), Err(RejectReason::InvalidSeriesEntry { .. })));
    }

    #[test]
    fn test_title_text_forms() {
        assert_eq!(title_text(Some(&json!("A"))), Some("A".to_string()));
        assert_eq!(title_text(Some(&json!({"text": "B"}))), Some("B".to_string()));
        assert_eq!(title_text(Some(&json!(" "))), None);
        assert_eq!(title_text(None), None);
    }
}
