//! Inline visualization markers.
//!
//! Recognizes `<ui-table>`/`<ui-chart>` tags (self-closing or with a body, any
//! attribute order) and the placeholder `div`s this module writes back into
//! cleaned text, so already-processed text parses to the same markers.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::warn;

use crate::builder::{infer_title, normalize_chart_type};
use crate::schema::{Artifact, ChartType, MarkerDescriptor, MarkerKind};

static OPEN_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(ui-table|ui-chart)\b([^>]*?)(/?)\s*>").expect("marker regex is valid")
});

static CLOSE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</(ui-table|ui-chart)\s*>").expect("closing tag regex is valid"));

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<div\b([^>]*\bvisualization-placeholder\b[^>]*?)(?:/\s*>|>.*?</div\s*>)")
        .expect("placeholder regex is valid")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>\x60]+))"#)
        .expect("attribute regex is valid")
});

const PLACEHOLDER_CHART_CLASSES: [&str; 4] = [
    "visualization-chart",
    "visualization-bar",
    "visualization-line",
    "visualization-pie",
];

/// Every marker in `text`, in document order.
pub fn parse_markers(text: &str) -> Vec<MarkerDescriptor> {
    let mut markers = parse_tags(text);
    markers.extend(parse_placeholders(text));
    markers.sort_by_key(|m| m.span.start);
    markers
}

fn parse_tags(text: &str) -> Vec<MarkerDescriptor> {
    let mut markers = Vec::new();

    for caps in OPEN_TAG_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let tag = caps[1].to_lowercase();
        let kind = if tag == "ui-table" {
            MarkerKind::Table
        } else {
            MarkerKind::Chart
        };
        let attrs = parse_attributes(&caps[2]);

        let Some(data_id) = data_id_of(&attrs) else {
            let attributes = caps[2].trim();
            warn!(tag = %tag, attributes, "Marker missing data-id attribute, skipping");
            continue;
        };

        let chart_type = match kind {
            MarkerKind::Chart => attrs
                .get("type")
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            MarkerKind::Table => None,
        };
        if let Some(raw) = chart_type.as_deref().filter(|t| ChartType::parse(t).is_none()) {
            warn!(data_id = %data_id, chart_type = raw, "Marker declares an unsupported chart type");
        }

        let self_closing = !caps[3].is_empty();
        let end = if self_closing {
            whole.end()
        } else {
            closing_tag_end(text, whole.end(), &tag).unwrap_or(whole.end())
        };

        markers.push(MarkerDescriptor {
            tag_kind: kind,
            data_id,
            chart_type,
            span: whole.start()..end,
            from_placeholder: false,
        });
    }

    markers
}

/// End of the matching close tag, if it appears before the next marker opens.
fn closing_tag_end(text: &str, from: usize, tag: &str) -> Option<usize> {
    let rest = &text[from..];
    let limit = OPEN_TAG_RE.find(rest).map_or(rest.len(), |m| m.start());

    CLOSE_TAG_RE
        .captures_iter(rest)
        .filter_map(|caps| caps.get(0).map(|m| (caps[1].to_lowercase(), m)))
        .take_while(|(_, m)| m.start() < limit)
        .find(|(name, _)| name == tag)
        .map(|(_, m)| from + m.end())
}

fn parse_placeholders(text: &str) -> Vec<MarkerDescriptor> {
    let mut markers = Vec::new();

    for caps in PLACEHOLDER_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let attrs = parse_attributes(&caps[1]);
        let class = attrs.get("class").map(String::as_str).unwrap_or_default();
        let classes: Vec<&str> = class.split_whitespace().collect();

        let kind = if classes.iter().any(|c| PLACEHOLDER_CHART_CLASSES.contains(c)) {
            MarkerKind::Chart
        } else if classes.contains(&"visualization-table") {
            MarkerKind::Table
        } else {
            continue;
        };

        let Some(data_id) = data_id_of(&attrs) else {
            warn!(class = %class, "Visualization placeholder missing data-id, skipping");
            continue;
        };

        let chart_type = match kind {
            MarkerKind::Chart => attrs
                .get("data-chart-type")
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            MarkerKind::Table => None,
        };

        markers.push(MarkerDescriptor {
            tag_kind: kind,
            data_id,
            chart_type,
            span: whole.range(),
            from_placeholder: true,
        });
    }

    markers
}

/// Lower-cased attribute names to unescaped values. First occurrence wins.
fn parse_attributes(raw: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    for caps in ATTR_RE.captures_iter(raw) {
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());
        attrs
            .entry(caps[1].to_lowercase())
            .or_insert_with(|| unescape_html(value));
    }
    attrs
}

fn data_id_of(attrs: &HashMap<String, String>) -> Option<String> {
    ["data-id", "id"]
        .iter()
        .filter_map(|key| attrs.get(*key))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn unescape_html(raw: &str) -> String {
    raw.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Replace each `ui-*` marker with its placeholder token.
///
/// Title and chart kind come from the built artifact with the same id when there
/// is one. Placeholders that were already in the text are left as they are.
pub fn replace_markers(text: &str, markers: &[MarkerDescriptor], artifacts: &[Artifact]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    for marker in markers {
        if marker.from_placeholder || marker.span.start < cursor {
            continue;
        }
        out.push_str(&text[cursor..marker.span.start]);
        out.push_str(&placeholder(marker, artifacts));
        cursor = marker.span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// The token the renderer looks for when mounting the artifact for `marker`.
pub fn placeholder(marker: &MarkerDescriptor, artifacts: &[Artifact]) -> String {
    let built = artifacts
        .iter()
        .find(|a| a.id.as_deref() == Some(marker.data_id.as_str()));
    let title = built
        .map(|a| a.title.clone())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| infer_title(&marker.data_id));
    let data_id = escape_html(&marker.data_id);

    match marker.tag_kind {
        MarkerKind::Table => format!(
            r#"<div class="visualization-placeholder visualization-table" data-id="{}">Table: {}</div>"#,
            data_id,
            escape_html(&title)
        ),
        MarkerKind::Chart => {
            let built_kind = built
                .and_then(|a| a.content.get("chart"))
                .and_then(|c| c.get("type"))
                .and_then(|t| t.as_str());
            let kind = normalize_chart_type(built_kind.or(marker.chart_type.as_deref()));
            format!(
                r#"<div class="visualization-placeholder visualization-chart" data-id="{}" data-chart-type="{}">Chart: {}</div>"#,
                data_id,
                kind.as_str(),
                escape_html(&title)
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ArtifactType;

    #[test]
    fn test_parse_both_families_in_order() {
        let text = r#"Intro <ui-chart type="bar" data-id="rev"/> then <ui-table data-id="proj"></ui-table> end"#;
        let markers = parse_markers(text);

        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].tag_kind, MarkerKind::Chart);
        assert_eq!(markers[0].data_id, "rev");
        assert_eq!(markers[0].chart_type.as_deref(), Some("bar"));
        assert_eq!(markers[1].tag_kind, MarkerKind::Table);
        assert_eq!(markers[1].data_id, "proj");
        assert_eq!(&text[markers[1].span.clone()], r#"<ui-table data-id="proj"></ui-table>"#);
    }

    #[test]
    fn test_attribute_order_and_quoting() {
        let markers = parse_markers("<UI-CHART data-id='a' TYPE=line></ui-chart><ui-chart id=\"b\" type=\"pie\" />");

        assert_eq!(markers[0].data_id, "a");
        assert_eq!(markers[0].chart_type.as_deref(), Some("line"));
        assert_eq!(markers[1].data_id, "b");
        assert_eq!(markers[1].chart_type.as_deref(), Some("pie"));
    }

    #[test]
    fn test_data_id_preferred_over_id() {
        let markers = parse_markers(r#"<ui-table id="wrong" data-id="right" />"#);
        assert_eq!(markers[0].data_id, "right");
    }

    #[test]
    fn test_missing_id_skipped() {
        let markers = parse_markers(r#"<ui-table class="x"/> <ui-chart type="bar" data-id="ok"/>"#);

        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].data_id, "ok");
    }

    #[test]
    fn test_invalid_chart_type_kept_verbatim() {
        let markers = parse_markers(r#"<ui-chart type="Hologram" data-id="x"/>"#);
        assert_eq!(markers[0].chart_type.as_deref(), Some("Hologram"));
    }

    #[test]
    fn test_unclosed_tag_does_not_swallow_next_marker() {
        let text = r#"<ui-chart data-id="a">Loading <ui-table data-id="b"></ui-table>"#;
        let markers = parse_markers(text);

        assert_eq!(markers.len(), 2);
        assert_eq!(&text[markers[0].span.clone()], r#"<ui-chart data-id="a">"#);
    }

    #[test]
    fn test_html_entities_unescaped() {
        let markers = parse_markers(r#"<ui-table data-id="r&amp;d" />"#);
        assert_eq!(markers[0].data_id, "r&d");
    }

    #[test]
    fn test_replace_markers_with_placeholders() {
        let text = r#"See <ui-table data-id="sector-projects-2025-Q3"/> and <ui-chart type="gauge" data-id="x"></ui-chart>."#;
        let markers = parse_markers(text);
        let cleaned = replace_markers(text, &markers, &[]);

        assert_eq!(
            cleaned,
            "See <div class=\"visualization-placeholder visualization-table\" data-id=\"sector-projects-2025-Q3\">Table: Sector Projects 2025 Q3</div> \
             and <div class=\"visualization-placeholder visualization-chart\" data-id=\"x\" data-chart-type=\"pie\">Chart: X</div>."
        );
    }

    #[test]
    fn test_placeholder_uses_built_artifact() {
        let mut artifact = Artifact::new(ArtifactType::Chart, "Revenue <2025>");
        artifact.id = Some("rev".to_string());
        artifact
            .content
            .insert("chart".to_string(), serde_json::json!({"type": "line"}));
        let marker = &parse_markers(r#"<ui-chart data-id="rev"/>"#)[0];

        assert_eq!(
            placeholder(marker, &[artifact]),
            r#"<div class="visualization-placeholder visualization-chart" data-id="rev" data-chart-type="line">Chart: Revenue &lt;2025&gt;</div>"#
        );
    }

    #[test]
    fn test_placeholders_reparse_to_same_markers() {
        let text = r#"<ui-chart type="bar" data-id="rev"/> <ui-table data-id="t"/>"#;
        let original = parse_markers(text);
        let cleaned = replace_markers(text, &original, &[]);
        let reparsed = parse_markers(&cleaned);

        assert_eq!(reparsed.len(), 2);
        assert!(reparsed.iter().all(|m| m.from_placeholder));
        assert_eq!(reparsed[0].data_id, "rev");
        assert_eq!(reparsed[0].chart_type.as_deref(), Some("bar"));
        assert_eq!(reparsed[1].tag_kind, MarkerKind::Table);
        assert_eq!(replace_markers(&cleaned, &reparsed, &[]), cleaned);
    }

    #[test]
    fn test_placeholder_variant_classes() {
        let text = r#"<div class="visualization-placeholder visualization-bar" data-id="q">Chart</div><div class="note">x</div>"#;
        let markers = parse_markers(text);

        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].tag_kind, MarkerKind::Chart);
        assert_eq!(markers[0].chart_type, None);
    }
}
