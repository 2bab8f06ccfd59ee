//! Normalizes what the conversational backend hands us into text plus
//! out-of-band datasets and artifacts.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::warn;

use crate::classify::{ContentKind, classify};
use crate::schema::{Artifact, ArtifactType, DatasetMap};
use crate::validate::title_text;

static HTML_CONTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^<!doctype|<html|<h[1-6]|<table").expect("html content regex is valid")
});

const ARTIFACT_LIST_FIELDS: [&str; 2] = ["artifacts", "visualizations"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundPayload {
    /// Narrative text; empty when the payload carried none.
    pub answer: String,
    /// Datasets delivered beside the text rather than inside it.
    pub datasets: DatasetMap,
    pub artifacts: Vec<Artifact>,
}

impl InboundPayload {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(text) => Self::from_text(text),
            Value::Object(obj) => {
                let mut payload = Self::default();
                let nested = obj.get("llm_payload").and_then(Value::as_object);

                let text = obj
                    .get("content")
                    .and_then(Value::as_str)
                    .or_else(|| nested.and_then(|n| n.get("answer")).and_then(Value::as_str))
                    .or_else(|| obj.get("answer").and_then(Value::as_str))
                    .unwrap_or_default();

                payload.absorb(obj);
                if let Some(nested) = nested {
                    payload.absorb(nested);
                }
                payload.set_answer(text);
                payload
            }
            _ => Self::default(),
        }
    }

    pub fn from_text(text: &str) -> Self {
        let mut payload = Self::default();
        payload.set_answer(text);
        payload
    }

    /// Text that is itself a serialized `{"answer": ...}` object is unwrapped once.
    fn set_answer(&mut self, text: &str) {
        let trimmed = text.trim();
        let inner = if trimmed.starts_with('{') {
            serde_json::from_str::<Map<String, Value>>(trimmed).ok()
        } else {
            None
        };

        match inner {
            Some(inner) if inner.get("answer").is_some_and(Value::is_string) => {
                self.answer = inner["answer"].as_str().unwrap_or_default().to_string();
                self.absorb(&inner);
            }
            _ => self.answer = text.to_string(),
        }
    }

    fn absorb(&mut self, source: &Map<String, Value>) {
        if let Some(datasets) = source.get("datasets").and_then(Value::as_object) {
            self.datasets
                .extend(datasets.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        for field in ARTIFACT_LIST_FIELDS {
            let Some(entries) = source.get(field).and_then(Value::as_array) else {
                continue;
            };
            for (index, entry) in entries.iter().enumerate() {
                match artifact_from_value(entry) {
                    Some(artifact) => self.artifacts.push(artifact),
                    None => warn!(field, index, "Skipping out-of-band entry that is not an artifact"),
                }
            }
        }
    }
}

/// Convert an out-of-band entry: a full artifact record, or a bare visualization object.
/// Objects of no recognized kind are kept as reports.
pub fn artifact_from_value(value: &Value) -> Option<Artifact> {
    let obj = value.as_object()?;

    if obj.contains_key("artifact_type") {
        return match serde_json::from_value::<Artifact>(value.clone()) {
            Ok(artifact) => Some(artifact),
            Err(err) => {
                warn!(error = %err, "Out-of-band artifact failed to deserialize");
                None
            }
        };
    }

    let html_content = obj
        .get("content")
        .and_then(Value::as_str)
        .is_some_and(|content| HTML_CONTENT_RE.is_match(content.trim()));
    let artifact_type = match classify(value, None, None).kind {
        _ if html_content => ArtifactType::Document,
        ContentKind::Html => ArtifactType::Document,
        _ if obj.contains_key("chart_type") => ArtifactType::Chart,
        ContentKind::Chart => ArtifactType::Chart,
        ContentKind::Table => ArtifactType::Table,
        _ => ArtifactType::Report,
    };

    let id = ["id", "dataId", "data_id"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::to_string);
    let title = title_text(obj.get("title")).unwrap_or_else(|| match artifact_type {
        ArtifactType::Document => "Report".to_string(),
        ArtifactType::Report => id.clone().unwrap_or_else(|| "Artifact".to_string()),
        _ => "Visualization".to_string(),
    });

    Some(Artifact {
        id,
        content: obj.clone(),
        ..Artifact::new(artifact_type, title)
    })
}
