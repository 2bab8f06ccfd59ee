use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;

use crate::schema::{Artifact, ArtifactType};

static MARKUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?[a-z][\s\S]*>").expect("markup regex is valid"));

static MARKDOWN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#{1,6}\s|[-*+]\s)|```").expect("markdown regex is valid")
});

static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(def |class |function |import |from |const |let |var |SELECT |CREATE )")
        .expect("code regex is valid")
});

static MEDIA_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://\S+\.(jpg|jpeg|png|gif|webp|svg|mp4|webm|ogg|mp3|wav)$")
        .expect("media url regex is valid")
});

static MARKDOWN_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^!\[.*?\]\((.*?)\)$").expect("markdown image regex is valid"));

const CHART_KINDS: [&str; 11] = [
    "chart", "column", "bar", "line", "area", "pie", "radar", "bubble", "bullet", "combo", "scatter",
];

const CODE_LANGUAGES: [&str; 8] = [
    "python", "javascript", "typescript", "sql", "java", "cpp", "go", "rust",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Chart,
    Table,
    Artifact,
    Html,
    Markdown,
    #[default]
    Narrative,
    Code,
    Image,
    Video,
    Audio,
    Tabular,
    File,
    Json,
    Graph,
    LandingPage,
}

impl ContentKind {
    /// Kinds whose text may carry dataset blocks and markers.
    pub fn is_extractable(&self) -> bool {
        matches!(
            self,
            ContentKind::Narrative | ContentKind::Markdown | ContentKind::Html | ContentKind::Tabular
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub kind: ContentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Composite artifact for reserved hint kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
}

impl From<ContentKind> for Classification {
    fn from(kind: ContentKind) -> Self {
        Self {
            kind,
            language: None,
            url: None,
            artifact: None,
        }
    }
}

impl Classification {
    fn code(language: &str) -> Self {
        Self {
            language: Some(language.to_string()),
            ..ContentKind::Code.into()
        }
    }

    fn media(kind: ContentKind, url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            ..kind.into()
        }
    }
}

/// Decide what kind of content `content` is.
///
/// Rules are checked in a fixed order and the first match wins: the wrapper's
/// declared artifact kind, serialized JSON inside a string, visualization and
/// artifact objects, the explicit hint, string heuristics, then shape defaults.
/// Never fails; anything unrecognized is narrative.
pub fn classify(content: &Value, explicit_type: Option<&str>, wrapper: Option<&Value>) -> Classification {
    if let Some(kind) = wrapper.and_then(|w| w.get("artifact_type")) {
        let declared = kind.as_str().unwrap_or_default().to_lowercase();
        return match declared.as_str() {
            "graphv001" => ContentKind::Graph,
            "landing_page" => ContentKind::LandingPage,
            "html" | "document" => ContentKind::Html,
            _ => ContentKind::Artifact,
        }
        .into();
    }

    let parsed;
    let mut working = content;
    if let Value::String(text) = content {
        let trimmed = text.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
                parsed = value;
                working = &parsed;
            }
        } else if is_markup_document(trimmed) {
            return ContentKind::Html.into();
        }
    }

    if let Some(kind) = working.as_object().and_then(classify_object) {
        return kind.into();
    }

    if let Some(result) = explicit_type.and_then(classify_hint) {
        return result;
    }

    match working {
        Value::String(text) => classify_text(text.trim()),
        Value::Array(items) if items.first().is_some_and(Value::is_array) => ContentKind::Tabular.into(),
        Value::Object(_) | Value::Array(_) => ContentKind::Json.into(),
        _ => ContentKind::Narrative.into(),
    }
}

fn is_markup_document(trimmed: &str) -> bool {
    let lower = trimmed.to_lowercase();
    lower.starts_with("<!doctype") || lower.starts_with("<html") || (lower.starts_with('<') && lower.contains("<html"))
}

fn classify_object(obj: &serde_json::Map<String, Value>) -> Option<ContentKind> {
    let declared = obj.get("type").and_then(Value::as_str).map(str::to_lowercase);

    if let Some(kind) = declared.as_deref() {
        if CHART_KINDS.contains(&kind) {
            return Some(ContentKind::Chart);
        }
        if kind == "table" {
            return Some(ContentKind::Table);
        }
        if obj.contains_key("config") && obj.contains_key("data") {
            return Some(ContentKind::Chart);
        }
    }

    if let Some(kind) = obj.get("artifact_type") {
        let kind = kind.as_str().unwrap_or_default().to_lowercase();
        return Some(if kind == "html" || kind == "document" {
            ContentKind::Html
        } else {
            ContentKind::Artifact
        });
    }

    if declared.as_deref() == Some("html") {
        return Some(ContentKind::Html);
    }

    let config = obj.get("config");
    let html_in_config = ["html_content", "html"]
        .iter()
        .any(|key| config.and_then(|c| c.get(*key)).is_some_and(Value::is_string));
    if html_in_config {
        return Some(ContentKind::Html);
    }

    if obj
        .get("answer")
        .and_then(Value::as_str)
        .is_some_and(|answer| MARKUP_RE.is_match(answer))
    {
        return Some(ContentKind::Html);
    }

    None
}

fn classify_hint(hint: &str) -> Option<Classification> {
    let lower = hint.trim().to_lowercase();
    let kind = match lower.as_str() {
        lang if CODE_LANGUAGES.contains(&lang) => return Some(Classification::code(lang)),
        "markdown" | "md" => ContentKind::Markdown,
        "html" => ContentKind::Html,
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "svg" => ContentKind::Image,
        "mp4" | "webm" | "ogg" => ContentKind::Video,
        "mp3" | "wav" => ContentKind::Audio,
        "csv" | "xlsx" | "xls" => ContentKind::Tabular,
        "pdf" | "docx" | "pptx" => ContentKind::File,
        "graphv001" => ContentKind::Graph,
        "twin_knowledge" => {
            return Some(Classification {
                artifact: Some(Artifact::new(ArtifactType::Document, "Twin Knowledge Library")),
                ..ContentKind::Artifact.into()
            });
        }
        "document" => ContentKind::Artifact,
        _ => return None,
    };
    Some(kind.into())
}

fn classify_text(trimmed: &str) -> Classification {
    if trimmed.starts_with('<') && trimmed.contains('>') {
        return ContentKind::Html.into();
    }

    if MARKDOWN_RE.is_match(trimmed) {
        return ContentKind::Markdown.into();
    }

    if CODE_RE.is_match(trimmed) {
        let language = if ["def ", "class ", "import ", "from "].iter().any(|p| trimmed.starts_with(p)) {
            "python"
        } else if ["function ", "const ", "let ", "var "].iter().any(|p| trimmed.starts_with(p)) {
            "javascript"
        } else if ["SELECT ", "CREATE "].iter().any(|p| trimmed.starts_with(p)) {
            "sql"
        } else {
            "text"
        };
        return Classification::code(language);
    }

    if let Some(caps) = MEDIA_URL_RE.captures(trimmed) {
        let kind = match caps[1].to_lowercase().as_str() {
            "mp4" | "webm" | "ogg" => ContentKind::Video,
            "mp3" | "wav" => ContentKind::Audio,
            _ => ContentKind::Image,
        };
        return Classification::media(kind, trimmed);
    }

    if let Some(caps) = MARKDOWN_IMAGE_RE.captures(trimmed) {
        return Classification::media(ContentKind::Image, &caps[1]);
    }

    if trimmed.contains(',') && trimmed.contains('\n') {
        return ContentKind::Tabular.into();
    }

    ContentKind::Narrative.into()
}
