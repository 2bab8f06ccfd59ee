//! Dataset block extraction.
//!
//! The model appends its structured data between `[DATASETS_JSON_START]` and
//! `[DATASETS_JSON_END]` (the singular `DATASET_` spelling shows up too). The
//! interior is supposed to be `{"datasets": {...}}` but arrives concatenated,
//! escaped, wrapped in a string literal or followed by trailing prose, so each
//! block goes through an ordered chain of recovery strategies.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::error::{BlockFailure, RecoveryError};
use crate::schema::DatasetMap;

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\[DATASETS?_JSON_START\]\s*(.*?)\s*\[DATASETS?_JSON_END\]")
        .expect("dataset block regex is valid")
});

/// Result of scanning one text for dataset blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockExtraction {
    /// Input with every block (delimiters included) removed, trimmed.
    pub cleaned_text: String,
    /// All recovered datasets; later blocks win on key collision.
    pub datasets: DatasetMap,
    pub blocks_found: usize,
    pub recovered: usize,
    pub failures: Vec<BlockFailure>,
}

type Attempt = fn(&RecoveryChain, &str, usize) -> Result<DatasetMap, RecoveryError>;

/// One fallback parsing technique. `applies` gates whether it is tried at all.
struct RecoveryStrategy {
    name: &'static str,
    applies: fn(&str) -> bool,
    attempt: Attempt,
}

const STRATEGIES: [RecoveryStrategy; 6] = [
    RecoveryStrategy {
        name: "multi-object",
        applies: has_open_brace,
        attempt: multi_object,
    },
    RecoveryStrategy {
        name: "balanced-span",
        applies: has_open_brace,
        attempt: balanced_span,
    },
    RecoveryStrategy {
        name: "direct",
        applies: always,
        attempt: direct,
    },
    RecoveryStrategy {
        name: "string-literal",
        applies: is_string_literal,
        attempt: string_literal,
    },
    RecoveryStrategy {
        name: "unescape",
        applies: has_escape_sequences,
        attempt: unescape,
    },
    RecoveryStrategy {
        name: "truncate",
        applies: always,
        attempt: truncate,
    },
];

struct RecoveryChain {
    max_depth: usize,
}

impl RecoveryChain {
    /// Try every applicable strategy in order, stopping at the first success.
    fn run(&self, interior: &str, depth: usize) -> Result<DatasetMap, (Vec<&'static str>, RecoveryError)> {
        let mut attempted = Vec::new();
        let mut last = RecoveryError::NoObject;

        for strategy in STRATEGIES.iter().filter(|s| (s.applies)(interior)) {
            attempted.push(strategy.name);
            match (strategy.attempt)(self, interior, depth) {
                Ok(datasets) => {
                    debug!(strategy = strategy.name, datasets = datasets.len(), depth, "Dataset block recovered");
                    return Ok(datasets);
                }
                Err(e) => last = e,
            }
        }

        Err((attempted, last))
    }
}

/// Scans text for dataset blocks and recovers their datasets.
#[derive(Debug, Clone)]
pub struct DatasetBlockExtractor {
    preview_chars: usize,
    max_unescape_depth: usize,
}

impl Default for DatasetBlockExtractor {
    fn default() -> Self {
        Self::new(50, 2)
    }
}

impl DatasetBlockExtractor {
    pub fn new(preview_chars: usize, max_unescape_depth: usize) -> Self {
        Self {
            preview_chars,
            max_unescape_depth,
        }
    }

    pub fn extract(&self, text: &str) -> BlockExtraction {
        let chain = RecoveryChain {
            max_depth: self.max_unescape_depth,
        };

        // Left to right: a later block's keys overwrite an earlier block's.
        let extraction = BLOCK_RE
            .captures_iter(text)
            .enumerate()
            .fold(BlockExtraction::default(), |acc, (index, caps)| {
                let interior = caps.get(1).map_or("", |m| m.as_str());
                self.fold_block(acc, &chain, index, interior)
            });

        BlockExtraction {
            cleaned_text: BLOCK_RE.replace_all(text, "").trim().to_string(),
            ..extraction
        }
    }

    fn fold_block(
        &self,
        acc: BlockExtraction,
        chain: &RecoveryChain,
        index: usize,
        interior: &str,
    ) -> BlockExtraction {
        let BlockExtraction {
            cleaned_text,
            mut datasets,
            blocks_found,
            mut recovered,
            mut failures,
        } = acc;

        match chain.run(interior.trim(), 0) {
            Ok(found) => {
                datasets.extend(found);
                recovered += 1;
            }
            Err((attempted, reason)) => {
                let failure = BlockFailure {
                    index,
                    preview: preview(interior, self.preview_chars),
                    attempted,
                    reason,
                };
                warn!(
                    block = index,
                    preview = %failure.preview,
                    attempted = ?failure.attempted,
                    reason = %failure.reason,
                    "Malformed dataset block skipped"
                );
                failures.push(failure);
            }
        }

        BlockExtraction {
            cleaned_text,
            datasets,
            blocks_found: blocks_found + 1,
            recovered,
            failures,
        }
    }
}

/// Extract with default settings.
pub fn extract_dataset_blocks(text: &str) -> BlockExtraction {
    DatasetBlockExtractor::default().extract(text)
}

fn always(_: &str) -> bool {
    true
}

fn has_open_brace(text: &str) -> bool {
    text.contains('{')
}

fn is_string_literal(text: &str) -> bool {
    text.len() >= 2 && text.starts_with('"') && text.ends_with('"')
}

fn has_escape_sequences(text: &str) -> bool {
    text.contains("\\n") || text.contains("\\\"")
}

/// Walk every top-level object and merge those carrying `datasets`.
fn multi_object(_: &RecoveryChain, text: &str, _: usize) -> Result<DatasetMap, RecoveryError> {
    let mut merged: Option<DatasetMap> = None;
    let mut last = RecoveryError::NoObject;
    let mut cursor = 0;

    while let Some((start, end)) = find_balanced(text, cursor) {
        match parse_json(&text[start..=end]).and_then(datasets_of) {
            Ok(found) => merged.get_or_insert_with(DatasetMap::new).extend(found),
            Err(e) => last = e,
        }
        cursor = end + 1;
    }

    if merged.is_none() && cursor == 0 && text.contains('{') {
        last = RecoveryError::Unbalanced;
    }
    merged.ok_or(last)
}

/// First top-level object only; trailing text after it is ignored.
fn balanced_span(_: &RecoveryChain, text: &str, _: usize) -> Result<DatasetMap, RecoveryError> {
    let (start, end) = find_balanced(text, 0).ok_or(RecoveryError::Unbalanced)?;
    parse_json(&text[start..=end]).and_then(datasets_of)
}

fn direct(_: &RecoveryChain, text: &str, _: usize) -> Result<DatasetMap, RecoveryError> {
    parse_json(text).and_then(datasets_of)
}

/// The block is one JSON string holding the real payload; unescape and rerun the chain.
fn string_literal(chain: &RecoveryChain, text: &str, depth: usize) -> Result<DatasetMap, RecoveryError> {
    if depth >= chain.max_depth {
        return Err(RecoveryError::DepthExceeded(chain.max_depth));
    }
    let unescaped: String = serde_json::from_str(text)?;
    chain
        .run(unescaped.trim(), depth + 1)
        .map_err(|(_, reason)| RecoveryError::Nested(Box::new(reason)))
}

fn unescape(_: &RecoveryChain, text: &str, _: usize) -> Result<DatasetMap, RecoveryError> {
    parse_json(&unescape_sequences(text)).and_then(datasets_of)
}

/// Cut everything after the last `}` and before the first `{`.
fn truncate(_: &RecoveryChain, text: &str, _: usize) -> Result<DatasetMap, RecoveryError> {
    let cleaned = if has_escape_sequences(text) {
        unescape_sequences(text)
    } else {
        text.to_string()
    };

    let end = cleaned.rfind('}').ok_or(RecoveryError::NoObject)?;
    let head = &cleaned[..=end];
    let start = head.find('{').ok_or(RecoveryError::NoObject)?;
    parse_json(&head[start..]).and_then(datasets_of)
}

fn unescape_sequences(text: &str) -> String {
    text.replace("\\n", "\n")
        .replace("\\\"", "\"")
        .replace("\\\\", "\\")
}

fn parse_json(text: &str) -> Result<Value, RecoveryError> {
    Ok(serde_json::from_str(text)?)
}

fn datasets_of(value: Value) -> Result<DatasetMap, RecoveryError> {
    match value {
        Value::Object(mut root) => match root.remove("datasets") {
            Some(Value::Object(datasets)) => Ok(datasets.into_iter().collect()),
            _ => Err(RecoveryError::MissingDatasets),
        },
        _ => Err(RecoveryError::MissingDatasets),
    }
}

/// Byte range (inclusive) of the first brace-balanced object at or after `from`.
/// Braces inside JSON string literals do not count.
fn find_balanced(text: &str, from: usize) -> Option<(usize, usize)> {
    let start = from + text.get(from..)?.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in text.as_bytes().iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((start, i));
                }
            }
            _ => {}
        }
    }
    None
}

fn preview(text: &str, max_chars: usize) -> String {
    let head: String = text.chars().take(max_chars).collect();
    let head = head.replace('\n', "\\n");
    if text.chars().count() > max_chars {
        format!("{}...", head)
    } else {
        head
    }
}
