pub mod blocks;
pub mod builder;
pub mod classify;
pub mod error;
pub mod markers;
pub mod merger;
pub mod payload;
pub mod schema;
pub mod validate;

pub use blocks::{BlockExtraction, DatasetBlockExtractor, extract_dataset_blocks};
pub use builder::{ArtifactBuilder, build_artifacts, infer_title, normalize_chart_type};
pub use classify::{Classification, ContentKind, classify};
pub use error::{BlockFailure, RecoveryError, RejectReason};
pub use markers::{parse_markers, replace_markers};
pub use merger::{ArtifactMerger, merge_artifacts};
pub use payload::InboundPayload;
pub use schema::{
    Artifact, ArtifactType, ChartType, DatasetMap, ExtractionReport, MarkerDescriptor, MarkerKind,
    ProcessedMessage,
};
pub use validate::{validate_chart, validate_table};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Turn datasets no marker references into chart artifacts.
    pub auto_wrap_unreferenced: bool,
    /// Swap markers in the cleaned text for placeholder tokens.
    pub emit_placeholders: bool,
    /// Characters of a failed block kept in the log line.
    pub preview_chars: usize,
    /// How many string-literal layers a block may be wrapped in.
    pub max_unescape_depth: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            auto_wrap_unreferenced: true,
            emit_placeholders: true,
            preview_chars: 50,
            max_unescape_depth: 2,
        }
    }
}

/// Runs classify, extract, parse, validate, build and merge over one message.
#[derive(Debug, Clone)]
pub struct Extractor {
    config: ExtractorConfig,
    blocks: DatasetBlockExtractor,
    builder: ArtifactBuilder,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            blocks: DatasetBlockExtractor::new(config.preview_chars, config.max_unescape_depth),
            builder: ArtifactBuilder::new(config.auto_wrap_unreferenced),
            config,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Process a raw backend response (string or payload object).
    pub fn process(&self, payload: &Value, prior: &[Artifact], type_hint: Option<&str>) -> ProcessedMessage {
        self.process_payload(InboundPayload::from_value(payload), prior, type_hint)
    }

    pub fn process_text(&self, text: &str, prior: &[Artifact]) -> ProcessedMessage {
        self.process_payload(InboundPayload::from_text(text), prior, None)
    }

    pub fn process_payload(
        &self,
        inbound: InboundPayload,
        prior: &[Artifact],
        type_hint: Option<&str>,
    ) -> ProcessedMessage {
        let InboundPayload {
            answer,
            datasets: out_of_band,
            artifacts: payload_artifacts,
        } = inbound;
        let priors = payload_artifacts.into_iter().chain(prior.iter().cloned());

        let classification = classify(&Value::String(answer.clone()), type_hint, None);
        let mut report = ExtractionReport {
            kind: classification.kind,
            ..ExtractionReport::default()
        };

        if !classification.kind.is_extractable() {
            debug!(kind = ?classification.kind, "Content is not extractable, passing through");
            let artifacts = merge_artifacts(Vec::new(), priors);
            report.prior_kept = artifacts.len();
            return ProcessedMessage {
                cleaned_text: answer,
                artifacts,
                datasets: out_of_band,
                report,
            };
        }

        let extraction = self.blocks.extract(&answer);

        // Text blocks win over datasets delivered beside the text.
        let mut datasets = out_of_band;
        datasets.extend(extraction.datasets);

        let markers = parse_markers(&extraction.cleaned_text);
        let built = self.builder.build(&markers, &datasets);
        let cleaned_text = if self.config.emit_placeholders {
            replace_markers(&extraction.cleaned_text, &markers, &built)
        } else {
            extraction.cleaned_text
        };

        report.blocks_found = extraction.blocks_found;
        report.blocks_recovered = extraction.recovered;
        report.blocks_failed = extraction.failures.len();
        report.markers = markers.len();
        report.artifacts_built = built.len();

        let artifacts = merge_artifacts(built, priors);
        report.prior_kept = artifacts.len() - report.artifacts_built;

        debug!(
            kind = ?report.kind,
            blocks = report.blocks_found,
            failed = report.blocks_failed,
            markers = report.markers,
            built = report.artifacts_built,
            prior_kept = report.prior_kept,
            "Processed message"
        );

        ProcessedMessage {
            cleaned_text,
            artifacts,
            datasets,
            report,
        }
    }
}
