use thiserror::Error;

/// Why a single recovery strategy could not produce a dataset mapping.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecoveryError {
    #[error("no opening brace found")]
    NoObject,

    #[error("braces never balance")]
    Unbalanced,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("parsed value has no `datasets` object")]
    MissingDatasets,

    #[error("string literal nesting exceeds depth {0}")]
    DepthExceeded(usize),

    #[error("unescaped text failed: {0}")]
    Nested(Box<RecoveryError>),
}

impl From<serde_json::Error> for RecoveryError {
    fn from(err: serde_json::Error) -> Self {
        RecoveryError::InvalidJson(err.to_string())
    }
}

/// A dataset block that exhausted every strategy.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("block {index} unrecoverable after [{}]: {reason}", .attempted.join(", "))]
pub struct BlockFailure {
    /// Zero-based position of the block in scan order.
    pub index: usize,
    pub preview: String,
    pub attempted: Vec<&'static str>,
    pub reason: RecoveryError,
}

/// Why a dataset was refused for the requested shape.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("dataset `{data_id}` not found; available: [{}]", .available.join(", "))]
    DatasetNotFound {
        data_id: String,
        available: Vec<String>,
    },

    #[error("dataset `{data_id}` is not a {expected} (declared: {found})")]
    KindMismatch {
        data_id: String,
        expected: &'static str,
        found: String,
    },

    #[error("dataset `{data_id}` has missing or empty columns")]
    MissingColumns { data_id: String },

    #[error("dataset `{data_id}` rows are not a sequence")]
    RowsNotSequence { data_id: String },

    #[error("dataset `{data_id}` has no series sequence")]
    SeriesNotSequence { data_id: String },

    #[error("dataset `{data_id}` series entry {index} is missing a name or data array")]
    InvalidSeriesEntry { data_id: String, index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_failure_display() {
        let failure = BlockFailure {
            index: 1,
            preview: "not json".to_string(),
            attempted: vec!["direct", "truncate"],
            reason: RecoveryError::NoObject,
        };

        assert_eq!(
            failure.to_string(),
            "block 1 unrecoverable after [direct, truncate]: no opening brace found"
        );
    }

    #[test]
    fn test_reject_reason_lists_available() {
        let reason = RejectReason::DatasetNotFound {
            data_id: "x".to_string(),
            available: vec!["a".to_string(), "b".to_string()],
        };

        assert_eq!(reason.to_string(), "dataset `x` not found; available: [a, b]");
    }
}
