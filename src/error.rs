use thiserror::Error;

/// Failures that abort the process before any tab exists.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration missing: {0}")]
    ConfigMissing(String),
    #[error("no styles found in {0}")]
    NoStylesFound(String),
    #[error("source text is empty")]
    ClipboardEmpty,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {code}: {body}")]
    HttpStatus { code: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Raised when first-pass output cannot be used as an analysis. Never leaves
/// the two-pass transform.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("analysis is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("{stage} request failed: {source}")]
    Transport {
        stage: &'static str,
        #[source]
        source: TransportError,
    },
    #[error("pipeline stopped: {0}")]
    Aborted(String),
}

impl PipelineError {
    pub fn transport(stage: &'static str, source: TransportError) -> Self {
        Self::Transport { stage, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_message_names_stage_and_cause() {
        let err = PipelineError::transport(
            "second pass",
            TransportError::HttpStatus {
                code: 429,
                body: "slow down".to_string(),
            },
        );
        assert_eq!(
            err.to_string(),
            "second pass request failed: HTTP 429: slow down"
        );
    }

    #[test]
    fn test_no_styles_found_reports_directory() {
        let err = StartupError::NoStylesFound("/tmp/styles".to_string());
        assert!(err.to_string().contains("/tmp/styles"));
    }
}
