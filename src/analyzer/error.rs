use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Source unreachable: {0}")]
    SourceUnreachable(String),

    #[error("Reference not found: {0}")]
    ReferenceMissing(String),

    #[error("History traversal failed: {0}")]
    TraversalFailed(String),

    #[error("Failed to compute changed files for commit {commit}: {reason}")]
    StatComputationFailed { commit: String, reason: String },

    #[error("Failed to write report: {0}")]
    SinkWriteFailed(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Analysis error: {0}")]
    AnalysisError(String),
}
