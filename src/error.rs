//! Error types for the detection pipeline.
//!
//! Each component exposes a closed enum; errors cross component boundaries
//! as values and get logged exactly once, at the boundary that handles them.

use thiserror::Error;

/// Lifecycle violations returned by the pipeline registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("pipeline is already running")]
    AlreadyRunning,
    #[error("pipeline is not running")]
    NotRunning,
}

/// Failures from the record store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("flow record not found: {0}")]
    FlowNotFound(String),
    #[error("response record not found for flow: {0}")]
    ResponseNotFound(String),
    #[error("duplicate record id: {0}")]
    DuplicateId(String),
}

/// Top-level pipeline failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to read batch file {path}: {source}")]
    BatchRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed flow row at line {line}: {source}")]
    BatchParse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_errors_render_messages() {
        assert_eq!(
            LifecycleError::AlreadyRunning.to_string(),
            "pipeline is already running"
        );
        assert_eq!(
            LifecycleError::NotRunning.to_string(),
            "pipeline is not running"
        );
    }

    #[test]
    fn store_error_carries_flow_id() {
        let err = StoreError::ResponseNotFound("flow_x".into());
        assert!(err.to_string().contains("flow_x"));
    }
}
