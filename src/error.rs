//! Error types.
//!
//! Collaborator failures (LLM, dataset, literature sources, tools) each get their own enum so
//! callers can decide whether a failure is fatal for a step, a stage or
//! nothing at all. `PipelineError` is the taxonomy surfaced per step.

use thiserror::Error;

/// Failure talking to the reasoning collaborator.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("cannot connect to model endpoint at {0}")]
    Connect(String),

    #[error("model API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to send request: {0}")]
    Request(String),

    #[error("failed to decode model response: {0}")]
    Decode(String),

    #[error("model returned an empty response")]
    Empty,
}

/// Failure loading a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dataset is {size_mb:.1} MB, larger than the {limit_mb} MB limit")]
    TooLarge { size_mb: f64, limit_mb: u64 },

    #[error("unsupported dataset format '{0}': only CSV files are supported")]
    UnsupportedFormat(String),

    #[error("invalid dataset format: {0}")]
    Unparsable(String),

    #[error("dataset is empty")]
    Empty,
}

/// Failure querying a literature source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{source_name} request failed: {message}")]
    Request {
        source_name: String,
        message: String,
    },

    #[error("{source_name} returned HTTP {status}")]
    Status { source_name: String, status: u16 },

    #[error("{source_name} returned an unexpected payload: {message}")]
    Decode {
        source_name: String,
        message: String,
    },
}

/// Failure inside a tool operation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("column '{0}' not found in dataset")]
    MissingColumn(String),

    #[error("{0}")]
    InsufficientData(String),

    #[error("failed to write artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures the pipeline reports to the user.
///
/// Only `DatasetRequired` stops stages from running; the rest are recorded
/// on the step that raised them.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("A dataset is required for this request. Please attach a CSV file and try again.")]
    DatasetRequired,

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("{0}")]
    ColumnResolution(String),

    #[error("Error executing {tool}: {source}")]
    ToolExecution {
        tool: String,
        #[source]
        source: ToolError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_execution_message_keeps_cause() {
        let err = PipelineError::ToolExecution {
            tool: "chi_square_test".to_string(),
            source: ToolError::MissingColumn("Age".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Error executing chi_square_test: column 'Age' not found in dataset"
        );
    }

    #[test]
    fn test_unknown_tool_message() {
        let err = PipelineError::UnknownTool("Python".to_string());
        assert_eq!(err.to_string(), "Unknown tool: Python");
    }
}
