// src/error.rs

use thiserror::Error;

/// Why a file could not be turned into text or an image payload.
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("Unsupported file format.")]
    UnsupportedFormat,

    #[error("Could not read PDF text: {0}")]
    PdfUnreadable(String),

    #[error("Could not read PDF text: document is encrypted")]
    PdfEncrypted,

    #[error("Could not read file: {0}")]
    Io(#[from] std::io::Error),
}

/// Why structured extraction did not produce a record.
///
/// None of these reach the caller of `StructuredExtractor::extract`;
/// the policy layer logs them and substitutes the mock record.
#[derive(Error, Debug)]
pub enum ModelFailure {
    #[error("no model credential configured")]
    NotConfigured,

    #[error("content cannot be processed: {0}")]
    UnsupportedContent(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("empty response from LLM")]
    EmptyResponse,

    #[error("failed to parse LLM response: {0}")]
    Parse(String),
}

/// Persistence failures from the invoice store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing file is held exclusively by another process (e.g. open in Excel).
    #[error("Excel file is open. Please close it. ({path})")]
    Locked { path: String },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read table: {0}")]
    Read(#[from] calamine::XlsxError),

    #[error("failed to write table: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),

    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

impl StoreError {
    /// Classify an I/O error against `path`, separating lock conflicts from other failures.
    pub fn from_io(err: std::io::Error, path: &std::path::Path) -> Self {
        // 32/33: ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION on Windows
        let locked = err.kind() == std::io::ErrorKind::PermissionDenied
            || (cfg!(windows) && matches!(err.raw_os_error(), Some(32) | Some(33)));
        if locked {
            StoreError::Locked {
                path: path.display().to_string(),
            }
        } else {
            StoreError::Io(err)
        }
    }
}

/// Errors surfaced by the request-handling layer.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    ContentUnreadable(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid invoice JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to render output: {0}")]
    Output(#[source] serde_json::Error),
}

impl PipelineError {
    /// HTTP-style status for this error: client errors are 400, everything else 500.
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::ContentUnreadable(_) | PipelineError::Json(_) => 400,
            PipelineError::Store(_) | PipelineError::Io(_) | PipelineError::Output(_) => 500,
        }
    }

    /// Message shown to the user; lock conflicts get the remediation hint only.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Store(StoreError::Locked { .. }) => {
                "Excel file is open. Please close it.".to_string()
            }
            other => other.to_string(),
        }
    }
}
