use rusoto_core::RusotoError;
use rusoto_s3::DeleteObjectError;
use thiserror::Error;

use crate::recording::{Id, Recording};

/// A boxed cause for failures that come from several transports.
pub type Cause = Box<dyn std::error::Error + Send + Sync>;

/// Enumerates input problems that are reported without touching the
/// network.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("title is required")]
    MissingTitle,

    #[error("URL is required")]
    MissingUrl,

    #[error("invalid URL {url:?}")]
    InvalidUrl { url: String, source: url::ParseError },

    #[error("{mime_type} is not an accepted audio type")]
    InvalidType { mime_type: String },

    #[error("file is {size} bytes, more than the limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("file name is missing")]
    MissingFileName,
}

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Represents a failed blob transfer.
    #[error("upload failed: {source}")]
    UploadFailed { source: Cause },

    #[error("upload cancelled")]
    UploadCancelled,

    #[error("recording {0} does not exist")]
    NonExistentId(Id),

    #[error("invalid recording ID {0:?}")]
    InvalidId(String),

    /// Represents a non-success response from a remote store.
    #[error("store rejected the request with status {status}: {message}")]
    StoreRejected { status: u16, message: String },

    #[error("{failed} of {attempted} deletions failed")]
    PartialBulkFailure { failed: usize, attempted: usize },

    /// The change was stored, but the playlist could not be listed again
    /// afterwards.
    #[error("saved recording {} but could not refresh the playlist: {source}", .recording.id)]
    RelistFailed {
        recording: Box<Recording>,
        source: Box<BackendError>,
    },

    #[error("URL {0} does not belong to this store")]
    ForeignUrl(url::Url),

    #[error("failed to generate URL")]
    FailedToGenerateUrl { source: url::ParseError },

    #[error("failed to delete object")]
    DeleteFailed { source: RusotoError<DeleteObjectError> },

    /// Represents an SQL error.
    #[error("SQLx error")]
    Sqlx { source: sqlx::Error },

    #[error("request failed")]
    Request { source: reqwest::Error },

    #[error("malformed form submission")]
    MalformedFormSubmission,

    #[error("missing parts")]
    PartsMissing,

    #[error("error with temporary file")]
    TemporaryFileError(std::io::Error),

    #[error("could not run {tool}")]
    ToolFailed { tool: &'static str, source: std::io::Error },

    #[error("{tool} exited unsuccessfully: {stderr}")]
    ToolExited { tool: &'static str, stderr: String },

    #[error("malformed ffprobe output")]
    MalformedFfprobeOutput(serde_json::Error),
}

/// The categories errors are reported under.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ErrorKind {
    /// Bad input; never retried.
    Validation,

    /// The blob transfer failed or was cancelled; the user may retry.
    Transfer,

    /// The recording store refused a mutation.
    Store,

    /// Some deletions of a bulk clear failed.
    PartialBulkFailure,

    Internal,
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        use BackendError::*;

        match self {
            Validation(_) | InvalidId(_) | MalformedFormSubmission | PartsMissing => {
                ErrorKind::Validation
            }
            UploadFailed { .. } | UploadCancelled => ErrorKind::Transfer,
            NonExistentId(_)
            | StoreRejected { .. }
            | RelistFailed { .. }
            | Sqlx { .. }
            | Request { .. } => ErrorKind::Store,
            PartialBulkFailure { .. } => ErrorKind::PartialBulkFailure,
            _ => ErrorKind::Internal,
        }
    }

    /// The recording a mutation stored, if it got that far.
    pub fn persisted(&self) -> Option<&Recording> {
        match self {
            BackendError::RelistFailed { recording, .. } => Some(recording.as_ref()),
            _ => None,
        }
    }

    pub(crate) fn upload_failed(source: impl Into<Cause>) -> Self {
        BackendError::UploadFailed {
            source: source.into(),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(source: reqwest::Error) -> Self {
        BackendError::Request { source }
    }
}
