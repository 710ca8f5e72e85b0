//! Typed failure taxonomy for the publication pipeline.
//!
//! Callers match on [`PublishError`] rather than inspecting numeric codes out
//! of a caught exception: each variant says which stage failed and carries the
//! detail that stage produced. Validation and gate failures happen before any
//! remote mutation, so they never require cleanup; remote and upload failures
//! drive the status-code cleanup in the orchestrator.

use thiserror::Error;

/// Metadata failed local validation. Raised before any network call, naming
/// the first missing field in check order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no titles found in metadata")]
    MissingTitle,
    #[error("no descriptions found in metadata")]
    MissingDescription,
    #[error("no authors found in metadata")]
    MissingAuthors,
    #[error("no contact points found in metadata")]
    MissingContactPoints,
}

/// A publication precondition was unmet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// At least one file failed the PII check and has no accepted terms.
    #[error(
        "the resource cannot be published because it has files that have not \
         passed PII check and do not have any terms accepted"
    )]
    PiiUnresolved,
    /// The authenticated connection probe against the repository failed.
    #[error("the connection with the specified repository cannot be verified")]
    ConnectionUnverified,
}

/// A mutating call against the remote repository did not succeed.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Non-success status; the body is kept verbatim for the caller.
    #[error("repository returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// The call never produced a response (connect failure, timeout).
    #[error("transport failure talking to repository")]
    Transport(#[from] reqwest::Error),
    /// The response was a success but lacked a field the protocol requires.
    #[error("repository response missing field {0}")]
    MissingField(&'static str),
}

impl RemoteError {
    /// HTTP status of the failed call, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            RemoteError::Transport(e) => e.status().map(|s| s.as_u16()),
            RemoteError::MissingField(_) => None,
        }
    }
}

/// The two-phase file upload failed.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Requesting the presigned upload location failed.
    #[error("failed to obtain an upload location for {filename}")]
    Presign {
        filename: String,
        #[source]
        source: RemoteError,
    },
    /// The direct binary write to the presigned location was not accepted.
    /// The storage backend answers outside the repository's JSON protocol,
    /// so no status is carried here.
    #[error("failed to upload file {filename} to storage")]
    DirectWrite { filename: String },
    /// Registering the uploaded object with the dataset failed.
    #[error("failed to attach file {filename} to the dataset")]
    Register {
        filename: String,
        #[source]
        source: RemoteError,
    },
}

impl UploadError {
    /// Status of the underlying repository call, where one exists.
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Presign { source, .. } | UploadError::Register { source, .. } => {
                source.status()
            }
            UploadError::DirectWrite { .. } => None,
        }
    }
}

/// A local collaborator (resource store, publication store, byte storage)
/// failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        StoreError(msg.into())
    }
}

/// Caller-facing sum of everything the pipeline can report.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("metadata validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Gate(#[from] GateError),
    #[error("failed to import the resource in the remote repository: {0}")]
    Remote(#[from] RemoteError),
    #[error("failed to create new files for resource: {0}")]
    Upload(#[from] UploadError),
    /// The remote dataset behind a known publication record no longer exists.
    /// The stale record has been deleted; the same request can be retried and
    /// will take the create path.
    #[error("the resource could not be updated, please try again")]
    RemoteGone,
    #[error("local store failure: {0}")]
    Store(#[from] StoreError),
}
