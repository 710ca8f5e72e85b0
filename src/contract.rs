//! # contract: capability interfaces for the publication pipeline
//!
//! This module defines the traits the orchestrator is generic over, plus the
//! plain data types that cross them: the wire-level [`RepositoryClient`], the
//! local [`ResourceStore`] and [`PublicationStore`], and the byte-level
//! [`FileStorage`].
//!
//! ## Interface & Extensibility
//! - Implement [`RepositoryClient`] to support another archival-system
//!   protocol; the orchestrator never learns which one it is talking to.
//! - All methods are async and return typed errors from [`crate::error`].
//! - Meant for both production code and robust mocking in tests.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall` so consumers can generate
//!   deterministic mocks for unit/integration tests.
//!
//! ## Adding New Repository Protocols
//! - Implement the trait for your protocol and add a variant to
//!   [`crate::config::RepositoryType`] so the factory can select it.
//! - Convert every non-success response into the matching
//!   [`RemoteError`]/[`UploadError`] variant; callers branch on those, never
//!   on raw response objects.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::config::RepositoryType;
use crate::error::{RemoteError, StoreError, UploadError};
use crate::record::MetadataRecord;

/// Remote dataset coordinates returned by a successful create or update.
#[derive(Debug, Clone)]
pub struct RemoteDataset {
    /// The repository's internal numeric id for the dataset.
    pub id: i64,
    /// The stable external identifier (e.g. a DOI-shaped handle).
    pub persistent_id: String,
    /// Full response body, kept verbatim as the publication snapshot.
    pub response: Value,
}

/// Lifecycle status of a resource entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    Draft,
    UnderPreparation,
    UnderReview,
    Published,
}

/// Outcome of the asynchronous PII screening job for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiiStatus {
    Pending,
    Passed,
    Failed,
}

/// A file attached to a resource, as the resource store knows it.
#[derive(Debug, Clone)]
pub struct ResourceFile {
    pub id: i64,
    pub filename: String,
    /// Path of the file's bytes in the storage backend.
    pub path: String,
    pub pii_status: PiiStatus,
    /// Set when a user explicitly accepted the terms for a PII-failing file.
    pub pii_terms_accepted_at: Option<DateTime<Utc>>,
}

/// File content fetched from the storage backend.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub contents: Vec<u8>,
    pub mime_type: String,
    pub size: u64,
}

/// Local association row tracking one published state:
/// at most one per (resource, repository, collection).
#[derive(Debug, Clone)]
pub struct PublicationRecord {
    pub resource_id: i64,
    pub repository_id: i64,
    pub collection: String,
    pub remote_id: i64,
    pub persistent_id: String,
    /// The remote response snapshot captured at publish time.
    pub response: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Wire-level operations against one archival repository.
///
/// An instance is constructed immutably from exactly one credential pair and
/// is otherwise stateless; every call is a single attempt bounded by the
/// adapter's timeout.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Lightweight authenticated probe. True only on a success status.
    async fn verify_connection(&self) -> bool;

    /// Create a dataset in `collection` from the full target schema.
    async fn create_resource(
        &self,
        schema: &Value,
        collection: &str,
    ) -> Result<RemoteDataset, RemoteError>;

    /// Update the dataset behind `persistent_id` with the narrow update
    /// envelope. A 404 means the remote object is gone, not just stale;
    /// the status stays readable on the error for the caller to branch on.
    async fn update_resource(
        &self,
        persistent_id: &str,
        schema: &Value,
    ) -> Result<RemoteDataset, RemoteError>;

    /// Best-effort dataset deletion. Never errors, including on not-found.
    async fn delete_resource(&self, id: i64, collection: &str) -> bool;

    /// Delete every file currently attached to the dataset. An update is a
    /// full file-set replacement, so the old set is cleared first.
    async fn delete_dataset_files(&self, persistent_id: &str) -> Result<(), RemoteError>;

    /// Two-phase upload: obtain a presigned location sized to `size`, write
    /// the bytes there directly, then register the stored object with the
    /// dataset under `filename`/`mime_type`/`checksum`.
    async fn upload_new_file(
        &self,
        persistent_id: &str,
        filename: &str,
        mime_type: &str,
        contents: &[u8],
        size: u64,
        checksum: &str,
    ) -> Result<(), UploadError>;

    /// Full remote dataset representation.
    async fn get_dataset_by_persistent_id(&self, persistent_id: &str)
        -> Result<Value, RemoteError>;

    /// Which protocol this client speaks.
    fn repository_type(&self) -> RepositoryType;
}

/// Read/write access to the resource entity owning the pipeline's input.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// The resource's metadata snapshot.
    async fn metadata_record(&self, resource_id: i64) -> Result<MetadataRecord, StoreError>;

    /// All files attached to the resource, with their PII outcomes.
    async fn files(&self, resource_id: i64) -> Result<Vec<ResourceFile>, StoreError>;

    /// Single-row status write; no locking is taken.
    async fn set_status(&self, resource_id: i64, status: ResourceStatus)
        -> Result<(), StoreError>;
}

/// Persistence for publication records.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PublicationStore: Send + Sync {
    async fn find(
        &self,
        resource_id: i64,
        repository_id: i64,
        collection: &str,
    ) -> Result<Option<PublicationRecord>, StoreError>;

    /// Delete the row for the tuple, if any.
    async fn delete(
        &self,
        resource_id: i64,
        repository_id: i64,
        collection: &str,
    ) -> Result<(), StoreError>;

    /// Insert a fresh row. Callers delete any prior row first: records are
    /// replaced, never merged.
    async fn insert(&self, record: PublicationRecord) -> Result<(), StoreError>;
}

/// Byte storage holding resource file content.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Fetch contents, mimetype and size for the file at `path`.
    async fn fetch(&self, path: &str) -> Result<StoredFile, StoreError>;
}
