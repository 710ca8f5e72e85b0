//! High-level pipeline: orchestrates precheck → schema build → remote write →
//! file sync → commit for one publish invocation.
//!
//! This module provides the top-level orchestration logic for publishing a
//! resource into an external archival repository. It implements a coordinated
//! pipeline that:
//!   - Gates on the PII screening outcome and a connection probe before
//!     anything else runs
//!   - Validates the metadata snapshot and builds the target schema with no
//!     network involved, so a rejected record never creates remote state
//!   - Creates the remote dataset, or updates it when a publication record
//!     already exists for the (resource, repository, collection) tuple
//!   - Uploads every file declared in the snapshot's file-id list through the
//!     two-phase presigned scheme, with a content digest computed per file
//!   - Replaces the local publication record and marks the resource published
//!
//! # Major Types
//! - [`PublishRequest`]: identifies the (resource, repository, collection)
//!   tuple for one run
//! - [`PublishReport`]: what was written remotely, for downstream audit
//!
//! # Responsibilities
//! - Fail-fast orchestration: the first failed step aborts the run
//! - Heuristic cleanup on remote failure (status reversion on 400/500, stale
//!   record deletion on update-404, best-effort remote delete), not a
//!   compensating transaction
//! - Invokes logging throughout for traceability (see tracing events)
//!
//! # Callable From
//! - Expects concrete async implementations of the capability traits in
//!   [`crate::contract`]; integration tests drive it with mocks
//!
//! # Concurrency
//! - Synchronous and single-threaded per invocation, one attempt per network
//!   call, no locking on the publication record or the status field.
//!   Concurrent runs against the same tuple can race on both sides; the
//!   uniqueness constraint on the tuple only prevents duplicate local rows.
//!
//! # Navigation
//! - Main entrypoint: [`publish`]

use chrono::Utc;
use sha1::{Digest, Sha1};
use tracing::{error, info};

use crate::contract::{
    FileStorage, PiiStatus, PublicationRecord, PublicationStore, RemoteDataset, RepositoryClient,
    ResourceStatus, ResourceStore,
};
use crate::error::{GateError, PublishError, RemoteError};
use crate::mapper::DataverseMapper;

/// Identifies one publish run.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub resource_id: i64,
    pub repository_id: i64,
    /// Sub-namespace within the repository to create the dataset in.
    pub collection: String,
}

/// What a successful run wrote.
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub remote_id: i64,
    pub persistent_id: String,
    pub files_uploaded: usize,
    /// Whether the run took the update path over an existing record.
    pub updated: bool,
}

/// Publish one resource into one repository collection.
///
/// Re-invoking after a successful run takes the update path for the same
/// tuple; republishing is the designed update mechanism.
pub async fn publish<C, R, P, S>(
    request: &PublishRequest,
    client: &C,
    resources: &R,
    publications: &P,
    storage: &S,
) -> Result<PublishReport, PublishError>
where
    C: RepositoryClient,
    R: ResourceStore,
    P: PublicationStore,
    S: FileStorage,
{
    info!(
        resource_id = request.resource_id,
        repository_id = request.repository_id,
        collection = %request.collection,
        "[PUBLISH] Starting publication pipeline"
    );

    // --- Precheck: PII gate, then connectivity ---
    let files = resources.files(request.resource_id).await?;

    let pii_failing = files
        .iter()
        .filter(|f| f.pii_status == PiiStatus::Failed && f.pii_terms_accepted_at.is_none())
        .count();
    if pii_failing > 0 {
        error!(
            resource_id = request.resource_id,
            pii_failing, "[PUBLISH][GATE] Files failed PII check without accepted terms"
        );
        return Err(GateError::PiiUnresolved.into());
    }

    if !client.verify_connection().await {
        error!(
            repository_id = request.repository_id,
            "[PUBLISH][GATE] Repository connection could not be verified"
        );
        return Err(GateError::ConnectionUnverified.into());
    }

    // --- Schema build: validate before any mutating remote call ---
    let metadata = resources.metadata_record(request.resource_id).await?;
    let mapper = DataverseMapper::new(&metadata, Utc::now().date_naive());

    if let Err(e) = mapper.validate() {
        error!(resource_id = request.resource_id, error = %e, "[PUBLISH] Metadata validation failed");
        return Err(e.into());
    }

    let file_ids = metadata.file_ids();

    // --- Remote write: create, or update when a record already exists ---
    let published = publications
        .find(request.resource_id, request.repository_id, &request.collection)
        .await?;
    let updated = published.is_some();

    let remote = match published {
        Some(record) => {
            update_remote(request, client, resources, publications, &mapper, &record).await?
        }
        None => create_remote(request, client, resources, &mapper).await?,
    };

    // --- File sync: only files named in the snapshot's file-id list ---
    let mut files_uploaded = 0;
    for file in &files {
        if !file_ids.contains(&file.id) {
            continue;
        }

        let stored = storage.fetch(&file.path).await?;
        let checksum = {
            let mut hasher = Sha1::new();
            hasher.update(&stored.contents);
            format!("{:x}", hasher.finalize())
        };

        info!(
            filename = %file.filename,
            size = stored.size,
            "[PUBLISH][UPLOAD] Uploading file to dataset"
        );
        if let Err(e) = client
            .upload_new_file(
                &remote.persistent_id,
                &file.filename,
                &stored.mime_type,
                &stored.contents,
                stored.size,
                &checksum,
            )
            .await
        {
            error!(filename = %file.filename, error = %e, "[PUBLISH][ERROR][UPLOAD] File upload failed");
            // Files the repository already accepted stay behind; no
            // publication record has been committed yet.
            client.delete_resource(remote.id, &request.collection).await;
            if matches!(e.status(), Some(400) | Some(500)) {
                resources
                    .set_status(request.resource_id, ResourceStatus::UnderPreparation)
                    .await?;
            }
            return Err(e.into());
        }
        files_uploaded += 1;
    }

    // --- Commit: replace any prior row, then mark published ---
    let now = Utc::now();
    if updated {
        publications
            .delete(request.resource_id, request.repository_id, &request.collection)
            .await?;
    }
    publications
        .insert(PublicationRecord {
            resource_id: request.resource_id,
            repository_id: request.repository_id,
            collection: request.collection.clone(),
            remote_id: remote.id,
            persistent_id: remote.persistent_id.clone(),
            response: remote.response.clone(),
            created_at: now,
            updated_at: now,
        })
        .await?;
    resources
        .set_status(request.resource_id, ResourceStatus::Published)
        .await?;

    info!(
        resource_id = request.resource_id,
        persistent_id = %remote.persistent_id,
        files_uploaded,
        updated,
        "[PUBLISH] Publication pipeline finished"
    );

    Ok(PublishReport {
        remote_id: remote.id,
        persistent_id: remote.persistent_id,
        files_uploaded,
        updated,
    })
}

async fn create_remote<C, R>(
    request: &PublishRequest,
    client: &C,
    resources: &R,
    mapper: &DataverseMapper<'_>,
) -> Result<RemoteDataset, PublishError>
where
    C: RepositoryClient,
    R: ResourceStore,
{
    let schema = mapper.schema();

    match client.create_resource(&schema, &request.collection).await {
        Ok(remote) => {
            info!(
                resource_id = request.resource_id,
                remote_id = remote.id,
                persistent_id = %remote.persistent_id,
                "[PUBLISH] Created dataset in repository"
            );
            Ok(remote)
        }
        Err(e) => {
            error!(resource_id = request.resource_id, error = %e, "[PUBLISH][ERROR] Dataset creation failed");
            if matches!(e.status(), Some(400) | Some(500)) {
                resources
                    .set_status(request.resource_id, ResourceStatus::UnderPreparation)
                    .await?;
            }
            // A failed create never yields an id, so there is nothing to
            // delete remotely.
            Err(e.into())
        }
    }
}

async fn update_remote<C, R, P>(
    request: &PublishRequest,
    client: &C,
    resources: &R,
    publications: &P,
    mapper: &DataverseMapper<'_>,
    record: &PublicationRecord,
) -> Result<RemoteDataset, PublishError>
where
    C: RepositoryClient,
    R: ResourceStore,
    P: PublicationStore,
{
    let schema = mapper.schema_for_update();

    // An update is a full file-set replacement: clear the old files first.
    info!(
        persistent_id = %record.persistent_id,
        "[PUBLISH] Deleting previous dataset files before update"
    );
    let result: Result<RemoteDataset, RemoteError> = async {
        client.delete_dataset_files(&record.persistent_id).await?;
        client.update_resource(&record.persistent_id, &schema).await
    }
    .await;

    match result {
        Ok(remote) => {
            info!(
                resource_id = request.resource_id,
                persistent_id = %remote.persistent_id,
                "[PUBLISH] Updated dataset in repository"
            );
            Ok(remote)
        }
        Err(e) if e.status() == Some(404) => {
            // The remote dataset is gone, not just stale. Drop the record so
            // a retry takes the create path.
            error!(
                persistent_id = %record.persistent_id,
                "[PUBLISH][ERROR] Remote dataset no longer exists, deleting stale record"
            );
            publications
                .delete(request.resource_id, request.repository_id, &request.collection)
                .await?;
            Err(PublishError::RemoteGone)
        }
        Err(e) => {
            error!(resource_id = request.resource_id, error = %e, "[PUBLISH][ERROR] Dataset update failed");
            if matches!(e.status(), Some(400) | Some(500)) {
                resources
                    .set_status(request.resource_id, ResourceStatus::UnderPreparation)
                    .await?;
            }
            Err(e.into())
        }
    }
}
