use chrono::Utc;
use serde_json::json;

use dataset_publisher::contract::{
    MockFileStorage, MockPublicationStore, MockRepositoryClient, MockResourceStore, PiiStatus,
    PublicationRecord, RemoteDataset, ResourceFile, ResourceStatus, StoredFile,
};
use dataset_publisher::error::{GateError, PublishError, RemoteError, UploadError, ValidationError};
use dataset_publisher::publish::{publish, PublishRequest};
use dataset_publisher::record::MetadataRecord;

fn request() -> PublishRequest {
    PublishRequest {
        resource_id: 7,
        repository_id: 3,
        collection: "root".to_string(),
    }
}

fn metadata_with_files(file_ids: &[i64]) -> MetadataRecord {
    let files: Vec<_> = file_ids.iter().map(|id| json!({ "id": id })).collect();
    MetadataRecord::new(json!({
        "title": [{"value": "Soil moisture measurements"}],
        "description": [{"value": "Field measurements over two seasons"}],
        "authors": [{"full_name": "A. Researcher"}],
        "contact_points": [{"full_name": "A. Researcher", "email": "a.researcher@example.org"}],
        "rights": {"license": "CC0 1.0"},
        "resource_files": files,
    }))
}

fn clean_file(id: i64, filename: &str) -> ResourceFile {
    ResourceFile {
        id,
        filename: filename.to_string(),
        path: format!("resources/7/{filename}"),
        pii_status: PiiStatus::Passed,
        pii_terms_accepted_at: None,
    }
}

fn stored(contents: &[u8]) -> StoredFile {
    StoredFile {
        contents: contents.to_vec(),
        mime_type: "text/csv".to_string(),
        size: contents.len() as u64,
    }
}

fn created_dataset(id: i64, persistent_id: &str) -> RemoteDataset {
    RemoteDataset {
        id,
        persistent_id: persistent_id.to_string(),
        response: json!({"data": {"id": id, "persistentId": persistent_id}}),
    }
}

fn prior_record() -> PublicationRecord {
    PublicationRecord {
        resource_id: 7,
        repository_id: 3,
        collection: "root".to_string(),
        remote_id: 11,
        persistent_id: "doi:10.5072/OLD".to_string(),
        response: json!({"data": {"id": 11, "persistentId": "doi:10.5072/OLD"}}),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_fresh_publish_creates_one_record_and_marks_published() {
    let mut client = MockRepositoryClient::new();
    client.expect_verify_connection().return_once(|| true);
    client
        .expect_create_resource()
        .times(1)
        .withf(|schema, collection| {
            collection == "root" && schema.get("datasetVersion").is_some()
        })
        .returning(|_, _| Ok(created_dataset(42, "doi:10.5072/NEW")));
    // sha1("hello"), as computed by the orchestrator over the stored bytes.
    client
        .expect_upload_new_file()
        .times(1)
        .withf(|persistent_id, filename, mime_type, _contents, size, checksum| {
            persistent_id == "doi:10.5072/NEW"
                && filename == "a.csv"
                && mime_type == "text/csv"
                && *size == 5
                && checksum == "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        })
        .returning(|_, _, _, _, _, _| Ok(()));

    let mut resources = MockResourceStore::new();
    resources
        .expect_files()
        .returning(|_| Ok(vec![clean_file(1, "a.csv")]));
    resources
        .expect_metadata_record()
        .returning(|_| Ok(metadata_with_files(&[1])));
    resources
        .expect_set_status()
        .times(1)
        .withf(|_, status| *status == ResourceStatus::Published)
        .returning(|_, _| Ok(()));

    let mut publications = MockPublicationStore::new();
    publications.expect_find().returning(|_, _, _| Ok(None));
    publications
        .expect_insert()
        .times(1)
        .withf(|record| {
            record.persistent_id == "doi:10.5072/NEW"
                && record.remote_id == 42
                && record.collection == "root"
        })
        .returning(|_| Ok(()));

    let mut storage = MockFileStorage::new();
    storage.expect_fetch().returning(|_| Ok(stored(b"hello")));

    let report = publish(&request(), &client, &resources, &publications, &storage)
        .await
        .expect("fresh publish should succeed");

    assert_eq!(report.remote_id, 42);
    assert_eq!(report.persistent_id, "doi:10.5072/NEW");
    assert_eq!(report.files_uploaded, 1);
    assert!(!report.updated);
}

#[tokio::test]
async fn test_republish_takes_update_path_and_replaces_record() {
    let mut client = MockRepositoryClient::new();
    client.expect_verify_connection().return_once(|| true);
    client
        .expect_delete_dataset_files()
        .times(1)
        .withf(|persistent_id| persistent_id == "doi:10.5072/OLD")
        .returning(|_| Ok(()));
    client
        .expect_update_resource()
        .times(1)
        .withf(|persistent_id, schema| {
            // The update envelope is the inner version object, unwrapped.
            persistent_id == "doi:10.5072/OLD" && schema.get("datasetVersion").is_none()
        })
        .returning(|_, _| {
            Ok(RemoteDataset {
                id: 11,
                persistent_id: "doi:10.5072/OLD".to_string(),
                response: json!({"data": {"id": 11, "datasetPersistentId": "doi:10.5072/OLD"}}),
            })
        });
    client
        .expect_upload_new_file()
        .times(1)
        .returning(|_, _, _, _, _, _| Ok(()));

    let mut resources = MockResourceStore::new();
    resources
        .expect_files()
        .returning(|_| Ok(vec![clean_file(1, "a.csv")]));
    resources
        .expect_metadata_record()
        .returning(|_| Ok(metadata_with_files(&[1])));
    resources
        .expect_set_status()
        .times(1)
        .withf(|_, status| *status == ResourceStatus::Published)
        .returning(|_, _| Ok(()));

    let mut publications = MockPublicationStore::new();
    publications
        .expect_find()
        .returning(|_, _, _| Ok(Some(prior_record())));
    publications
        .expect_delete()
        .times(1)
        .returning(|_, _, _| Ok(()));
    publications
        .expect_insert()
        .times(1)
        .withf(|record| record.persistent_id == "doi:10.5072/OLD" && record.remote_id == 11)
        .returning(|_| Ok(()));

    let mut storage = MockFileStorage::new();
    storage.expect_fetch().returning(|_| Ok(stored(b"hello")));

    let report = publish(&request(), &client, &resources, &publications, &storage)
        .await
        .expect("republish should succeed");

    assert!(report.updated);
    assert_eq!(report.persistent_id, "doi:10.5072/OLD");
}

#[tokio::test]
async fn test_create_failure_500_reverts_status_and_commits_nothing() {
    let mut client = MockRepositoryClient::new();
    client.expect_verify_connection().return_once(|| true);
    client.expect_create_resource().times(1).returning(|_, _| {
        Err(RemoteError::Status {
            status: 500,
            body: "{\"status\":\"ERROR\"}".to_string(),
        })
    });

    let mut resources = MockResourceStore::new();
    resources
        .expect_files()
        .returning(|_| Ok(vec![clean_file(1, "a.csv")]));
    resources
        .expect_metadata_record()
        .returning(|_| Ok(metadata_with_files(&[1])));
    resources
        .expect_set_status()
        .times(1)
        .withf(|_, status| *status == ResourceStatus::UnderPreparation)
        .returning(|_, _| Ok(()));

    let mut publications = MockPublicationStore::new();
    publications.expect_find().returning(|_, _, _| Ok(None));

    let storage = MockFileStorage::new();

    let err = publish(&request(), &client, &resources, &publications, &storage)
        .await
        .expect_err("create failure should abort the run");

    assert!(matches!(
        err,
        PublishError::Remote(RemoteError::Status { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_update_404_deletes_stale_record_and_commits_nothing() {
    let mut client = MockRepositoryClient::new();
    client.expect_verify_connection().return_once(|| true);
    client
        .expect_delete_dataset_files()
        .returning(|_| Ok(()));
    client.expect_update_resource().times(1).returning(|_, _| {
        Err(RemoteError::Status {
            status: 404,
            body: "{\"status\":\"ERROR\",\"message\":\"not found\"}".to_string(),
        })
    });

    let mut resources = MockResourceStore::new();
    resources
        .expect_files()
        .returning(|_| Ok(vec![clean_file(1, "a.csv")]));
    resources
        .expect_metadata_record()
        .returning(|_| Ok(metadata_with_files(&[1])));

    let mut publications = MockPublicationStore::new();
    publications
        .expect_find()
        .returning(|_, _, _| Ok(Some(prior_record())));
    publications
        .expect_delete()
        .times(1)
        .withf(|resource_id, repository_id, collection| {
            *resource_id == 7 && *repository_id == 3 && collection == "root"
        })
        .returning(|_, _, _| Ok(()));

    let storage = MockFileStorage::new();

    let err = publish(&request(), &client, &resources, &publications, &storage)
        .await
        .expect_err("update against a vanished dataset should abort");

    assert!(matches!(err, PublishError::RemoteGone));
}

#[tokio::test]
async fn test_only_files_named_in_snapshot_are_uploaded() {
    let mut client = MockRepositoryClient::new();
    client.expect_verify_connection().return_once(|| true);
    client
        .expect_create_resource()
        .returning(|_, _| Ok(created_dataset(42, "doi:10.5072/NEW")));
    client
        .expect_upload_new_file()
        .times(1)
        .withf(|_, filename, _, _, _, _| filename == "a.csv")
        .returning(|_, _, _, _, _, _| Ok(()));

    let mut resources = MockResourceStore::new();
    resources
        .expect_files()
        .returning(|_| Ok(vec![clean_file(1, "a.csv"), clean_file(2, "b.csv")]));
    // The snapshot names only file 1; file 2 was attached afterwards.
    resources
        .expect_metadata_record()
        .returning(|_| Ok(metadata_with_files(&[1])));
    resources
        .expect_set_status()
        .returning(|_, _| Ok(()));

    let mut publications = MockPublicationStore::new();
    publications.expect_find().returning(|_, _, _| Ok(None));
    publications.expect_insert().returning(|_| Ok(()));

    let mut storage = MockFileStorage::new();
    storage
        .expect_fetch()
        .times(1)
        .withf(|path| path.ends_with("a.csv"))
        .returning(|_| Ok(stored(b"hello")));

    let report = publish(&request(), &client, &resources, &publications, &storage)
        .await
        .expect("publish should succeed");

    assert_eq!(report.files_uploaded, 1);
}

#[tokio::test]
async fn test_pii_failing_file_without_accepted_terms_blocks_publication() {
    // No client expectations: any remote call would fail the test.
    let client = MockRepositoryClient::new();

    let mut resources = MockResourceStore::new();
    resources.expect_files().returning(|_| {
        Ok(vec![ResourceFile {
            pii_status: PiiStatus::Failed,
            pii_terms_accepted_at: None,
            ..clean_file(1, "a.csv")
        }])
    });

    let publications = MockPublicationStore::new();
    let storage = MockFileStorage::new();

    let err = publish(&request(), &client, &resources, &publications, &storage)
        .await
        .expect_err("PII gate should reject");

    assert!(matches!(err, PublishError::Gate(GateError::PiiUnresolved)));
}

#[tokio::test]
async fn test_pii_failing_file_with_accepted_terms_passes_the_gate() {
    let mut client = MockRepositoryClient::new();
    client.expect_verify_connection().return_once(|| true);
    client
        .expect_create_resource()
        .returning(|_, _| Ok(created_dataset(42, "doi:10.5072/NEW")));
    client
        .expect_upload_new_file()
        .times(1)
        .returning(|_, _, _, _, _, _| Ok(()));

    let mut resources = MockResourceStore::new();
    resources.expect_files().returning(|_| {
        Ok(vec![ResourceFile {
            pii_status: PiiStatus::Failed,
            pii_terms_accepted_at: Some(Utc::now()),
            ..clean_file(1, "a.csv")
        }])
    });
    resources
        .expect_metadata_record()
        .returning(|_| Ok(metadata_with_files(&[1])));
    resources
        .expect_set_status()
        .returning(|_, _| Ok(()));

    let mut publications = MockPublicationStore::new();
    publications.expect_find().returning(|_, _, _| Ok(None));
    publications.expect_insert().returning(|_| Ok(()));

    let mut storage = MockFileStorage::new();
    storage.expect_fetch().returning(|_| Ok(stored(b"hello")));

    publish(&request(), &client, &resources, &publications, &storage)
        .await
        .expect("accepted terms should unblock publication");
}

#[tokio::test]
async fn test_unverified_connection_blocks_publication() {
    let mut client = MockRepositoryClient::new();
    client.expect_verify_connection().return_once(|| false);

    let mut resources = MockResourceStore::new();
    resources.expect_files().returning(|_| Ok(vec![]));

    let publications = MockPublicationStore::new();
    let storage = MockFileStorage::new();

    let err = publish(&request(), &client, &resources, &publications, &storage)
        .await
        .expect_err("connection gate should reject");

    assert!(matches!(
        err,
        PublishError::Gate(GateError::ConnectionUnverified)
    ));
}

#[tokio::test]
async fn test_validation_failure_makes_no_mutating_remote_call() {
    let mut client = MockRepositoryClient::new();
    client.expect_verify_connection().return_once(|| true);
    // No create/update/upload expectations: validation must abort first.

    let mut resources = MockResourceStore::new();
    resources
        .expect_files()
        .returning(|_| Ok(vec![clean_file(1, "a.csv")]));
    resources.expect_metadata_record().returning(|_| {
        Ok(MetadataRecord::new(json!({
            "description": [{"value": "Missing its title"}],
            "authors": [{"full_name": "A. Researcher"}],
            "contact_points": [{"full_name": "A. Researcher", "email": "a@example.org"}],
        })))
    });

    let publications = MockPublicationStore::new();
    let storage = MockFileStorage::new();

    let err = publish(&request(), &client, &resources, &publications, &storage)
        .await
        .expect_err("validation should reject");

    assert!(matches!(
        err,
        PublishError::Validation(ValidationError::MissingTitle)
    ));
}

#[tokio::test]
async fn test_upload_failure_400_cleans_up_and_reverts_status() {
    let mut client = MockRepositoryClient::new();
    client.expect_verify_connection().return_once(|| true);
    client
        .expect_create_resource()
        .returning(|_, _| Ok(created_dataset(42, "doi:10.5072/NEW")));
    client.expect_upload_new_file().times(1).returning(
        |_, filename, _, _, _, _| {
            Err(UploadError::Register {
                filename: filename.to_string(),
                source: RemoteError::Status {
                    status: 400,
                    body: "{\"status\":\"ERROR\"}".to_string(),
                },
            })
        },
    );
    client
        .expect_delete_resource()
        .times(1)
        .withf(|id, collection| *id == 42 && collection == "root")
        .returning(|_, _| true);

    let mut resources = MockResourceStore::new();
    resources
        .expect_files()
        .returning(|_| Ok(vec![clean_file(1, "a.csv")]));
    resources
        .expect_metadata_record()
        .returning(|_| Ok(metadata_with_files(&[1])));
    resources
        .expect_set_status()
        .times(1)
        .withf(|_, status| *status == ResourceStatus::UnderPreparation)
        .returning(|_, _| Ok(()));

    let mut publications = MockPublicationStore::new();
    publications.expect_find().returning(|_, _, _| Ok(None));
    // No insert expectation: nothing is committed on upload failure.

    let mut storage = MockFileStorage::new();
    storage.expect_fetch().returning(|_| Ok(stored(b"hello")));

    let err = publish(&request(), &client, &resources, &publications, &storage)
        .await
        .expect_err("upload failure should abort the run");

    assert!(matches!(err, PublishError::Upload(UploadError::Register { .. })));
}

#[tokio::test]
async fn test_upload_failure_without_status_skips_status_reversion() {
    let mut client = MockRepositoryClient::new();
    client.expect_verify_connection().return_once(|| true);
    client
        .expect_create_resource()
        .returning(|_, _| Ok(created_dataset(42, "doi:10.5072/NEW")));
    client
        .expect_upload_new_file()
        .times(1)
        .returning(|_, filename, _, _, _, _| {
            Err(UploadError::DirectWrite {
                filename: filename.to_string(),
            })
        });
    client
        .expect_delete_resource()
        .times(1)
        .returning(|_, _| true);

    let mut resources = MockResourceStore::new();
    resources
        .expect_files()
        .returning(|_| Ok(vec![clean_file(1, "a.csv")]));
    resources
        .expect_metadata_record()
        .returning(|_| Ok(metadata_with_files(&[1])));
    // No set_status expectation: a statusless failure must not revert.

    let mut publications = MockPublicationStore::new();
    publications.expect_find().returning(|_, _, _| Ok(None));

    let mut storage = MockFileStorage::new();
    storage.expect_fetch().returning(|_| Ok(stored(b"hello")));

    let err = publish(&request(), &client, &resources, &publications, &storage)
        .await
        .expect_err("upload failure should abort the run");

    assert!(matches!(
        err,
        PublishError::Upload(UploadError::DirectWrite { .. })
    ));
}
