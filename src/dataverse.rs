//! # dataverse: wire adapter for the Dataverse archival protocol
//!
//! Concrete [`RepositoryClient`] implementation speaking the Dataverse native
//! API. The client is constructed immutably from one `{endpoint, secret}`
//! pair and holds no other state; every call is a single attempt bounded by
//! the configured timeout.
//!
//! ## Auth
//! Every call carries the `X-Dataverse-key` header. The legacy SWORD per-file
//! delete endpoint additionally requires basic auth with the same secret as
//! username; that asymmetry belongs to the target system and both paths are
//! kept as-is.
//!
//! ## File upload
//! Uploads are two-phase: a presigned direct-write location is requested
//! sized to the byte count, the bytes are written there outside the JSON API,
//! and the stored object is then registered with the dataset via a multipart
//! call carrying the filename, mimetype and SHA-1 checksum.

use std::time::Duration;

use futures::future::try_join_all;
use reqwest::multipart;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::config::RepositoryType;
use crate::contract::{RemoteDataset, RepositoryClient};
use crate::error::{RemoteError, UploadError};

use async_trait::async_trait;

const API_KEY_HEADER: &str = "X-Dataverse-key";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one Dataverse installation.
pub struct DataverseClient {
    base_url: String,
    secret: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl DataverseClient {
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::with_timeout(base_url, secret, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        secret: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        DataverseClient {
            base_url: base_url.into(),
            secret: secret.into(),
            timeout,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Parse a response into its JSON body, converting any non-success
    /// status into [`RemoteError::Status`] with the body kept verbatim.
    async fn into_json(response: reqwest::Response) -> Result<Value, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// Legacy SWORD delete for a single attached file. Basic auth with the
    /// secret as username, alongside the regular key header.
    async fn delete_dataset_file_by_id(&self, file_id: i64) -> Result<(), RemoteError> {
        let response = self
            .http
            .delete(self.url(&format!(
                "/dvn/api/data-deposit/v1.1/swordv2/edit-media/file/{file_id}"
            )))
            .timeout(self.timeout)
            .basic_auth(&self.secret, Some(""))
            .header(API_KEY_HEADER, &self.secret)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        info!(file_id, "Deleted dataset file");
        Ok(())
    }
}

#[async_trait]
impl RepositoryClient for DataverseClient {
    async fn verify_connection(&self) -> bool {
        let response = self
            .http
            .get(self.url("/api/users/token"))
            .timeout(self.timeout)
            .header(API_KEY_HEADER, &self.secret)
            .send()
            .await;

        match response {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                error!(error = ?e, "Connection probe failed");
                false
            }
        }
    }

    async fn create_resource(
        &self,
        schema: &Value,
        collection: &str,
    ) -> Result<RemoteDataset, RemoteError> {
        info!(collection, "Creating dataset");
        let response = self
            .http
            .post(self.url(&format!("/api/dataverses/{collection}/datasets")))
            .timeout(self.timeout)
            .header(API_KEY_HEADER, &self.secret)
            .json(schema)
            .send()
            .await?;

        let body = Self::into_json(response).await?;
        let id = body["data"]["id"]
            .as_i64()
            .ok_or(RemoteError::MissingField("data.id"))?;
        let persistent_id = body["data"]["persistentId"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or(RemoteError::MissingField("data.persistentId"))?
            .to_string();

        info!(id, persistent_id = %persistent_id, "Created dataset");
        Ok(RemoteDataset {
            id,
            persistent_id,
            response: body,
        })
    }

    async fn update_resource(
        &self,
        persistent_id: &str,
        schema: &Value,
    ) -> Result<RemoteDataset, RemoteError> {
        info!(persistent_id, "Updating dataset");
        let response = self
            .http
            .put(self.url("/api/datasets/:persistentId/versions/:draft"))
            .timeout(self.timeout)
            .header(API_KEY_HEADER, &self.secret)
            .query(&[("persistentId", persistent_id)])
            .json(schema)
            .send()
            .await?;

        let body = Self::into_json(response).await?;
        let id = body["data"]["id"]
            .as_i64()
            .ok_or(RemoteError::MissingField("data.id"))?;
        // Updates report the identifier under a different key than creates.
        let persistent_id = body["data"]["datasetPersistentId"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or(RemoteError::MissingField("data.datasetPersistentId"))?
            .to_string();

        info!(id, persistent_id = %persistent_id, "Updated dataset");
        Ok(RemoteDataset {
            id,
            persistent_id,
            response: body,
        })
    }

    async fn delete_resource(&self, id: i64, _collection: &str) -> bool {
        let response = self
            .http
            .delete(self.url(&format!("/api/datasets/{id}/versions/:draft")))
            .timeout(self.timeout)
            .header(API_KEY_HEADER, &self.secret)
            .send()
            .await;

        match response {
            Ok(r) => {
                info!(id, status = r.status().as_u16(), "Deleted dataset draft");
                r.status().is_success()
            }
            Err(e) => {
                error!(error = ?e, id, "Failed to delete dataset draft");
                false
            }
        }
    }

    async fn delete_dataset_files(&self, persistent_id: &str) -> Result<(), RemoteError> {
        let dataset = self.get_dataset_by_persistent_id(persistent_id).await?;
        let files = dataset["data"]["latestVersion"]["files"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let deletions = files
            .iter()
            .filter_map(|f| f["dataFile"]["id"].as_i64())
            .map(|file_id| self.delete_dataset_file_by_id(file_id));
        try_join_all(deletions).await?;

        info!(
            persistent_id,
            count = files.len(),
            "Deleted all attached dataset files"
        );
        Ok(())
    }

    async fn upload_new_file(
        &self,
        persistent_id: &str,
        filename: &str,
        mime_type: &str,
        contents: &[u8],
        size: u64,
        checksum: &str,
    ) -> Result<(), UploadError> {
        // Phase 1: presigned upload location, sized to the declared bytes.
        info!(persistent_id, filename, size, "Requesting upload URL");
        let declared_size = size.to_string();
        let presign = async {
            let response = self
                .http
                .get(self.url("/api/datasets/:persistentId/uploadurls"))
                .timeout(self.timeout)
                .header(API_KEY_HEADER, &self.secret)
                .query(&[
                    ("persistentId", persistent_id),
                    ("size", declared_size.as_str()),
                ])
                .send()
                .await?;
            Self::into_json(response).await
        }
        .await;
        let body = presign.map_err(|source| UploadError::Presign {
            filename: filename.to_string(),
            source,
        })?;

        let upload_url = body["data"]["url"]
            .as_str()
            .ok_or_else(|| UploadError::Presign {
                filename: filename.to_string(),
                source: RemoteError::MissingField("data.url"),
            })?;
        let storage_identifier =
            body["data"]["storageIdentifier"]
                .as_str()
                .ok_or_else(|| UploadError::Presign {
                    filename: filename.to_string(),
                    source: RemoteError::MissingField("data.storageIdentifier"),
                })?;

        // Phase 2: direct binary write, outside the JSON API. Only a plain
        // 200 counts as accepted.
        info!(
            filename,
            mime_type, size, checksum, "Uploading file bytes to presigned location"
        );
        let write = self
            .http
            .put(upload_url)
            .timeout(self.timeout)
            .header("x-amz-tagging", "dv-state=temp")
            .body(contents.to_vec())
            .send()
            .await;
        match write {
            Ok(r) if r.status() == reqwest::StatusCode::OK => {}
            Ok(r) => {
                error!(
                    filename,
                    status = r.status().as_u16(),
                    "Direct upload rejected"
                );
                return Err(UploadError::DirectWrite {
                    filename: filename.to_string(),
                });
            }
            Err(e) => {
                error!(filename, error = ?e, "Direct upload failed");
                return Err(UploadError::DirectWrite {
                    filename: filename.to_string(),
                });
            }
        }

        // Phase 3: register the stored object so it attaches to the dataset.
        let json_data = json!({
            "restrict": false,
            "storageIdentifier": storage_identifier,
            "fileName": filename,
            "mimeType": mime_type,
            "checksum": {
                "@type": "SHA-1",
                "@value": checksum,
            },
        });
        let form = multipart::Form::new().text("jsonData", json_data.to_string());

        let register = async {
            let response = self
                .http
                .post(self.url("/api/datasets/:persistentId/add"))
                .timeout(self.timeout)
                .header(API_KEY_HEADER, &self.secret)
                .query(&[("persistentId", persistent_id)])
                .multipart(form)
                .send()
                .await?;
            Self::into_json(response).await
        }
        .await;
        if let Err(source) = register {
            return Err(UploadError::Register {
                filename: filename.to_string(),
                source,
            });
        }

        info!(filename, persistent_id, "Attached file to dataset");
        Ok(())
    }

    async fn get_dataset_by_persistent_id(
        &self,
        persistent_id: &str,
    ) -> Result<Value, RemoteError> {
        let response = self
            .http
            .get(self.url("/api/datasets/:persistentId/"))
            .timeout(self.timeout)
            .header(API_KEY_HEADER, &self.secret)
            .query(&[("persistentId", persistent_id)])
            .send()
            .await?;
        Self::into_json(response).await
    }

    fn repository_type(&self) -> RepositoryType {
        RepositoryType::Dataverse
    }
}
