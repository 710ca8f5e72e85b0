//! Repository configuration: the credential pair, the protocol discriminator
//! and the client factory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::contract::RepositoryClient;
use crate::dataverse::DataverseClient;

/// Supported archival-system protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepositoryType {
    Dataverse,
}

impl From<&str> for RepositoryType {
    fn from(s: &str) -> Self {
        match s {
            "Dataverse" | "dataverse" => RepositoryType::Dataverse,
            other => {
                warn!(
                    repository_type = other,
                    "Unknown repository type, defaulting to Dataverse"
                );
                RepositoryType::Dataverse
            }
        }
    }
}

/// One configured target repository, owned by the repository-configuration
/// entity. A client instance is built from exactly one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub id: i64,
    pub name: String,
    pub repository_type: RepositoryType,
    pub endpoint_url: String,
    pub secret_token: String,
}

impl RepositoryConfig {
    pub fn trace_loaded(&self) {
        info!(
            repository_id = self.id,
            repository_type = ?self.repository_type,
            endpoint_url = %self.endpoint_url,
            "Loaded RepositoryConfig"
        );
        debug!(name = %self.name, "RepositoryConfig loaded (full debug)");
    }

    /// Probe the repository and return the verification timestamp to persist:
    /// `Some(now)` on success, `None` on failure (clearing any prior stamp).
    pub async fn verify(&self, client: &dyn RepositoryClient) -> Option<DateTime<Utc>> {
        let verified = client.verify_connection().await;
        info!(
            repository_id = self.id,
            verified, "Verified repository connection"
        );
        verified.then(Utc::now)
    }
}

/// Select the concrete adapter for a configured repository. One match arm per
/// supported protocol; the orchestrator stays untouched when protocols are
/// added.
pub fn client_for(config: &RepositoryConfig) -> Box<dyn RepositoryClient> {
    match config.repository_type {
        RepositoryType::Dataverse => Box::new(DataverseClient::new(
            &config.endpoint_url,
            &config.secret_token,
        )),
    }
}
