//! Wiring of the production collaborators from an [`OptijobConfig`].

use std::sync::Arc;

use crate::artifact::ArtifactStoreClient;
use crate::config::OptijobConfig;
use crate::family::JobFamily;
use crate::orchestrator::{PhaseObserver, TaskOrchestrator};
use crate::quota::{AccountClient, QuotaGuard};
use crate::remote::{AuthClient, RemoteError, RemoteJobClient, TokenHolder, TokenIssuer, Tokens, api_http_client};
use crate::state_machine::Task;
use crate::store::{FileTaskStore, StoreError, TaskRecordStore};

/// Shared clients, token holder and store for every family.
pub struct App {
    config: OptijobConfig,
    client: reqwest::Client,
    tokens: Arc<TokenHolder>,
    store: Arc<FileTaskStore>,
}

impl App {
    pub fn new(config: OptijobConfig) -> Result<Self, RemoteError> {
        let client = api_http_client()?;

        let issuer: Arc<dyn TokenIssuer> = Arc::new(AuthClient::new(
            client.clone(),
            config.auth_base_url.clone(),
            config.credentials(),
        ));
        let tokens = Arc::new(TokenHolder::new(
            Tokens {
                access_token: config.access_token.clone(),
                refresh_token: config.refresh_token.clone(),
            },
            Some(issuer),
        ));
        let store = Arc::new(FileTaskStore::new(config.store_dir.clone()));

        Ok(Self {
            config,
            client,
            tokens,
            store,
        })
    }

    pub fn config(&self) -> &OptijobConfig {
        &self.config
    }

    /// Orchestrator for `family`, sharing this app's token and store.
    pub fn orchestrator(&self, family: JobFamily, observer: Option<PhaseObserver>) -> TaskOrchestrator {
        let remote = Arc::new(RemoteJobClient::new(
            self.client.clone(),
            self.config.api_base_url.clone(),
            family,
            Arc::clone(&self.tokens),
        ));
        let balance = Arc::new(AccountClient::new(
            self.client.clone(),
            self.config.api_base_url.clone(),
            Arc::clone(&self.tokens),
        ));
        let orchestrator = TaskOrchestrator::new(
            remote,
            Arc::new(ArtifactStoreClient::new(reqwest::Client::new())),
            QuotaGuard::new(balance, self.config.prices),
            self.store.clone(),
            self.config.orchestrator_settings(),
        );
        match observer {
            Some(observer) => orchestrator.with_observer(observer),
            None => orchestrator,
        }
    }

    /// Reads a record without knowing its family.
    pub async fn find_task(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        self.store.get_by_task_id(task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn orchestrators_share_one_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = OptijobConfig {
            store_dir: dir.path().join("tasks"),
            ..OptijobConfig::default()
        };
        let app = App::new(config).unwrap();

        for family in JobFamily::ALL {
            assert_eq!(app.orchestrator(family, None).family(), family);
        }
        assert!(app.find_task("unknown").await.unwrap().is_none());
        assert!(app.find_task("../escape").await.is_err());
    }
}
