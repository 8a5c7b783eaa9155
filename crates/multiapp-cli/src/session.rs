//! One invocation's view of the cache: configuration, persisted storage and
//! the registration that routes requests.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use multiapp_common::{AppConfig, MultiAppError, Result};
use multiapp_net::{Fetch, LoaderConfig, OfflineFetcher, Request, ResourceLoader, Response};
use multiapp_sw::{
    CacheManager, Clients, ControlMessage, ExtendableEvent, FetchDisposition, InstallReport,
    ManagerConfig, MemoryCacheStorage, Registration, ResponseSource, StorageSnapshot,
};
use tracing::{debug, info};
use url::Url;

/// How a fetched response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    Worker(ResponseSource),
    Passthrough,
}

impl fmt::Display for Served {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Served::Worker(ResponseSource::Network) => "network",
            Served::Worker(ResponseSource::Cache) => "cache",
            Served::Worker(ResponseSource::OfflineFallback) => "offline-fallback",
            Served::Passthrough => "passthrough",
        };
        f.write_str(label)
    }
}

pub struct Session {
    config: AppConfig,
    scope: Url,
    fetcher: Arc<dyn Fetch>,
    storage: Arc<MemoryCacheStorage>,
    registration: Registration,
}

impl Session {
    /// Build a session, restoring the persisted cache store if there is one.
    pub fn open(config: AppConfig, offline: bool) -> Result<Self> {
        config.validate()?;
        let scope = Url::parse(&config.worker.scope)?;

        let fetcher: Arc<dyn Fetch> = if offline {
            Arc::new(OfflineFetcher)
        } else {
            let loader = ResourceLoader::new(loader_config(&config))
                .map_err(|e| MultiAppError::network_with_source("cannot build HTTP client", e))?;
            Arc::new(loader)
        };

        let storage = Arc::new(load_storage(&config)?);
        let registration = Registration::new(scope.clone(), Arc::new(Clients::new()));

        Ok(Self {
            config,
            scope,
            fetcher,
            storage,
            registration,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn manager(&self) -> CacheManager {
        let worker = &self.config.worker;
        let config = ManagerConfig::new(self.scope.clone(), worker.cache_name.clone())
            .with_precache(worker.precache.iter().cloned())
            .with_app_prefix(worker.app_prefix.clone())
            .with_offline_fallback(worker.offline_fallback.clone())
            .with_eager_activation(worker.eager_activation);
        CacheManager::new(
            config,
            Arc::clone(&self.fetcher),
            Some(self.storage.clone()),
            Arc::clone(self.registration.clients()),
        )
    }

    /// Install and activate the configured generation.
    pub async fn install(&self) -> Result<InstallReport> {
        self.registration
            .register(self.manager())
            .await
            .map_err(|e| MultiAppError::worker_with_source("install failed", e))
    }

    /// Take over the stored generation, installing it when absent.
    pub async fn activate(&self) -> Result<()> {
        let resumed = self
            .registration
            .resume(self.manager())
            .await
            .map_err(|e| MultiAppError::worker_with_source("resume failed", e))?;
        if !resumed {
            info!(generation = %self.config.worker.cache_name, "Generation not stored yet, installing");
            self.install().await?;
        }
        Ok(())
    }

    /// Fetch `href` (relative to the scope) the way a controlled page would.
    pub async fn fetch(&self, href: &str, navigate: bool) -> Result<(Response, Served)> {
        let url = self.scope.join(href)?;
        let request = if navigate {
            Request::navigate(url)
        } else {
            Request::get(url)
        };

        let event = ExtendableEvent::new();
        let outcome = match self.registration.fetch(request.clone(), &event) {
            FetchDisposition::Passthrough => self
                .fetcher
                .fetch(&request)
                .await
                .map(|response| (response, Served::Passthrough))
                .map_err(|e| {
                    MultiAppError::network_with_source(format!("fetch {} failed", request.url), e)
                }),
            FetchDisposition::RespondWith(handle) => handle
                .await
                .map(|answer| (answer.response, Served::Worker(answer.source)))
                .map_err(|e| {
                    MultiAppError::worker_with_source(format!("fetch {} failed", request.url), e)
                }),
        };
        event.settled().await;
        outcome
    }

    /// Ask the active generation to store `href`.
    pub async fn prefetch(&self, href: &str) -> Result<()> {
        let message = serde_json::to_value(ControlMessage::Prefetch {
            url: href.to_string(),
        })?;
        self.registration
            .post_message(&message)
            .await
            .map_err(|e| MultiAppError::worker_with_source("prefetch failed", e))
    }

    pub async fn snapshot(&self) -> StorageSnapshot {
        self.storage.snapshot().await
    }

    /// Write the cache store to disk when persistence is on.
    pub async fn save(&self) -> Result<()> {
        if !self.config.storage.persist {
            return Ok(());
        }
        let path = self.config.snapshot_path();
        std::fs::create_dir_all(&self.config.storage.cache_dir)?;
        let contents = serde_json::to_string(&self.snapshot().await)?;
        std::fs::write(&path, contents)?;
        debug!(path = %path.display(), "Cache snapshot saved");
        Ok(())
    }
}

fn loader_config(config: &AppConfig) -> LoaderConfig {
    let network = &config.network;
    LoaderConfig {
        user_agent: network.user_agent.clone(),
        timeout: (network.timeout_secs > 0).then(|| Duration::from_secs(network.timeout_secs)),
        max_redirects: network.max_redirects,
    }
}

fn load_storage(config: &AppConfig) -> Result<MemoryCacheStorage> {
    let path = config.snapshot_path();
    if !config.storage.persist || !path.exists() {
        return Ok(MemoryCacheStorage::new());
    }
    let contents = std::fs::read_to_string(&path)?;
    let snapshot: StorageSnapshot = serde_json::from_str(&contents).map_err(|e| {
        MultiAppError::cache_with_source(format!("corrupt snapshot {}", path.display()), e)
    })?;
    debug!(path = %path.display(), caches = snapshot.caches.len(), "Cache snapshot restored");
    Ok(MemoryCacheStorage::from_snapshot(snapshot))
}
