//! The cache manager: one instance per deployed worker version.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::join_all;
use multiapp_net::{Fetch, NetError, Request, Response};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheEntry, CacheKey, CacheStorage};
use crate::clients::Clients;
use crate::lifetime::{ExtendableEvent, WorkHandle};
use crate::message::ControlMessage;
use crate::router::{RequestClass, Router};
use crate::state::{WorkerId, WorkerState};
use crate::ServiceWorkerError;

// ==================== Configuration ====================

/// Settings baked into one worker version.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Scope the worker controls; relative URLs resolve against it.
    pub scope: Url,
    /// Cache generation name.
    pub generation: String,
    /// URLs stored at install time.
    pub precache: Vec<String>,
    /// Path prefix of the sub-applications served cache-first.
    pub app_prefix: String,
    /// Document served when a navigation cannot be answered.
    pub offline_fallback: String,
    /// Request skip-waiting as soon as install finishes.
    pub eager_activation: bool,
}

impl ManagerConfig {
    pub fn new(scope: Url, generation: impl Into<String>) -> Self {
        Self {
            scope,
            generation: generation.into(),
            precache: Vec::new(),
            app_prefix: "/Apps/".to_string(),
            offline_fallback: "./index.html".to_string(),
            eager_activation: false,
        }
    }

    pub fn with_precache<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_app_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.app_prefix = prefix.into();
        self
    }

    pub fn with_offline_fallback(mut self, href: impl Into<String>) -> Self {
        self.offline_fallback = href.into();
        self
    }

    pub fn with_eager_activation(mut self, eager: bool) -> Self {
        self.eager_activation = eager;
        self
    }

    /// Resolve a manifest or message URL against the scope.
    pub fn resolve(&self, href: &str) -> Result<Url, ServiceWorkerError> {
        Ok(self.scope.join(href)?)
    }
}

// ==================== Results ====================

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    OfflineFallback,
}

/// A response produced by the worker.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub response: Response,
    pub source: ResponseSource,
}

/// Outcome of dispatching a fetch event.
#[derive(Debug)]
pub enum FetchDisposition {
    /// The worker does not handle this request; the host sends it itself.
    Passthrough,
    /// The worker answers with the result of this work.
    RespondWith(WorkHandle<FetchResponse>),
}

impl FetchDisposition {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, FetchDisposition::Passthrough)
    }

    /// Await the worker's answer, `None` for pass-through.
    pub async fn into_response(self) -> Result<Option<FetchResponse>, ServiceWorkerError> {
        match self {
            FetchDisposition::Passthrough => Ok(None),
            FetchDisposition::RespondWith(handle) => handle.await.map(Some),
        }
    }
}

/// Result of the install step.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    pub generation: String,
    /// Manifest URLs now in the cache.
    pub stored: Vec<String>,
    /// Manifest entries that could not be stored, with the reason.
    pub failed: Vec<(String, String)>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of the activate step.
#[derive(Debug, Clone, Default)]
pub struct ActivateReport {
    pub generation: String,
    /// Generations purged.
    pub deleted: Vec<String>,
    /// Pages newly claimed.
    pub claimed: usize,
}

// ==================== Manager ====================

pub(crate) struct Inner {
    pub(crate) id: WorkerId,
    pub(crate) config: ManagerConfig,
    pub(crate) router: Router,
    pub(crate) fetcher: Arc<dyn Fetch>,
    pub(crate) storage: Option<Arc<dyn CacheStorage>>,
    pub(crate) clients: Arc<Clients>,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
}

/// Offline cache manager for one worker version.
///
/// Cheap to clone; clones share state. Each lifecycle method registers its
/// work with the given event before returning.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("id", &self.inner.id)
            .field("generation", &self.inner.config.generation)
            .field("state", &self.state())
            .finish()
    }
}

impl CacheManager {
    /// Create a manager. `storage` is `None` when the host has no cache
    /// storage; the manager then passes every request through.
    pub fn new(
        config: ManagerConfig,
        fetcher: Arc<dyn Fetch>,
        storage: Option<Arc<dyn CacheStorage>>,
        clients: Arc<Clients>,
    ) -> Self {
        let router = Router::new(config.scope.clone(), config.app_prefix.clone());
        if storage.is_none() {
            warn!(generation = %config.generation, "Cache storage unavailable, running network-only");
        }
        Self {
            inner: Arc::new(Inner {
                id: WorkerId::new(),
                config,
                router,
                fetcher,
                storage,
                clients,
                state: RwLock::new(WorkerState::Unregistered),
                skip_waiting: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.inner.id
    }

    pub fn generation(&self) -> &str {
        &self.inner.config.generation
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    pub fn state(&self) -> WorkerState {
        self.inner.state()
    }

    /// Ask to leave the waiting state as soon as possible.
    pub fn skip_waiting(&self) {
        debug!(worker = %self.inner.id, "Skip waiting requested");
        self.inner.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.inner.skip_waiting.load(Ordering::SeqCst)
    }

    /// Retire this version. No-op if already redundant.
    pub fn mark_redundant(&self) {
        if !self.state().is_redundant() {
            let _ = self.inner.transition(WorkerState::Redundant);
        }
    }

    /// Install: open the generation and store every manifest URL.
    ///
    /// Precache is best-effort; failures land in the report and never stop
    /// the install.
    pub fn install(&self, event: &ExtendableEvent) -> WorkHandle<InstallReport> {
        let inner = Arc::clone(&self.inner);
        let started = inner.transition(WorkerState::Installing);
        event.wait_until(async move {
            started?;
            let report = inner.precache().await;
            inner.transition(WorkerState::Installed)?;
            if inner.config.eager_activation {
                inner.skip_waiting.store(true, Ordering::SeqCst);
            }
            info!(
                generation = %report.generation,
                stored = report.stored.len(),
                failed = report.failed.len(),
                "Install finished"
            );
            Ok(report)
        })
    }

    /// Activate: purge other generations, then claim open pages.
    pub fn activate(&self, event: &ExtendableEvent) -> WorkHandle<ActivateReport> {
        let inner = Arc::clone(&self.inner);
        let started = inner.transition(WorkerState::Activating);
        event.wait_until(async move {
            started?;
            let deleted = inner.purge_old_generations().await;
            let claimed = inner
                .clients
                .claim(&inner.config.generation, inner.router.scope())
                .await;
            inner.transition(WorkerState::Activated)?;
            info!(
                generation = %inner.config.generation,
                purged = deleted.len(),
                claimed,
                "Activated"
            );
            Ok(ActivateReport {
                generation: inner.config.generation.clone(),
                deleted,
                claimed,
            })
        })
    }

    /// Take over a generation already present in storage without running
    /// install again. Resolves to `false` when there is nothing to resume.
    pub fn resume(&self, event: &ExtendableEvent) -> WorkHandle<bool> {
        let inner = Arc::clone(&self.inner);
        event.wait_until(async move {
            let Some(storage) = inner.storage.as_ref() else {
                return Ok(false);
            };
            match storage.has(&inner.config.generation).await {
                Ok(true) => {}
                Ok(false) => return Ok(false),
                Err(e) => {
                    warn!(error = %e, "Cannot inspect cache storage, not resuming");
                    return Ok(false);
                }
            }
            for next in [
                WorkerState::Installing,
                WorkerState::Installed,
                WorkerState::Activating,
            ] {
                inner.transition(next)?;
            }
            inner
                .clients
                .claim(&inner.config.generation, inner.router.scope())
                .await;
            inner.transition(WorkerState::Activated)?;
            info!(generation = %inner.config.generation, "Resumed existing generation");
            Ok(true)
        })
    }

    /// Dispatch a fetch event.
    pub fn handle_fetch(&self, request: Request, event: &ExtendableEvent) -> FetchDisposition {
        if !self.state().is_active() {
            return FetchDisposition::Passthrough;
        }
        let class = self.inner.router.classify(&request);
        if class == RequestClass::Passthrough {
            return FetchDisposition::Passthrough;
        }
        let Some(storage) = self.inner.storage.clone() else {
            return FetchDisposition::Passthrough;
        };

        let inner = Arc::clone(&self.inner);
        let lifetime = event.clone();
        FetchDisposition::RespondWith(event.wait_until(async move {
            inner.respond(class, request, storage, lifetime).await
        }))
    }

    /// Dispatch a control message.
    pub fn handle_message(&self, message: ControlMessage, event: &ExtendableEvent) -> WorkHandle<()> {
        match message {
            ControlMessage::SkipWaiting => {
                self.skip_waiting();
                event.wait_until(async { Ok(()) })
            }
            ControlMessage::Prefetch { url } => {
                let inner = Arc::clone(&self.inner);
                event.wait_until(async move {
                    inner.prefetch(&url).await;
                    Ok(())
                })
            }
        }
    }

    /// Dispatch a raw posted value. Unrecognized messages are ignored.
    pub fn handle_raw_message(&self, value: &Value, event: &ExtendableEvent) -> Option<WorkHandle<()>> {
        ControlMessage::parse(value).map(|message| self.handle_message(message, event))
    }
}

impl Inner {
    pub(crate) fn state(&self) -> WorkerState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: WorkerState) -> Result<WorkerState, ServiceWorkerError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.can_transition_to(next) {
            return Err(ServiceWorkerError::StateError(format!(
                "cannot move {} from {} to {}",
                self.id, *state, next
            )));
        }
        let previous = std::mem::replace(&mut *state, next);
        debug!(worker = %self.id, from = %previous, to = %next, "State change");
        Ok(previous)
    }

    async fn precache(&self) -> InstallReport {
        let generation = &self.config.generation;
        let mut report = InstallReport {
            generation: generation.clone(),
            ..Default::default()
        };

        let storage = match self.storage.as_ref() {
            Some(storage) => match storage.open(generation).await {
                Ok(()) => storage,
                Err(e) => {
                    warn!(generation = %generation, error = %e, "Cannot open cache, skipping precache");
                    report.failed = self.all_failed(&e.to_string());
                    return report;
                }
            },
            None => {
                report.failed = self.all_failed("cache storage unavailable");
                return report;
            }
        };

        let results = join_all(
            self.config
                .precache
                .iter()
                .map(|href| self.precache_one(storage.as_ref(), href)),
        )
        .await;

        for (href, result) in self.config.precache.iter().zip(results) {
            match result {
                Ok(url) => report.stored.push(url.to_string()),
                Err(e) => {
                    warn!(url = %href, error = %e, "Precache failed");
                    report.failed.push((href.clone(), e.to_string()));
                }
            }
        }
        report
    }

    async fn precache_one(
        &self,
        storage: &dyn CacheStorage,
        href: &str,
    ) -> Result<Url, ServiceWorkerError> {
        let url = self.config.resolve(href)?;
        let response = self.fetcher.fetch(&Request::get(url.clone())).await?;
        if !response.ok() {
            return Err(NetError::RequestFailed(format!("HTTP {}", response.status)).into());
        }
        storage
            .put(
                &self.config.generation,
                CacheKey::for_url(&url),
                CacheEntry::from_response(&response),
            )
            .await?;
        Ok(url)
    }

    fn all_failed(&self, reason: &str) -> Vec<(String, String)> {
        self.config
            .precache
            .iter()
            .map(|href| (href.clone(), reason.to_string()))
            .collect()
    }

    async fn purge_old_generations(&self) -> Vec<String> {
        let Some(storage) = self.storage.as_ref() else {
            return Vec::new();
        };
        let names = match storage.keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Cannot list caches, skipping purge");
                return Vec::new();
            }
        };

        let mut deleted = Vec::new();
        for name in names {
            if name == self.config.generation {
                continue;
            }
            match storage.delete(&name).await {
                Ok(true) => {
                    debug!(generation = %name, "Purged old generation");
                    deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => warn!(generation = %name, error = %e, "Failed to purge generation"),
            }
        }
        deleted
    }

    pub(crate) async fn prefetch(&self, href: &str) {
        let url = match self.config.resolve(href) {
            Ok(url) => url,
            Err(e) => {
                debug!(url = %href, error = %e, "Prefetch skipped, bad URL");
                return;
            }
        };
        let Some(storage) = self.storage.as_ref() else {
            return;
        };
        match self.fetcher.fetch(&Request::get(url.clone())).await {
            Ok(response) if response.ok() => {
                self.store(storage.as_ref(), &CacheKey::for_url(&url), &response)
                    .await;
                debug!(url = %url, "Prefetched");
            }
            Ok(response) => debug!(url = %url, status = %response.status, "Prefetch not stored"),
            Err(e) => debug!(url = %url, error = %e, "Prefetch failed"),
        }
    }
}
