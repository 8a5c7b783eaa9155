//! Fetch strategies.
//!
//! Storage failures inside a strategy never fail the request: a failed
//! lookup counts as a miss and a failed write is logged and dropped.

use std::sync::Arc;

use http::StatusCode;
use multiapp_net::{Request, Response};
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheKey, CacheStorage};
use crate::freshness;
use crate::lifetime::ExtendableEvent;
use crate::manager::{FetchResponse, Inner, ResponseSource};
use crate::message::ClientMessage;
use crate::router::{RequestClass, Strategy};
use crate::ServiceWorkerError;

/// Served when a navigation fails and the fallback document is not cached.
const OFFLINE_PAGE: &str = "<!DOCTYPE html><html><head><title>Offline</title></head>\
<body><h1>Offline</h1><p>This page is not available offline.</p></body></html>";

impl Inner {
    pub(crate) async fn respond(
        self: Arc<Self>,
        class: RequestClass,
        request: Request,
        storage: Arc<dyn CacheStorage>,
        event: ExtendableEvent,
    ) -> Result<FetchResponse, ServiceWorkerError> {
        match class.strategy() {
            Strategy::NetworkFirstWithFallback => {
                Ok(self.network_first_with_fallback(&request, storage.as_ref()).await)
            }
            Strategy::CacheFirst => Ok(self.cache_first(&request, storage.as_ref()).await),
            Strategy::StaleWhileRevalidate => {
                self.stale_while_revalidate(request, storage, event).await
            }
            Strategy::NetworkFirst => self.network_first(&request, storage.as_ref()).await,
            Strategy::Passthrough => Ok(FetchResponse {
                response: self.fetcher.fetch(&request).await?,
                source: ResponseSource::Network,
            }),
        }
    }

    async fn network_first_with_fallback(
        &self,
        request: &Request,
        storage: &dyn CacheStorage,
    ) -> FetchResponse {
        let key = CacheKey::for_url(&request.url);
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(storage, &key, &response).await;
                from_network(response)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Navigation failed, trying cache");
                match self.cached_response(storage, &key).await {
                    Some(response) => from_cache(response),
                    None => self.offline_fallback(storage).await,
                }
            }
        }
    }

    async fn cache_first(&self, request: &Request, storage: &dyn CacheStorage) -> FetchResponse {
        let key = CacheKey::for_url(&request.url);
        if let Some(response) = self.cached_response(storage, &key).await {
            return from_cache(response);
        }
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(storage, &key, &response).await;
                from_network(response)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Sub-application unavailable");
                self.offline_fallback(storage).await
            }
        }
    }

    async fn stale_while_revalidate(
        self: Arc<Self>,
        request: Request,
        storage: Arc<dyn CacheStorage>,
        event: ExtendableEvent,
    ) -> Result<FetchResponse, ServiceWorkerError> {
        let key = CacheKey::for_url(&request.url);
        if let Some(entry) = self.cached(storage.as_ref(), &key).await {
            match entry.to_response() {
                Ok(response) => {
                    let inner = Arc::clone(&self);
                    let _revalidation = event.wait_until(async move {
                        inner.revalidate(&request, storage.as_ref(), &key, &entry).await;
                        Ok(())
                    });
                    return Ok(from_cache(response));
                }
                Err(e) => warn!(url = %request.url, error = %e, "Ignoring corrupt cache entry"),
            }
        }

        let response = self.fetcher.fetch(&request).await?;
        self.store(storage.as_ref(), &key, &response).await;
        Ok(from_network(response))
    }

    /// Refresh a cached entry and notify pages when the version changed.
    async fn revalidate(
        &self,
        request: &Request,
        storage: &dyn CacheStorage,
        key: &CacheKey,
        previous: &CacheEntry,
    ) {
        let fresh = match self.fetcher.fetch(request).await {
            Ok(fresh) if fresh.ok() => fresh,
            Ok(fresh) => {
                debug!(url = %request.url, status = %fresh.status, "Revalidation got error status");
                return;
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Revalidation failed, keeping cached copy");
                return;
            }
        };

        self.store(storage, key, &fresh).await;
        if freshness::same_version(previous, &fresh) {
            return;
        }

        let delivered = self
            .clients
            .post_all(&ClientMessage::UpdateAvailable {
                url: request.url.to_string(),
            })
            .await;
        info!(url = %request.url, delivered, "Update available");
    }

    async fn network_first(
        &self,
        request: &Request,
        storage: &dyn CacheStorage,
    ) -> Result<FetchResponse, ServiceWorkerError> {
        let key = CacheKey::for_url(&request.url);
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(storage, &key, &response).await;
                Ok(from_network(response))
            }
            Err(e) => match self.cached_response(storage, &key).await {
                Some(response) => Ok(from_cache(response)),
                None => Err(e.into()),
            },
        }
    }

    async fn offline_fallback(&self, storage: &dyn CacheStorage) -> FetchResponse {
        if let Ok(url) = self.config.resolve(&self.config.offline_fallback) {
            if let Some(response) = self.cached_response(storage, &CacheKey::for_url(&url)).await {
                return FetchResponse {
                    response,
                    source: ResponseSource::OfflineFallback,
                };
            }
        }

        warn!(fallback = %self.config.offline_fallback, "Offline fallback not cached");
        FetchResponse {
            response: Response::new(self.router.scope().clone(), StatusCode::SERVICE_UNAVAILABLE)
                .with_header("content-type", "text/html; charset=utf-8")
                .with_body(OFFLINE_PAGE),
            source: ResponseSource::OfflineFallback,
        }
    }

    async fn cached(&self, storage: &dyn CacheStorage, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        match storage.match_entry(&self.config.generation, key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "Cache lookup failed");
                None
            }
        }
    }

    async fn cached_response(&self, storage: &dyn CacheStorage, key: &CacheKey) -> Option<Response> {
        let entry = self.cached(storage, key).await?;
        match entry.to_response() {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "Ignoring corrupt cache entry");
                None
            }
        }
    }

    /// Store a successful response under `key`. Error statuses are not cached.
    pub(crate) async fn store(&self, storage: &dyn CacheStorage, key: &CacheKey, response: &Response) {
        if !response.ok() {
            return;
        }
        let entry = CacheEntry::from_response(response);
        if let Err(e) = storage
            .put(&self.config.generation, key.clone(), entry)
            .await
        {
            warn!(key = key.as_str(), error = %e, "Cache write failed");
        }
    }
}

fn from_network(response: Response) -> FetchResponse {
    FetchResponse {
        response,
        source: ResponseSource::Network,
    }
}

fn from_cache(response: Response) -> FetchResponse {
    FetchResponse {
        response,
        source: ResponseSource::Cache,
    }
}
