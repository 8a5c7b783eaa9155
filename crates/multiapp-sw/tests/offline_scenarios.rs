//! End-to-end scenarios against a scripted network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use multiapp_net::{Fetch, NetError, Request, Response};
use multiapp_sw::{
    CacheEntry, CacheError, CacheKey, CacheManager, CacheStorage, ClientMessage, Clients,
    ExtendableEvent, FetchResponse, ManagerConfig, MemoryCacheStorage, Registration,
    ResponseSource, WorkerState,
};
use serde_json::json;
use tokio::sync::Notify;
use url::Url;

const SCOPE: &str = "https://launcher.example/";

#[derive(Clone)]
struct Route {
    status: StatusCode,
    body: String,
    etag: Option<String>,
    last_modified: Option<String>,
}

/// Network double: scripted routes, per-URL call counts, an offline switch
/// and an optional gate that holds every response until released.
#[derive(Default)]
struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedNetwork {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn route(&self, url: &str, route: Route) {
        self.routes.lock().unwrap().insert(url.to_string(), route);
    }

    fn serve(&self, url: &str, body: &str) {
        self.route(
            url,
            Route {
                status: StatusCode::OK,
                body: body.to_string(),
                etag: None,
                last_modified: None,
            },
        );
    }

    fn serve_etag(&self, url: &str, body: &str, etag: &str) {
        self.route(
            url,
            Route {
                status: StatusCode::OK,
                body: body.to_string(),
                etag: Some(etag.to_string()),
                last_modified: None,
            },
        );
    }

    fn serve_last_modified(&self, url: &str, body: &str, last_modified: &str) {
        self.route(
            url,
            Route {
                status: StatusCode::OK,
                body: body.to_string(),
                etag: None,
                last_modified: Some(last_modified.to_string()),
            },
        );
    }

    fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl Fetch for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        let url = request.url.to_string();
        *self.calls.lock().unwrap().entry(url.clone()).or_default() += 1;

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::Offline);
        }
        let route = self.routes.lock().unwrap().get(&url).cloned();
        let Some(route) = route else {
            return Ok(Response::new(request.url.clone(), StatusCode::NOT_FOUND));
        };

        let mut response = Response::new(request.url.clone(), route.status).with_body(route.body);
        if let Some(etag) = &route.etag {
            response = response.with_header("etag", etag);
        }
        if let Some(last_modified) = &route.last_modified {
            response = response.with_header("last-modified", last_modified);
        }
        Ok(response)
    }
}

/// Storage whose next cache listing blocks until released, which pauses an
/// activation at the start of its purge.
struct GatedStorage {
    inner: MemoryCacheStorage,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl GatedStorage {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryCacheStorage::new(),
            gate: Mutex::new(None),
        })
    }

    fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl CacheStorage for GatedStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        self.inner.delete(name).await
    }

    async fn match_entry(
        &self,
        name: &str,
        key: &CacheKey,
    ) -> Result<Option<Arc<CacheEntry>>, CacheError> {
        self.inner.match_entry(name, key).await
    }

    async fn put(&self, name: &str, key: CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        self.inner.put(name, key, entry).await
    }

    async fn entry_keys(&self, name: &str) -> Result<Vec<CacheKey>, CacheError> {
        self.inner.entry_keys(name).await
    }
}

fn url(path: &str) -> Url {
    Url::parse(SCOPE).unwrap().join(path).unwrap()
}

struct Harness {
    network: Arc<ScriptedNetwork>,
    storage: Arc<MemoryCacheStorage>,
    clients: Arc<Clients>,
}

impl Harness {
    fn new() -> Self {
        Self {
            network: ScriptedNetwork::new(),
            storage: Arc::new(MemoryCacheStorage::new()),
            clients: Arc::new(Clients::new()),
        }
    }

    fn manager(&self, config: ManagerConfig) -> CacheManager {
        CacheManager::new(
            config,
            self.network.clone(),
            Some(self.storage.clone()),
            Arc::clone(&self.clients),
        )
    }

    async fn activated(&self, config: ManagerConfig) -> CacheManager {
        let manager = self.manager(config);
        let event = ExtendableEvent::new();
        manager.install(&event).await.unwrap();
        manager.activate(&event).await.unwrap();
        event.settled().await;
        assert_eq!(manager.state(), WorkerState::Activated);
        manager
    }

    async fn cached_body(&self, generation: &str, path: &str) -> Option<String> {
        self.storage
            .match_entry(generation, &CacheKey::for_url(&url(path)))
            .await
            .unwrap()
            .map(|entry| String::from_utf8(entry.body.clone()).unwrap())
    }
}

async fn respond(manager: &CacheManager, request: Request, event: &ExtendableEvent) -> FetchResponse {
    manager
        .handle_fetch(request, event)
        .into_response()
        .await
        .unwrap()
        .expect("worker should answer")
}

async fn fetch_settled(manager: &CacheManager, request: Request) -> FetchResponse {
    let event = ExtendableEvent::new();
    let answer = respond(manager, request, &event).await;
    event.settled().await;
    answer
}

fn body(answer: &FetchResponse) -> &str {
    std::str::from_utf8(&answer.response.body).unwrap()
}

// ==================== Install / activate ====================

#[tokio::test]
async fn test_install_stores_exactly_the_manifest() {
    let h = Harness::new();
    h.network.serve(url("/shell.html").as_str(), "<shell>");
    h.network.serve(url("/app.js").as_str(), "app()");

    let manager = h.manager(ManagerConfig::new(url("/"), "v1").with_precache(["/shell.html", "/app.js"]));
    let event = ExtendableEvent::new();
    let report = manager.install(&event).await.unwrap();
    event.settled().await;

    assert!(report.is_complete());
    let keys: Vec<String> = h
        .storage
        .entry_keys("v1")
        .await
        .unwrap()
        .iter()
        .map(|k| k.as_str().to_string())
        .collect();
    assert_eq!(
        keys,
        vec![
            "https://launcher.example/app.js".to_string(),
            "https://launcher.example/shell.html".to_string(),
        ]
    );
    assert_eq!(h.cached_body("v1", "/shell.html").await.as_deref(), Some("<shell>"));
}

#[tokio::test]
async fn test_manifest_resolves_relative_to_scope() {
    let h = Harness::new();
    let scope = Url::parse("https://launcher.example/launcher/").unwrap();
    h.network.serve("https://launcher.example/launcher/", "<root>");
    h.network.serve("https://launcher.example/launcher/index.html", "<index>");

    let manager = h.manager(ManagerConfig::new(scope, "v1").with_precache(["./", "./index.html"]));
    let report = manager.install(&ExtendableEvent::new()).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(
        report.stored,
        vec![
            "https://launcher.example/launcher/".to_string(),
            "https://launcher.example/launcher/index.html".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_missing_manifest_entry_does_not_block_install() {
    let h = Harness::new();
    h.network.serve(url("/shell.html").as_str(), "<shell>");

    let manager = h.activated(
        ManagerConfig::new(url("/"), "v1").with_precache(["/shell.html", "/gone.js"]),
    )
    .await;

    assert_eq!(manager.state(), WorkerState::Activated);
    assert!(h.cached_body("v1", "/shell.html").await.is_some());
    assert!(h.cached_body("v1", "/gone.js").await.is_none());
}

#[tokio::test]
async fn test_activation_purges_other_generations() {
    let h = Harness::new();
    let stale = CacheEntry::from_response(&Response::new(url("/old.js"), StatusCode::OK));
    h.storage.put("v0", CacheKey::for_url(&url("/old.js")), stale.clone()).await.unwrap();
    h.storage.put("scratch", CacheKey::for_url(&url("/x.js")), stale).await.unwrap();

    let manager = h.manager(ManagerConfig::new(url("/"), "v1"));
    let event = ExtendableEvent::new();
    manager.install(&event).await.unwrap();
    let report = manager.activate(&event).await.unwrap();

    assert_eq!(report.deleted, vec!["scratch".to_string(), "v0".to_string()]);
    assert_eq!(h.storage.keys().await.unwrap(), vec!["v1".to_string()]);
}

#[tokio::test]
async fn test_activation_claims_open_pages() {
    let h = Harness::new();
    let (page, mut rx) = h.clients.connect(url("/index.html")).await;

    let manager = h.manager(ManagerConfig::new(url("/"), "v1"));
    let event = ExtendableEvent::new();
    manager.install(&event).await.unwrap();
    let report = manager.activate(&event).await.unwrap();

    assert_eq!(report.claimed, 1);
    assert_eq!(h.clients.get(&page).await.unwrap().controller.as_deref(), Some("v1"));
    assert_eq!(
        rx.recv().await,
        Some(ClientMessage::ControllerChange {
            generation: "v1".to_string()
        })
    );
}

#[tokio::test]
async fn test_previous_version_serves_while_successor_activates() {
    let network = ScriptedNetwork::new();
    network.serve(url("/index.html").as_str(), "<index v1>");
    let storage = GatedStorage::new();
    let clients = Arc::new(Clients::new());
    let registration = Arc::new(Registration::new(url("/"), Arc::clone(&clients)));
    let version = |generation: &str, eager: bool| {
        CacheManager::new(
            ManagerConfig::new(url("/"), generation)
                .with_precache(["./index.html"])
                .with_eager_activation(eager),
            network.clone(),
            Some(storage.clone()),
            Arc::clone(&clients),
        )
    };

    let v1 = version("v1", false);
    registration.register(v1.clone()).await.unwrap();
    assert_eq!(registration.controller().unwrap().id(), v1.id());

    network.serve(url("/index.html").as_str(), "<index v2>");
    let gate = storage.hold();
    let v2 = version("v2", true);
    let pending = tokio::spawn({
        let registration = Arc::clone(&registration);
        let v2 = v2.clone();
        async move { registration.register(v2).await }
    });
    tokio::time::timeout(Duration::from_secs(5), async {
        while v2.state() != WorkerState::Activating {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("successor should reach activating");

    network.set_offline(true);
    let event = ExtendableEvent::new();
    let answer = registration
        .fetch(Request::navigate(url("/index.html")), &event)
        .into_response()
        .await
        .unwrap()
        .expect("previous version should still answer");
    event.settled().await;
    assert_eq!(answer.source, ResponseSource::Cache);
    assert_eq!(body(&answer), "<index v1>");
    assert_eq!(registration.active().unwrap().id(), v1.id());
    assert_eq!(registration.activating().unwrap().id(), v2.id());

    gate.notify_one();
    pending.await.unwrap().unwrap();
    assert_eq!(registration.controller().unwrap().id(), v2.id());
    assert!(registration.activating().is_none());
    assert_eq!(v1.state(), WorkerState::Redundant);
    assert_eq!(storage.keys().await.unwrap(), vec!["v2".to_string()]);
}

// ==================== Navigation ====================

#[tokio::test]
async fn test_navigation_prefers_network_and_caches_copy() {
    let h = Harness::new();
    h.network.serve(url("/about.html").as_str(), "<about v2>");
    let manager = h.activated(ManagerConfig::new(url("/"), "v1")).await;

    let answer = fetch_settled(&manager, Request::navigate(url("/about.html"))).await;
    assert_eq!(answer.source, ResponseSource::Network);
    assert_eq!(body(&answer), "<about v2>");
    assert_eq!(h.cached_body("v1", "/about.html").await.as_deref(), Some("<about v2>"));
}

#[tokio::test]
async fn test_offline_navigation_serves_cached_page() {
    let h = Harness::new();
    h.network.serve(url("/about.html").as_str(), "<about>");
    let manager = h.activated(ManagerConfig::new(url("/"), "v1").with_precache(["/about.html"])).await;

    h.network.set_offline(true);
    let answer = fetch_settled(&manager, Request::navigate(url("/about.html"))).await;
    assert_eq!(answer.source, ResponseSource::Cache);
    assert_eq!(body(&answer), "<about>");
}

#[tokio::test]
async fn test_offline_navigation_falls_back_to_index() {
    let h = Harness::new();
    h.network.serve(url("/index.html").as_str(), "<index>");
    let manager = h.activated(ManagerConfig::new(url("/"), "v1").with_precache(["./index.html"])).await;

    h.network.set_offline(true);
    let answer = fetch_settled(&manager, Request::navigate(url("/never-seen.html"))).await;
    assert_eq!(answer.source, ResponseSource::OfflineFallback);
    assert_eq!(body(&answer), "<index>");
}

#[tokio::test]
async fn test_offline_navigation_without_fallback_gets_builtin_page() {
    let h = Harness::new();
    let manager = h.activated(ManagerConfig::new(url("/"), "v1")).await;

    h.network.set_offline(true);
    let answer = fetch_settled(&manager, Request::navigate(url("/"))).await;
    assert_eq!(answer.source, ResponseSource::OfflineFallback);
    assert_eq!(answer.response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body(&answer).contains("Offline"));
}

// ==================== Sub-applications ====================

#[tokio::test]
async fn test_sub_application_fetched_once_then_cached() {
    let h = Harness::new();
    let widget = url("/tools/widget.html");
    h.network.serve(widget.as_str(), "<widget>");
    let manager = h
        .activated(ManagerConfig::new(url("/"), "v1").with_app_prefix("/tools/"))
        .await;

    let first = fetch_settled(&manager, Request::get(widget.clone())).await;
    assert_eq!(first.source, ResponseSource::Network);

    let second = fetch_settled(&manager, Request::get(widget.clone())).await;
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(body(&second), "<widget>");
    assert_eq!(h.network.calls(widget.as_str()), 1);
}

#[tokio::test]
async fn test_cross_origin_sub_application_is_cache_first() {
    let h = Harness::new();
    let todo = Url::parse("https://cdn.example/Apps/todo.html").unwrap();
    h.network.serve(todo.as_str(), "<todo>");
    let manager = h.activated(ManagerConfig::new(url("/"), "v1")).await;

    let first = fetch_settled(&manager, Request::get(todo.clone())).await;
    assert_eq!(first.source, ResponseSource::Network);

    h.network.set_offline(true);
    let second = fetch_settled(&manager, Request::get(todo.clone())).await;
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(body(&second), "<todo>");
    assert_eq!(h.network.calls(todo.as_str()), 1);
}

#[tokio::test]
async fn test_sub_application_under_subpath_scope_is_cache_first() {
    let h = Harness::new();
    let scope = Url::parse("https://user.github.io/Multi_App/").unwrap();
    let todo = scope.join("Apps/todo.html").unwrap();
    h.network.serve(todo.as_str(), "<todo>");
    let manager = h.activated(ManagerConfig::new(scope, "v1")).await;

    fetch_settled(&manager, Request::get(todo.clone())).await;
    let second = fetch_settled(&manager, Request::get(todo.clone())).await;
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(body(&second), "<todo>");
    assert_eq!(h.network.calls(todo.as_str()), 1);
}

#[tokio::test]
async fn test_offline_sub_application_miss_uses_fallback() {
    let h = Harness::new();
    h.network.serve(url("/index.html").as_str(), "<index>");
    let manager = h.activated(ManagerConfig::new(url("/"), "v1").with_precache(["./index.html"])).await;

    h.network.set_offline(true);
    let answer = fetch_settled(&manager, Request::get(url("/Apps/notes.html"))).await;
    assert_eq!(answer.source, ResponseSource::OfflineFallback);
    assert_eq!(body(&answer), "<index>");
}

#[tokio::test]
async fn test_error_status_is_returned_but_not_cached() {
    let h = Harness::new();
    let manager = h.activated(ManagerConfig::new(url("/"), "v1")).await;

    let answer = fetch_settled(&manager, Request::get(url("/Apps/missing.html"))).await;
    assert_eq!(answer.response.status, StatusCode::NOT_FOUND);
    assert!(h.cached_body("v1", "/Apps/missing.html").await.is_none());
}

// ==================== Same-origin assets ====================

#[tokio::test]
async fn test_unchanged_etag_sends_no_notice() {
    let h = Harness::new();
    let asset = url("/index.js");
    h.network.serve_etag(asset.as_str(), "one()", "\"abc\"");
    let manager = h.activated(ManagerConfig::new(url("/"), "v1").with_precache(["/index.js"])).await;
    let (_page, mut rx) = h.clients.connect(url("/")).await;

    let answer = fetch_settled(&manager, Request::get(asset.clone())).await;
    assert_eq!(answer.source, ResponseSource::Cache);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_changed_etag_sends_one_notice_and_refreshes_cache() {
    let h = Harness::new();
    let asset = url("/index.js");
    h.network.serve_etag(asset.as_str(), "one()", "\"abc\"");
    let manager = h.activated(ManagerConfig::new(url("/"), "v1").with_precache(["/index.js"])).await;
    let (_page, mut rx) = h.clients.connect(url("/")).await;

    h.network.serve_etag(asset.as_str(), "two()", "\"def\"");
    let answer = fetch_settled(&manager, Request::get(asset.clone())).await;

    assert_eq!(body(&answer), "one()");
    assert_eq!(
        rx.try_recv().ok(),
        Some(ClientMessage::UpdateAvailable {
            url: asset.to_string()
        })
    );
    assert!(rx.try_recv().is_err());
    assert_eq!(h.cached_body("v1", "/index.js").await.as_deref(), Some("two()"));

    let again = fetch_settled(&manager, Request::get(asset)).await;
    assert_eq!(body(&again), "two()");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_last_modified_used_without_etag() {
    let h = Harness::new();
    let asset = url("/style.css");
    h.network
        .serve_last_modified(asset.as_str(), "a{}", "Mon, 05 Oct 2026 10:00:00 GMT");
    let manager = h.activated(ManagerConfig::new(url("/"), "v1").with_precache(["/style.css"])).await;
    let (_page, mut rx) = h.clients.connect(url("/")).await;

    fetch_settled(&manager, Request::get(asset.clone())).await;
    assert!(rx.try_recv().is_err());

    h.network
        .serve_last_modified(asset.as_str(), "b{}", "Tue, 06 Oct 2026 10:00:00 GMT");
    fetch_settled(&manager, Request::get(asset)).await;
    assert!(matches!(rx.try_recv(), Ok(ClientMessage::UpdateAvailable { .. })));
}

#[tokio::test]
async fn test_notice_reaches_every_page() {
    let h = Harness::new();
    let asset = url("/index.js");
    h.network.serve_etag(asset.as_str(), "one()", "\"1\"");
    let manager = h.activated(ManagerConfig::new(url("/"), "v1").with_precache(["/index.js"])).await;
    let (_a, mut rx_a) = h.clients.connect(url("/")).await;
    let (_b, mut rx_b) = h.clients.connect(url("/about.html")).await;

    h.network.serve_etag(asset.as_str(), "two()", "\"2\"");
    fetch_settled(&manager, Request::get(asset)).await;

    assert!(rx_a.try_recv().is_ok());
    assert!(rx_b.try_recv().is_ok());
}

#[tokio::test]
async fn test_cached_copy_returned_before_revalidation_finishes() {
    let h = Harness::new();
    let asset = url("/index.js");
    h.network.serve_etag(asset.as_str(), "one()", "\"abc\"");
    let manager = h.activated(ManagerConfig::new(url("/"), "v1").with_precache(["/index.js"])).await;
    let (_page, mut rx) = h.clients.connect(url("/")).await;

    h.network.serve_etag(asset.as_str(), "two()", "\"def\"");
    let gate = h.network.hold();

    let event = ExtendableEvent::new();
    let answer = respond(&manager, Request::get(asset), &event).await;
    assert_eq!(answer.source, ResponseSource::Cache);
    assert_eq!(body(&answer), "one()");
    assert_eq!(event.registered(), 2);
    assert!(rx.try_recv().is_err());

    gate.notify_one();
    event.settled().await;
    assert!(matches!(rx.try_recv(), Ok(ClientMessage::UpdateAvailable { .. })));
}

#[tokio::test]
async fn test_uncached_asset_goes_to_network_and_is_stored() {
    let h = Harness::new();
    let asset = url("/dashboard.js");
    h.network.serve(asset.as_str(), "dash()");
    let manager = h.activated(ManagerConfig::new(url("/"), "v1")).await;

    let answer = fetch_settled(&manager, Request::get(asset.clone())).await;
    assert_eq!(answer.source, ResponseSource::Network);
    assert_eq!(h.cached_body("v1", "/dashboard.js").await.as_deref(), Some("dash()"));
    assert_eq!(h.network.calls(asset.as_str()), 1);
}

#[tokio::test]
async fn test_failed_revalidation_keeps_cached_copy() {
    let h = Harness::new();
    let asset = url("/index.js");
    h.network.serve_etag(asset.as_str(), "one()", "\"abc\"");
    let manager = h.activated(ManagerConfig::new(url("/"), "v1").with_precache(["/index.js"])).await;
    let (_page, mut rx) = h.clients.connect(url("/")).await;

    h.network.set_offline(true);
    let answer = fetch_settled(&manager, Request::get(asset)).await;
    assert_eq!(body(&answer), "one()");
    assert_eq!(h.cached_body("v1", "/index.js").await.as_deref(), Some("one()"));
    assert!(rx.try_recv().is_err());
}

// ==================== Cross-origin ====================

#[tokio::test]
async fn test_cross_origin_network_first_with_cache_backup() {
    let h = Harness::new();
    let font = Url::parse("https://fonts.example/inter.woff2").unwrap();
    h.network.serve(font.as_str(), "font-bytes");
    let manager = h.activated(ManagerConfig::new(url("/"), "v1")).await;

    let online = fetch_settled(&manager, Request::get(font.clone())).await;
    assert_eq!(online.source, ResponseSource::Network);

    h.network.set_offline(true);
    let offline = fetch_settled(&manager, Request::get(font.clone())).await;
    assert_eq!(offline.source, ResponseSource::Cache);
    assert_eq!(body(&offline), "font-bytes");
    assert_eq!(h.network.calls(font.as_str()), 2);
}

#[tokio::test]
async fn test_cross_origin_offline_miss_is_an_error() {
    let h = Harness::new();
    let manager = h.activated(ManagerConfig::new(url("/"), "v1")).await;
    h.network.set_offline(true);

    let event = ExtendableEvent::new();
    let result = manager
        .handle_fetch(Request::get(Url::parse("https://api.example/feed").unwrap()), &event)
        .into_response()
        .await;
    assert!(result.is_err());
}

// ==================== Pass-through and degradation ====================

#[tokio::test]
async fn test_non_get_is_not_intercepted() {
    let h = Harness::new();
    let manager = h.activated(ManagerConfig::new(url("/"), "v1")).await;

    let event = ExtendableEvent::new();
    let request = Request::post(url("/Apps/todo.html"), Bytes::from_static(b"{}"));
    assert!(manager.handle_fetch(request, &event).is_passthrough());
    assert_eq!(event.registered(), 0);
}

#[tokio::test]
async fn test_no_storage_passes_everything_through() {
    let network = ScriptedNetwork::new();
    network.serve(url("/index.html").as_str(), "<index>");
    let manager = CacheManager::new(
        ManagerConfig::new(url("/"), "v1").with_precache(["./index.html"]),
        network.clone(),
        None,
        Arc::new(Clients::new()),
    );
    let event = ExtendableEvent::new();
    manager.install(&event).await.unwrap();
    manager.activate(&event).await.unwrap();

    for request in [
        Request::navigate(url("/")),
        Request::get(url("/Apps/todo.html")),
        Request::get(url("/index.js")),
    ] {
        assert!(manager.handle_fetch(request, &event).is_passthrough());
    }
    assert_eq!(network.calls(url("/index.html").as_str()), 0);
}

// ==================== Prefetch ====================

#[tokio::test]
async fn test_prefetch_twice_keeps_latest_copy() {
    let h = Harness::new();
    let page = url("/Apps/todo.html");
    let manager = h.activated(ManagerConfig::new(url("/"), "v1")).await;

    h.network.serve(page.as_str(), "first");
    let event = ExtendableEvent::new();
    manager
        .handle_raw_message(&json!({ "type": "PREFETCH", "url": "/Apps/todo.html" }), &event)
        .unwrap()
        .await
        .unwrap();

    h.network.serve(page.as_str(), "second");
    manager
        .handle_raw_message(&json!({ "type": "PREFETCH", "url": "/Apps/todo.html" }), &event)
        .unwrap()
        .await
        .unwrap();
    event.settled().await;

    assert_eq!(h.storage.entry_keys("v1").await.unwrap().len(), 1);
    assert_eq!(h.cached_body("v1", "/Apps/todo.html").await.as_deref(), Some("second"));

    h.network.set_offline(true);
    let answer = fetch_settled(&manager, Request::get(page)).await;
    assert_eq!(body(&answer), "second");
}

#[tokio::test]
async fn test_failed_prefetch_is_silent() {
    let h = Harness::new();
    let manager = h.activated(ManagerConfig::new(url("/"), "v1")).await;
    h.network.set_offline(true);

    let event = ExtendableEvent::new();
    manager
        .handle_raw_message(&json!({ "type": "PREFETCH", "url": "/Apps/todo.html" }), &event)
        .unwrap()
        .await
        .unwrap();
    assert!(h.storage.entry_keys("v1").await.unwrap().is_empty());
}
