//! # Cache Router
//!
//! Request-interception strategy engine: for every outbound request it
//! decides the data source, without the caller knowing whether the
//! device is online.
//!
//! ## Classification Precedence (first match wins)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Request Classification                               │
//! │                                                                         │
//! │  1. Exclusion list (auth/session, dev tooling)                          │
//! │     └─► BYPASS: straight to network, never cached,                      │
//! │         credentials always included by the fetcher                      │
//! │                                                                         │
//! │  2. Static asset patterns (styles, scripts, images, icons, fonts)       │
//! │     └─► CACHE-FIRST: versioned asset cache, store 200 clones,           │
//! │         placeholder image / typed 404 on total failure                  │
//! │                                                                         │
//! │  3. Navigational requests (Accept: text/html)                           │
//! │     └─► NETWORK-FIRST: cache 200 clones, fall back to cache,            │
//! │         then the precached offline page                                 │
//! │                                                                         │
//! │  4. Remaining API-class GETs                                            │
//! │     └─► STALE-WHILE-REVALIDATE against the Durable Store:               │
//! │         serve cached immediately, refresh in the background             │
//! │                                                                         │
//! │  Non-GET and anything unclassified pass straight through.               │
//! │                                                                         │
//! │  Network errors NEVER propagate past this layer: every strategy         │
//! │  has a defined fallback; a cache read failure is a cache miss.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//! `install()` precaches a small fixed shell and tolerates individual
//! asset failures; `activate()` deletes every asset-cache namespace
//! whose version tag does not match the current one and takes over
//! request handling immediately. A version bump is the only supported
//! cache-busting mechanism for the static cache.
//!
//! The router runs against its own execution context: it shares no
//! in-memory state with the scheduler, only the Durable Store and the
//! network.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use fleetline_core::types::ttl;
use fleetline_db::SharedDatabase;

use crate::error::SyncOpResult;

// =============================================================================
// Request / Response Model
// =============================================================================

/// The abstract shape of an intercepted request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,

    /// Path + optional query, e.g. `/cache/vehicles?limit=100`.
    pub path: String,

    /// Accept header, when the caller sent one.
    pub accept: Option<String>,

    /// Raw body for pass-through writes.
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    /// A plain GET.
    pub fn get(path: impl Into<String>) -> Self {
        FetchRequest {
            method: Method::GET,
            path: path.into(),
            accept: None,
            body: None,
        }
    }

    /// A navigational request (full page load).
    pub fn navigation(path: impl Into<String>) -> Self {
        FetchRequest {
            method: Method::GET,
            path: path.into(),
            accept: Some("text/html,application/xhtml+xml".to_string()),
            body: None,
        }
    }
}

/// A raw response as fetched from the network or the asset cache.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Where a routed response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Fresh from the network.
    Network,
    /// The versioned static asset cache.
    AssetCache,
    /// The Durable Store's cached-resource collection.
    StoreCache,
    /// Built-in image placeholder.
    Placeholder,
    /// The precached (or built-in) offline page.
    OfflineFallback,
    /// Typed error body synthesized by the router.
    TypedError,
}

/// What the router hands back to the caller. Never an Err.
#[derive(Debug, Clone)]
pub struct RoutedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl RoutedResponse {
    fn from_fetched(response: FetchedResponse, source: ResponseSource) -> Self {
        RoutedResponse {
            status: response.status,
            content_type: response.content_type,
            body: response.body,
            source,
        }
    }
}

/// How a request will be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Exclusion list: network only, credentials included, no caching.
    Bypass,
    /// Cache-first against the versioned asset cache.
    StaticAsset,
    /// Network-first with cache + offline-page fallback.
    Navigation,
    /// Stale-while-revalidate against the Durable Store.
    ApiRead,
    /// Unclassified or non-GET: forwarded untouched.
    PassThrough,
}

// =============================================================================
// Capability Traits
// =============================================================================

/// Raw network access for the router (assets, pages, API bodies).
///
/// Implementations forward cookies/credentials as the platform
/// requires; the router itself never inspects them.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> SyncOpResult<FetchedResponse>;
}

/// The platform's versioned static cache.
///
/// Reads are infallible by contract: implementations swallow their
/// own failures and answer `None`, which the router treats as a miss.
#[async_trait]
pub trait AssetCache: Send + Sync {
    async fn get(&self, namespace: &str, path: &str) -> Option<FetchedResponse>;
    async fn put(&self, namespace: &str, path: &str, response: FetchedResponse);
    async fn namespaces(&self) -> Vec<String>;
    async fn drop_namespace(&self, namespace: &str);
}

/// In-memory [`AssetCache`] used as the default adapter (and in
/// tests). A platform with a real cache storage supplies its own.
#[derive(Default)]
pub struct MemoryAssetCache {
    inner: RwLock<HashMap<String, HashMap<String, FetchedResponse>>>,
}

impl MemoryAssetCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssetCache for MemoryAssetCache {
    async fn get(&self, namespace: &str, path: &str) -> Option<FetchedResponse> {
        self.inner
            .read()
            .await
            .get(namespace)
            .and_then(|ns| ns.get(path))
            .cloned()
    }

    async fn put(&self, namespace: &str, path: &str, response: FetchedResponse) {
        self.inner
            .write()
            .await
            .entry(namespace.to_string())
            .or_default()
            .insert(path.to_string(), response);
    }

    async fn namespaces(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }

    async fn drop_namespace(&self, namespace: &str) {
        self.inner.write().await.remove(namespace);
    }
}

/// reqwest-backed [`Fetcher`].
pub struct HttpFetcher {
    client: reqwest::Client,
    base: url::Url,
}

impl HttpFetcher {
    pub fn new(base_url: &str) -> SyncOpResult<Self> {
        Ok(HttpFetcher {
            client: reqwest::Client::builder().build()?,
            base: url::Url::parse(base_url)?,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> SyncOpResult<FetchedResponse> {
        let url = self.base.join(&request.path)?;

        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(accept) = &request.accept {
            builder = builder.header(reqwest::header::ACCEPT, accept);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = response.bytes().await?.to_vec();

        Ok(FetchedResponse {
            status,
            content_type,
            body,
        })
    }
}

// =============================================================================
// Router Configuration
// =============================================================================

/// Version tag and URL patterns driving classification.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Static cache version tag. Bumping it is the only supported
    /// cache-busting mechanism; `activate()` drops every other
    /// namespace.
    pub version: String,

    /// Path prefixes that always bypass caching (auth/session
    /// endpoints, platform dev-tooling paths).
    pub excluded_prefixes: Vec<String>,

    /// Extensions served cache-first.
    pub static_extensions: Vec<String>,

    /// The fixed shell precached on install.
    pub shell_assets: Vec<String>,

    /// The offline fallback page (must be part of the shell).
    pub offline_page: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            version: "v1".to_string(),
            excluded_prefixes: vec![
                "/auth".to_string(),
                "/login".to_string(),
                "/logout".to_string(),
                "/session".to_string(),
                "/sockjs-node".to_string(),
                "/__".to_string(),
            ],
            static_extensions: vec![
                "css", "js", "mjs", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "woff",
                "woff2",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            shell_assets: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                "/offline.html".to_string(),
                "/icons/icon-192.png".to_string(),
                "/icons/icon-512.png".to_string(),
            ],
            offline_page: "/offline.html".to_string(),
        }
    }
}

// =============================================================================
// Constants
// =============================================================================

/// Shown in place of an image that is neither cached nor reachable.
const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="120" height="90"><rect width="100%" height="100%" fill="#e5e7eb"/><text x="50%" y="50%" font-size="10" text-anchor="middle" fill="#6b7280">offline</text></svg>"##;

/// Built-in fallback when even the precached offline page is missing.
const OFFLINE_PAGE_HTML: &str =
    "<!doctype html><html><body><h1>Offline</h1><p>This page is not available without a network connection.</p></body></html>";

// =============================================================================
// Cache Router
// =============================================================================

/// The strategy engine. One instance per interception context.
pub struct CacheRouter {
    config: RouterConfig,
    fetcher: Arc<dyn Fetcher>,
    assets: Arc<dyn AssetCache>,
    store: SharedDatabase,
}

impl CacheRouter {
    /// Creates a router over the given capabilities.
    pub fn new(
        config: RouterConfig,
        fetcher: Arc<dyn Fetcher>,
        assets: Arc<dyn AssetCache>,
        store: SharedDatabase,
    ) -> Self {
        CacheRouter {
            config,
            fetcher,
            assets,
            store,
        }
    }

    /// The current versioned asset-cache namespace.
    pub fn namespace(&self) -> String {
        format!("static-{}", self.config.version)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Precaches the fixed shell. A single unreachable asset never
    /// fails installation.
    pub async fn install(&self) {
        let namespace = self.namespace();
        let mut cached = 0usize;

        for path in &self.config.shell_assets {
            let request = FetchRequest::get(path.clone());
            match self.fetcher.fetch(&request).await {
                Ok(response) if response.is_ok() => {
                    self.assets.put(&namespace, path, response).await;
                    cached += 1;
                }
                Ok(response) => {
                    warn!(path = %path, status = response.status, "Shell asset not precached");
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Shell asset unreachable during install");
                }
            }
        }

        info!(
            namespace = %namespace,
            cached,
            total = self.config.shell_assets.len(),
            "Install complete"
        );
    }

    /// Drops every asset-cache namespace that does not match the
    /// current version tag, then starts serving immediately.
    pub async fn activate(&self) {
        let current = self.namespace();

        for namespace in self.assets.namespaces().await {
            if namespace != current {
                info!(namespace = %namespace, "Dropping stale asset cache");
                self.assets.drop_namespace(&namespace).await;
            }
        }

        info!(namespace = %current, "Activated");
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// Applies the classification precedence. First match wins.
    pub fn classify(&self, request: &FetchRequest) -> RouteClass {
        let path = strip_query(&request.path);

        if self
            .config
            .excluded_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return RouteClass::Bypass;
        }

        if request.method != Method::GET {
            return RouteClass::PassThrough;
        }

        if self.is_static_asset(path) {
            return RouteClass::StaticAsset;
        }

        if request
            .accept
            .as_deref()
            .is_some_and(|accept| accept.contains("text/html"))
        {
            return RouteClass::Navigation;
        }

        RouteClass::ApiRead
    }

    fn is_static_asset(&self, path: &str) -> bool {
        if self.config.shell_assets.iter().any(|a| a == path) {
            return true;
        }
        path.rsplit('.')
            .next()
            .is_some_and(|ext| self.config.static_extensions.iter().any(|e| e == ext))
    }

    // =========================================================================
    // Handling
    // =========================================================================

    /// Routes one request. Infallible: every failure mode maps to a
    /// typed response.
    pub async fn handle(&self, request: &FetchRequest) -> RoutedResponse {
        match self.classify(request) {
            RouteClass::Bypass | RouteClass::PassThrough => self.pass_through(request).await,
            RouteClass::StaticAsset => self.cache_first(request).await,
            RouteClass::Navigation => self.network_first(request).await,
            RouteClass::ApiRead => self.stale_while_revalidate(request).await,
        }
    }

    /// Forward untouched; synthesize a typed error when the network
    /// itself fails.
    async fn pass_through(&self, request: &FetchRequest) -> RoutedResponse {
        match self.fetcher.fetch(request).await {
            Ok(response) => RoutedResponse::from_fetched(response, ResponseSource::Network),
            Err(e) => {
                debug!(path = %request.path, error = %e, "Pass-through failed");
                typed_error(503, &request.path)
            }
        }
    }

    /// Serve from the versioned asset cache; fill it on miss.
    async fn cache_first(&self, request: &FetchRequest) -> RoutedResponse {
        let namespace = self.namespace();
        let path = strip_query(&request.path).to_string();

        if let Some(hit) = self.assets.get(&namespace, &path).await {
            return RoutedResponse::from_fetched(hit, ResponseSource::AssetCache);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) if response.is_ok() => {
                self.assets.put(&namespace, &path, response.clone()).await;
                RoutedResponse::from_fetched(response, ResponseSource::Network)
            }
            Ok(response) => RoutedResponse::from_fetched(response, ResponseSource::Network),
            Err(e) => {
                debug!(path = %path, error = %e, "Static asset unreachable");
                if is_image(&path) {
                    RoutedResponse {
                        status: 200,
                        content_type: Some("image/svg+xml".to_string()),
                        body: PLACEHOLDER_SVG.as_bytes().to_vec(),
                        source: ResponseSource::Placeholder,
                    }
                } else {
                    typed_error(404, &path)
                }
            }
        }
    }

    /// Try the network; fall back to the cached page, then the
    /// offline page.
    async fn network_first(&self, request: &FetchRequest) -> RoutedResponse {
        let namespace = self.namespace();
        let path = strip_query(&request.path).to_string();

        match self.fetcher.fetch(request).await {
            Ok(response) if response.is_ok() => {
                self.assets.put(&namespace, &path, response.clone()).await;
                RoutedResponse::from_fetched(response, ResponseSource::Network)
            }
            Ok(response) => RoutedResponse::from_fetched(response, ResponseSource::Network),
            Err(e) => {
                debug!(path = %path, error = %e, "Navigation failed, falling back");

                if let Some(hit) = self.assets.get(&namespace, &path).await {
                    return RoutedResponse::from_fetched(hit, ResponseSource::AssetCache);
                }

                match self.assets.get(&namespace, &self.config.offline_page).await {
                    Some(page) => RoutedResponse {
                        status: 200,
                        content_type: page.content_type,
                        body: page.body,
                        source: ResponseSource::OfflineFallback,
                    },
                    None => RoutedResponse {
                        status: 200,
                        content_type: Some("text/html".to_string()),
                        body: OFFLINE_PAGE_HTML.as_bytes().to_vec(),
                        source: ResponseSource::OfflineFallback,
                    },
                }
            }
        }
    }

    /// Serve any cached value immediately while refreshing it in the
    /// background for the next read.
    async fn stale_while_revalidate(&self, request: &FetchRequest) -> RoutedResponse {
        let key = api_cache_key(&request.path);

        // A store read failure (including an uninitialized store in
        // this execution context) is equivalent to a cache miss.
        let cached = match self.store.get() {
            Ok(db) => match db.cache().get(&key).await {
                Ok(value) => value,
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                    None
                }
            },
            Err(e) => {
                debug!(key = %key, error = %e, "Store unavailable, treating as miss");
                None
            }
        };

        if let Some(value) = cached {
            self.spawn_refresh(request.clone(), key);
            return RoutedResponse {
                status: 200,
                content_type: Some("application/json".to_string()),
                body: value.to_string().into_bytes(),
                source: ResponseSource::StoreCache,
            };
        }

        match self.fetcher.fetch(request).await {
            Ok(response) if response.is_ok() => {
                self.write_through(&key, &response).await;
                RoutedResponse::from_fetched(response, ResponseSource::Network)
            }
            Ok(response) => RoutedResponse::from_fetched(response, ResponseSource::Network),
            Err(e) => {
                debug!(key = %key, error = %e, "API read failed with no cached value");
                typed_error(503, &request.path)
            }
        }
    }

    /// Background refresh for the stale-while-revalidate path.
    fn spawn_refresh(&self, request: FetchRequest, key: String) {
        let fetcher = Arc::clone(&self.fetcher);
        let store = self.store.clone();

        tokio::spawn(async move {
            match fetcher.fetch(&request).await {
                Ok(response) if response.is_ok() => {
                    write_response_to_cache(&store, &key, &response).await;
                }
                Ok(response) => {
                    debug!(key = %key, status = response.status, "Refresh skipped, non-200");
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "Background refresh failed");
                }
            }
        });
    }

    async fn write_through(&self, key: &str, response: &FetchedResponse) {
        write_response_to_cache(&self.store, key, response).await;
    }
}

/// Best-effort cache write of a 200 API body.
async fn write_response_to_cache(store: &SharedDatabase, key: &str, response: &FetchedResponse) {
    let Ok(db) = store.get() else {
        return;
    };

    let value: serde_json::Value = match serde_json::from_slice(&response.body) {
        Ok(value) => value,
        Err(e) => {
            debug!(key = %key, error = %e, "API body is not JSON, not cached");
            return;
        }
    };

    if let Err(e) = db.cache().set(key, &value, ttl::ENTITY_LIST_MS).await {
        warn!(key = %key, error = %e, "Failed to update read-through cache");
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn strip_query(path: &str) -> &str {
    path.split('?').next().unwrap_or(path)
}

fn is_image(path: &str) -> bool {
    path.rsplit('.')
        .next()
        .is_some_and(|ext| matches!(ext, "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "ico"))
}

/// Derives the Durable Store key for an API path:
/// `/cache/vehicles?limit=100` → `vehicles`.
fn api_cache_key(path: &str) -> String {
    let path = strip_query(path).trim_start_matches('/');
    let path = path.strip_prefix("cache/").unwrap_or(path);
    path.replace('/', "_")
}

fn typed_error(status: u16, path: &str) -> RoutedResponse {
    let body = serde_json::json!({
        "error": "offline",
        "path": strip_query(path),
    });

    RoutedResponse {
        status,
        content_type: Some("application/json".to_string()),
        body: body.to_string().into_bytes(),
        source: ResponseSource::TypedError,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use fleetline_db::DbConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    // -------------------------------------------------------------------------
    // Mock Fetcher
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct MockFetcher {
        routes: Mutex<HashMap<String, FetchedResponse>>,
        offline: AtomicBool,
        calls: Mutex<Vec<String>>,
    }

    impl MockFetcher {
        fn with_route(self, path: &str, content_type: &str, body: &str) -> Self {
            self.routes.lock().unwrap().insert(
                path.to_string(),
                FetchedResponse {
                    status: 200,
                    content_type: Some(content_type.to_string()),
                    body: body.as_bytes().to_vec(),
                },
            );
            self
        }

        fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, request: &FetchRequest) -> SyncOpResult<FetchedResponse> {
            self.calls.lock().unwrap().push(request.path.clone());

            if self.offline.load(Ordering::SeqCst) {
                return Err(crate::error::SyncError::Network("offline".into()));
            }

            let path = strip_query(&request.path).to_string();
            match self.routes.lock().unwrap().get(&path) {
                Some(response) => Ok(response.clone()),
                None => Ok(FetchedResponse {
                    status: 404,
                    content_type: None,
                    body: Vec::new(),
                }),
            }
        }
    }

    async fn shared_db() -> SharedDatabase {
        let shared = SharedDatabase::new();
        shared.initialize(DbConfig::in_memory()).await.unwrap();
        shared
    }

    async fn router_with(fetcher: MockFetcher) -> (CacheRouter, Arc<MockFetcher>) {
        let fetcher = Arc::new(fetcher);
        let router = CacheRouter::new(
            RouterConfig::default(),
            fetcher.clone(),
            Arc::new(MemoryAssetCache::new()),
            shared_db().await,
        );
        (router, fetcher)
    }

    // -------------------------------------------------------------------------
    // Classification
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_classification_precedence() {
        let (router, _) = router_with(MockFetcher::default()).await;

        // Exclusion wins over everything, whatever the method.
        assert_eq!(
            router.classify(&FetchRequest::get("/auth/token")),
            RouteClass::Bypass
        );
        let mut post = FetchRequest::get("/auth/token");
        post.method = Method::POST;
        assert_eq!(router.classify(&post), RouteClass::Bypass);

        // Static extensions.
        assert_eq!(
            router.classify(&FetchRequest::get("/assets/app.css")),
            RouteClass::StaticAsset
        );
        assert_eq!(
            router.classify(&FetchRequest::get("/img/logo.png?v=2")),
            RouteClass::StaticAsset
        );

        // Navigation by Accept header.
        assert_eq!(
            router.classify(&FetchRequest::navigation("/dashboard")),
            RouteClass::Navigation
        );

        // Remaining GETs are API-class reads.
        assert_eq!(
            router.classify(&FetchRequest::get("/cache/vehicles?limit=100")),
            RouteClass::ApiRead
        );

        // Non-GET passes straight through.
        let mut write = FetchRequest::get("/cache/vehicles");
        write.method = Method::POST;
        assert_eq!(router.classify(&write), RouteClass::PassThrough);
    }

    // -------------------------------------------------------------------------
    // Cache-First (static assets)
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_cache_first_serves_from_cache_after_first_fetch() {
        let (router, fetcher) =
            router_with(MockFetcher::default().with_route("/assets/app.css", "text/css", "body{}"))
                .await;

        let first = router.handle(&FetchRequest::get("/assets/app.css")).await;
        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(first.status, 200);

        // Even fully offline, the asset now answers from cache.
        fetcher.go_offline();
        let second = router.handle(&FetchRequest::get("/assets/app.css")).await;
        assert_eq!(second.source, ResponseSource::AssetCache);
        assert_eq!(second.body, b"body{}".to_vec());
    }

    #[tokio::test]
    async fn test_unreachable_image_gets_placeholder() {
        let (router, fetcher) = router_with(MockFetcher::default()).await;
        fetcher.go_offline();

        let response = router.handle(&FetchRequest::get("/img/photo.jpg")).await;
        assert_eq!(response.source, ResponseSource::Placeholder);
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type.as_deref(), Some("image/svg+xml"));
    }

    #[tokio::test]
    async fn test_unreachable_script_gets_typed_404() {
        let (router, fetcher) = router_with(MockFetcher::default()).await;
        fetcher.go_offline();

        let response = router.handle(&FetchRequest::get("/assets/app.js")).await;
        assert_eq!(response.source, ResponseSource::TypedError);
        assert_eq!(response.status, 404);
    }

    // -------------------------------------------------------------------------
    // Network-First (navigation)
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_navigation_falls_back_to_cached_page() {
        let (router, fetcher) = router_with(
            MockFetcher::default().with_route("/dashboard", "text/html", "<main>live</main>"),
        )
        .await;

        let live = router.handle(&FetchRequest::navigation("/dashboard")).await;
        assert_eq!(live.source, ResponseSource::Network);

        fetcher.go_offline();
        let fallback = router.handle(&FetchRequest::navigation("/dashboard")).await;
        assert_eq!(fallback.source, ResponseSource::AssetCache);
        assert_eq!(fallback.body, b"<main>live</main>".to_vec());
    }

    #[tokio::test]
    async fn test_uncached_navigation_gets_offline_page() {
        let (router, fetcher) = router_with(
            MockFetcher::default().with_route("/offline.html", "text/html", "<h1>offline</h1>"),
        )
        .await;

        router.install().await;
        fetcher.go_offline();

        let response = router.handle(&FetchRequest::navigation("/reports")).await;
        assert_eq!(response.source, ResponseSource::OfflineFallback);
        assert_eq!(response.body, b"<h1>offline</h1>".to_vec());
    }

    #[tokio::test]
    async fn test_offline_page_has_builtin_fallback() {
        let (router, fetcher) = router_with(MockFetcher::default()).await;
        fetcher.go_offline();

        let response = router.handle(&FetchRequest::navigation("/reports")).await;
        assert_eq!(response.source, ResponseSource::OfflineFallback);
        assert!(!response.body.is_empty());
    }

    // -------------------------------------------------------------------------
    // Stale-While-Revalidate (API reads)
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_api_read_serves_cached_and_refreshes_in_background() {
        let fetcher = Arc::new(MockFetcher::default().with_route(
            "/cache/vehicles",
            "application/json",
            r#"{"data":["fresh"],"count":1}"#,
        ));
        let store = shared_db().await;
        let db = store.get().unwrap();
        db.cache()
            .set("vehicles", &json!({"data": ["stale"], "count": 1}), ttl::ENTITY_LIST_MS)
            .await
            .unwrap();

        let router = CacheRouter::new(
            RouterConfig::default(),
            fetcher.clone(),
            Arc::new(MemoryAssetCache::new()),
            store,
        );

        let response = router
            .handle(&FetchRequest::get("/cache/vehicles?limit=100"))
            .await;
        assert_eq!(response.source, ResponseSource::StoreCache);
        let served: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(served, json!({"data": ["stale"], "count": 1}));

        // The concurrent refresh updates the cache for next time.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let refreshed = db.cache().get("vehicles").await.unwrap().unwrap();
        assert_eq!(refreshed, json!({"data": ["fresh"], "count": 1}));
        assert!(fetcher.calls().iter().any(|p| p.contains("/cache/vehicles")));
    }

    #[tokio::test]
    async fn test_api_read_miss_fetches_and_caches() {
        let (router, _) = router_with(MockFetcher::default().with_route(
            "/cache/contacts",
            "application/json",
            r#"{"data":[1,2],"count":2}"#,
        ))
        .await;

        let response = router.handle(&FetchRequest::get("/cache/contacts")).await;
        assert_eq!(response.source, ResponseSource::Network);

        let db = router.store.get().unwrap();
        let cached = db.cache().get("contacts").await.unwrap().unwrap();
        assert_eq!(cached, json!({"data": [1, 2], "count": 2}));
    }

    #[tokio::test]
    async fn test_api_read_miss_offline_gets_typed_error() {
        let (router, fetcher) = router_with(MockFetcher::default()).await;
        fetcher.go_offline();

        let response = router.handle(&FetchRequest::get("/cache/anomalies")).await;
        assert_eq!(response.source, ResponseSource::TypedError);
        assert_eq!(response.status, 503);

        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["error"], "offline");
    }

    // -------------------------------------------------------------------------
    // Bypass
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_bypass_never_caches() {
        let (router, fetcher) = router_with(
            MockFetcher::default().with_route("/auth/refresh", "application/json", r#"{"token":"t"}"#),
        )
        .await;

        let response = router.handle(&FetchRequest::get("/auth/refresh")).await;
        assert_eq!(response.source, ResponseSource::Network);

        // Nothing was stored anywhere: offline, the same call fails
        // with a typed error instead of a cached answer.
        fetcher.go_offline();
        let offline = router.handle(&FetchRequest::get("/auth/refresh")).await;
        assert_eq!(offline.source, ResponseSource::TypedError);
        assert_eq!(offline.status, 503);
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_install_tolerates_unreachable_assets() {
        let (router, _) = router_with(
            MockFetcher::default()
                .with_route("/offline.html", "text/html", "<h1>offline</h1>")
                .with_route("/manifest.json", "application/json", "{}"),
        )
        .await;

        // Icons and index 404 in this fixture; install still succeeds.
        router.install().await;

        let namespace = router.namespace();
        assert!(router.assets.get(&namespace, "/offline.html").await.is_some());
        assert!(router.assets.get(&namespace, "/manifest.json").await.is_some());
        assert!(router
            .assets
            .get(&namespace, "/icons/icon-192.png")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_activate_drops_stale_namespaces() {
        let (router, _) = router_with(MockFetcher::default()).await;
        let stale = FetchedResponse {
            status: 200,
            content_type: None,
            body: b"old".to_vec(),
        };

        router.assets.put("static-v0", "/app.css", stale.clone()).await;
        router.assets.put(&router.namespace(), "/app.css", stale).await;

        router.activate().await;

        let namespaces = router.assets.namespaces().await;
        assert_eq!(namespaces, vec![router.namespace()]);
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    #[test]
    fn test_api_cache_key_derivation() {
        assert_eq!(api_cache_key("/cache/vehicles?limit=100"), "vehicles");
        assert_eq!(api_cache_key("/cache/vehicles/42"), "vehicles_42");
        assert_eq!(api_cache_key("/forms/templates"), "forms_templates");
    }

    #[test]
    fn test_is_image() {
        assert!(is_image("/img/a.png"));
        assert!(is_image("/img/a.svg"));
        assert!(!is_image("/assets/app.js"));
        assert!(!is_image("/dashboard"));
    }
}
