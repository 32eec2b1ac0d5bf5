//! # REST Api Client
//!
//! The sync layer's only read/write contract with the server, behind
//! the [`ApiClient`] trait so the scheduler can be exercised against a
//! fake in tests and a different transport on another platform.
//!
//! ## Endpoint Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Server Contract                                    │
//! │                                                                         │
//! │  GET  /cache/{entity}?limit=N          entity preload + refresh         │
//! │  GET  /cache/{entity}/{id}             travel-mode detail               │
//! │  GET  /cache/{entity}/{id}/children    travel-mode history              │
//! │  GET  /cache/geography?lat&lng&radius  travel-mode geographic set       │
//! │  POST /sync/interventions              one batched pending flush        │
//! │  POST /media/{interventionId}          one multipart upload per row     │
//! │                                                                         │
//! │  The scheduler interprets responses as data + count only; merge         │
//! │  logic stays server-side.                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use fleetline_core::types::{EntityKind, GeoPoint, MediaKind, PendingIntervention, PendingMedia};

use crate::error::{SyncError, SyncOpResult};

// =============================================================================
// Wire Shapes
// =============================================================================

/// One page of entities from a `/cache/...` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityPage {
    /// Opaque entity rows; the sync layer never looks inside.
    pub data: Vec<serde_json::Value>,

    #[serde(default)]
    pub count: i64,

    /// Server-suggested TTL override, in milliseconds.
    #[serde(default, rename = "cacheExpiry")]
    pub cache_expiry_ms: Option<i64>,
}

// =============================================================================
// Api Client Trait
// =============================================================================

/// Everything the scheduler asks of the network.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// `GET /cache/{entity}?limit=N` — preload/refresh one entity list.
    async fn fetch_entity_list(&self, kind: EntityKind, limit: u32) -> SyncOpResult<EntityPage>;

    /// `GET /cache/{entity}/{id}` — one travel-mode target detail.
    async fn fetch_entity_detail(&self, kind: EntityKind, id: i64)
        -> SyncOpResult<serde_json::Value>;

    /// `GET /cache/{entity}/{id}/children` — a target's history.
    async fn fetch_entity_children(&self, kind: EntityKind, id: i64) -> SyncOpResult<EntityPage>;

    /// `GET /cache/geography?lat&lng&radius` — geography-bounded set.
    async fn fetch_geography(&self, center: GeoPoint, radius_km: f64) -> SyncOpResult<EntityPage>;

    /// `POST /sync/interventions` — one batched flush with the last
    /// known sync timestamp for server-side delta computation.
    async fn push_interventions(
        &self,
        batch: &[PendingIntervention],
        last_sync: Option<DateTime<Utc>>,
    ) -> SyncOpResult<()>;

    /// `POST /media/{interventionId}` — one multipart upload.
    async fn upload_media(&self, media: &PendingMedia) -> SyncOpResult<()>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// reqwest-backed [`ApiClient`].
///
/// Owns transport details only: endpoint construction, body encoding
/// and HTTP error mapping. Timeouts are left to the client's platform
/// defaults; retry policy belongs to the scheduler (which is: none
/// automatic).
pub struct HttpApiClient {
    client: Client,
    base: Url,
}

impl HttpApiClient {
    /// Builds a client for the given API base URL.
    ///
    /// ## Errors
    /// Returns an error when the URL does not parse or the underlying
    /// client cannot be constructed.
    pub fn new(base_url: &str) -> SyncOpResult<Self> {
        let client = Client::builder().build()?;
        Self::with_client(base_url, client)
    }

    /// Builds the adapter around an existing reqwest client (shared
    /// connection pool, platform-specific TLS config).
    pub fn with_client(base_url: &str, client: Client) -> SyncOpResult<Self> {
        // A base without a trailing slash would swallow its last
        // segment on join().
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };

        let base = Url::parse(&normalized)?;
        Ok(HttpApiClient { client, base })
    }

    fn endpoint(&self, path: &str) -> SyncOpResult<Url> {
        Ok(self.base.join(path)?)
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn fetch_entity_list(&self, kind: EntityKind, limit: u32) -> SyncOpResult<EntityPage> {
        let url = self.endpoint(&format!("cache/{kind}"))?;
        debug!(entity = %kind, limit, "Fetching entity list");

        let page = self
            .client
            .get(url)
            .query(&[("limit", limit)])
            .send()
            .await?
            .error_for_status()?
            .json::<EntityPage>()
            .await?;

        Ok(page)
    }

    async fn fetch_entity_detail(
        &self,
        kind: EntityKind,
        id: i64,
    ) -> SyncOpResult<serde_json::Value> {
        let url = self.endpoint(&format!("cache/{kind}/{id}"))?;

        let detail = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;

        Ok(detail)
    }

    async fn fetch_entity_children(&self, kind: EntityKind, id: i64) -> SyncOpResult<EntityPage> {
        let url = self.endpoint(&format!("cache/{kind}/{id}/children"))?;

        let page = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<EntityPage>()
            .await?;

        Ok(page)
    }

    async fn fetch_geography(&self, center: GeoPoint, radius_km: f64) -> SyncOpResult<EntityPage> {
        let url = self.endpoint("cache/geography")?;

        let page = self
            .client
            .get(url)
            .query(&[
                ("lat", center.lat.to_string()),
                ("lng", center.lon.to_string()),
                ("radius", radius_km.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<EntityPage>()
            .await?;

        Ok(page)
    }

    async fn push_interventions(
        &self,
        batch: &[PendingIntervention],
        last_sync: Option<DateTime<Utc>>,
    ) -> SyncOpResult<()> {
        let url = self.endpoint("sync/interventions")?;
        debug!(count = batch.len(), "Pushing intervention batch");

        self.client
            .post(url)
            .json(&json!({
                "interventions": batch,
                "lastSync": last_sync,
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn upload_media(&self, media: &PendingMedia) -> SyncOpResult<()> {
        let url = self.endpoint(&format!("media/{}", media.intervention_id))?;
        let (extension, mime) = media_content_type(media.kind);

        let file = Part::bytes(media.blob.clone())
            .file_name(format!("{}.{extension}", media.id))
            .mime_str(mime)
            .map_err(|e| SyncError::Internal(format!("invalid media mime: {e}")))?;

        let mut form = Form::new()
            .part("file", file)
            .text("type", media.kind.as_str());

        if let Some(geo) = media.geo_tag {
            form = form
                .text("latitude", geo.lat.to_string())
                .text("longitude", geo.lon.to_string());
        }

        debug!(
            id = %media.id,
            intervention_id = media.intervention_id,
            bytes = media.blob.len(),
            "Uploading media"
        );

        self.client
            .post(url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// File extension and MIME type for one media kind.
fn media_content_type(kind: MediaKind) -> (&'static str, &'static str) {
    match kind {
        MediaKind::Photo => ("jpg", "image/jpeg"),
        MediaKind::Signature => ("png", "image/png"),
        MediaKind::Document => ("pdf", "application/pdf"),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        let client = HttpApiClient::new("https://api.example.test/v1").unwrap();
        let url = client.endpoint("cache/vehicles").unwrap();
        assert_eq!(url.as_str(), "https://api.example.test/v1/cache/vehicles");

        let client = HttpApiClient::new("https://api.example.test/v1/").unwrap();
        let url = client.endpoint("sync/interventions").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.test/v1/sync/interventions"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(matches!(
            HttpApiClient::new("not a url"),
            Err(SyncError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_entity_page_parses_wire_shape() {
        let page: EntityPage = serde_json::from_str(
            r#"{"data": [{"id": 1}, {"id": 2}], "count": 2, "cacheExpiry": 7200000}"#,
        )
        .unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.count, 2);
        assert_eq!(page.cache_expiry_ms, Some(7_200_000));

        // cacheExpiry is optional on the wire.
        let page: EntityPage = serde_json::from_str(r#"{"data": [], "count": 0}"#).unwrap();
        assert!(page.cache_expiry_ms.is_none());
    }

    #[test]
    fn test_media_content_type_by_kind() {
        assert_eq!(media_content_type(MediaKind::Photo), ("jpg", "image/jpeg"));
        assert_eq!(media_content_type(MediaKind::Signature), ("png", "image/png"));
        assert_eq!(
            media_content_type(MediaKind::Document),
            ("pdf", "application/pdf")
        );
    }
}
