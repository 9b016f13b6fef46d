use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use packetview_api::*;
use packetview_core::store::{self, StoreError};
use packetview_core::{FieldCatalogSource, SessionDataStore, SettingsSource, TableStateStore};

/// Typed HTTP client for the viewer endpoints.
///
/// The inherent methods return `anyhow` errors; the collaborator trait impls
/// used by the session list controller convert them into [`StoreError`].
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new client with the given base URL and timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create from an existing `reqwest::Client` (e.g. shared in tests).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    // ── Table state ───────────────────────────────────────────────────────

    pub async fn table_state(&self, view_id: &str) -> Result<TableState> {
        let resp = self
            .client
            .get(self.url(&format!("tableState/{}", urlencoding::encode(view_id))))
            .send()
            .await?;
        parse_response(resp).await
    }

    pub async fn save_table_state(&self, view_id: &str, state: &TableState) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("tableState/{}", urlencoding::encode(view_id))))
            .json(state)
            .send()
            .await?;
        ensure_success(resp).await
    }

    // ── Lookups ───────────────────────────────────────────────────────────

    pub async fn user_settings(&self) -> Result<Settings> {
        let resp = self.client.get(self.url("user/settings")).send().await?;
        parse_response(resp).await
    }

    pub async fn fields(&self) -> Result<FieldCatalog> {
        let resp = self.client.get(self.url("fields")).send().await?;
        parse_response(resp).await
    }

    // ── Sessions ──────────────────────────────────────────────────────────

    pub async fn list_sessions(&self, query: &SessionQuery) -> Result<SessionListResponse> {
        let url = self.url(&query.to_path());
        debug!("GET {url}");
        let resp = self.client.get(&url).send().await?;
        parse_response(resp).await
    }

    /// Unique values of `field` across the current search, one per line.
    /// A non-zero `counts` asks for a per-value count column.
    pub async fn unique_values(&self, field: &str, counts: u32) -> Result<String> {
        let url = self.url(&format!(
            "unique.txt?exp={}&counts={counts}",
            urlencoding::encode(field)
        ));
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(UnexpectedStatus {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(body)
    }
}

/// Non-2xx response, kept typed so it maps onto [`StoreError::Status`].
#[derive(Debug)]
struct UnexpectedStatus {
    status: u16,
    body: String,
}

impl std::fmt::Display for UnexpectedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.body)
    }
}

impl std::error::Error for UnexpectedStatus {}

/// Parse an HTTP response: return the deserialized body on 2xx,
/// or an error containing the status and body text.
async fn parse_response<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(UnexpectedStatus {
            status: status.as_u16(),
            body,
        }
        .into());
    }
    Ok(resp.json().await?)
}

async fn ensure_success(resp: reqwest::Response) -> Result<()> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(UnexpectedStatus {
        status: status.as_u16(),
        body,
    }
    .into())
}

fn to_store_error(err: anyhow::Error) -> StoreError {
    if let Some(status) = err.downcast_ref::<UnexpectedStatus>() {
        return StoreError::Status {
            status: status.status,
            body: status.body.clone(),
        };
    }
    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
        if e.is_decode() {
            return StoreError::Decode(e.to_string());
        }
    }
    StoreError::Transport(format!("{err:#}"))
}

// ── Collaborator seams ─────────────────────────────────────────────────────

impl TableStateStore for ApiClient {
    async fn load_table_state(&self, view_id: &str) -> store::Result<TableState> {
        self.table_state(view_id).await.map_err(to_store_error)
    }

    async fn save_table_state(&self, view_id: &str, state: &TableState) -> store::Result<()> {
        ApiClient::save_table_state(self, view_id, state)
            .await
            .map_err(to_store_error)
    }
}

impl SettingsSource for ApiClient {
    async fn fetch_settings(&self) -> store::Result<Settings> {
        self.user_settings().await.map_err(to_store_error)
    }
}

impl FieldCatalogSource for ApiClient {
    async fn fetch_fields(&self) -> store::Result<FieldCatalog> {
        self.fields().await.map_err(to_store_error)
    }
}

impl SessionDataStore for ApiClient {
    async fn fetch_sessions(&self, query: &SessionQuery) -> store::Result<SessionListResponse> {
        self.list_sessions(query).await.map_err(to_store_error)
    }

    async fn export_unique_values(&self, field: &str, facet_index: u32) -> store::Result<String> {
        self.unique_values(field, facet_index)
            .await
            .map_err(to_store_error)
    }
}
