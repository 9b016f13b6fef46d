//! Seams to the remote services the session list depends on.

use std::future::Future;

use packetview_api::{FieldCatalog, SessionListResponse, SessionQuery, Settings, TableState};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("{status}: {body}")]
    Status { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Remote key/value store holding one [`TableState`] per view.
pub trait TableStateStore: Send + Sync {
    /// Returns the default (empty) state when nothing was persisted yet.
    fn load_table_state(&self, view_id: &str) -> impl Future<Output = Result<TableState>> + Send;

    /// Overwrites the persisted state for `view_id`.
    fn save_table_state(
        &self,
        view_id: &str,
        state: &TableState,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Executes session searches.
pub trait SessionDataStore: Send + Sync {
    fn fetch_sessions(
        &self,
        query: &SessionQuery,
    ) -> impl Future<Output = Result<SessionListResponse>> + Send;

    /// Unique values of `field` (a single key or a colon-joined compound key)
    /// across the current search, optionally with per-value counts.
    fn export_unique_values(
        &self,
        field: &str,
        facet_index: u32,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Field metadata service.
pub trait FieldCatalogSource: Send + Sync {
    fn fetch_fields(&self) -> impl Future<Output = Result<FieldCatalog>> + Send;
}

/// User preference service.
pub trait SettingsSource: Send + Sync {
    fn fetch_settings(&self) -> impl Future<Output = Result<Settings>> + Send;
}

/// Everything the session list controller talks to.
pub trait ViewerBackend:
    TableStateStore + SessionDataStore + FieldCatalogSource + SettingsSource + 'static
{
}

impl<T> ViewerBackend for T where
    T: TableStateStore + SessionDataStore + FieldCatalogSource + SettingsSource + 'static
{
}
