//! In-memory backend and fixtures for exercising the session list.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use packetview_api::{
    FieldCatalog, FieldMeta, SessionListResponse, SessionQuery, SessionRecord, Settings,
    TableState,
};

use crate::store::{
    FieldCatalogSource, Result, SessionDataStore, SettingsSource, StoreError, TableStateStore,
};

/// A call observed by [`MemoryBackend`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    LoadTableState(String),
    SaveTableState(String),
    FetchSettings,
    FetchFields,
    /// Relative request path, e.g. `sessions.json?facets=1&...`.
    FetchSessions(String),
    ExportUnique(String, u32),
}

#[derive(Default)]
struct MemoryState {
    table_states: HashMap<String, TableState>,
    saved: Vec<TableState>,
    settings: Settings,
    fields: FieldCatalog,
    sessions: SessionListResponse,
    queued: VecDeque<(SessionListResponse, Duration)>,
    fail_startup: bool,
    fail_persist: bool,
    fail_sessions: bool,
    calls: Vec<BackendCall>,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory backend lock poisoned")
    }

    pub fn with_fields(self, fields: FieldCatalog) -> Self {
        self.lock().fields = fields;
        self
    }

    pub fn with_settings(self, settings: Settings) -> Self {
        self.lock().settings = settings;
        self
    }

    pub fn with_sessions(self, sessions: SessionListResponse) -> Self {
        self.lock().sessions = sessions;
        self
    }

    pub fn with_table_state(self, view_id: &str, state: TableState) -> Self {
        self.lock().table_states.insert(view_id.to_string(), state);
        self
    }

    /// Table state, settings and field lookups all fail.
    pub fn failing_startup(self) -> Self {
        self.lock().fail_startup = true;
        self
    }

    pub fn failing_persist(self) -> Self {
        self.lock().fail_persist = true;
        self
    }

    pub fn set_fail_sessions(&self, fail: bool) {
        self.lock().fail_sessions = fail;
    }

    /// Serve `response` to the next session fetch after `delay`.
    pub fn push_response(&self, response: SessionListResponse, delay: Duration) {
        self.lock().queued.push_back((response, delay));
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    pub fn session_fetches(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::FetchSessions(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// Table states successfully written, oldest first.
    pub fn saved_states(&self) -> Vec<TableState> {
        self.lock().saved.clone()
    }

    fn unavailable(what: &str) -> StoreError {
        StoreError::Transport(format!("{what} unavailable"))
    }
}

impl TableStateStore for MemoryBackend {
    async fn load_table_state(&self, view_id: &str) -> Result<TableState> {
        let mut state = self.lock();
        state
            .calls
            .push(BackendCall::LoadTableState(view_id.to_string()));
        if state.fail_startup {
            return Err(Self::unavailable("table state"));
        }
        Ok(state.table_states.get(view_id).cloned().unwrap_or_default())
    }

    async fn save_table_state(&self, view_id: &str, table: &TableState) -> Result<()> {
        let mut state = self.lock();
        state
            .calls
            .push(BackendCall::SaveTableState(view_id.to_string()));
        if state.fail_persist {
            return Err(Self::unavailable("table state"));
        }
        state.saved.push(table.clone());
        state
            .table_states
            .insert(view_id.to_string(), table.clone());
        Ok(())
    }
}

impl SettingsSource for MemoryBackend {
    async fn fetch_settings(&self) -> Result<Settings> {
        let mut state = self.lock();
        state.calls.push(BackendCall::FetchSettings);
        if state.fail_startup {
            return Err(Self::unavailable("settings"));
        }
        Ok(state.settings.clone())
    }
}

impl FieldCatalogSource for MemoryBackend {
    async fn fetch_fields(&self) -> Result<FieldCatalog> {
        let mut state = self.lock();
        state.calls.push(BackendCall::FetchFields);
        if state.fail_startup {
            return Err(Self::unavailable("fields"));
        }
        Ok(state.fields.clone())
    }
}

impl SessionDataStore for MemoryBackend {
    async fn fetch_sessions(&self, query: &SessionQuery) -> Result<SessionListResponse> {
        let (response, delay) = {
            let mut state = self.lock();
            state.calls.push(BackendCall::FetchSessions(query.to_path()));
            if state.fail_sessions {
                return Err(Self::unavailable("sessions"));
            }
            match state.queued.pop_front() {
                Some(queued) => queued,
                None => (state.sessions.clone(), Duration::ZERO),
            }
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(response)
    }

    async fn export_unique_values(&self, field: &str, facet_index: u32) -> Result<String> {
        self.lock()
            .calls
            .push(BackendCall::ExportUnique(field.to_string(), facet_index));
        Ok(String::new())
    }
}

// ── Fixtures ───────────────────────────────────────────────────────────────

fn field(db_field: &str, friendly_name: &str, field_type: &str) -> FieldMeta {
    FieldMeta {
        db_field: db_field.to_string(),
        friendly_name: Some(friendly_name.to_string()),
        group: Some("general".to_string()),
        field_type: Some(field_type.to_string()),
        ..FieldMeta::default()
    }
}

/// A field catalog covering the default columns.
pub fn sample_catalog() -> FieldCatalog {
    let mut catalog = FieldCatalog::new();
    catalog.insert("protocols".into(), field("prot-term", "Protocols", "termfield"));
    catalog.insert("starttime".into(), field("fp", "Start Time", "seconds"));
    catalog.insert("stoptime".into(), field("lp", "Stop Time", "seconds"));
    catalog.insert("ip.src".into(), field("a1", "Src IP", "ip"));
    catalog.insert("ip.dst".into(), field("a2", "Dst IP", "ip"));
    catalog.insert("port.src".into(), field("p1", "Src Port", "integer"));
    catalog.insert("port.dst".into(), field("p2", "Dst Port", "integer"));
    catalog.insert("packets".into(), field("pa", "Packets", "integer"));
    catalog.insert("bytes".into(), field("by", "Bytes", "integer"));
    catalog.insert("no".into(), field("no", "Capture Node", "termfield"));
    catalog.insert(
        "info".into(),
        FieldMeta {
            children: Some(
                ["us", "esrc", "edst", "esub", "efn", "dnsho", "tls.alt", "ircch"]
                    .iter()
                    .map(|c| (*c).to_string())
                    .collect(),
            ),
            ..field("info", "Info", "")
        },
    );
    for (name, db_field) in [
        ("http.uri", "us"),
        ("email.src", "esrc"),
        ("email.dst", "edst"),
        ("email.subject", "esub"),
        ("email.fn", "efn"),
        ("host.dns", "dnsho"),
        ("cert.alt", "tls.alt"),
        ("irc.channel", "ircch"),
    ] {
        catalog.insert(
            name.into(),
            FieldMeta {
                exp: Some(name.to_string()),
                ..FieldMeta::new(db_field)
            },
        );
    }
    catalog
}

/// One UDP session recorded on node `demo`.
pub fn sample_sessions() -> SessionListResponse {
    SessionListResponse {
        records_total: 50,
        records_filtered: 1,
        data: vec![SessionRecord {
            id: "sessionid".into(),
            index: Some("sessions-".into()),
            pr: Some(17),
            a1: Some(serde_json::json!(16843009)),
            p1: Some(10000),
            a2: Some(serde_json::json!(33686018)),
            p2: Some(2948),
            pa: Some(1),
            by: Some(445),
            db: Some(437),
            fp: Some(0),
            lp: Some(0),
            no: Some("demo".into()),
            expanded: false,
            extra: Default::default(),
        }],
        error: None,
    }
}
