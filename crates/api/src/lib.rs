//! Wire types shared by the packetview viewer core, its HTTP client and the CLI.
//!
//! Everything that crosses a process boundary lives here: the session search
//! query and its canonical query-string encoding, the persisted table state,
//! field metadata, user settings, result rows and the event payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod events;
pub mod query;

pub use events::{
    InboundEvent, OutboundEvent, PaginationChange, SearchChange, SearchExpression, TimeWindow,
};
pub use query::{SessionQuery, SESSIONS_ENDPOINT};

// ─── Defaults ────────────────────────────────────────────────────────────────

/// Column ids shown when no table state has been persisted yet.
pub const DEFAULT_VISIBLE_HEADERS: &[&str] =
    &["fp", "lp", "src", "p1", "dst", "p2", "pa", "dbby", "no", "info"];

/// Sort field used when no table state has been persisted yet.
pub const DEFAULT_SORT_FIELD: &str = "fp";

/// Page size used when neither config nor pagination events set one.
pub const DEFAULT_PAGE_LENGTH: u32 = 50;

// ─── Sorting ─────────────────────────────────────────────────────────────────

/// Direction of a single sort key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(field, direction)` entry of a multi-key sort.
///
/// Persisted as a two-element array (`["fp", "asc"]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(
    from = "(String, SortDirection)",
    into = "(String, SortDirection)"
)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Asc)
    }
}

impl From<(String, SortDirection)> for SortSpec {
    fn from((field, direction): (String, SortDirection)) -> Self {
        Self { field, direction }
    }
}

impl From<SortSpec> for (String, SortDirection) {
    fn from(spec: SortSpec) -> Self {
        (spec.field, spec.direction)
    }
}

impl std::fmt::Display for SortSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.field, self.direction)
    }
}

// ─── Table state ─────────────────────────────────────────────────────────────

/// Durable per-view table preferences, stored at `tableState/<viewId>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TableState {
    #[serde(default)]
    pub order: Vec<SortSpec>,
    #[serde(default)]
    pub visible_headers: Vec<String>,
}

impl TableState {
    /// Table state used when nothing has been persisted for a view.
    pub fn default_for_view() -> Self {
        let mut state = Self::default();
        state.fill_defaults();
        state
    }

    /// Fill each empty member with its default. Returns true when anything changed.
    pub fn fill_defaults(&mut self) -> bool {
        let mut changed = false;
        if self.order.is_empty() {
            self.order = vec![SortSpec::asc(DEFAULT_SORT_FIELD)];
            changed = true;
        }
        if self.visible_headers.is_empty() {
            self.visible_headers = DEFAULT_VISIBLE_HEADERS
                .iter()
                .map(|header| (*header).to_string())
                .collect();
            changed = true;
        }
        changed
    }
}

// ─── Fields ──────────────────────────────────────────────────────────────────

/// Metadata for one searchable field, as served by `GET fields`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FieldMeta {
    /// Storage key used by the search backend (e.g. `fp`).
    #[serde(default)]
    pub db_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    /// Member fields of a composite column; each is fetched individually.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<String>>,
}

impl FieldMeta {
    pub fn new(db_field: impl Into<String>) -> Self {
        Self {
            db_field: db_field.into(),
            ..Self::default()
        }
    }

    pub fn is_composite(&self) -> bool {
        self.children.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// Field metadata keyed by canonical field name (e.g. `starttime`).
pub type FieldCatalog = BTreeMap<String, FieldMeta>;

// ─── Settings ────────────────────────────────────────────────────────────────

/// Timezone used to render session timestamps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Timezone {
    /// Local time with the UTC offset appended.
    Localtz,
    Gmt,
    /// Unrecognized values fall back to local time.
    #[default]
    #[serde(other)]
    Local,
}

impl Timezone {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Local => "local",
            Self::Localtz => "localtz",
            Self::Gmt => "gmt",
        }
    }
}

impl std::fmt::Display for Timezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subset of `GET user/settings` the viewer consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub timezone: Timezone,
}

// ─── Sessions ────────────────────────────────────────────────────────────────

/// One row of a session search result.
///
/// Well-known attributes are typed; anything else requested through `fields`
/// lands in `extra`. `expanded` is owned by the viewer, not the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    /// IP protocol number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<u32>,
    /// Source address: a packed IPv4 integer or a textual address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a1: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p1: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a2: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p2: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pa: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<u64>,
    /// First packet time (epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fp: Option<i64>,
    /// Last packet time (epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lp: Option<i64>,
    /// Capture node the session was recorded on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no: Option<String>,
    #[serde(default)]
    pub expanded: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SessionRecord {
    /// Look up any returned attribute by storage key, typed or not.
    pub fn attribute(&self, key: &str) -> Option<serde_json::Value> {
        use serde_json::Value;
        let num = |n: Option<u64>| n.map(Value::from);
        match key {
            "id" => Some(Value::from(self.id.clone())),
            "index" => self.index.clone().map(Value::from),
            "pr" => self.pr.map(Value::from),
            "a1" => self.a1.clone(),
            "a2" => self.a2.clone(),
            "p1" => self.p1.map(Value::from),
            "p2" => self.p2.map(Value::from),
            "pa" => num(self.pa),
            "by" => num(self.by),
            "db" => num(self.db),
            "fp" => self.fp.map(Value::from),
            "lp" => self.lp.map(Value::from),
            "no" => self.no.clone().map(Value::from),
            other => self.extra.get(other).cloned(),
        }
    }
}

/// Result envelope of `GET sessions.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResponse {
    #[serde(default)]
    pub records_total: u64,
    #[serde(default)]
    pub records_filtered: u64,
    #[serde(default)]
    pub data: Vec<SessionRecord>,
    /// Search errors are reported inside a successful response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_spec_persists_as_pair() {
        let state = TableState {
            order: vec![SortSpec::asc("fp"), SortSpec::new("lp", SortDirection::Desc)],
            visible_headers: vec!["fp".into()],
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "order": [["fp", "asc"], ["lp", "desc"]],
                "visibleHeaders": ["fp"]
            })
        );
        let back: TableState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn empty_table_state_fills_both_members() {
        let mut state: TableState = serde_json::from_str("{}").unwrap();
        assert!(state.fill_defaults());
        assert_eq!(state.order, vec![SortSpec::asc("fp")]);
        assert_eq!(
            state.visible_headers,
            vec!["fp", "lp", "src", "p1", "dst", "p2", "pa", "dbby", "no", "info"]
        );
    }

    #[test]
    fn partial_table_state_keeps_persisted_member() {
        let mut state: TableState =
            serde_json::from_str(r#"{"visibleHeaders":["no","fp"]}"#).unwrap();
        assert!(state.fill_defaults());
        assert_eq!(state.visible_headers, vec!["no", "fp"]);
        assert_eq!(state.order, vec![SortSpec::asc("fp")]);
        assert!(!state.fill_defaults());
    }

    #[test]
    fn settings_default_to_local_timezone() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.timezone, Timezone::Local);

        let settings: Settings = serde_json::from_str(r#"{"timezone":"gmt"}"#).unwrap();
        assert_eq!(settings.timezone, Timezone::Gmt);

        let settings: Settings =
            serde_json::from_str(r#"{"timezone":"mars","theme":"dark"}"#).unwrap();
        assert_eq!(settings.timezone, Timezone::Local);
    }

    #[test]
    fn field_catalog_accepts_sparse_entries() {
        let catalog: FieldCatalog = serde_json::from_str(
            r#"{
                "info": {"dbField": "info", "friendlyName": "Info",
                         "children": ["us", "esrc"]},
                "http.uri": {"dbField": "us", "exp": "http.uri"}
            }"#,
        )
        .unwrap();
        assert!(catalog["info"].is_composite());
        assert!(!catalog["http.uri"].is_composite());
        assert_eq!(catalog["http.uri"].db_field, "us");
    }

    #[test]
    fn session_record_keeps_unknown_fields() {
        let json = serde_json::json!({
            "id": "sessionid",
            "index": "sessions-",
            "pr": 17,
            "a1": 16843009,
            "p1": 10000,
            "a2": 33686018,
            "p2": 2948,
            "pa": 1,
            "by": 445,
            "db": 437,
            "fp": 0,
            "lp": 0,
            "no": "demo",
            "pa1": 1,
            "expanded": false
        });
        let record: SessionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.id, "sessionid");
        assert_eq!(record.no.as_deref(), Some("demo"));
        assert_eq!(record.attribute("pa1"), Some(serde_json::json!(1)));
        assert_eq!(record.attribute("by"), Some(serde_json::json!(445)));
        assert_eq!(record.attribute("missing"), None);
    }

    #[test]
    fn session_list_response_reports_error() {
        let resp: SessionListResponse =
            serde_json::from_str(r#"{"error":"bad expression","data":[]}"#).unwrap();
        assert_eq!(resp.error.as_deref(), Some("bad expression"));
        assert_eq!(resp.records_total, 0);
    }
}
