//! The session search query and its canonical query-string encoding.

use serde::{Deserialize, Serialize};

use crate::{SortSpec, DEFAULT_PAGE_LENGTH};

/// Path of the session search endpoint, relative to the viewer base URL.
pub const SESSIONS_ENDPOINT: &str = "sessions.json";

/// A session search request as sent to `GET sessions.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    /// Page size.
    pub length: u32,
    /// Zero-based offset of the first row.
    pub start: u32,
    /// Whether aggregate facet data is requested.
    pub facets: bool,
    pub sorts: Vec<SortSpec>,
    /// Storage keys to retrieve, duplicate-free and in resolution order.
    pub fields: Vec<String>,
    /// Hours back from now; `-1` searches all time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<i64>,
}

impl Default for SessionQuery {
    fn default() -> Self {
        Self {
            length: DEFAULT_PAGE_LENGTH,
            start: 0,
            facets: true,
            sorts: Vec::new(),
            fields: Vec::new(),
            date: None,
            expression: None,
            start_time: None,
            stop_time: None,
        }
    }
}

impl SessionQuery {
    /// `fp:asc,lp:desc`
    pub fn order_param(&self) -> String {
        self.sorts
            .iter()
            .map(SortSpec::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Query parameters in canonical order, already percent-encoded.
    ///
    /// Keys are emitted as `date, expression, facets, flatten, fields, length,
    /// order, start, startTime, stopTime`. Unset optional keys, an empty
    /// expression, a zero `start` and zero time bounds are left out.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(date) = self.date {
            params.push(("date", date.to_string()));
        }
        if let Some(expr) = self.expression.as_deref().filter(|e| !e.is_empty()) {
            params.push(("expression", urlencoding::encode(expr).into_owned()));
        }
        params.push(("facets", u8::from(self.facets).to_string()));
        params.push(("flatten", "1".to_string()));
        params.push(("fields", self.fields.join(",")));
        params.push(("length", self.length.to_string()));
        params.push(("order", self.order_param()));
        if self.start != 0 {
            params.push(("start", self.start.to_string()));
        }
        if let Some(t) = self.start_time.filter(|t| *t != 0) {
            params.push(("startTime", t.to_string()));
        }
        if let Some(t) = self.stop_time.filter(|t| *t != 0) {
            params.push(("stopTime", t.to_string()));
        }
        params
    }

    pub fn to_query_string(&self) -> String {
        self.to_query_pairs()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// `sessions.json?...`, relative to the viewer base URL.
    pub fn to_path(&self) -> String {
        format!("{SESSIONS_ENDPOINT}?{}", self.to_query_string())
    }
}
