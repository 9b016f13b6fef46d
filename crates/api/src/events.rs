//! Named events exchanged between the session list and the surrounding page.
//!
//! Inbound events are emitted by sibling components (search bar, paginator,
//! visualizations); outbound events are rebroadcast to them.

use serde::{Deserialize, Serialize};

/// Partial filter state from the search bar. Only present keys apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<i64>,
}

/// Pagination window chosen by the paginator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaginationChange {
    pub length: u32,
    pub current_page: u32,
    pub start: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchExpression {
    pub expression: String,
}

/// Time window in epoch seconds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: i64,
    pub stop: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "payload")]
pub enum InboundEvent {
    #[serde(rename = "change:search")]
    ChangeSearch(SearchChange),
    #[serde(rename = "change:pagination")]
    ChangePagination(PaginationChange),
    #[serde(rename = "add:to:search")]
    AddToSearch(SearchExpression),
    #[serde(rename = "change:time")]
    ChangeTime(TimeWindow),
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChangeSearch(_) => "change:search",
            Self::ChangePagination(_) => "change:pagination",
            Self::AddToSearch(_) => "add:to:search",
            Self::ChangeTime(_) => "change:time",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "payload")]
pub enum OutboundEvent {
    #[serde(rename = "add:to:typeahead")]
    AddToTypeahead(SearchExpression),
    #[serde(rename = "update:time")]
    UpdateTime(TimeWindow),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddToTypeahead(_) => "add:to:typeahead",
            Self::UpdateTime(_) => "update:time",
        }
    }
}
