//! Text rendering of session attributes.

use chrono::{DateTime, Local, Utc};
use packetview_api::{SessionRecord, Timezone};
use serde_json::Value;

const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Format epoch seconds in the user's preferred timezone.
pub fn format_timestamp(secs: i64, timezone: Timezone) -> String {
    let Some(utc) = DateTime::<Utc>::from_timestamp(secs, 0) else {
        return secs.to_string();
    };
    match timezone {
        Timezone::Local => utc.with_timezone(&Local).format(TIME_FORMAT).to_string(),
        Timezone::Localtz => utc
            .with_timezone(&Local)
            .format("%Y/%m/%d %H:%M:%S %:z")
            .to_string(),
        Timezone::Gmt => format!("{}Z", utc.format(TIME_FORMAT)),
    }
}

/// Packed IPv4 integers become dotted quads; strings pass through.
pub fn format_address(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_u64().and_then(|v| u32::try_from(v).ok()) {
            Some(packed) => std::net::Ipv4Addr::from(packed).to_string(),
            None => n.to_string(),
        },
        Value::String(s) => s.clone(),
        other => format_value(other),
    }
}

pub fn protocol_name(pr: u32) -> String {
    match pr {
        1 => "icmp".to_string(),
        6 => "tcp".to_string(),
        17 => "udp".to_string(),
        47 => "gre".to_string(),
        58 => "icmpv6".to_string(),
        132 => "sctp".to_string(),
        other => other.to_string(),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(format_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Render one storage key of a row for a text table.
pub fn format_cell(record: &SessionRecord, key: &str, timezone: Timezone) -> String {
    match key {
        "fp" | "lp" => match record.attribute(key).and_then(|v| v.as_i64()) {
            Some(secs) => format_timestamp(secs, timezone),
            None => String::new(),
        },
        "a1" | "a2" => record
            .attribute(key)
            .map(|v| format_address(&v))
            .unwrap_or_default(),
        "pr" => record.pr.map(protocol_name).unwrap_or_default(),
        _ => record
            .attribute(key)
            .map(|v| format_value(&v))
            .unwrap_or_default(),
    }
}
