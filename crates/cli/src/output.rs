use anyhow::Result;
use packetview_api::{FieldCatalog, SessionQuery, SessionRecord, SortDirection, TableState};
use packetview_core::{columns, display, query, SessionListController, ViewerBackend};
use serde::Serialize;

const COLUMN_GAP: &str = "  ";

/// Header text for a visible column.
pub fn column_title(catalog: &FieldCatalog, header: &str) -> String {
    if let Some(col) = columns::builtin_column(header) {
        return col.title.to_string();
    }
    query::lookup_field(catalog, header)
        .and_then(|meta| meta.friendly_name.clone())
        .unwrap_or_else(|| header.to_string())
}

fn sort_marker(direction: Option<SortDirection>) -> &'static str {
    match direction {
        Some(SortDirection::Asc) => " ^",
        Some(SortDirection::Desc) => " v",
        None => "",
    }
}

fn render_cell<B: ViewerBackend>(
    controller: &SessionListController<B>,
    record: &SessionRecord,
    header: &str,
) -> String {
    let timezone = controller.settings().timezone;
    query::header_keys(controller.catalog(), header)
        .iter()
        .map(|key| display::format_cell(record, key, timezone))
        .filter(|cell| !cell.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Attributes shown under an opened row.
fn render_detail(record: &SessionRecord) -> Vec<String> {
    let mut lines = vec![format!("id: {}", record.id)];
    if let Some(index) = &record.index {
        lines.push(format!("index: {index}"));
    }
    if let Some(db) = record.db {
        lines.push(format!("db bytes: {db}"));
    }
    for (key, value) in &record.extra {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        lines.push(format!("{key}: {text}"));
    }
    lines
}

/// Render the current page as an aligned text table.
pub fn render_table<B: ViewerBackend>(controller: &SessionListController<B>) -> String {
    let headers = &controller.table_state().visible_headers;
    let titles: Vec<String> = headers
        .iter()
        .map(|h| {
            format!(
                "{}{}",
                column_title(controller.catalog(), h),
                sort_marker(controller.sort_order(h))
            )
        })
        .collect();
    let rows: Vec<Vec<String>> = controller
        .rows()
        .iter()
        .map(|r| headers.iter().map(|h| render_cell(controller, r, h)).collect())
        .collect();

    let widths: Vec<usize> = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(title.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    if let Some(err) = controller.last_error() {
        out.push_str(&format!("warning: {err}\n"));
    }
    out.push_str(&format_line(&titles, &widths));

    if rows.is_empty() {
        out.push_str("No sessions match.\n");
    }
    for (record, cells) in controller.rows().iter().zip(&rows) {
        out.push_str(&format_line(cells, &widths));
        if record.expanded {
            for line in render_detail(record) {
                out.push_str(&format!("    {line}\n"));
            }
        }
    }

    out.push_str(&footer(controller));
    out
}

fn format_line(cells: &[String], widths: &[usize]) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join(COLUMN_GAP);
    format!("{}\n", line.trim_end())
}

fn footer<B: ViewerBackend>(controller: &SessionListController<B>) -> String {
    let query = controller.query();
    let sessions = controller.sessions();
    let shown = sessions.data.len() as u64;
    let first = if shown == 0 { 0 } else { u64::from(query.start) + 1 };
    let last = u64::from(query.start) + shown;
    format!(
        "Showing {first}-{last} of {} entries (page {}, filtered from {} total)\n",
        sessions.records_filtered,
        controller.current_page(),
        sessions.records_total
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListView<'a> {
    view_id: &'a str,
    query: &'a SessionQuery,
    request: String,
    table_state: &'a TableState,
    current_page: u32,
    records_total: u64,
    records_filtered: u64,
    data: &'a [SessionRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Render the controller state as pretty JSON.
pub fn render_json<B: ViewerBackend>(controller: &SessionListController<B>) -> Result<String> {
    let sessions = controller.sessions();
    let view = ListView {
        view_id: controller.view_id(),
        query: controller.query(),
        request: controller.query().to_path(),
        table_state: controller.table_state(),
        current_page: controller.current_page(),
        records_total: sessions.records_total,
        records_filtered: sessions.records_filtered,
        data: controller.rows(),
        error: controller.last_error(),
    };
    Ok(serde_json::to_string_pretty(&view)?)
}

/// One line per visible column: position, id, title and sort key.
pub fn render_columns<B: ViewerBackend>(controller: &SessionListController<B>) -> String {
    let mut out = String::new();
    for (pos, header) in controller.table_state().visible_headers.iter().enumerate() {
        let mut line = format!(
            "{pos:>2}  {header:<8} {}",
            column_title(controller.catalog(), header)
        );
        if let (Some(rank), Some(direction)) =
            (controller.is_sorted(header), controller.sort_order(header))
        {
            line.push_str(&format!("  [sort {} {}]", rank + 1, direction));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}
