//! Derives the wire-level [`SessionQuery`] from table state and field metadata.

use std::collections::HashSet;

use packetview_api::{FieldCatalog, FieldMeta, SessionQuery, SortSpec, TableState};

use crate::columns::{self, ALWAYS_FETCHED};

/// Find a field by canonical name, falling back to a match on its storage key.
pub fn lookup_field<'a>(catalog: &'a FieldCatalog, name: &str) -> Option<&'a FieldMeta> {
    catalog
        .get(name)
        .or_else(|| catalog.values().find(|meta| meta.db_field == name))
}

fn meta_for<'a>(catalog: &'a FieldCatalog, id: &str) -> Option<&'a FieldMeta> {
    match columns::builtin_column(id) {
        Some(col) => lookup_field(catalog, col.field),
        None => lookup_field(catalog, id),
    }
}

fn child_key(catalog: &FieldCatalog, child: &str) -> String {
    lookup_field(catalog, child)
        .filter(|meta| !meta.db_field.is_empty())
        .map_or_else(|| child.to_string(), |meta| meta.db_field.clone())
}

/// Storage key for a single (non-composite) field id.
pub fn storage_key(catalog: &FieldCatalog, id: &str) -> String {
    if let Some(meta) = meta_for(catalog, id).filter(|meta| !meta.db_field.is_empty()) {
        return meta.db_field.clone();
    }
    columns::builtin_column(id).map_or_else(|| id.to_string(), |col| col.db_field.to_string())
}

/// Storage keys a visible column needs. Composite columns expand to their
/// children, in declared order.
pub fn header_keys(catalog: &FieldCatalog, header: &str) -> Vec<String> {
    if let Some(meta) = meta_for(catalog, header) {
        if meta.is_composite() {
            return meta
                .children
                .iter()
                .flatten()
                .map(|child| child_key(catalog, child))
                .collect();
        }
        if !meta.db_field.is_empty() {
            return vec![meta.db_field.clone()];
        }
    }
    match columns::builtin_column(header) {
        Some(col) if !col.children.is_empty() => col
            .children
            .iter()
            .map(|child| child_key(catalog, child))
            .collect(),
        Some(col) => vec![col.db_field.to_string()],
        None => vec![header.to_string()],
    }
}

/// Compute the `fields` list: always-fetched keys, then every visible
/// column's keys, then any sort key not already present. First occurrence
/// wins, so the result never holds duplicates.
pub fn build_fields(
    visible_headers: &[String],
    sorts: &[SortSpec],
    catalog: &FieldCatalog,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut fields = Vec::new();
    let mut push = |key: String| {
        if seen.insert(key.clone()) {
            fields.push(key);
        }
    };

    for key in ALWAYS_FETCHED {
        push((*key).to_string());
    }
    for header in visible_headers {
        for key in header_keys(catalog, header) {
            push(key);
        }
    }
    for sort in sorts {
        push(storage_key(catalog, &sort.field));
    }
    fields
}

/// Query for the first page of a freshly loaded view.
pub fn initial_query(state: &TableState, catalog: &FieldCatalog, page_length: u32) -> SessionQuery {
    let mut query = SessionQuery {
        length: page_length,
        ..SessionQuery::default()
    };
    sync_query(&mut query, state, catalog);
    query
}

/// Copy the table state's sort order into `query` and recompute its fields.
/// Pagination and ad-hoc filters are left untouched.
pub fn sync_query(query: &mut SessionQuery, state: &TableState, catalog: &FieldCatalog) {
    query.sorts = state.order.clone();
    query.fields = build_fields(&state.visible_headers, &state.order, catalog);
}
