//! Built-in session table columns.
//!
//! Column ids are what the table state persists (`src`, `dbby`, ...). Each
//! maps onto a canonical field in the field catalog, with a fallback storage
//! key for when the catalog could not be loaded.

/// Storage keys every row needs regardless of which columns are shown:
/// the protocol and the IPv6 endpoints used to render the address columns.
pub const ALWAYS_FETCHED: &[&str] = &["pr", "tipv61-term", "tipv62-term"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub id: &'static str,
    /// Canonical field name in the catalog.
    pub field: &'static str,
    pub db_field: &'static str,
    pub title: &'static str,
    /// Members of a composite column, used when the catalog has no entry.
    pub children: &'static [&'static str],
}

const fn column(
    id: &'static str,
    field: &'static str,
    db_field: &'static str,
    title: &'static str,
) -> ColumnDef {
    ColumnDef {
        id,
        field,
        db_field,
        title,
        children: &[],
    }
}

pub const BUILTIN_COLUMNS: &[ColumnDef] = &[
    column("fp", "starttime", "fp", "Start Time"),
    column("lp", "stoptime", "lp", "Stop Time"),
    column("src", "ip.src", "a1", "Src IP"),
    column("p1", "port.src", "p1", "Src Port"),
    column("dst", "ip.dst", "a2", "Dst IP"),
    column("p2", "port.dst", "p2", "Dst Port"),
    column("pa", "packets", "pa", "Packets"),
    column("dbby", "bytes", "by", "Bytes"),
    column("no", "no", "no", "Node"),
    ColumnDef {
        id: "info",
        field: "info",
        db_field: "info",
        title: "Info",
        children: &[
            "us", "esrc", "edst", "esub", "efn", "dnsho", "tls.alt", "ircch",
        ],
    },
];

pub fn builtin_column(id: &str) -> Option<&'static ColumnDef> {
    BUILTIN_COLUMNS.iter().find(|col| col.id == id)
}
