//! The session list controller.
//!
//! Owns the search query, the persisted table state, the pagination window
//! and the row bookkeeping. Every mutation is applied synchronously and then
//! issues at most one session fetch. Fetches run as spawned tasks and report
//! back through a channel; the controller applies an outcome only if nothing
//! newer has been applied already.

use std::collections::BTreeSet;
use std::sync::Arc;

use packetview_api::{
    FieldCatalog, InboundEvent, OutboundEvent, PaginationChange, SearchChange,
    SessionListResponse, SessionQuery, SessionRecord, Settings, SortDirection, SortSpec,
    TableState, DEFAULT_PAGE_LENGTH,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::events::EventBus;
use crate::query;
use crate::store::{self, ViewerBackend};

/// View id the table state is persisted under when none is configured.
pub const DEFAULT_VIEW_ID: &str = "sessionsNew";

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub view_id: String,
    pub page_length: u32,
    /// Open every row of the first result page.
    pub open_all: bool,
    /// Merged into the query before the first search.
    pub search: SearchChange,
    /// Window for the first search; `None` starts at page 1.
    pub pagination: Option<PaginationChange>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            view_id: DEFAULT_VIEW_ID.to_string(),
            page_length: DEFAULT_PAGE_LENGTH,
            open_all: false,
            search: SearchChange::default(),
            pagination: None,
        }
    }
}

/// How a column header was clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortModifier {
    /// Plain click: sort by this column only.
    #[default]
    Plain,
    /// Shift-click: add this column as a secondary key.
    Shift,
}

struct FetchOutcome {
    generation: u64,
    result: store::Result<SessionListResponse>,
}

pub struct SessionListController<B> {
    backend: Arc<B>,
    bus: EventBus,
    events: Option<mpsc::UnboundedReceiver<InboundEvent>>,
    view_id: String,

    table_state: TableState,
    settings: Settings,
    catalog: FieldCatalog,
    query: SessionQuery,
    current_page: u32,

    sessions: SessionListResponse,
    sticky: BTreeSet<String>,
    open_all_pending: bool,
    last_error: Option<String>,

    next_generation: u64,
    applied_generation: u64,
    in_flight: usize,
    pending_writes: JoinSet<()>,
    outcomes_tx: mpsc::UnboundedSender<FetchOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<FetchOutcome>,
}

impl<B: ViewerBackend> SessionListController<B> {
    /// Load table state, settings and fields, then issue the first search.
    ///
    /// Startup lookups never fail the controller: each one that errors is
    /// logged and replaced by its default.
    pub async fn init(backend: Arc<B>, bus: &EventBus, options: ControllerOptions) -> Self {
        let events = bus.take_inbound();
        if events.is_none() {
            warn!(view = %options.view_id, "inbound events already claimed; listening to none");
        }

        let table_state = match backend.load_table_state(&options.view_id).await {
            Ok(mut state) => {
                if state.fill_defaults() {
                    debug!(view = %options.view_id, "table state defaulted");
                }
                state
            }
            Err(e) => {
                warn!(view = %options.view_id, "failed to load table state: {e}");
                TableState::default_for_view()
            }
        };

        let settings = backend.fetch_settings().await.unwrap_or_else(|e| {
            warn!("failed to load user settings: {e}");
            Settings::default()
        });

        let catalog = backend.fetch_fields().await.unwrap_or_else(|e| {
            warn!("failed to load field catalog: {e}");
            FieldCatalog::new()
        });

        let mut query = query::initial_query(&table_state, &catalog, options.page_length);
        merge_search(&mut query, options.search);
        let mut current_page = 1;
        if let Some(window) = options.pagination {
            query.length = window.length;
            query.start = window.start;
            current_page = window.current_page;
        }
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();

        let mut controller = Self {
            backend,
            bus: bus.clone(),
            events,
            view_id: options.view_id,
            table_state,
            settings,
            catalog,
            query,
            current_page,
            sessions: SessionListResponse::default(),
            sticky: BTreeSet::new(),
            open_all_pending: options.open_all,
            last_error: None,
            next_generation: 0,
            applied_generation: 0,
            in_flight: 0,
            pending_writes: JoinSet::new(),
            outcomes_tx,
            outcomes_rx,
        };
        info!(
            view = %controller.view_id,
            fields = controller.query.fields.len(),
            "session list initialized"
        );
        controller.request_data();
        controller
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn view_id(&self) -> &str {
        &self.view_id
    }

    pub fn query(&self) -> &SessionQuery {
        &self.query
    }

    pub fn table_state(&self) -> &TableState {
        &self.table_state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn sessions(&self) -> &SessionListResponse {
        &self.sessions
    }

    pub fn rows(&self) -> &[SessionRecord] {
        &self.sessions.data
    }

    pub fn sticky_sessions(&self) -> impl Iterator<Item = &str> {
        self.sticky.iter().map(String::as_str)
    }

    pub fn is_sticky(&self, id: &str) -> bool {
        self.sticky.contains(id)
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    /// Error of the most recent failed search, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    // ── Sorting ──────────────────────────────────────────────────────────

    pub fn sort_by(&mut self, field: &str, modifier: SortModifier) {
        let order = &mut self.table_state.order;
        match modifier {
            SortModifier::Shift => match order.iter_mut().find(|s| s.field == field) {
                Some(spec) => spec.direction = spec.direction.toggled(),
                None => order.push(SortSpec::asc(field)),
            },
            SortModifier::Plain => {
                if order.len() == 1 && order[0].field == field {
                    order[0].direction = order[0].direction.toggled();
                } else {
                    *order = vec![SortSpec::asc(field)];
                }
            }
        }
        self.table_state_changed();
    }

    /// Position of `field` among the sort keys.
    pub fn is_sorted(&self, field: &str) -> Option<usize> {
        self.query.sorts.iter().position(|s| s.field == field)
    }

    pub fn sort_order(&self, field: &str) -> Option<SortDirection> {
        self.query
            .sorts
            .iter()
            .find(|s| s.field == field)
            .map(|s| s.direction)
    }

    // ── Columns ──────────────────────────────────────────────────────────

    pub fn toggle_visibility(&mut self, field: &str) {
        let headers = &mut self.table_state.visible_headers;
        match headers.iter().position(|h| h == field) {
            Some(index) => {
                headers.remove(index);
            }
            None => headers.push(field.to_string()),
        }
        debug!(field, visible = self.is_visible(field).is_some(), "column toggled");
        self.table_state_changed();
    }

    /// Display position of `field` among the visible columns.
    pub fn is_visible(&self, field: &str) -> Option<usize> {
        self.table_state
            .visible_headers
            .iter()
            .position(|h| h == field)
    }

    fn table_state_changed(&mut self) {
        self.persist_table_state();
        query::sync_query(&mut self.query, &self.table_state, &self.catalog);
        debug!(
            order = %self.query.order_param(),
            fields = self.query.fields.len(),
            "table state changed"
        );
        self.request_data();
    }

    /// Write the table state back without waiting for the result.
    fn persist_table_state(&mut self) {
        let backend = Arc::clone(&self.backend);
        let view_id = self.view_id.clone();
        let state = self.table_state.clone();
        self.pending_writes.spawn(async move {
            if let Err(e) = backend.save_table_state(&view_id, &state).await {
                warn!(view = %view_id, "failed to persist table state: {e}");
            }
        });
    }

    // ── Events ───────────────────────────────────────────────────────────

    pub fn handle_event(&mut self, event: InboundEvent) {
        debug!(event = event.name(), "inbound event");
        match event {
            InboundEvent::ChangeSearch(change) => self.apply_search(change),
            InboundEvent::ChangePagination(window) => self.apply_pagination(window),
            InboundEvent::AddToSearch(expr) => self.rebroadcast(OutboundEvent::AddToTypeahead(expr)),
            InboundEvent::ChangeTime(window) => self.rebroadcast(OutboundEvent::UpdateTime(window)),
        }
    }

    fn rebroadcast(&self, event: OutboundEvent) {
        debug!(event = event.name(), "outbound event");
        self.bus.broadcast(event);
    }

    /// Adopt the paginator's window as-is.
    pub fn apply_pagination(&mut self, window: PaginationChange) {
        self.query.length = window.length;
        self.query.start = window.start;
        self.current_page = window.current_page;
        self.request_data();
    }

    /// Merge the keys present in `change` into the query.
    pub fn apply_search(&mut self, change: SearchChange) {
        merge_search(&mut self.query, change);
        self.request_data();
    }

    /// Forwarded untouched to the session data store.
    pub async fn export_unique(&self, field: &str, facet_index: u32) -> store::Result<String> {
        self.backend.export_unique_values(field, facet_index).await
    }

    // ── Rows ─────────────────────────────────────────────────────────────

    /// Flip a row open or closed. Open rows stay open across refreshes.
    /// Returns the new state, or `None` if no row has this id.
    pub fn toggle_session_detail(&mut self, id: &str) -> Option<bool> {
        let row = self.sessions.data.iter_mut().find(|r| r.id == id)?;
        row.expanded = !row.expanded;
        if row.expanded {
            self.sticky.insert(row.id.clone());
        } else {
            self.sticky.remove(&row.id);
        }
        Some(row.expanded)
    }

    pub fn open_all(&mut self) {
        let closed: Vec<String> = self
            .sessions
            .data
            .iter()
            .filter(|r| !r.expanded)
            .map(|r| r.id.clone())
            .collect();
        for id in closed {
            self.toggle_session_detail(&id);
        }
    }

    // ── Fetching ─────────────────────────────────────────────────────────

    /// Spawn a search for the current query.
    fn request_data(&mut self) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let query = self.query.clone();
        let backend = Arc::clone(&self.backend);
        let tx = self.outcomes_tx.clone();
        self.in_flight += 1;

        debug!(generation, query = %query.to_query_string(), "fetching sessions");
        tokio::spawn(async move {
            let result = backend.fetch_sessions(&query).await;
            let _ = tx.send(FetchOutcome { generation, result });
        });
    }

    fn apply_outcome(&mut self, outcome: FetchOutcome) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if outcome.generation <= self.applied_generation {
            debug!(
                generation = outcome.generation,
                applied = self.applied_generation,
                "discarding stale session result"
            );
            return;
        }
        self.applied_generation = outcome.generation;

        match outcome.result {
            Ok(SessionListResponse {
                error: Some(error), ..
            }) => {
                warn!("session search failed: {error}");
                self.last_error = Some(error);
            }
            Ok(resp) => self.replace_rows(resp),
            Err(e) => {
                warn!("session fetch failed: {e}");
                self.last_error = Some(e.to_string());
            }
        }
    }

    fn replace_rows(&mut self, mut resp: SessionListResponse) {
        for row in &mut resp.data {
            if self.sticky.contains(&row.id) {
                row.expanded = true;
            }
        }
        debug!(
            rows = resp.data.len(),
            total = resp.records_total,
            filtered = resp.records_filtered,
            "sessions loaded"
        );
        self.sessions = resp;
        self.last_error = None;

        // Only the newest search answers the open-all request.
        if self.open_all_pending && self.applied_generation == self.next_generation {
            self.open_all_pending = false;
            self.open_all();
        }
    }

    /// Wait until every issued search has reported back and every table
    /// state write has finished.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.outcomes_rx.recv().await {
                Some(outcome) => self.apply_outcome(outcome),
                None => break,
            }
        }
        while self.pending_writes.join_next().await.is_some() {}
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Process inbound events and search results until `shutdown` flips,
    /// the bus goes away, or the controller is torn down.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                event = next_inbound(&mut self.events) => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                Some(outcome) = self.outcomes_rx.recv() => self.apply_outcome(outcome),
                Some(_) = self.pending_writes.join_next(), if !self.pending_writes.is_empty() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(view = %self.view_id, "session list loop stopped");
    }

    /// Stop listening for inbound events.
    pub fn teardown(&mut self) {
        if self.events.take().is_some() {
            info!(view = %self.view_id, "session list unsubscribed");
        }
    }
}

async fn next_inbound(
    events: &mut Option<mpsc::UnboundedReceiver<InboundEvent>>,
) -> Option<InboundEvent> {
    events.as_mut()?.recv().await
}

fn merge_search(query: &mut SessionQuery, change: SearchChange) {
    if let Some(start) = change.start {
        query.start_time = Some(start);
    }
    if let Some(stop) = change.stop {
        query.stop_time = Some(stop);
    }
    if let Some(expression) = change.expression {
        query.expression = Some(expression);
    }
    if let Some(date) = change.date {
        query.date = Some(date);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_catalog, sample_sessions, BackendCall, MemoryBackend};
    use packetview_api::{SearchExpression, TimeWindow};
    use std::time::Duration;

    const DEFAULT_FIELDS: &str = "pr,tipv61-term,tipv62-term,fp,lp,a1,p1,a2,p2,pa,by,no,us,esrc,edst,esub,efn,dnsho,tls.alt,ircch";

    fn default_path(order: &str) -> String {
        format!("sessions.json?facets=1&flatten=1&fields={DEFAULT_FIELDS}&length=50&order={order}")
    }

    fn backend() -> Arc<MemoryBackend> {
        Arc::new(
            MemoryBackend::new()
                .with_fields(sample_catalog())
                .with_sessions(sample_sessions()),
        )
    }

    async fn init_with(
        backend: &Arc<MemoryBackend>,
        options: ControllerOptions,
    ) -> (SessionListController<MemoryBackend>, EventBus) {
        let bus = EventBus::default();
        let mut controller = SessionListController::init(Arc::clone(backend), &bus, options).await;
        controller.settle().await;
        (controller, bus)
    }

    async fn init(backend: &Arc<MemoryBackend>) -> (SessionListController<MemoryBackend>, EventBus) {
        init_with(backend, ControllerOptions::default()).await
    }

    #[tokio::test]
    async fn init_fetches_in_order_with_defaults() {
        let backend = backend();
        let (controller, _bus) = init(&backend).await;

        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::LoadTableState("sessionsNew".into()),
                BackendCall::FetchSettings,
                BackendCall::FetchFields,
                BackendCall::FetchSessions(default_path("fp:asc")),
            ]
        );
        assert_eq!(controller.query().length, 50);
        assert_eq!(controller.query().start, 0);
        assert!(controller.query().facets);
        assert_eq!(controller.query().sorts, vec![SortSpec::asc("fp")]);
        assert_eq!(controller.query().fields.join(","), DEFAULT_FIELDS);
        assert_eq!(controller.current_page(), 1);
        assert_eq!(controller.settings(), &Settings::default());
        assert_eq!(controller.table_state(), &TableState::default_for_view());
        assert_eq!(controller.rows().len(), 1);
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn startup_failures_degrade_to_defaults() {
        let backend = Arc::new(MemoryBackend::new().failing_startup());
        let (controller, _bus) = init(&backend).await;

        assert_eq!(controller.table_state(), &TableState::default_for_view());
        assert!(controller.catalog().is_empty());
        assert_eq!(controller.settings(), &Settings::default());
        assert_eq!(controller.query().fields.join(","), DEFAULT_FIELDS);
        assert_eq!(backend.session_fetches(), vec![default_path("fp:asc")]);
    }

    #[tokio::test]
    async fn persisted_table_state_drives_the_first_query() {
        let backend = Arc::new(
            MemoryBackend::new()
                .with_fields(sample_catalog())
                .with_table_state(
                    "sessionsNew",
                    TableState {
                        order: vec![SortSpec::new("lp", SortDirection::Desc)],
                        visible_headers: vec!["src".into(), "dst".into()],
                    },
                ),
        );
        let (controller, _bus) = init(&backend).await;
        assert_eq!(
            backend.session_fetches(),
            vec!["sessions.json?facets=1&flatten=1&fields=pr,tipv61-term,tipv62-term,a1,a2,lp&length=50&order=lp:desc".to_string()]
        );
        assert_eq!(controller.is_sorted("lp"), Some(0));
    }

    #[tokio::test]
    async fn open_all_expands_first_page() {
        let backend = backend();
        let (controller, _bus) = init_with(
            &backend,
            ControllerOptions {
                open_all: true,
                ..ControllerOptions::default()
            },
        )
        .await;
        assert!(controller.rows().iter().all(|r| r.expanded));
        assert_eq!(controller.sticky_sessions().collect::<Vec<_>>(), vec!["sessionid"]);
    }

    #[tokio::test]
    async fn toggle_session_detail_tracks_sticky_rows() {
        let backend = backend();
        let (mut controller, _bus) = init(&backend).await;

        assert_eq!(controller.toggle_session_detail("sessionid"), Some(true));
        assert!(controller.is_sticky("sessionid"));
        assert_eq!(controller.toggle_session_detail("sessionid"), Some(false));
        assert_eq!(controller.sticky_sessions().count(), 0);
        assert_eq!(controller.toggle_session_detail("nope"), None);
    }

    #[tokio::test]
    async fn sticky_rows_stay_open_across_refresh() {
        let backend = backend();
        let (mut controller, _bus) = init(&backend).await;
        controller.toggle_session_detail("sessionid");

        controller.apply_search(SearchChange {
            expression: Some("port.src == 10000".into()),
            ..SearchChange::default()
        });
        controller.settle().await;

        let row = &controller.rows()[0];
        assert!(row.expanded);
        assert_eq!(backend.session_fetches().len(), 2);
    }

    #[tokio::test]
    async fn default_sorts_and_lookups() {
        let backend = backend();
        let (controller, _bus) = init(&backend).await;
        assert_eq!(controller.is_sorted("fp"), Some(0));
        assert_eq!(controller.sort_order("fp"), Some(SortDirection::Asc));
        assert_eq!(controller.is_sorted("lp"), None);
        assert_eq!(controller.sort_order("lp"), None);
    }

    #[tokio::test]
    async fn plain_click_on_sole_sort_toggles_and_persists() {
        let backend = backend();
        let (mut controller, _bus) = init(&backend).await;

        controller.sort_by("fp", SortModifier::Plain);
        controller.settle().await;

        assert_eq!(controller.sort_order("fp"), Some(SortDirection::Desc));
        assert_eq!(
            backend.session_fetches().last(),
            Some(&default_path("fp:desc"))
        );
        let saved = backend.saved_states();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].order, vec![SortSpec::new("fp", SortDirection::Desc)]);

        controller.sort_by("fp", SortModifier::Plain);
        controller.settle().await;
        assert_eq!(controller.sort_order("fp"), Some(SortDirection::Asc));
    }

    #[tokio::test]
    async fn plain_click_on_other_field_replaces_sorts() {
        let backend = backend();
        let (mut controller, _bus) = init(&backend).await;

        controller.sort_by("lp", SortModifier::Plain);
        controller.settle().await;

        assert_eq!(controller.is_sorted("lp"), Some(0));
        assert_eq!(controller.is_sorted("fp"), None);
        assert_eq!(controller.table_state().order, controller.query().sorts);
        assert_eq!(
            backend.session_fetches().last(),
            Some(&default_path("lp:asc"))
        );
    }

    #[tokio::test]
    async fn shift_click_appends_then_toggles_in_place() {
        let backend = backend();
        let (mut controller, _bus) = init(&backend).await;

        controller.sort_by("lp", SortModifier::Shift);
        controller.settle().await;
        assert_eq!(
            controller.query().sorts,
            vec![SortSpec::asc("fp"), SortSpec::asc("lp")]
        );
        assert_eq!(
            backend.session_fetches().last(),
            Some(&default_path("fp:asc,lp:asc"))
        );

        controller.sort_by("fp", SortModifier::Shift);
        controller.settle().await;
        assert_eq!(
            controller.query().sorts,
            vec![SortSpec::new("fp", SortDirection::Desc), SortSpec::asc("lp")]
        );

        controller.sort_by("pa", SortModifier::Plain);
        assert_eq!(controller.query().sorts, vec![SortSpec::asc("pa")]);
        controller.settle().await;
    }

    #[tokio::test]
    async fn sorting_on_hidden_column_fetches_its_key() {
        let backend = backend();
        let (mut controller, _bus) = init(&backend).await;

        controller.toggle_visibility("lp");
        controller.sort_by("lp", SortModifier::Plain);
        controller.settle().await;

        assert_eq!(controller.is_visible("lp"), None);
        assert_eq!(controller.query().fields.last().map(String::as_str), Some("lp"));
    }

    #[tokio::test]
    async fn toggle_visibility_twice_restores_headers() {
        let backend = backend();
        let (mut controller, _bus) = init(&backend).await;
        let before = controller.table_state().visible_headers.clone();

        controller.toggle_visibility("lp");
        assert_eq!(controller.is_visible("lp"), None);
        controller.toggle_visibility("lp");
        controller.settle().await;

        assert_eq!(controller.is_visible("lp"), Some(before.len() - 1));
        let fetches = backend.session_fetches();
        assert_eq!(fetches.len(), 3);
        assert_eq!(
            fetches[2],
            "sessions.json?facets=1&flatten=1&fields=pr,tipv61-term,tipv62-term,fp,a1,p1,a2,p2,pa,by,no,us,esrc,edst,esub,efn,dnsho,tls.alt,ircch,lp&length=50&order=fp:asc"
        );
        assert_eq!(backend.saved_states().len(), 2);

        let mut sorted_before = before.clone();
        sorted_before.sort();
        let mut sorted_after = controller.table_state().visible_headers.clone();
        sorted_after.sort();
        assert_eq!(sorted_before, sorted_after);
    }

    #[tokio::test]
    async fn pagination_is_adopted_verbatim() {
        let backend = backend();
        let (mut controller, _bus) = init(&backend).await;

        controller.handle_event(InboundEvent::ChangePagination(PaginationChange {
            length: 200,
            current_page: 2,
            start: 200,
        }));
        controller.settle().await;

        assert_eq!(controller.query().length, 200);
        assert_eq!(controller.query().start, 200);
        assert_eq!(controller.current_page(), 2);
        assert_eq!(
            backend.session_fetches().last().map(String::as_str),
            Some(format!("sessions.json?facets=1&flatten=1&fields={DEFAULT_FIELDS}&length=200&order=fp:asc&start=200").as_str())
        );
    }

    #[tokio::test]
    async fn every_search_change_fetches() {
        let backend = backend();
        let (mut controller, _bus) = init(&backend).await;

        controller.handle_event(InboundEvent::ChangeSearch(SearchChange {
            start: Some(0),
            stop: Some(0),
            expression: Some(String::new()),
            date: None,
        }));
        controller.handle_event(InboundEvent::ChangeSearch(SearchChange {
            date: Some(-1),
            expression: Some(String::new()),
            ..SearchChange::default()
        }));
        controller.settle().await;

        let fetches = backend.session_fetches();
        assert_eq!(fetches.len(), 3);
        assert_eq!(
            fetches[2],
            format!("sessions.json?date=-1&facets=1&flatten=1&fields={DEFAULT_FIELDS}&length=50&order=fp:asc")
        );
        assert_eq!(controller.query().start_time, Some(0));
        assert_eq!(controller.query().date, Some(-1));
    }

    #[tokio::test]
    async fn rebroadcasts_are_one_to_one() {
        let backend = backend();
        let (mut controller, bus) = init(&backend).await;
        let mut outbound = bus.subscribe_outbound();

        let expr = SearchExpression {
            expression: "full == expression".into(),
        };
        controller.handle_event(InboundEvent::AddToSearch(expr.clone()));
        controller.handle_event(InboundEvent::ChangeTime(TimeWindow { start: 0, stop: 0 }));

        assert_eq!(
            outbound.try_recv().unwrap(),
            OutboundEvent::AddToTypeahead(expr)
        );
        assert_eq!(
            outbound.try_recv().unwrap(),
            OutboundEvent::UpdateTime(TimeWindow { start: 0, stop: 0 })
        );
        assert!(outbound.try_recv().is_err());
        assert_eq!(backend.session_fetches().len(), 1);
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn export_unique_forwards_verbatim() {
        let backend = backend();
        let (controller, _bus) = init(&backend).await;

        controller.export_unique("a1", 0).await.unwrap();
        controller.export_unique("a1:p1", 0).await.unwrap();
        controller.export_unique("g2", 1).await.unwrap();

        let exports: Vec<BackendCall> = backend
            .calls()
            .into_iter()
            .filter(|c| matches!(c, BackendCall::ExportUnique(..)))
            .collect();
        assert_eq!(
            exports,
            vec![
                BackendCall::ExportUnique("a1".into(), 0),
                BackendCall::ExportUnique("a1:p1".into(), 0),
                BackendCall::ExportUnique("g2".into(), 1),
            ]
        );
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_rows() {
        let backend = backend();
        let (mut controller, _bus) = init(&backend).await;
        assert_eq!(controller.rows().len(), 1);

        backend.set_fail_sessions(true);
        controller.apply_search(SearchChange {
            date: Some(24),
            ..SearchChange::default()
        });
        controller.settle().await;

        assert_eq!(controller.rows().len(), 1);
        assert!(controller.last_error().is_some());

        backend.set_fail_sessions(false);
        controller.apply_search(SearchChange::default());
        controller.settle().await;
        assert!(controller.last_error().is_none());
    }

    #[tokio::test]
    async fn failed_persist_does_not_block_fetch() {
        let backend = Arc::new(
            MemoryBackend::new()
                .with_fields(sample_catalog())
                .with_sessions(sample_sessions())
                .failing_persist(),
        );
        let (mut controller, _bus) = init(&backend).await;

        controller.sort_by("lp", SortModifier::Plain);
        controller.settle().await;

        assert_eq!(controller.is_sorted("lp"), Some(0));
        assert_eq!(backend.session_fetches().len(), 2);
        assert!(backend.saved_states().is_empty());
    }

    #[tokio::test]
    async fn stale_result_is_discarded() {
        let backend = backend();
        let (mut controller, _bus) = init(&backend).await;

        let mut slow = sample_sessions();
        slow.data[0].id = "slow".into();
        backend.push_response(slow, Duration::from_millis(100));
        let mut fast = sample_sessions();
        fast.data[0].id = "fast".into();
        backend.push_response(fast, Duration::ZERO);

        controller.apply_search(SearchChange {
            expression: Some("first".into()),
            ..SearchChange::default()
        });
        controller.apply_search(SearchChange {
            expression: Some("second".into()),
            ..SearchChange::default()
        });
        controller.settle().await;

        assert_eq!(controller.rows()[0].id, "fast");
    }

    #[tokio::test]
    async fn run_loop_handles_bus_events_until_shutdown() {
        let backend = backend();
        let (mut controller, bus) = init(&backend).await;
        let mut outbound = bus.subscribe_outbound();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        bus.emit(InboundEvent::ChangeTime(TimeWindow { start: 1, stop: 2 }));
        bus.emit(InboundEvent::ChangePagination(PaginationChange {
            length: 100,
            current_page: 3,
            start: 200,
        }));

        let handle = tokio::spawn(async move {
            controller.run(shutdown_rx).await;
            controller
        });

        let event = tokio::time::timeout(Duration::from_secs(1), outbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, OutboundEvent::UpdateTime(TimeWindow { start: 1, stop: 2 }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();
        let mut controller = handle.await.unwrap();
        controller.settle().await;

        assert_eq!(controller.current_page(), 3);
        assert_eq!(controller.query().length, 100);
    }

    #[tokio::test]
    async fn run_loop_handles_every_queued_event() {
        let backend = backend();
        let (mut controller, bus) = init(&backend).await;
        for date in 0..100 {
            bus.emit(InboundEvent::ChangeSearch(SearchChange {
                date: Some(date),
                ..SearchChange::default()
            }));
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        controller.run(shutdown_rx).await;
        controller.settle().await;

        assert_eq!(backend.session_fetches().len(), 101);
        assert_eq!(controller.query().date, Some(99));
    }

    #[tokio::test]
    async fn initial_search_and_page_shape_the_first_fetch() {
        let backend = backend();
        let (controller, _bus) = init_with(
            &backend,
            ControllerOptions {
                search: SearchChange {
                    start: Some(100),
                    stop: None,
                    expression: Some("tls".into()),
                    date: Some(24),
                },
                pagination: Some(PaginationChange {
                    length: 100,
                    current_page: 3,
                    start: 200,
                }),
                ..ControllerOptions::default()
            },
        )
        .await;

        assert_eq!(
            backend.session_fetches(),
            vec![format!(
                "sessions.json?date=24&expression=tls&facets=1&flatten=1&fields={DEFAULT_FIELDS}&length=100&order=fp:asc&start=200&startTime=100"
            )]
        );
        assert_eq!(controller.current_page(), 3);
    }

    #[tokio::test]
    async fn open_all_waits_for_newest_search() {
        let backend = backend();
        let mut unfiltered = sample_sessions();
        unfiltered.data[0].id = "init-row".into();
        backend.push_response(unfiltered, Duration::ZERO);
        let mut filtered = sample_sessions();
        filtered.data[0].id = "filtered-row".into();
        backend.push_response(filtered, Duration::from_millis(30));

        let bus = EventBus::default();
        let mut controller = SessionListController::init(
            Arc::clone(&backend),
            &bus,
            ControllerOptions {
                open_all: true,
                ..ControllerOptions::default()
            },
        )
        .await;
        controller.apply_search(SearchChange {
            expression: Some("tls".into()),
            ..SearchChange::default()
        });
        controller.settle().await;

        assert_eq!(controller.rows()[0].id, "filtered-row");
        assert!(controller.rows()[0].expanded);
        assert!(!controller.is_sticky("init-row"));
    }

    #[tokio::test]
    async fn teardown_unsubscribes() {
        let backend = backend();
        let (mut controller, bus) = init(&backend).await;
        assert!(bus.has_listener());
        controller.teardown();
        assert!(!bus.has_listener());
    }
}
