//! Session list core: turns table interactions and page events into session
//! searches, and keeps the persisted table state and on-screen rows in sync.

pub mod columns;
pub mod controller;
pub mod display;
pub mod events;
pub mod query;
pub mod store;

pub use controller::{ControllerOptions, SessionListController, SortModifier, DEFAULT_VIEW_ID};
pub use events::EventBus;
pub use store::{
    FieldCatalogSource, SessionDataStore, SettingsSource, StoreError, TableStateStore,
    ViewerBackend,
};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
