pub mod client;

pub use client::ApiClient;
pub use packetview_api;
