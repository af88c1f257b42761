// Signal Dashboard (Layer 3)
// Headless presentation: polls the REST API, merges push deltas and renders text

pub mod api;
pub mod cache;
pub mod poller;
pub mod push;
pub mod render;
pub mod retry;

pub use api::ApiClient;
pub use cache::{FetchTicket, QueryCache, QueryKey, QueryState, QueryStatus, QueryValue};
pub use poller::{Poller, QuerySource, MIN_POLL_INTERVAL};
pub use retry::RetryPolicy;
