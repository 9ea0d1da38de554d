//! Lead Relay - forwards Facebook lead-generation events to a webhook.
//!
//! The library backs the `lead-relay-web` binary. After a one-time setup
//! (OAuth, page and form selection, webhook subscription) every inbound lead
//! event is verified, filtered against the stored configuration, resolved to
//! a full lead record and POSTed to the configured URL.
//!
//! ## Architecture
//!
//! ```text
//! Provider → /webhooks/lead-events → EventRouter → LeadFetcher → Forwarder → Webhook
//! ```

pub mod config;
pub mod debug_log;
pub mod error;
pub mod forward;
pub mod graph;
pub mod lead;
pub mod router;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::RelayError;
pub use forward::{Forwarder, LeadForwarder, RetryPolicy};
pub use graph::GraphClient;
pub use lead::{LeadFetcher, NormalizedLead};
pub use router::{EventRouter, EventSummary, LeadOutcome};
pub use store::{Configuration, ConfigurationStore, InMemoryConfigurationStore};
pub use web::{build_router, AppState};
