//! Outside-world adapters for the funnel: lead intake and webhook relay,
//! plus the items and zip-metadata data sources.

pub mod dispatcher;
pub mod lead_relay;
pub mod sources;
pub mod webhook;

pub use dispatcher::SpawnedLeadDispatcher;
pub use lead_relay::{LeadRelayEndpoint, LeadRequest, LeadResponse};
pub use sources::{HttpItemsSource, HttpZipSource, StaticItemsSource, StaticZipSource};
pub use webhook::WebhookRelay;
