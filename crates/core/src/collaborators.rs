//! Seams to the systems the funnel talks to but does not own: the items
//! endpoint, the zip-metadata endpoint and the lead relay.

use async_trait::async_trait;

use crate::error::DataFetchError;
use crate::types::{ContactLead, ItemsResponse, PostalCode, ZipMetadata};

/// Source of deal items for a postal code.
#[async_trait]
pub trait ItemsSource: Send + Sync {
    async fn fetch_items(&self, zip: &PostalCode) -> Result<ItemsResponse, DataFetchError>;
}

/// Source of locality labels for a postal code.
#[async_trait]
pub trait ZipMetadataSource: Send + Sync {
    async fn fetch_metadata(&self, zip: &PostalCode) -> Result<ZipMetadata, DataFetchError>;
}

/// Receives captured leads. Implementations must return immediately; the
/// outcome of the delivery is never reported back to the caller.
pub trait LeadDispatcher: Send + Sync {
    fn dispatch(&self, lead: ContactLead);
}

/// Drops every lead. Used when no relay is wired in.
pub struct NoOpDispatcher;

impl LeadDispatcher for NoOpDispatcher {
    fn dispatch(&self, lead: ContactLead) {
        tracing::debug!(zip = %lead.postal_code, "No lead relay configured, dropping lead");
    }
}
