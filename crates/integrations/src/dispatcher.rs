use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{info, warn};

use funnel_core::collaborators::LeadDispatcher;
use funnel_core::types::ContactLead;
use funnel_core::{FunnelError, FunnelResult};

use crate::lead_relay::{LeadRelayEndpoint, LeadRequest, LeadResponse};

/// Relays each lead on its own tokio task. `dispatch` returns at once; the
/// task logs the endpoint's answer and then drops it.
pub struct SpawnedLeadDispatcher {
    endpoint: Arc<LeadRelayEndpoint>,
    runtime: Handle,
    observer: Option<mpsc::UnboundedSender<LeadResponse>>,
}

impl SpawnedLeadDispatcher {
    pub fn new(endpoint: Arc<LeadRelayEndpoint>, runtime: Handle) -> Self {
        Self {
            endpoint,
            runtime,
            observer: None,
        }
    }

    /// Uses the runtime of the calling context.
    pub fn from_current(endpoint: Arc<LeadRelayEndpoint>) -> FunnelResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| FunnelError::Config(format!("lead dispatcher needs a tokio runtime: {e}")))?;
        Ok(Self::new(endpoint, runtime))
    }

    /// Copies every relay response to `observer` after it has been logged.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<LeadResponse>) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl LeadDispatcher for SpawnedLeadDispatcher {
    fn dispatch(&self, lead: ContactLead) {
        let request = LeadRequest::from(&lead);
        let endpoint = self.endpoint.clone();
        let observer = self.observer.clone();

        self.runtime.spawn(async move {
            let response = endpoint.handle(request).await;
            if response.is_success() {
                info!(zip = %lead.postal_code, status = response.status, "Lead relayed");
            } else {
                warn!(
                    zip = %lead.postal_code,
                    status = response.status,
                    body = %response.body,
                    "Lead relay rejected the lead"
                );
            }
            if let Some(tx) = observer {
                let _ = tx.send(response);
            }
        });
    }
}
