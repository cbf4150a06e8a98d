use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use funnel_core::types::{ContactLead, DealItem, ItemsResponse, PostalCode};

use crate::state_machine::FunnelStateMachine;

/// Stage of a visitor's progression through the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FunnelStage {
    InputPending,
    Capture,
    Scanning,
    Results,
    Converting,
}

impl fmt::Display for FunnelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FunnelStage::InputPending => "input-pending",
            FunnelStage::Capture => "capture",
            FunnelStage::Scanning => "scanning",
            FunnelStage::Results => "results",
            FunnelStage::Converting => "converting",
        };
        f.write_str(name)
    }
}

/// What a scan run is "looking for".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ScanTarget {
    /// Area-wide scan shown right after capture.
    Inventory,
    /// Scan scoped to a deal the visitor clicked.
    Item { item: DealItem },
}

/// One rotating status phrase and the slice of the scan it occupies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStep {
    pub label: String,
    pub duration_ms: u64,
    pub cumulative_end_ms: u64,
}

/// Snapshot of a running scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanState {
    pub progress: f64,
    pub active_step_index: usize,
    pub elapsed_ms: u64,
}

impl ScanState {
    pub fn percent(&self) -> u8 {
        (self.progress * 100.0).round() as u8
    }
}

impl Default for ScanState {
    fn default() -> Self {
        Self {
            progress: 0.0,
            active_step_index: 0,
            elapsed_ms: 0,
        }
    }
}

/// Result of feeding a raw postal code into the funnel. `NotReady` is the
/// caller's cue to send the visitor back to the zip entry page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZipReadiness {
    Ready(PostalCode),
    NotReady { normalized: String },
}

impl ZipReadiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, ZipReadiness::Ready(_))
    }
}

/// Outbound navigation that ends a funnel run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionHandoff {
    pub url: String,
    pub postal_code: PostalCode,
    pub source: String,
}

/// Record of a stage change, kept on the state for inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageChange {
    pub from: FunnelStage,
    pub to: FunnelStage,
    pub trigger: String,
    pub at: DateTime<Utc>,
}

/// Everything the funnel knows about one visitor. Owned by the caller and
/// threaded through the functions in [`crate::transitions`].
#[derive(Debug, Clone, Serialize)]
pub struct FunnelState {
    pub run_id: Uuid,
    pub machine: FunnelStateMachine,
    /// Digits-only form of the last postal code input.
    pub normalized_postal_code: String,
    pub postal_code: Option<PostalCode>,
    /// Message shown next to the email field after a failed capture.
    pub contact_error: Option<String>,
    pub lead: Option<ContactLead>,
    pub scan_target: Option<ScanTarget>,
    pub selected_item: Option<DealItem>,
    pub results: ItemsResponse,
    pub locality_labels: Vec<String>,
}

impl FunnelState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            machine: FunnelStateMachine::new(),
            normalized_postal_code: String::new(),
            postal_code: None,
            contact_error: None,
            lead: None,
            scan_target: None,
            selected_item: None,
            results: ItemsResponse::empty(),
            locality_labels: Vec::new(),
        }
    }

    pub fn stage(&self) -> FunnelStage {
        self.machine.stage()
    }
}

impl Default for FunnelState {
    fn default() -> Self {
        Self::new()
    }
}

/// A state returned from a pure transition along with what the transition
/// produced.
#[derive(Debug)]
pub struct Transition<T> {
    pub state: FunnelState,
    pub outcome: funnel_core::FunnelResult<T>,
}

impl<T> Transition<T> {
    pub fn ok(state: FunnelState, value: T) -> Self {
        Self {
            state,
            outcome: Ok(value),
        }
    }

    pub fn err(state: FunnelState, error: impl Into<funnel_core::FunnelError>) -> Self {
        Self {
            state,
            outcome: Err(error.into()),
        }
    }
}
