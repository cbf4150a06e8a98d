use chrono::Utc;
use serde::Serialize;

use funnel_core::{FunnelError, FunnelResult};

use crate::types::{FunnelStage, StageChange};

/// Describes a single valid stage transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageTransition {
    pub from: FunnelStage,
    pub to: FunnelStage,
    pub trigger: &'static str,
}

const fn edge(from: FunnelStage, to: FunnelStage, trigger: &'static str) -> StageTransition {
    StageTransition { from, to, trigger }
}

/// Every move the funnel may make. Anything else is rejected.
pub const TRANSITIONS: &[StageTransition] = &[
    // InputPending ->
    edge(FunnelStage::InputPending, FunnelStage::Capture, "postal_code_valid"),
    // Capture ->
    edge(FunnelStage::Capture, FunnelStage::Scanning, "contact_captured"),
    edge(FunnelStage::Capture, FunnelStage::InputPending, "postal_code_changed"),
    // Scanning ->
    edge(FunnelStage::Scanning, FunnelStage::Results, "scan_complete"),
    edge(FunnelStage::Scanning, FunnelStage::Scanning, "item_reselected"),
    edge(FunnelStage::Scanning, FunnelStage::InputPending, "postal_code_changed"),
    // Results ->
    edge(FunnelStage::Results, FunnelStage::Scanning, "item_selected"),
    edge(FunnelStage::Results, FunnelStage::Converting, "offer_unlocked"),
    edge(FunnelStage::Results, FunnelStage::InputPending, "postal_code_changed"),
    // Converting ->
    edge(FunnelStage::Converting, FunnelStage::InputPending, "postal_code_changed"),
];

/// Guards funnel progression by enforcing [`TRANSITIONS`] and keeping a
/// history of accepted moves.
#[derive(Debug, Clone, Serialize)]
pub struct FunnelStateMachine {
    stage: FunnelStage,
    history: Vec<StageChange>,
}

impl FunnelStateMachine {
    /// Starts in `InputPending` with an empty history.
    pub fn new() -> Self {
        Self {
            stage: FunnelStage::InputPending,
            history: Vec::new(),
        }
    }

    pub fn stage(&self) -> FunnelStage {
        self.stage
    }

    pub fn history(&self) -> &[StageChange] {
        &self.history
    }

    /// Returns `true` if the given transition is declared.
    pub fn can_transition(&self, from: FunnelStage, to: FunnelStage) -> bool {
        TRANSITIONS.iter().any(|t| t.from == from && t.to == to)
    }

    /// Moves to `to`, or fails with `InvalidTransition` and leaves the stage
    /// untouched.
    pub fn transition(&mut self, to: FunnelStage) -> FunnelResult<()> {
        let edge = TRANSITIONS
            .iter()
            .find(|t| t.from == self.stage && t.to == to)
            .ok_or_else(|| FunnelError::InvalidTransition {
                from: self.stage.to_string(),
                to: to.to_string(),
            })?;

        self.history.push(StageChange {
            from: edge.from,
            to: edge.to,
            trigger: edge.trigger.to_string(),
            at: Utc::now(),
        });
        self.stage = to;
        Ok(())
    }
}

impl Default for FunnelStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
