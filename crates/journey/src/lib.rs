//! Funnel orchestration: moves a visitor from postal-code entry through
//! contact capture and a simulated inventory scan to the checkout hand-off.

pub mod controller;
pub mod scheduler;
pub mod session;
pub mod social_proof;
pub mod state_machine;
pub mod transitions;
pub mod types;

pub use controller::FunnelController;
pub use scheduler::ScanScheduler;
pub use session::{FunnelSession, ScanRunOutcome};
pub use social_proof::SocialProofBadge;
pub use state_machine::FunnelStateMachine;
