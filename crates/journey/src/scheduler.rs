//! Simulated inventory scan: a fixed-length progress animation with
//! rotating status phrases, independent of any real backend latency.

use std::collections::HashSet;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;

use funnel_core::config::ScanConfig;
use funnel_core::{FunnelError, FunnelResult};

use crate::types::{ScanState, ScanStep, ScanTarget};

/// Phrases shown after the locality checks, in order.
pub const TAIL_PHRASES: [&str; 2] = ["Items Found Near You!", "Preparing your results…"];

/// Dedupes (first occurrence wins, blanks dropped), shuffles and caps the
/// locality labels, then turns them into "Checking …" phrases.
pub fn locality_phrases<R: Rng + ?Sized>(
    labels: &[String],
    max_localities: usize,
    rng: &mut R,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique: Vec<&str> = labels
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && seen.insert(*l))
        .collect();

    unique.shuffle(rng);
    unique
        .into_iter()
        .take(max_localities)
        .map(|l| format!("Checking {l}…"))
        .collect()
}

/// Splits `total_ms` between `locality_count` locality steps and
/// `tail_count` tail steps. The result always sums to `total_ms`.
pub fn plan_durations(
    locality_count: usize,
    tail_count: usize,
    total_ms: u64,
    locality_share: f64,
    min_step_ms: u64,
) -> Vec<u64> {
    // Widened so floors times counts and the running sum cannot overflow
    // for any u64 total.
    let total = i128::from(total_ms);
    let floor = i128::from(min_step_ms);

    let locality_time =
        (floor * locality_count as i128).max((total_ms as f64 * locality_share).round() as i128);
    let tail_time = (floor * tail_count as i128).max(total - locality_time);

    let locality_step = (locality_time as f64 / locality_count.max(1) as f64).round() as i128;
    let tail_step = (tail_time as f64 / tail_count.max(1) as f64).round() as i128;

    let mut durations: Vec<i128> = std::iter::repeat(locality_step)
        .take(locality_count)
        .chain(std::iter::repeat(tail_step).take(tail_count))
        .collect();

    let diff = total - durations.iter().sum::<i128>();
    if let Some(last) = durations.last_mut() {
        *last += diff;
    }

    // When the per-step floors overshoot a very short total the last step
    // cannot absorb the whole difference; borrow the rest from earlier steps.
    let mut deficit = 0;
    for d in durations.iter_mut().rev() {
        *d -= deficit;
        deficit = 0;
        if *d < 0 {
            deficit = -*d;
            *d = 0;
        }
    }

    // Every step now lies in [0, total_ms].
    durations.into_iter().map(|d| d as u64).collect()
}

/// Builds the ordered step list for one scan run.
pub fn build_steps<R: Rng + ?Sized>(
    labels: &[String],
    config: &ScanConfig,
    rng: &mut R,
) -> Vec<ScanStep> {
    let phrases = locality_phrases(labels, config.max_localities, rng);
    let durations = plan_durations(
        phrases.len(),
        TAIL_PHRASES.len(),
        config.total_ms,
        config.locality_share,
        config.min_step_ms,
    );

    let mut cumulative = 0;
    phrases
        .into_iter()
        .chain(TAIL_PHRASES.iter().map(|p| p.to_string()))
        .zip(durations)
        .map(|(label, duration_ms)| {
            cumulative += duration_ms;
            ScanStep {
                label,
                duration_ms,
                cumulative_end_ms: cumulative,
            }
        })
        .collect()
}

/// Cubic ease-out of elapsed time. 0 at the start, exactly 1 from
/// `total_ms` onward.
pub fn eased_progress(elapsed_ms: u64, total_ms: u64) -> f64 {
    if elapsed_ms >= total_ms {
        return 1.0;
    }
    let t = elapsed_ms as f64 / total_ms as f64;
    1.0 - (1.0 - t).powi(3)
}

/// Index of the step active at `elapsed_ms`: the number of boundaries at or
/// before it, clamped to the last step.
pub fn active_step_index(steps: &[ScanStep], elapsed_ms: u64) -> usize {
    let passed = steps
        .iter()
        .take_while(|s| elapsed_ms >= s.cumulative_end_ms)
        .count();
    passed.min(steps.len().saturating_sub(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// Result of a single frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanTick {
    pub state: ScanState,
    /// True only on the frame that crossed the finish line.
    pub completed: bool,
}

type CompletionHook = Box<dyn FnOnce() + Send>;

/// Drives one scan run. Time is supplied by the caller as a monotonic
/// millisecond clock, so the scheduler never owns a timer.
pub struct ScanScheduler {
    id: Uuid,
    target: ScanTarget,
    steps: Vec<ScanStep>,
    total_ms: u64,
    started_at_ms: Option<u64>,
    state: ScanState,
    status: SchedulerStatus,
    on_complete: Option<CompletionHook>,
}

impl fmt::Debug for ScanScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanScheduler")
            .field("id", &self.id)
            .field("steps", &self.steps.len())
            .field("total_ms", &self.total_ms)
            .field("status", &self.status)
            .field("state", &self.state)
            .finish()
    }
}

impl ScanScheduler {
    pub fn new<R: Rng + ?Sized>(
        target: ScanTarget,
        locality_labels: &[String],
        config: &ScanConfig,
        rng: &mut R,
    ) -> FunnelResult<Self> {
        if config.total_ms == 0 {
            return Err(FunnelError::Config(
                "scan duration must be greater than zero".to_string(),
            ));
        }

        let steps = build_steps(locality_labels, config, rng);
        debug!(
            steps = steps.len(),
            total_ms = config.total_ms,
            "Built scan schedule"
        );

        Ok(Self {
            id: Uuid::new_v4(),
            target,
            steps,
            total_ms: config.total_ms,
            started_at_ms: None,
            state: ScanState::default(),
            status: SchedulerStatus::Idle,
            on_complete: None,
        })
    }

    /// Registers a hook run on completion. It runs at most once and never
    /// after [`cancel`](Self::cancel).
    pub fn with_completion(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> &ScanTarget {
        &self.target
    }

    pub fn steps(&self) -> &[ScanStep] {
        &self.steps
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ms
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn status(&self) -> SchedulerStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, SchedulerStatus::Idle | SchedulerStatus::Running)
    }

    /// Phrase for the active step.
    pub fn current_label(&self) -> &str {
        self.steps
            .get(self.state.active_step_index)
            .map(|s| s.label.as_str())
            .unwrap_or_default()
    }

    /// Anchors the clock at `now_ms`. Later calls are ignored.
    pub fn start(&mut self, now_ms: u64) {
        if self.status == SchedulerStatus::Idle {
            self.started_at_ms = Some(now_ms);
            self.status = SchedulerStatus::Running;
            info!(scan_id = %self.id, total_ms = self.total_ms, "Scan started");
        }
    }

    /// Advances the animation to `now_ms`. The first tick starts the clock if
    /// `start` was never called. Ticks after completion or cancellation
    /// return the frozen state and never report completion again.
    pub fn tick(&mut self, now_ms: u64) -> ScanTick {
        if !self.is_active() {
            return ScanTick {
                state: self.state,
                completed: false,
            };
        }

        self.start(now_ms);
        let started = self.started_at_ms.unwrap_or(now_ms);
        let elapsed = now_ms.saturating_sub(started).max(self.state.elapsed_ms);

        self.state = ScanState {
            progress: eased_progress(elapsed, self.total_ms).max(self.state.progress),
            active_step_index: active_step_index(&self.steps, elapsed)
                .max(self.state.active_step_index),
            elapsed_ms: elapsed,
        };

        let completed = elapsed >= self.total_ms;
        if completed {
            self.status = SchedulerStatus::Completed;
            info!(scan_id = %self.id, elapsed_ms = elapsed, "Scan completed");
            if let Some(hook) = self.on_complete.take() {
                hook();
            }
        }

        ScanTick {
            state: self.state,
            completed,
        }
    }

    /// Stops the run. No further ticks advance and the completion hook is
    /// dropped unrun.
    pub fn cancel(&mut self) {
        if self.is_active() {
            debug!(scan_id = %self.id, "Scan cancelled");
            self.status = SchedulerStatus::Cancelled;
            self.on_complete = None;
        }
    }
}
