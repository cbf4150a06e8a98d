use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use funnel_core::collaborators::{LeadDispatcher, NoOpDispatcher};
use funnel_core::config::{AppConfig, CheckoutConfig, ScanConfig};
use funnel_core::event_bus::EventSink;
use funnel_core::types::{
    ContactLead, DealItem, FunnelEvent, FunnelEventType, ItemsResponse, ZipMetadata,
};
use funnel_core::{DataFetchError, FunnelError, FunnelResult};

use crate::scheduler::ScanScheduler;
use crate::transitions;
use crate::types::{
    ConversionHandoff, FunnelStage, FunnelState, ScanState, ScanTarget, Transition, ZipReadiness,
};

/// Owns one visitor's funnel: the state, the single active scan and the
/// collaborators the funnel reports to.
pub struct FunnelController {
    state: FunnelState,
    scheduler: Option<ScanScheduler>,
    scan_config: ScanConfig,
    checkout: CheckoutConfig,
    lead_source: String,
    dispatcher: Arc<dyn LeadDispatcher>,
    event_sink: Arc<dyn EventSink>,
    rng: StdRng,
}

impl std::fmt::Debug for FunnelController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunnelController")
            .field("run_id", &self.state.run_id)
            .field("stage", &self.state.stage())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl FunnelController {
    /// Creates a controller in `input-pending`. Fails only on a scan
    /// configuration that could never complete.
    pub fn new(config: &AppConfig) -> FunnelResult<Self> {
        let scan = &config.scan;
        if scan.total_ms == 0 {
            return Err(FunnelError::Config(
                "scan.total_ms must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&scan.locality_share) {
            return Err(FunnelError::Config(format!(
                "scan.locality_share must be within [0, 1], got {}",
                scan.locality_share
            )));
        }

        Ok(Self {
            state: FunnelState::new(),
            scheduler: None,
            scan_config: scan.clone(),
            checkout: config.checkout.clone(),
            lead_source: config.relay.lead_source.clone(),
            dispatcher: Arc::new(NoOpDispatcher),
            event_sink: funnel_core::event_bus::noop_sink(),
            rng: StdRng::from_entropy(),
        })
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn LeadDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Attach an event sink for emitting analytics events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Replaces the random source used to order locality phrases.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn state(&self) -> &FunnelState {
        &self.state
    }

    pub fn stage(&self) -> FunnelStage {
        self.state.stage()
    }

    pub fn scheduler(&self) -> Option<&ScanScheduler> {
        self.scheduler.as_ref()
    }

    pub fn has_active_scan(&self) -> bool {
        self.scheduler.as_ref().is_some_and(|s| s.is_active())
    }

    /// Feeds a raw postal code in. Never fails; a `NotReady` answer is the
    /// caller's signal to redirect back to zip entry.
    pub fn set_postal_code(&mut self, raw: &str) -> ZipReadiness {
        let previous_run = self.state.run_id;
        let state = std::mem::take(&mut self.state);
        let (state, readiness) = transitions::set_postal_code(state, raw);
        self.state = state;

        if self.state.run_id != previous_run {
            self.cancel_scan();
            let event_type = if readiness.is_ready() {
                FunnelEventType::ZipValidated
            } else {
                FunnelEventType::ZipRejected
            };
            self.emit(event_type, None);
        }
        readiness
    }

    /// Validates the email and, if it passes, hands the lead to the relay
    /// and starts the inventory scan. The relay's outcome never affects the
    /// funnel.
    pub fn submit_contact(&mut self, email: &str) -> FunnelResult<ContactLead> {
        let source = self.lead_source.clone();
        let lead = self.apply(|state| transitions::submit_contact(state, email, &source, Utc::now()))?;

        info!(run_id = %self.state.run_id, zip = %lead.postal_code, "Lead captured");
        self.emit(FunnelEventType::LeadCaptured, None);
        self.dispatcher.dispatch(lead.clone());

        self.start_scan(ScanTarget::Inventory)?;
        Ok(lead)
    }

    /// Records the visitor's pick and restarts the scan for that item.
    pub fn select_item(&mut self, item: DealItem) -> FunnelResult<()> {
        let item_id = item.id.clone();
        self.apply(|state| transitions::select_item(state, item.clone()))?;

        info!(run_id = %self.state.run_id, item_id = %item_id, "Deal selected");
        self.emit(FunnelEventType::CheckDeal, Some(item_id));
        self.start_scan(ScanTarget::Item { item })
    }

    /// Completion handler for the active scan. Settles in `results`, or in
    /// `converting` when the scan was for a selected item.
    pub fn on_scan_complete(&mut self) -> FunnelResult<FunnelStage> {
        let stage = self.apply(transitions::complete_scan)?;
        self.scheduler = None;

        self.emit(FunnelEventType::ScanCompleted, None);
        if stage == FunnelStage::Converting {
            let item_id = self.state.selected_item.as_ref().map(|i| i.id.clone());
            self.emit_with_source(FunnelEventType::ModalOpen, item_id, self.checkout.source_tag.clone());
        }
        info!(
            run_id = %self.state.run_id,
            stage = %stage,
            items = self.state.results.count,
            "Scan finished"
        );
        Ok(stage)
    }

    /// Advances the active scan to `now_ms` and completes the stage when the
    /// scan finishes. Returns the scan snapshot, or `None` without a scan.
    pub fn tick(&mut self, now_ms: u64) -> Option<ScanState> {
        let tick = self.scheduler.as_mut()?.tick(now_ms);
        if tick.completed {
            if let Err(e) = self.on_scan_complete() {
                warn!(error = %e, "Scan completed outside the scanning stage");
            }
        }
        Some(tick.state)
    }

    /// Records the data sources' answers; failures degrade independently.
    pub fn load_inventory(
        &mut self,
        items: Result<ItemsResponse, DataFetchError>,
        metadata: Result<ZipMetadata, DataFetchError>,
    ) {
        let state = std::mem::take(&mut self.state);
        self.state = transitions::load_inventory(state, items, metadata);
    }

    /// Builds the checkout hand-off for a funnel in `converting`.
    pub fn handoff(&mut self) -> FunnelResult<ConversionHandoff> {
        let checkout = self.checkout.clone();
        let handoff = self.apply(|state| transitions::handoff(state, &checkout))?;

        info!(run_id = %self.state.run_id, url = %handoff.url, "Handing off to checkout");
        self.emit_with_source(FunnelEventType::Handoff, None, handoff.source.clone());
        Ok(handoff)
    }

    /// Stops any running scan. Safe to call more than once.
    pub fn teardown(&mut self) {
        self.cancel_scan();
    }

    fn start_scan(&mut self, target: ScanTarget) -> FunnelResult<()> {
        self.cancel_scan();
        let scan = ScanScheduler::new(
            target,
            &self.state.locality_labels,
            &self.scan_config,
            &mut self.rng,
        )?;
        self.scheduler = Some(scan);
        self.emit(FunnelEventType::ScanStarted, None);
        Ok(())
    }

    fn cancel_scan(&mut self) {
        if let Some(mut scan) = self.scheduler.take() {
            scan.cancel();
        }
    }

    fn apply<T>(&mut self, f: impl FnOnce(FunnelState) -> Transition<T>) -> FunnelResult<T> {
        let state = std::mem::take(&mut self.state);
        let Transition { state, outcome } = f(state);
        self.state = state;
        outcome
    }

    fn event(&self, event_type: FunnelEventType) -> FunnelEvent {
        FunnelEvent::new(event_type, self.state.run_id.to_string())
            .with_postal_code(self.state.postal_code.as_ref().map(|z| z.to_string()))
    }

    fn emit(&self, event_type: FunnelEventType, item_id: Option<String>) {
        self.event_sink.emit(self.event(event_type).with_item(item_id));
    }

    fn emit_with_source(&self, event_type: FunnelEventType, item_id: Option<String>, source: String) {
        self.event_sink
            .emit(self.event(event_type).with_item(item_id).with_source(source));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use funnel_core::event_bus::capture_sink;
    use funnel_core::ValidationError;

    use super::*;

    #[derive(Default)]
    struct RecordingDispatcher {
        leads: Mutex<Vec<ContactLead>>,
    }

    impl LeadDispatcher for RecordingDispatcher {
        fn dispatch(&self, lead: ContactLead) {
            self.leads.lock().unwrap().push(lead);
        }
    }

    fn item(id: &str) -> DealItem {
        DealItem {
            id: id.to_string(),
            name: "Air Fryer".to_string(),
            brand: "Ninja".to_string(),
            price: "$19.99".to_string(),
            old_price: None,
            image: String::new(),
            retailer: "Target".to_string(),
            stock_hint: String::new(),
            distance_hint: String::new(),
            updated_hint: String::new(),
        }
    }

    fn controller() -> FunnelController {
        FunnelController::new(&AppConfig::default())
            .unwrap()
            .with_rng(StdRng::seed_from_u64(11))
    }

    fn run_scan(c: &mut FunnelController, from_ms: u64) -> u64 {
        let mut now = from_ms;
        while c.has_active_scan() {
            c.tick(now);
            now += 16;
        }
        now
    }

    #[test]
    fn test_rejects_zero_duration() {
        let mut config = AppConfig::default();
        config.scan.total_ms = 0;
        assert!(matches!(
            FunnelController::new(&config),
            Err(FunnelError::Config(_))
        ));
    }

    #[test]
    fn test_full_funnel() {
        let sink = capture_sink();
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let mut c = controller()
            .with_event_sink(sink.clone())
            .with_dispatcher(dispatcher.clone());

        assert!(c.set_postal_code("90210").is_ready());
        assert_eq!(c.stage(), FunnelStage::Capture);

        c.load_inventory(
            Ok(ItemsResponse::from_items(vec![item("a"), item("b")])),
            Ok(ZipMetadata {
                cities: vec!["Beverly Hills".into(), "Century City".into(), "Bel Air".into()],
                ..ZipMetadata::default()
            }),
        );

        let lead = c.submit_contact("visitor@example.com").unwrap();
        assert_eq!(lead.source, "dashboard");
        assert_eq!(c.stage(), FunnelStage::Scanning);
        assert_eq!(c.scheduler().unwrap().steps().len(), 5);
        assert_eq!(dispatcher.leads.lock().unwrap().len(), 1);

        let now = run_scan(&mut c, 0);
        assert_eq!(c.stage(), FunnelStage::Results);
        assert_eq!(c.state().results.count, 2);

        c.select_item(item("b")).unwrap();
        assert_eq!(c.stage(), FunnelStage::Scanning);
        run_scan(&mut c, now);
        assert_eq!(c.stage(), FunnelStage::Converting);

        let handoff = c.handoff().unwrap();
        assert!(handoff.url.contains("zip=90210"));

        assert_eq!(sink.count_type(FunnelEventType::ZipValidated), 1);
        assert_eq!(sink.count_type(FunnelEventType::LeadCaptured), 1);
        assert_eq!(sink.count_type(FunnelEventType::ScanStarted), 2);
        assert_eq!(sink.count_type(FunnelEventType::ScanCompleted), 2);
        assert_eq!(sink.count_type(FunnelEventType::CheckDeal), 1);
        assert_eq!(sink.count_type(FunnelEventType::ModalOpen), 1);
        assert_eq!(sink.count_type(FunnelEventType::Handoff), 1);
    }

    #[test]
    fn test_invalid_zip_is_not_ready() {
        let sink = capture_sink();
        let mut c = controller().with_event_sink(sink.clone());
        let readiness = c.set_postal_code("abc12");
        assert_eq!(
            readiness,
            ZipReadiness::NotReady {
                normalized: "12".into()
            }
        );
        assert_eq!(c.stage(), FunnelStage::InputPending);
        assert_eq!(sink.count_type(FunnelEventType::ZipRejected), 1);
    }

    #[test]
    fn test_bad_email_does_not_dispatch() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let mut c = controller().with_dispatcher(dispatcher.clone());
        c.set_postal_code("90210");

        let err = c.submit_contact("not-an-email").unwrap_err();
        assert!(matches!(err, FunnelError::Validation(ValidationError::Email)));
        assert_eq!(c.stage(), FunnelStage::Capture);
        assert!(c.scheduler().is_none());
        assert!(dispatcher.leads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_items_failure_still_reaches_results() {
        let mut c = controller();
        c.set_postal_code("90210");
        c.load_inventory(
            Err(DataFetchError::Transport {
                source_name: "items".into(),
                message: "boom".into(),
            }),
            Err(DataFetchError::Status {
                source_name: "zip".into(),
                status: 500,
            }),
        );
        c.submit_contact("a@b.co").unwrap();
        // Only the two tail phrases without locality data.
        assert_eq!(c.scheduler().unwrap().steps().len(), 2);

        run_scan(&mut c, 0);
        assert_eq!(c.stage(), FunnelStage::Results);
        assert_eq!(c.state().results.count, 0);
    }

    #[test]
    fn test_reselect_replaces_scheduler() {
        let mut c = controller();
        c.set_postal_code("90210");
        c.submit_contact("a@b.co").unwrap();
        let now = run_scan(&mut c, 0);

        c.select_item(item("a")).unwrap();
        c.tick(now);
        c.tick(now + 1000);
        let first = c.scheduler().unwrap().id();

        c.select_item(item("b")).unwrap();
        let second = c.scheduler().unwrap().id();
        assert_ne!(first, second);

        // The new scan starts its own clock; the old one is gone.
        let state = c.tick(now + 5000).unwrap();
        assert_eq!(state.elapsed_ms, 0);
        assert_eq!(c.stage(), FunnelStage::Scanning);
        run_scan(&mut c, now + 5000);
        assert_eq!(c.stage(), FunnelStage::Converting);
        assert_eq!(c.state().selected_item.as_ref().unwrap().id, "b");
    }

    #[test]
    fn test_teardown_stops_completion() {
        let mut c = controller();
        c.set_postal_code("90210");
        c.submit_contact("a@b.co").unwrap();
        c.tick(0);
        c.tick(100);
        c.teardown();

        assert!(c.tick(10_000).is_none());
        assert_eq!(c.stage(), FunnelStage::Scanning);
        c.teardown();
    }

    #[test]
    fn test_zip_change_cancels_scan() {
        let mut c = controller();
        c.set_postal_code("90210");
        c.submit_contact("a@b.co").unwrap();
        c.tick(0);

        assert!(c.set_postal_code("10001").is_ready());
        assert!(c.scheduler().is_none());
        assert_eq!(c.stage(), FunnelStage::Capture);
        assert!(c.state().lead.is_none());
    }

    #[test]
    fn test_on_scan_complete_outside_scanning_fails() {
        let mut c = controller();
        assert!(c.on_scan_complete().is_err());
        assert_eq!(c.stage(), FunnelStage::InputPending);
    }
}
