//! Pure funnel transitions. Each function takes the visitor's state by value
//! and hands back the next state, so every step can be exercised without a
//! scheduler, a clock or any I/O.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use url::Url;

use funnel_core::config::CheckoutConfig;
use funnel_core::types::{
    normalize_postal_code, validate_email, ContactLead, DealItem, ItemsResponse, PostalCode,
    ZipMetadata,
};
use funnel_core::{DataFetchError, FunnelError, ValidationError};

use crate::types::{
    ConversionHandoff, FunnelStage, FunnelState, ScanTarget, Transition, ZipReadiness,
};

/// Stores the normalized postal code and re-evaluates the capture guard.
///
/// A different code starts a fresh run (new id, nothing carried over). The
/// same code re-entered is a no-op so re-renders do not reset progress.
pub fn set_postal_code(state: FunnelState, raw: &str) -> (FunnelState, ZipReadiness) {
    let normalized = normalize_postal_code(raw);

    if normalized == state.normalized_postal_code && state.stage() != FunnelStage::InputPending
    {
        let readiness = match &state.postal_code {
            Some(zip) => ZipReadiness::Ready(zip.clone()),
            None => ZipReadiness::NotReady { normalized },
        };
        return (state, readiness);
    }

    let mut next = FunnelState::new();
    if state.stage() != FunnelStage::InputPending {
        // Keep the audit trail of the abandoned run's last move.
        next.machine = state.machine;
        if let Err(e) = next.machine.transition(FunnelStage::InputPending) {
            warn!(error = %e, "Could not reset funnel stage");
        }
    }
    next.normalized_postal_code = normalized.clone();

    match PostalCode::parse(&normalized) {
        Ok(zip) => {
            if let Err(e) = next.machine.transition(FunnelStage::Capture) {
                warn!(error = %e, "Could not enter capture");
            }
            info!(zip = %zip, run_id = %next.run_id, "Postal code accepted");
            next.postal_code = Some(zip.clone());
            (next, ZipReadiness::Ready(zip))
        }
        Err(_) => {
            info!(normalized = %normalized, "Postal code not ready");
            (next, ZipReadiness::NotReady { normalized })
        }
    }
}

/// Checks the email shape and, on success, builds the lead and enters the
/// inventory scan. A malformed address leaves the stage at `capture` with a
/// message for the visitor.
pub fn submit_contact(
    mut state: FunnelState,
    email: &str,
    source: &str,
    now: DateTime<Utc>,
) -> Transition<ContactLead> {
    if state.stage() != FunnelStage::Capture {
        let err = FunnelError::InvalidTransition {
            from: state.stage().to_string(),
            to: FunnelStage::Scanning.to_string(),
        };
        return Transition::err(state, err);
    }

    let email = email.trim();
    if let Err(e) = validate_email(email) {
        state.contact_error = Some(e.to_string());
        return Transition::err(state, e);
    }

    let Some(postal_code) = state.postal_code.clone() else {
        let err = ValidationError::PostalCode {
            normalized: state.normalized_postal_code.clone(),
        };
        return Transition::err(state, err);
    };

    let lead = ContactLead {
        email: email.to_string(),
        postal_code,
        source: source.to_string(),
        captured_at: now,
    };

    if let Err(e) = state.machine.transition(FunnelStage::Scanning) {
        return Transition::err(state, e);
    }
    state.contact_error = None;
    state.lead = Some(lead.clone());
    state.scan_target = Some(ScanTarget::Inventory);
    state.selected_item = None;

    Transition::ok(state, lead)
}

/// Records the visitor's pick and enters an item-scoped scan. Allowed from
/// `results`, or while another item scan is still running.
pub fn select_item(mut state: FunnelState, item: DealItem) -> Transition<()> {
    let reselecting = state.stage() == FunnelStage::Scanning
        && matches!(state.scan_target, Some(ScanTarget::Item { .. }));

    if state.stage() != FunnelStage::Results && !reselecting {
        let err = FunnelError::InvalidTransition {
            from: state.stage().to_string(),
            to: FunnelStage::Scanning.to_string(),
        };
        return Transition::err(state, err);
    }

    if let Err(e) = state.machine.transition(FunnelStage::Scanning) {
        return Transition::err(state, e);
    }
    state.selected_item = Some(item.clone());
    state.scan_target = Some(ScanTarget::Item { item });
    Transition::ok(state, ())
}

/// Leaves `scanning` for `results`. An item-scoped scan then continues
/// straight on to `converting`. Returns the stage the funnel settled in.
pub fn complete_scan(mut state: FunnelState) -> Transition<FunnelStage> {
    if let Err(e) = state.machine.transition(FunnelStage::Results) {
        return Transition::err(state, e);
    }

    let item_scan = matches!(state.scan_target.take(), Some(ScanTarget::Item { .. }));
    if item_scan && state.selected_item.is_some() {
        if let Err(e) = state.machine.transition(FunnelStage::Converting) {
            return Transition::err(state, e);
        }
    }

    let stage = state.stage();
    Transition::ok(state, stage)
}

/// Stores what the data sources returned. Each failure degrades on its own:
/// no items means an empty grid, no metadata means no locality phrases.
pub fn load_inventory(
    mut state: FunnelState,
    items: Result<ItemsResponse, DataFetchError>,
    metadata: Result<ZipMetadata, DataFetchError>,
) -> FunnelState {
    state.results = match items {
        Ok(resp) => resp,
        Err(e) => {
            warn!(error = %e, zip = %state.normalized_postal_code, "Items unavailable, showing none");
            ItemsResponse::empty()
        }
    };

    state.locality_labels = match metadata {
        Ok(meta) => meta.cities,
        Err(e) => {
            warn!(error = %e, zip = %state.normalized_postal_code, "Zip metadata unavailable");
            Vec::new()
        }
    };

    state
}

/// Builds the checkout URL for a funnel in `converting`.
pub fn handoff(state: FunnelState, checkout: &CheckoutConfig) -> Transition<ConversionHandoff> {
    let postal_code = match (&state.postal_code, state.stage()) {
        (Some(zip), FunnelStage::Converting) => zip.clone(),
        _ => {
            let err = FunnelError::InvalidTransition {
                from: state.stage().to_string(),
                to: "handoff".to_string(),
            };
            return Transition::err(state, err);
        }
    };

    let mut url = match Url::parse(&checkout.destination_url) {
        Ok(url) => url,
        Err(e) => {
            let err = FunnelError::Config(format!(
                "invalid checkout destination {:?}: {e}",
                checkout.destination_url
            ));
            return Transition::err(state, err);
        }
    };
    url.query_pairs_mut()
        .append_pair("zip", postal_code.as_str())
        .append_pair("source", &checkout.source_tag);

    let handoff = ConversionHandoff {
        url: url.to_string(),
        postal_code,
        source: checkout.source_tag.clone(),
    };
    Transition::ok(state, handoff)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> DealItem {
        DealItem {
            id: id.to_string(),
            name: format!("Item {id}"),
            brand: "Acme".to_string(),
            price: "$5.00".to_string(),
            old_price: Some("$25.00".to_string()),
            image: String::new(),
            retailer: "Walmart".to_string(),
            stock_hint: String::new(),
            distance_hint: String::new(),
            updated_hint: String::new(),
        }
    }

    fn captured() -> FunnelState {
        let (state, _) = set_postal_code(FunnelState::new(), "90210");
        submit_contact(state, "a@b.co", "test", Utc::now()).state
    }

    #[test]
    fn test_valid_postal_code_enters_capture() {
        let (state, readiness) = set_postal_code(FunnelState::new(), "90210");
        assert!(readiness.is_ready());
        assert_eq!(state.stage(), FunnelStage::Capture);
        assert_eq!(state.postal_code.unwrap().as_str(), "90210");
    }

    #[test]
    fn test_invalid_postal_codes_stay_pending() {
        for raw in ["", "1234", "123456", "abcde", "abc12"] {
            let (state, readiness) = set_postal_code(FunnelState::new(), raw);
            assert!(!readiness.is_ready(), "{raw:?}");
            assert_eq!(state.stage(), FunnelStage::InputPending);
            assert!(state.postal_code.is_none());
        }

        let (state, readiness) = set_postal_code(FunnelState::new(), "abc12");
        assert_eq!(
            readiness,
            ZipReadiness::NotReady {
                normalized: "12".to_string()
            }
        );
        assert_eq!(state.normalized_postal_code, "12");
    }

    #[test]
    fn test_same_postal_code_is_noop() {
        let state = captured();
        let run_id = state.run_id;
        let (state, readiness) = set_postal_code(state, "902-10");
        assert!(readiness.is_ready());
        assert_eq!(state.run_id, run_id);
        assert_eq!(state.stage(), FunnelStage::Scanning);
    }

    #[test]
    fn test_new_postal_code_resets_run() {
        let state = captured();
        let run_id = state.run_id;
        let (state, readiness) = set_postal_code(state, "10001");
        assert!(readiness.is_ready());
        assert_ne!(state.run_id, run_id);
        assert_eq!(state.stage(), FunnelStage::Capture);
        assert!(state.lead.is_none());

        let (state, readiness) = set_postal_code(state, "100");
        assert!(!readiness.is_ready());
        assert_eq!(state.stage(), FunnelStage::InputPending);
    }

    #[test]
    fn test_malformed_email_stays_in_capture() {
        for bad in ["not-an-email", "a@b", "a b@c.com", "@c.com", ""] {
            let (state, _) = set_postal_code(FunnelState::new(), "90210");
            let t = submit_contact(state, bad, "test", Utc::now());
            assert!(
                matches!(t.outcome, Err(FunnelError::Validation(ValidationError::Email))),
                "{bad:?}"
            );
            assert_eq!(t.state.stage(), FunnelStage::Capture);
            assert_eq!(t.state.contact_error.as_deref(), Some("Invalid email address"));
            assert!(t.state.lead.is_none());
        }
    }

    #[test]
    fn test_retry_after_bad_email() {
        let (state, _) = set_postal_code(FunnelState::new(), "90210");
        let t = submit_contact(state, "nope", "test", Utc::now());
        let t = submit_contact(t.state, "  yes@example.com ", "test", Utc::now());
        let lead = t.outcome.unwrap();
        assert_eq!(lead.email, "yes@example.com");
        assert_eq!(lead.postal_code.as_str(), "90210");
        assert_eq!(t.state.stage(), FunnelStage::Scanning);
        assert_eq!(t.state.scan_target, Some(ScanTarget::Inventory));
        assert!(t.state.contact_error.is_none());
    }

    #[test]
    fn test_submit_contact_requires_capture_stage() {
        let t = submit_contact(FunnelState::new(), "a@b.co", "test", Utc::now());
        assert!(matches!(t.outcome, Err(FunnelError::InvalidTransition { .. })));
        assert_eq!(t.state.stage(), FunnelStage::InputPending);
    }

    #[test]
    fn test_inventory_scan_completes_into_results() {
        let t = complete_scan(captured());
        assert_eq!(t.outcome.unwrap(), FunnelStage::Results);
        assert!(t.state.scan_target.is_none());
    }

    #[test]
    fn test_item_scan_completes_into_converting() {
        let state = complete_scan(captured()).state;
        let t = select_item(state, item("1"));
        t.outcome.unwrap();
        assert_eq!(t.state.stage(), FunnelStage::Scanning);

        let t = complete_scan(t.state);
        assert_eq!(t.outcome.unwrap(), FunnelStage::Converting);
        assert_eq!(t.state.selected_item.unwrap().id, "1");
    }

    #[test]
    fn test_reselect_during_item_scan() {
        let state = complete_scan(captured()).state;
        let state = select_item(state, item("1")).state;
        let t = select_item(state, item("2"));
        t.outcome.unwrap();
        assert_eq!(t.state.selected_item.unwrap().id, "2");
    }

    #[test]
    fn test_select_item_rejected_during_inventory_scan() {
        let t = select_item(captured(), item("1"));
        assert!(t.outcome.is_err());
        assert!(t.state.selected_item.is_none());
    }

    #[test]
    fn test_items_failure_degrades_to_empty() {
        let state = load_inventory(
            captured(),
            Err(DataFetchError::Transport {
                source_name: "items".into(),
                message: "connection refused".into(),
            }),
            Ok(ZipMetadata {
                cities: vec!["Beverly Hills".into()],
                ..ZipMetadata::default()
            }),
        );
        assert_eq!(state.results.count, 0);
        assert!(state.results.items.is_empty());
        assert_eq!(state.locality_labels, vec!["Beverly Hills".to_string()]);

        let t = complete_scan(state);
        assert_eq!(t.outcome.unwrap(), FunnelStage::Results);
    }

    #[test]
    fn test_metadata_failure_keeps_items() {
        let state = load_inventory(
            captured(),
            Ok(ItemsResponse::from_items(vec![item("1"), item("2")])),
            Err(DataFetchError::Status {
                source_name: "zip".into(),
                status: 404,
            }),
        );
        assert_eq!(state.results.count, 2);
        assert!(state.locality_labels.is_empty());
    }

    #[test]
    fn test_handoff_url() {
        let state = complete_scan(captured()).state;
        let state = select_item(state, item("1")).state;
        let state = complete_scan(state).state;

        let t = handoff(state, &CheckoutConfig::default());
        let handoff = t.outcome.unwrap();
        assert_eq!(
            handoff.url,
            "https://welcome.emoneydeals.com/?zip=90210&source=dashboard_modal"
        );
    }

    #[test]
    fn test_handoff_requires_converting() {
        let t = handoff(captured(), &CheckoutConfig::default());
        assert!(t.outcome.is_err());
    }
}
