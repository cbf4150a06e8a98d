//! Deal Funnel: runs one visitor through the lead-capture funnel from the
//! command line: zip entry, email capture, inventory scan, deal pick and
//! checkout hand-off.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use funnel_core::collaborators::{ItemsSource, ZipMetadataSource};
use funnel_core::config::AppConfig;
use funnel_core::event_bus::TracingSink;
use funnel_core::types::{DealItem, ItemsResponse, ZipMetadata};
use funnel_integrations::{
    HttpItemsSource, HttpZipSource, LeadRelayEndpoint, SpawnedLeadDispatcher, StaticItemsSource,
    StaticZipSource, WebhookRelay,
};
use funnel_journey::types::{FunnelStage, ZipReadiness};
use funnel_journey::{FunnelController, FunnelSession, ScanRunOutcome, SocialProofBadge};

#[derive(Parser, Debug)]
#[command(name = "deal-funnel")]
#[command(about = "Run a visitor through the deal lead-capture funnel")]
#[command(version)]
struct Cli {
    /// Postal code as the visitor typed it
    #[arg(long)]
    zip: String,

    /// Contact email to capture
    #[arg(long)]
    email: String,

    /// Index of the deal to unlock from the results grid
    #[arg(long, default_value_t = 0)]
    item: usize,

    /// Scan duration in milliseconds (overrides config)
    #[arg(long, env = "DEAL_FUNNEL__SCAN__TOTAL_MS")]
    scan_ms: Option<u64>,

    /// Lead webhook URL (overrides config)
    #[arg(long, env = "DEAL_FUNNEL__RELAY__WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Serve items and zip metadata from built-in sample data
    #[arg(long, default_value_t = false)]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deal_funnel=info,funnel_journey=info,funnel_integrations=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(ms) = cli.scan_ms {
        config.scan.total_ms = ms;
    }
    if let Some(url) = cli.webhook_url {
        config.relay.webhook_url = Some(url);
    }

    info!(
        scan_ms = config.scan.total_ms,
        webhook = config.relay.webhook_url.is_some(),
        demo = cli.demo,
        "Configuration loaded"
    );

    let (items, metadata): (Arc<dyn ItemsSource>, Arc<dyn ZipMetadataSource>) = if cli.demo {
        demo_sources(&cli.zip)
    } else {
        (
            Arc::new(HttpItemsSource::new(&config.data)?),
            Arc::new(HttpZipSource::new(&config.data)?),
        )
    };

    let relay = Arc::new(WebhookRelay::from_config(&config.relay)?);
    let endpoint = Arc::new(LeadRelayEndpoint::new(relay));
    let (relay_tx, mut relay_rx) = mpsc::unbounded_channel();
    let dispatcher = SpawnedLeadDispatcher::from_current(endpoint)?.with_observer(relay_tx);

    let controller = FunnelController::new(&config)?
        .with_dispatcher(Arc::new(dispatcher))
        .with_event_sink(Arc::new(TracingSink));
    let mut session = FunnelSession::new(controller, items, metadata, config.scan.frame_interval_ms);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    if let ZipReadiness::NotReady { normalized } = session.enter_postal_code(&cli.zip).await {
        error!(normalized = %normalized, "Not a 5-digit ZIP code, back to zip entry");
        anyhow::bail!("invalid ZIP code {:?}", cli.zip);
    }

    if let Err(e) = session.controller_mut().submit_contact(&cli.email) {
        error!(error = %e, "Contact capture failed");
        anyhow::bail!("{e}");
    }

    match session.run_scan(shutdown_rx.clone()).await {
        ScanRunOutcome::Completed(FunnelStage::Results) => {}
        other => {
            warn!(?other, "Inventory scan did not finish");
            return Ok(());
        }
    }

    let results = session.controller().state().results.clone();
    println!("{} deals near {}", results.count, cli.zip);
    for (i, deal) in results.items.iter().enumerate() {
        println!(
            "  [{i}] {} - {} ({}){}",
            deal.name,
            deal.price,
            deal.retailer,
            deal.old_price
                .as_deref()
                .map(|p| format!(", was {p}"))
                .unwrap_or_default()
        );
    }

    let Some(pick) = results.items.get(cli.item).cloned() else {
        info!(item = cli.item, "No deal to unlock");
        flush_relay(&mut relay_rx, config.relay.timeout_ms).await;
        return Ok(());
    };

    session.controller_mut().select_item(pick)?;
    if session.run_scan(shutdown_rx).await != ScanRunOutcome::Completed(FunnelStage::Converting) {
        warn!("Deal scan did not finish");
        return Ok(());
    }

    let mut badge = SocialProofBadge::new(&config.social_proof, &mut rand::thread_rng(), 0);
    let view = badge.poll(0);
    println!("🔥 {} {} • {}", view.count, badge.label, view.clock);

    let handoff = session.controller_mut().handoff()?;
    println!("Continue at {}", handoff.url);

    flush_relay(&mut relay_rx, config.relay.timeout_ms).await;
    Ok(())
}

/// Gives the fire-and-forget relay task a chance to finish before the
/// process exits.
async fn flush_relay(
    rx: &mut mpsc::UnboundedReceiver<funnel_integrations::LeadResponse>,
    timeout_ms: u64,
) {
    match tokio::time::timeout(Duration::from_millis(timeout_ms), rx.recv()).await {
        Ok(Some(resp)) => info!(status = resp.status, "Lead relay finished"),
        Ok(None) => {}
        Err(_) => warn!("Lead relay still running at exit"),
    }
}

fn demo_sources(zip: &str) -> (Arc<dyn ItemsSource>, Arc<dyn ZipMetadataSource>) {
    let digits: String = zip.chars().filter(|c| c.is_ascii_digit()).collect();
    let deal = |id: &str, name: &str, brand: &str, price: &str, old: &str, retailer: &str| DealItem {
        id: id.to_string(),
        name: name.to_string(),
        brand: brand.to_string(),
        price: price.to_string(),
        old_price: Some(old.to_string()),
        image: format!("/items/{id}.png"),
        retailer: retailer.to_string(),
        stock_hint: "Limited stock".to_string(),
        distance_hint: "Nearby".to_string(),
        updated_hint: "Updated today".to_string(),
    };

    let items = StaticItemsSource::new().with_items(
        &digits,
        ItemsResponse::from_items(vec![
            deal("d-1001", "Cordless Stick Vacuum", "Dyson", "$89.00", "$399.99", "Walmart"),
            deal("d-1002", "Air Fryer 6qt", "Ninja", "$24.00", "$129.99", "Target"),
            deal("d-1003", "Noise Cancelling Headphones", "Sony", "$61.00", "$349.99", "Best Buy"),
        ]),
    );
    let metadata = StaticZipSource::new().with_metadata(
        &digits,
        ZipMetadata {
            zip_code: digits.clone(),
            city: "Springfield".to_string(),
            cities: vec![
                "Springfield".to_string(),
                "Shelbyville".to_string(),
                "Capital City".to_string(),
                "Ogdenville".to_string(),
            ],
            ..ZipMetadata::default()
        },
    );
    (Arc::new(items), Arc::new(metadata))
}
