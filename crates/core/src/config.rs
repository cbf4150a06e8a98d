use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `DEAL_FUNNEL__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub data: DataSourceConfig,
    #[serde(default)]
    pub checkout: CheckoutConfig,
    #[serde(default)]
    pub social_proof: SocialProofConfig,
}

/// Timing of the simulated inventory scan.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_total_ms")]
    pub total_ms: u64,
    #[serde(default = "default_max_localities")]
    pub max_localities: usize,
    /// Fraction of the total spent on "Checking <city>" phrases.
    #[serde(default = "default_locality_share")]
    pub locality_share: f64,
    #[serde(default = "default_min_step_ms")]
    pub min_step_ms: u64,
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Downstream webhook. Leads are still accepted when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_relay_timeout_ms")]
    pub timeout_ms: u64,
    /// Tag stamped on every lead captured by the funnel.
    #[serde(default = "default_lead_source")]
    pub lead_source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceConfig {
    #[serde(default = "default_data_base_url")]
    pub base_url: String,
    #[serde(default = "default_data_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutConfig {
    #[serde(default = "default_destination_url")]
    pub destination_url: String,
    #[serde(default = "default_source_tag")]
    pub source_tag: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SocialProofConfig {
    #[serde(default = "default_proof_min")]
    pub min: u32,
    #[serde(default = "default_proof_max")]
    pub max: u32,
    #[serde(default = "default_proof_window_ms")]
    pub window_ms: u64,
    #[serde(default)]
    pub auto_reset: bool,
}

// Default functions
fn default_total_ms() -> u64 {
    6000
}
fn default_max_localities() -> usize {
    6
}
fn default_locality_share() -> f64 {
    0.6
}
fn default_min_step_ms() -> u64 {
    800
}
fn default_frame_interval_ms() -> u64 {
    16
}
fn default_relay_timeout_ms() -> u64 {
    5000
}
fn default_lead_source() -> String {
    "dashboard".to_string()
}
fn default_data_base_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_data_timeout_ms() -> u64 {
    8000
}
fn default_destination_url() -> String {
    "https://welcome.emoneydeals.com".to_string()
}
fn default_source_tag() -> String {
    "dashboard_modal".to_string()
}
fn default_proof_min() -> u32 {
    200
}
fn default_proof_max() -> u32 {
    450
}
fn default_proof_window_ms() -> u64 {
    15 * 60_000
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            total_ms: default_total_ms(),
            max_localities: default_max_localities(),
            locality_share: default_locality_share(),
            min_step_ms: default_min_step_ms(),
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_ms: default_relay_timeout_ms(),
            lead_source: default_lead_source(),
        }
    }
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_data_base_url(),
            timeout_ms: default_data_timeout_ms(),
        }
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            destination_url: default_destination_url(),
            source_tag: default_source_tag(),
        }
    }
}

impl Default for SocialProofConfig {
    fn default() -> Self {
        Self {
            min: default_proof_min(),
            max: default_proof_max(),
            window_ms: default_proof_window_ms(),
            auto_reset: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            relay: RelayConfig::default(),
            data: DataSourceConfig::default(),
            checkout: CheckoutConfig::default(),
            social_proof: SocialProofConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("DEAL_FUNNEL")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
