use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Local-part, `@`, a domain containing a dot, and no whitespace anywhere.
static EMAIL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

/// Number of digits in a US ZIP code.
pub const POSTAL_CODE_LEN: usize = 5;

/// Keeps only ASCII decimal digits.
pub fn normalize_postal_code(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// A validated 5-digit postal code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostalCode(String);

impl PostalCode {
    /// Normalizes `raw` and accepts it only if exactly five digits remain.
    /// Nothing is truncated or padded.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let normalized = normalize_postal_code(raw);
        if normalized.len() == POSTAL_CODE_LEN {
            Ok(Self(normalized))
        } else {
            Err(ValidationError::PostalCode { normalized })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PostalCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PostalCode> for String {
    fn from(value: PostalCode) -> Self {
        value.0
    }
}

/// Conservative address shape check shared by the funnel and the relay.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_SHAPE.is_match(email)
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(ValidationError::Email)
    }
}

/// A captured contact, handed to the lead relay once per funnel run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactLead {
    pub email: String,
    pub postal_code: PostalCode,
    pub source: String,
    pub captured_at: DateTime<Utc>,
}

/// A deal shown on the results grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    pub price: String,
    #[serde(default)]
    pub old_price: Option<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub retailer: String,
    #[serde(default, rename = "stock_hint")]
    pub stock_hint: String,
    #[serde(default, rename = "distance_hint")]
    pub distance_hint: String,
    #[serde(default, rename = "updated_hint")]
    pub updated_hint: String,
}

/// Response of the items data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ItemsWire")]
pub struct ItemsResponse {
    pub items: Vec<DealItem>,
    pub count: usize,
}

/// Items body as served. `count` is advisory and often left out.
#[derive(Deserialize)]
struct ItemsWire {
    #[serde(default)]
    items: Vec<DealItem>,
    count: Option<usize>,
}

impl From<ItemsWire> for ItemsResponse {
    fn from(wire: ItemsWire) -> Self {
        let count = wire.count.unwrap_or(wire.items.len());
        Self {
            items: wire.items,
            count,
        }
    }
}

impl ItemsResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<DealItem>) -> Self {
        let count = items.len();
        Self { items, count }
    }
}

/// Locality data for a postal code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipMetadata {
    #[serde(rename = "zip_code", default, deserialize_with = "zip_code_text")]
    pub zip_code: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub county: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub cities: Vec<String>,
    #[serde(default)]
    pub unique_cities: Vec<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// Accepts `zip_code` as a JSON number or string; `null` reads as empty.
fn zip_code_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ZipCodeWire {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<ZipCodeWire>::deserialize(deserializer)? {
        Some(ZipCodeWire::Number(n)) => format!("{n:05}"),
        Some(ZipCodeWire::Text(s)) => s,
        None => String::new(),
    })
}

/// Analytics event emitted as a visitor moves through the funnel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelEvent {
    pub event_id: Uuid,
    pub event_type: FunnelEventType,
    pub run_id: String,
    pub postal_code: Option<String>,
    pub item_id: Option<String>,
    pub source: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FunnelEventType {
    ZipValidated,
    ZipRejected,
    LeadCaptured,
    ScanStarted,
    ScanCompleted,
    CheckDeal,
    ModalOpen,
    Handoff,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postal_code_accepts_five_digits() {
        let zip = PostalCode::parse("90210").unwrap();
        assert_eq!(zip.as_str(), "90210");

        let zip = PostalCode::parse(" 9-0 2 1-0 ").unwrap();
        assert_eq!(zip.to_string(), "90210");
    }

    #[test]
    fn test_postal_code_rejects_other_lengths() {
        for raw in ["", "1234", "123456", "abcde", "abc12", "90210-1234"] {
            assert!(PostalCode::parse(raw).is_err(), "{raw:?} should be rejected");
        }

        match PostalCode::parse("abc12") {
            Err(ValidationError::PostalCode { normalized }) => assert_eq!(normalized, "12"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_postal_code_serde_validates() {
        let zip: PostalCode = serde_json::from_str("\"10001\"").unwrap();
        assert_eq!(zip.as_str(), "10001");
        assert!(serde_json::from_str::<PostalCode>("\"1000\"").is_err());
    }

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last+tag@mail.example.com"));

        for bad in [
            "",
            "not-an-email",
            "missing-domain@",
            "no-dot@domain",
            "two@@signs.com",
            "white space@example.com",
            "tab@exa\tmple.com",
            "@example.com",
        ] {
            assert!(!is_valid_email(bad), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_items_response_wire_format() {
        let json = r#"{"items":[{"id":"1","name":"Blender","brand":"Acme","price":"$9.99",
            "oldPrice":"$49.99","image":"/b.png","retailer":"Target",
            "stock_hint":"Low stock","distance_hint":"2 mi","updated_hint":"1h ago"}],"count":1}"#;
        let resp: ItemsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.count, 1);
        assert_eq!(resp.items[0].old_price.as_deref(), Some("$49.99"));
        assert_eq!(resp.items[0].stock_hint, "Low stock");
    }

    #[test]
    fn test_zip_metadata_wire_format() {
        let json = r#"{"zip_code":90210,"city":"Beverly Hills","state":"CA",
            "cities":["Beverly Hills","West Hollywood"],"uniqueCities":["Beverly Hills"]}"#;
        let meta: ZipMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.zip_code, "90210");
        assert_eq!(meta.cities.len(), 2);
        assert_eq!(meta.unique_cities, vec!["Beverly Hills".to_string()]);
        assert!(meta.addresses.is_empty());
    }

    #[test]
    fn test_zip_metadata_tolerates_loose_zip_code() {
        let meta: ZipMetadata =
            serde_json::from_str(r#"{"city":"Beverly Hills","cities":["Beverly Hills"]}"#).unwrap();
        assert_eq!(meta.zip_code, "");
        assert_eq!(meta.cities, vec!["Beverly Hills".to_string()]);

        let meta: ZipMetadata =
            serde_json::from_str(r#"{"zip_code":"90210","cities":["Beverly Hills","Bel Air"]}"#)
                .unwrap();
        assert_eq!(meta.zip_code, "90210");
        assert_eq!(meta.cities.len(), 2);

        let meta: ZipMetadata =
            serde_json::from_str(r#"{"zip_code":2134,"cities":["Allston"]}"#).unwrap();
        assert_eq!(meta.zip_code, "02134");

        let meta: ZipMetadata = serde_json::from_str(r#"{"zip_code":null,"cities":[]}"#).unwrap();
        assert_eq!(meta.zip_code, "");
    }

    #[test]
    fn test_items_count_defaults_to_list_length() {
        let json = r#"{"items":[{"id":"1","name":"Blender","price":"$9.99"},
            {"id":"2","name":"Toaster","price":"$5.00"}]}"#;
        let resp: ItemsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.items.len(), 2);
        assert_eq!(resp.count, 2);

        let resp: ItemsResponse = serde_json::from_str(r#"{"count":0}"#).unwrap();
        assert!(resp.items.is_empty());
        assert_eq!(resp.count, 0);
    }
}
