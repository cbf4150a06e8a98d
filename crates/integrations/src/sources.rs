//! Items and zip-metadata sources, over HTTP or from memory.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use funnel_core::collaborators::{ItemsSource, ZipMetadataSource};
use funnel_core::config::DataSourceConfig;
use funnel_core::types::{ItemsResponse, PostalCode, ZipMetadata};
use funnel_core::{DataFetchError, FunnelError, FunnelResult};

/// Shared HTTP plumbing for the JSON data endpoints.
#[derive(Clone)]
struct JsonEndpoint {
    client: reqwest::Client,
    base_url: Url,
    name: &'static str,
}

impl JsonEndpoint {
    fn new(config: &DataSourceConfig, name: &'static str) -> FunnelResult<Self> {
        let mut base_url = Url::parse(&config.base_url)
            .map_err(|e| FunnelError::Config(format!("invalid data.base_url: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| FunnelError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            name,
        })
    }

    fn url(&self, path: &str) -> Result<Url, DataFetchError> {
        self.base_url
            .join(path)
            .map_err(|e| self.transport_error(e.to_string()))
    }

    fn transport_error(&self, message: String) -> DataFetchError {
        DataFetchError::Transport {
            source_name: self.name.to_string(),
            message,
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, DataFetchError> {
        debug!(source = self.name, url = %url, "Fetching");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(|e| self.transport_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataFetchError::Status {
                source_name: self.name.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| DataFetchError::Decode {
            source_name: self.name.to_string(),
            message: e.to_string(),
        })
    }
}

/// `GET {base}/api/items?zip=<zip>`
pub struct HttpItemsSource {
    endpoint: JsonEndpoint,
}

impl HttpItemsSource {
    pub fn new(config: &DataSourceConfig) -> FunnelResult<Self> {
        Ok(Self {
            endpoint: JsonEndpoint::new(config, "items")?,
        })
    }

    pub fn items_url(&self, zip: &PostalCode) -> Result<Url, DataFetchError> {
        let mut url = self.endpoint.url("api/items")?;
        url.query_pairs_mut().append_pair("zip", zip.as_str());
        Ok(url)
    }
}

#[async_trait]
impl ItemsSource for HttpItemsSource {
    async fn fetch_items(&self, zip: &PostalCode) -> Result<ItemsResponse, DataFetchError> {
        let url = self.items_url(zip)?;
        self.endpoint.get(url).await
    }
}

/// `GET {base}/api/zip/<zip>`
pub struct HttpZipSource {
    endpoint: JsonEndpoint,
}

impl HttpZipSource {
    pub fn new(config: &DataSourceConfig) -> FunnelResult<Self> {
        Ok(Self {
            endpoint: JsonEndpoint::new(config, "zip")?,
        })
    }

    pub fn zip_url(&self, zip: &PostalCode) -> Result<Url, DataFetchError> {
        self.endpoint.url(&format!("api/zip/{zip}"))
    }
}

#[async_trait]
impl ZipMetadataSource for HttpZipSource {
    async fn fetch_metadata(&self, zip: &PostalCode) -> Result<ZipMetadata, DataFetchError> {
        let url = self.zip_url(zip)?;
        self.endpoint.get(url).await
    }
}

/// Fixed items per postal code. Unknown codes get an empty response.
#[derive(Debug, Clone, Default)]
pub struct StaticItemsSource {
    by_zip: HashMap<String, ItemsResponse>,
}

impl StaticItemsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(mut self, zip: &str, items: ItemsResponse) -> Self {
        self.by_zip.insert(zip.to_string(), items);
        self
    }
}

#[async_trait]
impl ItemsSource for StaticItemsSource {
    async fn fetch_items(&self, zip: &PostalCode) -> Result<ItemsResponse, DataFetchError> {
        Ok(self.by_zip.get(zip.as_str()).cloned().unwrap_or_default())
    }
}

/// Fixed metadata per postal code. Unknown codes report a 404.
#[derive(Debug, Clone, Default)]
pub struct StaticZipSource {
    by_zip: HashMap<String, ZipMetadata>,
}

impl StaticZipSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, zip: &str, metadata: ZipMetadata) -> Self {
        self.by_zip.insert(zip.to_string(), metadata);
        self
    }
}

#[async_trait]
impl ZipMetadataSource for StaticZipSource {
    async fn fetch_metadata(&self, zip: &PostalCode) -> Result<ZipMetadata, DataFetchError> {
        self.by_zip
            .get(zip.as_str())
            .cloned()
            .ok_or_else(|| DataFetchError::Status {
                source_name: "zip".to_string(),
                status: 404,
            })
    }
}
