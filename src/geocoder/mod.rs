//! Optional external geocoder collaborator.
//!
//! Consulted by Phase 3 when local confidence is low. The call is the only
//! blocking operation in the pipeline and must respect a hard timeout;
//! every failure mode is logged and swallowed so the pipeline proceeds
//! without it.

use anyhow::Result;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// A triple resolved by an external provider. Names are free-form display
/// strings; the pipeline normalizes and validates them before use.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodedAddress {
    pub province: String,
    pub district: Option<String>,
    pub ward: Option<String>,
}

/// The narrow interface Phase 3 sees. Implementations must be cheap to
/// share across threads; one call is made per low-confidence request.
pub trait ExternalGeocoder: Send + Sync {
    fn resolve(&self, raw_address: &str) -> Result<Option<GeocodedAddress>>;
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodedAddress>,
}

/// HTTP geocoder client hitting a provider endpoint that answers
/// `GET ?q=<address>` with a JSON body of resolved triples.
pub struct HttpGeocoder {
    client: Client,
    endpoint: Url,
}

impl HttpGeocoder {
    pub fn new(endpoint: &str, timeout_ms: u64) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        let client = Client::builder()
            .user_agent("lotus/0.1 (address-normalizer)")
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self { client, endpoint })
    }
}

impl ExternalGeocoder for HttpGeocoder {
    fn resolve(&self, raw_address: &str) -> Result<Option<GeocodedAddress>> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("q", raw_address)])
            .send()?;

        if !response.status().is_success() {
            anyhow::bail!("geocoder returned status {}", response.status());
        }

        let body: GeocodeResponse = response.json()?;
        Ok(body.results.into_iter().next())
    }
}
