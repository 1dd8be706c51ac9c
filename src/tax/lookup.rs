//! Outbound postal tax rate lookups.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::{TAX_LOOKUP_TIMEOUT, TaxConfig};
use crate::error::TaxLookupError;

/// A source of combined sales tax rates by zip.
#[async_trait]
pub trait RateLookup: Send + Sync {
    /// Combined rate as a fraction (0.095 = 9.5%).
    async fn lookup(&self, zip: &str) -> Result<Decimal, TaxLookupError>;
}

#[derive(Debug, Deserialize)]
struct RateResponse {
    #[serde(rename = "totalRate")]
    total_rate: Decimal,
}

/// Rate service reached over HTTP at `GET {api_url}/{zip}`.
pub struct HttpRateLookup {
    client: Client,
    api_url: Option<String>,
    api_key: Option<SecretString>,
}

impl HttpRateLookup {
    pub fn new(config: &TaxConfig) -> Self {
        let client = Client::builder()
            .timeout(TAX_LOOKUP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn rate_url(&self, zip: &str) -> Option<String> {
        self.api_url
            .as_deref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), zip))
    }
}

#[async_trait]
impl RateLookup for HttpRateLookup {
    async fn lookup(&self, zip: &str) -> Result<Decimal, TaxLookupError> {
        let url = self.rate_url(zip).ok_or(TaxLookupError::NotConfigured)?;

        tracing::debug!("Requesting tax rate: {}", url);

        let mut request = self.client.get(&url).header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TaxLookupError::Timeout(TAX_LOOKUP_TIMEOUT)
            } else {
                TaxLookupError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TaxLookupError::BadStatus {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| TaxLookupError::RequestFailed(e.to_string()))?;
        parse_rate(&body)
    }
}

/// Parse a `{"totalRate": <number>}` body. Rates outside `[0, 1]` are
/// treated as malformed.
pub(crate) fn parse_rate(body: &str) -> Result<Decimal, TaxLookupError> {
    let parsed: RateResponse = serde_json::from_str(body)
        .map_err(|e| TaxLookupError::InvalidResponse(format!("{}: {}", e, body)))?;

    if parsed.total_rate < Decimal::ZERO || parsed.total_rate > Decimal::ONE {
        return Err(TaxLookupError::InvalidResponse(format!(
            "rate out of range: {}",
            parsed.total_rate
        )));
    }
    Ok(parsed.total_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate(r#"{"totalRate": 0.095}"#).unwrap(), dec!(0.095));
        assert_eq!(
            parse_rate(r#"{"totalRate": 0.0725, "state": "CA"}"#).unwrap(),
            dec!(0.0725)
        );
    }

    #[test]
    fn test_parse_rate_rejects_malformed() {
        assert!(matches!(
            parse_rate("not json"),
            Err(TaxLookupError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_rate(r#"{"rate": 0.05}"#),
            Err(TaxLookupError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_rate(r#"{"totalRate": -0.01}"#),
            Err(TaxLookupError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_rate(r#"{"totalRate": 9.5}"#),
            Err(TaxLookupError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_lookup_fails() {
        let lookup = HttpRateLookup::new(&TaxConfig::default());
        assert!(matches!(
            lookup.lookup("90001").await,
            Err(TaxLookupError::NotConfigured)
        ));
    }

    #[test]
    fn test_rate_url_trims_slash() {
        let lookup = HttpRateLookup::new(&TaxConfig {
            api_url: Some("https://rates.example.com/v1/".to_string()),
            api_key: None,
        });
        assert_eq!(
            lookup.rate_url("90001").as_deref(),
            Some("https://rates.example.com/v1/90001")
        );
    }
}
