//! Client allowance lookup
//!
//! The DataCap stats API reports how much of its granted datacap a client
//! still holds. The coordinator combines that with the last allocation to
//! draw allocation progress.

use async_trait::async_trait;
use serde_json::Value;

use crate::address::Address;
use crate::config::AppConfig;
use crate::error::BackendError;
use crate::units;

#[async_trait]
pub trait AllowanceApi: Send + Sync {
    /// Remaining datacap allowance of `address` in bytes
    async fn allowance(&self, address: &Address) -> Result<u128, BackendError>;
}

/// reqwest client for the DataCap stats API, authenticated by `x-api-key`
pub struct DmobClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl DmobClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.dmob_api_url.clone(), config.dmob_api_key.clone())
    }
}

#[async_trait]
impl AllowanceApi for DmobClient {
    async fn allowance(&self, address: &Address) -> Result<u128, BackendError> {
        let url = format!("{}/getAllowanceForAddress/{}", self.base_url, address);
        log::debug!("GET {}", url);

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        parse_allowance(&body)
    }
}

/// `{"allowance": "<bytes>"}`; a missing or null allowance means none left
pub fn parse_allowance(body: &Value) -> Result<u128, BackendError> {
    match body.get("allowance") {
        None | Some(Value::Null) => Ok(0),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| BackendError::InvalidResponse(format!("allowance '{}'", s))),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| BackendError::InvalidResponse(format!("allowance {}", n))),
        Some(other) => Err(BackendError::InvalidResponse(format!("allowance {}", other))),
    }
}

/// Progress of a client through its last allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatacapProgress {
    pub allocation_amount: u128,
    pub allowance: u128,
    pub used: u128,
    /// Whole percent of the allocation used, capped at 100
    pub percent: u8,
}

impl DatacapProgress {
    pub fn new(allocation_amount: u128, allowance: u128) -> Self {
        let used = units::used_datacap(allocation_amount, allowance);
        Self {
            allocation_amount,
            allowance,
            used,
            percent: units::allocation_progress(used, allocation_amount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_allowance_forms() {
        assert_eq!(parse_allowance(&json!({ "allowance": "1099511627776" })).unwrap(), 1 << 40);
        assert_eq!(parse_allowance(&json!({ "allowance": 2048 })).unwrap(), 2048);
        assert_eq!(parse_allowance(&json!({ "allowance": null })).unwrap(), 0);
        assert_eq!(parse_allowance(&json!({})).unwrap(), 0);
        assert!(matches!(
            parse_allowance(&json!({ "allowance": "lots" })),
            Err(BackendError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_progress_from_allowance() {
        let tib = 1u128 << 40;
        let progress = DatacapProgress::new(10 * tib, 4 * tib);
        assert_eq!(progress.used, 6 * tib);
        assert_eq!(progress.percent, 60);

        // a topped-up client shows no usage
        let progress = DatacapProgress::new(tib, 4 * tib);
        assert_eq!((progress.used, progress.percent), (0, 0));
    }
}
