use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ChainQueryApi, PendingTransaction};
use crate::address::Address;
use crate::config::NetworkProfile;
use crate::error::ChainError;
use crate::message::{Cid, CidLink, MessageJson, SignedMessage, UnsignedMessage};

/// JSON-RPC 2.0 client for a Lotus full node
pub struct LotusClient {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PendingJson {
    #[serde(rename = "ID")]
    id: i64,
    to: String,
    value: String,
    method: u64,
    params: Option<String>,
    #[serde(default)]
    approved: Option<Vec<String>>,
}

impl PendingJson {
    fn into_pending(self) -> Result<PendingTransaction, ChainError> {
        let parse = |s: &str| {
            s.parse::<Address>()
                .map_err(|e| ChainError::Decode(e.to_string()))
        };
        let params = match self.params.as_deref() {
            Some(b64) => general_purpose::STANDARD
                .decode(b64)
                .map_err(|e| ChainError::Decode(format!("pending params: {}", e)))?,
            None => Vec::new(),
        };
        Ok(PendingTransaction {
            id: self.id,
            to: parse(&self.to)?,
            value: self
                .value
                .parse()
                .map_err(|e| ChainError::Decode(format!("pending value '{}': {}", self.value, e)))?,
            method: self.method,
            params,
            approved: self
                .approved
                .unwrap_or_default()
                .iter()
                .map(|a| parse(a))
                .collect::<Result<_, _>>()?,
        })
    }
}

impl LotusClient {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            token,
        }
    }

    pub fn from_profile(profile: &NetworkProfile) -> Self {
        Self::new(profile.node_url.clone(), profile.node_token.clone())
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        self.call_nullable(method, params)
            .await?
            .ok_or_else(|| ChainError::Decode(format!("{}: missing result", method)))
    }

    /// Like `call`, but a `null` result is `None`
    async fn call_nullable<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, ChainError> {
        log::debug!("Lotus RPC {} -> {}", method, self.url);

        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });
        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ChainError::Unavailable(format!("{} returned {}: {}", method, status, text)));
        }

        let parsed: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("{}: {}", method, e)))?;

        if let Some(err) = parsed.error {
            log::warn!("Lotus RPC {} failed: {} ({})", method, err.message, err.code);
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(parsed.result)
    }
}

#[async_trait]
impl ChainQueryApi for LotusClient {
    async fn pending_transactions(
        &self,
        multisig: &Address,
    ) -> Result<Vec<PendingTransaction>, ChainError> {
        // Lotus answers `null` for an empty list
        let pending: Option<Vec<PendingJson>> = self
            .call_nullable("Filecoin.MsigGetPending", json!([multisig.to_string(), null]))
            .await?;

        let pending = pending
            .unwrap_or_default()
            .into_iter()
            .map(PendingJson::into_pending)
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("{} pending transactions on {}", pending.len(), multisig);
        Ok(pending)
    }

    async fn lookup_id(&self, address: &Address) -> Result<Option<Address>, ChainError> {
        if address.protocol() == 0 {
            return Ok(Some(address.clone()));
        }
        let id: Result<String, ChainError> = self
            .call("Filecoin.StateLookupID", json!([address.to_string(), null]))
            .await;
        match id {
            Ok(id) => id
                .parse::<Address>()
                .map(Some)
                .map_err(|e| ChainError::Decode(format!("lookup id '{}': {}", id, e))),
            // an address that never received funds has no actor
            Err(ChainError::Rpc { message, .. }) if is_unknown_actor(&message) => {
                log::debug!("{} has no actor yet", address);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn nonce(&self, address: &Address) -> Result<u64, ChainError> {
        self.call("Filecoin.MpoolGetNonce", json!([address.to_string()]))
            .await
    }

    async fn estimate_gas(&self, message: UnsignedMessage) -> Result<UnsignedMessage, ChainError> {
        let estimated: MessageJson = self
            .call(
                "Filecoin.GasEstimateMessageGas",
                json!([message.to_json(), { "MaxFee": "0" }, null]),
            )
            .await?;
        let estimated = UnsignedMessage::from_json(&estimated)?;

        Ok(UnsignedMessage {
            gas_limit: estimated.gas_limit,
            gas_fee_cap: estimated.gas_fee_cap,
            gas_premium: estimated.gas_premium,
            ..message
        })
    }

    async fn push(&self, message: &SignedMessage) -> Result<Cid, ChainError> {
        let link: CidLink = self
            .call("Filecoin.MpoolPush", json!([message.to_json()]))
            .await?;
        Ok(link.root.parse()?)
    }
}

fn is_unknown_actor(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("not found") || lower.contains("lookup failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_actor_messages() {
        assert!(is_unknown_actor("resolution lookup failed (t1abc): actor not found"));
        assert!(is_unknown_actor("Actor Not Found"));
        assert!(!is_unknown_actor("connection reset"));
    }

    #[tokio::test]
    async fn test_id_address_resolves_to_itself() {
        let client = LotusClient::new("http://127.0.0.1:1/rpc/v1", None);
        let id = Address::new_id(crate::address::Network::Testnet, 1001);
        assert_eq!(client.lookup_id(&id).await.unwrap(), Some(id));
    }
}
