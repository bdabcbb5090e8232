//! Backend REST API client
//!
//! The backend owns application files and their GitHub pull requests. This
//! side only reads them and reports verifier actions, supplying the signer
//! record for multisig steps.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::application::{Application, ApplicationWithAllocation};
use crate::address::Address;
use crate::config::AppConfig;
use crate::error::BackendError;
use crate::message::Cid;

/// Identifies the application an action applies to and who performs it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTarget {
    pub id: String,
    pub owner: String,
    pub repo: String,
    pub github_username: String,
}

impl ActionTarget {
    pub fn new(application: &Application, github_username: &str) -> Self {
        Self {
            id: application.id.clone(),
            owner: application.owner.clone(),
            repo: application.repo.clone(),
            github_username: github_username.to_string(),
        }
    }

    fn query(&self) -> [(&'static str, &str); 4] {
        [
            ("github_username", self.github_username.as_str()),
            ("repo", self.repo.as_str()),
            ("owner", self.owner.as_str()),
            ("id", self.id.as_str()),
        ]
    }
}

/// Who signed a multisig step, and the CID of the message they pushed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerRecord {
    pub signing_address: String,
    pub created_at: String,
    pub message_cid: String,
}

impl SignerRecord {
    pub fn now(address: &Address, cid: &Cid) -> Self {
        Self::at(address, cid, Utc::now())
    }

    pub fn at(address: &Address, cid: &Cid, time: DateTime<Utc>) -> Self {
        Self {
            signing_address: address.to_string(),
            created_at: format_created_at(time),
            message_cid: cid.to_string(),
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS.mmm000000 UTC`
pub fn format_created_at(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S%.3f000000 UTC").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposeRequest {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_allocation_amount: Option<String>,
    pub owner: String,
    pub repo: String,
    pub signer: SignerRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApproveRequest {
    pub request_id: String,
    pub owner: String,
    pub repo: String,
    pub signer: SignerRecord,
}

/// An allocator registered with the backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AllocatorRecord {
    pub id: u64,
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub installation_id: Option<String>,
    #[serde(default)]
    pub multisig_address: Option<String>,
    /// Comma-separated GitHub handles
    #[serde(default)]
    pub verifiers_gh_handles: Option<String>,
}

impl AllocatorRecord {
    pub fn verifiers(&self) -> Vec<String> {
        self.verifiers_gh_handles
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(String::from)
            .collect()
    }
}

#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Every application across all allocator repos
    async fn list_applications(&self) -> Result<Vec<Application>, BackendError>;

    /// Active and merged applications of one repo, active entries first
    async fn applications_for_repo(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<Application>, BackendError>;

    async fn application(
        &self,
        id: &str,
        owner: &str,
        repo: &str,
    ) -> Result<Option<ApplicationWithAllocation>, BackendError>;

    async fn allocators(&self) -> Result<Vec<AllocatorRecord>, BackendError>;

    async fn trigger(
        &self,
        target: &ActionTarget,
        allocation_amount: &str,
    ) -> Result<Application, BackendError>;

    async fn approve_changes(&self, target: &ActionTarget) -> Result<Application, BackendError>;

    async fn decline(&self, target: &ActionTarget) -> Result<Application, BackendError>;

    async fn request_additional_info(
        &self,
        target: &ActionTarget,
    ) -> Result<Application, BackendError>;

    async fn propose(
        &self,
        target: &ActionTarget,
        request: &ProposeRequest,
    ) -> Result<Application, BackendError>;

    async fn approve(
        &self,
        target: &ActionTarget,
        request: &ApproveRequest,
    ) -> Result<Application, BackendError>;
}

/// Prefer the active copy of an application over its merged one
pub fn merge_active_first(
    active: Vec<Application>,
    merged: Vec<(Value, Application)>,
) -> Vec<Application> {
    let active_ids: HashSet<String> = active.iter().map(|a| a.id.clone()).collect();
    let mut all = active;
    all.extend(
        merged
            .into_iter()
            .map(|(_pr, app)| app)
            .filter(|app| !active_ids.contains(&app.id)),
    );
    all
}

/// reqwest client for the backend API
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.backend_url.clone(), config.backend_token.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, BackendError> {
        log::debug!("GET {}", path);
        let request = self.authorize(self.client.get(self.url(path)).query(query));
        Self::read(request.send().await?).await
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        target: &ActionTarget,
        body: &B,
    ) -> Result<Application, BackendError> {
        log::debug!("POST {} for application {}", path, target.id);
        let request = self.authorize(
            self.client
                .post(self.url(path))
                .query(&target.query())
                .json(body),
        );
        Self::read(request.send().await?).await
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn list_applications(&self) -> Result<Vec<Application>, BackendError> {
        let rows: Vec<(Application, String, String)> = self.get("applications", &[]).await?;
        Ok(rows
            .into_iter()
            .map(|(app, owner, repo)| Application { owner, repo, ..app })
            .collect())
    }

    async fn applications_for_repo(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<Application>, BackendError> {
        let query = [("repo", repo), ("owner", owner)];
        let (active, merged) = tokio::try_join!(
            self.get::<Vec<Application>>("application/active", &query),
            self.get::<Vec<(Value, Application)>>("application/merged", &query),
        )?;
        Ok(merge_active_first(active, merged))
    }

    async fn application(
        &self,
        id: &str,
        owner: &str,
        repo: &str,
    ) -> Result<Option<ApplicationWithAllocation>, BackendError> {
        let raw: Value = self
            .get(
                "application/with-allocation-amount",
                &[("id", id), ("owner", owner), ("repo", repo)],
            )
            .await?;
        if raw.as_object().map_or(true, |o| o.is_empty()) {
            return Ok(None);
        }
        serde_json::from_value(raw)
            .map(Some)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }

    async fn allocators(&self) -> Result<Vec<AllocatorRecord>, BackendError> {
        self.get("allocators", &[]).await
    }

    async fn trigger(
        &self,
        target: &ActionTarget,
        allocation_amount: &str,
    ) -> Result<Application, BackendError> {
        self.post(
            "verifier/application/trigger",
            target,
            &json!({ "allocation_amount": allocation_amount }),
        )
        .await
    }

    async fn approve_changes(&self, target: &ActionTarget) -> Result<Application, BackendError> {
        self.post("verifier/application/approve_changes", target, &json!({}))
            .await
    }

    async fn decline(&self, target: &ActionTarget) -> Result<Application, BackendError> {
        self.post("verifier/application/decline", target, &json!({}))
            .await
    }

    async fn request_additional_info(
        &self,
        target: &ActionTarget,
    ) -> Result<Application, BackendError> {
        self.post(
            "verifier/application/additional_info_required",
            target,
            &json!({}),
        )
        .await
    }

    async fn propose(
        &self,
        target: &ActionTarget,
        request: &ProposeRequest,
    ) -> Result<Application, BackendError> {
        self.post("verifier/application/propose", target, request)
            .await
    }

    async fn approve(
        &self,
        target: &ActionTarget,
        request: &ApproveRequest,
    ) -> Result<Application, BackendError> {
        self.post("verifier/application/approve", target, request)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Network;
    use crate::coordinator::application::fixtures::application;
    use crate::coordinator::application::LifecycleState;
    use chrono::TimeZone;

    #[test]
    fn test_created_at_format() {
        let time = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(format_created_at(time), "2024-03-07 09:05:01.042000000 UTC");
    }

    #[test]
    fn test_propose_body_shape() {
        let cid = Cid::of_cbor(&[0x80]);
        let request = ProposeRequest {
            request_id: "r1".to_string(),
            new_allocation_amount: None,
            owner: "o".to_string(),
            repo: "r".to_string(),
            signer: SignerRecord::now(&Address::new_id(Network::Testnet, 1000), &cid),
        };
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("new_allocation_amount").is_none());
        assert_eq!(body["signer"]["signing_address"], "t01000");
        assert_eq!(body["signer"]["message_cid"], cid.to_string());
    }

    #[test]
    fn test_active_wins_over_merged() {
        let active = vec![application("a", LifecycleState::ReadyToSign)];
        let merged = vec![
            (json!({}), application("a", LifecycleState::Granted)),
            (json!({}), application("b", LifecycleState::Granted)),
        ];
        let all = merge_active_first(active, merged);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].state(), LifecycleState::ReadyToSign);
        assert_eq!(all[1].id, "b");
    }

    #[test]
    fn test_verifier_handles() {
        let record: AllocatorRecord = serde_json::from_value(json!({
            "id": 1,
            "owner": "o",
            "repo": "r",
            "verifiers_gh_handles": "alice, bob,,"
        }))
        .unwrap();
        assert_eq!(record.verifiers(), vec!["alice", "bob"]);
    }
}
