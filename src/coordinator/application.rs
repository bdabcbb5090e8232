//! Application records as served by the backend API

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Submitted,
    AdditionalInfoRequired,
    AdditionalInfoSubmitted,
    ChangesRequested,
    ReadyToSign,
    StartSignDatacap,
    Granted,
    TotalDatacapReached,
    Declined,
    Error,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    First,
    Refill,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    #[serde(rename = "Message CID")]
    pub message_cid: String,
    #[serde(rename = "Signing Address")]
    pub signing_address: String,
    #[serde(rename = "Created At", default)]
    pub created_at: String,
    #[serde(rename = "Github Username", default)]
    pub github_username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Request Type")]
    pub request_type: RequestType,
    #[serde(rename = "Created At", default)]
    pub created_at: String,
    #[serde(rename = "Updated At", default)]
    pub updated_at: String,
    #[serde(rename = "Active")]
    pub active: bool,
    #[serde(rename = "Allocation Amount")]
    pub allocation_amount: String,
    #[serde(rename = "Signers", default)]
    pub signers: Vec<Signer>,
}

impl AllocationRequest {
    /// Proposed and approved; nothing left to sign
    pub fn is_terminal(&self) -> bool {
        self.signers.len() >= 2
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    #[serde(rename = "State")]
    pub state: LifecycleState,
    #[serde(rename = "Validated At", default)]
    pub validated_at: String,
    #[serde(rename = "Validated By", default)]
    pub validated_by: String,
    #[serde(rename = "Active", default)]
    pub active: bool,
    #[serde(rename = "Updated At", default)]
    pub updated_at: String,
    #[serde(rename = "Active Request ID", default)]
    pub active_request_id: Option<String>,
    #[serde(rename = "On Chain Address", default)]
    pub on_chain_address: String,
    #[serde(rename = "Multisig Address", default)]
    pub multisig_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Region", default)]
    pub region: String,
    #[serde(rename = "Industry", default)]
    pub industry: String,
    #[serde(rename = "Website", default)]
    pub website: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datacap {
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(rename = "Data Type", default)]
    pub data_type: String,
    #[serde(rename = "Total Requested Amount", default)]
    pub total_requested_amount: String,
    #[serde(rename = "Single Size Dataset", default)]
    pub single_size_dataset: String,
    #[serde(rename = "Replicas", default)]
    pub replicas: u32,
    #[serde(rename = "Weekly Allocation", default)]
    pub weekly_allocation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    #[serde(rename = "Version", default)]
    pub version: u32,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Issue Number", default)]
    pub issue_number: String,
    #[serde(rename = "Client", default)]
    pub client: Client,
    #[serde(rename = "Datacap", default)]
    pub datacap: Datacap,
    #[serde(rename = "Lifecycle")]
    pub lifecycle: Lifecycle,
    #[serde(rename = "Allocation Requests", default)]
    pub allocation_requests: Vec<AllocationRequest>,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub owner: String,
}

impl Application {
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state
    }

    /// The request named by the lifecycle, falling back to the one flagged active
    pub fn active_request(&self) -> Option<&AllocationRequest> {
        match &self.lifecycle.active_request_id {
            Some(id) => self.allocation_requests.iter().find(|r| &r.id == id),
            None => self.allocation_requests.iter().find(|r| r.active),
        }
    }
}

/// Allocator-level amount settings returned alongside a single application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSettings {
    pub allocation_amount_type: String,
    #[serde(default)]
    pub allocation_amount_quantity_options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationWithAllocation {
    pub application_file: Application,
    #[serde(default)]
    pub allocation: Option<AllocationSettings>,
}
