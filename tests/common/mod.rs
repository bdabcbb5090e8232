//! Shared test infrastructure
//!
//! - `MockLotus`: in-process Lotus JSON-RPC node keeping multisig state
//! - `MockBackend`: scripted backend API with an optional gate
//! - `MockStats`: DataCap stats API serving client allowances
//! - `MockLedger`: scripted Filecoin Ledger app signing with seed-derived keys

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use tokio::sync::Notify;

use datacap_signer::address::{Address, Network};
use datacap_signer::chain::{LotusClient, PendingTransaction};
use datacap_signer::config::{AppConfig, NetworkProfile};
use datacap_signer::coordinator::{
    ActionTarget, AllocatorRecord, Application, ApplicationWithAllocation, ApproveRequest,
    BackendApi, LifecycleState, ProposeRequest,
};
use datacap_signer::error::{BackendError, WalletError};
use datacap_signer::message::{SignedMessage, SignedMessageJson};
use datacap_signer::multisig::params::{self, ApproveParams, ProposeParams, METHOD_APPROVE, METHOD_PROPOSE};
use datacap_signer::signature::{blake2b_160, recover_signer, sign_bytes, uncompressed_public_key};
use datacap_signer::wallet::keys::KeyManager;
use datacap_signer::wallet::ledger::apdu::{
    ApduAnswer, ApduCommand, INS_GET_ADDR_SECP256K1, INS_GET_VERSION, INS_SIGN_SECP256K1, P1_INIT,
    P1_LAST, SW_OK,
};
use datacap_signer::wallet::ledger::transport::{DeviceEnumerator, LedgerTransport};
use datacap_signer::wallet::{MnemonicWallet, WalletKind};
use datacap_signer::message::Cid;

pub const PHRASE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub const NETWORK: Network = Network::Testnet;

/// First actor ID handed to key addresses; the multisig is t01000
pub const FIRST_ACTOR_ID: u64 = 1001;

pub fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

pub fn multisig() -> Address {
    Address::new_id(NETWORK, 1000)
}

// Mock Lotus node

#[derive(Default)]
pub struct ChainState {
    pub pending: Vec<PendingTransaction>,
    pub executed: Vec<PendingTransaction>,
    pub next_txn_id: i64,
    pub nonces: HashMap<String, u64>,
    pub pushed: Vec<SignedMessage>,
    pub threshold: usize,
    /// Reject proposals identical to a pending one
    pub reject_duplicates: bool,
    /// Answer every call with HTTP 503
    pub offline: bool,
    /// Key address string to actor ID, assigned on first message
    pub ids: HashMap<String, Address>,
    /// RPC method names in arrival order
    pub rpc_calls: Vec<String>,
}

impl ChainState {
    /// Actor ID for `address`, creating the actor if needed
    pub fn register(&mut self, address: &Address) -> Address {
        if address.protocol() == 0 {
            return address.clone();
        }
        let next = FIRST_ACTOR_ID + self.ids.len() as u64;
        self.ids
            .entry(address.to_string())
            .or_insert_with(|| Address::new_id(NETWORK, next))
            .clone()
    }

    fn lookup(&self, address: &Address) -> Option<Address> {
        if address.protocol() == 0 {
            return Some(address.clone());
        }
        self.ids.get(&address.to_string()).cloned()
    }

    fn find(&self, id: i64) -> Result<usize, String> {
        self.pending
            .iter()
            .position(|tx| tx.id == id)
            .ok_or_else(|| format!("transaction {} not found", id))
    }

    /// Validate a message the way the actor would; returns nothing on success
    fn check(&self, from: &Address, method: u64, params: &[u8]) -> Result<(), String> {
        match method {
            METHOD_PROPOSE => {
                let propose = ProposeParams::decode(NETWORK, params).map_err(|e| e.to_string())?;
                let duplicate = self.pending.iter().any(|tx| {
                    tx.to.to_bytes() == propose.to.to_bytes()
                        && tx.value == propose.value
                        && tx.method == propose.method
                        && tx.params == propose.params
                });
                if self.reject_duplicates && duplicate {
                    return Err("proposal already exists".to_string());
                }
                Ok(())
            }
            METHOD_APPROVE => {
                let approve = ApproveParams::decode(params).map_err(|e| e.to_string())?;
                let tx = &self.pending[self.find(approve.txn_id)?];
                let requester = tx.proposer().ok_or("no proposer")?;
                let expected =
                    params::proposal_hash(requester, &tx.to, tx.value, tx.method, &tx.params)
                        .map_err(|e| e.to_string())?;
                if expected != approve.proposal_hash {
                    return Err("hash does not match proposal params".to_string());
                }
                let approver = self.lookup(from).unwrap_or_else(|| from.clone());
                if tx.is_approved_by(&approver) {
                    return Err(format!("{} already approved this message", from));
                }
                Ok(())
            }
            other => Err(format!("unsupported method {}", other)),
        }
    }

    fn apply(&mut self, from: &Address, method: u64, params: &[u8]) -> Result<(), String> {
        self.check(from, method, params)?;
        // the multisig actor records approvers by ID
        let from = &self.register(from);
        match method {
            METHOD_PROPOSE => {
                let propose = ProposeParams::decode(NETWORK, params).map_err(|e| e.to_string())?;
                let tx = PendingTransaction {
                    id: self.next_txn_id,
                    to: propose.to,
                    value: propose.value,
                    method: propose.method,
                    params: propose.params,
                    approved: vec![from.clone()],
                };
                self.next_txn_id += 1;
                self.settle(tx);
            }
            _ => {
                let approve = ApproveParams::decode(params).map_err(|e| e.to_string())?;
                let index = self.find(approve.txn_id)?;
                let mut tx = self.pending.remove(index);
                tx.approved.push(from.clone());
                self.settle(tx);
            }
        }
        Ok(())
    }

    fn settle(&mut self, tx: PendingTransaction) {
        if tx.approved.len() >= self.threshold {
            self.executed.push(tx);
        } else {
            self.pending.push(tx);
        }
    }
}

fn pending_json(tx: &PendingTransaction) -> Value {
    json!({
        "ID": tx.id,
        "To": tx.to.to_string(),
        "Value": tx.value.to_string(),
        "Method": tx.method,
        "Params": general_purpose::STANDARD.encode(&tx.params),
        "Approved": tx.approved.iter().map(|a| a.to_string()).collect::<Vec<_>>(),
    })
}

type SharedChain = Arc<Mutex<ChainState>>;

async fn rpc(
    State(chain): State<SharedChain>,
    Json(request): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let params = request["params"].clone();

    let mut chain = chain.lock().unwrap();
    if chain.offline {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    chain.rpc_calls.push(method.clone());

    let result: Result<Value, String> = match method.as_str() {
        "Filecoin.MsigGetPending" => {
            if chain.pending.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Value::Array(chain.pending.iter().map(pending_json).collect()))
            }
        }
        "Filecoin.StateLookupID" => {
            let address: Address = params[0].as_str().unwrap_or_default().parse().unwrap();
            chain
                .lookup(&address)
                .map(|id| json!(id.to_string()))
                .ok_or_else(|| format!("resolution lookup failed ({}): actor not found", address))
        }
        "Filecoin.MpoolGetNonce" => {
            let address = params[0].as_str().unwrap_or_default();
            Ok(json!(chain.nonces.get(address).copied().unwrap_or(0)))
        }
        "Filecoin.GasEstimateMessageGas" => {
            let mut message = params[0].clone();
            let from: Address = message["From"].as_str().unwrap_or_default().parse().unwrap();
            let call_params = general_purpose::STANDARD
                .decode(message["Params"].as_str().unwrap_or_default())
                .unwrap();
            let method = message["Method"].as_u64().unwrap_or_default();
            chain.check(&from, method, &call_params).map(|_| {
                message["GasLimit"] = json!(2_000_000);
                message["GasFeeCap"] = json!("100000");
                message["GasPremium"] = json!("99000");
                message
            })
        }
        "Filecoin.MpoolPush" => {
            let json: SignedMessageJson = serde_json::from_value(params[0].clone()).unwrap();
            let signed = SignedMessage::from_json(&json).unwrap();
            let message = &signed.message;
            let cid = message.cid().unwrap();
            let signer = recover_signer(cid.to_bytes(), &signed.signature.data, NETWORK)
                .map_err(|e| e.to_string());
            match signer {
                Ok(signer) if signer == message.from => {
                    let from = message.from.clone();
                    let (method, call_params) = (message.method, message.params.clone());
                    chain
                        .apply(&from, method, &call_params)
                        .map(|_| {
                            *chain.nonces.entry(from.to_string()).or_insert(0) += 1;
                            let cid = signed.cid().unwrap();
                            chain.pushed.push(signed.clone());
                            json!({ "/": cid.to_string() })
                        })
                }
                Ok(signer) => Err(format!("signature from {} does not match sender", signer)),
                Err(e) => Err(e),
            }
        }
        other => Err(format!("method {} not found", other)),
    };

    Ok(Json(match result {
        Ok(value) => json!({ "jsonrpc": "2.0", "id": id, "result": value }),
        Err(message) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": 1, "message": message }
        }),
    }))
}

pub struct MockLotus {
    pub url: String,
    pub state: SharedChain,
}

impl MockLotus {
    pub async fn start(threshold: usize) -> anyhow::Result<Self> {
        let state = Arc::new(Mutex::new(ChainState {
            threshold,
            ..Default::default()
        }));
        let app = Router::new()
            .route("/rpc/v1", post(rpc))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}/rpc/v1", listener.local_addr()?);
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        log::debug!("Mock Lotus listening on {}", url);

        Ok(Self { url, state })
    }

    pub fn client(&self) -> Arc<LotusClient> {
        Arc::new(LotusClient::new(self.url.clone(), None))
    }

    pub fn profile(&self) -> NetworkProfile {
        NetworkProfile {
            multisig_address: multisig(),
            ..NetworkProfile::localhost().with_node(self.url.clone(), None)
        }
    }

    pub fn config(&self) -> AppConfig {
        AppConfig {
            network: self.profile(),
            mnemonic: Some(PHRASE.to_string()),
            ..Default::default()
        }
    }

    pub fn mnemonic_wallet(&self) -> WalletKind {
        WalletKind::Mnemonic(MnemonicWallet::new(
            self.profile(),
            self.client(),
            Some(PHRASE.to_string()),
            5,
        ))
    }

    pub fn pending(&self) -> Vec<PendingTransaction> {
        self.state.lock().unwrap().pending.clone()
    }

    pub fn executed(&self) -> Vec<PendingTransaction> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn set_reject_duplicates(&self, reject: bool) {
        self.state.lock().unwrap().reject_duplicates = reject;
    }

    /// ID address the node knows `address` by, if it has sent a message
    pub fn id_of(&self, address: &Address) -> Option<Address> {
        self.state.lock().unwrap().lookup(address)
    }

    /// Create the actor for `address` ahead of any message from it
    pub fn register(&self, address: &Address) -> Address {
        self.state.lock().unwrap().register(address)
    }

    pub fn rpc_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().rpc_calls.clone()
    }

    /// Place a pending transaction directly, as if another signer proposed it
    pub fn inject_pending(&self, proposer: Address, to: Address, method: u64, params: Vec<u8>) -> i64 {
        let mut state = self.state.lock().unwrap();
        let id = state.next_txn_id;
        state.next_txn_id += 1;
        state.pending.push(PendingTransaction {
            id,
            to,
            value: 0,
            method,
            params,
            approved: vec![proposer],
        });
        id
    }
}

// Mock DataCap stats API

pub const STATS_API_KEY: &str = "stats-key";

type Allowances = Arc<Mutex<HashMap<String, String>>>;

async fn allowance(
    State(allowances): State<Allowances>,
    Path(address): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    let key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    if key != Some(STATS_API_KEY) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let allowance = allowances.lock().unwrap().get(&address).cloned();
    Ok(Json(json!({ "allowance": allowance })))
}

pub struct MockStats {
    pub url: String,
    pub allowances: Allowances,
}

impl MockStats {
    pub async fn start() -> anyhow::Result<Self> {
        let allowances = Allowances::default();
        let app = Router::new()
            .route("/getAllowanceForAddress/:address", get(allowance))
            .with_state(Arc::clone(&allowances));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        Ok(Self { url, allowances })
    }

    pub fn set_allowance(&self, address: &str, bytes: u128) {
        self.allowances
            .lock()
            .unwrap()
            .insert(address.to_string(), bytes.to_string());
    }
}

// Mock backend

/// Build an application in `state` with one active request for `amount`
pub fn application(id: &str, state: LifecycleState, client: &str, amount: &str) -> Application {
    serde_json::from_value(json!({
        "Version": 1,
        "ID": id,
        "Issue Number": "7",
        "Client": { "Name": format!("Client {}", id), "Region": "Europe" },
        "Datacap": { "Total Requested Amount": "100TiB", "Weekly Allocation": "1TiB" },
        "Lifecycle": {
            "State": state,
            "Active": true,
            "Active Request ID": "request-1",
            "On Chain Address": client,
            "Multisig Address": multisig().to_string()
        },
        "Allocation Requests": [{
            "ID": "request-1",
            "Request Type": "First",
            "Active": true,
            "Allocation Amount": amount,
            "Signers": []
        }],
        "repo": "applications",
        "owner": "allocator"
    }))
    .unwrap()
}

#[derive(Default)]
pub struct MockBackend {
    pub applications: Mutex<HashMap<String, Application>>,
    pub calls: Mutex<Vec<String>>,
    pub proposals: Mutex<Vec<ProposeRequest>>,
    pub approvals: Mutex<Vec<ApproveRequest>>,
    /// Action calls wait here when set
    pub gate: Option<Arc<Notify>>,
    /// Signers needed before an approval grants
    pub threshold: usize,
}

impl MockBackend {
    pub fn new(applications: Vec<Application>, threshold: usize) -> Self {
        Self {
            applications: Mutex::new(
                applications
                    .into_iter()
                    .map(|app| (app.id.clone(), app))
                    .collect(),
            ),
            threshold,
            ..Default::default()
        }
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn act(
        &self,
        name: &str,
        target: &ActionTarget,
        update: impl FnOnce(&mut Application),
    ) -> Result<Application, BackendError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.calls.lock().unwrap().push(format!("{}:{}", name, target.id));
        let mut apps = self.applications.lock().unwrap();
        let app = apps.get_mut(&target.id).ok_or(BackendError::Status {
            status: 404,
            body: "application not found".to_string(),
        })?;
        update(app);
        Ok(app.clone())
    }
}

fn signer_entry(request: &datacap_signer::coordinator::SignerRecord) -> datacap_signer::coordinator::application::Signer {
    datacap_signer::coordinator::application::Signer {
        message_cid: request.message_cid.clone(),
        signing_address: request.signing_address.clone(),
        created_at: request.created_at.clone(),
        github_username: String::new(),
    }
}

#[async_trait]
impl BackendApi for MockBackend {
    async fn list_applications(&self) -> Result<Vec<Application>, BackendError> {
        let mut apps: Vec<Application> = self.applications.lock().unwrap().values().cloned().collect();
        apps.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(apps)
    }

    async fn applications_for_repo(&self, owner: &str, repo: &str) -> Result<Vec<Application>, BackendError> {
        Ok(self
            .list_applications()
            .await?
            .into_iter()
            .filter(|a| a.owner == owner && a.repo == repo)
            .collect())
    }

    async fn application(
        &self,
        id: &str,
        _owner: &str,
        _repo: &str,
    ) -> Result<Option<ApplicationWithAllocation>, BackendError> {
        Ok(self
            .applications
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .map(|application_file| ApplicationWithAllocation {
                application_file,
                allocation: None,
            }))
    }

    async fn allocators(&self) -> Result<Vec<AllocatorRecord>, BackendError> {
        Ok(Vec::new())
    }

    async fn trigger(&self, target: &ActionTarget, amount: &str) -> Result<Application, BackendError> {
        let amount = amount.to_string();
        self.act("trigger", target, move |app| {
            app.lifecycle.state = LifecycleState::ReadyToSign;
            app.allocation_requests[0].allocation_amount = amount;
        })
        .await
    }

    async fn approve_changes(&self, target: &ActionTarget) -> Result<Application, BackendError> {
        self.act("approve_changes", target, |app| {
            app.lifecycle.state = LifecycleState::ReadyToSign;
        })
        .await
    }

    async fn decline(&self, target: &ActionTarget) -> Result<Application, BackendError> {
        self.act("decline", target, |app| {
            app.lifecycle.state = LifecycleState::Declined;
        })
        .await
    }

    async fn request_additional_info(&self, target: &ActionTarget) -> Result<Application, BackendError> {
        self.act("request_additional_info", target, |app| {
            app.lifecycle.state = LifecycleState::AdditionalInfoRequired;
        })
        .await
    }

    async fn propose(&self, target: &ActionTarget, request: &ProposeRequest) -> Result<Application, BackendError> {
        self.proposals.lock().unwrap().push(request.clone());
        let signer = signer_entry(&request.signer);
        let amount = request.new_allocation_amount.clone();
        self.act("propose", target, move |app| {
            app.lifecycle.state = LifecycleState::StartSignDatacap;
            let active = &mut app.allocation_requests[0];
            if let Some(amount) = amount {
                active.allocation_amount = amount;
            }
            active.signers.push(signer);
        })
        .await
    }

    async fn approve(&self, target: &ActionTarget, request: &ApproveRequest) -> Result<Application, BackendError> {
        self.approvals.lock().unwrap().push(request.clone());
        let signer = signer_entry(&request.signer);
        let threshold = self.threshold;
        self.act("approve", target, move |app| {
            let active = &mut app.allocation_requests[0];
            active.signers.push(signer);
            if active.signers.len() >= threshold {
                active.active = false;
                app.lifecycle.state = LifecycleState::Granted;
            }
        })
        .await
    }
}

// Mock Ledger

pub struct MockLedger {
    keys: KeyManager,
    /// Version payload returned by get-version
    pub version: Vec<u8>,
    /// Status word for every command, overriding success
    pub status: Option<u16>,
    /// Status word for the final sign chunk
    pub sign_status: Option<u16>,
    pub unplug_on_sign: bool,
    sign_buffer: Mutex<(String, Vec<u8>)>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            keys: KeyManager::from_mnemonic(PHRASE).unwrap(),
            // test_mode, major, minor, patch, locked
            version: vec![0, 0, 22, 9, 0],
            status: None,
            sign_status: None,
            unplug_on_sign: false,
            sign_buffer: Mutex::new((String::new(), Vec::new())),
        }
    }

    pub fn with_version(mut self, version: Vec<u8>) -> Self {
        self.version = version;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_sign_status(mut self, status: u16) -> Self {
        self.sign_status = Some(status);
        self
    }

    pub fn unplugging_on_sign(mut self) -> Self {
        self.unplug_on_sign = true;
        self
    }

    fn path_string(path: &[u8]) -> String {
        let parts: Vec<String> = path
            .chunks(4)
            .map(|c| {
                let raw = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                if raw & 0x8000_0000 != 0 {
                    format!("{}'", raw & 0x7fff_ffff)
                } else {
                    raw.to_string()
                }
            })
            .collect();
        format!("m/{}", parts.join("/"))
    }

    fn address_payload(&self, path: &str) -> Vec<u8> {
        let key = self.keys.derive(path).unwrap();
        let pubkey = uncompressed_public_key(&key);
        let mut address_bytes = vec![1u8];
        address_bytes.extend_from_slice(&blake2b_160(&pubkey));
        let address_string = Address::new_secp256k1(NETWORK, &pubkey).to_string();

        let mut out = pubkey.to_vec();
        out.push(address_bytes.len() as u8);
        out.extend_from_slice(&address_bytes);
        out.push(address_string.len() as u8);
        out.extend_from_slice(address_string.as_bytes());
        out
    }

    fn respond(&self, command: &ApduCommand) -> Result<ApduAnswer, WalletError> {
        let ok = |data: Vec<u8>| Ok(ApduAnswer { data, status: SW_OK });
        if let Some(status) = self.status {
            return Ok(ApduAnswer { data: Vec::new(), status });
        }
        match command.ins {
            INS_GET_VERSION => ok(self.version.clone()),
            INS_GET_ADDR_SECP256K1 => ok(self.address_payload(&Self::path_string(&command.data))),
            INS_SIGN_SECP256K1 => {
                let mut buffer = self.sign_buffer.lock().unwrap();
                if command.p1 == P1_INIT {
                    *buffer = (Self::path_string(&command.data), Vec::new());
                    return ok(Vec::new());
                }
                buffer.1.extend_from_slice(&command.data);
                if command.p1 != P1_LAST {
                    return ok(Vec::new());
                }
                if self.unplug_on_sign {
                    return Err(WalletError::TransportDisconnected);
                }
                if let Some(status) = self.sign_status {
                    return Ok(ApduAnswer { data: Vec::new(), status });
                }
                let key = self.keys.derive(&buffer.0).unwrap();
                let cid = Cid::of_cbor(&buffer.1);
                ok(sign_bytes(cid.to_bytes(), &key).to_vec())
            }
            _ => Ok(ApduAnswer {
                data: Vec::new(),
                status: 0x6D00,
            }),
        }
    }
}

pub struct MockTransport(pub Arc<MockLedger>);

#[async_trait]
impl LedgerTransport for MockTransport {
    async fn exchange(&self, command: &ApduCommand) -> Result<ApduAnswer, WalletError> {
        self.0.respond(command)
    }
}

pub struct MockEnumerator {
    pub device: Option<Arc<MockLedger>>,
}

impl MockEnumerator {
    pub fn with(device: MockLedger) -> Arc<Self> {
        Arc::new(Self {
            device: Some(Arc::new(device)),
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self { device: None })
    }
}

#[async_trait]
impl DeviceEnumerator for MockEnumerator {
    async fn open(&self) -> Result<Box<dyn LedgerTransport>, WalletError> {
        match &self.device {
            Some(device) => Ok(Box::new(MockTransport(Arc::clone(device)))),
            None => Err(WalletError::DeviceNotFound),
        }
    }
}
