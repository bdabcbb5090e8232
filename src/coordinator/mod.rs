//! Application action coordinator
//!
//! - `application` - backend application records
//! - `state` - which action each lifecycle state accepts
//! - `store` - the local copy of applications and its views
//! - `backend` - backend REST API client
//! - `allowance` - client allowance lookup for allocation progress
//! - `messages` - user-facing guidance for failures
//!
//! The coordinator gates verifier actions on lifecycle state, runs the
//! multisig step for propose/approve through the connected wallet, reports
//! the outcome to the backend and patches the affected application in the
//! store. At most one action per application is in flight at a time.

pub mod allowance;
pub mod application;
pub mod backend;
pub mod messages;
pub mod state;
pub mod store;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::address::{Address, Network};
use crate::config::{AllocatorConfig, AmountType};
use crate::error::{BackendError, CoordinatorError, ProtocolError};
use crate::message::Cid;
use crate::multisig::ProposalEngine;
use crate::units;
use crate::wallet::{WalletKind, WalletSession};

pub use allowance::{AllowanceApi, DatacapProgress, DmobClient};
pub use application::{
    AllocationRequest, AllocationSettings, Application, ApplicationWithAllocation, LifecycleState,
};
pub use backend::{
    ActionTarget, AllocatorRecord, ApproveRequest, BackendApi, HttpBackend, ProposeRequest,
    SignerRecord,
};
pub use messages::user_message;
pub use state::Action;
pub use store::ApplicationStore;

/// Emitted when an approval completes the grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantNotification {
    pub application_id: String,
    pub client_name: String,
    pub message_cid: String,
    pub allocation_amount: String,
}

#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub application: Application,
    /// Set for the multisig steps
    pub message_cid: Option<Cid>,
    pub notification: Option<GrantNotification>,
}

impl ActionOutcome {
    fn plain(application: Application) -> Self {
        Self {
            application,
            message_cid: None,
            notification: None,
        }
    }
}

/// Marks an application busy until dropped
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, id: &str) -> Result<Self, CoordinatorError> {
        if !lock(set).insert(id.to_string()) {
            log::info!("Rejecting concurrent action on application {}", id);
            return Err(CoordinatorError::ActionInFlight(id.to_string()));
        }
        Ok(Self {
            set,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ApplicationCoordinator {
    backend: Arc<dyn BackendApi>,
    allowance: Option<Arc<dyn AllowanceApi>>,
    allocator: AllocatorConfig,
    github_username: String,
    store: Mutex<ApplicationStore>,
    amount_settings: Mutex<Option<AllocationSettings>>,
    session: tokio::sync::Mutex<Option<WalletSession>>,
    in_flight: Mutex<HashSet<String>>,
    live: AtomicBool,
}

impl ApplicationCoordinator {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        allocator: AllocatorConfig,
        github_username: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            allowance: None,
            allocator,
            github_username: github_username.into(),
            store: Mutex::new(ApplicationStore::new()),
            amount_settings: Mutex::new(None),
            session: tokio::sync::Mutex::new(None),
            in_flight: Mutex::new(HashSet::new()),
            live: AtomicBool::new(true),
        }
    }

    /// Source of client allowances for `datacap_progress`
    pub fn with_allowance_api(mut self, allowance: Arc<dyn AllowanceApi>) -> Self {
        self.allowance = Some(allowance);
        self
    }

    pub fn allocator(&self) -> &AllocatorConfig {
        &self.allocator
    }

    /// How much of its latest allocation the client has spent
    ///
    /// Reads the client's remaining allowance fresh on every call.
    pub async fn datacap_progress(&self, id: &str) -> Result<DatacapProgress, CoordinatorError> {
        let api = self
            .allowance
            .as_ref()
            .ok_or_else(|| CoordinatorError::NotConfigured("Allowance API".to_string()))?;
        let app = self
            .application(id)
            .ok_or_else(|| CoordinatorError::UnknownApplication(id.to_string()))?;
        let request = app
            .active_request()
            .or_else(|| app.allocation_requests.last())
            .ok_or_else(|| CoordinatorError::NoActiveRequest(id.to_string()))?;
        let allocation_amount = units::to_bytes(&request.allocation_amount)?;
        let client = self.client_address(&app)?;

        let allowance = api
            .allowance(&client)
            .await
            .map_err(|e| backend_failure("allowance", e))?;
        let progress = DatacapProgress::new(allocation_amount, allowance);
        log::debug!("{} has used {}% of its allocation", client, progress.percent);
        Ok(progress)
    }

    // Store access

    pub async fn refresh_all(&self) -> Result<usize, CoordinatorError> {
        let applications = self
            .backend
            .list_applications()
            .await
            .map_err(|e| backend_failure("list applications", e))?;
        let count = applications.len();
        if self.is_live() {
            lock(&self.store).replace_all(applications);
        }
        Ok(count)
    }

    pub async fn refresh_repo(&self, owner: &str, repo: &str) -> Result<usize, CoordinatorError> {
        let applications = self
            .backend
            .applications_for_repo(owner, repo)
            .await
            .map_err(|e| backend_failure("list repo applications", e))?;
        let count = applications.len();
        if self.is_live() {
            let mut store = lock(&self.store);
            for app in applications {
                store.upsert(app);
            }
        }
        Ok(count)
    }

    /// Fetch one application; its allocation settings override the allocator defaults
    pub async fn load_application(
        &self,
        id: &str,
        owner: &str,
        repo: &str,
    ) -> Result<Application, CoordinatorError> {
        let found = self
            .backend
            .application(id, owner, repo)
            .await
            .map_err(|e| backend_failure("fetch application", e))?
            .ok_or_else(|| CoordinatorError::UnknownApplication(id.to_string()))?;

        let mut application = found.application_file;
        if application.owner.is_empty() {
            application.owner = owner.to_string();
        }
        if application.repo.is_empty() {
            application.repo = repo.to_string();
        }
        if self.is_live() {
            if let Some(settings) = found.allocation {
                *lock(&self.amount_settings) = Some(settings);
            }
            lock(&self.store).upsert(application.clone());
        }
        Ok(application)
    }

    pub fn application(&self, id: &str) -> Option<Application> {
        lock(&self.store).get(id).cloned()
    }

    pub fn applications(&self) -> Vec<Application> {
        lock(&self.store).all().into_iter().cloned().collect()
    }

    pub fn applications_in_repo(&self, owner: &str, repo: &str) -> Vec<Application> {
        lock(&self.store)
            .by_repo(owner, repo)
            .into_iter()
            .cloned()
            .collect()
    }

    // Wallet session

    pub async fn connect_wallet(&self, wallet: WalletKind) -> Result<Vec<Address>, CoordinatorError> {
        let session = WalletSession::connect(wallet).await?;
        let accounts = session.accounts().to_vec();
        let mut slot = self.session.lock().await;
        if let Some(previous) = slot.replace(session) {
            previous.disconnect();
        }
        Ok(accounts)
    }

    pub async fn disconnect(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.disconnect();
        }
    }

    pub async fn is_wallet_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub async fn accounts(&self) -> Vec<Address> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.accounts().to_vec())
            .unwrap_or_default()
    }

    pub async fn load_more_accounts(&self) -> Result<Vec<Address>, CoordinatorError> {
        let mut slot = self.session.lock().await;
        let session = slot.as_mut().ok_or(CoordinatorError::WalletNotConnected)?;
        Ok(session.load_more_accounts().await?.to_vec())
    }

    pub async fn select_account(&self, index: i64) -> Result<Address, CoordinatorError> {
        let mut slot = self.session.lock().await;
        let session = slot.as_mut().ok_or(CoordinatorError::WalletNotConnected)?;
        session.set_active_account_index(index)?;
        Ok(session.active_address()?.clone())
    }

    // Liveness

    /// Stop applying results; in-flight actions still run to completion
    pub fn detach(&self) {
        log::debug!("Coordinator detached");
        self.live.store(false, Ordering::SeqCst);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub fn is_api_calling(&self, id: &str) -> bool {
        lock(&self.in_flight).contains(id)
    }

    // Actions

    /// Start the review, setting the first allocation amount
    pub async fn trigger(
        &self,
        id: &str,
        amount: Option<&str>,
    ) -> Result<ActionOutcome, CoordinatorError> {
        let (_busy, app) = self.begin(id, Action::Trigger)?;
        let amount = match self.resolve_amount(&app, amount)? {
            Some(amount) => amount,
            None => self.default_trigger_amount(&app)?,
        };
        log::info!("Triggering application {} with {}", id, amount);

        let updated = self
            .backend
            .trigger(&self.target(&app), &amount)
            .await
            .map_err(|e| backend_failure("trigger", e))?;
        Ok(ActionOutcome::plain(self.apply(&app, updated)))
    }

    pub async fn approve_changes(&self, id: &str) -> Result<ActionOutcome, CoordinatorError> {
        let (_busy, app) = self.begin(id, Action::ApproveChanges)?;
        let updated = self
            .backend
            .approve_changes(&self.target(&app))
            .await
            .map_err(|e| backend_failure("approve changes", e))?;
        Ok(ActionOutcome::plain(self.apply(&app, updated)))
    }

    pub async fn decline(&self, id: &str) -> Result<ActionOutcome, CoordinatorError> {
        let (_busy, app) = self.begin(id, Action::Decline)?;
        let updated = self
            .backend
            .decline(&self.target(&app))
            .await
            .map_err(|e| backend_failure("decline", e))?;
        Ok(ActionOutcome::plain(self.apply(&app, updated)))
    }

    pub async fn request_additional_info(&self, id: &str) -> Result<ActionOutcome, CoordinatorError> {
        let (_busy, app) = self.begin(id, Action::RequestAdditionalInfo)?;
        let updated = self
            .backend
            .request_additional_info(&self.target(&app))
            .await
            .map_err(|e| backend_failure("request additional info", e))?;
        Ok(ActionOutcome::plain(self.apply(&app, updated)))
    }

    /// First multisig signature for the active allocation request
    pub async fn propose(
        &self,
        id: &str,
        amount: Option<&str>,
    ) -> Result<ActionOutcome, CoordinatorError> {
        let (_busy, app) = self.begin(id, Action::Propose)?;
        let request = app
            .active_request()
            .ok_or_else(|| CoordinatorError::NoActiveRequest(id.to_string()))?
            .clone();
        let new_amount = self.resolve_amount(&app, amount)?;
        let datacap = new_amount
            .clone()
            .unwrap_or_else(|| request.allocation_amount.clone());
        let client = self.client_address(&app)?;

        let mut slot = self.session.lock().await;
        let session = slot.as_ref().ok_or(CoordinatorError::WalletNotConnected)?;
        let signer = session.active_address()?.clone();
        let engine = ProposalEngine::new(session.chain(), self.allocator.clone());

        let result = match engine.propose_checked(session, &client, &datacap).await {
            Err(ProtocolError::ConcurrentModification(reason)) => {
                // the chain saw a duplicate; report the proposal that won
                match engine.get_proposal_state(&client, &datacap).await? {
                    Some(tx) => Err(ProtocolError::AlreadyProposed { txn_id: tx.id }),
                    None => Err(ProtocolError::ConcurrentModification(reason)),
                }
            }
            other => other,
        };
        let cid = match result {
            Ok(cid) => cid,
            Err(e) => {
                reset_if_disconnected(&mut slot, &e);
                return Err(e.into());
            }
        };
        drop(slot);

        let body = ProposeRequest {
            request_id: request.id.clone(),
            new_allocation_amount: new_amount,
            owner: app.owner.clone(),
            repo: app.repo.clone(),
            signer: SignerRecord::now(&signer, &cid),
        };
        let updated = self
            .backend
            .propose(&self.target(&app), &body)
            .await
            .map_err(|e| {
                log::error!("Proposal {} for {} is on chain but unrecorded", cid, id);
                backend_failure("propose", e)
            })?;

        Ok(ActionOutcome {
            application: self.apply(&app, updated),
            message_cid: Some(cid),
            notification: None,
        })
    }

    /// Co-sign the pending proposal for the active allocation request
    pub async fn approve(&self, id: &str) -> Result<ActionOutcome, CoordinatorError> {
        let (_busy, app) = self.begin(id, Action::Approve)?;
        let request = app
            .active_request()
            .ok_or_else(|| CoordinatorError::NoActiveRequest(id.to_string()))?
            .clone();
        let client = self.client_address(&app)?;

        let mut slot = self.session.lock().await;
        let session = slot.as_ref().ok_or(CoordinatorError::WalletNotConnected)?;
        let signer = session.active_address()?.clone();
        let engine = ProposalEngine::new(session.chain(), self.allocator.clone());

        let cid = match engine
            .approve_checked(session, &client, &request.allocation_amount)
            .await
        {
            Ok(cid) => cid,
            Err(e) => {
                reset_if_disconnected(&mut slot, &e);
                return Err(e.into());
            }
        };
        drop(slot);

        let body = ApproveRequest {
            request_id: request.id.clone(),
            owner: app.owner.clone(),
            repo: app.repo.clone(),
            signer: SignerRecord::now(&signer, &cid),
        };
        let updated = self
            .backend
            .approve(&self.target(&app), &body)
            .await
            .map_err(|e| {
                log::error!("Approval {} for {} is on chain but unrecorded", cid, id);
                backend_failure("approve", e)
            })?;

        let application = self.apply(&app, updated);
        let notification = (application.state() == LifecycleState::Granted).then(|| {
            log::info!("Application {} granted {}", id, request.allocation_amount);
            GrantNotification {
                application_id: application.id.clone(),
                client_name: application.client.name.clone(),
                message_cid: cid.to_string(),
                allocation_amount: request.allocation_amount.clone(),
            }
        });
        Ok(ActionOutcome {
            application,
            message_cid: Some(cid),
            notification,
        })
    }

    // Helpers

    fn begin(&self, id: &str, action: Action) -> Result<(InFlight<'_>, Application), CoordinatorError> {
        let busy = InFlight::acquire(&self.in_flight, id)?;
        let app = self
            .application(id)
            .ok_or_else(|| CoordinatorError::UnknownApplication(id.to_string()))?;

        if !self.allocator.is_verifier(&self.github_username) {
            return Err(CoordinatorError::NotAVerifier(self.github_username.clone()));
        }
        if !app.state().permits(action) {
            return Err(CoordinatorError::ActionNotPermitted {
                action: action.to_string(),
                state: app.state().to_string(),
            });
        }
        log::debug!("{} on application {} ({})", action, id, app.state());
        Ok((busy, app))
    }

    fn target(&self, app: &Application) -> ActionTarget {
        ActionTarget::new(app, &self.github_username)
    }

    fn amount_type(&self) -> AmountType {
        lock(&self.amount_settings)
            .as_ref()
            .and_then(|s| s.allocation_amount_type.parse().ok())
            .unwrap_or(self.allocator.amount_type)
    }

    fn quantity_options(&self) -> Vec<String> {
        lock(&self.amount_settings)
            .as_ref()
            .map(|s| s.allocation_amount_quantity_options.clone())
            .filter(|options| !options.is_empty())
            .unwrap_or_else(|| self.allocator.quantity_options.clone())
    }

    /// A supplied amount is always budget-checked. Without one, manual
    /// allocation fails and fixed allocation yields `None`.
    fn resolve_amount(
        &self,
        app: &Application,
        supplied: Option<&str>,
    ) -> Result<Option<String>, CoordinatorError> {
        let supplied = supplied.map(str::trim).filter(|a| !a.is_empty());
        let manual = app.allocation_requests.len() > 1 || self.amount_type() == AmountType::Manual;
        match supplied {
            Some(amount) => Ok(Some(units::validate_within_budget(
                amount,
                &app.datacap.total_requested_amount,
            )?)),
            None if manual => Err(CoordinatorError::AmountRequired),
            None => Ok(None),
        }
    }

    fn default_trigger_amount(&self, app: &Application) -> Result<String, CoordinatorError> {
        self.quantity_options()
            .into_iter()
            .next()
            .or_else(|| Some(app.datacap.weekly_allocation.clone()).filter(|w| !w.is_empty()))
            .ok_or(CoordinatorError::AmountRequired)
    }

    fn client_address(&self, app: &Application) -> Result<Address, CoordinatorError> {
        let network: Network = self.allocator.multisig_address.network();
        Address::parse_any(network, &app.lifecycle.on_chain_address)
            .map_err(|e| ProtocolError::from(e).into())
    }

    /// Patch the store with the backend's copy, unless detached
    fn apply(&self, previous: &Application, mut updated: Application) -> Application {
        if updated.owner.is_empty() {
            updated.owner = previous.owner.clone();
        }
        if updated.repo.is_empty() {
            updated.repo = previous.repo.clone();
        }
        if self.is_live() {
            lock(&self.store).upsert(updated.clone());
        } else {
            log::debug!("Dropping result for {}: coordinator detached", updated.id);
        }
        updated
    }
}

fn backend_failure(action: &str, err: BackendError) -> CoordinatorError {
    log::error!("Backend call to {} failed: {}", action, err);
    err.into()
}

fn reset_if_disconnected(slot: &mut Option<WalletSession>, err: &ProtocolError) {
    if let ProtocolError::Wallet(wallet_err) = err {
        if wallet_err.requires_reconnect() {
            log::warn!("Wallet session dropped: {}", wallet_err);
            if let Some(session) = slot.take() {
                session.disconnect();
            }
        }
    }
}
