//! Datacap Signer: Filecoin Plus allocation signing core
//!
//! This crate grants datacap to Filecoin Plus clients through an allocator's
//! multisig. A verifier connects a wallet, reviews applications served by the
//! backend API, and proposes or approves the on-chain grant.
//!
//! # Architecture
//!
//! - **Units**: Datacap quantities ("5TiB", "100GB") to and from bytes
//! - **Wallet**: Mnemonic and Ledger backends behind one session object
//! - **Multisig**: Propose/approve engine, native or through an allocator contract
//! - **Coordinator**: Lifecycle-gated verifier actions and the local application store
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use datacap_signer::{AppConfig, ApplicationCoordinator, AllocatorConfig, HttpBackend, LotusClient, WalletKind};
//!
//! let config = AppConfig::from_env();
//! let chain = Arc::new(LotusClient::from_profile(&config.network));
//! let coordinator = ApplicationCoordinator::new(
//!     Arc::new(HttpBackend::from_config(&config)),
//!     AllocatorConfig::legacy(config.network.multisig_address.clone()),
//!     "my-github-handle",
//! );
//!
//! coordinator.connect_wallet(WalletKind::from_config(&config, chain)?).await?;
//! coordinator.refresh_all().await?;
//! let outcome = coordinator.propose("application-id", None).await?;
//! ```

// Public modules
pub mod abi;
pub mod address;
pub mod chain;
pub mod config;
pub mod coordinator;
pub mod encoding;
pub mod error;
pub mod message;
pub mod multisig;
pub mod signature;
pub mod units;
pub mod wallet;

// Re-exports for convenience
pub use address::{Address, Network};
pub use chain::{ChainQueryApi, LotusClient, PendingTransaction};
pub use config::{AllocatorConfig, AmountType, AppConfig, ApplicationMode, NetworkProfile, WalletBackend};
pub use coordinator::{
    user_message, Action, ActionOutcome, Application, ApplicationCoordinator, BackendApi,
    DatacapProgress, DmobClient, GrantNotification, HttpBackend, LifecycleState,
};
pub use error::{
    AddressError, BackendError, ChainError, CoordinatorError, ErrorKind, ProtocolError, UnitError,
    WalletError,
};
pub use message::{Cid, SignedMessage, UnsignedMessage};
pub use multisig::ProposalEngine;
pub use units::{from_bytes, percentage_of, to_bytes, validate_within_budget};
pub use wallet::{LedgerWallet, MnemonicWallet, Wallet, WalletKind, WalletSession};
