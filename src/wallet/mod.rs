//! Wallet backends
//!
//! - `mnemonic` - hot wallet derived from a seed phrase
//! - `ledger` - hardware wallet over APDUs
//! - `keys` - BIP39/BIP44 key derivation
//! - `session` - the connected wallet plus its account list
//!
//! Backends are selected through `WalletKind` and used through the
//! `Wallet` capability trait.

pub mod keys;
pub mod ledger;
pub mod mnemonic;
pub mod session;

pub use ledger::LedgerWallet;
pub use mnemonic::MnemonicWallet;
pub use session::WalletSession;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::address::Address;
use crate::chain::ChainQueryApi;
use crate::config::{AppConfig, NetworkProfile, WalletBackend};
use crate::error::WalletError;
use crate::message::{SignedMessage, UnsignedMessage};
use self::ledger::transport::DeviceEnumerator;

#[async_trait]
pub trait Wallet: Send + Sync {
    /// Prepare the backend; hardware wallets open and verify the device here
    async fn load_wallet(&mut self) -> Result<(), WalletError>;

    /// One page of accounts starting at `start_index`
    async fn get_accounts(&self, start_index: u32) -> Result<Vec<Address>, WalletError>;

    async fn sign(
        &self,
        message: &UnsignedMessage,
        account_index: u32,
    ) -> Result<SignedMessage, WalletError>;

    fn network(&self) -> &NetworkProfile;

    fn chain(&self) -> Arc<dyn ChainQueryApi>;
}

pub enum WalletKind {
    Mnemonic(MnemonicWallet),
    Ledger(LedgerWallet),
}

impl WalletKind {
    /// Build the configured backend. Ledger needs a device enumerator,
    /// which is the native HID one when built with the `hid` feature.
    pub fn from_config(
        config: &AppConfig,
        chain: Arc<dyn ChainQueryApi>,
    ) -> Result<Self, WalletError> {
        match config.wallet_backend {
            WalletBackend::Mnemonic => Ok(WalletKind::Mnemonic(MnemonicWallet::new(
                config.network.clone(),
                chain,
                config.mnemonic.clone(),
                config.accounts_per_page,
            ))),
            #[cfg(feature = "hid")]
            WalletBackend::Ledger => Ok(Self::ledger(
                config,
                chain,
                Arc::new(ledger::hid::HidEnumerator),
            )),
            #[cfg(not(feature = "hid"))]
            WalletBackend::Ledger => Err(WalletError::Configuration(
                "Ledger support requires the `hid` feature".to_string(),
            )),
        }
    }

    pub fn ledger(
        config: &AppConfig,
        chain: Arc<dyn ChainQueryApi>,
        enumerator: Arc<dyn DeviceEnumerator>,
    ) -> Self {
        WalletKind::Ledger(LedgerWallet::new(
            config.network.clone(),
            chain,
            enumerator,
            config.accounts_per_page,
        ))
    }

    pub fn name(&self) -> &'static str {
        match self {
            WalletKind::Mnemonic(_) => "Burner",
            WalletKind::Ledger(_) => "Ledger",
        }
    }

    /// Device prompts; mnemonic wallets never raise any
    pub fn subscribe_advisories(&self) -> Option<watch::Receiver<Option<String>>> {
        match self {
            WalletKind::Mnemonic(_) => None,
            WalletKind::Ledger(w) => Some(w.subscribe_advisories()),
        }
    }
}

#[async_trait]
impl Wallet for WalletKind {
    async fn load_wallet(&mut self) -> Result<(), WalletError> {
        match self {
            WalletKind::Mnemonic(w) => w.load_wallet(),
            WalletKind::Ledger(w) => w.load_wallet().await,
        }
    }

    async fn get_accounts(&self, start_index: u32) -> Result<Vec<Address>, WalletError> {
        match self {
            WalletKind::Mnemonic(w) => w.get_accounts(start_index),
            WalletKind::Ledger(w) => w.get_accounts(start_index).await,
        }
    }

    async fn sign(
        &self,
        message: &UnsignedMessage,
        account_index: u32,
    ) -> Result<SignedMessage, WalletError> {
        match self {
            WalletKind::Mnemonic(w) => w.sign(message, account_index),
            WalletKind::Ledger(w) => w.sign(message, account_index).await,
        }
    }

    fn network(&self) -> &NetworkProfile {
        match self {
            WalletKind::Mnemonic(w) => w.network(),
            WalletKind::Ledger(w) => w.network(),
        }
    }

    fn chain(&self) -> Arc<dyn ChainQueryApi> {
        match self {
            WalletKind::Mnemonic(w) => w.chain(),
            WalletKind::Ledger(w) => w.chain(),
        }
    }
}
