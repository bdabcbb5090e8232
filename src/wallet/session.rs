use std::sync::Arc;

use super::{Wallet, WalletKind};
use crate::address::Address;
use crate::chain::ChainQueryApi;
use crate::config::NetworkProfile;
use crate::error::WalletError;
use crate::message::{SignedMessage, UnsignedMessage};

/// A connected wallet and the accounts fetched from it so far
///
/// The account list only grows. It is never persisted; dropping the
/// session (or `disconnect`) means connecting again from scratch.
pub struct WalletSession {
    wallet: WalletKind,
    accounts: Vec<Address>,
    active_index: usize,
}

impl WalletSession {
    /// Load the wallet and fetch the first page of accounts
    pub async fn connect(mut wallet: WalletKind) -> Result<Self, WalletError> {
        wallet.load_wallet().await?;
        let accounts = wallet.get_accounts(0).await?;
        log::info!(
            "{} wallet connected with {} accounts",
            wallet.name(),
            accounts.len()
        );
        Ok(Self {
            wallet,
            accounts,
            active_index: 0,
        })
    }

    /// Append the next page; already fetched accounts are kept as-is
    pub async fn load_more_accounts(&mut self) -> Result<&[Address], WalletError> {
        let start = self.accounts.len() as u32;
        let more = self.wallet.get_accounts(start).await?;
        log::debug!("Loaded {} more accounts from index {}", more.len(), start);
        self.accounts.extend(more);
        Ok(&self.accounts)
    }

    pub fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    pub fn set_active_account_index(&mut self, index: i64) -> Result<(), WalletError> {
        match usize::try_from(index) {
            Ok(i) if i < self.accounts.len() => {
                self.active_index = i;
                Ok(())
            }
            _ => Err(WalletError::InvalidAccountIndex {
                index,
                len: self.accounts.len(),
            }),
        }
    }

    pub fn active_account_index(&self) -> usize {
        self.active_index
    }

    pub fn active_address(&self) -> Result<&Address, WalletError> {
        self.accounts
            .get(self.active_index)
            .ok_or(WalletError::InvalidAccountIndex {
                index: self.active_index as i64,
                len: self.accounts.len(),
            })
    }

    /// Sign with the active account
    pub async fn sign(&self, message: &UnsignedMessage) -> Result<SignedMessage, WalletError> {
        self.active_address()?;
        self.wallet.sign(message, self.active_index as u32).await
    }

    pub fn wallet(&self) -> &WalletKind {
        &self.wallet
    }

    pub fn network(&self) -> &NetworkProfile {
        self.wallet.network()
    }

    pub fn chain(&self) -> Arc<dyn ChainQueryApi> {
        self.wallet.chain()
    }

    pub fn disconnect(self) {
        log::info!("{} wallet disconnected", self.wallet.name());
    }
}
