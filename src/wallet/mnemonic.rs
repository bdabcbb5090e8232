use std::sync::Arc;

use super::keys::KeyManager;
use crate::address::Address;
use crate::chain::ChainQueryApi;
use crate::config::NetworkProfile;
use crate::error::WalletError;
use crate::message::{Signature, SignedMessage, UnsignedMessage};
use crate::signature::{sign_bytes, uncompressed_public_key};

/// Hot wallet deriving every account from a seed phrase
pub struct MnemonicWallet {
    profile: NetworkProfile,
    chain: Arc<dyn ChainQueryApi>,
    mnemonic: Option<String>,
    keys: Option<KeyManager>,
    page_size: u32,
}

impl MnemonicWallet {
    pub fn new(
        profile: NetworkProfile,
        chain: Arc<dyn ChainQueryApi>,
        mnemonic: Option<String>,
        page_size: u32,
    ) -> Self {
        Self {
            profile,
            chain,
            mnemonic,
            keys: None,
            page_size,
        }
    }

    pub fn network(&self) -> &NetworkProfile {
        &self.profile
    }

    pub fn chain(&self) -> Arc<dyn ChainQueryApi> {
        Arc::clone(&self.chain)
    }

    pub fn load_wallet(&mut self) -> Result<(), WalletError> {
        let words = self.mnemonic.as_deref().ok_or_else(|| {
            WalletError::Configuration(
                "No mnemonic provided. Please ensure the WALLET_MNEMONIC environment variable is set."
                    .to_string(),
            )
        })?;
        self.keys = Some(KeyManager::from_mnemonic(words)?);
        log::info!("Mnemonic wallet loaded for {}", self.profile.name);
        Ok(())
    }

    fn keys(&self) -> Result<&KeyManager, WalletError> {
        self.keys.as_ref().ok_or(WalletError::NotLoaded)
    }

    pub fn account(&self, index: u32) -> Result<Address, WalletError> {
        let secret_key = self.keys()?.derive(&self.profile.derivation_path(index))?;
        Ok(Address::new_secp256k1(
            self.profile.network(),
            &uncompressed_public_key(&secret_key),
        ))
    }

    pub fn get_accounts(&self, start_index: u32) -> Result<Vec<Address>, WalletError> {
        (start_index..start_index.saturating_add(self.page_size))
            .map(|index| self.account(index))
            .collect()
    }

    pub fn sign(
        &self,
        message: &UnsignedMessage,
        account_index: u32,
    ) -> Result<SignedMessage, WalletError> {
        let secret_key = self
            .keys()?
            .derive(&self.profile.derivation_path(account_index))?;
        let cid = message.cid()?;
        let signature = sign_bytes(cid.to_bytes(), &secret_key);
        log::debug!("Signed message {} with account {}", cid, account_index);

        Ok(SignedMessage {
            message: message.clone(),
            signature: Signature::secp256k1(signature.to_vec()),
        })
    }
}
