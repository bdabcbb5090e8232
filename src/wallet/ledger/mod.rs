//! Hardware wallet backend
//!
//! Talks to the Filecoin app over APDUs. Every address is a separate
//! device round-trip and signing blocks until the user confirms or
//! rejects on the device; there is no software cancellation.

pub mod apdu;
#[cfg(feature = "hid")]
pub mod hid;
pub mod transport;

use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use self::apdu::{
    AddressResponse, ApduCommand, AppVersion, INS_GET_ADDR_SECP256K1, INS_GET_VERSION,
    MIN_APP_VERSION,
};
use self::transport::{DeviceEnumerator, LedgerTransport};
use crate::address::Address;
use crate::chain::ChainQueryApi;
use crate::config::NetworkProfile;
use crate::error::WalletError;
use crate::message::{Signature, SignedMessage, UnsignedMessage};
use crate::signature::recover_signer;

pub const SIGN_ADVISORY: &str = "Please review and sign the transaction on your Ledger.";

/// The Filecoin app on an opened device
pub struct LedgerDevice {
    transport: Box<dyn LedgerTransport>,
}

impl LedgerDevice {
    pub fn new(transport: Box<dyn LedgerTransport>) -> Self {
        Self { transport }
    }

    async fn send(&self, command: ApduCommand) -> Result<Vec<u8>, WalletError> {
        self.transport.exchange(&command).await?.into_data()
    }

    pub async fn version(&self) -> Result<AppVersion, WalletError> {
        let data = self
            .send(ApduCommand::new(INS_GET_VERSION, 0, Vec::new()))
            .await?;
        AppVersion::parse(&data)
    }

    /// Fails with the first condition that blocks signing
    pub async fn check_app(&self) -> Result<AppVersion, WalletError> {
        let version = self.version().await?;
        if version.locked {
            return Err(WalletError::DeviceLocked);
        }
        if version.test_mode {
            return Err(WalletError::TestModeUnsupported);
        }
        if !version.is_supported() {
            let (major, minor, patch) = MIN_APP_VERSION;
            return Err(WalletError::OutdatedFirmware {
                found: version.to_version_string(),
                required: format!("{}.{}.{}", major, minor, patch),
            });
        }
        Ok(version)
    }

    pub async fn address(&self, path: &str) -> Result<AddressResponse, WalletError> {
        let data = self
            .send(ApduCommand::new(
                INS_GET_ADDR_SECP256K1,
                0,
                apdu::serialize_path(path)?,
            ))
            .await?;
        AddressResponse::parse(&data)
    }

    /// Sign serialized message bytes; returns `r || s || v`
    pub async fn sign(&self, path: &str, message: &[u8]) -> Result<[u8; 65], WalletError> {
        let commands = apdu::sign_commands(&apdu::serialize_path(path)?, message);
        let mut last = Vec::new();
        for command in commands {
            last = self.send(command).await?;
        }
        apdu::parse_signature(&last)
    }
}

pub struct LedgerWallet {
    profile: NetworkProfile,
    chain: Arc<dyn ChainQueryApi>,
    enumerator: Arc<dyn DeviceEnumerator>,
    device: Mutex<Option<LedgerDevice>>,
    page_size: u32,
    advisory: watch::Sender<Option<String>>,
}

impl LedgerWallet {
    pub fn new(
        profile: NetworkProfile,
        chain: Arc<dyn ChainQueryApi>,
        enumerator: Arc<dyn DeviceEnumerator>,
        page_size: u32,
    ) -> Self {
        let (advisory, _) = watch::channel(None);
        Self {
            profile,
            chain,
            enumerator,
            device: Mutex::new(None),
            page_size,
            advisory,
        }
    }

    /// User-facing prompts raised while waiting on the device
    pub fn subscribe_advisories(&self) -> watch::Receiver<Option<String>> {
        self.advisory.subscribe()
    }

    pub fn network(&self) -> &NetworkProfile {
        &self.profile
    }

    pub fn chain(&self) -> Arc<dyn ChainQueryApi> {
        Arc::clone(&self.chain)
    }

    pub async fn load_wallet(&mut self) -> Result<(), WalletError> {
        let transport = self.enumerator.open().await?;
        let device = LedgerDevice::new(transport);
        let version = device.check_app().await?;
        log::info!("Ledger Filecoin app {} ready", version.to_version_string());
        *self.device.lock().await = Some(device);
        Ok(())
    }

    pub async fn get_accounts(&self, start_index: u32) -> Result<Vec<Address>, WalletError> {
        let guard = self.device.lock().await;
        let device = guard.as_ref().ok_or(WalletError::NotLoaded)?;
        let network = self.profile.network();

        let mut accounts = Vec::with_capacity(self.page_size as usize);
        for index in start_index..start_index.saturating_add(self.page_size) {
            let response = device.address(&self.profile.derivation_path(index)).await?;
            let address = Address::from_bytes(network, &response.address_bytes)
                .map_err(|e| WalletError::Encoding(e.to_string()))?;
            log::debug!("Ledger account {}: {}", index, address);
            accounts.push(address);
        }
        Ok(accounts)
    }

    pub async fn sign(
        &self,
        message: &UnsignedMessage,
        account_index: u32,
    ) -> Result<SignedMessage, WalletError> {
        let guard = self.device.lock().await;
        let device = guard.as_ref().ok_or(WalletError::NotLoaded)?;

        self.advisory.send_replace(Some(SIGN_ADVISORY.to_string()));
        let result = device
            .sign(&self.profile.derivation_path(account_index), &message.to_cbor()?)
            .await;
        self.advisory.send_replace(None);
        let signature = result?;

        // Guard against the device signing with a different key than `from`
        let cid = message.cid()?;
        let signer = recover_signer(cid.to_bytes(), &signature, self.profile.network())?;
        if message.from.protocol() == 1 && signer.to_bytes() != message.from.to_bytes() {
            return Err(WalletError::Device {
                code: 0,
                message: format!("device signed as {} instead of {}", signer, message.from),
            });
        }

        Ok(SignedMessage {
            message: message.clone(),
            signature: Signature::secp256k1(signature.to_vec()),
        })
    }
}
