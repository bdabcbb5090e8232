use async_trait::async_trait;

use super::apdu::{ApduAnswer, ApduCommand};
use crate::error::WalletError;

/// An open channel to a Ledger device
///
/// Implementations return the raw status word inside the answer; mapping
/// it to an error is the caller's job. Transport-level failures (device
/// unplugged, channel closed) surface as `TransportDisconnected`.
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    async fn exchange(&self, command: &ApduCommand) -> Result<ApduAnswer, WalletError>;
}

/// Finds an attached device and opens a transport to it
#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    async fn open(&self) -> Result<Box<dyn LedgerTransport>, WalletError>;
}
