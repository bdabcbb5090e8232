//! Native USB HID transport

use std::sync::Arc;

use async_trait::async_trait;
use ledger_transport::APDUCommand;
use ledger_transport_hid::hidapi::HidApi;
use ledger_transport_hid::{LedgerHIDError, TransportNativeHID};

use super::apdu::{ApduAnswer, ApduCommand};
use super::transport::{DeviceEnumerator, LedgerTransport};
use crate::error::WalletError;

pub struct HidTransport {
    inner: Arc<TransportNativeHID>,
}

#[async_trait]
impl LedgerTransport for HidTransport {
    async fn exchange(&self, command: &ApduCommand) -> Result<ApduAnswer, WalletError> {
        let inner = Arc::clone(&self.inner);
        let command = APDUCommand {
            cla: command.cla,
            ins: command.ins,
            p1: command.p1,
            p2: command.p2,
            data: command.data.clone(),
        };

        // hidapi blocks until the device answers, which includes on-device review
        let answer = tokio::task::spawn_blocking(move || inner.exchange(&command))
            .await
            .map_err(|_| WalletError::TransportDisconnected)?
            .map_err(map_hid_error)?;

        Ok(ApduAnswer {
            data: answer.data().to_vec(),
            status: answer.retcode(),
        })
    }
}

/// Opens the first Ledger found on the USB bus
#[derive(Default)]
pub struct HidEnumerator;

#[async_trait]
impl DeviceEnumerator for HidEnumerator {
    async fn open(&self) -> Result<Box<dyn LedgerTransport>, WalletError> {
        let transport = tokio::task::spawn_blocking(|| {
            let api = HidApi::new().map_err(|e| {
                log::error!("Failed to initialize HID: {}", e);
                WalletError::DeviceNotFound
            })?;
            TransportNativeHID::new(&api).map_err(map_hid_error)
        })
        .await
        .map_err(|_| WalletError::DeviceNotFound)??;

        log::info!("Opened Ledger over USB HID");
        Ok(Box::new(HidTransport {
            inner: Arc::new(transport),
        }))
    }
}

fn map_hid_error(err: LedgerHIDError) -> WalletError {
    match err {
        LedgerHIDError::DeviceNotFound => WalletError::DeviceNotFound,
        other => {
            log::warn!("Ledger HID failure: {}", other);
            WalletError::TransportDisconnected
        }
    }
}
