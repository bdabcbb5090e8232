//! Calldata for smart-contract allocators
//!
//! Only `addVerifiedClient(bytes,uint256)` is ever sent through the
//! multisig in smart-contract mode, so this is a narrow typed pair rather
//! than a general ABI layer.

use alloy_primitives::{Bytes, U256};
use alloy_sol_types::{sol, SolCall};

use crate::error::ProtocolError;

sol! {
    function addVerifiedClient(bytes clientAddress, uint256 amount) external;
}

/// Decoded `addVerifiedClient` arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddVerifiedClient {
    /// Raw Filecoin address bytes (`[protocol] ++ payload`)
    pub client_address: Vec<u8>,
    pub amount: U256,
}

impl AddVerifiedClient {
    pub fn new(client_address: Vec<u8>, amount: u128) -> Self {
        Self {
            client_address,
            amount: U256::from(amount),
        }
    }

    /// Whether these arguments name `client_address` with exactly `amount` bytes
    pub fn matches(&self, client_address: &[u8], amount: u128) -> bool {
        self.client_address == client_address && self.amount == U256::from(amount)
    }
}

pub fn encode_add_verified_client(client_address: &[u8], amount: u128) -> Vec<u8> {
    let call = addVerifiedClientCall {
        clientAddress: Bytes::from(client_address.to_vec()),
        amount: U256::from(amount),
    };
    call.abi_encode()
}

/// Decode calldata; fails if the selector or layout does not match
pub fn decode_add_verified_client(calldata: &[u8]) -> Result<AddVerifiedClient, ProtocolError> {
    let call = addVerifiedClientCall::abi_decode(calldata, true)
        .map_err(|e| ProtocolError::Abi(e.to_string()))?;
    Ok(AddVerifiedClient {
        client_address: call.clientAddress.to_vec(),
        amount: call.amount,
    })
}
