//! Actor method numbers and CBOR parameter layouts

use ciborium::value::Value;

use crate::address::{Address, Network};
use crate::encoding;
use crate::error::EncodingError;
use crate::signature::blake2b_256;

pub const VERIFIED_REGISTRY_ACTOR_ID: u64 = 6;

pub const METHOD_SEND: u64 = 0;
pub const METHOD_PROPOSE: u64 = 2;
pub const METHOD_APPROVE: u64 = 3;
pub const METHOD_ADD_VERIFIED_CLIENT: u64 = 4;
/// FRC-42 hash of "InvokeEVM"
pub const METHOD_INVOKE_EVM: u64 = 3_844_450_837;

pub fn verified_registry(network: Network) -> Address {
    Address::new_id(network, VERIFIED_REGISTRY_ACTOR_ID)
}

/// `[client_address_bytes, allowance]`
pub fn encode_add_verified_client(client: &Address, allowance: u128) -> Result<Vec<u8>, EncodingError> {
    encoding::encode(&Value::Array(vec![
        encoding::bytes(client.to_bytes()),
        encoding::big(allowance),
    ]))
}

/// Raw client address bytes and allowance
pub fn decode_add_verified_client(params: &[u8]) -> Result<(Vec<u8>, u128), EncodingError> {
    let mut items = encoding::tuple(encoding::decode(params)?, 2)?.into_iter();
    let client = items.next().map(encoding::as_bytes).transpose()?;
    let allowance = items.next().map(encoding::as_big).transpose()?;
    match (client, allowance) {
        (Some(client), Some(allowance)) => Ok((client, allowance)),
        _ => Err(EncodingError::new("incomplete AddVerifiedClient params")),
    }
}

/// InvokeEVM takes the calldata as a single CBOR byte string
pub fn encode_invoke_evm(calldata: &[u8]) -> Result<Vec<u8>, EncodingError> {
    encoding::encode(&encoding::bytes(calldata.to_vec()))
}

pub fn decode_invoke_evm(params: &[u8]) -> Result<Vec<u8>, EncodingError> {
    encoding::as_bytes(encoding::decode(params)?)
}

/// Multisig `Propose` arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposeParams {
    pub to: Address,
    pub value: u128,
    pub method: u64,
    pub params: Vec<u8>,
}

impl ProposeParams {
    pub fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        encoding::encode(&Value::Array(vec![
            encoding::bytes(self.to.to_bytes()),
            encoding::big(self.value),
            encoding::uint(self.method),
            encoding::bytes(self.params.clone()),
        ]))
    }

    pub fn decode(network: Network, params: &[u8]) -> Result<Self, EncodingError> {
        let items = encoding::tuple(encoding::decode(params)?, 4)?;
        let method = encoding::as_u64(&items[2])?;
        let mut items = items.into_iter();
        let (Some(to), Some(value), Some(_), Some(inner)) =
            (items.next(), items.next(), items.next(), items.next())
        else {
            return Err(EncodingError::new("incomplete Propose params"));
        };
        let to = Address::from_bytes(network, &encoding::as_bytes(to)?)
            .map_err(|e| EncodingError::new(e.to_string()))?;
        Ok(Self {
            to,
            value: encoding::as_big(value)?,
            method,
            params: encoding::as_bytes(inner)?,
        })
    }
}

/// Multisig `Approve` arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApproveParams {
    pub txn_id: i64,
    pub proposal_hash: [u8; 32],
}

impl ApproveParams {
    pub fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        encoding::encode(&Value::Array(vec![
            encoding::int(self.txn_id),
            encoding::bytes(self.proposal_hash.to_vec()),
        ]))
    }

    pub fn decode(params: &[u8]) -> Result<Self, EncodingError> {
        let items = encoding::tuple(encoding::decode(params)?, 2)?;
        let txn_id = encoding::as_i64(&items[0])?;
        let hash = encoding::as_bytes(items[1].clone())?;
        let proposal_hash: [u8; 32] = hash
            .try_into()
            .map_err(|_| EncodingError::new("proposal hash must be 32 bytes"))?;
        Ok(Self {
            txn_id,
            proposal_hash,
        })
    }
}

/// Hash binding an approval to the exact pending transaction it approves
pub fn proposal_hash(
    requester: &Address,
    to: &Address,
    value: u128,
    method: u64,
    params: &[u8],
) -> Result<[u8; 32], EncodingError> {
    let data = encoding::encode(&Value::Array(vec![
        encoding::bytes(requester.to_bytes()),
        encoding::bytes(to.to_bytes()),
        encoding::big(value),
        encoding::uint(method),
        encoding::bytes(params.to_vec()),
    ]))?;
    Ok(blake2b_256(&data))
}
