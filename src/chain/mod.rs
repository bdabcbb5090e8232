//! Chain node access
//!
//! `ChainQueryApi` is the seam between the protocol engine and a Lotus
//! node. `LotusClient` talks JSON-RPC over HTTP; tests substitute an
//! in-process node.

mod lotus;

pub use lotus::LotusClient;

use async_trait::async_trait;

use crate::address::Address;
use crate::error::ChainError;
use crate::message::{Cid, SignedMessage, UnsignedMessage};

/// A multisig transaction awaiting further approvals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    /// Multisig-local transaction id
    pub id: i64,
    pub to: Address,
    pub value: u128,
    pub method: u64,
    pub params: Vec<u8>,
    /// Signers so far as actor ID addresses; the first entry is the proposer
    pub approved: Vec<Address>,
}

impl PendingTransaction {
    pub fn proposer(&self) -> Option<&Address> {
        self.approved.first()
    }

    /// Whether `signer` already approved, compared network-independently
    ///
    /// The actor records approvers by ID, so pass the signer's resolved ID
    /// address; see `ChainQueryApi::lookup_id`.
    pub fn is_approved_by(&self, signer: &Address) -> bool {
        let signer = signer.to_bytes();
        self.approved.iter().any(|a| a.to_bytes() == signer)
    }
}

#[async_trait]
pub trait ChainQueryApi: Send + Sync {
    async fn pending_transactions(
        &self,
        multisig: &Address,
    ) -> Result<Vec<PendingTransaction>, ChainError>;

    /// ID address of the actor behind `address`, or `None` if it has no
    /// actor on chain yet
    async fn lookup_id(&self, address: &Address) -> Result<Option<Address>, ChainError>;

    /// Next nonce for `address`, including messages already in the mempool
    async fn nonce(&self, address: &Address) -> Result<u64, ChainError>;

    /// Fill gas limit, fee cap and premium
    async fn estimate_gas(&self, message: UnsignedMessage) -> Result<UnsignedMessage, ChainError>;

    async fn push(&self, message: &SignedMessage) -> Result<Cid, ChainError>;
}
