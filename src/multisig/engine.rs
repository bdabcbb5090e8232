use std::sync::Arc;

use crate::abi;
use crate::address::Address;
use crate::chain::{ChainQueryApi, PendingTransaction};
use crate::config::{AllocatorConfig, ApplicationMode};
use crate::error::ProtocolError;
use crate::message::Cid;
use crate::units;
use crate::wallet::WalletSession;

use super::params::{self, METHOD_ADD_VERIFIED_CLIENT, METHOD_INVOKE_EVM};
use super::submit;

/// Two-phase propose/approve against one allocator multisig
///
/// Chain state is re-read on every call; nothing is cached between
/// attempts.
pub struct ProposalEngine {
    chain: Arc<dyn ChainQueryApi>,
    allocator: AllocatorConfig,
}

impl ProposalEngine {
    pub fn new(chain: Arc<dyn ChainQueryApi>, allocator: AllocatorConfig) -> Self {
        Self { chain, allocator }
    }

    pub fn allocator(&self) -> &AllocatorConfig {
        &self.allocator
    }

    fn contract_address(&self) -> Result<Option<&Address>, ProtocolError> {
        match &self.allocator.mode {
            ApplicationMode::Legacy => Ok(None),
            ApplicationMode::SmartContract { contract_address } => contract_address
                .as_ref()
                .map(Some)
                .ok_or(ProtocolError::MissingContractAddress),
        }
    }

    /// Latest pending transaction granting `datacap` to `client`, if any
    pub async fn get_proposal_state(
        &self,
        client: &Address,
        datacap: &str,
    ) -> Result<Option<PendingTransaction>, ProtocolError> {
        let amount = units::to_bytes(datacap)?;
        let contract = self.contract_address()?;
        let pending = self
            .chain
            .pending_transactions(&self.allocator.multisig_address)
            .await?;

        let client_bytes = client.to_bytes();
        let found = pending
            .into_iter()
            .filter(|tx| match contract {
                None => matches_legacy(tx, &client_bytes, amount),
                Some(contract) => matches_contract(tx, contract, &client_bytes, amount),
            })
            .last();

        match &found {
            Some(tx) => log::info!("Found pending transaction {} for {} / {}", tx.id, client, datacap),
            None => log::debug!("No pending transaction for {} / {}", client, datacap),
        }
        Ok(found)
    }

    /// Propose granting `datacap` to `client`
    ///
    /// Callers check `get_proposal_state` first; a proposal landing in
    /// between surfaces as `ConcurrentModification` if the chain rejects it.
    pub async fn propose(
        &self,
        session: &WalletSession,
        client: &Address,
        datacap: &str,
    ) -> Result<Cid, ProtocolError> {
        let amount = units::to_bytes(datacap)?;
        let multisig = &self.allocator.multisig_address;
        match self.contract_address()? {
            None => submit::multisig_verify_client(session, multisig, client, amount).await,
            Some(contract) => {
                let calldata = abi::encode_add_verified_client(&client.to_bytes(), amount);
                submit::multisig_evm_invoke(session, multisig, contract, &calldata).await
            }
        }
    }

    /// Approve an already pending transaction
    pub async fn approve(
        &self,
        session: &WalletSession,
        pending: &PendingTransaction,
    ) -> Result<Cid, ProtocolError> {
        let signer = session.active_address()?;
        let signer_id = self.chain.lookup_id(signer).await?;
        if pending.is_approved_by(signer)
            || signer_id.as_ref().map_or(false, |id| pending.is_approved_by(id))
        {
            log::info!("{} already approved transaction {}", signer, pending.id);
            return Err(ProtocolError::AlreadyApproved { txn_id: pending.id });
        }
        submit::approve_pending(session, &self.allocator.multisig_address, pending).await
    }

    /// Query-then-propose; fails with `AlreadyProposed` on a matching pending tx
    pub async fn propose_checked(
        &self,
        session: &WalletSession,
        client: &Address,
        datacap: &str,
    ) -> Result<Cid, ProtocolError> {
        if let Some(tx) = self.get_proposal_state(client, datacap).await? {
            log::info!("Proposal for {} already pending as {}", client, tx.id);
            return Err(ProtocolError::AlreadyProposed { txn_id: tx.id });
        }
        self.propose(session, client, datacap).await
    }

    /// Query-then-approve; fails with `NotYetProposed` when nothing matches
    pub async fn approve_checked(
        &self,
        session: &WalletSession,
        client: &Address,
        datacap: &str,
    ) -> Result<Cid, ProtocolError> {
        let pending = self
            .get_proposal_state(client, datacap)
            .await?
            .ok_or_else(|| {
                log::info!("No pending proposal for {} yet", client);
                ProtocolError::NotYetProposed
            })?;
        self.approve(session, &pending).await
    }
}

fn matches_legacy(tx: &PendingTransaction, client: &[u8], amount: u128) -> bool {
    if tx.method != METHOD_ADD_VERIFIED_CLIENT
        || tx.to.to_bytes() != params::verified_registry(tx.to.network()).to_bytes()
    {
        return false;
    }
    match params::decode_add_verified_client(&tx.params) {
        Ok((address, allowance)) => address == client && allowance == amount,
        Err(e) => {
            log::debug!("Skipping pending transaction {}: {}", tx.id, e);
            false
        }
    }
}

fn matches_contract(tx: &PendingTransaction, contract: &Address, client: &[u8], amount: u128) -> bool {
    if tx.method != METHOD_INVOKE_EVM || tx.to.to_bytes() != contract.to_bytes() {
        return false;
    }
    let decoded = params::decode_invoke_evm(&tx.params)
        .map_err(ProtocolError::from)
        .and_then(|calldata| abi::decode_add_verified_client(&calldata));
    match decoded {
        Ok(call) => call.matches(client, amount),
        Err(e) => {
            log::debug!("Skipping pending transaction {}: {}", tx.id, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Network;

    fn pending(id: i64, to: Address, method: u64, params: Vec<u8>) -> PendingTransaction {
        PendingTransaction {
            id,
            to,
            value: 0,
            method,
            params,
            approved: vec![Address::new_id(Network::Testnet, 1000)],
        }
    }

    #[test]
    fn test_legacy_match_is_exact() {
        let client = Address::new_id(Network::Testnet, 1234);
        let params = params::encode_add_verified_client(&client, 5 << 40).unwrap();
        let tx = pending(1, params::verified_registry(Network::Testnet), 4, params);

        assert!(matches_legacy(&tx, &client.to_bytes(), 5 << 40));
        assert!(!matches_legacy(&tx, &client.to_bytes(), (5 << 40) + 1));
        assert!(!matches_legacy(&tx, &Address::new_id(Network::Testnet, 1235).to_bytes(), 5 << 40));
    }

    #[test]
    fn test_contract_mode_ignores_legacy_shape() {
        let client = Address::new_id(Network::Testnet, 1234);
        let contract = Address::new_delegated(Network::Testnet, 10, vec![0xaa; 20]);
        let legacy = params::encode_add_verified_client(&client, 1 << 40).unwrap();

        let legacy_tx = pending(1, params::verified_registry(Network::Testnet), 4, legacy.clone());
        assert!(!matches_contract(&legacy_tx, &contract, &client.to_bytes(), 1 << 40));

        // right target and method but params that are not calldata
        let odd_tx = pending(2, contract.clone(), METHOD_INVOKE_EVM, legacy);
        assert!(!matches_contract(&odd_tx, &contract, &client.to_bytes(), 1 << 40));

        let calldata = abi::encode_add_verified_client(&client.to_bytes(), 1 << 40);
        let tx = pending(3, contract.clone(), METHOD_INVOKE_EVM, params::encode_invoke_evm(&calldata).unwrap());
        assert!(matches_contract(&tx, &contract, &client.to_bytes(), 1 << 40));
    }

    #[test]
    fn test_legacy_match_ignores_network_prefix() {
        let client = Address::new_id(Network::Mainnet, 77);
        let params = params::encode_add_verified_client(&client, 10).unwrap();
        let tx = pending(1, params::verified_registry(Network::Testnet), 4, params);
        assert!(matches_legacy(&tx, &client.with_network(Network::Testnet).to_bytes(), 10));
    }
}
