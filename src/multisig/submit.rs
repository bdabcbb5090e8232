//! Multisig submission primitives
//!
//! Each builds one message from the session's active account, then runs
//! nonce lookup, gas estimation, signing and mempool push, returning the
//! CID the node assigned to the signed message.

use crate::address::Address;
use crate::chain::PendingTransaction;
use crate::error::{ChainError, ProtocolError};
use crate::message::{Cid, UnsignedMessage};
use crate::wallet::WalletSession;

use super::params::{
    self, ApproveParams, ProposeParams, METHOD_ADD_VERIFIED_CLIENT, METHOD_APPROVE,
    METHOD_INVOKE_EVM, METHOD_PROPOSE,
};

/// Propose `AddVerifiedClient(client, allowance)` to the verified registry
pub async fn multisig_verify_client(
    session: &WalletSession,
    multisig: &Address,
    client: &Address,
    allowance: u128,
) -> Result<Cid, ProtocolError> {
    let network = session.network().network();
    let propose = ProposeParams {
        to: params::verified_registry(network),
        value: 0,
        method: METHOD_ADD_VERIFIED_CLIENT,
        params: params::encode_add_verified_client(client, allowance)?,
    };
    log::info!(
        "Proposing {} bytes of datacap for {} via {}",
        allowance,
        client,
        multisig
    );
    send_propose(session, multisig, &propose).await
}

/// Propose an EVM call of `calldata` on `contract`
pub async fn multisig_evm_invoke(
    session: &WalletSession,
    multisig: &Address,
    contract: &Address,
    calldata: &[u8],
) -> Result<Cid, ProtocolError> {
    let propose = ProposeParams {
        to: contract.clone(),
        value: 0,
        method: METHOD_INVOKE_EVM,
        params: params::encode_invoke_evm(calldata)?,
    };
    log::info!("Proposing contract call on {} via {}", contract, multisig);
    send_propose(session, multisig, &propose).await
}

/// Approve a pending transaction, bound to its proposer and contents
pub async fn approve_pending(
    session: &WalletSession,
    multisig: &Address,
    pending: &PendingTransaction,
) -> Result<Cid, ProtocolError> {
    let requester = pending.proposer().ok_or_else(|| {
        ProtocolError::Encoding(format!("pending transaction {} has no proposer", pending.id))
    })?;
    let approve = ApproveParams {
        txn_id: pending.id,
        proposal_hash: params::proposal_hash(
            requester,
            &pending.to,
            pending.value,
            pending.method,
            &pending.params,
        )?,
    };
    log::info!("Approving transaction {} on {}", pending.id, multisig);

    let message = UnsignedMessage::new(
        session.active_address()?.clone(),
        multisig.clone(),
        METHOD_APPROVE,
        approve.encode()?,
    );
    send(session, message).await.map_err(|e| match e {
        ProtocolError::ChainRejected(msg) => approve_rejection(pending.id, msg),
        other => other,
    })
}

async fn send_propose(
    session: &WalletSession,
    multisig: &Address,
    propose: &ProposeParams,
) -> Result<Cid, ProtocolError> {
    let message = UnsignedMessage::new(
        session.active_address()?.clone(),
        multisig.clone(),
        METHOD_PROPOSE,
        propose.encode()?,
    );
    send(session, message).await.map_err(|e| match e {
        ProtocolError::ChainRejected(msg) if is_duplicate(&msg) => {
            ProtocolError::ConcurrentModification(msg)
        }
        other => other,
    })
}

/// Nonce, gas, sign, push
async fn send(session: &WalletSession, message: UnsignedMessage) -> Result<Cid, ProtocolError> {
    let chain = session.chain();

    let nonce = chain.nonce(&message.from).await?;
    let message = chain
        .estimate_gas(UnsignedMessage { nonce, ..message })
        .await
        .map_err(gas_rejection)?;
    log::debug!(
        "Message from {} nonce {} gas limit {}",
        message.from,
        message.nonce,
        message.gas_limit
    );

    let signed = session.sign(&message).await?;
    let local_cid = signed.cid()?;
    let cid = chain.push(&signed).await?;
    if cid != local_cid {
        log::warn!("Node returned CID {} for locally computed {}", cid, local_cid);
    }
    log::info!("Pushed message {}", cid);
    Ok(cid)
}

/// Gas estimation executes the message, so actor aborts surface here
fn gas_rejection(err: ChainError) -> ChainError {
    match err {
        ChainError::Rpc { code, message } => ChainError::Rpc {
            code,
            message: format!("message would fail: {}", message),
        },
        other => other,
    }
}

fn is_duplicate(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("already") || lower.contains("duplicate")
}

fn approve_rejection(txn_id: i64, message: String) -> ProtocolError {
    let lower = message.to_lowercase();
    if lower.contains("already approved") {
        ProtocolError::AlreadyApproved { txn_id }
    } else if lower.contains("not found") || lower.contains("hash does not match") {
        ProtocolError::ConcurrentModification(message)
    } else {
        ProtocolError::ChainRejected(message)
    }
}
