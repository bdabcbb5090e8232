//! Hashing and secp256k1 signing utilities for Filecoin messages
//!
//! Filecoin signs the blake2b-256 digest of a message's CID bytes with a
//! recoverable ECDSA signature, serialized as `r || s || v` (65 bytes).
//! Addresses hash the uncompressed public key with blake2b-160 and carry a
//! 4-byte blake2b checksum.

use blake2::digest::consts::{U20, U32, U4};
use blake2::{Blake2b, Digest as Blake2Digest};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use crate::address::{Address, Network};
use crate::error::WalletError;

/// Signature type tag for secp256k1 in Filecoin signed messages
pub const SIG_TYPE_SECP256K1: u8 = 1;

/// Compact recoverable signature length
pub const SIGNATURE_LEN: usize = 65;

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn blake2b_160(data: &[u8]) -> [u8; 20] {
    let mut hasher = Blake2b::<U20>::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Checksum over `[protocol] ++ payload`
pub fn address_checksum(address_bytes: &[u8]) -> [u8; 4] {
    let mut hasher = Blake2b::<U4>::new();
    hasher.update(address_bytes);
    hasher.finalize().into()
}

/// Uncompressed (65-byte) public key for a secret key
pub fn uncompressed_public_key(secret_key: &SecretKey) -> [u8; 65] {
    let secp = Secp256k1::new();
    PublicKey::from_secret_key(&secp, secret_key).serialize_uncompressed()
}

/// Sign arbitrary bytes the way Filecoin wallets do: blake2b-256 then
/// recoverable ECDSA
pub fn sign_bytes(data: &[u8], secret_key: &SecretKey) -> [u8; SIGNATURE_LEN] {
    let digest = blake2b_256(data);
    let secp = Secp256k1::new();
    let message = Message::from_digest(digest);
    let signature = secp.sign_ecdsa_recoverable(&message, secret_key);
    let (recovery_id, compact) = signature.serialize_compact();

    let mut out = [0u8; SIGNATURE_LEN];
    out[..64].copy_from_slice(&compact);
    out[64] = recovery_id.to_i32() as u8;
    out
}

/// Recover the secp256k1 address that produced `signature` over `data`
pub fn recover_signer(
    data: &[u8],
    signature: &[u8],
    network: Network,
) -> Result<Address, WalletError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(WalletError::Encoding(format!(
            "signature must be {} bytes, got {}",
            SIGNATURE_LEN,
            signature.len()
        )));
    }

    let recovery_id = RecoveryId::from_i32(i32::from(signature[64]))
        .map_err(|e| WalletError::Encoding(e.to_string()))?;
    let recoverable = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|e| WalletError::Encoding(e.to_string()))?;

    let secp = Secp256k1::new();
    let message = Message::from_digest(blake2b_256(data));
    let public_key = secp
        .recover_ecdsa(&message, &recoverable)
        .map_err(|e| WalletError::Encoding(e.to_string()))?;

    Ok(Address::new_secp256k1(
        network,
        &public_key.serialize_uncompressed(),
    ))
}
