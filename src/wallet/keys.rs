use bip39::Mnemonic;
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::Secp256k1;
use secp256k1::SecretKey;
use std::str::FromStr;

use crate::error::WalletError;

/// BIP39 seed with BIP44 derivation of Filecoin secp256k1 keys
pub struct KeyManager {
    mnemonic: Mnemonic,
}

impl KeyManager {
    /// Import an existing mnemonic phrase
    pub fn from_mnemonic(words: &str) -> Result<Self, WalletError> {
        let mnemonic = Mnemonic::parse(words.trim())
            .map_err(|e| WalletError::Configuration(format!("Invalid mnemonic: {}", e)))?;

        Ok(Self { mnemonic })
    }

    /// Derive the secret key at a BIP44 path such as m/44'/461'/0'/0/0
    pub fn derive(&self, path: &str) -> Result<SecretKey, WalletError> {
        let secp = Secp256k1::new();
        let seed = self.mnemonic.to_seed("");

        // The network only affects xpriv serialization, not the derived keys.
        let master_key = Xpriv::new_master(bitcoin::Network::Bitcoin, &seed)
            .map_err(|e| WalletError::Derivation(e.to_string()))?;

        let derivation_path =
            DerivationPath::from_str(path).map_err(|e| WalletError::Derivation(e.to_string()))?;

        let derived = master_key
            .derive_priv(&secp, &derivation_path)
            .map_err(|e| WalletError::Derivation(e.to_string()))?;

        SecretKey::from_slice(&derived.private_key.secret_bytes())
            .map_err(|e| WalletError::Derivation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_derivation_is_deterministic() {
        let keys = KeyManager::from_mnemonic(PHRASE).unwrap();
        let a = keys.derive("m/44'/1'/0'/0/0").unwrap();
        let b = keys.derive("m/44'/1'/0'/0/0").unwrap();
        let c = keys.derive("m/44'/1'/0'/0/1").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_invalid_mnemonic_is_configuration_error() {
        let err = KeyManager::from_mnemonic("not a real seed phrase").err().unwrap();
        assert!(matches!(err, WalletError::Configuration(_)));
    }

    #[test]
    fn test_phrase_whitespace_is_trimmed() {
        let padded = KeyManager::from_mnemonic(&format!("  {}\n", PHRASE)).unwrap();
        let plain = KeyManager::from_mnemonic(PHRASE).unwrap();
        assert_eq!(
            padded.derive("m/44'/461'/0'/0/0").unwrap(),
            plain.derive("m/44'/461'/0'/0/0").unwrap()
        );
    }
}
