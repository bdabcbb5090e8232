/// Signer configuration from environment variables
///
/// Selects the Filecoin network profile, the wallet backend and the
/// backend API endpoint. Defaults to a local devnet.

use std::env;
use std::fmt;
use std::str::FromStr;

use crate::address::{Address, Network};

/// Accounts fetched per "load more" page
pub const DEFAULT_ACCOUNTS_PER_PAGE: u32 = 5;

const DEFAULT_BACKEND_URL: &str = "http://localhost:8080";

const DEFAULT_DMOB_API_URL: &str = "https://api.datacapstats.io/api";

/// A Lotus node plus the root-key-holder multisig it governs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkProfile {
    pub name: String,
    /// BIP44 coin type (461 mainnet, 1 test networks)
    pub coin_type: u32,
    pub node_url: String,
    pub node_token: Option<String>,
    pub multisig_address: Address,
    pub approval_threshold: u32,
    pub notary_repo: String,
    pub notary_owner: String,
}

impl NetworkProfile {
    pub fn mainnet() -> Self {
        Self {
            name: "mainnet".to_string(),
            coin_type: 461,
            node_url: "https://api.node.glif.io/rpc/v1".to_string(),
            node_token: None,
            multisig_address: Address::new_id(Network::Mainnet, 80),
            approval_threshold: 2,
            notary_repo: "notary-governance".to_string(),
            notary_owner: "filecoin-project".to_string(),
        }
    }

    pub fn calibration() -> Self {
        Self {
            name: "calibration".to_string(),
            coin_type: 1,
            node_url: "https://api.calibration.node.glif.io/rpc/v1".to_string(),
            node_token: None,
            multisig_address: Address::new_id(Network::Testnet, 80),
            approval_threshold: 1,
            notary_repo: "filecoin-notaries-onboarding".to_string(),
            notary_owner: "filecoin-project".to_string(),
        }
    }

    pub fn localhost() -> Self {
        Self {
            name: "localhost".to_string(),
            coin_type: 1,
            node_url: "http://127.0.0.1:1234/rpc/v1".to_string(),
            node_token: None,
            multisig_address: Address::new_id(Network::Testnet, 80),
            approval_threshold: 1,
            notary_repo: "filecoin-notaries-onboarding".to_string(),
            notary_owner: "keyko-io".to_string(),
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mainnet" => Some(Self::mainnet()),
            "calibration" | "calibnet" => Some(Self::calibration()),
            "localhost" | "local" | "" => Some(Self::localhost()),
            _ => None,
        }
    }

    pub fn is_testnet(&self) -> bool {
        self.coin_type != 461
    }

    /// Address prefix network for accounts derived on this profile
    pub fn network(&self) -> Network {
        if self.is_testnet() {
            Network::Testnet
        } else {
            Network::Mainnet
        }
    }

    /// BIP44 path of account `index`: m/44'/<coin>'/0'/0/<index>
    pub fn derivation_path(&self, index: u32) -> String {
        format!("m/44'/{}'/0'/0/{}", self.coin_type, index)
    }

    pub fn with_node(mut self, url: impl Into<String>, token: Option<String>) -> Self {
        self.node_url = url.into();
        self.node_token = token;
        self
    }
}

/// Which wallet backend a session connects with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletBackend {
    Mnemonic,
    Ledger,
}

impl FromStr for WalletBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mnemonic" | "burner" | "burnerwallet" => Ok(WalletBackend::Mnemonic),
            "ledger" | "ledgerwallet" => Ok(WalletBackend::Ledger),
            other => Err(format!("unknown wallet kind '{}'", other)),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub network: NetworkProfile,
    pub wallet_backend: WalletBackend,
    /// Seed phrase for the mnemonic backend
    pub mnemonic: Option<String>,
    pub accounts_per_page: u32,
    pub backend_url: String,
    pub backend_token: Option<String>,
    /// DataCap stats API for client allowances
    pub dmob_api_url: String,
    pub dmob_api_key: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `FILPLUS_NETWORK`: "mainnet", "calibration" or "localhost" (default)
    /// - `LOTUS_NODE_URL` / `LOTUS_NODE_TOKEN`: override the profile's node
    /// - `WALLET_KIND`: "mnemonic" (default) or "ledger"
    /// - `WALLET_MNEMONIC`: seed phrase for the mnemonic backend
    /// - `WALLET_ACCOUNTS_PER_PAGE`: accounts per "load more" page (default 5)
    /// - `BACKEND_API_URL` / `BACKEND_API_TOKEN`: backend REST API
    /// - `DMOB_API_URL` / `DMOB_API_KEY`: DataCap stats API for allowances
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let network_name = env::var("FILPLUS_NETWORK").unwrap_or_default();
        let mut network = NetworkProfile::by_name(&network_name).unwrap_or_else(|| {
            log::warn!("Unknown network '{}', defaulting to localhost", network_name);
            NetworkProfile::localhost()
        });
        log::info!("Using {} network", network.name);

        if let Ok(url) = env::var("LOTUS_NODE_URL") {
            network.node_url = url;
        }
        if let Ok(token) = env::var("LOTUS_NODE_TOKEN") {
            network.node_token = Some(token).filter(|t| !t.is_empty());
        }
        log::info!("Lotus node: {}", network.node_url);

        let wallet_backend = match env::var("WALLET_KIND") {
            Ok(kind) => kind.parse().unwrap_or_else(|e| {
                log::warn!("{}, defaulting to mnemonic", e);
                WalletBackend::Mnemonic
            }),
            Err(_) => WalletBackend::Mnemonic,
        };

        let mnemonic = env::var("WALLET_MNEMONIC").ok().filter(|m| !m.trim().is_empty());

        let accounts_per_page = match env::var("WALLET_ACCOUNTS_PER_PAGE") {
            Ok(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    log::warn!("Invalid WALLET_ACCOUNTS_PER_PAGE '{}', using {}", raw, DEFAULT_ACCOUNTS_PER_PAGE);
                    DEFAULT_ACCOUNTS_PER_PAGE
                }
            },
            Err(_) => DEFAULT_ACCOUNTS_PER_PAGE,
        };

        let backend_url =
            env::var("BACKEND_API_URL").unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());
        log::info!("Backend API: {}", backend_url);
        let backend_token = env::var("BACKEND_API_TOKEN").ok().filter(|t| !t.is_empty());

        let dmob_api_url =
            env::var("DMOB_API_URL").unwrap_or_else(|_| DEFAULT_DMOB_API_URL.to_string());
        let dmob_api_key = env::var("DMOB_API_KEY").ok().filter(|k| !k.is_empty());
        if dmob_api_key.is_none() {
            log::warn!("DMOB_API_KEY not set, allowance lookups may be refused");
        }

        Self {
            network,
            wallet_backend,
            mnemonic,
            accounts_per_page,
            backend_url,
            backend_token,
            dmob_api_url,
            dmob_api_key,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: NetworkProfile::localhost(),
            wallet_backend: WalletBackend::Mnemonic,
            mnemonic: None,
            accounts_per_page: DEFAULT_ACCOUNTS_PER_PAGE,
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            backend_token: None,
            dmob_api_url: DEFAULT_DMOB_API_URL.to_string(),
            dmob_api_key: None,
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("network", &self.network.name)
            .field("node_url", &self.network.node_url)
            .field("wallet_backend", &self.wallet_backend)
            .field("mnemonic", &self.mnemonic.as_ref().map(|_| "<redacted>"))
            .field("accounts_per_page", &self.accounts_per_page)
            .field("backend_url", &self.backend_url)
            .field("dmob_api_url", &self.dmob_api_url)
            .finish()
    }
}

/// Calling convention the allocator's multisig uses to grant datacap
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplicationMode {
    /// Multisig calls the verified registry actor directly
    Legacy,
    /// Multisig invokes `addVerifiedClient` on an allocator contract
    SmartContract { contract_address: Option<Address> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AmountType {
    Fixed,
    Manual,
}

impl FromStr for AmountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(AmountType::Fixed),
            "manual" => Ok(AmountType::Manual),
            other => Err(format!("unknown allocation amount type '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocatorConfig {
    pub multisig_address: Address,
    pub mode: ApplicationMode,
    pub amount_type: AmountType,
    /// Preset amounts offered for fixed allocation, e.g. ["1TiB", "5TiB"]
    pub quantity_options: Vec<String>,
    /// GitHub handles allowed to act as verifier; empty means unrestricted
    pub verifiers: Vec<String>,
}

impl AllocatorConfig {
    pub fn legacy(multisig_address: Address) -> Self {
        Self {
            multisig_address,
            mode: ApplicationMode::Legacy,
            amount_type: AmountType::Fixed,
            quantity_options: Vec::new(),
            verifiers: Vec::new(),
        }
    }

    pub fn smart_contract(multisig_address: Address, contract_address: Address) -> Self {
        Self {
            multisig_address,
            mode: ApplicationMode::SmartContract {
                contract_address: Some(contract_address),
            },
            amount_type: AmountType::Fixed,
            quantity_options: Vec::new(),
            verifiers: Vec::new(),
        }
    }

    pub fn with_amount_type(mut self, amount_type: AmountType) -> Self {
        self.amount_type = amount_type;
        self
    }

    pub fn with_quantity_options(mut self, options: Vec<String>) -> Self {
        self.quantity_options = options;
        self
    }

    pub fn with_verifiers(mut self, verifiers: Vec<String>) -> Self {
        self.verifiers = verifiers;
        self
    }

    pub fn is_verifier(&self, github_username: &str) -> bool {
        self.verifiers.is_empty()
            || self
                .verifiers
                .iter()
                .any(|v| v.eq_ignore_ascii_case(github_username))
    }
}
