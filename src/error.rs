//! Error types for datacap signing operations
//!
//! One enum per layer. Lower layers convert into higher ones through
//! `#[from]` so `?` carries the original kind all the way up to the
//! coordinator, where it is mapped to user guidance.

use thiserror::Error;

/// Datacap quantity parsing and budget checks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitError {
    #[error("Cannot parse datacap quantity: {0}")]
    Parse(String),

    #[error("Requested {requested} exceeds the available budget of {budget}")]
    ExceedsBudget { requested: String, budget: String },

    #[error("Datacap quantity out of range: {0}")]
    Overflow(String),
}

/// Filecoin address decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid address: {0}")]
    Invalid(String),

    #[error("Unknown address protocol: {0}")]
    UnknownProtocol(u8),

    #[error("Address checksum mismatch: {0}")]
    Checksum(String),
}

/// CBOR / wire encoding failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EncodingError(pub String);

impl EncodingError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Wallet backends (mnemonic and hardware)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("Wallet configuration error: {0}")]
    Configuration(String),

    #[error("Ledger locked. Please, unlock it.")]
    DeviceLocked,

    #[error("Filecoin application is not open in Ledger. Please, open it.")]
    WrongApplication,

    #[error("Filecoin app in test mode.")]
    TestModeUnsupported,

    #[error("Please update Filecoin app on Ledger (found {found}, need {required}).")]
    OutdatedFirmware { found: String, required: String },

    #[error("Device not found")]
    DeviceNotFound,

    #[error("Lost connection with Ledger. Please unplug and replug device.")]
    TransportDisconnected,

    #[error("Transaction rejected on device")]
    RejectedByUser,

    #[error("Invalid account index {index} (accounts loaded: {len})")]
    InvalidAccountIndex { index: i64, len: usize },

    #[error("Wallet not loaded")]
    NotLoaded,

    #[error("Device error 0x{code:04x}: {message}")]
    Device { code: u16, message: String },

    #[error("Key derivation failed: {0}")]
    Derivation(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl WalletError {
    /// Errors after which the session must be re-established before use
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            WalletError::DeviceLocked | WalletError::TransportDisconnected
        )
    }
}

impl From<EncodingError> for WalletError {
    fn from(err: EncodingError) -> Self {
        WalletError::Encoding(err.0)
    }
}

/// Chain node queries and submissions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Chain node unavailable: {0}")]
    Unavailable(String),

    #[error("Chain RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Failed to decode chain response: {0}")]
    Decode(String),
}

impl From<EncodingError> for ChainError {
    fn from(err: EncodingError) -> Self {
        ChainError::Decode(err.0)
    }
}

/// Multisig propose/approve protocol
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Chain node unavailable, please reload: {0}")]
    ChainUnavailable(String),

    #[error("Chain rejected the message: {0}")]
    ChainRejected(String),

    #[error("A matching proposal is already pending (transaction {txn_id})")]
    AlreadyProposed { txn_id: i64 },

    #[error("This account has already approved transaction {txn_id}")]
    AlreadyApproved { txn_id: i64 },

    #[error("No pending proposal found yet; it may have just been submitted, please wait")]
    NotYetProposed,

    #[error("Pending transactions changed while submitting: {0}")]
    ConcurrentModification(String),

    #[error("Smart-contract mode requires a contract address")]
    MissingContractAddress,

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Units(#[from] UnitError),

    #[error(transparent)]
    Address(#[from] AddressError),
}

impl From<ChainError> for ProtocolError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Unavailable(msg) => ProtocolError::ChainUnavailable(msg),
            ChainError::Decode(msg) => ProtocolError::ChainUnavailable(msg),
            ChainError::Rpc { message, .. } => ProtocolError::ChainRejected(message),
        }
    }
}

impl From<EncodingError> for ProtocolError {
    fn from(err: EncodingError) -> Self {
        ProtocolError::Encoding(err.0)
    }
}

/// Backend REST API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend request failed: {0}")]
    Http(String),

    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Received invalid data from the API: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Http(err.to_string())
    }
}

/// Application action coordinator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Another action is already in progress for application {0}")]
    ActionInFlight(String),

    #[error("Action {action} is not permitted in state {state}")]
    ActionNotPermitted { action: String, state: String },

    #[error("{0} is not a verifier for this allocator")]
    NotAVerifier(String),

    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("An allocation amount must be entered before continuing")]
    AmountRequired,

    #[error("Application {0} has no active allocation request")]
    NoActiveRequest(String),

    #[error("Unknown application {0}")]
    UnknownApplication(String),

    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Units(#[from] UnitError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Stable discriminant for presentation-layer mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    ExceedsBudget,
    Configuration,
    DeviceLocked,
    WrongApplication,
    TestModeUnsupported,
    OutdatedFirmware,
    DeviceNotFound,
    TransportDisconnected,
    RejectedByUser,
    ChainUnavailable,
    AlreadyProposed,
    AlreadyApproved,
    NotYetProposed,
    ConcurrentModification,
    InvalidAccountIndex,
    ActionInFlight,
    ActionNotPermitted,
    WalletNotConnected,
    AmountRequired,
    Backend,
    Other,
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::Configuration(_) => ErrorKind::Configuration,
            WalletError::DeviceLocked => ErrorKind::DeviceLocked,
            WalletError::WrongApplication => ErrorKind::WrongApplication,
            WalletError::TestModeUnsupported => ErrorKind::TestModeUnsupported,
            WalletError::OutdatedFirmware { .. } => ErrorKind::OutdatedFirmware,
            WalletError::DeviceNotFound => ErrorKind::DeviceNotFound,
            WalletError::TransportDisconnected => ErrorKind::TransportDisconnected,
            WalletError::RejectedByUser => ErrorKind::RejectedByUser,
            WalletError::InvalidAccountIndex { .. } => ErrorKind::InvalidAccountIndex,
            WalletError::NotLoaded => ErrorKind::WalletNotConnected,
            _ => ErrorKind::Other,
        }
    }
}

impl UnitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UnitError::ExceedsBudget { .. } => ErrorKind::ExceedsBudget,
            UnitError::Parse(_) | UnitError::Overflow(_) => ErrorKind::Parse,
        }
    }
}

impl ProtocolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::ChainUnavailable(_) => ErrorKind::ChainUnavailable,
            ProtocolError::AlreadyProposed { .. } => ErrorKind::AlreadyProposed,
            ProtocolError::AlreadyApproved { .. } => ErrorKind::AlreadyApproved,
            ProtocolError::NotYetProposed => ErrorKind::NotYetProposed,
            ProtocolError::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
            ProtocolError::Wallet(e) => e.kind(),
            ProtocolError::Units(e) => e.kind(),
            _ => ErrorKind::Other,
        }
    }
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::ActionInFlight(_) => ErrorKind::ActionInFlight,
            CoordinatorError::ActionNotPermitted { .. } | CoordinatorError::NotAVerifier(_) => {
                ErrorKind::ActionNotPermitted
            }
            CoordinatorError::WalletNotConnected => ErrorKind::WalletNotConnected,
            CoordinatorError::AmountRequired => ErrorKind::AmountRequired,
            CoordinatorError::Protocol(e) => e.kind(),
            CoordinatorError::Wallet(e) => e.kind(),
            CoordinatorError::Units(e) => e.kind(),
            CoordinatorError::Backend(_) => ErrorKind::Backend,
            CoordinatorError::NotConfigured(_) => ErrorKind::Configuration,
            CoordinatorError::NoActiveRequest(_) | CoordinatorError::UnknownApplication(_) => {
                ErrorKind::Other
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_error_maps_to_protocol() {
        let err: ProtocolError = ChainError::Unavailable("connection refused".into()).into();
        assert_eq!(err.kind(), ErrorKind::ChainUnavailable);
    }

    #[test]
    fn test_wallet_kind_survives_wrapping() {
        let err: CoordinatorError = ProtocolError::from(WalletError::DeviceLocked).into();
        assert_eq!(err.kind(), ErrorKind::DeviceLocked);
        assert!(WalletError::TransportDisconnected.requires_reconnect());
        assert!(!WalletError::RejectedByUser.requires_reconnect());
    }
}
