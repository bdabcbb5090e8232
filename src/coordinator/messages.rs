use crate::error::{CoordinatorError, ErrorKind};

/// One-line guidance shown to the verifier when an action fails
pub fn user_message(err: &CoordinatorError) -> String {
    let text = match err.kind() {
        ErrorKind::DeviceLocked => "Your Ledger is locked. Please unlock your device and try again.",
        ErrorKind::WrongApplication => "Please open the Filecoin app on your Ledger.",
        ErrorKind::TestModeUnsupported => "The Filecoin app on your Ledger is in test mode. Please disable it.",
        ErrorKind::OutdatedFirmware => "Please update the Filecoin app on your Ledger.",
        ErrorKind::DeviceNotFound => "No Ledger found. Please connect your device.",
        ErrorKind::TransportDisconnected => {
            "Lost connection with your Ledger. Please unplug and replug the device, then reconnect."
        }
        ErrorKind::RejectedByUser => "The transaction was rejected on the device.",
        ErrorKind::Configuration => "This dashboard is missing configuration. Please contact the operator.",
        ErrorKind::ChainUnavailable => "The Filecoin node could not be reached. Please reload and try again.",
        ErrorKind::AlreadyProposed => "This allocation has already been proposed. Please approve it instead.",
        ErrorKind::AlreadyApproved => "You have already approved this request.",
        ErrorKind::NotYetProposed => {
            "The proposal is not on chain yet. Please wait a moment and try again."
        }
        ErrorKind::ConcurrentModification => {
            "Another signer acted on this request at the same time. Please reload and try again."
        }
        ErrorKind::InvalidAccountIndex => "The selected account is not available. Please select another.",
        ErrorKind::ActionInFlight => "An action is already in progress for this application.",
        ErrorKind::ActionNotPermitted => "This action is not available for the application right now.",
        ErrorKind::WalletNotConnected => "Please connect your wallet first.",
        ErrorKind::AmountRequired => "Please enter an allocation amount.",
        ErrorKind::ExceedsBudget | ErrorKind::Parse => return err.to_string(),
        ErrorKind::Backend => "The request could not be completed. Please try again later.",
        ErrorKind::Other => return format!("Something went wrong: {}", err),
    };
    text.to_string()
}
