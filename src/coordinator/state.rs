use std::fmt;

use super::application::LifecycleState;

/// State-changing actions a verifier can take on an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Trigger,
    ApproveChanges,
    Decline,
    RequestAdditionalInfo,
    Propose,
    Approve,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Trigger => "trigger",
            Action::ApproveChanges => "approve_changes",
            Action::Decline => "decline",
            Action::RequestAdditionalInfo => "request_additional_info",
            Action::Propose => "propose",
            Action::Approve => "approve",
        }
    }

    /// Whether the action signs a multisig message
    pub fn needs_wallet(&self) -> bool {
        matches!(self, Action::Propose | Action::Approve)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl LifecycleState {
    /// Transition table: which action each state accepts
    pub fn permits(&self, action: Action) -> bool {
        use LifecycleState::*;
        match self {
            Submitted | AdditionalInfoRequired | AdditionalInfoSubmitted => matches!(
                action,
                Action::Trigger | Action::Decline | Action::RequestAdditionalInfo
            ),
            ChangesRequested => action == Action::ApproveChanges,
            ReadyToSign => action == Action::Propose,
            StartSignDatacap => action == Action::Approve,
            Granted | TotalDatacapReached | Declined | Error | Unknown => false,
        }
    }

    /// Human-readable label for list views
    pub fn label(&self) -> &'static str {
        use LifecycleState::*;
        match self {
            Submitted => "Pending Verifier Review",
            AdditionalInfoRequired => "Additional info required",
            AdditionalInfoSubmitted => "Additional info submitted",
            ChangesRequested => "Changes requested",
            ReadyToSign => "Ready to sign",
            StartSignDatacap => "Start sign datacap",
            Granted => "Granted",
            TotalDatacapReached => "Total datacap reached",
            Declined => "Declined",
            Error => "Error",
            Unknown => "Unknown",
        }
    }
}
