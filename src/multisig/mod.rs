//! Multisig proposal/approval protocol
//!
//! - `params` - actor method numbers and CBOR layouts
//! - `submit` - build, sign and push multisig messages
//! - `engine` - pending-transaction matching and the propose/approve flow

pub mod engine;
pub mod params;
pub mod submit;

pub use engine::ProposalEngine;
pub use submit::{approve_pending, multisig_evm_invoke, multisig_verify_client};
