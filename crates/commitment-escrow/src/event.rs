//! engine events, appended in commit order
//!
//! rejected operations emit nothing.

use serde::{Deserialize, Serialize};

use crate::types::{Amount, CommitmentHash, Nullifier, Principal};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowEvent {
    CommitmentCreated {
        sender: Principal,
        commitment_hash: CommitmentHash,
        amount: Amount,
        recipient: Option<Principal>,
    },
    CommitmentClaimed {
        sender: Principal,
        commitment_hash: CommitmentHash,
        nullifier: Nullifier,
        payee: Principal,
        amount: Amount,
    },
}
