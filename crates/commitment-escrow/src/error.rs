//! error types for the escrow engine

use thiserror::Error;

use crate::ledger::LedgerError;

pub type Result<T> = std::result::Result<T, EscrowError>;

/// every way a create or claim can be rejected
///
/// a rejected operation has no effects: no transfer, no record written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscrowError {
    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("invalid proof")]
    InvalidProof,

    #[error("nullifier already used or commitment already claimed")]
    AlreadyClaimed,

    #[error("unauthorized")]
    Unauthorized,

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("commitment hash must be 32 bytes")]
    InvalidCommitmentHash,

    #[error("nullifier must be 32 bytes")]
    InvalidNullifier,

    /// only returned under `DuplicatePolicy::Reject`
    #[error("commitment already exists for this sender")]
    DuplicateCommitment,

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl EscrowError {
    /// stable numeric code returned to callers
    pub fn code(&self) -> u32 {
        match self {
            EscrowError::InsufficientFunds => 100,
            EscrowError::InvalidProof => 101,
            EscrowError::AlreadyClaimed => 102,
            EscrowError::Unauthorized => 103,
            EscrowError::InvalidAmount => 104,
            EscrowError::InvalidCommitmentHash => 105,
            EscrowError::InvalidNullifier => 106,
            EscrowError::DuplicateCommitment => 107,
            EscrowError::Ledger(_) => 200,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EscrowError::InsufficientFunds => "InsufficientFunds",
            EscrowError::InvalidProof => "InvalidProof",
            EscrowError::AlreadyClaimed => "AlreadyClaimed",
            EscrowError::Unauthorized => "Unauthorized",
            EscrowError::InvalidAmount => "InvalidAmount",
            EscrowError::InvalidCommitmentHash => "InvalidCommitmentHash",
            EscrowError::InvalidNullifier => "InvalidNullifier",
            EscrowError::DuplicateCommitment => "DuplicateCommitment",
            EscrowError::Ledger(_) => "Ledger",
        }
    }
}
