//! commitment escrow
//!
//! custodial private payments: a sender locks funds against an opaque
//! commitment, a claim releases them once against a proof and a nullifier.
//!
//! # architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ESCROW ENGINE                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  create_transaction                                         │
//! │  ├─ validate hash / amount / recipient / balance            │
//! │  ├─ ledger: sender -> custody                               │
//! │  └─ commitments[(sender, hash)] = { amount, recipient }     │
//! │                                                              │
//! │  claim_transaction                                          │
//! │  ├─ lookup (caller, hash), nullifier unused, proof ok       │
//! │  ├─ ledger: custody -> recipient (or back to sender)        │
//! │  └─ nullifiers += nullifier, claimed = true                 │
//! │                                                              │
//! │  collaborators: Ledger (balances), ProofVerifier (proofs)   │
//! │                                                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! every public operation runs under a single lock and either applies all of
//! its effects or none of them.
//!
//! ## usage
//!
//! ```rust
//! use commitment_escrow::{Amount, Engine, EngineConfig, InMemoryLedger, NonEmptyProof, Principal};
//!
//! let alice = Principal::named("alice");
//! let bob = Principal::named("bob");
//!
//! let mut ledger = InMemoryLedger::new();
//! ledger.credit(&alice, Amount::new(5_000)).unwrap();
//!
//! let engine = Engine::new(EngineConfig::default(), ledger, NonEmptyProof);
//! engine.create_transaction(&alice, &[7u8; 32], Amount::new(1_000), Some(bob)).unwrap();
//! engine.claim_transaction(&alice, &[7u8; 32], &[0xAA], &[9u8; 32]).unwrap();
//!
//! assert_eq!(engine.balance_of(&bob), Amount::new(1_000));
//! ```

pub mod commitment;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod ledger;
pub mod nullifier;
pub mod scenario;
pub mod types;
pub mod verifier;

pub use commitment::{Commitment, CommitmentKey, CommitmentOpening, CommitmentStore};
pub use config::{ConfigError, DuplicatePolicy, EngineConfig};
pub use engine::{CommitmentEntry, Engine, EngineSnapshot};
pub use error::{EscrowError, Result};
pub use event::EscrowEvent;
pub use ledger::{InMemoryLedger, Ledger, LedgerError};
pub use nullifier::NullifierSet;
pub use scenario::{Scenario, ScenarioError, Step, StepOutcome};
pub use types::{valid_commitment_hash, valid_nullifier, Amount, CommitmentHash, Nullifier, Principal};
pub use verifier::{AttestationVerifier, NonEmptyProof, ProofVerifier, PublicInputs};

/// length of commitment hashes and nullifiers
pub const HASH_LEN: usize = 32;

/// largest proof the engine hands to a verifier by default
pub const MAX_PROOF_LEN: usize = 256;

/// domain separator for commitment hashes
pub const COMMITMENT_DOMAIN: &[u8] = b"commitment-escrow.commitment.v1";
/// domain separator for nullifiers
pub const NULLIFIER_DOMAIN: &[u8] = b"commitment-escrow.nullifier.v1";
/// domain separator for attestation proofs
pub const ATTESTATION_DOMAIN: &[u8] = b"commitment-escrow.attestation.v1";
/// blake3 derive_key context for named principals
pub const PRINCIPAL_CONTEXT: &str = "commitment-escrow 2025 principal v1";
