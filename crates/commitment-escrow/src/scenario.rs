//! toml-scripted operation sequences
//!
//! a scenario funds some accounts and then replays creates, claims and
//! inbound transfers against an engine, recording the result of each step.
//!
//! ```toml
//! [balances]
//! alice = 5000
//!
//! [[step]]
//! op = "create"
//! sender = "alice"
//! commitment_hash = "1111111111111111111111111111111111111111111111111111111111111111"
//! amount = 1000
//! recipient = "bob"
//!
//! [[step]]
//! op = "claim"
//! caller = "alice"
//! commitment_hash = "1111111111111111111111111111111111111111111111111111111111111111"
//! proof = "aa"
//! nullifier = "2222222222222222222222222222222222222222222222222222222222222222"
//! expect = "ok"
//! ```
//!
//! principals are names or 64 hex chars. byte fields are hex of any length
//! so malformed inputs can be scripted too.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::EscrowError;
use crate::ledger::{InMemoryLedger, Ledger, LedgerError};
use crate::types::{Amount, Principal};
use crate::verifier::ProofVerifier;

/// values accepted in a step's `expect` field
pub const EXPECTATIONS: &[&str] = &[
    "ok",
    "InsufficientFunds",
    "InvalidProof",
    "AlreadyClaimed",
    "Unauthorized",
    "InvalidAmount",
    "InvalidCommitmentHash",
    "InvalidNullifier",
    "DuplicateCommitment",
    "Ledger",
];

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("step {step}: field `{field}` is not valid hex: {source}")]
    Hex {
        step: usize,
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("step {step}: empty principal in `{field}`")]
    EmptyPrincipal { step: usize, field: &'static str },

    #[error("empty principal in balances")]
    EmptyBalanceAccount,

    #[error("step {step}: unknown expectation `{value}`")]
    UnknownExpectation { step: usize, value: String },

    #[error("funding {account} failed: {source}")]
    Funding {
        account: String,
        #[source]
        source: LedgerError,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Create {
        sender: String,
        commitment_hash: String,
        amount: u64,
        #[serde(default)]
        recipient: Option<String>,
        #[serde(default)]
        expect: Option<String>,
    },
    Claim {
        caller: String,
        commitment_hash: String,
        #[serde(default)]
        proof: String,
        nullifier: String,
        #[serde(default)]
        expect: Option<String>,
    },
    Receive {
        #[serde(default)]
        expect: Option<String>,
    },
}

impl Step {
    pub fn op(&self) -> &'static str {
        match self {
            Step::Create { .. } => "create",
            Step::Claim { .. } => "claim",
            Step::Receive { .. } => "receive",
        }
    }

    pub fn expect(&self) -> Option<&str> {
        match self {
            Step::Create { expect, .. } | Step::Claim { expect, .. } | Step::Receive { expect } => {
                expect.as_deref()
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// initial balances, minted before the first step
    #[serde(default)]
    pub balances: BTreeMap<String, u64>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// result of one replayed step
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepOutcome {
    pub index: usize,
    pub op: &'static str,
    pub result: Result<(), EscrowError>,
    pub expect: Option<String>,
}

impl StepOutcome {
    /// `ok` or the error name
    pub fn outcome_name(&self) -> &'static str {
        match &self.result {
            Ok(()) => "ok",
            Err(e) => e.name(),
        }
    }

    /// steps without an expectation always match
    pub fn matches_expectation(&self) -> bool {
        self.expect
            .as_deref()
            .map_or(true, |want| want == self.outcome_name())
    }
}

impl Scenario {
    pub fn from_toml_str(s: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = toml::from_str(s)?;
        for (index, step) in scenario.steps.iter().enumerate() {
            if let Some(value) = step.expect() {
                if !EXPECTATIONS.contains(&value) {
                    return Err(ScenarioError::UnknownExpectation {
                        step: index,
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(scenario)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// in-memory ledger holding the scenario's initial balances
    pub fn genesis_ledger(&self) -> Result<InMemoryLedger, ScenarioError> {
        let mut ledger = InMemoryLedger::new();
        for (name, amount) in &self.balances {
            let account: Principal = name
                .parse()
                .map_err(|_| ScenarioError::EmptyBalanceAccount)?;
            ledger
                .credit(&account, Amount::from(*amount))
                .map_err(|source| ScenarioError::Funding {
                    account: name.clone(),
                    source,
                })?;
        }
        Ok(ledger)
    }

    /// fresh engine over the genesis ledger
    pub fn build_engine<V: ProofVerifier>(
        &self,
        config: EngineConfig,
        verifier: V,
    ) -> Result<Engine<InMemoryLedger, V>, ScenarioError> {
        Ok(Engine::new(config, self.genesis_ledger()?, verifier))
    }

    /// resolve every step's principals and byte fields
    ///
    /// nothing touches an engine until the whole script has parsed
    fn prepare(&self) -> Result<Vec<Action>, ScenarioError> {
        let mut actions = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            let action = match step {
                Step::Create {
                    sender,
                    commitment_hash,
                    amount,
                    recipient,
                    ..
                } => Action::Create {
                    sender: parse_principal(index, "sender", sender)?,
                    commitment_hash: parse_hex(index, "commitment_hash", commitment_hash)?,
                    amount: Amount::from(*amount),
                    recipient: recipient
                        .as_deref()
                        .map(|r| parse_principal(index, "recipient", r))
                        .transpose()?,
                },
                Step::Claim {
                    caller,
                    commitment_hash,
                    proof,
                    nullifier,
                    ..
                } => Action::Claim {
                    caller: parse_principal(index, "caller", caller)?,
                    commitment_hash: parse_hex(index, "commitment_hash", commitment_hash)?,
                    proof: parse_hex(index, "proof", proof)?,
                    nullifier: parse_hex(index, "nullifier", nullifier)?,
                },
                Step::Receive { .. } => Action::Receive,
            };
            actions.push(action);
        }
        Ok(actions)
    }

    /// replay every step in order
    ///
    /// malformed scenario input is rejected before the first step runs.
    /// engine rejections are recorded in the outcome and do not stop the run
    pub fn run<L: Ledger, V: ProofVerifier>(
        &self,
        engine: &Engine<L, V>,
    ) -> Result<Vec<StepOutcome>, ScenarioError> {
        let actions = self.prepare()?;
        let mut outcomes = Vec::with_capacity(actions.len());

        for (index, (step, action)) in self.steps.iter().zip(actions).enumerate() {
            let result = match action {
                Action::Create {
                    sender,
                    commitment_hash,
                    amount,
                    recipient,
                } => engine.create_transaction(&sender, &commitment_hash, amount, recipient),
                Action::Claim {
                    caller,
                    commitment_hash,
                    proof,
                    nullifier,
                } => engine.claim_transaction(&caller, &commitment_hash, &proof, &nullifier),
                Action::Receive => match engine.receive_funds() {
                    Ok(()) => Ok(()),
                    Err(never) => match never {},
                },
            };

            tracing::debug!(step = index, op = step.op(), ok = result.is_ok(), "scenario step");
            outcomes.push(StepOutcome {
                index,
                op: step.op(),
                result,
                expect: step.expect().map(str::to_string),
            });
        }

        Ok(outcomes)
    }
}

/// a step with its inputs decoded
enum Action {
    Create {
        sender: Principal,
        commitment_hash: Vec<u8>,
        amount: Amount,
        recipient: Option<Principal>,
    },
    Claim {
        caller: Principal,
        commitment_hash: Vec<u8>,
        proof: Vec<u8>,
        nullifier: Vec<u8>,
    },
    Receive,
}

fn parse_principal(step: usize, field: &'static str, s: &str) -> Result<Principal, ScenarioError> {
    s.parse()
        .map_err(|_| ScenarioError::EmptyPrincipal { step, field })
}

fn parse_hex(step: usize, field: &'static str, s: &str) -> Result<Vec<u8>, ScenarioError> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s).map_err(|source| ScenarioError::Hex { step, field, source })
}
