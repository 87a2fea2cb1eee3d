//! escrow engine - commitment lifecycle
//!
//! holds the commitment table, the nullifier set and the ledger handle
//! behind one lock. each public operation takes the lock once, checks its
//! preconditions in a fixed order and then applies every effect or none.
//!
//! create: sender -> custody, record `(sender, hash)`.
//! claim: custody -> recipient (or sender), record nullifier, mark claimed.

use std::convert::Infallible;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::commitment::{Commitment, CommitmentKey, CommitmentStore};
use crate::config::{DuplicatePolicy, EngineConfig};
use crate::error::{EscrowError, Result};
use crate::event::EscrowEvent;
use crate::ledger::Ledger;
use crate::nullifier::NullifierSet;
use crate::types::{valid_commitment_hash, Amount, CommitmentHash, Nullifier, Principal};
use crate::verifier::{ProofVerifier, PublicInputs};

/// everything mutated by create and claim
struct State<L> {
    ledger: L,
    commitments: CommitmentStore,
    nullifiers: NullifierSet,
    events: Vec<EscrowEvent>,
}

pub struct Engine<L, V> {
    config: EngineConfig,
    verifier: V,
    state: Mutex<State<L>>,
}

impl<L: Ledger, V: ProofVerifier> Engine<L, V> {
    pub fn new(config: EngineConfig, ledger: L, verifier: V) -> Self {
        info!(custody = %config.custody, "escrow engine initialized");
        Self {
            config,
            verifier,
            state: Mutex::new(State {
                ledger,
                commitments: CommitmentStore::new(),
                nullifiers: NullifierSet::new(),
                events: Vec::new(),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// custodial account holding locked funds
    pub fn custody(&self) -> Principal {
        self.config.custody
    }

    /// lock funds from `caller` against `commitment_hash`
    ///
    /// checked in order: hash length, amount, recipient != caller, balance.
    pub fn create_transaction(
        &self,
        caller: &Principal,
        commitment_hash: &[u8],
        amount: Amount,
        recipient: Option<Principal>,
    ) -> Result<()> {
        if !valid_commitment_hash(commitment_hash) {
            debug!(%caller, len = commitment_hash.len(), "create rejected: bad commitment hash");
            return Err(EscrowError::InvalidCommitmentHash);
        }
        let hash = CommitmentHash::try_from(commitment_hash)
            .map_err(|_| EscrowError::InvalidCommitmentHash)?;

        if amount.is_zero() {
            debug!(%caller, "create rejected: zero amount");
            return Err(EscrowError::InvalidAmount);
        }
        if recipient.as_ref() == Some(caller) {
            debug!(%caller, "create rejected: recipient is sender");
            return Err(EscrowError::Unauthorized);
        }

        let mut state = self.lock();
        let key = CommitmentKey::new(*caller, hash);

        if self.config.duplicate_commitments == DuplicatePolicy::Reject
            && state.commitments.contains(&key)
        {
            debug!(%caller, %hash, "create rejected: duplicate commitment");
            return Err(EscrowError::DuplicateCommitment);
        }

        let balance = state.ledger.balance_of(caller);
        if balance < amount {
            debug!(%caller, %balance, %amount, "create rejected: insufficient funds");
            return Err(EscrowError::InsufficientFunds);
        }

        state.ledger.transfer(amount, caller, &self.config.custody)?;

        if let Some(previous) = state.commitments.insert(key, Commitment::new(amount, recipient)) {
            warn!(
                %caller,
                %hash,
                previous_amount = %previous.amount,
                previous_claimed = previous.claimed,
                "commitment overwritten"
            );
        }
        state.events.push(EscrowEvent::CommitmentCreated {
            sender: *caller,
            commitment_hash: hash,
            amount,
            recipient,
        });

        info!(%caller, %hash, %amount, has_recipient = recipient.is_some(), "commitment created");
        Ok(())
    }

    /// release the funds locked under `(caller, commitment_hash)`
    ///
    /// checked in order: record exists, nullifier length, nullifier unused,
    /// not yet claimed (if `reject_claimed`), proof. the payout happens
    /// before the nullifier is recorded so a failed transfer burns nothing.
    pub fn claim_transaction(
        &self,
        caller: &Principal,
        commitment_hash: &[u8],
        proof: &[u8],
        nullifier: &[u8],
    ) -> Result<()> {
        let mut state = self.lock();

        // a malformed hash can never name a record, so this also covers the
        // hash length check
        let key = CommitmentHash::try_from(commitment_hash)
            .ok()
            .map(|hash| CommitmentKey::new(*caller, hash));
        let (key, commitment) = match key.and_then(|k| state.commitments.get(&k).map(|c| (k, *c))) {
            Some(found) => found,
            None => {
                debug!(%caller, "claim rejected: no such commitment");
                return Err(EscrowError::Unauthorized);
            }
        };

        let nullifier = Nullifier::try_from(nullifier).map_err(|_| {
            debug!(%caller, len = nullifier.len(), "claim rejected: bad nullifier");
            EscrowError::InvalidNullifier
        })?;

        if state.nullifiers.contains(&nullifier) {
            debug!(%caller, %nullifier, "claim rejected: nullifier already used");
            return Err(EscrowError::AlreadyClaimed);
        }
        if self.config.reject_claimed && commitment.claimed {
            debug!(%caller, hash = %key.commitment_hash, "claim rejected: commitment already claimed");
            return Err(EscrowError::AlreadyClaimed);
        }

        let inputs = PublicInputs::new(*caller, commitment.amount, commitment.recipient);
        if !self.verify_proof(proof, &inputs) {
            debug!(%caller, proof_len = proof.len(), "claim rejected: invalid proof");
            return Err(EscrowError::InvalidProof);
        }

        let payee = commitment.payee(caller);
        state
            .ledger
            .transfer(commitment.amount, &self.config.custody, &payee)?;

        state.nullifiers.insert(nullifier);
        state.commitments.mark_claimed(&key);
        state.events.push(EscrowEvent::CommitmentClaimed {
            sender: *caller,
            commitment_hash: key.commitment_hash,
            nullifier,
            payee,
            amount: commitment.amount,
        });

        info!(
            %caller,
            hash = %key.commitment_hash,
            %nullifier,
            %payee,
            amount = %commitment.amount,
            "commitment claimed"
        );
        Ok(())
    }

    /// empty and oversized proofs never reach the verifier
    pub fn verify_proof(&self, proof: &[u8], inputs: &PublicInputs) -> bool {
        if proof.is_empty() || proof.len() > self.config.max_proof_len {
            return false;
        }
        self.verifier.verify(proof, inputs)
    }

    /// accept a direct inbound transfer to custody; no state change
    pub fn receive_funds(&self) -> std::result::Result<(), Infallible> {
        debug!(custody = %self.config.custody, "funds received");
        Ok(())
    }

    pub fn balance_of(&self, account: &Principal) -> Amount {
        self.lock().ledger.balance_of(account)
    }

    pub fn custody_balance(&self) -> Amount {
        self.balance_of(&self.config.custody)
    }

    pub fn commitment(&self, sender: &Principal, commitment_hash: &[u8]) -> Option<Commitment> {
        let hash = CommitmentHash::try_from(commitment_hash).ok()?;
        self.lock()
            .commitments
            .get(&CommitmentKey::new(*sender, hash))
            .copied()
    }

    pub fn is_nullifier_used(&self, nullifier: &[u8]) -> bool {
        match Nullifier::try_from(nullifier) {
            Ok(nf) => self.lock().nullifiers.contains(&nf),
            Err(_) => false,
        }
    }

    pub fn events(&self) -> Vec<EscrowEvent> {
        self.lock().events.clone()
    }

    /// run `f` against the ledger while holding the engine lock
    ///
    /// changes made here bypass the commitment table. if `f` panics the lock
    /// is recovered with whatever `f` had written so far.
    pub fn with_ledger<T>(&self, f: impl FnOnce(&mut L) -> T) -> T {
        f(&mut self.lock().ledger)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let state = self.lock();

        let mut commitments: Vec<CommitmentEntry> = state
            .commitments
            .iter()
            .map(|(key, c)| CommitmentEntry {
                sender: key.sender,
                commitment_hash: key.commitment_hash,
                amount: c.amount,
                recipient: c.recipient,
                claimed: c.claimed,
            })
            .collect();
        commitments.sort_by_key(|e| (e.sender, e.commitment_hash));

        let mut nullifiers: Vec<Nullifier> = state.nullifiers.iter().copied().collect();
        nullifiers.sort();

        EngineSnapshot {
            custody: self.config.custody,
            custody_balance: state.ledger.balance_of(&self.config.custody),
            commitments,
            nullifiers,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<L>> {
        // create and claim validate before mutating and panic nowhere after.
        // a panicking `with_ledger` closure or `Ledger::transfer` impl can
        // still leave the ledger half-written
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// one row of the commitment table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentEntry {
    pub sender: Principal,
    pub commitment_hash: CommitmentHash,
    pub amount: Amount,
    pub recipient: Option<Principal>,
    pub claimed: bool,
}

/// point-in-time view of engine state, sorted for stable output
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub custody: Principal,
    pub custody_balance: Amount,
    pub commitments: Vec<CommitmentEntry>,
    pub nullifiers: Vec<Nullifier>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{InMemoryLedger, LedgerError};
    use crate::verifier::{AttestationVerifier, NonEmptyProof};
    use std::sync::Arc;

    const H1: [u8; 32] = [0x11; 32];
    const H2: [u8; 32] = [0x22; 32];
    const N1: [u8; 32] = [0xA1; 32];
    const N2: [u8; 32] = [0xA2; 32];

    fn alice() -> Principal {
        Principal::named("alice")
    }

    fn bob() -> Principal {
        Principal::named("bob")
    }

    fn engine_with(config: EngineConfig) -> Engine<InMemoryLedger, NonEmptyProof> {
        let ledger = InMemoryLedger::with_balances([(alice(), Amount::new(10_000))]);
        Engine::new(config, ledger, NonEmptyProof)
    }

    fn engine() -> Engine<InMemoryLedger, NonEmptyProof> {
        engine_with(EngineConfig::default())
    }

    #[test]
    fn test_create_moves_funds_to_custody() {
        let engine = engine();

        engine
            .create_transaction(&alice(), &H1, Amount::new(1000), Some(bob()))
            .unwrap();

        assert_eq!(engine.balance_of(&alice()), Amount::new(9000));
        assert_eq!(engine.custody_balance(), Amount::new(1000));

        let record = engine.commitment(&alice(), &H1).unwrap();
        assert_eq!(record, Commitment::new(Amount::new(1000), Some(bob())));
        assert!(!record.claimed);
    }

    #[test]
    fn test_create_precondition_order() {
        let engine = engine();

        // bad hash wins over zero amount and self-recipient
        assert_eq!(
            engine.create_transaction(&alice(), &[1u8; 31], Amount::ZERO, Some(alice())),
            Err(EscrowError::InvalidCommitmentHash)
        );
        // zero amount wins over self-recipient
        assert_eq!(
            engine.create_transaction(&alice(), &H1, Amount::ZERO, Some(alice())),
            Err(EscrowError::InvalidAmount)
        );
        // self-recipient wins over insufficient funds
        assert_eq!(
            engine.create_transaction(&alice(), &H1, Amount::new(u128::MAX), Some(alice())),
            Err(EscrowError::Unauthorized)
        );
        assert_eq!(
            engine.create_transaction(&alice(), &H1, Amount::new(10_001), None),
            Err(EscrowError::InsufficientFunds)
        );

        // nothing happened
        assert_eq!(engine.balance_of(&alice()), Amount::new(10_000));
        assert_eq!(engine.custody_balance(), Amount::ZERO);
        assert!(engine.commitment(&alice(), &H1).is_none());
        assert!(engine.events().is_empty());
    }

    #[test]
    fn test_create_exact_balance() {
        let engine = engine();
        engine
            .create_transaction(&alice(), &H1, Amount::new(10_000), None)
            .unwrap();
        assert_eq!(engine.balance_of(&alice()), Amount::ZERO);
    }

    #[test]
    fn test_claim_pays_recipient() {
        let engine = engine();
        engine
            .create_transaction(&alice(), &H1, Amount::new(1000), Some(bob()))
            .unwrap();

        engine.claim_transaction(&alice(), &H1, &[0xAA], &N1).unwrap();

        assert_eq!(engine.balance_of(&bob()), Amount::new(1000));
        assert_eq!(engine.custody_balance(), Amount::ZERO);
        assert!(engine.is_nullifier_used(&N1));
        assert!(engine.commitment(&alice(), &H1).unwrap().claimed);
    }

    #[test]
    fn test_claim_without_recipient_refunds_sender() {
        let engine = engine();
        engine
            .create_transaction(&alice(), &H1, Amount::new(1000), None)
            .unwrap();
        engine.claim_transaction(&alice(), &H1, &[1], &N1).unwrap();

        assert_eq!(engine.balance_of(&alice()), Amount::new(10_000));
        assert_eq!(engine.custody_balance(), Amount::ZERO);
    }

    #[test]
    fn test_claim_requires_original_sender() {
        let engine = engine();
        engine
            .create_transaction(&alice(), &H1, Amount::new(1000), Some(bob()))
            .unwrap();

        // the recipient cannot claim on its own, the key is (sender, hash)
        assert_eq!(
            engine.claim_transaction(&bob(), &H1, &[1], &N1),
            Err(EscrowError::Unauthorized)
        );
        assert_eq!(
            engine.claim_transaction(&alice(), &H2, &[1], &N1),
            Err(EscrowError::Unauthorized)
        );
        // malformed hash cannot name a record either
        assert_eq!(
            engine.claim_transaction(&alice(), &H1[..31], &[1], &N1),
            Err(EscrowError::Unauthorized)
        );
    }

    #[test]
    fn test_claim_precondition_order() {
        let engine = engine();
        engine
            .create_transaction(&alice(), &H1, Amount::new(1000), Some(bob()))
            .unwrap();

        // bad nullifier wins over empty proof
        assert_eq!(
            engine.claim_transaction(&alice(), &H1, &[], &N1[..8]),
            Err(EscrowError::InvalidNullifier)
        );
        assert_eq!(
            engine.claim_transaction(&alice(), &H1, &[], &N1),
            Err(EscrowError::InvalidProof)
        );

        assert_eq!(engine.custody_balance(), Amount::new(1000));
        assert!(!engine.is_nullifier_used(&N1));
        assert!(!engine.commitment(&alice(), &H1).unwrap().claimed);
    }

    #[test]
    fn test_nullifier_is_single_use_across_commitments() {
        let engine = engine();
        engine
            .create_transaction(&alice(), &H1, Amount::new(100), Some(bob()))
            .unwrap();
        engine
            .create_transaction(&alice(), &H2, Amount::new(200), Some(bob()))
            .unwrap();

        engine.claim_transaction(&alice(), &H1, &[1], &N1).unwrap();

        // same nullifier, different commitment; the nullifier check comes first
        assert_eq!(
            engine.claim_transaction(&alice(), &H2, &[], &N1),
            Err(EscrowError::AlreadyClaimed)
        );
        assert_eq!(engine.custody_balance(), Amount::new(200));

        engine.claim_transaction(&alice(), &H2, &[1], &N2).unwrap();
        assert_eq!(engine.balance_of(&bob()), Amount::new(300));
    }

    #[test]
    fn test_second_claim_rejected_when_guarded() {
        let engine = engine();
        engine
            .create_transaction(&alice(), &H1, Amount::new(100), Some(bob()))
            .unwrap();
        engine.claim_transaction(&alice(), &H1, &[1], &N1).unwrap();

        assert_eq!(
            engine.claim_transaction(&alice(), &H1, &[1], &N2),
            Err(EscrowError::AlreadyClaimed)
        );
        assert!(!engine.is_nullifier_used(&N2));
        assert_eq!(engine.balance_of(&bob()), Amount::new(100));
    }

    #[test]
    fn test_second_claim_pays_again_when_unguarded() {
        let engine = engine_with(EngineConfig {
            reject_claimed: false,
            ..Default::default()
        });
        engine
            .create_transaction(&alice(), &H1, Amount::new(100), Some(bob()))
            .unwrap();
        engine
            .create_transaction(&alice(), &H2, Amount::new(100), None)
            .unwrap();
        engine.claim_transaction(&alice(), &H1, &[1], &N1).unwrap();

        // a fresh nullifier re-executes the payout out of other locked funds
        engine.claim_transaction(&alice(), &H1, &[1], &N2).unwrap();
        assert_eq!(engine.balance_of(&bob()), Amount::new(200));
        assert_eq!(engine.custody_balance(), Amount::ZERO);

        // H2's funds are gone, its own claim now fails at the ledger
        let err = engine
            .claim_transaction(&alice(), &H2, &[1], &[0xA3; 32])
            .unwrap_err();
        assert!(matches!(
            err,
            EscrowError::Ledger(LedgerError::InsufficientBalance { .. })
        ));
        assert!(!engine.is_nullifier_used(&[0xA3; 32]));
    }

    #[test]
    fn test_failed_payout_burns_no_nullifier() {
        let engine = engine();
        engine
            .create_transaction(&alice(), &H1, Amount::new(500), Some(bob()))
            .unwrap();

        // drain custody behind the engine's back
        let custody = engine.custody();
        engine
            .with_ledger(|ledger| ledger.transfer(Amount::new(500), &custody, &Principal::named("thief")))
            .unwrap();

        let err = engine.claim_transaction(&alice(), &H1, &[1], &N1).unwrap_err();
        assert_eq!(err.code(), 200);
        assert!(!engine.is_nullifier_used(&N1));
        assert!(!engine.commitment(&alice(), &H1).unwrap().claimed);
        assert_eq!(engine.events().len(), 1);
    }

    #[test]
    fn test_create_ledger_failure_changes_nothing() {
        let engine = engine();
        let custody = engine.custody();
        engine
            .with_ledger(|ledger| ledger.credit(&custody, Amount::new(500)))
            .unwrap();

        // balance check passes, the custody -> custody transfer does not
        assert_eq!(
            engine.create_transaction(&custody, &H1, Amount::new(100), Some(bob())),
            Err(EscrowError::Ledger(LedgerError::SelfTransfer))
        );

        assert!(engine.commitment(&custody, &H1).is_none());
        assert!(engine.events().is_empty());
        assert_eq!(engine.custody_balance(), Amount::new(500));
        assert_eq!(engine.balance_of(&alice()), Amount::new(10_000));
    }

    #[test]
    fn test_custody_recipient_locks_funds() {
        let engine = engine();
        let custody = engine.custody();

        // only recipient == caller is refused at create
        engine
            .create_transaction(&alice(), &H1, Amount::new(100), Some(custody))
            .unwrap();

        // the payout would be custody -> custody, so every claim fails
        assert_eq!(
            engine.claim_transaction(&alice(), &H1, &[1], &N1),
            Err(EscrowError::Ledger(LedgerError::SelfTransfer))
        );
        assert!(!engine.is_nullifier_used(&N1));
        assert!(!engine.commitment(&alice(), &H1).unwrap().claimed);
        assert_eq!(engine.custody_balance(), Amount::new(100));
    }

    #[test]
    fn test_oversized_proof_rejected() {
        let engine = engine();
        engine
            .create_transaction(&alice(), &H1, Amount::new(1), None)
            .unwrap();

        assert_eq!(
            engine.claim_transaction(&alice(), &H1, &[1u8; 257], &N1),
            Err(EscrowError::InvalidProof)
        );
        engine.claim_transaction(&alice(), &H1, &[1u8; 256], &N1).unwrap();
    }

    #[test]
    fn test_duplicate_create_overwrites_by_default() {
        let engine = engine();
        engine
            .create_transaction(&alice(), &H1, Amount::new(100), Some(bob()))
            .unwrap();
        engine
            .create_transaction(&alice(), &H1, Amount::new(300), None)
            .unwrap();

        // both transfers happened, only the latest record survives
        assert_eq!(engine.custody_balance(), Amount::new(400));
        assert_eq!(
            engine.commitment(&alice(), &H1).unwrap(),
            Commitment::new(Amount::new(300), None)
        );
    }

    #[test]
    fn test_duplicate_create_rejected_by_policy() {
        let engine = engine_with(EngineConfig {
            duplicate_commitments: DuplicatePolicy::Reject,
            ..Default::default()
        });
        engine
            .create_transaction(&alice(), &H1, Amount::new(100), None)
            .unwrap();

        assert_eq!(
            engine.create_transaction(&alice(), &H1, Amount::new(300), None),
            Err(EscrowError::DuplicateCommitment)
        );
        assert_eq!(engine.custody_balance(), Amount::new(100));

        // another sender may reuse the hash
        engine
            .with_ledger(|l| l.credit(&bob(), Amount::new(50)))
            .unwrap();
        engine
            .create_transaction(&bob(), &H1, Amount::new(50), None)
            .unwrap();
    }

    #[test]
    fn test_attestation_verifier_plugs_in() {
        let verifier = AttestationVerifier::new([5u8; 32]);
        let ledger = InMemoryLedger::with_balances([(alice(), Amount::new(1000))]);
        let engine = Engine::new(EngineConfig::default(), ledger, verifier.clone());

        engine
            .create_transaction(&alice(), &H1, Amount::new(1000), Some(bob()))
            .unwrap();

        // a non-empty but unbound proof no longer passes
        assert_eq!(
            engine.claim_transaction(&alice(), &H1, &[0xAA], &N1),
            Err(EscrowError::InvalidProof)
        );

        let proof = verifier.attest(&PublicInputs::new(alice(), Amount::new(1000), Some(bob())));
        engine.claim_transaction(&alice(), &H1, &proof, &N1).unwrap();
        assert_eq!(engine.balance_of(&bob()), Amount::new(1000));
    }

    #[test]
    fn test_receive_funds_is_noop() {
        let engine = engine();
        let before = engine.snapshot();
        assert!(engine.receive_funds().is_ok());
        assert_eq!(engine.snapshot(), before);
        assert!(engine.events().is_empty());
    }

    #[test]
    fn test_events_and_snapshot() {
        let engine = engine();
        engine
            .create_transaction(&alice(), &H1, Amount::new(100), Some(bob()))
            .unwrap();
        engine.claim_transaction(&alice(), &H1, &[1], &N1).unwrap();

        let events = engine.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], EscrowEvent::CommitmentCreated { .. }));
        assert_eq!(
            events[1],
            EscrowEvent::CommitmentClaimed {
                sender: alice(),
                commitment_hash: CommitmentHash(H1),
                nullifier: Nullifier(N1),
                payee: bob(),
                amount: Amount::new(100),
            }
        );

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.custody_balance, Amount::ZERO);
        assert_eq!(snapshot.commitments.len(), 1);
        assert!(snapshot.commitments[0].claimed);
        assert_eq!(snapshot.nullifiers, vec![Nullifier(N1)]);
    }

    #[test]
    fn test_concurrent_claims_single_winner() {
        let ledger = InMemoryLedger::with_balances([(alice(), Amount::new(1000))]);
        let engine = Arc::new(Engine::new(
            EngineConfig {
                reject_claimed: false,
                ..Default::default()
            },
            ledger,
            NonEmptyProof,
        ));
        for i in 0..8u8 {
            engine
                .create_transaction(&alice(), &[i + 1; 32], Amount::new(100), Some(bob()))
                .unwrap();
        }

        // every thread races a different commitment with the same nullifier
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || engine.claim_transaction(&alice(), &[i + 1; 32], &[1], &N1))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| *e == EscrowError::AlreadyClaimed));
        assert_eq!(engine.balance_of(&bob()), Amount::new(100));
    }
}
