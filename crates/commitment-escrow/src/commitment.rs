//! commitment records and the table that holds them
//!
//! a record is keyed by `(sender, commitment_hash)`. the amount and recipient
//! never change after creation; `claimed` flips to true exactly once.

use std::collections::HashMap;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::types::{Amount, CommitmentHash, Nullifier, Principal};
use crate::{COMMITMENT_DOMAIN, NULLIFIER_DOMAIN};

/// lookup key: funding principal plus the hash it chose
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitmentKey {
    pub sender: Principal,
    pub commitment_hash: CommitmentHash,
}

impl CommitmentKey {
    pub fn new(sender: Principal, commitment_hash: CommitmentHash) -> Self {
        Self {
            sender,
            commitment_hash,
        }
    }
}

/// locked funds waiting for a claim
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub amount: Amount,
    pub recipient: Option<Principal>,
    pub claimed: bool,
}

impl Commitment {
    pub fn new(amount: Amount, recipient: Option<Principal>) -> Self {
        Self {
            amount,
            recipient,
            claimed: false,
        }
    }

    /// who a claim pays out to: the recipient if one was named, else the sender
    pub fn payee(&self, sender: &Principal) -> Principal {
        self.recipient.unwrap_or(*sender)
    }
}

/// commitment table
#[derive(Clone, Debug, Default)]
pub struct CommitmentStore {
    records: HashMap<CommitmentKey, Commitment>,
}

impl CommitmentStore {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    pub fn get(&self, key: &CommitmentKey) -> Option<&Commitment> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &CommitmentKey) -> bool {
        self.records.contains_key(key)
    }

    /// insert or overwrite, returning the record that was replaced
    pub fn insert(&mut self, key: CommitmentKey, commitment: Commitment) -> Option<Commitment> {
        self.records.insert(key, commitment)
    }

    /// set `claimed`, returns false if the key is unknown
    pub fn mark_claimed(&mut self, key: &CommitmentKey) -> bool {
        match self.records.get_mut(key) {
            Some(record) => {
                record.claimed = true;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CommitmentKey, &Commitment)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// off-band opening shared between sender and claimant
///
/// the engine never sees this. it gives both sides a way to agree on a
/// commitment hash and a nullifier that is deterministic per payment:
///
/// - `commitment_hash = H(domain || secret || amount || recipient)`
/// - `nullifier = H(domain || secret || commitment_hash)`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentOpening {
    #[serde(with = "hex::serde")]
    pub secret: [u8; 32],
    pub amount: Amount,
    pub recipient: Option<Principal>,
}

impl CommitmentOpening {
    pub fn new(secret: [u8; 32], amount: Amount, recipient: Option<Principal>) -> Self {
        Self {
            secret,
            amount,
            recipient,
        }
    }

    pub fn random<R: RngCore + CryptoRng>(
        rng: &mut R,
        amount: Amount,
        recipient: Option<Principal>,
    ) -> Self {
        let mut secret = [0u8; 32];
        rng.fill_bytes(&mut secret);
        Self::new(secret, amount, recipient)
    }

    pub fn commit(&self) -> CommitmentHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(COMMITMENT_DOMAIN);
        hasher.update(&self.secret);
        hasher.update(&self.amount.to_le_bytes());
        match &self.recipient {
            Some(recipient) => {
                hasher.update(&[1u8]);
                hasher.update(recipient.as_ref());
            }
            None => {
                hasher.update(&[0u8]);
            }
        }
        CommitmentHash(*hasher.finalize().as_bytes())
    }

    pub fn nullifier(&self) -> Nullifier {
        let commitment = self.commit();
        let mut hasher = blake3::Hasher::new();
        hasher.update(NULLIFIER_DOMAIN);
        hasher.update(&self.secret);
        hasher.update(commitment.as_ref());
        Nullifier(*hasher.finalize().as_bytes())
    }
}
