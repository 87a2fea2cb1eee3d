//! proof verification boundary
//!
//! the engine treats a verifier as an opaque decision function over a proof
//! and the claim's public inputs. swapping in a real proof system means
//! implementing [`ProofVerifier`], nothing in the engine changes.

use crate::types::{Amount, Principal};
use crate::ATTESTATION_DOMAIN;

/// values a claim proof is checked against
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicInputs {
    pub claimant: Principal,
    pub amount: Amount,
    pub recipient: Option<Principal>,
}

impl PublicInputs {
    pub fn new(claimant: Principal, amount: Amount, recipient: Option<Principal>) -> Self {
        Self {
            claimant,
            amount,
            recipient,
        }
    }

    /// claimant(32) || amount(16, le) || flag(1) || recipient(32 if flag = 1)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 16 + 1 + 32);
        out.extend_from_slice(self.claimant.as_ref());
        out.extend_from_slice(&self.amount.to_le_bytes());
        match &self.recipient {
            Some(recipient) => {
                out.push(1);
                out.extend_from_slice(recipient.as_ref());
            }
            None => out.push(0),
        }
        out
    }
}

pub trait ProofVerifier: Send + Sync {
    fn verify(&self, proof: &[u8], inputs: &PublicInputs) -> bool;
}

impl<V: ProofVerifier + ?Sized> ProofVerifier for Box<V> {
    fn verify(&self, proof: &[u8], inputs: &PublicInputs) -> bool {
        (**self).verify(proof, inputs)
    }
}

/// placeholder gate: any non-empty proof is accepted
///
/// NOT a zero-knowledge verifier. stands in until a proof system is plugged in.
#[derive(Clone, Copy, Debug, Default)]
pub struct NonEmptyProof;

impl ProofVerifier for NonEmptyProof {
    fn verify(&self, proof: &[u8], _inputs: &PublicInputs) -> bool {
        !proof.is_empty()
    }
}

/// accepts a keyed blake3 tag over the public inputs
///
/// whoever holds the key can authorize a claim for exactly one
/// (claimant, amount, recipient) tuple.
#[derive(Clone)]
pub struct AttestationVerifier {
    key: [u8; 32],
}

impl AttestationVerifier {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// produce the proof bytes this verifier accepts for `inputs`
    pub fn attest(&self, inputs: &PublicInputs) -> [u8; 32] {
        *self.tag(inputs).as_bytes()
    }

    fn tag(&self, inputs: &PublicInputs) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(ATTESTATION_DOMAIN);
        hasher.update(&inputs.to_bytes());
        hasher.finalize()
    }
}

impl core::fmt::Debug for AttestationVerifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AttestationVerifier").finish_non_exhaustive()
    }
}

impl ProofVerifier for AttestationVerifier {
    fn verify(&self, proof: &[u8], inputs: &PublicInputs) -> bool {
        let Ok(tag) = <[u8; 32]>::try_from(proof) else {
            return false;
        };
        // blake3::Hash equality is constant time
        blake3::Hash::from(tag) == self.tag(inputs)
    }
}
