//! value types shared by the engine and its collaborators

use core::array::TryFromSliceError;
use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{HASH_LEN, PRINCIPAL_CONTEXT};

/// commitment hashes must be exactly 32 bytes
pub fn valid_commitment_hash(bytes: &[u8]) -> bool {
    bytes.len() == HASH_LEN
}

/// nullifiers must be exactly 32 bytes
pub fn valid_nullifier(bytes: &[u8]) -> bool {
    bytes.len() == HASH_LEN
}

/// authenticated account identity supplied by the host for every call
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Principal(#[serde(with = "hex::serde")] pub [u8; 32]);

impl Principal {
    /// deterministic principal for a human-readable name
    pub fn named(name: &str) -> Self {
        Self(blake3::derive_key(PRINCIPAL_CONTEXT, name.as_bytes()))
    }
}

impl AsRef<[u8]> for Principal {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("empty principal")]
pub struct EmptyPrincipal;

/// 64 hex chars parse as raw bytes, anything else is treated as a name
impl FromStr for Principal {
    type Err = EmptyPrincipal;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EmptyPrincipal);
        }
        if s.len() == HASH_LEN * 2 {
            let mut bytes = [0u8; 32];
            if hex::decode_to_slice(s, &mut bytes).is_ok() {
                return Ok(Self(bytes));
            }
        }
        Ok(Self::named(s))
    }
}

/// ledger units moved by create and claim; zero is never a valid lock
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn new(amount: u128) -> Self {
        Self(amount)
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn to_le_bytes(&self) -> [u8; 16] {
        self.0.to_le_bytes()
    }
}

impl From<u128> for Amount {
    fn from(v: u128) -> Self {
        Self(v)
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Self(v as u128)
    }
}

impl From<Amount> for u128 {
    fn from(v: Amount) -> Self {
        v.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// opaque 32-byte value a sender binds a locked payment to
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitmentHash(#[serde(with = "hex::serde")] pub [u8; 32]);

impl TryFrom<&[u8]> for CommitmentHash {
    type Error = TryFromSliceError;

    fn try_from(bytes: &[u8]) -> core::result::Result<Self, Self::Error> {
        <[u8; 32]>::try_from(bytes).map(Self)
    }
}

impl AsRef<[u8]> for CommitmentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for CommitmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitmentHash({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for CommitmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// single-use token published by a claim
///
/// once recorded, no later claim may present the same value
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Nullifier(#[serde(with = "hex::serde")] pub [u8; 32]);

impl TryFrom<&[u8]> for Nullifier {
    type Error = TryFromSliceError;

    fn try_from(bytes: &[u8]) -> core::result::Result<Self, Self::Error> {
        <[u8; 32]>::try_from(bytes).map(Self)
    }
}

impl AsRef<[u8]> for Nullifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nullifier({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
