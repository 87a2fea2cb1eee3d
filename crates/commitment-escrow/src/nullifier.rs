//! consumed nullifiers
//!
//! a claim publishes a nullifier. once the claim commits, that value is
//! spent for every commitment and every sender, forever.

use std::collections::HashSet;

use crate::types::Nullifier;

/// spent nullifiers; only ever grows
#[derive(Clone, Debug, Default)]
pub struct NullifierSet {
    spent: HashSet<Nullifier>,
}

impl NullifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, nullifier: &Nullifier) -> bool {
        self.spent.contains(nullifier)
    }

    /// mark `nullifier` spent, false if it already was
    pub fn insert(&mut self, nullifier: Nullifier) -> bool {
        self.spent.insert(nullifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Nullifier> {
        self.spent.iter()
    }

    pub fn len(&self) -> usize {
        self.spent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spent.is_empty()
    }
}
