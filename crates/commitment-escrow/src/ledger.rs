//! ledger collaborator
//!
//! the engine only needs balances and atomic transfers. `InMemoryLedger` is
//! the reference implementation used by tests and the CLI.

use std::collections::HashMap;

use thiserror::Error;

use crate::types::{Amount, Principal};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("insufficient balance for {account}: have {have}, need {need}")]
    InsufficientBalance {
        account: Principal,
        have: Amount,
        need: Amount,
    },

    #[error("sender and recipient are the same account")]
    SelfTransfer,

    #[error("transfer amount must be positive")]
    NonPositiveAmount,

    #[error("balance overflow for {account}")]
    Overflow { account: Principal },
}

/// account system the engine settles against
///
/// `transfer` must be all-or-nothing: on error no balance has changed.
pub trait Ledger {
    fn balance_of(&self, account: &Principal) -> Amount;

    fn transfer(
        &mut self,
        amount: Amount,
        from: &Principal,
        to: &Principal,
    ) -> Result<(), LedgerError>;
}

/// balances held in a hash map
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    balances: HashMap<Principal, Amount>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            balances: HashMap::new(),
        }
    }

    pub fn with_balances(balances: impl IntoIterator<Item = (Principal, Amount)>) -> Self {
        Self {
            balances: balances.into_iter().collect(),
        }
    }

    /// mint funds into an account (genesis and test setup)
    pub fn credit(&mut self, account: &Principal, amount: Amount) -> Result<(), LedgerError> {
        let current = self.balance_of(account);
        let updated = current
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { account: *account })?;
        self.balances.insert(*account, updated);
        Ok(())
    }

    pub fn total_supply(&self) -> Amount {
        self.balances
            .values()
            .fold(Amount::ZERO, |acc, b| acc.saturating_add(*b))
    }
}

impl Ledger for InMemoryLedger {
    fn balance_of(&self, account: &Principal) -> Amount {
        self.balances.get(account).copied().unwrap_or_default()
    }

    fn transfer(
        &mut self,
        amount: Amount,
        from: &Principal,
        to: &Principal,
    ) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::NonPositiveAmount);
        }
        if from == to {
            return Err(LedgerError::SelfTransfer);
        }

        let have = self.balance_of(from);
        let debited = have
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                account: *from,
                have,
                need: amount,
            })?;
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { account: *to })?;

        // both sides computed before either is written
        self.balances.insert(*from, debited);
        self.balances.insert(*to, credited);
        Ok(())
    }
}
