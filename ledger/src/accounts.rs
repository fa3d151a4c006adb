//! # Account Ledger
//!
//! A flat map from address to native-currency balance. Addresses are opaque
//! strings — contract instances get an address of their own, so funds held
//! by a contract are just a balance like any other.
//!
//! ## Transfer Semantics
//!
//! A transfer `from -> to` for amount `A`:
//!
//! 1. Verify `balance(from) >= A`.
//! 2. Verify `balance(to) + A` does not overflow.
//! 3. `balance(from) -= A`
//! 4. `balance(to) += A`
//!
//! Both checks run before either balance is touched, so a rejected transfer
//! leaves the ledger exactly as it was.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The source account does not hold enough to cover the transfer.
    #[error("insufficient funds: {address} holds {available} but {requested} was requested")]
    InsufficientFunds {
        /// The account that would have been debited.
        address: String,
        /// Amount the caller tried to move.
        requested: u64,
        /// Balance actually held by the account.
        available: u64,
    },

    /// Crediting the destination would overflow its balance counter.
    #[error("amount overflow: balance would exceed the representable maximum")]
    AmountOverflow,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// In-memory ledger mapping addresses to balances.
///
/// Unknown addresses implicitly hold a zero balance; accounts spring into
/// existence on their first credit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    /// Balances keyed by address, in the smallest currency unit.
    accounts: HashMap<String, u64>,
}

impl Ledger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the balance held by `address`, zero if the account is unknown.
    pub fn balance_of(&self, address: &str) -> u64 {
        self.accounts.get(address).copied().unwrap_or(0)
    }

    /// Credits `amount` to `address`, creating the account if needed.
    ///
    /// This is the ledger's external inflow — genesis allocations and test
    /// setup use it to put funds into circulation.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AmountOverflow`] if the credit would overflow
    /// the account's balance.
    pub fn credit(&mut self, address: &str, amount: u64) -> Result<(), LedgerError> {
        let balance = self.accounts.entry(address.to_string()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        debug!(address, amount, balance = *balance, "account credited");
        Ok(())
    }

    /// Validates a transfer and computes the resulting balances without
    /// applying them.
    fn validate_transfer(
        &self,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<(u64, u64), LedgerError> {
        let available = self.balance_of(from);
        let debited = available
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientFunds {
                address: from.to_string(),
                requested: amount,
                available,
            })?;
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        Ok((debited, credited))
    }

    /// Checks whether a transfer would succeed, without moving anything.
    ///
    /// Callers that must sequence a payment after other effects use this to
    /// front-load the payment's checks into their own precondition phase.
    ///
    /// # Errors
    ///
    /// The same errors [`transfer`](Self::transfer) would return.
    pub fn check_transfer(&self, from: &str, to: &str, amount: u64) -> Result<(), LedgerError> {
        self.validate_transfer(from, to, amount).map(|_| ())
    }

    /// Atomically moves `amount` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientFunds`] if `from` holds less than
    /// `amount`, and [`LedgerError::AmountOverflow`] if crediting `to` would
    /// overflow. In both cases no balance changes.
    pub fn transfer(&mut self, from: &str, to: &str, amount: u64) -> Result<(), LedgerError> {
        let (debited, credited) = self.validate_transfer(from, to, amount)?;
        self.accounts.insert(from.to_string(), debited);
        self.accounts.insert(to.to_string(), credited);
        debug!(from, to, amount, "transfer applied");
        Ok(())
    }

    /// Returns the number of known accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Returns `true` if no account has ever been credited.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
