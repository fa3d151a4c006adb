//! # HAVEN Ledger — Execution Substrate
//!
//! The contracts in this workspace assume an underlying ledger that offers
//! two things: durable per-address balances in the smallest currency unit,
//! and atomic transfers between addresses. This crate is that substrate,
//! reduced to exactly those two things.
//!
//! Calls are applied one at a time in a single global order — a transfer
//! either happens in full or not at all, and a failed call leaves every
//! balance untouched. Block production, fees, and consensus are someone
//! else's problem.
//!
//! All balance arithmetic is checked. Wrapping arithmetic and money do
//! not mix.

pub mod accounts;

pub use accounts::{Ledger, LedgerError};
