//! # HAVEN Property-Sale Contracts
//!
//! On-chain logic for a property-sale marketplace. Two cooperating
//! contracts, deployed once per marketplace instance:
//!
//! - **Property Registry** — an NFT-style ownership ledger mapping property
//!   ids to owners and immutable metadata URIs. A leaf with no knowledge of
//!   the escrow.
//! - **Sale Escrow** — the coordinator that walks a buyer, seller,
//!   inspector, and lender through listing, earnest deposit, inspection,
//!   multi-party approval, and finalize/cancel with conditional fund
//!   release.
//!
//! The [`metadata`] module carries the serde model of the off-chain JSON
//! document a registry token URI resolves to.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow — `checked_add` and
//!    `checked_sub` everywhere, because wrapping arithmetic and money do
//!    not mix.
//! 2. State transitions are explicit: enum variants, not boolean flags
//!    inferred from balances.
//! 3. Every mutating call validates all of its preconditions before it
//!    touches any state — a rejected call changes nothing, in the escrow,
//!    the registry, or the ledger.
//! 4. Every public type is serializable (serde) for wire transport and
//!    persistent storage.

pub mod escrow;
pub mod metadata;
pub mod registry;
