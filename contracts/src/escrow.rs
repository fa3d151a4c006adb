//! # Sale Escrow Contract
//!
//! Coordinates a property sale between four parties. The lifecycle per
//! listing is:
//!
//! 1. **List** — the seller lists a property they own; the registry title
//!    moves into escrow custody atomically with the listing.
//! 2. **Deposit** — the buyer deposits earnest money (at least the agreed
//!    escrow amount).
//! 3. **Inspect** — the inspector records the inspection result; the flag
//!    can be flipped any number of times before a terminal transition.
//! 4. **Approve** — buyer, seller, and lender each sign off.
//! 5. **Fund** — the lender (or buyer) tops the listing up to the full
//!    purchase price through the explicit [`fund`](SaleEscrow::fund) entry
//!    point.
//! 6. **Finalize** — the seller closes: title goes to the buyer, the
//!    listing's entire balance goes to the seller. Or **Cancel** — the
//!    deposit refunds to the buyer when inspection failed (to the seller
//!    otherwise) and the title returns to the seller.
//!
//! Each listing keeps its own deposited balance. Funds put up for one
//! property can never satisfy the finalize preconditions of another, even
//! though they share the escrow's single ledger address.
//!
//! The registry and ledger are passed into the operations that need them,
//! the way a contract would call out to its collaborators; a rejected call
//! performs all of its checks up front and mutates nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use haven_ledger::{Ledger, LedgerError};

use crate::registry::{PropertyRegistry, RegistryError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during escrow operations.
#[derive(Debug, Error)]
pub enum EscrowError {
    /// The caller holds none of the roles allowed to perform this operation.
    #[error("unauthorized: {caller} may not call {operation}")]
    Unauthorized {
        /// The operation that was attempted.
        operation: Operation,
        /// The address that attempted it.
        caller: String,
    },

    /// The property has never been listed.
    #[error("not listed: property {property_id} has no listing")]
    NotListed {
        /// The id the caller named.
        property_id: u64,
    },

    /// The property already has a live listing.
    #[error("already listed: property {property_id} has an active listing")]
    AlreadyListed {
        /// The id the caller tried to relist.
        property_id: u64,
    },

    /// The listing terms are inconsistent.
    #[error("invalid terms: escrow amount {escrow_amount} exceeds purchase price {purchase_price}")]
    InvalidTerms {
        /// Earnest requirement the seller asked for.
        escrow_amount: u64,
        /// Full purchase price of the listing.
        purchase_price: u64,
    },

    /// The listing is not in a state that allows this operation.
    #[error("invalid state: listing is {current}, expected {expected}")]
    InvalidState {
        /// The listing's current status.
        current: String,
        /// The status required for this operation.
        expected: String,
    },

    /// The earnest deposit falls short of the agreed escrow amount.
    #[error("insufficient deposit: attempted {attempted} but the earnest requirement is {required}")]
    InsufficientDeposit {
        /// Amount the buyer tried to deposit.
        attempted: u64,
        /// The listing's escrow amount.
        required: u64,
    },

    /// Finalize was attempted before the listing was fully funded.
    #[error("insufficient funds: finalize requires {required} but the listing holds {available}")]
    InsufficientFunds {
        /// The purchase price that must be covered.
        required: u64,
        /// The listing's deposited balance.
        available: u64,
    },

    /// A finalize precondition other than funding is unsatisfied.
    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),

    /// A deposit would overflow the listing's balance counter.
    #[error("amount overflow: deposit would exceed allowed limits")]
    AmountOverflow,

    /// A registry call made on the escrow's behalf failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A ledger transfer made on the escrow's behalf failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

// ---------------------------------------------------------------------------
// Roles & Operations
// ---------------------------------------------------------------------------

/// A party's role in a sale.
///
/// Seller, inspector, and lender are marketplace-wide singletons fixed at
/// construction; the buyer is fixed per listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// The property owner who lists and finalizes.
    Seller,
    /// The counterparty named at listing time.
    Buyer,
    /// Records the inspection outcome.
    Inspector,
    /// Supplies the balance of the purchase price.
    Lender,
}

/// The escrow's mutating call surface.
///
/// Authorization is table-driven: each operation names the roles allowed to
/// perform it via [`Operation::allowed_roles`], and a single guard checks
/// the caller against that table. No per-operation conditionals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// List a property for sale.
    List,
    /// Deposit the buyer's earnest money.
    DepositEarnest,
    /// Contribute additional funds toward the purchase price.
    Fund,
    /// Record the inspection outcome.
    UpdateInspection,
    /// Record a party's approval of the sale.
    ApproveSale,
    /// Close the sale: title to buyer, funds to seller.
    FinalizeSale,
    /// Abort the sale: conditional refund, title back to seller.
    CancelSale,
}

impl Operation {
    /// The roles permitted to perform this operation.
    pub fn allowed_roles(self) -> &'static [Role] {
        match self {
            Operation::List => &[Role::Seller],
            Operation::DepositEarnest => &[Role::Buyer],
            Operation::Fund => &[Role::Lender, Role::Buyer],
            Operation::UpdateInspection => &[Role::Inspector],
            Operation::ApproveSale => &[Role::Buyer, Role::Seller, Role::Lender],
            Operation::FinalizeSale => &[Role::Seller],
            Operation::CancelSale => &[Role::Buyer, Role::Seller, Role::Lender],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::List => write!(f, "list"),
            Operation::DepositEarnest => write!(f, "deposit_earnest"),
            Operation::Fund => write!(f, "fund"),
            Operation::UpdateInspection => write!(f, "update_inspection_status"),
            Operation::ApproveSale => write!(f, "approve_sale"),
            Operation::FinalizeSale => write!(f, "finalize_sale"),
            Operation::CancelSale => write!(f, "cancel_sale"),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The lifecycle status of a listing.
///
/// "Unlisted" is represented by the absence of a listing record. Deposit,
/// inspection, and approval progress are orthogonal sub-state on the
/// [`Listing`], not statuses — they can arrive in any order while the
/// listing is `Listed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingStatus {
    /// Live: the escrow custodies the title and accepts funds, inspection
    /// results, and approvals.
    Listed,
    /// Terminal success: title went to the buyer, funds to the seller.
    Finalized,
    /// Terminal abort: deposit refunded per the inspection outcome, title
    /// returned to the seller.
    Cancelled,
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingStatus::Listed => write!(f, "Listed"),
            ListingStatus::Finalized => write!(f, "Finalized"),
            ListingStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// A property listing and its sale progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    /// Unique identifier for this listing record.
    pub listing_id: String,
    /// The registry id of the property being sold.
    pub property_id: u64,
    /// The buyer named at listing time.
    pub buyer: String,
    /// Full sale price, in the smallest currency unit.
    pub purchase_price: u64,
    /// Earnest requirement, fixed at listing time. Never exceeds the
    /// purchase price and is never recalculated.
    pub escrow_amount: u64,
    /// Funds held against this listing specifically. Earnest deposits and
    /// lender funding both land here.
    pub deposited: u64,
    /// Latest inspection outcome. Defaults to `false` until the inspector
    /// records a result.
    pub inspection_passed: bool,
    /// Addresses that have approved the sale. Monotonic until a terminal
    /// transition; re-approval is a no-op.
    pub approvals: HashSet<String>,
    /// Current lifecycle status.
    pub status: ListingStatus,
    /// Timestamp when the listing was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent state change.
    pub updated_at: DateTime<Utc>,
}

/// The sale-escrow coordinator.
///
/// One instance per marketplace. The seller, inspector, and lender are
/// fixed at construction and shared across all listings; the escrow's own
/// ledger address holds every listing's funds, with per-listing accounting
/// layered on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleEscrow {
    /// The escrow contract's own ledger address.
    pub address: String,
    /// The marketplace seller.
    pub seller: String,
    /// The inspection authority.
    pub inspector: String,
    /// The lending party.
    pub lender: String,
    /// Listings keyed by property id. Terminal records are kept for reads
    /// and replaced on relisting.
    listings: HashMap<u64, Listing>,
}

impl SaleEscrow {
    /// Creates a new escrow coordinator with fixed party addresses.
    pub fn new(address: String, seller: String, inspector: String, lender: String) -> Self {
        Self {
            address,
            seller,
            inspector,
            lender,
            listings: HashMap::new(),
        }
    }

    // -- guards -------------------------------------------------------------

    /// Checks `caller` against the authorization table for `operation`.
    ///
    /// `buyer` is the listing's buyer where one exists; operations that run
    /// before a listing does (only `list`) pass `None`.
    fn authorize(
        &self,
        operation: Operation,
        caller: &str,
        buyer: Option<&str>,
    ) -> Result<(), EscrowError> {
        let holds = |role: Role| match role {
            Role::Seller => caller == self.seller,
            Role::Buyer => buyer == Some(caller),
            Role::Inspector => caller == self.inspector,
            Role::Lender => caller == self.lender,
        };
        if operation.allowed_roles().iter().copied().any(holds) {
            Ok(())
        } else {
            Err(EscrowError::Unauthorized {
                operation,
                caller: caller.to_string(),
            })
        }
    }

    /// Returns the live listing for `property_id`.
    ///
    /// Fails `NotListed` when no listing exists and `InvalidState` when the
    /// listing has already reached a terminal status.
    fn live(&self, property_id: u64) -> Result<&Listing, EscrowError> {
        let listing = self
            .listings
            .get(&property_id)
            .ok_or(EscrowError::NotListed { property_id })?;
        if listing.status != ListingStatus::Listed {
            return Err(EscrowError::InvalidState {
                current: listing.status.to_string(),
                expected: "Listed".into(),
            });
        }
        Ok(listing)
    }

    fn live_mut(&mut self, property_id: u64) -> Result<&mut Listing, EscrowError> {
        self.live(property_id)?;
        self.listings
            .get_mut(&property_id)
            .ok_or(EscrowError::NotListed { property_id })
    }

    // -- mutating operations ------------------------------------------------

    /// Lists a property for sale and pulls its title into escrow custody.
    ///
    /// Only the seller may list, the seller must currently own the property
    /// in the registry, and the escrow must already be the approved operator
    /// for it. A property with a live listing cannot be listed again; one
    /// whose previous listing ended in `Finalized` or `Cancelled` can (the
    /// terminal record is replaced).
    ///
    /// # Errors
    ///
    /// [`EscrowError::Unauthorized`], [`EscrowError::InvalidTerms`] when
    /// `escrow_amount > purchase_price`, [`EscrowError::AlreadyListed`],
    /// [`EscrowError::PreconditionNotMet`] when the registry shows an owner
    /// other than the seller, and any [`RegistryError`] from the title
    /// transfer.
    pub fn list(
        &mut self,
        registry: &mut PropertyRegistry,
        caller: &str,
        property_id: u64,
        buyer: &str,
        purchase_price: u64,
        escrow_amount: u64,
    ) -> Result<(), EscrowError> {
        self.authorize(Operation::List, caller, None)?;
        if escrow_amount > purchase_price {
            return Err(EscrowError::InvalidTerms {
                escrow_amount,
                purchase_price,
            });
        }
        if let Some(existing) = self.listings.get(&property_id) {
            if existing.status == ListingStatus::Listed {
                return Err(EscrowError::AlreadyListed { property_id });
            }
        }
        let owner = registry.owner_of(property_id)?.to_string();
        if owner != self.seller {
            return Err(EscrowError::PreconditionNotMet(format!(
                "property {property_id} is owned by {owner}, not the seller"
            )));
        }

        // Title into custody, atomically with listing creation. Requires the
        // seller to have approved the escrow as operator beforehand.
        registry.transfer_from(&self.address, &self.seller, &self.address, property_id)?;

        let now = Utc::now();
        self.listings.insert(
            property_id,
            Listing {
                listing_id: Uuid::new_v4().to_string(),
                property_id,
                buyer: buyer.to_string(),
                purchase_price,
                escrow_amount,
                deposited: 0,
                inspection_passed: false,
                approvals: HashSet::new(),
                status: ListingStatus::Listed,
                created_at: now,
                updated_at: now,
            },
        );
        info!(property_id, buyer, purchase_price, escrow_amount, "property listed");
        Ok(())
    }

    /// Moves `amount` from `caller` to the escrow address and credits it to
    /// the listing. Shared by [`deposit_earnest`](Self::deposit_earnest) and
    /// [`fund`](Self::fund); all checks run before the ledger moves.
    fn receive(
        &mut self,
        ledger: &mut Ledger,
        property_id: u64,
        caller: &str,
        amount: u64,
    ) -> Result<u64, EscrowError> {
        let listing = self.live(property_id)?;
        let new_total = listing
            .deposited
            .checked_add(amount)
            .ok_or(EscrowError::AmountOverflow)?;

        ledger.transfer(caller, &self.address, amount)?;

        let listing = self.live_mut(property_id)?;
        listing.deposited = new_total;
        listing.updated_at = Utc::now();
        Ok(new_total)
    }

    /// Deposits the buyer's earnest money against a listing.
    ///
    /// The deposit must cover the listing's escrow amount in one payment.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotListed`]/[`EscrowError::InvalidState`],
    /// [`EscrowError::Unauthorized`] for anyone but the buyer,
    /// [`EscrowError::InsufficientDeposit`] below the earnest requirement,
    /// and [`LedgerError::InsufficientFunds`] when the buyer cannot pay.
    pub fn deposit_earnest(
        &mut self,
        ledger: &mut Ledger,
        caller: &str,
        property_id: u64,
        amount: u64,
    ) -> Result<(), EscrowError> {
        let listing = self.live(property_id)?;
        self.authorize(Operation::DepositEarnest, caller, Some(&listing.buyer))?;
        if amount < listing.escrow_amount {
            return Err(EscrowError::InsufficientDeposit {
                attempted: amount,
                required: listing.escrow_amount,
            });
        }

        let total = self.receive(ledger, property_id, caller, amount)?;
        info!(property_id, caller, amount, total, "earnest deposited");
        Ok(())
    }

    /// Contributes funds toward a listing's purchase price.
    ///
    /// This is how the lender's share arrives — an explicit entry point
    /// rather than an anonymous value transfer to the contract address, so
    /// the contribution lands against a specific listing. The buyer may
    /// also use it to top up.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotListed`]/[`EscrowError::InvalidState`],
    /// [`EscrowError::Unauthorized`] for callers other than the lender or
    /// buyer, and [`LedgerError::InsufficientFunds`] when the caller cannot
    /// pay.
    pub fn fund(
        &mut self,
        ledger: &mut Ledger,
        caller: &str,
        property_id: u64,
        amount: u64,
    ) -> Result<(), EscrowError> {
        let listing = self.live(property_id)?;
        self.authorize(Operation::Fund, caller, Some(&listing.buyer))?;

        let total = self.receive(ledger, property_id, caller, amount)?;
        info!(property_id, caller, amount, total, "listing funded");
        Ok(())
    }

    /// Records the inspection outcome for a listing.
    ///
    /// Inspector only. Independent of funding and approvals — callable
    /// before or after either, and repeatably until a terminal transition.
    pub fn update_inspection_status(
        &mut self,
        caller: &str,
        property_id: u64,
        passed: bool,
    ) -> Result<(), EscrowError> {
        let listing = self.live(property_id)?;
        self.authorize(Operation::UpdateInspection, caller, Some(&listing.buyer))?;

        let listing = self.live_mut(property_id)?;
        listing.inspection_passed = passed;
        listing.updated_at = Utc::now();
        info!(property_id, passed, "inspection status recorded");
        Ok(())
    }

    /// Records the caller's approval of the sale.
    ///
    /// Only the listing's buyer, the seller, or the lender may approve.
    /// Idempotent: approving twice is a no-op.
    pub fn approve_sale(&mut self, caller: &str, property_id: u64) -> Result<(), EscrowError> {
        let listing = self.live(property_id)?;
        self.authorize(Operation::ApproveSale, caller, Some(&listing.buyer))?;

        let listing = self.live_mut(property_id)?;
        if listing.approvals.insert(caller.to_string()) {
            listing.updated_at = Utc::now();
            debug!(property_id, caller, "sale approved");
        }
        Ok(())
    }

    /// Closes the sale: title to the buyer, the listing's entire balance to
    /// the seller.
    ///
    /// Seller only. Every precondition must hold or the call fails with no
    /// state change: inspection passed, approvals from buyer, seller, and
    /// lender, and a deposited balance covering the purchase price. Funds
    /// held against other listings cannot satisfy the last check.
    pub fn finalize_sale(
        &mut self,
        ledger: &mut Ledger,
        registry: &mut PropertyRegistry,
        caller: &str,
        property_id: u64,
    ) -> Result<(), EscrowError> {
        let listing = self.live(property_id)?;
        self.authorize(Operation::FinalizeSale, caller, Some(&listing.buyer))?;

        if !listing.inspection_passed {
            return Err(EscrowError::PreconditionNotMet(
                "inspection has not passed".into(),
            ));
        }
        let required = [
            ("buyer", listing.buyer.as_str()),
            ("seller", self.seller.as_str()),
            ("lender", self.lender.as_str()),
        ];
        for (label, party) in required {
            if !listing.approvals.contains(party) {
                return Err(EscrowError::PreconditionNotMet(format!(
                    "{label} has not approved the sale"
                )));
            }
        }
        if listing.deposited < listing.purchase_price {
            return Err(EscrowError::InsufficientFunds {
                required: listing.purchase_price,
                available: listing.deposited,
            });
        }

        let buyer = listing.buyer.clone();
        let payout = listing.deposited;

        // The payment leg must be known-good before the title moves, so a
        // ledger rejection cannot strand a half-applied closing.
        ledger.check_transfer(&self.address, &self.seller, payout)?;

        registry.transfer_from(&self.address, &self.address, &buyer, property_id)?;
        ledger.transfer(&self.address, &self.seller, payout)?;

        let listing = self.live_mut(property_id)?;
        listing.deposited = 0;
        listing.status = ListingStatus::Finalized;
        listing.updated_at = Utc::now();
        info!(property_id, buyer = %buyer, payout, "sale finalized");
        Ok(())
    }

    /// Aborts the sale.
    ///
    /// Callable by the buyer, seller, or lender while the listing is live.
    /// The deposited balance refunds to the buyer when the inspection failed
    /// (or was never recorded), and pays to the seller when it passed. The
    /// title always returns to the seller — a cancelled listing must not
    /// leave the property in escrow custody.
    pub fn cancel_sale(
        &mut self,
        ledger: &mut Ledger,
        registry: &mut PropertyRegistry,
        caller: &str,
        property_id: u64,
    ) -> Result<(), EscrowError> {
        let listing = self.live(property_id)?;
        self.authorize(Operation::CancelSale, caller, Some(&listing.buyer))?;

        let recipient = if listing.inspection_passed {
            self.seller.clone()
        } else {
            listing.buyer.clone()
        };
        let refund = listing.deposited;

        // Same ordering as finalize: prove the refund can land before the
        // title leaves custody.
        if refund > 0 {
            ledger.check_transfer(&self.address, &recipient, refund)?;
        }

        registry.transfer_from(&self.address, &self.address, &self.seller, property_id)?;
        if refund > 0 {
            ledger.transfer(&self.address, &recipient, refund)?;
        }

        let listing = self.live_mut(property_id)?;
        listing.deposited = 0;
        listing.status = ListingStatus::Cancelled;
        listing.updated_at = Utc::now();
        info!(property_id, refund, recipient = %recipient, "sale cancelled");
        Ok(())
    }

    // -- reads --------------------------------------------------------------

    /// Returns `true` if the property has a live listing.
    pub fn is_listed(&self, property_id: u64) -> bool {
        self.listings
            .get(&property_id)
            .map(|l| l.status == ListingStatus::Listed)
            .unwrap_or(false)
    }

    /// Returns the listing record for a property, terminal or live.
    pub fn listing(&self, property_id: u64) -> Option<&Listing> {
        self.listings.get(&property_id)
    }

    /// The buyer named on a listing.
    pub fn buyer(&self, property_id: u64) -> Option<&str> {
        self.listings.get(&property_id).map(|l| l.buyer.as_str())
    }

    /// The listing's full purchase price.
    pub fn purchase_price(&self, property_id: u64) -> Option<u64> {
        self.listings.get(&property_id).map(|l| l.purchase_price)
    }

    /// The listing's earnest requirement.
    pub fn escrow_amount(&self, property_id: u64) -> Option<u64> {
        self.listings.get(&property_id).map(|l| l.escrow_amount)
    }

    /// Funds currently held against the listing.
    pub fn deposited(&self, property_id: u64) -> Option<u64> {
        self.listings.get(&property_id).map(|l| l.deposited)
    }

    /// The listing's latest inspection outcome.
    pub fn inspection_passed(&self, property_id: u64) -> Option<bool> {
        self.listings.get(&property_id).map(|l| l.inspection_passed)
    }

    /// Whether `address` has approved the sale of `property_id`.
    pub fn approval(&self, property_id: u64, address: &str) -> bool {
        self.listings
            .get(&property_id)
            .map(|l| l.approvals.contains(address))
            .unwrap_or(false)
    }

    /// The escrow address's total ledger balance, pooled across listings.
    pub fn get_balance(&self, ledger: &Ledger) -> u64 {
        ledger.balance_of(&self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESCROW: &str = "escrow";
    const SELLER: &str = "seller";
    const BUYER: &str = "buyer";
    const INSPECTOR: &str = "inspector";
    const LENDER: &str = "lender";

    /// Helper: mints a property for the seller, approves the escrow as
    /// operator, and seeds buyer/lender ledger balances.
    fn setup() -> (SaleEscrow, PropertyRegistry, Ledger, u64) {
        let mut registry = PropertyRegistry::new();
        let id = registry.mint(SELLER, "ipfs://property/1.json".into());
        let escrow = SaleEscrow::new(
            ESCROW.into(),
            SELLER.into(),
            INSPECTOR.into(),
            LENDER.into(),
        );
        registry.approve(SELLER, ESCROW, id).unwrap();

        let mut ledger = Ledger::new();
        ledger.credit(BUYER, 100).unwrap();
        ledger.credit(LENDER, 100).unwrap();
        (escrow, registry, ledger, id)
    }

    fn listed() -> (SaleEscrow, PropertyRegistry, Ledger, u64) {
        let (mut escrow, mut registry, ledger, id) = setup();
        escrow.list(&mut registry, SELLER, id, BUYER, 10, 5).unwrap();
        (escrow, registry, ledger, id)
    }

    #[test]
    fn list_takes_custody_and_records_terms() {
        let (escrow, registry, _ledger, id) = listed();
        assert!(escrow.is_listed(id));
        assert_eq!(escrow.buyer(id), Some(BUYER));
        assert_eq!(escrow.purchase_price(id), Some(10));
        assert_eq!(escrow.escrow_amount(id), Some(5));
        assert_eq!(registry.owner_of(id).unwrap(), ESCROW);
    }

    #[test]
    fn only_seller_can_list() {
        let (mut escrow, mut registry, _ledger, id) = setup();
        let result = escrow.list(&mut registry, BUYER, id, BUYER, 10, 5);
        assert!(matches!(result, Err(EscrowError::Unauthorized { .. })));
        assert!(!escrow.is_listed(id));
        assert_eq!(registry.owner_of(id).unwrap(), SELLER);
    }

    #[test]
    fn relisting_a_live_listing_rejected() {
        let (mut escrow, mut registry, _ledger, id) = listed();
        let result = escrow.list(&mut registry, SELLER, id, BUYER, 10, 5);
        assert!(matches!(result, Err(EscrowError::AlreadyListed { .. })));
    }

    #[test]
    fn earnest_above_price_rejected() {
        let (mut escrow, mut registry, _ledger, id) = setup();
        let result = escrow.list(&mut registry, SELLER, id, BUYER, 10, 11);
        assert!(matches!(result, Err(EscrowError::InvalidTerms { .. })));
        assert_eq!(registry.owner_of(id).unwrap(), SELLER);
    }

    #[test]
    fn deposit_increases_balance() {
        let (mut escrow, _registry, mut ledger, id) = listed();
        escrow.deposit_earnest(&mut ledger, BUYER, id, 5).unwrap();
        assert_eq!(escrow.get_balance(&ledger), 5);
        assert_eq!(escrow.deposited(id), Some(5));
        assert_eq!(ledger.balance_of(BUYER), 95);
    }

    #[test]
    fn deposit_below_earnest_rejected() {
        let (mut escrow, _registry, mut ledger, id) = listed();
        let result = escrow.deposit_earnest(&mut ledger, BUYER, id, 4);
        assert!(matches!(result, Err(EscrowError::InsufficientDeposit { .. })));
        assert_eq!(escrow.get_balance(&ledger), 0);
    }

    #[test]
    fn deposit_by_non_buyer_rejected() {
        let (mut escrow, _registry, mut ledger, id) = listed();
        let result = escrow.deposit_earnest(&mut ledger, LENDER, id, 5);
        assert!(matches!(result, Err(EscrowError::Unauthorized { .. })));
    }

    #[test]
    fn inspection_is_inspector_only_and_repeatable() {
        let (mut escrow, _registry, _ledger, id) = listed();
        assert!(escrow.update_inspection_status(BUYER, id, true).is_err());

        escrow.update_inspection_status(INSPECTOR, id, true).unwrap();
        assert_eq!(escrow.inspection_passed(id), Some(true));
        escrow.update_inspection_status(INSPECTOR, id, false).unwrap();
        assert_eq!(escrow.inspection_passed(id), Some(false));
    }

    #[test]
    fn approval_membership_enforced() {
        let (mut escrow, _registry, _ledger, id) = listed();
        escrow.approve_sale(BUYER, id).unwrap();
        escrow.approve_sale(SELLER, id).unwrap();
        escrow.approve_sale(LENDER, id).unwrap();
        assert!(escrow.approval(id, BUYER));
        assert!(escrow.approval(id, SELLER));
        assert!(escrow.approval(id, LENDER));

        let result = escrow.approve_sale("stranger", id);
        assert!(matches!(result, Err(EscrowError::Unauthorized { .. })));
        assert!(!escrow.approval(id, "stranger"));
    }

    #[test]
    fn approval_is_idempotent() {
        let (mut escrow, _registry, _ledger, id) = listed();
        escrow.approve_sale(BUYER, id).unwrap();
        escrow.approve_sale(BUYER, id).unwrap();
        assert!(escrow.approval(id, BUYER));
        assert_eq!(escrow.listing(id).unwrap().approvals.len(), 1);
    }

    #[test]
    fn finalize_requires_inspection() {
        let (mut escrow, mut registry, mut ledger, id) = listed();
        escrow.deposit_earnest(&mut ledger, BUYER, id, 5).unwrap();
        escrow.fund(&mut ledger, LENDER, id, 5).unwrap();
        escrow.approve_sale(BUYER, id).unwrap();
        escrow.approve_sale(SELLER, id).unwrap();
        escrow.approve_sale(LENDER, id).unwrap();

        let result = escrow.finalize_sale(&mut ledger, &mut registry, SELLER, id);
        assert!(matches!(result, Err(EscrowError::PreconditionNotMet(_))));
        // Nothing moved.
        assert_eq!(registry.owner_of(id).unwrap(), ESCROW);
        assert_eq!(escrow.deposited(id), Some(10));
    }

    #[test]
    fn finalize_requires_all_approvals() {
        let (mut escrow, mut registry, mut ledger, id) = listed();
        escrow.deposit_earnest(&mut ledger, BUYER, id, 5).unwrap();
        escrow.fund(&mut ledger, LENDER, id, 5).unwrap();
        escrow.update_inspection_status(INSPECTOR, id, true).unwrap();
        escrow.approve_sale(BUYER, id).unwrap();
        escrow.approve_sale(SELLER, id).unwrap();

        let result = escrow.finalize_sale(&mut ledger, &mut registry, SELLER, id);
        assert!(matches!(result, Err(EscrowError::PreconditionNotMet(_))));
    }

    #[test]
    fn finalize_requires_full_funding() {
        let (mut escrow, mut registry, mut ledger, id) = listed();
        escrow.deposit_earnest(&mut ledger, BUYER, id, 5).unwrap();
        escrow.update_inspection_status(INSPECTOR, id, true).unwrap();
        escrow.approve_sale(BUYER, id).unwrap();
        escrow.approve_sale(SELLER, id).unwrap();
        escrow.approve_sale(LENDER, id).unwrap();

        let result = escrow.finalize_sale(&mut ledger, &mut registry, SELLER, id);
        assert!(matches!(result, Err(EscrowError::InsufficientFunds { .. })));
    }

    #[test]
    fn finalize_pays_seller_and_transfers_title() {
        let (mut escrow, mut registry, mut ledger, id) = listed();
        escrow.deposit_earnest(&mut ledger, BUYER, id, 5).unwrap();
        escrow.update_inspection_status(INSPECTOR, id, true).unwrap();
        escrow.approve_sale(BUYER, id).unwrap();
        escrow.approve_sale(SELLER, id).unwrap();
        escrow.approve_sale(LENDER, id).unwrap();
        escrow.fund(&mut ledger, LENDER, id, 5).unwrap();

        escrow.finalize_sale(&mut ledger, &mut registry, SELLER, id).unwrap();
        assert_eq!(registry.owner_of(id).unwrap(), BUYER);
        assert_eq!(ledger.balance_of(SELLER), 10);
        assert_eq!(escrow.get_balance(&ledger), 0);
        assert!(!escrow.is_listed(id));
        assert_eq!(escrow.listing(id).unwrap().status, ListingStatus::Finalized);
    }

    #[test]
    fn cancel_after_failed_inspection_refunds_buyer() {
        let (mut escrow, mut registry, mut ledger, id) = listed();
        escrow.deposit_earnest(&mut ledger, BUYER, id, 5).unwrap();
        escrow.update_inspection_status(INSPECTOR, id, false).unwrap();

        escrow.cancel_sale(&mut ledger, &mut registry, BUYER, id).unwrap();
        assert_eq!(ledger.balance_of(BUYER), 100);
        assert_eq!(ledger.balance_of(SELLER), 0);
        assert_eq!(registry.owner_of(id).unwrap(), SELLER);
        assert_eq!(escrow.listing(id).unwrap().status, ListingStatus::Cancelled);
    }

    #[test]
    fn cancel_after_passed_inspection_pays_seller() {
        let (mut escrow, mut registry, mut ledger, id) = listed();
        escrow.deposit_earnest(&mut ledger, BUYER, id, 5).unwrap();
        escrow.update_inspection_status(INSPECTOR, id, true).unwrap();

        escrow.cancel_sale(&mut ledger, &mut registry, SELLER, id).unwrap();
        assert_eq!(ledger.balance_of(SELLER), 5);
        assert_eq!(ledger.balance_of(BUYER), 95);
        assert_eq!(registry.owner_of(id).unwrap(), SELLER);
    }

    #[test]
    fn fund_by_unauthorized_caller_rejected() {
        let (mut escrow, _registry, mut ledger, id) = listed();
        ledger.credit(SELLER, 100).unwrap();

        let result = escrow.fund(&mut ledger, SELLER, id, 5);
        assert!(matches!(result, Err(EscrowError::Unauthorized { .. })));
        let result = escrow.fund(&mut ledger, "stranger", id, 5);
        assert!(matches!(result, Err(EscrowError::Unauthorized { .. })));
        assert_eq!(escrow.deposited(id), Some(0));
        assert_eq!(escrow.get_balance(&ledger), 0);
    }

    #[test]
    fn cancel_by_unauthorized_caller_rejected() {
        let (mut escrow, mut registry, mut ledger, id) = listed();

        let result = escrow.cancel_sale(&mut ledger, &mut registry, INSPECTOR, id);
        assert!(matches!(result, Err(EscrowError::Unauthorized { .. })));
        let result = escrow.cancel_sale(&mut ledger, &mut registry, "stranger", id);
        assert!(matches!(result, Err(EscrowError::Unauthorized { .. })));
        assert!(escrow.is_listed(id));
        assert_eq!(registry.owner_of(id).unwrap(), ESCROW);
    }

    #[test]
    fn finalize_payment_failure_leaves_title_in_custody() {
        let (mut escrow, mut registry, mut ledger, id) = listed();
        escrow.deposit_earnest(&mut ledger, BUYER, id, 5).unwrap();
        escrow.fund(&mut ledger, LENDER, id, 5).unwrap();
        escrow.update_inspection_status(INSPECTOR, id, true).unwrap();
        escrow.approve_sale(BUYER, id).unwrap();
        escrow.approve_sale(SELLER, id).unwrap();
        escrow.approve_sale(LENDER, id).unwrap();

        // Saturate the seller's account so paying out the price overflows.
        ledger.credit(SELLER, u64::MAX).unwrap();

        let result = escrow.finalize_sale(&mut ledger, &mut registry, SELLER, id);
        assert!(matches!(result, Err(EscrowError::Ledger(_))));
        // The failed call moved nothing: title, listing, and funds intact.
        assert_eq!(registry.owner_of(id).unwrap(), ESCROW);
        assert!(escrow.is_listed(id));
        assert_eq!(escrow.deposited(id), Some(10));
        assert_eq!(escrow.get_balance(&ledger), 10);
    }

    #[test]
    fn cancel_payment_failure_leaves_listing_live() {
        let (mut escrow, mut registry, mut ledger, id) = listed();
        escrow.deposit_earnest(&mut ledger, BUYER, id, 5).unwrap();

        // Saturate the buyer's account so the refund overflows.
        let headroom = u64::MAX - ledger.balance_of(BUYER);
        ledger.credit(BUYER, headroom).unwrap();

        let result = escrow.cancel_sale(&mut ledger, &mut registry, BUYER, id);
        assert!(matches!(result, Err(EscrowError::Ledger(_))));
        assert_eq!(registry.owner_of(id).unwrap(), ESCROW);
        assert!(escrow.is_listed(id));
        assert_eq!(escrow.deposited(id), Some(5));
    }

    #[test]
    fn terminal_listing_rejects_further_operations() {
        let (mut escrow, mut registry, mut ledger, id) = listed();
        escrow.cancel_sale(&mut ledger, &mut registry, SELLER, id).unwrap();

        assert!(matches!(
            escrow.approve_sale(BUYER, id),
            Err(EscrowError::InvalidState { .. })
        ));
        assert!(matches!(
            escrow.deposit_earnest(&mut ledger, BUYER, id, 5),
            Err(EscrowError::InvalidState { .. })
        ));
        assert!(matches!(
            escrow.update_inspection_status(INSPECTOR, id, true),
            Err(EscrowError::InvalidState { .. })
        ));
    }

    #[test]
    fn operations_on_never_listed_property_fail_not_listed() {
        let (mut escrow, mut registry, mut ledger, _id) = setup();
        let missing = 42;
        assert!(matches!(
            escrow.deposit_earnest(&mut ledger, BUYER, missing, 5),
            Err(EscrowError::NotListed { .. })
        ));
        assert!(matches!(
            escrow.approve_sale(BUYER, missing),
            Err(EscrowError::NotListed { .. })
        ));
        assert!(matches!(
            escrow.finalize_sale(&mut ledger, &mut registry, SELLER, missing),
            Err(EscrowError::NotListed { .. })
        ));
        assert!(matches!(
            escrow.cancel_sale(&mut ledger, &mut registry, SELLER, missing),
            Err(EscrowError::NotListed { .. })
        ));
    }
}
