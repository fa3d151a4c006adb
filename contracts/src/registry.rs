//! # Property Registry Contract
//!
//! An NFT-style ownership ledger for properties. Each minted property gets
//! a sequential id (starting at 1), an owner, and an immutable metadata URI
//! pointing at an off-chain JSON document (see [`super::metadata`]).
//!
//! The registry follows the standard non-fungible-asset conventions the
//! escrow relies on: the owner can `approve` an operator for a specific
//! token, and either the owner or the approved operator can `transfer_from`.
//! Approvals are per-token, replaced on re-approval, and cleared on
//! transfer.
//!
//! The registry knows nothing about sales — to it, the escrow contract is
//! just another address that happens to get approved and later becomes the
//! owner for a while.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No property with this id has ever been minted.
    #[error("unknown property: no property with id {property_id} has been minted")]
    UnknownProperty {
        /// The id the caller asked about.
        property_id: u64,
    },

    /// An owner-only operation was attempted by someone else.
    #[error("not owner: {caller} is not the owner of property {property_id} (owner is {owner})")]
    NotOwner {
        /// The address that attempted the operation.
        caller: String,
        /// The current owner on record.
        owner: String,
        /// The property in question.
        property_id: u64,
    },

    /// A transfer named a `from` that is not the current owner.
    #[error("owner mismatch: transfer of property {property_id} named {from} as owner, but the owner is {owner}")]
    OwnerMismatch {
        /// The `from` address the transfer named.
        from: String,
        /// The current owner on record.
        owner: String,
        /// The property in question.
        property_id: u64,
    },

    /// The caller is neither the owner nor the approved operator.
    #[error("not authorized: {caller} is neither owner nor approved operator for property {property_id}")]
    NotAuthorized {
        /// The address that attempted the transfer.
        caller: String,
        /// The property in question.
        property_id: u64,
    },
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A registered property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    /// Sequential id, assigned at mint time.
    pub id: u64,
    /// Current owner's address. Mutated only by transfers.
    pub owner: String,
    /// Immutable pointer to the off-chain metadata document.
    pub metadata_uri: String,
    /// Timestamp when the property was minted.
    pub minted_at: DateTime<Utc>,
}

/// The property ownership registry.
///
/// One instance per marketplace. Ids are allocated monotonically from 1 and
/// never reused; properties are never destroyed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyRegistry {
    /// Registered properties keyed by id.
    properties: HashMap<u64, Property>,
    /// Per-token approved operator, cleared on transfer.
    approvals: HashMap<u64, String>,
    /// Number of properties minted so far; also the most recent id.
    minted: u64,
}

impl PropertyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a new property owned by `caller` and returns its id.
    ///
    /// The metadata URI is fixed for the life of the property.
    pub fn mint(&mut self, caller: &str, metadata_uri: String) -> u64 {
        self.minted += 1;
        let id = self.minted;
        self.properties.insert(
            id,
            Property {
                id,
                owner: caller.to_string(),
                metadata_uri,
                minted_at: Utc::now(),
            },
        );
        info!(property_id = id, owner = caller, "property minted");
        id
    }

    /// Grants `operator` the right to transfer `property_id` on the owner's
    /// behalf. Replaces any previous approval for the token.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownProperty`] for unminted ids and
    /// [`RegistryError::NotOwner`] when `caller` is not the current owner.
    pub fn approve(
        &mut self,
        caller: &str,
        operator: &str,
        property_id: u64,
    ) -> Result<(), RegistryError> {
        let property = self
            .properties
            .get(&property_id)
            .ok_or(RegistryError::UnknownProperty { property_id })?;
        if property.owner != caller {
            return Err(RegistryError::NotOwner {
                caller: caller.to_string(),
                owner: property.owner.clone(),
                property_id,
            });
        }
        self.approvals.insert(property_id, operator.to_string());
        info!(property_id, operator, "operator approved");
        Ok(())
    }

    /// Reassigns ownership of `property_id` from `from` to `to`.
    ///
    /// Callable by the current owner or the approved operator. The token's
    /// approval is cleared as part of the transfer.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownProperty`] for unminted ids,
    /// [`RegistryError::OwnerMismatch`] when `from` is not the current
    /// owner, and [`RegistryError::NotAuthorized`] when `caller` is neither
    /// the owner nor the approved operator.
    pub fn transfer_from(
        &mut self,
        caller: &str,
        from: &str,
        to: &str,
        property_id: u64,
    ) -> Result<(), RegistryError> {
        let approved = self.approvals.get(&property_id).map(String::as_str);
        let property = self
            .properties
            .get_mut(&property_id)
            .ok_or(RegistryError::UnknownProperty { property_id })?;

        if property.owner != from {
            return Err(RegistryError::OwnerMismatch {
                from: from.to_string(),
                owner: property.owner.clone(),
                property_id,
            });
        }
        if caller != property.owner && approved != Some(caller) {
            return Err(RegistryError::NotAuthorized {
                caller: caller.to_string(),
                property_id,
            });
        }

        property.owner = to.to_string();
        self.approvals.remove(&property_id);
        info!(property_id, from, to, "ownership transferred");
        Ok(())
    }

    /// Returns the current owner of `property_id`.
    pub fn owner_of(&self, property_id: u64) -> Result<&str, RegistryError> {
        self.properties
            .get(&property_id)
            .map(|p| p.owner.as_str())
            .ok_or(RegistryError::UnknownProperty { property_id })
    }

    /// Returns the metadata URI of `property_id`.
    pub fn token_uri(&self, property_id: u64) -> Result<&str, RegistryError> {
        self.properties
            .get(&property_id)
            .map(|p| p.metadata_uri.as_str())
            .ok_or(RegistryError::UnknownProperty { property_id })
    }

    /// Returns the approved operator for `property_id`, if any.
    pub fn approved(&self, property_id: u64) -> Option<&str> {
        self.approvals.get(&property_id).map(String::as_str)
    }

    /// Returns the number of properties minted so far.
    pub fn total_supply(&self) -> u64 {
        self.minted
    }
}
