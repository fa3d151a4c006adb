//! # Property Metadata Document
//!
//! The JSON document a registry token URI resolves to. The marketplace
//! client convention fixes the shape: an `image` URL, a street `address`,
//! and an ordered `attributes` list where position carries meaning —
//! index 0 is the purchase price, index 2 bedrooms, index 3 bathrooms,
//! index 4 square footage. (Index 1 is the type of residence, which the
//! listing cards do not render.)
//!
//! The document itself lives off-chain; the registry stores only the URI.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute index of the purchase price.
pub const ATTR_PRICE: usize = 0;
/// Attribute index of the bedroom count.
pub const ATTR_BEDROOMS: usize = 2;
/// Attribute index of the bathroom count.
pub const ATTR_BATHROOMS: usize = 3;
/// Attribute index of the square footage.
pub const ATTR_SQUARE_FOOTAGE: usize = 4;

/// A single entry in the ordered attribute list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute label, e.g. `"Purchase Price"` or `"Bedrooms"`.
    pub trait_type: String,
    /// Attribute value. Numeric for the indexed attributes, but the
    /// convention does not forbid strings elsewhere in the list.
    pub value: Value,
}

/// An off-chain property metadata document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyMetadata {
    /// Listing title.
    #[serde(default)]
    pub name: String,
    /// Street address of the property.
    pub address: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// URL of the listing image.
    pub image: String,
    /// Ordered attribute list; see the module docs for the index layout.
    pub attributes: Vec<Attribute>,
}

impl PropertyMetadata {
    /// Returns the attribute value at `index`, if present.
    pub fn attribute(&self, index: usize) -> Option<&Value> {
        self.attributes.get(index).map(|a| &a.value)
    }

    /// The purchase price attribute (index 0), as a raw JSON value — the
    /// convention allows both integral and fractional prices here.
    pub fn price(&self) -> Option<&Value> {
        self.attribute(ATTR_PRICE)
    }

    /// The bedroom count (index 2).
    pub fn bedrooms(&self) -> Option<u64> {
        self.attribute(ATTR_BEDROOMS).and_then(Value::as_u64)
    }

    /// The bathroom count (index 3).
    pub fn bathrooms(&self) -> Option<u64> {
        self.attribute(ATTR_BATHROOMS).and_then(Value::as_u64)
    }

    /// The square footage (index 4).
    pub fn square_footage(&self) -> Option<u64> {
        self.attribute(ATTR_SQUARE_FOOTAGE).and_then(Value::as_u64)
    }
}
