//! # Error Types
//!
//! Domain-specific error types for shopkeep-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  shopkeep-core (this file)                                             │
//! │  ├── CoreError        - Cart and catalog rule violations               │
//! │  └── ValidationError  - Form input failures (never reach the network)  │
//! │                                                                         │
//! │  shopkeep-db          DbError      - Local storage failures            │
//! │  shopkeep-client      ClientError  - Transport / auth / server errors  │
//! │  backoffice           UiError      - What the UI shows (code + text)   │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ClientError → UiError → toast     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the cart and the local catalog.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Product is not in the locally held catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Inventory lot is not attached to the product.
    #[error("Inventory {inventory_id} not found on product {product_id}")]
    InventoryNotFound {
        product_id: String,
        inventory_id: String,
    },

    /// Supplier is not in the locally held directory.
    #[error("Supplier not found: {0}")]
    SupplierNotFound(String),

    /// Cart line index is out of bounds.
    #[error("Cart line {index} does not exist (cart has {len} lines)")]
    LineNotFound { index: usize, len: usize },

    /// Requested quantity exceeds the stock snapshot.
    ///
    /// ## User Workflow
    /// ```text
    /// Add to cart (qty: 5)
    ///      │
    ///      ▼
    /// stock snapshot = 3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id: "P-100", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// UI shows: "Only 3 P-100 in stock"
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Submitting a sale with nothing in the cart.
    #[error("Cart is empty")]
    CartEmpty,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised by form validation before any request is built; a submission that
/// fails validation makes zero network calls.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must not be negative.
    #[error("{field} cannot be negative")]
    Negative { field: String },

    /// Invalid format (e.g. malformed email, non-digit OTP).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g. product id already in the catalog).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Inventory priced below its purchase cost.
    #[error("Selling price {selling_price} cannot be lower than cost {cost}")]
    SellingBelowCost { cost: String, selling_price: String },

    /// Discount larger than the selling price of the line.
    #[error("Discount {discount} cannot exceed selling price {selling_price}")]
    DiscountExceedsPrice {
        discount: String,
        selling_price: String,
    },
}

impl ValidationError {
    /// Name of the offending form field, for field-level highlighting.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooShort { field, .. }
            | ValidationError::TooLong { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::Negative { field }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::Duplicate { field, .. } => field,
            ValidationError::SellingBelowCost { .. } => "sellingPrice",
            ValidationError::DiscountExceedsPrice { .. } => "discount",
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
