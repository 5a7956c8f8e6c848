//! # Validation Module
//!
//! Form and input validation for Shopkeep.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Frontend (React)                                              │
//! │  └── Field hints while typing                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (Rust, before any request is built)               │
//! │  ├── Required fields, lengths, formats                                  │
//! │  ├── selling price >= cost                                              │
//! │  └── product id unique against the locally held catalog                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Back office API                                               │
//! │  └── Authoritative uniqueness and schema checks                         │
//! │                                                                         │
//! │  A failure here blocks submission: zero network calls are made.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use shopkeep_core::money::Money;
//! use shopkeep_core::validation::{validate_inventory, validate_quantity};
//!
//! assert!(validate_inventory(Money::from_cents(10000), Money::from_cents(8000), 5).is_err());
//! assert!(validate_quantity(2, 10).is_ok());
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{InventoryForm, Product, ProductForm, SupplierForm};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Minimum password length accepted by the reset flow.
pub const MIN_PASSWORD_LEN: usize = 6;

fn required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn max_len(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.trim().chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

// =============================================================================
// Product Validators
// =============================================================================

/// Validates a product business key.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - No whitespace inside
///
/// ## Example
/// ```rust
/// use shopkeep_core::validation::validate_product_id;
///
/// assert!(validate_product_id("RICE-5KG").is_ok());
/// assert!(validate_product_id("").is_err());
/// assert!(validate_product_id("has space").is_err());
/// ```
pub fn validate_product_id(product_id: &str) -> ValidationResult<()> {
    required("productId", product_id)?;
    max_len("productId", product_id, 50)?;

    if product_id.trim().chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "productId".to_string(),
            reason: "must not contain spaces".to_string(),
        });
    }
    Ok(())
}

/// Validates a product name: required, at most 200 characters.
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    required("productName", name)?;
    max_len("productName", name, 200)
}

/// Validates the product form.
///
/// `editing` is the server id of the product being edited, which is allowed
/// to keep its own product id.
///
/// ## Uniqueness
/// ```text
/// form.product_id = "P-100"
///      │
///      ▼
/// any other product in the local catalog with product_id "P-100"
/// (case-insensitive)?
///      │
///      ├── yes ──► Duplicate { field: "productId", value: "P-100" }
///      └── no  ──► Ok
/// ```
/// Best effort only: the local catalog may be a partial page.
pub fn validate_product_form(
    form: &ProductForm,
    existing: &[Product],
    editing: Option<&str>,
) -> ValidationResult<()> {
    validate_product_id(&form.product_id)?;
    validate_product_name(&form.product_name)?;
    max_len("brand", &form.brand, 100)?;
    max_len("category", &form.category, 100)?;
    max_len("rackNumber", &form.rack_number, 20)?;
    max_len("description", &form.description, 1000)?;

    let wanted = form.product_id.trim();
    let clash = existing.iter().any(|p| {
        let is_self = editing.map(|id| p.id.matches(id)).unwrap_or(false);
        !is_self && p.product_id.trim().eq_ignore_ascii_case(wanted)
    });
    if clash {
        return Err(ValidationError::Duplicate {
            field: "productId".to_string(),
            value: wanted.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a non-negative amount.
pub fn validate_price(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates an inventory lot.
///
/// ## Rules
/// - cost, selling price and stock are non-negative
/// - selling price is not below cost
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Inventory dialog: cost = 100, selling price = 80                       │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_inventory ← THIS FUNCTION                                     │
/// │       │                                                                 │
/// │       └── SellingBelowCost ──► field error on "sellingPrice"            │
/// │                                 dialog stays open, nothing is sent      │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_inventory(cost: Money, selling_price: Money, stock: i64) -> ValidationResult<()> {
    validate_price("cost", cost)?;
    validate_price("sellingPrice", selling_price)?;
    if stock < 0 {
        return Err(ValidationError::Negative {
            field: "stock".to_string(),
        });
    }

    if selling_price < cost {
        return Err(ValidationError::SellingBelowCost {
            cost: cost.to_string(),
            selling_price: selling_price.to_string(),
        });
    }
    Ok(())
}

pub fn validate_inventory_form(form: &InventoryForm) -> ValidationResult<()> {
    validate_inventory(form.cost, form.selling_price, form.stock)
}

/// Validates a cart quantity against the stock snapshot.
///
/// ## Rules
/// - At least 1
/// - At most `stock` and never above MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64, stock: i64) -> ValidationResult<()> {
    let max = stock.clamp(0, MAX_ITEM_QUANTITY);
    if qty < 1 || qty > max {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max,
        });
    }
    Ok(())
}

/// Validates a line discount: non-negative and not above the price.
pub fn validate_discount(discount: Money, selling_price: Money) -> ValidationResult<()> {
    validate_price("discount", discount)?;
    if discount > selling_price {
        return Err(ValidationError::DiscountExceedsPrice {
            discount: discount.to_string(),
            selling_price: selling_price.to_string(),
        });
    }
    Ok(())
}

/// Validates cart size (number of lines) before adding one more.
pub fn validate_cart_size(current_lines: usize) -> ValidationResult<()> {
    if current_lines >= MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart".to_string(),
            min: 0,
            max: MAX_CART_ITEMS as i64,
        });
    }
    Ok(())
}

// =============================================================================
// Search
// =============================================================================

/// Validates a search query.
///
/// ## Rules
/// - Can be empty (clears the search)
/// - Maximum 100 characters
///
/// ## Returns
/// The trimmed query string.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();
    max_len("query", query, 100)?;
    Ok(query.to_string())
}

// =============================================================================
// Supplier
// =============================================================================

pub fn validate_supplier_form(form: &SupplierForm) -> ValidationResult<()> {
    required("name", &form.name)?;
    max_len("name", &form.name, 200)?;
    if let Some(email) = form.email.as_deref().filter(|e| !e.trim().is_empty()) {
        validate_email(email)?;
    }
    if let Some(phone) = form.phone.as_deref().filter(|p| !p.trim().is_empty()) {
        let ok = phone
            .trim()
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
        if !ok {
            return Err(ValidationError::InvalidFormat {
                field: "phone".to_string(),
                reason: "may only contain digits, spaces, +, -, ( and )".to_string(),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Auth Validators
// =============================================================================

/// Validates an email address (shape only).
///
/// ```rust
/// use shopkeep_core::validation::validate_email;
///
/// assert!(validate_email("owner@shop.pk").is_ok());
/// assert!(validate_email("owner@shop").is_err());
/// assert!(validate_email("@shop.pk").is_err());
/// ```
pub fn validate_email(email: &str) -> ValidationResult<()> {
    required("email", email)?;
    let email = email.trim();
    let invalid = || ValidationError::InvalidFormat {
        field: "email".to_string(),
        reason: "must look like name@example.com".to_string(),
    };

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    let domain_ok = domain
        .split('.')
        .filter(|part| !part.is_empty())
        .count()
        >= 2
        && !domain.starts_with('.')
        && !domain.ends_with('.');
    if local.is_empty() || domain.contains('@') || !domain_ok || email.contains(' ') {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.is_empty() {
        return Err(ValidationError::Required {
            field: "password".to_string(),
        });
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// One-time codes are 4 to 8 digits.
pub fn validate_otp(otp: &str) -> ValidationResult<()> {
    let otp = otp.trim();
    required("otp", otp)?;
    if !(4..=8).contains(&otp.len()) || !otp.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "otp".to_string(),
            reason: "must be 4 to 8 digits".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordId;

    fn catalog() -> Vec<Product> {
        vec![Product {
            id: RecordId::Committed("srv-1".into()),
            product_id: "P-100".into(),
            product_name: "Rice".into(),
            brand: String::new(),
            category: String::new(),
            rack_number: String::new(),
            description: String::new(),
            supplier: None,
            inventories: Vec::new(),
        }]
    }

    fn form(product_id: &str) -> ProductForm {
        ProductForm {
            product_id: product_id.into(),
            product_name: "Something".into(),
            ..ProductForm::default()
        }
    }

    #[test]
    fn test_selling_below_cost_blocks() {
        let err = validate_inventory(Money::from_cents(10000), Money::from_cents(8000), 1)
            .unwrap_err();
        assert!(matches!(err, ValidationError::SellingBelowCost { .. }));
        assert_eq!(err.field(), "sellingPrice");

        assert!(validate_inventory(Money::from_cents(10000), Money::from_cents(10000), 0).is_ok());
        assert!(validate_inventory(Money::from_cents(100), Money::from_cents(200), -1).is_err());
    }

    #[test]
    fn test_product_id_unique_in_catalog() {
        let existing = catalog();
        let err = validate_product_form(&form("p-100"), &existing, None).unwrap_err();
        assert_eq!(
            err,
            ValidationError::Duplicate {
                field: "productId".into(),
                value: "p-100".into()
            }
        );

        // Editing the same record keeps its id.
        assert!(validate_product_form(&form("P-100"), &existing, Some("srv-1")).is_ok());
        assert!(validate_product_form(&form("P-200"), &existing, None).is_ok());
    }

    #[test]
    fn test_product_form_required_fields() {
        let mut f = form("");
        assert!(matches!(
            validate_product_form(&f, &[], None),
            Err(ValidationError::Required { .. })
        ));
        f.product_id = "P-1".into();
        f.product_name = "   ".into();
        assert_eq!(
            validate_product_form(&f, &[], None).unwrap_err().field(),
            "productName"
        );
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1, 5).is_ok());
        assert!(validate_quantity(5, 5).is_ok());
        assert!(validate_quantity(0, 5).is_err());
        assert!(validate_quantity(6, 5).is_err());
        assert!(validate_quantity(1, 0).is_err());
        assert!(validate_quantity(1000, 5000).is_err());
    }

    #[test]
    fn test_validate_discount() {
        let price = Money::from_cents(1000);
        assert!(validate_discount(Money::zero(), price).is_ok());
        assert!(validate_discount(price, price).is_ok());
        assert!(validate_discount(Money::from_cents(1001), price).is_err());
        assert!(validate_discount(Money::from_cents(-1), price).is_err());
    }

    #[test]
    fn test_supplier_form() {
        let mut f = SupplierForm {
            name: "Acme".into(),
            ..SupplierForm::default()
        };
        assert!(validate_supplier_form(&f).is_ok());
        f.email = Some("not-an-email".into());
        assert_eq!(validate_supplier_form(&f).unwrap_err().field(), "email");
        f.email = Some(String::new());
        f.phone = Some("+92 (300) 123-4567".into());
        assert!(validate_supplier_form(&f).is_ok());
    }

    #[test]
    fn test_auth_validators() {
        assert!(validate_password("secret").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_otp("123456").is_ok());
        assert!(validate_otp("12ab56").is_err());
        assert!(validate_otp("12").is_err());
    }

    #[test]
    fn test_validate_search_query() {
        assert_eq!(validate_search_query("  rice ").unwrap(), "rice");
        assert!(validate_search_query(&"a".repeat(101)).is_err());
    }
}
