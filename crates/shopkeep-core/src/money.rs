//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  The back office API speaks decimals (100, 99.5, "12.30").             │
//! │  Summing those as f64 drifts: 0.1 + 0.2 != 0.3.                        │
//! │                                                                         │
//! │  API boundary ──► Money::from_major_f64 ──► integer cents everywhere   │
//! │  Request body ◄── Money::to_major_f64  ◄── integer cents everywhere    │
//! │                                                                         │
//! │  Cart totals computed incrementally and from scratch are therefore     │
//! │  EXACTLY equal, not merely equal within a tolerance.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use shopkeep_core::money::Money;
//!
//! let price = Money::from_cents(1099);
//! let line: Money = price * 3;
//! assert_eq!(line.cents(), 3297);
//!
//! // Only at the API boundary:
//! assert_eq!(Money::from_major_f64(10.99).cents(), 1099);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// Signed, so a discount larger than the price shows up as a negative
/// amount instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from a decimal amount in major units.
    ///
    /// Rounds half away from zero to the nearest cent. Non-finite input
    /// (NaN, infinity) becomes zero.
    ///
    /// ## Example
    /// ```rust
    /// use shopkeep_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_f64(100.0).cents(), 10000);
    /// assert_eq!(Money::from_major_f64(0.125).cents(), 13);
    /// assert_eq!(Money::from_major_f64(f64::NAN).cents(), 0);
    /// ```
    pub fn from_major_f64(amount: f64) -> Self {
        if !amount.is_finite() {
            return Money::zero();
        }
        Money((amount * 100.0).round() as i64)
    }

    /// Returns the amount in major units, for request bodies and display.
    #[inline]
    pub fn to_major_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering, e.g. `12.50` or `-3.05`.
///
/// Currency symbols are the frontend's business.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Wire Format Helper
// =============================================================================

/// Serde adapter writing `Money` as a decimal number in major units.
///
/// The back office API expects `{"grandTotal": 250.5}`, not cents:
/// ```rust
/// use serde::Serialize;
/// use shopkeep_core::money::{self, Money};
///
/// #[derive(Serialize)]
/// struct Body {
///     #[serde(with = "money::as_major")]
///     total: Money,
/// }
///
/// let json = serde_json::to_string(&Body { total: Money::from_cents(25050) }).unwrap();
/// assert_eq!(json, r#"{"total":250.5}"#);
/// ```
pub mod as_major {
    use super::Money;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Money, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.to_major_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Money, D::Error> {
        f64::deserialize(deserializer).map(Money::from_major_f64)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
