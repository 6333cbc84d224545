//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A ledger that drifts by a paisa per bill is a ledger nobody trusts.   │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Paisa                                            │
//! │    Rs 10.99 = 1099 paisa, stored and summed as i64                     │
//! │    Every total is exact; rounding only happens at data entry           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use khata_core::money::Money;
//!
//! // Create from paisa (preferred)
//! let price = Money::from_paisa(1099); // Rs 10.99
//!
//! // Arithmetic operations
//! let total = price + Money::from_paisa(500); // Rs 15.99
//! let line = price.multiply_quantity(3);      // Rs 32.97
//!
//! // NEVER do this:
//! // let bad = Money::from_float(10.99); // NO SUCH METHOD EXISTS!
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in paisa (the smallest currency unit).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for corrections and payments
///   against a balance
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for sync payloads
/// ## Database Mapping
/// With the `sqlx` feature, Money maps transparently to an INTEGER paisa
/// column, so entity records can derive `FromRow` with Money fields.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from paisa (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use khata_core::money::Money;
    ///
    /// let price = Money::from_paisa(1099); // Represents Rs 10.99
    /// assert_eq!(price.paisa(), 1099);
    /// ```
    #[inline]
    pub const fn from_paisa(paisa: i64) -> Self {
        Money(paisa)
    }

    /// Creates a Money value from whole rupees.
    #[inline]
    pub const fn from_rupees(rupees: i64) -> Self {
        Money(rupees * 100)
    }

    /// Returns the value in paisa (smallest currency unit).
    #[inline]
    pub const fn paisa(&self) -> i64 {
        self.0
    }

    /// Returns the whole-rupee part (truncated toward zero).
    #[inline]
    pub const fn rupees(&self) -> i64 {
        self.0 / 100
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity, saturating at the i64 bounds.
    ///
    /// ## Why Saturating?
    /// Line totals are `price × quantity`. Quantities are validated well
    /// below overflow range, so saturation only triggers on corrupt data;
    /// a pegged total is still better than a silently wrapped one.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }

    /// Checked addition; None on overflow.
    #[inline]
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Sums an iterator of money values, saturating at the i64 bounds.
    pub fn sum<I: IntoIterator<Item = Money>>(iter: I) -> Money {
        iter.into_iter()
            .fold(Money::zero(), |acc, m| Money(acc.0.saturating_add(m.0)))
    }
}

// =============================================================================
// Operator Implementations
// =============================================================================

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 = self.0.saturating_sub(rhs.0);
    }
}

// =============================================================================
// Display
// =============================================================================

impl fmt::Display for Money {
    /// Formats as `Rs 10.99` / `-Rs 10.99` for logs and receipts.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}Rs {}.{:02}", sign, abs / 100, abs % 100)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_paisa() {
        let m = Money::from_paisa(1099);
        assert_eq!(m.paisa(), 1099);
        assert_eq!(m.rupees(), 10);
    }

    #[test]
    fn test_from_rupees() {
        assert_eq!(Money::from_rupees(25).paisa(), 2500);
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_paisa(1000);
        let b = Money::from_paisa(250);
        assert_eq!((a + b).paisa(), 1250);
        assert_eq!((a - b).paisa(), 750);

        let mut c = a;
        c += b;
        assert_eq!(c.paisa(), 1250);
    }

    #[test]
    fn test_multiply_quantity() {
        let price = Money::from_paisa(1099);
        assert_eq!(price.multiply_quantity(3).paisa(), 3297);
        assert_eq!(price.multiply_quantity(0).paisa(), 0);
    }

    #[test]
    fn test_sum() {
        let total = Money::sum([
            Money::from_paisa(100),
            Money::from_paisa(200),
            Money::from_paisa(50),
        ]);
        assert_eq!(total.paisa(), 350);
    }

    #[test]
    fn test_saturating_overflow() {
        let max = Money::from_paisa(i64::MAX);
        assert_eq!((max + Money::from_paisa(1)).paisa(), i64::MAX);
        assert_eq!(max.multiply_quantity(2).paisa(), i64::MAX);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_paisa(1099).to_string(), "Rs 10.99");
        assert_eq!(Money::from_paisa(-550).to_string(), "-Rs 5.50");
        assert_eq!(Money::from_paisa(5).to_string(), "Rs 0.05");
    }
}
