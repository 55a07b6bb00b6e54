//! Fixed-Point Prices
//!
//! The API transmits prices as a whole part plus billionths (`units`, `nano`).
//! Both parts carry the same sign. This module converts them to and from
//! `Decimal` without going through floating point.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of `nano` units in one whole unit.
const NANO_FACTOR: i64 = 1_000_000_000;

/// Scale of the `nano` part.
const NANO_SCALE: u32 = 9;

/// A price in `units` + `nano` (10^-9) representation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quotation {
    /// Whole part.
    pub units: i64,
    /// Fractional part in billionths.
    pub nano: i32,
}

impl Quotation {
    /// Create a quotation from raw parts.
    #[must_use]
    pub const fn new(units: i64, nano: i32) -> Self {
        Self { units, nano }
    }

    /// Convert to an exact decimal.
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        let mantissa = i128::from(self.units) * i128::from(NANO_FACTOR) + i128::from(self.nano);
        Decimal::from_i128_with_scale(mantissa, NANO_SCALE).normalize()
    }

    /// Convert from a decimal, truncating digits beyond nine decimal places.
    ///
    /// Returns `None` if the whole part does not fit in `i64`.
    #[must_use]
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        let truncated = value.trunc();
        let units = i64::try_from(truncated).ok()?;

        let fraction = (value - truncated) * Decimal::from(NANO_FACTOR);
        let nano = i32::try_from(fraction.trunc()).ok()?;

        Some(Self { units, nano })
    }
}

impl From<Quotation> for Decimal {
    fn from(value: Quotation) -> Self {
        value.to_decimal()
    }
}
