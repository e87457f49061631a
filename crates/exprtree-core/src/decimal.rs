//! Fixed-point decimal arithmetic.
//!
//! Backed by an `i128` scaled by 10^9. Decimal arithmetic is always checked:
//! there is no unchecked wrap-around for this kind, so every operation that
//! leaves the representable range raises an overflow failure.

use std::fmt;

use crate::EvalError;

const SCALE: i128 = 1_000_000_000;

/// A 128-bit fixed-point decimal value with nine fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Decimal(i128);

impl Decimal {
    pub const ZERO: Decimal = Decimal(0);

    /// Construct from a raw scaled representation (value * 10^9).
    pub fn from_raw(raw: i128) -> Decimal {
        Decimal(raw)
    }

    pub fn raw(self) -> i128 {
        self.0
    }

    pub fn from_i64(v: i64) -> Decimal {
        Decimal(v as i128 * SCALE)
    }

    pub fn from_u64(v: u64) -> Decimal {
        Decimal(v as i128 * SCALE)
    }

    /// Checked construction from a wide integer.
    pub fn from_i128(v: i128) -> Result<Decimal, EvalError> {
        v.checked_mul(SCALE).map(Decimal).ok_or_else(Self::overflow)
    }

    /// Checked construction from a float. Always checked: decimal has no
    /// unchecked wrap-around.
    pub fn from_f64(v: f64) -> Result<Decimal, EvalError> {
        let scaled = v * SCALE as f64;
        if !scaled.is_finite() || scaled >= i128::MAX as f64 || scaled <= i128::MIN as f64 {
            return Err(Self::overflow());
        }
        Ok(Decimal(scaled as i128))
    }

    /// Lossy conversion to `f64`, used only when an explicit conversion to a
    /// float type was requested.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    /// The integral part, truncated toward zero.
    pub fn trunc_i128(self) -> i128 {
        self.0 / SCALE
    }

    fn overflow() -> EvalError {
        EvalError::Overflow { target: "decimal".into() }
    }

    pub fn checked_add(self, rhs: Decimal) -> Result<Decimal, EvalError> {
        self.0.checked_add(rhs.0).map(Decimal).ok_or_else(Self::overflow)
    }

    pub fn checked_sub(self, rhs: Decimal) -> Result<Decimal, EvalError> {
        self.0.checked_sub(rhs.0).map(Decimal).ok_or_else(Self::overflow)
    }

    pub fn checked_mul(self, rhs: Decimal) -> Result<Decimal, EvalError> {
        self.0
            .checked_mul(rhs.0)
            .map(|raw| Decimal(raw / SCALE))
            .ok_or_else(Self::overflow)
    }

    pub fn checked_div(self, rhs: Decimal) -> Result<Decimal, EvalError> {
        if rhs.0 == 0 {
            return Err(EvalError::DivisionByZero);
        }
        self.0
            .checked_mul(SCALE)
            .map(|raw| Decimal(raw / rhs.0))
            .ok_or_else(Self::overflow)
    }

    pub fn checked_rem(self, rhs: Decimal) -> Result<Decimal, EvalError> {
        if rhs.0 == 0 {
            return Err(EvalError::DivisionByZero);
        }
        Ok(Decimal(self.0 % rhs.0))
    }

    pub fn checked_neg(self) -> Result<Decimal, EvalError> {
        self.0.checked_neg().map(Decimal).ok_or_else(Self::overflow)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE;
        let frac = (self.0 % SCALE).unsigned_abs();
        if frac == 0 {
            write!(f, "{}", whole)
        } else {
            let digits = format!("{:09}", frac);
            write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_round_trips_through_scale() {
        let a = Decimal::from_i64(3);
        let b = Decimal::from_i64(4);
        assert_eq!(a.checked_add(b).unwrap(), Decimal::from_i64(7));
        assert_eq!(a.checked_mul(b).unwrap(), Decimal::from_i64(12));
        assert_eq!(b.checked_div(a).unwrap(), Decimal::from_raw(1_333_333_333));
    }

    #[test]
    fn division_by_zero_is_reported() {
        let a = Decimal::from_i64(1);
        assert_eq!(a.checked_div(Decimal::ZERO), Err(EvalError::DivisionByZero));
        assert_eq!(a.checked_rem(Decimal::ZERO), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn display_trims_trailing_zeros() {
        let half = Decimal::from_raw(1_500_000_000);
        assert_eq!(half.to_string(), "1.5");
        assert_eq!(Decimal::from_i64(2).to_string(), "2");
    }
}
