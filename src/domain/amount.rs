//! Money types
//!
//! Domain primitives for monetary values. Amounts are validated at
//! construction time so that a zero, negative or non-finite value can never
//! reach the ledger. All arithmetic is fixed-point (`rust_decimal`).

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum allowed amount or balance (one quadrillion minor-unit-scaled units)
const MAX_AMOUNT: Decimal = Decimal::from_parts(2764472320, 232830, 0, false, 0);

/// Maximum decimal places any currency may configure
pub const MAX_SCALE: u32 = 8;

/// Round half up to `scale` decimal places.
///
/// The ledger only rounds non-negative values, for which "half up" and
/// "half away from zero" coincide.
pub fn round_half_up(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// Ledger currency and its minor-unit scale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    /// ISO 4217 code
    pub code: String,
    /// Number of decimal places in the minor unit
    pub scale: u32,
}

impl Currency {
    pub fn new(code: &str, scale: u32) -> Result<Self, AmountError> {
        if scale > MAX_SCALE {
            return Err(AmountError::TooManyDecimals(scale));
        }
        Ok(Self {
            code: code.to_uppercase(),
            scale,
        })
    }

    /// Indonesian Rupiah, booked with two decimal places
    pub fn idr() -> Self {
        Self {
            code: "IDR".to_string(),
            scale: 2,
        }
    }

    /// Round a value to this currency's minor unit (half up).
    pub fn round(&self, value: Decimal) -> Decimal {
        round_half_up(value, self.scale)
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::idr()
    }
}

/// Amount represents a validated, strictly positive monetary value.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - At most [`MAX_SCALE`] decimal places
/// - Never exceeds the ledger maximum
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use sharia_ledger::domain::Amount;
///
/// let amount = Amount::new(Decimal::new(100, 0)).unwrap();
/// assert_eq!(amount.value(), Decimal::new(100, 0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

/// Errors that can occur when creating money values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Balance cannot be negative (got {0})")]
    Negative(Decimal),

    #[error("Amount has too many decimal places (max 8, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount has more decimal places than {currency} allows ({scale})")]
    ScaleExceedsCurrency { currency: String, scale: u32 },

    #[error("Amount exceeds maximum allowed value")]
    Overflow,

    #[error("Amount is not a finite number")]
    NotFinite,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::TooManyDecimals` if more than 8 decimal places
    /// - `AmountError::Overflow` if value exceeds the ledger maximum
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        if value.scale() > MAX_SCALE {
            return Err(AmountError::TooManyDecimals(value.scale()));
        }

        if value > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }

        Ok(Self(value))
    }

    /// Create an Amount and check it fits the currency's minor unit.
    pub fn for_currency(value: Decimal, currency: &Currency) -> Result<Self, AmountError> {
        let amount = Self::new(value.normalize())?;
        if amount.0.scale() > currency.scale {
            return Err(AmountError::ScaleExceedsCurrency {
                currency: currency.code.clone(),
                scale: currency.scale,
            });
        }
        Ok(amount)
    }

    /// Create an Amount from an integer (no decimal places).
    pub fn from_integer(value: i64) -> Result<Self, AmountError> {
        Self::new(Decimal::from(value))
    }

    /// Create an Amount from a float. NaN and infinities are rejected.
    pub fn from_f64(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::NotFinite);
        }
        let decimal = Decimal::from_f64(value).ok_or(AmountError::NotFinite)?;
        Self::new(decimal)
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Multiply by a ratio and round half up to the currency's minor unit.
    ///
    /// The result may legitimately be zero (tiny ratios), so it is returned as
    /// a plain `Decimal`.
    pub fn mul_ratio(&self, ratio: Decimal, currency: &Currency) -> Result<Decimal, AmountError> {
        let product = self.0.checked_mul(ratio).ok_or(AmountError::Overflow)?;
        Ok(currency.round(product))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal =
            Decimal::from_str(s.trim()).map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Amount::from_str(&value)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.0.to_string()
    }
}

/// Balance represents an account balance (zero or positive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Balance(Decimal);

impl Balance {
    /// Create a new balance (zero or positive)
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value < Decimal::ZERO {
            return Err(AmountError::Negative(value));
        }

        if value > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }

        Ok(Self(value))
    }

    /// Create a zero balance
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Get the underlying value
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Check if balance is sufficient for a withdrawal
    pub fn is_sufficient_for(&self, amount: &Amount) -> bool {
        self.0 >= amount.value()
    }

    /// Add amount to balance
    pub fn credit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        Balance::new(self.0 + amount.value())
    }

    /// Subtract amount from balance
    pub fn debit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        Balance::new(self.0 - amount.value())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_positive() {
        let amount = Amount::new(Decimal::new(100, 0));
        assert!(amount.is_ok());
        assert_eq!(amount.unwrap().value(), Decimal::new(100, 0));
    }

    #[test]
    fn test_amount_zero_rejected() {
        let amount = Amount::new(Decimal::ZERO);
        assert!(matches!(amount, Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_negative_rejected() {
        let amount = Amount::new(Decimal::new(-100, 0));
        assert!(matches!(amount, Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_non_finite_rejected() {
        assert_eq!(Amount::from_f64(f64::NAN), Err(AmountError::NotFinite));
        assert_eq!(Amount::from_f64(f64::INFINITY), Err(AmountError::NotFinite));
        assert!(matches!(
            Amount::from_f64(-1.5),
            Err(AmountError::NotPositive(_))
        ));
        assert!(Amount::from_f64(12.5).is_ok());
    }

    #[test]
    fn test_amount_too_many_decimals() {
        let amount = Amount::new(Decimal::new(123456789, 9));
        assert!(matches!(amount, Err(AmountError::TooManyDecimals(9))));
    }

    #[test]
    fn test_amount_for_currency_scale() {
        let idr = Currency::idr();
        assert!(Amount::for_currency(Decimal::new(10050, 2), &idr).is_ok());
        // Trailing zeros do not count against the scale
        assert!(Amount::for_currency(Decimal::new(1005000, 4), &idr).is_ok());

        let result = Amount::for_currency(Decimal::new(100505, 3), &idr);
        assert!(matches!(
            result,
            Err(AmountError::ScaleExceedsCurrency { scale: 2, .. })
        ));
    }

    #[test]
    fn test_amount_overflow() {
        let value = MAX_AMOUNT + Decimal::ONE;
        assert!(matches!(Amount::new(value), Err(AmountError::Overflow)));
        assert!(Amount::new(MAX_AMOUNT).is_ok());
    }

    #[test]
    fn test_max_amount_constant() {
        assert_eq!(MAX_AMOUNT, Decimal::from_str("1000000000000000").unwrap());
    }

    #[test]
    fn test_amount_from_str() {
        let amount: Result<Amount, _> = "123.456".parse();
        assert_eq!(amount.unwrap().value(), Decimal::new(123456, 3));

        let bad: Result<Amount, _> = "abc".parse();
        assert!(matches!(bad, Err(AmountError::ParseError(_))));
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(Decimal::new(12345, 3), 2), Decimal::new(1235, 2));
        assert_eq!(round_half_up(Decimal::new(12344, 3), 2), Decimal::new(1234, 2));
        assert_eq!(round_half_up(Decimal::new(5, 1), 0), Decimal::ONE);
    }

    #[test]
    fn test_mul_ratio_rounds_half_up() {
        let amount = Amount::new(Decimal::new(1001, 2)).unwrap(); // 10.01
        let idr = Currency::idr();
        // 10.01 * 0.5 = 5.005 -> 5.01
        assert_eq!(amount.mul_ratio(Decimal::new(5, 1), &idr), Ok(Decimal::new(501, 2)));
        assert_eq!(amount.mul_ratio(Decimal::new(1, 4), &idr), Ok(Decimal::ZERO));
        assert_eq!(amount.mul_ratio(Decimal::MAX, &idr), Err(AmountError::Overflow));
    }

    #[test]
    fn test_balance_credit_debit() {
        let balance = Balance::zero();
        let amount = Amount::new(Decimal::new(100, 0)).unwrap();

        let balance = balance.credit(&amount).unwrap();
        assert_eq!(balance.value(), Decimal::new(100, 0));

        let withdraw = Amount::new(Decimal::new(30, 0)).unwrap();
        let balance = balance.debit(&withdraw).unwrap();
        assert_eq!(balance.value(), Decimal::new(70, 0));
    }

    #[test]
    fn test_balance_insufficient() {
        let balance = Balance::new(Decimal::new(50, 0)).unwrap();
        let amount = Amount::new(Decimal::new(100, 0)).unwrap();

        assert!(!balance.is_sufficient_for(&amount));
        assert!(matches!(balance.debit(&amount), Err(AmountError::Negative(_))));
    }

    #[test]
    fn test_repeated_deposit_withdraw_has_no_drift() {
        let start = Balance::new(Decimal::new(12345, 2)).unwrap();
        let million = Amount::from_integer(1_000_000).unwrap();

        let mut balance = start;
        for _ in 0..10_000 {
            balance = balance.credit(&million).unwrap();
            balance = balance.debit(&million).unwrap();
        }
        assert_eq!(balance, start);
    }
}
