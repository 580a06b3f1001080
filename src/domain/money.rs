use crate::error::{OrderError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ISO 4217 currency code, stored as three upper-case ASCII letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub const INR: Self = Self(*b"INR");
    pub const USD: Self = Self(*b"USD");

    pub fn new(code: &str) -> Result<Self> {
        let code = code.trim();
        let bytes: [u8; 3] = code.as_bytes().try_into().map_err(|_| {
            OrderError::ValidationError(format!("Currency code must be 3 letters: {code:?}"))
        })?;
        if !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(OrderError::ValidationError(format!(
                "Currency code must be alphabetic: {code:?}"
            )));
        }
        Ok(Self(bytes.map(|b| b.to_ascii_uppercase())))
    }

    pub fn code(&self) -> &str {
        // Constructed from ASCII letters only.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// Number of decimal places between the major and minor unit.
    pub fn exponent(&self) -> u32 {
        match self.code() {
            "JPY" | "KRW" | "VND" | "CLP" => 0,
            "BHD" | "KWD" | "OMR" | "JOD" | "TND" => 3,
            _ => 2,
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::INR
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = OrderError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.code().to_string()
    }
}

/// A monetary amount in integer minor units (paise, cents).
///
/// All arithmetic is checked and refuses to mix currencies; there is no
/// floating-point path into or out of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub minor_units: u64,
    pub currency: Currency,
}

impl Money {
    pub const fn new(minor_units: u64, currency: Currency) -> Self {
        Self {
            minor_units,
            currency,
        }
    }

    pub const fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    pub fn is_positive(&self) -> bool {
        self.minor_units > 0
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self> {
        self.ensure_same_currency(&rhs)?;
        let minor_units = self
            .minor_units
            .checked_add(rhs.minor_units)
            .ok_or_else(|| OrderError::ValidationError("Amount overflow".to_string()))?;
        Ok(Self::new(minor_units, self.currency))
    }

    /// Display value in major units, e.g. `1000` paise -> `10.00`.
    pub fn to_major(&self) -> Decimal {
        Decimal::from_i128_with_scale(i128::from(self.minor_units), self.currency.exponent())
    }

    fn ensure_same_currency(&self, other: &Self) -> Result<()> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(OrderError::ValidationError(format!(
                "Currency mismatch: {} vs {}",
                self.currency, other.currency
            )))
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_major(), self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_normalizes_case() {
        assert_eq!(Currency::new("inr").unwrap(), Currency::INR);
        assert_eq!(Currency::new(" usd ").unwrap().code(), "USD");
    }

    #[test]
    fn test_currency_rejects_bad_codes() {
        assert!(matches!(
            Currency::new("RUPEE"),
            Err(OrderError::ValidationError(_))
        ));
        assert!(matches!(
            Currency::new("I1R"),
            Err(OrderError::ValidationError(_))
        ));
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::new(500, Currency::INR);
        assert_eq!(
            a.checked_add(Money::new(250, Currency::INR)).unwrap(),
            Money::new(750, Currency::INR)
        );
    }

    #[test]
    fn test_money_rejects_currency_mix_and_overflow() {
        let inr = Money::new(1, Currency::INR);
        let usd = Money::new(1, Currency::USD);
        assert!(inr.checked_add(usd).is_err());
        assert!(
            Money::new(u64::MAX, Currency::INR)
                .checked_add(Money::new(1, Currency::INR))
                .is_err()
        );
    }

    #[test]
    fn test_to_major() {
        assert_eq!(Money::new(1000, Currency::INR).to_major(), dec!(10.00));
        let yen = Currency::new("JPY").unwrap();
        assert_eq!(Money::new(1000, yen).to_major(), dec!(1000));
        assert_eq!(Money::new(1999, Currency::INR).to_string(), "19.99 INR");
    }

    #[test]
    fn test_currency_serde_roundtrip_validates() {
        let money: Money =
            serde_json::from_str(r#"{"minor_units":1000,"currency":"inr"}"#).unwrap();
        assert_eq!(money.currency, Currency::INR);
        assert!(serde_json::from_str::<Money>(r#"{"minor_units":1,"currency":"XX"}"#).is_err());
    }
}
