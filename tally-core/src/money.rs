use crate::{CryptoCurrency, CurrencyType, FiatCurrency};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Balance held by an account.
///
/// Crypto amounts are kept as integer minor units (satoshi, wei, stroop);
/// fiat amounts as decimals in major units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Money {
    Crypto {
        #[serde(with = "minor_units")]
        minor: u128,
        currency: CryptoCurrency,
    },
    Fiat {
        amount: Decimal,
        currency: FiatCurrency,
    },
}

impl Money {
    pub fn from_minor(minor: u128, currency: CryptoCurrency) -> Self {
        Money::Crypto { minor, currency }
    }

    pub fn fiat(amount: Decimal, currency: FiatCurrency) -> Self {
        Money::Fiat { amount, currency }
    }

    pub fn zero(currency: CurrencyType) -> Self {
        match currency {
            CurrencyType::Crypto(currency) => Money::from_minor(0, currency),
            CurrencyType::Fiat(currency) => Money::fiat(Decimal::ZERO, currency),
        }
    }

    pub fn currency(&self) -> CurrencyType {
        match self {
            Money::Crypto { currency, .. } => CurrencyType::Crypto(*currency),
            Money::Fiat { currency, .. } => CurrencyType::Fiat(*currency),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Money::Crypto { minor, .. } => *minor == 0,
            Money::Fiat { amount, .. } => amount.is_zero(),
        }
    }

    /// Renders the amount in major units without trailing zeros.
    pub fn to_major_string(&self) -> String {
        match self {
            Money::Crypto { minor, currency } => {
                let scale = 10u128.pow(currency.precision());
                let whole = minor / scale;
                let fraction = minor % scale;
                if fraction == 0 {
                    return whole.to_string();
                }
                let digits = format!("{:0width$}", fraction, width = currency.precision() as usize);
                format!("{}.{}", whole, digits.trim_end_matches('0'))
            }
            Money::Fiat { amount, .. } => amount.normalize().to_string(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_major_string(), self.currency())
    }
}

// u128 does not survive every JSON consumer, so minor units travel as strings.
mod minor_units {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u128>()
            .map_err(|e| D::Error::custom(format!("invalid minor amount '{raw}': {e}")))
    }
}
