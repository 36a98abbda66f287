pub mod cache;
pub mod money;

pub use cache::{CacheError, CacheState, RefreshPolicy, SingleFlightCache};
pub use money::Money;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Crypto assets the wallet can hold balances in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CryptoCurrency {
    Bitcoin,
    BitcoinCash,
    Ethereum,
    Pax,
    Stellar,
}

impl CryptoCurrency {
    pub const ALL: [CryptoCurrency; 5] = [
        CryptoCurrency::Bitcoin,
        CryptoCurrency::BitcoinCash,
        CryptoCurrency::Ethereum,
        CryptoCurrency::Pax,
        CryptoCurrency::Stellar,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            CryptoCurrency::Bitcoin => "BTC",
            CryptoCurrency::BitcoinCash => "BCH",
            CryptoCurrency::Ethereum => "ETH",
            CryptoCurrency::Pax => "PAX",
            CryptoCurrency::Stellar => "XLM",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            CryptoCurrency::Bitcoin => "Bitcoin",
            CryptoCurrency::BitcoinCash => "Bitcoin Cash",
            CryptoCurrency::Ethereum => "Ether",
            CryptoCurrency::Pax => "USD Digital",
            CryptoCurrency::Stellar => "Stellar",
        }
    }

    /// Number of minor units in one major unit, as a power of ten.
    pub fn precision(&self) -> u32 {
        match self {
            CryptoCurrency::Bitcoin | CryptoCurrency::BitcoinCash => 8,
            CryptoCurrency::Ethereum | CryptoCurrency::Pax => 18,
            CryptoCurrency::Stellar => 7,
        }
    }
}

impl fmt::Display for CryptoCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for CryptoCurrency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CryptoCurrency::ALL
            .into_iter()
            .find(|currency| currency.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!("Unsupported crypto currency '{s}'. Expected one of BTC, BCH, ETH, PAX, XLM.")
            })
    }
}

impl TryFrom<String> for CryptoCurrency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CryptoCurrency> for String {
    fn from(value: CryptoCurrency) -> Self {
        value.code().to_string()
    }
}

/// Fiat currencies backing fiat (cash) accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FiatCurrency {
    Usd,
    Eur,
    Gbp,
}

impl FiatCurrency {
    pub const ALL: [FiatCurrency; 3] = [FiatCurrency::Usd, FiatCurrency::Eur, FiatCurrency::Gbp];

    pub fn code(&self) -> &'static str {
        match self {
            FiatCurrency::Usd => "USD",
            FiatCurrency::Eur => "EUR",
            FiatCurrency::Gbp => "GBP",
        }
    }

    pub fn precision(&self) -> u32 {
        2
    }
}

impl fmt::Display for FiatCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for FiatCurrency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FiatCurrency::ALL
            .into_iter()
            .find(|currency| currency.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unsupported fiat currency '{s}'. Expected one of USD, EUR, GBP."))
    }
}

impl TryFrom<String> for FiatCurrency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FiatCurrency> for String {
    fn from(value: FiatCurrency) -> Self {
        value.code().to_string()
    }
}

/// Asset type of an address or a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CurrencyType {
    Crypto(CryptoCurrency),
    Fiat(FiatCurrency),
}

impl CurrencyType {
    pub fn code(&self) -> &'static str {
        match self {
            CurrencyType::Crypto(currency) => currency.code(),
            CurrencyType::Fiat(currency) => currency.code(),
        }
    }

    pub fn precision(&self) -> u32 {
        match self {
            CurrencyType::Crypto(currency) => currency.precision(),
            CurrencyType::Fiat(currency) => currency.precision(),
        }
    }

    pub fn is_fiat(&self) -> bool {
        matches!(self, CurrencyType::Fiat(_))
    }
}

impl From<CryptoCurrency> for CurrencyType {
    fn from(value: CryptoCurrency) -> Self {
        CurrencyType::Crypto(value)
    }
}

impl From<FiatCurrency> for CurrencyType {
    fn from(value: FiatCurrency) -> Self {
        CurrencyType::Fiat(value)
    }
}

impl fmt::Display for CurrencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for CurrencyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(crypto) = s.parse::<CryptoCurrency>() {
            return Ok(CurrencyType::Crypto(crypto));
        }
        s.parse::<FiatCurrency>()
            .map(CurrencyType::Fiat)
            .map_err(|_| format!("Unsupported currency '{s}'. Expected one of BTC, BCH, ETH, PAX, XLM, USD, EUR, GBP."))
    }
}

impl TryFrom<String> for CurrencyType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl<'a> TryFrom<&'a str> for CurrencyType {
    type Error = String;

    fn try_from(value: &'a str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurrencyType> for String {
    fn from(value: CurrencyType) -> Self {
        value.code().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_parsing() {
        assert_eq!("btc".parse::<CurrencyType>().unwrap(), CryptoCurrency::Bitcoin.into());
        assert_eq!("EUR".parse::<CurrencyType>().unwrap(), FiatCurrency::Eur.into());
        assert!("DOGE".parse::<CurrencyType>().is_err());

        let json = serde_json::to_string(&CurrencyType::Crypto(CryptoCurrency::Stellar)).unwrap();
        assert_eq!(json, "\"XLM\"");
        let parsed: CurrencyType = serde_json::from_str("\"GBP\"").unwrap();
        assert!(parsed.is_fiat());
    }
}
