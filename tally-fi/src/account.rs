use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tally_core::{CurrencyType, Money};

/// How an account's funds are held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// Keys held by the wallet itself.
    NonCustodial,
    /// Held by the service on the user's behalf.
    Trading,
    /// Custodial balance earning rewards.
    Interest,
    Fiat,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::NonCustodial => "non_custodial",
            AccountKind::Trading => "trading",
            AccountKind::Interest => "interest",
            AccountKind::Fiat => "fiat",
        }
    }

    pub fn is_crypto(&self) -> bool {
        !matches!(self, AccountKind::Fiat)
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address or identifier, tagged with the asset it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    value: String,
    currency: CurrencyType,
}

impl Address {
    pub fn new(value: impl Into<String>, currency: impl Into<CurrencyType>) -> Self {
        Self {
            value: value.into(),
            currency: currency.into(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn currency(&self) -> CurrencyType {
        self.currency
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.currency, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("address is {address} but balance is {balance}")]
    CurrencyMismatch {
        address: CurrencyType,
        balance: CurrencyType,
    },
    #[error("{kind} account cannot hold {currency}")]
    KindMismatch {
        kind: AccountKind,
        currency: CurrencyType,
    },
}

/// One addressable balance holder.
///
/// Fields are private so the asset-consistency checks in [`Account::new`]
/// cannot be bypassed. Updates return a new value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Account {
    index: u32,
    address: Address,
    balance: Money,
    name: String,
    kind: AccountKind,
}

impl Account {
    pub fn new(
        index: u32,
        address: Address,
        balance: Money,
        name: impl Into<String>,
        kind: AccountKind,
    ) -> Result<Self, AccountError> {
        validate(&address, &balance, kind)?;
        Ok(Self {
            index,
            address,
            balance,
            name: name.into(),
            kind,
        })
    }

    /// Position within the account's own asset family.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn balance(&self) -> &Money {
        &self.balance
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AccountKind {
        self.kind
    }

    pub fn currency(&self) -> CurrencyType {
        self.address.currency
    }

    pub fn is_fiat(&self) -> bool {
        self.kind == AccountKind::Fiat
    }

    pub fn with_balance(&self, balance: Money) -> Result<Self, AccountError> {
        validate(&self.address, &balance, self.kind)?;
        Ok(Self {
            balance,
            ..self.clone()
        })
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

fn validate(address: &Address, balance: &Money, kind: AccountKind) -> Result<(), AccountError> {
    let currency = address.currency();
    if balance.currency() != currency {
        return Err(AccountError::CurrencyMismatch {
            address: currency,
            balance: balance.currency(),
        });
    }
    if (kind == AccountKind::Fiat) != currency.is_fiat() {
        return Err(AccountError::KindMismatch { kind, currency });
    }
    Ok(())
}

/// First account whose (address, asset) pair already appeared earlier in the list.
pub fn find_duplicate(accounts: &[Account]) -> Option<&Account> {
    let mut seen = HashSet::new();
    accounts.iter().find(|account| !seen.insert(account.address()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use tally_core::{CryptoCurrency, FiatCurrency};

    fn btc_account(index: u32, address: &str) -> Account {
        Account::new(
            index,
            Address::new(address, CryptoCurrency::Bitcoin),
            Money::from_minor(1_000, CryptoCurrency::Bitcoin),
            format!("Wallet {index}"),
            AccountKind::NonCustodial,
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_mismatched_balance() {
        let result = Account::new(
            0,
            Address::new("0xabc", CryptoCurrency::Ethereum),
            Money::from_minor(5, CryptoCurrency::Pax),
            "Ether",
            AccountKind::NonCustodial,
        );
        assert_eq!(
            result,
            Err(AccountError::CurrencyMismatch {
                address: CryptoCurrency::Ethereum.into(),
                balance: CryptoCurrency::Pax.into(),
            })
        );
    }

    #[test]
    fn test_fiat_kind_requires_fiat_currency() {
        let crypto_as_fiat = Account::new(
            0,
            Address::new("1abc", CryptoCurrency::Bitcoin),
            Money::zero(CryptoCurrency::Bitcoin.into()),
            "Bad",
            AccountKind::Fiat,
        );
        assert!(matches!(crypto_as_fiat, Err(AccountError::KindMismatch { .. })));

        let fiat_as_trading = Account::new(
            0,
            Address::new("usd", FiatCurrency::Usd),
            Money::fiat(Decimal::new(1250, 2), FiatCurrency::Usd),
            "Cash",
            AccountKind::Trading,
        );
        assert!(matches!(fiat_as_trading, Err(AccountError::KindMismatch { .. })));
    }

    #[test]
    fn test_updates_produce_new_values() {
        let account = btc_account(0, "1abc");
        let renamed = account.with_name("Savings");
        assert_eq!(account.name(), "Wallet 0");
        assert_eq!(renamed.name(), "Savings");

        let topped_up = account
            .with_balance(Money::from_minor(5_000, CryptoCurrency::Bitcoin))
            .unwrap();
        assert_eq!(topped_up.balance().to_major_string(), "0.00005");
        assert!(account.with_balance(Money::zero(FiatCurrency::Eur.into())).is_err());
    }

    #[test]
    fn test_find_duplicate() {
        let accounts = vec![btc_account(0, "1abc"), btc_account(1, "1def")];
        assert!(find_duplicate(&accounts).is_none());

        let accounts = vec![btc_account(0, "1abc"), btc_account(1, "1def"), btc_account(2, "1abc")];
        assert_eq!(find_duplicate(&accounts).map(Account::index), Some(2));
    }

    #[test]
    fn test_serializes_kind_snake_case() {
        let json = serde_json::to_value(btc_account(3, "1abc")).unwrap();
        assert_eq!(json["kind"], "non_custodial");
        assert_eq!(json["address"]["currency"], "BTC");
        assert_eq!(json["index"], 3);
    }
}
