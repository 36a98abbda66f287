//! One [`AssetAccountSource`](crate::source::AssetAccountSource) per asset family.

pub mod custodial;
pub mod ether;
pub mod external;
pub mod fiat;
pub mod legacy;
pub mod token;

pub use custodial::CustodialSource;
pub use ether::EtherSource;
pub use external::ExternalNetworkSource;
pub use fiat::FiatSource;
pub use legacy::LegacyChainSource;
pub use token::TokenSource;

use crate::provider::ProviderAccountDetails;
use crate::source::SourceError;
use tally_core::{CryptoCurrency, Money};
use tally_fi::{Account, AccountKind, Address};

/// Single non-custodial account built from a provider's details.
fn account_from_details(
    source_name: &'static str,
    currency: CryptoCurrency,
    details: ProviderAccountDetails,
    name: String,
) -> Result<Account, SourceError> {
    Account::new(
        0,
        Address::new(details.address, currency),
        Money::from_minor(details.balance_minor, currency),
        name,
        AccountKind::NonCustodial,
    )
    .map_err(|e| SourceError::new(source_name, e))
}
