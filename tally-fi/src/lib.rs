pub mod account;
pub mod action;
pub mod kyc;

pub use account::{Account, AccountError, AccountKind, Address};
pub use action::Action;
pub use kyc::{EligibilityResponse, Tier, TierLimits, TierStatus, UserTier, UserTiers, VerificationResponse};
