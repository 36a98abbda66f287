//! KYC tier records as returned by the identity backend.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Verification tier, ordered by how much identity checking was done.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    #[default]
    Tier0,
    Tier1,
    Tier2,
}

impl Tier {
    pub fn index(&self) -> u8 {
        match self {
            Tier::Tier0 => 0,
            Tier::Tier1 => 1,
            Tier::Tier2 => 2,
        }
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Tier::Tier0),
            1 => Ok(Tier::Tier1),
            2 => Ok(Tier::Tier2),
            other => Err(format!("Unknown tier index {other}")),
        }
    }
}

impl From<Tier> for u8 {
    fn from(value: Tier) -> Self {
        value.index()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier{}", self.index())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TierStatus {
    None,
    Pending,
    UnderReview,
    Rejected,
    Verified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTier {
    /// Unreadable indices decode as tier0.
    #[serde(rename = "index", default, deserialize_with = "lenient_tier")]
    pub tier: Tier,
    pub name: String,
    pub state: TierStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<TierLimits>,
}

impl UserTier {
    pub fn new(tier: Tier, state: TierStatus) -> Self {
        Self {
            tier,
            name: format!("Tier {}", tier.index()),
            state,
            limits: None,
        }
    }
}

fn lenient_tier<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Tier, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTier {
        Index(u8),
        Other(serde::de::IgnoredAny),
    }

    Ok(match RawTier::deserialize(deserializer)? {
        RawTier::Index(index) => Tier::try_from(index).unwrap_or_default(),
        RawTier::Other(_) => Tier::Tier0,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTiers {
    pub tiers: Vec<UserTier>,
}

impl UserTiers {
    pub fn new(tiers: Vec<UserTier>) -> Self {
        Self { tiers }
    }

    /// Highest tier in the verified state, tier0 when none is.
    pub fn latest_approved_tier(&self) -> Tier {
        self.tiers
            .iter()
            .filter(|tier| tier.state == TierStatus::Verified)
            .map(|tier| tier.tier)
            .max()
            .unwrap_or_default()
    }

    pub fn tier_state(&self, tier: Tier) -> TierStatus {
        self.tiers
            .iter()
            .find(|user_tier| user_tier.tier == tier)
            .map(|user_tier| user_tier.state)
            .unwrap_or(TierStatus::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityResponse {
    pub eligible: bool,
    #[serde(default)]
    pub tier: Tier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub verified: bool,
    #[serde(rename = "taskComplete")]
    pub task_complete: bool,
}
