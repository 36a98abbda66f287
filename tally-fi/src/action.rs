use serde::{Deserialize, Serialize};
use std::fmt;

/// What the user intends to do from a source account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Send,
    Swap,
    Sell,
    Deposit,
    Withdraw,
    Receive,
    ViewActivity,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Send,
        Action::Swap,
        Action::Sell,
        Action::Deposit,
        Action::Withdraw,
        Action::Receive,
        Action::ViewActivity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Send => "send",
            Action::Swap => "swap",
            Action::Sell => "sell",
            Action::Deposit => "deposit",
            Action::Withdraw => "withdraw",
            Action::Receive => "receive",
            Action::ViewActivity => "view_activity",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown action '{s}'."))
    }
}
