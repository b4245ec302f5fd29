//! Inbound Ports (Driving Ports / API)

use crate::domain::errors::LotteryResult;
use crate::domain::round::RoundSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A subscriber's request to enter the live round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetRequest {
    /// Sender address the deposit came from
    pub identity: String,
    /// Claimed deposit amount in SOL
    pub amount: f64,
    /// Ledger transfer id of the deposit
    #[serde(default)]
    pub transfer_id: Option<String>,
}

/// Primary lottery API consumed by the push transport.
#[async_trait]
pub trait LotteryApi: Send + Sync {
    /// Verify the deposit behind `request` and admit it into the live round.
    ///
    /// On success returns a human readable confirmation.
    async fn place_bet(&self, request: BetRequest) -> LotteryResult<String>;

    /// Tear down the live round immediately and start a fresh one.
    async fn reset_game(&self);

    /// Current view of the live round.
    fn snapshot(&self) -> RoundSnapshot;
}
