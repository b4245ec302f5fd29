//! # Lottery Core
//!
//! Round engine of the pooled-wager lottery: one live round at a time,
//! participants enter by sending a deposit to the round's receiving address,
//! and when the countdown expires a stake-weighted winner takes the pot.
//!
//! ## Architecture
//!
//! - **Domain**: Round aggregate, winner selection, wallet keys, ledger records
//! - **Ports**: Inbound (LotteryApi) and Outbound (LedgerClient, Broadcaster, Sleeper)
//! - **Application**: Round service, payment verifier, round wallet, scheduler
//!
//! ## Round lifecycle
//!
//! ```text
//! Waiting --first admission--> Active --countdown zero--> Ended --grace--> Resetting --> Waiting
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use application::scheduler::{RoundScheduler, SchedulerHandle};
pub use application::service::{RoundService, ServiceDeps, TickOutcome};
pub use config::LotteryConfig;
pub use domain::errors::{ConfigError, LedgerError, LedgerResult, LotteryError, LotteryResult};
pub use domain::ledger::*;
pub use domain::round::{Participant, Phase, RoundId, RoundSnapshot};
pub use domain::wallet::{Address, RoundKeypair};
pub use ports::inbound::{BetRequest, LotteryApi};
pub use ports::outbound::{Broadcaster, LedgerClient, Sleeper, TokioSleeper};
