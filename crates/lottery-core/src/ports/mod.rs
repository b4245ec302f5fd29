//! Ports module for the lottery round engine
//!
//! Defines inbound (API) and outbound (SPI) port traits.

pub mod inbound;
pub mod outbound;

pub use inbound::{BetRequest, LotteryApi};
pub use outbound::{Broadcaster, LedgerClient, NoDelay, Sleeper, TokioSleeper};
