//! Domain module for the lottery round engine
//!
//! Contains the round aggregate, winner selection, wallet identities, ledger
//! value objects and errors.

pub mod errors;
pub mod ledger;
pub mod payout;
pub mod round;
pub mod selector;
pub mod wallet;

pub use errors::*;
pub use ledger::*;
pub use payout::*;
pub use round::*;
pub use selector::WinnerSelector;
pub use wallet::{Address, RoundKeypair};
