//! Application layer for the lottery round engine
//!
//! Service orchestration, deposit verification, disbursement and timers.

pub mod scheduler;
pub mod service;
pub mod verifier;
pub mod wallet;

pub use scheduler::{RoundScheduler, SchedulerCommand, SchedulerHandle};
pub use service::{RoundService, ServiceDeps, TickOutcome};
pub use verifier::{PaymentVerifier, Rejection, VerificationRequest};
pub use wallet::{DisbursementPolicy, RoundWallet};
