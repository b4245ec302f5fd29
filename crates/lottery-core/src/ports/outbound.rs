//! Outbound Ports (Driven Ports / SPI)
//!
//! The ledger, the subscriber fan-out and the clock used for backoff are all
//! collaborators owned outside this crate.

use crate::domain::errors::LedgerResult;
use crate::domain::ledger::{Commitment, SignatureStatus, TransactionRecord, TransferOutput};
use crate::domain::round::RoundSnapshot;
use crate::domain::wallet::{Address, RoundKeypair};
use async_trait::async_trait;
use std::time::Duration;

/// External ledger capability.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch a transaction record at the given commitment level.
    ///
    /// `Ok(None)` means the ledger does not (yet) know the transaction at
    /// that level.
    async fn fetch_transaction(
        &self,
        transfer_id: &str,
        commitment: Commitment,
    ) -> LedgerResult<Option<TransactionRecord>>;

    /// Lightweight status lookup without financial detail.
    async fn fetch_signature_status(&self, transfer_id: &str) -> LedgerResult<Option<SignatureStatus>>;

    /// Balance of `address` in lamports.
    async fn balance(&self, address: &Address) -> LedgerResult<u64>;

    /// Sign with `signer`, submit one atomic multi-output transfer and wait
    /// for a single confirmation level. Returns the transfer id.
    async fn submit_transfer(
        &self,
        signer: &RoundKeypair,
        outputs: &[TransferOutput],
    ) -> LedgerResult<String>;
}

/// Fan-out of round snapshots to every connected subscriber.
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, snapshot: &RoundSnapshot);
}

/// Delay source for settling and retry waits.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real timer backed by the tokio clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately; used where waits only slow tests down.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDelay;

#[async_trait]
impl Sleeper for NoDelay {
    async fn sleep(&self, _duration: Duration) {}
}
