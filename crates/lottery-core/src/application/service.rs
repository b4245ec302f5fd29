//! Round Service
//!
//! Owns the single live round. Every mutation takes the round lock, and the
//! lock is never held across an await point: verification and disbursement
//! run unlocked and re-validate the round before applying their effects.

use crate::application::scheduler::SchedulerHandle;
use crate::application::verifier::{PaymentVerifier, VerificationRequest};
use crate::application::wallet::{DisbursementPolicy, RoundWallet};
use crate::config::LotteryConfig;
use crate::domain::errors::{LotteryError, LotteryResult};
use crate::domain::round::{Deposit, Phase, Round, RoundId, RoundSnapshot};
use crate::domain::selector::WinnerSelector;
use crate::domain::wallet::Address;
use crate::ports::inbound::{BetRequest, LotteryApi};
use crate::ports::outbound::{Broadcaster, LedgerClient, Sleeper, TokioSleeper};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Collaborators the service is wired to.
pub struct ServiceDeps {
    /// `None` puts the service in simulation-only mode
    pub ledger: Option<Arc<dyn LedgerClient>>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl ServiceDeps {
    pub fn new(ledger: Option<Arc<dyn LedgerClient>>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            ledger,
            broadcaster,
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

/// Result of a countdown tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Running(Duration),
    /// Countdown reached zero, the draw is due
    Expired,
    /// The tick belongs to a round that is no longer counting down
    Stale,
}

struct LiveRound {
    round: Round,
    wallet: Arc<RoundWallet>,
}

pub struct RoundService {
    config: LotteryConfig,
    live: Mutex<LiveRound>,
    verifier: PaymentVerifier,
    ledger: Option<Arc<dyn LedgerClient>>,
    broadcaster: Arc<dyn Broadcaster>,
    sleeper: Arc<dyn Sleeper>,
    rng: Mutex<StdRng>,
    next_round_id: AtomicU64,
    policy: DisbursementPolicy,
    scheduler: SchedulerHandle,
}

impl RoundService {
    pub fn new(config: LotteryConfig, deps: ServiceDeps, scheduler: SchedulerHandle) -> Self {
        let verifier = PaymentVerifier::new(deps.ledger.clone(), deps.sleeper.clone(), &config);
        let policy = DisbursementPolicy {
            platform_address: config.platform_address.clone(),
            platform_fee_bps: config.platform_fee_bps,
            fee_reserve_lamports: config.fee_reserve_lamports,
        };
        let live = Self::allocate(1, &config);
        info!(
            round_id = 1,
            receiving_address = %live.round.receiving_address(),
            simulation_only = deps.ledger.is_none(),
            "Lottery round service started"
        );

        Self {
            config,
            live: Mutex::new(live),
            verifier,
            ledger: deps.ledger,
            broadcaster: deps.broadcaster,
            sleeper: deps.sleeper,
            rng: Mutex::new(StdRng::from_entropy()),
            next_round_id: AtomicU64::new(2),
            policy,
            scheduler,
        }
    }

    /// Replace the draw source, e.g. with a seeded generator.
    pub fn with_rng(self, rng: StdRng) -> Self {
        *self.rng.lock() = rng;
        self
    }

    pub fn config(&self) -> &LotteryConfig {
        &self.config
    }

    pub fn round_id(&self) -> RoundId {
        self.live.lock().round.id()
    }

    pub fn phase(&self) -> Phase {
        self.live.lock().round.phase()
    }

    pub fn receiving_address(&self) -> Address {
        self.live.lock().round.receiving_address().clone()
    }

    fn allocate(round_id: RoundId, config: &LotteryConfig) -> LiveRound {
        let wallet = Arc::new(RoundWallet::allocate());
        let round = Round::new(round_id, wallet.address().clone(), config.round_duration);
        LiveRound { round, wallet }
    }

    fn is_current(&self, round_id: RoundId) -> bool {
        let live = self.live.lock();
        live.round.id() == round_id && live.round.accepts_entries()
    }

    fn validate(request: &BetRequest) -> LotteryResult<()> {
        if request.identity.trim().is_empty() {
            return Err(LotteryError::InvalidBet("identity is required".into()));
        }
        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(LotteryError::InvalidBet("amount must be a positive number".into()));
        }
        Ok(())
    }

    /// Full admission flow: validate, verify with retries, re-check, apply.
    pub async fn admit(&self, request: BetRequest) -> LotteryResult<String> {
        Self::validate(&request)?;
        let BetRequest {
            identity,
            amount,
            transfer_id,
        } = request;
        let transfer_id = transfer_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(LotteryError::MissingTransfer)?;

        let (round_id, receiving_address) = {
            let live = self.live.lock();
            if !live.round.accepts_entries() {
                return Err(LotteryError::RoundEnded);
            }
            if live.round.has_transfer(&transfer_id) {
                return Err(LotteryError::DuplicateTransfer { transfer_id });
            }
            (live.round.id(), live.round.receiving_address().clone())
        };

        if self.config.is_simulated(&transfer_id) {
            debug!(round_id, identity = %identity, transfer_id = %transfer_id, "Simulated bet, skipping verification");
        } else {
            self.verify_with_retries(round_id, &transfer_id, amount, &identity, &receiving_address)
                .await?;
        }

        let (admission, started, snapshot) = {
            let mut live = self.live.lock();
            if live.round.id() != round_id {
                warn!(round_id, transfer_id = %transfer_id, "Round changed during verification, discarding bet");
                return Err(LotteryError::RoundEnded);
            }
            let admission = live.round.admit(
                Deposit {
                    identity: identity.clone(),
                    amount,
                    transfer_id: transfer_id.clone(),
                },
                Utc::now(),
            )?;
            let started = admission.first_of_round && live.round.start_countdown(Instant::now());
            (admission, started, live.round.snapshot())
        };

        info!(
            round_id,
            identity = %identity,
            amount,
            transfer_id = %transfer_id,
            new_participant = admission.new_participant,
            total_pot = snapshot.total_pot,
            "Bet admitted"
        );

        if started {
            info!(round_id, duration_ms = self.config.round_duration.as_millis() as u64, "Countdown started");
            self.scheduler.countdown_started(round_id);
        }
        self.broadcaster.broadcast(&snapshot);

        Ok(format!("Bet of {amount} SOL placed successfully"))
    }

    async fn verify_with_retries(
        &self,
        round_id: RoundId,
        transfer_id: &str,
        amount: f64,
        sender: &str,
        receiving_address: &Address,
    ) -> LotteryResult<()> {
        if !self.verifier.has_ledger() {
            warn!(transfer_id, "Ledger unavailable, only simulated bets are accepted");
            return Err(LotteryError::LedgerUnavailable);
        }

        let attempts = self.config.verification_attempts;
        for attempt in 1..=attempts {
            let request = VerificationRequest {
                transfer_id,
                expected_amount: amount,
                sender,
                receiving_address: Some(receiving_address),
            };
            if self.verifier.verify(request).await {
                return Ok(());
            }
            if attempt < attempts {
                debug!(transfer_id, attempt, "Verification attempt failed, retrying");
                self.sleeper.sleep(self.config.verification_backoff).await;
                if !self.is_current(round_id) {
                    return Err(LotteryError::RoundEnded);
                }
            }
        }

        warn!(transfer_id, attempts, "Verification exhausted");
        Err(LotteryError::VerificationFailed { attempts })
    }

    /// Recompute the countdown of `round_id` and push a snapshot.
    pub fn tick(&self, round_id: RoundId) -> TickOutcome {
        let snapshot = {
            let mut live = self.live.lock();
            if live.round.id() != round_id || live.round.phase() != Phase::Active {
                return TickOutcome::Stale;
            }
            if live.round.tick(Instant::now()).is_zero() {
                return TickOutcome::Expired;
            }
            live.round.snapshot()
        };
        self.broadcaster.broadcast(&snapshot);
        TickOutcome::Running(Duration::from_millis(snapshot.countdown_remaining))
    }

    /// Draw the winner of an expired round and pay it out.
    ///
    /// Returns the winner, or `None` if `round_id` is not live or not due.
    pub async fn finish_round(&self, round_id: RoundId) -> Option<String> {
        let (winner, wallet) = {
            let mut live = self.live.lock();
            if live.round.id() != round_id || !live.round.is_expired() {
                return None;
            }
            let drawn = {
                let mut rng = self.rng.lock();
                WinnerSelector::select(live.round.participants(), live.round.total_pot(), &mut *rng)
                    .map(|p| p.identity.clone())
            };
            let Some(winner) = drawn else {
                warn!(round_id, "Countdown expired without participants");
                return None;
            };
            live.round.declare_winner(winner.clone());
            (winner, live.wallet.clone())
        };

        info!(round_id, winner = %winner, "Winner selected");

        let receipt = match &self.ledger {
            Some(ledger) => wallet.disburse(ledger.as_ref(), &winner, &self.policy).await,
            None => {
                warn!(round_id, "Ledger unavailable, payout skipped");
                None
            }
        };

        let snapshot = {
            let mut live = self.live.lock();
            if live.round.id() != round_id {
                debug!(round_id, "Round reset during payout");
                return Some(winner);
            }
            if let Some(receipt) = receipt {
                live.round.record_payout(receipt);
            }
            live.round.snapshot()
        };
        self.broadcaster.broadcast(&snapshot);

        Some(winner)
    }

    /// Discard the live round and allocate a fresh one.
    ///
    /// With `expected` set, only resets if that round is still live.
    pub fn reset_round(&self, expected: Option<RoundId>) -> Option<RoundId> {
        let (old_id, new_id, snapshot) = {
            let mut live = self.live.lock();
            if expected.is_some_and(|id| id != live.round.id()) {
                return None;
            }
            let new_id = self.next_round_id.fetch_add(1, Ordering::Relaxed);
            live.round.begin_reset();
            let old_id = live.round.id();
            *live = Self::allocate(new_id, &self.config);
            (old_id, new_id, live.round.snapshot())
        };

        info!(
            old_round_id = old_id,
            round_id = new_id,
            receiving_address = %snapshot.receiving_address,
            "New round allocated"
        );
        self.scheduler.round_reset(new_id);
        self.broadcaster.broadcast(&snapshot);
        Some(new_id)
    }

    pub fn current_snapshot(&self) -> RoundSnapshot {
        self.live.lock().round.snapshot()
    }
}

#[async_trait]
impl LotteryApi for RoundService {
    async fn place_bet(&self, request: BetRequest) -> LotteryResult<String> {
        self.admit(request).await
    }

    async fn reset_game(&self) {
        info!("Round reset requested");
        self.reset_round(None);
    }

    fn snapshot(&self) -> RoundSnapshot {
        self.current_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::{
        Commitment, CompiledInstruction, CompiledMessage, MessageEncoding, TransactionRecord,
        SYSTEM_PROGRAM_ID,
    };
    use crate::ports::outbound::mocks::{MockLedger, RecordingBroadcaster};
    use crate::ports::outbound::NoDelay;

    fn service_with(ledger: Option<Arc<MockLedger>>) -> (RoundService, Arc<RecordingBroadcaster>) {
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let deps = ServiceDeps {
            ledger: ledger.map(|l| l as Arc<dyn LedgerClient>),
            broadcaster: broadcaster.clone(),
            sleeper: Arc::new(NoDelay),
        };
        let service = RoundService::new(LotteryConfig::default(), deps, SchedulerHandle::detached())
            .with_rng(StdRng::seed_from_u64(11));
        (service, broadcaster)
    }

    fn bet(identity: &str, amount: f64, transfer_id: &str) -> BetRequest {
        BetRequest {
            identity: identity.into(),
            amount,
            transfer_id: Some(transfer_id.into()),
        }
    }

    fn deposit_record(sender: &str, receiver: &str, lamports: u64) -> TransactionRecord {
        TransactionRecord {
            execution_error: None,
            message: MessageEncoding::Compiled(CompiledMessage {
                account_keys: vec![sender.into(), receiver.into(), SYSTEM_PROGRAM_ID.into()],
                instructions: vec![CompiledInstruction {
                    program_id_index: 2,
                    accounts: vec![0, 1],
                }],
            }),
            pre_balances: vec![lamports * 2, 0, 1],
            post_balances: vec![lamports - 5_000, lamports, 1],
        }
    }

    async fn expire(service: &RoundService) {
        tokio::time::advance(service.config().round_duration).await;
        assert_eq!(service.tick(service.round_id()), TickOutcome::Expired);
    }

    #[tokio::test]
    async fn test_first_simulated_bet_starts_countdown() {
        let (service, broadcaster) = service_with(None);
        assert_eq!(service.phase(), Phase::Waiting);

        service.place_bet(bet("alice", 1.0, "sim_1")).await.unwrap();

        let snapshot = service.snapshot();
        assert_eq!(snapshot.phase, Phase::Active);
        assert_eq!(snapshot.countdown_remaining, 60_000);
        assert_eq!(broadcaster.last().unwrap().participants.len(), 1);
    }

    #[tokio::test]
    async fn test_repeat_bets_accumulate() {
        let (service, _) = service_with(None);
        service.place_bet(bet("alice", 1.0, "sim_1")).await.unwrap();
        service.place_bet(bet("bob", 3.0, "sim_2")).await.unwrap();
        service.place_bet(bet("alice", 4.0, "sim_3")).await.unwrap();

        let snapshot = service.snapshot();
        assert_eq!(snapshot.participants.len(), 2);
        assert_eq!(snapshot.total_pot, 8.0);
        assert_eq!(snapshot.participants[0].stake, 5.0);
        assert_eq!(snapshot.participants[0].win_probability_percent, 62.5);
    }

    #[tokio::test]
    async fn test_real_bet_rejected_without_ledger() {
        let (service, _) = service_with(None);
        let err = service.place_bet(bet("alice", 1.0, "5xRealSig")).await.unwrap_err();
        assert_eq!(err, LotteryError::LedgerUnavailable);
        assert_eq!(service.snapshot().total_pot, 0.0);
    }

    #[tokio::test]
    async fn test_verified_bet_is_admitted() {
        let ledger = Arc::new(MockLedger::default());
        let (service, _) = service_with(Some(ledger.clone()));
        let pot = service.receiving_address();
        ledger.records.lock().insert(
            ("sig".to_string(), Commitment::Finalized),
            deposit_record("alice", pot.as_str(), 500_000_000),
        );

        service.place_bet(bet("alice", 0.5, "sig")).await.unwrap();
        assert_eq!(service.snapshot().participants[0].last_deposit_reference, "sig");
    }

    #[tokio::test]
    async fn test_unverifiable_bet_exhausts_retries() {
        let ledger = Arc::new(MockLedger::default());
        let (service, _) = service_with(Some(ledger.clone()));

        let err = service.place_bet(bet("alice", 1.0, "missing")).await.unwrap_err();
        assert_eq!(err, LotteryError::VerificationFailed { attempts: 3 });
        // three commitment levels per attempt
        assert_eq!(*ledger.fetch_calls.lock(), 9);
        assert_eq!(service.phase(), Phase::Waiting);
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let (service, _) = service_with(None);
        assert!(matches!(
            service.place_bet(bet("", 1.0, "sim_1")).await,
            Err(LotteryError::InvalidBet(_))
        ));
        assert!(matches!(
            service.place_bet(bet("alice", -1.0, "sim_1")).await,
            Err(LotteryError::InvalidBet(_))
        ));
        assert!(matches!(
            service.place_bet(bet("alice", f64::NAN, "sim_1")).await,
            Err(LotteryError::InvalidBet(_))
        ));
        let no_transfer = BetRequest {
            transfer_id: None,
            ..bet("alice", 1.0, "")
        };
        assert_eq!(
            service.place_bet(no_transfer).await,
            Err(LotteryError::MissingTransfer)
        );
    }

    #[tokio::test]
    async fn test_duplicate_transfer_rejected() {
        let (service, _) = service_with(None);
        service.place_bet(bet("alice", 1.0, "sim_1")).await.unwrap();
        assert!(matches!(
            service.place_bet(bet("bob", 1.0, "sim_1")).await,
            Err(LotteryError::DuplicateTransfer { .. })
        ));
    }

    #[tokio::test]
    async fn test_tick_before_expiry_keeps_running() {
        let (service, broadcaster) = service_with(None);
        service.place_bet(bet("alice", 1.0, "sim_1")).await.unwrap();
        let before = broadcaster.snapshots.lock().len();

        assert!(matches!(service.tick(service.round_id()), TickOutcome::Running(_)));
        assert_eq!(broadcaster.snapshots.lock().len(), before + 1);
        assert_eq!(service.tick(service.round_id() + 1), TickOutcome::Stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_round_happens_once() {
        let (service, _) = service_with(None);
        service.place_bet(bet("alice", 1.0, "sim_1")).await.unwrap();
        let round_id = service.round_id();
        assert_eq!(service.finish_round(round_id).await, None);
        expire(&service).await;

        assert_eq!(service.finish_round(round_id).await.as_deref(), Some("alice"));
        assert_eq!(service.finish_round(round_id).await, None);
        assert_eq!(service.tick(round_id), TickOutcome::Stale);

        let snapshot = service.snapshot();
        assert_eq!(snapshot.phase, Phase::Ended);
        assert_eq!(snapshot.winner.as_deref(), Some("alice"));
        assert!(snapshot.payout_receipt.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bet_after_winner_is_rejected() {
        let (service, _) = service_with(None);
        service.place_bet(bet("alice", 1.0, "sim_1")).await.unwrap();
        expire(&service).await;
        service.finish_round(service.round_id()).await.unwrap();

        let err = service.place_bet(bet("bob", 2.0, "sim_2")).await.unwrap_err();
        assert_eq!(err, LotteryError::RoundEnded);
        assert_eq!(service.snapshot().total_pot, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_payout_receipt_recorded() {
        let winner = crate::domain::wallet::RoundKeypair::from_seed([4u8; 32]).address();
        let ledger = Arc::new(MockLedger::default().with_balance(2_000_010_000));
        let (service, _) = service_with(Some(ledger.clone()));
        service
            .place_bet(bet(winner.as_str(), 2.0, "sim_1"))
            .await
            .unwrap();
        expire(&service).await;

        service.finish_round(service.round_id()).await.unwrap();
        assert_eq!(service.snapshot().payout_receipt.as_deref(), Some("payout-1"));
        assert_eq!(ledger.submitted.lock()[0][1].lamports, 1_950_000_000);
    }

    #[tokio::test]
    async fn test_reset_allocates_new_round() {
        let (service, broadcaster) = service_with(None);
        service.place_bet(bet("alice", 1.0, "sim_1")).await.unwrap();
        let old_id = service.round_id();
        let old_address = service.receiving_address();

        assert_eq!(service.reset_round(Some(old_id + 10)), None);
        let new_id = service.reset_round(Some(old_id)).unwrap();

        assert_ne!(new_id, old_id);
        let snapshot = broadcaster.last().unwrap();
        assert_eq!(snapshot.phase, Phase::Waiting);
        assert!(snapshot.participants.is_empty());
        assert_ne!(snapshot.receiving_address, old_address);
        // transfer ids are scoped to their round
        service.place_bet(bet("alice", 1.0, "sim_1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_resets_do_not_consume_round_ids() {
        let (service, _) = service_with(None);
        let first = service.round_id();

        for _ in 0..3 {
            assert_eq!(service.reset_round(Some(first + 1)), None);
        }

        assert_eq!(service.reset_round(Some(first)), Some(first + 1));
        assert_eq!(service.reset_round(None), Some(first + 2));
    }

    #[tokio::test]
    async fn test_verification_outliving_round_is_discarded() {
        struct ResetOnSleep(Mutex<Option<Arc<RoundService>>>);

        #[async_trait]
        impl Sleeper for ResetOnSleep {
            async fn sleep(&self, _duration: Duration) {
                if let Some(service) = self.0.lock().take() {
                    service.reset_round(None);
                }
            }
        }

        let ledger = Arc::new(MockLedger::default());
        let sleeper = Arc::new(ResetOnSleep(Mutex::new(None)));
        let deps = ServiceDeps {
            ledger: Some(ledger.clone() as Arc<dyn LedgerClient>),
            broadcaster: Arc::new(RecordingBroadcaster::default()),
            sleeper: sleeper.clone(),
        };
        let service = Arc::new(RoundService::new(
            LotteryConfig::default(),
            deps,
            SchedulerHandle::detached(),
        ));
        let pot = service.receiving_address();
        ledger.records.lock().insert(
            ("late".to_string(), Commitment::Finalized),
            deposit_record("alice", pot.as_str(), 1_000_000_000),
        );
        // the settling delay resets the round before the lookup completes
        *sleeper.0.lock() = Some(service.clone());

        let err = service.place_bet(bet("alice", 1.0, "late")).await.unwrap_err();
        assert_eq!(err, LotteryError::RoundEnded);
        assert_eq!(service.snapshot().total_pot, 0.0);
        assert_ne!(service.receiving_address(), pot);
    }
}
