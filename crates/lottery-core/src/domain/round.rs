//! The live round and its participants
//!
//! A `Round` is never recycled: when play ends the service builds a new one
//! with a fresh receiving address.

use super::errors::{LotteryError, LotteryResult};
use super::wallet::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

/// Monotonic round sequence number
pub type RoundId = u64;

/// Round lifecycle phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Wallet allocated, nobody has entered yet
    Waiting,
    /// Countdown running
    Active,
    /// Winner drawn, payout attempted
    Ended,
    /// Teardown in progress
    Resetting,
}

/// A participant in the current round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub identity: String,
    pub stake: f64,
    pub win_probability_percent: f64,
    pub admitted_at: DateTime<Utc>,
    pub last_deposit_reference: String,
}

/// A verified (or simulated) deposit ready to be applied.
#[derive(Clone, Debug, PartialEq)]
pub struct Deposit {
    pub identity: String,
    pub amount: f64,
    pub transfer_id: String,
}

/// Result of applying a deposit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Admission {
    /// A new participant entry was created
    pub new_participant: bool,
    /// This was the first deposit of the round
    pub first_of_round: bool,
}

/// Observer view of the round, pushed to every subscriber.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSnapshot {
    pub round_id: RoundId,
    pub receiving_address: Address,
    pub participants: Vec<Participant>,
    pub total_pot: f64,
    /// Milliseconds until the draw
    pub countdown_remaining: u64,
    pub is_active: bool,
    pub winner: Option<String>,
    pub payout_receipt: Option<String>,
    pub phase: Phase,
}

#[derive(Debug)]
pub struct Round {
    id: RoundId,
    phase: Phase,
    receiving_address: Address,
    participants: Vec<Participant>,
    by_identity: HashMap<String, usize>,
    used_transfers: HashSet<String>,
    total_pot: f64,
    duration: Duration,
    started_at: Option<Instant>,
    countdown_remaining: Duration,
    winner: Option<String>,
    payout_receipt: Option<String>,
}

impl Round {
    pub fn new(id: RoundId, receiving_address: Address, duration: Duration) -> Self {
        Self {
            id,
            phase: Phase::Waiting,
            receiving_address,
            participants: Vec::new(),
            by_identity: HashMap::new(),
            used_transfers: HashSet::new(),
            total_pot: 0.0,
            duration,
            started_at: None,
            countdown_remaining: duration,
            winner: None,
            payout_receipt: None,
        }
    }

    pub fn id(&self) -> RoundId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn receiving_address(&self) -> &Address {
        &self.receiving_address
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, identity: &str) -> Option<&Participant> {
        self.by_identity
            .get(identity)
            .map(|&index| &self.participants[index])
    }

    pub fn total_pot(&self) -> f64 {
        self.total_pot
    }

    pub fn countdown_remaining(&self) -> Duration {
        self.countdown_remaining
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    pub fn payout_receipt(&self) -> Option<&str> {
        self.payout_receipt.as_deref()
    }

    /// Whether new deposits can still be applied.
    pub fn accepts_entries(&self) -> bool {
        self.winner.is_none() && matches!(self.phase, Phase::Waiting | Phase::Active)
    }

    pub fn has_transfer(&self, transfer_id: &str) -> bool {
        self.used_transfers.contains(transfer_id)
    }

    /// Apply a deposit, accumulating into an existing entry for the same identity.
    pub fn admit(&mut self, deposit: Deposit, admitted_at: DateTime<Utc>) -> LotteryResult<Admission> {
        if !self.accepts_entries() {
            return Err(LotteryError::RoundEnded);
        }
        if self.has_transfer(&deposit.transfer_id) {
            return Err(LotteryError::DuplicateTransfer {
                transfer_id: deposit.transfer_id,
            });
        }

        let first_of_round = self.participants.is_empty();
        self.used_transfers.insert(deposit.transfer_id.clone());
        self.total_pot += deposit.amount;

        let new_participant = match self.by_identity.get(&deposit.identity) {
            Some(&index) => {
                let entry = &mut self.participants[index];
                entry.stake += deposit.amount;
                entry.last_deposit_reference = deposit.transfer_id;
                false
            }
            None => {
                self.by_identity
                    .insert(deposit.identity.clone(), self.participants.len());
                self.participants.push(Participant {
                    identity: deposit.identity,
                    stake: deposit.amount,
                    win_probability_percent: 0.0,
                    admitted_at,
                    last_deposit_reference: deposit.transfer_id,
                });
                true
            }
        };

        self.recompute_probabilities();

        Ok(Admission {
            new_participant,
            first_of_round,
        })
    }

    fn recompute_probabilities(&mut self) {
        let total = self.total_pot;
        for participant in &mut self.participants {
            participant.win_probability_percent = if total > 0.0 {
                100.0 * participant.stake / total
            } else {
                0.0
            };
        }
    }

    /// Waiting -> Active. Returns false if the countdown was already running.
    pub fn start_countdown(&mut self, now: Instant) -> bool {
        if self.phase != Phase::Waiting {
            return false;
        }
        self.phase = Phase::Active;
        self.started_at = Some(now);
        self.countdown_remaining = self.duration;
        true
    }

    /// Recompute the remaining time from the recorded start instant.
    pub fn tick(&mut self, now: Instant) -> Duration {
        if let (Phase::Active, Some(started_at)) = (self.phase, self.started_at) {
            let elapsed = now.saturating_duration_since(started_at);
            let remaining = self.duration.saturating_sub(elapsed);
            self.countdown_remaining = self.countdown_remaining.min(remaining);
        }
        self.countdown_remaining
    }

    /// Active with no time left.
    pub fn is_expired(&self) -> bool {
        self.phase == Phase::Active && self.countdown_remaining.is_zero()
    }

    /// Active -> Ended. Only the first call has any effect.
    pub fn declare_winner(&mut self, identity: String) -> bool {
        if self.phase != Phase::Active || self.winner.is_some() {
            return false;
        }
        self.countdown_remaining = Duration::ZERO;
        self.winner = Some(identity);
        self.phase = Phase::Ended;
        true
    }

    pub fn record_payout(&mut self, receipt: String) {
        if self.phase == Phase::Ended && self.payout_receipt.is_none() {
            self.payout_receipt = Some(receipt);
        }
    }

    /// Mark the round as being torn down.
    pub fn begin_reset(&mut self) {
        self.phase = Phase::Resetting;
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            round_id: self.id,
            receiving_address: self.receiving_address.clone(),
            participants: self.participants.clone(),
            total_pot: self.total_pot,
            countdown_remaining: self.countdown_remaining.as_millis() as u64,
            is_active: self.phase == Phase::Active,
            winner: self.winner.clone(),
            payout_receipt: self.payout_receipt.clone(),
            phase: self.phase,
        }
    }
}
