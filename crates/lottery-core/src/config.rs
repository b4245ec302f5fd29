//! Configuration for the lottery round engine

use crate::domain::errors::ConfigError;
use crate::domain::ledger::SYSTEM_PROGRAM_ID;
use crate::domain::payout::BPS_DENOMINATOR;
use crate::domain::wallet::Address;
use std::time::Duration;

/// Round timing, verification and payout parameters
#[derive(Clone, Debug)]
pub struct LotteryConfig {
    /// Countdown length once the first participant is admitted
    pub round_duration: Duration,
    /// Interval between countdown ticks
    pub tick_interval: Duration,
    /// How long the ended round stays observable before reset
    pub grace_period: Duration,
    /// Wait before the first ledger lookup of a deposit
    pub settling_delay: Duration,
    /// Verification attempts per bet
    pub verification_attempts: u32,
    /// Wait between verification attempts
    pub verification_backoff: Duration,
    /// Accepted difference between claimed and observed amount (SOL)
    pub amount_tolerance: f64,
    /// Platform share of the pot in basis points
    pub platform_fee_bps: u64,
    /// Lamports held back to pay for the payout transaction itself
    pub fee_reserve_lamports: u64,
    /// Receiver of the platform fee
    pub platform_address: Address,
    /// Program id of native transfers
    pub system_program_id: String,
    /// Transfer ids with this prefix skip ledger verification
    pub simulation_prefix: String,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            round_duration: Duration::from_secs(60),
            tick_interval: Duration::from_millis(100),
            grace_period: Duration::from_secs(15),
            settling_delay: Duration::from_secs(2),
            verification_attempts: 3,
            verification_backoff: Duration::from_secs(3),
            amount_tolerance: 0.001,
            platform_fee_bps: 250,
            fee_reserve_lamports: 10_000,
            platform_address: Address::from_bytes(&[0x5a; 32]),
            system_program_id: SYSTEM_PROGRAM_ID.to_string(),
            simulation_prefix: "sim_".to_string(),
        }
    }
}

impl LotteryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("round_duration", self.round_duration),
            ("tick_interval", self.tick_interval),
            ("grace_period", self.grace_period),
        ];
        if let Some(&(name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::ZeroValue(name));
        }

        if self.verification_attempts == 0 {
            return Err(ConfigError::ZeroValue("verification_attempts"));
        }

        if self.platform_fee_bps >= BPS_DENOMINATOR {
            return Err(ConfigError::FeeTooHigh {
                bps: self.platform_fee_bps,
            });
        }

        self.platform_address
            .to_bytes()
            .map_err(|e| ConfigError::InvalidPlatformAddress(e.to_string()))?;

        Ok(())
    }

    pub fn is_simulated(&self, transfer_id: &str) -> bool {
        !self.simulation_prefix.is_empty() && transfer_id.starts_with(&self.simulation_prefix)
    }
}
