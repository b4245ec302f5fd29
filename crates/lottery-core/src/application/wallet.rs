//! Per-round receiving wallet and end-of-round disbursement

use crate::domain::ledger::TransferOutput;
use crate::domain::payout::PayoutSplit;
use crate::domain::wallet::{Address, RoundKeypair};
use crate::ports::outbound::LedgerClient;
use tracing::{info, warn};

/// Fee parameters applied when the pot is paid out.
#[derive(Clone, Debug)]
pub struct DisbursementPolicy {
    pub platform_address: Address,
    pub platform_fee_bps: u64,
    pub fee_reserve_lamports: u64,
}

/// The receiving identity of one round.
///
/// Created together with its round and dropped with it; the address is
/// never handed to a later round.
#[derive(Debug)]
pub struct RoundWallet {
    keypair: RoundKeypair,
    address: Address,
}

impl RoundWallet {
    /// Allocate a fresh receiving identity.
    pub fn allocate() -> Self {
        Self::from_keypair(RoundKeypair::generate())
    }

    pub fn from_keypair(keypair: RoundKeypair) -> Self {
        let address = keypair.address();
        Self { keypair, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Pay the whole balance out to `winner`, minus the platform fee.
    ///
    /// Single attempt. Returns the transfer id, or `None` on any failure,
    /// in which case the funds stay at this wallet.
    pub async fn disburse(
        &self,
        ledger: &dyn LedgerClient,
        winner: &str,
        policy: &DisbursementPolicy,
    ) -> Option<String> {
        let winner_address = match Address::parse(winner) {
            Ok(address) => address,
            Err(e) => {
                warn!(wallet = %self.address, winner, error = %e, "Winner is not a payable address");
                return None;
            }
        };

        let balance = match ledger.balance(&self.address).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(wallet = %self.address, error = %e, "Could not read round wallet balance");
                return None;
            }
        };

        let Some(split) =
            PayoutSplit::compute(balance, policy.fee_reserve_lamports, policy.platform_fee_bps)
        else {
            warn!(
                wallet = %self.address,
                balance,
                reserve = policy.fee_reserve_lamports,
                "Balance too small to disburse"
            );
            return None;
        };

        let outputs = [
            TransferOutput {
                recipient: policy.platform_address.clone(),
                lamports: split.platform_fee,
            },
            TransferOutput {
                recipient: winner_address,
                lamports: split.winner_amount,
            },
        ];

        match ledger.submit_transfer(&self.keypair, &outputs).await {
            Ok(transfer_id) => {
                info!(
                    wallet = %self.address,
                    winner,
                    disbursed_lamports = split.total(),
                    winner_lamports = split.winner_amount,
                    fee_lamports = split.platform_fee,
                    transfer_id = %transfer_id,
                    "Pot disbursed"
                );
                Some(transfer_id)
            }
            Err(e) => {
                warn!(wallet = %self.address, winner, error = %e, "Disbursement failed, funds left in round wallet");
                None
            }
        }
    }
}
