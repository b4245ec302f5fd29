//! Amount conversion and pot split

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Convert a lamport quantity (possibly negative delta) to SOL.
pub fn lamports_to_sol(lamports: i128) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// How the wallet balance is divided at round end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayoutSplit {
    pub platform_fee: u64,
    pub winner_amount: u64,
}

impl PayoutSplit {
    /// Split `balance` after holding back `reserve` for the network fee.
    ///
    /// Returns `None` when either leg would be zero.
    pub fn compute(balance: u64, reserve: u64, fee_bps: u64) -> Option<Self> {
        let remainder = balance.checked_sub(reserve)?;
        let platform_fee = (remainder as u128 * fee_bps as u128 / BPS_DENOMINATOR as u128) as u64;
        let winner_amount = remainder - platform_fee;
        if platform_fee == 0 || winner_amount == 0 {
            return None;
        }
        Some(Self {
            platform_fee,
            winner_amount,
        })
    }

    pub fn total(&self) -> u64 {
        self.platform_fee + self.winner_amount
    }
}
