//! Stake-weighted winner selection
//!
//! One uniform draw over `[0, total_pot)`. Walking participants in arrival
//! order, participant *i* owns the half-open slice
//! `[cumulative(i - 1), cumulative(i))` of that range.

use super::round::Participant;
use rand::Rng;

pub struct WinnerSelector;

impl WinnerSelector {
    /// Draw a winner using `rng`. Returns `None` for an empty or zero pot.
    pub fn select<'a, R: Rng + ?Sized>(
        participants: &'a [Participant],
        total_pot: f64,
        rng: &mut R,
    ) -> Option<&'a Participant> {
        if participants.is_empty() || !total_pot.is_finite() || total_pot <= 0.0 {
            return None;
        }
        let draw = rng.gen_range(0.0..total_pot);
        Self::select_with_draw(participants, draw)
    }

    /// Deterministic selection for a given draw.
    pub fn select_with_draw(participants: &[Participant], draw: f64) -> Option<&Participant> {
        let mut cumulative = 0.0;
        for participant in participants {
            cumulative += participant.stake;
            if draw < cumulative {
                return Some(participant);
            }
        }
        // float accumulation can leave the last slice a hair short of the pot
        participants.last()
    }
}
