//! Outcome generation
//!
//! Everything here is pure given the random source passed in: no I/O and no
//! process-global generator.

pub mod blackjack;
pub mod cards;
pub mod slots;

use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::{Credits, BASIS_POINTS_PER_UNIT};

use crate::catalog::{BlackjackRules, GameRules};
use crate::domain::{GameDefinition, ResultClass};
use crate::errors::{AppError, Result};
use blackjack::{BlackjackRound, RoundResolution, RoundStage};
use cards::{Card, HandValue};
use slots::SlotSpin;

/// Payout factor in basis points, stake included (10_000 returns the stake)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Multiplier(u32);

impl Multiplier {
    pub const ZERO: Multiplier = Multiplier(0);
    pub const ONE: Multiplier = Multiplier(BASIS_POINTS_PER_UNIT);

    pub const fn from_bps(bps: u32) -> Self {
        Self(bps)
    }

    /// Whole-number factor, saturating
    pub fn from_whole(factor: u64) -> Self {
        let bps = factor.saturating_mul(BASIS_POINTS_PER_UNIT as u64);
        Self(bps.min(u32::MAX as u64) as u32)
    }

    pub const fn bps(&self) -> u32 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn apply(&self, stake: Credits) -> Result<Credits> {
        Ok(stake.checked_mul_bps(self.0)?)
    }
}

/// Player-facing view of a blackjack round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackjackView {
    pub player_cards: Vec<Card>,
    /// Only the upcard while the hand is open
    pub dealer_cards: Vec<Card>,
    pub player_value: HandValue,
    pub dealer_value: Option<HandValue>,
    pub stage: RoundStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<RoundResolution>,
}

impl BlackjackView {
    pub fn of(round: &BlackjackRound, resolution: Option<RoundResolution>) -> Self {
        let settled = round.stage == RoundStage::Settled;
        let dealer_cards = if settled {
            round.dealer.clone()
        } else {
            round.dealer.iter().take(1).copied().collect()
        };
        Self {
            player_cards: round.player.clone(),
            dealer_cards,
            player_value: round.player_value(),
            dealer_value: settled.then(|| round.dealer_value()),
            stage: round.stage,
            resolution,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum OutcomePayload {
    Slots(SlotSpin),
    Blackjack(BlackjackView),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub multiplier: Multiplier,
    pub classification: ResultClass,
    pub payload: OutcomePayload,
}

impl Outcome {
    pub fn payout(&self, stake: Credits) -> Result<Credits> {
        self.multiplier.apply(stake)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Round finished, ready to settle
    Final(Outcome),
    /// Blackjack hand waiting for the player
    Pending(BlackjackRound),
}

pub fn resolve<R: Rng + ?Sized>(definition: &GameDefinition, rng: &mut R) -> Result<Resolution> {
    definition.validate()?;

    match &definition.rules {
        GameRules::Slots(rules) => {
            let spin = slots::spin(rules, rng)?;
            let classification = if spin.multiplier.is_zero() {
                ResultClass::Loss
            } else {
                ResultClass::Win
            };
            Ok(Resolution::Final(Outcome {
                multiplier: spin.multiplier,
                classification,
                payload: OutcomePayload::Slots(spin),
            }))
        }
        GameRules::Blackjack(rules) => {
            let round = blackjack::deal(rules, rng)?;
            if round.stage == RoundStage::Settled {
                Ok(Resolution::Final(blackjack_outcome(&round, rules)?))
            } else {
                Ok(Resolution::Pending(round))
            }
        }
        GameRules::Roulette => Err(AppError::UnsupportedGame {
            game_id: definition.id,
            requested: "roulette",
        }),
    }
}

/// Outcome of a settled blackjack round
pub fn blackjack_outcome(round: &BlackjackRound, rules: &BlackjackRules) -> Result<Outcome> {
    let settlement = blackjack::settle_round(round, rules)?;
    Ok(Outcome {
        multiplier: settlement.multiplier,
        classification: settlement.classification,
        payload: OutcomePayload::Blackjack(BlackjackView::of(round, Some(settlement.resolution))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::default_catalog;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_multiplier_apply_truncates() {
        let stake = Credits::from_minor(105);
        assert_eq!(Multiplier::from_bps(25_000).apply(stake).unwrap().as_minor(), 262);
        assert_eq!(Multiplier::from_whole(5).apply(stake).unwrap().as_minor(), 525);
        assert_eq!(Multiplier::ZERO.apply(stake).unwrap(), Credits::ZERO);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        for game in default_catalog().iter().filter(|g| g.kind() != crate::domain::GameKind::Roulette) {
            let a = resolve(game, &mut StdRng::seed_from_u64(11)).unwrap();
            let b = resolve(game, &mut StdRng::seed_from_u64(11)).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_roulette_is_unsupported() {
        let roulette = default_catalog().pop().unwrap();
        assert!(matches!(
            resolve(&roulette, &mut StdRng::seed_from_u64(0)),
            Err(AppError::UnsupportedGame { .. })
        ));
    }

    #[test]
    fn test_open_hand_view_hides_hole_card() {
        let round = blackjack::deal_from(cards::Shoe::stacked(cards::cards(&["10", "10", "8", "8"]))).unwrap();
        let view = BlackjackView::of(&round, None);
        assert_eq!(view.dealer_cards.len(), 1);
        assert_eq!(view.dealer_value, None);

        let json = serde_json::to_value(OutcomePayload::Blackjack(view)).unwrap();
        assert_eq!(json["game"], "blackjack");
        assert_eq!(json["stage"], "awaiting_player_action");
    }

    #[test]
    fn test_slot_classification_follows_multiplier() {
        let game = &default_catalog()[0];
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            match resolve(game, &mut rng).unwrap() {
                Resolution::Final(outcome) => {
                    assert_eq!(outcome.multiplier.is_zero(), outcome.classification == ResultClass::Loss);
                }
                Resolution::Pending(_) => panic!("slots never pend"),
            }
        }
    }
}
