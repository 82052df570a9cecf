//! Single-hand blackjack round
//!
//! A round moves `AwaitingPlayerAction -> DealerPlay -> Settled`. Naturals on
//! the deal and player busts skip straight to `Settled`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::cards::{hand_value, is_natural, Card, HandValue, Shoe, BLACKJACK};
use super::Multiplier;
use crate::catalog::BlackjackRules;
use crate::domain::ResultClass;
use crate::errors::{AppError, Result};

const DEALER_STANDS_ON: u32 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStage {
    AwaitingPlayerAction,
    DealerPlay,
    Settled,
}

impl RoundStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStage::AwaitingPlayerAction => "awaiting_player_action",
            RoundStage::DealerPlay => "dealer_play",
            RoundStage::Settled => "settled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandAction {
    Hit,
    Stand,
    Double,
    Split,
}

impl HandAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandAction::Hit => "hit",
            HandAction::Stand => "stand",
            HandAction::Double => "double",
            HandAction::Split => "split",
        }
    }
}

impl fmt::Display for HandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hit" => Ok(HandAction::Hit),
            "stand" => Ok(HandAction::Stand),
            "double" => Ok(HandAction::Double),
            "split" => Ok(HandAction::Split),
            other => Err(AppError::InvalidInput(format!("unknown hand action: {}", other))),
        }
    }
}

/// How a settled round was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundResolution {
    PlayerNatural,
    DealerNatural,
    BothNatural,
    PlayerBust,
    DealerBust,
    PlayerHigher,
    DealerHigher,
    EqualTotals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSettlement {
    pub resolution: RoundResolution,
    pub classification: ResultClass,
    pub multiplier: Multiplier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackjackRound {
    pub player: Vec<Card>,
    pub dealer: Vec<Card>,
    pub shoe: Shoe,
    pub stage: RoundStage,
}

impl BlackjackRound {
    pub fn player_value(&self) -> HandValue {
        hand_value(&self.player)
    }

    pub fn dealer_value(&self) -> HandValue {
        hand_value(&self.dealer)
    }

    pub fn dealer_upcard(&self) -> Option<Card> {
        self.dealer.first().copied()
    }

    pub fn is_player_natural(&self) -> bool {
        is_natural(&self.player)
    }

    fn draw(&mut self) -> Result<Card> {
        self.shoe
            .draw()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("blackjack shoe exhausted")))
    }

    fn require_stage(&self, expected: RoundStage, action: &str) -> Result<()> {
        if self.stage != expected {
            return Err(AppError::InvalidInput(format!(
                "cannot {} while round is {}",
                action,
                self.stage.as_str()
            )));
        }
        Ok(())
    }
}

/// Shuffle a fresh shoe and deal player, dealer, player, dealer
pub fn deal<R: Rng + ?Sized>(rules: &BlackjackRules, rng: &mut R) -> Result<BlackjackRound> {
    deal_from(Shoe::shuffled(rules.decks, rng))
}

pub fn deal_from(shoe: Shoe) -> Result<BlackjackRound> {
    let mut round = BlackjackRound {
        player: Vec::with_capacity(2),
        dealer: Vec::with_capacity(2),
        shoe,
        stage: RoundStage::AwaitingPlayerAction,
    };

    for _ in 0..2 {
        let card = round.draw()?;
        round.player.push(card);
        let card = round.draw()?;
        round.dealer.push(card);
    }

    if is_natural(&round.player) || is_natural(&round.dealer) {
        round.stage = RoundStage::Settled;
    }

    Ok(round)
}

/// Draw one player card. A bust settles the round, 21 stands automatically.
pub fn hit(round: &mut BlackjackRound, rules: &BlackjackRules) -> Result<()> {
    round.require_stage(RoundStage::AwaitingPlayerAction, "hit")?;

    let card = round.draw()?;
    round.player.push(card);

    let value = round.player_value();
    if value.is_bust() {
        round.stage = RoundStage::Settled;
    } else if value.total == BLACKJACK {
        stand(round, rules)?;
    }
    Ok(())
}

pub fn stand(round: &mut BlackjackRound, rules: &BlackjackRules) -> Result<()> {
    round.require_stage(RoundStage::AwaitingPlayerAction, "stand")?;
    round.stage = RoundStage::DealerPlay;
    play_dealer(round, rules)
}

/// Dealer draws to 17, hitting soft 17 when the table says so
pub fn play_dealer(round: &mut BlackjackRound, rules: &BlackjackRules) -> Result<()> {
    round.require_stage(RoundStage::DealerPlay, "play dealer")?;

    loop {
        let value = round.dealer_value();
        let must_hit = value.total < DEALER_STANDS_ON
            || (value.total == DEALER_STANDS_ON && value.soft && rules.dealer_hits_soft_17);
        if !must_hit {
            break;
        }
        let card = round.draw()?;
        round.dealer.push(card);
    }

    round.stage = RoundStage::Settled;
    Ok(())
}

pub fn settle_round(round: &BlackjackRound, rules: &BlackjackRules) -> Result<RoundSettlement> {
    round.require_stage(RoundStage::Settled, "settle")?;

    let player = round.player_value();
    let dealer = round.dealer_value();

    let resolution = match (is_natural(&round.player), is_natural(&round.dealer)) {
        (true, true) => RoundResolution::BothNatural,
        (true, false) => RoundResolution::PlayerNatural,
        (false, true) => RoundResolution::DealerNatural,
        (false, false) if player.is_bust() => RoundResolution::PlayerBust,
        (false, false) if dealer.is_bust() => RoundResolution::DealerBust,
        (false, false) if player.total > dealer.total => RoundResolution::PlayerHigher,
        (false, false) if player.total < dealer.total => RoundResolution::DealerHigher,
        (false, false) => RoundResolution::EqualTotals,
    };

    let (classification, multiplier) = match resolution {
        RoundResolution::PlayerNatural => (
            ResultClass::Win,
            Multiplier::from_bps(rules.natural_payout.total_return_bps()),
        ),
        RoundResolution::DealerBust | RoundResolution::PlayerHigher => (
            ResultClass::Win,
            Multiplier::from_bps(rules.win_payout.total_return_bps()),
        ),
        RoundResolution::BothNatural | RoundResolution::EqualTotals => (ResultClass::Push, Multiplier::ONE),
        RoundResolution::DealerNatural | RoundResolution::PlayerBust | RoundResolution::DealerHigher => {
            (ResultClass::Loss, Multiplier::ZERO)
        }
    };

    Ok(RoundSettlement {
        resolution,
        classification,
        multiplier,
    })
}
