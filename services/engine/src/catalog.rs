//! Game catalog rules and seed data
//!
//! The catalog is owned by an external admin surface; the engine only reads
//! definitions, validates them, and seeds a default set into an empty store.

use serde::{Deserialize, Serialize};
use shared::{
    Credits, BASIS_POINTS_PER_UNIT, DEFAULT_EXTRA_MATCH_AMPLIFIER, DEFAULT_FULL_MATCH_AMPLIFIER,
    DEFAULT_WIN_THRESHOLD, MAX_BLACKJACK_DECKS,
};

use crate::domain::{GameDefinition, GameKind};
use crate::errors::{AppError, Result};

/// Type-specific rule parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GameRules {
    Slots(SlotRules),
    Blackjack(BlackjackRules),
    Roulette,
}

impl GameRules {
    pub fn kind(&self) -> GameKind {
        match self {
            GameRules::Slots(_) => GameKind::Slots,
            GameRules::Blackjack(_) => GameKind::Blackjack,
            GameRules::Roulette => GameKind::Roulette,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSymbol {
    pub symbol: String,
    /// Relative draw weight; 0 removes the symbol from the reels
    pub weight: u32,
    /// Base multiplier paid when this symbol reaches the win threshold
    pub multiplier: u32,
}

impl SlotSymbol {
    pub fn new(symbol: &str, weight: u32, multiplier: u32) -> Self {
        Self {
            symbol: symbol.to_string(),
            weight,
            multiplier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRules {
    pub reels: u8,
    pub rows: u8,
    pub symbols: Vec<SlotSymbol>,
    pub win_threshold: u8,
    pub extra_match_amplifier: u32,
    pub full_match_amplifier: u32,
}

impl SlotRules {
    /// Fruit paytable with uniform reels
    pub fn classic(reels: u8, rows: u8) -> Self {
        Self {
            reels,
            rows,
            symbols: vec![
                SlotSymbol::new("🍒", 1, 5),
                SlotSymbol::new("🍋", 1, 10),
                SlotSymbol::new("🔔", 1, 25),
                SlotSymbol::new("⭐", 1, 50),
                SlotSymbol::new("💎", 1, 100),
            ],
            win_threshold: DEFAULT_WIN_THRESHOLD,
            extra_match_amplifier: DEFAULT_EXTRA_MATCH_AMPLIFIER,
            full_match_amplifier: DEFAULT_FULL_MATCH_AMPLIFIER,
        }
    }

    pub fn cells(&self) -> u32 {
        self.reels as u32 * self.rows as u32
    }

    pub fn symbol(&self, symbol: &str) -> Option<&SlotSymbol> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }

    pub fn validate(&self) -> Result<()> {
        if self.reels == 0 || self.rows == 0 {
            return Err(AppError::InvalidConfiguration(format!(
                "slot grid must have at least one reel and one row, got {}x{}",
                self.reels, self.rows
            )));
        }
        if self.symbols.iter().all(|s| s.weight == 0) {
            return Err(AppError::InvalidConfiguration(
                "slot reels have no drawable symbols".to_string(),
            ));
        }
        if self.win_threshold == 0 || self.win_threshold as u32 > self.cells() {
            return Err(AppError::InvalidConfiguration(format!(
                "win threshold {} outside 1..={}",
                self.win_threshold,
                self.cells()
            )));
        }
        if self.extra_match_amplifier == 0 || self.full_match_amplifier == 0 {
            return Err(AppError::InvalidConfiguration(
                "match amplifiers must be at least 1".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for symbol in &self.symbols {
            if !seen.insert(symbol.symbol.as_str()) {
                return Err(AppError::InvalidConfiguration(format!(
                    "duplicate slot symbol {}",
                    symbol.symbol
                )));
            }
        }
        Ok(())
    }
}

/// Winnings per unit staked, e.g. 3:2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRatio {
    pub numerator: u32,
    pub denominator: u32,
}

impl PayoutRatio {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self { numerator, denominator }
    }

    /// Basis points returned for a win at this ratio, stake included
    pub fn total_return_bps(&self) -> u32 {
        let winnings = BASIS_POINTS_PER_UNIT as u64 * self.numerator as u64 / self.denominator.max(1) as u64;
        (BASIS_POINTS_PER_UNIT as u64 + winnings).min(u32::MAX as u64) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackjackRules {
    pub decks: u8,
    pub natural_payout: PayoutRatio,
    pub win_payout: PayoutRatio,
    pub dealer_hits_soft_17: bool,
}

impl Default for BlackjackRules {
    fn default() -> Self {
        Self {
            decks: 1,
            natural_payout: PayoutRatio::new(3, 2),
            win_payout: PayoutRatio::new(1, 1),
            dealer_hits_soft_17: false,
        }
    }
}

impl BlackjackRules {
    pub fn validate(&self) -> Result<()> {
        if self.decks == 0 || self.decks > MAX_BLACKJACK_DECKS {
            return Err(AppError::InvalidConfiguration(format!(
                "blackjack decks {} outside 1..={}",
                self.decks, MAX_BLACKJACK_DECKS
            )));
        }
        if self.natural_payout.denominator == 0 || self.win_payout.denominator == 0 {
            return Err(AppError::InvalidConfiguration(
                "blackjack payout ratio with zero denominator".to_string(),
            ));
        }
        Ok(())
    }
}

impl GameDefinition {
    /// Reject definitions the outcome generator cannot play
    pub fn validate(&self) -> Result<()> {
        if !self.min_bet.is_positive() {
            return Err(AppError::InvalidConfiguration(format!(
                "game {} minimum bet must be positive",
                self.id
            )));
        }
        if self.min_bet > self.max_bet {
            return Err(AppError::InvalidConfiguration(format!(
                "game {} minimum bet {} exceeds maximum {}",
                self.id, self.min_bet, self.max_bet
            )));
        }
        if self.rtp_bps == 0 || self.rtp_bps > BASIS_POINTS_PER_UNIT {
            return Err(AppError::InvalidConfiguration(format!(
                "game {} rtp {} bps outside 1..={}",
                self.id, self.rtp_bps, BASIS_POINTS_PER_UNIT
            )));
        }
        match &self.rules {
            GameRules::Slots(rules) => rules.validate(),
            GameRules::Blackjack(rules) => rules.validate(),
            GameRules::Roulette => Ok(()),
        }
    }
}

fn credits(minor: i64) -> Credits {
    Credits::from_minor(minor)
}

/// Games seeded into an empty catalog. Ids are assigned by the store.
pub fn default_catalog() -> Vec<GameDefinition> {
    let weighted = |symbols: [(&str, u32, u32); 5]| {
        symbols
            .iter()
            .map(|(symbol, weight, multiplier)| SlotSymbol::new(symbol, *weight, *multiplier))
            .collect::<Vec<_>>()
    };

    vec![
        GameDefinition {
            id: 0,
            name: "Lucky Sevens".to_string(),
            min_bet: credits(5),
            max_bet: credits(5_000),
            rtp_bps: 9_550,
            is_active: true,
            rules: GameRules::Slots(SlotRules::classic(5, 1)),
        },
        GameDefinition {
            id: 0,
            name: "Treasure Quest".to_string(),
            min_bet: credits(10),
            max_bet: credits(10_000),
            rtp_bps: 9_680,
            is_active: true,
            rules: GameRules::Slots(SlotRules {
                symbols: weighted([
                    ("🍒", 30, 5),
                    ("🍋", 25, 10),
                    ("🔔", 20, 25),
                    ("⭐", 15, 50),
                    ("💎", 10, 100),
                ]),
                ..SlotRules::classic(5, 1)
            }),
        },
        GameDefinition {
            id: 0,
            name: "Pharaoh's Gold".to_string(),
            min_bet: credits(20),
            max_bet: credits(20_000),
            rtp_bps: 9_710,
            is_active: true,
            rules: GameRules::Slots(SlotRules {
                symbols: weighted([
                    ("🪲", 35, 5),
                    ("🏺", 25, 10),
                    ("👁", 20, 25),
                    ("🐍", 12, 50),
                    ("👑", 8, 100),
                ]),
                ..SlotRules::classic(5, 1)
            }),
        },
        GameDefinition {
            id: 0,
            name: "Classic Blackjack".to_string(),
            min_bet: credits(500),
            max_bet: credits(50_000),
            rtp_bps: 9_950,
            is_active: true,
            rules: GameRules::Blackjack(BlackjackRules::default()),
        },
        GameDefinition {
            id: 0,
            name: "European Roulette".to_string(),
            min_bet: credits(100),
            max_bet: credits(100_000),
            rtp_bps: 9_730,
            is_active: true,
            rules: GameRules::Roulette,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots_game(rules: SlotRules) -> GameDefinition {
        GameDefinition {
            id: 1,
            name: "test".to_string(),
            min_bet: credits(100),
            max_bet: credits(10_000),
            rtp_bps: 9_500,
            is_active: true,
            rules: GameRules::Slots(rules),
        }
    }

    #[test]
    fn test_default_catalog_is_valid() {
        let games = default_catalog();
        assert_eq!(games.len(), 5);
        for game in &games {
            game.validate().unwrap();
        }
        assert_eq!(games[3].kind(), GameKind::Blackjack);
    }

    #[test]
    fn test_zero_weight_reels_are_a_configuration_error() {
        let mut rules = SlotRules::classic(5, 1);
        for symbol in &mut rules.symbols {
            symbol.weight = 0;
        }
        assert!(matches!(
            slots_game(rules).validate(),
            Err(AppError::InvalidConfiguration(_))
        ));

        let mut rules = SlotRules::classic(5, 1);
        rules.symbols.clear();
        assert!(slots_game(rules).validate().is_err());
    }

    #[test]
    fn test_threshold_must_fit_grid() {
        let mut rules = SlotRules::classic(2, 1);
        rules.win_threshold = 3;
        assert!(slots_game(rules).validate().is_err());

        let mut rules = SlotRules::classic(1, 1);
        rules.win_threshold = 1;
        assert!(slots_game(rules).validate().is_ok());
    }

    #[test]
    fn test_bet_bounds_validation() {
        let mut game = slots_game(SlotRules::classic(5, 1));
        game.min_bet = credits(20_000);
        assert!(game.validate().is_err());

        game.min_bet = Credits::ZERO;
        assert!(game.validate().is_err());
    }

    #[test]
    fn test_payout_ratio_total_return() {
        assert_eq!(PayoutRatio::new(3, 2).total_return_bps(), 25_000);
        assert_eq!(PayoutRatio::new(1, 1).total_return_bps(), 20_000);
        assert_eq!(PayoutRatio::new(6, 5).total_return_bps(), 22_000);
    }

    #[test]
    fn test_rules_serde_tagging() {
        let json = serde_json::to_value(GameRules::Blackjack(BlackjackRules::default())).unwrap();
        assert_eq!(json["type"], "blackjack");
        assert_eq!(json["natural_payout"]["numerator"], 3);

        let back: GameRules = serde_json::from_value(serde_json::json!({"type": "roulette"})).unwrap();
        assert_eq!(back, GameRules::Roulette);
    }
}
