use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const BLACKJACK: u32 = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rank {
    #[serde(rename = "A")]
    Ace,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "J")]
    Jack,
    #[serde(rename = "Q")]
    Queen,
    #[serde(rename = "K")]
    King,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Ace,
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
    ];

    /// Face value with aces counted high
    pub fn value(&self) -> u32 {
        match self {
            Rank::Ace => 11,
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten | Rank::Jack | Rank::Queen | Rank::King => 10,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Rank::Ace => "A",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Rank::ALL.into_iter().find(|rank| rank.symbol() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suit = match self.suit {
            Suit::Hearts => '♥',
            Suit::Diamonds => '♦',
            Suit::Clubs => '♣',
            Suit::Spades => '♠',
        };
        write!(f, "{}{}", self.rank.symbol(), suit)
    }
}

/// Undealt cards for one round, drawn from the back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shoe {
    cards: Vec<Card>,
}

impl Shoe {
    /// Standard 52-card decks in suit-major order, unshuffled
    pub fn ordered(decks: u8) -> Self {
        let mut cards = Vec::with_capacity(decks as usize * 52);
        for _ in 0..decks {
            for suit in Suit::ALL {
                for rank in Rank::ALL {
                    cards.push(Card::new(rank, suit));
                }
            }
        }
        Self { cards }
    }

    pub fn shuffled<R: Rng + ?Sized>(decks: u8, rng: &mut R) -> Self {
        let mut shoe = Self::ordered(decks);
        fisher_yates(&mut shoe.cards, rng);
        shoe
    }

    /// Shoe that deals `cards` in the given order
    pub fn stacked(mut cards: Vec<Card>) -> Self {
        cards.reverse();
        Self { cards }
    }

    pub fn draw(&mut self) -> Option<Card> {
        self.cards.pop()
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }
}

/// Uniform in-place permutation: every position swaps with a uniformly chosen
/// index at or below it.
pub fn fisher_yates<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandValue {
    pub total: u32,
    /// An ace is still counted as 11
    pub soft: bool,
}

impl HandValue {
    pub fn is_bust(&self) -> bool {
        self.total > BLACKJACK
    }
}

pub fn hand_value(cards: &[Card]) -> HandValue {
    let mut total: u32 = cards.iter().map(|card| card.rank.value()).sum();
    let mut high_aces = cards.iter().filter(|card| card.rank == Rank::Ace).count();

    while total > BLACKJACK && high_aces > 0 {
        total -= 10;
        high_aces -= 1;
    }

    HandValue {
        total,
        soft: high_aces > 0,
    }
}

/// Two-card 21
pub fn is_natural(cards: &[Card]) -> bool {
    cards.len() == 2 && hand_value(cards).total == BLACKJACK
}

#[cfg(test)]
pub(crate) fn cards(ranks: &[&str]) -> Vec<Card> {
    ranks
        .iter()
        .enumerate()
        .map(|(i, rank)| Card::new(Rank::parse(rank).unwrap(), Suit::ALL[i % 4]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_soft_ace_reduction_applies_repeatedly() {
        let value = hand_value(&cards(&["A", "A", "9"]));
        assert_eq!(value.total, 21);
        assert!(value.soft);

        let value = hand_value(&cards(&["A", "A", "A", "9", "K"]));
        assert_eq!(value.total, 22);
        assert!(!value.soft);
        assert!(value.is_bust());
    }

    #[test]
    fn test_face_cards_count_ten() {
        assert_eq!(hand_value(&cards(&["K", "Q"])).total, 20);
        assert_eq!(hand_value(&cards(&["J", "10", "2"])).total, 22);
    }

    #[test]
    fn test_natural_needs_exactly_two_cards() {
        assert!(is_natural(&cards(&["A", "K"])));
        assert!(!is_natural(&cards(&["7", "4", "K"])));
        assert!(!is_natural(&cards(&["K", "Q"])));
    }

    #[test]
    fn test_shuffled_shoe_is_a_permutation() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut shoe = Shoe::shuffled(1, &mut rng);
        assert_eq!(shoe.remaining(), 52);

        let mut seen = HashSet::new();
        while let Some(card) = shoe.draw() {
            assert!(seen.insert(card));
        }
        assert_eq!(seen.len(), 52);
    }

    #[test]
    fn test_shuffle_is_deterministic_for_a_seed() {
        let a = Shoe::shuffled(2, &mut StdRng::seed_from_u64(99));
        let b = Shoe::shuffled(2, &mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
        assert_ne!(a, Shoe::ordered(2));
    }

    #[test]
    fn test_fisher_yates_reaches_every_position() {
        // first element must be able to land anywhere
        let mut rng = StdRng::seed_from_u64(1);
        let mut landed = HashSet::new();
        for _ in 0..500 {
            let mut items = [0, 1, 2, 3, 4];
            fisher_yates(&mut items, &mut rng);
            landed.insert(items.iter().position(|&x| x == 0).unwrap());
        }
        assert_eq!(landed.len(), 5);
    }

    #[test]
    fn test_stacked_shoe_deals_in_order() {
        let mut shoe = Shoe::stacked(cards(&["A", "K"]));
        assert_eq!(shoe.draw().unwrap().rank, Rank::Ace);
        assert_eq!(shoe.draw().unwrap().rank, Rank::King);
        assert!(shoe.draw().is_none());
    }

    #[test]
    fn test_card_display() {
        assert_eq!(Card::new(Rank::Ten, Suit::Spades).to_string(), "10♠");
    }
}
