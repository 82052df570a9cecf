use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::Multiplier;
use crate::catalog::SlotRules;
use crate::errors::{AppError, Result};

/// Drawn symbols, indexed `[row][reel]`
pub type Grid = Vec<Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpin {
    pub grid: Grid,
    pub winning_symbol: Option<String>,
    pub match_count: u32,
    pub multiplier: Multiplier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridEvaluation {
    pub winning_symbol: Option<String>,
    pub match_count: u32,
    pub multiplier: Multiplier,
}

enum Reel<'a> {
    Uniform(Vec<&'a str>),
    Weighted(Vec<&'a str>, WeightedIndex<u32>),
}

impl<'a> Reel<'a> {
    fn build(rules: &'a SlotRules) -> Result<Self> {
        let drawable: Vec<_> = rules.symbols.iter().filter(|s| s.weight > 0).collect();
        let first = drawable
            .first()
            .ok_or_else(|| AppError::InvalidConfiguration("slot reels have no drawable symbols".to_string()))?;
        let names = drawable.iter().map(|s| s.symbol.as_str()).collect();

        if drawable.iter().all(|s| s.weight == first.weight) {
            return Ok(Reel::Uniform(names));
        }

        let weights = WeightedIndex::new(drawable.iter().map(|s| s.weight))
            .map_err(|e| AppError::InvalidConfiguration(format!("slot weights: {}", e)))?;
        Ok(Reel::Weighted(names, weights))
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> &'a str {
        match self {
            Reel::Uniform(names) => names[rng.gen_range(0..names.len())],
            Reel::Weighted(names, weights) => names[weights.sample(rng)],
        }
    }
}

/// Draw one symbol per cell and score the grid
pub fn spin<R: Rng + ?Sized>(rules: &SlotRules, rng: &mut R) -> Result<SlotSpin> {
    let reel = Reel::build(rules)?;

    let grid: Grid = (0..rules.rows)
        .map(|_| {
            (0..rules.reels)
                .map(|_| reel.draw(rng).to_string())
                .collect()
        })
        .collect();

    let evaluation = evaluate_grid(rules, &grid);
    Ok(SlotSpin {
        grid,
        winning_symbol: evaluation.winning_symbol,
        match_count: evaluation.match_count,
        multiplier: evaluation.multiplier,
    })
}

/// Score a drawn grid by its most frequent symbol.
///
/// Ties on the highest count go to the symbol seen first in row-major order.
/// Symbols missing from the paytable never pay.
pub fn evaluate_grid(rules: &SlotRules, grid: &Grid) -> GridEvaluation {
    let mut counts: Vec<(&str, u32)> = Vec::new();
    for symbol in grid.iter().flatten() {
        match counts.iter_mut().find(|(seen, _)| *seen == symbol.as_str()) {
            Some((_, count)) => *count += 1,
            None => counts.push((symbol.as_str(), 1)),
        }
    }

    let mut best: Option<(&str, u32)> = None;
    for &(symbol, count) in &counts {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((symbol, count));
        }
    }

    let Some((symbol, count)) = best else {
        return GridEvaluation {
            winning_symbol: None,
            match_count: 0,
            multiplier: Multiplier::ZERO,
        };
    };

    let base = match rules.symbol(symbol) {
        Some(entry) if count >= rules.win_threshold as u32 => entry.multiplier,
        _ => {
            return GridEvaluation {
                winning_symbol: None,
                match_count: count,
                multiplier: Multiplier::ZERO,
            }
        }
    };

    let cells = grid.iter().map(Vec::len).sum::<usize>() as u32;
    let amplifier = if count == cells {
        rules.full_match_amplifier
    } else if count > rules.win_threshold as u32 {
        rules.extra_match_amplifier
    } else {
        1
    };

    GridEvaluation {
        winning_symbol: Some(symbol.to_string()),
        match_count: count,
        multiplier: Multiplier::from_whole(base as u64 * amplifier as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SlotSymbol;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn row(symbols: &[&str]) -> Grid {
        vec![symbols.iter().map(|s| s.to_string()).collect()]
    }

    fn abc_rules() -> SlotRules {
        SlotRules {
            symbols: vec![
                SlotSymbol::new("A", 1, 5),
                SlotSymbol::new("B", 1, 10),
                SlotSymbol::new("C", 1, 25),
            ],
            ..SlotRules::classic(5, 1)
        }
    }

    #[test]
    fn test_three_of_a_kind_pays_base_multiplier() {
        let evaluation = evaluate_grid(&abc_rules(), &row(&["A", "B", "A", "C", "A"]));
        assert_eq!(evaluation.winning_symbol.as_deref(), Some("A"));
        assert_eq!(evaluation.match_count, 3);
        assert_eq!(evaluation.multiplier, Multiplier::from_whole(5));
    }

    #[test]
    fn test_no_symbol_reaching_threshold_pays_nothing() {
        let evaluation = evaluate_grid(&abc_rules(), &row(&["A", "B", "A", "C", "B"]));
        assert_eq!(evaluation.winning_symbol, None);
        assert_eq!(evaluation.multiplier, Multiplier::ZERO);
    }

    #[test]
    fn test_amplifiers() {
        let four = evaluate_grid(&abc_rules(), &row(&["B", "B", "B", "C", "B"]));
        assert_eq!(four.multiplier, Multiplier::from_whole(20));

        let five = evaluate_grid(&abc_rules(), &row(&["C", "C", "C", "C", "C"]));
        assert_eq!(five.multiplier, Multiplier::from_whole(125));
    }

    #[test]
    fn test_tie_goes_to_first_seen_symbol() {
        let mut rules = abc_rules();
        rules.reels = 3;
        rules.rows = 2;
        let grid = vec![
            vec!["B".to_string(), "A".to_string(), "A".to_string()],
            vec!["B".to_string(), "A".to_string(), "B".to_string()],
        ];
        let evaluation = evaluate_grid(&rules, &grid);
        assert_eq!(evaluation.winning_symbol.as_deref(), Some("B"));
        assert_eq!(evaluation.match_count, 3);
    }

    #[test]
    fn test_single_row_grid_counts_across_reels() {
        let mut rules = abc_rules();
        rules.reels = 3;
        let evaluation = evaluate_grid(&rules, &row(&["A", "A", "A"]));
        // full grid
        assert_eq!(evaluation.multiplier, Multiplier::from_whole(25));
    }

    #[test]
    fn test_spin_shape_and_determinism() {
        let mut rules = abc_rules();
        rules.rows = 3;
        let a = spin(&rules, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = spin(&rules, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.grid.len(), 3);
        assert!(a.grid.iter().all(|row| row.len() == 5));
    }

    #[test]
    fn test_zero_weight_symbols_never_drawn() {
        let rules = SlotRules {
            symbols: vec![
                SlotSymbol::new("A", 0, 5),
                SlotSymbol::new("B", 3, 10),
                SlotSymbol::new("C", 1, 25),
            ],
            ..SlotRules::classic(5, 1)
        };
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let result = spin(&rules, &mut rng).unwrap();
            assert!(result.grid.iter().flatten().all(|s| s != "A"));
        }
    }

    #[test]
    fn test_empty_reels_are_configuration_errors() {
        let rules = SlotRules {
            symbols: vec![SlotSymbol::new("A", 0, 5)],
            ..SlotRules::classic(5, 1)
        };
        assert!(matches!(
            spin(&rules, &mut StdRng::seed_from_u64(0)),
            Err(AppError::InvalidConfiguration(_))
        ));
    }
}
