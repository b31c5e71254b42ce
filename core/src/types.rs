//! Shared primitive types used across the entire engine.

use serde::{Deserialize, Serialize};

/// A symbol identifier as named in the paytable ("candy_red", "lollipop", ...).
pub type SymbolId = String;

/// A cluster identifier. Unique within one evaluation pass only.
pub type ClusterId = u32;

/// Monetary amounts (balance, bet, payouts) in credits.
pub type Credits = f64;

/// A cell address on the grid. Row 0 is the top row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    pub col: usize,
    pub row: usize,
}

impl GridPosition {
    pub fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }
}
