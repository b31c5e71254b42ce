//! Grid evaluator. Owns the symbol grid and everything that reads or
//! rewrites it: cluster detection, payouts, scatter counting, free-spin
//! multipliers, gravity and refill.
//!
//! Storage is column-major (`cells[col][row]`), row 0 at the top, so
//! gravity works on one contiguous column at a time.
//!
//! RULE: the evaluator never owns a generator. Every call that needs
//! randomness borrows the caller's SeededRng, so the draw order is
//! visible at the call site.

use crate::{
    config::{GameConfig, PaytableConfig, VolatilityPreset},
    rng::SeededRng,
    types::{ClusterId, Credits, GridPosition, SymbolId},
};
use serde::{Deserialize, Serialize};

/// Scatters needed anywhere on the grid to award free spins.
pub const SCATTER_TRIGGER_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub position: GridPosition,
    /// Set by the last evaluation pass.
    pub cluster_id: Option<ClusterId>,
    /// Drawn value of a multiplier symbol. Sticks for the rest of the spin.
    pub multiplier: Option<u32>,
}

impl Symbol {
    pub fn new(id: impl Into<SymbolId>, position: GridPosition) -> Self {
        Self { id: id.into(), position, cluster_id: None, multiplier: None }
    }
}

/// `cells[col][row]`; `None` is an empty cell, only seen mid-cascade.
pub type Grid = Vec<Vec<Option<Symbol>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub symbol_id: SymbolId,
    pub positions: Vec<GridPosition>,
    pub size: usize,
    pub payout: Credits,
}

impl Cluster {
    pub fn is_winning(&self) -> bool {
        self.payout > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplierHit {
    pub position: GridPosition,
    pub value: u32,
}

/// Outcome of one evaluation pass (one cascade step).
///
/// `total_payout == multiplier * base_payout`, where `base_payout` sums
/// every cluster's payout (sub-minimum clusters contribute zero).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinResult {
    pub clusters: Vec<Cluster>,
    pub base_payout: Credits,
    pub total_payout: Credits,
    pub multiplier: u32,
    pub scatter_count: usize,
    pub scatter_positions: Vec<GridPosition>,
    pub free_spins_awarded: u32,
    pub multiplier_symbols: Vec<MultiplierHit>,
}

impl WinResult {
    pub fn empty() -> Self {
        Self {
            clusters: Vec::new(),
            base_payout: 0.0,
            total_payout: 0.0,
            multiplier: 1,
            scatter_count: 0,
            scatter_positions: Vec::new(),
            free_spins_awarded: 0,
            multiplier_symbols: Vec::new(),
        }
    }

    pub fn winning_clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter().filter(|c| c.is_winning())
    }

    /// At least one cluster pays.
    pub fn is_win(&self) -> bool {
        self.clusters.iter().any(Cluster::is_winning)
    }

    pub fn triggers_free_spins(&self) -> bool {
        self.free_spins_awarded > 0
    }
}

pub struct GridEvaluator {
    paytable:   PaytableConfig,
    volatility: VolatilityPreset,
    columns:    usize,
    rows:       usize,
    grid:       Grid,
}

impl GridEvaluator {
    /// Grid dimensions are fixed here for the evaluator's lifetime.
    pub fn new(paytable: PaytableConfig, volatility: VolatilityPreset) -> Self {
        let columns = paytable.grid.columns;
        let rows = paytable.grid.rows;
        Self {
            paytable,
            volatility,
            columns,
            rows,
            grid: empty_grid(columns, rows),
        }
    }

    pub fn from_config(config: &GameConfig) -> Self {
        Self::new(config.paytable.clone(), config.volatility.clone())
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn paytable(&self) -> &PaytableConfig {
        &self.paytable
    }

    pub fn volatility(&self) -> &VolatilityPreset {
        &self.volatility
    }

    /// Reset to all-empty at the configured dimensions.
    pub fn initialize_grid(&mut self) {
        self.grid = empty_grid(self.columns, self.rows);
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Replace the grid wholesale. Rejected (returns false) when the
    /// shape does not match the configured dimensions. Symbol positions
    /// are rewritten to match where they were placed.
    pub fn set_grid(&mut self, mut grid: Grid) -> bool {
        let shape_ok = grid.len() == self.columns && grid.iter().all(|col| col.len() == self.rows);
        if !shape_ok {
            log::warn!(
                "set_grid rejected: expected {}x{} grid, got {} columns",
                self.columns,
                self.rows,
                grid.len()
            );
            return false;
        }
        for (col, cells) in grid.iter_mut().enumerate() {
            for (row, cell) in cells.iter_mut().enumerate() {
                if let Some(symbol) = cell {
                    symbol.position = GridPosition::new(col, row);
                }
            }
        }
        self.grid = grid;
        true
    }

    pub fn in_bounds(&self, pos: GridPosition) -> bool {
        pos.col < self.columns && pos.row < self.rows
    }

    pub fn symbol_at(&self, pos: GridPosition) -> Option<&Symbol> {
        self.grid.get(pos.col)?.get(pos.row)?.as_ref()
    }

    /// Put a symbol at `pos`. Out-of-bounds placements are ignored.
    pub fn place(&mut self, pos: GridPosition, id: impl Into<SymbolId>) -> bool {
        if !self.in_bounds(pos) {
            return false;
        }
        self.grid[pos.col][pos.row] = Some(Symbol::new(id, pos));
        true
    }

    pub fn occupied_count(&self) -> usize {
        self.grid.iter().flatten().filter(|cell| cell.is_some()).count()
    }

    /// Evaluate the current grid. Placement is untouched; symbols only
    /// gain cluster annotations and, during free spins, multiplier values.
    pub fn evaluate_win(&mut self, bet: Credits, is_free_spin: bool, rng: &mut SeededRng) -> WinResult {
        let mut clusters = self.find_clusters();

        let mut base_payout = 0.0;
        for cluster in &mut clusters {
            cluster.payout = self
                .paytable
                .symbol(&cluster.symbol_id)
                .map(|symbol| symbol.payout_multiple(cluster.size) * bet)
                .unwrap_or(0.0);
            base_payout += cluster.payout;
        }

        let scatter_positions = self.positions_of(&self.paytable.scatter.id);
        let scatter_count = scatter_positions.len();
        let free_spins_awarded = if scatter_count >= SCATTER_TRIGGER_COUNT {
            self.paytable.scatter.free_spins_for(scatter_count)
        } else {
            0
        };

        let (multiplier, multiplier_symbols) = if is_free_spin {
            self.resolve_multipliers(rng)
        } else {
            (1, Vec::new())
        };

        WinResult {
            clusters,
            base_payout,
            total_payout: f64::from(multiplier) * base_payout,
            multiplier,
            scatter_count,
            scatter_positions,
            free_spins_awarded,
            multiplier_symbols,
        }
    }

    /// Partition every occupied cell into 4-connected same-symbol
    /// clusters, scanning row-major. Single cells are clusters too.
    fn find_clusters(&mut self) -> Vec<Cluster> {
        let mut visited = vec![vec![false; self.rows]; self.columns];
        let mut clusters = Vec::new();
        let mut next_id: ClusterId = 0;

        for cell in self.grid.iter_mut().flatten().flatten() {
            cell.cluster_id = None;
        }

        for row in 0..self.rows {
            for col in 0..self.columns {
                if visited[col][row] {
                    continue;
                }
                let Some(symbol_id) = self.grid[col][row].as_ref().map(|s| s.id.clone()) else {
                    continue;
                };

                let positions = self.flood_fill(GridPosition::new(col, row), &symbol_id, &mut visited);
                for pos in &positions {
                    if let Some(symbol) = self.grid[pos.col][pos.row].as_mut() {
                        symbol.cluster_id = Some(next_id);
                    }
                }

                clusters.push(Cluster {
                    id: next_id,
                    symbol_id,
                    size: positions.len(),
                    positions,
                    payout: 0.0,
                });
                next_id += 1;
            }
        }
        clusters
    }

    /// Stack-based fill, up/down/left/right only.
    fn flood_fill(
        &self,
        start: GridPosition,
        symbol_id: &str,
        visited: &mut [Vec<bool>],
    ) -> Vec<GridPosition> {
        let mut positions = Vec::new();
        let mut stack = vec![start];
        visited[start.col][start.row] = true;

        while let Some(pos) = stack.pop() {
            positions.push(pos);
            for next in self.neighbours(pos) {
                if visited[next.col][next.row] {
                    continue;
                }
                if self.symbol_at(next).is_some_and(|s| s.id == symbol_id) {
                    visited[next.col][next.row] = true;
                    stack.push(next);
                }
            }
        }
        positions
    }

    fn neighbours(&self, pos: GridPosition) -> impl Iterator<Item = GridPosition> + '_ {
        let GridPosition { col, row } = pos;
        [
            (Some(col), row.checked_sub(1)),
            (Some(col), Some(row + 1)),
            (col.checked_sub(1), Some(row)),
            (Some(col + 1), Some(row)),
        ]
        .into_iter()
        .filter_map(|(c, r)| Some(GridPosition::new(c?, r?)))
        .filter(|p| self.in_bounds(*p))
    }

    /// Row-major positions holding `id`.
    fn positions_of(&self, id: &str) -> Vec<GridPosition> {
        let mut positions = Vec::new();
        for row in 0..self.rows {
            for col in 0..self.columns {
                if self.grid[col][row].as_ref().is_some_and(|s| s.id == id) {
                    positions.push(GridPosition::new(col, row));
                }
            }
        }
        positions
    }

    pub fn count_scatters(&self) -> usize {
        self.positions_of(&self.paytable.scatter.id).len()
    }

    /// Draw values for multiplier symbols that do not have one yet and
    /// multiply everything on the grid together, capped.
    fn resolve_multipliers(&mut self, rng: &mut SeededRng) -> (u32, Vec<MultiplierHit>) {
        let positions = self.positions_of(&self.paytable.multiplier.id);
        if positions.is_empty() {
            return (1, Vec::new());
        }

        let mut hits = Vec::with_capacity(positions.len());
        for pos in positions {
            let Some(symbol) = self.grid[pos.col][pos.row].as_mut() else {
                continue;
            };
            let value = match symbol.multiplier {
                Some(value) => value,
                None => {
                    let drawn = match rng.weighted_choice(
                        &self.volatility.multiplier_values,
                        &self.volatility.multiplier_weights,
                    ) {
                        Ok(value) => *value,
                        Err(e) => {
                            log::warn!("multiplier at {pos:?} falls back to 1: {e}");
                            1
                        }
                    };
                    symbol.multiplier = Some(drawn);
                    drawn
                }
            };
            hits.push(MultiplierHit { position: pos, value });
        }

        let cap = u64::from(self.volatility.multiplier_cap());
        let product = hits
            .iter()
            .fold(1u64, |acc, hit| acc.saturating_mul(u64::from(hit.value)).min(cap.max(1)));
        (product as u32, hits)
    }

    /// Empty every position referenced by the given clusters.
    pub fn remove_winning_symbols<'a>(&mut self, clusters: impl IntoIterator<Item = &'a Cluster>) {
        for cluster in clusters {
            self.remove_positions(&cluster.positions);
        }
    }

    /// Empty the given positions. Out-of-bounds positions are skipped.
    pub fn remove_positions(&mut self, positions: &[GridPosition]) {
        for pos in positions {
            if self.in_bounds(*pos) {
                self.grid[pos.col][pos.row] = None;
            }
        }
    }

    /// Per column, occupied cells fall to the bottom keeping their
    /// relative order; empties collect at the top.
    pub fn apply_gravity(&mut self) {
        let rows = self.rows;
        for (col, cells) in self.grid.iter_mut().enumerate() {
            let mut fallen: Vec<Symbol> = cells.drain(..).flatten().collect();
            let gap = rows - fallen.len();
            cells.resize(gap, None);
            for (offset, symbol) in fallen.iter_mut().enumerate() {
                symbol.position = GridPosition::new(col, gap + offset);
            }
            cells.extend(fallen.into_iter().map(Some));
        }
    }

    /// Fill every empty cell, row-major, with one uniform draw from
    /// `pool`. Returns how many cells were filled.
    pub fn fill_empty_positions(&mut self, pool: &[SymbolId], rng: &mut SeededRng) -> usize {
        let mut filled = 0;
        for row in 0..self.rows {
            for col in 0..self.columns {
                if self.grid[col][row].is_some() {
                    continue;
                }
                match rng.choice(pool) {
                    Ok(id) => {
                        self.grid[col][row] = Some(Symbol::new(id.clone(), GridPosition::new(col, row)));
                        filled += 1;
                    }
                    Err(e) => {
                        log::warn!("fill_empty_positions: {e}; {} cells left empty", self.columns * self.rows - self.occupied_count());
                        return filled;
                    }
                }
            }
        }
        filled
    }

    /// Flat sampling population: each paytable symbol and the scatter
    /// appear `round(rarity * multiplier)` times. `None` uses raw rarities.
    pub fn generate_symbol_pool(&self, preset: Option<&VolatilityPreset>) -> Vec<SymbolId> {
        let mut pool = Vec::new();
        for symbol in &self.paytable.symbols {
            let scale = preset.map_or(1.0, |p| p.rarity_multiplier(&symbol.id));
            push_copies(&mut pool, &symbol.id, symbol.rarity * scale);
        }

        let scatter = &self.paytable.scatter;
        let boost = preset.map_or(1.0, |p| p.rarity_multiplier(&scatter.id) * p.scatter_frequency_boost);
        push_copies(&mut pool, &scatter.id, scatter.rarity * boost);
        pool
    }

    /// The base pool plus multiplier symbols, which only land in free spins.
    pub fn generate_free_spin_pool(&self, preset: Option<&VolatilityPreset>) -> Vec<SymbolId> {
        let mut pool = self.generate_symbol_pool(preset);
        let multiplier = &self.paytable.multiplier;
        let scale = preset.map_or(1.0, |p| p.rarity_multiplier(&multiplier.id));
        push_copies(&mut pool, &multiplier.id, multiplier.rarity * scale);
        pool
    }
}

fn empty_grid(columns: usize, rows: usize) -> Grid {
    vec![vec![None; rows]; columns]
}

fn push_copies(pool: &mut Vec<SymbolId>, id: &str, weight: f64) {
    let copies = weight.round().max(0.0) as usize;
    pool.extend(std::iter::repeat(id.to_string()).take(copies));
}
