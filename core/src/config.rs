//! Paytable, volatility presets and engine settings.
//!
//! Loaded once per session and treated as immutable afterwards.
//! Lookups that miss (unknown symbol, untabulated size) resolve to zero:
//! a misconfigured table can under-pay but never over-pay.

use crate::{
    error::{EngineError, EngineResult},
    types::{Credits, SymbolId},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Hard ceiling for the free-spin cascade multiplier, whatever the preset says.
pub const MAX_MULTIPLIER: u32 = 1000;

pub const DEFAULT_VOLATILITY: &str = "medium";

const SHIPPED_PAYTABLE: &str = include_str!("../../data/paytable.json");
const SHIPPED_PRESETS: [(&str, &str); 3] = [
    ("low", include_str!("../../data/volatility/low.json")),
    ("medium", include_str!("../../data/volatility/medium.json")),
    ("high", include_str!("../../data/volatility/high.json")),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    pub columns: usize,
    pub rows: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { columns: 6, rows: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub id: SymbolId,
    /// Relative frequency in the symbol pool.
    pub rarity: f64,
    /// Smallest cluster that pays.
    pub min_cluster: usize,
    /// Cluster size -> bet multiple. Exact-size keys.
    pub payout_table: BTreeMap<usize, f64>,
}

impl SymbolConfig {
    /// Bet multiple for a cluster of `size`. Sizes above the largest key
    /// pay the largest key; untabulated sizes below it pay nothing.
    pub fn payout_multiple(&self, size: usize) -> f64 {
        if size < self.min_cluster {
            return 0.0;
        }
        if let Some(multiple) = self.payout_table.get(&size) {
            return *multiple;
        }
        match self.payout_table.last_key_value() {
            Some((max_size, multiple)) if size > *max_size => *multiple,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatterConfig {
    pub id: SymbolId,
    pub rarity: f64,
    /// Scatter count -> free spins awarded.
    pub free_spins_table: BTreeMap<usize, u32>,
}

impl ScatterConfig {
    /// Exact-count lookup, clamped to the largest key for bigger counts.
    pub fn free_spins_for(&self, count: usize) -> u32 {
        if let Some(spins) = self.free_spins_table.get(&count) {
            return *spins;
        }
        match self.free_spins_table.last_key_value() {
            Some((max_count, spins)) if count > *max_count => *spins,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiplierConfig {
    pub id: SymbolId,
    pub rarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaytableConfig {
    pub grid: GridConfig,
    pub target_rtp: f64,
    pub rtp_tolerance: f64,
    pub max_cascades: u32,
    pub symbols: Vec<SymbolConfig>,
    pub scatter: ScatterConfig,
    pub multiplier: MultiplierConfig,
}

impl PaytableConfig {
    pub fn symbol(&self, id: &str) -> Option<&SymbolConfig> {
        self.symbols.iter().find(|s| s.id == id)
    }

    pub fn rtp_within_target(&self, rtp: f64) -> bool {
        (rtp - self.target_rtp).abs() <= self.rtp_tolerance
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityPreset {
    pub name: String,
    /// Per-symbol rarity scaling. Missing symbols scale by 1.0.
    #[serde(default)]
    pub rarity_multipliers: HashMap<SymbolId, f64>,
    pub multiplier_values: Vec<u32>,
    pub multiplier_weights: Vec<f64>,
    pub max_multiplier_per_spin: u32,
    #[serde(default = "one")]
    pub scatter_frequency_boost: f64,
}

fn one() -> f64 {
    1.0
}

impl VolatilityPreset {
    pub fn rarity_multiplier(&self, id: &str) -> f64 {
        self.rarity_multipliers.get(id).copied().unwrap_or(1.0)
    }

    /// Effective cap for one cascade's multiplier product.
    pub fn multiplier_cap(&self) -> u32 {
        self.max_multiplier_per_spin.min(MAX_MULTIPLIER)
    }
}

/// Host-facing knobs that are not part of the game math.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub initial_balance: Credits,
    pub default_bet: Credits,
    /// Spin results kept in history; oldest evicted first.
    pub history_capacity: usize,
    /// Presentation pauses. All zero means headless.
    pub spin_delay_ms: u64,
    pub win_delay_ms: u64,
    pub tumble_delay_ms: u64,
    pub auto_spin_delay_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            initial_balance: 1000.0,
            default_bet: 1.0,
            history_capacity: 100,
            spin_delay_ms: 0,
            win_delay_ms: 0,
            tumble_delay_ms: 0,
            auto_spin_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    pub paytable: PaytableConfig,
    pub volatility: VolatilityPreset,
    pub settings: EngineSettings,
}

impl GameConfig {
    /// Load from a data directory laid out like the shipped `data/`:
    /// `paytable.json` plus `volatility/<name>.json`, and an optional
    /// `engine.json` with settings.
    pub fn load(data_dir: &str, volatility: &str) -> EngineResult<Self> {
        let paytable: PaytableConfig =
            serde_json::from_str(&read_file(&format!("{data_dir}/paytable.json"))?)?;

        let preset_path = format!("{data_dir}/volatility/{volatility}.json");
        if !std::path::Path::new(&preset_path).exists() {
            log::warn!("no volatility preset at {preset_path}");
            return Err(EngineError::UnknownVolatility { name: volatility.to_string() });
        }
        let volatility: VolatilityPreset = serde_json::from_str(&read_file(&preset_path)?)?;

        let settings_path = format!("{data_dir}/engine.json");
        let settings = if std::path::Path::new(&settings_path).exists() {
            serde_json::from_str(&read_file(&settings_path)?)?
        } else {
            EngineSettings::default()
        };

        let config = Self { paytable, volatility, settings };
        config.validate()?;
        Ok(config)
    }

    /// The shipped configuration with the default preset.
    pub fn shipped() -> EngineResult<Self> {
        Self::with_volatility(DEFAULT_VOLATILITY)
    }

    /// The shipped paytable with one of the shipped presets.
    pub fn with_volatility(name: &str) -> EngineResult<Self> {
        let (_, preset) = SHIPPED_PRESETS
            .iter()
            .find(|(preset_name, _)| *preset_name == name)
            .ok_or_else(|| {
                log::warn!("unknown shipped volatility preset '{name}'");
                EngineError::UnknownVolatility { name: name.to_string() }
            })?;

        let config = Self {
            paytable: serde_json::from_str(SHIPPED_PAYTABLE)?,
            volatility: serde_json::from_str(preset)?,
            settings: EngineSettings::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Shape checks only. Table contents are the paytable author's business.
    pub fn validate(&self) -> EngineResult<()> {
        let grid = self.paytable.grid;
        if grid.columns == 0 || grid.rows == 0 {
            return Err(invalid(format!("grid must be non-empty, got {}x{}", grid.columns, grid.rows)));
        }
        if self.paytable.symbols.is_empty() {
            return Err(invalid("paytable has no symbols".into()));
        }
        if self.volatility.multiplier_values.len() != self.volatility.multiplier_weights.len() {
            return Err(invalid(format!(
                "preset '{}' has {} multiplier values but {} weights",
                self.volatility.name,
                self.volatility.multiplier_values.len(),
                self.volatility.multiplier_weights.len()
            )));
        }
        Ok(())
    }

    pub fn rtp_within_target(&self, rtp: f64) -> bool {
        self.paytable.rtp_within_target(rtp)
    }

    /// Config with hardcoded values for use in unit tests.
    pub fn default_test() -> Self {
        let table = |entries: &[(usize, f64)]| entries.iter().copied().collect::<BTreeMap<_, _>>();

        let symbols = vec![
            SymbolConfig {
                id: "candy_red".into(),
                rarity: 10.0,
                min_cluster: 5,
                payout_table: table(&[(8, 2.0)]),
            },
            SymbolConfig {
                id: "candy_blue".into(),
                rarity: 10.0,
                min_cluster: 5,
                payout_table: table(&[(5, 0.5), (6, 0.75), (7, 1.0), (8, 1.5)]),
            },
            SymbolConfig {
                id: "candy_green".into(),
                rarity: 10.0,
                min_cluster: 5,
                payout_table: table(&[(5, 0.5), (6, 0.75), (7, 1.0), (8, 1.5)]),
            },
            SymbolConfig {
                id: "star".into(),
                rarity: 4.0,
                min_cluster: 4,
                payout_table: table(&[(4, 1.0), (5, 2.0), (6, 3.0)]),
            },
        ];

        Self {
            paytable: PaytableConfig {
                grid: GridConfig::default(),
                target_rtp: 96.0,
                rtp_tolerance: 2.0,
                max_cascades: 20,
                symbols,
                scatter: ScatterConfig {
                    id: "lollipop".into(),
                    rarity: 2.0,
                    free_spins_table: [(4, 10), (5, 12), (6, 15)].into_iter().collect(),
                },
                multiplier: MultiplierConfig { id: "bomb".into(), rarity: 2.0 },
            },
            volatility: VolatilityPreset {
                name: "test".into(),
                rarity_multipliers: HashMap::new(),
                multiplier_values: vec![2, 5, 10],
                multiplier_weights: vec![3.0, 2.0, 1.0],
                max_multiplier_per_spin: MAX_MULTIPLIER,
                scatter_frequency_boost: 1.0,
            },
            settings: EngineSettings::default(),
        }
    }
}

fn read_file(path: &str) -> EngineResult<String> {
    std::fs::read_to_string(path).map_err(|source| EngineError::ConfigRead {
        path: path.to_string(),
        source,
    })
}

fn invalid(reason: String) -> EngineError {
    EngineError::InvalidConfig { reason }
}
