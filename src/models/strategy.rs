use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub const BPS_DENOMINATOR: u64 = 10_000;

/// Curve steepness profile applied to every quote of a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    Classic,
    Mayhem,
}

struct LaunchModeProfile {
    speed_multiplier_bps: u64,
}

const fn launch_profile(mode: LaunchMode) -> LaunchModeProfile {
    match mode {
        LaunchMode::Classic => LaunchModeProfile { speed_multiplier_bps: 10_000 },
        LaunchMode::Mayhem => LaunchModeProfile { speed_multiplier_bps: 15_000 },
    }
}

impl LaunchMode {
    /// Multiplier applied to the input of a buy (and divided out of a sell), in bps.
    pub const fn speed_multiplier_bps(self) -> u64 {
        launch_profile(self).speed_multiplier_bps
    }
}

impl Default for LaunchMode {
    fn default() -> Self {
        LaunchMode::Classic
    }
}

/// Anti-detection sub-mode. `None` keeps the launch atomic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StealthMode {
    None,
    Light,
    Medium,
    Aggressive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StealthProfile {
    pub min_group: usize,
    pub max_group: usize,
    pub spread_blocks: usize,
    pub group_jitter_ms: RangeInclusive<u64>,
}

impl StealthMode {
    /// Group sizing and spread per mode. Atomic groups carry a tip plus members,
    /// so `max_group` stays within the 5-transaction bundle limit.
    pub fn profile(self) -> Option<StealthProfile> {
        match self {
            StealthMode::None => None,
            StealthMode::Light => Some(StealthProfile {
                min_group: 3,
                max_group: 4,
                spread_blocks: 2,
                group_jitter_ms: 25..=120,
            }),
            StealthMode::Medium => Some(StealthProfile {
                min_group: 2,
                max_group: 3,
                spread_blocks: 3,
                group_jitter_ms: 50..=250,
            }),
            StealthMode::Aggressive => Some(StealthProfile {
                min_group: 1,
                max_group: 2,
                spread_blocks: 5,
                group_jitter_ms: 100..=450,
            }),
        }
    }

    pub fn is_stealth(self) -> bool {
        self != StealthMode::None
    }
}

impl Default for StealthMode {
    fn default() -> Self {
        StealthMode::None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "shape", content = "values")]
pub enum Allocation {
    Equal,
    /// Relative weights, one per wallet.
    Weighted(Vec<u64>),
    /// Explicit per-wallet lamports, rescaled to the total.
    Custom(Vec<u64>),
}

impl Default for Allocation {
    fn default() -> Self {
        Allocation::Equal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionStrategy {
    #[serde(default)]
    pub allocation: Allocation,
    #[serde(default)]
    pub variance_percent: f64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
    #[serde(default)]
    pub stealth: StealthMode,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u64,
    #[serde(default)]
    pub priority_fee_micro_lamports: u64,
    #[serde(default)]
    pub launch_mode: LaunchMode,
}

fn default_jitter() -> bool {
    true
}

fn default_slippage_bps() -> u64 {
    500
}

impl Default for DistributionStrategy {
    fn default() -> Self {
        Self {
            allocation: Allocation::Equal,
            variance_percent: 0.0,
            jitter: true,
            stealth: StealthMode::None,
            slippage_bps: default_slippage_bps(),
            priority_fee_micro_lamports: 0,
            launch_mode: LaunchMode::Classic,
        }
    }
}

/// Sell shapes: group size and submission path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SellMode {
    /// One wallet at a time, individual sends.
    Regular,
    /// Small concurrent groups of individual sends.
    SmallBatch,
    /// Tip-carrying atomic bundles, individual fallback per member.
    JitoBatch,
}

/// How a group of trades reaches the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPath {
    Individual,
    AtomicBundle,
}

impl SellMode {
    pub const fn group_size(self) -> usize {
        match self {
            SellMode::Regular => 1,
            SellMode::SmallBatch => 4,
            SellMode::JitoBatch => 4,
        }
    }

    pub const fn path(self) -> GroupPath {
        match self {
            SellMode::Regular | SellMode::SmallBatch => GroupPath::Individual,
            SellMode::JitoBatch => GroupPath::AtomicBundle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_table_is_closed_and_stable() {
        assert_eq!(LaunchMode::Classic.speed_multiplier_bps(), BPS_DENOMINATOR);
        assert!(LaunchMode::Mayhem.speed_multiplier_bps() > BPS_DENOMINATOR);
        assert!(StealthMode::None.profile().is_none());

        let light = StealthMode::Light.profile().unwrap();
        let aggressive = StealthMode::Aggressive.profile().unwrap();
        assert!(aggressive.max_group < light.max_group);
        assert!(aggressive.spread_blocks > light.spread_blocks);
        for mode in [StealthMode::Light, StealthMode::Medium, StealthMode::Aggressive] {
            let p = mode.profile().unwrap();
            assert!(p.min_group >= 1 && p.min_group <= p.max_group && p.max_group <= 4);
        }
    }

    #[test]
    fn allocation_serializes_with_shape_tag() {
        let json = serde_json::to_string(&Allocation::Weighted(vec![1, 2])).unwrap();
        assert_eq!(json, r#"{"shape":"weighted","values":[1,2]}"#);
        let back: Allocation = serde_json::from_str(r#"{"shape":"equal"}"#).unwrap();
        assert_eq!(back, Allocation::Equal);
    }
}
