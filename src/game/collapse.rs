//! Collapse Resolution
//!
//! Stand-in for a physics simulation: after every successful removal the
//! tower may fall. Two independent Bernoulli trials decide it.
//!
//! 1. **Structural**: the middle block of a layer was taken and only one
//!    block is left there. Fires with `structural_probability`.
//! 2. **Stochastic**: a hazard that grows with the total number of removed
//!    blocks, plus a bonus when the affected layer is down to its last block
//!    (two or more removed from it).
//!
//! The tower collapses if either trial fires. Both trials are always drawn
//! when applicable, so the generator advances the same way whatever the
//! outcome of the first one.

use crate::core::rng::RandomSource;
use crate::game::tower::{Block, Tower};

/// Index of the middle block within a layer.
pub const MIDDLE_INDEX: u32 = 1;

/// Tuning for the collapse trials.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollapseConfig {
    /// Chance the structural trigger fires once its condition holds.
    pub structural_probability: f64,
    /// Removed blocks tolerated before the hazard starts growing.
    pub free_threshold: u32,
    /// Hazard added per removed block above the threshold.
    pub hazard_slope: f64,
    /// Extra hazard when the affected layer has lost two or more blocks.
    pub layer_danger_bonus: f64,
}

impl Default for CollapseConfig {
    fn default() -> Self {
        Self {
            structural_probability: 0.4,
            free_threshold: 8,
            hazard_slope: 0.04,
            layer_danger_bonus: 0.15,
        }
    }
}

impl CollapseConfig {
    /// A configuration under which the tower never falls.
    pub fn never() -> Self {
        Self {
            structural_probability: 0.0,
            free_threshold: u32::MAX,
            hazard_slope: 0.0,
            layer_danger_bonus: 0.0,
        }
    }

    /// Baseline hazard for a given total of removed blocks.
    pub fn baseline_hazard(&self, total_removed: u32) -> f64 {
        let over = total_removed.saturating_sub(self.free_threshold);
        (over as f64 * self.hazard_slope).max(0.0)
    }
}

/// Outcome of resolving one removal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollapseOutcome {
    /// Structural trigger fired.
    pub structural: bool,
    /// Stochastic trigger fired.
    pub stochastic: bool,
    /// Probability used for the stochastic trial.
    pub hazard: f64,
}

impl CollapseOutcome {
    /// Did the tower fall?
    pub fn collapsed(&self) -> bool {
        self.structural || self.stochastic
    }
}

/// Decide whether the tower falls after `removed` was taken out.
///
/// `tower` must already reflect the removal.
pub fn resolve_collapse<R: RandomSource + ?Sized>(
    tower: &Tower,
    removed: &Block,
    config: &CollapseConfig,
    rng: &mut R,
) -> CollapseOutcome {
    let remaining = tower.layer_occupancy(removed.layer);
    let layer_removed = tower.blocks_per_layer().saturating_sub(remaining);

    let structural = if removed.index_in_layer == MIDDLE_INDEX && remaining == 1 {
        rng.chance(config.structural_probability)
    } else {
        false
    };

    let mut hazard = config.baseline_hazard(tower.removed_count());
    if layer_removed >= 2 {
        hazard += config.layer_danger_bonus;
    }
    let stochastic = rng.chance(hazard);

    CollapseOutcome {
        structural,
        stochastic,
        hazard,
    }
}
