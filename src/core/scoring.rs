// Copyright (c) 2026 Credence
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Deterministic score engine.
//!
//! All intermediate arithmetic is IEEE-754 double precision; the final
//! round-half-to-even plus clamp is the only step that produces the on-wire
//! integer. No fused multiply-add, no extended-precision intermediates —
//! operators on different hosts must land on the same integer.

use crate::core::types::{Band, PcsFeatures, PoolMetrics, Tier};

/// Per-component breakdown of a personal credit score, pre-rounding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PcsBreakdown {
    /// Wallet age component in [0, 1000].
    pub age: f64,
    /// Activity component in [0, 1000].
    pub activity: f64,
    /// Liquidity-provision component in [0, 1000].
    pub liquidity: f64,
    /// Liquidation-history component in [0, 1000].
    pub liquidation: f64,
}

/// Result of personal credit scoring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PcsScore {
    /// Final integer score in 0..=1000.
    pub score: u32,
    /// Tier implied by `score`.
    pub tier: Tier,
    /// Component breakdown.
    pub breakdown: PcsBreakdown,
}

/// Per-component breakdown of a pool risk score, pre-rounding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrsBreakdown {
    /// Volatility component in [0, 100].
    pub volatility: f64,
    /// Depth component in [0, 100].
    pub depth: f64,
    /// Concentration component in [0, 100].
    pub concentration: f64,
    /// Oracle dispersion component in [0, 100].
    pub oracle: f64,
}

/// Result of pool risk scoring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrsScore {
    /// Final integer score in 0..=100.
    pub score: u32,
    /// Band implied by `score`.
    pub band: Band,
    /// Component breakdown.
    pub breakdown: PrsBreakdown,
}

/// Tier implied by a credit score (inclusive lower bounds).
pub fn tier_from_score(score: u32) -> Tier {
    match score {
        0..=299 => Tier::Bronze,
        300..=499 => Tier::Silver,
        500..=699 => Tier::Gold,
        700..=849 => Tier::Platinum,
        _ => Tier::Diamond,
    }
}

/// Band implied by a risk score (inclusive lower bounds).
pub fn band_from_score(score: u32) -> Band {
    match score {
        0..=24 => Band::Calm,
        25..=49 => Band::Normal,
        50..=74 => Band::Volatile,
        _ => Band::Turbulent,
    }
}

fn round_clamped(value: f64, max: f64) -> u32 {
    value.round_ties_even().clamp(0.0, max) as u32
}

/// Compute a personal credit score from wallet features.
pub fn score_pcs(f: &PcsFeatures) -> PcsScore {
    let age = 1000.0 * (1.0 - (-0.8 * f.wallet_age_days / 365.0).exp());

    let tx_part = (200.0 * (f.transaction_count as f64 + 1.0).log10()).min(1000.0);
    let activity = 0.6 * tx_part + 0.4 * (1000.0 * f.success_rate);

    let liquidity = if f.lp_contribution <= 0.0 {
        0.0
    } else {
        (250.0 * (f.lp_contribution + 1.0).log10()).min(1000.0)
    };

    let liq = f.liquidation_count as f64;
    let liquidation = (1000.0 - 200.0 * liq * (-0.2 * liq).exp()).clamp(0.0, 1000.0);

    let composite = 0.25 * age + 0.30 * activity + 0.25 * liquidity + 0.20 * liquidation;
    let score = round_clamped(composite, 1000.0);

    PcsScore {
        score,
        tier: tier_from_score(score),
        breakdown: PcsBreakdown {
            age,
            activity,
            liquidity,
            liquidation,
        },
    }
}

/// Compute a pool risk score from pool metrics.
pub fn score_prs(m: &PoolMetrics) -> PrsScore {
    let volatility = 100.0 / (1.0 + (-10.0 * (m.volatility - 0.5)).exp());

    let depth = if m.liquidity_depth <= 0.0 {
        100.0
    } else {
        (100.0 - 15.0 * (m.liquidity_depth + 1.0).log10()).max(0.0)
    };

    let concentration = 100.0 * m.concentration;
    let oracle = 100.0 * m.oracle_dispersion * m.oracle_dispersion;

    let composite =
        0.35 * volatility + 0.25 * depth + 0.25 * concentration + 0.15 * oracle;
    let score = round_clamped(composite, 100.0);

    PrsScore {
        score,
        band: band_from_score(score),
        breakdown: PrsBreakdown {
            volatility,
            depth,
            concentration,
            oracle,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundaries_are_inclusive_lower_bounds() {
        assert_eq!(tier_from_score(0), Tier::Bronze);
        assert_eq!(tier_from_score(299), Tier::Bronze);
        assert_eq!(tier_from_score(300), Tier::Silver);
        assert_eq!(tier_from_score(499), Tier::Silver);
        assert_eq!(tier_from_score(500), Tier::Gold);
        assert_eq!(tier_from_score(700), Tier::Platinum);
        assert_eq!(tier_from_score(849), Tier::Platinum);
        assert_eq!(tier_from_score(850), Tier::Diamond);
        assert_eq!(tier_from_score(1000), Tier::Diamond);
    }

    #[test]
    fn band_boundaries_are_inclusive_lower_bounds() {
        assert_eq!(band_from_score(0), Band::Calm);
        assert_eq!(band_from_score(24), Band::Calm);
        assert_eq!(band_from_score(25), Band::Normal);
        assert_eq!(band_from_score(49), Band::Normal);
        assert_eq!(band_from_score(50), Band::Volatile);
        assert_eq!(band_from_score(74), Band::Volatile);
        assert_eq!(band_from_score(75), Band::Turbulent);
        assert_eq!(band_from_score(100), Band::Turbulent);
    }

    #[test]
    fn zero_features_score_only_the_liquidation_floor() {
        let s = score_pcs(&PcsFeatures::default());
        // age, activity and liquidity are zero; a clean liquidation history
        // contributes its full 1000 at weight 0.20.
        assert_eq!(s.score, 200);
        assert_eq!(s.tier, Tier::Bronze);
    }

    #[test]
    fn liquidation_component_decays_with_count() {
        let one = score_pcs(&PcsFeatures {
            liquidation_count: 1,
            ..Default::default()
        });
        let five = score_pcs(&PcsFeatures {
            liquidation_count: 5,
            ..Default::default()
        });
        assert!(one.breakdown.liquidation < 1000.0);
        assert!(five.breakdown.liquidation < one.breakdown.liquidation);
        assert!(five.breakdown.liquidation >= 0.0);
    }

    #[test]
    fn empty_pool_is_maximally_shallow() {
        let s = score_prs(&PoolMetrics::default());
        // zero depth scores 100; the volatility sigmoid at 0 is near zero.
        assert!(s.breakdown.depth == 100.0);
        assert!(s.breakdown.volatility < 1.0);
    }

    #[test]
    fn scores_are_deterministic_across_calls() {
        let f = PcsFeatures {
            wallet_age_days: 123.0,
            transaction_count: 456,
            success_rate: 0.78,
            lp_contribution: 9_000.5,
            liquidation_count: 2,
        };
        assert_eq!(score_pcs(&f), score_pcs(&f));
    }
}
