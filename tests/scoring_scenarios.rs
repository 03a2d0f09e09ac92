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

use credence::core::scoring::{score_pcs, score_prs};
use credence::core::types::{Band, PcsFeatures, PoolMetrics, Tier};

#[test]
fn seasoned_active_wallet_scores_diamond() {
    let s = score_pcs(&PcsFeatures {
        wallet_age_days: 730.0,
        transaction_count: 1000,
        success_rate: 0.95,
        lp_contribution: 10_000.0,
        liquidation_count: 0,
    });

    assert!((s.breakdown.age - 798.1).abs() < 0.1);
    assert!((s.breakdown.activity - 740.05).abs() < 0.1);
    assert_eq!(s.breakdown.liquidity, 1000.0);
    assert_eq!(s.breakdown.liquidation, 1000.0);

    assert_eq!(s.score, 872);
    assert_eq!(s.tier, Tier::Diamond);
}

#[test]
fn deep_liquidity_alone_caps_at_silver() {
    // liquidity saturates; age/activity contribute nothing
    let s = score_pcs(&PcsFeatures {
        wallet_age_days: 0.0,
        transaction_count: 0,
        success_rate: 0.0,
        lp_contribution: 100_000_000.0,
        liquidation_count: 0,
    });

    assert_eq!(s.breakdown.liquidity, 1000.0);
    assert_eq!(s.score, 450);
    assert_eq!(s.tier, Tier::Silver);
}

#[test]
fn quiet_deep_pool_scores_calm() {
    let s = score_prs(&PoolMetrics {
        volatility: 0.1,
        liquidity_depth: 10_000_000.0,
        concentration: 0.1,
        oracle_dispersion: 0.02,
    });

    assert!(s.breakdown.volatility < 2.0);
    assert_eq!(s.breakdown.depth, 0.0);
    assert_eq!(s.breakdown.concentration, 10.0);
    assert!((s.breakdown.oracle - 0.04).abs() < 1e-12);

    assert_eq!(s.score, 3);
    assert_eq!(s.band, Band::Calm);
}

#[test]
fn hot_concentrated_pool_scores_turbulent() {
    let s = score_prs(&PoolMetrics {
        volatility: 0.95,
        liquidity_depth: 0.0,
        concentration: 0.9,
        oracle_dispersion: 0.8,
    });
    // depth 100, volatility sigmoid near 100, concentration 90
    assert!(s.score >= 75);
    assert_eq!(s.band, Band::Turbulent);
}
