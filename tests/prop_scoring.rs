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

use credence::core::scoring::{band_from_score, score_pcs, score_prs, tier_from_score};
use credence::core::types::{PcsFeatures, PoolMetrics};
use proptest::prelude::*;

proptest! {
    #[test]
    fn pcs_scores_stay_in_range_with_matching_tier(
        wallet_age_days in 0.0..20_000.0f64,
        transaction_count in 0u64..100_000_000,
        success_rate in 0.0..=1.0f64,
        lp_contribution in 0.0..1e12f64,
        liquidation_count in 0u64..10_000,
    ) {
        let f = PcsFeatures {
            wallet_age_days,
            transaction_count,
            success_rate,
            lp_contribution,
            liquidation_count,
        };
        let s = score_pcs(&f);
        prop_assert!(s.score <= 1000);
        prop_assert_eq!(s.tier, tier_from_score(s.score));
        // identical inputs, identical outputs
        prop_assert_eq!(s, score_pcs(&f));
    }

    #[test]
    fn prs_scores_stay_in_range_with_matching_band(
        volatility in 0.0..=1.0f64,
        liquidity_depth in 0.0..1e12f64,
        concentration in 0.0..=1.0f64,
        oracle_dispersion in 0.0..=1.0f64,
    ) {
        let m = PoolMetrics {
            volatility,
            liquidity_depth,
            concentration,
            oracle_dispersion,
        };
        let s = score_prs(&m);
        prop_assert!(s.score <= 100);
        prop_assert_eq!(s.band, band_from_score(s.score));
        prop_assert_eq!(s, score_prs(&m));
    }
}
