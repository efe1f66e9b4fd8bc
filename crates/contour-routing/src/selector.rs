//! Primary and secondary selection
//!
//! Secondaries always all receive the message. Among primaries the highest
//! score wins outright; only an exact tie on the highest score draws at
//! random, weighted so that a higher trust weight (more distrust) never has
//! a better chance than a lower one.

use std::sync::Arc;

use contour_core::{HandlerIdentity, RandomEffects, TrustWeight};

use crate::candidate::{MatchingCandidate, RoutingDecision};

/// How a trust weight turns into a tie-break selection weight.
///
/// Every curve is non-increasing in trust weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustWeighting {
    /// Probability proportional to `1 / w`
    #[default]
    Inverse,
    /// Probability proportional to `1 / w²`
    InverseSquare,
    /// Ignore trust weight
    Uniform,
}

impl TrustWeighting {
    /// Relative selection weight of a candidate
    pub fn selection_weight(self, trust_weight: TrustWeight) -> f64 {
        let w = f64::from(trust_weight.get());
        match self {
            Self::Inverse => 1.0 / w,
            Self::InverseSquare => 1.0 / (w * w),
            Self::Uniform => 1.0,
        }
    }
}

/// Index picked by mapping a uniform `draw` onto cumulative `weights`.
///
/// `weights` must be non-empty; non-positive totals fall back to index 0.
pub fn weighted_index(weights: &[f64], draw: u64) -> usize {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return 0;
    }
    let unit = (draw >> 11) as f64 / (1u64 << 53) as f64;
    let target = unit * total;

    let mut cumulative = 0.0;
    for (index, weight) in weights.iter().enumerate() {
        cumulative += weight;
        if target < cumulative {
            return index;
        }
    }
    weights.len().saturating_sub(1)
}

/// Chooses destinations from resolved candidates
#[derive(Clone)]
pub struct RoutingSelector {
    random: Arc<dyn RandomEffects>,
    weighting: TrustWeighting,
}

impl std::fmt::Debug for RoutingSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingSelector")
            .field("weighting", &self.weighting)
            .finish_non_exhaustive()
    }
}

impl RoutingSelector {
    /// Selector using the default inverse weighting
    pub fn new(random: Arc<dyn RandomEffects>) -> Self {
        Self {
            random,
            weighting: TrustWeighting::default(),
        }
    }

    /// Use a different tie-break curve
    pub fn with_weighting(mut self, weighting: TrustWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Tie-break curve in use
    pub fn weighting(&self) -> TrustWeighting {
        self.weighting
    }

    /// Every secondary candidate, in candidate order
    pub fn select_secondaries(&self, candidates: &[MatchingCandidate]) -> Vec<HandlerIdentity> {
        candidates
            .iter()
            .filter(|c| c.is_secondary)
            .map(|c| c.identity.clone())
            .collect()
    }

    /// The primary destination, or `None` when no primary candidate exists
    pub async fn select_primary(
        &self,
        candidates: &[MatchingCandidate],
    ) -> Option<HandlerIdentity> {
        let best = candidates
            .iter()
            .filter(|c| !c.is_secondary)
            .map(|c| c.score)
            .max()?;
        let tied: Vec<&MatchingCandidate> = candidates
            .iter()
            .filter(|c| !c.is_secondary && c.score == best)
            .collect();

        let chosen = match tied.as_slice() {
            [only] => *only,
            _ => {
                let weights: Vec<f64> = tied
                    .iter()
                    .map(|c| self.weighting.selection_weight(c.trust_weight))
                    .collect();
                let draw = self.random.random_u64().await;
                let index = weighted_index(&weights, draw);
                tracing::warn!(
                    score = best,
                    tied = tied.len(),
                    chosen = %tied[index].identity,
                    "Several primary receivers share the best score, picked one at random"
                );
                tied[index]
            }
        };
        Some(chosen.identity.clone())
    }

    /// Full routing decision for one message
    pub async fn decide(&self, candidates: &[MatchingCandidate]) -> RoutingDecision {
        let secondaries = self.select_secondaries(candidates);
        let primary = self.select_primary(candidates).await;
        tracing::debug!(
            primary = primary.as_ref().map(|p| p.as_str()),
            secondaries = ?secondaries,
            "Routing decision"
        );
        RoutingDecision {
            primary,
            secondaries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    /// Replays a fixed sequence of draws, cycling
    struct ScriptedRandom {
        draws: Vec<u64>,
        next: Mutex<usize>,
    }

    impl ScriptedRandom {
        fn new(draws: Vec<u64>) -> Arc<Self> {
            Arc::new(Self {
                draws,
                next: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl RandomEffects for ScriptedRandom {
        async fn random_u64(&self) -> u64 {
            let mut next = self.next.lock();
            let value = self.draws[*next % self.draws.len()];
            *next += 1;
            value
        }
    }

    fn candidate(id: &str, score: usize, weight: u32, secondary: bool) -> MatchingCandidate {
        MatchingCandidate {
            identity: HandlerIdentity::new(id).unwrap(),
            score,
            trust_weight: TrustWeight::new(weight).unwrap(),
            is_secondary: secondary,
        }
    }

    #[tokio::test]
    async fn higher_score_wins_regardless_of_trust() {
        let selector = RoutingSelector::new(ScriptedRandom::new(vec![0, u64::MAX]));
        let candidates = [candidate("n_low", 1, 1, false), candidate("n_high", 2, 50, false)];
        for _ in 0..4 {
            let primary = selector.select_primary(&candidates).await.unwrap();
            assert_eq!(primary.as_str(), "n_high");
        }
    }

    #[tokio::test]
    async fn secondaries_are_never_primary() {
        let selector = RoutingSelector::new(ScriptedRandom::new(vec![0]));
        let candidates = [candidate("n_obs", 5, 1, true), candidate("n_obs2", 1, 1, true)];
        assert!(selector.select_primary(&candidates).await.is_none());

        let decision = selector.decide(&candidates).await;
        assert_eq!(decision.secondaries.len(), 2);
        assert!(!decision.is_empty());
        assert!(RoutingDecision::default().is_empty());
    }

    #[tokio::test]
    async fn tie_break_follows_the_draw() {
        let candidates = [candidate("n_a", 1, 1, false), candidate("n_b", 1, 1, false)];
        let low = RoutingSelector::new(ScriptedRandom::new(vec![0]));
        let high = RoutingSelector::new(ScriptedRandom::new(vec![u64::MAX]));
        assert_eq!(low.select_primary(&candidates).await.unwrap().as_str(), "n_a");
        assert_eq!(high.select_primary(&candidates).await.unwrap().as_str(), "n_b");
    }

    #[test]
    fn weighting_curves_are_non_increasing() {
        for weighting in [TrustWeighting::Inverse, TrustWeighting::InverseSquare, TrustWeighting::Uniform] {
            let mut previous = f64::INFINITY;
            for w in 1..=20 {
                let current = weighting.selection_weight(TrustWeight::new(w).unwrap());
                assert!(current <= previous);
                previous = current;
            }
        }
    }

    #[test]
    fn weighted_index_splits_the_draw_range() {
        let weights = [1.0, 1.0, 2.0];
        assert_eq!(weighted_index(&weights, 0), 0);
        assert_eq!(weighted_index(&weights, u64::MAX / 4 + (1 << 12)), 1);
        assert_eq!(weighted_index(&weights, u64::MAX), 2);
        assert_eq!(weighted_index(&[0.0, 0.0], 42), 0);
    }

    proptest! {
        #[test]
        fn weighted_index_stays_in_bounds(
            weights in proptest::collection::vec(0.001f64..100.0, 1..10),
            draw in any::<u64>(),
        ) {
            prop_assert!(weighted_index(&weights, draw) < weights.len());
        }

        #[test]
        fn best_score_always_selected(
            scores in proptest::collection::vec((1usize..5, 1u32..10), 1..8),
            draw in any::<u64>(),
        ) {
            let candidates: Vec<_> = scores
                .iter()
                .enumerate()
                .map(|(i, (score, weight))| candidate(&format!("n_{i}"), *score, *weight, false))
                .collect();
            let best = candidates.iter().map(|c| c.score).max().unwrap();
            let selector = RoutingSelector::new(ScriptedRandom::new(vec![draw]));
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let primary = rt.block_on(selector.select_primary(&candidates)).unwrap();
            let chosen = candidates.iter().find(|c| c.identity == primary).unwrap();
            prop_assert_eq!(chosen.score, best);
        }
    }
}
