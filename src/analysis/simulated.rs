use std::sync::{Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{
    capture::ImagePayload,
    models::{FeatureSummary, ScanId, SignaturePoint, PATTERN_COUNT, SIGNATURE_POINT_COUNT},
};

use super::RetinaAnalyzer;

const PATTERN_WEIGHT: f64 = 0.6;
const POINT_WEIGHT: f64 = 0.4;
const MIN_SIMILARITY: f64 = 70.0;
const MAX_SIMILARITY: f64 = 100.0;

/// Stand-in analyzer: ignores pixel data and draws every feature and score
/// from its random source. Seed it to make runs reproducible.
pub struct SimulatedAnalyzer {
    rng: Mutex<StdRng>,
}

impl SimulatedAnalyzer {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SimulatedAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl RetinaAnalyzer for SimulatedAnalyzer {
    fn extract(&self, _image: &ImagePayload) -> FeatureSummary {
        let mut rng = self.rng();

        let patterns: [u8; PATTERN_COUNT] = std::array::from_fn(|_| rng.gen_range(0..100));
        let signature_points: [SignaturePoint; SIGNATURE_POINT_COUNT] =
            std::array::from_fn(|_| SignaturePoint {
                x: rng.gen::<f64>(),
                y: rng.gen::<f64>(),
                intensity: rng.gen_range(0.5..1.0),
            });
        let id = ScanId::from_bits(rng.gen());

        FeatureSummary {
            id,
            patterns,
            signature_points,
        }
    }

    fn compare(&self, _stored: &FeatureSummary, _current: &FeatureSummary) -> f64 {
        let mut rng = self.rng();

        let pattern_similarity = rng.gen_range(MIN_SIMILARITY..MAX_SIMILARITY);
        let point_similarity = rng.gen_range(MIN_SIMILARITY..MAX_SIMILARITY);

        pattern_similarity * PATTERN_WEIGHT + point_similarity * POINT_WEIGHT
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn payload() -> ImagePayload {
        ImagePayload::from_data_url("data:image/png;base64,AAAA").unwrap()
    }

    #[test]
    fn extracted_features_keep_their_bounds() {
        let analyzer = SimulatedAnalyzer::seeded(7);

        for _ in 0..200 {
            let summary = analyzer.extract(&payload());
            assert_eq!(summary.patterns.len(), PATTERN_COUNT);
            assert_eq!(summary.signature_points.len(), SIGNATURE_POINT_COUNT);
            assert!(summary.patterns.iter().all(|&p| p < 100));
            for point in summary.signature_points {
                assert!((0.0..1.0).contains(&point.x));
                assert!((0.0..1.0).contains(&point.y));
                assert!((0.5..1.0).contains(&point.intensity));
            }
            assert!(ScanId::parse(summary.id.as_str()).is_ok());
        }
    }

    #[test]
    fn ids_are_distinct_across_extractions() {
        let analyzer = SimulatedAnalyzer::seeded(42);
        let ids: HashSet<_> = (0..500)
            .map(|_| analyzer.extract(&payload()).id)
            .collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn scores_stay_within_simulated_range() {
        let analyzer = SimulatedAnalyzer::seeded(3);
        let a = analyzer.extract(&payload());
        let b = analyzer.extract(&payload());

        for _ in 0..1_000 {
            let score = analyzer.compare(&a, &b);
            assert!((MIN_SIMILARITY..MAX_SIMILARITY).contains(&score), "score {score}");
        }
    }

    #[test]
    fn same_seed_reproduces_same_run() {
        let first = SimulatedAnalyzer::seeded(99);
        let second = SimulatedAnalyzer::seeded(99);

        let a = first.extract(&payload());
        let b = second.extract(&payload());
        assert_eq!(a, b);
        assert_eq!(first.compare(&a, &a), second.compare(&b, &b));
    }
}
