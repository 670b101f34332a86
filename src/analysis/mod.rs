pub mod charts;
mod simulated;

use crate::{capture::ImagePayload, models::FeatureSummary};

pub use simulated::SimulatedAnalyzer;

/// Feature extraction and matching over captured frames.
pub trait RetinaAnalyzer: Send + Sync {
    fn extract(&self, image: &ImagePayload) -> FeatureSummary;

    /// Similarity of two scans on a 0-100 scale.
    fn compare(&self, stored: &FeatureSummary, current: &FeatureSummary) -> f64;
}
