pub mod scan;

pub use scan::{
    FeatureSummary, ScanId, ScanRecord, SignaturePoint, PATTERN_COUNT, SIGNATURE_POINT_COUNT,
};
