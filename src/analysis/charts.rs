//! Chart-ready views of a feature summary.

use std::fmt::Display;

use chrono::{DateTime, TimeZone};
use rand::Rng;
use serde::Serialize;

use crate::models::SignaturePoint;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub name: String,
    pub value: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub name: String,
    pub value: u8,
    pub trend: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionSlice {
    pub name: &'static str,
    pub value: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisDetails {
    pub vessel_confidence: u8,
    pub signature_points_identified: usize,
}

impl AnalysisDetails {
    pub fn generate(points: &[SignaturePoint], rng: &mut impl Rng) -> Self {
        Self {
            vessel_confidence: rng.gen_range(90..100),
            signature_points_identified: points.len(),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        vec![
            format!(
                "Vessel Pattern Recognition: {}% confidence",
                self.vessel_confidence
            ),
            format!(
                "Signature Points Identified: {}",
                self.signature_points_identified
            ),
            "Pattern Distribution: Normalized".to_string(),
            "Scan Quality: High".to_string(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchStrength {
    Strong,
    Partial,
    None,
}

impl MatchStrength {
    pub fn from_score(score: f64) -> Self {
        if score > 85.0 {
            MatchStrength::Strong
        } else if score > 70.0 {
            MatchStrength::Partial
        } else {
            MatchStrength::None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MatchStrength::Strong => "Strong Match",
            MatchStrength::Partial => "Partial Match",
            MatchStrength::None => "No Match",
        }
    }
}

/// Labels each pattern value `P1`..`Pn` in order.
pub fn pattern_series(patterns: &[u8]) -> Vec<SeriesPoint> {
    patterns
        .iter()
        .enumerate()
        .map(|(index, &value)| SeriesPoint {
            name: format!("P{}", index + 1),
            value,
        })
        .collect()
}

/// Pattern series with a jittered trend line: the first entry trends at 80%
/// of its value, every later one within ten of its predecessor's value.
pub fn trend_series(patterns: &[u8], rng: &mut impl Rng) -> Vec<TrendPoint> {
    pattern_series(patterns)
        .into_iter()
        .enumerate()
        .map(|(index, point)| {
            let trend = match index.checked_sub(1) {
                Some(previous) => {
                    (f64::from(patterns[previous]) + rng.gen_range(-10.0..10.0)).floor() as i32
                }
                None => (f64::from(point.value) * 0.8).floor() as i32,
            };
            TrendPoint {
                name: point.name,
                value: point.value,
                trend,
            }
        })
        .collect()
}

/// Illustrative tissue split; not derived from the scan.
pub fn composition(rng: &mut impl Rng) -> [CompositionSlice; 3] {
    [
        CompositionSlice {
            name: "Vessel Density",
            value: rng.gen_range(60..90),
        },
        CompositionSlice {
            name: "Pigmentation",
            value: rng.gen_range(20..40),
        },
        CompositionSlice {
            name: "Other",
            value: rng.gen_range(5..15),
        },
    ]
}

/// Long US-style date with a zero-padded 12-hour time, e.g.
/// `June 30, 2025 at 08:15 AM`.
pub fn format_scan_date<Tz: TimeZone>(at: DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    at.format("%B %-d, %Y at %I:%M %p").to_string()
}

/// Scales points to a 0-100 plane with intensity as bubble size.
pub fn scatter_points(points: &[SignaturePoint]) -> Vec<ScatterPoint> {
    points
        .iter()
        .map(|point| ScatterPoint {
            x: point.x * 100.0,
            y: point.y * 100.0,
            z: point.intensity * 10.0,
        })
        .collect()
}
