use std::fmt;

use anyhow::{bail, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const PATTERN_COUNT: usize = 12;
pub const SIGNATURE_POINT_COUNT: usize = 15;
const SCAN_ID_LEN: usize = 16;

/// Identifier of one extraction: 16 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScanId(String);

impl ScanId {
    pub fn parse(value: &str) -> Result<Self> {
        if value.len() != SCAN_ID_LEN {
            bail!("scan id must be {SCAN_ID_LEN} characters, got {}", value.len());
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            bail!("scan id '{value}' is not lowercase hex");
        }
        Ok(Self(value.to_string()))
    }

    pub fn from_bits(bits: u64) -> Self {
        Self(format!("{bits:016x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ScanId {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ScanId> for String {
    fn from(id: ScanId) -> Self {
        id.0
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignaturePoint {
    pub x: f64,
    pub y: f64,
    pub intensity: f64,
}

/// Extracted representation of one scan. The array lengths are the
/// fixed shape the charts and the persisted layout rely on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSummary {
    pub id: ScanId,
    pub patterns: [u8; PATTERN_COUNT],
    pub signature_points: [SignaturePoint; SIGNATURE_POINT_COUNT],
}

/// The single persisted scan, stored as JSON under a fixed key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub id: ScanId,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Data URL of the captured frame, kept verbatim.
    pub image_data: String,
    pub patterns: [u8; PATTERN_COUNT],
    pub signature_points: [SignaturePoint; SIGNATURE_POINT_COUNT],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
}

impl ScanRecord {
    pub fn from_summary(
        summary: &FeatureSummary,
        image_data: impl Into<String>,
        saved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: summary.id.clone(),
            timestamp: saved_at.timestamp_millis(),
            image_data: image_data.into(),
            patterns: summary.patterns,
            signature_points: summary.signature_points,
            match_score: None,
        }
    }

    pub fn summary(&self) -> FeatureSummary {
        FeatureSummary {
            id: self.id.clone(),
            patterns: self.patterns,
            signature_points: self.signature_points,
        }
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}
