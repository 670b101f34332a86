use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{capture::ImagePayload, error::PipelineError, models::FeatureSummary};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "camelCase")]
pub enum ScanOutcome {
    Matched { score: f64 },
    Unmatched { score: f64 },
    /// Nothing was stored to compare against; the scan may be saved.
    NewScanComplete,
    /// A record is stored but could not be read, so nothing was compared.
    Unverifiable,
}

impl ScanOutcome {
    /// Strictly above `threshold` is a match.
    pub fn from_score(score: f64, threshold: f64) -> Self {
        if score > threshold {
            ScanOutcome::Matched { score }
        } else {
            ScanOutcome::Unmatched { score }
        }
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            ScanOutcome::Matched { score } | ScanOutcome::Unmatched { score } => Some(*score),
            ScanOutcome::NewScanComplete | ScanOutcome::Unverifiable => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, ScanOutcome::Matched { .. })
    }

    pub fn rounded_percent(&self) -> Option<i64> {
        self.score().map(|score| score.round() as i64)
    }

    pub fn headline(&self) -> &'static str {
        match self {
            ScanOutcome::Matched { .. } => "Identity Verified",
            ScanOutcome::Unmatched { .. } | ScanOutcome::Unverifiable => "No Match Found",
            ScanOutcome::NewScanComplete => "Scan Complete",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScanOutcome::Matched { .. } => {
                "The current scan matches your previously stored retina pattern."
            }
            ScanOutcome::Unmatched { .. } => {
                "The current scan does not match the stored retina pattern."
            }
            ScanOutcome::NewScanComplete => {
                "Your retina scan has been successfully analyzed. Save this scan for future verification."
            }
            ScanOutcome::Unverifiable => {
                "The stored retina pattern could not be read, so this scan cannot be verified."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum PipelinePhase {
    Idle,
    Capturing,
    Extracting,
    Comparing,
    Result { outcome: ScanOutcome },
}

impl Default for PipelinePhase {
    fn default() -> Self {
        PipelinePhase::Idle
    }
}

impl PipelinePhase {
    pub fn name(&self) -> &'static str {
        match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::Capturing => "capturing",
            PipelinePhase::Extracting => "extracting",
            PipelinePhase::Comparing => "comparing",
            PipelinePhase::Result { .. } => "showing a result",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStatus {
    /// A record is present in the store.
    pub protected: bool,
    pub last_scan_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSnapshot {
    #[serde(flatten)]
    pub phase: PipelinePhase,
    pub attempt_id: Option<String>,
    pub current_scan: Option<FeatureSummary>,
    pub match_result: Option<MatchResult>,
    pub dashboard: DashboardStatus,
}

/// Session state behind the pipeline. Every attempt-scoped transition names
/// its attempt; a mismatch means the attempt was reset and is reported as
/// [`PipelineError::Cancelled`].
#[derive(Default)]
pub struct PipelineState {
    phase: PipelinePhase,
    attempt_id: Option<String>,
    image: Option<ImagePayload>,
    current_scan: Option<FeatureSummary>,
    cancel: Option<CancellationToken>,
    last_scan_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    pub fn new(last_scan_at: Option<DateTime<Utc>>) -> Self {
        Self {
            last_scan_at,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    pub fn last_scan_at(&self) -> Option<DateTime<Utc>> {
        self.last_scan_at
    }

    pub fn set_last_scan_at(&mut self, at: Option<DateTime<Utc>>) {
        self.last_scan_at = at;
    }

    pub fn begin_capture(
        &mut self,
        attempt_id: &str,
        cancel: CancellationToken,
    ) -> Result<(), PipelineError> {
        if self.phase != PipelinePhase::Idle {
            return Err(self.invalid("capture"));
        }
        self.phase = PipelinePhase::Capturing;
        self.attempt_id = Some(attempt_id.to_string());
        self.cancel = Some(cancel);
        Ok(())
    }

    pub fn begin_extracting(
        &mut self,
        attempt_id: &str,
        image: ImagePayload,
    ) -> Result<(), PipelineError> {
        self.ensure_attempt(attempt_id, PipelinePhase::Capturing)?;
        self.phase = PipelinePhase::Extracting;
        self.image = Some(image);
        Ok(())
    }

    pub fn begin_comparing(
        &mut self,
        attempt_id: &str,
        summary: FeatureSummary,
    ) -> Result<(), PipelineError> {
        self.ensure_attempt(attempt_id, PipelinePhase::Extracting)?;
        self.phase = PipelinePhase::Comparing;
        self.current_scan = Some(summary);
        Ok(())
    }

    pub fn finish(
        &mut self,
        attempt_id: &str,
        summary: FeatureSummary,
        outcome: ScanOutcome,
    ) -> Result<(), PipelineError> {
        let expected = match outcome {
            ScanOutcome::NewScanComplete => PipelinePhase::Extracting,
            _ => PipelinePhase::Comparing,
        };
        self.ensure_attempt(attempt_id, expected)?;
        self.phase = PipelinePhase::Result { outcome };
        self.current_scan = Some(summary);
        self.cancel = None;
        Ok(())
    }

    /// Back to idle after the capture source failed. Returns false when the
    /// attempt had already been reset.
    pub fn capture_failed(&mut self, attempt_id: &str) -> bool {
        if self.attempt_id.as_deref() != Some(attempt_id) {
            return false;
        }
        self.clear_scan();
        true
    }

    /// Discards the current attempt and hands back its cancellation token.
    pub fn reset(&mut self) -> Option<CancellationToken> {
        let cancel = self.cancel.take();
        self.clear_scan();
        cancel
    }

    /// The frame and features a save would persist.
    pub fn save_candidate(&self) -> Result<(&FeatureSummary, &ImagePayload), PipelineError> {
        match (self.phase, &self.current_scan, &self.image) {
            (
                PipelinePhase::Result {
                    outcome: ScanOutcome::NewScanComplete,
                },
                Some(summary),
                Some(image),
            ) => Ok((summary, image)),
            _ => Err(self.invalid("save")),
        }
    }

    pub fn snapshot(&self, protected: bool) -> PipelineSnapshot {
        let match_result = match self.phase {
            PipelinePhase::Result {
                outcome: ScanOutcome::NewScanComplete,
            } => None,
            PipelinePhase::Result { outcome } => Some(MatchResult {
                success: outcome.is_match(),
                score: outcome.score(),
            }),
            _ => None,
        };

        PipelineSnapshot {
            phase: self.phase,
            attempt_id: self.attempt_id.clone(),
            current_scan: self.current_scan.clone(),
            match_result,
            dashboard: DashboardStatus {
                protected,
                last_scan_at: self.last_scan_at,
            },
        }
    }

    fn ensure_attempt(
        &self,
        attempt_id: &str,
        expected: PipelinePhase,
    ) -> Result<(), PipelineError> {
        if self.attempt_id.as_deref() != Some(attempt_id) || self.phase != expected {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    fn clear_scan(&mut self) {
        self.phase = PipelinePhase::Idle;
        self.attempt_id = None;
        self.image = None;
        self.current_scan = None;
        self.cancel = None;
    }

    fn invalid(&self, action: &'static str) -> PipelineError {
        PipelineError::InvalidTransition {
            action,
            phase: self.phase.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScanId, SignaturePoint};

    fn summary() -> FeatureSummary {
        FeatureSummary {
            id: ScanId::from_bits(0xfeed),
            patterns: [42; 12],
            signature_points: [SignaturePoint::default(); 15],
        }
    }

    fn image() -> ImagePayload {
        ImagePayload::from_data_url("data:image/png;base64,AAAA").unwrap()
    }

    #[test]
    fn threshold_is_strict() {
        assert!(!ScanOutcome::from_score(80.0, 80.0).is_match());
        assert!(ScanOutcome::from_score(80.0001, 80.0).is_match());
        assert_eq!(
            ScanOutcome::from_score(80.0, 80.0).headline(),
            "No Match Found"
        );
    }

    #[test]
    fn outcome_percent_rounds() {
        assert_eq!(ScanOutcome::Matched { score: 91.5 }.rounded_percent(), Some(92));
        assert_eq!(ScanOutcome::NewScanComplete.rounded_percent(), None);
    }

    #[test]
    fn new_scan_path_reaches_result() {
        let mut state = PipelineState::default();
        state.begin_capture("a1", CancellationToken::new()).unwrap();
        state.begin_extracting("a1", image()).unwrap();
        state
            .finish("a1", summary(), ScanOutcome::NewScanComplete)
            .unwrap();

        assert_eq!(
            state.phase(),
            PipelinePhase::Result {
                outcome: ScanOutcome::NewScanComplete
            }
        );
        let (candidate, _) = state.save_candidate().unwrap();
        assert_eq!(candidate, &summary());
    }

    #[test]
    fn comparison_path_exposes_match_result() {
        let mut state = PipelineState::default();
        state.begin_capture("a1", CancellationToken::new()).unwrap();
        state.begin_extracting("a1", image()).unwrap();
        state.begin_comparing("a1", summary()).unwrap();
        state
            .finish("a1", summary(), ScanOutcome::Unmatched { score: 75.0 })
            .unwrap();

        let snapshot = state.snapshot(true);
        assert_eq!(
            snapshot.match_result,
            Some(MatchResult {
                success: false,
                score: Some(75.0)
            })
        );
        assert!(matches!(
            state.save_candidate(),
            Err(PipelineError::InvalidTransition { action: "save", .. })
        ));
    }

    #[test]
    fn unreadable_record_yields_scoreless_failure_and_blocks_save() {
        let mut state = PipelineState::default();
        state.begin_capture("a1", CancellationToken::new()).unwrap();
        state.begin_extracting("a1", image()).unwrap();
        state.begin_comparing("a1", summary()).unwrap();
        state
            .finish("a1", summary(), ScanOutcome::Unverifiable)
            .unwrap();

        assert_eq!(
            state.snapshot(true).match_result,
            Some(MatchResult {
                success: false,
                score: None
            })
        );
        assert_eq!(ScanOutcome::Unverifiable.headline(), "No Match Found");
        assert_eq!(ScanOutcome::Unverifiable.rounded_percent(), None);
        assert!(matches!(
            state.save_candidate(),
            Err(PipelineError::InvalidTransition { action: "save", .. })
        ));
    }

    #[test]
    fn capture_requires_idle() {
        let mut state = PipelineState::default();
        state.begin_capture("a1", CancellationToken::new()).unwrap();

        assert!(matches!(
            state.begin_capture("a2", CancellationToken::new()),
            Err(PipelineError::InvalidTransition {
                action: "capture",
                phase: "capturing"
            })
        ));
    }

    #[test]
    fn reset_hands_back_token_and_invalidates_attempt() {
        let mut state = PipelineState::default();
        let token = CancellationToken::new();
        state.begin_capture("a1", token.clone()).unwrap();

        let returned = state.reset().unwrap();
        returned.cancel();
        assert!(token.is_cancelled());
        assert_eq!(state.phase(), PipelinePhase::Idle);
        assert!(matches!(
            state.begin_extracting("a1", image()),
            Err(PipelineError::Cancelled)
        ));
    }

    #[test]
    fn stale_failure_does_not_disturb_new_attempt() {
        let mut state = PipelineState::default();
        state.begin_capture("a1", CancellationToken::new()).unwrap();
        state.reset();
        state.begin_capture("a2", CancellationToken::new()).unwrap();

        assert!(!state.capture_failed("a1"));
        assert_eq!(state.phase(), PipelinePhase::Capturing);
        assert!(state.capture_failed("a2"));
        assert_eq!(state.phase(), PipelinePhase::Idle);
    }

    #[test]
    fn reset_keeps_last_scan_date() {
        let saved_at = Utc::now();
        let mut state = PipelineState::new(Some(saved_at));
        state.begin_capture("a1", CancellationToken::new()).unwrap();
        state.reset();

        assert_eq!(state.last_scan_at(), Some(saved_at));
    }

    #[test]
    fn snapshot_flattens_phase() {
        let state = PipelineState::default();
        let json = serde_json::to_value(state.snapshot(false)).unwrap();

        assert_eq!(json["phase"], "idle");
        assert_eq!(json["dashboard"]["protected"], false);
        assert!(json["currentScan"].is_null());
    }
}
