use std::sync::Arc;

use log::debug;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    analysis::RetinaAnalyzer,
    capture::{CaptureSource, ImagePayload},
    error::{CaptureError, PipelineError},
    models::ScanRecord,
    settings::PipelineSettings,
    storage::ScanStore,
    utils::clock::{Clock, SystemClock},
};

use super::{PipelineEvent, PipelineSnapshot, PipelineState, ScanOutcome};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 64;

/// Drives capture → extraction → comparison → result for one session.
///
/// Cloning yields another handle onto the same session. The state lock is
/// never held while waiting on the camera, the store or the processing delay, so
/// [`reset`](Self::reset) can interrupt an attempt that is in flight.
#[derive(Clone)]
pub struct CapturePipeline {
    state: Arc<Mutex<PipelineState>>,
    store: ScanStore,
    analyzer: Arc<dyn RetinaAnalyzer>,
    camera: Arc<dyn CaptureSource>,
    clock: Arc<dyn Clock>,
    settings: PipelineSettings,
    events: broadcast::Sender<PipelineEvent>,
}

impl CapturePipeline {
    /// Reads the store once to seed the dashboard's last scan date.
    pub async fn new(
        store: ScanStore,
        analyzer: Arc<dyn RetinaAnalyzer>,
        camera: Arc<dyn CaptureSource>,
        settings: PipelineSettings,
    ) -> Self {
        let last_scan_at = store.load().await.and_then(|record| record.saved_at());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            state: Arc::new(Mutex::new(PipelineState::new(last_scan_at))),
            store,
            analyzer,
            camera,
            clock: Arc::new(SystemClock),
            settings,
            events,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn snapshot(&self) -> PipelineSnapshot {
        let protected = self.store.exists().await;
        self.state.lock().await.snapshot(protected)
    }

    /// Runs one full attempt. Fails with `InvalidTransition` unless idle,
    /// with `Capture` when the camera fails (the pipeline is idle again and
    /// a retry is possible) and with `Cancelled` when reset mid-attempt.
    pub async fn capture(&self) -> Result<ScanOutcome, PipelineError> {
        let attempt_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();

        self.transition(|state| state.begin_capture(&attempt_id, cancel.clone()))
            .await?;
        log_info!("Scan attempt {attempt_id} started");

        let result = self.run_attempt(&attempt_id, &cancel).await;

        match &result {
            Ok(outcome) => {
                log_info!(
                    "Scan attempt {attempt_id} finished: {}",
                    outcome.headline()
                );
            }
            Err(PipelineError::Capture(err)) => {
                self.recover_from_capture_error(&attempt_id, err).await;
            }
            Err(PipelineError::Cancelled) => {
                log_info!("Scan attempt {attempt_id} cancelled");
            }
            Err(err) => {
                log_error!("Scan attempt {attempt_id} failed: {err}");
            }
        }

        result
    }

    async fn run_attempt(
        &self,
        attempt_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, PipelineError> {
        let image = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            frame = self.request_frame() => frame?,
        };

        self.transition(|state| state.begin_extracting(attempt_id, image.clone()))
            .await?;

        let delay = self.settings.processing_delay();
        if !delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let summary = self.analyzer.extract(&image);
        debug!("Scan attempt {attempt_id} extracted features {}", summary.id);

        let outcome = if self.store.exists().await {
            self.transition(|state| state.begin_comparing(attempt_id, summary.clone()))
                .await?;
            match self.store.load().await {
                Some(stored) => {
                    let score = self.analyzer.compare(&stored.summary(), &summary);
                    ScanOutcome::from_score(score, self.settings.match_threshold)
                }
                None => {
                    log_warn!("Scan attempt {attempt_id} has no readable record to verify against");
                    ScanOutcome::Unverifiable
                }
            }
        } else {
            ScanOutcome::NewScanComplete
        };

        self.transition(|state| state.finish(attempt_id, summary, outcome))
            .await?;

        Ok(outcome)
    }

    async fn request_frame(&self) -> Result<ImagePayload, CaptureError> {
        let request = self.camera.request_image();
        match self.settings.capture_timeout() {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| CaptureError::Timeout(limit))?,
            None => request.await,
        }
    }

    async fn recover_from_capture_error(&self, attempt_id: &str, err: &CaptureError) {
        let protected = self.store.exists().await;
        let snapshot = {
            let mut state = self.state.lock().await;
            if !state.capture_failed(attempt_id) {
                return;
            }
            state.snapshot(protected)
        };

        log_warn!("Scan attempt {attempt_id} could not capture: {err}");
        self.emit(PipelineEvent::CaptureFailed {
            attempt_id: attempt_id.to_string(),
            message: err.to_string(),
        });
        self.emit(PipelineEvent::StateChanged { snapshot });
    }

    /// Returns to idle, dropping the current scan and cancelling any attempt
    /// in flight. Valid from every phase.
    pub async fn reset(&self) -> PipelineSnapshot {
        let protected = self.store.exists().await;
        let snapshot = {
            let mut state = self.state.lock().await;
            if let Some(cancel) = state.reset() {
                cancel.cancel();
            }
            state.snapshot(protected)
        };

        self.emit(PipelineEvent::StateChanged {
            snapshot: snapshot.clone(),
        });
        snapshot
    }

    /// Persists the scan shown in a `NewScanComplete` result. The phase does
    /// not change.
    pub async fn save(&self) -> Result<ScanRecord, PipelineError> {
        let record = {
            let state = self.state.lock().await;
            let (summary, image) = state.save_candidate()?;
            ScanRecord::from_summary(summary, image.as_data_url(), self.clock.now())
        };

        if let Err(err) = self.store.try_save(&record).await {
            log_error!("Failed to save retina data: {err}");
            self.emit(PipelineEvent::StorageFailed {
                message: err.to_string(),
            });
            return Err(err.into());
        }

        let protected = self.store.exists().await;
        let snapshot = {
            let mut state = self.state.lock().await;
            state.set_last_scan_at(record.saved_at());
            state.snapshot(protected)
        };

        log_info!("Saved retina data {}", record.id);
        self.emit(PipelineEvent::RecordSaved {
            id: record.id.clone(),
            timestamp: record.timestamp,
        });
        self.emit(PipelineEvent::StateChanged { snapshot });

        Ok(record)
    }

    /// Removes the stored record. Valid from every phase.
    pub async fn delete(&self) -> Result<(), PipelineError> {
        if let Err(err) = self.store.try_clear().await {
            log_error!("Failed to delete retina data: {err}");
            self.emit(PipelineEvent::StorageFailed {
                message: err.to_string(),
            });
            return Err(err.into());
        }

        let protected = self.store.exists().await;
        let snapshot = {
            let mut state = self.state.lock().await;
            state.set_last_scan_at(None);
            state.snapshot(protected)
        };

        log_info!("Deleted stored retina data");
        self.emit(PipelineEvent::RecordDeleted);
        self.emit(PipelineEvent::StateChanged { snapshot });

        Ok(())
    }

    async fn transition<F>(&self, apply: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut PipelineState) -> Result<(), PipelineError>,
    {
        let protected = self.store.exists().await;
        let snapshot = {
            let mut state = self.state.lock().await;
            apply(&mut state)?;
            state.snapshot(protected)
        };

        self.emit(PipelineEvent::StateChanged { snapshot });
        Ok(())
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
