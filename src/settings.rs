use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Simulated analysis time between receiving a frame and extracting it.
    pub processing_delay_ms: u64,
    /// How long the file camera "scans" before grabbing its frame.
    pub capture_warmup_ms: u64,
    /// Give up on a capture after this long; `None` waits indefinitely.
    pub capture_timeout_ms: Option<u64>,
    /// Scores strictly above this are a match.
    pub match_threshold: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            processing_delay_ms: 2_000,
            capture_warmup_ms: 2_000,
            capture_timeout_ms: None,
            match_threshold: 80.0,
        }
    }
}

impl PipelineSettings {
    /// No artificial delays; used by tests and scripted runs.
    pub fn immediate() -> Self {
        Self {
            processing_delay_ms: 0,
            capture_warmup_ms: 0,
            ..Self::default()
        }
    }

    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }

    pub fn capture_warmup(&self) -> Duration {
        Duration::from_millis(self.capture_warmup_ms)
    }

    pub fn capture_timeout(&self) -> Option<Duration> {
        self.capture_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    pipeline: PipelineSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: UserSettings,
}

impl SettingsStore {
    /// Loads `path`, falling back to defaults when it is missing or unreadable.
    /// A missing file is created with the defaults so they can be edited.
    pub fn new(path: PathBuf) -> Result<Self> {
        let exists = path.exists();
        let data = if exists {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring unreadable settings file {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        let store = Self { path, data };
        if !exists {
            store.persist()?;
        }
        Ok(store)
    }

    pub fn pipeline(&self) -> PipelineSettings {
        self.data.pipeline.clone()
    }

    fn persist(&self) -> Result<()> {
        let serialized = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
