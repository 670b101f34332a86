pub mod controller;
pub mod events;
pub mod state;

pub use controller::CapturePipeline;
pub use events::PipelineEvent;
pub use state::{
    DashboardStatus, MatchResult, PipelinePhase, PipelineSnapshot, PipelineState, ScanOutcome,
};
