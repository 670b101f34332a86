//! Line-oriented front end: reads commands from stdin and prints pipeline
//! events to stdout as JSON lines.

use anyhow::Result;
use log::{error, info};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use serde_json::json;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};

use crate::{
    analysis::charts::{
        composition, format_scan_date, scatter_points, trend_series, AnalysisDetails,
        MatchStrength,
    },
    error::PipelineError,
    pipeline::{CapturePipeline, PipelinePhase},
};

const HELP: &str = "commands: scan | cancel | reset | save | delete | status | chart | help | quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Scan,
    Reset,
    Save,
    Delete,
    Status,
    Chart,
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "scan" | "capture" => Some(Self::Scan),
            "cancel" | "reset" => Some(Self::Reset),
            "save" => Some(Self::Save),
            "delete" => Some(Self::Delete),
            "status" => Some(Self::Status),
            "chart" => Some(Self::Chart),
            "help" | "?" => Some(Self::Help),
            "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(err) => error!("Failed to serialize console output: {err}"),
    }
}

pub async fn run_console(pipeline: CapturePipeline) -> Result<()> {
    let mut events = pipeline.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_json(&event),
                Err(RecvError::Lagged(skipped)) => {
                    info!("Console fell behind; {skipped} events dropped")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = ConsoleCommand::parse(&line) else {
            println!("unknown command '{}'; {HELP}", line.trim());
            continue;
        };

        match command {
            ConsoleCommand::Scan => {
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    match pipeline.capture().await {
                        Ok(outcome) => {
                            print_json(&json!({
                                "headline": outcome.headline(),
                                "description": outcome.description(),
                                "percent": outcome.rounded_percent(),
                            }));
                        }
                        Err(PipelineError::Cancelled) => {}
                        Err(err) => print_json(&json!({ "error": err.to_string() })),
                    }
                });
            }
            ConsoleCommand::Reset => {
                pipeline.reset().await;
            }
            ConsoleCommand::Save => {
                if let Err(err) = pipeline.save().await {
                    print_json(&json!({ "error": err.to_string() }));
                }
            }
            ConsoleCommand::Delete => {
                if let Err(err) = pipeline.delete().await {
                    print_json(&json!({ "error": err.to_string() }));
                }
            }
            ConsoleCommand::Status => {
                let snapshot = pipeline.snapshot().await;
                match snapshot.dashboard.last_scan_at {
                    Some(at) => println!(
                        "last scan: {}",
                        format_scan_date(at.with_timezone(&chrono::Local))
                    ),
                    None if snapshot.dashboard.protected => println!("last scan: unknown"),
                    None => println!("no retina data stored"),
                }
                print_json(&snapshot);
            }
            ConsoleCommand::Chart => {
                let snapshot = pipeline.snapshot().await;
                let Some(scan) = snapshot.current_scan else {
                    println!("no scan data available; complete a retina scan to see analysis");
                    continue;
                };
                let strength = match snapshot.phase {
                    PipelinePhase::Result { outcome } => outcome.score().map(MatchStrength::from_score),
                    _ => None,
                };
                let mut rng = StdRng::from_entropy();
                print_json(&json!({
                    "patterns": trend_series(&scan.patterns, &mut rng),
                    "points": scatter_points(&scan.signature_points),
                    "composition": composition(&mut rng),
                    "details": AnalysisDetails::generate(&scan.signature_points, &mut rng).lines(),
                    "strength": strength.map(|s| s.label()),
                }));
            }
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => break,
        }
    }

    pipeline.reset().await;
    printer.abort();
    Ok(())
}
