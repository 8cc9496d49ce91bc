//! Operator-facing step status.
//!
//! Every provisioning and teardown step emits a `started` line before it
//! runs and a `finished` line with its outcome afterwards, so an operator
//! can see where a run stopped and simply re-run it. Status is emitted on
//! **stderr** so stdout remains parseable for scripts (`kbctl id --json`).

use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use crate::models::StepOutcome;

/// A single status event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepEvent {
    Started { step: String },
    /// A polling loop is waiting on a remote status.
    Waiting {
        step: String,
        status: String,
        wait: Duration,
    },
    Finished { step: String, outcome: StepOutcome },
}

/// Receives step events. Implementations write to stderr (human or JSON).
pub trait StepReporter: Send + Sync {
    fn report(&self, event: StepEvent);
}

/// Human-friendly status on stderr: "kb  create execution role  created".
pub struct StderrSteps;

impl StepReporter for StderrSteps {
    fn report(&self, event: StepEvent) {
        let line = match &event {
            StepEvent::Started { step } => format!("kb  {}  started\n", step),
            StepEvent::Waiting { step, status, wait } => {
                format!("kb  {}  {} (next check in {}s)\n", step, status, wait.as_secs())
            }
            StepEvent::Finished { step, outcome } => match outcome {
                StepOutcome::Failed(detail) => format!("kb  {}  failed: {}\n", step, detail),
                other => format!("kb  {}  {}\n", step, other.label()),
            },
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable status: one JSON object per line on stderr.
pub struct JsonSteps;

impl StepReporter for JsonSteps {
    fn report(&self, event: StepEvent) {
        let obj = match &event {
            StepEvent::Started { step } => serde_json::json!({
                "event": "step",
                "step": step,
                "phase": "started"
            }),
            StepEvent::Waiting { step, status, wait } => serde_json::json!({
                "event": "step",
                "step": step,
                "phase": "waiting",
                "status": status,
                "wait_secs": wait.as_secs()
            }),
            StepEvent::Finished { step, outcome } => {
                let detail = match outcome {
                    StepOutcome::Failed(d) => Some(d.as_str()),
                    _ => None,
                };
                serde_json::json!({
                    "event": "step",
                    "step": step,
                    "phase": "finished",
                    "outcome": outcome.label(),
                    "detail": detail
                })
            }
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when status output is disabled.
pub struct NoSteps;

impl StepReporter for NoSteps {
    fn report(&self, _event: StepEvent) {}
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct CollectingSteps {
    events: Mutex<Vec<StepEvent>>,
}

impl CollectingSteps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StepEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// `(step, outcome)` of every finished step, in order.
    pub fn finished(&self) -> Vec<(String, StepOutcome)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StepEvent::Finished { step, outcome } => Some((step, outcome)),
                _ => None,
            })
            .collect()
    }
}

impl StepReporter for CollectingSteps {
    fn report(&self, event: StepEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Status mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human status when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> std::sync::Arc<dyn StepReporter> {
        match self {
            ProgressMode::Off => std::sync::Arc::new(NoSteps),
            ProgressMode::Human => std::sync::Arc::new(StderrSteps),
            ProgressMode::Json => std::sync::Arc::new(JsonSteps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_reporter_keeps_order() {
        let steps = CollectingSteps::new();
        steps.report(StepEvent::Started {
            step: "create bucket demo-docs".into(),
        });
        steps.report(StepEvent::Finished {
            step: "create bucket demo-docs".into(),
            outcome: StepOutcome::Adopted,
        });
        assert_eq!(steps.events().len(), 2);
        assert_eq!(
            steps.finished(),
            vec![("create bucket demo-docs".to_string(), StepOutcome::Adopted)]
        );
    }

    #[test]
    fn off_mode_reports_nothing() {
        // Must not panic or write anything.
        ProgressMode::Off.reporter().report(StepEvent::Started { step: "x".into() });
    }
}
