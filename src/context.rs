//! Per-run context shared by every provisioner.

use std::sync::Arc;
use std::time::Duration;

use crate::clients::Clients;
use crate::config::PollSettings;
use crate::models::StepOutcome;
use crate::naming::Names;
use crate::progress::{StepEvent, StepReporter};
use crate::retry::{RetryPolicy, Sleeper};

/// Clients, account coordinates, derived names and timing for one
/// orchestrator instance. Built once and passed by reference to every
/// step; its lifetime is the orchestrator's, not the process's.
pub struct ProvisionContext {
    pub clients: Clients,
    pub region: String,
    pub account: String,
    /// ARN of the principal running the orchestrator.
    pub caller_arn: String,
    pub names: Names,
    pub poll: PollSettings,
    pub retry: RetryPolicy,
    pub sleeper: Arc<dyn Sleeper>,
    pub reporter: Arc<dyn StepReporter>,
}

impl ProvisionContext {
    pub fn started(&self, step: &str) {
        tracing::info!(step, "step started");
        self.reporter.report(StepEvent::Started {
            step: step.to_string(),
        });
    }

    pub fn finished(&self, step: &str, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Failed(detail) => tracing::warn!(step, error = %detail, "step failed"),
            other => tracing::info!(step, outcome = other.label(), "step finished"),
        }
        self.reporter.report(StepEvent::Finished {
            step: step.to_string(),
            outcome,
        });
    }

    /// Report a non-terminal remote status, then sleep for `wait`.
    pub async fn wait_on(&self, step: &str, status: &str, wait: Duration) {
        tracing::debug!(step, status, wait_secs = wait.as_secs(), "waiting");
        self.reporter.report(StepEvent::Waiting {
            step: step.to_string(),
            status: status.to_string(),
            wait,
        });
        self.sleeper.sleep(wait).await;
    }

    /// Sleep without reporting, for propagation delays.
    pub async fn pause(&self, wait: Duration) {
        self.sleeper.sleep(wait).await;
    }

    pub fn policy_arn(&self, name: &str) -> String {
        format!("arn:aws:iam::{}:policy/{}", self.account, name)
    }
}

/// A context over [`crate::memory::MemoryCloud`] with instant sleeps and
/// no retry pauses, for unit tests.
#[cfg(test)]
pub(crate) fn in_memory(
    cloud: Arc<crate::memory::MemoryCloud>,
    spec: &crate::spec::ResourceSpec,
) -> (ProvisionContext, Arc<crate::retry::RecordingSleeper>, Arc<crate::progress::CollectingSteps>) {
    use crate::memory::{MEMORY_ACCOUNT, MEMORY_REGION};

    let sleeper = Arc::new(crate::retry::RecordingSleeper::new());
    let reporter = Arc::new(crate::progress::CollectingSteps::new());
    let ctx = ProvisionContext {
        clients: Clients::from_provider(cloud),
        region: MEMORY_REGION.to_string(),
        account: MEMORY_ACCOUNT.to_string(),
        caller_arn: format!("arn:aws:iam::{}:user/tester", MEMORY_ACCOUNT),
        names: Names::new(spec, MEMORY_REGION, MEMORY_ACCOUNT),
        poll: PollSettings::default(),
        retry: RetryPolicy::default(),
        sleeper: sleeper.clone(),
        reporter: reporter.clone(),
    };
    (ctx, sleeper, reporter)
}
