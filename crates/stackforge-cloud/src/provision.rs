//! Forward orchestration

use crate::action::{ApplyResult, Plan};
use crate::error::Result;
use crate::provider::ProviderSet;
use crate::state::StateStore;
use crate::step::STEPS;
use std::time::Instant;

/// Walks [`STEPS`] in order, ensuring every step not yet in the record
///
/// The record is saved after each completed step, so a run aborted by a
/// provider error resumes at the failing step next time. Nothing is rolled
/// back on failure.
pub struct Provisioner<'a> {
    providers: &'a ProviderSet,
    store: &'a dyn StateStore,
    project_name: String,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        providers: &'a ProviderSet,
        store: &'a dyn StateStore,
        project_name: impl Into<String>,
    ) -> Self {
        Self {
            providers,
            store,
            project_name: project_name.into(),
        }
    }


    pub async fn plan(&self) -> Result<Plan> {
        let state = self.store.load_project(&self.project_name).await?;
        Ok(Plan::provision(&state))
    }

    pub async fn run(&self) -> Result<ApplyResult> {
        let start = Instant::now();
        let mut state = self.store.load_project(&self.project_name).await?;
        let mut result = ApplyResult::new();

        for step in STEPS.iter() {
            if state.contains(step.name) {
                tracing::info!("{} already provisioned, skipping", step.name);
                result.skipped.push(step.name);
                continue;
            }

            let inputs = step.select_inputs(&state)?;
            let provider = self.providers.for_step(step.name);

            tracing::info!("Ensuring {} via {}", step.name, provider.name());
            let descriptor = provider.ensure(&inputs).await.inspect_err(|e| {
                tracing::error!("{} failed: {}", step.name, e);
            })?;

            state.insert(step.name, descriptor);
            self.store.save(&state).await?;
            result.applied.push(step.name);
            tracing::info!("{} provisioned", step.name);
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Provisioning complete: {} ensured, {} skipped ({} ms)",
            result.applied.len(),
            result.skipped.len(),
            result.duration_ms
        );
        Ok(result)
    }
}
