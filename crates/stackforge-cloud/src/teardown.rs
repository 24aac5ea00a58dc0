//! Reverse orchestration

use crate::action::{ApplyResult, Plan};
use crate::error::Result;
use crate::provider::ProviderSet;
use crate::state::StateStore;
use crate::step::STEPS;
use std::time::Instant;

/// Walks [`STEPS`] backwards, tearing down every step present in the record
///
/// Each entry is removed and the record saved as soon as its teardown
/// succeeds. Once the record is empty the file is deleted. A failing
/// teardown aborts with the remaining entries still recorded.
pub struct Teardown<'a> {
    providers: &'a ProviderSet,
    store: &'a dyn StateStore,
    project_name: String,
}

impl<'a> Teardown<'a> {
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
        Ok(Plan::teardown(&state))
    }

    pub async fn run(&self) -> Result<ApplyResult> {
        let start = Instant::now();
        let mut state = self.store.load_project(&self.project_name).await?;
        let mut result = ApplyResult::new();

        for step in STEPS.iter().rev() {
            let Some(descriptor) = state.get(step.name) else {
                result.skipped.push(step.name);
                continue;
            };

            let provider = self.providers.for_step(step.name);
            tracing::info!("Tearing down {} via {}", step.name, provider.name());
            provider.teardown(descriptor).await.inspect_err(|e| {
                tracing::error!("{} teardown failed: {}", step.name, e);
            })?;

            state.remove(step.name);
            self.store.save(&state).await?;
            result.applied.push(step.name);
            tracing::info!("{} removed", step.name);
        }

        if state.is_empty() {
            self.store.delete().await?;
            tracing::info!("State record removed");
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Teardown complete: {} removed ({} ms)",
            result.applied.len(),
            result.duration_ms
        );
        Ok(result)
    }
}
