use async_trait::async_trait;
use stackforge_cloud::{
    CloudError, FileStateStore, ProviderSet, ResourceDescriptor, ResourceProvider, Result, STEPS,
    StepInputs, StepName,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Operation observed by the fake cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Ensure(StepName),
    Teardown(StepName),
}

#[derive(Default)]
struct Ledger {
    existing: BTreeMap<StepName, ResourceDescriptor>,
    creates: BTreeMap<StepName, u32>,
    deletes: BTreeMap<StepName, u32>,
    calls: Vec<Call>,
    inputs: BTreeMap<StepName, StepInputs>,
    fail_ensure: BTreeSet<StepName>,
    fail_teardown: BTreeSet<StepName>,
}

/// In-memory cloud shared by every fake provider
#[derive(Clone)]
pub struct FakeCloud {
    project: String,
    ledger: Arc<Mutex<Ledger>>,
}

impl FakeCloud {
    pub fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            ledger: Arc::new(Mutex::new(Ledger::default())),
        }
    }

    pub fn providers(&self) -> ProviderSet {
        let p = |step| -> Box<dyn ResourceProvider> {
            Box::new(FakeProvider {
                step,
                cloud: self.clone(),
            })
        };
        ProviderSet {
            network: p(StepName::Network),
            frontend_bucket: p(StepName::FrontendBucket),
            data_bucket: p(StepName::DataBucket),
            cache: p(StepName::Cache),
            messaging_topic: p(StepName::MessagingTopic),
            messaging_queue: p(StepName::MessagingQueue),
            identity: p(StepName::Identity),
            compute_role: p(StepName::ComputeRole),
            compute_functions: p(StepName::ComputeFunctions),
            api_gateway: p(StepName::ApiGateway),
            edge_cache: p(StepName::EdgeCache),
        }
    }

    pub fn fail_ensure(&self, step: StepName) {
        self.ledger.lock().unwrap().fail_ensure.insert(step);
    }

    pub fn fail_teardown(&self, step: StepName) {
        self.ledger.lock().unwrap().fail_teardown.insert(step);
    }

    pub fn clear_failures(&self) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.fail_ensure.clear();
        ledger.fail_teardown.clear();
    }

    pub fn exists(&self, step: StepName) -> bool {
        self.ledger.lock().unwrap().existing.contains_key(&step)
    }

    pub fn resource_count(&self) -> usize {
        self.ledger.lock().unwrap().existing.len()
    }

    pub fn creates(&self, step: StepName) -> u32 {
        *self.ledger.lock().unwrap().creates.get(&step).unwrap_or(&0)
    }

    pub fn deletes(&self, step: StepName) -> u32 {
        *self.ledger.lock().unwrap().deletes.get(&step).unwrap_or(&0)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.ledger.lock().unwrap().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.ledger.lock().unwrap().calls.clear();
    }

    pub fn inputs_for(&self, step: StepName) -> Option<StepInputs> {
        self.ledger.lock().unwrap().inputs.get(&step).cloned()
    }
}

/// Descriptor carrying every attribute later steps read from `step`
pub fn fake_descriptor(project: &str, step: StepName) -> ResourceDescriptor {
    let mut descriptor =
        ResourceDescriptor::new().with_attribute("name", format!("{}-{}", project, step));
    for binding in STEPS.iter().flat_map(|s| s.inputs.iter()) {
        if binding.from == step {
            descriptor = descriptor.with_attribute(
                binding.attribute,
                format!("{}-{}-{}", project, step, binding.attribute),
            );
        }
    }
    descriptor
}

struct FakeProvider {
    step: StepName,
    cloud: FakeCloud,
}

#[async_trait]
impl ResourceProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn ensure(&self, inputs: &StepInputs) -> Result<ResourceDescriptor> {
        let mut ledger = self.cloud.ledger.lock().unwrap();
        ledger.calls.push(Call::Ensure(self.step));
        ledger.inputs.insert(self.step, inputs.clone());

        if ledger.fail_ensure.contains(&self.step) {
            return Err(CloudError::provider(self.step.as_str(), "injected failure"));
        }

        if let Some(existing) = ledger.existing.get(&self.step) {
            return Ok(existing.clone());
        }

        let descriptor = fake_descriptor(&self.cloud.project, self.step);
        ledger.existing.insert(self.step, descriptor.clone());
        *ledger.creates.entry(self.step).or_insert(0) += 1;
        Ok(descriptor)
    }

    async fn teardown(&self, _descriptor: &ResourceDescriptor) -> Result<()> {
        let mut ledger = self.cloud.ledger.lock().unwrap();
        ledger.calls.push(Call::Teardown(self.step));

        if ledger.fail_teardown.contains(&self.step) {
            return Err(CloudError::provider(self.step.as_str(), "injected failure"));
        }

        // absent resources count as already deleted
        if ledger.existing.remove(&self.step).is_some() {
            *ledger.deletes.entry(self.step).or_insert(0) += 1;
        }
        Ok(())
    }
}

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn store(&self) -> FileStateStore {
        FileStateStore::new(self.root.path())
    }
}
