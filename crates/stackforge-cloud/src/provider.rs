//! Resource provider contract

use crate::descriptor::ResourceDescriptor;
use crate::error::Result;
use crate::step::{StepInputs, StepName};
use async_trait::async_trait;

/// One managed-service capability (network, bucket, cache cluster, ...)
///
/// # Contract
///
/// - `ensure` looks for a resource named or tagged `{project}-{resource-type}`
///   first and returns its descriptor untouched when found. Only when nothing
///   is found does it create the resource, optionally polling until it is
///   ready. A backend "already exists" answer is success.
/// - `teardown` deletes the resource and the children it directly owns, and
///   must succeed on a resource whose children are already gone. A backend
///   "not found" answer is success.
/// - Any other backend rejection is a [`crate::CloudError::Provider`].
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Provider name for logs (e.g. "ec2-network", "s3-bucket")
    fn name(&self) -> &str;

    async fn ensure(&self, inputs: &StepInputs) -> Result<ResourceDescriptor>;

    async fn teardown(&self, descriptor: &ResourceDescriptor) -> Result<()>;
}

/// The statically constructed provider for every step
///
/// Each field is one capability slot; [`ProviderSet::for_step`] is an
/// exhaustive match, so there is no lookup by name at run time.
pub struct ProviderSet {
    pub network: Box<dyn ResourceProvider>,
    pub frontend_bucket: Box<dyn ResourceProvider>,
    pub data_bucket: Box<dyn ResourceProvider>,
    pub cache: Box<dyn ResourceProvider>,
    pub messaging_topic: Box<dyn ResourceProvider>,
    pub messaging_queue: Box<dyn ResourceProvider>,
    pub identity: Box<dyn ResourceProvider>,
    pub compute_role: Box<dyn ResourceProvider>,
    pub compute_functions: Box<dyn ResourceProvider>,
    pub api_gateway: Box<dyn ResourceProvider>,
    pub edge_cache: Box<dyn ResourceProvider>,
}

impl ProviderSet {
    pub fn for_step(&self, step: StepName) -> &dyn ResourceProvider {
        match step {
            StepName::Network => self.network.as_ref(),
            StepName::FrontendBucket => self.frontend_bucket.as_ref(),
            StepName::DataBucket => self.data_bucket.as_ref(),
            StepName::Cache => self.cache.as_ref(),
            StepName::MessagingTopic => self.messaging_topic.as_ref(),
            StepName::MessagingQueue => self.messaging_queue.as_ref(),
            StepName::Identity => self.identity.as_ref(),
            StepName::ComputeRole => self.compute_role.as_ref(),
            StepName::ComputeFunctions => self.compute_functions.as_ref(),
            StepName::ApiGateway => self.api_gateway.as_ref(),
            StepName::EdgeCache => self.edge_cache.as_ref(),
        }
    }
}
