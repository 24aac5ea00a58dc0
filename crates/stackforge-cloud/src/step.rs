//! The fixed provisioning step sequence
//!
//! [`STEPS`] is the single source of truth for dependency ordering. Each step
//! declares which attributes of earlier steps it consumes; provisioning walks
//! the table forwards and teardown walks it backwards.
//!
//! ```text
//! network ──────────► cache ──────────┐
//! messaging-topic ──► messaging-queue │
//! data-bucket ────────────────────────┤
//! compute-role ───────────────────────┴──► compute-functions
//! identity + compute-functions ──────────► api-gateway
//! frontend-bucket + api-gateway ─────────► edge-cache
//! ```

use crate::error::{CloudError, Result};
use crate::state::TopologyState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Name of a provisioning step; also the key of its entry in the state record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepName {
    Network,
    FrontendBucket,
    DataBucket,
    Cache,
    MessagingTopic,
    MessagingQueue,
    Identity,
    ComputeRole,
    ComputeFunctions,
    ApiGateway,
    EdgeCache,
}

impl StepName {
    pub const ALL: [StepName; 11] = [
        StepName::Network,
        StepName::FrontendBucket,
        StepName::DataBucket,
        StepName::Cache,
        StepName::MessagingTopic,
        StepName::MessagingQueue,
        StepName::Identity,
        StepName::ComputeRole,
        StepName::ComputeFunctions,
        StepName::ApiGateway,
        StepName::EdgeCache,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Network => "network",
            StepName::FrontendBucket => "frontend-bucket",
            StepName::DataBucket => "data-bucket",
            StepName::Cache => "cache",
            StepName::MessagingTopic => "messaging-topic",
            StepName::MessagingQueue => "messaging-queue",
            StepName::Identity => "identity",
            StepName::ComputeRole => "compute-role",
            StepName::ComputeFunctions => "compute-functions",
            StepName::ApiGateway => "api-gateway",
            StepName::EdgeCache => "edge-cache",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        StepName::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| CloudError::StateCorrupt(format!("unknown step name '{}'", s)))
    }
}

/// One attribute copied from an earlier step's descriptor into a step's inputs
#[derive(Debug, Clone, Copy)]
pub struct InputBinding {
    pub from: StepName,
    pub attribute: &'static str,
    pub alias: &'static str,
}

const fn bind(from: StepName, attribute: &'static str, alias: &'static str) -> InputBinding {
    InputBinding {
        from,
        attribute,
        alias,
    }
}

/// A named unit of provisioning and the inputs it reads from prior steps
#[derive(Debug, Clone, Copy)]
pub struct ProvisioningStep {
    pub name: StepName,
    pub inputs: &'static [InputBinding],
}

/// Steps in dependency order
pub const STEPS: [ProvisioningStep; 11] = [
    ProvisioningStep {
        name: StepName::Network,
        inputs: &[],
    },
    ProvisioningStep {
        name: StepName::FrontendBucket,
        inputs: &[],
    },
    ProvisioningStep {
        name: StepName::DataBucket,
        inputs: &[],
    },
    ProvisioningStep {
        name: StepName::Cache,
        inputs: &[
            bind(StepName::Network, "vpc_id", "vpc_id"),
            bind(StepName::Network, "private_subnet_id", "subnet_id"),
        ],
    },
    ProvisioningStep {
        name: StepName::MessagingTopic,
        inputs: &[],
    },
    ProvisioningStep {
        name: StepName::MessagingQueue,
        inputs: &[bind(StepName::MessagingTopic, "topic_arn", "topic_arn")],
    },
    ProvisioningStep {
        name: StepName::Identity,
        inputs: &[],
    },
    ProvisioningStep {
        name: StepName::ComputeRole,
        inputs: &[],
    },
    ProvisioningStep {
        name: StepName::ComputeFunctions,
        inputs: &[
            bind(StepName::ComputeRole, "role_arn", "role_arn"),
            bind(StepName::Cache, "endpoint", "cache_endpoint"),
            bind(StepName::DataBucket, "bucket", "data_bucket"),
            bind(StepName::MessagingTopic, "topic_arn", "topic_arn"),
        ],
    },
    ProvisioningStep {
        name: StepName::ApiGateway,
        inputs: &[
            bind(StepName::Identity, "user_pool_arn", "user_pool_arn"),
            bind(StepName::ComputeFunctions, "list_arn", "list_arn"),
            bind(StepName::ComputeFunctions, "generate_arn", "generate_arn"),
            bind(StepName::ComputeFunctions, "delete_arn", "delete_arn"),
        ],
    },
    ProvisioningStep {
        name: StepName::EdgeCache,
        inputs: &[
            bind(StepName::FrontendBucket, "bucket", "frontend_bucket"),
            bind(StepName::ApiGateway, "domain", "api_domain"),
        ],
    },
];

impl ProvisioningStep {
    /// Gather this step's inputs from descriptors already present in state
    pub fn select_inputs(&self, state: &TopologyState) -> Result<StepInputs> {
        let mut inputs = StepInputs::new(self.name);
        for binding in self.inputs {
            let value = state
                .get(binding.from)
                .and_then(|descriptor| descriptor.get(binding.attribute))
                .ok_or_else(|| CloudError::MissingInput {
                    step: self.name.to_string(),
                    key: format!("{}.{}", binding.from, binding.attribute),
                })?;
            inputs.insert(binding.alias, value);
        }
        Ok(inputs)
    }
}

/// Inputs handed to a provider's `ensure`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInputs {
    step: StepName,
    values: BTreeMap<String, String>,
}

impl StepInputs {
    pub fn new(step: StepName) -> Self {
        Self {
            step,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn step(&self) -> StepName {
        self.step
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| CloudError::MissingInput {
            step: self.step.to_string(),
            key: key.to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
