//! StackForge cloud orchestration core
//!
//! Provisions a fixed, dependency-ordered stack of managed services and tears
//! it down again, tracking every created resource in a JSON state record so
//! interrupted runs resume where they stopped.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  StackForge CLI                  │
//! │        (forge provision/deploy/teardown)         │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                stackforge-cloud                  │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │ Provisioner  │  │   Teardown   │             │
//! │  └──────┬───────┘  └──────┬───────┘             │
//! │  ┌──────▼─────────────────▼─────┐ ┌───────────┐ │
//! │  │ trait ResourceProvider {..}  │ │ StateStore│ │
//! │  └──────────────────────────────┘ └───────────┘ │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────────┐
//! │ stackforge-cloud- │
//! │ aws providers     │
//! └───────────────────┘
//! ```

pub mod action;
pub mod descriptor;
pub mod error;
pub mod provider;
pub mod provision;
pub mod settings;
pub mod state;
pub mod step;
pub mod teardown;
pub mod wait;

// Re-exports
pub use action::{Action, ActionType, ApplyResult, Plan, PlanSummary};
pub use descriptor::ResourceDescriptor;
pub use error::{CloudError, Result};
pub use provider::{ProviderSet, ResourceProvider};
pub use provision::Provisioner;
pub use settings::{AdminContacts, FunctionSettings, ProjectSettings};
pub use state::{FileStateStore, StateStore, TopologyOutputs, TopologyState};
pub use step::{InputBinding, ProvisioningStep, STEPS, StepInputs, StepName};
pub use teardown::Teardown;
pub use wait::WaitBudget;
