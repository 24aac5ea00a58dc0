//! Settings passed to providers at construction

use crate::error::{CloudError, Result};
use crate::wait::WaitBudget;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Recipients and credentials for the operator account
///
/// These are the only recognized notification/identity options: the topic
/// provider subscribes `admin_email` and `admin_phone`, the identity provider
/// creates an admin user from `admin_email` and `admin_default_password`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdminContacts {
    pub admin_email: Option<String>,
    pub admin_phone: Option<String>,
    pub admin_default_password: Option<String>,
}

/// Runtime parameters for the deployed request-handler functions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FunctionSettings {
    pub runtime: String,
    pub handler: String,
    pub memory_mb: i32,
    pub timeout_secs: i32,
}

impl Default for FunctionSettings {
    fn default() -> Self {
        Self {
            runtime: "provided.al2023".to_string(),
            handler: "bootstrap".to_string(),
            memory_mb: 128,
            timeout_secs: 30,
        }
    }
}

/// Everything a provider set needs besides cloud credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSettings {
    pub project_name: String,
    pub admin: AdminContacts,
    pub wait: WaitBudget,
    pub functions: FunctionSettings,
    pub artifacts_dir: PathBuf,
}

impl ProjectSettings {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            admin: AdminContacts::default(),
            wait: WaitBudget::default(),
            functions: FunctionSettings::default(),
            artifacts_dir: PathBuf::from("todeploy"),
        }
    }

    /// Project names prefix every cloud resource name, so they must be DNS-safe
    pub fn validate(&self) -> Result<()> {
        let name = &self.project_name;
        if name.is_empty() || name.len() > 40 {
            return Err(CloudError::InvalidConfig(format!(
                "project_name must be 1-40 characters, got '{}'",
                name
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            || name.starts_with('-')
            || name.ends_with('-')
        {
            return Err(CloudError::InvalidConfig(format!(
                "project_name '{}' may only contain lowercase letters, digits and inner '-'",
                name
            )));
        }
        if self.wait.max_attempts == 0 {
            return Err(CloudError::InvalidConfig(
                "wait.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// `{project}-{resource-type}`, the naming convention every existence check relies on
    pub fn resource_name(&self, resource_type: &str) -> String {
        format!("{}-{}", self.project_name, resource_type)
    }
}
