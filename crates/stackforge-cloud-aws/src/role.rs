//! IAM execution role for the request-handler functions

use crate::error::{has_code, missing_field, provider_error};
use async_trait::async_trait;
use aws_sdk_iam::Client;
use stackforge_cloud::{ProjectSettings, ResourceDescriptor, ResourceProvider, Result, StepInputs};

const RESOURCE: &str = "compute-role";
const NOT_FOUND: &[&str] = &["NoSuchEntity"];

pub const MANAGED_POLICIES: [&str; 4] = [
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole",
    "arn:aws:iam::aws:policy/AmazonS3FullAccess",
    "arn:aws:iam::aws:policy/AmazonSNSFullAccess",
    "arn:aws:iam::aws:policy/AmazonSQSFullAccess",
];

pub fn lambda_trust_policy() -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": "lambda.amazonaws.com" },
            "Action": "sts:AssumeRole",
        }]
    })
    .to_string()
}

/// Role `{project}-lambda-role`
pub struct RoleProvider {
    client: Client,
    settings: ProjectSettings,
}

impl RoleProvider {
    pub fn new(client: Client, settings: ProjectSettings) -> Self {
        Self { client, settings }
    }

    async fn find_role(&self, name: &str) -> Result<Option<String>> {
        match self.client.get_role().role_name(name).send().await {
            Ok(output) => Ok(output.role().map(|role| role.arn().to_string())),
            Err(e) if has_code(&e, NOT_FOUND) => Ok(None),
            Err(e) => Err(provider_error(RESOURCE, e)),
        }
    }
}

#[async_trait]
impl ResourceProvider for RoleProvider {
    fn name(&self) -> &str {
        "iam-role"
    }

    async fn ensure(&self, _inputs: &StepInputs) -> Result<ResourceDescriptor> {
        let name = self.settings.resource_name("lambda-role");

        if let Some(arn) = self.find_role(&name).await? {
            tracing::info!("Reusing role {}", arn);
            return Ok(ResourceDescriptor::new()
                .with_attribute("role_name", name)
                .with_attribute("role_arn", arn));
        }

        let output = self
            .client
            .create_role()
            .role_name(&name)
            .assume_role_policy_document(lambda_trust_policy())
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        let arn = output
            .role()
            .map(|role| role.arn().to_string())
            .ok_or_else(|| missing_field(RESOURCE, "Role.Arn"))?;
        tracing::info!("Created role {}", arn);

        for policy in MANAGED_POLICIES {
            self.client
                .attach_role_policy()
                .role_name(&name)
                .policy_arn(policy)
                .send()
                .await
                .map_err(|e| provider_error(RESOURCE, e))?;
            tracing::debug!("Attached {} to {}", policy, name);
        }

        Ok(ResourceDescriptor::new()
            .with_attribute("role_name", name)
            .with_attribute("role_arn", arn))
    }

    async fn teardown(&self, descriptor: &ResourceDescriptor) -> Result<()> {
        let name = descriptor.require(RESOURCE, "role_name")?;

        let attached = match self
            .client
            .list_attached_role_policies()
            .role_name(name)
            .send()
            .await
        {
            Ok(output) => output.attached_policies().to_vec(),
            Err(e) if has_code(&e, NOT_FOUND) => {
                tracing::info!("Role {} already gone", name);
                return Ok(());
            }
            Err(e) => return Err(provider_error(RESOURCE, e)),
        };

        for policy_arn in attached.iter().filter_map(|p| p.policy_arn()) {
            match self
                .client
                .detach_role_policy()
                .role_name(name)
                .policy_arn(policy_arn)
                .send()
                .await
            {
                Ok(_) => tracing::debug!("Detached {} from {}", policy_arn, name),
                Err(e) if has_code(&e, NOT_FOUND) => {}
                Err(e) => return Err(provider_error(RESOURCE, e)),
            }
        }

        match self.client.delete_role().role_name(name).send().await {
            Ok(_) => tracing::info!("Deleted role {}", name),
            Err(e) if has_code(&e, NOT_FOUND) => {}
            Err(e) => return Err(provider_error(RESOURCE, e)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_policy_allows_lambda_to_assume() {
        let policy: serde_json::Value = serde_json::from_str(&lambda_trust_policy()).unwrap();
        let statement = &policy["Statement"][0];

        assert_eq!(statement["Principal"]["Service"], "lambda.amazonaws.com");
        assert_eq!(statement["Action"], "sts:AssumeRole");
    }

    #[test]
    fn test_managed_policies_cover_handler_services() {
        for service in ["AWSLambdaBasicExecutionRole", "S3", "SNS", "SQS"] {
            assert!(
                MANAGED_POLICIES.iter().any(|arn| arn.contains(service)),
                "no policy for {}",
                service
            );
        }
    }
}
