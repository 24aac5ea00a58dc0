//! Cognito user pool, app client and admin user

use crate::error::{has_code, missing_field, provider_error};
use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::Client;
use aws_sdk_cognitoidentityprovider::types::{
    AdminCreateUserConfigType, AttributeDataType, AttributeType, ExplicitAuthFlowsType,
    MessageActionType, PasswordPolicyType, SchemaAttributeType, UserPoolPolicyType,
    UsernameAttributeType, VerifiedAttributeType,
};
use stackforge_cloud::{ProjectSettings, ResourceDescriptor, ResourceProvider, Result, StepInputs};

const RESOURCE: &str = "identity";
const NOT_FOUND: &[&str] = &["ResourceNotFoundException"];
const PAGE_SIZE: i32 = 60;

/// User pool `{project}-user-pool` with client `{project}-client`
pub struct IdentityProvider {
    client: Client,
    settings: ProjectSettings,
}

fn password_policy() -> UserPoolPolicyType {
    UserPoolPolicyType::builder()
        .password_policy(
            PasswordPolicyType::builder()
                .minimum_length(8)
                .require_uppercase(true)
                .require_lowercase(true)
                .require_numbers(true)
                .require_symbols(true)
                .build(),
        )
        .build()
}

impl IdentityProvider {
    pub fn new(client: Client, settings: ProjectSettings) -> Self {
        Self { client, settings }
    }

    async fn find_pool(&self, name: &str) -> Result<Option<String>> {
        let mut next_token = None;
        loop {
            let output = self
                .client
                .list_user_pools()
                .max_results(PAGE_SIZE)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| provider_error(RESOURCE, e))?;

            if let Some(id) = output
                .user_pools()
                .iter()
                .find(|pool| pool.name() == Some(name))
                .and_then(|pool| pool.id())
            {
                return Ok(Some(id.to_string()));
            }

            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                return Ok(None);
            }
        }
    }

    async fn pool_arn(&self, pool_id: &str) -> Result<String> {
        let output = self
            .client
            .describe_user_pool()
            .user_pool_id(pool_id)
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        output
            .user_pool()
            .and_then(|pool| pool.arn())
            .map(str::to_string)
            .ok_or_else(|| missing_field(RESOURCE, "UserPool.Arn"))
    }

    async fn pool_exists(&self, pool_id: &str) -> Result<bool> {
        match self
            .client
            .describe_user_pool()
            .user_pool_id(pool_id)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if has_code(&e, NOT_FOUND) => Ok(false),
            Err(e) => Err(provider_error(RESOURCE, e)),
        }
    }

    async fn create_pool(&self, name: &str) -> Result<(String, String)> {
        let output = self
            .client
            .create_user_pool()
            .pool_name(name)
            .policies(password_policy())
            .auto_verified_attributes(VerifiedAttributeType::Email)
            .username_attributes(UsernameAttributeType::Email)
            .admin_create_user_config(
                AdminCreateUserConfigType::builder()
                    .allow_admin_create_user_only(false)
                    .build(),
            )
            .schema(
                SchemaAttributeType::builder()
                    .name("email")
                    .attribute_data_type(AttributeDataType::String)
                    .required(true)
                    .mutable(true)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        let pool = output
            .user_pool()
            .ok_or_else(|| missing_field(RESOURCE, "UserPool"))?;
        let id = pool.id().ok_or_else(|| missing_field(RESOURCE, "UserPool.Id"))?;
        let arn = pool
            .arn()
            .ok_or_else(|| missing_field(RESOURCE, "UserPool.Arn"))?;

        tracing::info!("Created user pool {} ({})", name, id);
        Ok((id.to_string(), arn.to_string()))
    }

    async fn list_clients(&self, pool_id: &str) -> Result<Vec<(String, Option<String>)>> {
        let mut clients = Vec::new();
        let mut next_token = None;
        loop {
            let output = self
                .client
                .list_user_pool_clients()
                .user_pool_id(pool_id)
                .max_results(PAGE_SIZE)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| provider_error(RESOURCE, e))?;

            clients.extend(output.user_pool_clients().iter().filter_map(|client| {
                client
                    .client_id()
                    .map(|id| (id.to_string(), client.client_name().map(str::to_string)))
            }));

            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                return Ok(clients);
            }
        }
    }

    async fn ensure_client(&self, pool_id: &str) -> Result<String> {
        let name = self.settings.resource_name("client");

        let existing = self.list_clients(pool_id).await?;
        if let Some((id, _)) = existing
            .into_iter()
            .find(|(_, client_name)| client_name.as_deref() == Some(name.as_str()))
        {
            return Ok(id);
        }

        let output = self
            .client
            .create_user_pool_client()
            .user_pool_id(pool_id)
            .client_name(&name)
            .generate_secret(false)
            .explicit_auth_flows(ExplicitAuthFlowsType::from("ALLOW_USER_SRP_AUTH"))
            .explicit_auth_flows(ExplicitAuthFlowsType::from("ALLOW_REFRESH_TOKEN_AUTH"))
            .supported_identity_providers("COGNITO")
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        let client_id = output
            .user_pool_client()
            .and_then(|client| client.client_id())
            .ok_or_else(|| missing_field(RESOURCE, "UserPoolClient.ClientId"))?;

        tracing::info!("Created user pool client {} ({})", name, client_id);
        Ok(client_id.to_string())
    }

    async fn create_admin(&self, pool_id: &str, email: &str, password: &str) -> Result<()> {
        let attribute = |name: &str, value: &str| {
            AttributeType::builder()
                .name(name)
                .value(value)
                .build()
                .map_err(|e| provider_error(RESOURCE, e))
        };

        self.client
            .admin_create_user()
            .user_pool_id(pool_id)
            .username(email)
            .user_attributes(attribute("email", email)?)
            .user_attributes(attribute("email_verified", "true")?)
            .temporary_password(password)
            .message_action(MessageActionType::from("SUPPRESS"))
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        self.client
            .admin_set_user_password()
            .user_pool_id(pool_id)
            .username(email)
            .password(password)
            .permanent(true)
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        tracing::info!("Created admin user {}", email);
        Ok(())
    }
}

#[async_trait]
impl ResourceProvider for IdentityProvider {
    fn name(&self) -> &str {
        "cognito-user-pool"
    }

    async fn ensure(&self, _inputs: &StepInputs) -> Result<ResourceDescriptor> {
        let name = self.settings.resource_name("user-pool");

        let (pool_id, pool_arn) = match self.find_pool(&name).await? {
            Some(pool_id) => {
                tracing::info!("Reusing user pool {} ({})", name, pool_id);
                let arn = self.pool_arn(&pool_id).await?;
                (pool_id, arn)
            }
            None => {
                let created = self.create_pool(&name).await?;
                let admin = &self.settings.admin;
                if let (Some(email), Some(password)) =
                    (&admin.admin_email, &admin.admin_default_password)
                {
                    // the pool is usable without an admin account
                    if let Err(e) = self.create_admin(&created.0, email, password).await {
                        tracing::warn!("Could not create admin user {}: {}", email, e);
                    }
                }
                created
            }
        };

        let client_id = self.ensure_client(&pool_id).await?;

        Ok(ResourceDescriptor::new()
            .with_attribute("user_pool_id", pool_id)
            .with_attribute("user_pool_arn", pool_arn)
            .with_attribute("client_id", client_id))
    }

    async fn teardown(&self, descriptor: &ResourceDescriptor) -> Result<()> {
        let pool_id = descriptor.require(RESOURCE, "user_pool_id")?;

        if !self.pool_exists(pool_id).await? {
            tracing::info!("User pool {} already gone", pool_id);
            return Ok(());
        }

        for (client_id, _) in self.list_clients(pool_id).await? {
            match self
                .client
                .delete_user_pool_client()
                .user_pool_id(pool_id)
                .client_id(&client_id)
                .send()
                .await
            {
                Ok(_) => tracing::info!("Deleted user pool client {}", client_id),
                Err(e) if has_code(&e, NOT_FOUND) => {}
                Err(e) => return Err(provider_error(RESOURCE, e)),
            }
        }

        match self
            .client
            .delete_user_pool()
            .user_pool_id(pool_id)
            .send()
            .await
        {
            Ok(_) => tracing::info!("Deleted user pool {}", pool_id),
            Err(e) if has_code(&e, NOT_FOUND) => {}
            Err(e) => return Err(provider_error(RESOURCE, e)),
        }
        Ok(())
    }
}
