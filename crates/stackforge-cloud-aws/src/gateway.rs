//! API Gateway REST API in front of the request handlers

use crate::error::{has_code, missing_field, provider_error};
use async_trait::async_trait;
use aws_sdk_apigateway::types::{AuthorizerType, EndpointConfiguration, EndpointType, IntegrationType};
use stackforge_cloud::{
    CloudError, ProjectSettings, ResourceDescriptor, ResourceProvider, Result, StepInputs,
};

const RESOURCE: &str = "api-gateway";
const NOT_FOUND: &[&str] = &["NotFoundException"];
const STAGE: &str = "prod";

/// One authorized route and the function input serving it
struct Route {
    method: &'static str,
    function_input: &'static str,
}

pub fn integration_uri(region: &str, function_arn: &str) -> String {
    format!(
        "arn:aws:apigateway:{}:lambda:path/2015-03-31/functions/{}/invocations",
        region, function_arn
    )
}

/// Account id is the fifth field of `arn:aws:lambda:<region>:<account>:function:<name>`
pub fn account_from_arn(arn: &str) -> Option<&str> {
    arn.split(':').nth(4).filter(|account| !account.is_empty())
}

pub fn api_domain(api_id: &str, region: &str) -> String {
    format!("{}.execute-api.{}.amazonaws.com", api_id, region)
}

/// REST API `{project}-api` with routes under `/files`
pub struct GatewayProvider {
    apigateway: aws_sdk_apigateway::Client,
    lambda: aws_sdk_lambda::Client,
    settings: ProjectSettings,
    region: String,
}

impl GatewayProvider {
    pub fn new(
        apigateway: aws_sdk_apigateway::Client,
        lambda: aws_sdk_lambda::Client,
        settings: ProjectSettings,
        region: impl Into<String>,
    ) -> Self {
        Self {
            apigateway,
            lambda,
            settings,
            region: region.into(),
        }
    }

    fn descriptor(&self, api_id: &str) -> ResourceDescriptor {
        let domain = api_domain(api_id, &self.region);
        ResourceDescriptor::new()
            .with_attribute("api_id", api_id)
            .with_attribute("url", format!("https://{}/{}", domain, STAGE))
            .with_attribute("domain", domain)
    }

    async fn find_api(&self, name: &str) -> Result<Option<String>> {
        let output = self
            .apigateway
            .get_rest_apis()
            .limit(500)
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        Ok(output
            .items()
            .iter()
            .find(|api| api.name() == Some(name))
            .and_then(|api| api.id())
            .map(str::to_string))
    }

    async fn root_resource(&self, api_id: &str) -> Result<String> {
        let output = self
            .apigateway
            .get_resources()
            .rest_api_id(api_id)
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        output
            .items()
            .iter()
            .find(|resource| resource.path() == Some("/"))
            .and_then(|resource| resource.id())
            .map(str::to_string)
            .ok_or_else(|| missing_field(RESOURCE, "root resource"))
    }

    async fn create_resource(&self, api_id: &str, parent_id: &str, path: &str) -> Result<String> {
        let output = self
            .apigateway
            .create_resource()
            .rest_api_id(api_id)
            .parent_id(parent_id)
            .path_part(path)
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        output
            .id()
            .map(str::to_string)
            .ok_or_else(|| missing_field(RESOURCE, "Resource.Id"))
    }

    async fn add_route(
        &self,
        api_id: &str,
        resource_id: &str,
        authorizer_id: &str,
        route: &Route,
        inputs: &StepInputs,
    ) -> Result<()> {
        let mut method = self
            .apigateway
            .put_method()
            .rest_api_id(api_id)
            .resource_id(resource_id)
            .http_method(route.method)
            .authorization_type("COGNITO_USER_POOLS")
            .authorizer_id(authorizer_id);
        if route.method == "DELETE" {
            method = method.request_parameters("method.request.path.filename", true);
        }
        method
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        let function_arn = inputs.require(route.function_input)?;
        self.apigateway
            .put_integration()
            .rest_api_id(api_id)
            .resource_id(resource_id)
            .http_method(route.method)
            .r#type(IntegrationType::AwsProxy)
            .integration_http_method("POST")
            .uri(integration_uri(&self.region, function_arn))
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        let account = account_from_arn(function_arn).ok_or_else(|| {
            CloudError::provider(RESOURCE, format!("malformed function ARN '{}'", function_arn))
        })?;

        match self
            .lambda
            .add_permission()
            .function_name(function_arn)
            .statement_id(format!("{}-invoke", api_id))
            .action("lambda:InvokeFunction")
            .principal("apigateway.amazonaws.com")
            .source_arn(format!(
                "arn:aws:execute-api:{}:{}:{}/*",
                self.region, account, api_id
            ))
            .send()
            .await
        {
            Ok(_) => {}
            Err(e) if has_code(&e, &["ResourceConflictException"]) => {}
            Err(e) => return Err(provider_error(RESOURCE, e)),
        }

        tracing::debug!("Added route {} on resource {}", route.method, resource_id);
        Ok(())
    }

    async fn create_api(&self, name: &str, inputs: &StepInputs) -> Result<String> {
        let user_pool_arn = inputs.require("user_pool_arn")?;

        let output = self
            .apigateway
            .create_rest_api()
            .name(name)
            .description(format!("API for {}", self.settings.project_name))
            .endpoint_configuration(
                EndpointConfiguration::builder()
                    .types(EndpointType::Regional)
                    .build(),
            )
            .minimum_compression_size(1024)
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        let api_id = output
            .id()
            .ok_or_else(|| missing_field(RESOURCE, "RestApi.Id"))?
            .to_string();
        tracing::info!("Created REST API {} ({})", name, api_id);

        let authorizer = self
            .apigateway
            .create_authorizer()
            .rest_api_id(&api_id)
            .name("CognitoAuthorizer")
            .r#type(AuthorizerType::CognitoUserPools)
            .provider_arns(user_pool_arn)
            .identity_source("method.request.header.Authorization")
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;
        let authorizer_id = authorizer
            .id()
            .ok_or_else(|| missing_field(RESOURCE, "Authorizer.Id"))?;

        let root = self.root_resource(&api_id).await?;
        let files = self.create_resource(&api_id, &root, "files").await?;
        let generate = self.create_resource(&api_id, &files, "generate").await?;
        let file = self.create_resource(&api_id, &files, "{filename}").await?;

        let routes = [
            (
                &files,
                Route {
                    method: "GET",
                    function_input: "list_arn",
                },
            ),
            (
                &generate,
                Route {
                    method: "POST",
                    function_input: "generate_arn",
                },
            ),
            (
                &file,
                Route {
                    method: "DELETE",
                    function_input: "delete_arn",
                },
            ),
        ];
        for (resource_id, route) in &routes {
            self.add_route(&api_id, resource_id, authorizer_id, route, inputs)
                .await?;
        }

        self.apigateway
            .create_deployment()
            .rest_api_id(&api_id)
            .stage_name(STAGE)
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;
        tracing::info!("Deployed {} to stage {}", api_id, STAGE);

        Ok(api_id)
    }
}

#[async_trait]
impl ResourceProvider for GatewayProvider {
    fn name(&self) -> &str {
        "apigateway-rest-api"
    }

    async fn ensure(&self, inputs: &StepInputs) -> Result<ResourceDescriptor> {
        let name = self.settings.resource_name("api");

        let api_id = match self.find_api(&name).await? {
            Some(api_id) => {
                tracing::info!("Reusing REST API {} ({})", name, api_id);
                api_id
            }
            None => self.create_api(&name, inputs).await?,
        };

        Ok(self.descriptor(&api_id))
    }

    async fn teardown(&self, descriptor: &ResourceDescriptor) -> Result<()> {
        let api_id = descriptor.require(RESOURCE, "api_id")?;

        match self
            .apigateway
            .delete_rest_api()
            .rest_api_id(api_id)
            .send()
            .await
        {
            Ok(_) => tracing::info!("Deleted REST API {}", api_id),
            Err(e) if has_code(&e, NOT_FOUND) => {}
            Err(e) => return Err(provider_error(RESOURCE, e)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FUNCTION_ARN: &str = "arn:aws:lambda:us-east-1:123456789012:function:demo-file-list";

    #[test]
    fn test_integration_uri_wraps_function_arn() {
        assert_eq!(
            integration_uri("us-east-1", FUNCTION_ARN),
            "arn:aws:apigateway:us-east-1:lambda:path/2015-03-31/functions/\
             arn:aws:lambda:us-east-1:123456789012:function:demo-file-list/invocations"
        );
    }

    #[test]
    fn test_account_from_arn() {
        assert_eq!(account_from_arn(FUNCTION_ARN), Some("123456789012"));
        assert_eq!(account_from_arn("demo-file-list"), None);
        assert_eq!(account_from_arn("arn:aws:lambda:us-east-1::function:x"), None);
    }

    #[test]
    fn test_api_domain() {
        assert_eq!(
            api_domain("a1b2c3", "sa-east-1"),
            "a1b2c3.execute-api.sa-east-1.amazonaws.com"
        );
    }
}
