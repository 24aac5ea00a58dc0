//! Lambda request-handler functions and the data-bucket trigger

use crate::error::{has_code, message, missing_field, provider_error};
use async_trait::async_trait;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{Environment, FunctionCode, Runtime, State};
use aws_sdk_s3::types::{Event, LambdaFunctionConfiguration, NotificationConfiguration};
use stackforge_cloud::{
    CloudError, ProjectSettings, ResourceDescriptor, ResourceProvider, Result, StepInputs,
};
use std::path::PathBuf;

const RESOURCE: &str = "compute-functions";
const NOT_FOUND: &[&str] = &["ResourceNotFoundException"];
const CONFLICT: &[&str] = &["ResourceConflictException"];

/// One deployed request handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerFunction {
    /// Prefix of the `<key>_arn` descriptor attribute
    pub key: &'static str,
    /// Function name after the project prefix, also the artifact file stem
    pub suffix: &'static str,
}

impl HandlerFunction {
    pub fn function_name(&self, settings: &ProjectSettings) -> String {
        settings.resource_name(self.suffix)
    }

    pub fn arn_attribute(&self) -> String {
        format!("{}_arn", self.key)
    }

    pub fn artifact(&self, settings: &ProjectSettings) -> PathBuf {
        settings.artifacts_dir.join(format!("{}.zip", self.suffix))
    }
}

pub const FUNCTIONS: [HandlerFunction; 4] = [
    HandlerFunction {
        key: "list",
        suffix: "file-list",
    },
    HandlerFunction {
        key: "generate",
        suffix: "file-generate",
    },
    HandlerFunction {
        key: "delete",
        suffix: "file-delete",
    },
    HandlerFunction {
        key: "process",
        suffix: "file-process",
    },
];

/// Read a deployment package from the artifacts directory
pub async fn read_artifact(function: &HandlerFunction, settings: &ProjectSettings) -> Result<Blob> {
    let path = function.artifact(settings);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        CloudError::provider(RESOURCE, format!("cannot read {}: {}", path.display(), e))
    })?;
    Ok(Blob::new(bytes))
}

/// Environment shared by every handler
fn environment(inputs: &StepInputs) -> Result<Environment> {
    Ok(Environment::builder()
        .variables("REDIS_HOST", inputs.require("cache_endpoint")?)
        .variables("DATA_BUCKET_NAME", inputs.require("data_bucket")?)
        .variables("SNS_TOPIC_ARN", inputs.require("topic_arn")?)
        .build())
}

/// Functions `{project}-file-{list,generate,delete,process}`
pub struct FunctionsProvider {
    lambda: aws_sdk_lambda::Client,
    s3: aws_sdk_s3::Client,
    settings: ProjectSettings,
}

impl FunctionsProvider {
    pub fn new(
        lambda: aws_sdk_lambda::Client,
        s3: aws_sdk_s3::Client,
        settings: ProjectSettings,
    ) -> Self {
        Self {
            lambda,
            s3,
            settings,
        }
    }

    async fn find_function(&self, name: &str) -> Result<Option<String>> {
        match self.lambda.get_function().function_name(name).send().await {
            Ok(output) => Ok(output
                .configuration()
                .and_then(|config| config.function_arn())
                .map(str::to_string)),
            Err(e) if has_code(&e, NOT_FOUND) => Ok(None),
            Err(e) => Err(provider_error(RESOURCE, e)),
        }
    }

    async fn create_function(
        &self,
        function: &HandlerFunction,
        role_arn: &str,
        environment: &Environment,
    ) -> Result<String> {
        let name = function.function_name(&self.settings);
        let code = read_artifact(function, &self.settings).await?;
        let config = &self.settings.functions;
        let what = format!("function {}", name);
        let name = name.as_str();
        let code = &code;

        // a freshly created role is rejected until IAM has propagated it
        self.settings
            .wait
            .wait_for(&what, || async move {
                let result = self
                    .lambda
                    .create_function()
                    .function_name(name)
                    .runtime(Runtime::from(config.runtime.as_str()))
                    .role(role_arn)
                    .handler(&config.handler)
                    .code(FunctionCode::builder().zip_file(code.clone()).build())
                    .timeout(config.timeout_secs)
                    .memory_size(config.memory_mb)
                    .environment(environment.clone())
                    .tags("Project", &self.settings.project_name)
                    .send()
                    .await;

                match result {
                    Ok(output) => {
                        let arn = output
                            .function_arn()
                            .ok_or_else(|| missing_field(RESOURCE, "FunctionArn"))?;
                        tracing::info!("Created function {}", name);
                        Ok(Some(arn.to_string()))
                    }
                    Err(e) if has_code(&e, CONFLICT) => self.find_function(name).await,
                    Err(e)
                        if has_code(&e, &["InvalidParameterValueException"])
                            && message(&e).contains("role") =>
                    {
                        tracing::debug!("{}: {}", name, message(&e));
                        Ok(None)
                    }
                    Err(e) => Err(provider_error(RESOURCE, e)),
                }
            })
            .await
    }

    async fn wait_active(&self, name: &str) -> Result<()> {
        let what = format!("function {} to become active", name);
        self.settings
            .wait
            .wait_for(&what, || async move {
                let output = self
                    .lambda
                    .get_function_configuration()
                    .function_name(name)
                    .send()
                    .await
                    .map_err(|e| provider_error(RESOURCE, e))?;

                match output.state() {
                    Some(State::Active) => Ok(Some(())),
                    Some(State::Failed) => Err(CloudError::provider(
                        RESOURCE,
                        format!(
                            "function {} failed: {}",
                            name,
                            output.state_reason().unwrap_or("no reason given")
                        ),
                    )),
                    _ => Ok(None),
                }
            })
            .await
    }

    /// Invoke the process function for every object created in the data bucket
    async fn wire_bucket_trigger(&self, bucket: &str, process_arn: &str) -> Result<()> {
        match self
            .lambda
            .add_permission()
            .function_name(process_arn)
            .statement_id("s3-object-created")
            .action("lambda:InvokeFunction")
            .principal("s3.amazonaws.com")
            .source_arn(format!("arn:aws:s3:::{}", bucket))
            .send()
            .await
        {
            Ok(_) => {}
            Err(e) if has_code(&e, CONFLICT) => {}
            Err(e) => return Err(provider_error(RESOURCE, e)),
        }

        let trigger = LambdaFunctionConfiguration::builder()
            .lambda_function_arn(process_arn)
            .events(Event::from("s3:ObjectCreated:*"))
            .build()
            .map_err(|e| provider_error(RESOURCE, e))?;

        self.s3
            .put_bucket_notification_configuration()
            .bucket(bucket)
            .notification_configuration(
                NotificationConfiguration::builder()
                    .lambda_function_configurations(trigger)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        tracing::info!("Wired {} object-created events to {}", bucket, process_arn);
        Ok(())
    }
}

#[async_trait]
impl ResourceProvider for FunctionsProvider {
    fn name(&self) -> &str {
        "lambda-functions"
    }

    async fn ensure(&self, inputs: &StepInputs) -> Result<ResourceDescriptor> {
        let role_arn = inputs.require("role_arn")?;
        let data_bucket = inputs.require("data_bucket")?;
        let environment = environment(inputs)?;

        let mut descriptor = ResourceDescriptor::new();
        for function in &FUNCTIONS {
            let name = function.function_name(&self.settings);
            let arn = match self.find_function(&name).await? {
                Some(arn) => {
                    tracing::info!("Reusing function {}", name);
                    arn
                }
                None => {
                    self.create_function(function, role_arn, &environment)
                        .await?
                }
            };
            self.wait_active(&name).await?;
            descriptor = descriptor.with_attribute(function.arn_attribute(), arn);
        }

        let process_arn = descriptor.require(RESOURCE, "process_arn")?.to_string();
        self.wire_bucket_trigger(data_bucket, &process_arn).await?;

        Ok(descriptor)
    }

    async fn teardown(&self, descriptor: &ResourceDescriptor) -> Result<()> {
        for function in &FUNCTIONS {
            let name = match descriptor.get(&function.arn_attribute()) {
                Some(arn) => arn.to_string(),
                None => function.function_name(&self.settings),
            };

            match self.lambda.delete_function().function_name(&name).send().await {
                Ok(_) => tracing::info!("Deleted function {}", name),
                Err(e) if has_code(&e, NOT_FOUND) => {}
                Err(e) => return Err(provider_error(RESOURCE, e)),
            }
        }
        Ok(())
    }
}
