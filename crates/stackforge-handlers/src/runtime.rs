//! Lambda runtime API client for the custom `provided.al2023` runtime

use crate::dispatch::HandlerKind;
use crate::error::{HandlerError, Result};
use crate::files::FileHandlers;
use crate::response::Response;
use serde_json::{Value, json};

const API_VERSION: &str = "2018-06-01";
const REQUEST_ID_HEADER: &str = "Lambda-Runtime-Aws-Request-Id";

/// Environment the deployed functions receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerEnv {
    pub redis_host: String,
    pub data_bucket: String,
    pub topic_arn: String,
    pub function_name: String,
    pub runtime_api: String,
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| HandlerError::MissingEnv(name.to_string()))
}

impl HandlerEnv {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            redis_host: require_env("REDIS_HOST")?,
            data_bucket: require_env("DATA_BUCKET_NAME")?,
            topic_arn: require_env("SNS_TOPIC_ARN")?,
            function_name: require_env("AWS_LAMBDA_FUNCTION_NAME")?,
            runtime_api: require_env("AWS_LAMBDA_RUNTIME_API")?,
        })
    }
}

#[derive(Debug)]
pub struct Invocation {
    pub request_id: String,
    pub payload: Value,
}

pub struct RuntimeClient {
    client: reqwest::Client,
    base_url: String,
}

impl RuntimeClient {
    pub fn new(runtime_api: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://{}/{}/runtime", runtime_api, API_VERSION),
        }
    }

    pub fn next_url(&self) -> String {
        format!("{}/invocation/next", self.base_url)
    }

    pub fn response_url(&self, request_id: &str) -> String {
        format!("{}/invocation/{}/response", self.base_url, request_id)
    }

    pub fn error_url(&self, request_id: &str) -> String {
        format!("{}/invocation/{}/error", self.base_url, request_id)
    }

    /// Blocks until the next event arrives
    pub async fn next_invocation(&self) -> Result<Invocation> {
        let response = self
            .client
            .get(self.next_url())
            .send()
            .await?
            .error_for_status()?;

        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| HandlerError::Runtime(format!("missing {} header", REQUEST_ID_HEADER)))?;
        let payload = response.json().await?;

        Ok(Invocation {
            request_id,
            payload,
        })
    }

    pub async fn send_response(&self, request_id: &str, response: &Response) -> Result<()> {
        self.client
            .post(self.response_url(request_id))
            .json(response)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn send_error(&self, request_id: &str, message: &str) -> Result<()> {
        self.client
            .post(self.error_url(request_id))
            .json(&json!({
                "errorMessage": message,
                "errorType": "HandlerError",
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Serve invocations until the runtime API itself fails
    pub async fn run(&self, handlers: &FileHandlers, kind: HandlerKind) -> Result<()> {
        tracing::info!("Serving {} invocations", kind.suffix());
        loop {
            let invocation = self.next_invocation().await?;
            tracing::debug!("Invocation {}", invocation.request_id);

            let response = handlers.handle(kind, invocation.payload).await;
            if let Err(e) = self.send_response(&invocation.request_id, &response).await {
                tracing::error!("Failed to post response: {}", e);
                self.send_error(&invocation.request_id, &e.to_string())
                    .await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_handler_env_requires_every_variable() {
        let vars = [
            ("REDIS_HOST", Some("demo-redis.cache.amazonaws.com")),
            ("DATA_BUCKET_NAME", Some("demo-data")),
            ("SNS_TOPIC_ARN", Some("arn:aws:sns:us-east-1:123456789012:demo-notifications")),
            ("AWS_LAMBDA_FUNCTION_NAME", Some("demo-file-list")),
            ("AWS_LAMBDA_RUNTIME_API", Some("127.0.0.1:9001")),
        ];
        temp_env::with_vars(vars, || {
            let env = HandlerEnv::from_env().unwrap();
            assert_eq!(env.data_bucket, "demo-data");
            assert_eq!(env.function_name, "demo-file-list");

            temp_env::with_var_unset("SNS_TOPIC_ARN", || {
                let err = HandlerEnv::from_env().unwrap_err();
                assert!(matches!(err, HandlerError::MissingEnv(name) if name == "SNS_TOPIC_ARN"));
            });
        });
    }

    #[test]
    fn test_runtime_urls() {
        let client = RuntimeClient::new("127.0.0.1:9001");

        assert_eq!(
            client.next_url(),
            "http://127.0.0.1:9001/2018-06-01/runtime/invocation/next"
        );
        assert_eq!(
            client.response_url("abc"),
            "http://127.0.0.1:9001/2018-06-01/runtime/invocation/abc/response"
        );
        assert_eq!(
            client.error_url("abc"),
            "http://127.0.0.1:9001/2018-06-01/runtime/invocation/abc/error"
        );
    }
}
