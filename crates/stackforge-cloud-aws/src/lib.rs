//! AWS providers for StackForge
//!
//! One [`ResourceProvider`](stackforge_cloud::ResourceProvider) per
//! provisioning step, all built from a single shared SDK configuration:
//!
//! | Step | Provider | Service |
//! |------|----------|---------|
//! | network | [`NetworkProvider`] | EC2 |
//! | frontend-bucket, data-bucket | [`BucketProvider`] | S3 |
//! | cache | [`CacheProvider`] | ElastiCache + EC2 |
//! | messaging-topic | [`TopicProvider`] | SNS |
//! | messaging-queue | [`QueueProvider`] | SQS + SNS |
//! | identity | [`IdentityProvider`] | Cognito |
//! | compute-role | [`RoleProvider`] | IAM |
//! | compute-functions | [`FunctionsProvider`] | Lambda + S3 |
//! | api-gateway | [`GatewayProvider`] | API Gateway + Lambda |
//! | edge-cache | [`EdgeProvider`] | CloudFront |

pub mod bucket;
pub mod cache;
pub mod deploy;
pub mod edge;
mod error;
pub mod functions;
pub mod gateway;
pub mod identity;
pub mod network;
pub mod queue;
pub mod role;
pub mod topic;

pub use bucket::{BucketKind, BucketProvider};
pub use cache::CacheProvider;
pub use deploy::{ArtifactDeployer, DeployReport};
pub use edge::EdgeProvider;
pub use functions::FunctionsProvider;
pub use gateway::GatewayProvider;
pub use identity::IdentityProvider;
pub use network::NetworkProvider;
pub use queue::QueueProvider;
pub use role::RoleProvider;
pub use topic::TopicProvider;

use aws_config::{BehaviorVersion, SdkConfig};
use stackforge_cloud::{ProjectSettings, ProviderSet};

const DEFAULT_REGION: &str = "us-east-1";

/// Load credentials and region from the standard AWS chain
///
/// An explicit `region` takes precedence over the environment and profile.
pub async fn load_sdk_config(region: Option<String>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region));
    }
    loader.load().await
}

/// Region the clients will talk to
pub fn region_of(sdk: &SdkConfig) -> String {
    sdk.region()
        .map(|region| region.as_ref().to_string())
        .unwrap_or_else(|| DEFAULT_REGION.to_string())
}

/// Build the provider for every step from one SDK configuration
pub fn providers(sdk: &SdkConfig, settings: &ProjectSettings) -> ProviderSet {
    let region = region_of(sdk);
    let ec2 = aws_sdk_ec2::Client::new(sdk);
    let s3 = aws_sdk_s3::Client::new(sdk);
    let sns = aws_sdk_sns::Client::new(sdk);
    let lambda = aws_sdk_lambda::Client::new(sdk);

    ProviderSet {
        network: Box::new(NetworkProvider::new(ec2.clone(), settings.clone())),
        frontend_bucket: Box::new(BucketProvider::new(
            s3.clone(),
            settings.clone(),
            &region,
            BucketKind::Frontend,
        )),
        data_bucket: Box::new(BucketProvider::new(
            s3.clone(),
            settings.clone(),
            &region,
            BucketKind::Data,
        )),
        cache: Box::new(CacheProvider::new(
            aws_sdk_elasticache::Client::new(sdk),
            ec2,
            settings.clone(),
        )),
        messaging_topic: Box::new(TopicProvider::new(sns.clone(), settings.clone())),
        messaging_queue: Box::new(QueueProvider::new(
            aws_sdk_sqs::Client::new(sdk),
            sns,
            settings.clone(),
        )),
        identity: Box::new(IdentityProvider::new(
            aws_sdk_cognitoidentityprovider::Client::new(sdk),
            settings.clone(),
        )),
        compute_role: Box::new(RoleProvider::new(
            aws_sdk_iam::Client::new(sdk),
            settings.clone(),
        )),
        compute_functions: Box::new(FunctionsProvider::new(
            lambda.clone(),
            s3,
            settings.clone(),
        )),
        api_gateway: Box::new(GatewayProvider::new(
            aws_sdk_apigateway::Client::new(sdk),
            lambda,
            settings.clone(),
            &region,
        )),
        edge_cache: Box::new(EdgeProvider::new(
            aws_sdk_cloudfront::Client::new(sdk),
            settings.clone(),
            &region,
        )),
    }
}

/// Deployer sharing the SDK configuration used for provisioning
pub fn deployer(sdk: &SdkConfig, settings: &ProjectSettings) -> ArtifactDeployer {
    ArtifactDeployer::new(
        aws_sdk_s3::Client::new(sdk),
        aws_sdk_lambda::Client::new(sdk),
        settings.clone(),
    )
}
