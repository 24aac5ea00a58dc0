//! CloudFront distribution serving the frontend and proxying `/api/*`

use crate::error::{has_code, missing_field, provider_error};
use async_trait::async_trait;
use aws_sdk_cloudfront::Client;
use aws_sdk_cloudfront::error::BuildError;
use aws_sdk_cloudfront::types::{
    AllowedMethods, CacheBehavior, CacheBehaviors, CachedMethods, CustomOriginConfig,
    DefaultCacheBehavior, DistributionConfig, Method, Origin, OriginProtocolPolicy, Origins,
    PriceClass, S3OriginConfig, ViewerProtocolPolicy,
};
use stackforge_cloud::{ProjectSettings, ResourceDescriptor, ResourceProvider, Result, StepInputs};

const RESOURCE: &str = "edge-cache";
const NOT_FOUND: &[&str] = &["NoSuchDistribution"];

const S3_ORIGIN: &str = "s3-origin";
const API_ORIGIN: &str = "api-origin";

// AWS managed cache and origin request policies
const CACHING_OPTIMIZED: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";
const CACHING_DISABLED: &str = "4135ea2d-6df8-44a3-9df3-4b5a84be39ad";
const ALL_VIEWER_EXCEPT_HOST_HEADER: &str = "b689b0a8-53d0-40ab-baf2-68738e2966ac";

pub fn distribution_comment(project_name: &str) -> String {
    format!("Distribution for {}", project_name)
}

fn methods(names: &[&str]) -> Vec<Method> {
    names.iter().map(|name| Method::from(*name)).collect()
}

fn allowed_methods(names: &[&str]) -> std::result::Result<AllowedMethods, BuildError> {
    let cached = methods(&["GET", "HEAD"]);
    AllowedMethods::builder()
        .quantity(names.len() as i32)
        .set_items(Some(methods(names)))
        .cached_methods(
            CachedMethods::builder()
                .quantity(cached.len() as i32)
                .set_items(Some(cached))
                .build()?,
        )
        .build()
}

/// Distribution with the frontend bucket as default origin and the API behind `/api/*`
pub fn distribution_config(
    project_name: &str,
    caller_reference: &str,
    frontend_domain: &str,
    api_domain: &str,
) -> std::result::Result<DistributionConfig, BuildError> {
    let s3_origin = Origin::builder()
        .id(S3_ORIGIN)
        .domain_name(frontend_domain)
        .s3_origin_config(S3OriginConfig::builder().origin_access_identity("").build()?)
        .build()?;

    let api_origin = Origin::builder()
        .id(API_ORIGIN)
        .domain_name(api_domain)
        .origin_path("/prod")
        .custom_origin_config(
            CustomOriginConfig::builder()
                .http_port(80)
                .https_port(443)
                .origin_protocol_policy(OriginProtocolPolicy::from("https-only"))
                .build()?,
        )
        .build()?;

    let default_behavior = DefaultCacheBehavior::builder()
        .target_origin_id(S3_ORIGIN)
        .viewer_protocol_policy(ViewerProtocolPolicy::from("redirect-to-https"))
        .allowed_methods(allowed_methods(&["GET", "HEAD"])?)
        .cache_policy_id(CACHING_OPTIMIZED)
        .build()?;

    let api_behavior = CacheBehavior::builder()
        .path_pattern("/api/*")
        .target_origin_id(API_ORIGIN)
        .viewer_protocol_policy(ViewerProtocolPolicy::from("https-only"))
        .allowed_methods(allowed_methods(&[
            "GET", "HEAD", "POST", "PUT", "PATCH", "OPTIONS", "DELETE",
        ])?)
        .cache_policy_id(CACHING_DISABLED)
        .origin_request_policy_id(ALL_VIEWER_EXCEPT_HOST_HEADER)
        .build()?;

    DistributionConfig::builder()
        .caller_reference(caller_reference)
        .origins(
            Origins::builder()
                .quantity(2)
                .items(s3_origin)
                .items(api_origin)
                .build()?,
        )
        .default_cache_behavior(default_behavior)
        .cache_behaviors(
            CacheBehaviors::builder()
                .quantity(1)
                .items(api_behavior)
                .build()?,
        )
        .enabled(true)
        .comment(distribution_comment(project_name))
        .price_class(PriceClass::from("PriceClass_100"))
        .build()
}

/// Distribution identified by its comment `Distribution for {project}`
pub struct EdgeProvider {
    client: Client,
    settings: ProjectSettings,
    region: String,
}

impl EdgeProvider {
    pub fn new(client: Client, settings: ProjectSettings, region: impl Into<String>) -> Self {
        Self {
            client,
            settings,
            region: region.into(),
        }
    }

    async fn find_distribution(&self) -> Result<Option<(String, String)>> {
        let comment = distribution_comment(&self.settings.project_name);
        let output = self
            .client
            .list_distributions()
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        Ok(output
            .distribution_list()
            .map(|list| list.items())
            .unwrap_or_default()
            .iter()
            .find(|summary| summary.comment() == comment)
            .map(|summary| (summary.id().to_string(), summary.domain_name().to_string())))
    }

    /// Distribution status, or None once it no longer exists
    async fn status(&self, id: &str) -> Result<Option<(String, Option<String>)>> {
        match self.client.get_distribution().id(id).send().await {
            Ok(output) => Ok(output.distribution().map(|d| {
                (d.status().to_string(), output.e_tag().map(str::to_string))
            })),
            Err(e) if has_code(&e, NOT_FOUND) => Ok(None),
            Err(e) => Err(provider_error(RESOURCE, e)),
        }
    }

    /// Disable the distribution if needed and wait until the change is deployed
    async fn disable(&self, id: &str) -> Result<bool> {
        let output = match self.client.get_distribution_config().id(id).send().await {
            Ok(output) => output,
            Err(e) if has_code(&e, NOT_FOUND) => return Ok(false),
            Err(e) => return Err(provider_error(RESOURCE, e)),
        };

        let mut config = output
            .distribution_config()
            .cloned()
            .ok_or_else(|| missing_field(RESOURCE, "DistributionConfig"))?;

        if config.enabled {
            let etag = output
                .e_tag()
                .ok_or_else(|| missing_field(RESOURCE, "ETag"))?;
            config.enabled = false;

            self.client
                .update_distribution()
                .id(id)
                .if_match(etag)
                .distribution_config(config)
                .send()
                .await
                .map_err(|e| provider_error(RESOURCE, e))?;
            tracing::info!("Disabled distribution {}", id);
        }

        let what = format!("distribution {} to deploy", id);
        self.settings
            .wait
            .wait_for(&what, || async move {
                Ok(match self.status(id).await? {
                    Some((status, _)) if status == "Deployed" => Some(()),
                    Some(_) => None,
                    None => Some(()),
                })
            })
            .await?;

        Ok(true)
    }
}

#[async_trait]
impl ResourceProvider for EdgeProvider {
    fn name(&self) -> &str {
        "cloudfront-distribution"
    }

    async fn ensure(&self, inputs: &StepInputs) -> Result<ResourceDescriptor> {
        if let Some((id, domain_name)) = self.find_distribution().await? {
            tracing::info!("Reusing distribution {} ({})", id, domain_name);
            return Ok(ResourceDescriptor::new()
                .with_attribute("distribution_id", id)
                .with_attribute("domain_name", domain_name));
        }

        let frontend_bucket = inputs.require("frontend_bucket")?;
        let api_domain = inputs.require("api_domain")?;
        let frontend_domain = crate::bucket::regional_domain(frontend_bucket, &self.region);
        let caller_reference = format!(
            "{}-{}",
            self.settings.project_name,
            chrono::Utc::now().timestamp()
        );

        let config = distribution_config(
            &self.settings.project_name,
            &caller_reference,
            &frontend_domain,
            api_domain,
        )
        .map_err(|e| provider_error(RESOURCE, e))?;

        let output = self
            .client
            .create_distribution()
            .distribution_config(config)
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        let distribution = output
            .distribution()
            .ok_or_else(|| missing_field(RESOURCE, "Distribution"))?;
        tracing::info!(
            "Created distribution {} ({})",
            distribution.id(),
            distribution.domain_name()
        );

        Ok(ResourceDescriptor::new()
            .with_attribute("distribution_id", distribution.id())
            .with_attribute("domain_name", distribution.domain_name()))
    }

    async fn teardown(&self, descriptor: &ResourceDescriptor) -> Result<()> {
        let id = descriptor.require(RESOURCE, "distribution_id")?;

        if !self.disable(id).await? {
            tracing::info!("Distribution {} already gone", id);
            return Ok(());
        }

        let Some((_, Some(etag))) = self.status(id).await? else {
            return Ok(());
        };

        match self
            .client
            .delete_distribution()
            .id(id)
            .if_match(etag)
            .send()
            .await
        {
            Ok(_) => tracing::info!("Deleted distribution {}", id),
            Err(e) if has_code(&e, NOT_FOUND) => {}
            Err(e) => return Err(provider_error(RESOURCE, e)),
        }
        Ok(())
    }
}
