//! S3 buckets for the frontend site and for data objects

use crate::error::{has_code, provider_error};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration, Delete,
    ErrorDocument, IndexDocument, ObjectIdentifier, PublicAccessBlockConfiguration,
    VersioningConfiguration, WebsiteConfiguration,
};
use stackforge_cloud::{
    CloudError, ProjectSettings, ResourceDescriptor, ResourceProvider, Result, StepInputs,
};
use std::time::Duration;

const NOT_FOUND: &[&str] = &["NoSuchBucket", "NotFound"];
const ALREADY_EXISTS: &[&str] = &["BucketAlreadyOwnedByYou"];

/// Which of the two project buckets a provider manages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    /// Public static website, origin of the edge cache
    Frontend,
    /// Versioned storage for generated files
    Data,
}

impl BucketKind {
    fn suffix(&self) -> &'static str {
        match self {
            BucketKind::Frontend => "frontend",
            BucketKind::Data => "data",
        }
    }

    fn resource(&self) -> &'static str {
        match self {
            BucketKind::Frontend => "frontend-bucket",
            BucketKind::Data => "data-bucket",
        }
    }
}

/// Bucket policy granting anonymous read on every object
pub fn public_read_policy(bucket: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "PublicReadGetObject",
            "Effect": "Allow",
            "Principal": "*",
            "Action": "s3:GetObject",
            "Resource": format!("arn:aws:s3:::{}/*", bucket),
        }]
    })
    .to_string()
}

pub fn regional_domain(bucket: &str, region: &str) -> String {
    format!("{}.s3.{}.amazonaws.com", bucket, region)
}

pub fn website_endpoint(bucket: &str, region: &str) -> String {
    format!("http://{}.s3-website-{}.amazonaws.com", bucket, region)
}

pub struct BucketProvider {
    client: Client,
    settings: ProjectSettings,
    region: String,
    kind: BucketKind,
}

impl BucketProvider {
    pub fn new(
        client: Client,
        settings: ProjectSettings,
        region: impl Into<String>,
        kind: BucketKind,
    ) -> Self {
        Self {
            client,
            settings,
            region: region.into(),
            kind,
        }
    }

    fn bucket_name(&self) -> String {
        self.settings.resource_name(self.kind.suffix())
    }

    fn descriptor(&self, bucket: &str) -> ResourceDescriptor {
        let descriptor = ResourceDescriptor::new()
            .with_attribute("bucket", bucket)
            .with_attribute("regional_domain", regional_domain(bucket, &self.region));

        match self.kind {
            BucketKind::Frontend => descriptor
                .with_attribute("website_endpoint", website_endpoint(bucket, &self.region)),
            BucketKind::Data => descriptor,
        }
    }

    async fn exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error().is_some_and(|se| se.is_not_found())
                    || has_code(&e, NOT_FOUND) =>
            {
                Ok(false)
            }
            Err(e) => Err(provider_error(self.kind.resource(), e)),
        }
    }

    async fn create(&self, bucket: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => tracing::info!("Created bucket {}", bucket),
            Err(e) if has_code(&e, ALREADY_EXISTS) => {
                tracing::info!("Bucket {} already exists", bucket)
            }
            Err(e) => return Err(provider_error(self.kind.resource(), e)),
        }
        Ok(())
    }

    async fn configure_website(&self, bucket: &str) -> Result<()> {
        let resource = self.kind.resource();

        self.client
            .put_public_access_block()
            .bucket(bucket)
            .public_access_block_configuration(
                PublicAccessBlockConfiguration::builder()
                    .block_public_acls(false)
                    .ignore_public_acls(false)
                    .block_public_policy(false)
                    .restrict_public_buckets(false)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| provider_error(resource, e))?;

        // the public access block change must propagate before a public policy is accepted
        tokio::time::sleep(Duration::from_secs(5)).await;

        let website = WebsiteConfiguration::builder()
            .index_document(
                IndexDocument::builder()
                    .suffix("index.html")
                    .build()
                    .map_err(|e| provider_error(resource, e))?,
            )
            .error_document(
                ErrorDocument::builder()
                    .key("index.html")
                    .build()
                    .map_err(|e| provider_error(resource, e))?,
            )
            .build();

        self.client
            .put_bucket_website()
            .bucket(bucket)
            .website_configuration(website)
            .send()
            .await
            .map_err(|e| provider_error(resource, e))?;

        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(public_read_policy(bucket))
            .send()
            .await
            .map_err(|e| provider_error(resource, e))?;

        tracing::info!("Configured {} as a public website", bucket);
        Ok(())
    }

    async fn enable_versioning(&self, bucket: &str) -> Result<()> {
        self.client
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(
                VersioningConfiguration::builder()
                    .status(BucketVersioningStatus::Enabled)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| provider_error(self.kind.resource(), e))?;

        tracing::info!("Enabled versioning on {}", bucket);
        Ok(())
    }

    /// Delete every object version and delete marker. Returns false if the bucket is gone.
    async fn empty(&self, bucket: &str) -> Result<bool> {
        let resource = self.kind.resource();

        loop {
            let listing = match self.client.list_object_versions().bucket(bucket).send().await {
                Ok(listing) => listing,
                Err(e) if has_code(&e, NOT_FOUND) => return Ok(false),
                Err(e) => return Err(provider_error(resource, e)),
            };

            let versions = listing
                .versions()
                .iter()
                .map(|v| (v.key(), v.version_id()));
            let markers = listing
                .delete_markers()
                .iter()
                .map(|m| (m.key(), m.version_id()));

            let mut objects = Vec::new();
            for (key, version_id) in versions.chain(markers) {
                let Some(key) = key else { continue };
                let identifier = ObjectIdentifier::builder()
                    .key(key)
                    .set_version_id(version_id.map(str::to_string))
                    .build()
                    .map_err(|e| provider_error(resource, e))?;
                objects.push(identifier);
            }

            if objects.is_empty() {
                return Ok(true);
            }

            let count = objects.len();
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| provider_error(resource, e))?;

            let output = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| provider_error(resource, e))?;

            // a key that keeps failing would otherwise be listed again forever
            if let Some(failed) = output.errors().first() {
                return Err(CloudError::provider(
                    resource,
                    format!(
                        "cannot delete {} from {}: {} ({} of {} keys failed)",
                        failed.key().unwrap_or("<unknown key>"),
                        bucket,
                        failed.code().unwrap_or("unknown error"),
                        output.errors().len(),
                        count
                    ),
                ));
            }

            tracing::debug!("Deleted {} object versions from {}", count, bucket);
        }
    }
}

#[async_trait]
impl ResourceProvider for BucketProvider {
    fn name(&self) -> &str {
        match self.kind {
            BucketKind::Frontend => "s3-frontend-bucket",
            BucketKind::Data => "s3-data-bucket",
        }
    }

    async fn ensure(&self, _inputs: &StepInputs) -> Result<ResourceDescriptor> {
        let bucket = self.bucket_name();

        if self.exists(&bucket).await? {
            tracing::info!("Reusing bucket {}", bucket);
            return Ok(self.descriptor(&bucket));
        }

        self.create(&bucket).await?;
        match self.kind {
            BucketKind::Frontend => self.configure_website(&bucket).await?,
            BucketKind::Data => self.enable_versioning(&bucket).await?,
        }

        Ok(self.descriptor(&bucket))
    }

    async fn teardown(&self, descriptor: &ResourceDescriptor) -> Result<()> {
        let bucket = descriptor.require(self.kind.resource(), "bucket")?;

        if !self.empty(bucket).await? {
            tracing::info!("Bucket {} already gone", bucket);
            return Ok(());
        }

        match self.client.delete_bucket().bucket(bucket).send().await {
            Ok(_) => tracing::info!("Deleted bucket {}", bucket),
            Err(e) if has_code(&e, NOT_FOUND) => {}
            Err(e) => return Err(provider_error(self.kind.resource(), e)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_code;
    use aws_sdk_s3::operation::create_bucket::CreateBucketOutput;
    use aws_sdk_s3::operation::delete_bucket::DeleteBucketOutput;
    use aws_sdk_s3::operation::delete_objects::DeleteObjectsOutput;
    use aws_sdk_s3::operation::head_bucket::HeadBucketOutput;
    use aws_sdk_s3::operation::list_object_versions::{
        ListObjectVersionsError, ListObjectVersionsOutput,
    };
    use aws_sdk_s3::types::{Error as KeyError, ObjectVersion};
    use aws_smithy_mocks::{RuleMode, mock, mock_client};
    use stackforge_cloud::StepName;

    fn data_bucket(client: Client) -> BucketProvider {
        BucketProvider::new(
            client,
            ProjectSettings::new("demo"),
            "us-east-1",
            BucketKind::Data,
        )
    }

    fn recorded(bucket: &str) -> ResourceDescriptor {
        ResourceDescriptor::new().with_attribute("bucket", bucket)
    }

    #[test]
    fn test_public_read_policy_scopes_to_bucket_objects() {
        let policy: serde_json::Value =
            serde_json::from_str(&public_read_policy("demo-frontend")).unwrap();
        let statement = &policy["Statement"][0];

        assert_eq!(statement["Effect"], "Allow");
        assert_eq!(statement["Principal"], "*");
        assert_eq!(statement["Action"], "s3:GetObject");
        assert_eq!(statement["Resource"], "arn:aws:s3:::demo-frontend/*");
    }

    #[test]
    fn test_bucket_endpoints() {
        assert_eq!(
            regional_domain("demo-data", "sa-east-1"),
            "demo-data.s3.sa-east-1.amazonaws.com"
        );
        assert_eq!(
            website_endpoint("demo-frontend", "us-east-1"),
            "http://demo-frontend.s3-website-us-east-1.amazonaws.com"
        );
    }

    #[test]
    fn test_bucket_kind_names() {
        assert_eq!(BucketKind::Frontend.suffix(), "frontend");
        assert_eq!(BucketKind::Data.resource(), "data-bucket");
    }

    #[tokio::test]
    async fn test_ensure_reuses_existing_bucket() {
        let head = mock!(Client::head_bucket)
            .match_requests(|req| req.bucket() == Some("demo-data"))
            .then_output(|| HeadBucketOutput::builder().build());
        let create =
            mock!(Client::create_bucket).then_output(|| CreateBucketOutput::builder().build());
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&head, &create]);

        let descriptor = data_bucket(client)
            .ensure(&StepInputs::new(StepName::DataBucket))
            .await
            .unwrap();

        assert_eq!(descriptor.get("bucket"), Some("demo-data"));
        assert_eq!(head.num_calls(), 1);
        assert_eq!(create.num_calls(), 0);
    }

    #[tokio::test]
    async fn test_teardown_of_missing_bucket_succeeds() {
        let listing = mock!(Client::list_object_versions)
            .then_error(|| ListObjectVersionsError::generic(error_code("NoSuchBucket")));
        let delete =
            mock!(Client::delete_bucket).then_output(|| DeleteBucketOutput::builder().build());
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&listing, &delete]);

        data_bucket(client)
            .teardown(&recorded("demo-data"))
            .await
            .unwrap();
        assert_eq!(delete.num_calls(), 0);
    }

    #[tokio::test]
    async fn test_teardown_stops_on_undeletable_key() {
        let listing = mock!(Client::list_object_versions).then_output(|| {
            ListObjectVersionsOutput::builder()
                .versions(
                    ObjectVersion::builder()
                        .key("locked.txt")
                        .version_id("v1")
                        .build(),
                )
                .build()
        });
        let objects = mock!(Client::delete_objects).then_output(|| {
            DeleteObjectsOutput::builder()
                .errors(
                    KeyError::builder()
                        .key("locked.txt")
                        .code("AccessDenied")
                        .build(),
                )
                .build()
        });
        let delete =
            mock!(Client::delete_bucket).then_output(|| DeleteBucketOutput::builder().build());
        let client = mock_client!(
            aws_sdk_s3,
            RuleMode::MatchAny,
            [&listing, &objects, &delete]
        );

        let err = data_bucket(client)
            .teardown(&recorded("demo-data"))
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Provider { .. }));
        assert!(err.to_string().contains("locked.txt"));
        assert!(err.to_string().contains("AccessDenied"));
        assert_eq!(listing.num_calls(), 1);
        assert_eq!(delete.num_calls(), 0);
    }
}
