//! ElastiCache redis cluster in the private subnet

use crate::error::{has_code, message, missing_field, provider_error};
use crate::network::VPC_CIDR;
use async_trait::async_trait;
use aws_sdk_ec2::types::{Filter, IpPermission, IpRange};
use aws_sdk_elasticache::types::{CacheCluster, Tag};
use stackforge_cloud::{
    CloudError, ProjectSettings, ResourceDescriptor, ResourceProvider, Result, StepInputs,
};

const RESOURCE: &str = "cache";

pub const REDIS_PORT: i32 = 6379;
const NODE_TYPE: &str = "cache.t3.micro";

const CLUSTER_NOT_FOUND: &[&str] = &["CacheClusterNotFound", "CacheClusterNotFoundFault"];
const CLUSTER_EXISTS: &[&str] = &["CacheClusterAlreadyExists", "CacheClusterAlreadyExistsFault"];
const GROUP_NOT_FOUND: &[&str] = &["CacheSubnetGroupNotFoundFault", "CacheSubnetGroupNotFound"];
const GROUP_EXISTS: &[&str] = &[
    "CacheSubnetGroupAlreadyExists",
    "CacheSubnetGroupAlreadyExistsFault",
];

/// Cluster `{project}-redis`, its subnet group and its security group
pub struct CacheProvider {
    elasticache: aws_sdk_elasticache::Client,
    ec2: aws_sdk_ec2::Client,
    settings: ProjectSettings,
}

/// Endpoint of an available cluster
fn endpoint(cluster: &CacheCluster) -> Option<(String, i32)> {
    let node = cluster.cache_nodes().first()?;
    let endpoint = node.endpoint()?;
    Some((endpoint.address()?.to_string(), endpoint.port()?))
}

impl CacheProvider {
    pub fn new(
        elasticache: aws_sdk_elasticache::Client,
        ec2: aws_sdk_ec2::Client,
        settings: ProjectSettings,
    ) -> Self {
        Self {
            elasticache,
            ec2,
            settings,
        }
    }

    fn cluster_id(&self) -> String {
        self.settings.resource_name("redis")
    }

    fn subnet_group(&self) -> String {
        self.settings.resource_name("redis-subnet-group")
    }

    fn security_group_name(&self) -> String {
        self.settings.resource_name("redis-sg")
    }

    async fn describe(&self, cluster_id: &str) -> Result<Option<CacheCluster>> {
        match self
            .elasticache
            .describe_cache_clusters()
            .cache_cluster_id(cluster_id)
            .show_cache_node_info(true)
            .send()
            .await
        {
            Ok(output) => Ok(output.cache_clusters().first().cloned()),
            Err(e) if has_code(&e, CLUSTER_NOT_FOUND) => Ok(None),
            Err(e) => Err(provider_error(RESOURCE, e)),
        }
    }

    async fn ensure_subnet_group(&self, subnet_id: &str) -> Result<String> {
        let name = self.subnet_group();
        match self
            .elasticache
            .create_cache_subnet_group()
            .cache_subnet_group_name(&name)
            .cache_subnet_group_description(format!(
                "Subnet group for {} redis cluster",
                self.settings.project_name
            ))
            .subnet_ids(subnet_id)
            .send()
            .await
        {
            Ok(_) => tracing::info!("Created cache subnet group {}", name),
            Err(e) if has_code(&e, GROUP_EXISTS) => {
                tracing::info!("Reusing cache subnet group {}", name)
            }
            Err(e) => return Err(provider_error(RESOURCE, e)),
        }
        Ok(name)
    }

    async fn ensure_security_group(&self, vpc_id: &str) -> Result<String> {
        let name = self.security_group_name();

        let existing = self
            .ec2
            .describe_security_groups()
            .filters(Filter::builder().name("group-name").values(&name).build())
            .filters(Filter::builder().name("vpc-id").values(vpc_id).build())
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        if let Some(group_id) = existing
            .security_groups()
            .iter()
            .find_map(|group| group.group_id())
        {
            tracing::info!("Reusing security group {} ({})", name, group_id);
            return Ok(group_id.to_string());
        }

        let created = self
            .ec2
            .create_security_group()
            .group_name(&name)
            .description(format!(
                "Security group for {} redis cluster",
                self.settings.project_name
            ))
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        let group_id = created
            .group_id()
            .ok_or_else(|| missing_field(RESOURCE, "GroupId"))?
            .to_string();

        self.ec2
            .authorize_security_group_ingress()
            .group_id(&group_id)
            .ip_permissions(
                IpPermission::builder()
                    .ip_protocol("tcp")
                    .from_port(REDIS_PORT)
                    .to_port(REDIS_PORT)
                    .ip_ranges(IpRange::builder().cidr_ip(VPC_CIDR).build())
                    .build(),
            )
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        tracing::info!("Created security group {} ({})", name, group_id);
        Ok(group_id)
    }

    async fn create_cluster(&self, cluster_id: &str, subnet_group: &str, sg: &str) -> Result<()> {
        match self
            .elasticache
            .create_cache_cluster()
            .cache_cluster_id(cluster_id)
            .engine("redis")
            .cache_node_type(NODE_TYPE)
            .num_cache_nodes(1)
            .cache_subnet_group_name(subnet_group)
            .security_group_ids(sg)
            .tags(
                Tag::builder()
                    .key("Project")
                    .value(&self.settings.project_name)
                    .build(),
            )
            .send()
            .await
        {
            Ok(_) => tracing::info!("Created cache cluster {}", cluster_id),
            Err(e) if has_code(&e, CLUSTER_EXISTS) => {}
            Err(e) => return Err(provider_error(RESOURCE, e)),
        }
        Ok(())
    }

    async fn wait_available(&self, cluster_id: &str) -> Result<(String, i32)> {
        let what = format!("cache cluster {}", cluster_id);
        self.settings
            .wait
            .wait_for(&what, || async move {
                let Some(cluster) = self.describe(cluster_id).await? else {
                    return Ok(None);
                };
                if cluster.cache_cluster_status() != Some("available") {
                    return Ok(None);
                }
                Ok(endpoint(&cluster))
            })
            .await
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<()> {
        // network interfaces of the deleted cluster release the group with a delay
        let what = format!("security group {}", group_id);
        let what = what.as_str();
        self.settings
            .wait
            .wait_for(what, || async move {
                match self.ec2.delete_security_group().group_id(group_id).send().await {
                    Ok(_) => {
                        tracing::info!("Deleted security group {}", group_id);
                        Ok(Some(()))
                    }
                    Err(e) if has_code(&e, &["InvalidGroup.NotFound"]) => Ok(Some(())),
                    Err(e) if has_code(&e, &["DependencyViolation"]) => {
                        tracing::debug!("{}: {}", what, message(&e));
                        Ok(None)
                    }
                    Err(e) => Err(provider_error(RESOURCE, e)),
                }
            })
            .await
    }
}

#[async_trait]
impl ResourceProvider for CacheProvider {
    fn name(&self) -> &str {
        "elasticache-redis"
    }

    async fn ensure(&self, inputs: &StepInputs) -> Result<ResourceDescriptor> {
        let vpc_id = inputs.require("vpc_id")?;
        let subnet_id = inputs.require("subnet_id")?;
        let cluster_id = self.cluster_id();

        let subnet_group = self.ensure_subnet_group(subnet_id).await?;
        let security_group = self.ensure_security_group(vpc_id).await?;

        match self.describe(&cluster_id).await? {
            Some(_) => tracing::info!("Reusing cache cluster {}", cluster_id),
            None => {
                self.create_cluster(&cluster_id, &subnet_group, &security_group)
                    .await?
            }
        }

        let (address, port) = self.wait_available(&cluster_id).await?;

        Ok(ResourceDescriptor::new()
            .with_attribute("cluster_id", cluster_id)
            .with_attribute("endpoint", address)
            .with_attribute("port", port.to_string())
            .with_attribute("subnet_group", subnet_group)
            .with_attribute("security_group_id", security_group))
    }

    async fn teardown(&self, descriptor: &ResourceDescriptor) -> Result<()> {
        let cluster_id = descriptor.require(RESOURCE, "cluster_id")?;

        match self
            .elasticache
            .delete_cache_cluster()
            .cache_cluster_id(cluster_id)
            .send()
            .await
        {
            Ok(_) => tracing::info!("Deleting cache cluster {}", cluster_id),
            Err(e) if has_code(&e, CLUSTER_NOT_FOUND) => {}
            Err(e) if has_code(&e, &["InvalidCacheClusterState"]) => {
                let status = self
                    .describe(cluster_id)
                    .await?
                    .and_then(|cluster| cluster.cache_cluster_status().map(str::to_string));
                match status.as_deref() {
                    Some("deleting") | None => {
                        tracing::info!("Cache cluster {} is already being deleted", cluster_id)
                    }
                    Some(status) => {
                        return Err(CloudError::provider(
                            RESOURCE,
                            format!(
                                "cache cluster {} is {} and cannot be deleted: {}",
                                cluster_id,
                                status,
                                message(&e)
                            ),
                        ));
                    }
                }
            }
            Err(e) => return Err(provider_error(RESOURCE, e)),
        }

        let what = format!("cache cluster {} removal", cluster_id);
        self.settings
            .wait
            .wait_for(&what, || async move {
                Ok(self.describe(cluster_id).await?.is_none().then_some(()))
            })
            .await?;

        if let Some(subnet_group) = descriptor.get("subnet_group") {
            match self
                .elasticache
                .delete_cache_subnet_group()
                .cache_subnet_group_name(subnet_group)
                .send()
                .await
            {
                Ok(_) => tracing::info!("Deleted cache subnet group {}", subnet_group),
                Err(e) if has_code(&e, GROUP_NOT_FOUND) => {}
                Err(e) => return Err(provider_error(RESOURCE, e)),
            }
        }

        if let Some(group_id) = descriptor.get("security_group_id") {
            self.delete_security_group(group_id).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_code;
    use aws_sdk_ec2::operation::describe_security_groups::DescribeSecurityGroupsOutput;
    use aws_sdk_ec2::types::SecurityGroup;
    use aws_sdk_elasticache::Client as ElastiCache;
    use aws_sdk_elasticache::operation::create_cache_cluster::CreateCacheClusterOutput;
    use aws_sdk_elasticache::operation::create_cache_subnet_group::CreateCacheSubnetGroupOutput;
    use aws_sdk_elasticache::operation::delete_cache_cluster::DeleteCacheClusterError;
    use aws_sdk_elasticache::operation::describe_cache_clusters::{
        DescribeCacheClustersError, DescribeCacheClustersOutput,
    };
    use aws_sdk_elasticache::types::{CacheNode, Endpoint};
    use aws_smithy_mocks::{RuleMode, mock, mock_client};
    use stackforge_cloud::{StepName, WaitBudget};
    use std::time::Duration;

    const ADDRESS: &str = "demo-redis.abc123.0001.use1.cache.amazonaws.com";

    fn cluster(status: &str) -> CacheCluster {
        let cluster = CacheCluster::builder()
            .cache_cluster_id("demo-redis")
            .cache_cluster_status(status);
        if status != "available" {
            return cluster.build();
        }
        cluster
            .cache_nodes(
                CacheNode::builder()
                    .endpoint(Endpoint::builder().address(ADDRESS).port(REDIS_PORT).build())
                    .build(),
            )
            .build()
    }

    fn described(status: &str) -> DescribeCacheClustersOutput {
        DescribeCacheClustersOutput::builder()
            .cache_clusters(cluster(status))
            .build()
    }

    /// EC2 client for paths that never reach EC2
    fn idle_ec2() -> aws_sdk_ec2::Client {
        aws_sdk_ec2::Client::from_conf(
            aws_sdk_ec2::Config::builder()
                .behavior_version(aws_sdk_ec2::config::BehaviorVersion::latest())
                .region(aws_sdk_ec2::config::Region::new("us-east-1"))
                .build(),
        )
    }

    fn provider(elasticache: ElastiCache, ec2: aws_sdk_ec2::Client) -> CacheProvider {
        let mut settings = ProjectSettings::new("demo");
        settings.wait = WaitBudget::new(5, Duration::ZERO);
        CacheProvider::new(elasticache, ec2, settings)
    }

    #[test]
    fn test_endpoint_reads_first_node() {
        let cluster = CacheCluster::builder()
            .cache_cluster_status("available")
            .cache_nodes(
                CacheNode::builder()
                    .endpoint(
                        Endpoint::builder()
                            .address("demo-redis.abc123.0001.use1.cache.amazonaws.com")
                            .port(REDIS_PORT)
                            .build(),
                    )
                    .build(),
            )
            .build();

        let (address, port) = endpoint(&cluster).unwrap();
        assert!(address.starts_with("demo-redis."));
        assert_eq!(port, 6379);
    }

    #[test]
    fn test_endpoint_absent_while_creating() {
        let cluster = CacheCluster::builder()
            .cache_cluster_status("creating")
            .build();
        assert!(endpoint(&cluster).is_none());
    }

    #[tokio::test]
    async fn test_ensure_waits_for_existing_cluster_to_become_available() {
        let subnet_group = mock!(ElastiCache::create_cache_subnet_group)
            .then_output(|| CreateCacheSubnetGroupOutput::builder().build());
        let describe = mock!(ElastiCache::describe_cache_clusters)
            .sequence()
            .output(|| described("creating"))
            .times(2)
            .output(|| described("available"))
            .build();
        let create = mock!(ElastiCache::create_cache_cluster)
            .then_output(|| CreateCacheClusterOutput::builder().build());
        let elasticache = mock_client!(
            aws_sdk_elasticache,
            RuleMode::MatchAny,
            [&subnet_group, &describe, &create]
        );

        let groups = mock!(aws_sdk_ec2::Client::describe_security_groups).then_output(|| {
            DescribeSecurityGroupsOutput::builder()
                .security_groups(SecurityGroup::builder().group_id("sg-0redis").build())
                .build()
        });
        let ec2 = mock_client!(aws_sdk_ec2, RuleMode::MatchAny, [&groups]);

        let inputs = StepInputs::new(StepName::Cache)
            .with("vpc_id", "vpc-0abc")
            .with("subnet_id", "subnet-02");
        let descriptor = provider(elasticache, ec2).ensure(&inputs).await.unwrap();

        assert_eq!(descriptor.get("endpoint"), Some(ADDRESS));
        assert_eq!(descriptor.get("port"), Some("6379"));
        assert_eq!(descriptor.get("security_group_id"), Some("sg-0redis"));
        assert_eq!(describe.num_calls(), 3);
        assert_eq!(create.num_calls(), 0);
    }

    #[tokio::test]
    async fn test_teardown_accepts_cluster_already_deleting() {
        let delete = mock!(ElastiCache::delete_cache_cluster).then_error(|| {
            DeleteCacheClusterError::generic(error_code("InvalidCacheClusterState"))
        });
        let describe = mock!(ElastiCache::describe_cache_clusters)
            .sequence()
            .output(|| described("deleting"))
            .error(|| DescribeCacheClustersError::generic(error_code("CacheClusterNotFound")))
            .build();
        let elasticache = mock_client!(
            aws_sdk_elasticache,
            RuleMode::MatchAny,
            [&delete, &describe]
        );
        let ec2 = idle_ec2();

        let descriptor = ResourceDescriptor::new().with_attribute("cluster_id", "demo-redis");
        provider(elasticache, ec2).teardown(&descriptor).await.unwrap();

        assert_eq!(describe.num_calls(), 2);
    }

    #[tokio::test]
    async fn test_teardown_rejects_cluster_in_other_transition() {
        let delete = mock!(ElastiCache::delete_cache_cluster).then_error(|| {
            DeleteCacheClusterError::generic(error_code("InvalidCacheClusterState"))
        });
        let describe = mock!(ElastiCache::describe_cache_clusters)
            .then_output(|| described("modifying"));
        let elasticache = mock_client!(
            aws_sdk_elasticache,
            RuleMode::MatchAny,
            [&delete, &describe]
        );
        let ec2 = idle_ec2();

        let descriptor = ResourceDescriptor::new().with_attribute("cluster_id", "demo-redis");
        let err = provider(elasticache, ec2)
            .teardown(&descriptor)
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Provider { .. }));
        assert!(err.to_string().contains("modifying"));
        assert_eq!(describe.num_calls(), 1);
    }
}
