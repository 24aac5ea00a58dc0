//! EC2 network: VPC, internet gateway, public and private subnets

use crate::error::{has_code, missing_field, provider_error};
use async_trait::async_trait;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::types::{Filter, ResourceType, Tag, TagSpecification};
use stackforge_cloud::{ProjectSettings, ResourceDescriptor, ResourceProvider, Result, StepInputs};

const RESOURCE: &str = "network";

pub const VPC_CIDR: &str = "10.0.0.0/16";
pub const PUBLIC_SUBNET_CIDR: &str = "10.0.1.0/24";
pub const PRIVATE_SUBNET_CIDR: &str = "10.0.2.0/24";

const NOT_FOUND: &[&str] = &[
    "InvalidVpcID.NotFound",
    "InvalidSubnetID.NotFound",
    "InvalidInternetGatewayID.NotFound",
    "Gateway.NotAttached",
];

fn filter(name: &str, value: &str) -> Filter {
    Filter::builder().name(name).values(value).build()
}

pub(crate) fn name_tag(resource_type: ResourceType, name: &str) -> TagSpecification {
    TagSpecification::builder()
        .resource_type(resource_type)
        .tags(Tag::builder().key("Name").value(name).build())
        .build()
}

/// VPC tagged `{project}-vpc` with one gateway and two subnets
pub struct NetworkProvider {
    client: Client,
    settings: ProjectSettings,
}

impl NetworkProvider {
    pub fn new(client: Client, settings: ProjectSettings) -> Self {
        Self { client, settings }
    }

    async fn find_vpc(&self, name: &str) -> Result<Option<String>> {
        let output = self
            .client
            .describe_vpcs()
            .filters(filter("tag:Name", name))
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        Ok(output
            .vpcs()
            .iter()
            .find_map(|vpc| vpc.vpc_id())
            .map(str::to_string))
    }

    async fn find_gateway(&self, vpc_id: &str) -> Result<Option<String>> {
        let output = self
            .client
            .describe_internet_gateways()
            .filters(filter("attachment.vpc-id", vpc_id))
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        Ok(output
            .internet_gateways()
            .iter()
            .find_map(|igw| igw.internet_gateway_id())
            .map(str::to_string))
    }

    async fn find_subnet(&self, vpc_id: &str, name: &str) -> Result<Option<String>> {
        let output = self
            .client
            .describe_subnets()
            .filters(filter("vpc-id", vpc_id))
            .filters(filter("tag:Name", name))
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        Ok(output
            .subnets()
            .iter()
            .find_map(|subnet| subnet.subnet_id())
            .map(str::to_string))
    }

    async fn create_vpc(&self, name: &str) -> Result<String> {
        let output = self
            .client
            .create_vpc()
            .cidr_block(VPC_CIDR)
            .tag_specifications(name_tag(ResourceType::Vpc, name))
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        let vpc_id = output
            .vpc()
            .and_then(|vpc| vpc.vpc_id())
            .ok_or_else(|| missing_field(RESOURCE, "VpcId"))?;

        tracing::info!("Created VPC {} ({})", name, vpc_id);
        Ok(vpc_id.to_string())
    }

    async fn ensure_gateway(&self, vpc_id: &str) -> Result<String> {
        if let Some(igw_id) = self.find_gateway(vpc_id).await? {
            return Ok(igw_id);
        }

        let name = self.settings.resource_name("igw");
        let output = self
            .client
            .create_internet_gateway()
            .tag_specifications(name_tag(ResourceType::InternetGateway, &name))
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        let igw_id = output
            .internet_gateway()
            .and_then(|igw| igw.internet_gateway_id())
            .ok_or_else(|| missing_field(RESOURCE, "InternetGatewayId"))?
            .to_string();

        self.client
            .attach_internet_gateway()
            .internet_gateway_id(&igw_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        tracing::info!("Attached internet gateway {} to {}", igw_id, vpc_id);
        Ok(igw_id)
    }

    async fn ensure_subnet(&self, vpc_id: &str, kind: &str, cidr: &str) -> Result<String> {
        let name = self.settings.resource_name(&format!("{}-subnet", kind));
        if let Some(subnet_id) = self.find_subnet(vpc_id, &name).await? {
            return Ok(subnet_id);
        }

        let output = self
            .client
            .create_subnet()
            .vpc_id(vpc_id)
            .cidr_block(cidr)
            .tag_specifications(name_tag(ResourceType::Subnet, &name))
            .send()
            .await
            .map_err(|e| provider_error(RESOURCE, e))?;

        let subnet_id = output
            .subnet()
            .and_then(|subnet| subnet.subnet_id())
            .ok_or_else(|| missing_field(RESOURCE, "SubnetId"))?;

        tracing::info!("Created subnet {} ({})", name, subnet_id);
        Ok(subnet_id.to_string())
    }
}

#[async_trait]
impl ResourceProvider for NetworkProvider {
    fn name(&self) -> &str {
        "ec2-network"
    }

    async fn ensure(&self, _inputs: &StepInputs) -> Result<ResourceDescriptor> {
        let name = self.settings.resource_name("vpc");

        let vpc_id = match self.find_vpc(&name).await? {
            Some(vpc_id) => {
                tracing::info!("Reusing VPC {} ({})", name, vpc_id);
                vpc_id
            }
            None => self.create_vpc(&name).await?,
        };

        // children are converged even on a reused VPC
        let igw_id = self.ensure_gateway(&vpc_id).await?;
        let public = self
            .ensure_subnet(&vpc_id, "public", PUBLIC_SUBNET_CIDR)
            .await?;
        let private = self
            .ensure_subnet(&vpc_id, "private", PRIVATE_SUBNET_CIDR)
            .await?;

        Ok(ResourceDescriptor::new()
            .with_attribute("vpc_id", vpc_id)
            .with_attribute("internet_gateway_id", igw_id)
            .with_attribute("public_subnet_id", public)
            .with_attribute("private_subnet_id", private))
    }

    async fn teardown(&self, descriptor: &ResourceDescriptor) -> Result<()> {
        let vpc_id = descriptor.require(RESOURCE, "vpc_id")?;

        let gateways = match self
            .client
            .describe_internet_gateways()
            .filters(filter("attachment.vpc-id", vpc_id))
            .send()
            .await
        {
            Ok(output) => output.internet_gateways().to_vec(),
            Err(e) if has_code(&e, NOT_FOUND) => Vec::new(),
            Err(e) => return Err(provider_error(RESOURCE, e)),
        };

        for igw_id in gateways.iter().filter_map(|igw| igw.internet_gateway_id()) {
            match self
                .client
                .detach_internet_gateway()
                .internet_gateway_id(igw_id)
                .vpc_id(vpc_id)
                .send()
                .await
            {
                Ok(_) => {}
                Err(e) if has_code(&e, NOT_FOUND) => {}
                Err(e) => return Err(provider_error(RESOURCE, e)),
            }
            match self
                .client
                .delete_internet_gateway()
                .internet_gateway_id(igw_id)
                .send()
                .await
            {
                Ok(_) => tracing::info!("Deleted internet gateway {}", igw_id),
                Err(e) if has_code(&e, NOT_FOUND) => {}
                Err(e) => return Err(provider_error(RESOURCE, e)),
            }
        }

        let subnets = match self
            .client
            .describe_subnets()
            .filters(filter("vpc-id", vpc_id))
            .send()
            .await
        {
            Ok(output) => output.subnets().to_vec(),
            Err(e) if has_code(&e, NOT_FOUND) => Vec::new(),
            Err(e) => return Err(provider_error(RESOURCE, e)),
        };

        for subnet_id in subnets.iter().filter_map(|s| s.subnet_id()) {
            match self.client.delete_subnet().subnet_id(subnet_id).send().await {
                Ok(_) => tracing::info!("Deleted subnet {}", subnet_id),
                Err(e) if has_code(&e, NOT_FOUND) => {}
                Err(e) => return Err(provider_error(RESOURCE, e)),
            }
        }

        match self.client.delete_vpc().vpc_id(vpc_id).send().await {
            Ok(_) => tracing::info!("Deleted VPC {}", vpc_id),
            Err(e) if has_code(&e, NOT_FOUND) => {
                tracing::info!("VPC {} already gone", vpc_id)
            }
            Err(e) => return Err(provider_error(RESOURCE, e)),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_tag_sets_resource_type_and_name() {
        let spec = name_tag(ResourceType::Subnet, "demo-private-subnet");
        assert_eq!(spec.resource_type(), Some(&ResourceType::Subnet));

        let tag = &spec.tags()[0];
        assert_eq!(tag.key(), Some("Name"));
        assert_eq!(tag.value(), Some("demo-private-subnet"));
    }

    #[test]
    fn test_subnets_fall_inside_vpc_range() {
        for cidr in [PUBLIC_SUBNET_CIDR, PRIVATE_SUBNET_CIDR] {
            assert!(cidr.starts_with("10.0."));
            assert!(cidr.ends_with("/24"));
        }
        assert_ne!(PUBLIC_SUBNET_CIDR, PRIVATE_SUBNET_CIDR);
        assert_eq!(VPC_CIDR, "10.0.0.0/16");
    }
}
