//! Resource descriptors
//!
//! A descriptor is the opaque set of identifying and connection attributes a
//! provider returns after creating or locating a resource (`vpc_id`,
//! `endpoint`, `topic_arn`, ...). The orchestrators never interpret the
//! attributes; they only copy named ones into later steps' inputs.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute map describing one provisioned resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceDescriptor {
    attributes: BTreeMap<String, String>,
}

impl ResourceDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Get an attribute a provider cannot work without
    pub fn require(&self, resource: &str, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            CloudError::provider(
                resource,
                format!("descriptor is missing attribute '{}'", key),
            )
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ResourceDescriptor
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            attributes: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_reports_missing_attribute() {
        let descriptor = ResourceDescriptor::new().with_attribute("vpc_id", "vpc-123");

        assert_eq!(descriptor.require("network", "vpc_id").unwrap(), "vpc-123");

        let err = descriptor.require("network", "subnet_id").unwrap_err();
        assert!(err.to_string().contains("subnet_id"));
    }

    #[test]
    fn test_serializes_as_flat_map() {
        let descriptor: ResourceDescriptor =
            [("endpoint", "redis.local"), ("port", "6379")].into_iter().collect();

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"endpoint": "redis.local", "port": "6379"})
        );
    }
}
