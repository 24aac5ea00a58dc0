//! Incoming event payloads

use crate::error::{HandlerError, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// The part of an API Gateway proxy request the handlers read
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    #[serde(default)]
    pub path_parameters: Option<HashMap<String, String>>,
}

impl ApiRequest {
    pub fn path_parameter(&self, name: &str) -> Result<&str> {
        self.path_parameters
            .as_ref()
            .and_then(|params| params.get(name))
            .map(String::as_str)
            .ok_or_else(|| HandlerError::BadRequest(format!("missing path parameter '{}'", name)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Object {
    pub key: String,
}

impl S3Event {
    /// Bucket and key of the first record
    pub fn first_object(&self) -> Result<(&str, &str)> {
        let record = self
            .records
            .first()
            .ok_or_else(|| HandlerError::BadRequest("event has no records".to_string()))?;
        Ok((record.s3.bucket.name.as_str(), record.s3.object.key.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_parameter() {
        let request: ApiRequest = serde_json::from_value(json!({
            "httpMethod": "DELETE",
            "pathParameters": { "filename": "file_1.txt" }
        }))
        .unwrap();
        assert_eq!(request.path_parameter("filename").unwrap(), "file_1.txt");

        let request: ApiRequest = serde_json::from_value(json!({ "pathParameters": null })).unwrap();
        assert!(request.path_parameter("filename").is_err());
    }

    #[test]
    fn test_s3_event_first_object() {
        let event: S3Event = serde_json::from_value(json!({
            "Records": [{
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": { "name": "demo-data", "arn": "arn:aws:s3:::demo-data" },
                    "object": { "key": "file_1.txt", "size": 10 }
                }
            }]
        }))
        .unwrap();
        assert_eq!(event.first_object().unwrap(), ("demo-data", "file_1.txt"));

        let empty: S3Event = serde_json::from_value(json!({})).unwrap();
        assert!(empty.first_object().is_err());
    }
}
