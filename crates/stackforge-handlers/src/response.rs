//! Proxy-integration responses

use crate::error::Result;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Response in the shape API Gateway's lambda proxy integration expects
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: u16,
    pub headers: BTreeMap<String, Value>,
    pub body: String,
}

fn cors_headers() -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("Access-Control-Allow-Origin".to_string(), json!("*")),
        ("Access-Control-Allow-Credentials".to_string(), json!(true)),
    ])
}

impl Response {
    /// 200 with an already serialized body
    pub fn raw(body: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            headers: cors_headers(),
            body: body.into(),
        }
    }

    pub fn ok<T: Serialize>(body: &T) -> Result<Self> {
        Ok(Self::raw(serde_json::to_string(body)?))
    }

    /// 500 with `{"error": message}`
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            status_code: 500,
            headers: cors_headers(),
            body: json!({ "error": message.to_string() }).to_string(),
        }
    }

    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Every failure leaves the handler as a 500 response, never as a crash
pub fn respond(result: Result<Response>) -> Response {
    result.unwrap_or_else(|e| {
        tracing::error!("Request failed: {}", e);
        Response::error(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;

    #[test]
    fn test_ok_carries_cors_headers() {
        let response = Response::ok(&json!({ "name": "a.txt" })).unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(response.headers["Access-Control-Allow-Origin"], json!("*"));
        assert_eq!(response.headers["Access-Control-Allow-Credentials"], json!(true));
        assert_eq!(response.json_body().unwrap()["name"], "a.txt");
    }

    #[test]
    fn test_respond_converts_errors() {
        let response = respond(Err(HandlerError::Store("bucket gone".to_string())));

        assert_eq!(response.status_code, 500);
        assert_eq!(
            response.json_body().unwrap(),
            json!({ "error": "Object store error: bucket gone" })
        );
        assert_eq!(response.headers.len(), 2);
    }

    #[test]
    fn test_serializes_with_proxy_field_names() {
        let value = serde_json::to_value(Response::raw("[]")).unwrap();
        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["body"], "[]");
    }
}
