//! Classification of AWS SDK errors
//!
//! Every SDK crate re-exports the same smithy error traits, so one set of
//! helpers serves all services.

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use stackforge_cloud::CloudError;

/// Wrap any SDK or builder error as a provider error, keeping the full source chain
pub(crate) fn provider_error<E>(resource: &str, err: E) -> CloudError
where
    E: std::error::Error + 'static,
{
    CloudError::provider(resource, DisplayErrorContext(err).to_string())
}

/// Whether the service error code is one of `codes`
pub(crate) fn has_code<E: ProvideErrorMetadata>(err: &E, codes: &[&str]) -> bool {
    err.code().is_some_and(|code| codes.contains(&code))
}

/// Error message reported by the service, if any
pub(crate) fn message<E: ProvideErrorMetadata>(err: &E) -> &str {
    err.message().unwrap_or_default()
}

/// A required field the service left empty in a successful response
pub(crate) fn missing_field(resource: &str, field: &str) -> CloudError {
    CloudError::provider(resource, format!("response did not include {}", field))
}

/// Service error metadata carrying `code`, for building mocked SDK errors
#[cfg(test)]
pub(crate) fn error_code(code: &str) -> aws_sdk_s3::error::ErrorMetadata {
    aws_sdk_s3::error::ErrorMetadata::builder()
        .code(code)
        .message(format!("{} (mocked)", code))
        .build()
}
