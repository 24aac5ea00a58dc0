//! Entry point packaged as `bootstrap` in every function zip
//!
//! The operation served is chosen from the function name.

use anyhow::Result;
use stackforge_handlers::aws::{S3ObjectStore, SnsNotifier};
use stackforge_handlers::redis_cache::RedisCache;
use stackforge_handlers::{FileHandlers, HandlerEnv, HandlerKind, RuntimeClient};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .without_time()
        .init();

    let env = HandlerEnv::from_env()?;
    let kind = HandlerKind::from_function_name(&env.function_name)?;

    let sdk = aws_config::load_from_env().await;
    let handlers = FileHandlers::new(
        Arc::new(S3ObjectStore::new(
            aws_sdk_s3::Client::new(&sdk),
            env.data_bucket.clone(),
        )),
        Arc::new(RedisCache::connect(&env.redis_host).await?),
        Arc::new(SnsNotifier::new(
            aws_sdk_sns::Client::new(&sdk),
            env.topic_arn.clone(),
        )),
    );

    RuntimeClient::new(&env.runtime_api)
        .run(&handlers, kind)
        .await?;
    Ok(())
}
