use crate::config::types::ArchiveConfig;
use object_store::aws::AmazonS3Builder;
use object_store::ObjectStore;
use std::sync::Arc;

/// Build the S3-compatible store holding the log archive.
///
/// Credentials left unset fall through to the builder's environment and
/// instance-metadata lookup.
pub fn build_store(config: &ArchiveConfig) -> object_store::Result<Arc<dyn ObjectStore>> {
    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(&config.bucket)
        .with_region(&config.region);

    if let Some(endpoint) = &config.endpoint {
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(endpoint.starts_with("http://"));
    }
    if let Some(key_id) = &config.access_key_id {
        builder = builder.with_access_key_id(key_id);
    }
    if let Some(secret) = &config.secret_access_key {
        builder = builder.with_secret_access_key(secret);
    }
    if let Some(token) = &config.session_token {
        builder = builder.with_token(token);
    }

    Ok(Arc::new(builder.build()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_store_with_static_credentials() {
        let config = ArchiveConfig {
            endpoint: Some("http://localhost:9000".to_string()),
            access_key_id: Some("key".to_string()),
            secret_access_key: Some("secret".to_string()),
            ..Default::default()
        };

        let store = build_store(&config).unwrap();
        assert!(store.to_string().contains("fly-app-logs"));
    }
}
