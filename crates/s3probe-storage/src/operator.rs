//! OpenDAL operator for the object-level calls (stat, delete, list)

use opendal::Operator;
use secrecy::ExposeSecret;

use s3probe_core::config::{Credentials, StorageConfig};
use s3probe_core::{ProbeError, ProbeResult};

/// Build an OpenDAL S3 operator scoped to `bucket`.
///
/// Path-style addressing is the opendal 0.55 default, which MinIO, Ceph and
/// LocalStack all accept.
pub fn build_operator(
    storage: &StorageConfig,
    credentials: &Credentials,
    bucket: &str,
) -> ProbeResult<Operator> {
    storage.check_tls()?;

    let builder = opendal::services::S3::default()
        .endpoint(&storage.endpoint)
        .region(&storage.region)
        .bucket(bucket)
        .access_key_id(&credentials.access_key_id)
        .secret_access_key(credentials.secret_access_key.expose_secret());

    let op = Operator::new(builder)
        .map_err(|e| ProbeError::config(format!("creating OpenDAL S3 operator: {e}")))?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(3)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Map an OpenDAL error onto the storage error class
pub fn storage_error(what: &str, e: opendal::Error) -> ProbeError {
    ProbeError::storage(format!("{what}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn creds() -> Credentials {
        Credentials {
            access_key_id: "test-key".into(),
            secret_access_key: SecretString::from("test-secret".to_string()),
        }
    }

    #[test]
    fn test_build_operator_valid() {
        let storage = StorageConfig {
            endpoint: "http://localhost:4566".into(),
            ..Default::default()
        };
        let op = build_operator(&storage, &creds(), "test-bucket");
        assert!(op.is_ok(), "operator construction should succeed");
    }

    #[test]
    fn test_build_operator_http_enforce_tls() {
        let storage = StorageConfig {
            endpoint: "http://insecure:9000".into(),
            enforce_tls: true,
            ..Default::default()
        };
        let result = build_operator(&storage, &creds(), "test-bucket");
        assert!(result.is_err(), "HTTP + enforce_tls must fail");
        assert!(result.unwrap_err().to_string().contains("enforce_tls"));
    }

    #[test]
    fn test_build_operator_https() {
        let storage = StorageConfig {
            endpoint: "https://s3.example.com".into(),
            enforce_tls: true,
            ..Default::default()
        };
        assert!(build_operator(&storage, &creds(), "test-bucket").is_ok());
    }
}
