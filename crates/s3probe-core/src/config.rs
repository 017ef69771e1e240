use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

use crate::{ProbeError, ProbeResult};

/// Top-level probe configuration (loaded from s3probe.toml or a YAML file)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub storage: StorageConfig,
    pub transfer: TransferConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint, path-style addressing
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket the validation object is written to
    pub bucket: String,
    /// Access key id (falls back to AWS_ACCESS_KEY_ID)
    #[serde(deserialize_with = "deserialize_secret", skip_serializing)]
    pub access_key_id: Option<SecretString>,
    /// Secret access key (falls back to AWS_SECRET_ACCESS_KEY)
    #[serde(deserialize_with = "deserialize_secret", skip_serializing)]
    pub secret_access_key: Option<SecretString>,
    /// Refuse plaintext HTTP endpoints
    pub enforce_tls: bool,
    /// Lifetime of presigned URLs in seconds
    pub presign_expiry_secs: u64,
    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Requested upload part size in MiB (clamped to 5..=5120)
    pub part_size_mib: u64,
    /// Prefix prepended to the generated object key
    pub object_prefix: String,
    /// Delete the validation object after a successful run
    pub delete_after_validation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Resolved S3 credentials
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4566".into(),
            region: "us-east-1".into(),
            bucket: "s3probe".into(),
            access_key_id: None,
            secret_access_key: None,
            enforce_tls: false,
            presign_expiry_secs: 3600,
            request_timeout_secs: 60,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            part_size_mib: 16,
            object_prefix: String::new(),
            delete_after_validation: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ProbeConfig {
    /// Load a config file. `.yaml`/`.yml` files are parsed as YAML, anything
    /// else as TOML.
    pub fn from_path(path: &Path) -> ProbeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProbeError::config(format!("reading config {}: {e}", path.display()))
        })?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config = if is_yaml {
            Self::from_yaml_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
        .map_err(|e| match e {
            ProbeError::Config(msg) => {
                ProbeError::config(format!("parsing config {}: {msg}", path.display()))
            }
            other => other,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> ProbeResult<Self> {
        toml::from_str(s).map_err(|e| ProbeError::config(e.to_string()))
    }

    pub fn from_yaml_str(s: &str) -> ProbeResult<Self> {
        serde_yml::from_str(s).map_err(|e| ProbeError::config(e.to_string()))
    }

    /// Reject configs that can never produce a valid run
    pub fn validate(&self) -> ProbeResult<()> {
        if self.storage.endpoint.trim().is_empty() {
            return Err(ProbeError::config("storage.endpoint must not be empty"));
        }
        if self.storage.bucket.trim().is_empty() {
            return Err(ProbeError::config("storage.bucket must not be empty"));
        }
        if self.transfer.part_size_mib == 0 {
            return Err(ProbeError::config("transfer.part_size_mib must be positive"));
        }
        if self.storage.presign_expiry_secs == 0 {
            return Err(ProbeError::config(
                "storage.presign_expiry_secs must be positive",
            ));
        }
        Ok(())
    }
}

impl StorageConfig {
    /// Resolve credentials from the config, falling back to the standard
    /// AWS environment variables.
    pub fn credentials(&self) -> ProbeResult<Credentials> {
        let access_key_id = match &self.access_key_id {
            Some(key) => key.expose_secret().to_string(),
            None => std::env::var("AWS_ACCESS_KEY_ID").map_err(|_| {
                ProbeError::config(
                    "S3 access key not set: configure storage.access_key_id or AWS_ACCESS_KEY_ID",
                )
            })?,
        };
        let secret_access_key = match &self.secret_access_key {
            Some(secret) => secret.clone(),
            None => std::env::var("AWS_SECRET_ACCESS_KEY")
                .map(SecretString::from)
                .map_err(|_| {
                    ProbeError::config(
                        "S3 secret key not set: configure storage.secret_access_key or AWS_SECRET_ACCESS_KEY",
                    )
                })?,
        };
        Ok(Credentials {
            access_key_id,
            secret_access_key,
        })
    }

    /// Enforce or warn about plaintext HTTP endpoints.
    pub fn check_tls(&self) -> ProbeResult<()> {
        if self.endpoint.starts_with("http://") {
            if self.enforce_tls {
                return Err(ProbeError::config(format!(
                    "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                     Use an HTTPS endpoint or set storage.enforce_tls = false for local testing.",
                    self.endpoint
                )));
            }
            tracing::warn!(
                endpoint = %self.endpoint,
                "S3 endpoint uses plaintext HTTP; credentials and presigned URLs travel unencrypted"
            );
        }
        Ok(())
    }
}
