//! AWS Signature V4 query-string presigning
//!
//! Only the `host` header is signed and the payload is `UNSIGNED-PAYLOAD`,
//! so the resulting URL can be used by any HTTP client without extra headers.

use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Url;
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use time::macros::format_description;
use time::OffsetDateTime;

use s3probe_core::config::Credentials;
use s3probe_core::{ProbeError, ProbeResult};

pub const SIGN_V4_ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const SERVICE_S3: &str = "s3";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// RFC 3986 unreserved characters stay literal, everything else is escaped
const URI_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Same as [`URI_ENCODE`] but keeps `/` for object key paths
const PATH_ENCODE: &AsciiSet = &URI_ENCODE.remove(b'/');

pub fn uri_encode(s: &str) -> String {
    utf8_percent_encode(s, URI_ENCODE).to_string()
}

pub fn path_encode(s: &str) -> String {
    utf8_percent_encode(s, PATH_ENCODE).to_string()
}

/// Path-style URL for `bucket`/`key` below `endpoint`. An empty key
/// addresses the bucket itself.
pub fn object_url(endpoint: &Url, bucket: &str, key: &str) -> Url {
    let mut url = endpoint.clone();
    let base = endpoint.path().trim_end_matches('/');
    let path = if key.is_empty() {
        format!("{base}/{}", uri_encode(bucket))
    } else {
        format!("{base}/{}/{}", uri_encode(bucket), path_encode(key))
    };
    url.set_path(&path);
    url.set_query(None);
    url
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> ProbeResult<[u8; 32]> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| ProbeError::Other(anyhow::anyhow!("HMAC key rejected: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// Derive the SigV4 signing key for one day, region and service
pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> ProbeResult<[u8; 32]> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn format_time(t: OffsetDateTime) -> ProbeResult<(String, String)> {
    let stamp = t
        .format(format_description!("[year][month][day]T[hour][minute][second]Z"))
        .map_err(|e| ProbeError::Other(anyhow::anyhow!("formatting signing time: {e}")))?;
    let date = stamp[..8].to_string();
    Ok((stamp, date))
}

fn host_header(url: &Url) -> ProbeResult<String> {
    let host = url
        .host_str()
        .ok_or_else(|| ProbeError::config(format!("URL has no host: {url}")))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Signs URLs with one set of credentials in one region
#[derive(Clone)]
pub struct Presigner {
    credentials: Credentials,
    region: String,
}

impl Presigner {
    pub fn new(credentials: Credentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    /// Presign `method url` for `expires_secs`, as of `now`. Query parameters
    /// already on `url` (e.g. `uploadId`) are kept and covered by the
    /// signature.
    pub fn presign(
        &self,
        method: &str,
        url: &Url,
        expires_secs: u64,
        now: OffsetDateTime,
    ) -> ProbeResult<Url> {
        let (stamp, date) = format_time(now)?;
        let scope = format!("{date}/{}/{SERVICE_S3}/aws4_request", self.region);
        let credential = format!("{}/{scope}", self.credentials.access_key_id);

        let mut query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
            .collect();
        for (k, v) in [
            ("X-Amz-Algorithm", SIGN_V4_ALGORITHM.to_string()),
            ("X-Amz-Credential", credential),
            ("X-Amz-Date", stamp.clone()),
            ("X-Amz-Expires", expires_secs.to_string()),
            ("X-Amz-SignedHeaders", "host".to_string()),
        ] {
            query.push((uri_encode(k), uri_encode(&v)));
        }
        query.sort();
        let canonical_query = query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_headers = format!("host:{}\n", host_header(url)?);
        let canonical_request = [
            method,
            url.path(),
            canonical_query.as_str(),
            canonical_headers.as_str(),
            "host",
            UNSIGNED_PAYLOAD,
        ]
        .join("\n");

        let hashed_request = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = [
            SIGN_V4_ALGORITHM,
            stamp.as_str(),
            scope.as_str(),
            hashed_request.as_str(),
        ]
        .join("\n");

        let key = signing_key(
            self.credentials.secret_access_key.expose_secret(),
            &date,
            &self.region,
            SERVICE_S3,
        )?;
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

        let mut signed = url.clone();
        signed.set_query(Some(&format!(
            "{canonical_query}&X-Amz-Signature={signature}"
        )));
        tracing::trace!(method, path = url.path(), "presigned URL");
        Ok(signed)
    }
}

impl std::fmt::Debug for Presigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Presigner")
            .field("credentials", &self.credentials)
            .field("region", &self.region)
            .finish()
    }
}
