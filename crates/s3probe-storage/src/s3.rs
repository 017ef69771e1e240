//! S3-compatible backend: multipart control plane over presigned URLs
//!
//! Every request, including the control-plane calls, goes out as a SigV4
//! presigned URL so that a single signing path covers both the calls made
//! here and the part URLs handed to the [`Transport`].

use async_trait::async_trait;
use bytes::Bytes;
use opendal::Operator;
use reqwest::{Client, Method, StatusCode, Url};
use std::time::Duration;
use time::OffsetDateTime;

use s3probe_core::config::{Credentials, StorageConfig};
use s3probe_core::{ByteRange, ProbeError, ProbeResult};

use crate::backend::{verify_part_layout, ObjectStorage, PartInfo, PendingUpload, Transport};
use crate::operator::{build_operator, storage_error};
use crate::presign::{object_url, Presigner};
use crate::xml;

/// Parts requested per ListParts page
const LIST_PARTS_PAGE: u32 = 1000;

fn http_client(timeout_secs: u64) -> ProbeResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProbeError::config(format!("building HTTP client: {e}")))
}

fn request_error(what: &str, e: reqwest::Error) -> ProbeError {
    ProbeError::storage(format!("{what}: {e}"))
}

/// Read a response body, turning non-2xx statuses and `<Error>` documents
/// into storage errors. S3 may report a failed CompleteMultipartUpload with
/// status 200 and an error body.
async fn read_body(resp: reqwest::Response, what: &str) -> ProbeResult<String> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| request_error(&format!("{what}: reading response"), e))?;
    if let Some(err) = xml::error_document(&body) {
        return Err(ProbeError::storage(format!("{what}: {err} (HTTP {status})")));
    }
    if !status.is_success() {
        return Err(ProbeError::storage(format!("{what}: HTTP {status}")));
    }
    Ok(body)
}

pub struct S3Storage {
    config: StorageConfig,
    credentials: Credentials,
    endpoint: Url,
    presigner: Presigner,
    client: Client,
}

impl S3Storage {
    pub fn new(config: &StorageConfig) -> ProbeResult<Self> {
        config.check_tls()?;
        let credentials = config.credentials()?;
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            ProbeError::config(format!("invalid endpoint {}: {e}", config.endpoint))
        })?;
        Ok(Self {
            presigner: Presigner::new(credentials.clone(), config.region.clone()),
            client: http_client(config.request_timeout_secs)?,
            config: config.clone(),
            credentials,
            endpoint,
        })
    }

    fn presign(
        &self,
        method: &Method,
        bucket: &str,
        key: &str,
        query: &[(&str, &str)],
    ) -> ProbeResult<Url> {
        let mut url = object_url(&self.endpoint, bucket, key);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        self.presigner.presign(
            method.as_str(),
            &url,
            self.config.presign_expiry_secs,
            OffsetDateTime::now_utc(),
        )
    }

    async fn call(
        &self,
        method: Method,
        bucket: &str,
        key: &str,
        query: &[(&str, &str)],
        body: Option<String>,
        what: &str,
    ) -> ProbeResult<String> {
        let url = self.presign(&method, bucket, key, query)?;
        tracing::debug!(%method, bucket, key, what, "S3 request");
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.body(body);
        }
        let resp = req.send().await.map_err(|e| request_error(what, e))?;
        read_body(resp, what).await
    }

    fn operator(&self, bucket: &str) -> ProbeResult<Operator> {
        build_operator(&self.config, &self.credentials, bucket)
    }

    async fn list_parts(&self, upload_id: &str, bucket: &str, key: &str) -> ProbeResult<Vec<PartInfo>> {
        let mut parts = Vec::new();
        let mut marker = String::new();
        let max_parts = LIST_PARTS_PAGE.to_string();
        loop {
            let mut query = vec![("uploadId", upload_id), ("max-parts", max_parts.as_str())];
            if !marker.is_empty() {
                query.push(("part-number-marker", marker.as_str()));
            }
            let body = self
                .call(Method::GET, bucket, key, &query, None, "list parts")
                .await?;
            let page: xml::ListPartsResult = xml::parse("list parts", &body)?;
            parts.extend(page.parts.into_iter().map(|p| PartInfo {
                part_number: p.part_number,
                size: p.size,
                etag: p.etag,
            }));
            if !page.is_truncated || page.next_part_number_marker.is_empty() {
                break;
            }
            marker = page.next_part_number_marker;
        }
        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }
}

impl std::fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("endpoint", &self.endpoint.as_str())
            .field("region", &self.config.region)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn create_bucket(&self, bucket: &str) -> ProbeResult<()> {
        let body = (self.config.region != "us-east-1").then(|| {
            format!(
                "<CreateBucketConfiguration><LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
                self.config.region
            )
        });
        let url = self.presign(&Method::PUT, bucket, "", &[])?;
        let mut req = self.client.put(url);
        if let Some(body) = body {
            req = req.body(body);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| request_error("create bucket", e))?;
        if resp.status() == StatusCode::CONFLICT {
            let text = resp.text().await.unwrap_or_default();
            if let Some(err) = xml::error_document(&text) {
                if err.code == "BucketAlreadyOwnedByYou" {
                    tracing::info!(bucket, "bucket already exists");
                    return Ok(());
                }
                return Err(ProbeError::storage(format!("create bucket {bucket}: {err}")));
            }
            return Err(ProbeError::storage(format!(
                "create bucket {bucket}: HTTP 409"
            )));
        }
        read_body(resp, "create bucket").await?;
        tracing::info!(bucket, "bucket created");
        Ok(())
    }

    async fn init_multipart_upload(&self, bucket: &str, key: &str) -> ProbeResult<String> {
        let body = self
            .call(Method::POST, bucket, key, &[("uploads", "")], None, "initiate upload")
            .await?;
        let res: xml::InitiateMultipartUploadResult = xml::parse("initiate upload", &body)?;
        if res.upload_id.is_empty() {
            return Err(ProbeError::storage("initiate upload: response has no UploadId"));
        }
        Ok(res.upload_id)
    }

    async fn get_part_upload_url(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
        part_number: u32,
    ) -> ProbeResult<String> {
        let part = part_number.to_string();
        let url = self.presign(
            &Method::PUT,
            bucket,
            key,
            &[("partNumber", part.as_str()), ("uploadId", upload_id)],
        )?;
        Ok(url.into())
    }

    async fn complete_multipart_upload(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
        part_count: u32,
        part_size: u64,
    ) -> ProbeResult<()> {
        let parts = self.list_parts(upload_id, bucket, key).await?;
        verify_part_layout(&parts, part_count, part_size)?;

        let request = xml::CompleteMultipartUpload {
            parts: parts
                .into_iter()
                .map(|p| xml::CompletedPart {
                    part_number: p.part_number,
                    etag: p.etag,
                })
                .collect(),
        };
        let body = xml::to_xml(&request)?;
        self.call(
            Method::POST,
            bucket,
            key,
            &[("uploadId", upload_id)],
            Some(body),
            "complete upload",
        )
        .await?;
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
    ) -> ProbeResult<()> {
        self.call(
            Method::DELETE,
            bucket,
            key,
            &[("uploadId", upload_id)],
            None,
            "abort upload",
        )
        .await?;
        Ok(())
    }

    async fn get_object_download_url(&self, bucket: &str, key: &str) -> ProbeResult<String> {
        Ok(self.presign(&Method::GET, bucket, key, &[])?.into())
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> ProbeResult<Vec<PendingUpload>> {
        let mut uploads = Vec::new();
        let mut key_marker = String::new();
        let mut upload_id_marker = String::new();
        loop {
            let mut query = vec![("uploads", ""), ("prefix", prefix)];
            if !key_marker.is_empty() {
                query.push(("key-marker", key_marker.as_str()));
                query.push(("upload-id-marker", upload_id_marker.as_str()));
            }
            let body = self
                .call(Method::GET, bucket, "", &query, None, "list uploads")
                .await?;
            let page: xml::ListMultipartUploadsResult = xml::parse("list uploads", &body)?;
            uploads.extend(page.uploads.into_iter().map(|u| PendingUpload {
                key: u.key,
                upload_id: u.upload_id,
            }));
            if !page.is_truncated || page.next_key_marker.is_empty() {
                break;
            }
            key_marker = page.next_key_marker;
            upload_id_marker = page.next_upload_id_marker;
        }
        Ok(uploads)
    }

    async fn object_size(&self, bucket: &str, key: &str) -> ProbeResult<u64> {
        let meta = self
            .operator(bucket)?
            .stat(key)
            .await
            .map_err(|e| storage_error(&format!("stat {key}"), e))?;
        Ok(meta.content_length())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> ProbeResult<()> {
        self.operator(bucket)?
            .delete(key)
            .await
            .map_err(|e| storage_error(&format!("delete {key}"), e))
    }

    async fn check_health(&self, bucket: &str) -> ProbeResult<()> {
        crate::health::check_health(&self.operator(bucket)?).await
    }
}

/// Plain HTTP transport for presigned URLs
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout_secs: u64) -> ProbeResult<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn put_part(&self, url: &str, body: Bytes) -> ProbeResult<()> {
        let resp = self
            .client
            .put(url)
            .body(body)
            .send()
            .await
            .map_err(|e| request_error("upload part", e))?;
        read_body(resp, "upload part").await?;
        Ok(())
    }

    async fn get_range(&self, url: &str, range: ByteRange) -> ProbeResult<Bytes> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::RANGE, range.header_value())
            .send()
            .await
            .map_err(|e| request_error(&format!("download range {range}"), e))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let detail = xml::error_document(&text)
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(ProbeError::storage(format!(
                "download range {range}: {detail}"
            )));
        }
        resp.bytes()
            .await
            .map_err(|e| request_error(&format!("download range {range}: reading body"), e))
    }
}
