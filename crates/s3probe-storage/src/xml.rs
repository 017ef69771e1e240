//! S3 XML documents used by the multipart API

use serde::{Deserialize, Serialize};

use s3probe_core::{ProbeError, ProbeResult};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct InitiateMultipartUploadResult {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ListPartsResult {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub next_part_number_marker: String,
    pub is_truncated: bool,
    #[serde(rename = "Part")]
    pub parts: Vec<ListedPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ListedPart {
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename = "CompleteMultipartUpload")]
pub struct CompleteMultipartUpload {
    #[serde(rename = "Part")]
    pub parts: Vec<CompletedPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompletedPart {
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ListMultipartUploadsResult {
    pub bucket: String,
    pub is_truncated: bool,
    pub next_key_marker: String,
    pub next_upload_id_marker: String,
    #[serde(rename = "Upload")]
    pub uploads: Vec<ListedUpload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ListedUpload {
    pub key: String,
    pub upload_id: String,
}

/// `<Error>` body returned on failures (and sometimes with a 200 status)
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub resource: String,
    pub request_id: String,
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if !self.request_id.is_empty() {
            write!(f, " (request id {})", self.request_id)?;
        }
        Ok(())
    }
}

pub fn parse<T: for<'de> Deserialize<'de>>(what: &str, body: &str) -> ProbeResult<T> {
    quick_xml::de::from_str(body)
        .map_err(|e| ProbeError::storage(format!("malformed {what} response: {e}")))
}

pub fn to_xml<T: Serialize>(value: &T) -> ProbeResult<String> {
    quick_xml::se::to_string(value)
        .map_err(|e| ProbeError::storage(format!("serializing request body: {e}")))
}

/// An S3 error document, if `body` is one
pub fn error_document(body: &str) -> Option<ErrorResponse> {
    if !body.contains("<Error>") {
        return None;
    }
    quick_xml::de::from_str::<ErrorResponse>(body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_initiate_result() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<InitiateMultipartUploadResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Bucket>probe</Bucket>
  <Key>validation/abc</Key>
  <UploadId>VXBsb2FkIElE</UploadId>
</InitiateMultipartUploadResult>"#;
        let res: InitiateMultipartUploadResult = parse("initiate", body).unwrap();
        assert_eq!(res.bucket, "probe");
        assert_eq!(res.key, "validation/abc");
        assert_eq!(res.upload_id, "VXBsb2FkIElE");
    }

    #[test]
    fn parse_list_parts() {
        let body = r#"<ListPartsResult>
  <Bucket>probe</Bucket>
  <Key>obj</Key>
  <UploadId>u1</UploadId>
  <PartNumberMarker>0</PartNumberMarker>
  <NextPartNumberMarker>2</NextPartNumberMarker>
  <MaxParts>1000</MaxParts>
  <IsTruncated>true</IsTruncated>
  <Part>
    <PartNumber>1</PartNumber>
    <LastModified>2024-01-01T00:00:00.000Z</LastModified>
    <ETag>"aaa"</ETag>
    <Size>5242880</Size>
  </Part>
  <Part>
    <PartNumber>2</PartNumber>
    <ETag>"bbb"</ETag>
    <Size>1024</Size>
  </Part>
</ListPartsResult>"#;
        let res: ListPartsResult = parse("list parts", body).unwrap();
        assert!(res.is_truncated);
        assert_eq!(res.next_part_number_marker, "2");
        assert_eq!(res.parts.len(), 2);
        assert_eq!(res.parts[0].part_number, 1);
        assert_eq!(res.parts[0].etag, "\"aaa\"");
        assert_eq!(res.parts[1].size, 1024);
    }

    #[test]
    fn parse_list_parts_without_parts() {
        let body = "<ListPartsResult><Bucket>b</Bucket><IsTruncated>false</IsTruncated></ListPartsResult>";
        let res: ListPartsResult = parse("list parts", body).unwrap();
        assert!(res.parts.is_empty());
        assert!(!res.is_truncated);
    }

    #[test]
    fn serialize_complete_request() {
        let body = CompleteMultipartUpload {
            parts: vec![
                CompletedPart {
                    part_number: 1,
                    etag: "e1".into(),
                },
                CompletedPart {
                    part_number: 2,
                    etag: "e2".into(),
                },
            ],
        };
        let xml = to_xml(&body).unwrap();
        assert!(xml.starts_with("<CompleteMultipartUpload>"));
        assert!(xml.contains("<Part><PartNumber>1</PartNumber><ETag>e1</ETag></Part>"));
        assert!(xml.contains("<PartNumber>2</PartNumber>"));
    }

    #[test]
    fn parse_list_uploads() {
        let body = r#"<ListMultipartUploadsResult>
  <Bucket>probe</Bucket>
  <IsTruncated>false</IsTruncated>
  <Upload><Key>obj-1</Key><UploadId>u1</UploadId></Upload>
  <Upload><Key>obj-2</Key><UploadId>u2</UploadId></Upload>
</ListMultipartUploadsResult>"#;
        let res: ListMultipartUploadsResult = parse("list uploads", body).unwrap();
        assert_eq!(res.uploads.len(), 2);
        assert_eq!(res.uploads[1].key, "obj-2");
        assert_eq!(res.uploads[1].upload_id, "u2");
    }

    #[test]
    fn error_document_detection() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>InternalError</Code><Message>We encountered an internal error.</Message><RequestId>r-1</RequestId></Error>"#;
        let err = error_document(body).unwrap();
        assert_eq!(err.code, "InternalError");
        assert_eq!(
            err.to_string(),
            "InternalError: We encountered an internal error. (request id r-1)"
        );
        assert!(error_document("<CompleteMultipartUploadResult/>").is_none());
    }
}
