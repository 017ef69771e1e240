//! Storage health check

use opendal::Operator;

use s3probe_core::ProbeResult;

use crate::operator::storage_error;

/// Verify the bucket is reachable by listing its root
pub async fn check_health(op: &Operator) -> ProbeResult<()> {
    op.list("/")
        .await
        .map(|_| ())
        .map_err(|e| storage_error("storage health check failed", e))
}
