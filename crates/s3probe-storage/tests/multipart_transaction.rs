//! Lifecycle tests for the multipart upload transaction against the
//! in-memory backend: every begin ends in a complete or an abort, never in
//! a dangling upload.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use s3probe_core::{ProbeError, UploadState};
use s3probe_storage::{CallCounts, MemoryStorage, MultipartUpload};

const BUCKET: &str = "probe";
const PART: u64 = 8;

fn part(n: u32, len: u64) -> Bytes {
    Bytes::from(vec![n as u8; len as usize])
}

async fn begin(store: &Arc<MemoryStorage>, total: u64) -> MultipartUpload {
    let backend = MemoryStorage::backend(store);
    MultipartUpload::begin(&backend, BUCKET, "obj", PART, total)
        .await
        .expect("begin")
}

#[tokio::test]
async fn successful_upload_completes_once() {
    let store = Arc::new(MemoryStorage::with_bucket(BUCKET));
    let mut upload = begin(&store, 5 * PART - 3).await;
    assert_eq!(upload.expected_parts(), 5);

    for n in 1..=4 {
        upload.send_part(n, part(n, PART)).await.unwrap();
    }
    upload.send_part(5, part(5, PART - 3)).await.unwrap();
    upload.complete().await.unwrap();

    let counts = store.counts();
    assert_eq!(counts.complete, 1);
    assert_eq!(counts.abort, 0);
    assert_eq!(counts.part_puts, 5);
    assert_eq!(store.dangling_uploads(), 0);
    assert_eq!(store.object(BUCKET, "obj").unwrap().len() as u64, 5 * PART - 3);
}

#[tokio::test]
async fn transport_failure_on_part_three_aborts() {
    let store = Arc::new(MemoryStorage::with_bucket(BUCKET));
    store.fail_on_part(3);
    let mut upload = begin(&store, 5 * PART).await;

    upload.send_part(1, part(1, PART)).await.unwrap();
    upload.send_part(2, part(2, PART)).await.unwrap();
    let err = upload.send_part(3, part(3, PART)).await.unwrap_err();
    assert!(err.to_string().contains("part 3"));
    assert_eq!(upload.state(), UploadState::Aborted);

    // Further sends are refused without touching the backend again
    assert!(upload.send_part(4, part(4, PART)).await.is_err());
    drop(upload);

    let counts = store.counts();
    assert_eq!(counts.abort, 1);
    assert_eq!(counts.complete, 0);
    assert_eq!(counts.part_puts, 3);
    assert_eq!(store.dangling_uploads(), 0);
}

#[tokio::test]
async fn out_of_order_part_aborts() {
    let store = Arc::new(MemoryStorage::with_bucket(BUCKET));
    let mut upload = begin(&store, 3 * PART).await;

    upload.send_part(1, part(1, PART)).await.unwrap();
    let err = upload.send_part(3, part(3, PART)).await.unwrap_err();
    assert!(err.to_string().contains("out of order"));

    assert_eq!(store.counts().abort, 1);
    assert_eq!(store.dangling_uploads(), 0);
}

#[tokio::test]
async fn completing_with_missing_parts_aborts() {
    let store = Arc::new(MemoryStorage::with_bucket(BUCKET));
    let mut upload = begin(&store, 3 * PART).await;
    upload.send_part(1, part(1, PART)).await.unwrap();

    let err = upload.complete().await.unwrap_err();
    assert!(matches!(err, ProbeError::Storage(_)));

    let counts = store.counts();
    assert_eq!(counts.complete, 0, "complete must not reach the backend");
    assert_eq!(counts.abort, 1);
    assert_eq!(store.dangling_uploads(), 0);
}

#[tokio::test]
async fn backend_complete_failure_aborts() {
    let store = Arc::new(MemoryStorage::with_bucket(BUCKET));
    store.fail_on_complete();
    let mut upload = begin(&store, PART).await;
    upload.send_part(1, part(1, PART)).await.unwrap();

    assert!(upload.complete().await.is_err());
    let counts = store.counts();
    assert_eq!(counts.complete, 1);
    assert_eq!(counts.abort, 1);
    assert_eq!(store.dangling_uploads(), 0);
}

#[tokio::test]
async fn explicit_abort_returns_original_error() {
    let store = Arc::new(MemoryStorage::with_bucket(BUCKET));
    let upload = begin(&store, 2 * PART).await;

    let err = upload.abort(ProbeError::Cancelled).await;
    assert!(matches!(err, ProbeError::Cancelled));
    assert_eq!(store.counts(), CallCounts { init: 1, abort: 1, ..Default::default() });
    assert_eq!(store.dangling_uploads(), 0);
}

#[tokio::test]
async fn dropped_upload_is_aborted_in_background() {
    let store = Arc::new(MemoryStorage::with_bucket(BUCKET));
    let mut upload = begin(&store, 2 * PART).await;
    upload.send_part(1, part(1, PART)).await.unwrap();
    drop(upload);

    // The abort runs on a spawned task
    for _ in 0..50 {
        if store.counts().abort == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.counts().abort, 1);
    assert_eq!(store.counts().complete, 0);
    assert_eq!(store.dangling_uploads(), 0);
}

#[tokio::test]
async fn begin_on_missing_bucket_leaves_nothing() {
    let store = Arc::new(MemoryStorage::new());
    let backend = MemoryStorage::backend(&store);
    let result = MultipartUpload::begin(&backend, "missing", "obj", PART, PART).await;
    assert!(result.is_err());
    assert_eq!(store.counts().abort, 0);
    assert_eq!(store.dangling_uploads(), 0);
}

#[tokio::test]
async fn abort_interrupted_mid_call_is_retried_on_drop() {
    let store = Arc::new(MemoryStorage::with_bucket(BUCKET));
    store.delay_aborts(Duration::from_millis(50));
    let upload = begin(&store, 2 * PART).await;

    // The abort future, and the upload it owns, is dropped while the
    // backend call is still pending
    let interrupted =
        tokio::time::timeout(Duration::from_millis(5), upload.abort(ProbeError::Cancelled)).await;
    assert!(interrupted.is_err());
    assert_eq!(store.counts().abort, 0);

    for _ in 0..50 {
        if store.dangling_uploads() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.counts().abort, 1);
    assert_eq!(store.counts().complete, 0);
    assert_eq!(store.dangling_uploads(), 0);
}
