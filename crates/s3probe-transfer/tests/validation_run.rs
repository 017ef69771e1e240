//! End-to-end validation runs against the in-memory backend

use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

use s3probe_core::{ErrorClass, ProbeError, MIB};
use s3probe_crypto::encrypted_size;
use s3probe_storage::MemoryStorage;
use s3probe_transfer::{
    download_and_verify, run_validation, upload_file, PhaseTelemetry, ProgressFn, UploadRequest,
    ValidationOptions,
};

const BUCKET: &str = "probe";

fn input_file(len: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    let data: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
    file.write_all(&data).unwrap();
    file.flush().unwrap();
    file
}

fn options(file: &NamedTempFile) -> ValidationOptions {
    ValidationOptions {
        input: file.path().to_path_buf(),
        bucket: BUCKET.to_string(),
        object_prefix: "validation/".to_string(),
        part_size_mib: 5,
        create_bucket: false,
        delete_after: false,
    }
}

#[tokio::test]
async fn full_run_succeeds_and_leaves_no_uploads() {
    let len = 12 * MIB as usize + 7;
    let file = input_file(len);
    let store = Arc::new(MemoryStorage::with_bucket(BUCKET));
    let backend = MemoryStorage::backend(&store);

    let summary = run_validation(&backend, &options(&file), &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(summary.plaintext_size, len as u64);
    assert_eq!(summary.encrypted_size, encrypted_size(len as u64));
    assert_eq!(summary.part_size_mib, 5);
    assert_eq!(summary.part_count, 3);
    assert_eq!(summary.dangling_uploads, 0);
    assert!(summary.file_id.starts_with("validation/"));
    assert_eq!(summary.upload.unwrap().parts, 3);
    assert_eq!(summary.download.unwrap().parts, 3);

    let counts = store.counts();
    assert_eq!(counts.init, 1);
    assert_eq!(counts.complete, 1);
    assert_eq!(counts.abort, 0);
    assert_eq!(counts.range_gets, 3);
    assert_eq!(
        store.object(BUCKET, &summary.file_id).unwrap().len() as u64,
        summary.encrypted_size
    );
}

#[tokio::test]
async fn fifty_mib_in_sixteen_mib_parts_round_trips() {
    let len = 50 * MIB as usize;
    let file = input_file(len);
    let store = Arc::new(MemoryStorage::with_bucket(BUCKET));
    let backend = MemoryStorage::backend(&store);
    let cancel = CancellationToken::new();

    let request = UploadRequest::new(file.path(), BUCKET, "fifty", 16 * MIB);
    let mut upload_telemetry = PhaseTelemetry::default();
    let uploaded = upload_file(&backend, &request, &mut upload_telemetry, &cancel, None)
        .await
        .unwrap();
    assert_eq!(uploaded.part_count, 4);

    let mut download_telemetry = PhaseTelemetry::default();
    let downloaded = download_and_verify(&backend, &uploaded, &mut download_telemetry, &cancel, None)
        .await
        .unwrap();

    assert_eq!(downloaded.checksums, uploaded.checksums);
    assert_eq!(downloaded.plaintext_size, len as u64);
    assert_eq!(upload_telemetry.samples().len(), 4);
    assert_eq!(download_telemetry.samples().len(), 4);

    let counts = store.counts();
    assert_eq!(counts.init, 1);
    assert_eq!(counts.part_puts, 4);
    assert_eq!(counts.complete, 1);
    assert_eq!(counts.abort, 0);
    assert_eq!(counts.range_gets, 4);
    assert_eq!(store.dangling_uploads(), 0);
}

#[tokio::test]
async fn fifty_mib_validation_run_leaves_no_dangling_uploads() {
    let file = input_file(50 * MIB as usize);
    let store = Arc::new(MemoryStorage::with_bucket(BUCKET));
    let backend = MemoryStorage::backend(&store);
    let opts = ValidationOptions {
        part_size_mib: 16,
        ..options(&file)
    };

    let summary = run_validation(&backend, &opts, &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(summary.part_size_mib, 16);
    assert_eq!(summary.part_count, 4);
    assert_eq!(summary.dangling_uploads, 0);
    assert_eq!(store.dangling_uploads(), 0);
}

#[tokio::test]
async fn run_creates_bucket_and_deletes_object() {
    let file = input_file(1000);
    let store = Arc::new(MemoryStorage::new());
    let backend = MemoryStorage::backend(&store);
    let opts = ValidationOptions {
        create_bucket: true,
        delete_after: true,
        ..options(&file)
    };

    let summary = run_validation(&backend, &opts, &CancellationToken::new(), None)
        .await
        .unwrap();

    assert!(summary.object_deleted);
    assert!(store.object(BUCKET, &summary.file_id).is_none());
    assert_eq!(summary.part_count, 1);
}

#[tokio::test]
async fn empty_input_is_rejected_before_any_transfer() {
    let file = input_file(0);
    let store = Arc::new(MemoryStorage::with_bucket(BUCKET));
    let backend = MemoryStorage::backend(&store);

    let err = run_validation(&backend, &options(&file), &CancellationToken::new(), None)
        .await
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::Config);
    assert_eq!(store.counts().init, 0);
}

#[tokio::test]
async fn corrupted_object_fails_integrity_check() {
    let len = 6 * MIB as usize;
    let file = input_file(len);
    let store = Arc::new(MemoryStorage::with_bucket(BUCKET));
    let backend = MemoryStorage::backend(&store);
    let cancel = CancellationToken::new();

    let request = UploadRequest::new(file.path(), BUCKET, "corrupt-me", 5 * MIB);
    let mut upload_telemetry = PhaseTelemetry::default();
    let uploaded = upload_file(&backend, &request, &mut upload_telemetry, &cancel, None)
        .await
        .unwrap();

    // Somewhere inside the second part
    store
        .corrupt_object(BUCKET, "corrupt-me", 5 * MIB as usize + 100)
        .unwrap();

    let mut download_telemetry = PhaseTelemetry::default();
    let err = download_and_verify(&backend, &uploaded, &mut download_telemetry, &cancel, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ProbeError::Decryption(_)), "got {err}");
    assert_eq!(err.class(), ErrorClass::Integrity);
}

#[tokio::test]
async fn transport_failure_aborts_the_upload() {
    let file = input_file(11 * MIB as usize);
    let store = Arc::new(MemoryStorage::with_bucket(BUCKET));
    store.fail_on_part(2);
    let backend = MemoryStorage::backend(&store);

    let err = run_validation(&backend, &options(&file), &CancellationToken::new(), None)
        .await
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::Io);
    let counts = store.counts();
    assert_eq!(counts.abort, 1);
    assert_eq!(counts.complete, 0);
    assert_eq!(store.dangling_uploads(), 0);
}

#[tokio::test]
async fn cancellation_mid_upload_aborts_once_and_never_completes() {
    let file = input_file(11 * MIB as usize);
    let store = Arc::new(MemoryStorage::with_bucket(BUCKET));
    let backend = MemoryStorage::backend(&store);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let progress: ProgressFn = Box::new(move |_, _, _| trigger.cancel());

    let err = run_validation(&backend, &options(&file), &cancel, Some(&progress))
        .await
        .unwrap_err();

    assert!(matches!(err, ProbeError::Cancelled));
    let counts = store.counts();
    assert_eq!(counts.init, 1);
    assert_eq!(counts.part_puts, 1);
    assert_eq!(counts.abort, 1);
    assert_eq!(counts.complete, 0);
    assert_eq!(store.dangling_uploads(), 0);
}

#[tokio::test]
async fn cancelled_before_start_touches_nothing() {
    let file = input_file(1000);
    let store = Arc::new(MemoryStorage::with_bucket(BUCKET));
    let backend = MemoryStorage::backend(&store);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = run_validation(&backend, &options(&file), &cancel, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ProbeError::Cancelled));
    assert_eq!(store.counts().init, 0);
}
