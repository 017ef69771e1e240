//! s3probe-storage: object storage backends for the validation pipeline
//!
//! - `backend`: the `ObjectStorage` / `Transport` seams and the `Backend` pair
//! - `s3`: S3-compatible backend speaking the multipart API through SigV4
//!   presigned URLs, plus the reqwest transport
//! - `memory`: in-process backend for tests and dry runs
//! - `multipart`: the multipart upload transaction guard
//! - `operator`: OpenDAL operator for stat/delete/health

pub mod backend;
pub mod health;
pub mod memory;
pub mod multipart;
pub mod operator;
pub mod presign;
pub mod s3;
pub mod xml;

pub use backend::{verify_part_layout, Backend, ObjectStorage, PartInfo, PendingUpload, Transport};
pub use health::check_health;
pub use memory::{CallCounts, MemoryStorage};
pub use multipart::MultipartUpload;
pub use operator::build_operator;
pub use presign::Presigner;
pub use s3::{HttpTransport, S3Storage};
