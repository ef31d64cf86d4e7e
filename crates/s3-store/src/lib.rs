//! StockFlow cold-store infrastructure adapters.
//!
//! Implements [`pipeline::ColdStoreReader`] and [`pipeline::ColdStoreWriter`]
//! with two backends:
//!
//! - [`S3ObjectStore`] — AWS S3 or an S3-compatible service (LocalStack,
//!   MinIO) via `aws-sdk-s3`.
//! - [`LocalObjectStore`] — a directory on the local filesystem, for runs
//!   without any object storage service.
//!
//! Both read input blobs as header-less CSV and store aggregates as JSON (see
//! [`codec`]).
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** SDK configuration, transport errors and blob encodings
//! live here. The [`pipeline`] crate sees only the port traits and
//! [`pipeline::ResourceError`].

pub mod codec;
mod error;
mod local;
mod s3;

pub use error::ObjectStoreError;
pub use local::LocalObjectStore;
pub use s3::{S3Config, S3ObjectStore};
