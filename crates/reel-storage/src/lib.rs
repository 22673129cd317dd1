//! Storage abstraction over the local filesystem and S3-compatible object
//! stores.
//!
//! Both backends operate on the same logical, relative, POSIX-separated paths
//! produced by the [`paths`] module; only the resolution to bytes differs.
//! Backend-specific separators or absolute prefixes never leak to callers.

pub mod factory;
pub mod local;
pub mod object;
pub mod paths;
pub mod traits;

pub use factory::create_storage;
pub use local::LocalStorage;
pub use object::ObjectStorage;
pub use traits::{ByteStream, Storage, StorageError, StorageResult};
