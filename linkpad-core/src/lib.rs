pub mod error;
pub mod types;
pub mod config;
pub mod backend;
pub mod memory;
pub mod codegen;
pub mod cache;
pub mod payload;
pub mod metadata;
pub mod allocator;
pub mod service;

pub use error::{Error, Result};
pub use types::*;
pub use allocator::{AllocationPolicy, Allocator, Content, NewRecord};
pub use backend::{BackendError, BackendResult, BlobBackend, BlobErrorKind, MetadataBackend};
pub use cache::{CacheStats, RecordCache};
pub use codegen::{is_valid_code, CodeGenerator, ReservedCodes};
pub use config::StoreConfig;
pub use metadata::MetadataStore;
pub use payload::{blob_key, PayloadStore, Placement};
pub use service::Linkpad;
