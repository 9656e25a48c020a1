// Library exports for binaries and integration tests
pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod extractor;
pub mod locale;
pub mod merge;
pub mod properties;
pub mod remote;
pub mod retry;
pub mod submit;
pub mod sync;

pub use entry::{is_namespaced_key, Entry, Origin};
pub use error::{SyncError, SyncResult};
pub use merge::MergeResult;
