pub mod record;
pub mod store;

pub use record::{UploadRecord, LOG_TIMESTAMP_FORMAT};
pub use store::{destination_name, FileStore, StoreConfig, StoreError, DEFAULT_LOG_FILE};
