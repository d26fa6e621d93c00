use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use crate::record::UploadRecord;

/// Upload log file name used when the config does not override it.
pub const DEFAULT_LOG_FILE: &str = "update_logs.txt";

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the per-category destination files.
    pub root: PathBuf,
    /// Upload log path; resolved under `root` when relative.
    pub log_file: PathBuf,
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create storage root {path}: {source}")]
    CreateRoot { path: PathBuf, source: io::Error },
    #[error("failed to write destination file {path}: {source}")]
    WriteDestination { path: PathBuf, source: io::Error },
    #[error("failed to append upload log {path}: {source}")]
    AppendLog { path: PathBuf, source: io::Error },
    #[error("failed to read upload log {path}: {source}")]
    ReadLog { path: PathBuf, source: io::Error },
}

/// Resolves the destination file name for an upload.
///
/// The extension is whatever follows the last `.` of the original file name
/// (possibly empty), or `file` when the name carries no `.` at all. Every
/// category uses the same formula; unknown categories are accepted as-is.
pub fn destination_name(category: &str, original_name: &str) -> String {
    let ext = match original_name.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => "file",
    };
    format!("{category}.{ext}")
}

/// Filesystem store for destination files and the append-only upload log.
///
/// Destination writes serialize per resolved path and log appends go through
/// a single lock, so concurrent uploads cannot interleave bytes within one
/// destination file or split a log line.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    log_path: PathBuf,
    dest_locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
    log_lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(&config.root)
            .await
            .map_err(|source| StoreError::CreateRoot {
                path: config.root.clone(),
                source,
            })?;

        let log_path = if config.log_file.is_absolute() {
            config.log_file.clone()
        } else {
            config.root.join(&config.log_file)
        };

        info!(root = %config.root.display(), log = %log_path.display(), "upload store ready");
        Ok(Self {
            root: config.root.clone(),
            log_path,
            dest_locks: Arc::new(Mutex::new(HashMap::new())),
            log_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Writes the full upload body to the category's destination file,
    /// truncating any prior content. Returns the destination file name.
    pub async fn store_upload(
        &self,
        category: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<String, StoreError> {
        let dest_name = destination_name(category, original_name);
        let path = self.root.join(&dest_name);

        let lock = self.dest_lock(&path).await;
        let _held = lock.lock().await;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StoreError::WriteDestination {
                path: path.clone(),
                source,
            })?;

        Ok(dest_name)
    }

    /// Appends one rendered log line. Whole-line appends are guaranteed by
    /// the single log lock, not by OS append atomicity.
    pub async fn append_record(&self, record: &UploadRecord) -> Result<(), StoreError> {
        let line = record.to_log_line();

        let _held = self.log_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await
            .map_err(|source| self.log_error(source))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|source| self.log_error(source))?;
        file.flush().await.map_err(|source| self.log_error(source))?;
        Ok(())
    }

    /// Reads the whole upload log. A missing log is an empty log, not an
    /// error.
    pub async fn read_log(&self) -> Result<String, StoreError> {
        match tokio::fs::read_to_string(&self.log_path).await {
            Ok(text) => Ok(text),
            Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(StoreError::ReadLog {
                path: self.log_path.clone(),
                source,
            }),
        }
    }

    async fn dest_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.dest_locks.lock().await;
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn log_error(&self, source: io::Error) -> StoreError {
        StoreError::AppendLog {
            path: self.log_path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{destination_name, FileStore, StoreConfig};
    use crate::record::UploadRecord;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> FileStore {
        FileStore::open(&StoreConfig::new(dir.path()))
            .await
            .expect("open store")
    }

    #[test]
    fn destination_name_uses_last_extension() {
        assert_eq!(destination_name("earthquake", "a.png"), "earthquake.png");
        assert_eq!(destination_name("landslide", "archive.tar.gz"), "landslide.gz");
    }

    #[test]
    fn destination_name_defaults_to_file_suffix() {
        assert_eq!(destination_name("population", "report"), "population.file");
    }

    #[test]
    fn destination_name_keeps_empty_extension() {
        assert_eq!(destination_name("flooding", "name."), "flooding.");
    }

    #[test]
    fn destination_name_accepts_unknown_categories() {
        assert_eq!(destination_name("wildfire", "map.tif"), "wildfire.tif");
    }

    #[tokio::test]
    async fn store_upload_writes_exact_bytes() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir).await;

        let dest = store
            .store_upload("earthquake", "a.png", b"png-bytes")
            .await
            .expect("store upload");

        assert_eq!(dest, "earthquake.png");
        let written = std::fs::read(dir.path().join("earthquake.png")).expect("read dest");
        assert_eq!(written, b"png-bytes");
    }

    #[tokio::test]
    async fn second_upload_overwrites_destination() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir).await;

        store
            .store_upload("flooding", "old.csv", b"first-and-longer")
            .await
            .expect("first upload");
        store
            .store_upload("flooding", "new.csv", b"short")
            .await
            .expect("second upload");

        // A shorter second payload must not leave a stale tail behind.
        let written = std::fs::read(dir.path().join("flooding.csv")).expect("read dest");
        assert_eq!(written, b"short");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_uploads_to_one_category_never_interleave() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir).await;

        let mut tasks = Vec::new();
        for writer in 0u8..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let payload = vec![b'a' + writer; 32 * 1024];
                store
                    .store_upload("earthquake", "quake.bin", &payload)
                    .await
                    .expect("store upload");
            }));
        }
        for task in tasks {
            task.await.expect("join writer");
        }

        // Whatever write landed last, the file must hold exactly one
        // writer's payload, never a mix.
        let written = std::fs::read(dir.path().join("earthquake.bin")).expect("read dest");
        assert_eq!(written.len(), 32 * 1024);
        let first = written[0];
        assert!((b'a'..b'a' + 8).contains(&first));
        assert!(written.iter().all(|byte| *byte == first));
    }

    #[tokio::test]
    async fn append_record_accumulates_lines_in_order() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir).await;

        let first = UploadRecord::new("ana", "1", "a.png", "earthquake");
        let second = UploadRecord::new("ben", "2", "b.csv", "landslide");
        store.append_record(&first).await.expect("append first");
        store.append_record(&second).await.expect("append second");

        let log = store.read_log().await.expect("read log");
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], first.to_log_line().trim_end());
        assert_eq!(lines[1], second.to_log_line().trim_end());
    }

    #[tokio::test]
    async fn read_log_before_any_upload_is_empty() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir).await;

        let log = store.read_log().await.expect("read log");
        assert_eq!(log, "");
        assert!(!store.log_path().exists());
    }
}
