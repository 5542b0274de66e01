use async_trait::async_trait;
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Public URL prefix under which the upload root is served.
pub const UPLOAD_URL_PREFIX: &str = "/static/uploads";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Uploaded file '{0}' is empty")]
    EmptyFile(String),
    #[error("Failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// StoredFile
///
/// Where an upload ended up and what the form metadata fields need to know about it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub url: String,
    pub size_bytes: u64,
    /// Lower-case extension of the original name, without the dot.
    pub extension: Option<String>,
}

impl StoredFile {
    /// Human-readable size, e.g. `0.25 MB`.
    pub fn display_size(&self) -> String {
        format!("{:.2} MB", self.size_bytes as f64 / (1024.0 * 1024.0))
    }

    /// Upper-case extension, defaulting to `PDF` when the name had none.
    pub fn file_type(&self) -> String {
        self.extension
            .as_deref()
            .map(str::to_uppercase)
            .unwrap_or_else(|| "PDF".to_string())
    }
}

// 1. StorageService Contract
/// StorageService
///
/// Defines the contract for persisting uploaded files. Handlers only ever see this
/// trait, so tests swap in [`MockStorageService`] without touching the filesystem.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the given sub-folders of the upload root if they are missing.
    async fn ensure_folders(&self, folders: &[&str]) -> Result<(), StorageError>;

    /// Writes `bytes` under `folder` and returns the public URL.
    ///
    /// The stored name is the sanitized original prefixed with a random UUID, so two
    /// uploads of the same name never overwrite each other.
    async fn save(
        &self,
        folder: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, StorageError>;

    /// Deletes a file previously returned by [`StorageService::save`]. Removing a
    /// file that is already gone is not an error.
    async fn remove(&self, url: &str) -> Result<(), StorageError>;
}

// 2. The Real Implementation (Local Disk)
/// LocalStorage
///
/// Stores uploads beneath a root directory that the router also serves statically.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StorageService for LocalStorage {
    async fn ensure_folders(&self, folders: &[&str]) -> Result<(), StorageError> {
        for folder in folders {
            tokio::fs::create_dir_all(self.root.join(sanitize_filename(folder))).await?;
        }
        Ok(())
    }

    async fn save(
        &self,
        folder: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::EmptyFile(original_name.to_string()));
        }

        let folder = sanitize_filename(folder);
        let stored_name = stored_name(original_name);
        let dir = self.root.join(&folder);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&stored_name), bytes).await?;

        tracing::debug!(folder = %folder, file = %stored_name, bytes = bytes.len(), "upload stored");

        Ok(StoredFile {
            url: format!("{UPLOAD_URL_PREFIX}/{folder}/{stored_name}"),
            size_bytes: bytes.len() as u64,
            extension: extension_of(original_name),
        })
    }

    async fn remove(&self, url: &str) -> Result<(), StorageError> {
        // URLs outside the upload prefix were never stored here.
        let Some(relative) = url.strip_prefix(UPLOAD_URL_PREFIX) else {
            return Ok(());
        };
        let path = relative
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(sanitize_filename)
            .fold(self.root.clone(), |path, segment| path.join(segment));

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "upload removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// sanitize_filename
///
/// Reduces a client-supplied name to a safe single path segment: ASCII letters,
/// digits, `.`, `-`, and `_` survive, whitespace becomes `_`, everything else is
/// dropped. Leading dots and underscores are stripped so `..` can never survive.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let trimmed = cleaned.trim_start_matches(['.', '_']);
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

fn stored_name(original_name: &str) -> String {
    format!("{}_{}", Uuid::new_v4().simple(), sanitize_filename(original_name))
}

fn extension_of(name: &str) -> Option<String> {
    let sanitized = sanitize_filename(name);
    sanitized
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

// 3. The Mock Implementation (For Tests)
/// MockStorageService
///
/// Records uploads in memory instead of writing them. `new_failing` simulates a
/// storage outage on every save.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
    saved: Arc<Mutex<Vec<String>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// URLs of every file saved so far.
    pub async fn saved(&self) -> Vec<String> {
        self.saved.lock().await.clone()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_folders(&self, _folders: &[&str]) -> Result<(), StorageError> {
        Ok(())
    }

    async fn save(
        &self,
        folder: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, StorageError> {
        if self.should_fail {
            return Err(StorageError::Io(std::io::Error::other(
                "Mock Storage Error: Simulation requested",
            )));
        }
        if bytes.is_empty() {
            return Err(StorageError::EmptyFile(original_name.to_string()));
        }

        let url = format!(
            "{UPLOAD_URL_PREFIX}/{}/{}",
            sanitize_filename(folder),
            stored_name(original_name)
        );
        self.saved.lock().await.push(url.clone());

        Ok(StoredFile {
            url,
            size_bytes: bytes.len() as u64,
            extension: extension_of(original_name),
        })
    }

    async fn remove(&self, url: &str) -> Result<(), StorageError> {
        self.saved.lock().await.retain(|saved| saved != url);
        Ok(())
    }
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;
