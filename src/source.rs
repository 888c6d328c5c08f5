// File handles handed to the core by whatever captures user input
// (file picker, drag-drop, command line).

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{AppError, AppResult};

/// Shared handle to a user-selected file. The core never copies or mutates it.
pub type RawHandle = Arc<dyn RawFile>;

/// File bytes ready to be streamed into a request body
pub enum FileContent {
    Bytes(Vec<u8>),
    Stream(tokio::fs::File),
}

impl fmt::Debug for FileContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileContent::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            FileContent::Stream(_) => write!(f, "Stream"),
        }
    }
}

#[async_trait]
pub trait RawFile: Send + Sync + fmt::Debug {
    /// Declared file name, including extension
    fn name(&self) -> &str;

    /// Declared size in bytes
    fn size(&self) -> u64;

    /// Declared media type. Empty when the source could not determine one.
    fn media_type(&self) -> &str;

    /// Open the content for streaming. Called once per upload attempt.
    async fn open(&self) -> AppResult<FileContent>;
}

/// A file on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    name: String,
    size: u64,
    media_type: String,
}

impl LocalFile {
    pub async fn from_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;

        if !metadata.is_file() {
            return Err(AppError::validation(
                "path",
                &format!("{} is not a regular file", path.display()),
            ));
        }

        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let media_type = mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
            media_type,
        })
    }

    /// Resolve a batch of paths, skipping any that cannot be read as files
    pub async fn from_paths(paths: &[PathBuf]) -> Vec<RawHandle> {
        let mut handles: Vec<RawHandle> = Vec::with_capacity(paths.len());
        for path in paths {
            match Self::from_path(path).await {
                Ok(file) => handles.push(Arc::new(file)),
                Err(e) => log::warn!("Skipping {}: {}", path.display(), e),
            }
        }
        handles
    }
}

#[async_trait]
impl RawFile for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn media_type(&self) -> &str {
        &self.media_type
    }

    async fn open(&self) -> AppResult<FileContent> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(FileContent::Stream(file))
    }
}

/// A file whose bytes are already in memory, such as a dropped payload
#[derive(Debug, Clone)]
pub struct InMemoryFile {
    name: String,
    media_type: String,
    bytes: Vec<u8>,
}

impl InMemoryFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn handle(self) -> RawHandle {
        Arc::new(self)
    }
}

#[async_trait]
impl RawFile for InMemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn media_type(&self) -> &str {
        &self.media_type
    }

    async fn open(&self) -> AppResult<FileContent> {
        Ok(FileContent::Bytes(self.bytes.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_local_file_reads_metadata_and_guesses_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"a,b\n1,2\n").unwrap();

        let local = LocalFile::from_path(&path).await.unwrap();
        assert_eq!(local.name(), "ledger.csv");
        assert_eq!(local.size(), 8);
        assert_eq!(local.media_type(), "text/csv");
        assert!(matches!(local.open().await.unwrap(), FileContent::Stream(_)));
    }

    #[tokio::test]
    async fn test_unknown_extension_has_empty_media_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.zzunknown");
        std::fs::write(&path, b"x").unwrap();

        let local = LocalFile::from_path(&path).await.unwrap();
        assert_eq!(local.media_type(), "");
    }

    #[tokio::test]
    async fn test_from_paths_skips_missing_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        std::fs::write(&present, b"hello").unwrap();

        let handles = LocalFile::from_paths(&[
            present,
            dir.path().join("missing.txt"),
            dir.path().to_path_buf(),
        ])
        .await;

        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].name(), "present.txt");
    }

    #[tokio::test]
    async fn test_in_memory_file_size_matches_bytes() {
        let file = InMemoryFile::new("a.txt", "text/plain", b"abc".to_vec());
        assert_eq!(file.size(), 3);
        match file.open().await.unwrap() {
            FileContent::Bytes(bytes) => assert_eq!(bytes, b"abc"),
            other => panic!("unexpected content {:?}", other),
        }
    }
}
