/// Content sources
///
/// A content source is a read-only mapping from logical paths to bytes.
/// Exactly one of three variants is chosen when a publication starts:
/// - a directory tree, served as-is
/// - the entries of a zip archive
/// - a single file, reachable only under its own name
///
/// Sources are immutable once resolved and are shared between concurrent
/// requests without locking.

mod archive;
mod directory;
mod single;

pub use archive::ArchiveSource;
pub use directory::DirectorySource;
pub use single::SingleFileSource;

use crate::service::escape_filename;
use std::io;
use std::path::Path;
use tracing::debug;

/// A file ready to be sent
#[derive(Debug)]
pub struct FileEntry {
    /// Last path segment, used for content-type detection
    pub name: String,
    pub len: u64,
    pub contents: FileContents,
}

/// Where the bytes of a file come from
#[derive(Debug)]
pub enum FileContents {
    Disk(tokio::fs::File),
    /// Produced on a blocking thread while it is read
    Stream(tokio::io::DuplexStream),
}

/// One line of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Result of a successful lookup
#[derive(Debug)]
pub enum Entry {
    File(FileEntry),
    /// Listing sorted by name
    Directory(Vec<DirEntry>),
}

/// Content source errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("not found")]
    NotFound,

    #[error("{path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("{0}")]
    Archive(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SourceError {
    pub(crate) fn invalid_path(path: &Path, reason: impl ToString) -> Self {
        Self::InvalidPath {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Map filesystem errors so that missing files become `NotFound`
    pub(crate) fn from_lookup(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => Self::NotFound,
            _ => Self::Io(err),
        }
    }

    pub(crate) fn from_join(err: tokio::task::JoinError) -> Self {
        Self::Io(io::Error::new(io::ErrorKind::Other, err))
    }
}

/// The content being published
#[derive(Debug)]
pub enum ContentSource {
    Directory(DirectorySource),
    Archive(ArchiveSource),
    SingleFile(SingleFileSource),
}

impl ContentSource {
    /// Resolve `path` into a content source
    ///
    /// With `archive` set the path must be a readable zip archive. Otherwise a
    /// directory is served as a tree and a regular file is served alone.
    pub async fn resolve(path: &Path, archive: bool) -> Result<Self, SourceError> {
        if archive {
            let path = path.to_path_buf();
            let source = tokio::task::spawn_blocking(move || ArchiveSource::open(&path))
                .await
                .map_err(SourceError::from_join)??;
            debug!("Serving {} archive entries", source.len());
            return Ok(Self::Archive(source));
        }

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| SourceError::invalid_path(path, e))?;

        if metadata.is_dir() {
            Ok(Self::Directory(DirectorySource::new(path).await?))
        } else if metadata.is_file() {
            Ok(Self::SingleFile(SingleFileSource::new(path)?))
        } else {
            Err(SourceError::invalid_path(
                path,
                "not a regular file or directory",
            ))
        }
    }

    /// Look up a decoded logical path such as `/docs/readme.txt`
    pub async fn lookup(&self, path: &str) -> Result<Entry, SourceError> {
        let segments = normalize(path).ok_or(SourceError::NotFound)?;
        match self {
            Self::Directory(source) => source.lookup(&segments).await,
            Self::Archive(source) => source.lookup(&segments).await,
            Self::SingleFile(source) => source.lookup(&segments).await,
        }
    }

    /// Path component of the published address (escaped file name for a
    /// single file, empty otherwise)
    pub fn published_path(&self) -> String {
        match self {
            Self::SingleFile(source) => escape_filename(source.name()),
            _ => String::new(),
        }
    }

    /// Whether directory listings may be generated
    pub fn allows_listing(&self) -> bool {
        !matches!(self, Self::SingleFile(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Directory(_) => "directory",
            Self::Archive(_) => "archive",
            Self::SingleFile(_) => "file",
        }
    }
}

/// Split a logical path into segments, resolving `.` and `..` without ever
/// climbing above the root. Returns `None` for segments that could be
/// interpreted as separators or terminators by the filesystem.
pub(crate) fn normalize(path: &str) -> Option<Vec<&str>> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s if s.contains(['\\', '\0']) => return None,
            s => segments.push(s),
        }
    }
    Some(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_paths() {
        assert_eq!(normalize("/").unwrap(), Vec::<&str>::new());
        assert_eq!(normalize("/a/b/").unwrap(), vec!["a", "b"]);
        assert_eq!(normalize("/a/./b//c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(normalize("/a/../b").unwrap(), vec!["b"]);
    }

    #[test]
    fn test_normalize_never_escapes_root() {
        assert_eq!(normalize("/../../etc/passwd").unwrap(), vec!["etc", "passwd"]);
        assert!(normalize("/a\\..\\b").is_none());
        assert!(normalize("/a\0b").is_none());
    }

    #[tokio::test]
    async fn test_resolve_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();

        let source = ContentSource::resolve(dir.path(), false).await.unwrap();
        assert_eq!(source.kind(), "directory");
        assert!(source.allows_listing());
        assert_eq!(source.published_path(), "");
    }

    #[tokio::test]
    async fn test_resolve_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("my report.pdf");
        std::fs::write(&file, b"%PDF").unwrap();

        let source = ContentSource::resolve(&file, false).await.unwrap();
        assert_eq!(source.kind(), "file");
        assert!(!source.allows_listing());
        assert_eq!(source.published_path(), "my%20report.pdf");
    }

    #[tokio::test]
    async fn test_resolve_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = ContentSource::resolve(&dir.path().join("missing"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn test_resolve_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.zip");
        std::fs::write(&file, b"this is not a zip archive").unwrap();

        let err = ContentSource::resolve(&file, true).await.unwrap_err();
        assert!(matches!(err, SourceError::Archive(_)));
    }
}
