use super::{Entry, FileContents, FileEntry, SourceError};
use std::path::{Path, PathBuf};

/// A single file, reachable only under its own base name
///
/// Nothing else in the containing directory is visible, and the root has no
/// listing.
#[derive(Debug, Clone)]
pub struct SingleFileSource {
    path: PathBuf,
    name: String,
}

impl SingleFileSource {
    pub fn new(path: &Path) -> Result<Self, SourceError> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| SourceError::invalid_path(path, e))?
                .join(path)
        };

        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| SourceError::invalid_path(&path, "no usable file name"))?
            .to_string();

        Ok(Self { path, name })
    }

    /// Base name the file is published under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute location on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn lookup(&self, segments: &[&str]) -> Result<Entry, SourceError> {
        if segments != [self.name.as_str()] {
            return Err(SourceError::NotFound);
        }

        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(SourceError::from_lookup)?;
        let len = file.metadata().await?.len();

        Ok(Entry::File(FileEntry {
            name: self.name.clone(),
            len,
            contents: FileContents::Disk(file),
        }))
    }
}
