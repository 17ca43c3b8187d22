use super::{DirEntry, Entry, FileContents, FileEntry, SourceError};
use std::path::{Path, PathBuf};

/// A directory tree served verbatim
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub async fn new(root: &Path) -> Result<Self, SourceError> {
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| SourceError::invalid_path(root, e))?;
        Ok(Self { root })
    }

    pub(crate) async fn lookup(&self, segments: &[&str]) -> Result<Entry, SourceError> {
        let mut path = self.root.clone();
        path.extend(segments);

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(SourceError::from_lookup)?;

        if metadata.is_dir() {
            return Ok(Entry::Directory(read_listing(&path).await?));
        }

        let file = tokio::fs::File::open(&path)
            .await
            .map_err(SourceError::from_lookup)?;
        let name = segments.last().copied().unwrap_or_default().to_string();

        Ok(Entry::File(FileEntry {
            name,
            len: metadata.len(),
            contents: FileContents::Disk(file),
        }))
    }
}

async fn read_listing(path: &Path) -> Result<Vec<DirEntry>, SourceError> {
    let mut reader = tokio::fs::read_dir(path)
        .await
        .map_err(SourceError::from_lookup)?;

    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        entries.push(DirEntry { name, is_dir });
    }

    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn fixture() -> (tempfile::TempDir, DirectorySource) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs").join("guide.txt"), "read me").unwrap();
        let source = DirectorySource::new(dir.path()).await.unwrap();
        (dir, source)
    }

    #[tokio::test]
    async fn test_lookup_nested_file() {
        let (_dir, source) = fixture().await;

        let Entry::File(mut entry) = source.lookup(&["docs", "guide.txt"]).await.unwrap() else {
            panic!("expected a file");
        };
        assert_eq!(entry.name, "guide.txt");
        assert_eq!(entry.len, 7);

        let FileContents::Disk(ref mut file) = entry.contents else {
            panic!("expected disk contents");
        };
        let mut body = String::new();
        file.read_to_string(&mut body).await.unwrap();
        assert_eq!(body, "read me");
    }

    #[tokio::test]
    async fn test_lookup_root_lists_entries() {
        let (_dir, source) = fixture().await;

        let Entry::Directory(listing) = source.lookup(&[]).await.unwrap() else {
            panic!("expected a listing");
        };
        assert_eq!(
            listing,
            vec![
                DirEntry {
                    name: "docs".to_string(),
                    is_dir: true
                },
                DirEntry {
                    name: "index.html".to_string(),
                    is_dir: false
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_lookup_missing_is_not_found() {
        let (_dir, source) = fixture().await;
        assert!(matches!(
            source.lookup(&["nope.txt"]).await,
            Err(SourceError::NotFound)
        ));
    }
}
