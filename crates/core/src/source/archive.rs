use super::{DirEntry, Entry, FileContents, FileEntry, SourceError};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use zip::ZipArchive;

/// Bytes buffered between the archive reader and the response
const STREAM_BUFFER: usize = 64 * 1024;

/// Size of each read from a compressed entry
const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveNode {
    Dir,
    File { index: usize, size: u64 },
}

/// The entries of a zip archive, served under their relative paths
///
/// The central directory is indexed once. Every read reopens the archive on
/// a blocking thread and streams the entry through a bounded pipe, so
/// concurrent requests share nothing mutable and never hold a whole entry.
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    archive: PathBuf,
    nodes: BTreeMap<String, ArchiveNode>,
}

impl ArchiveSource {
    /// Open and index an archive (blocking)
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|e| SourceError::Archive(e.to_string()))?;
        let mut zip = ZipArchive::new(file).map_err(|e| SourceError::Archive(e.to_string()))?;

        let mut nodes = BTreeMap::new();
        for index in 0..zip.len() {
            let entry = zip
                .by_index_raw(index)
                .map_err(|e| SourceError::Archive(e.to_string()))?;

            let Some(key) = entry.enclosed_name().as_deref().and_then(entry_key) else {
                warn!("Skipping archive entry with unsafe name: {:?}", entry.name());
                continue;
            };

            add_parents(&mut nodes, &key);
            if entry.is_dir() {
                nodes.insert(key, ArchiveNode::Dir);
            } else {
                nodes.insert(
                    key,
                    ArchiveNode::File {
                        index,
                        size: entry.size(),
                    },
                );
            }
        }

        Ok(Self {
            archive: path.to_path_buf(),
            nodes,
        })
    }

    /// Number of indexed files and directories
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) async fn lookup(&self, segments: &[&str]) -> Result<Entry, SourceError> {
        let key = segments.join("/");
        if key.is_empty() {
            return Ok(Entry::Directory(self.listing("")));
        }

        match self.nodes.get(&key) {
            None => Err(SourceError::NotFound),
            Some(ArchiveNode::Dir) => Ok(Entry::Directory(self.listing(&key))),
            Some(&ArchiveNode::File { index, size }) => {
                let (reader, writer) = tokio::io::duplex(STREAM_BUFFER);
                let (opened_tx, opened_rx) = oneshot::channel();
                let archive = self.archive.clone();
                let runtime = Handle::current();

                tokio::task::spawn_blocking(move || {
                    stream_entry(&archive, index, writer, opened_tx, &runtime)
                });
                opened_rx
                    .await
                    .map_err(|_| SourceError::Archive("archive reader stopped".to_string()))??;

                Ok(Entry::File(FileEntry {
                    name: segments.last().copied().unwrap_or_default().to_string(),
                    len: size,
                    contents: FileContents::Stream(reader),
                }))
            }
        }
    }

    fn listing(&self, dir: &str) -> Vec<DirEntry> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };

        self.nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, node)| {
                let name = &key[prefix.len()..];
                (!name.is_empty() && !name.contains('/')).then(|| DirEntry {
                    name: name.to_string(),
                    is_dir: *node == ArchiveNode::Dir,
                })
            })
            .collect()
    }
}

/// Turn a sanitized entry path into a `/`-joined key
fn entry_key(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn add_parents(nodes: &mut BTreeMap<String, ArchiveNode>, key: &str) {
    let mut end = 0;
    while let Some(pos) = key[end..].find('/') {
        end += pos;
        nodes
            .entry(key[..end].to_string())
            .or_insert(ArchiveNode::Dir);
        end += 1;
    }
}

/// Open entry `index` and copy it into `writer` chunk by chunk. Whether the
/// entry could be opened is reported through `opened` before any byte is
/// written; later read errors truncate the stream.
fn stream_entry(
    archive: &Path,
    index: usize,
    mut writer: DuplexStream,
    opened: oneshot::Sender<Result<(), SourceError>>,
    runtime: &Handle,
) {
    let mut zip = match File::open(archive)
        .map_err(SourceError::from)
        .and_then(|file| ZipArchive::new(file).map_err(|e| SourceError::Archive(e.to_string())))
    {
        Ok(zip) => zip,
        Err(err) => {
            let _ = opened.send(Err(err));
            return;
        }
    };
    let mut entry = match zip.by_index(index) {
        Ok(entry) => entry,
        Err(err) => {
            let _ = opened.send(Err(SourceError::Archive(err.to_string())));
            return;
        }
    };
    if opened.send(Ok(())).is_err() {
        return;
    }

    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = match entry.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!("Failed to read archive entry {}: {}", index, err);
                break;
            }
        };
        if runtime.block_on(writer.write_all(&chunk[..n])).is_err() {
            debug!("Archive entry {} no longer wanted", index);
            break;
        }
    }
}
