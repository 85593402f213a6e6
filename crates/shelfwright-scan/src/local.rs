//! Local filesystem backend.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use compact_str::CompactString;

use shelfwright_core::{BackendError, SourceLocation};

use crate::backend::{EntryError, ListTarget, RawEntry, RawEntryKind, StorageBackend};

/// Storage backend over a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a backend rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    fn expect_local<'a>(&self, location: &'a SourceLocation) -> Result<&'a Path, BackendError> {
        location
            .as_local_path()
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                BackendError::Provider("local backend cannot address cloud locations".to_string())
            })
    }
}

impl StorageBackend for LocalBackend {
    fn root(&self) -> ListTarget {
        ListTarget::Local {
            path: self.root.clone(),
        }
    }

    fn list_dir(
        &self,
        target: &ListTarget,
    ) -> Result<Vec<Result<RawEntry, EntryError>>, BackendError> {
        let ListTarget::Local { path } = target else {
            return Err(BackendError::Provider(
                "local backend cannot list cloud folders".to_string(),
            ));
        };

        let read_dir = fs::read_dir(path).map_err(|e| BackendError::io(path, e))?;

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = match dir_entry {
                Ok(e) => e,
                Err(e) => {
                    entries.push(Err(EntryError {
                        name: path.display().to_string(),
                        message: e.to_string(),
                    }));
                    continue;
                }
            };

            let name = CompactString::new(dir_entry.file_name().to_string_lossy());
            let entry_path = dir_entry.path();

            // symlink_metadata so links are not followed out of the source
            let metadata = match fs::symlink_metadata(&entry_path) {
                Ok(m) => m,
                Err(e) => {
                    entries.push(Err(EntryError {
                        name: name.to_string(),
                        message: e.to_string(),
                    }));
                    continue;
                }
            };

            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

            if metadata.is_dir() {
                entries.push(Ok(RawEntry {
                    name,
                    size: 0,
                    modified,
                    kind: RawEntryKind::Dir {
                        target: ListTarget::Local { path: entry_path },
                    },
                }));
            } else if metadata.is_file() {
                entries.push(Ok(RawEntry {
                    name,
                    size: metadata.len(),
                    modified,
                    kind: RawEntryKind::File {
                        location: SourceLocation::Local { path: entry_path },
                    },
                }));
            }
            // Symlinks and special files are not sortable content; skip them.
        }

        Ok(entries)
    }

    fn open(&self, location: &SourceLocation) -> Result<Box<dyn Read + Send>, BackendError> {
        let path = self.expect_local(location)?;
        let file = fs::File::open(path).map_err(|e| BackendError::io(path, e))?;
        Ok(Box::new(file))
    }

    fn relocate(&self, location: &SourceLocation, dest: &Path) -> Result<(), BackendError> {
        let source = self.expect_local(location)?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| BackendError::io(parent, e))?;
        }
        if dest.exists() {
            return Err(BackendError::AlreadyExists {
                path: dest.to_path_buf(),
            });
        }

        // Fast path: same-filesystem rename.
        if fs::rename(source, dest).is_ok() {
            return Ok(());
        }

        // Cross-filesystem: stage into a hidden sibling, then rename so the
        // destination name only ever appears fully materialized.
        let staging = staging_path(dest);
        let copied = fs::copy(source, &staging).map_err(|e| BackendError::io(source, e));
        if let Err(e) = copied {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }
        if let Err(e) = fs::rename(&staging, dest) {
            let _ = fs::remove_file(&staging);
            return Err(BackendError::io(dest, e));
        }
        fs::remove_file(source).map_err(|e| BackendError::io(source, e))
    }

    fn remove(&self, location: &SourceLocation) -> Result<(), BackendError> {
        let path = self.expect_local(location)?;
        fs::remove_file(path).map_err(|e| BackendError::io(path, e))
    }
}

/// Hidden sibling used to stage cross-filesystem copies.
fn staging_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "staged".to_string());
    dest.with_file_name(format!(".{name}.partial"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry_names(entries: &[Result<RawEntry, EntryError>]) -> Vec<String> {
        let mut names: Vec<String> = entries
            .iter()
            .filter_map(|e| e.as_ref().ok())
            .map(|e| e.name.to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_list_dir_files_and_dirs() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "hello").unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();

        let backend = LocalBackend::new(temp.path());
        let entries = backend.list_dir(&backend.root()).unwrap();
        assert_eq!(entry_names(&entries), vec!["a.txt", "sub"]);

        let file = entries
            .iter()
            .filter_map(|e| e.as_ref().ok())
            .find(|e| e.name == "a.txt")
            .unwrap();
        assert_eq!(file.size, 5);
        assert!(matches!(file.kind, RawEntryKind::File { .. }));
    }

    #[test]
    fn test_relocate_creates_parents_and_moves() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.txt");
        fs::write(&src, "content").unwrap();

        let backend = LocalBackend::new(temp.path());
        let dest = temp.path().join("out/deep/a.txt");
        backend
            .relocate(&SourceLocation::local(&src), &dest)
            .unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "content");
    }

    #[test]
    fn test_relocate_never_overwrites() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.txt");
        let dest = temp.path().join("out/a.txt");
        fs::write(&src, "new").unwrap();
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, "old").unwrap();

        let backend = LocalBackend::new(temp.path());
        let err = backend
            .relocate(&SourceLocation::local(&src), &dest)
            .unwrap_err();
        assert!(matches!(err, BackendError::AlreadyExists { .. }));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "old");
        assert!(src.exists());
    }

    #[test]
    fn test_open_and_remove() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.txt");
        fs::write(&src, "bytes").unwrap();

        let backend = LocalBackend::new(temp.path());
        let location = SourceLocation::local(&src);

        let mut content = String::new();
        backend
            .open(&location)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "bytes");

        backend.remove(&location).unwrap();
        assert!(!src.exists());
    }

    #[test]
    fn test_cloud_location_rejected() {
        let temp = TempDir::new().unwrap();
        let backend = LocalBackend::new(temp.path());
        let err = backend
            .open(&SourceLocation::cloud("gdrive", "id-1"))
            .err()
            .unwrap();
        assert!(matches!(err, BackendError::Provider(_)));
    }
}
