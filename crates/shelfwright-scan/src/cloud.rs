//! Cloud storage backend.
//!
//! The provider SDK (authentication, HTTP, pagination) lives behind the
//! `CloudClient` trait; this module adapts any client to the uniform
//! `StorageBackend` contract and maps provider auth failures to
//! `BackendError::Auth` so the engine can fail closed on them.

use std::io::{Cursor, Read};
use std::path::Path;
use std::time::SystemTime;

use compact_str::CompactString;
use thiserror::Error;

use shelfwright_core::{BackendError, SourceLocation};

use crate::backend::{EntryError, ListTarget, RawEntry, RawEntryKind, StorageBackend};

/// Errors from a cloud provider client.
#[derive(Debug, Error)]
pub enum CloudError {
    /// The provider rejected our credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The addressed item does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other provider/API failure.
    #[error("API error: {0}")]
    Api(String),
}

impl From<CloudError> for BackendError {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::Auth(msg) => BackendError::Auth(msg),
            CloudError::NotFound(what) => BackendError::NotFound(what),
            CloudError::Api(msg) => BackendError::Provider(msg),
        }
    }
}

/// One item as reported by a provider listing.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    /// Provider's stable identifier. Survives renames, so it is the
    /// deduplication identity.
    pub id: CompactString,
    /// Current display name.
    pub name: CompactString,
    /// Size in bytes (0 for folders).
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Whether this item is a folder.
    pub is_folder: bool,
}

/// The provider seam: the minimal calls shelfwright needs from any cloud
/// drive SDK.
pub trait CloudClient: Send + Sync {
    /// Provider identifier (e.g. "gdrive", "dropbox").
    fn provider(&self) -> &str;

    /// The id of the folder the run starts from.
    fn root_folder(&self) -> CompactString;

    /// List the direct children of a folder.
    fn list_folder(&self, folder_id: &str) -> Result<Vec<RemoteEntry>, CloudError>;

    /// Download an item's bytes.
    fn download(&self, id: &str) -> Result<Vec<u8>, CloudError>;

    /// Move an item to a new path within the store.
    fn move_item(&self, id: &str, dest: &Path) -> Result<(), CloudError>;

    /// Delete an item.
    fn delete_item(&self, id: &str) -> Result<(), CloudError>;
}

/// `StorageBackend` adapter over any `CloudClient`.
pub struct CloudBackend<C> {
    client: C,
}

impl<C: CloudClient> CloudBackend<C> {
    /// Wrap a provider client.
    pub fn new(client: C) -> Self {
        Self { client }
    }

    fn expect_remote_id<'a>(
        &self,
        location: &'a SourceLocation,
    ) -> Result<&'a str, BackendError> {
        match location {
            SourceLocation::Cloud { remote_id, .. } => Ok(remote_id.as_str()),
            SourceLocation::Local { .. } => Err(BackendError::Provider(
                "cloud backend cannot address local paths".to_string(),
            )),
        }
    }
}

impl<C: CloudClient> StorageBackend for CloudBackend<C> {
    fn root(&self) -> ListTarget {
        ListTarget::Cloud {
            folder_id: self.client.root_folder(),
        }
    }

    fn list_dir(
        &self,
        target: &ListTarget,
    ) -> Result<Vec<Result<RawEntry, EntryError>>, BackendError> {
        let ListTarget::Cloud { folder_id } = target else {
            return Err(BackendError::Provider(
                "cloud backend cannot list local directories".to_string(),
            ));
        };

        let remote = self.client.list_folder(folder_id)?;
        let provider = CompactString::new(self.client.provider());

        Ok(remote
            .into_iter()
            .map(|entry| {
                let kind = if entry.is_folder {
                    RawEntryKind::Dir {
                        target: ListTarget::Cloud {
                            folder_id: entry.id,
                        },
                    }
                } else {
                    RawEntryKind::File {
                        location: SourceLocation::Cloud {
                            provider: provider.clone(),
                            remote_id: entry.id,
                        },
                    }
                };
                Ok(RawEntry {
                    name: entry.name,
                    size: entry.size,
                    modified: entry.modified,
                    kind,
                })
            })
            .collect())
    }

    fn open(&self, location: &SourceLocation) -> Result<Box<dyn Read + Send>, BackendError> {
        let id = self.expect_remote_id(location)?;
        let bytes = self.client.download(id)?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn relocate(&self, location: &SourceLocation, dest: &Path) -> Result<(), BackendError> {
        let id = self.expect_remote_id(location)?;
        self.client.move_item(id, dest).map_err(Into::into)
    }

    fn remove(&self, location: &SourceLocation) -> Result<(), BackendError> {
        let id = self.expect_remote_id(location)?;
        self.client.delete_item(id).map_err(Into::into)
    }
}
