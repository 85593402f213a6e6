//! Storage backends and the file record scanner.
//!
//! Local and cloud storage satisfy one `StorageBackend` contract; the
//! scanner walks a backend breadth-first and turns what it finds into a
//! uniform `FileRecord` snapshot, retrying transient listing failures and
//! recording warnings instead of aborting.

mod backend;
mod cloud;
mod local;
mod scanner;

pub use backend::{EntryError, ListTarget, RawEntry, RawEntryKind, StorageBackend};
pub use cloud::{CloudBackend, CloudClient, CloudError, RemoteEntry};
pub use local::LocalBackend;
pub use scanner::{ScanSnapshot, ScanStats, Scanner};
