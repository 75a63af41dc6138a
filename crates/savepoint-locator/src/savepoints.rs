use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::fs::Filesystem;
use crate::location::{Backend, ObjectLocation, classify};
use crate::s3::{ObjectEntry, ObjectStore, StoreLoader};

/// Object keys with this suffix mark a savepoint.
pub const METADATA_SUFFIX: &str = "_metadata";

/// Finds the newest savepoint under a location, on object storage or on the
/// local filesystem.
///
/// The object-store client is only loaded when a location actually routes to
/// object storage, so a broken AWS setup never affects local lookups.
#[derive(Debug, Clone)]
pub struct SavepointLocator<L, F> {
    loader: L,
    fs: F,
}

impl<L: StoreLoader, F: Filesystem> SavepointLocator<L, F> {
    pub fn new(loader: L, fs: F) -> Self {
        Self { loader, fs }
    }

    /// Location of the newest savepoint under `location`.
    ///
    /// On object storage this is the newest `_metadata` object, and an empty
    /// string when there is none. Locally it is the newest directory entry,
    /// and an empty directory is an error.
    pub fn latest(&self, location: &str) -> Result<String> {
        let backend = classify(location);
        debug!(location, backend = backend.name(), "resolving latest savepoint");
        match backend {
            Backend::ObjectStore(loc) => self.latest_in_object_store(&loc),
            Backend::Local(dir) => self.latest_in_directory(&dir),
        }
    }

    pub fn latest_in_object_store(&self, loc: &ObjectLocation) -> Result<String> {
        let store = self.loader.load()?;
        if loc.bucket.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidLocation,
                format!("{}:// location has no bucket", loc.scheme),
            ));
        }

        let entries = store
            .list_objects(&loc.bucket, loc.prefix())
            .map_err(|e| {
                Error::new(
                    ErrorKind::Listing(e.cause),
                    format!("listing S3 objects: {}", e.detail),
                )
            })?;
        debug!(bucket = %loc.bucket, listed = entries.len(), "listed objects");

        match newest_metadata(&entries) {
            Some(entry) => loc.with_key(&entry.key),
            None => Ok(String::new()),
        }
    }

    pub fn latest_in_directory(&self, dir: &str) -> Result<String> {
        let dir = trim_trailing_separators(dir);
        let names = self.fs.read_dir(dir).map_err(|e| {
            Error::io(
                ErrorKind::DirectoryListing {
                    dir: dir.to_string(),
                },
                e,
            )
        })?;
        if names.is_empty() {
            return Err(Error::new(
                ErrorKind::EmptyDirectory {
                    dir: dir.to_string(),
                },
                format!("No savepoints present in directory: {dir}"),
            ));
        }

        let mut newest: Option<(i64, String)> = None;
        for name in &names {
            let path = join_path(dir, name);
            let modified = self
                .fs
                .modified(&path)
                .map_err(|e| Error::io(ErrorKind::Stat { path: path.clone() }, e))?;
            let secs = DateTime::<Utc>::from(modified).timestamp();
            if newest.as_ref().is_none_or(|(best, _)| secs > *best) {
                newest = Some((secs, path));
            }
        }

        debug!(dir, entries = names.len(), "scanned directory");
        Ok(newest.map(|(_, path)| path).unwrap_or_default())
    }
}

/// Newest entry whose key ends in [`METADATA_SUFFIX`]; on equal timestamps
/// the one listed first wins.
pub fn newest_metadata(entries: &[ObjectEntry]) -> Option<&ObjectEntry> {
    let mut newest: Option<&ObjectEntry> = None;
    for entry in entries {
        if !entry.key.ends_with(METADATA_SUFFIX) {
            continue;
        }
        if newest.is_none_or(|best| entry.last_modified > best.last_modified) {
            newest = Some(entry);
        }
    }
    newest
}

fn trim_trailing_separators(dir: &str) -> &str {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() && !dir.is_empty() {
        "/"
    } else {
        trimmed
    }
}

fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}
