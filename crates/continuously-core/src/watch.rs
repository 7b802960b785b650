//! Watch registry.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::WatchError;

/// Opaque registration id handed out by the notification source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(pub i32);

impl WatchHandle {
    /// Create a new handle from a raw watch descriptor.
    pub fn new(raw: i32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something that can install a change watch on a path.
pub trait Registrar {
    /// Install a watch, returning `None` if the path does not exist.
    fn register(&mut self, path: &Path) -> Result<Option<WatchHandle>, WatchError>;
}

/// A watched path and its current registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    /// Current handle, `None` if the file was missing when last registered.
    pub handle: Option<WatchHandle>,
    /// Absolute path of the watched file.
    pub path: PathBuf,
}

/// Deduplicated set of watches in discovery order.
///
/// The first registration of a path wins; later offers of the same path are
/// dropped. Paths whose registration returned `None` are still remembered so
/// duplicates of them are recognized too.
#[derive(Debug, Default)]
pub struct WatchSet {
    watches: Vec<Watch>,
    seen: HashSet<PathBuf>,
}

impl WatchSet {
    /// Create an empty watch set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a watch for `path`, tolerating a missing file.
    pub fn register(
        registrar: &mut impl Registrar,
        path: &Path,
    ) -> Result<Option<WatchHandle>, WatchError> {
        let handle = registrar.register(path)?;
        if handle.is_none() {
            warn!("ignoring missing file: {}", path.display());
        }
        Ok(handle)
    }

    /// Register and record `path` unless it is already known.
    ///
    /// Returns `true` if the path was new.
    pub fn add(
        &mut self,
        registrar: &mut impl Registrar,
        path: impl Into<PathBuf>,
    ) -> Result<bool, WatchError> {
        let path = path.into();
        if self.seen.contains(&path) {
            return Ok(false);
        }

        let handle = Self::register(registrar, &path)?;
        if handle.is_some() {
            debug!("watching file: {}", path.display());
        }

        self.seen.insert(path.clone());
        self.watches.push(Watch { handle, path });
        Ok(true)
    }

    /// Path owned by `handle`.
    ///
    /// Handles only come from this set's registrar, so a miss means the
    /// registry and the notification source disagree.
    pub fn find_by_handle(&self, handle: WatchHandle) -> Result<&Path, WatchError> {
        self.position(handle)
            .map(|i| self.watches[i].path.as_path())
            .ok_or(WatchError::UnknownHandle { handle })
    }

    /// Re-register the path owned by `handle`, replacing its handle.
    ///
    /// Atomic saves replace the inode a watch is bound to, so every fired
    /// watch is re-armed on its path. If the file is gone the path stays
    /// unwatched for the rest of the run.
    pub fn rearm(
        &mut self,
        registrar: &mut impl Registrar,
        handle: WatchHandle,
    ) -> Result<PathBuf, WatchError> {
        let i = self
            .position(handle)
            .ok_or(WatchError::UnknownHandle { handle })?;

        let watch = &mut self.watches[i];
        watch.handle = Self::register(registrar, &watch.path)?;
        if watch.handle.is_none() {
            info!("no longer watching: {}", watch.path.display());
        }
        Ok(watch.path.clone())
    }

    /// Whether `path` has been offered to the set.
    pub fn contains(&self, path: &Path) -> bool {
        self.seen.contains(path)
    }

    /// Number of distinct paths, watched or not.
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    /// Check if no paths have been offered.
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Number of paths with a live registration.
    pub fn active_count(&self) -> usize {
        self.watches.iter().filter(|w| w.handle.is_some()).count()
    }

    /// Iterate over watches in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &Watch> {
        self.watches.iter()
    }

    fn position(&self, handle: WatchHandle) -> Option<usize> {
        self.watches.iter().position(|w| w.handle == Some(handle))
    }
}
