//! Initial watch set construction.

use std::time::Instant;

use continuously_core::{MARKER_FILE_NAME, Registrar, WatchSet};
use tracing::info;
use walkdir::WalkDir;

use crate::error::ScanError;
use crate::project::ProjectIndex;

/// Collects the files to watch from a project.
///
/// Tracked paths come first, then a walk of the working directory that
/// prunes ignored subtrees. Both feed the same [`WatchSet`], so a file found
/// both ways is watched once.
pub struct Scanner<'a, P: ProjectIndex> {
    project: &'a P,
}

impl<'a, P: ProjectIndex> Scanner<'a, P> {
    /// Create a scanner over `project`.
    pub fn new(project: &'a P) -> Self {
        Self { project }
    }

    /// Build the watch set, installing watches through `registrar`.
    pub fn scan(&self, registrar: &mut impl Registrar) -> Result<WatchSet, ScanError> {
        let start = Instant::now();
        let mut set = WatchSet::new();

        self.add_tracked(registrar, &mut set)?;
        self.walk(registrar, &mut set)?;

        info!(
            "watching {} of {} files in {:.2}s",
            set.active_count(),
            set.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(set)
    }

    /// Register every path in the version control index.
    ///
    /// The index may list files deleted from disk; those are skipped by the
    /// registry with a warning.
    fn add_tracked(
        &self,
        registrar: &mut impl Registrar,
        set: &mut WatchSet,
    ) -> Result<(), ScanError> {
        let root = self.project.workdir();
        for relative in self.project.tracked_paths()? {
            set.add(registrar, root.join(relative))?;
        }
        Ok(())
    }

    /// Walk the working directory, registering non-ignored regular files.
    fn walk(&self, registrar: &mut impl Registrar, set: &mut WatchSet) -> Result<(), ScanError> {
        let root = self.project.workdir();
        let mut entries = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = entries.next() {
            // an entry whose type cannot be determined surfaces here
            let entry = entry.map_err(ScanError::walk)?;
            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|_| ScanError::OutsideWorkdir {
                    path: entry.path().to_path_buf(),
                })?;

            let file_type = entry.file_type();
            if file_type.is_dir() {
                if self.project.is_ignored(relative, true)? {
                    entries.skip_current_dir();
                }
            } else if file_type.is_file() {
                if entry.file_name() == MARKER_FILE_NAME
                    || !self.project.is_ignored(relative, false)?
                {
                    set.add(registrar, entry.path())?;
                }
            }
            // symlinks and special files are not watched
        }

        Ok(())
    }
}
