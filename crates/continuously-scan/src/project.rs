//! Version control view of the project being watched.

use std::path::{Component, Path, PathBuf};

use crate::error::ScanError;

/// Tracked-file enumeration and ignore rules of a project.
pub trait ProjectIndex {
    /// Root of the working directory; every other path is relative to it.
    fn workdir(&self) -> &Path;

    /// Paths recorded in the index, relative to [`workdir`](Self::workdir).
    fn tracked_paths(&self) -> Result<Vec<PathBuf>, ScanError>;

    /// Whether `relative` is excluded by the ignore rules.
    ///
    /// Directories are checked as a whole so the walk can prune them.
    fn is_ignored(&self, relative: &Path, is_dir: bool) -> Result<bool, ScanError>;
}

/// Whether `relative` lies inside the repository metadata directory.
pub(crate) fn is_metadata_dir(relative: &Path) -> bool {
    matches!(relative.components().next(), Some(Component::Normal(name)) if name == ".git")
}

#[cfg(feature = "git")]
mod git {
    use std::ffi::{OsStr, OsString};
    use std::os::unix::ffi::OsStrExt;
    use std::path::{Path, PathBuf};

    use git2::Repository;
    use tracing::debug;

    use super::{ProjectIndex, is_metadata_dir};
    use crate::error::ScanError;

    /// A git repository discovered from a start path.
    pub struct GitProject {
        repo: Repository,
        workdir: PathBuf,
    }

    impl GitProject {
        /// Find the repository containing `start`.
        pub fn discover(start: impl AsRef<Path>) -> Result<Self, ScanError> {
            let start = start.as_ref();
            let repo = Repository::discover(start).map_err(|e| {
                ScanError::git(format!("git_repository_discover({})", start.display()), e)
            })?;

            let workdir = repo
                .workdir()
                .ok_or_else(|| ScanError::BareRepository {
                    path: repo.path().to_path_buf(),
                })?
                .to_path_buf();

            debug!("repository workdir: {}", workdir.display());
            Ok(Self { repo, workdir })
        }
    }

    impl ProjectIndex for GitProject {
        fn workdir(&self) -> &Path {
            &self.workdir
        }

        fn tracked_paths(&self) -> Result<Vec<PathBuf>, ScanError> {
            let index = self
                .repo
                .index()
                .map_err(|e| ScanError::git("git_repository_index", e))?;

            Ok(index
                .iter()
                .map(|entry| PathBuf::from(OsStr::from_bytes(&entry.path)))
                .collect())
        }

        fn is_ignored(&self, relative: &Path, is_dir: bool) -> Result<bool, ScanError> {
            if is_metadata_dir(relative) {
                return Ok(true);
            }

            let query = if is_dir {
                let mut dir = OsString::from(relative.as_os_str());
                dir.push("/");
                PathBuf::from(dir)
            } else {
                relative.to_path_buf()
            };

            self.repo.is_path_ignored(&query).map_err(|e| {
                ScanError::git(
                    format!("git_ignore_path_is_ignored({})", query.display()),
                    e,
                )
            })
        }
    }
}

#[cfg(feature = "git")]
pub use git::GitProject;
