//! Watch set construction for continuously.
//!
//! # Overview
//!
//! `continuously-scan` decides which files are watched at startup:
//!
//! - **Tracked files** from the version control index, even if ignored
//! - **Untracked files** found by walking the working directory, unless the
//!   ignore rules exclude them
//! - **Marker files** named `.k`, always
//!
//! Ignored directories are pruned as a whole. Version control access sits
//! behind [`ProjectIndex`]; [`GitProject`] implements it with libgit2.
//!
//! # Example
//!
//! ```rust,ignore
//! use continuously_scan::{GitProject, Scanner};
//!
//! let project = GitProject::discover(".")?;
//! let watches = Scanner::new(&project).scan(&mut registrar)?;
//! println!("watching {} files", watches.active_count());
//! ```

mod error;
mod project;
mod scanner;

pub use error::ScanError;
#[cfg(feature = "git")]
pub use project::GitProject;
pub use project::ProjectIndex;
pub use scanner::Scanner;

// Re-export core types for convenience
pub use continuously_core::{Registrar, Watch, WatchHandle, WatchSet};
