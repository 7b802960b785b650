//! Names shared between the scanner and the action runner.

/// File name that is always watched, even when version control ignores it.
pub const MARKER_FILE_NAME: &str = ".k";

/// Environment variable set in every spawned action.
pub const ENV_MARKER: &str = "CONTINUOUSLY";

/// Value of [`ENV_MARKER`] in the action's environment.
pub const ENV_MARKER_VALUE: &str = "1";
