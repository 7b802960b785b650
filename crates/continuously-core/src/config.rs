//! Run configuration.

use std::ffi::{OsStr, OsString};

use derive_builder::Builder;

/// What to run and how loudly, fixed for the lifetime of the process.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct RunConfig {
    /// Suppress status banners.
    #[builder(default = "false")]
    pub quiet: bool,

    /// Program followed by its arguments.
    pub command: Vec<OsString>,
}

impl RunConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.command.as_deref() {
            None | Some([]) => Err("command is required".to_string()),
            Some([program, ..]) if program.is_empty() => {
                Err("command name cannot be empty".to_string())
            }
            Some(_) => Ok(()),
        }
    }
}

impl RunConfig {
    /// Create a new run config builder.
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// Program to execute.
    pub fn program(&self) -> &OsStr {
        // validated non-empty by the builder
        &self.command[0]
    }

    /// Arguments passed to the program.
    pub fn args(&self) -> &[OsString] {
        &self.command[1..]
    }

    /// Whether banners are suppressed once the output descriptor is known.
    ///
    /// Banners are meaningless on a non-interactive output, so quiet mode is
    /// forced on there regardless of the flag.
    pub fn effective_quiet(&self, output_is_terminal: bool) -> bool {
        self.quiet || !output_is_terminal
    }
}
