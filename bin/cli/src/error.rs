//! Errors surfaced by the command-line front end.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    /// Environment configuration could not be loaded.
    Config { reason: String },
    /// A local file could not be read or written.
    Io { path: PathBuf, reason: String },
    /// A command-line argument did not parse.
    InvalidArgument { name: &'static str, reason: String },
    /// A workflow file failed validation.
    Invalid { blocking: usize },
    /// An editor or debug operation failed.
    Command { command: &'static str },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "failed to load configuration: {reason}"),
            Self::Io { path, reason } => write!(f, "{}: {reason}", path.display()),
            Self::InvalidArgument { name, reason } => write!(f, "invalid --{name}: {reason}"),
            Self::Invalid { blocking } => {
                write!(f, "workflow has {blocking} blocking issue(s)")
            }
            Self::Command { command } => write!(f, "{command} failed"),
        }
    }
}

impl std::error::Error for CliError {}
