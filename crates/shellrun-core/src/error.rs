//! Error types for shellrun operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for shellrun operations
pub type Result<T> = std::result::Result<T, ShellrunError>;

/// Errors that can occur while assembling, building, staging or running shellcode
#[derive(Error, Debug)]
pub enum ShellrunError {
    #[error("Assembly error: {0}")]
    Assembly(String),

    #[error("Build error: {0}")]
    Build(String),

    #[error("Staging error{}: {source}", display_path(.path))]
    Staging {
        path: Option<PathBuf>,
        #[source]
        source: io::Error,
    },

    #[error("Launch error: cannot execute {}: {source}", .path.display())]
    Launch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Process error: {0}")]
    Process(String),

    #[error("Invalid context: {0}")]
    InvalidContext(String),

    #[error("Timeout exceeded")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" at {}", p.display()),
        None => String::new(),
    }
}

impl ShellrunError {
    /// Build a staging error for a known path
    pub fn staging(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ShellrunError::Staging {
            path: Some(path.into()),
            source,
        }
    }
}
