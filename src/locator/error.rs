use std::io;

use thiserror::Error;

use super::RequiredVersion;

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("No Python found that matches the requested python version {version}")]
    NotFound { version: RequiredVersion },

    /// The probe process could not be started. Resolution stops here rather
    /// than reporting the interpreter as absent.
    #[error("unable to launch {path} to check its python version")]
    ProbeLaunch {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to {op} {path} on the build node")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read the environment of the build node")]
    Environment(#[source] io::Error),
}

impl LocateError {
    pub(crate) fn io(op: &'static str, path: &str, source: io::Error) -> Self {
        Self::Io { op, path: path.to_string(), source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
