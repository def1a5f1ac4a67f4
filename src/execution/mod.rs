//! Execution engine: script sources, staging and step errors.

use std::{
    collections::HashMap,
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use tempfile::TempPath;
use thiserror::Error;

use crate::{locator::LocateError, utils::expand_macros};

pub mod python;

pub use python::{PythonStep, StepContext};

#[derive(Debug, Error)]
pub enum StepError {
    #[error("there is no script configured for this step")]
    NoScript,

    #[error("unable to produce a script file")]
    Staging(#[source] io::Error),

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error("command execution failed")]
    Launch(#[source] io::Error),

    #[error("python script did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("python script was cancelled")]
    Cancelled,

    #[error("python script was terminated by a signal")]
    Killed,

    #[error("python script exited with error code: {0}")]
    Failed(i32),
}

impl StepError {
    /// Process exit code to report for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Failed(code) => *code,
            Self::Cancelled => 130,
            Self::TimedOut(_) => 124,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Script text, written to a temporary file for the run.
    Inline(String),
    /// Path to an existing script, relative to the workspace.
    File(String),
}

/// A script ready to run. Inline scripts are removed by [`StagedScript::cleanup`]
/// or, failing that, when dropped.
#[derive(Debug)]
pub struct StagedScript {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl StagedScript {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    pub fn cleanup(self) -> io::Result<()> {
        match self.temp {
            Some(temp) => temp.close(),
            None => Ok(()),
        }
    }
}

impl ScriptSource {
    pub fn stage(&self, workspace: &Path, env: &HashMap<String, String>) -> Result<StagedScript, StepError> {
        match self {
            Self::Inline(text) => {
                if text.trim().is_empty() {
                    return Err(StepError::NoScript);
                }
                let mut file = tempfile::Builder::new()
                    .prefix("pyrun")
                    .suffix(".py")
                    .tempfile_in(workspace)
                    .map_err(StepError::Staging)?;
                file.write_all(text.as_bytes()).map_err(StepError::Staging)?;
                file.flush().map_err(StepError::Staging)?;
                let temp = file.into_temp_path();
                Ok(StagedScript { path: temp.to_path_buf(), temp: Some(temp) })
            }
            Self::File(path) => {
                if path.trim().is_empty() {
                    return Err(StepError::NoScript);
                }
                let expanded = expand_macros(path, env);
                Ok(StagedScript { path: workspace.join(expanded), temp: None })
            }
        }
    }
}
