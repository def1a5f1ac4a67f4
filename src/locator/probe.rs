//! Asks a candidate binary which major Python version it is.

use std::{collections::HashMap, fmt, time::Duration};

use tracing::debug;

use super::LocateError;
use crate::node::{LaunchRequest, ProcessRunner, Termination};

pub const VERSION_SCRIPT: &str = "import sys; print(sys.version_info.major)";

/// Result of one probe. `Unusable` covers every way a candidate can fail to
/// answer and never matches a requested version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Major(u32),
    Unusable,
}

impl ProbeOutcome {
    /// Numeric form, with `0` standing for an unusable candidate.
    pub fn major(self) -> u32 {
        match self {
            Self::Major(v) => v,
            Self::Unusable => 0,
        }
    }

    pub fn is(self, wanted: u32) -> bool {
        wanted != 0 && self.major() == wanted
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major(v) => write!(f, "{v}"),
            Self::Unusable => f.write_str("unknown"),
        }
    }
}

pub fn probe_command(path: &str, dispatch: &[String]) -> Vec<String> {
    let mut argv = Vec::with_capacity(dispatch.len() + 3);
    argv.push(path.to_string());
    argv.extend(dispatch.iter().cloned());
    argv.push("-c".into());
    argv.push(VERSION_SCRIPT.into());
    argv
}

pub fn parse_major(stdout: &str) -> ProbeOutcome {
    stdout
        .trim()
        .parse::<u32>()
        .map_or(ProbeOutcome::Unusable, ProbeOutcome::Major)
}

pub async fn probe(
    runner: &dyn ProcessRunner,
    env: &HashMap<String, String>,
    path: &str,
    dispatch: &[String],
    timeout: Option<Duration>,
) -> Result<ProbeOutcome, LocateError> {
    let argv = probe_command(path, dispatch);
    debug!(command = %argv.join(" "), "checking python version");

    let request = LaunchRequest::new(argv)
        .env(env.clone())
        .capture_stdout()
        .quiet(true)
        .timeout(timeout);
    let outcome = runner
        .run(request)
        .await
        .map_err(|source| LocateError::ProbeLaunch { path: path.to_string(), source })?;

    let result = if outcome.success() {
        parse_major(&outcome.stdout)
    } else {
        if outcome.termination == Termination::TimedOut {
            debug!(path, ?timeout, "version probe timed out");
        }
        ProbeOutcome::Unusable
    };
    debug!(path, version = %result, "python version");
    Ok(result)
}
