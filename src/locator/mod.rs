//! Python interpreter discovery on a build node.
//!
//! The search order is fixed and the first confirmed candidate wins:
//!
//! * unix-like nodes: `python<V>` on `PATH`, then `python` on `PATH`;
//! * Windows nodes: the `py.exe` launcher with `-<V>`, then `python.exe` on
//!   `PATH`, then `C:\python<V>*\python.exe`.
//!
//! A candidate is only returned after it has been run and reported the wanted
//! major version.

use std::{collections::HashMap, fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::node::{file_name, Node};

mod error;
pub mod probe;
pub mod search_path;

pub use error::LocateError;
pub use probe::ProbeOutcome;

/// Root scanned for `Python<V>*` directories on Windows nodes.
pub const WINDOWS_SCAN_ROOT: &str = "C:\\";

/// Version-dispatch launcher shipped with Windows Python installers.
pub const PY_LAUNCHER: &str = "py.exe";

/// A requested Python major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RequiredVersion(u32);

impl RequiredVersion {
    pub const PYTHON2: Self = Self(2);
    pub const PYTHON3: Self = Self(3);

    /// Probing sentinel accepting whatever version answers. Never a target.
    pub const ANY: u32 = 0;

    pub fn new(major: u32) -> Option<Self> {
        (major != Self::ANY).then_some(Self(major))
    }

    pub fn major(self) -> u32 {
        self.0
    }

    /// Launcher switch selecting this version, e.g. `-3` for `py.exe -3`.
    pub fn dispatch_arg(self) -> String {
        format!("-{}", self.0)
    }
}

impl fmt::Display for RequiredVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for RequiredVersion {
    type Error = String;

    fn try_from(major: u32) -> Result<Self, Self::Error> {
        Self::new(major).ok_or_else(|| "python version must be a positive major version".to_string())
    }
}

impl From<RequiredVersion> for u32 {
    fn from(v: RequiredVersion) -> Self {
        v.0
    }
}

impl FromStr for RequiredVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let major = s
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid python major version: {s}"))?;
        Self::try_from(major)
    }
}

/// A verified interpreter plus the leading arguments needed to run it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PythonExecutable {
    path: String,
    dispatch_args: Vec<String>,
}

impl PythonExecutable {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), dispatch_args: Vec::new() }
    }

    pub fn with_dispatch(path: impl Into<String>, dispatch_args: Vec<String>) -> Self {
        Self { path: path.into(), dispatch_args }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn dispatch_args(&self) -> &[String] {
        &self.dispatch_args
    }

    /// `[path, ...dispatch_args]`
    pub fn command(&self) -> Vec<String> {
        std::iter::once(self.path.clone())
            .chain(self.dispatch_args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for PythonExecutable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command().join(" "))
    }
}

pub struct PythonLocator<'a> {
    node: &'a dyn Node,
    probe_timeout: Option<Duration>,
    env: OnceCell<HashMap<String, String>>,
}

impl<'a> PythonLocator<'a> {
    pub fn new(node: &'a dyn Node) -> Self {
        Self { node, probe_timeout: None, env: OnceCell::new() }
    }

    pub fn with_probe_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn node(&self) -> &'a dyn Node {
        self.node
    }

    /// Node environment, fetched once per locator.
    pub async fn environment(&self) -> Result<&HashMap<String, String>, LocateError> {
        self.env
            .get_or_try_init(|| async { self.node.environment().await.map_err(LocateError::Environment) })
            .await
    }

    /// Finds an interpreter for `wanted` using the node's platform strategy.
    /// `Ok(None)` means nothing matched; errors mean the node could not be
    /// searched.
    pub async fn locate(&self, wanted: RequiredVersion) -> Result<Option<PythonExecutable>, LocateError> {
        if self.node.is_unix() {
            self.locate_unix(wanted).await
        } else {
            self.locate_windows(wanted).await
        }
    }

    pub async fn find_in_path(&self, filename: &str) -> Result<Option<String>, LocateError> {
        let env = self.environment().await?;
        let path_var = env.get("PATH").map(String::as_str);
        Ok(search_path::find_in_path(self.node.fs(), path_var, filename, self.node.is_unix()).await)
    }

    pub async fn probe(&self, path: &str, dispatch: &[String]) -> Result<ProbeOutcome, LocateError> {
        let env = self.environment().await?;
        probe::probe(self.node.runner(), env, path, dispatch, self.probe_timeout).await
    }

    async fn locate_unix(&self, wanted: RequiredVersion) -> Result<Option<PythonExecutable>, LocateError> {
        for name in [format!("python{wanted}"), "python".to_string()] {
            debug!("searching for {name}");
            let Some(path) = self.find_in_path(&name).await? else {
                continue;
            };
            if self.probe(&path, &[]).await?.is(wanted.major()) {
                debug!(%path, "found python for unix");
                return Ok(Some(PythonExecutable::new(path)));
            }
        }
        Ok(None)
    }

    async fn locate_windows(&self, wanted: RequiredVersion) -> Result<Option<PythonExecutable>, LocateError> {
        if let Some(py) = self.find_in_path(PY_LAUNCHER).await? {
            let dispatch = vec![wanted.dispatch_arg()];
            if self.probe(&py, &dispatch).await?.is(wanted.major()) {
                debug!(path = %py, "found python launcher");
                return Ok(Some(PythonExecutable::with_dispatch(py, dispatch)));
            }
        }

        if let Some(python) = self.find_in_path("python.exe").await? {
            if self.probe(&python, &[]).await?.is(wanted.major()) {
                debug!(path = %python, "found python.exe on PATH");
                return Ok(Some(PythonExecutable::new(python)));
            }
        }

        self.scan_windows_root(wanted).await
    }

    async fn scan_windows_root(&self, wanted: RequiredVersion) -> Result<Option<PythonExecutable>, LocateError> {
        let fs = self.node.fs();
        let prefix = format!("python{wanted}");
        let dirs = fs
            .list_dirs(WINDOWS_SCAN_ROOT)
            .await
            .map_err(|e| LocateError::io("list", WINDOWS_SCAN_ROOT, e))?;

        for dir in dirs {
            debug!(%dir, "searching for python");
            if !file_name(&dir).to_lowercase().starts_with(&prefix) {
                continue;
            }
            let exe = fs.join(&dir, "python.exe");
            let is_dir = fs.is_dir(&exe).await.map_err(|e| LocateError::io("inspect", &exe, e))?;
            if is_dir || !fs.exists(&exe).await.map_err(|e| LocateError::io("inspect", &exe, e))? {
                continue;
            }
            if self.probe(&exe, &[]).await?.is(wanted.major()) {
                debug!(path = %exe, "found python under the system drive");
                return Ok(Some(PythonExecutable::new(exe)));
            }
        }
        Ok(None)
    }
}
