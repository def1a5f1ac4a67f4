//! Execution node capabilities: process launching and filesystem access.
//!
//! The locator never touches the local machine directly. Everything it needs
//! from the node a build runs on goes through [`Node`], which may be backed by
//! the local host ([`LocalNode`]) or by a channel to a remote agent.

use std::{collections::HashMap, io, time::Duration};

use async_trait::async_trait;
use tokio::sync::watch;

pub mod local;

#[cfg(test)]
pub mod fake;

pub use local::LocalNode;

/// A single process launch on a node.
#[derive(Debug, Clone, Default)]
pub struct LaunchRequest {
    pub argv: Vec<String>,
    /// Complete environment for the child. Empty means inherit.
    pub env: HashMap<String, String>,
    pub cwd: Option<String>,
    pub capture_stdout: bool,
    /// Do not echo the command line to the build log.
    pub quiet: bool,
    pub timeout: Option<Duration>,
    /// Flipped to `true` when the build is cancelled.
    pub cancel: Option<watch::Receiver<bool>>,
}

impl LaunchRequest {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn capture_stdout(mut self) -> Self {
        self.capture_stdout = true;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// How a launched process came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    /// Terminated by a signal we did not send.
    Killed,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub termination: Termination,
    /// Captured stdout, empty unless the request asked for capture.
    pub stdout: String,
}

impl LaunchOutcome {
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited(0)
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run a command to completion. An `Err` means the process could not be
    /// started or the channel to the node broke, never that the process
    /// itself failed.
    async fn run(&self, request: LaunchRequest) -> io::Result<LaunchOutcome>;
}

#[async_trait]
pub trait RemoteFileSystem: Send + Sync {
    fn join(&self, dir: &str, name: &str) -> String;

    async fn exists(&self, path: &str) -> io::Result<bool>;

    async fn is_dir(&self, path: &str) -> io::Result<bool>;

    /// Immediate subdirectories of `path`, as full paths, in listing order.
    async fn list_dirs(&self, path: &str) -> io::Result<Vec<String>>;
}

/// The machine a build step executes on.
#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> &str;

    /// Platform of the node itself, not of the machine running this binary.
    fn is_unix(&self) -> bool;

    /// Environment variables as seen on the node.
    async fn environment(&self) -> io::Result<HashMap<String, String>>;

    fn runner(&self) -> &dyn ProcessRunner;

    fn fs(&self) -> &dyn RemoteFileSystem;
}

/// Resolves once the cancel flag is raised; never if the sender goes away.
pub async fn cancelled(cancel: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = cancel else {
        return std::future::pending().await;
    };
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

pub fn is_cancelled(cancel: Option<&watch::Receiver<bool>>) -> bool {
    cancel.is_some_and(|rx| *rx.borrow())
}

/// Last component of a node path, accepting either separator.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed)
}
