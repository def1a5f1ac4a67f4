//! The node this binary runs on.

use std::{collections::HashMap, io, path::Path, process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::AsyncReadExt,
    process::{Child, Command},
    sync::watch,
};
use tracing::debug;

use super::{cancelled, LaunchOutcome, LaunchRequest, Node, ProcessRunner, RemoteFileSystem, Termination};

#[derive(Debug, Clone)]
pub struct LocalNode {
    name: String,
    runner: LocalProcessRunner,
    fs: LocalFileSystem,
}

impl LocalNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runner: LocalProcessRunner,
            fs: LocalFileSystem,
        }
    }
}

#[async_trait]
impl Node for LocalNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_unix(&self) -> bool {
        cfg!(unix)
    }

    async fn environment(&self) -> io::Result<HashMap<String, String>> {
        Ok(std::env::vars().collect())
    }

    fn runner(&self) -> &dyn ProcessRunner {
        &self.runner
    }

    fn fs(&self) -> &dyn RemoteFileSystem {
        &self.fs
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProcessRunner;

#[async_trait]
impl ProcessRunner for LocalProcessRunner {
    async fn run(&self, request: LaunchRequest) -> io::Result<LaunchOutcome> {
        let (program, args) = request
            .argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))?;

        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
        if !request.env.is_empty() {
            cmd.env_clear().envs(&request.env);
        }
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        if request.capture_stdout {
            cmd.stdout(Stdio::piped()).stderr(Stdio::null());
        }

        if !request.quiet {
            // Build log line, shown whatever the log filter says.
            eprintln!("$ {}", request.argv.join(" "));
        }

        debug!(cwd = ?request.cwd, timeout = ?request.timeout, "spawning {program}");
        let mut child = cmd.spawn()?;
        let reader = child.stdout.take().map(|mut out| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                out.read_to_end(&mut buf).await.map(|_| buf)
            })
        });

        let termination = wait_for(&mut child, request.timeout, request.cancel).await?;

        let stdout = match reader {
            Some(task) => task.await.map_err(io::Error::other)??,
            None => Vec::new(),
        };

        Ok(LaunchOutcome {
            termination,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
        })
    }
}

async fn wait_for(
    child: &mut Child,
    timeout: Option<Duration>,
    cancel: Option<watch::Receiver<bool>>,
) -> io::Result<Termination> {
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        status = child.wait() => {
            Ok(status?.code().map_or(Termination::Killed, Termination::Exited))
        }
        _ = deadline => {
            child.kill().await?;
            Ok(Termination::TimedOut)
        }
        _ = cancelled(cancel) => {
            child.kill().await?;
            Ok(Termination::Cancelled)
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

#[async_trait]
impl RemoteFileSystem for LocalFileSystem {
    fn join(&self, dir: &str, name: &str) -> String {
        Path::new(dir).join(name).to_string_lossy().into_owned()
    }

    async fn exists(&self, path: &str) -> io::Result<bool> {
        tokio::fs::try_exists(path).await
    }

    async fn is_dir(&self, path: &str) -> io::Result<bool> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_dirs(&self, path: &str) -> io::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut dirs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                dirs.push(entry.path().to_string_lossy().into_owned());
            }
        }
        Ok(dirs)
    }
}
