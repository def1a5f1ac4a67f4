//! In-memory node used by unit tests.

use std::{
    collections::HashMap,
    io,
    sync::Mutex,
};

use async_trait::async_trait;

use super::{LaunchOutcome, LaunchRequest, Node, ProcessRunner, RemoteFileSystem, Termination};

#[derive(Debug, Clone)]
enum Reply {
    Prints { stdout: String, code: i32 },
    Hangs,
}

/// What happens when a script (not a probe) is run with a given program.
#[derive(Debug, Clone, Copy)]
pub enum ScriptRun {
    Exits(i32),
    Hangs,
    LaunchFails,
}

#[derive(Debug, Default)]
pub struct FakeNode {
    name: String,
    unix: bool,
    env: HashMap<String, String>,
    env_broken: bool,
    files: Vec<String>,
    dirs: Vec<String>,
    broken: Vec<String>,
    replies: HashMap<Vec<String>, Reply>,
    unlaunchable: Vec<String>,
    scripts: HashMap<String, ScriptRun>,
    launches: Mutex<Vec<LaunchRequest>>,
}

impl FakeNode {
    pub fn unix() -> Self {
        Self { name: "agent".into(), unix: true, ..Self::default() }
    }

    pub fn windows() -> Self {
        Self { name: "agent".into(), unix: false, ..Self::default() }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.into();
        self
    }

    pub fn var(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn path(self, value: &str) -> Self {
        self.var("PATH", value)
    }

    pub fn broken_environment(mut self) -> Self {
        self.env_broken = true;
        self
    }

    pub fn file(mut self, path: &str) -> Self {
        self.files.push(path.into());
        self
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.dirs.push(path.into());
        self
    }

    /// Every filesystem call on `path` fails with an I/O error.
    pub fn broken(mut self, path: &str) -> Self {
        self.broken.push(path.into());
        self
    }

    /// `path` exists and `[path, ...dispatch, "-c", ...]` prints `stdout`.
    pub fn python(self, path: &str, dispatch: &[&str], stdout: &str) -> Self {
        self.file(path).reply(path, dispatch, stdout, 0)
    }

    pub fn reply(mut self, path: &str, dispatch: &[&str], stdout: &str, code: i32) -> Self {
        self.replies.insert(
            key(path, dispatch),
            Reply::Prints { stdout: stdout.into(), code },
        );
        self
    }

    pub fn hangs(mut self, path: &str, dispatch: &[&str]) -> Self {
        self.replies.insert(key(path, dispatch), Reply::Hangs);
        self
    }

    /// Spawning `path` fails as if the channel to the node broke.
    pub fn unlaunchable(mut self, path: &str) -> Self {
        self.unlaunchable.push(path.into());
        self
    }

    /// Non-probe launches of `program` behave as `run`.
    pub fn script(mut self, program: &str, run: ScriptRun) -> Self {
        self.scripts.insert(program.into(), run);
        self
    }

    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.launches.lock().unwrap().clone()
    }

    pub fn launched_commands(&self) -> Vec<Vec<String>> {
        self.launches().into_iter().map(|r| r.argv).collect()
    }

    fn separator(&self) -> char {
        if self.unix { '/' } else { '\\' }
    }

    fn same_path(&self, a: &str, b: &str) -> bool {
        let a = a.trim_end_matches(['/', '\\']);
        let b = b.trim_end_matches(['/', '\\']);
        if self.unix { a == b } else { a.eq_ignore_ascii_case(b) }
    }

    fn check(&self, path: &str) -> io::Result<()> {
        if self.broken.iter().any(|p| self.same_path(p, path)) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, format!("channel closed while accessing {path}")));
        }
        Ok(())
    }
}

fn key(path: &str, dispatch: &[&str]) -> Vec<String> {
    std::iter::once(path)
        .chain(dispatch.iter().copied())
        .map(String::from)
        .collect()
}

#[async_trait]
impl Node for FakeNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_unix(&self) -> bool {
        self.unix
    }

    async fn environment(&self) -> io::Result<HashMap<String, String>> {
        if self.env_broken {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "agent went away"));
        }
        Ok(self.env.clone())
    }

    fn runner(&self) -> &dyn ProcessRunner {
        self
    }

    fn fs(&self) -> &dyn RemoteFileSystem {
        self
    }
}

#[async_trait]
impl ProcessRunner for FakeNode {
    async fn run(&self, request: LaunchRequest) -> io::Result<LaunchOutcome> {
        self.launches.lock().unwrap().push(request.clone());
        let program = request.argv.first().cloned().unwrap_or_default();
        if self.unlaunchable.contains(&program) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "remote launcher unavailable"));
        }

        // Probe commands end in `-c <script>`; everything before is the key.
        let mut lookup = request.argv.clone();
        let is_probe = lookup.len() >= 2 && lookup[lookup.len() - 2] == "-c";
        if is_probe {
            lookup.truncate(lookup.len() - 2);
        } else if let Some(run) = self.scripts.get(&program) {
            let termination = match run {
                ScriptRun::Exits(code) => Termination::Exited(*code),
                ScriptRun::Hangs if request.timeout.is_some() => Termination::TimedOut,
                ScriptRun::Hangs => Termination::Cancelled,
                ScriptRun::LaunchFails => {
                    return Err(io::Error::new(io::ErrorKind::PermissionDenied, format!("{program}: permission denied")));
                }
            };
            return Ok(LaunchOutcome { termination, stdout: String::new() });
        }

        let outcome = match self.replies.get(&lookup) {
            Some(Reply::Prints { stdout, code }) => LaunchOutcome {
                termination: Termination::Exited(*code),
                stdout: if request.capture_stdout { stdout.clone() } else { String::new() },
            },
            Some(Reply::Hangs) => LaunchOutcome {
                termination: if request.timeout.is_some() { Termination::TimedOut } else { Termination::Cancelled },
                stdout: String::new(),
            },
            None if self.files.contains(&program) => LaunchOutcome {
                termination: Termination::Exited(1),
                stdout: String::new(),
            },
            None => {
                return Err(io::Error::new(io::ErrorKind::NotFound, format!("{program}: not found")));
            }
        };
        Ok(outcome)
    }
}

#[async_trait]
impl RemoteFileSystem for FakeNode {
    fn join(&self, dir: &str, name: &str) -> String {
        let sep = self.separator();
        format!("{}{sep}{name}", dir.trim_end_matches(sep))
    }

    async fn exists(&self, path: &str) -> io::Result<bool> {
        self.check(path)?;
        Ok(self
            .files
            .iter()
            .chain(self.dirs.iter())
            .any(|p| self.same_path(p, path)))
    }

    async fn is_dir(&self, path: &str) -> io::Result<bool> {
        self.check(path)?;
        Ok(self.dirs.iter().any(|p| self.same_path(p, path)))
    }

    async fn list_dirs(&self, path: &str) -> io::Result<Vec<String>> {
        self.check(path)?;
        let sep = self.separator();
        Ok(self
            .dirs
            .iter()
            .filter(|d| {
                d.trim_end_matches(sep)
                    .rsplit_once(sep)
                    .is_some_and(|(parent, _)| self.same_path(parent, path))
            })
            .cloned()
            .collect())
    }
}
