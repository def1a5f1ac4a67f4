//! The Python build step: resolve an interpreter, then run the script with it.

use std::{collections::HashMap, path::PathBuf, time::Duration};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{ScriptSource, StepError};
use crate::{
    installations::{InstallationResolver, Installations},
    locator::{LocateError, PythonExecutable, RequiredVersion},
    node::{cancelled, is_cancelled, LaunchRequest, Node, Termination},
    utils::{expand_macros, split_arguments},
};

#[derive(Debug, Clone)]
pub struct PythonStep {
    /// Name of a configured installation to prefer.
    pub installation: Option<String>,
    pub version: RequiredVersion,
    pub source: ScriptSource,
    /// Interpreter options placed before the script, e.g. `-u -W error`.
    pub options: String,
    /// Script arguments; `$VAR` and `${VAR}` references are expanded per argument.
    pub script_args: String,
    pub quiet: bool,
    pub timeout: Option<Duration>,
}

/// Everything a step needs from the build that runs it.
pub struct StepContext<'a> {
    pub node: &'a dyn Node,
    pub installations: Installations,
    pub workspace: PathBuf,
    /// Build variables, overriding the node environment.
    pub build_vars: HashMap<String, String>,
    pub probe_timeout: Option<Duration>,
    pub cancel: Option<watch::Receiver<bool>>,
}

/// `[python, ...dispatch, ...options, script, ...args]`
pub fn command_line(
    exe: &PythonExecutable,
    options: &str,
    script: &str,
    script_args: &str,
    env: &HashMap<String, String>,
) -> Vec<String> {
    let mut argv = exe.command();
    argv.extend(split_arguments(options));
    argv.push(script.to_string());
    argv.extend(split_arguments(script_args).iter().map(|arg| expand_macros(arg, env)));
    argv
}

impl PythonStep {
    pub async fn perform(&self, ctx: &StepContext<'_>) -> Result<(), StepError> {
        let mut env = ctx
            .node
            .environment()
            .await
            .map_err(|e| StepError::Locate(LocateError::Environment(e)))?;
        env.extend(ctx.build_vars.iter().map(|(k, v)| (k.clone(), v.clone())));

        let script = self.source.stage(&ctx.workspace, &env)?;
        if script.is_temporary() {
            debug!(path = %script.path().display(), "staged inline script");
        }
        let result = self.run(ctx, &env, &script.path().to_string_lossy()).await;

        let path = script.path().to_path_buf();
        if let Err(err) = script.cleanup() {
            warn!(path = %path.display(), error = %err, "unable to delete script file");
        }
        result
    }

    async fn run(&self, ctx: &StepContext<'_>, env: &HashMap<String, String>, script: &str) -> Result<(), StepError> {
        let resolver = InstallationResolver::new(ctx.node, ctx.installations.clone())
            .with_probe_timeout(ctx.probe_timeout)
            .with_build_env(ctx.build_vars.clone());
        // Dropping the resolution future kills any probe still running.
        let resolution = tokio::select! {
            biased;
            _ = cancelled(ctx.cancel.clone()) => return Err(StepError::Cancelled),
            resolution = resolver.resolve(self.installation.as_deref(), self.version) => resolution?,
        };
        if is_cancelled(ctx.cancel.as_ref()) {
            return Err(StepError::Cancelled);
        }

        let argv = command_line(&resolution.executable, &self.options, script, &self.script_args, env);
        info!(
            python = resolution.executable.path(),
            dispatch = ?resolution.executable.dispatch_args(),
            "running python {} script",
            self.version
        );

        let mut request = LaunchRequest::new(argv)
            .env(env.clone())
            .cwd(ctx.workspace.to_string_lossy())
            .quiet(self.quiet)
            .timeout(self.timeout);
        if let Some(cancel) = &ctx.cancel {
            request = request.cancel(cancel.clone());
        }

        let outcome = ctx.node.runner().run(request).await.map_err(StepError::Launch)?;
        match outcome.termination {
            Termination::Exited(0) => Ok(()),
            Termination::Exited(code) => Err(StepError::Failed(code)),
            Termination::Killed => Err(StepError::Killed),
            Termination::TimedOut => Err(StepError::TimedOut(self.timeout.unwrap_or_default())),
            Termination::Cancelled => Err(StepError::Cancelled),
        }
    }
}
