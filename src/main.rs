mod cli;
mod config;
mod execution;
mod installations;
mod locator;
mod node;
mod printer;
mod utils;

use std::time::Duration;

use anyhow::{Context, Result};
use cli::{Command, RunArgs, SelectArgs};
use config::Config;
use execution::{PythonStep, ScriptSource, StepContext};
use installations::{InstallationResolver, Installations, Origin};
use locator::RequiredVersion;
use node::{LocalNode, Node};
use printer::StatusPrinter;
use tokio::sync::watch;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_tracing(args.verbose);

    let cfg = Config::load();
    debug!(path = %cfg.config_path.display(), "configuration loaded");
    let printer = StatusPrinter::default();
    let node = LocalNode::new(cfg.node_name());

    match args.command {
        Command::Run(run) => {
            let code = run_step(&cfg, &node, run, &printer).await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Command::Locate { select, json } => locate(&cfg, &node, select, json, &printer).await,
        Command::Check { home, python_version } => {
            match installations::validate_home(&node, &home, python_version, cfg.probe_timeout()).await {
                Ok(exe) => {
                    printer.ok(&format!("{} is python {}", exe.path(), python_version));
                    Ok(())
                }
                Err(err) => {
                    printer.error(&format!("{:#}", anyhow::Error::from(err)));
                    std::process::exit(1);
                }
            }
        }
        Command::Installations => {
            let installations = Installations::load(&cfg)?;
            if installations.is_empty() {
                printer.warn(&format!(
                    "no python installations configured in {}",
                    cfg.installations_path().display()
                ));
            }
            for i in installations.iter() {
                println!("{}\tpython {}\t{}", i.name, i.version, i.home);
                let mut nodes: Vec<_> = i.nodes.iter().collect();
                nodes.sort();
                for (node, home) in nodes {
                    println!("\t[{}]\t{}", node, home);
                }
            }
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pyrun={level}")));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// `--python-version`, else the named installation's version, else the
/// configured default.
fn requested_version(cfg: &Config, installations: &Installations, select: &SelectArgs) -> RequiredVersion {
    select
        .python_version
        .or_else(|| installations.version_of(select.installation.as_deref()))
        .unwrap_or_else(|| cfg.default_python_version())
}

async fn locate(cfg: &Config, node: &LocalNode, select: SelectArgs, json: bool, printer: &StatusPrinter) -> Result<()> {
    let installations = Installations::load(cfg)?;
    let version = requested_version(cfg, &installations, &select);
    let resolution = InstallationResolver::new(node, installations)
        .with_probe_timeout(cfg.probe_timeout())
        .resolve(select.installation.as_deref(), version)
        .await;

    match resolution {
        Ok(resolution) => {
            if json {
                println!("{}", serde_json::to_string(&resolution.executable)?);
            } else {
                println!("{}", resolution.executable);
            }
            match resolution.origin {
                Origin::Named(name) => printer.ok(&format!("using configured installation '{}'", name)),
                Origin::Located => printer.ok(&format!("found python {} on node '{}'", version, node.name())),
            }
            Ok(())
        }
        Err(err) => {
            let not_found = err.is_not_found();
            printer.error(&format!("{:#}", anyhow::Error::from(err)));
            if not_found {
                printer.warn(&format!(
                    "configure an installation in {} or add python{} to PATH",
                    cfg.installations_path().display(),
                    version
                ));
            }
            std::process::exit(1);
        }
    }
}

async fn run_step(cfg: &Config, node: &LocalNode, run: RunArgs, printer: &StatusPrinter) -> Result<i32> {
    let source = match (run.command, run.file) {
        (Some(text), _) => ScriptSource::Inline(text),
        (None, Some(path)) => ScriptSource::File(path),
        (None, None) => anyhow::bail!("either --command or --file is required"),
    };
    let workspace = match run.workspace {
        Some(dir) => dir,
        None => std::env::current_dir().context("reading current directory")?,
    };
    let timeout = match run.timeout {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => cfg.script_timeout(),
    };

    let installations = Installations::load(cfg)?;
    let step = PythonStep {
        version: requested_version(cfg, &installations, &run.select),
        installation: run.select.installation,
        source,
        options: run.options,
        script_args: run.script_args,
        quiet: run.quiet,
        timeout,
    };

    // Ctrl-C flips the cancel flag; the runner kills the script once.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let ctx = StepContext {
        node,
        installations,
        workspace,
        build_vars: run.env.into_iter().collect(),
        probe_timeout: cfg.probe_timeout(),
        cancel: Some(cancel_rx),
    };

    match step.perform(&ctx).await {
        Ok(()) => Ok(0),
        Err(err) => {
            let code = err.exit_code();
            printer.error(&format!("{:#}", anyhow::Error::from(err)));
            Ok(code)
        }
    }
}
