//! Administrator-configured Python installations and their resolution.

use std::{collections::HashMap, fs, path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    config::Config,
    locator::{LocateError, ProbeOutcome, PythonExecutable, PythonLocator, RequiredVersion, PY_LAUNCHER},
    node::{file_name, Node},
    utils::expand_vars,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedInstallation {
    pub name: String,
    /// Interpreter file, or a directory containing one.
    pub home: String,
    pub version: RequiredVersion,
    /// Per-node home overrides, keyed by node name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub nodes: HashMap<String, String>,
}

impl NamedInstallation {
    #[cfg(test)]
    pub fn new(name: impl Into<String>, home: impl Into<String>, version: RequiredVersion) -> Self {
        Self {
            name: name.into(),
            home: home.into(),
            version,
            nodes: HashMap::new(),
        }
    }

    /// Home with `$VAR`/`${VAR}`/`%VAR%` expanded from the build environment.
    pub fn for_environment(&self, env: &HashMap<String, String>) -> Self {
        Self {
            home: expand_vars(&self.home, env),
            nodes: self
                .nodes
                .iter()
                .map(|(node, home)| (node.clone(), expand_vars(home, env)))
                .collect(),
            ..self.clone()
        }
    }

    /// Home as seen from `node`: its override when one is configured.
    pub fn home_for_node(&self, node: &str) -> &str {
        self.nodes.get(node).map_or(self.home.as_str(), String::as_str)
    }
}

/// Frozen snapshot of the configured installations. Cloning is cheap and a
/// snapshot never changes; reloading produces a new one.
#[derive(Debug, Clone, Default)]
pub struct Installations {
    entries: Arc<[NamedInstallation]>,
}

impl Installations {
    pub fn new(entries: Vec<NamedInstallation>) -> Self {
        Self { entries: entries.into() }
    }

    pub fn load(cfg: &Config) -> Result<Self> {
        Self::load_from(&cfg.installations_path())
    }

    /// A missing file means no installations are configured.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no installations file");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading installations file: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing installations file: {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let entries: Vec<NamedInstallation> = serde_json::from_str(text)?;
        let mut seen = std::collections::HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.name.as_str()) {
                anyhow::bail!("duplicate installation name: {}", entry.name);
            }
        }
        Ok(Self::new(entries))
    }

    /// Exact, case-sensitive name match.
    pub fn find(&self, name: &str) -> Option<&NamedInstallation> {
        self.entries.iter().find(|i| i.name == name)
    }

    /// Declared version of the named installation, if one is configured.
    pub fn version_of(&self, name: Option<&str>) -> Option<RequiredVersion> {
        name.and_then(|n| self.find(n)).map(|i| i.version)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedInstallation> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where a resolved interpreter came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Named(String),
    Located,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub executable: PythonExecutable,
    pub origin: Origin,
}

pub struct InstallationResolver<'a> {
    locator: PythonLocator<'a>,
    installations: Installations,
    build_env: HashMap<String, String>,
}

impl<'a> InstallationResolver<'a> {
    pub fn new(node: &'a dyn Node, installations: Installations) -> Self {
        Self {
            locator: PythonLocator::new(node),
            installations,
            build_env: HashMap::new(),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.locator = self.locator.with_probe_timeout(timeout);
        self
    }

    /// Variables used to expand installation homes, on top of the node's own.
    pub fn with_build_env(mut self, env: HashMap<String, String>) -> Self {
        self.build_env = env;
        self
    }

    /// Named installation first, then the platform search. Each step runs at
    /// most once.
    pub async fn resolve(&self, name: Option<&str>, wanted: RequiredVersion) -> Result<Resolution, LocateError> {
        let named = name.filter(|n| !n.is_empty()).and_then(|n| match self.installations.find(n) {
            None => {
                debug!(name = n, "no python installation with this name is configured");
                None
            }
            Some(installation) if installation.version != wanted => {
                warn!(
                    installation = n,
                    configured = %installation.version,
                    requested = %wanted,
                    "python installation is for a different major version"
                );
                None
            }
            found => found,
        });

        if let Some(installation) = named {
            if let Some(executable) = self.validate_named(installation).await? {
                return Ok(Resolution {
                    executable,
                    origin: Origin::Named(installation.name.clone()),
                });
            }
        }

        match self.locator.locate(wanted).await? {
            Some(executable) => {
                match name.filter(|n| !n.is_empty()) {
                    Some(n) => warn!(
                        installation = n,
                        "configured python installation was not used, using python found at {executable}"
                    ),
                    None => debug!("using python found at {executable}"),
                }
                Ok(Resolution { executable, origin: Origin::Located })
            }
            None => Err(LocateError::NotFound { version: wanted }),
        }
    }

    async fn validate_named(&self, installation: &NamedInstallation) -> Result<Option<PythonExecutable>, LocateError> {
        let node = self.locator.node();
        let mut env = self.locator.environment().await?.clone();
        env.extend(self.build_env.iter().map(|(k, v)| (k.clone(), v.clone())));

        let home = installation.for_environment(&env).home_for_node(node.name()).to_string();
        let Some(exe) = interpreter_in_home(node, &home, installation.version).await? else {
            warn!(installation = %installation.name, %home, "python installation home does not exist");
            return Ok(None);
        };

        let found = self.locator.probe(&exe, &[]).await?;
        if !found.is(installation.version.major()) {
            warn!(
                installation = %installation.name,
                path = %exe,
                found = %found,
                expected = %installation.version,
                "python installation reports a different major version"
            );
            return Ok(None);
        }

        let dispatch = if file_name(&exe).eq_ignore_ascii_case(PY_LAUNCHER) {
            vec![installation.version.dispatch_arg()]
        } else {
            Vec::new()
        };
        Ok(Some(PythonExecutable::with_dispatch(exe, dispatch)))
    }
}

/// The interpreter a home points at: the home itself when it is a file,
/// otherwise the first interpreter name found inside it.
async fn interpreter_in_home(
    node: &dyn Node,
    home: &str,
    version: RequiredVersion,
) -> Result<Option<String>, LocateError> {
    let fs = node.fs();
    if !fs.exists(home).await.map_err(|e| LocateError::io("inspect", home, e))? {
        return Ok(None);
    }
    if !fs.is_dir(home).await.map_err(|e| LocateError::io("inspect", home, e))? {
        return Ok(Some(home.to_string()));
    }

    let candidates: Vec<String> = if node.is_unix() {
        let versioned = format!("python{version}");
        vec![
            versioned.clone(),
            "python".into(),
            fs.join("bin", &versioned),
            fs.join("bin", "python"),
        ]
    } else {
        vec!["python.exe".into(), PY_LAUNCHER.into()]
    };
    for candidate in candidates {
        let path = fs.join(home, &candidate);
        let exists = fs.exists(&path).await.map_err(|e| LocateError::io("inspect", &path, e))?;
        if exists && !fs.is_dir(&path).await.map_err(|e| LocateError::io("inspect", &path, e))? {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("The python found at {path} has major version {found} but expected major version is {expected}.")]
    Mismatch {
        path: String,
        found: ProbeOutcome,
        expected: RequiredVersion,
    },
    #[error("No python found at {0}.")]
    Missing(String),
    #[error("Unable to check python version.")]
    Unchecked(#[source] LocateError),
}

/// Checks that `home` is (or contains) Python of the `expected` major version.
pub async fn validate_home(
    node: &dyn Node,
    home: &str,
    expected: RequiredVersion,
    probe_timeout: Option<Duration>,
) -> Result<PythonExecutable, ValidationError> {
    let locator = PythonLocator::new(node).with_probe_timeout(probe_timeout);
    let exe = interpreter_in_home(node, home, expected)
        .await
        .map_err(ValidationError::Unchecked)?
        .ok_or_else(|| ValidationError::Missing(home.to_string()))?;
    let found = locator.probe(&exe, &[]).await.map_err(ValidationError::Unchecked)?;
    if !found.is(expected.major()) {
        return Err(ValidationError::Mismatch { path: exe, found, expected });
    }
    Ok(PythonExecutable::new(exe))
}
