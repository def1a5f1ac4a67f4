use std::{
    collections::HashMap,
    env,
    fs,
    path::PathBuf,
    time::Duration,
};

use directories::BaseDirs;

use crate::locator::RequiredVersion;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let config_path = default_config_path();
        let rc = fs::read_to_string(&config_path).ok();
        let mut cfg = Self::from_sources(rc.as_deref(), env::vars());
        cfg.config_path = config_path;
        cfg
    }

    /// Defaults, then `KEY=VALUE` lines from `rc`, then matching variables
    /// from `vars` (which take precedence).
    pub fn from_sources<I>(rc: Option<&str>, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut map = default_map();

        for line in rc.unwrap_or_default().lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((k, v)) = line.split_once('=') {
                map.insert(k.trim().to_string(), v.trim().to_string());
            }
        }

        for (k, v) in vars {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path: default_config_path() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).filter(|v| !v.is_empty()).cloned()
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse::<u64>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    /// `0` disables the limit.
    fn get_timeout(&self, key: &str, default: u64) -> Option<Duration> {
        match self.get_u64(key).unwrap_or(default) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn installations_path(&self) -> PathBuf {
        self.get_path("INSTALLATIONS_PATH")
            .unwrap_or_else(|| config_dir().join("installations.json"))
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        self.get_timeout("PROBE_TIMEOUT", 30)
    }

    pub fn script_timeout(&self) -> Option<Duration> {
        self.get_timeout("SCRIPT_TIMEOUT", 0)
    }

    pub fn default_python_version(&self) -> RequiredVersion {
        self.get("DEFAULT_PYTHON_VERSION")
            .and_then(|v| v.parse().ok())
            .unwrap_or(RequiredVersion::PYTHON3)
    }

    pub fn node_name(&self) -> String {
        self.get("NODE_NAME").unwrap_or_else(|| "built-in".into())
    }
}

fn is_config_key(k: &str) -> bool {
    // Accept known keys or PYRUN_* for forward-compat
    const KEYS: &[&str] = &[
        "INSTALLATIONS_PATH",
        "PROBE_TIMEOUT",
        "SCRIPT_TIMEOUT",
        "DEFAULT_PYTHON_VERSION",
        "NODE_NAME",
    ];

    KEYS.contains(&k) || k.starts_with("PYRUN_")
}

fn config_dir() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("pyrun")
}

fn default_config_path() -> PathBuf {
    config_dir().join(".pyrunrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    // Numbers (seconds)
    m.insert("PROBE_TIMEOUT".into(), "30".into());
    m.insert("SCRIPT_TIMEOUT".into(), "0".into());

    // Strings
    m.insert("DEFAULT_PYTHON_VERSION".into(), "3".into());
    m.insert("NODE_NAME".into(), "built-in".into());

    m
}
