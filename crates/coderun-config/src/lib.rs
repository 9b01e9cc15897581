//! Configuration file discovery and parsing
//!
//! Searches for `.config/coderun.yaml` walking up from the current directory.
//! The project root is the parent of `.config/`. A project without a config
//! file runs with defaults rooted at the directory the search started from.

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{Result, eyre};
use serde::Deserialize;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::sync::OnceLock;

/// Configuration directory and file name
const CONFIG_DIR: &str = ".config";
const CONFIG_FILE_YAML: &str = "coderun.yaml";

const DEFAULT_STORAGE: &str = ".coderun/snapshots.json";
const DEFAULT_BIND: &str = "127.0.0.1:3000";
const DEFAULT_ASSETS_DIR: &str = "dist";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// coderun configuration from `.config/coderun.yaml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct CoderunConfig {
    /// Locale override for template titles (`en`, `zh`).
    /// When absent the host bridge is asked for its language.
    #[serde(default)]
    pub locale: Option<String>,

    /// Snapshot store file (relative to project root)
    #[serde(default)]
    pub storage: Option<String>,

    /// Host bridge configuration
    #[serde(default)]
    pub bridge: Option<BridgeConfig>,

    /// Script runner configuration
    #[serde(default)]
    pub runner: Option<RunnerConfig>,

    /// Relay server configuration
    #[serde(default)]
    pub relay: Option<RelayConfig>,
}

/// Host bridge configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct BridgeConfig {
    /// YAML workbook backing the fixture bridge (relative to project root)
    #[serde(default)]
    pub fixture: Option<String>,
}

/// Script runner configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct RunnerConfig {
    /// Operation budget per run; unlimited when absent
    #[serde(default)]
    pub max_operations: Option<u64>,

    /// Expose the module loaders (`import "<url>"` and `load_module`)
    #[serde(default)]
    pub modules: Option<bool>,

    /// How the `http` capability reaches the network
    #[serde(default)]
    pub http: Option<HttpRoute>,
}

/// Route taken by outbound HTTP calls made from snippets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpRoute {
    /// Perform the call in-process
    #[default]
    Direct,
    /// POST the call descriptor to a running relay
    Relay,
}

/// Relay server configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct RelayConfig {
    /// Listen address (default `127.0.0.1:3000`)
    #[serde(default)]
    pub bind: Option<String>,

    /// Base URL the runner uses to reach the relay.
    /// Defaults to `http://<bind>`.
    #[serde(default)]
    pub url: Option<String>,

    /// Directory of prebuilt UI assets (relative to project root)
    #[serde(default)]
    pub assets_dir: Option<String>,

    /// Hosts the relay may contact; empty allows every host
    #[serde(default)]
    pub allowed_hosts: Option<Vec<String>>,

    /// Bearer token required on relay requests
    #[serde(default)]
    pub token: Option<String>,

    /// Timeout for outbound calls (seconds)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Relay settings with defaults applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelay {
    pub bind: SocketAddr,
    pub url: String,
    pub assets_dir: Utf8PathBuf,
    pub allowed_hosts: Vec<String>,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

/// Runner settings with defaults applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRunner {
    pub max_operations: Option<u64>,
    pub modules: bool,
    pub http: HttpRoute,
}

impl Default for ResolvedRunner {
    fn default() -> Self {
        Self {
            max_operations: None,
            modules: true,
            http: HttpRoute::Direct,
        }
    }
}

/// Discovered configuration with resolved paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Project root (parent of .config/)
    pub root: Utf8PathBuf,
    /// Locale override
    pub locale: Option<String>,
    /// Absolute path to the snapshot store
    pub storage: Utf8PathBuf,
    /// Absolute path to the bridge workbook, if any
    pub fixture: Option<Utf8PathBuf>,
    pub runner: ResolvedRunner,
    pub relay: ResolvedRelay,
}

impl ResolvedConfig {
    /// Discover and load configuration from current directory.
    ///
    /// Falls back to defaults rooted at the current directory when no
    /// `.config/coderun.yaml` is found.
    pub fn discover() -> Result<Self> {
        let cwd = current_dir()?;
        match find_config_file(&cwd) {
            Some(path) => load_config(&path),
            None => resolve(cwd, CoderunConfig::default()),
        }
    }

    /// Load configuration from a specific project path (no walking up)
    pub fn discover_from(project_path: &Utf8Path) -> Result<Self> {
        let yaml_file = project_path.join(CONFIG_DIR).join(CONFIG_FILE_YAML);
        if yaml_file.exists() {
            load_config(&yaml_file)
        } else {
            resolve(project_path.to_owned(), CoderunConfig::default())
        }
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = env::current_dir()?;
    Utf8PathBuf::try_from(cwd).map_err(|e| {
        eyre!(
            "Current directory is not valid UTF-8: {}",
            e.as_path().display()
        )
    })
}

/// Search for `.config/coderun.yaml` walking up from `start`
fn find_config_file(start: &Utf8Path) -> Option<Utf8PathBuf> {
    let mut current = start;

    loop {
        let yaml_file = current.join(CONFIG_DIR).join(CONFIG_FILE_YAML);
        if yaml_file.exists() {
            return Some(yaml_file);
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

/// Load and resolve configuration from a config file path
fn load_config(config_path: &Utf8Path) -> Result<ResolvedConfig> {
    let content = fs::read_to_string(config_path)?;

    let config: CoderunConfig = serde_yaml::from_str(&content)
        .map_err(|e| eyre!("Failed to parse {}: {}", config_path, e))?;

    // Project root is the parent of .config/
    let config_dir = config_path
        .parent()
        .ok_or_else(|| eyre!("Config file has no parent directory"))?;
    let root = config_dir
        .parent()
        .ok_or_else(|| eyre!(".config directory has no parent"))?
        .to_owned();

    resolve(root, config)
}

/// Apply defaults and resolve paths relative to `root`
pub fn resolve(root: Utf8PathBuf, config: CoderunConfig) -> Result<ResolvedConfig> {
    let storage = root.join(config.storage.as_deref().unwrap_or(DEFAULT_STORAGE));

    let fixture = config
        .bridge
        .as_ref()
        .and_then(|b| b.fixture.as_deref())
        .map(|f| root.join(f));

    let runner = config
        .runner
        .map(|r| ResolvedRunner {
            max_operations: r.max_operations,
            modules: r.modules.unwrap_or(true),
            http: r.http.unwrap_or_default(),
        })
        .unwrap_or_default();

    let relay = config.relay.unwrap_or_default();
    let bind_str = relay.bind.as_deref().unwrap_or(DEFAULT_BIND);
    let bind: SocketAddr = bind_str
        .parse()
        .map_err(|e| eyre!("Invalid relay bind address '{}': {}", bind_str, e))?;
    let url = relay
        .url
        .unwrap_or_else(|| format!("http://{bind}"))
        .trim_end_matches('/')
        .to_string();
    let relay = ResolvedRelay {
        bind,
        url,
        assets_dir: root.join(relay.assets_dir.as_deref().unwrap_or(DEFAULT_ASSETS_DIR)),
        allowed_hosts: relay.allowed_hosts.unwrap_or_default(),
        token: relay.token.filter(|t| !t.is_empty()),
        timeout_secs: relay.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
    };

    Ok(ResolvedConfig {
        root,
        locale: config.locale,
        storage,
        fixture,
        runner,
        relay,
    })
}

// ============================================================================
// Global config access
// ============================================================================

/// Global resolved configuration
static RESOLVED_CONFIG: OnceLock<ResolvedConfig> = OnceLock::new();

/// Initialize the global config (call once at startup)
pub fn set_global_config(config: ResolvedConfig) -> Result<()> {
    RESOLVED_CONFIG
        .set(config)
        .map_err(|_| eyre!("Global config already initialized"))
}

/// Get the global config (returns None if not initialized)
pub fn global_config() -> Option<&'static ResolvedConfig> {
    RESOLVED_CONFIG.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config() {
        let config: CoderunConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.locale.is_none());
        assert!(config.relay.is_none());

        let resolved = resolve(Utf8PathBuf::from("/project"), config).unwrap();
        assert_eq!(resolved.storage, "/project/.coderun/snapshots.json");
        assert_eq!(resolved.relay.bind, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(resolved.relay.url, "http://127.0.0.1:3000");
        assert_eq!(resolved.relay.assets_dir, "/project/dist");
        assert_eq!(resolved.relay.timeout_secs, 30);
        assert!(resolved.runner.modules);
        assert_eq!(resolved.runner.http, HttpRoute::Direct);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
locale: zh
storage: state/snapshots.json
bridge:
  fixture: workbook.yaml
runner:
  max_operations: 50000
  modules: false
  http: relay
relay:
  bind: 0.0.0.0:8080
  url: http://relay.internal:8080/
  assets_dir: web
  allowed_hosts:
    - api.example.com
  token: secret
  timeout_secs: 5
"#;

        let config: CoderunConfig = serde_yaml::from_str(yaml).unwrap();
        let resolved = resolve(Utf8PathBuf::from("/p"), config).unwrap();
        assert_eq!(resolved.locale.as_deref(), Some("zh"));
        assert_eq!(resolved.storage, "/p/state/snapshots.json");
        assert_eq!(resolved.fixture.as_deref(), Some(Utf8Path::new("/p/workbook.yaml")));
        assert_eq!(resolved.runner.max_operations, Some(50000));
        assert!(!resolved.runner.modules);
        assert_eq!(resolved.runner.http, HttpRoute::Relay);
        assert_eq!(resolved.relay.url, "http://relay.internal:8080");
        assert_eq!(resolved.relay.allowed_hosts, vec!["api.example.com".to_string()]);
        assert_eq!(resolved.relay.token.as_deref(), Some("secret"));
        assert_eq!(resolved.relay.timeout_secs, 5);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result: Result<CoderunConfig, _> = serde_yaml::from_str("relya: {}");
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_bind_address() {
        let config: CoderunConfig = serde_yaml::from_str("relay:\n  bind: nowhere\n").unwrap();
        let err = resolve(Utf8PathBuf::from("/p"), config).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_discover_from_walks_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        fs::create_dir_all(root.join(CONFIG_DIR)).unwrap();
        fs::write(
            root.join(CONFIG_DIR).join(CONFIG_FILE_YAML),
            "storage: snaps.json\n",
        )
        .unwrap();

        let resolved = ResolvedConfig::discover_from(&root).unwrap();
        assert_eq!(resolved.root, root);
        assert_eq!(resolved.storage, root.join("snaps.json"));

        let nested = root.join("a/b");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(
            find_config_file(&nested),
            Some(root.join(CONFIG_DIR).join(CONFIG_FILE_YAML))
        );
    }
}
