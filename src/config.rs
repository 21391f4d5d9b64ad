use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Opaque version identifier; changing it forces garbage collection of
  /// the previous version's partitions on the next activation.
  pub version: String,
  /// Origin the client application is served from, e.g. "http://127.0.0.1:8000"
  pub origin: String,
  /// Freshness window for read-only api entries, in seconds
  #[serde(default = "default_api_ttl_secs")]
  pub api_ttl_secs: u64,
  /// Path of the offline fallback document (always pre-cached)
  #[serde(default = "default_offline_fallback")]
  pub offline_fallback: String,
  #[serde(default)]
  pub precache: PrecacheConfig,
  #[serde(default)]
  pub routes: RouteConfig,
  /// Override for the cache database location
  pub cache_db: Option<PathBuf>,
}

fn default_api_ttl_secs() -> u64 {
  3600
}

fn default_offline_fallback() -> String {
  "/offline/".to_string()
}

/// Install manifest: URLs pre-warmed before the version may activate.
/// Supplied by the application build, not computed by the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrecacheConfig {
  /// Documents pre-warmed into the app-shell partition
  pub shell: Vec<String>,
  /// Assets pre-warmed into the static partition
  pub assets: Vec<String>,
}

impl Default for PrecacheConfig {
  fn default() -> Self {
    Self {
      shell: vec!["/".to_string(), "/register/".to_string()],
      assets: Vec::new(),
    }
  }
}

/// Classifier allow-lists. Defaults follow the POS application's URL map.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
  /// Authenticated or mutating surfaces; never intercepted
  pub exclude: Vec<String>,
  /// Read-only JSON endpoints cached stale-while-revalidate
  pub api: Vec<String>,
  /// Path prefixes always treated as static assets
  pub static_prefixes: Vec<String>,
  /// Filename extensions treated as static assets
  pub static_extensions: Vec<String>,
}

impl Default for RouteConfig {
  fn default() -> Self {
    Self {
      exclude: vec![
        "/user/".to_string(),
        "/staff_portal/".to_string(),
        "/admin".to_string(),
        "/i18n/".to_string(),
        "/csrf".to_string(),
        "/start-stripe-payment".to_string(),
        "/complete-stripe-payment".to_string(),
        "/endTransaction".to_string(),
        "/payments/api/intent".to_string(),
        "/payments/api/confirm".to_string(),
        "/payments/api/refund".to_string(),
        "/payments/api/process-refund".to_string(),
        "/payments/api/connection-token".to_string(),
      ],
      api: vec![
        "/payments/api/recent/".to_string(),
        "/payments/api/transaction/".to_string(),
        "/register/product_lookup/".to_string(),
      ],
      static_prefixes: vec!["/static/".to_string()],
      static_extensions: [
        "css",
        "js",
        "mjs",
        "map",
        "png",
        "jpg",
        "jpeg",
        "gif",
        "svg",
        "ico",
        "woff",
        "woff2",
        "ttf",
        "webmanifest",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
    }
  }
}

/// The fixed list of version-qualified partition names the current engine
/// version expects to exist. Anything else is garbage at activation time.
#[derive(Debug, Clone)]
pub struct PartitionSet {
  version: String,
}

impl PartitionSet {
  pub fn new(version: impl Into<String>) -> Self {
    Self {
      version: version.into(),
    }
  }

  pub fn app_shell(&self) -> String {
    format!("app-shell-{}", self.version)
  }

  pub fn static_assets(&self) -> String {
    format!("static-{}", self.version)
  }

  pub fn api(&self) -> String {
    format!("api-{}", self.version)
  }

  pub fn expected(&self) -> Vec<String> {
    vec![self.app_shell(), self.static_assets(), self.api()]
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./posworker.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/posworker/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/posworker/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("posworker.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("posworker").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  pub fn api_ttl(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.api_ttl_secs as i64)
  }

  pub fn partition_set(&self) -> PartitionSet {
    PartitionSet::new(&self.version)
  }

  /// Resolve an application path against the configured origin.
  pub fn resolve(&self, path: &str) -> Result<String> {
    let origin = Url::parse(&self.origin)
      .map_err(|e| eyre!("Invalid origin {}: {}", self.origin, e))?;
    let resolved = origin
      .join(path)
      .map_err(|e| eyre!("Invalid precache path {}: {}", path, e))?;
    Ok(resolved.to_string())
  }
}
