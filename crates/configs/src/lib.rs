use anyhow::Result;
use serde::Deserialize;
use anyhow::anyhow;

/// Fallback storage root when neither `STORAGE_PATH` nor the config file set one.
pub const DEFAULT_STORAGE_ROOT: &str = "data";

/// Storage root of the serverless deployment. Lives under `/tmp` and does not
/// survive a redeploy.
pub const SERVERLESS_STORAGE_ROOT: &str = "/tmp/tableau-blanc-data";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub worker_threads: Option<usize>,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3001,
            worker_threads: Some(4),
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// Which storage medium backs the key/value store.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    File,
    Realtime,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "file" => Ok(Self::File),
            "realtime" => Ok(Self::Realtime),
            other => Err(anyhow!("unknown storage backend `{other}` (expected local|file|realtime)")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Directory holding one `<key>.json` per entry (file backend, HTTP server).
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// When set, the file backend is reached over HTTP at this base URL
    /// (e.g. `http://localhost:3001/storage`) instead of the local directory.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Persistence file for the local backend; `None` keeps it purely in memory.
    #[serde(default)]
    pub local_file: Option<String>,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Serverless deployment: `root` is forced to [`SERVERLESS_STORAGE_ROOT`].
    /// Also enabled by `SERVERLESS=1`.
    #[serde(default)]
    pub serverless: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            root: default_storage_root(),
            endpoint: None,
            local_file: None,
            realtime: RealtimeConfig::default(),
            request_timeout_secs: default_request_timeout(),
            serverless: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RealtimeConfig {
    /// Database root, e.g. `https://<project>.firebaseio.com`.
    #[serde(default)]
    pub database_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_classifier_endpoint(),
            api_token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_body_limit() -> usize { 10 * 1024 * 1024 }
fn default_storage_root() -> String { DEFAULT_STORAGE_ROOT.to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_classifier_endpoint() -> String {
    "https://api-inference.huggingface.co/models/facebook/bart-large-mnli".to_string()
}

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    load_from_str(&content)
}

pub fn load_from_str(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    /// Load `config.toml` (or `CONFIG_PATH`), falling back to defaults when the
    /// file is absent, then apply env overrides and validate.
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = Self::load_or_default()?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    /// Like [`AppConfig::load_and_validate`] but without checking the storage
    /// backend settings, for processes that always serve the file backend.
    pub fn load_and_normalize() -> Result<Self> {
        let mut cfg = Self::load_or_default()?;
        cfg.normalize()?;
        Ok(cfg)
    }

    fn load_or_default() -> Result<Self> {
        match load_default() {
            Ok(cfg) => Ok(cfg),
            Err(e) if is_missing_file(&e) => Ok(AppConfig::default()),
            Err(e) => Err(e),
        }
    }

    pub fn normalize(&mut self) -> Result<()> {
        self.server.normalize_from_env()?;
        self.server.normalize()?;
        self.storage.normalize_from_env()?;
        Ok(())
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.normalize()?;
        self.storage.validate()?;
        Ok(())
    }
}

fn is_missing_file(e: &anyhow::Error) -> bool {
    e.downcast_ref::<std::io::Error>()
        .map(|io| io.kind() == std::io::ErrorKind::NotFound)
        .unwrap_or(false)
}

impl ServerConfig {
    fn normalize_from_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("SERVER_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("SERVER_PORT") {
            self.port = port
                .parse::<u16>()
                .map_err(|e| anyhow!("SERVER_PORT `{port}` is not a valid port: {e}"))?;
        }
        Ok(())
    }

    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "0.0.0.0".to_string();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be within 1..=65535"));
        }
        match self.worker_threads {
            Some(0) | None => self.worker_threads = Some(4),
            Some(_) => {}
        }
        if self.body_limit_bytes == 0 {
            self.body_limit_bytes = default_body_limit();
        }
        Ok(())
    }
}

impl StorageConfig {
    /// `STORAGE_PATH` wins over the file so a cloud-synced folder can be picked at launch.
    pub fn normalize_from_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("STORAGE_PATH") {
            if !path.trim().is_empty() {
                self.root = path;
            }
        }
        if let Ok(kind) = std::env::var("STORAGE_BACKEND") {
            self.backend = kind.parse()?;
        }
        if let Ok(flag) = std::env::var("SERVERLESS") {
            self.serverless = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        self.apply_serverless();
        if self.root.trim().is_empty() {
            self.root = default_storage_root();
        }
        Ok(())
    }

    fn apply_serverless(&mut self) {
        if self.serverless {
            self.root = SERVERLESS_STORAGE_ROOT.to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(anyhow!("storage.endpoint must start with http:// or https://"));
            }
        }
        if self.backend == BackendKind::Realtime {
            let url = self.realtime.database_url.trim();
            if url.is_empty() {
                return Err(anyhow!("storage.realtime.database_url is required for the realtime backend"));
            }
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(anyhow!("storage.realtime.database_url must start with http(s)://"));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("storage.request_timeout_secs must be a positive number of seconds"));
        }
        Ok(())
    }
}
