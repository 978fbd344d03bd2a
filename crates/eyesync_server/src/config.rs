use std::env;
use std::path::PathBuf;

/// Where room stores keep their data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// One SQLite file per room under `DATA_DIR/rooms`
    Sqlite,
    /// Process memory; everything is lost on restart
    Memory,
}

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 3040)
    pub port: u16,
    /// Data directory for room databases (default: ./eyesync_data)
    pub data_dir: PathBuf,
    /// Storage backend (default: sqlite)
    pub storage: StorageBackend,
    /// Room used when a request has no `room` parameter (default: default)
    pub default_room: String,
    /// Key used when a request has no `key` parameter (default: left)
    pub default_key: String,
    /// Largest accepted PUT body in bytes (default: 16 MiB)
    pub max_body_bytes: usize,
    /// CORS allowed origins (comma-separated, `*` for any)
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3040,
            data_dir: PathBuf::from("./eyesync_data"),
            storage: StorageBackend::Sqlite,
            default_room: "default".to_string(),
            default_key: "left".to_string(),
            max_body_bytes: 16 * 1024 * 1024,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Config::default();

        let host = env::var("HOST").unwrap_or(defaults.host);
        let port = match env::var("PORT") {
            Ok(port) => port.parse().map_err(|_| ConfigError::InvalidPort)?,
            Err(_) => defaults.port,
        };

        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let storage = match env::var("STORAGE").as_deref() {
            Ok("sqlite") | Err(_) => StorageBackend::Sqlite,
            Ok("memory") => StorageBackend::Memory,
            Ok(other) => return Err(ConfigError::InvalidStorage(other.to_string())),
        };

        let default_room = env::var("DEFAULT_ROOM").unwrap_or(defaults.default_room);
        let default_key = env::var("DEFAULT_KEY").unwrap_or(defaults.default_key);

        let max_body_bytes = match env::var("MAX_BODY_BYTES") {
            Ok(limit) => limit.parse().map_err(|_| ConfigError::InvalidBodyLimit)?,
            Err(_) => defaults.max_body_bytes,
        };

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Config {
            host,
            port,
            data_dir,
            storage,
            default_room,
            default_key,
            max_body_bytes,
            cors_origins,
        })
    }

    /// Get the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Directory holding one database per room
    pub fn rooms_dir(&self) -> PathBuf {
        self.data_dir.join("rooms")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidStorage(String),
    InvalidBodyLimit,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "Invalid PORT environment variable"),
            ConfigError::InvalidStorage(value) => write!(
                f,
                "Invalid STORAGE environment variable '{}' (expected 'sqlite' or 'memory')",
                value
            ),
            ConfigError::InvalidBodyLimit => {
                write!(f, "Invalid MAX_BODY_BYTES environment variable")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
