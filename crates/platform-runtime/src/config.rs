//! Environment-driven runtime configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Which store backs the repository ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Concurrent maps; dev profile and tests.
    Memory,
    /// RocksDB at `data_dir`; production profile (requires the `rocksdb`
    /// feature).
    Rocks,
}

/// Runtime configuration. Every field has an environment override
/// (`CAMPUSPOST_*`) and a dev-friendly default.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bind_addr: SocketAddr,
    pub storage: StorageBackend,
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    /// Managed-prefix length for L2 couriers (see the courier subsystem's
    /// configuration knob).
    pub l2_prefix_len: usize,
    pub scheduler_workers: usize,
    /// Emit JSON log lines instead of the human format.
    pub log_json: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().unwrap_or_else(|_| {
                SocketAddr::from(([127, 0, 0, 1], 8080))
            }),
            storage: StorageBackend::Memory,
            data_dir: PathBuf::from("./data"),
            jwt_secret: "campuspost-dev-secret".to_string(),
            l2_prefix_len: 4,
            scheduler_workers: 4,
            log_json: false,
        }
    }
}

impl RuntimeConfig {
    /// Load from the environment, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("CAMPUSPOST_BIND") {
            if let Ok(parsed) = addr.parse() {
                config.bind_addr = parsed;
            }
        }
        if let Ok(backend) = std::env::var("CAMPUSPOST_STORAGE") {
            config.storage = match backend.as_str() {
                "rocksdb" => StorageBackend::Rocks,
                _ => StorageBackend::Memory,
            };
        }
        if let Ok(dir) = std::env::var("CAMPUSPOST_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(secret) = std::env::var("CAMPUSPOST_JWT_SECRET") {
            config.jwt_secret = secret;
        }
        if let Ok(len) = std::env::var("CAMPUSPOST_L2_PREFIX_LEN") {
            if let Ok(parsed) = len.parse::<usize>() {
                // Only school or area scope makes sense for L2.
                if parsed == 2 || parsed == 4 {
                    config.l2_prefix_len = parsed;
                }
            }
        }
        if let Ok(workers) = std::env::var("CAMPUSPOST_SCHEDULER_WORKERS") {
            if let Ok(parsed) = workers.parse::<usize>() {
                config.scheduler_workers = parsed.clamp(1, 64);
            }
        }
        if let Ok(json) = std::env::var("CAMPUSPOST_LOG_JSON") {
            config.log_json = json == "1" || json.eq_ignore_ascii_case("true");
        }
        config
    }
}
