//! Server configuration for the EdgeCache license API.
//!
//! All configuration is loaded from environment variables, after an
//! optional `.env` file has been merged in by `main`.

use std::net::SocketAddr;

use edgecache_core::EngineConfig;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DB_PATH: &str = "storage/license.redb";

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Storage backend type and its location.
    pub storage_backend: StorageBackendType,
    /// Log level filter (e.g., `info`, `debug`, `edgecache_core=debug`).
    pub log_level: String,
    /// Optional JSON-lines mirror of the audit trail.
    pub audit_file_path: Option<String>,
    /// Key that bootstraps a `pro` license on first activation.
    pub master_key: Option<String>,
    /// HMAC secret for request signatures. Empty disables the check.
    pub signing_secret: String,
    /// Token for the internal admin routes. Empty rejects every admin call.
    pub admin_token: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_requests: u64,
    /// Include error details in 500 responses.
    pub debug: bool,
}

/// Supported storage backend types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// Redb persistent storage.
    Redb { path: String },
    /// `RocksDB` persistent storage.
    RocksDb { path: String },
    /// PostgreSQL persistent storage.
    Postgres { url: String },
}

impl StorageBackendType {
    /// Filesystem path of an embedded backend.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Redb { path } | Self::RocksDb { path } => Some(path),
            Self::Memory | Self::Postgres { .. } => None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `EDGECACHE_BIND_ADDR`: full bind address (default: `127.0.0.1:8080`)
    /// - `PORT`: port to bind on `0.0.0.0` when no bind address is set
    /// - `EDGECACHE_STORAGE`: `memory`, `redb`, `rocksdb`, or `postgres`
    ///   (default: `postgres` when `DATABASE_URL` is set, else `redb`)
    /// - `DB_PATH`: path for embedded backends (default: `storage/license.redb`)
    /// - `DATABASE_URL`: PostgreSQL connection string
    /// - `EDGECACHE_MASTER_KEY`: bootstrap license key (optional)
    /// - `SIGNING_SECRET`: request signature secret (optional)
    /// - `ADMIN_TOKEN`: admin route token (optional)
    /// - `RATE_LIMIT_WINDOW_SECONDS`: limiter window (default: `60`)
    /// - `RATE_LIMIT_MAX_REQUESTS`: hits per window (default: `60`)
    /// - `APP_DEBUG`: expose error details (default: `false`)
    /// - `EDGECACHE_LOG_LEVEL`: log filter (default: `info`)
    /// - `EDGECACHE_AUDIT_FILE`: path to audit log file (optional)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let default_addr = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT));
        let bind_addr = if let Some(addr) = var("EDGECACHE_BIND_ADDR") {
            addr.trim().parse().unwrap_or(default_addr)
        } else if let Some(port) = var("PORT") {
            SocketAddr::from(([0, 0, 0, 0], port.trim().parse().unwrap_or(DEFAULT_PORT)))
        } else {
            default_addr
        };

        let db_path = var("DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_owned());
        let database_url = var("DATABASE_URL");

        let storage_kind = var("EDGECACHE_STORAGE").map_or_else(
            || {
                if database_url.is_some() {
                    "postgres".to_owned()
                } else {
                    "redb".to_owned()
                }
            },
            |v| v.trim().to_lowercase(),
        );
        let storage_backend = match storage_kind.as_str() {
            "memory" => StorageBackendType::Memory,
            "rocksdb" => StorageBackendType::RocksDb { path: db_path },
            "postgres" | "postgresql" => StorageBackendType::Postgres {
                url: database_url
                    .unwrap_or_else(|| "postgres://localhost/edgecache".to_owned()),
            },
            _ => StorageBackendType::Redb { path: db_path },
        };

        let parse_u64 = |name: &str| {
            var(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(60)
        };

        Self {
            bind_addr,
            storage_backend,
            log_level: var("EDGECACHE_LOG_LEVEL").unwrap_or_else(|| "info".to_owned()),
            audit_file_path: var("EDGECACHE_AUDIT_FILE"),
            master_key: var("EDGECACHE_MASTER_KEY"),
            signing_secret: lookup("SIGNING_SECRET").unwrap_or_default(),
            admin_token: lookup("ADMIN_TOKEN").unwrap_or_default(),
            rate_limit_window_secs: parse_u64("RATE_LIMIT_WINDOW_SECONDS"),
            rate_limit_max_requests: parse_u64("RATE_LIMIT_MAX_REQUESTS"),
            debug: var("APP_DEBUG").is_some_and(|v| is_truthy(&v)),
        }
    }

    /// The engine's share of the configuration.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            master_key: self.master_key.clone(),
            rate_limit_window_secs: self.rate_limit_window_secs,
            rate_limit_max_requests: self.rate_limit_max_requests,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |set: bool| if set { "[REDACTED]" } else { "" };
        let storage = match &self.storage_backend {
            StorageBackendType::Postgres { .. } => "postgres".to_owned(),
            other => format!("{other:?}"),
        };
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("storage_backend", &storage)
            .field("log_level", &self.log_level)
            .field("audit_file_path", &self.audit_file_path)
            .field("master_key", &redact(self.master_key.is_some()))
            .field("signing_secret", &redact(!self.signing_secret.is_empty()))
            .field("admin_token", &redact(!self.admin_token.is_empty()))
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("debug", &self.debug)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]);
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert_eq!(
            config.storage_backend,
            StorageBackendType::Redb {
                path: "storage/license.redb".to_owned()
            }
        );
        assert_eq!(config.rate_limit_window_secs, 60);
        assert_eq!(config.rate_limit_max_requests, 60);
        assert!(config.master_key.is_none());
        assert!(config.signing_secret.is_empty());
        assert!(config.admin_token.is_empty());
        assert!(!config.debug);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn port_binds_all_interfaces_unless_addr_given() {
        assert_eq!(
            load(&[("PORT", "9000")]).bind_addr,
            SocketAddr::from(([0, 0, 0, 0], 9000))
        );
        assert_eq!(
            load(&[("PORT", "9000"), ("EDGECACHE_BIND_ADDR", "10.1.2.3:7000")]).bind_addr,
            SocketAddr::from(([10, 1, 2, 3], 7000))
        );
    }

    #[test]
    fn database_url_selects_postgres_by_default() {
        let config = load(&[("DATABASE_URL", "postgres://db/licenses")]);
        assert_eq!(
            config.storage_backend,
            StorageBackendType::Postgres {
                url: "postgres://db/licenses".to_owned()
            }
        );
        assert!(!format!("{config:?}").contains("postgres://db/licenses"));
    }

    #[test]
    fn explicit_storage_wins() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/licenses"),
            ("EDGECACHE_STORAGE", "RocksDB"),
            ("DB_PATH", "/var/lib/edgecache"),
        ]);
        assert_eq!(
            config.storage_backend,
            StorageBackendType::RocksDb {
                path: "/var/lib/edgecache".to_owned()
            }
        );
        assert_eq!(config.storage_backend.path(), Some("/var/lib/edgecache"));
    }

    #[test]
    fn bad_rate_limits_fall_back_to_defaults() {
        let config = load(&[
            ("RATE_LIMIT_WINDOW_SECONDS", "0"),
            ("RATE_LIMIT_MAX_REQUESTS", "lots"),
        ]);
        assert_eq!(config.rate_limit_window_secs, 60);
        assert_eq!(config.rate_limit_max_requests, 60);

        let config = load(&[
            ("RATE_LIMIT_WINDOW_SECONDS", "30"),
            ("RATE_LIMIT_MAX_REQUESTS", "5"),
        ]);
        assert_eq!(config.rate_limit_window_secs, 30);
        assert_eq!(config.rate_limit_max_requests, 5);
    }

    #[test]
    fn debug_flag_and_secret_redaction() {
        let config = load(&[
            ("APP_DEBUG", "true"),
            ("EDGECACHE_MASTER_KEY", "MASTER"),
            ("SIGNING_SECRET", "sign-me"),
            ("ADMIN_TOKEN", "admin-123"),
        ]);
        assert!(config.debug);
        assert_eq!(config.engine_config().master_key.as_deref(), Some("MASTER"));

        let rendered = format!("{config:?}");
        assert!(!rendered.contains("MASTER"));
        assert!(!rendered.contains("sign-me"));
        assert!(!rendered.contains("admin-123"));
    }
}
