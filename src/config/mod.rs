use chrono::Duration;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub tenancy: TenancyConfig,
    pub integrity: IntegrityConfig,
    pub handles: HandleConfig,
    pub sweeper: SweeperConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Partition name is `<partition_prefix><tenant id>`
    pub partition_prefix: String,
    pub shared_partition: String,
}

/// Throttling and race-heuristic windows for one entity kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionPolicy {
    pub frequency_window_secs: i64,
    pub frequency_ceiling: u64,
    pub race_window_secs: i64,
    pub race_ceiling: u64,
}

impl VersionPolicy {
    pub fn frequency_window(&self) -> Duration {
        Duration::seconds(self.frequency_window_secs)
    }

    pub fn race_window(&self) -> Duration {
        Duration::seconds(self.race_window_secs)
    }

    /// Effectively disables both checks (bulk imports, tests)
    pub fn unthrottled() -> Self {
        Self {
            frequency_window_secs: 0,
            frequency_ceiling: u64::MAX,
            race_window_secs: 0,
            race_ceiling: u64::MAX,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityConfig {
    pub templates: VersionPolicy,
    pub consents: VersionPolicy,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            templates: VersionPolicy {
                frequency_window_secs: 60 * 60,
                frequency_ceiling: 5,
                race_window_secs: 2 * 60,
                race_ceiling: 2,
            },
            consents: VersionPolicy {
                frequency_window_secs: 24 * 60 * 60,
                frequency_ceiling: 3,
                race_window_secs: 5 * 60,
                race_ceiling: 2,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleConfig {
    pub ttl_minutes: i64,
}

impl HandleConfig {
    pub fn ttl(&self) -> Duration {
        Duration::minutes(self.ttl_minutes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    pub enabled: bool,
    /// 6-field cron expression (sec min hour day month weekday)
    pub schedule: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres base URL; no URL means the in-memory store
    pub url: Option<String>,
    pub max_connections: u32,
    pub operation_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn operation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::development()
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Tenancy overrides
        if let Ok(v) = env::var("TENANT_PARTITION_PREFIX") {
            self.tenancy.partition_prefix = v;
        }
        if let Ok(v) = env::var("TENANT_SHARED_PARTITION") {
            self.tenancy.shared_partition = v;
        }

        // Integrity overrides
        override_policy(&mut self.integrity.templates, "INTEGRITY_TEMPLATE");
        override_policy(&mut self.integrity.consents, "INTEGRITY_CONSENT");

        // Handle overrides
        if let Ok(v) = env::var("HANDLE_TTL_MINUTES") {
            self.handles.ttl_minutes = v.parse().unwrap_or(self.handles.ttl_minutes);
        }

        // Sweeper overrides
        if let Ok(v) = env::var("SWEEPER_ENABLED") {
            self.sweeper.enabled = v.parse().unwrap_or(self.sweeper.enabled);
        }
        if let Ok(v) = env::var("SWEEPER_SCHEDULE") {
            self.sweeper.schedule = v;
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_OPERATION_TIMEOUT_MS") {
            self.database.operation_timeout_ms = v.parse().unwrap_or(self.database.operation_timeout_ms);
        }

        // API overrides
        if let Some(port) = env::var("CONSENT_VAULT_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse().ok())
        {
            self.api.port = port;
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            tenancy: TenancyConfig::default(),
            integrity: IntegrityConfig::default(),
            handles: HandleConfig { ttl_minutes: 15 },
            sweeper: SweeperConfig {
                enabled: true,
                schedule: "0 0 0 * * *".to_string(),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                operation_timeout_ms: 30_000,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                operation_timeout_ms: 10_000,
            },
            ..Self::development()
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                operation_timeout_ms: 5_000,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: false,
            },
            ..Self::development()
        }
    }
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            partition_prefix: "tenant_db_".to_string(),
            shared_partition: "consent_shared".to_string(),
        }
    }
}

fn override_policy(policy: &mut VersionPolicy, prefix: &str) {
    if let Ok(v) = env::var(format!("{}_FREQUENCY_WINDOW_SECS", prefix)) {
        policy.frequency_window_secs = v.parse().unwrap_or(policy.frequency_window_secs);
    }
    if let Ok(v) = env::var(format!("{}_FREQUENCY_CEILING", prefix)) {
        policy.frequency_ceiling = v.parse().unwrap_or(policy.frequency_ceiling);
    }
    if let Ok(v) = env::var(format!("{}_RACE_WINDOW_SECS", prefix)) {
        policy.race_window_secs = v.parse().unwrap_or(policy.race_window_secs);
    }
    if let Ok(v) = env::var(format!("{}_RACE_CEILING", prefix)) {
        policy.race_ceiling = v.parse().unwrap_or(policy.race_ceiling);
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
