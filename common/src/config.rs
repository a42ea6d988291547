// Configuration management with layered configuration (file, env)

use crate::cursor::MAX_CATCHUP_SECONDS;
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub redis: RedisConfig,
    pub cluster: ClusterConfig,
    pub scheduler: SchedulerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Prefix of every coordination key
    pub name: String,
    /// Identity written into the leader lock; derived when unset
    #[serde(default)]
    pub process_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub lock_ttl_seconds: u64,
    pub max_catchup_seconds: u64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    #[serde(default)]
    pub metrics_port: Option<u16>,
    #[serde(default)]
    pub tracing_endpoint: Option<String>,
}

impl Settings {
    /// Load configuration with layered precedence: file → local file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let defaults = Settings::default();

        let builder = Config::builder()
            .set_default("redis.url", defaults.redis.url)?
            .set_default("cluster.name", defaults.cluster.name)?
            .set_default(
                "scheduler.lock_ttl_seconds",
                defaults.scheduler.lock_ttl_seconds,
            )?
            .set_default(
                "scheduler.max_catchup_seconds",
                defaults.scheduler.max_catchup_seconds,
            )?
            .set_default("scheduler.timezone", defaults.scheduler.timezone)?
            .set_default("observability.log_level", defaults.observability.log_level)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Local overrides (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.redis.url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }

        if self.cluster.name.is_empty() {
            return Err("Cluster name cannot be empty".to_string());
        }
        if matches!(&self.cluster.process_name, Some(name) if name.trim().is_empty()) {
            return Err("Cluster process_name cannot be blank".to_string());
        }

        // The holder must keep the lock across the gap between two passes
        if self.scheduler.lock_ttl_seconds <= 60 {
            return Err("Scheduler lock_ttl_seconds must be greater than 60".to_string());
        }
        if self.scheduler.max_catchup_seconds < 60 {
            return Err("Scheduler max_catchup_seconds must be at least 60".to_string());
        }
        if self.scheduler.max_catchup_seconds > MAX_CATCHUP_SECONDS {
            return Err(format!(
                "Scheduler max_catchup_seconds must be at most {}",
                MAX_CATCHUP_SECONDS
            ));
        }
        self.timezone()?;

        Ok(())
    }

    /// Timezone the cron fields are evaluated in
    pub fn timezone(&self) -> Result<Tz, String> {
        self.scheduler
            .timezone
            .parse::<Tz>()
            .map_err(|e| format!("Invalid scheduler timezone: {}", e))
    }

    /// Identity this process writes into the leader lock
    ///
    /// Configured name, else `<HOSTNAME>-<pid>`, else a random one. Call once
    /// at start-up and keep the result.
    pub fn process_identity(&self) -> String {
        if let Some(name) = &self.cluster.process_name {
            return name.clone();
        }
        match std::env::var("HOSTNAME") {
            Ok(host) if !host.is_empty() => format!("{}-{}", host, std::process::id()),
            _ => format!("scheduler-{}", uuid::Uuid::new_v4()),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
            },
            cluster: ClusterConfig {
                name: "cron".to_string(),
                process_name: None,
            },
            scheduler: SchedulerConfig {
                lock_ttl_seconds: 90,
                max_catchup_seconds: 24 * 60 * 60,
                timezone: default_timezone(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: None,
                tracing_endpoint: None,
            },
        }
    }
}
