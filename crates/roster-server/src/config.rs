//! Configuration management

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::ingest::pipeline::DEFAULT_BATCH_SIZE;
use crate::queue::ReconnectPolicy;
use crate::worker::DEFAULT_MAX_RETRIES;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 5000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/roster";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

// ============================================================================
// Queue and Ingestion Constants
// ============================================================================

pub const DEFAULT_RABBITMQ_URI: &str = "amqp://localhost:5672";

pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 5_000;

pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 60_000;

pub const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 10;

/// Default bcrypt cost for imported passwords.
pub const DEFAULT_PASSWORD_HASH_COST: u32 = 10;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub queue: QueueConfig,
    pub ingest: IngestConfig,
    pub worker: WorkerConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// Broker connection and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub uri: String,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub reconnect_max_attempts: u32,
    pub max_retries: u32,
}

impl QueueConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
            max_attempts: self.reconnect_max_attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub password_hash_cost: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub enabled: bool,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: env_string("ROSTER_HOST", DEFAULT_SERVER_HOST),
                port: env_or("PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or("ROSTER_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            database: DatabaseConfig {
                url: env_string("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
            },
            cors: CorsConfig {
                allowed_origins: env_string("CORS_ALLOWED_ORIGINS", DEFAULT_CORS_ALLOWED_ORIGIN)
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            queue: QueueConfig {
                uri: env_string("RABBITMQ_URI", DEFAULT_RABBITMQ_URI),
                reconnect_base_delay_ms: env_or(
                    "QUEUE_RECONNECT_BASE_DELAY_MS",
                    DEFAULT_RECONNECT_BASE_DELAY_MS,
                ),
                reconnect_max_delay_ms: env_or(
                    "QUEUE_RECONNECT_MAX_DELAY_MS",
                    DEFAULT_RECONNECT_MAX_DELAY_MS,
                ),
                reconnect_max_attempts: env_or(
                    "QUEUE_RECONNECT_MAX_ATTEMPTS",
                    DEFAULT_RECONNECT_MAX_ATTEMPTS,
                ),
                max_retries: env_or("QUEUE_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            },
            ingest: IngestConfig {
                batch_size: env_or("INGEST_BATCH_SIZE", DEFAULT_BATCH_SIZE),
                password_hash_cost: env_or("PASSWORD_HASH_COST", DEFAULT_PASSWORD_HASH_COST),
            },
            worker: WorkerConfig {
                enabled: env_or("WORKER_ENABLED", true),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.queue.uri.is_empty() {
            anyhow::bail!("RabbitMQ URI cannot be empty");
        }

        if self.queue.max_retries == 0 {
            anyhow::bail!("Queue max_retries must be greater than 0");
        }

        if self.ingest.batch_size == 0 {
            anyhow::bail!("Ingest batch_size must be greater than 0");
        }

        if !(4..=31).contains(&self.ingest.password_hash_cost) {
            anyhow::bail!(
                "Password hash cost must be between 4 and 31, got {}",
                self.ingest.password_hash_cost
            );
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
            },
            queue: QueueConfig {
                uri: DEFAULT_RABBITMQ_URI.to_string(),
                reconnect_base_delay_ms: DEFAULT_RECONNECT_BASE_DELAY_MS,
                reconnect_max_delay_ms: DEFAULT_RECONNECT_MAX_DELAY_MS,
                reconnect_max_attempts: DEFAULT_RECONNECT_MAX_ATTEMPTS,
                max_retries: DEFAULT_MAX_RETRIES,
            },
            ingest: IngestConfig {
                batch_size: DEFAULT_BATCH_SIZE,
                password_hash_cost: DEFAULT_PASSWORD_HASH_COST,
            },
            worker: WorkerConfig { enabled: true },
        }
    }
}
