// apps/kernel-server/src/config.rs
// Purpose: Typed process configuration, loaded once from the environment.
// Architecture: Boot-time configuration layer
// Dependencies: std::env

use std::env;
use std::time::Duration;

/// All configuration knobs enumerated in spec.md §6. Every field has the
/// default stated in the spec; unset or empty environment variables fall
/// back to it rather than failing startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_port: u16,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub external_orchestration_base_url: String,
    pub bearer_token: Option<String>,
    pub cors_origins: Vec<String>,
    pub heartbeat_interval: Duration,
    pub dispatcher_interval: Duration,
    pub write_deadline: Duration,
    pub pong_deadline: Duration,
    pub ping_period: Duration,
    pub snapshot_messages_limit: i64,
    pub hub_send_buffer: usize,
    pub http_timeout: Duration,
}

impl Config {
    /// Reads every key from the process environment. Mirrors the teacher's
    /// scattered `std::env::var` reads (`KERNEL_PORT`, `REDIS_URL`,
    /// `AGENT_HOST`/`AGENT_PORT`) but collects them into one struct so the
    /// rest of the crate never touches `std::env` directly.
    pub fn from_env() -> Self {
        let pong_deadline = Duration::from_secs(env_u64("PONG_DEADLINE_SECS", 60));
        let ping_period = Duration::from_millis(pong_deadline.as_millis() as u64 * 9 / 10);

        Config {
            listen_port: env_u16("LISTEN_PORT", 3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/devswarm".to_string()),
            redis_url: env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            external_orchestration_base_url: env::var("EXTERNAL_ORCHESTRATION_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string()),
            bearer_token: env::var("BEARER_TOKEN").ok().filter(|s| !s.is_empty()),
            cors_origins: env::var("CORS_ORIGINS")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| s.split(',').map(|o| o.trim().to_string()).collect())
                .unwrap_or_else(|| vec!["http://localhost:3000".to_string()]),
            heartbeat_interval: Duration::from_secs(env_u64("HEARTBEAT_INTERVAL_SECS", 30)),
            dispatcher_interval: Duration::from_secs(env_u64("DISPATCHER_INTERVAL_SECS", 2)),
            write_deadline: Duration::from_secs(env_u64("WRITE_DEADLINE_SECS", 10)),
            pong_deadline,
            ping_period,
            snapshot_messages_limit: env_u64("SNAPSHOT_MESSAGES_LIMIT", 20) as i64,
            hub_send_buffer: env_u64("HUB_SEND_BUFFER", 256) as usize,
            http_timeout: Duration::from_secs(env_u64("HTTP_TIMEOUT_SECS", 30)),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
