use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

static CONFIG: OnceLock<Config> = OnceLock::new();

// --- CONFIG AGGREGATOR ---

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub streaming: StreamingConfig,
}

impl Config {
    pub fn global() -> &'static Config {
        CONFIG.get_or_init(Self::load)
    }

    pub fn load() -> Self {
        dotenv::dotenv().ok();
        Self {
            server: ServerConfig::load(),
            log: LogConfig::load(),
            streaming: StreamingConfig::load(),
        }
    }
}

// --- MODULES ---

// SERVER
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl ServerConfig {
    pub fn load() -> Self {
        Self {
            host:      get_env("SERVER_HOST", "127.0.0.1".to_string()),
            port:      get_env("SERVER_PORT", 7700),
            log_level: get_env("FLOWTAIL_LOG", "info".to_string()),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7700,
            log_level: "info".to_string(),
        }
    }
}

// CURSOR LOG
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub actor_channel_capacity: usize,
    pub manager_channel_capacity: usize,
    pub max_entries_per_key: usize,
}

impl LogConfig {
    pub fn load() -> Self {
        let d = Self::default();
        Self {
            actor_channel_capacity:   get_env("LOG_ACTOR_CHAN_CAP", d.actor_channel_capacity),
            manager_channel_capacity: get_env("LOG_MANAGER_CHAN_CAP", d.manager_channel_capacity),
            max_entries_per_key:      get_env("LOG_MAX_ENTRIES_PER_KEY", d.max_entries_per_key),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            actor_channel_capacity: 1024,
            manager_channel_capacity: 256,
            max_entries_per_key: 100_000,
        }
    }
}

// STREAMING
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Wait between checks while a session has no subscriptions.
    pub idle_interval_ms: u64,
    /// Max time one read blocks waiting for new entries.
    pub block_ms: u64,
    /// Max entries returned by one read.
    pub batch_size: usize,
    pub control_channel_capacity: usize,
    pub outbound_channel_capacity: usize,
    /// Block time of request/response pull reads. 0 returns immediately.
    pub pull_block_ms: u64,
}

impl StreamingConfig {
    pub fn load() -> Self {
        let d = Self::default();
        Self {
            idle_interval_ms:          get_env("STREAM_IDLE_INTERVAL_MS", d.idle_interval_ms),
            block_ms:                  get_env("STREAM_BLOCK_MS", d.block_ms),
            batch_size:                get_env("STREAM_BATCH_SIZE", d.batch_size),
            control_channel_capacity:  get_env("STREAM_CONTROL_CHAN_CAP", d.control_channel_capacity),
            outbound_channel_capacity: get_env("STREAM_OUTBOUND_CHAN_CAP", d.outbound_channel_capacity),
            pull_block_ms:             get_env("PULL_BLOCK_MS", d.pull_block_ms),
        }
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn block(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }

    pub fn pull_block(&self) -> Duration {
        Duration::from_millis(self.pull_block_ms)
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            idle_interval_ms: 50,
            block_ms: 500,
            batch_size: 100,
            control_channel_capacity: 64,
            outbound_channel_capacity: 256,
            pull_block_ms: 0,
        }
    }
}

// --- PRIVATE HELPER ---

fn get_env<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            eprintln!("Config warning: {} has invalid value {:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
