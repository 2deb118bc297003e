use shared::DEFAULT_ROUND_SECONDS;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for the authoritative server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub tick_duration: Duration,
    pub max_clients: usize,
    pub client_timeout: Duration,
    pub round_seconds: f32,
    /// Start the first round as soon as the server is up.
    pub auto_start: bool,
    pub best_score_path: PathBuf,
    pub spawn_count: usize,
    pub max_item_value: u32,
}

impl ServerConfig {
    pub fn with_tick_rate(mut self, tick_rate: u32) -> Self {
        self.tick_duration = Duration::from_nanos(1_000_000_000 / u64::from(tick_rate.max(1)));
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            tick_duration: Duration::from_millis(33),
            max_clients: 16,
            client_timeout: Duration::from_secs(5),
            round_seconds: DEFAULT_ROUND_SECONDS,
            auto_start: true,
            best_score_path: PathBuf::from("best_score.json"),
            spawn_count: 10,
            max_item_value: 5,
        }
    }
}
