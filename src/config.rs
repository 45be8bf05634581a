//! Process configuration, loaded once at startup.

use std::time::Duration;

/// Runtime configuration for the simulator process.
///
/// Mirrors the teacher's `models::Config::from_env` shape: every field has a
/// sane default and can be overridden via an environment variable, loaded
/// through `dotenv` so a local `.env` file works during development.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub seed_path: Option<String>,
    pub cors_origins: Vec<String>,
    pub news_tick: Duration,
    pub price_tick: Duration,
    pub bot_tick: Duration,
    pub generator_tick: Duration,
    pub broadcast_tick: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        let seed_path = std::env::var("SEED_SNAPSHOT_PATH").ok();

        let cors_origins = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let news_tick_ms = env_u64("NEWS_TICK_MS", 1_000);
        let price_tick_ms = env_u64("PRICE_TICK_MS", 1_000);
        let bot_tick_ms = env_u64("BOT_TICK_MS", 850);
        let generator_tick_ms = env_u64("GENERATOR_TICK_MS", 5_000);
        let broadcast_tick_ms = env_u64("BROADCAST_TICK_MS", 500);

        Ok(Self {
            port,
            seed_path,
            cors_origins,
            news_tick: Duration::from_millis(news_tick_ms),
            price_tick: Duration::from_millis(price_tick_ms),
            bot_tick: Duration::from_millis(bot_tick_ms),
            generator_tick: Duration::from_millis(generator_tick_ms),
            broadcast_tick: Duration::from_millis(broadcast_tick_ms),
        })
    }
}

fn env_u64(var: &str, default: u64) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
