use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub realtime: RealtimeConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Remote realtime endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Endpoint that mints a short-lived access credential
    pub token_url: String,
    /// Base URL of the realtime endpoint
    pub base_url: String,
    /// Model identifier passed on negotiation
    pub model: String,
    /// System context seeded into the conversation on session start
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Capture chunk cadence in milliseconds
    pub chunk_ms: u64,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
