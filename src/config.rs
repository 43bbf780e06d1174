use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

/// Top-level hub configuration, loaded once at startup and threaded
/// explicitly into every component constructor — there is no global
/// mutable config state anywhere in this crate.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub hub: HubConfig,
    pub transport: TransportConfig,
    pub tls: TlsConfig,
    pub room: RoomConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    pub bin: String,
    pub base_port: u16,
    pub port_range: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub certfile: Option<String>,
    #[serde(default)]
    pub keyfile: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    #[serde(default)]
    pub single_room_mode: bool,
    #[serde(default = "default_band_name")]
    pub band_name: String,
    #[serde(default = "default_reap_grace_secs")]
    pub reap_grace_secs: u64,
}

fn default_band_name() -> String {
    "The Band".to_string()
}

fn default_reap_grace_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "jamhub.db".to_string()
}

impl AppConfig {
    /// Load configuration from `jamhub.toml` (if present), overridden by
    /// individually-named environment variables: `HUB_HOST`, `HUB_PORT`,
    /// `TRANSPORT_BIN`, `TRANSPORT_BASE_PORT`, `TRANSPORT_PORT_RANGE`,
    /// `SSL_CERTFILE`, `SSL_KEYFILE`, `SINGLE_ROOM_MODE`, `BAND_NAME`,
    /// `JAMHUB_LOG_LEVEL`, `JAMHUB_LOG_FORMAT`, `JAMHUB_DB_PATH`,
    /// `ROOM_REAP_GRACE_SECS`.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("JAMHUB_CONFIG").unwrap_or_else(|_| "jamhub.toml".to_string());

        let mut builder = config::Config::builder()
            .set_default("hub.host", "0.0.0.0")?
            .set_default("hub.port", 8443)?
            .set_default("transport.bin", "jacktrip")?
            .set_default("transport.base_port", 61000)?
            .set_default("transport.port_range", 200)?
            .set_default("room.single_room_mode", false)?
            .set_default("room.band_name", default_band_name())?
            .set_default("room.reap_grace_secs", default_reap_grace_secs() as i64)?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            .set_default("database.path", default_db_path())?;

        if Path::new(&config_path).exists() {
            builder = builder.add_source(config::File::with_name(&config_path));
        } else {
            tracing::warn!("Config file '{}' not found, using defaults", config_path);
        }

        builder = apply_env_overrides(builder)?;

        let settings = builder.build()?;
        let config: AppConfig = settings.try_deserialize()?;
        Ok(config)
    }
}

fn apply_env_overrides(
    mut builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
    macro_rules! layer {
        ($env:literal, $key:literal) => {
            if let Ok(val) = std::env::var($env) {
                builder = builder.set_override($key, val)?;
            }
        };
    }

    layer!("HUB_HOST", "hub.host");
    layer!("HUB_PORT", "hub.port");
    layer!("TRANSPORT_BIN", "transport.bin");
    layer!("TRANSPORT_BASE_PORT", "transport.base_port");
    layer!("TRANSPORT_PORT_RANGE", "transport.port_range");
    layer!("SSL_CERTFILE", "tls.certfile");
    layer!("SSL_KEYFILE", "tls.keyfile");
    layer!("SINGLE_ROOM_MODE", "room.single_room_mode");
    layer!("BAND_NAME", "room.band_name");
    layer!("ROOM_REAP_GRACE_SECS", "room.reap_grace_secs");
    layer!("JAMHUB_LOG_LEVEL", "logging.level");
    layer!("JAMHUB_LOG_FORMAT", "logging.format");
    layer!("JAMHUB_DB_PATH", "database.path");

    Ok(builder)
}
