use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub export: ExportConfig,
    pub import: ImportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory export trees are written under; each export gets its own
    /// subdirectory.
    pub root_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// How many times to re-check for a destination project that is still
    /// being provisioned before giving up.
    pub project_retry_attempts: u32,
    /// Fixed delay between those checks.
    pub project_retry_delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            export: ExportConfig::default(),
            import: ImportConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3010,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            root_dir: "./exports".to_string(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            project_retry_attempts: 10,
            project_retry_delay_ms: 500,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional config file and
    /// environment variables with the `CONFIGRAPH_` prefix.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        config = config.add_source(config::File::with_name("config").required(false));

        config = config.add_source(
            config::Environment::with_prefix("CONFIGRAPH")
                .separator("_")
                .prefix_separator("_"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
