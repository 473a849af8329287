use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use reader::frame::LINE_KEY;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logs: LogsConfig,
    #[serde(default)]
    pub federation: FederationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogsConfig {
    /// Directory every requested filename is confined to
    pub base_path: String,
    /// Bytes read from disk per pull of a reverse read
    pub chunk_size: usize,
    /// Added to every JSON record as `svc`
    pub service_name: Option<String>,
    /// Extra static fields added to every JSON record
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Peer servers whose copy of the same log is merged into each response
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FederationConfig {
    /// `host[:port]` of each secondary server
    pub secondary_hosts: Vec<String>,
    /// `http` or `https`
    pub scheme: String,
    /// Per-peer request timeout; unset leaves the transport default
    pub timeout_secs: Option<u64>,
    /// Records buffered between the sources and the client
    pub channel_capacity: usize,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            secondary_hosts: vec![],
            scheme: "http".to_string(),
            timeout_secs: None,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    File { path: String },
}

impl AppConfig {
    /// Load configuration from server config files and environment variables
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        // Compile-time defaults fill any key missing from files/env
        let defaults = config::Config::try_from(&AppConfig::default())
            .context("Failed to serialize default configuration")?;

        let mut builder = config::Config::builder()
            .add_source(defaults);

        // Layer config files (overrides defaults)
        // 1. /etc/logtail/server.* (container/production)
        // 2. config/server.* (local development)
        // 3. crates/server/config/server.* (workspace root)
        let config_paths = vec![
            "/etc/logtail/server",
            "config/server",
            "crates/server/config/server",
        ];

        for path in config_paths {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Environment overrides everything: LOGTAIL_LOGS__BASE_PATH,
        // LOGTAIL_FEDERATION__SECONDARY_HOSTS=a:3000,b:3000
        builder = builder.add_source(
            config::Environment::with_prefix("LOGTAIL")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("federation.secondary_hosts")
                .with_list_parse_key("server.cors_origins")
                .try_parsing(true),
        );

        let mut config: AppConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.apply_legacy_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Honor the flat variables of earlier deployments
    /// (HTTP_HOST, HTTP_PORT, DEBUG, LOG_FORMAT, LOG_FILES_BASE_PATH,
    /// SECONDARY_HOSTS, SERVICE_NAME). Empty values are ignored.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let host = get("HTTP_HOST");
        let port = get("HTTP_PORT");
        if host.is_some() || port.is_some() {
            let (current_host, current_port) = split_host_port(&self.server.bind_address);
            self.server.bind_address = format!(
                "{}:{}",
                host.unwrap_or(current_host),
                port.unwrap_or(current_port),
            );
        }
        if get("DEBUG").as_deref() == Some("true") {
            self.logging.level = "debug".to_string();
        }
        match get("LOG_FORMAT").as_deref() {
            Some("json") => self.logging.format = LogFormat::Json,
            Some("console") | Some("pretty") => self.logging.format = LogFormat::Pretty,
            _ => {}
        }
        if let Some(base) = get("LOG_FILES_BASE_PATH") {
            self.logs.base_path = base;
        }
        if let Some(hosts) = get("SECONDARY_HOSTS") {
            self.federation.secondary_hosts = hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(service) = get("SERVICE_NAME") {
            self.logs.service_name = Some(service);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.server.bind_address.parse::<std::net::SocketAddr>()
            .context("Invalid bind_address")?;

        if self.logs.base_path.is_empty() {
            anyhow::bail!("logs.base_path must not be empty");
        }
        if self.logs.chunk_size == 0 {
            anyhow::bail!("logs.chunk_size must be > 0");
        }
        if self.logs.metadata.contains_key(LINE_KEY) {
            anyhow::bail!("logs.metadata must not define the reserved key '{}'", LINE_KEY);
        }

        if self.federation.channel_capacity == 0 {
            anyhow::bail!("federation.channel_capacity must be > 0");
        }
        if !matches!(self.federation.scheme.as_str(), "http" | "https") {
            anyhow::bail!("federation.scheme must be 'http' or 'https', got '{}'", self.federation.scheme);
        }
        for host in &self.federation.secondary_hosts {
            if host.is_empty() || host.contains(['/', '?', '#', ' ']) {
                anyhow::bail!("Invalid secondary host '{}': expected host[:port]", host);
            }
        }

        Ok(())
    }

    /// Static fields merged into every JSON record
    pub fn record_metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = self.logs.metadata.clone();
        if let Some(service) = &self.logs.service_name {
            metadata.insert("svc".to_string(), service.clone());
        }
        metadata
    }
}

fn split_host_port(addr: &str) -> (String, String) {
    match addr.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.to_string()),
        None => (addr.to_string(), "3000".to_string()),
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "0.0.0.0:3000".to_string(),
                enable_cors: false,
                cors_origins: vec![],
            },
            logs: LogsConfig {
                base_path: "/var/log".to_string(),
                chunk_size: reader::DEFAULT_CHUNK_SIZE,
                service_name: None,
                metadata: BTreeMap::new(),
            },
            federation: FederationConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
                output: LogOutput::Stdout,
            },
        }
    }
}
