use clap::Parser;
use lib_common::configs::{PipelineSettings, PolicyOverrides};
use lib_common::scrape::ColumnSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "hypermon.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "HyperMon API server for AllStarLink node activity", version)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[clap(long, env = "HYPERMON_HOST", help = "Address to bind the HTTP server to.")]
    pub host: Option<String>,

    #[clap(long, env = "HYPERMON_PORT", help = "Port to listen on for client requests.")]
    pub port: Option<u16>,

    #[clap(long, env = "HYPERMON_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "HYPERMON_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "HYPERMON_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "HYPERMON_KEYED_URL", help = "Upstream page listing the currently keyed nodes.")]
    pub keyed_url: Option<String>,

    #[clap(long, env = "HYPERMON_SEARCH_URL", help = "Upstream node directory search page.")]
    pub search_url: Option<String>,

    #[clap(long, env = "HYPERMON_CACHE_TTL_SECONDS", help = "Seconds a keyed-nodes snapshot is served without refetching.")]
    pub cache_ttl_seconds: Option<u64>,

    #[clap(long, env = "HYPERMON_TIMEOUT_SECONDS", help = "Total timeout for scraping the upstream pages.")]
    pub timeout_seconds: Option<u64>,

    #[clap(long, env = "HYPERMON_CONNECT_TIMEOUT_SECONDS", help = "Connect timeout for every outbound call.")]
    pub connect_timeout_seconds: Option<u64>,

    #[clap(long, env = "HYPERMON_PROXY_TIMEOUT_SECONDS", help = "Total timeout for link-management calls.")]
    pub proxy_timeout_seconds: Option<u64>,

    #[clap(long, env = "HYPERMON_USER_AGENT", help = "User-Agent sent upstream.")]
    pub user_agent: Option<String>,

    #[clap(long, env = "HYPERMON_VERIFY_TLS", help = "Verify upstream TLS certificates (true/false).")]
    pub verify_tls: Option<bool>,

    #[clap(long, env = "HYPERMON_REDIS_URL", help = "Keep the keyed-nodes snapshot in Redis instead of memory.")]
    pub redis_url: Option<String>,

    #[clap(long, env = "HYPERMON_SERVICE_NAME", help = "Service name reported by the health action.")]
    pub service_name: Option<String>,

    #[clap(long, env = "HYPERMON_CORS_ALLOW_ANY", help = "Send Access-Control-Allow-Origin: * (true/false).")]
    pub cors_allow_any: Option<bool>,

    /// Column layout override for the keyed feed. Config file only.
    #[clap(skip)]
    pub keyed_schema: Option<ColumnSchema>,

    /// Column layout override for the directory search page. Config file only.
    #[clap(skip)]
    pub directory_schema: Option<ColumnSchema>,
}

impl AppConfig {
    // Merge two configs, where 'other' overrides 'self' for Some values
    fn merge(self, other: AppConfig) -> AppConfig {
        AppConfig {
            host: other.host.or(self.host),
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            keyed_url: other.keyed_url.or(self.keyed_url),
            search_url: other.search_url.or(self.search_url),
            cache_ttl_seconds: other.cache_ttl_seconds.or(self.cache_ttl_seconds),
            timeout_seconds: other.timeout_seconds.or(self.timeout_seconds),
            connect_timeout_seconds: other.connect_timeout_seconds.or(self.connect_timeout_seconds),
            proxy_timeout_seconds: other.proxy_timeout_seconds.or(self.proxy_timeout_seconds),
            user_agent: other.user_agent.or(self.user_agent),
            verify_tls: other.verify_tls.or(self.verify_tls),
            redis_url: other.redis_url.or(self.redis_url),
            service_name: other.service_name.or(self.service_name),
            cors_allow_any: other.cors_allow_any.or(self.cors_allow_any),
            keyed_schema: other.keyed_schema.or(self.keyed_schema),
            directory_schema: other.directory_schema.or(self.directory_schema),
        }
    }

    /// Built-in defaults, the bottom layer.
    pub fn defaults() -> AppConfig {
        let pipeline = PipelineSettings::default();
        AppConfig {
            host: Some("0.0.0.0".to_string()),
            port: Some(8080),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            keyed_url: Some(pipeline.keyed_url),
            search_url: Some(pipeline.search_url),
            cache_ttl_seconds: Some(pipeline.cache_ttl_seconds),
            timeout_seconds: Some(pipeline.scrape_options.timeout_seconds),
            connect_timeout_seconds: Some(pipeline.scrape_options.connect_timeout_seconds),
            proxy_timeout_seconds: Some(pipeline.proxy_options.timeout_seconds),
            user_agent: Some(pipeline.scrape_options.user_agent),
            verify_tls: Some(pipeline.scrape_options.verify_tls),
            service_name: Some(pipeline.service_name),
            cors_allow_any: Some(true),
            ..Default::default()
        }
    }

    pub fn bind_address(&self) -> String {
        format!(
            "{}:{}",
            self.host.as_deref().unwrap_or("0.0.0.0"),
            self.port.unwrap_or(8080)
        )
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn cors_allow_any(&self) -> bool {
        self.cors_allow_any.unwrap_or(true)
    }

    /// The pipeline view of this configuration.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        let mut settings = PipelineSettings::default();
        if let Some(url) = &self.keyed_url {
            settings.keyed_url = url.clone();
        }
        if let Some(url) = &self.search_url {
            settings.search_url = url.clone();
        }
        if let Some(ttl) = self.cache_ttl_seconds {
            settings.set_cache_ttl(ttl);
        }
        if let Some(name) = &self.service_name {
            settings.service_name = name.clone();
        }
        if let Some(schema) = &self.keyed_schema {
            settings.keyed_schema = schema.clone();
        }
        if let Some(schema) = &self.directory_schema {
            settings.directory_schema = schema.clone();
        }
        settings.apply_policy(&PolicyOverrides {
            timeout_seconds: self.timeout_seconds,
            connect_timeout_seconds: self.connect_timeout_seconds,
            proxy_timeout_seconds: self.proxy_timeout_seconds,
            user_agent: self.user_agent.clone(),
            verify_tls: self.verify_tls,
        });
        settings
    }
}

/// Reads a JSON config file. Missing or unreadable files yield `None`.
fn read_config_file(path: &Path) -> Option<AppConfig> {
    if !path.exists() {
        tracing::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str::<AppConfig>(&raw) {
        Ok(file_config) => Some(file_config),
        Err(e) => {
            tracing::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// Layers defaults, the config file named by `cli` (or `hypermon.conf`),
/// then `cli` itself, which already includes environment variables.
pub fn resolve_config(cli: AppConfig) -> AppConfig {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current = AppConfig::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current = current.merge(file_config);
    }
    current.merge(cli)
}

/// Loads `.env`, parses the command line and resolves every layer.
pub fn load_config() -> AppConfig {
    let _ = dotenvy::dotenv();
    resolve_config(AppConfig::parse())
}
