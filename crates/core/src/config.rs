//! Loader configuration for proxying and media resolution.
//!
//! Configuration can be loaded from a TOML file, environment variables, or
//! created programmatically.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use artwork_media::{CorsProxy, HttpMediaResolver, MediaResolver, UrlResolver};
use serde::{Deserialize, Serialize};

/// Configuration for source URL resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtworkConfig {
    /// Host of the CORS proxy, `None` to fetch everything directly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors_proxy_host: Option<String>,
    /// Hosts fetched without the proxy
    pub non_cors_proxy_domains: Vec<String>,
    /// URL scheme prefixes that bypass resolution (e.g. `hubs:`)
    pub internal_schemes: Vec<String>,
    /// Endpoint of the media resolution service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolver_endpoint: Option<String>,
    /// Protocol for protocol-relative URLs returned by the resolver
    pub page_protocol: String,
    /// Ask the resolver for low-quality renditions
    pub low_quality: bool,
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        Self {
            cors_proxy_host: None,
            non_cors_proxy_domains: Vec::new(),
            internal_schemes: vec!["hubs:".to_string()],
            resolver_endpoint: None,
            page_protocol: "https:".to_string(),
            low_quality: false,
        }
    }
}

impl ArtworkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the CORS proxy host.
    pub fn with_cors_proxy(mut self, host: impl Into<String>) -> Self {
        self.cors_proxy_host = Some(host.into());
        self
    }

    /// Sets the hosts that skip the CORS proxy.
    pub fn with_non_cors_proxy_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_cors_proxy_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_internal_schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.internal_schemes = schemes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the media resolution service endpoint.
    pub fn with_resolver_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.resolver_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_page_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.page_protocol = protocol.into();
        self
    }

    pub fn with_low_quality(mut self, low_quality: bool) -> Self {
        self.low_quality = low_quality;
        self
    }

    /// Returns the default config file location for the current platform.
    ///
    /// - macOS: ~/Library/Application Support/artwork-loader/config.toml
    /// - Linux: ~/.config/artwork-loader/config.toml
    /// - Windows: %APPDATA%\artwork-loader\config.toml
    pub fn default_config_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("artwork-loader").join("config.toml")
        } else {
            PathBuf::from("artwork-loader.toml")
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ARTWORK_CORS_PROXY`: CORS proxy host (empty disables)
    /// - `ARTWORK_NON_CORS_PROXY_DOMAINS`: comma separated hosts
    /// - `ARTWORK_RESOLVER_ENDPOINT`: media resolution endpoint
    /// - `ARTWORK_PAGE_PROTOCOL`: e.g. `https:`
    /// - `ARTWORK_LOW_QUALITY`: `true`/`false`/`1`/`0`
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ARTWORK_CORS_PROXY") {
            config.cors_proxy_host = Some(val.trim().to_string()).filter(|h| !h.is_empty());
        }

        if let Ok(val) = std::env::var("ARTWORK_NON_CORS_PROXY_DOMAINS") {
            config.non_cors_proxy_domains = val
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(val) = std::env::var("ARTWORK_RESOLVER_ENDPOINT") {
            config.resolver_endpoint = Some(val.trim().to_string()).filter(|e| !e.is_empty());
        }

        if let Ok(val) = std::env::var("ARTWORK_PAGE_PROTOCOL") {
            if val.trim().is_empty() {
                return Err(ConfigError::InvalidValue("ARTWORK_PAGE_PROTOCOL".to_string()));
            }
            config.page_protocol = val.trim().to_string();
        }

        if let Ok(val) = std::env::var("ARTWORK_LOW_QUALITY") {
            config.low_quality = match val.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => return Err(ConfigError::InvalidValue("ARTWORK_LOW_QUALITY".to_string())),
            };
        }

        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// cors_proxy_host = "cors-proxy.example.net"
    /// non_cors_proxy_domains = ["localhost", "assets.example.net"]
    /// resolver_endpoint = "https://api.example.net/media"
    /// low_quality = false
    /// ```
    ///
    /// Missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&contents)?)
    }

    /// Saves configuration to a TOML file, creating parent directories.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self)?;
        fs::write(path, toml)?;
        Ok(())
    }

    /// Proxy transform described by this configuration.
    pub fn cors_proxy(&self) -> CorsProxy {
        CorsProxy::new(
            self.cors_proxy_host.clone(),
            self.non_cors_proxy_domains.clone(),
        )
    }

    /// Client for the configured resolution service, if any.
    pub fn media_resolver(&self) -> Option<Arc<dyn MediaResolver>> {
        let endpoint = self.resolver_endpoint.as_ref()?;
        Some(Arc::new(HttpMediaResolver::new(endpoint.clone())))
    }

    /// URL resolver using `service` for indirect references.
    pub fn url_resolver(&self, service: Option<Arc<dyn MediaResolver>>) -> UrlResolver {
        UrlResolver::new(self.cors_proxy(), service)
            .with_internal_schemes(self.internal_schemes.clone())
            .with_page_protocol(self.page_protocol.clone())
            .with_low_quality(self.low_quality)
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    /// I/O error reading or writing configuration file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
