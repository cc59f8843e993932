//! Server configuration, read from `IMAGE2PDF_*` environment variables.

use image2pdf::Background;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_OUTPUT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// How a successful conversion is returned to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// The PDF itself, as an attachment
    #[default]
    Binary,
    /// A JSON body with a URL the PDF can be downloaded from
    Link,
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" => Ok(ResponseMode::Binary),
            "link" => Ok(ResponseMode::Link),
            other => Err(format!("expected 'binary' or 'link', got '{other}'")),
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseMode::Binary => f.write_str("binary"),
            ResponseMode::Link => f.write_str("link"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Front-end assets; `index.html` is served at `/`
    pub static_dir: PathBuf,
    /// One subdirectory per request is created here
    pub output_dir: PathBuf,
    pub response_mode: ResponseMode,
    pub max_upload_bytes: usize,
    pub background: Background,
    /// Link-mode outputs older than this are deleted; `None` keeps them forever
    pub output_retention: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            static_dir: PathBuf::from("static"),
            output_dir: PathBuf::from("outputs"),
            response_mode: ResponseMode::Binary,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            background: Background::WHITE,
            output_retention: Some(DEFAULT_OUTPUT_RETENTION),
        }
    }
}

impl ServerConfig {
    /// Read the process environment. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(bind) = lookup("IMAGE2PDF_BIND") {
            config.bind = parse("IMAGE2PDF_BIND", bind)?;
        }
        if let Some(dir) = lookup("IMAGE2PDF_STATIC_DIR") {
            config.static_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("IMAGE2PDF_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(mode) = lookup("IMAGE2PDF_RESPONSE_MODE") {
            config.response_mode = parse("IMAGE2PDF_RESPONSE_MODE", mode)?;
        }
        if let Some(limit) = lookup("IMAGE2PDF_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse("IMAGE2PDF_MAX_UPLOAD_BYTES", limit)?;
        }
        if let Some(color) = lookup("IMAGE2PDF_BACKGROUND") {
            config.background = parse("IMAGE2PDF_BACKGROUND", color)?;
        }
        if let Some(secs) = lookup("IMAGE2PDF_OUTPUT_RETENTION_SECS") {
            let secs: u64 = parse("IMAGE2PDF_OUTPUT_RETENTION_SECS", secs)?;
            config.output_retention = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }
}

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        reason: e.to_string(),
        value,
    })
}
