//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

/// Caching CORS proxy for the SofaScore API
#[derive(Parser, Debug)]
#[command(name = "sofa-proxy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "SOFA_PROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "SOFA_PROXY_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "SOFA_PROXY_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "SOFA_PROXY_LOG_FORMAT")]
    pub log_format: Option<String>,
}
