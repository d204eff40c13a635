//Command line interface
// runtime configuration (server, radio, timing); CLI flag > TOML file > default
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: i64 = 5;
pub const DEFAULT_RECV_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_RADIO_DEVICE: &str = "my_device";
/// Si4463 transceiver part number.
pub const DEFAULT_RADIO_PART: u16 = 0x4463;
pub const DEFAULT_RADIO_BIND: &str = "0.0.0.0:7892";
pub const DEFAULT_RADIO_PEER: &str = "127.0.0.1:7891";
pub const DEFAULT_RADIO_READ_SLICE_MS: u64 = 250;
pub const DEFAULT_RADIO_RETRY_SECS: u64 = 5;
pub const DEFAULT_RADIO_INIT_ATTEMPTS: u32 = 10;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 20;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub poll_interval: Duration,
    /// Kept signed: values <= 0 are honoured as a one-second wait.
    pub connect_timeout_secs: i64,
    pub recv_timeout: Duration,
    pub radio_device: String,
    pub radio_part: u16,
    pub radio_bind: String,
    pub radio_peer: String,
    pub radio_read_slice: Duration,
    pub radio_retry: Duration,
    /// 0 retries forever.
    pub radio_init_attempts: u32,
    pub shutdown_grace: Duration,
    pub log_dir: Option<PathBuf>,
    pub frame_log: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config::resolve(Cli::default(), FileConfig::default())
    }
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "uhf_gateway", about = "UHF radio <-> ground-station network gateway")]
pub struct Cli {
    /// TOML file with any of the options below
    #[arg(long, short)] pub config: Option<PathBuf>,
    #[arg(long)] pub server_host: Option<String>,
    #[arg(long)] pub server_port: Option<u16>,
    #[arg(long)] pub poll_interval_secs: Option<u64>,
    #[arg(long, allow_negative_numbers = true)] pub connect_timeout_secs: Option<i64>,
    #[arg(long)] pub recv_timeout_secs: Option<u64>,
    #[arg(long)] pub radio_device: Option<String>,
    /// Expected radio part number, decimal or 0x-prefixed hex
    #[arg(long, value_parser = parse_part)] pub radio_part: Option<u16>,
    #[arg(long)] pub radio_bind: Option<String>,
    #[arg(long)] pub radio_peer: Option<String>,
    #[arg(long)] pub radio_read_slice_ms: Option<u64>,
    #[arg(long)] pub radio_retry_secs: Option<u64>,
    #[arg(long)] pub radio_init_attempts: Option<u32>,
    #[arg(long)] pub shutdown_grace_secs: Option<u64>,
    #[arg(long)] pub log_dir: Option<PathBuf>,
    #[arg(long)] pub frame_log: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub poll_interval_secs: Option<u64>,
    pub connect_timeout_secs: Option<i64>,
    pub recv_timeout_secs: Option<u64>,
    pub radio_device: Option<String>,
    pub radio_part: Option<u16>,
    pub radio_bind: Option<String>,
    pub radio_peer: Option<String>,
    pub radio_read_slice_ms: Option<u64>,
    pub radio_retry_secs: Option<u64>,
    pub radio_init_attempts: Option<u32>,
    pub shutdown_grace_secs: Option<u64>,
    pub log_dir: Option<PathBuf>,
    pub frame_log: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }
}

fn parse_part(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid part number {s:?}: {e}"))
}

impl Cli {
    pub fn parse_and_build_config() -> Result<Config> {
        let c = <Cli as Parser>::parse();
        let file = match &c.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Config::resolve(c, file))
    }
}

impl Config {
    pub fn resolve(c: Cli, f: FileConfig) -> Config {
        let secs = Duration::from_secs;
        Config {
            server_host: c.server_host.or(f.server_host).unwrap_or_else(|| DEFAULT_SERVER_HOST.into()),
            server_port: c.server_port.or(f.server_port).unwrap_or(gs_protocol::DEFAULT_SERVER_PORT),
            poll_interval: secs(c.poll_interval_secs.or(f.poll_interval_secs).unwrap_or(DEFAULT_POLL_INTERVAL_SECS)),
            connect_timeout_secs: c
                .connect_timeout_secs
                .or(f.connect_timeout_secs)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            // SO_RCVTIMEO of zero would mean "block forever"
            recv_timeout: secs(
                c.recv_timeout_secs.or(f.recv_timeout_secs).unwrap_or(DEFAULT_RECV_TIMEOUT_SECS).max(1),
            ),
            radio_device: c.radio_device.or(f.radio_device).unwrap_or_else(|| DEFAULT_RADIO_DEVICE.into()),
            radio_part: c.radio_part.or(f.radio_part).unwrap_or(DEFAULT_RADIO_PART),
            radio_bind: c.radio_bind.or(f.radio_bind).unwrap_or_else(|| DEFAULT_RADIO_BIND.into()),
            radio_peer: c.radio_peer.or(f.radio_peer).unwrap_or_else(|| DEFAULT_RADIO_PEER.into()),
            radio_read_slice: Duration::from_millis(
                c.radio_read_slice_ms.or(f.radio_read_slice_ms).unwrap_or(DEFAULT_RADIO_READ_SLICE_MS).max(1),
            ),
            radio_retry: secs(c.radio_retry_secs.or(f.radio_retry_secs).unwrap_or(DEFAULT_RADIO_RETRY_SECS)),
            radio_init_attempts: c
                .radio_init_attempts
                .or(f.radio_init_attempts)
                .unwrap_or(DEFAULT_RADIO_INIT_ATTEMPTS),
            shutdown_grace: secs(
                c.shutdown_grace_secs.or(f.shutdown_grace_secs).unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
            ),
            log_dir: c.log_dir.or(f.log_dir),
            frame_log: c.frame_log.or(f.frame_log),
        }
    }
}
