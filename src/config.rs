use crate::transfer::correction::DEFAULT_CORRECTION_RETRY_CEILING;
use crate::transfer::decoder::DecoderConfig;
use crate::transfer::params::DecodeParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn default_log_level() -> String {
    "info".to_string()
}
fn default_data_dir() -> String {
    "data".to_string()
}
fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}
fn default_bind_port() -> u16 {
    7410
}
fn default_sender_control_addr() -> String {
    // Empty disables outbound control datagrams; events are then only logged.
    String::new()
}
fn default_cache_file() -> String {
    "rcv.cache".to_string()
}
fn default_output_file() -> String {
    "rcv.cache.raw".to_string()
}
fn default_resume() -> bool {
    false
}
fn default_sync_writes() -> bool {
    false
}
fn default_wrong_fragments_limit() -> u32 {
    // 0 = derive from block geometry.
    0
}
fn default_correction_retry_ceiling() -> u32 {
    DEFAULT_CORRECTION_RETRY_CEILING
}
fn default_max_datagram_size() -> usize {
    65_507
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub receiver: ReceiverConfig,
    /// Geometry announced by the sender. Left unset, the receiver starts uninitialized.
    pub transfer: DecodeParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    pub data_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub bind_host: String,
    pub bind_port: u16,
    /// `host:port` the sender listens on for control datagrams.
    pub sender_control_addr: String,
    /// Relative paths resolve against `general.data_dir`.
    pub cache_file: String,
    pub output_file: String,
    pub resume: bool,
    pub sync_writes: bool,
    pub wrong_fragments_limit: u32,
    pub correction_retry_ceiling: u32,
    pub max_datagram_size: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            bind_port: default_bind_port(),
            sender_control_addr: default_sender_control_addr(),
            cache_file: default_cache_file(),
            output_file: default_output_file(),
            resume: default_resume(),
            sync_writes: default_sync_writes(),
            wrong_fragments_limit: default_wrong_fragments_limit(),
            correction_retry_ceiling: default_correction_retry_ceiling(),
            max_datagram_size: default_max_datagram_size(),
        }
    }
}

impl Config {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.general.data_dir)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.receiver.bind_host, self.receiver.bind_port)
    }

    pub fn sender_control_addr(&self) -> Option<&str> {
        let addr = self.receiver.sender_control_addr.trim();
        (!addr.is_empty()).then_some(addr)
    }

    pub fn decoder_config(&self) -> DecoderConfig {
        let data_dir = self.data_dir();
        let r = &self.receiver;
        DecoderConfig {
            cache_path: resolve(&data_dir, &r.cache_file),
            output_path: resolve(&data_dir, &r.output_file),
            wrong_fragments_limit: (r.wrong_fragments_limit > 0).then_some(r.wrong_fragments_limit),
            correction_retry_ceiling: r.correction_retry_ceiling,
            resume: r.resume,
            sync_writes: r.sync_writes,
        }
    }
}

fn resolve(base: &Path, file: &str) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() { p.to_path_buf() } else { base.join(p) }
}

pub fn init_tracing(config: &Config) {
    // Priority order:
    // 1) RUST_LOG
    // 2) general.log_level
    // 3) info
    //
    // Example:
    // RUST_LOG=info,blockcast_rx::transfer=debug

    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| config.general.log_level.clone());

    let filter = EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact()
        .init();
}
