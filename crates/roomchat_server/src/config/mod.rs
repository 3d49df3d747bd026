#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use roomchat_protocol::DEFAULT_MAX_ENVELOPE_SIZE;
use serde::Deserialize;
use tracing::{info, warn};

/// Default listen endpoint.
pub const DEFAULT_BIND: &str = "ws://0.0.0.0:8080";

const DEFAULT_WRITER_DRAIN_TIMEOUT_MS: u64 = 2_000;

/// Default config path: `~/.roomchat/server.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".roomchat").join("server.toml"))
}

/// Load the server config from TOML (if present) and env overrides.
pub fn load_server_config_from_path(path: &Path) -> anyhow::Result<ServerConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ServerConfig::from_file(file_cfg);

	apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());

	Ok(cfg)
}

/// Server config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
	/// Listen endpoint (`ws://host:port`).
	pub bind: String,
	/// Inbound envelopes larger than this are dropped.
	pub max_envelope_bytes: usize,
	/// How long a closing connection may keep flushing its outbound backlog.
	pub writer_drain_timeout_ms: u64,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	/// Optional health/readiness HTTP bind address (host:port).
	pub health_bind: Option<String>,
	/// Log every routed envelope at debug level.
	pub debug_logs: bool,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self::from_file(FileConfig::default())
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	server: FileServerSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	bind: Option<String>,
	max_envelope_bytes: Option<usize>,
	writer_drain_timeout_ms: Option<u64>,
	metrics_bind: Option<String>,
	health_bind: Option<String>,
	debug_logs: Option<bool>,
}

impl ServerConfig {
	fn from_file(file: FileConfig) -> Self {
		let s = file.server;
		Self {
			bind: s.bind.filter(|v| !v.trim().is_empty()).unwrap_or_else(|| DEFAULT_BIND.to_string()),
			max_envelope_bytes: s.max_envelope_bytes.filter(|v| *v > 0).unwrap_or(DEFAULT_MAX_ENVELOPE_SIZE),
			writer_drain_timeout_ms: s.writer_drain_timeout_ms.unwrap_or(DEFAULT_WRITER_DRAIN_TIMEOUT_MS),
			metrics_bind: s.metrics_bind.filter(|v| !v.trim().is_empty()),
			health_bind: s.health_bind.filter(|v| !v.trim().is_empty()),
			debug_logs: s.debug_logs.unwrap_or(false),
		}
	}
}

fn parse_env_bool(v: &str) -> Option<bool> {
	match v.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => parse_toml(&s).map(Some),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn parse_toml(s: &str) -> anyhow::Result<FileConfig> {
	toml::from_str(s).context("parse TOML")
}

fn non_empty(v: String) -> Option<String> {
	let v = v.trim().to_string();
	if v.is_empty() { None } else { Some(v) }
}

/// Apply `ROOMCHAT_*` overrides read through `get`.
fn apply_env_overrides(cfg: &mut ServerConfig, get: impl Fn(&str) -> Option<String>) {
	if let Some(v) = get("ROOMCHAT_BIND").and_then(non_empty) {
		cfg.bind = v;
		info!("server config: bind overridden by env");
	}

	if let Some(v) = get("ROOMCHAT_MAX_ENVELOPE_BYTES") {
		match v.trim().parse::<usize>() {
			Ok(max) if max > 0 => {
				cfg.max_envelope_bytes = max;
				info!(max, "server config: max_envelope_bytes overridden by env");
			}
			_ => warn!(value = %v, "ignoring invalid ROOMCHAT_MAX_ENVELOPE_BYTES"),
		}
	}

	if let Some(v) = get("ROOMCHAT_WRITER_DRAIN_TIMEOUT_MS") {
		match v.trim().parse::<u64>() {
			Ok(ms) => {
				cfg.writer_drain_timeout_ms = ms;
				info!(ms, "server config: writer_drain_timeout_ms overridden by env");
			}
			Err(_) => warn!(value = %v, "ignoring invalid ROOMCHAT_WRITER_DRAIN_TIMEOUT_MS"),
		}
	}

	if let Some(v) = get("ROOMCHAT_METRICS_BIND").and_then(non_empty) {
		cfg.metrics_bind = Some(v);
		info!("server config: metrics_bind overridden by env");
	}

	if let Some(v) = get("ROOMCHAT_HEALTH_BIND").and_then(non_empty) {
		cfg.health_bind = Some(v);
		info!("server config: health_bind overridden by env");
	}

	if let Some(v) = get("ROOMCHAT_DEBUG_LOGS")
		&& let Some(enabled) = parse_env_bool(&v)
	{
		cfg.debug_logs = enabled;
		info!(enabled, "server config: debug_logs overridden by env");
	}
}
