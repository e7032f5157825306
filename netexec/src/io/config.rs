//! Daemon configuration, optionally loaded from a TOML file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use nix::unistd::{SysconfVar, sysconf};
use serde::{Deserialize, Serialize};

/// Request buffer size used when the platform does not report `ARG_MAX`.
pub const FALLBACK_REQUEST_BYTES: usize = 128 * 1024;

/// What the acceptor does once `max_connections` handlers are live.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionPolicy {
    /// Stop accepting until a handler finishes; peers wait in the listen backlog.
    #[default]
    Queue,
    /// Accept, tell the peer the server is busy, and close.
    Reject,
}

/// Server configuration (TOML).
///
/// Missing fields default to the values the daemon has always used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Wall-clock budget for one child process, in milliseconds.
    pub timeout_ms: u64,

    /// Listen backlog for the command socket.
    pub backlog: i32,

    /// Upper bound on concurrently served connections.
    pub max_connections: usize,

    pub admission: AdmissionPolicy,

    /// Size of the per-connection request buffer. Defaults to `ARG_MAX`.
    pub max_request_bytes: Option<usize>,

    /// Directory for stdout/stderr capture files. Defaults to the system temp dir.
    pub capture_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            backlog: 100,
            max_connections: 128,
            admission: AdmissionPolicy::Queue,
            max_request_bytes: None,
            capture_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(anyhow!("timeout_ms must be > 0"));
        }
        if self.backlog <= 0 {
            return Err(anyhow!("backlog must be > 0"));
        }
        if self.max_connections == 0 {
            return Err(anyhow!("max_connections must be > 0"));
        }
        if self.max_request_bytes == Some(0) {
            return Err(anyhow!("max_request_bytes must be > 0"));
        }
        if let Some(dir) = &self.capture_dir
            && !dir.is_dir()
        {
            return Err(anyhow!(
                "capture_dir {} is not a directory",
                dir.display()
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn request_buffer_len(&self) -> usize {
        self.max_request_bytes.unwrap_or_else(platform_arg_max)
    }

    pub fn capture_dir(&self) -> PathBuf {
        self.capture_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// The platform's maximum argument length, or [`FALLBACK_REQUEST_BYTES`].
pub fn platform_arg_max() -> usize {
    match sysconf(SysconfVar::ARG_MAX) {
        Ok(Some(limit)) if limit > 0 => usize::try_from(limit).unwrap_or(FALLBACK_REQUEST_BYTES),
        _ => FALLBACK_REQUEST_BYTES,
    }
}

/// Load and validate config from a TOML file. The file must exist.
pub fn load_config(path: &Path) -> Result<ServerConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ServerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
