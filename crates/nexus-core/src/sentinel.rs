//! Restart sentinel — one-shot handoff file between gateway processes.
//!
//! An exiting process writes the outcome of its last lifecycle operation
//! (config apply, self-update, plain restart) to
//! `<state_dir>/restart-sentinel.json`. The next process consumes it exactly
//! once: read, then delete. Corrupt or version-mismatched files are deleted
//! and reported as absent so a bad handoff can never wedge startup.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

pub const SENTINEL_VERSION: u32 = 1;
pub const SENTINEL_FILE: &str = "restart-sentinel.json";

/// Which lifecycle operation the exiting process performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SentinelKind {
    ConfigApply,
    Update,
    Restart,
}

/// How that operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentinelStatus {
    Ok,
    Error,
    Skipped,
}

/// One step of a multi-step operation (e.g. an update's download/verify/swap).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelStep {
    pub name: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_tail: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentinelStats {
    #[serde(default)]
    pub steps: Vec<SentinelStep>,
}

/// The record handed across the restart boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelPayload {
    pub kind: SentinelKind,
    pub status: SentinelStatus,
    /// Milliseconds since the Unix epoch at write time.
    pub ts_ms: u64,
    /// Session the triggering request came from, for routing the outcome back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    /// Channel to deliver the outcome notice on (e.g. "telegram").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Channel-specific recipient for the outcome notice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<SentinelStats>,
}

/// Versioned envelope as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartSentinel {
    pub version: u32,
    pub payload: SentinelPayload,
}

/// Reads and writes the sentinel file under a fixed state directory.
pub struct SentinelStore {
    state_dir: PathBuf,
}

impl SentinelStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.state_dir.join(SENTINEL_FILE)
    }

    /// Write the sentinel: parent directories are created, the JSON is
    /// pretty-printed with a trailing newline, and the file mode is 0644.
    pub fn write(&self, payload: &SentinelPayload) -> Result<()> {
        fs::create_dir_all(&self.state_dir)?;
        let sentinel = RestartSentinel {
            version: SENTINEL_VERSION,
            payload: payload.clone(),
        };
        let mut json = serde_json::to_string_pretty(&sentinel)?;
        json.push('\n');
        let path = self.path();
        fs::write(&path, json)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o644))?;
        }
        Ok(())
    }

    /// Read the sentinel without consuming it.
    ///
    /// A missing file is `Ok(None)`. A file that fails to parse or carries
    /// the wrong version is deleted and also reported as `Ok(None)`.
    pub fn read(&self) -> Result<Option<RestartSentinel>> {
        let path = self.path();
        let raw = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<RestartSentinel>(&raw) {
            Ok(s) if s.version == SENTINEL_VERSION => Ok(Some(s)),
            Ok(s) => {
                warn!(version = s.version, "restart sentinel version mismatch, discarding");
                remove_quietly(&path);
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "restart sentinel is corrupt, discarding");
                remove_quietly(&path);
                Ok(None)
            }
        }
    }

    /// Read and delete the sentinel in one step.
    ///
    /// The consume-once guarantee holds for a single reader: after this
    /// returns, the file is gone and a second call yields `Ok(None)`.
    pub fn consume(&self) -> Result<Option<RestartSentinel>> {
        let sentinel = self.read()?;
        if sentinel.is_some() {
            remove_quietly(&self.path());
        }
        Ok(sentinel)
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove sentinel file");
        }
    }
}

/// Keep the last `max_chars` characters of a log for embedding in a
/// [`SentinelStep`].
///
/// Trailing whitespace is trimmed first. When the tail is elided the result
/// is prefixed with `"..."`, so its length can exceed `max_chars` by the
/// ellipsis — callers sizing fields should budget for `max_chars + 3`.
pub fn trim_log_tail(s: &str, max_chars: usize) -> String {
    let trimmed = s.trim_end();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    let tail: String = trimmed
        .chars()
        .skip(count - max_chars)
        .collect();
    format!("...{tail}")
}

/// Convenience constructor used by the gateway's shutdown path.
pub fn restart_payload(status: SentinelStatus, ts_ms: u64) -> SentinelPayload {
    SentinelPayload {
        kind: SentinelKind::Restart,
        status,
        ts_ms,
        session_key: None,
        channel: None,
        to: None,
        stats: None,
    }
}
