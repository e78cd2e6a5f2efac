use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::session::Phase;

/// Session status written to `status.toml` in the app data directory after every
/// phase transition. The configuration editor reads this file (read-only) to
/// show what the orchestrator is doing.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionStatus {
    /// Orchestrator binary version (set from Cargo.toml at compile time).
    pub version: String,
    pub phase: Phase,
    /// Display name of the game being managed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<String>,
    /// Integrations whose start action was attempted, in start order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub started_integrations: Vec<String>,
    /// `"<integration> <verb>"` for every action that failed this session.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_actions: Vec<String>,
    /// RFC 3339 timestamp of the last update.
    pub updated_at: String,
    /// Human-readable error message if the session hit a non-fatal problem.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionStatus {
    /// Constructs the initial idle status.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            phase: Phase::Idle,
            game: None,
            started_integrations: Vec::new(),
            failed_actions: Vec::new(),
            updated_at: chrono::Local::now().to_rfc3339(),
            error: None,
        }
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Logs errors rather than failing; a status write must never affect the session.
pub fn write_status(path: &Path, status: &SessionStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("[status] Failed to create directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                warn!("[status] Failed to write status file: {e}");
            }
        }
        Err(e) => warn!("[status] Failed to serialize status: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── SessionStatus::new ────────────────────────────────────────────────────

    #[test]
    fn new_starts_idle() {
        let s = SessionStatus::new();
        assert_eq!(s.phase, Phase::Idle);
    }

    #[test]
    fn new_has_no_optional_fields() {
        let s = SessionStatus::new();
        assert!(s.game.is_none());
        assert!(s.started_integrations.is_empty());
        assert!(s.failed_actions.is_empty());
        assert!(s.error.is_none());
    }

    #[test]
    fn new_version_matches_cargo_pkg() {
        let s = SessionStatus::new();
        assert_eq!(s.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn new_timestamp_is_rfc3339() {
        let s = SessionStatus::new();
        assert!(chrono::DateTime::parse_from_rfc3339(&s.updated_at).is_ok());
    }

    // ── Phase serialization ───────────────────────────────────────────────────

    #[test]
    fn phase_serializes_to_kebab_case() {
        let mut s = SessionStatus::new();
        s.phase = Phase::TearingDown;
        let content = toml::to_string_pretty(&s).unwrap();
        assert!(content.contains("phase = \"tearing-down\""));
    }

    #[test]
    fn phase_round_trips_through_toml() {
        for phase in [
            Phase::Idle,
            Phase::Preparing,
            Phase::Running,
            Phase::TearingDown,
            Phase::Terminated,
        ] {
            let mut status = SessionStatus::new();
            status.phase = phase;
            let serialized = toml::to_string_pretty(&status).unwrap();
            let deserialized: SessionStatus = toml::from_str(&serialized).unwrap();
            assert_eq!(deserialized.phase, phase);
        }
    }

    // ── write_status ──────────────────────────────────────────────────────────

    #[test]
    fn write_status_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dir").join("status.toml");
        write_status(&path, &SessionStatus::new());
        assert!(path.exists());
    }

    #[test]
    fn write_status_content_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");

        let mut original = SessionStatus::new();
        original.phase = Phase::Running;
        original.game = Some("Rocket League".to_string());
        original.started_integrations = vec!["obs".into(), "hotkeyTool".into()];
        original.failed_actions = vec!["obs open-control-session".into()];

        write_status(&path, &original);

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: SessionStatus = toml::from_str(&content).unwrap();

        assert_eq!(parsed.phase, Phase::Running);
        assert_eq!(parsed.game.as_deref(), Some("Rocket League"));
        assert_eq!(parsed.started_integrations, ["obs", "hotkeyTool"]);
        assert_eq!(parsed.failed_actions, ["obs open-control-session"]);
    }

    #[test]
    fn write_status_omits_empty_optional_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");
        write_status(&path, &SessionStatus::new());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("game"));
        assert!(!content.contains("started_integrations"));
        assert!(!content.contains("failed_actions"));
        assert!(!content.contains("error"));
    }
}
