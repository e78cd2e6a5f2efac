use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::control::{
    ControlSettings, DEFAULT_PORT, DEFAULT_START_REQUEST, DEFAULT_STOP_REQUEST, DEFAULT_TIMEOUT_MS,
};
use crate::process::{split_arguments, ProcessPattern};
use crate::process_monitor::DEFAULT_POLL_INTERVAL_SECS;

pub const MIN_POLL_INTERVAL_SECS: u64 = 1;
pub const MAX_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_LAUNCH_WAIT_SECS: u64 = 120;
pub const MAX_LAUNCH_WAIT_SECS: u64 = 3_600;
pub const MIN_CONTROL_TIMEOUT_MS: u64 = 100;
pub const MAX_CONTROL_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_CONTROL_HOST: &str = "127.0.0.1";
/// Wallpaper Engine style control arguments.
pub const DEFAULT_PAUSE_ARGUMENTS: &str = "-control pause";
pub const DEFAULT_RESUME_ARGUMENTS: &str = "-control play";

/// Root configuration structure, as written by the configuration editor.
///
/// This is the unchecked shape of the file. [`Config::validate`] turns it into
/// a [`Catalog`] of definitions the orchestrator can trust.
///
/// Integration and game entries stay as raw TOML until validation, so one
/// malformed entry is dropped on its own instead of failing the whole file.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub integrations: Vec<toml::Value>,
    #[serde(default)]
    pub games: Vec<toml::Value>,
}

/// Settings shared by every session.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    /// Seconds between process-list polls. Clamped to [1, 60].
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// How long to wait for the game process to appear after start actions.
    /// Capped at [`MAX_LAUNCH_WAIT_SECS`].
    #[serde(default = "default_launch_wait")]
    pub launch_wait_secs: u64,
    /// Overrides the default status file location.
    #[serde(default)]
    pub status_file: Option<PathBuf>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            launch_wait_secs: DEFAULT_LAUNCH_WAIT_SECS,
            status_file: None,
        }
    }
}

impl GlobalConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.poll_interval_secs
                .clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS),
        )
    }

    pub fn launch_wait(&self) -> Duration {
        Duration::from_secs(self.launch_wait_secs.min(MAX_LAUNCH_WAIT_SECS))
    }
}

/// One `[[integrations]]` entry.
#[derive(Debug, Deserialize)]
pub struct IntegrationEntry {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Absent for integrations driven purely over a socket.
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// `|`-separated process names used for detection and `stop-process`.
    #[serde(default)]
    pub process: Option<String>,
    #[serde(default = "default_verb")]
    pub start_action: String,
    #[serde(default = "default_verb")]
    pub stop_action: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub control: Option<ControlEntry>,
    #[serde(default)]
    pub render: Option<RenderEntry>,
}

/// `[integrations.control]`: connection details for the streaming tool.
#[derive(Debug, Deserialize)]
pub struct ControlEntry {
    #[serde(default = "default_control_host")]
    pub host: String,
    #[serde(default = "default_control_port")]
    pub port: u16,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_start_request")]
    pub start_request: String,
    #[serde(default = "default_stop_request")]
    pub stop_request: String,
}

/// `[integrations.render]`: arguments passed to the wallpaper renderer.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderEntry {
    #[serde(default = "default_pause_arguments")]
    pub pause_arguments: String,
    #[serde(default = "default_resume_arguments")]
    pub resume_arguments: String,
}

impl Default for RenderEntry {
    fn default() -> Self {
        Self {
            pause_arguments: DEFAULT_PAUSE_ARGUMENTS.to_string(),
            resume_arguments: DEFAULT_RESUME_ARGUMENTS.to_string(),
        }
    }
}

/// One `[[games]]` entry.
#[derive(Debug, Deserialize)]
pub struct GameEntry {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub process: String,
    #[serde(default)]
    pub launch: Option<LaunchEntry>,
    /// Integration ids, in start order.
    #[serde(default)]
    pub integrations: Vec<String>,
}

/// `[games.launch]`: exactly one of the three targets must be set.
#[derive(Debug, Deserialize)]
pub struct LaunchEntry {
    #[serde(default)]
    pub steam_app_id: Option<u32>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default)]
    pub arguments: String,
}

// ── Validated definitions ─────────────────────────────────────────────────────

/// Closed set of things the dispatcher knows how to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionVerb {
    StartProcess,
    StopProcess,
    ToggleHotkeys,
    PauseRender,
    ResumeRender,
    OpenControlSession,
    CloseControlSession,
    None,
}

impl ActionVerb {
    pub const ALL: [ActionVerb; 8] = [
        ActionVerb::StartProcess,
        ActionVerb::StopProcess,
        ActionVerb::ToggleHotkeys,
        ActionVerb::PauseRender,
        ActionVerb::ResumeRender,
        ActionVerb::OpenControlSession,
        ActionVerb::CloseControlSession,
        ActionVerb::None,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionVerb::StartProcess => "start-process",
            ActionVerb::StopProcess => "stop-process",
            ActionVerb::ToggleHotkeys => "toggle-hotkeys",
            ActionVerb::PauseRender => "pause-render",
            ActionVerb::ResumeRender => "resume-render",
            ActionVerb::OpenControlSession => "open-control-session",
            ActionVerb::CloseControlSession => "close-control-session",
            ActionVerb::None => "none",
        }
    }

    fn needs_control(self) -> bool {
        matches!(
            self,
            ActionVerb::OpenControlSession | ActionVerb::CloseControlSession
        )
    }
}

impl fmt::Display for ActionVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown action verb '{0}'")]
pub struct UnknownVerb(pub String);

impl FromStr for ActionVerb {
    type Err = UnknownVerb;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ActionVerb::ALL
            .into_iter()
            .find(|verb| verb.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownVerb(s.to_string()))
    }
}

/// How to start the game itself, if the orchestrator is asked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchDescriptor {
    /// Store/launcher URI, e.g. `steam://rungameid/730`.
    Uri(String),
    Executable { path: PathBuf, arguments: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct GameDefinition {
    pub id: String,
    pub display_name: String,
    pub process: ProcessPattern,
    pub launch: Option<LaunchDescriptor>,
    /// Integration ids in start order. May reference unknown ids; those are
    /// dropped when the session resolves its integrations.
    pub integrations: Vec<String>,
}

#[derive(Debug)]
pub struct IntegrationDefinition {
    pub id: String,
    pub display_name: String,
    pub executable: Option<PathBuf>,
    pub process: Option<ProcessPattern>,
    pub start_action: ActionVerb,
    pub stop_action: ActionVerb,
    pub arguments: Vec<String>,
    pub control: Option<ControlSettings>,
    pub render: RenderEntry,
}

impl IntegrationDefinition {
    /// Pattern used to detect or stop this integration's process: the explicit
    /// `process` field, else the executable's file name.
    pub fn detection_pattern(&self) -> Option<ProcessPattern> {
        self.process.clone().or_else(|| {
            self.executable
                .as_deref()
                .and_then(ProcessPattern::from_executable)
        })
    }
}

#[cfg(test)]
impl IntegrationDefinition {
    /// Definition with no executable, pattern or sub-config.
    pub(crate) fn bare(id: &str, start_action: ActionVerb, stop_action: ActionVerb) -> Self {
        Self {
            id: id.to_string(),
            display_name: id.to_string(),
            executable: None,
            process: None,
            start_action,
            stop_action,
            arguments: Vec::new(),
            control: None,
            render: RenderEntry::default(),
        }
    }
}

/// Validated view of the configuration.
#[derive(Debug, Default)]
pub struct Catalog {
    pub global: GlobalConfig,
    pub games: BTreeMap<String, GameDefinition>,
    pub integrations: BTreeMap<String, IntegrationDefinition>,
}

/// Problems found while validating. None of these is fatal: the offending
/// entry is dropped (or, for unknown references, reported) and the rest loads.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{kind} entry with an empty id")]
    EmptyId { kind: &'static str },
    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },
    #[error("integration '{integration}': {source}")]
    UnknownVerb {
        integration: String,
        #[source]
        source: UnknownVerb,
    },
    #[error("integration '{integration}': '{verb}' requires a [control] table")]
    MissingControlConfig { integration: String, verb: ActionVerb },
    #[error("integration '{integration}': '{verb}' needs a process pattern or executable")]
    MissingProcessPattern { integration: String, verb: ActionVerb },
    #[error("game '{0}': process pattern is empty")]
    EmptyGamePattern(String),
    #[error("game '{0}': launch must set exactly one of steam_app_id, uri, executable")]
    InvalidLaunch(String),
    #[error("game '{game}' references unknown integration '{integration}'")]
    UnknownIntegration { game: String, integration: String },
    #[error("{kind} '{id}' is malformed: {reason}")]
    Malformed {
        kind: &'static str,
        id: String,
        reason: String,
    },
}

impl Config {
    /// Reads and parses the config file at `path`.
    ///
    /// Unlike validation issues, an unreadable or unparsable file is an error:
    /// without it no session can start.
    pub fn load(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Checks every entry and returns the usable definitions plus the issues
    /// found. Invalid integrations and games are left out of the catalog.
    pub fn validate(self) -> (Catalog, Vec<ConfigError>) {
        let mut issues = Vec::new();
        let mut catalog = Catalog {
            global: self.global,
            ..Catalog::default()
        };

        for raw in self.integrations {
            let entry: IntegrationEntry = match decode_entry("integration", raw) {
                Ok(entry) => entry,
                Err(e) => {
                    issues.push(e);
                    continue;
                }
            };
            if entry.id.trim().is_empty() {
                issues.push(ConfigError::EmptyId { kind: "integration" });
                continue;
            }
            if catalog.integrations.contains_key(&entry.id) {
                issues.push(ConfigError::DuplicateId {
                    kind: "integration",
                    id: entry.id,
                });
                continue;
            }
            match validate_integration(entry) {
                Ok(def) => {
                    catalog.integrations.insert(def.id.clone(), def);
                }
                Err(e) => issues.push(e),
            }
        }

        for raw in self.games {
            let entry: GameEntry = match decode_entry("game", raw) {
                Ok(entry) => entry,
                Err(e) => {
                    issues.push(e);
                    continue;
                }
            };
            if entry.id.trim().is_empty() {
                issues.push(ConfigError::EmptyId { kind: "game" });
                continue;
            }
            if catalog.games.contains_key(&entry.id) {
                issues.push(ConfigError::DuplicateId {
                    kind: "game",
                    id: entry.id,
                });
                continue;
            }
            match validate_game(entry) {
                Ok(def) => {
                    for id in &def.integrations {
                        if !catalog.integrations.contains_key(id) {
                            issues.push(ConfigError::UnknownIntegration {
                                game: def.id.clone(),
                                integration: id.clone(),
                            });
                        }
                    }
                    catalog.games.insert(def.id.clone(), def);
                }
                Err(e) => issues.push(e),
            }
        }

        (catalog, issues)
    }
}

fn validate_integration(entry: IntegrationEntry) -> Result<IntegrationDefinition, ConfigError> {
    let parse_verb = |raw: &str| {
        raw.parse::<ActionVerb>()
            .map_err(|source| ConfigError::UnknownVerb {
                integration: entry.id.clone(),
                source,
            })
    };
    let start_action = parse_verb(&entry.start_action)?;
    let stop_action = parse_verb(&entry.stop_action)?;

    for verb in [start_action, stop_action] {
        if verb.needs_control() && entry.control.is_none() {
            return Err(ConfigError::MissingControlConfig {
                integration: entry.id,
                verb,
            });
        }
    }

    let def = IntegrationDefinition {
        display_name: entry.display_name.unwrap_or_else(|| entry.id.clone()),
        executable: entry.executable,
        process: entry.process.as_deref().and_then(ProcessPattern::parse),
        start_action,
        stop_action,
        arguments: split_arguments(&entry.arguments),
        control: entry.control.map(|c| ControlSettings {
            host: c.host,
            port: c.port,
            password: c.password,
            timeout: Duration::from_millis(
                c.timeout_ms
                    .clamp(MIN_CONTROL_TIMEOUT_MS, MAX_CONTROL_TIMEOUT_MS),
            ),
            start_request: c.start_request,
            stop_request: c.stop_request,
        }),
        render: entry.render.unwrap_or_default(),
        id: entry.id,
    };

    for verb in [def.start_action, def.stop_action] {
        if verb == ActionVerb::StopProcess && def.detection_pattern().is_none() {
            return Err(ConfigError::MissingProcessPattern {
                integration: def.id,
                verb,
            });
        }
    }
    Ok(def)
}

fn validate_game(entry: GameEntry) -> Result<GameDefinition, ConfigError> {
    let Some(process) = ProcessPattern::parse(&entry.process) else {
        return Err(ConfigError::EmptyGamePattern(entry.id));
    };

    let launch = match entry.launch {
        None => None,
        Some(LaunchEntry {
            steam_app_id,
            uri,
            executable,
            arguments,
        }) => match (steam_app_id, uri, executable) {
            (Some(app_id), None, None) => {
                Some(LaunchDescriptor::Uri(format!("steam://rungameid/{app_id}")))
            }
            (None, Some(uri), None) => Some(LaunchDescriptor::Uri(uri)),
            (None, None, Some(path)) => Some(LaunchDescriptor::Executable {
                path,
                arguments: split_arguments(&arguments),
            }),
            _ => return Err(ConfigError::InvalidLaunch(entry.id)),
        },
    };

    Ok(GameDefinition {
        display_name: entry.display_name.unwrap_or_else(|| entry.id.clone()),
        process,
        launch,
        integrations: entry.integrations,
        id: entry.id,
    })
}

fn decode_entry<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    raw: toml::Value,
) -> Result<T, ConfigError> {
    let id = raw
        .get("id")
        .and_then(toml::Value::as_str)
        .unwrap_or("<no id>")
        .to_string();
    raw.try_into().map_err(|e: toml::de::Error| ConfigError::Malformed {
        kind,
        id,
        reason: e.message().to_string(),
    })
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_launch_wait() -> u64 {
    DEFAULT_LAUNCH_WAIT_SECS
}

fn default_verb() -> String {
    ActionVerb::None.as_str().to_string()
}

fn default_control_host() -> String {
    DEFAULT_CONTROL_HOST.to_string()
}

fn default_control_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_start_request() -> String {
    DEFAULT_START_REQUEST.to_string()
}

fn default_stop_request() -> String {
    DEFAULT_STOP_REQUEST.to_string()
}

fn default_pause_arguments() -> String {
    DEFAULT_PAUSE_ARGUMENTS.to_string()
}

fn default_resume_arguments() -> String {
    DEFAULT_RESUME_ARGUMENTS.to_string()
}
