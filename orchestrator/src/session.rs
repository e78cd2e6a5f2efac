/// One game session, from start request to game exit.
///
/// The orchestrator walks a single [`SessionState`] through
/// `Idle → Preparing → Running → TearingDown → Terminated`. Each step takes the
/// state by value and hands it back, so there is no shared mutable session data.
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{ActionVerb, GameDefinition, GlobalConfig, IntegrationDefinition, LaunchDescriptor};
use crate::control::ControlClient;
use crate::dispatcher;
use crate::messages::Messages;
use crate::process::ProcessControl;
use crate::process_monitor;
use crate::status::{self, SessionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    Preparing,
    Running,
    TearingDown,
    Terminated,
}

/// One dispatched action and its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub integration: String,
    pub verb: ActionVerb,
    pub succeeded: bool,
}

/// An integration whose start action was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartRecord {
    /// Index into [`SessionState::integrations`].
    pub index: usize,
    pub succeeded: bool,
}

pub struct SessionState {
    pub game: GameDefinition,
    /// Resolved integrations, in configured start order.
    pub integrations: Vec<IntegrationDefinition>,
    pub phase: Phase,
    /// Open control-plane connection, if the streaming tool is attached.
    pub control: Option<ControlClient>,
    /// Start attempts in order. Teardown stops exactly these, in reverse.
    pub started: Vec<StartRecord>,
    /// Every action dispatched this session, in order.
    pub journal: Vec<ActionRecord>,
}

impl SessionState {
    /// Ids of the integrations whose start action was attempted.
    #[cfg(test)]
    pub fn started_ids(&self) -> Vec<&str> {
        self.started
            .iter()
            .map(|r| self.integrations[r.index].id.as_str())
            .collect()
    }
}

/// Timing knobs for a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub poll_interval: Duration,
    /// Upper bound on waiting for the game process after start actions.
    pub launch_wait: Duration,
}

impl From<&GlobalConfig> for SessionSettings {
    fn from(global: &GlobalConfig) -> Self {
        Self {
            poll_interval: global.poll_interval(),
            launch_wait: global.launch_wait(),
        }
    }
}

pub struct Orchestrator<P> {
    processes: P,
    settings: SessionSettings,
    messages: Messages,
    status_path: Option<PathBuf>,
    status: SessionStatus,
}

impl<P: ProcessControl> Orchestrator<P> {
    pub fn new(processes: P, settings: SessionSettings, messages: Messages) -> Self {
        Self {
            processes,
            settings,
            messages,
            status_path: None,
            status: SessionStatus::new(),
        }
    }

    /// Mirrors every phase transition into a status file.
    pub fn with_status_file(mut self, path: PathBuf) -> Self {
        self.status_path = Some(path);
        self
    }

    /// Runs a whole session and returns the final state.
    pub async fn run(
        &mut self,
        game: GameDefinition,
        registry: &mut BTreeMap<String, IntegrationDefinition>,
    ) -> SessionState {
        let state = self.begin(game, registry);
        let state = self.prepare(state).await;
        let state = self.monitor(state).await;
        self.teardown(state).await
    }

    /// `Idle → Preparing`: resolves the game's integration ids against
    /// `registry`, moving the matching definitions into the session.
    ///
    /// Unknown ids (including integrations dropped by validation) are skipped
    /// with a warning; they are never started or stopped.
    pub fn begin(
        &mut self,
        game: GameDefinition,
        registry: &mut BTreeMap<String, IntegrationDefinition>,
    ) -> SessionState {
        info!(
            "[session] {}",
            self.messages
                .format("session.starting", &[("game", &game.display_name)])
        );

        let mut integrations: Vec<IntegrationDefinition> = Vec::new();
        for id in &game.integrations {
            match registry.remove(id) {
                Some(def) => integrations.push(def),
                None if integrations.iter().any(|d| d.id == *id) => {
                    warn!("[session] Integration '{id}' is listed twice; ignoring the repeat")
                }
                None => warn!(
                    "[session] {}",
                    self.messages
                        .format("session.integration_unknown", &[("integration", id)])
                ),
            }
        }

        self.status = SessionStatus::new();
        self.status.game = Some(game.display_name.clone());

        let mut state = SessionState {
            game,
            integrations,
            phase: Phase::Idle,
            control: None,
            started: Vec::new(),
            journal: Vec::new(),
        };
        self.transition(&mut state, Phase::Preparing);
        state
    }

    /// `Preparing → Running`: attempts every start action in order, launches
    /// the game if configured, and waits a bounded time for its process.
    ///
    /// Proceeds to `Running` regardless of action failures or whether the game
    /// was seen.
    pub async fn prepare(&mut self, mut state: SessionState) -> SessionState {
        if !self.expect_phase(&state, Phase::Preparing) {
            return state;
        }

        for index in 0..state.integrations.len() {
            let integration = &state.integrations[index];
            let verb = integration.start_action;
            let succeeded =
                dispatcher::invoke(&mut self.processes, integration, verb, &mut state.control).await;
            state.started.push(StartRecord { index, succeeded });
            self.record(&mut state, index, verb, succeeded);
            self.status
                .started_integrations
                .push(state.integrations[index].id.clone());
        }

        self.launch_game(&state.game);

        let found = process_monitor::wait_until_running(
            &mut self.processes,
            &state.game.process,
            self.settings.poll_interval,
            self.settings.launch_wait,
        )
        .await;
        if found.is_none() {
            warn!(
                "[session] {}",
                self.messages.format(
                    "session.game_not_detected",
                    &[
                        ("game", &state.game.display_name),
                        ("secs", &self.settings.launch_wait.as_secs()),
                    ]
                )
            );
            self.status.error = Some(format!(
                "{} was not detected after {:?}",
                state.game.display_name, self.settings.launch_wait
            ));
        }

        self.transition(&mut state, Phase::Running);
        state
    }

    /// `Running → TearingDown`: blocks until the game process is gone.
    pub async fn monitor(&mut self, mut state: SessionState) -> SessionState {
        if !self.expect_phase(&state, Phase::Running) {
            return state;
        }
        process_monitor::watch_for_exit(
            &mut self.processes,
            &state.game.process,
            self.settings.poll_interval,
        )
        .await;
        info!(
            "[session] {}",
            self.messages
                .format("session.game_exited", &[("game", &state.game.display_name)])
        );
        self.transition(&mut state, Phase::TearingDown);
        state
    }

    /// `TearingDown → Terminated`: attempts the stop action of every
    /// integration whose start was attempted, newest first.
    ///
    /// A control session whose open failed is not reconnected just to close it.
    pub async fn teardown(&mut self, mut state: SessionState) -> SessionState {
        if !self.expect_phase(&state, Phase::TearingDown) {
            return state;
        }

        let order: Vec<StartRecord> = state.started.iter().rev().copied().collect();
        for StartRecord { index, succeeded } in order {
            let integration = &state.integrations[index];
            let verb = integration.stop_action;
            if !succeeded
                && integration.start_action == ActionVerb::OpenControlSession
                && verb == ActionVerb::CloseControlSession
            {
                info!(
                    "[session] {} was unreachable at start; skipping {verb}",
                    integration.display_name
                );
                continue;
            }
            let succeeded =
                dispatcher::invoke(&mut self.processes, integration, verb, &mut state.control).await;
            self.record(&mut state, index, verb, succeeded);
        }

        // A connection opened at start but never closed by a stop action.
        if let Some(client) = state.control.take() {
            client.close().await;
        }

        self.transition(&mut state, Phase::Terminated);
        info!(
            "[session] {}",
            self.messages
                .format("session.finished", &[("game", &state.game.display_name)])
        );
        state
    }

    fn launch_game(&mut self, game: &GameDefinition) {
        let Some(launch) = &game.launch else {
            return;
        };
        if let Some(name) = self.processes.find_running(&game.process) {
            info!("[session] {} is already running as {name}; not launching", game.display_name);
            return;
        }
        let result = match launch {
            LaunchDescriptor::Uri(uri) => {
                info!("[session] Launching {} via {uri}", game.display_name);
                self.processes.open_uri(uri)
            }
            LaunchDescriptor::Executable { path, arguments } => {
                info!("[session] Launching {}", path.display());
                self.processes.spawn(path, arguments)
            }
        };
        if let Err(e) = result {
            warn!("[session] Failed to launch {}: {e}", game.display_name);
            self.status.error = Some(format!("Launch failed: {e}"));
        }
    }

    fn record(&mut self, state: &mut SessionState, index: usize, verb: ActionVerb, succeeded: bool) {
        let integration = state.integrations[index].id.clone();
        if !succeeded {
            self.status.failed_actions.push(format!("{integration} {verb}"));
        }
        state.journal.push(ActionRecord {
            integration,
            verb,
            succeeded,
        });
    }

    fn expect_phase(&self, state: &SessionState, expected: Phase) -> bool {
        if state.phase == expected {
            return true;
        }
        warn!(
            "[session] Ignoring step for phase {expected:?}; session is {:?}",
            state.phase
        );
        false
    }

    fn transition(&mut self, state: &mut SessionState, to: Phase) {
        info!("[session] {:?} -> {to:?}", state.phase);
        state.phase = to;
        self.status.phase = to;
        self.status.updated_at = chrono::Local::now().to_rfc3339();
        if let Some(path) = &self.status_path {
            status::write_status(path, &self.status);
        }
    }
}
