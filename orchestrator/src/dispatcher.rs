/// Maps an (integration, verb) pair to its effect on the managed application.
///
/// Each [`ActionVerb`] has exactly one handler function, looked up in
/// [`handler_for`]. Handlers report errors; [`invoke`] absorbs them into a log
/// line and a `bool` so a failing integration never stops the session.
use std::io;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ActionVerb, IntegrationDefinition};
use crate::control::{ControlClient, ControlError, ControlSettings};
use crate::process::{split_arguments, ProcessControl};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("no executable configured")]
    NoExecutable,
    #[error("executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),
    #[error("failed to launch {}: {source}", .path.display())]
    Launch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no installed renderer found for {}", .0.display())]
    RendererNotFound(PathBuf),
    #[error("no process pattern configured")]
    NoProcessPattern,
    #[error("no control settings configured")]
    NoControlSettings,
    #[error(transparent)]
    Control(#[from] ControlError),
}

/// Everything a handler may touch for one invocation.
pub struct ActionTarget<'a, P> {
    pub processes: &'a mut P,
    pub integration: &'a IntegrationDefinition,
    /// The session's control-plane connection slot.
    pub control: &'a mut Option<ControlClient>,
}

pub type HandlerFuture<'a> = BoxFuture<'a, Result<(), ActionError>>;
pub type Handler<P> = for<'a> fn(ActionTarget<'a, P>) -> HandlerFuture<'a>;

/// The dispatch table.
pub fn handler_for<P: ProcessControl>(verb: ActionVerb) -> Handler<P> {
    let handler: Handler<P> = match verb {
        ActionVerb::StartProcess => start_process::<P>,
        ActionVerb::StopProcess => stop_process::<P>,
        ActionVerb::ToggleHotkeys => toggle_hotkeys::<P>,
        ActionVerb::PauseRender => pause_render::<P>,
        ActionVerb::ResumeRender => resume_render::<P>,
        ActionVerb::OpenControlSession => open_control_session::<P>,
        ActionVerb::CloseControlSession => close_control_session::<P>,
        ActionVerb::None => noop::<P>,
    };
    handler
}

/// Runs `verb` for `integration`. Returns `true` on success; failures are
/// logged and reported as `false`.
pub async fn invoke<P: ProcessControl>(
    processes: &mut P,
    integration: &IntegrationDefinition,
    verb: ActionVerb,
    control: &mut Option<ControlClient>,
) -> bool {
    let handler = handler_for::<P>(verb);
    let target = ActionTarget {
        processes,
        integration,
        control,
    };
    match handler(target).await {
        Ok(()) => {
            info!("[dispatch] {} {verb}: ok", integration.display_name);
            true
        }
        Err(e) => {
            warn!("[dispatch] {} {verb} failed: {e}", integration.display_name);
            false
        }
    }
}

fn start_process<'a, P: ProcessControl>(t: ActionTarget<'a, P>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let exe = require_executable(t.integration)?;
        if let Some(pattern) = t.integration.detection_pattern() {
            if let Some(name) = t.processes.find_running(&pattern) {
                info!("[dispatch] {} already running as {name}", t.integration.id);
                return Ok(());
            }
        }
        launch(t.processes, exe, &t.integration.arguments)
    })
}

fn stop_process<'a, P: ProcessControl>(t: ActionTarget<'a, P>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let pattern = t
            .integration
            .detection_pattern()
            .ok_or(ActionError::NoProcessPattern)?;
        match t.processes.terminate(&pattern) {
            0 => debug!("[dispatch] {} not running; nothing to stop", t.integration.id),
            n => info!("[dispatch] Terminated {n} process(es) matching '{pattern}'"),
        }
        Ok(())
    })
}

fn toggle_hotkeys<'a, P: ProcessControl>(t: ActionTarget<'a, P>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let exe = require_executable(t.integration)?;
        launch(t.processes, exe, &t.integration.arguments)
    })
}

fn pause_render<'a, P: ProcessControl>(t: ActionTarget<'a, P>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let args = split_arguments(&t.integration.render.pause_arguments);
        control_renderer(t.processes, t.integration, &args)
    })
}

fn resume_render<'a, P: ProcessControl>(t: ActionTarget<'a, P>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let args = split_arguments(&t.integration.render.resume_arguments);
        control_renderer(t.processes, t.integration, &args)
    })
}

fn open_control_session<'a, P: ProcessControl>(t: ActionTarget<'a, P>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let settings = control_settings(t.integration)?;
        let mut client = match t.control.take() {
            Some(client) => client,
            None => ControlClient::connect(settings).await?,
        };
        let result = client.request(&settings.start_request).await;
        // Keep the connection even if the request failed so teardown can reuse it.
        *t.control = Some(client);
        result?;
        Ok(())
    })
}

fn close_control_session<'a, P: ProcessControl>(t: ActionTarget<'a, P>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let settings = control_settings(t.integration)?;
        // The tool may have been restarted mid-game; reconnect if needed.
        let mut client = match t.control.take() {
            Some(client) => client,
            None => ControlClient::connect(settings).await?,
        };
        let result = client.request(&settings.stop_request).await;
        client.close().await;
        result?;
        Ok(())
    })
}

fn noop<'a, P: ProcessControl>(_t: ActionTarget<'a, P>) -> HandlerFuture<'a> {
    Box::pin(std::future::ready(Ok(())))
}

fn require_executable(integration: &IntegrationDefinition) -> Result<&Path, ActionError> {
    let exe = integration
        .executable
        .as_deref()
        .ok_or(ActionError::NoExecutable)?;
    if !exe.is_file() {
        return Err(ActionError::ExecutableNotFound(exe.to_path_buf()));
    }
    Ok(exe)
}

fn control_settings(integration: &IntegrationDefinition) -> Result<&ControlSettings, ActionError> {
    integration
        .control
        .as_ref()
        .ok_or(ActionError::NoControlSettings)
}

fn launch<P: ProcessControl>(processes: &mut P, exe: &Path, args: &[String]) -> Result<(), ActionError> {
    debug!("[dispatch] Launching {} {args:?}", exe.display());
    processes.spawn(exe, args).map_err(|source| ActionError::Launch {
        path: exe.to_path_buf(),
        source,
    })
}

fn control_renderer<P: ProcessControl>(
    processes: &mut P,
    integration: &IntegrationDefinition,
    args: &[String],
) -> Result<(), ActionError> {
    let configured = integration
        .executable
        .as_deref()
        .ok_or(ActionError::NoExecutable)?;
    let exe = resolve_renderer(configured)
        .ok_or_else(|| ActionError::RendererNotFound(configured.to_path_buf()))?;
    launch(processes, &exe, args)
}

/// Picks the installed renderer binary.
///
/// Installers ship a 32-bit and a 64-bit build side by side, and config
/// usually points at the 32-bit one. If the configured file name contains
/// `32` and a sibling with the last `32` replaced by `64` exists, that sibling
/// wins; otherwise the configured path is used if it exists.
pub fn resolve_renderer(configured: &Path) -> Option<PathBuf> {
    let file_name = configured.file_name()?.to_str()?;
    if let Some(pos) = file_name.rfind("32") {
        let sibling = configured.with_file_name(format!(
            "{}64{}",
            &file_name[..pos],
            &file_name[pos + 2..]
        ));
        if sibling.is_file() {
            return Some(sibling);
        }
    }
    configured.is_file().then(|| configured.to_path_buf())
}
