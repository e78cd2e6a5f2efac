use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::process::{ProcessControl, ProcessPattern};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Polls every `poll_interval` until a process matching `pattern` appears or
/// `limit` elapses. Returns the matched process name, or `None` on timeout.
pub async fn wait_until_running<P: ProcessControl>(
    processes: &mut P,
    pattern: &ProcessPattern,
    poll_interval: Duration,
    limit: Duration,
) -> Option<String> {
    // A limit too large to represent means no deadline.
    let deadline = Instant::now().checked_add(limit);
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Some(name) = processes.find_running(pattern) {
            info!("[monitor] Detected: {name}");
            return Some(name);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return None;
        }
    }
}

/// Polls every `poll_interval` and returns once no alternative of `pattern`
/// is running.
///
/// A game counts as running while *any* alternative matches (32-bit and 64-bit
/// builds are often both listed), so this only returns when all are gone.
pub async fn watch_for_exit<P: ProcessControl>(
    processes: &mut P,
    pattern: &ProcessPattern,
    poll_interval: Duration,
) {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen: Option<String> = None;

    loop {
        ticker.tick().await;
        match processes.find_running(pattern) {
            Some(name) => {
                if last_seen.as_deref() != Some(name.as_str()) {
                    debug!("[monitor] Watching {name}");
                    last_seen = Some(name);
                }
            }
            None => {
                match last_seen {
                    Some(name) => info!("[monitor] Exited: {name}"),
                    None => info!("[monitor] No process matching '{pattern}' is running"),
                }
                return;
            }
        }
    }
}
