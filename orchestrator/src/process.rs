/// OS process surface: name patterns, lookup, launch and termination.
///
/// Everything that touches real processes goes through [`ProcessControl`] so the
/// dispatcher and monitor can be driven by a scripted fake in tests.
use std::fmt;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use sysinfo::{ProcessesToUpdate, System};

/// A set of alternative process names, written in config as `"game32|game64"`.
///
/// Matching is case-insensitive and ignores a trailing `.exe`, so `"Game64"`
/// matches a process named `game64.exe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessPattern {
    alternatives: Vec<String>,
}

impl ProcessPattern {
    pub const DELIMITER: char = '|';

    /// Parses a `|`-separated pattern. Returns `None` if no alternative is non-empty.
    pub fn parse(raw: &str) -> Option<Self> {
        let alternatives: Vec<String> = raw
            .split(Self::DELIMITER)
            .map(normalize)
            .filter(|alt| !alt.is_empty())
            .collect();
        if alternatives.is_empty() {
            None
        } else {
            Some(Self { alternatives })
        }
    }

    /// Derives a single-name pattern from an executable's file name.
    pub fn from_executable(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(Self::parse)
    }

    /// True if `process_name` equals any of the alternatives.
    pub fn matches(&self, process_name: &str) -> bool {
        let name = normalize(process_name);
        self.alternatives.iter().any(|alt| *alt == name)
    }

    #[cfg(test)]
    pub fn alternatives(&self) -> &[String] {
        &self.alternatives
    }
}

impl fmt::Display for ProcessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.alternatives.join("|"))
    }
}

fn normalize(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// Splits a free-form argument string on whitespace. Double quotes group
/// words containing spaces and are removed from the result.
pub fn split_arguments(raw: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut pending = false;

    for c in raw.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                pending = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if pending {
                    args.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        args.push(current);
    }
    args
}

/// Platform capability used by the dispatcher and the lifecycle monitor.
pub trait ProcessControl: Send {
    /// Returns the name of the first running process matching `pattern`.
    fn find_running(&mut self, pattern: &ProcessPattern) -> Option<String>;

    /// Starts `program` detached with `args`. Does not wait for it to exit.
    fn spawn(&mut self, program: &Path, args: &[String]) -> io::Result<()>;

    /// Kills every process matching `pattern` and returns how many were signalled.
    fn terminate(&mut self, pattern: &ProcessPattern) -> usize;

    /// Hands a launcher URI (e.g. `steam://rungameid/730`) to the OS shell.
    fn open_uri(&mut self, uri: &str) -> io::Result<()>;
}

/// [`ProcessControl`] backed by `sysinfo` and `std::process`.
pub struct SystemProcesses {
    sys: System,
}

impl SystemProcesses {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }

    fn refresh(&mut self) {
        // Dead entries must be dropped or an exited game would look alive forever.
        self.sys.refresh_processes(ProcessesToUpdate::All, true);
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessControl for SystemProcesses {
    fn find_running(&mut self, pattern: &ProcessPattern) -> Option<String> {
        self.refresh();
        self.sys
            .processes()
            .values()
            .map(|p| p.name().to_string_lossy().into_owned())
            .find(|name| pattern.matches(name))
    }

    fn spawn(&mut self, program: &Path, args: &[String]) -> io::Result<()> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = program.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        let mut child = command.spawn()?;
        // Reap the child so short-lived control invocations don't linger as zombies.
        std::thread::Builder::new()
            .name("child-reaper".into())
            .spawn(move || {
                let _ = child.wait();
            })?;
        Ok(())
    }

    fn terminate(&mut self, pattern: &ProcessPattern) -> usize {
        self.refresh();
        self.sys
            .processes()
            .values()
            .filter(|p| pattern.matches(&p.name().to_string_lossy()))
            .filter(|p| p.kill())
            .count()
    }

    fn open_uri(&mut self, uri: &str) -> io::Result<()> {
        let mut command = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", ""]).arg(uri);
            c
        } else if cfg!(target_os = "macos") {
            let mut c = Command::new("open");
            c.arg(uri);
            c
        } else {
            let mut c = Command::new("xdg-open");
            c.arg(uri);
            c
        };
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(drop)
    }
}
