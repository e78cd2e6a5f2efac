/// Canonical file locations for the orchestrator.
///
/// Everything lives under the per-user config directory (%APPDATA%\GameSession\
/// on Windows):
///   - config.toml    Written by the configuration editor, read at session start.
///   - messages.toml  Optional localized log lines.
///   - status.toml    Written on every phase transition, read by the editor.
///   - logs\          Daily rolling log files.
use std::path::PathBuf;

const APP_DIR_NAME: &str = "GameSession";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const MESSAGES_FILE_NAME: &str = "messages.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";
const LOG_DIR_NAME: &str = "logs";

pub fn app_data_dir() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join(APP_DIR_NAME);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".game-session");
    }
    PathBuf::from("./game-session")
}

pub fn config_file_path() -> PathBuf {
    app_data_dir().join(CONFIG_FILE_NAME)
}

pub fn messages_file_path() -> PathBuf {
    app_data_dir().join(MESSAGES_FILE_NAME)
}

pub fn status_file_path() -> PathBuf {
    app_data_dir().join(STATUS_FILE_NAME)
}

pub fn log_dir() -> PathBuf {
    app_data_dir().join(LOG_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_is_deterministic() {
        assert_eq!(app_data_dir(), app_data_dir());
    }

    #[test]
    fn config_file_path_has_correct_name() {
        assert_eq!(config_file_path().file_name().unwrap(), CONFIG_FILE_NAME);
    }

    #[test]
    fn status_file_path_has_correct_name() {
        assert_eq!(status_file_path().file_name().unwrap(), STATUS_FILE_NAME);
    }

    #[test]
    fn data_files_share_same_parent_dir() {
        let config = config_file_path();
        assert_eq!(config.parent(), status_file_path().parent());
        assert_eq!(config.parent(), messages_file_path().parent());
    }

    #[test]
    fn log_dir_is_inside_app_dir() {
        assert!(log_dir().starts_with(app_data_dir()));
    }

    #[cfg(windows)]
    #[test]
    fn app_data_dir_is_inside_appdata() {
        let appdata = std::env::var("APPDATA").unwrap();
        let dir = app_data_dir();
        assert!(dir.starts_with(&appdata));
        assert_eq!(dir.file_name().unwrap(), APP_DIR_NAME);
    }
}
