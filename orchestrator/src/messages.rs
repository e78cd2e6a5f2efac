/// Human-readable message lookup for session log lines.
///
/// The translation table is produced by the localization tooling as TOML;
/// nested tables flatten to dotted keys (`[session] starting = "…"` becomes
/// `session.starting`). A missing key resolves to the key itself, so the
/// orchestrator keeps working with an empty or absent table.
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;

const DEFAULTS: &str = include_str!("../default-messages.toml");

#[derive(Debug, Default, Clone)]
pub struct Messages {
    table: HashMap<String, String>,
}

impl Messages {
    /// A catalog with no translations; every lookup returns its key.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The English table compiled into the binary.
    pub fn defaults() -> Self {
        Self::parse(DEFAULTS).unwrap_or_default()
    }

    /// Entries from `other` replace entries in `self`.
    pub fn merged_with(mut self, other: Messages) -> Self {
        self.table.extend(other.table);
        self
    }

    /// Loads the table at `path`, or an empty catalog if the file does not exist.
    pub fn load_or_empty(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::empty());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read messages file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse messages file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let root: toml::Table = toml::from_str(content)?;
        let mut table = HashMap::new();
        flatten("", &root, &mut table);
        Ok(Self { table })
    }

    /// Looks up `key`, falling back to the key itself.
    pub fn get<'a>(&'a self, key: &'a str) -> &'a str {
        self.table.get(key).map(String::as_str).unwrap_or(key)
    }

    /// Looks up `key` and substitutes `{name}` placeholders from `args`.
    pub fn format(&self, key: &str, args: &[(&str, &dyn Display)]) -> String {
        let mut text = self.get(key).to_string();
        for (name, value) in args {
            text = text.replace(&format!("{{{name}}}"), &value.to_string());
        }
        text
    }
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut HashMap<String, String>) {
    for (key, value) in table {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::String(s) => {
                out.insert(full, s.clone());
            }
            toml::Value::Table(nested) => flatten(&full, nested, out),
            // Non-string leaves are not messages.
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_returns_key() {
        let m = Messages::empty();
        assert_eq!(m.get("session.starting"), "session.starting");
    }

    #[test]
    fn nested_tables_flatten_to_dotted_keys() {
        let m = Messages::parse(
            r#"
top = "Top level"
[session]
starting = "Optimizing {game}"
[session.teardown]
done = "Restored"
"#,
        )
        .unwrap();
        assert_eq!(m.get("top"), "Top level");
        assert_eq!(m.get("session.starting"), "Optimizing {game}");
        assert_eq!(m.get("session.teardown.done"), "Restored");
    }

    #[test]
    fn format_substitutes_placeholders() {
        let m = Messages::parse("[session]\nstarting = \"Optimizing {game} ({count} integrations)\"\n")
            .unwrap();
        let text = m.format("session.starting", &[("game", &"Halo"), ("count", &3)]);
        assert_eq!(text, "Optimizing Halo (3 integrations)");
    }

    #[test]
    fn format_degrades_to_key_when_untranslated() {
        let m = Messages::empty();
        assert_eq!(m.format("session.starting", &[("game", &"Halo")]), "session.starting");
    }

    #[test]
    fn non_string_values_are_ignored() {
        let m = Messages::parse("version = 3\nname = \"x\"\n").unwrap();
        assert_eq!(m.get("version"), "version");
        assert_eq!(m.get("name"), "x");
    }

    #[test]
    fn defaults_cover_session_lines() {
        let m = Messages::defaults();
        for key in [
            "session.starting",
            "session.integration_unknown",
            "session.game_not_detected",
            "session.game_exited",
            "session.finished",
        ] {
            assert_ne!(m.get(key), key);
        }
    }

    #[test]
    fn loaded_entries_override_defaults() {
        let m = Messages::defaults()
            .merged_with(Messages::parse("[session]\nstarting = \"Optimisation de {game}\"\n").unwrap());
        assert_eq!(m.format("session.starting", &[("game", &"Halo")]), "Optimisation de Halo");
        assert_ne!(m.get("session.finished"), "session.finished");
    }

    #[test]
    fn load_or_empty_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let m = Messages::load_or_empty(&dir.path().join("messages.toml")).unwrap();
        assert_eq!(m.get("a.b"), "a.b");
    }

    #[test]
    fn load_or_empty_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        assert!(Messages::load_or_empty(&path).is_err());
    }
}
