use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::input::{MenuAction, RepeatPolicy, DEFAULT_REPEAT_ACTIONS};
use crate::persistence::SaveOptions;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parse settings json at {path}: {message}")]
    Parse { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugMenuSettings {
    pub max_command_history: usize,
    /// Commands containing any of these are never written to history.
    pub no_save_console_commands: Vec<String>,
    pub does_not_save_console_command: bool,
    pub disable_save_file: bool,
    pub save_slot_name: String,
    pub save_dir: PathBuf,
    pub repeat: RepeatPolicy,
    pub repeat_actions: Vec<MenuAction>,
    /// Seconds between property re-reads; zero reads on every poll.
    pub property_poll_interval: f32,
    pub default_language: String,
    /// Hold input until the screenshot taken on open has been processed.
    pub wait_for_capture_before_opening: bool,
}

impl Default for DebugMenuSettings {
    fn default() -> Self {
        Self {
            max_command_history: 100,
            no_save_console_commands: [
                "LevelEditor.",
                "ToggleDebugCamera",
                "stat ",
                "LoadTimes.",
                "CsvProfile ",
                "Obj ",
                "Freeze",
            ]
            .map(str::to_string)
            .to_vec(),
            does_not_save_console_command: false,
            disable_save_file: false,
            save_slot_name: "DebugMenuSaveData".to_string(),
            save_dir: PathBuf::from("Saved/DebugMenu"),
            repeat: RepeatPolicy::default(),
            repeat_actions: DEFAULT_REPEAT_ACTIONS.to_vec(),
            property_poll_interval: 0.0,
            default_language: "en".to_string(),
            wait_for_capture_before_opening: false,
        }
    }
}

impl DebugMenuSettings {
    pub fn from_json_str(raw: &str) -> Result<Self, SettingsError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
            let path = error.path().to_string();
            SettingsError::Parse {
                path,
                message: error.into_inner().to_string(),
            }
        })
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json_str(&raw)?;
        info!(path = %path.display(), "debug_menu_settings_loaded");
        Ok(settings)
    }

    pub fn save_options(&self) -> SaveOptions {
        SaveOptions {
            slot_name: self.save_slot_name.clone(),
            disable_save_file: self.disable_save_file,
            does_not_save_console_command: self.does_not_save_console_command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let settings = DebugMenuSettings::from_json_str("{}").expect("parse");
        assert_eq!(settings, DebugMenuSettings::default());
        assert_eq!(settings.max_command_history, 100);
        assert_eq!(settings.no_save_console_commands.len(), 7);
        assert_eq!(settings.repeat.initial_delay, 0.5);
    }

    #[test]
    fn partial_nested_override_keeps_sibling_defaults() {
        let settings = DebugMenuSettings::from_json_str(
            r#"{"repeat":{"trigger_limit":3},"repeat_actions":["Up","Down"],"disable_save_file":true}"#,
        )
        .expect("parse");
        assert_eq!(settings.repeat.trigger_limit, 3);
        assert!(settings.repeat.trigger_on_start);
        assert_eq!(settings.repeat_actions, vec![MenuAction::Up, MenuAction::Down]);
        assert!(settings.save_options().disable_save_file);
    }

    #[test]
    fn parse_error_reports_field_path() {
        let error = DebugMenuSettings::from_json_str(r#"{"repeat":{"initial_delay":"soon"}}"#)
            .expect_err("string is not a number");
        match error {
            SettingsError::Parse { path, .. } => assert_eq!(path, "repeat.initial_delay"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("debug_menu.json");
        fs::write(&path, r#"{"max_command_history":5}"#).expect("write");
        let settings = DebugMenuSettings::load(&path).expect("load");
        assert_eq!(settings.max_command_history, 5);

        assert!(matches!(
            DebugMenuSettings::load(&dir.path().join("missing.json")),
            Err(SettingsError::Read { .. })
        ));
    }
}
