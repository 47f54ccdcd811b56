use std::fs;
use std::path::{Path, PathBuf};

use rts_engine::Settings;
use tracing::{info, warn};

pub(crate) const SETTINGS_ENV_VAR: &str = "RTS_SETTINGS";
const SETTINGS_FILE_NAME: &str = "settings.json";

pub(crate) type SettingsResult<T> = Result<T, String>;

/// `RTS_SETTINGS` wins over `<root>/settings.json`.
pub(crate) fn settings_path(root: &Path) -> PathBuf {
    match std::env::var_os(SETTINGS_ENV_VAR) {
        Some(raw) if !raw.is_empty() => PathBuf::from(raw),
        _ => root.join(SETTINGS_FILE_NAME),
    }
}

/// Reads the settings file, writing the defaults out first if there is none yet.
pub(crate) fn load_or_create(path: &Path) -> SettingsResult<Settings> {
    if !path.exists() {
        let settings = Settings::default();
        match save(path, &settings) {
            Ok(()) => info!(path = %path.display(), "settings_defaults_written"),
            Err(error) => warn!(error = %error, "settings_defaults_not_written"),
        }
        return Ok(settings);
    }
    load(path)
}

pub(crate) fn load(path: &Path) -> SettingsResult<Settings> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("read settings '{}': {error}", path.display()))?;
    let settings = parse_settings_json(&raw)
        .map_err(|error| format!("{error} (in '{}')", path.display()))?;
    info!(
        path = %path.display(),
        world_size = settings.world_size().width,
        ticks_per_second = settings.ticks_per_second(),
        target_fps = settings.target_fps(),
        "settings_loaded"
    );
    Ok(settings)
}

pub(crate) fn save(path: &Path, settings: &Settings) -> SettingsResult<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| format!("create settings dir '{}': {error}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|error| format!("encode settings json: {error}"))?;
    fs::write(path, json)
        .map_err(|error| format!("write settings '{}': {error}", path.display()))
}

fn parse_settings_json(raw: &str) -> SettingsResult<Settings> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, Settings>(&mut deserializer) {
        Ok(settings) => Ok(settings),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse settings json: {source}"))
            } else {
                Err(format!("parse settings json at {path}: {source}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rts_engine::settings::WorldSizeType;

    use super::*;

    #[test]
    fn missing_file_writes_defaults_and_returns_them() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config").join(SETTINGS_FILE_NAME);

        let settings = load_or_create(&path).expect("load");
        assert_eq!(settings, Settings::default());
        assert!(path.is_file());
        assert_eq!(load(&path).expect("reload"), Settings::default());
    }

    #[test]
    fn saved_changes_survive_a_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE_NAME);
        let mut settings = Settings::default();
        settings.set_world_size_type(WorldSizeType::Test);
        settings.set_debug_overlays(true);
        settings.set_ticks_per_second(30);

        save(&path, &settings).expect("save");
        let loaded = load_or_create(&path).expect("load");
        assert_eq!(loaded.world_size().width, 10);
        assert!(loaded.debug_overlays());
        assert_eq!(loaded.ticks_per_second(), 30);
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let settings =
            parse_settings_json(r#"{"world_size_type":"TEST","unknown_key":1}"#).expect("parse");
        assert_eq!(settings.world_size_type(), WorldSizeType::Test);
        assert_eq!(settings.target_fps(), Settings::default().target_fps());
    }

    #[test]
    fn type_errors_name_the_offending_field() {
        let error = parse_settings_json(r#"{"ticks_per_second":"fast"}"#).expect_err("bad type");
        assert!(error.contains("at ticks_per_second"), "{error}");

        let error = parse_settings_json("[1, 2").expect_err("bad json");
        assert!(error.starts_with("parse settings json"), "{error}");
    }
}
