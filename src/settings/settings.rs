// Settings management and persistence
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Language the UI starts in before the visitor picks one.
pub const DEFAULT_LANGUAGE: &str = "sk";

/// Main application settings.
///
/// The selected language is the only durable piece of client state: read
/// once at startup, written on every selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub version: i32, // Settings schema version for future migrations
    pub selected_language: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: 1,
            selected_language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl AppSettings {
    /// Get the settings file path
    pub fn get_settings_path(app_dir: &PathBuf) -> PathBuf {
        app_dir.join("settings.json")
    }

    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(app_dir: &PathBuf) -> Result<Self, String> {
        let path = Self::get_settings_path(app_dir);

        if !path.exists() {
            eprintln!("[Settings] No settings file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read settings file: {}", e))?;

        let settings: AppSettings = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse settings: {}", e))?;

        eprintln!("[Settings] Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, app_dir: &PathBuf) -> Result<(), String> {
        // Ensure directory exists
        fs::create_dir_all(app_dir)
            .map_err(|e| format!("Failed to create settings directory: {}", e))?;

        let path = Self::get_settings_path(app_dir);
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        fs::write(&path, content)
            .map_err(|e| format!("Failed to write settings file: {}", e))?;

        eprintln!("[Settings] Saved settings to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("basilica-tour-settings-{tag}"));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = scratch_dir("missing");
        let settings = AppSettings::load(&dir).unwrap();
        assert_eq!(settings.selected_language, DEFAULT_LANGUAGE);
        assert_eq!(settings.version, 1);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = scratch_dir("roundtrip");
        let settings = AppSettings {
            version: 1,
            selected_language: "en".to_string(),
        };
        settings.save(&dir).unwrap();

        let loaded = AppSettings::load(&dir).unwrap();
        assert_eq!(loaded.selected_language, "en");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = scratch_dir("garbage");
        fs::create_dir_all(&dir).unwrap();
        fs::write(AppSettings::get_settings_path(&dir), "not json").unwrap();
        assert!(AppSettings::load(&dir).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
