//! Per-section key/value settings lookup.
//!
//! Devices read their tunables once, when they are configured, through the
//! [`SettingsSource`] trait. [`JsonSettings`] is the stock implementation,
//! backed by a JSON object of sections:
//!
//! ```json
//! {
//!     "Controller1": { "SteeringDeadzone": 0.2, "TwistResponse": "quadratic" },
//!     "Controller2": { "XScale": 1.05 }
//! }
//! ```

use crate::logging::{log, LogCategory, LogLevel};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Read-only settings lookup by section and key
pub trait SettingsSource {
    /// Float value, or `default` when missing or not a number
    fn get_float(&self, section: &str, key: &str, default: f32) -> f32;

    /// String value, or None when missing or not a string
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Boolean value, or `default` when missing or not a boolean
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;
}

/// Settings backed by a JSON object of sections
#[derive(Debug, Clone, Default)]
pub struct JsonSettings {
    sections: Map<String, Value>,
}

impl JsonSettings {
    /// Empty settings: every lookup returns its default
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from a JSON string
    pub fn from_json_str(contents: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(contents)?;
        Ok(Self::from_value(value))
    }

    /// Build settings from an already parsed value. Non-object values yield empty settings.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(sections) => Self { sections },
            _ => Self::default(),
        }
    }

    /// Load settings from a file, falling back to empty settings on error
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    log(LogCategory::Config, LogLevel::Warn, || {
                        format!(
                            "Failed to parse settings {}: {}. Using defaults.",
                            path.display(),
                            e
                        )
                    });
                    Self::default()
                }
            },
            // Missing file is the normal first-run case
            Err(_) => Self::default(),
        }
    }

    /// Set a value, creating the section if needed
    pub fn set(&mut self, section: &str, key: &str, value: Value) {
        let entry = self
            .sections
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(map) = entry {
            map.insert(key.to_string(), value);
        }
    }

    fn lookup(&self, section: &str, key: &str) -> Option<&Value> {
        self.sections.get(section).and_then(|s| s.get(key))
    }
}

impl SettingsSource for JsonSettings {
    fn get_float(&self, section: &str, key: &str, default: f32) -> f32 {
        self.lookup(section, key)
            .and_then(Value::as_f64)
            .map(|v| v as f32)
            .unwrap_or(default)
    }

    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.lookup(section, key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.lookup(section, key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_with_defaults() {
        let settings = JsonSettings::from_json_str(
            r#"{"Controller1": {"SteeringDeadzone": 0.25, "TwistResponse": "cubic", "Enabled": true}}"#,
        )
        .expect("parse");

        assert_eq!(settings.get_float("Controller1", "SteeringDeadzone", 0.1), 0.25);
        assert_eq!(settings.get_float("Controller1", "Missing", 0.1), 0.1);
        assert_eq!(settings.get_float("Controller2", "SteeringDeadzone", 0.1), 0.1);
        assert_eq!(
            settings.get_string("Controller1", "TwistResponse"),
            Some("cubic".to_string())
        );
        assert!(settings.get_bool("Controller1", "Enabled", false));
        // Wrong type falls back to the default
        assert_eq!(settings.get_float("Controller1", "TwistResponse", 1.0), 1.0);
    }

    #[test]
    fn test_set_creates_section() {
        let mut settings = JsonSettings::new();
        settings.set("Controller3", "XScale", json!(1.5));
        assert_eq!(settings.get_float("Controller3", "XScale", 1.0), 1.5);
    }

    #[test]
    fn test_non_object_document_is_empty() {
        let settings = JsonSettings::from_value(json!([1, 2, 3]));
        assert_eq!(settings.get_string("a", "b"), None);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("emu_core_settings_does_not_exist.json");
        let settings = JsonSettings::load(&path);
        assert_eq!(settings.get_float("Controller1", "XScale", 1.0), 1.0);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join("emu_core_settings_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        std::fs::write(&path, r#"{"Controller2": {"YScale": 0.5}}"#).unwrap();

        let settings = JsonSettings::load(&path);
        assert_eq!(settings.get_float("Controller2", "YScale", 1.0), 0.5);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
