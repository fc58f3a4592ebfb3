//! Global settings editor.
//!
//! One flat TOML file (`~/.moves/settings.toml`) with a fixed key set. The
//! template defaults are merged under whatever the user has stored, the file
//! is rewritten in full on open so every known key is always present, `set`
//! rejects keys the template does not know, and `unset` restores a key to its
//! default rather than removing it.

use anyhow::{Context, Result};
use toml::Table;

use crate::models::Settings;
use crate::storage::DataDir;

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: String::new(),
            key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

pub struct SettingsEditor {
    data_dir: DataDir,
    data: Table,
}

fn template_defaults() -> Table {
    toml::Value::try_from(Settings::default())
        .expect("settings template serializes")
        .as_table()
        .expect("settings template is a table")
        .clone()
}

impl SettingsEditor {
    /// Load the settings file, merge it over the template defaults, and
    /// rewrite it so the on-disk file always carries every known key.
    pub fn open(data_dir: DataDir) -> Result<Self> {
        let mut data = template_defaults();

        if let Ok(raw) = data_dir.read_text(&data_dir.settings_file()) {
            let user: Table = raw
                .parse()
                .with_context(|| "Settings file is not valid TOML")?;
            for (key, value) in user {
                if data.contains_key(&key) {
                    data.insert(key, value);
                }
            }
        }

        let editor = Self { data_dir, data };
        editor.save()?;
        Ok(editor)
    }

    fn save(&self) -> Result<()> {
        let rendered = toml::to_string_pretty(&self.data).context("Failed to render settings")?;
        self.data_dir
            .write_text(&self.data_dir.settings_file(), &rendered)
            .context("Failed to save settings")
    }

    /// Set a known key. Returns `false` (and writes nothing) for unknown keys.
    pub fn set(&mut self, key: &str, value: &str) -> Result<bool> {
        if !self.data.contains_key(key) {
            return Ok(false);
        }
        self.data
            .insert(key.to_string(), toml::Value::String(value.to_string()));
        self.save()?;
        Ok(true)
    }

    /// Restore a known key to its template default. Returns `false` for
    /// unknown keys.
    pub fn unset(&mut self, key: &str) -> Result<bool> {
        let defaults = template_defaults();
        let Some(default) = defaults.get(key) else {
            return Ok(false);
        };
        self.data.insert(key.to_string(), default.clone());
        self.save()?;
        Ok(true)
    }

    /// The merged settings.
    pub fn list(&self) -> Result<Settings> {
        self.data
            .clone()
            .try_into()
            .context("Settings file has unexpected value types")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
