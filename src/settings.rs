// ============================================================================
// EDITOR SETTINGS - persisted key=value preferences
// ============================================================================

use std::path::{Path, PathBuf};

use crate::bag::BagFormat;
use crate::components::history::DEFAULT_MAX_STEPS;
use crate::io::DEFAULT_BORDER_CELLS;

const SETTINGS_FILE_NAME: &str = "sciipaint_settings.cfg";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditorSettings {
    /// Steps kept in memory while editing.
    pub history_max_steps: usize,
    /// Newest steps written on save; negative keeps all.
    pub history_steps_on_save: i32,
    /// Format written by save and migrate.
    pub save_format: BagFormat,
    /// PNG export upscale factor.
    pub export_scale: u32,
    /// PNG export border width in cells.
    pub export_border_cells: u32,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            history_max_steps: DEFAULT_MAX_STEPS,
            history_steps_on_save: -1,
            save_format: BagFormat::Bitstream,
            export_scale: 2,
            export_border_cells: DEFAULT_BORDER_CELLS,
        }
    }
}

impl EditorSettings {
    /// Returns the path to the settings config file.
    /// On Linux:   $XDG_CONFIG_HOME/sciipaint/sciipaint_settings.cfg
    /// On Windows: %APPDATA%\SciiPaint\sciipaint_settings.cfg
    /// On macOS:   ~/Library/Application Support/SciiPaint/sciipaint_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("sciipaint");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE_NAME));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            let config_dir = PathBuf::from(appdata).join("SciiPaint");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE_NAME));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home).join("Library").join("Application Support").join("SciiPaint");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE_NAME));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE_NAME)))
        }
    }

    /// Load from the platform location, falling back to defaults.
    pub fn load() -> Self {
        Self::settings_path().map(|path| Self::load_from(&path)).unwrap_or_default()
    }

    /// Load from `path`. Missing files, unknown keys and malformed values keep their defaults.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else { return Self::default() };
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "history_max_steps" => {
                    if let Ok(v) = val.parse::<usize>() {
                        s.history_max_steps = v.max(1);
                    }
                }
                "history_steps_on_save" => {
                    if let Ok(v) = val.parse() {
                        s.history_steps_on_save = v;
                    }
                }
                "save_format" => {
                    s.save_format = match val {
                        "bag1" => BagFormat::Legacy,
                        _ => BagFormat::Bitstream,
                    };
                }
                "export_scale" => {
                    if let Ok(v) = val.parse::<u32>() {
                        s.export_scale = v.clamp(1, 16);
                    }
                }
                "export_border_cells" => {
                    if let Ok(v) = val.parse::<u32>() {
                        s.export_border_cells = v.min(16);
                    }
                }
                _ => tracing::debug!(key, "ignoring unknown setting"),
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        let format_str = match self.save_format {
            BagFormat::Legacy => "bag1",
            BagFormat::Bitstream => "bag2",
        };
        format!(
            "history_max_steps={}\n\
             history_steps_on_save={}\n\
             save_format={format_str}\n\
             export_scale={}\n\
             export_border_cells={}\n",
            self.history_max_steps, self.history_steps_on_save, self.export_scale, self.export_border_cells,
        )
    }

    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to save settings");
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_config_string())
    }
}
