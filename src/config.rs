use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{pipeline::PipelineSettings, position::Viewport};

const CONFIG_DIR_NAME: &str = "y2k-chat-overlay";
const CONFIG_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    #[default]
    Stack,
    ZigZag,
    Scatter,
    SideLeft,
    SideRight,
}

impl LayoutMode {
    pub fn uses_absolute_positions(self) -> bool {
        matches!(self, Self::Scatter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThemePreset {
    #[default]
    CyberVirus,
    Vaporwave,
    Matrix,
    HotdogStand,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeColors {
    pub bg: String,
    pub text: String,
    pub username: String,
    pub header_start: String,
    pub header_end: String,
    pub border: String,
}

impl ThemeColors {
    fn from_hex(palette: [&str; 6]) -> Self {
        let [bg, text, username, header_start, header_end, border] = palette;
        Self {
            bg: bg.to_owned(),
            text: text.to_owned(),
            username: username.to_owned(),
            header_start: header_start.to_owned(),
            header_end: header_end.to_owned(),
            border: border.to_owned(),
        }
    }
}

impl Default for ThemeColors {
    fn default() -> Self {
        ThemePreset::CyberVirus.palette()
    }
}

impl ThemePreset {
    pub fn palette(self) -> ThemeColors {
        ThemeColors::from_hex(match self {
            Self::CyberVirus => ["#ff00ff", "#000000", "#000080", "#00ffff", "#0000ff", "#c0c0c0"],
            Self::Vaporwave => ["#ff71ce", "#01cdfe", "#fffeb3", "#05ffa1", "#b967ff", "#fffeb3"],
            Self::Matrix => ["#000000", "#00ff00", "#ffffff", "#003300", "#008800", "#004400"],
            Self::HotdogStand => ["#ffff00", "#000000", "#ff0000", "#ff0000", "#ff0000", "#ffffff"],
            Self::Custom => ["#c0c0c0", "#000000", "#000080", "#000080", "#1084d0", "#c0c0c0"],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub channel: String,
    pub layout: LayoutMode,
    pub theme: ThemePreset,
    pub max_messages: usize,
    pub message_timeout_secs: u64,
    pub show_pronouns: bool,
    pub show_avatars: bool,
    pub force_username_color: bool,
    pub custom_colors: ThemeColors,
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub http_bind: String,
    pub lookup_timeout_ms: u64,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            channel: String::new(),
            layout: LayoutMode::Stack,
            theme: ThemePreset::CyberVirus,
            max_messages: 10,
            message_timeout_secs: 30,
            show_pronouns: true,
            show_avatars: true,
            force_username_color: false,
            custom_colors: ThemeColors::default(),
            viewport_width: 1920.0,
            viewport_height: 1080.0,
            http_bind: "127.0.0.1:38472".to_owned(),
            lookup_timeout_ms: 2_500,
        }
    }
}

impl OverlaySettings {
    pub fn load_or_create() -> Result<(Self, PathBuf)> {
        let config_dir = dirs::config_dir()
            .context("unable to locate OS config directory")?
            .join(CONFIG_DIR_NAME);
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("failed creating config dir at {}", config_dir.display()))?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let settings = Self::load_or_default(&config_path)?;
        if !config_path.exists() {
            settings.save(&config_path)?;
        }
        Ok((settings, config_path))
    }

    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        let settings = serde_json::from_str::<Self>(&text)
            .with_context(|| format!("invalid json in {}", path.display()))?;
        Ok(settings.normalized())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let payload = serde_json::to_string_pretty(self).context("failed serializing settings")?;
        fs::write(path, payload).with_context(|| format!("failed writing {}", path.display()))?;
        Ok(())
    }

    /// Clamps limits to their minimum of 1 and trims the channel name.
    pub fn normalized(mut self) -> Self {
        self.max_messages = self.max_messages.max(1);
        self.message_timeout_secs = self.message_timeout_secs.max(1);
        self.channel = normalize_channel(&self.channel);
        self
    }

    /// Active palette: the preset's colors, or the user's own for `Custom`.
    pub fn colors(&self) -> ThemeColors {
        match self.theme {
            ThemePreset::Custom => self.custom_colors.clone(),
            preset => preset.palette(),
        }
    }

    pub fn pipeline(&self) -> PipelineSettings {
        PipelineSettings {
            max_messages: self.max_messages.max(1),
            message_timeout: Duration::from_secs(self.message_timeout_secs.max(1)),
            show_pronouns: self.show_pronouns,
            show_avatars: self.show_avatars,
            viewport: Viewport {
                width: self.viewport_width,
                height: self.viewport_height,
            },
        }
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms.clamp(100, 30_000))
    }
}

pub fn normalize_channel(value: &str) -> String {
    value.trim().trim_start_matches('#').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf, time::SystemTime};

    use super::{normalize_channel, LayoutMode, OverlaySettings, ThemePreset};

    fn temp_settings_path() -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("clock should be valid")
            .as_nanos();
        std::env::temp_dir().join(format!("y2k_overlay_settings_{unique}.json"))
    }

    #[test]
    fn parses_partial_settings_with_defaults() {
        let raw = r##"{ "channel": "#Shroud", "layout": "scatter", "max_messages": 0 }"##;
        let parsed = serde_json::from_str::<OverlaySettings>(raw)
            .expect("settings should parse")
            .normalized();
        assert_eq!(parsed.channel, "shroud");
        assert_eq!(parsed.layout, LayoutMode::Scatter);
        assert_eq!(parsed.max_messages, 1);
        assert_eq!(parsed.message_timeout_secs, 30);
        assert!(parsed.show_pronouns);
        assert!(parsed.show_avatars);
        assert_eq!(parsed.theme, ThemePreset::CyberVirus);
    }

    #[test]
    fn custom_theme_uses_custom_colors() {
        let mut settings = OverlaySettings {
            theme: ThemePreset::Matrix,
            ..OverlaySettings::default()
        };
        assert_eq!(settings.colors().text, "#00ff00");

        settings.theme = ThemePreset::Custom;
        settings.custom_colors.bg = "#123456".to_owned();
        assert_eq!(settings.colors().bg, "#123456");
    }

    #[test]
    fn pipeline_settings_follow_overlay_settings() {
        let settings = OverlaySettings {
            max_messages: 3,
            message_timeout_secs: 0,
            show_pronouns: false,
            ..OverlaySettings::default()
        };
        let pipeline = settings.pipeline();
        assert_eq!(pipeline.max_messages, 3);
        assert_eq!(pipeline.message_timeout.as_secs(), 1);
        assert!(!pipeline.show_pronouns);
        assert!(pipeline.show_avatars);
    }

    #[test]
    fn saves_and_reloads_settings() {
        let path = temp_settings_path();
        let settings = OverlaySettings {
            channel: "retrogamer".to_owned(),
            layout: LayoutMode::ZigZag,
            ..OverlaySettings::default()
        };
        settings.save(&path).expect("settings should save");
        let loaded = OverlaySettings::load_or_default(&path).expect("settings should load");
        fs::remove_file(&path).ok();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let loaded =
            OverlaySettings::load_or_default(&temp_settings_path()).expect("defaults should load");
        assert_eq!(loaded, OverlaySettings::default());
    }

    #[test]
    fn normalizes_channel_names() {
        assert_eq!(normalize_channel(" #TestChan "), "testchan".to_owned());
        assert!(LayoutMode::Scatter.uses_absolute_positions());
        assert!(!LayoutMode::ZigZag.uses_absolute_positions());
    }
}
