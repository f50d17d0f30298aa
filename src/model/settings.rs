use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MIN_FONT_SIZE: u32 = 12;
pub const MAX_FONT_SIZE: u32 = 32;
pub const MIN_SCROLL_SPEED: u8 = 1;
pub const MAX_SCROLL_SPEED: u8 = 10;

pub const FONT_FAMILIES: [&str; 3] = ["sans-serif", "serif", "monospace"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderSettings {
    pub theme_mode: ThemeMode,
    pub font_size: u32,
    pub line_height: f64,
    pub font_family: String,
    pub background_color: String,
    pub text_color: String,
    pub auto_scroll_enabled: bool,
    pub auto_scroll_speed: u8, // 1..=10
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            theme_mode: ThemeMode::Dark,
            font_size: 18,
            line_height: 1.6,
            font_family: "Georgia, serif".to_string(),
            background_color: "#1a1a1a".to_string(),
            text_color: "#e5e5e5".to_string(),
            auto_scroll_enabled: false,
            auto_scroll_speed: 3,
        }
    }
}

impl ReaderSettings {
    /// 与默认值逐字段合并。缺失或类型不对的字段使用默认值，其余字段照常生效。
    pub fn merged(doc: &Value) -> Self {
        let defaults = Self::default();
        let (Ok(Value::Object(mut merged)), Value::Object(stored)) =
            (serde_json::to_value(&defaults), doc)
        else {
            return defaults;
        };

        for (key, value) in stored {
            let Some(previous) = merged.get(key).cloned() else {
                continue;
            };
            merged.insert(key.clone(), value.clone());
            if serde_json::from_value::<Self>(Value::Object(merged.clone())).is_err() {
                tracing::debug!("设置字段 {} 无效，使用默认值", key);
                merged.insert(key.clone(), previous);
            }
        }

        serde_json::from_value::<Self>(Value::Object(merged))
            .map(Self::clamped)
            .unwrap_or(defaults)
    }

    pub fn clamped(mut self) -> Self {
        self.font_size = self.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        self.auto_scroll_speed = self
            .auto_scroll_speed
            .clamp(MIN_SCROLL_SPEED, MAX_SCROLL_SPEED);
        self
    }

    pub fn apply_theme(&mut self, preset: ThemePreset) {
        self.background_color = preset.background().to_string();
        self.text_color = preset.text().to_string();
        self.theme_mode = preset.mode();
    }

    /// 当前配色对应的预设，没有则为 None
    pub fn theme(&self) -> Option<ThemePreset> {
        ThemePreset::ALL
            .into_iter()
            .find(|p| p.background() == self.background_color)
    }

    pub fn set_font_size(&mut self, size: u32) {
        self.font_size = size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
    }

    pub fn set_scroll_speed(&mut self, speed: u8) {
        self.auto_scroll_speed = speed.clamp(MIN_SCROLL_SPEED, MAX_SCROLL_SPEED);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemePreset {
    Light,
    Sepia,
    Dark,
    Midnight,
}

impl ThemePreset {
    pub const ALL: [ThemePreset; 4] = [
        ThemePreset::Light,
        ThemePreset::Sepia,
        ThemePreset::Dark,
        ThemePreset::Midnight,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ThemePreset::Light => "Light",
            ThemePreset::Sepia => "Sepia",
            ThemePreset::Dark => "Dark",
            ThemePreset::Midnight => "Midnight",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn background(self) -> &'static str {
        match self {
            ThemePreset::Light => "#ffffff",
            ThemePreset::Sepia => "#fbf0d9",
            ThemePreset::Dark => "#1a1a1a",
            ThemePreset::Midnight => "#000000",
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            ThemePreset::Light => "#1a202c",
            ThemePreset::Sepia => "#5f4b32",
            ThemePreset::Dark => "#e5e5e5",
            ThemePreset::Midnight => "#94a3b8",
        }
    }

    pub fn mode(self) -> ThemeMode {
        match self {
            ThemePreset::Light | ThemePreset::Sepia => ThemeMode::Light,
            ThemePreset::Dark | ThemePreset::Midnight => ThemeMode::Dark,
        }
    }
}
