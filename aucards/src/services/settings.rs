//! Settings service
//!
//! Manages user preferences persisted as a flat JSON object. Every key is
//! independent and stays `None` until it is first written. Each write
//! rewrites the file atomically and publishes a new snapshot to
//! subscribers.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{watch, Mutex};

/// Color theme preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    /// Follow the system preference
    System,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }
}

impl FromStr for Theme {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "system" => Ok(Theme::System),
            _ => Err(invalid(SettingKey::Theme, s)),
        }
    }
}

/// UI language preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "en")]
    English,
    #[serde(rename = "ko")]
    Korean,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::System => "system",
            Language::English => "en",
            Language::Korean => "ko",
        }
    }
}

impl FromStr for Language {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Language::System),
            "en" | "english" => Ok(Language::English),
            "ko" | "korean" => Ok(Language::Korean),
            _ => Err(invalid(SettingKey::Language, s)),
        }
    }
}

/// Keys of the preference file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    Theme,
    Language,
    Landscape,
    MaxBrightness,
    PlaySound,
    RingtoneUri,
    MaterialYou,
}

impl SettingKey {
    pub const ALL: [SettingKey; 7] = [
        SettingKey::Theme,
        SettingKey::Language,
        SettingKey::Landscape,
        SettingKey::MaxBrightness,
        SettingKey::PlaySound,
        SettingKey::RingtoneUri,
        SettingKey::MaterialYou,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::Theme => "theme",
            SettingKey::Language => "language",
            SettingKey::Landscape => "landscape",
            SettingKey::MaxBrightness => "max_brightness",
            SettingKey::PlaySound => "play_sound",
            SettingKey::RingtoneUri => "ringtone_uri",
            SettingKey::MaterialYou => "material_you",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s.trim())
            .ok_or_else(|| AppError::InvalidSetting {
                key: s.to_string(),
                value: String::new(),
            })
    }
}

fn invalid(key: SettingKey, value: &str) -> AppError {
    AppError::InvalidSetting {
        key: key.as_str().to_string(),
        value: value.to_string(),
    }
}

fn parse_bool(key: SettingKey, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

/// Snapshot of all preferences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    /// Lock card display to landscape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landscape: Option<bool>,
    /// Raise screen brightness while a card is shown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_brightness: Option<bool>,
    /// Play the ringtone when a card opens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_sound: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ringtone_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_you: Option<bool>,
}

impl AppSettings {
    /// Display value of a key, `None` when never written
    pub fn get(&self, key: SettingKey) -> Option<String> {
        match key {
            SettingKey::Theme => self.theme.map(|t| t.as_str().to_string()),
            SettingKey::Language => self.language.map(|l| l.code().to_string()),
            SettingKey::Landscape => self.landscape.map(|b| b.to_string()),
            SettingKey::MaxBrightness => self.max_brightness.map(|b| b.to_string()),
            SettingKey::PlaySound => self.play_sound.map(|b| b.to_string()),
            SettingKey::RingtoneUri => self.ringtone_uri.clone(),
            SettingKey::MaterialYou => self.material_you.map(|b| b.to_string()),
        }
    }
}

/// Service for managing user preferences
#[derive(Clone)]
pub struct SettingsService {
    settings_path: PathBuf,
    current: Arc<watch::Sender<AppSettings>>,
    write_lock: Arc<Mutex<()>>,
}

impl SettingsService {
    /// Load the preference file in `app_data_dir`, starting empty when it
    /// does not exist yet
    pub async fn open(app_data_dir: &Path) -> Result<Self> {
        let settings_path = app_data_dir.join(crate::config::SETTINGS_FILE_NAME);
        let settings = load_from(&settings_path).await?;

        let (tx, _) = watch::channel(settings);

        Ok(Self {
            settings_path,
            current: Arc::new(tx),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Current preferences
    pub fn snapshot(&self) -> AppSettings {
        self.current.borrow().clone()
    }

    /// Receive every new snapshot after a write
    pub fn subscribe(&self) -> watch::Receiver<AppSettings> {
        self.current.subscribe()
    }

    pub fn theme(&self) -> Option<Theme> {
        self.current.borrow().theme
    }

    pub fn language(&self) -> Option<Language> {
        self.current.borrow().language
    }

    pub fn landscape(&self) -> Option<bool> {
        self.current.borrow().landscape
    }

    pub fn max_brightness(&self) -> Option<bool> {
        self.current.borrow().max_brightness
    }

    pub fn play_sound(&self) -> Option<bool> {
        self.current.borrow().play_sound
    }

    pub fn ringtone_uri(&self) -> Option<String> {
        self.current.borrow().ringtone_uri.clone()
    }

    pub fn material_you(&self) -> Option<bool> {
        self.current.borrow().material_you
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<()> {
        self.write(|s| AppSettings {
            theme: Some(theme),
            ..s.clone()
        })
        .await
    }

    pub async fn set_language(&self, language: Language) -> Result<()> {
        self.write(|s| AppSettings {
            language: Some(language),
            ..s.clone()
        })
        .await
    }

    pub async fn set_landscape(&self, enabled: bool) -> Result<()> {
        self.write(|s| AppSettings {
            landscape: Some(enabled),
            ..s.clone()
        })
        .await
    }

    pub async fn set_max_brightness(&self, enabled: bool) -> Result<()> {
        self.write(|s| AppSettings {
            max_brightness: Some(enabled),
            ..s.clone()
        })
        .await
    }

    pub async fn set_play_sound(&self, enabled: bool) -> Result<()> {
        self.write(|s| AppSettings {
            play_sound: Some(enabled),
            ..s.clone()
        })
        .await
    }

    pub async fn set_ringtone_uri(&self, uri: impl Into<String>) -> Result<()> {
        let uri = uri.into();
        self.write(|s| AppSettings {
            ringtone_uri: Some(uri),
            ..s.clone()
        })
        .await
    }

    pub async fn set_material_you(&self, enabled: bool) -> Result<()> {
        self.write(|s| AppSettings {
            material_you: Some(enabled),
            ..s.clone()
        })
        .await
    }

    /// Write a key from its string form.
    ///
    /// Unknown keys and values that do not parse for the key's type are
    /// rejected with `AppError::InvalidSetting`; nothing is written.
    pub async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        let key: SettingKey = key.parse()?;

        match key {
            SettingKey::Theme => self.set_theme(value.parse()?).await,
            SettingKey::Language => self.set_language(value.parse()?).await,
            SettingKey::Landscape => self.set_landscape(parse_bool(key, value)?).await,
            SettingKey::MaxBrightness => self.set_max_brightness(parse_bool(key, value)?).await,
            SettingKey::PlaySound => self.set_play_sound(parse_bool(key, value)?).await,
            SettingKey::RingtoneUri => self.set_ringtone_uri(value.trim()).await,
            SettingKey::MaterialYou => self.set_material_you(parse_bool(key, value)?).await,
        }
    }

    async fn write(&self, update: impl FnOnce(&AppSettings) -> AppSettings) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let next = update(&self.current.borrow());
        save_to(&self.settings_path, &next).await?;
        self.current.send_replace(next);

        Ok(())
    }
}

async fn load_from(path: &Path) -> Result<AppSettings> {
    if !path.exists() {
        tracing::info!("Settings file not found, starting with empty settings");
        return Ok(AppSettings::default());
    }

    let content = fs::read_to_string(path).await?;
    let settings: AppSettings = serde_json::from_str(&content)
        .map_err(|e| AppError::Generic(format!("Failed to parse settings: {}", e)))?;

    Ok(settings)
}

async fn save_to(path: &Path, settings: &AppSettings) -> Result<()> {
    let content = serde_json::to_string_pretty(settings)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, content).await?;
    fs::rename(&temp_path, path).await?;

    tracing::info!("Settings saved to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_service() -> (SettingsService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let service = SettingsService::open(temp_dir.path()).await.unwrap();
        (service, temp_dir)
    }

    #[tokio::test]
    async fn test_keys_absent_until_written() {
        let (service, _temp) = create_test_service().await;

        assert_eq!(service.snapshot(), AppSettings::default());
        assert_eq!(service.theme(), None);
        assert_eq!(service.play_sound(), None);
        assert_eq!(service.ringtone_uri(), None);
    }

    #[tokio::test]
    async fn test_write_one_key_keeps_others() {
        let (service, _temp) = create_test_service().await;

        service.set_theme(Theme::Dark).await.unwrap();
        service.set_play_sound(true).await.unwrap();

        let settings = service.snapshot();
        assert_eq!(settings.theme, Some(Theme::Dark));
        assert_eq!(settings.play_sound, Some(true));
        assert_eq!(settings.landscape, None);
    }

    #[tokio::test]
    async fn test_settings_persistence() {
        let temp_dir = TempDir::new().unwrap();

        {
            let service = SettingsService::open(temp_dir.path()).await.unwrap();
            service.set_language(Language::Korean).await.unwrap();
            service
                .set_ringtone_uri("content://media/internal/audio/media/12")
                .await
                .unwrap();
            service.set_max_brightness(true).await.unwrap();
        }

        {
            let service = SettingsService::open(temp_dir.path()).await.unwrap();
            assert_eq!(service.language(), Some(Language::Korean));
            assert_eq!(
                service.ringtone_uri().as_deref(),
                Some("content://media/internal/audio/media/12")
            );
            assert_eq!(service.max_brightness(), Some(true));
            assert_eq!(service.material_you(), None);
        }
    }

    #[tokio::test]
    async fn test_subscribers_see_writes() {
        let (service, _temp) = create_test_service().await;
        let mut rx = service.subscribe();

        service.set_landscape(true).await.unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().landscape, Some(true));
    }

    #[tokio::test]
    async fn test_set_value_parses_by_key() {
        let (service, _temp) = create_test_service().await;

        service.set_value("theme", "Light").await.unwrap();
        service.set_value("language", "en").await.unwrap();
        service.set_value("material_you", "off").await.unwrap();

        assert_eq!(service.theme(), Some(Theme::Light));
        assert_eq!(service.language(), Some(Language::English));
        assert_eq!(service.material_you(), Some(false));
    }

    #[tokio::test]
    async fn test_set_value_rejects_unknown_enum_value() {
        let (service, _temp) = create_test_service().await;

        let result = service.set_value("theme", "sepia").await;
        match result {
            Err(AppError::InvalidSetting { key, value }) => {
                assert_eq!(key, "theme");
                assert_eq!(value, "sepia");
            }
            other => panic!("expected InvalidSetting, got {:?}", other),
        }

        assert!(service.set_value("volume", "11").await.is_err());
        assert!(service.set_value("play_sound", "maybe").await.is_err());
        assert_eq!(service.snapshot(), AppSettings::default());
    }

    #[test]
    fn test_display_values() {
        let settings = AppSettings {
            theme: Some(Theme::System),
            language: Some(Language::Korean),
            play_sound: Some(false),
            ..AppSettings::default()
        };

        assert_eq!(settings.get(SettingKey::Theme).as_deref(), Some("system"));
        assert_eq!(settings.get(SettingKey::Language).as_deref(), Some("ko"));
        assert_eq!(settings.get(SettingKey::PlaySound).as_deref(), Some("false"));
        assert_eq!(settings.get(SettingKey::Landscape), None);
    }
}
