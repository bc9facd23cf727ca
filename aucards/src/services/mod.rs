//! Services module
//!
//! Settings persistence and database backup on top of the repository.

pub mod backup;
pub mod settings;

pub use backup::{BackupService, ExportSummary, ImportSummary};
pub use settings::{AppSettings, Language, SettingKey, SettingsService, Theme};
