//! Application configuration constants
//!
//! Central location for file names, card defaults, resource limits,
//! and validation boundaries used throughout the application.

use std::time::Duration;

// ===== Data Directory Layout =====

/// SQLite database file inside the data directory
pub const DATABASE_FILE_NAME: &str = "aucards.db";

/// Preferences file inside the data directory
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Directory holding locally copied card images
pub const IMAGES_DIR_NAME: &str = "images";

/// Scratch directory for export/import temp files
pub const TEMP_DIR_NAME: &str = "tmp";

/// Environment variable overriding the data directory for the CLI
pub const DATA_DIR_ENV: &str = "AUCARDS_DATA_DIR";

// ===== Import / Export Boundary =====

/// Table name expected in imported database files
pub const IMPORT_TABLE_NAME: &str = "aucard";

/// Entry name of the database snapshot inside an export archive
pub const EXPORT_ARCHIVE_ENTRY: &str = "aucard.db";

/// Columns an imported file must carry before any row is copied
pub const IMPORT_REQUIRED_COLUMNS: &[&str] = &["text", "color", "description", "isFavourite"];

// ===== Card Defaults =====

/// Default title font size in sp
pub const DEFAULT_TITLE_FONT_SIZE: i32 = 57;

/// Default description font size in sp
pub const DEFAULT_DESCRIPTION_FONT_SIZE: i32 = 24;

/// Smallest font size accepted by the card editor
pub const MIN_FONT_SIZE: i32 = 8;

/// Largest font size accepted by the card editor
pub const MAX_FONT_SIZE: i32 = 200;

/// Default opacity of the box drawn behind card text
pub const DEFAULT_TEXT_BACKGROUND_OPACITY: f32 = 0.5;

/// Default packed ARGB background color (opaque white)
pub const DEFAULT_CARD_COLOR: u32 = 0xFFFF_FFFF;

// ===== Live Queries =====

/// How long a shared live query keeps running after its last subscriber
/// goes away, so quick navigation does not restart it.
pub const LIVE_QUERY_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// How long the CLI waits for the first card list load
pub const LIST_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

// ===== Database =====

/// SQLite busy timeout for pooled connections
pub const DATABASE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum pooled connections for the application pool
pub const DATABASE_MAX_CONNECTIONS: u32 = 5;
