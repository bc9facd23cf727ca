//! Backup service
//!
//! Exports the card database as a zip archive holding a compacted
//! snapshot, and imports cards from such an archive or from a bare
//! database file with an `aucard` table.
//!
//! Imports are checked before anything is written and run in a single
//! transaction, so a foreign or damaged file never leaves half its rows
//! behind.

use crate::color::Color;
use crate::config::{
    EXPORT_ARCHIVE_ENTRY, IMPORT_REQUIRED_COLUMNS, IMPORT_TABLE_NAME, TEMP_DIR_NAME,
};
use crate::database::{self, repository::upsert_card, Card, Repository};
use crate::error::{AppError, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Result of a successful export
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub size: u64,
    pub card_count: usize,
}

/// Result of a successful import
#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub imported: usize,
    /// Ids assigned to the imported cards, in source order
    pub card_ids: Vec<i64>,
}

/// Import/export service
#[derive(Clone)]
pub struct BackupService {
    repo: Repository,
    temp_dir: PathBuf,
}

impl BackupService {
    pub fn new(repo: Repository, app_data_dir: PathBuf) -> Self {
        Self {
            repo,
            temp_dir: app_data_dir.join(TEMP_DIR_NAME),
        }
    }

    /// Snapshot the live database into a zip archive at `dest`
    pub async fn export_to(&self, dest: &Path) -> Result<ExportSummary> {
        tracing::info!("Exporting cards to {:?}", dest);

        fs::create_dir_all(&self.temp_dir).await?;
        let snapshot = self.temp_path("export", "db");

        let result = self.write_export(&snapshot, dest).await;

        if let Err(e) = fs::remove_file(&snapshot).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove export snapshot {:?}: {}", snapshot, e);
            }
        }

        match &result {
            Ok(summary) => tracing::info!(
                "Exported {} cards to {:?} ({} bytes)",
                summary.card_count,
                summary.path,
                summary.size
            ),
            Err(e) => tracing::error!("Export to {:?} failed: {}", dest, e),
        }

        result
    }

    async fn write_export(&self, snapshot: &Path, dest: &Path) -> Result<ExportSummary> {
        let snapshot_str = snapshot
            .to_str()
            .ok_or_else(|| AppError::Export(format!("Non UTF-8 temp path: {:?}", snapshot)))?;

        // VACUUM INTO produces a compact, consistent copy even while WAL is active
        sqlx::query("VACUUM INTO ?")
            .bind(snapshot_str)
            .execute(self.repo.pool())
            .await?;

        let card_count = self.repo.list_cards().await?.len();
        let data = fs::read(snapshot).await?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let dest_owned = dest.to_path_buf();
        tokio::task::spawn_blocking(move || write_archive(&dest_owned, &data))
            .await
            .map_err(|e| AppError::Export(format!("Export task failed: {}", e)))??;

        let size = fs::metadata(dest).await?.len();

        Ok(ExportSummary {
            path: dest.to_path_buf(),
            size,
            card_count,
        })
    }

    /// Append every card from `src` to the live store.
    ///
    /// `src` may be an export archive or a bare database file. Imported cards
    /// get fresh ids and ordering indices continuing after the current last
    /// card. Images are not carried over.
    pub async fn import_from(&self, src: &Path) -> Result<ImportSummary> {
        tracing::info!("Importing cards from {:?}", src);

        fs::create_dir_all(&self.temp_dir).await?;
        let copy = self.temp_path("import", "db");

        let result = self.run_import(src, &copy).await;

        for path in [copy.clone(), sidecar(&copy, "-wal"), sidecar(&copy, "-shm")] {
            if let Err(e) = fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove import temp file {:?}: {}", path, e);
                }
            }
        }

        match &result {
            Ok(summary) => tracing::info!("Imported {} cards from {:?}", summary.imported, src),
            Err(e) => tracing::error!("Import from {:?} failed: {}", src, e),
        }

        result
    }

    async fn run_import(&self, src: &Path, copy: &Path) -> Result<ImportSummary> {
        let src_owned = src.to_path_buf();
        let copy_owned = copy.to_path_buf();
        tokio::task::spawn_blocking(move || extract_database(&src_owned, &copy_owned))
            .await
            .map_err(|e| AppError::Import(format!("Import task failed: {}", e)))??;

        let source = database::open_read_only(copy).await?;
        let cards = read_source_cards(&source).await;
        source.close().await;
        let cards = cards?;

        // New cards are appended after the current last ordering index
        let mut tx = self.repo.pool().begin().await?;
        let mut card_ids = Vec::with_capacity(cards.len());
        for card in &cards {
            card_ids.push(upsert_card(&mut tx, card).await?);
        }
        tx.commit().await?;
        self.repo.notify_changed();

        Ok(ImportSummary {
            imported: card_ids.len(),
            card_ids,
        })
    }

    fn temp_path(&self, prefix: &str, extension: &str) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%f");
        self.temp_dir
            .join(format!("{}_{}.{}", prefix, stamp, extension))
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn write_archive(dest: &Path, data: &[u8]) -> Result<()> {
    let file = std::fs::File::create(dest)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file(EXPORT_ARCHIVE_ENTRY, options)?;
    zip.write_all(data)?;
    zip.finish()?;

    Ok(())
}

/// Copy the database in `src` to `dest`, unpacking it first when `src` is
/// a zip archive
fn extract_database(src: &Path, dest: &Path) -> Result<()> {
    let mut file = std::fs::File::open(src)?;
    let mut magic = [0u8; 4];
    let is_zip = file.read(&mut magic)? == magic.len() && &magic == ZIP_MAGIC;
    drop(file);

    if !is_zip {
        std::fs::copy(src, dest)?;
        return Ok(());
    }

    let mut archive = zip::ZipArchive::new(std::fs::File::open(src)?)?;

    let entry_name = archive
        .file_names()
        .find(|name| *name == EXPORT_ARCHIVE_ENTRY)
        .or_else(|| archive.file_names().find(|name| name.ends_with(".db")))
        .map(str::to_string)
        .ok_or_else(|| AppError::Import("Archive contains no database".to_string()))?;

    let mut entry = archive.by_name(&entry_name)?;
    let mut out = std::fs::File::create(dest)?;
    std::io::copy(&mut entry, &mut out)?;

    Ok(())
}

/// Read every card from a foreign database, checking its shape first
async fn read_source_cards(source: &SqlitePool) -> Result<Vec<Card>> {
    let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
        .bind(IMPORT_TABLE_NAME)
        .fetch_all(source)
        .await
        .map_err(|e| AppError::Import(format!("Not a database file: {}", e)))?;

    if columns.is_empty() {
        return Err(AppError::Import(format!(
            "Missing table {:?}",
            IMPORT_TABLE_NAME
        )));
    }

    let missing: Vec<&str> = IMPORT_REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|required| !columns.iter().any(|c| c == required))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Import(format!(
            "Table {:?} is missing columns: {}",
            IMPORT_TABLE_NAME,
            missing.join(", ")
        )));
    }

    let has = |name: &str| columns.iter().any(|c| c == name);
    let order = if has("sortIndex") { "sortIndex, rowid" } else { "rowid" };

    let rows = sqlx::query(&format!("SELECT * FROM {} ORDER BY {}", IMPORT_TABLE_NAME, order))
        .fetch_all(source)
        .await?;

    rows.iter().map(|row| source_row_to_card(row, &has)).collect()
}

fn source_row_to_card(row: &SqliteRow, has: &dyn Fn(&str) -> bool) -> Result<Card> {
    let mut card = Card {
        text: row.try_get::<Option<String>, _>("text")?.unwrap_or_default(),
        description: row
            .try_get::<Option<String>, _>("description")?
            .unwrap_or_default(),
        color: row
            .try_get::<Option<i64>, _>("color")?
            .map(Color::from_packed)
            .unwrap_or_default(),
        is_favourite: row.try_get::<Option<i64>, _>("isFavourite")?.unwrap_or(0) != 0,
        ..Card::default()
    };

    if has("layout") {
        if let Some(layout) = row.try_get::<Option<String>, _>("layout")? {
            card.layout = layout.parse().unwrap_or_default();
        }
    }
    if has("titleFontSize") {
        if let Some(size) = row.try_get::<Option<i32>, _>("titleFontSize")? {
            card.title_font_size = size;
        }
    }
    if has("descriptionFontSize") {
        if let Some(size) = row.try_get::<Option<i32>, _>("descriptionFontSize")? {
            card.description_font_size = size;
        }
    }
    if has("textBackgroundOpacity") {
        if let Some(opacity) = row.try_get::<Option<f64>, _>("textBackgroundOpacity")? {
            card.text_background_opacity = (opacity as f32).clamp(0.0, 1.0);
        }
    }

    Ok(card)
}
