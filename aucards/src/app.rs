//! Application context and initialization
//!
//! All services are constructed here and handed to whoever drives the
//! application. There is no global instance; the entry point owns the
//! context and clones it where needed.

use crate::config::{DATABASE_FILE_NAME, IMAGES_DIR_NAME, TEMP_DIR_NAME};
use crate::database::{create_pool, Repository};
use crate::error::Result;
use crate::services::{BackupService, SettingsService};
use crate::state::{CardViewModel, ListViewModel};
use crate::storage::ImageStore;
use std::path::{Path, PathBuf};

/// Central application context holding all services
#[derive(Clone)]
pub struct AppContext {
    pub data_dir: PathBuf,
    pub repo: Repository,
    pub images: ImageStore,
    pub settings: SettingsService,
    pub backup: BackupService,
}

impl AppContext {
    /// Open (or create) the application data in `data_dir`
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();

        tracing::info!("Initializing application in {:?}", data_dir);

        // Create necessary directories
        tokio::fs::create_dir_all(&data_dir).await?;
        tokio::fs::create_dir_all(data_dir.join(TEMP_DIR_NAME)).await?;

        let pool = create_pool(&data_dir.join(DATABASE_FILE_NAME)).await?;
        let repo = Repository::new(pool);

        let images = ImageStore::new(data_dir.join(IMAGES_DIR_NAME));
        images.initialize().await?;

        let settings = SettingsService::open(&data_dir).await?;
        let backup = BackupService::new(repo.clone(), data_dir.clone());

        tracing::info!("Application initialized successfully");

        Ok(Self {
            data_dir,
            repo,
            images,
            settings,
            backup,
        })
    }

    /// State container for the card list screen
    pub fn list_view_model(&self) -> ListViewModel {
        ListViewModel::new(self.repo.clone(), self.images.clone())
    }

    /// State container for one card; `id` 0 starts a new card
    pub async fn card_view_model(&self, id: i64) -> Result<CardViewModel> {
        CardViewModel::load(self.repo.clone(), self.images.clone(), &self.settings, id).await
    }

    /// Close the database pool
    pub async fn close(&self) {
        self.repo.pool().close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_layout() {
        let temp = TempDir::new().unwrap();
        let data_dir = temp.path().join("data");

        let ctx = AppContext::open(&data_dir).await.unwrap();

        assert!(data_dir.join(DATABASE_FILE_NAME).exists());
        assert!(data_dir.join(IMAGES_DIR_NAME).is_dir());
        assert!(data_dir.join(TEMP_DIR_NAME).is_dir());
        assert!(ctx.repo.list_cards().await.unwrap().is_empty());

        ctx.close().await;
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let temp = TempDir::new().unwrap();

        let ctx = AppContext::open(temp.path()).await.unwrap();
        let vm = ctx.card_view_model(0).await.unwrap();
        vm.update_text("Persistent");
        let saved = vm.save_card().await.unwrap();
        ctx.close().await;

        let reopened = AppContext::open(temp.path()).await.unwrap();
        let card = reopened.repo.get_card(saved.id).await.unwrap();
        assert_eq!(card.text, "Persistent");
        reopened.close().await;
    }
}
