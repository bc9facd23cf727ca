//! Single card state
//!
//! `CardViewModel` holds the card being viewed or edited. Edits only
//! change the in-memory copy; nothing reaches the store until
//! `save_card` is called.

use super::delete_card_and_image;
use crate::color::{normalize_hex, Color};
use crate::config::{MAX_FONT_SIZE, MIN_FONT_SIZE};
use crate::database::{Card, CardImage, CardLayout, Repository};
use crate::error::Result;
use crate::services::SettingsService;
use crate::storage::ImageStore;
use std::path::Path;
use tokio::sync::watch;

/// Immutable snapshot of the card screen
#[derive(Debug, Clone, PartialEq)]
pub struct CardState {
    pub card: Card,
    /// Hex color text as typed by the user
    pub hex_code: String,
    pub is_hex_valid: bool,
    pub landscape: bool,
    pub max_brightness: bool,
    pub play_sound: bool,
    pub ringtone_uri: Option<String>,
}

impl CardState {
    /// Whether the card may be saved
    pub fn is_valid(&self) -> bool {
        self.card.is_valid()
    }
}

/// State container for one card
pub struct CardViewModel {
    repo: Repository,
    images: ImageStore,
    state: watch::Sender<CardState>,
}

impl CardViewModel {
    /// Load card `id`, or start a blank card when `id` is 0
    pub async fn load(
        repo: Repository,
        images: ImageStore,
        settings: &SettingsService,
        id: i64,
    ) -> Result<Self> {
        let card = if id == 0 {
            Card::default()
        } else {
            repo.get_card(id).await?
        };

        let snapshot = settings.snapshot();
        let state = CardState {
            hex_code: card.color.to_hex(),
            is_hex_valid: true,
            card,
            landscape: snapshot.landscape.unwrap_or(false),
            max_brightness: snapshot.max_brightness.unwrap_or(false),
            play_sound: snapshot.play_sound.unwrap_or(false),
            ringtone_uri: snapshot.ringtone_uri,
        };

        tracing::debug!("Loaded card view model for card {}", id);

        let (tx, _) = watch::channel(state);
        Ok(Self {
            repo,
            images,
            state: tx,
        })
    }

    /// Current state snapshot
    pub fn state(&self) -> CardState {
        self.state.borrow().clone()
    }

    /// Receive every state change
    pub fn subscribe(&self) -> watch::Receiver<CardState> {
        self.state.subscribe()
    }

    pub fn is_valid(&self) -> bool {
        self.state.borrow().is_valid()
    }

    pub fn update_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.update_card(|c| Card { text, ..c.clone() });
    }

    pub fn update_description(&self, description: impl Into<String>) {
        let description = description.into();
        self.update_card(|c| Card {
            description,
            ..c.clone()
        });
    }

    /// Set the color directly, e.g. from a palette; the hex field follows
    pub fn update_color(&self, color: Color) {
        self.update(|s| CardState {
            card: Card {
                color,
                ..s.card.clone()
            },
            hex_code: color.to_hex(),
            is_hex_valid: true,
            ..s.clone()
        });
    }

    /// Apply hex text typed by the user.
    ///
    /// Input that does not parse only clears `is_hex_valid`; the typed
    /// text is kept and the card color stays as it was.
    pub fn update_hex_code(&self, input: &str) {
        let hex_code = normalize_hex(input);

        match Color::parse_hex(&hex_code) {
            Some(color) => self.update(|s| CardState {
                card: Card {
                    color,
                    ..s.card.clone()
                },
                hex_code,
                is_hex_valid: true,
                ..s.clone()
            }),
            None => self.update(|s| CardState {
                hex_code,
                is_hex_valid: false,
                ..s.clone()
            }),
        }
    }

    pub fn update_layout(&self, layout: CardLayout) {
        self.update_card(|c| Card { layout, ..c.clone() });
    }

    /// Font sizes are clamped to the supported range
    pub fn update_font_sizes(&self, title: i32, description: i32) {
        self.update_card(|c| Card {
            title_font_size: title.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE),
            description_font_size: description.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE),
            ..c.clone()
        });
    }

    /// Set or clear the image reference. A new image starts untransformed.
    pub fn update_image(&self, path: Option<String>) {
        self.update_card(|c| Card {
            image: path.map(CardImage::new),
            ..c.clone()
        });
    }

    /// Adjust scale, rotation and offset of the current image
    pub fn update_image_transform(&self, scale: f32, rotation: f32, offset_x: f32, offset_y: f32) {
        self.update_card(|c| Card {
            image: c.image.as_ref().map(|image| CardImage {
                scale,
                rotation: rotation.rem_euclid(360.0),
                offset_x,
                offset_y,
                ..image.clone()
            }),
            ..c.clone()
        });
    }

    pub fn update_text_background_opacity(&self, opacity: f32) {
        self.update_card(|c| Card {
            text_background_opacity: opacity.clamp(0.0, 1.0),
            ..c.clone()
        });
    }

    pub fn update_categories(&self, category_ids: Vec<i64>) {
        self.update_card(|c| Card {
            category_ids,
            ..c.clone()
        });
    }

    pub fn toggle_favourite(&self) {
        self.update_card(|c| Card {
            is_favourite: !c.is_favourite,
            ..c.clone()
        });
    }

    /// Copy image bytes into the local image store and use them
    pub async fn import_image(&self, data: &[u8], extension: &str) -> Result<()> {
        let path = self.images.store(data, extension).await?;
        self.update_image(Some(path.to_string_lossy().into_owned()));
        Ok(())
    }

    /// Copy an image file from disk into the local image store and use it
    pub async fn import_image_file(&self, source: &Path) -> Result<()> {
        let path = self.images.import_file(source).await?;
        self.update_image(Some(path.to_string_lossy().into_owned()));
        Ok(())
    }

    /// Persist the card.
    ///
    /// Saving does not check validity; callers gate on `is_valid` first.
    /// A new card adopts the id assigned by the store so later saves
    /// replace the same row.
    pub async fn save_card(&self) -> Result<Card> {
        let card = self.state.borrow().card.clone();
        let id = self.repo.save_card(&card).await?;

        let saved = if card.is_new() {
            self.repo.get_card(id).await?
        } else {
            card
        };

        let stored = saved.clone();
        self.update(|s| CardState {
            card: Card {
                id: stored.id,
                sort_index: stored.sort_index,
                ..s.card.clone()
            },
            ..s.clone()
        });

        tracing::info!("Saved card {}", id);
        Ok(saved)
    }

    /// Delete the card and its local image. Unsaved cards are left alone.
    ///
    /// Afterwards the container holds an unsaved copy of the card, so a
    /// later `save_card` creates a new row instead of restoring the old one.
    pub async fn delete_card(&self) -> Result<()> {
        let card = self.state.borrow().card.clone();
        if card.is_new() {
            return Ok(());
        }

        let image_removed = delete_card_and_image(&self.repo, &self.images, &card).await?;

        self.update(|s| CardState {
            card: Card {
                id: 0,
                sort_index: 0,
                image: if image_removed { None } else { s.card.image.clone() },
                ..s.card.clone()
            },
            ..s.clone()
        });

        tracing::info!("Deleted card {}", card.id);
        Ok(())
    }

    fn update_card(&self, f: impl FnOnce(&Card) -> Card) {
        self.update(|s| CardState {
            card: f(&s.card),
            ..s.clone()
        });
    }

    fn update(&self, f: impl FnOnce(&CardState) -> CardState) {
        self.state.send_modify(|current| {
            let next = f(current);
            *current = next;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::initialize_database;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    struct Fixture {
        repo: Repository,
        images: ImageStore,
        settings: SettingsService,
        temp: TempDir,
    }

    impl Fixture {
        async fn new() -> Self {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
                .unwrap();
            initialize_database(&pool).await.unwrap();

            let temp = TempDir::new().unwrap();
            let images = ImageStore::new(temp.path().join("images"));
            images.initialize().await.unwrap();
            let settings = SettingsService::open(temp.path()).await.unwrap();

            Self {
                repo: Repository::new(pool),
                images,
                settings,
                temp,
            }
        }

        async fn view_model(&self, id: i64) -> CardViewModel {
            CardViewModel::load(self.repo.clone(), self.images.clone(), &self.settings, id)
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_new_card_starts_blank_and_invalid() {
        let fixture = Fixture::new().await;
        let vm = fixture.view_model(0).await;

        let state = vm.state();
        assert_eq!(state.card, Card::default());
        assert_eq!(state.hex_code, "#FFFFFF");
        assert!(state.is_hex_valid);
        assert!(!state.is_valid());
    }

    #[tokio::test]
    async fn test_validity_follows_text() {
        let fixture = Fixture::new().await;
        let vm = fixture.view_model(0).await;

        vm.update_text("hello");
        assert!(vm.is_valid());

        vm.update_text("   ");
        assert!(!vm.is_valid());
    }

    #[tokio::test]
    async fn test_edits_are_not_persisted_until_save() {
        let fixture = Fixture::new().await;
        let vm = fixture.view_model(0).await;

        vm.update_text("Yes");
        vm.update_description("I agree");
        assert!(fixture.repo.list_cards().await.unwrap().is_empty());

        let saved = vm.save_card().await.unwrap();
        assert!(saved.id > 0);
        assert_eq!(vm.state().card.id, saved.id);

        // A second save replaces the same row
        vm.update_text("Yes!");
        vm.save_card().await.unwrap();

        let cards = fixture.repo.list_cards().await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].text, "Yes!");
        assert_eq!(cards[0].description, "I agree");
    }

    #[tokio::test]
    async fn test_loads_existing_card_and_settings() {
        let fixture = Fixture::new().await;
        let id = fixture
            .repo
            .save_card(&Card {
                color: Color::RED,
                ..Card::with_text("No")
            })
            .await
            .unwrap();
        fixture.settings.set_play_sound(true).await.unwrap();
        fixture.settings.set_ringtone_uri("content://ring/1").await.unwrap();

        let vm = fixture.view_model(id).await;
        let state = vm.state();

        assert_eq!(state.card.text, "No");
        assert_eq!(state.hex_code, "#FF0000");
        assert!(state.play_sound);
        assert!(!state.landscape);
        assert_eq!(state.ringtone_uri.as_deref(), Some("content://ring/1"));
    }

    #[tokio::test]
    async fn test_load_missing_card_fails() {
        let fixture = Fixture::new().await;

        let result =
            CardViewModel::load(fixture.repo.clone(), fixture.images.clone(), &fixture.settings, 5)
                .await;
        assert!(matches!(result, Err(crate::error::AppError::CardNotFound(5))));
    }

    #[tokio::test]
    async fn test_hex_without_hash_is_normalized() {
        let fixture = Fixture::new().await;
        let vm = fixture.view_model(0).await;

        vm.update_hex_code("FF0000");

        let state = vm.state();
        assert_eq!(state.hex_code, "#FF0000");
        assert!(state.is_hex_valid);
        assert_eq!(state.card.color, Color::RED);
    }

    #[tokio::test]
    async fn test_invalid_hex_keeps_text_and_color() {
        let fixture = Fixture::new().await;
        let vm = fixture.view_model(0).await;

        vm.update_hex_code("#");
        let state = vm.state();
        assert_eq!(state.hex_code, "#");
        assert!(!state.is_hex_valid);
        assert_eq!(state.card.color, Color::WHITE);

        vm.update_hex_code("#12");
        assert_eq!(vm.state().hex_code, "#12");
        assert!(!vm.state().is_hex_valid);

        vm.update_hex_code("#1234566#");
        assert_eq!(vm.state().hex_code, "#1234566");
        assert!(!vm.state().is_hex_valid);

        vm.update_hex_code("#123456");
        assert!(vm.state().is_hex_valid);
        assert_eq!(vm.state().card.color, Color(0xFF12_3456));
    }

    #[tokio::test]
    async fn test_update_color_syncs_hex_field() {
        let fixture = Fixture::new().await;
        let vm = fixture.view_model(0).await;

        vm.update_hex_code("zz");
        vm.update_color(Color::BLACK);

        let state = vm.state();
        assert_eq!(state.hex_code, "#000000");
        assert!(state.is_hex_valid);
    }

    #[tokio::test]
    async fn test_font_sizes_and_opacity_are_clamped() {
        let fixture = Fixture::new().await;
        let vm = fixture.view_model(0).await;

        vm.update_font_sizes(1000, 2);
        vm.update_text_background_opacity(1.7);

        let card = vm.state().card;
        assert_eq!(card.title_font_size, MAX_FONT_SIZE);
        assert_eq!(card.description_font_size, MIN_FONT_SIZE);
        assert_eq!(card.text_background_opacity, 1.0);
    }

    #[tokio::test]
    async fn test_image_and_transform() {
        let fixture = Fixture::new().await;
        let vm = fixture.view_model(0).await;

        // No image yet: transform is a no-op
        vm.update_image_transform(2.0, 45.0, 0.0, 0.0);
        assert!(vm.state().card.image.is_none());

        vm.import_image(b"png bytes", "png").await.unwrap();
        vm.update_image_transform(2.0, -90.0, 5.0, 6.0);

        let image = vm.state().card.image.unwrap();
        assert!(fixture.images.contains(&image.path));
        assert_eq!(image.scale, 2.0);
        assert_eq!(image.rotation, 270.0);
        assert_eq!((image.offset_x, image.offset_y), (5.0, 6.0));

        vm.update_image(None);
        assert!(vm.state().card.image.is_none());
    }

    #[tokio::test]
    async fn test_import_image_file_copies_into_store() {
        let fixture = Fixture::new().await;
        let vm = fixture.view_model(0).await;

        let source = fixture.temp.path().join("Holiday.JPG");
        std::fs::write(&source, b"jpeg bytes").unwrap();

        vm.import_image_file(&source).await.unwrap();

        let image = vm.state().card.image.unwrap();
        assert!(fixture.images.contains(&image.path));
        assert!(image.path.ends_with(".jpg"));
        assert_eq!(std::fs::read(&image.path).unwrap(), b"jpeg bytes");
        // The original stays where it was
        assert!(source.exists());

        let missing = fixture.temp.path().join("missing.png");
        assert!(vm.import_image_file(&missing).await.is_err());
    }

    #[tokio::test]
    async fn test_save_after_delete_creates_new_card() {
        let fixture = Fixture::new().await;
        let vm = fixture.view_model(0).await;

        vm.update_text("Again");
        let first = vm.save_card().await.unwrap();

        vm.delete_card().await.unwrap();
        assert_eq!(vm.state().card.id, 0);
        assert_eq!(vm.state().card.text, "Again");
        assert!(fixture.repo.list_cards().await.unwrap().is_empty());

        // Deleting the now unsaved copy does nothing
        vm.delete_card().await.unwrap();

        let second = vm.save_card().await.unwrap();
        assert_ne!(second.id, first.id);
        assert!(matches!(
            fixture.repo.get_card(first.id).await,
            Err(crate::error::AppError::CardNotFound(_))
        ));
        assert_eq!(fixture.repo.list_cards().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_card_keeps_image_used_elsewhere() {
        let fixture = Fixture::new().await;

        let other = fixture.view_model(0).await;
        other.update_text("Other");
        other.import_image(b"shared", "png").await.unwrap();
        other.save_card().await.unwrap();

        let vm = fixture.view_model(0).await;
        vm.update_text("Mine");
        vm.import_image(b"shared", "png").await.unwrap();
        vm.save_card().await.unwrap();

        let path = vm.state().card.image.unwrap().path;
        vm.delete_card().await.unwrap();

        assert!(std::path::Path::new(&path).exists());
        assert_eq!(vm.state().card.image.map(|i| i.path), Some(path));
    }

    #[tokio::test]
    async fn test_delete_card_removes_row_and_image() {
        let fixture = Fixture::new().await;
        let vm = fixture.view_model(0).await;

        vm.update_text("Bye");
        vm.import_image(b"photo", "jpg").await.unwrap();
        let saved = vm.save_card().await.unwrap();
        let image_path = saved.image.unwrap().path;

        vm.delete_card().await.unwrap();

        assert!(fixture.repo.get_card(saved.id).await.is_err());
        assert!(!std::path::Path::new(&image_path).exists());
    }
}
