//! Repository layer for database operations
//!
//! This module provides CRUD operations for cards and categories plus
//! live queries that re-run after every committed write.

use super::live::{query_fn, ChangeBus, LiveQuery};
use super::models::*;
use crate::config::LIVE_QUERY_GRACE_PERIOD;
use crate::error::{AppError, Result};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::time::Duration;
use tokio::sync::watch;

const SELECT_CARDS: &str = "SELECT * FROM aucard";
const CARD_ORDER: &str = "ORDER BY sortIndex ASC, id ASC";

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    changes: ChangeBus,
    all_cards: LiveQuery<Vec<Card>>,
    favourite_cards: LiveQuery<Vec<Card>>,
    categories: LiveQuery<Vec<Category>>,
    grace: Duration,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_grace_period(pool, LIVE_QUERY_GRACE_PERIOD)
    }

    /// Create a repository whose shared live queries linger for `grace`
    /// after their last subscriber drops
    pub fn with_grace_period(pool: SqlitePool, grace: Duration) -> Self {
        let changes = ChangeBus::new();

        let all_cards = LiveQuery::new(
            "all_cards",
            pool.clone(),
            changes.clone(),
            grace,
            query_fn(|pool| async move { fetch_cards(&pool).await }),
        );
        let favourite_cards = LiveQuery::new(
            "favourite_cards",
            pool.clone(),
            changes.clone(),
            grace,
            query_fn(|pool| async move { fetch_favourite_cards(&pool).await }),
        );
        let categories = LiveQuery::new(
            "categories",
            pool.clone(),
            changes.clone(),
            grace,
            query_fn(|pool| async move { fetch_categories(&pool).await }),
        );

        Self {
            pool,
            changes,
            all_cards,
            favourite_cards,
            categories,
            grace,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Tell live queries that the store changed outside this repository
    pub fn notify_changed(&self) {
        self.changes.notify();
    }

    // ===== Cards =====

    /// Insert or replace a card by id, returning its id.
    ///
    /// A card with id 0 is inserted with a fresh id and appended after the
    /// current last ordering index.
    pub async fn save_card(&self, card: &Card) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let id = upsert_card(&mut tx, card).await?;
        tx.commit().await?;

        self.changes.notify();
        tracing::debug!("Saved card: {}", id);
        Ok(id)
    }

    /// Upsert a batch of cards in one transaction
    pub async fn save_all_cards(&self, cards: &[Card]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for card in cards {
            upsert_card(&mut tx, card).await?;
        }
        tx.commit().await?;

        self.changes.notify();
        tracing::debug!("Saved {} cards", cards.len());
        Ok(())
    }

    /// Get a card by ID
    pub async fn get_card(&self, id: i64) -> Result<Card> {
        fetch_card(&self.pool, id)
            .await?
            .ok_or(AppError::CardNotFound(id))
    }

    /// List all cards in manual order
    pub async fn list_cards(&self) -> Result<Vec<Card>> {
        fetch_cards(&self.pool).await
    }

    /// List favourite cards in manual order
    pub async fn list_favourite_cards(&self) -> Result<Vec<Card>> {
        fetch_favourite_cards(&self.pool).await
    }

    /// List cards whose category list contains `category_id`
    pub async fn list_cards_in_category(&self, category_id: i64) -> Result<Vec<Card>> {
        let cards = self.list_cards().await?;
        Ok(cards
            .into_iter()
            .filter(|card| card.category_ids.contains(&category_id))
            .collect())
    }

    /// Delete a card row. Deleting a missing id is a no-op.
    pub async fn delete_card(&self, id: i64) -> Result<()> {
        let rows = sqlx::query("DELETE FROM aucard WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows > 0 {
            self.changes.notify();
            tracing::debug!("Deleted card: {}", id);
        }
        Ok(())
    }

    /// Whether any card still uses `path` as its image. Image files are
    /// shared between cards holding the same bytes.
    pub async fn is_image_referenced(&self, path: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM aucard WHERE imagePath = ?")
            .bind(path)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Highest ordering index in use, if any card exists
    pub async fn max_sort_index(&self) -> Result<Option<i64>> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(sortIndex) FROM aucard")
            .fetch_one(&self.pool)
            .await?;
        Ok(max)
    }

    /// Live list of all cards, shared between subscribers
    pub fn watch_all_cards(&self) -> watch::Receiver<Option<Vec<Card>>> {
        self.all_cards.subscribe()
    }

    /// Live list of favourite cards, shared between subscribers
    pub fn watch_favourite_cards(&self) -> watch::Receiver<Option<Vec<Card>>> {
        self.favourite_cards.subscribe()
    }

    /// Live single card. Stays `None` while no row with `id` exists.
    pub fn watch_card(&self, id: i64) -> watch::Receiver<Option<Card>> {
        let query = LiveQuery::new(
            format!("card_{}", id),
            self.pool.clone(),
            self.changes.clone(),
            self.grace,
            query_fn(move |pool| async move { fetch_card(&pool, id).await }),
        );

        // Flatten "loaded, no row" into "nothing emitted"
        let mut inner = query.subscribe();
        let (tx, rx) = watch::channel(None);
        tokio::spawn(async move {
            loop {
                let current = inner.borrow_and_update().clone().flatten();
                if current.is_some() || tx.borrow().is_some() {
                    tx.send_replace(current);
                }

                tokio::select! {
                    changed = inner.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
        });

        rx
    }

    // ===== Categories =====

    /// Create a category appended after the existing ones
    pub async fn create_category(&self, name: &str) -> Result<Category> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO category (name, sortIndex)
            VALUES (?, (SELECT COALESCE(MAX(sortIndex), -1) + 1 FROM category))
            RETURNING *
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        self.changes.notify();
        tracing::debug!("Created category: {} ({})", category.id, category.name);
        Ok(category)
    }

    /// Rename a category
    pub async fn rename_category(&self, id: i64, name: &str) -> Result<Category> {
        let category = sqlx::query_as::<_, Category>(
            "UPDATE category SET name = ? WHERE id = ? RETURNING *",
        )
        .bind(name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::CategoryNotFound(id))?;

        self.changes.notify();
        tracing::debug!("Renamed category {} to {}", id, name);
        Ok(category)
    }

    /// Delete a category. Cards keep the id in their membership list.
    pub async fn delete_category(&self, id: i64) -> Result<()> {
        let rows = sqlx::query("DELETE FROM category WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::CategoryNotFound(id));
        }

        self.changes.notify();
        tracing::debug!("Deleted category: {}", id);
        Ok(())
    }

    /// List categories in manual order
    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        fetch_categories(&self.pool).await
    }

    /// Live list of categories, shared between subscribers
    pub fn watch_categories(&self) -> watch::Receiver<Option<Vec<Category>>> {
        self.categories.subscribe()
    }
}

/// Insert-or-replace one card inside `tx`
pub(crate) async fn upsert_card(tx: &mut Transaction<'_, Sqlite>, card: &Card) -> Result<i64> {
    let category_ids = serde_json::to_string(&card.category_ids)?;
    let (image_path, scale, rotation, offset_x, offset_y) = match &card.image {
        Some(image) => (
            Some(image.path.as_str()),
            image.scale,
            image.rotation,
            image.offset_x,
            image.offset_y,
        ),
        None => (None, 1.0, 0.0, 0.0, 0.0),
    };

    let sort_index = if card.is_new() {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(sortIndex) FROM aucard")
            .fetch_one(&mut **tx)
            .await?;
        max.map_or(0, |m| m + 1)
    } else {
        card.sort_index
    };

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO aucard (
            id, text, description, color, layout, titleFontSize, descriptionFontSize,
            imagePath, imageScale, imageRotation, imageOffsetX, imageOffsetY,
            textBackgroundOpacity, isFavourite, sortIndex, categoryIds
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            text = excluded.text,
            description = excluded.description,
            color = excluded.color,
            layout = excluded.layout,
            titleFontSize = excluded.titleFontSize,
            descriptionFontSize = excluded.descriptionFontSize,
            imagePath = excluded.imagePath,
            imageScale = excluded.imageScale,
            imageRotation = excluded.imageRotation,
            imageOffsetX = excluded.imageOffsetX,
            imageOffsetY = excluded.imageOffsetY,
            textBackgroundOpacity = excluded.textBackgroundOpacity,
            isFavourite = excluded.isFavourite,
            sortIndex = excluded.sortIndex,
            categoryIds = excluded.categoryIds
        RETURNING id
        "#,
    )
    .bind(if card.is_new() { None } else { Some(card.id) })
    .bind(&card.text)
    .bind(&card.description)
    .bind(card.color.to_packed())
    .bind(card.layout.as_str())
    .bind(card.title_font_size)
    .bind(card.description_font_size)
    .bind(image_path)
    .bind(f64::from(scale))
    .bind(f64::from(rotation))
    .bind(f64::from(offset_x))
    .bind(f64::from(offset_y))
    .bind(f64::from(card.text_background_opacity))
    .bind(card.is_favourite)
    .bind(sort_index)
    .bind(category_ids)
    .fetch_one(&mut **tx)
    .await?;

    Ok(id)
}

async fn fetch_card(pool: &SqlitePool, id: i64) -> Result<Option<Card>> {
    let row = sqlx::query_as::<_, CardRow>(&format!("{} WHERE id = ?", SELECT_CARDS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(Card::try_from).transpose()
}

async fn fetch_cards(pool: &SqlitePool) -> Result<Vec<Card>> {
    let rows = sqlx::query_as::<_, CardRow>(&format!("{} {}", SELECT_CARDS, CARD_ORDER))
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(Card::try_from).collect()
}

async fn fetch_favourite_cards(pool: &SqlitePool) -> Result<Vec<Card>> {
    let rows = sqlx::query_as::<_, CardRow>(&format!(
        "{} WHERE isFavourite != 0 {}",
        SELECT_CARDS, CARD_ORDER
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Card::try_from).collect()
}

async fn fetch_categories(pool: &SqlitePool) -> Result<Vec<Category>> {
    let categories =
        sqlx::query_as::<_, Category>("SELECT * FROM category ORDER BY sortIndex ASC, id ASC")
            .fetch_all(pool)
            .await?;

    Ok(categories)
}
