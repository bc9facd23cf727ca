//! Screen state containers
//!
//! Each container publishes an immutable state snapshot through a watch
//! channel and exposes the user actions that replace it.

pub mod card;
pub mod list;

pub use card::{CardState, CardViewModel};
pub use list::{ListState, ListTab, ListViewModel};

use crate::database::{Card, Repository};
use crate::error::Result;
use crate::storage::ImageStore;

/// Delete `card`'s row, then its stored image once no remaining card uses
/// the same file. Returns whether the image file was removed.
///
/// Image removal is best effort; a failure is logged and the row stays
/// deleted.
pub(crate) async fn delete_card_and_image(
    repo: &Repository,
    images: &ImageStore,
    card: &Card,
) -> Result<bool> {
    repo.delete_card(card.id).await?;

    let Some(image) = &card.image else {
        return Ok(false);
    };

    if repo.is_image_referenced(&image.path).await? {
        tracing::debug!("Keeping image still used by another card: {}", image.path);
        return Ok(false);
    }

    match images.delete(&image.path).await {
        Ok(removed) => Ok(removed),
        Err(e) => {
            tracing::warn!("Failed to delete image for card {}: {}", card.id, e);
            Ok(false)
        }
    }
}
