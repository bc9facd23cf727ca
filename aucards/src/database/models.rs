//! Database models
//!
//! Rust structs representing stored entities. Rows are read into
//! `CardRow`/`CategoryRow` and converted, so column naming stays
//! local to this module and the repository.

use crate::color::Color;
use crate::config::{
    DEFAULT_DESCRIPTION_FONT_SIZE, DEFAULT_TEXT_BACKGROUND_OPACITY, DEFAULT_TITLE_FONT_SIZE,
};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// How title and description are arranged on a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardLayout {
    /// Large title with the description underneath
    #[default]
    TitleSubtitle,
    /// Card split into two stacked halves
    Halves,
}

impl CardLayout {
    pub fn as_str(self) -> &'static str {
        match self {
            CardLayout::TitleSubtitle => "title_subtitle",
            CardLayout::Halves => "halves",
        }
    }
}

impl fmt::Display for CardLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardLayout {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "title_subtitle" | "title-subtitle" | "title" => Ok(CardLayout::TitleSubtitle),
            "halves" | "two_halves" => Ok(CardLayout::Halves),
            other => Err(AppError::InvalidValue(format!("unknown card layout: {}", other))),
        }
    }
}

/// Image shown on a card, with its on-card transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardImage {
    /// File path or URI of the image
    pub path: String,
    pub scale: f32,
    /// Rotation in degrees
    pub rotation: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl CardImage {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            scale: 1.0,
            rotation: 0.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

/// A single communication card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// Zero until the card is saved for the first time
    pub id: i64,
    pub text: String,
    pub description: String,
    pub color: Color,
    pub layout: CardLayout,
    pub title_font_size: i32,
    pub description_font_size: i32,
    pub image: Option<CardImage>,
    /// Opacity of the box behind the text, 0.0..=1.0
    pub text_background_opacity: f32,
    pub is_favourite: bool,
    /// Manual ordering index
    pub sort_index: i64,
    pub category_ids: Vec<i64>,
}

impl Default for Card {
    fn default() -> Self {
        Self {
            id: 0,
            text: String::new(),
            description: String::new(),
            color: Color::default(),
            layout: CardLayout::default(),
            title_font_size: DEFAULT_TITLE_FONT_SIZE,
            description_font_size: DEFAULT_DESCRIPTION_FONT_SIZE,
            image: None,
            text_background_opacity: DEFAULT_TEXT_BACKGROUND_OPACITY,
            is_favourite: false,
            sort_index: 0,
            category_ids: Vec::new(),
        }
    }
}

impl Card {
    /// Blank card with only its text set
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn is_new(&self) -> bool {
        self.id == 0
    }

    /// A card can be saved once its text is non-blank
    pub fn is_valid(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Raw `aucard` row
#[derive(Debug, FromRow)]
pub(crate) struct CardRow {
    pub id: i64,
    pub text: String,
    pub description: String,
    pub color: i64,
    pub layout: String,
    #[sqlx(rename = "titleFontSize")]
    pub title_font_size: i32,
    #[sqlx(rename = "descriptionFontSize")]
    pub description_font_size: i32,
    #[sqlx(rename = "imagePath")]
    pub image_path: Option<String>,
    #[sqlx(rename = "imageScale")]
    pub image_scale: f64,
    #[sqlx(rename = "imageRotation")]
    pub image_rotation: f64,
    #[sqlx(rename = "imageOffsetX")]
    pub image_offset_x: f64,
    #[sqlx(rename = "imageOffsetY")]
    pub image_offset_y: f64,
    #[sqlx(rename = "textBackgroundOpacity")]
    pub text_background_opacity: f64,
    #[sqlx(rename = "isFavourite")]
    pub is_favourite: i64,
    #[sqlx(rename = "sortIndex")]
    pub sort_index: i64,
    #[sqlx(rename = "categoryIds")]
    pub category_ids: String,
}

impl TryFrom<CardRow> for Card {
    type Error = AppError;

    fn try_from(row: CardRow) -> Result<Self> {
        let layout = row.layout.parse().unwrap_or_else(|_| {
            tracing::warn!("Card {} has unknown layout {:?}, using default", row.id, row.layout);
            CardLayout::default()
        });

        let image = row.image_path.map(|path| CardImage {
            path,
            scale: row.image_scale as f32,
            rotation: row.image_rotation as f32,
            offset_x: row.image_offset_x as f32,
            offset_y: row.image_offset_y as f32,
        });

        Ok(Card {
            id: row.id,
            text: row.text,
            description: row.description,
            color: Color::from_packed(row.color),
            layout,
            title_font_size: row.title_font_size,
            description_font_size: row.description_font_size,
            image,
            text_background_opacity: row.text_background_opacity as f32,
            is_favourite: row.is_favourite != 0,
            sort_index: row.sort_index,
            category_ids: serde_json::from_str(&row.category_ids)?,
        })
    }
}

/// Named group of cards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[sqlx(rename = "sortIndex")]
    pub sort_index: i64,
}
