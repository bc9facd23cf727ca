//! Command line front end
//!
//! A thin headless driver over the state containers. Every command opens
//! the shared `AppContext`, performs one user action and prints the
//! outcome.

use crate::app::AppContext;
use crate::config::{DATA_DIR_ENV, LIST_LOAD_TIMEOUT};
use crate::database::{Card, CardLayout};
use crate::error::{AppError, Result};
use crate::services::SettingKey;
use crate::state::ListViewModel;
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "aucards")]
#[command(version)]
#[command(about = "Show big, readable message cards", long_about = None)]
pub struct Cli {
    /// Directory holding the card database, images and settings
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List cards in display order
    List {
        /// Only show favourite cards
        #[arg(long)]
        favourites: bool,
    },

    /// Show one card
    Show {
        id: i64,
    },

    /// Create a new card
    Add {
        /// Card title
        text: String,

        #[arg(long)]
        description: Option<String>,

        /// Background color as #RRGGBB or #AARRGGBB
        #[arg(long)]
        color: Option<String>,

        /// Layout: title_subtitle or halves
        #[arg(long)]
        layout: Option<String>,

        /// Image file copied into the card's image store
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Toggle the favourite flag of a card
    Favourite {
        id: i64,
    },

    /// Delete one or more cards
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Move the given cards to the front, in the order given
    Reorder {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Export all cards to a zip archive
    Export {
        dest: PathBuf,
    },

    /// Import cards from an export archive or database file
    Import {
        src: PathBuf,
    },

    /// Manage categories
    Category(CategoryCommand),

    /// Show or change preferences
    Settings(SettingsCommand),
}

#[derive(Args, Debug)]
pub struct CategoryCommand {
    #[command(subcommand)]
    pub command: CategorySubcommand,
}

#[derive(Subcommand, Debug)]
pub enum CategorySubcommand {
    /// List categories
    List,

    /// Create a category
    Add {
        name: String,
    },

    /// Rename a category
    Rename {
        id: i64,
        name: String,
    },

    /// Delete a category
    Delete {
        id: i64,
    },
}

#[derive(Args, Debug)]
pub struct SettingsCommand {
    #[command(subcommand)]
    pub command: SettingsSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum SettingsSubcommand {
    /// Print every preference
    Show,

    /// Change a preference
    Set {
        key: String,
        value: String,
    },
}

impl Cli {
    /// Data directory from the flag, the environment, or the platform default
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }

        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(dir));
        }

        dirs::data_dir()
            .map(|dir| dir.join("aucards"))
            .ok_or_else(|| AppError::Generic("Could not determine data directory".to_string()))
    }
}

/// Execute `command` against `ctx`, writing human readable output to `out`
pub async fn run(ctx: &AppContext, command: Command, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::List { favourites } => {
            let list = loaded_list(ctx).await?;
            let state = list.state();
            let cards: Vec<&Card> = state
                .cards
                .iter()
                .filter(|c| !favourites || c.is_favourite)
                .collect();

            if cards.is_empty() {
                writeln!(out, "No cards")?;
            }
            for card in cards {
                writeln!(out, "{}", summary_line(card))?;
            }
        }

        Command::Show { id } => {
            let vm = ctx.card_view_model(id).await?;
            let state = vm.state();
            let card = &state.card;

            writeln!(out, "{}", summary_line(card))?;
            if !card.description.is_empty() {
                writeln!(out, "  {}", card.description)?;
            }
            writeln!(out, "  layout: {}", card.layout)?;
            writeln!(
                out,
                "  fonts: {} / {}",
                card.title_font_size, card.description_font_size
            )?;
            if let Some(image) = &card.image {
                writeln!(out, "  image: {}", image.path)?;
            }
            if !card.category_ids.is_empty() {
                writeln!(out, "  categories: {:?}", card.category_ids)?;
            }
        }

        Command::Add {
            text,
            description,
            color,
            layout,
            image,
        } => {
            let vm = ctx.card_view_model(0).await?;
            vm.update_text(text);

            if let Some(description) = description {
                vm.update_description(description);
            }

            if let Some(color) = color {
                vm.update_hex_code(&color);
                if !vm.state().is_hex_valid {
                    return Err(AppError::InvalidValue(format!("Invalid color: {}", color)));
                }
            }

            if let Some(layout) = layout {
                vm.update_layout(layout.parse::<CardLayout>()?);
            }

            if let Some(image) = image {
                vm.import_image_file(&image).await?;
            }

            if !vm.is_valid() {
                return Err(AppError::InvalidValue(
                    "Card text must not be empty".to_string(),
                ));
            }

            let card = vm.save_card().await?;
            writeln!(out, "Created card {}", card.id)?;
        }

        Command::Favourite { id } => {
            let list = loaded_list(ctx).await?;
            let card = list.mark_favourite(id).await?;
            let verb = if card.is_favourite { "Marked" } else { "Unmarked" };
            writeln!(out, "{} card {} as favourite", verb, id)?;
        }

        Command::Delete { ids } => {
            let list = loaded_list(ctx).await?;
            let state = list.state();

            for id in &ids {
                if !state.cards.iter().any(|c| c.id == *id) {
                    return Err(AppError::CardNotFound(*id));
                }
            }

            let Some((first, rest)) = ids.split_first() else {
                return Err(AppError::InvalidValue("No card ids given".to_string()));
            };
            list.enter_select_mode(*first);
            for id in rest {
                list.select_id(*id);
            }

            let deleted = list.delete_selected().await?;
            writeln!(out, "Deleted {} cards", deleted)?;
        }

        Command::Reorder { ids } => {
            let list = loaded_list(ctx).await?;
            let cards = list.state().cards;

            let mut new_order = Vec::with_capacity(cards.len());
            for id in &ids {
                let card = cards
                    .iter()
                    .find(|c| c.id == *id)
                    .ok_or(AppError::CardNotFound(*id))?;
                if !new_order.iter().any(|c: &Card| c.id == *id) {
                    new_order.push(card.clone());
                }
            }
            new_order.extend(cards.iter().filter(|c| !ids.contains(&c.id)).cloned());

            list.save_all_cards(new_order).await?;
            writeln!(out, "Reordered {} cards", cards.len())?;
        }

        Command::Export { dest } => {
            let summary = ctx.backup.export_to(&dest).await?;
            writeln!(
                out,
                "Exported {} cards to {} ({} bytes)",
                summary.card_count,
                summary.path.display(),
                summary.size
            )?;
        }

        Command::Import { src } => {
            let summary = ctx.backup.import_from(&src).await?;
            writeln!(out, "Imported {} cards", summary.imported)?;
        }

        Command::Category(cmd) => run_category(ctx, cmd.command, out).await?,

        Command::Settings(cmd) => match cmd.command {
            SettingsSubcommand::Show => {
                let settings = ctx.settings.snapshot();
                for key in SettingKey::ALL {
                    let value = settings.get(key).unwrap_or_else(|| "(unset)".to_string());
                    writeln!(out, "{} = {}", key, value)?;
                }
            }
            SettingsSubcommand::Set { key, value } => {
                ctx.settings.set_value(&key, &value).await?;
                writeln!(out, "{} = {}", key, value)?;
            }
        },
    }

    Ok(())
}

async fn run_category(
    ctx: &AppContext,
    command: CategorySubcommand,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        CategorySubcommand::List => {
            let categories = ctx.repo.list_categories().await?;
            if categories.is_empty() {
                writeln!(out, "No categories")?;
            }
            for category in categories {
                writeln!(out, "{:>4}  {}", category.id, category.name)?;
            }
        }
        CategorySubcommand::Add { name } => {
            let category = ctx.repo.create_category(&name).await?;
            writeln!(out, "Created category {}", category.id)?;
        }
        CategorySubcommand::Rename { id, name } => {
            let category = ctx.repo.rename_category(id, &name).await?;
            writeln!(out, "Renamed category {} to {}", category.id, category.name)?;
        }
        CategorySubcommand::Delete { id } => {
            ctx.repo.delete_category(id).await?;
            writeln!(out, "Deleted category {}", id)?;
        }
    }

    Ok(())
}

/// List state container after its first load
async fn loaded_list(ctx: &AppContext) -> Result<ListViewModel> {
    loaded_list_within(ctx, LIST_LOAD_TIMEOUT).await
}

/// Live query failures are only logged, so a store that cannot be read
/// shows up here as a timeout
async fn loaded_list_within(ctx: &AppContext, timeout: Duration) -> Result<ListViewModel> {
    let list = ctx.list_view_model();
    let mut rx = list.subscribe();

    tokio::time::timeout(timeout, rx.wait_for(|state| !state.is_loading))
        .await
        .map_err(|_| {
            AppError::Generic(format!("Timed out after {:?} loading cards", timeout))
        })?
        .map_err(|e| AppError::Generic(format!("Card list closed before loading: {}", e)))?;

    Ok(list)
}

fn summary_line(card: &Card) -> String {
    let star = if card.is_favourite { '*' } else { ' ' };
    format!("{:>4} {} {}  [{}]", card.id, star, card.text, card.color.to_hex())
}
