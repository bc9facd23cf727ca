//! Card list state
//!
//! `ListViewModel` projects the live card collection together with the
//! ephemeral selection state of the list screen. The card lists follow the
//! repository's shared live queries for as long as the view model exists;
//! selection and tab state never touch the store.

use super::delete_card_and_image;
use crate::database::{Card, Repository};
use crate::error::{AppError, Result};
use crate::storage::ImageStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Which list the user is looking at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListTab {
    #[default]
    All,
    Favourites,
}

impl ListTab {
    /// Tab shown on pager page `page`, if there is one
    pub fn from_page(page: usize) -> Option<Self> {
        match page {
            0 => Some(ListTab::All),
            1 => Some(ListTab::Favourites),
            _ => None,
        }
    }
}

/// Immutable snapshot of the list screen
#[derive(Debug, Clone, PartialEq)]
pub struct ListState {
    pub cards: Vec<Card>,
    pub favourite_cards: Vec<Card>,
    /// Selected card ids in the order they were selected
    pub selected_ids: Vec<i64>,
    pub current_tab: ListTab,
    pub is_loading: bool,
    pub is_select_mode: bool,
}

impl Default for ListState {
    fn default() -> Self {
        Self {
            cards: Vec::new(),
            favourite_cards: Vec::new(),
            selected_ids: Vec::new(),
            current_tab: ListTab::All,
            is_loading: true,
            is_select_mode: false,
        }
    }
}

impl ListState {
    pub fn is_selected(&self, id: i64) -> bool {
        self.selected_ids.contains(&id)
    }

    /// Cards of the current tab
    pub fn visible_cards(&self) -> &[Card] {
        match self.current_tab {
            ListTab::All => &self.cards,
            ListTab::Favourites => &self.favourite_cards,
        }
    }
}

/// State container for the card list
pub struct ListViewModel {
    repo: Repository,
    images: ImageStore,
    state: Arc<watch::Sender<ListState>>,
    sync_task: JoinHandle<()>,
}

impl ListViewModel {
    /// Start following the card store. Must be called within a tokio runtime.
    pub fn new(repo: Repository, images: ImageStore) -> Self {
        let (tx, _) = watch::channel(ListState::default());
        let state = Arc::new(tx);

        let sync_task = tokio::spawn(sync_cards(
            repo.clone(),
            repo.watch_all_cards(),
            repo.watch_favourite_cards(),
            Arc::clone(&state),
        ));

        Self {
            repo,
            images,
            state,
            sync_task,
        }
    }

    /// Current state snapshot
    pub fn state(&self) -> ListState {
        self.state.borrow().clone()
    }

    /// Receive every state change
    pub fn subscribe(&self) -> watch::Receiver<ListState> {
        self.state.subscribe()
    }

    /// Switch to select mode with `id` as the only selection
    pub fn enter_select_mode(&self, id: i64) {
        self.update(|s| {
            Some(ListState {
                is_select_mode: true,
                selected_ids: vec![id],
                ..s.clone()
            })
        });
    }

    pub fn select_id(&self, id: i64) {
        self.update(|s| {
            if s.is_selected(id) {
                return None;
            }
            let mut selected_ids = s.selected_ids.clone();
            selected_ids.push(id);
            Some(ListState {
                selected_ids,
                ..s.clone()
            })
        });
    }

    pub fn deselect_id(&self, id: i64) {
        self.update(|s| {
            if !s.is_selected(id) {
                return None;
            }
            Some(ListState {
                selected_ids: s.selected_ids.iter().copied().filter(|&x| x != id).collect(),
                ..s.clone()
            })
        });
    }

    /// Leave select mode and clear the selection
    pub fn exit_select_mode(&self) {
        self.update(|s| {
            Some(ListState {
                is_select_mode: false,
                selected_ids: Vec::new(),
                ..s.clone()
            })
        });
    }

    /// Show pager page `page`. Pages without a tab are ignored.
    pub fn turn_page(&self, page: usize) {
        let Some(tab) = ListTab::from_page(page) else {
            tracing::debug!("Ignoring turn to unknown page {}", page);
            return;
        };

        self.update(|s| {
            Some(ListState {
                current_tab: tab,
                ..s.clone()
            })
        });
    }

    /// Flip the favourite flag of a listed card and persist the copy
    pub async fn mark_favourite(&self, id: i64) -> Result<Card> {
        let card = self
            .state
            .borrow()
            .cards
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(AppError::CardNotFound(id))?;

        let toggled = Card {
            is_favourite: !card.is_favourite,
            ..card
        };
        self.repo.save_card(&toggled).await?;

        tracing::info!("Card {} favourite = {}", id, toggled.is_favourite);
        Ok(toggled)
    }

    /// Delete every selected card and its local image, then leave select
    /// mode. Returns the number of cards deleted.
    ///
    /// An image file shared with a card that is not deleted stays in place.
    pub async fn delete_selected(&self) -> Result<usize> {
        let (selected, cards) = {
            let state = self.state.borrow();
            (state.selected_ids.clone(), state.cards.clone())
        };

        let mut deleted = 0;
        for id in &selected {
            match cards.iter().find(|c| c.id == *id) {
                Some(card) => {
                    delete_card_and_image(&self.repo, &self.images, card).await?;
                }
                None => self.repo.delete_card(*id).await?,
            }
            deleted += 1;
        }

        self.exit_select_mode();

        tracing::info!("Deleted {} selected cards", deleted);
        Ok(deleted)
    }

    /// Persist a user-reordered list; each card's ordering index becomes
    /// its position in `new_order`
    pub async fn save_all_cards(&self, new_order: Vec<Card>) -> Result<()> {
        let reordered: Vec<Card> = new_order
            .into_iter()
            .enumerate()
            .map(|(index, card)| Card {
                sort_index: index as i64,
                ..card
            })
            .collect();

        self.repo.save_all_cards(&reordered).await?;

        tracing::info!("Saved new order of {} cards", reordered.len());
        Ok(())
    }

    /// Replace the state with the record built by `f`, if any
    fn update(&self, f: impl FnOnce(&ListState) -> Option<ListState>) {
        replace_state(&self.state, f);
    }
}

impl Drop for ListViewModel {
    fn drop(&mut self) {
        self.sync_task.abort();
    }
}

/// Republish both live card lists into the list state
async fn sync_cards(
    repo: Repository,
    mut all: watch::Receiver<Option<Vec<Card>>>,
    mut favourites: watch::Receiver<Option<Vec<Card>>>,
    state: Arc<watch::Sender<ListState>>,
) {
    // A shared query can still hold a result from before the latest write,
    // so the first state comes from a direct read. Anything published from
    // here on is applied by the loop below.
    let cached_all = all.borrow_and_update().clone();
    let cached_favourites = favourites.borrow_and_update().clone();

    match tokio::try_join!(repo.list_cards(), repo.list_favourite_cards()) {
        Ok((cards, favourite_cards)) => {
            apply_all(&state, Some(cards));
            apply_favourites(&state, Some(favourite_cards));
        }
        Err(e) => {
            tracing::warn!("Initial card load failed, using live results: {}", e);
            apply_all(&state, cached_all);
            apply_favourites(&state, cached_favourites);
        }
    }

    loop {
        tokio::select! {
            changed = all.changed() => {
                if changed.is_err() {
                    break;
                }
                apply_all(&state, all.borrow_and_update().clone());
            }
            changed = favourites.changed() => {
                if changed.is_err() {
                    break;
                }
                apply_favourites(&state, favourites.borrow_and_update().clone());
            }
        }
    }
}

fn apply_all(state: &watch::Sender<ListState>, cards: Option<Vec<Card>>) {
    let Some(cards) = cards else { return };

    replace_state(state, |s| {
        Some(ListState {
            cards,
            is_loading: false,
            ..s.clone()
        })
    });
}

fn apply_favourites(state: &watch::Sender<ListState>, cards: Option<Vec<Card>>) {
    let Some(favourite_cards) = cards else { return };

    replace_state(state, |s| {
        Some(ListState {
            favourite_cards,
            ..s.clone()
        })
    });
}

/// Swap in a new state record under the channel's write lock, so the
/// sync task and callers never lose each other's updates
fn replace_state(
    state: &watch::Sender<ListState>,
    f: impl FnOnce(&ListState) -> Option<ListState>,
) {
    state.send_if_modified(|current| match f(current) {
        Some(next) => {
            *current = next;
            true
        }
        None => false,
    });
}
