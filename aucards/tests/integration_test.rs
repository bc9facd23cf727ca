//! Integration tests for Aucards
//!
//! These tests verify end-to-end functionality including:
//! - Card storage and live queries
//! - List and card state containers
//! - Export and import workflows
//! - Preference persistence

use aucards::app::AppContext;
use aucards::color::Color;
use aucards::database::{create_pool, Card, CardLayout, Repository};
use aucards::error::AppError;
use aucards::services::{SettingsService, Theme};
use aucards::state::{ListState, ListTab, ListViewModel};
use std::time::Duration;
use tempfile::TempDir;

/// Helper to create a file-backed application context
async fn create_test_context() -> (AppContext, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let ctx = AppContext::open(temp_dir.path()).await.unwrap();
    (ctx, temp_dir)
}

/// Wait until the list state satisfies `check`
async fn wait_for_list(vm: &ListViewModel, check: impl Fn(&ListState) -> bool) -> ListState {
    let mut rx = vm.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| check(s)))
        .await
        .expect("timed out waiting for list state")
        .unwrap()
        .clone();
    state
}

#[tokio::test]
async fn test_card_crud_operations() {
    let temp_dir = TempDir::new().unwrap();
    let pool = create_pool(&temp_dir.path().join("test.db")).await.unwrap();
    let repo = Repository::new(pool);

    // Create
    let id = repo
        .save_card(&Card {
            description: "Please speak slowly".to_string(),
            color: Color::from_argb(0xFF, 0x12, 0x34, 0x56),
            layout: CardLayout::Halves,
            ..Card::with_text("Hello")
        })
        .await
        .unwrap();
    assert!(id > 0);

    // Read
    let card = repo.get_card(id).await.unwrap();
    assert_eq!(card.text, "Hello");
    assert_eq!(card.color.to_hex(), "#123456");
    assert_eq!(card.layout, CardLayout::Halves);

    // Update replaces the row with the same id
    repo.save_card(&Card {
        text: "Hi".to_string(),
        ..card.clone()
    })
    .await
    .unwrap();
    let cards = repo.list_cards().await.unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].text, "Hi");
    assert_eq!(cards[0].description, "Please speak slowly");

    // Delete, twice
    repo.delete_card(id).await.unwrap();
    repo.delete_card(id).await.unwrap();
    assert!(matches!(
        repo.get_card(id).await,
        Err(AppError::CardNotFound(_))
    ));
}

#[tokio::test]
async fn test_live_query_sees_writes() {
    let (ctx, _temp) = create_test_context().await;

    let mut rx = ctx.repo.watch_all_cards();
    let initial = rx.wait_for(|cards| cards.is_some()).await.unwrap().clone();
    assert_eq!(initial, Some(Vec::new()));

    ctx.repo.save_card(&Card::with_text("Live")).await.unwrap();

    let cards = tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|cards| cards.as_ref().is_some_and(|c| c.len() == 1)),
    )
    .await
    .unwrap()
    .unwrap()
    .clone()
    .unwrap();
    assert_eq!(cards[0].text, "Live");
}

#[tokio::test]
async fn test_list_selection_and_delete_flow() {
    let (ctx, _temp) = create_test_context().await;

    let first = ctx.repo.save_card(&Card::with_text("First")).await.unwrap();
    let second = ctx.repo.save_card(&Card::with_text("Second")).await.unwrap();
    let third = ctx.repo.save_card(&Card::with_text("Third")).await.unwrap();

    let list = ctx.list_view_model();
    let state = wait_for_list(&list, |s| !s.is_loading && s.cards.len() == 3).await;
    assert_eq!(
        state.cards.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![first, second, third]
    );

    list.enter_select_mode(first);
    list.select_id(third);
    list.select_id(third);
    list.deselect_id(second);
    assert_eq!(list.state().selected_ids, vec![first, third]);

    let deleted = list.delete_selected().await.unwrap();
    assert_eq!(deleted, 2);

    let state = wait_for_list(&list, |s| s.cards.len() == 1).await;
    assert_eq!(state.cards[0].id, second);
    assert!(!state.is_select_mode);
    assert!(state.selected_ids.is_empty());
}

#[tokio::test]
async fn test_favourites_tab_and_reorder() {
    let (ctx, _temp) = create_test_context().await;

    let a = ctx.repo.save_card(&Card::with_text("A")).await.unwrap();
    let b = ctx.repo.save_card(&Card::with_text("B")).await.unwrap();

    let list = ctx.list_view_model();
    wait_for_list(&list, |s| s.cards.len() == 2).await;

    list.mark_favourite(b).await.unwrap();
    list.turn_page(1);
    let state = wait_for_list(&list, |s| s.favourite_cards.len() == 1).await;
    assert_eq!(state.current_tab, ListTab::Favourites);
    assert_eq!(state.visible_cards()[0].id, b);

    // Unknown pages are ignored
    list.turn_page(7);
    assert_eq!(list.state().current_tab, ListTab::Favourites);

    let reversed: Vec<Card> = list.state().cards.into_iter().rev().collect();
    list.save_all_cards(reversed).await.unwrap();

    let state = wait_for_list(&list, |s| s.cards.first().is_some_and(|c| c.id == b)).await;
    assert_eq!(
        state.cards.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![b, a]
    );
}

#[tokio::test]
async fn test_card_editing_workflow() {
    let (ctx, _temp) = create_test_context().await;

    let vm = ctx.card_view_model(0).await.unwrap();
    assert!(!vm.is_valid());

    vm.update_text("Thank you");
    vm.update_description("Very much");
    vm.update_hex_code("00FF00");
    assert!(vm.state().is_hex_valid);

    vm.update_hex_code("#00F");
    let state = vm.state();
    assert!(!state.is_hex_valid);
    assert_eq!(state.hex_code, "#00F");
    assert_eq!(state.card.color.to_hex(), "#00FF00");

    vm.update_layout(CardLayout::Halves);
    vm.toggle_favourite();
    let saved = vm.save_card().await.unwrap();

    let reopened = ctx.card_view_model(saved.id).await.unwrap();
    let card = reopened.state().card;
    assert_eq!(card.text, "Thank you");
    assert_eq!(card.description, "Very much");
    assert_eq!(card.color, Color::from_argb(0xFF, 0x00, 0xFF, 0x00));
    assert_eq!(card.layout, CardLayout::Halves);
    assert!(card.is_favourite);
}

#[tokio::test]
async fn test_export_import_roundtrip() {
    let (source, _source_temp) = create_test_context().await;

    for text in ["One", "Two", "Three"] {
        source
            .repo
            .save_card(&Card {
                is_favourite: text == "Two",
                ..Card::with_text(text)
            })
            .await
            .unwrap();
    }

    let archive_dir = TempDir::new().unwrap();
    let archive = archive_dir.path().join("cards.zip");
    let summary = source.backup.export_to(&archive).await.unwrap();
    assert_eq!(summary.card_count, 3);
    assert!(archive.exists());

    let (target, _target_temp) = create_test_context().await;
    target
        .repo
        .save_card(&Card::with_text("Existing"))
        .await
        .unwrap();

    let imported = target.backup.import_from(&archive).await.unwrap();
    assert_eq!(imported.imported, 3);

    let cards = target.repo.list_cards().await.unwrap();
    let texts: Vec<&str> = cards.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["Existing", "One", "Two", "Three"]);
    assert!(cards.iter().find(|c| c.text == "Two").unwrap().is_favourite);

    // No temp files left behind
    let leftovers = std::fs::read_dir(target.data_dir.join("tmp")).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_import_of_garbage_leaves_store_untouched() {
    let (ctx, temp) = create_test_context().await;
    ctx.repo.save_card(&Card::with_text("Keep")).await.unwrap();

    let garbage = temp.path().join("notes.txt");
    std::fs::write(&garbage, b"definitely not a database").unwrap();

    assert!(ctx.backup.import_from(&garbage).await.is_err());
    assert_eq!(ctx.repo.list_cards().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_settings_persist_across_reopen() {
    let temp_dir = TempDir::new().unwrap();

    {
        let settings = SettingsService::open(temp_dir.path()).await.unwrap();
        assert_eq!(settings.theme(), None);

        settings.set_theme(Theme::Dark).await.unwrap();
        settings.set_landscape(true).await.unwrap();
        settings.set_value("ringtone_uri", "content://media/7").await.unwrap();
    }

    let ctx = AppContext::open(temp_dir.path()).await.unwrap();
    assert_eq!(ctx.settings.theme(), Some(Theme::Dark));
    assert_eq!(ctx.settings.landscape(), Some(true));

    // Card screens pick up the stored preferences
    let vm = ctx.card_view_model(0).await.unwrap();
    let state = vm.state();
    assert!(state.landscape);
    assert_eq!(state.ringtone_uri.as_deref(), Some("content://media/7"));
}
