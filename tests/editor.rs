mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use common::{GatedSource, ScriptedSource, config, people, view_over};
use table_editor::editor::state_badge;
use table_editor::store::MemoryStore;
use table_editor::{Phase, RowId, SortOrder, TableEditor};

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|c| c.to_string()).collect()
}

async fn editor_over(data: serde_json::Value, rows_per_page: usize) -> TableEditor {
    let view = view_over(
        config(rows_per_page),
        ScriptedSource::new(data),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
    );
    let all = columns(&["id", "name", "language", "version", "State", "Created Date"]);
    let visible = columns(&["id", "name", "version", "State"]);
    let mut editor = TableEditor::new(view, all, visible);
    editor.start().await.unwrap();
    editor
}

#[tokio::test]
async fn invalid_draft_keeps_the_cell_open() {
    let mut editor = editor_over(people(2), 50).await;
    let row = RowId::remote(0);

    assert!(editor.start_edit(&row, "version"));
    assert_eq!(editor.editing().unwrap().draft, "1.0.0");

    editor.set_draft("v1.0");
    let message = editor.commit_edit().await.unwrap();
    assert!(message.is_some());
    let cell = editor.editing().unwrap();
    assert_eq!(cell.draft, "v1.0");
    assert_eq!(cell.error, message);
    assert_eq!(editor.view().display_value(&editor.view().window()[0], "version"), "1.0.0");
    assert!(editor.view().edits().is_empty());

    editor.set_draft("1.0");
    assert_eq!(editor.commit_edit().await.unwrap(), None);
    assert!(editor.editing().is_none());
    assert_eq!(editor.view().display_value(&editor.view().window()[0], "version"), "1.0");
}

#[tokio::test]
async fn cancel_discards_the_draft() {
    let mut editor = editor_over(people(1), 50).await;
    assert!(editor.start_edit(&RowId::remote(0), "name"));
    editor.set_draft("");
    editor.cancel_edit();
    assert!(editor.editing().is_none());
    assert!(editor.view().edits().is_empty());

    assert!(!editor.start_edit(&RowId::remote(9), "name"));
}

#[tokio::test]
async fn update_cell_validates_before_writing() {
    let mut editor = editor_over(people(1), 50).await;
    let row = RowId::remote(0);

    let rejected = editor.update_cell(&row, "name", "   ").await.unwrap();
    assert!(rejected.is_some());
    assert!(editor.view().edits().is_empty());

    let accepted = editor.update_cell(&row, "State", "paused").await.unwrap();
    assert_eq!(accepted, None);
    assert_eq!(editor.view().display_value(&editor.view().window()[0], "State"), "paused");
}

#[tokio::test]
async fn sort_column_toggles_direction() {
    let mut editor = editor_over(people(3), 50).await;

    editor.choose_sort_column("name");
    assert_eq!(editor.view().params().sort_order, SortOrder::Asc);
    assert_eq!(editor.view().window()[0].internal_id, RowId::remote(0));

    editor.choose_sort_column("name");
    assert_eq!(editor.view().params().sort_order, SortOrder::Desc);
    assert_eq!(editor.view().window()[0].internal_id, RowId::remote(2));

    editor.choose_sort_column("id");
    assert_eq!(editor.view().params().sort_order, SortOrder::Asc);
    assert_eq!(editor.view().params().sort_column.as_deref(), Some("id"));

    editor.clear_sort();
    assert_eq!(editor.view().params().sort_column, None);
}

#[tokio::test]
async fn filter_column_change_clears_the_value() {
    let mut data = people(3);
    data[1]["State"] = json!("paused");
    let mut editor = editor_over(data, 50).await;

    editor.choose_filter_column("State");
    editor.set_filter_value("  PAUSED ");
    assert_eq!(editor.view().view_len(), 1);

    editor.choose_filter_column("name");
    assert_eq!(editor.render().filter_value, "");
    assert_eq!(editor.view().view_len(), 3);

    editor.clear_filter();
    assert_eq!(editor.view().params().filter_column, None);
}

#[tokio::test]
async fn hidden_columns_still_filter_and_sort() {
    let mut editor = editor_over(people(2), 50).await;

    editor.toggle_column("name");
    let page = editor.render();
    assert_eq!(page.columns, columns(&["id", "version", "State"]));
    assert!(page.rows[0].cells.iter().all(|c| c.column != "name"));

    editor.set_search("name-1");
    assert_eq!(editor.view().view_len(), 1);

    editor.toggle_column("name");
    assert_eq!(editor.visible_columns().last().map(String::as_str), Some("name"));
}

#[tokio::test]
async fn scrolling_near_the_bottom_loads_a_page() {
    let mut editor = editor_over(people(5), 2).await;
    assert_eq!(editor.view().window_len(), 2);

    assert!(!editor.on_scroll(0.0, 2000.0, 500.0));
    assert!(editor.on_scroll(1400.0, 2000.0, 500.0));
    assert_eq!(editor.view().window_len(), 4);
    assert!(editor.on_scroll(1500.0, 2000.0, 500.0));
    assert_eq!(editor.view().window_len(), 5);
    assert!(!editor.on_scroll(1500.0, 2000.0, 500.0));
}

#[tokio::test]
async fn render_numbers_rows_and_marks_state() {
    let mut editor = editor_over(people(2), 50).await;
    let added = editor.add_row().await.unwrap();

    let page = editor.render();
    assert_eq!(page.total, 3);
    assert!(!page.has_more);
    assert_eq!(page.rows[0].internal_id, added);
    let numbers: Vec<usize> = page.rows.iter().map(|r| r.number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    let state = page.rows[0].cells.iter().find(|c| c.column == "State").unwrap();
    assert_eq!(state.value, "to contact");
    assert_eq!(state.badge, Some(state_badge("to contact")));
    let id = page.rows[0].cells.iter().find(|c| c.column == "id").unwrap();
    assert_eq!(id.value, added.as_str());
    assert_eq!(id.badge, None);
}

#[tokio::test]
async fn deleting_the_edited_row_closes_the_editor() {
    let mut editor = editor_over(people(2), 50).await;
    let row = RowId::remote(1);
    assert!(editor.start_edit(&row, "name"));

    editor.delete_row(&row).await.unwrap();
    assert!(editor.editing().is_none());
    assert_eq!(editor.render().rows.len(), 1);
}

#[tokio::test]
async fn csv_export_covers_the_whole_view() {
    let mut editor = editor_over(people(3), 1).await;
    editor.toggle_column("State");
    editor.toggle_column("version");

    let csv = editor.export_csv().unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "id,name");
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[3], "a2,name-2");
}

#[tokio::test]
async fn grid_renders_while_the_dataset_loads() {
    let source = GatedSource::new(people(2));
    let view = view_over(
        config(50),
        source.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
    );
    let editor = Arc::new(Mutex::new(TableEditor::new(
        view,
        columns(&["id", "name"]),
        columns(&["id", "name"]),
    )));

    let loading = {
        let editor = editor.clone();
        tokio::spawn(async move { TableEditor::start_shared(&editor).await })
    };

    let mut saw_loading = false;
    for _ in 0..100 {
        let guard = tokio::time::timeout(Duration::from_millis(50), editor.lock())
            .await
            .expect("editor stays unlocked during the fetch");
        if guard.render().loading {
            saw_loading = true;
            break;
        }
        drop(guard);
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(saw_loading);

    source.release();
    loading.await.unwrap().unwrap();

    let page = editor.lock().await.render();
    assert!(!page.loading);
    assert_eq!(page.phase, Phase::Ready);
    assert_eq!(page.total, 2);

    // Already Ready: a second start neither refetches nor blocks.
    TableEditor::start_shared(&editor).await.unwrap();
}
