use chrono::NaiveDate;
use std::sync::Arc;
use tasksync_core::db::establish_connection;
use tasksync_core::error::CoreError;
use tasksync_core::models::*;
use tasksync_core::repository::{RemoteTaskStore, SqliteTaskStore};
use tasksync_core::sync::{MoveOutcome, TaskSync};
use tempfile::TempDir;

/// Helper function to create a test database
async fn setup_test_db() -> (SqliteTaskStore, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let pool = establish_connection(&db_path.to_string_lossy())
        .await
        .expect("Failed to establish test database connection");

    (SqliteTaskStore::new(pool), temp_dir)
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

/// Helper function to create a test task
async fn create_test_task(store: &SqliteTaskStore, title: &str, day: &str) -> Task {
    let data = NewTask {
        title: title.to_string(),
        date: date(day),
        time: Some(parse_time("09:00").unwrap()),
        link: Some("https://example.com".to_string()),
        note: Some(format!("Test task: {}", title)),
    };

    store
        .create(data)
        .await
        .expect("Failed to create test task")
}

#[tokio::test]
async fn test_basic_task_crud_workflow() {
    let (store, _temp_dir) = setup_test_db().await;

    let task = create_test_task(&store, "Test Task", "2025-06-10").await;
    assert_eq!(task.title, "Test Task");
    assert!(!task.id.is_temporary());
    assert!(!task.is_completed);
    assert_eq!(task.time, Some(parse_time("09:00").unwrap()));
    assert_eq!(task.link.as_deref(), Some("https://example.com"));

    let id = task.id.as_durable().unwrap().to_string();
    let patch = TaskPatch {
        title: Some("Updated Task".to_string()),
        time: Some(None),
        note: Some(None),
        ..Default::default()
    };
    let updated = store.update(&id, patch).await.unwrap();
    assert_eq!(updated.title, "Updated Task");
    assert_eq!(updated.time, None);
    assert_eq!(updated.note, None);
    assert_eq!(updated.link.as_deref(), Some("https://example.com"));

    let completed = store.set_completed(&id, true).await.unwrap();
    assert!(completed.is_completed);

    store.delete(&id).await.unwrap();
    assert!(store.find_by_id(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_is_inclusive_range() {
    let (store, _temp_dir) = setup_test_db().await;
    create_test_task(&store, "Before", "2025-05-31").await;
    create_test_task(&store, "First", "2025-06-01").await;
    create_test_task(&store, "Last", "2025-06-30").await;
    create_test_task(&store, "After", "2025-07-01").await;

    let tasks = store.list(date("2025-06-01"), date("2025-06-30")).await.unwrap();

    let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "Last"]);
}

#[tokio::test]
async fn test_missing_rows_are_not_found() {
    let (store, _temp_dir) = setup_test_db().await;

    assert!(matches!(
        store.delete("missing").await,
        Err(CoreError::NotFound(_))
    ));
    assert!(matches!(
        store.set_completed("missing", true).await,
        Err(CoreError::NotFound(_))
    ));
    assert!(matches!(
        store.update("missing", TaskPatch::moving_to(date("2025-06-10"))).await,
        Err(CoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_blank_title_rejected() {
    let (store, _temp_dir) = setup_test_db().await;

    let result = store.create(NewTask::new("  ", date("2025-06-10"))).await;

    assert!(matches!(result, Err(CoreError::InvalidInput(_))));
}

#[tokio::test]
async fn test_notification_ids_round_trip() {
    let (store, _temp_dir) = setup_test_db().await;
    let task = create_test_task(&store, "Standup", "2025-06-10").await;
    let id = task.id.as_durable().unwrap().to_string();
    assert_eq!(task.notification_ids, None);

    let handles = vec!["reminder-1".to_string(), "reminder-2".to_string()];
    let patch = TaskPatch {
        notification_ids: Some(Some(handles.clone())),
        ..Default::default()
    };
    store.update(&id, patch).await.unwrap();

    let stored = store.find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.notification_ids, Some(handles));
}

#[tokio::test]
async fn test_find_by_id_prefix() {
    let (store, _temp_dir) = setup_test_db().await;
    let task = create_test_task(&store, "Prefix", "2025-06-10").await;
    let id = task.id.as_durable().unwrap().to_string();

    let found = store.find_by_id_prefix(&id[..8]).await.unwrap();
    assert!(found.iter().any(|t| t.id == task.id));

    let none = store.find_by_id_prefix("zzzz").await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_sync_session_over_sqlite() {
    let (store, _temp_dir) = setup_test_db().await;
    let store = Arc::new(store);
    let today = date("2025-06-10");
    create_test_task(&store, "Existing", "2025-06-10").await;

    let sync = TaskSync::builder(store.clone()).today(move || today).build();
    sync.load_month(2025, 5).await.unwrap();
    assert_eq!(sync.tasks_for(today).len(), 1);

    let created = sync.create(NewTask::new("Buy milk", today)).await.unwrap();
    assert!(!created.id.is_temporary());
    assert!(sync.toggle(&created.id).await.unwrap());
    assert_eq!(
        sync.move_task(&created.id, date("2025-06-11")).await.unwrap(),
        MoveOutcome::Moved
    );

    let fresh = TaskSync::builder(store.clone()).today(move || today).build();
    fresh.load_month(2025, 5).await.unwrap();
    assert_eq!(fresh.snapshot(), sync.snapshot());

    let moved = fresh.tasks_for(date("2025-06-11"));
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].title, "Buy milk");
    assert!(moved[0].is_completed);
}

#[tokio::test]
async fn test_writes_are_visible_to_a_new_connection() {
    let (store, temp_dir) = setup_test_db().await;
    let db_path = temp_dir.path().join("test.db");
    let created = create_test_task(&store, "Buy milk", "2025-06-10").await;
    let id = created.id.as_durable().unwrap().to_string();
    store.set_completed(&id, true).await.unwrap();
    drop(store);

    let pool = establish_connection(&db_path.to_string_lossy()).await.unwrap();
    let reopened = SqliteTaskStore::new(pool);

    let stored = reopened.find_by_id(&id).await.unwrap().expect("row was committed");
    assert_eq!(stored.title, "Buy milk");
    assert!(stored.is_completed);
    assert_eq!(
        reopened.list(date("2025-06-10"), date("2025-06-10")).await.unwrap().len(),
        1
    );
}
