use crate::error::CoreError;
use crate::models::{parse_time, format_time, NewTask, Task, TaskId, TaskPatch};
use crate::repository::SqliteTaskStore;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::FromRow;
use tracing::{debug, instrument};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, FromRow)]
struct TaskRow {
    id: String,
    title: String,
    date: String,
    time: Option<String>,
    link: Option<String>,
    note: Option<String>,
    is_completed: bool,
    notification_ids: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = CoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let date = NaiveDate::parse_from_str(&row.date, DATE_FORMAT).map_err(|_| {
            CoreError::InvalidInput(format!("Stored date is malformed: {}", row.date))
        })?;
        let time = row.time.as_deref().map(parse_time).transpose()?;
        let notification_ids = row
            .notification_ids
            .as_deref()
            .map(serde_json::from_str::<Vec<String>>)
            .transpose()?;

        Ok(Task {
            id: TaskId::Durable(row.id),
            title: row.title,
            date,
            time,
            link: row.link,
            note: row.note,
            is_completed: row.is_completed,
            notification_ids,
        })
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn encode_notification_ids(ids: &Option<Vec<String>>) -> Result<Option<String>, CoreError> {
    Ok(ids.as_ref().map(serde_json::to_string).transpose()?)
}

impl SqliteTaskStore {
    /// Finds tasks whose id starts with `short_id`. Used to resolve the short
    /// ids shown in listings.
    pub async fn find_by_id_prefix(&self, short_id: &str) -> Result<Vec<Task>, CoreError> {
        let mut pattern = String::with_capacity(short_id.len() + 1);
        pattern.push_str(short_id);
        pattern.push('%');

        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE id LIKE $1 ORDER BY date, time")
                .bind(pattern)
                .fetch_all(self.pool())
                .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Task>, CoreError> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(Task::try_from).transpose()
    }
}

#[async_trait]
impl super::RemoteTaskStore for SqliteTaskStore {
    #[instrument(skip(self), level = "debug")]
    async fn list(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Task>, CoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE date >= $1 AND date <= $2 ORDER BY date, time",
        )
        .bind(format_date(start))
        .bind(format_date(end))
        .fetch_all(self.pool())
        .await?;
        debug!(rows = rows.len(), "Listed tasks");
        rows.into_iter().map(Task::try_from).collect()
    }

    #[instrument(skip(self, data), level = "debug")]
    async fn create(&self, data: NewTask) -> Result<Task, CoreError> {
        data.validate()?;
        let id = Uuid::new_v4().to_string();
        let mut tx = self.pool().begin().await?;

        let row: TaskRow = sqlx::query_as(
            r#"INSERT INTO tasks (id, title, date, time, link, note, is_completed)
            VALUES ($1, $2, $3, $4, $5, $6, 0)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&data.title)
        .bind(format_date(data.date))
        .bind(data.time.as_ref().map(format_time))
        .bind(&data.link)
        .bind(&data.note)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Task::try_from(row)
    }

    #[instrument(skip(self, patch), level = "debug")]
    async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, CoreError> {
        patch.validate()?;
        let mut tx = self.pool().begin().await?;

        let row: TaskRow = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        let mut task = Task::try_from(row)?;
        patch.apply_to(&mut task);

        let row: TaskRow = sqlx::query_as(
            r#"UPDATE tasks
            SET title = $1, date = $2, time = $3, link = $4, note = $5,
                is_completed = $6, notification_ids = $7,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = $8
            RETURNING *
            "#,
        )
        .bind(&task.title)
        .bind(format_date(task.date))
        .bind(task.time.as_ref().map(format_time))
        .bind(&task.link)
        .bind(&task.note)
        .bind(task.is_completed)
        .bind(encode_notification_ids(&task.notification_ids)?)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Task::try_from(row)
    }

    #[instrument(skip(self), level = "debug")]
    async fn set_completed(&self, id: &str, completed: bool) -> Result<Task, CoreError> {
        let mut tx = self.pool().begin().await?;

        let row: TaskRow = sqlx::query_as(
            r#"UPDATE tasks
            SET is_completed = $1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(completed)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::NotFound(id.to_string()))?;

        tx.commit().await?;
        Task::try_from(row)
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
