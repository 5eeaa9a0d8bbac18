use crate::error::StoreError;
use crate::models::{Quiz, StoredQuiz};
use crate::traits::QuizStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_LIST_LIMIT: usize = 10;

const CREATE_QUIZZES: &str = "CREATE TABLE IF NOT EXISTS quizzes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic TEXT NOT NULL,
    questions TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL
)";

/// Quiz persistence in a single SQLite table. The quiz body is kept as JSON.
#[derive(Debug, Clone)]
pub struct SqliteQuizStore {
    pool: SqlitePool,
}

impl SqliteQuizStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query(CREATE_QUIZZES).execute(&pool).await?;
        info!(path = %path.display(), "quiz store opened");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn stored_quiz_from_row(row: &SqliteRow) -> Result<StoredQuiz, StoreError> {
    let body: String = row.try_get("questions")?;
    Ok(StoredQuiz {
        id: row.try_get("id")?,
        topic: row.try_get("topic")?,
        quiz: serde_json::from_str(&body)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl QuizStore for SqliteQuizStore {
    async fn save(&self, topic: &str, quiz: &Quiz) -> Result<StoredQuiz, StoreError> {
        let body = serde_json::to_string(quiz)?;
        let created_at = Utc::now();

        let result = sqlx::query("INSERT INTO quizzes (topic, questions, created_at) VALUES (?, ?, ?)")
            .bind(topic)
            .bind(&body)
            .bind(created_at)
            .execute(&self.pool)
            .await?;

        let id = result.last_insert_rowid();
        debug!(id, topic, "quiz row inserted");
        Ok(StoredQuiz {
            id,
            topic: topic.to_string(),
            quiz: quiz.clone(),
            created_at,
        })
    }

    async fn list(&self, limit: usize) -> Result<Vec<StoredQuiz>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, topic, questions, created_at FROM quizzes \
             ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(stored_quiz_from_row).collect()
    }
}
