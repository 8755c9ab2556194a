use super::{
    ChatStore, DocumentRecord, DocumentStore, ImageRecord, ImageStore, MeetingRecord, MeetingStore, RequestRecord,
    RequestStore, StoredMessage, VectorRow, VectorStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slab_session::SessionPersistence;
use slab_types::{ChatTurn, Role, RuntimeError};
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn parse_role(s: &str) -> Role {
    match s {
        "assistant" => Role::Assistant,
        _ => Role::User,
    }
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    s.parse().unwrap_or_else(|_| Utc::now())
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// `migrations` is resolved relative to `CARGO_MANIFEST_DIR` at compile
    /// time; connection and migration happen at runtime so no `DATABASE_URL`
    /// is needed to build.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePool::connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl RequestStore for SqliteStore {
    async fn insert(&self, record: RequestRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO request_log (id, method, path, status, latency_ms, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(record.id.to_string())
        .bind(record.method)
        .bind(record.path)
        .bind(record.status)
        .bind(record.latency_ms)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_response(&self, id: Uuid, status: i64, latency_ms: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE request_log SET status = ?1, latency_ms = ?2 WHERE id = ?3")
            .bind(status)
            .bind(latency_ms)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl ChatStore for SqliteStore {
    async fn ensure_session(&self, session_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO sessions (session_id, summary, created_at) VALUES (?1, NULL, ?2)")
            .bind(session_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_message(&self, session_id: &str, role: Role, content: &str) -> Result<i64, sqlx::Error> {
        self.ensure_session(session_id).await?;
        let result = sqlx::query("INSERT INTO messages (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(session_id)
            .bind(role_str(role))
            .bind(content)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>, sqlx::Error> {
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT id, role, content FROM messages WHERE session_id = ?1 ORDER BY id ASC")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id, role, content)| StoredMessage { id, role: parse_role(&role), content }).collect())
    }

    async fn messages_by_ids(&self, ids: &[i64]) -> Result<Vec<StoredMessage>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = ids.iter().enumerate().map(|(i, _)| format!("?{}", i + 1)).collect::<Vec<_>>().join(", ");
        let sql = format!("SELECT id, role, content FROM messages WHERE id IN ({placeholders}) ORDER BY id ASC");
        let mut query = sqlx::query_as(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows: Vec<(i64, String, String)> = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(id, role, content)| StoredMessage { id, role: parse_role(&role), content }).collect())
    }

    async fn get_summary(&self, session_id: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(Option<String>,)> = sqlx::query_as("SELECT summary FROM sessions WHERE session_id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|(s,)| s))
    }

    async fn set_summary(&self, session_id: &str, summary: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO sessions (session_id, summary, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET summary = excluded.summary",
        )
        .bind(session_id)
        .bind(summary)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Bridges the durable store to [`slab_session::SessionCache`]'s view of a
/// session: the last `N_WINDOW` messages, oldest-first.
#[async_trait]
impl SessionPersistence for SqliteStore {
    async fn load_summary(&self, session_id: &str) -> Result<Option<String>, RuntimeError> {
        self.get_summary(session_id).await.map_err(|e| RuntimeError::KvUnavailable(e.to_string()))
    }

    async fn load_recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<ChatTurn>, RuntimeError> {
        let all = self.list_messages(session_id).await.map_err(|e| RuntimeError::KvUnavailable(e.to_string()))?;
        let start = all.len().saturating_sub(limit);
        Ok(all[start..].iter().map(|m| ChatTurn { role: m.role, content: m.content.clone() }).collect())
    }
}

impl DocumentStore for SqliteStore {
    async fn create_document(&self, record: &DocumentRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO documents (document_id, file_name, file_path, rag_task_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&record.document_id)
        .bind(&record.file_name)
        .bind(&record.file_path)
        .bind(&record.rag_task_id)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<DocumentRecord>, sqlx::Error> {
        let row: Option<(String, String, String, Option<String>, String)> = sqlx::query_as(
            "SELECT document_id, file_name, file_path, rag_task_id, created_at FROM documents WHERE document_id = ?1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(document_id, file_name, file_path, rag_task_id, created_at)| DocumentRecord {
            document_id,
            file_name,
            file_path,
            rag_task_id,
            created_at: parse_rfc3339(&created_at),
        }))
    }
}

impl ImageStore for SqliteStore {
    async fn create_image(&self, record: &ImageRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO images (image_id, user_id, prompt, style, size, task_id, file_path, file_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&record.image_id)
        .bind(&record.user_id)
        .bind(&record.prompt)
        .bind(&record.style)
        .bind(&record.size)
        .bind(&record.task_id)
        .bind(&record.file_path)
        .bind(&record.file_name)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_image_file(&self, image_id: &str, file_path: &str, file_name: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE images SET file_path = ?1, file_name = ?2 WHERE image_id = ?3")
            .bind(file_path)
            .bind(file_name)
            .bind(image_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_image(&self, image_id: &str) -> Result<Option<ImageRecord>, sqlx::Error> {
        let row: Option<(String, String, String, Option<String>, Option<String>, String, Option<String>, Option<String>, String)> =
            sqlx::query_as(
                "SELECT image_id, user_id, prompt, style, size, task_id, file_path, file_name, created_at
                 FROM images WHERE image_id = ?1",
            )
            .bind(image_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(image_id, user_id, prompt, style, size, task_id, file_path, file_name, created_at)| ImageRecord {
            image_id,
            user_id,
            prompt,
            style,
            size,
            task_id,
            file_path,
            file_name,
            created_at: parse_rfc3339(&created_at),
        }))
    }
}

impl MeetingStore for SqliteStore {
    async fn create_meeting(&self, record: &MeetingRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO meetings (meeting_id, file_name, file_path, stt_task_id, transcript, summary, duration_secs, created_at)
             VALUES (?1, ?2, ?3, ?4, NULL, NULL, NULL, ?5)",
        )
        .bind(&record.meeting_id)
        .bind(&record.file_name)
        .bind(&record.file_path)
        .bind(&record.stt_task_id)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_meeting(
        &self,
        meeting_id: &str,
        transcript: &str,
        duration_secs: u64,
        summary: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE meetings SET transcript = ?1, summary = ?2, duration_secs = ?3 WHERE meeting_id = ?4")
            .bind(transcript)
            .bind(summary)
            .bind(duration_secs as i64)
            .bind(meeting_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_meeting(&self, meeting_id: &str) -> Result<Option<MeetingRecord>, sqlx::Error> {
        let row: Option<(String, String, String, String, Option<String>, Option<String>, Option<i64>, String)> =
            sqlx::query_as(
                "SELECT meeting_id, file_name, file_path, stt_task_id, transcript, summary, duration_secs, created_at
                 FROM meetings WHERE meeting_id = ?1",
            )
            .bind(meeting_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(
            |(meeting_id, file_name, file_path, stt_task_id, transcript, summary, duration_secs, created_at)| MeetingRecord {
                meeting_id,
                file_name,
                file_path,
                stt_task_id,
                transcript,
                summary,
                duration_secs,
                created_at: parse_rfc3339(&created_at),
            },
        ))
    }
}

impl VectorStore for SqliteStore {
    async fn insert_vectors(&self, rows: &[VectorRow]) -> Result<usize, sqlx::Error> {
        let mut inserted = 0usize;
        for row in rows {
            let source = row.metadata.get("source").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let embedding_json = serde_json::to_string(&row.embedding).unwrap_or_else(|_| "[]".to_string());
            let metadata_json = serde_json::to_string(&row.metadata).unwrap_or_else(|_| "{}".to_string());
            let result = sqlx::query(
                "INSERT OR IGNORE INTO vectors (source, text, embedding, metadata, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&source)
            .bind(&row.text)
            .bind(&embedding_json)
            .bind(&metadata_json)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        Ok(inserted)
    }

    async fn all_vectors(&self) -> Result<Vec<VectorRow>, sqlx::Error> {
        let rows: Vec<(String, String, String)> = sqlx::query_as("SELECT text, embedding, metadata FROM vectors")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(text, embedding, metadata)| VectorRow {
                text,
                embedding: serde_json::from_str(&embedding).unwrap_or_default(),
                metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::json!({})),
            })
            .collect())
    }
}
