use std::path::Path;

use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::conversation_repository::{
    BoxFuture, ConversationRepository, ConversationRow, MessageRow,
};
use super::error::RepositoryResult;

/// Migrations applied in order. Each entry is (version, sql).
/// Never edit or remove existing entries; existing databases depend on them.
const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS conversations (
        id          TEXT    PRIMARY KEY,
        user_id     TEXT    NOT NULL,
        title       TEXT    NOT NULL DEFAULT '',
        persona_id  TEXT,
        folder_id   TEXT,
        updated_at  INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_conversations_user_updated
        ON conversations (user_id, updated_at DESC);
    CREATE TABLE IF NOT EXISTS messages (
        id              TEXT    PRIMARY KEY,
        conversation_id TEXT    NOT NULL,
        role            TEXT    NOT NULL,
        content         TEXT    NOT NULL DEFAULT '',
        created_at      INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_messages_conversation_created
        ON messages (conversation_id, created_at ASC);",
)];

/// SQLite-backed conversation store.
///
/// Uses WAL journal mode for concurrent reads during background saves.
/// `SqlitePool` is internally reference-counted and cheap to clone.
#[derive(Clone)]
pub struct SqliteConversationRepository {
    pool: SqlitePool,
}

impl SqliteConversationRepository {
    /// Open (or create) the database file at `path`.
    pub async fn open(path: &Path) -> RepositoryResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        info!(path = %path.display(), "Opened SQLite conversation database");

        Ok(Self { pool })
    }

    /// Private in-memory database, mostly for tests.
    pub async fn in_memory() -> RepositoryResult<Self> {
        // A single connection keeps every query on the same memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Create the schema_version table if absent, then apply any pending migrations.
    async fn run_migrations(pool: &SqlitePool) -> RepositoryResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query("INSERT INTO schema_version (version) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM schema_version)")
            .execute(pool)
            .await?;

        let current: i64 = sqlx::query_scalar("SELECT version FROM schema_version")
            .fetch_one(pool)
            .await?;

        for (version, sql) in MIGRATIONS {
            if *version > current {
                info!(version, "Applying schema migration");
                // sqlx runs one statement per query call.
                for statement in sql.split(';') {
                    let trimmed = statement.trim();
                    if !trimmed.is_empty() {
                        sqlx::query(trimmed).execute(pool).await?;
                    }
                }
                sqlx::query("UPDATE schema_version SET version = ?")
                    .bind(version)
                    .execute(pool)
                    .await?;
            }
        }

        Ok(())
    }
}

impl ConversationRepository for SqliteConversationRepository {
    fn list_conversations(
        &self,
        user_id: &str,
    ) -> BoxFuture<'static, RepositoryResult<Vec<ConversationRow>>> {
        let pool = self.pool.clone();
        let user_id = user_id.to_string();
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, user_id, title, persona_id, folder_id, updated_at
                 FROM conversations
                 WHERE user_id = ?
                 ORDER BY updated_at DESC",
            )
            .bind(&user_id)
            .fetch_all(&pool)
            .await?;

            Ok(rows
                .iter()
                .map(|r| ConversationRow {
                    id: r.get("id"),
                    user_id: r.get("user_id"),
                    title: r.get("title"),
                    persona_id: r.get("persona_id"),
                    folder_id: r.get("folder_id"),
                    updated_at: r.get("updated_at"),
                })
                .collect())
        })
    }

    fn list_messages(
        &self,
        conversation_id: &str,
    ) -> BoxFuture<'static, RepositoryResult<Vec<MessageRow>>> {
        let pool = self.pool.clone();
        let conversation_id = conversation_id.to_string();
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, conversation_id, role, content, created_at
                 FROM messages
                 WHERE conversation_id = ?
                 ORDER BY created_at ASC, rowid ASC",
            )
            .bind(&conversation_id)
            .fetch_all(&pool)
            .await?;

            Ok(rows
                .iter()
                .map(|r| MessageRow {
                    id: r.get("id"),
                    conversation_id: r.get("conversation_id"),
                    role: r.get("role"),
                    content: r.get("content"),
                    created_at: r.get("created_at"),
                })
                .collect())
        })
    }

    fn upsert_conversation(&self, row: ConversationRow) -> BoxFuture<'static, RepositoryResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO conversations (id, user_id, title, persona_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    user_id    = excluded.user_id,
                    title      = excluded.title,
                    persona_id = excluded.persona_id,
                    updated_at = excluded.updated_at",
            )
            .bind(&row.id)
            .bind(&row.user_id)
            .bind(&row.title)
            .bind(&row.persona_id)
            .bind(row.updated_at)
            .execute(&pool)
            .await?;

            Ok(())
        })
    }

    fn upsert_messages(&self, rows: Vec<MessageRow>) -> BoxFuture<'static, RepositoryResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let mut tx = pool.begin().await?;
            for row in &rows {
                sqlx::query(
                    "INSERT INTO messages (id, conversation_id, role, content, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                        conversation_id = excluded.conversation_id,
                        role            = excluded.role,
                        content         = excluded.content,
                        created_at      = excluded.created_at",
                )
                .bind(&row.id)
                .bind(&row.conversation_id)
                .bind(&row.role)
                .bind(&row.content)
                .bind(row.created_at)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(())
        })
    }
}
