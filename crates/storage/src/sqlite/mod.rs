use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

use snafu::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Connection, FromRow, SqliteConnection};

use super::error::{
    CreateSqliteDirectorySnafu, InvalidRoleSnafu, InvariantViolationSnafu, NotFoundSnafu,
    SqliteConnectOptionsSnafu, SqliteConnectSnafu, SqliteMigrateSnafu, SqlitePragmaSnafu,
    SqliteQuerySnafu, SqliteRuntimeInitSnafu, SqliteThreadSpawnSnafu, StorageResult,
};
use super::ids::{ConversationId, MessageId};
use super::types::{
    ConversationRecord, DEFAULT_CONVERSATION_TITLE, MessageRecord, MessageRole, NewConversation,
    NewMessage,
};
use super::{ConversationStore, MessageStore, PreferenceStore};

#[derive(Debug, Clone)]
pub struct SqliteStorage {
    database_url: String,
}

impl SqliteStorage {
    pub async fn open(database_location: &str) -> StorageResult<Self> {
        ensure_database_directory(database_location)?;

        let database_url = normalize_database_url(database_location);
        let connect_options = SqliteConnectOptions::from_str(&database_url)
            .context(SqliteConnectOptionsSnafu {
                stage: "sqlite-open-parse-url",
                database_url: database_url.clone(),
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5_000));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .context(SqliteConnectSnafu {
                stage: "sqlite-open-connect",
                database_url: database_url.clone(),
            })?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context(SqliteMigrateSnafu {
                stage: "sqlite-open-migrate",
            })?;
        // Store calls open their own connection on a worker runtime.
        pool.close().await;

        tracing::debug!(%database_url, "opened sqlite message store");
        Ok(Self { database_url })
    }

    fn run_db_call<T, F>(&self, stage: &'static str, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: Future<Output = StorageResult<T>> + Send + 'static,
    {
        // Store traits are sync, so each call executes on a dedicated worker thread
        // with its own current-thread runtime to avoid nested-runtime blocking panics.
        let worker = std::thread::Builder::new()
            .name(format!("sqlite-store-{stage}"))
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context(SqliteRuntimeInitSnafu {
                        stage: "sqlite-store-runtime-build",
                    })?;
                runtime.block_on(op)
            })
            .context(SqliteThreadSpawnSnafu {
                stage: "sqlite-store-spawn-worker",
            })?;

        match worker.join() {
            Ok(result) => result,
            Err(_) => InvariantViolationSnafu {
                stage,
                details: "sqlite storage worker thread panicked".to_string(),
            }
            .fail(),
        }
    }
}

impl ConversationStore for SqliteStorage {
    fn create_conversation(&self, input: NewConversation) -> StorageResult<ConversationRecord> {
        let database_url = self.database_url.clone();
        self.run_db_call("conversation-create", async move {
            let mut connection =
                connect_store_connection(&database_url, "conversation-create-connect").await?;
            let conversation_id = ConversationId::new_v7();
            let title = if input.title.trim().is_empty() {
                DEFAULT_CONVERSATION_TITLE.to_string()
            } else {
                input.title.trim().to_string()
            };
            let now = unix_timestamp_seconds();

            sqlx::query("INSERT INTO conversations (id, title, created_at) VALUES (?, ?, ?)")
                .bind(conversation_id.to_string())
                .bind(title.clone())
                .bind(now)
                .execute(&mut connection)
                .await
                .context(SqliteQuerySnafu {
                    stage: "conversation-create-insert",
                })?;

            Ok(ConversationRecord {
                id: conversation_id,
                title,
                created_at_unix_seconds: i64_to_u64(now, "conversation-create-created-at")?,
            })
        })
    }

    fn get_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> StorageResult<Option<ConversationRecord>> {
        let database_url = self.database_url.clone();
        self.run_db_call("conversation-get", async move {
            let mut connection =
                connect_store_connection(&database_url, "conversation-get-connect").await?;
            let row = sqlx::query_as::<_, ConversationRow>(
                "SELECT id, title, created_at FROM conversations WHERE id = ?",
            )
            .bind(conversation_id.to_string())
            .fetch_optional(&mut connection)
            .await
            .context(SqliteQuerySnafu {
                stage: "conversation-get-query",
            })?;

            row.map(conversation_row_to_record).transpose()
        })
    }
}

impl MessageStore for SqliteStorage {
    fn append_message(
        &self,
        conversation_id: ConversationId,
        input: NewMessage,
    ) -> StorageResult<MessageRecord> {
        let database_url = self.database_url.clone();
        self.run_db_call("message-append", async move {
            let mut connection =
                connect_store_connection(&database_url, "message-append-connect").await?;
            let mut tx = connection.begin().await.context(SqliteQuerySnafu {
                stage: "message-append-begin",
            })?;

            let conversation_exists = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM conversations WHERE id = ?",
            )
            .bind(conversation_id.to_string())
            .fetch_one(&mut *tx)
            .await
            .context(SqliteQuerySnafu {
                stage: "message-append-load-conversation",
            })?;
            if conversation_exists == 0 {
                return NotFoundSnafu {
                    stage: "message-append-missing-conversation",
                    entity: "conversation",
                    id: conversation_id.to_string(),
                }
                .fail();
            }

            if let Some(parent_id) = input.parent_id {
                let parent_exists = sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM messages WHERE conversation_id = ? AND id = ?",
                )
                .bind(conversation_id.to_string())
                .bind(parent_id.to_string())
                .fetch_one(&mut *tx)
                .await
                .context(SqliteQuerySnafu {
                    stage: "message-append-load-parent",
                })?;
                if parent_exists == 0 {
                    return NotFoundSnafu {
                        stage: "message-append-missing-parent",
                        entity: "message",
                        id: parent_id.to_string(),
                    }
                    .fail();
                }
            }

            let next_seq = sqlx::query_scalar::<_, i64>(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?",
            )
            .bind(conversation_id.to_string())
            .fetch_one(&mut *tx)
            .await
            .context(SqliteQuerySnafu {
                stage: "message-append-next-seq",
            })?;

            let message_id = MessageId::new_v7();
            let now = unix_timestamp_seconds();
            sqlx::query(
                "INSERT INTO messages (id, conversation_id, parent_id, seq, role, content, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(message_id.to_string())
            .bind(conversation_id.to_string())
            .bind(input.parent_id.map(|parent_id| parent_id.to_string()))
            .bind(next_seq)
            .bind(input.role.as_str())
            .bind(input.content.clone())
            .bind(now)
            .execute(&mut *tx)
            .await
            .context(SqliteQuerySnafu {
                stage: "message-append-insert",
            })?;

            tx.commit().await.context(SqliteQuerySnafu {
                stage: "message-append-commit",
            })?;

            Ok(MessageRecord {
                id: message_id,
                conversation_id,
                parent_id: input.parent_id,
                seq: i64_to_u64(next_seq, "message-append-seq")?,
                role: input.role,
                content: input.content,
                created_at_unix_seconds: i64_to_u64(now, "message-append-created-at")?,
            })
        })
    }

    fn list_messages(&self, conversation_id: ConversationId) -> StorageResult<Vec<MessageRecord>> {
        let database_url = self.database_url.clone();
        self.run_db_call("message-list", async move {
            let mut connection =
                connect_store_connection(&database_url, "message-list-connect").await?;
            let rows = sqlx::query_as::<_, MessageRow>(
                "SELECT id, conversation_id, parent_id, seq, role, content, created_at FROM messages WHERE conversation_id = ? ORDER BY seq ASC",
            )
            .bind(conversation_id.to_string())
            .fetch_all(&mut connection)
            .await
            .context(SqliteQuerySnafu {
                stage: "message-list-query",
            })?;

            rows.into_iter().map(message_row_to_record).collect()
        })
    }

    fn delete_subtree(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> StorageResult<u64> {
        let database_url = self.database_url.clone();
        self.run_db_call("message-delete-subtree", async move {
            let mut connection =
                connect_store_connection(&database_url, "message-delete-subtree-connect").await?;
            // Same closure rule the client mirrors: the id plus everything parented under it.
            let result = sqlx::query(
                "WITH RECURSIVE subtree(id) AS (
                    SELECT id FROM messages WHERE conversation_id = ? AND id = ?
                    UNION
                    SELECT child.id FROM messages AS child
                    JOIN subtree ON child.parent_id = subtree.id
                    WHERE child.conversation_id = ?
                )
                DELETE FROM messages WHERE id IN (SELECT id FROM subtree)",
            )
            .bind(conversation_id.to_string())
            .bind(message_id.to_string())
            .bind(conversation_id.to_string())
            .execute(&mut connection)
            .await
            .context(SqliteQuerySnafu {
                stage: "message-delete-subtree-apply",
            })?;

            tracing::debug!(
                %conversation_id,
                %message_id,
                removed = result.rows_affected(),
                "deleted message subtree"
            );
            Ok(result.rows_affected())
        })
    }
}

impl PreferenceStore for SqliteStorage {
    fn get_preference(&self, key: &str) -> StorageResult<Option<String>> {
        let database_url = self.database_url.clone();
        let key = key.to_string();
        self.run_db_call("preference-get", async move {
            let mut connection =
                connect_store_connection(&database_url, "preference-get-connect").await?;
            sqlx::query_scalar::<_, String>("SELECT value FROM preferences WHERE key = ?")
                .bind(key)
                .fetch_optional(&mut connection)
                .await
                .context(SqliteQuerySnafu {
                    stage: "preference-get-query",
                })
        })
    }

    fn set_preference(&self, key: &str, value: &str) -> StorageResult<()> {
        let database_url = self.database_url.clone();
        let key = key.to_string();
        let value = value.to_string();
        self.run_db_call("preference-set", async move {
            let mut connection =
                connect_store_connection(&database_url, "preference-set-connect").await?;
            sqlx::query(
                "INSERT INTO preferences (key, value, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(value)
            .bind(unix_timestamp_seconds())
            .execute(&mut connection)
            .await
            .context(SqliteQuerySnafu {
                stage: "preference-set-upsert",
            })?;

            Ok(())
        })
    }
}

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: String,
    title: String,
    created_at: i64,
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    parent_id: Option<String>,
    seq: i64,
    role: String,
    content: String,
    created_at: i64,
}

fn conversation_row_to_record(row: ConversationRow) -> StorageResult<ConversationRecord> {
    Ok(ConversationRecord {
        id: ConversationId::parse(&row.id)?,
        title: row.title,
        created_at_unix_seconds: i64_to_u64(row.created_at, "conversation-row-created-at")?,
    })
}

fn message_row_to_record(row: MessageRow) -> StorageResult<MessageRecord> {
    Ok(MessageRecord {
        id: MessageId::parse(&row.id)?,
        conversation_id: ConversationId::parse(&row.conversation_id)?,
        parent_id: row
            .parent_id
            .as_deref()
            .map(MessageId::parse)
            .transpose()?,
        seq: i64_to_u64(row.seq, "message-row-seq")?,
        role: role_from_sql(&row.role)?,
        content: row.content,
        created_at_unix_seconds: i64_to_u64(row.created_at, "message-row-created-at")?,
    })
}

async fn connect_store_connection(
    database_url: &str,
    stage: &'static str,
) -> StorageResult<SqliteConnection> {
    let mut connection =
        SqliteConnection::connect(database_url)
            .await
            .context(SqliteConnectSnafu {
                stage,
                database_url: database_url.to_string(),
            })?;

    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(&mut connection)
        .await
        .context(SqlitePragmaSnafu {
            stage: "sqlite-store-pragma-foreign-keys",
            pragma: "foreign_keys",
        })?;
    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(&mut connection)
        .await
        .context(SqlitePragmaSnafu {
            stage: "sqlite-store-pragma-busy-timeout",
            pragma: "busy_timeout",
        })?;

    Ok(connection)
}

fn role_from_sql(raw: &str) -> StorageResult<MessageRole> {
    match raw {
        "user" => Ok(MessageRole::User),
        "assistant" => Ok(MessageRole::Assistant),
        _ => InvalidRoleSnafu {
            stage: "message-row-role",
            raw: raw.to_string(),
        }
        .fail(),
    }
}

fn unix_timestamp_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0_i64, |duration| duration.as_secs() as i64)
}

fn i64_to_u64(value: i64, stage: &'static str) -> StorageResult<u64> {
    value
        .try_into()
        .map_err(|_| super::error::StorageError::InvariantViolation {
            stage,
            details: format!("negative sqlite integer '{value}' cannot map to u64"),
        })
}

fn ensure_database_directory(database_location: &str) -> StorageResult<()> {
    if database_location.starts_with("sqlite:") || database_location == ":memory:" {
        return Ok(());
    }

    let path = Path::new(database_location);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateSqliteDirectorySnafu {
            stage: "sqlite-open-create-directory",
            path: parent.display().to_string(),
        })?;
    }

    Ok(())
}

fn normalize_database_url(database_location: &str) -> String {
    if database_location.starts_with("sqlite:") {
        return database_location.to_string();
    }

    if database_location == ":memory:" {
        return "sqlite::memory:".to_string();
    }

    format!("sqlite://{database_location}")
}
