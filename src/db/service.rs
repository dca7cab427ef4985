use crate::context::ContextMetrics;
use crate::db::models::{
    Conversation, Folder, FolderFilter, Message, SortOrder, StoredApiKeys, User,
};
use crate::llm::models::Provider;
use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{params, types::Type, Connection, Result as DbResult, Row};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, first_name, last_name, created_at";
const FOLDER_COLUMNS: &str = "id, user_id, name, created_at, updated_at";
const CONVERSATION_COLUMNS: &str = "id, user_id, title, provider, model_name, message_count, \
     total_tokens_used, total_context_size, remaining_context_size, total_used_percentage, \
     remaining_percentage, folder_id, version, created_at, updated_at";
const MESSAGE_COLUMNS: &str =
    "id, conversation_id, user_id, role, content, tokens_used, sequence_number, created_at";

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, err: E) -> duckdb::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    duckdb::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn get_uuid(row: &Row, idx: usize) -> DbResult<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn get_opt_uuid(row: &Row, idx: usize) -> DbResult<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn get_timestamp(row: &Row, idx: usize) -> DbResult<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub struct DbService;

impl DbService {
    fn row_to_user(row: &Row) -> DbResult<User> {
        Ok(User {
            id: get_uuid(row, 0)?,
            email: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            created_at: get_timestamp(row, 4)?,
        })
    }

    fn row_to_folder(row: &Row) -> DbResult<Folder> {
        Ok(Folder {
            id: get_uuid(row, 0)?,
            user_id: get_uuid(row, 1)?,
            name: row.get(2)?,
            created_at: get_timestamp(row, 3)?,
            updated_at: get_timestamp(row, 4)?,
        })
    }

    fn row_to_conversation(row: &Row) -> DbResult<Conversation> {
        let provider: String = row.get(3)?;
        Ok(Conversation {
            id: get_uuid(row, 0)?,
            user_id: get_uuid(row, 1)?,
            title: row.get(2)?,
            provider: provider.parse::<Provider>().map_err(|e| conversion_error(3, e))?,
            model_name: row.get(4)?,
            message_count: row.get(5)?,
            total_tokens_used: row.get(6)?,
            metrics: ContextMetrics {
                total_context_size: row.get(7)?,
                remaining_context_size: row.get(8)?,
                total_used_percentage: row.get(9)?,
                remaining_percentage: row.get(10)?,
            },
            folder_id: get_opt_uuid(row, 11)?,
            version: row.get(12)?,
            created_at: get_timestamp(row, 13)?,
            updated_at: get_timestamp(row, 14)?,
        })
    }

    fn row_to_message(row: &Row) -> DbResult<Message> {
        let role: String = row.get(3)?;
        Ok(Message {
            id: get_uuid(row, 0)?,
            conversation_id: get_uuid(row, 1)?,
            user_id: get_uuid(row, 2)?,
            role: role.parse().map_err(|e| conversion_error(3, e))?,
            content: row.get(4)?,
            tokens_used: row.get(5)?,
            sequence_number: row.get(6)?,
            created_at: get_timestamp(row, 7)?,
        })
    }

    fn query_one<T>(
        conn: &Connection,
        sql: &str,
        params: impl duckdb::Params,
        map: fn(&Row) -> DbResult<T>,
    ) -> DbResult<Option<T>> {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query_map(params, map)?;
        rows.next().transpose()
    }

    fn query_many<T>(
        conn: &Connection,
        sql: &str,
        params: impl duckdb::Params,
        map: fn(&Row) -> DbResult<T>,
    ) -> DbResult<Vec<T>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;
        rows.collect()
    }

    fn count(conn: &Connection, sql: &str, params: impl duckdb::Params) -> DbResult<i64> {
        conn.query_row(sql, params, |row| row.get(0))
    }

    // --- Users ---

    pub fn insert_user(conn: &Connection, user: &User, token_digest: &str) -> DbResult<()> {
        conn.execute(
            "INSERT INTO users (id, email, first_name, last_name, token_digest, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                user.id.to_string(),
                user.email,
                user.first_name,
                user.last_name,
                token_digest,
                timestamp(user.created_at)
            ],
        )?;
        Ok(())
    }

    pub fn get_user(conn: &Connection, id: Uuid) -> DbResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        Self::query_one(conn, &sql, params![id.to_string()], Self::row_to_user)
    }

    pub fn find_user_by_email(conn: &Connection, email: &str) -> DbResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower(?)");
        Self::query_one(conn, &sql, params![email], Self::row_to_user)
    }

    pub fn find_user_by_token(conn: &Connection, token_digest: &str) -> DbResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE token_digest = ?");
        Self::query_one(conn, &sql, params![token_digest], Self::row_to_user)
    }

    pub fn get_api_keys(conn: &Connection, user_id: Uuid) -> DbResult<Option<StoredApiKeys>> {
        Self::query_one(
            conn,
            "SELECT openai_api_key, anthropic_api_key, google_api_key FROM users WHERE id = ?",
            params![user_id.to_string()],
            |row| {
                Ok(StoredApiKeys {
                    openai: row.get(0)?,
                    anthropic: row.get(1)?,
                    google: row.get(2)?,
                })
            },
        )
    }

    /// `None` clears the stored key.
    pub fn set_api_key(
        conn: &Connection,
        user_id: Uuid,
        provider: Provider,
        encrypted: Option<&str>,
    ) -> DbResult<usize> {
        let column = match provider {
            Provider::OpenAi => "openai_api_key",
            Provider::Anthropic => "anthropic_api_key",
            Provider::Google => "google_api_key",
        };
        conn.execute(
            &format!("UPDATE users SET {column} = ? WHERE id = ?"),
            params![encrypted, user_id.to_string()],
        )
    }

    // --- Folders ---

    pub fn insert_folder(conn: &Connection, folder: &Folder) -> DbResult<()> {
        conn.execute(
            "INSERT INTO folders (id, user_id, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            params![
                folder.id.to_string(),
                folder.user_id.to_string(),
                folder.name,
                timestamp(folder.created_at),
                timestamp(folder.updated_at)
            ],
        )?;
        Ok(())
    }

    pub fn get_folder(conn: &Connection, id: Uuid) -> DbResult<Option<Folder>> {
        let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?");
        Self::query_one(conn, &sql, params![id.to_string()], Self::row_to_folder)
    }

    pub fn list_folders(conn: &Connection, user_id: Uuid, skip: i64, limit: i64) -> DbResult<Vec<Folder>> {
        let sql = format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE user_id = ?
             ORDER BY created_at DESC, id LIMIT ? OFFSET ?"
        );
        Self::query_many(conn, &sql, params![user_id.to_string(), limit, skip], Self::row_to_folder)
    }

    /// Case-insensitive exact name match among one user's folders.
    pub fn find_folder_by_name(
        conn: &Connection,
        user_id: Uuid,
        name: &str,
        exclude: Option<Uuid>,
    ) -> DbResult<Option<Folder>> {
        let sql = format!(
            "SELECT {FOLDER_COLUMNS} FROM folders
             WHERE user_id = ? AND lower(name) = lower(?) AND id <> ? LIMIT 1"
        );
        let exclude = exclude.map(|id| id.to_string()).unwrap_or_default();
        Self::query_one(conn, &sql, params![user_id.to_string(), name, exclude], Self::row_to_folder)
    }

    pub fn rename_folder(conn: &Connection, id: Uuid, name: &str, at: DateTime<Utc>) -> DbResult<usize> {
        conn.execute(
            "UPDATE folders SET name = ?, updated_at = ? WHERE id = ?",
            params![name, timestamp(at), id.to_string()],
        )
    }

    pub fn delete_folder(conn: &Connection, id: Uuid) -> DbResult<usize> {
        conn.execute("DELETE FROM folders WHERE id = ?", params![id.to_string()])
    }

    pub fn count_conversations_in_folder(conn: &Connection, folder_id: Uuid) -> DbResult<i64> {
        Self::count(
            conn,
            "SELECT COUNT(*) FROM conversations WHERE folder_id = ?",
            params![folder_id.to_string()],
        )
    }

    // --- Conversations ---

    pub fn insert_conversation(conn: &Connection, c: &Conversation) -> DbResult<()> {
        conn.execute(
            &format!(
                "INSERT INTO conversations ({CONVERSATION_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                c.id.to_string(),
                c.user_id.to_string(),
                c.title,
                c.provider.as_str(),
                c.model_name,
                c.message_count,
                c.total_tokens_used,
                c.metrics.total_context_size,
                c.metrics.remaining_context_size,
                c.metrics.total_used_percentage,
                c.metrics.remaining_percentage,
                c.folder_id.map(|id| id.to_string()),
                c.version,
                timestamp(c.created_at),
                timestamp(c.updated_at)
            ],
        )?;
        Ok(())
    }

    pub fn get_conversation(conn: &Connection, id: Uuid) -> DbResult<Option<Conversation>> {
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?");
        Self::query_one(conn, &sql, params![id.to_string()], Self::row_to_conversation)
    }

    pub fn list_conversations(
        conn: &Connection,
        user_id: Uuid,
        folder: FolderFilter,
        skip: i64,
        limit: i64,
    ) -> DbResult<Vec<Conversation>> {
        let base = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_id = ?");
        let order = "ORDER BY updated_at DESC, id LIMIT ? OFFSET ?";
        let user = user_id.to_string();

        match folder {
            FolderFilter::Any => Self::query_many(
                conn,
                &format!("{base} {order}"),
                params![user, limit, skip],
                Self::row_to_conversation,
            ),
            FolderFilter::Unfiled => Self::query_many(
                conn,
                &format!("{base} AND folder_id IS NULL {order}"),
                params![user, limit, skip],
                Self::row_to_conversation,
            ),
            FolderFilter::In(folder_id) => Self::query_many(
                conn,
                &format!("{base} AND folder_id = ? {order}"),
                params![user, folder_id.to_string(), limit, skip],
                Self::row_to_conversation,
            ),
        }
    }

    /// Writes every mutable aggregate field of `c`, guarded by its version.
    ///
    /// Returns `false` when the stored row no longer carries `c.version`;
    /// on success the stored version is `c.version + 1`.
    pub fn update_conversation(conn: &Connection, c: &Conversation) -> DbResult<bool> {
        let updated = conn.execute(
            "UPDATE conversations SET
                title = ?, model_name = ?, message_count = ?, total_tokens_used = ?,
                total_context_size = ?, remaining_context_size = ?,
                total_used_percentage = ?, remaining_percentage = ?,
                folder_id = ?, updated_at = ?, version = version + 1
             WHERE id = ? AND version = ?",
            params![
                c.title,
                c.model_name,
                c.message_count,
                c.total_tokens_used,
                c.metrics.total_context_size,
                c.metrics.remaining_context_size,
                c.metrics.total_used_percentage,
                c.metrics.remaining_percentage,
                c.folder_id.map(|id| id.to_string()),
                timestamp(c.updated_at),
                c.id.to_string(),
                c.version
            ],
        )?;
        Ok(updated == 1)
    }

    pub fn delete_conversation(conn: &Connection, id: Uuid) -> DbResult<usize> {
        conn.execute("DELETE FROM conversations WHERE id = ?", params![id.to_string()])
    }

    // --- Messages ---

    pub fn insert_message(conn: &Connection, m: &Message) -> DbResult<()> {
        conn.execute(
            &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                m.id.to_string(),
                m.conversation_id.to_string(),
                m.user_id.to_string(),
                m.role.as_str(),
                m.content,
                m.tokens_used,
                m.sequence_number,
                timestamp(m.created_at)
            ],
        )?;
        Ok(())
    }

    pub fn get_message(conn: &Connection, id: Uuid) -> DbResult<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?");
        Self::query_one(conn, &sql, params![id.to_string()], Self::row_to_message)
    }

    pub fn list_messages(
        conn: &Connection,
        conversation_id: Uuid,
        order: SortOrder,
        skip: i64,
        limit: i64,
    ) -> DbResult<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?
             ORDER BY sequence_number {} LIMIT ? OFFSET ?",
            order.as_sql()
        );
        Self::query_many(
            conn,
            &sql,
            params![conversation_id.to_string(), limit, skip],
            Self::row_to_message,
        )
    }

    /// Full history in sequence order.
    pub fn conversation_history(conn: &Connection, conversation_id: Uuid) -> DbResult<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?
             ORDER BY sequence_number ASC"
        );
        Self::query_many(conn, &sql, params![conversation_id.to_string()], Self::row_to_message)
    }

    pub fn count_messages(conn: &Connection, conversation_id: Uuid) -> DbResult<i64> {
        Self::count(
            conn,
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?",
            params![conversation_id.to_string()],
        )
    }

    pub fn sum_message_tokens(conn: &Connection, conversation_id: Uuid) -> DbResult<i64> {
        Self::count(
            conn,
            "SELECT CAST(COALESCE(SUM(tokens_used), 0) AS BIGINT) FROM messages WHERE conversation_id = ?",
            params![conversation_id.to_string()],
        )
    }

    pub fn update_message_content(conn: &Connection, id: Uuid, content: &str) -> DbResult<usize> {
        conn.execute(
            "UPDATE messages SET content = ? WHERE id = ?",
            params![content, id.to_string()],
        )
    }

    pub fn delete_message(conn: &Connection, id: Uuid) -> DbResult<usize> {
        conn.execute("DELETE FROM messages WHERE id = ?", params![id.to_string()])
    }

    /// Shifts every message after `removed_sequence` down by one.
    pub fn close_sequence_gap(
        conn: &Connection,
        conversation_id: Uuid,
        removed_sequence: i64,
    ) -> DbResult<usize> {
        conn.execute(
            "UPDATE messages SET sequence_number = sequence_number - 1
             WHERE conversation_id = ? AND sequence_number > ?",
            params![conversation_id.to_string(), removed_sequence],
        )
    }

    pub fn delete_messages_for_conversation(conn: &Connection, conversation_id: Uuid) -> DbResult<usize> {
        conn.execute(
            "DELETE FROM messages WHERE conversation_id = ?",
            params![conversation_id.to_string()],
        )
    }
}
