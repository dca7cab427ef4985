use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::db::{lock, DbPool, DbService, Folder};
use crate::error::{AppError, Result};

const MAX_FOLDER_NAME_CHARS: usize = 100;

#[derive(Clone)]
pub struct FolderService {
    pool: DbPool,
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_FOLDER_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "Folder name must be between 1 and {MAX_FOLDER_NAME_CHARS} characters"
        )));
    }
    Ok(name)
}

/// Loads a folder and checks that `user_id` owns it.
pub(crate) fn owned_folder(conn: &duckdb::Connection, user_id: Uuid, folder_id: Uuid) -> Result<Folder> {
    let folder = DbService::get_folder(conn, folder_id)?.ok_or_else(|| AppError::not_found("Folder"))?;
    if folder.user_id != user_id {
        return Err(AppError::Forbidden(
            "You don't have permission to access this folder".to_string(),
        ));
    }
    Ok(folder)
}

impl FolderService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create(&self, user_id: Uuid, name: &str) -> Result<Folder> {
        let name = validate_name(name)?;
        let conn = lock(&self.pool)?;

        if DbService::find_folder_by_name(&conn, user_id, name, None)?.is_some() {
            return Err(AppError::Conflict(format!("Folder with name '{name}' already exists")));
        }

        let now = Utc::now();
        let folder = Folder {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        DbService::insert_folder(&conn, &folder)?;

        info!("Created folder {} for user {}", folder.id, user_id);
        Ok(folder)
    }

    pub fn list(&self, user_id: Uuid, skip: i64, limit: i64) -> Result<Vec<Folder>> {
        let conn = lock(&self.pool)?;
        Ok(DbService::list_folders(&conn, user_id, skip, limit)?)
    }

    pub fn get(&self, user_id: Uuid, folder_id: Uuid) -> Result<Folder> {
        let conn = lock(&self.pool)?;
        owned_folder(&conn, user_id, folder_id)
    }

    pub fn rename(&self, user_id: Uuid, folder_id: Uuid, name: &str) -> Result<Folder> {
        let name = validate_name(name)?;
        let conn = lock(&self.pool)?;
        let mut folder = owned_folder(&conn, user_id, folder_id)?;

        if DbService::find_folder_by_name(&conn, user_id, name, Some(folder_id))?.is_some() {
            return Err(AppError::Conflict(format!("Folder with name '{name}' already exists")));
        }

        folder.name = name.to_string();
        folder.updated_at = Utc::now();
        DbService::rename_folder(&conn, folder_id, &folder.name, folder.updated_at)?;
        Ok(folder)
    }

    /// Never cascades: a folder that still holds conversations stays.
    pub fn delete(&self, user_id: Uuid, folder_id: Uuid) -> Result<()> {
        let conn = lock(&self.pool)?;
        owned_folder(&conn, user_id, folder_id)?;

        let count = DbService::count_conversations_in_folder(&conn, folder_id)?;
        if count > 0 {
            return Err(AppError::Conflict(format!(
                "Cannot delete folder with {count} conversation(s). Move or delete conversations first."
            )));
        }

        DbService::delete_folder(&conn, folder_id)?;
        info!("Deleted folder {}", folder_id);
        Ok(())
    }
}
