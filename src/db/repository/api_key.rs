use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::*;

const API_KEY_COLUMNS: &str = "id, description, created_at, expires_at, revoked";

pub fn insert_api_key(conn: &Connection, info: &ApiKeyInfo, key_hash: &[u8; 32]) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO api_keys (id, key_hash, description, created_at, expires_at, revoked)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            info.id,
            &key_hash[..],
            info.description,
            info.created_at,
            info.expires_at,
            info.revoked,
        ],
    )?;
    Ok(())
}

/// Key metadata together with the stored hash.
pub fn get_api_key(conn: &Connection, id: &str) -> Result<Option<(ApiKeyInfo, Vec<u8>)>, DatabaseError> {
    let found = conn
        .query_row(
            &format!("SELECT {API_KEY_COLUMNS}, key_hash FROM api_keys WHERE id = ?1"),
            params![id],
            |row| Ok((api_key_from_row(row)?, row.get::<_, Vec<u8>>(5)?)),
        )
        .optional()?;
    Ok(found)
}

/// Mark a key revoked. Returns false when no such key exists.
pub fn revoke_api_key(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute("UPDATE api_keys SET revoked = 1 WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

pub fn list_api_keys(conn: &Connection) -> Result<Vec<ApiKeyInfo>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {API_KEY_COLUMNS} FROM api_keys ORDER BY created_at, id"
    ))?;
    let keys = stmt
        .query_map([], api_key_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(keys)
}

fn api_key_from_row(row: &Row<'_>) -> Result<ApiKeyInfo, rusqlite::Error> {
    Ok(ApiKeyInfo {
        id: row.get(0)?,
        description: row.get(1)?,
        created_at: row.get(2)?,
        expires_at: row.get(3)?,
        revoked: row.get(4)?,
    })
}
