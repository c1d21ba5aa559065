//! Taxonomy store: Functions, Teams, Tools, Capabilities
//!
//! Delete guards are checked here and additionally enforced by the
//! database foreign keys, so a dependent inserted between the check and
//! the delete can only produce a rejected delete.

use catalog_common::db::models::{derives_fallback, Capability, Function, Team, Tool};
use catalog_common::error::is_unique_violation;
use catalog_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

fn map_function(row: &SqliteRow) -> std::result::Result<Function, sqlx::Error> {
    Ok(Function {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_team(row: &SqliteRow) -> std::result::Result<Team, sqlx::Error> {
    Ok(Team {
        id: row.try_get("id")?,
        function_id: row.try_get("function_id")?,
        name: row.try_get("name")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
        function_name: row.try_get("function_name")?,
    })
}

fn map_tool(row: &SqliteRow) -> std::result::Result<Tool, sqlx::Error> {
    Ok(Tool {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        is_fallback: row.try_get("is_fallback")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_capability(row: &SqliteRow) -> std::result::Result<Capability, sqlx::Error> {
    Ok(Capability {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        icon: row.try_get("icon")?,
        is_fallback: row.try_get("is_fallback")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

// ============ Functions ============

pub async fn list_functions(pool: &SqlitePool, active_only: bool) -> Result<Vec<Function>> {
    let sql = if active_only {
        "SELECT * FROM functions WHERE active = 1 ORDER BY name"
    } else {
        "SELECT * FROM functions ORDER BY name"
    };
    let rows = sqlx::query(sql).fetch_all(pool).await?;
    rows.iter().map(|r| map_function(r).map_err(Error::from)).collect()
}

pub async fn get_function(pool: &SqlitePool, id: i64) -> Result<Option<Function>> {
    let row = sqlx::query("SELECT * FROM functions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_function).transpose().map_err(Error::from)
}

pub async fn create_function(pool: &SqlitePool, name: &str) -> Result<Function> {
    let result = sqlx::query("INSERT INTO functions (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateName(format!("Function '{name}' already exists"))
            } else {
                Error::from(e)
            }
        })?;

    get_function(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| Error::Internal("Function vanished after insert".to_string()))
}

pub async fn update_function(pool: &SqlitePool, id: i64, name: &str) -> Result<Function> {
    let result = sqlx::query("UPDATE functions SET name = ? WHERE id = ?")
        .bind(name)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateName(format!("Function '{name}' already exists"))
            } else {
                Error::from(e)
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Function {id}")));
    }
    get_function(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Function {id}")))
}

/// Delete a function; fails when teams or entries still reference it
pub async fn delete_function(pool: &SqlitePool, id: i64) -> Result<()> {
    if get_function(pool, id).await?.is_none() {
        return Err(Error::NotFound(format!("Function {id}")));
    }

    let team_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM teams WHERE function_id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    if team_count > 0 {
        return Err(Error::HasDependents(format!(
            "function has {team_count} team(s)"
        )));
    }

    let entry_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE function_id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    if entry_count > 0 {
        return Err(Error::HasDependents(format!(
            "function has {entry_count} entr(y/ies)"
        )));
    }

    sqlx::query("DELETE FROM functions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn clear_functions(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM functions").execute(pool).await?;
    Ok(())
}

// ============ Teams ============

pub async fn list_teams(
    pool: &SqlitePool,
    function_id: Option<i64>,
    active_only: bool,
) -> Result<Vec<Team>> {
    let mut sql = String::from(
        "SELECT t.*, f.name AS function_name
         FROM teams t
         JOIN functions f ON t.function_id = f.id
         WHERE 1 = 1",
    );
    if active_only {
        sql.push_str(" AND t.active = 1");
    }
    if function_id.is_some() {
        sql.push_str(" AND t.function_id = ?");
    }
    sql.push_str(" ORDER BY f.name, t.name");

    let mut query = sqlx::query(&sql);
    if let Some(fid) = function_id {
        query = query.bind(fid);
    }
    let rows = query.fetch_all(pool).await?;
    rows.iter().map(|r| map_team(r).map_err(Error::from)).collect()
}

pub async fn get_team(pool: &SqlitePool, id: i64) -> Result<Option<Team>> {
    let row = sqlx::query(
        "SELECT t.*, f.name AS function_name
         FROM teams t
         JOIN functions f ON t.function_id = f.id
         WHERE t.id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(map_team).transpose().map_err(Error::from)
}

pub async fn create_team(pool: &SqlitePool, function_id: i64, name: &str) -> Result<Team> {
    if get_function(pool, function_id).await?.is_none() {
        return Err(Error::InvalidReference(format!("Function {function_id}")));
    }

    let result = sqlx::query("INSERT INTO teams (function_id, name) VALUES (?, ?)")
        .bind(function_id)
        .bind(name)
        .execute(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateName(format!("Team '{name}' already exists in this function"))
            } else {
                Error::from(e)
            }
        })?;

    get_team(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| Error::Internal("Team vanished after insert".to_string()))
}

pub async fn update_team(
    pool: &SqlitePool,
    id: i64,
    name: &str,
    function_id: i64,
) -> Result<Team> {
    let existing = get_team(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Team {id}")))?;

    if get_function(pool, function_id).await?.is_none() {
        return Err(Error::InvalidReference(format!("Function {function_id}")));
    }

    // Moving a team to another function would leave its entries pairing
    // the old function with the moved team, so dependents block the move
    if function_id != existing.function_id {
        let entry_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE team_id = ?")
                .bind(id)
                .fetch_one(pool)
                .await?;
        if entry_count > 0 {
            return Err(Error::HasDependents(format!(
                "team has {entry_count} entr(y/ies); reassign them before moving the team"
            )));
        }
    }

    let result = sqlx::query("UPDATE teams SET name = ?, function_id = ? WHERE id = ?")
        .bind(name)
        .bind(function_id)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateName(format!("Team '{name}' already exists in this function"))
            } else {
                Error::from(e)
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Team {id}")));
    }
    get_team(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Team {id}")))
}

/// Delete a team; fails when entries still reference it. The Reassignment
/// Engine is the path for deleting a team that has entries.
pub async fn delete_team(pool: &SqlitePool, id: i64) -> Result<()> {
    if get_team(pool, id).await?.is_none() {
        return Err(Error::NotFound(format!("Team {id}")));
    }

    let entry_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE team_id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    if entry_count > 0 {
        return Err(Error::HasDependents(format!(
            "team has {entry_count} entr(y/ies)"
        )));
    }

    sqlx::query("DELETE FROM teams WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn clear_teams(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM teams").execute(pool).await?;
    Ok(())
}

// ============ Tools ============

pub async fn list_tools(pool: &SqlitePool, active_only: bool) -> Result<Vec<Tool>> {
    let sql = if active_only {
        "SELECT * FROM tools WHERE active = 1 ORDER BY name"
    } else {
        "SELECT * FROM tools ORDER BY name"
    };
    let rows = sqlx::query(sql).fetch_all(pool).await?;
    rows.iter().map(|r| map_tool(r).map_err(Error::from)).collect()
}

pub async fn get_tool(pool: &SqlitePool, id: i64) -> Result<Option<Tool>> {
    let row = sqlx::query("SELECT * FROM tools WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_tool).transpose().map_err(Error::from)
}

pub async fn create_tool(pool: &SqlitePool, name: &str) -> Result<Tool> {
    let result = sqlx::query("INSERT INTO tools (name, is_fallback) VALUES (?, ?)")
        .bind(name)
        .bind(derives_fallback(name))
        .execute(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateName(format!("Tool '{name}' already exists"))
            } else {
                Error::from(e)
            }
        })?;

    get_tool(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| Error::Internal("Tool vanished after insert".to_string()))
}

pub async fn update_tool(pool: &SqlitePool, id: i64, name: &str) -> Result<Tool> {
    // Renames re-derive the fallback flag
    let result = sqlx::query("UPDATE tools SET name = ?, is_fallback = ? WHERE id = ?")
        .bind(name)
        .bind(derives_fallback(name))
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateName(format!("Tool '{name}' already exists"))
            } else {
                Error::from(e)
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Tool {id}")));
    }
    get_tool(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Tool {id}")))
}

/// Delete a tool. Tools have no dependent-reference guard: entries keep
/// dangling ids, which the read paths label as unknown.
pub async fn delete_tool(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM tools WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Tool {id}")));
    }
    Ok(())
}

pub async fn clear_tools(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM tools").execute(pool).await?;
    Ok(())
}

// ============ Capabilities ============

pub async fn list_capabilities(pool: &SqlitePool, active_only: bool) -> Result<Vec<Capability>> {
    let sql = if active_only {
        "SELECT * FROM capabilities WHERE active = 1 ORDER BY name"
    } else {
        "SELECT * FROM capabilities ORDER BY name"
    };
    let rows = sqlx::query(sql).fetch_all(pool).await?;
    rows.iter().map(|r| map_capability(r).map_err(Error::from)).collect()
}

pub async fn get_capability(pool: &SqlitePool, id: i64) -> Result<Option<Capability>> {
    let row = sqlx::query("SELECT * FROM capabilities WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_capability).transpose().map_err(Error::from)
}

pub async fn create_capability(
    pool: &SqlitePool,
    name: &str,
    icon: Option<&str>,
) -> Result<Capability> {
    let result = sqlx::query("INSERT INTO capabilities (name, icon, is_fallback) VALUES (?, ?, ?)")
        .bind(name)
        .bind(icon)
        .bind(derives_fallback(name))
        .execute(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateName(format!("Capability '{name}' already exists"))
            } else {
                Error::from(e)
            }
        })?;

    get_capability(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| Error::Internal("Capability vanished after insert".to_string()))
}

pub async fn update_capability(pool: &SqlitePool, id: i64, name: &str) -> Result<Capability> {
    let result = sqlx::query("UPDATE capabilities SET name = ?, is_fallback = ? WHERE id = ?")
        .bind(name)
        .bind(derives_fallback(name))
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateName(format!("Capability '{name}' already exists"))
            } else {
                Error::from(e)
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Capability {id}")));
    }
    get_capability(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Capability {id}")))
}

/// Delete a capability; fails when entries still reference it
pub async fn delete_capability(pool: &SqlitePool, id: i64) -> Result<()> {
    if get_capability(pool, id).await?.is_none() {
        return Err(Error::NotFound(format!("Capability {id}")));
    }

    let entry_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE capability_id = ?")
            .bind(id)
            .fetch_one(pool)
            .await?;
    if entry_count > 0 {
        return Err(Error::HasDependents(format!(
            "capability has {entry_count} entr(y/ies)"
        )));
    }

    sqlx::query("DELETE FROM capabilities WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn clear_capabilities(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM capabilities").execute(pool).await?;
    Ok(())
}

// ============ Workbook seeding ============

/// Merge a parsed four-sheet workbook into the taxonomy tables:
/// insert-if-absent for every named entity, never delete. Teams under an
/// unknown function name are skipped (the sheet order guarantees their
/// function was inserted first when both sheets are present).
pub async fn clear_and_reload_config(
    pool: &SqlitePool,
    functions: &[String],
    teams: &HashMap<String, Vec<String>>,
    tools: &[String],
    capabilities: &[(String, Option<String>)],
) -> Result<()> {
    for name in functions {
        sqlx::query("INSERT OR IGNORE INTO functions (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await?;
    }

    for (func_name, team_list) in teams {
        let func_id: Option<i64> = sqlx::query_scalar("SELECT id FROM functions WHERE name = ?")
            .bind(func_name)
            .fetch_optional(pool)
            .await?;
        if let Some(func_id) = func_id {
            for team_name in team_list {
                sqlx::query("INSERT OR IGNORE INTO teams (function_id, name) VALUES (?, ?)")
                    .bind(func_id)
                    .bind(team_name)
                    .execute(pool)
                    .await?;
            }
        }
    }

    for name in tools {
        sqlx::query("INSERT OR IGNORE INTO tools (name, is_fallback) VALUES (?, ?)")
            .bind(name)
            .bind(derives_fallback(name))
            .execute(pool)
            .await?;
    }

    for (name, icon) in capabilities {
        sqlx::query("INSERT OR IGNORE INTO capabilities (name, icon, is_fallback) VALUES (?, ?, ?)")
            .bind(name)
            .bind(icon.as_deref())
            .bind(derives_fallback(name))
            .execute(pool)
            .await?;
    }

    Ok(())
}
