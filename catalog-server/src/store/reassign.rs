//! Team reassignment: move a team's entries elsewhere, then delete the team.
//!
//! The migrate-and-delete pair runs inside one transaction so a failure
//! leaves both the entries and the team untouched.

use catalog_common::db::models::Team;
use catalog_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::store::taxonomy;

/// Pre-deletion report: how many entries the team holds and which sibling
/// teams (same function) are available as reassignment targets.
#[derive(Debug, Serialize)]
pub struct TeamEntryInfo {
    pub team: Team,
    pub entry_count: i64,
    pub sibling_teams: Vec<Team>,
}

/// Outcome of a completed move-and-delete
#[derive(Debug, Serialize)]
pub struct ReassignOutcome {
    pub deleted_team: String,
    pub migrated_entries: u64,
    /// Null when the entries were detached to function level
    pub target_team_id: Option<i64>,
}

pub async fn team_entry_info(pool: &SqlitePool, team_id: i64) -> Result<TeamEntryInfo> {
    let team = taxonomy::get_team(pool, team_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Team {team_id}")))?;

    let entry_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE team_id = ?")
        .bind(team_id)
        .fetch_one(pool)
        .await?;

    let sibling_teams = taxonomy::list_teams(pool, Some(team.function_id), false)
        .await?
        .into_iter()
        .filter(|t| t.id != team_id)
        .collect();

    Ok(TeamEntryInfo { team, entry_count, sibling_teams })
}

/// Move every entry off `team_id` (to a sibling team, or to function level
/// when `target` is None) and delete the team, atomically.
pub async fn move_entries_and_delete(
    pool: &SqlitePool,
    team_id: i64,
    target: Option<i64>,
) -> Result<ReassignOutcome> {
    let team = taxonomy::get_team(pool, team_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Team {team_id}")))?;

    if let Some(target_id) = target {
        if target_id == team_id {
            return Err(Error::InvalidInput(
                "Target team must differ from the team being deleted".to_string(),
            ));
        }
        let target_team = taxonomy::get_team(pool, target_id)
            .await?
            .ok_or_else(|| Error::InvalidReference(format!("team_id {target_id}")))?;
        if target_team.function_id != team.function_id {
            return Err(Error::CrossFunctionReassignment);
        }
    }

    let mut tx = pool.begin().await?;

    let migrated = sqlx::query("UPDATE entries SET team_id = ? WHERE team_id = ?")
        .bind(target)
        .bind(team_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM teams WHERE id = ?")
        .bind(team_id)
        .execute(&mut *tx)
        .await?;

    tx.commit()
        .await
        .map_err(|e| Error::PartialMigration(e.to_string()))?;

    info!(
        team = %team.name,
        migrated,
        target = ?target,
        "deleted team after reassigning its entries"
    );

    Ok(ReassignOutcome {
        deleted_team: team.name,
        migrated_entries: migrated,
        target_team_id: target,
    })
}
