//! Entry store: CRUD plus flexible partial update
//!
//! Entries are the denormalized core record: foreign keys to the
//! taxonomies, a JSON-serialized tool id list, and four fixed impact
//! slots stored as prefixed column groups but modeled as an array.

use catalog_common::db::init::now_timestamp;
use catalog_common::db::models::{
    impact_slots, Entry, EntryPatch, Impact, MethodType, NewEntry, IMPACT_SLOTS,
};
use catalog_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::warn;

const ENTRY_SELECT: &str = "SELECT e.*,
        f.name AS function_name,
        t.name AS team_name,
        c.name AS capability_name
    FROM entries e
    JOIN functions f ON e.function_id = f.id
    LEFT JOIN teams t ON e.team_id = t.id
    JOIN capabilities c ON e.capability_id = c.id";

const INSERT_ENTRY_SQL: &str = "INSERT INTO entries (
        function_id, team_id, method_type, capability_id, capability_other,
        description, tools_used, other_tools,
        impact1_type, impact1_value, impact1_frequency, impact1_time_unit, impact1_annual_value, impact1_description,
        impact2_type, impact2_value, impact2_frequency, impact2_time_unit, impact2_annual_value, impact2_description,
        impact3_type, impact3_value, impact3_frequency, impact3_time_unit, impact3_annual_value, impact3_description,
        impact4_type, impact4_value, impact4_frequency, impact4_time_unit, impact4_annual_value, impact4_description,
        submitted_by
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

/// Filters for listing entries
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub function_id: Option<i64>,
    pub team_id: Option<i64>,
    pub method_type: Option<MethodType>,
    pub limit: i64,
    pub offset: i64,
}

fn map_entry(row: &SqliteRow) -> std::result::Result<Entry, sqlx::Error> {
    let id: i64 = row.try_get("id")?;

    let tools_raw: String = row.try_get("tools_used")?;
    let tools_used = serde_json::from_str::<Vec<i64>>(&tools_raw).unwrap_or_else(|err| {
        warn!(entry_id = id, error = %err, "failed to parse tools_used, treating as empty");
        Vec::new()
    });

    let other_raw: Option<String> = row.try_get("other_tools")?;
    let other_tools = other_raw
        .as_deref()
        .map(|s| {
            serde_json::from_str::<Vec<String>>(s).unwrap_or_else(|err| {
                warn!(entry_id = id, error = %err, "failed to parse other_tools, treating as empty");
                Vec::new()
            })
        })
        .unwrap_or_default();

    let method_raw: String = row.try_get("method_type")?;
    let method_type = MethodType::parse(&method_raw)
        .ok_or_else(|| sqlx::Error::Decode(format!("invalid method_type: {method_raw}").into()))?;

    let mut impacts: [Impact; IMPACT_SLOTS] = Default::default();
    for (i, slot) in impacts.iter_mut().enumerate() {
        let n = i + 1;
        let type_raw: Option<String> = row.try_get(format!("impact{n}_type").as_str())?;
        let freq_raw: Option<String> = row.try_get(format!("impact{n}_frequency").as_str())?;
        *slot = Impact {
            impact_type: type_raw
                .as_deref()
                .and_then(catalog_common::db::models::ImpactType::parse),
            value: row.try_get(format!("impact{n}_value").as_str())?,
            frequency: freq_raw
                .as_deref()
                .and_then(catalog_common::db::models::Frequency::parse),
            time_unit: row.try_get(format!("impact{n}_time_unit").as_str())?,
            annual_value: row.try_get(format!("impact{n}_annual_value").as_str())?,
            description: row.try_get(format!("impact{n}_description").as_str())?,
        };
    }

    Ok(Entry {
        id,
        function_id: row.try_get("function_id")?,
        team_id: row.try_get("team_id")?,
        method_type,
        capability_id: row.try_get("capability_id")?,
        capability_other: row.try_get("capability_other")?,
        description: row.try_get("description")?,
        tools_used,
        other_tools,
        impacts,
        submitted_by: row.try_get("submitted_by")?,
        submitted_at: row.try_get("submitted_at")?,
        updated_at: row.try_get("updated_at")?,
        function_name: row.try_get("function_name")?,
        team_name: row.try_get("team_name")?,
        capability_name: row.try_get("capability_name")?,
    })
}

pub async fn list_entries(pool: &SqlitePool, filter: &EntryFilter) -> Result<Vec<Entry>> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(ENTRY_SELECT);
    qb.push(" WHERE 1 = 1");
    if let Some(fid) = filter.function_id {
        qb.push(" AND e.function_id = ");
        qb.push_bind(fid);
    }
    if let Some(tid) = filter.team_id {
        qb.push(" AND e.team_id = ");
        qb.push_bind(tid);
    }
    if let Some(mt) = filter.method_type {
        qb.push(" AND e.method_type = ");
        qb.push_bind(mt.as_str());
    }
    qb.push(" ORDER BY e.submitted_at DESC, e.id DESC LIMIT ");
    qb.push_bind(filter.limit);
    qb.push(" OFFSET ");
    qb.push_bind(filter.offset);

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(|r| map_entry(r).map_err(Error::from)).collect()
}

/// Every entry, newest first. Read path for the aggregator and export.
pub async fn all_entries(pool: &SqlitePool) -> Result<Vec<Entry>> {
    let sql = format!("{ENTRY_SELECT} ORDER BY e.submitted_at DESC, e.id DESC");
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(|r| map_entry(r).map_err(Error::from)).collect()
}

pub async fn get_entry(pool: &SqlitePool, id: i64) -> Result<Option<Entry>> {
    let sql = format!("{ENTRY_SELECT} WHERE e.id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    row.as_ref().map(map_entry).transpose().map_err(Error::from)
}

/// Validate that the referenced function/capability exist and that a
/// non-null team belongs to the same function as the entry
async fn validate_references(
    pool: &SqlitePool,
    function_id: i64,
    team_id: Option<i64>,
    capability_id: i64,
) -> Result<()> {
    let function_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM functions WHERE id = ?")
        .bind(function_id)
        .fetch_optional(pool)
        .await?;
    if function_exists.is_none() {
        return Err(Error::InvalidReference(format!("function_id {function_id}")));
    }

    if let Some(team_id) = team_id {
        let team_function: Option<i64> =
            sqlx::query_scalar("SELECT function_id FROM teams WHERE id = ?")
                .bind(team_id)
                .fetch_optional(pool)
                .await?;
        match team_function {
            None => return Err(Error::InvalidReference(format!("team_id {team_id}"))),
            Some(owner) if owner != function_id => {
                return Err(Error::InvalidReference(format!(
                    "team_id {team_id} belongs to function {owner}, not {function_id}"
                )));
            }
            Some(_) => {}
        }
    }

    let capability_exists: Option<i64> =
        sqlx::query_scalar("SELECT id FROM capabilities WHERE id = ?")
            .bind(capability_id)
            .fetch_optional(pool)
            .await?;
    if capability_exists.is_none() {
        return Err(Error::InvalidReference(format!("capability_id {capability_id}")));
    }

    Ok(())
}

pub async fn create_entry(pool: &SqlitePool, new: &NewEntry) -> Result<Entry> {
    validate_references(pool, new.function_id, new.team_id, new.capability_id).await?;

    let slots = impact_slots(new.impacts.clone())?;
    let tools_json = serde_json::to_string(&new.tools_used)
        .map_err(|e| Error::Internal(format!("tools_used encode: {e}")))?;
    let other_json = if new.other_tools.is_empty() {
        None
    } else {
        Some(
            serde_json::to_string(&new.other_tools)
                .map_err(|e| Error::Internal(format!("other_tools encode: {e}")))?,
        )
    };

    let mut query = sqlx::query(INSERT_ENTRY_SQL)
        .bind(new.function_id)
        .bind(new.team_id)
        .bind(new.method_type.as_str())
        .bind(new.capability_id)
        .bind(new.capability_other.as_deref())
        .bind(&new.description)
        .bind(&tools_json)
        .bind(other_json.as_deref());
    for slot in &slots {
        query = query
            .bind(slot.impact_type.map(|t| t.as_str()))
            .bind(slot.value)
            // quarterly is model-level only, never stored
            .bind(slot.frequency.filter(|f| f.storable()).map(|f| f.as_str()))
            .bind(slot.time_unit.as_deref())
            .bind(slot.annual_value)
            .bind(slot.description.as_deref());
    }
    query = query.bind(new.submitted_by.as_deref());

    let result = query.execute(pool).await?;
    get_entry(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| Error::Internal("Entry vanished after insert".to_string()))
}

/// Apply a partial update. Only fields present in the patch change;
/// `updated_at` is always refreshed, even for an empty patch.
pub async fn update_entry(pool: &SqlitePool, id: i64, patch: &EntryPatch) -> Result<Entry> {
    let existing = get_entry(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Entry {id}")))?;

    // Validate the merged result, not just the changed fields, so the
    // team/function pairing invariant holds after any combination of edits
    let final_function = patch.function_id.unwrap_or(existing.function_id);
    let final_team = match patch.team_id {
        Some(team) => team,
        None => existing.team_id,
    };
    let final_capability = patch.capability_id.unwrap_or(existing.capability_id);
    validate_references(pool, final_function, final_team, final_capability).await?;

    let slots = patch.impacts.clone().map(impact_slots).transpose()?;
    let tools_json = patch
        .tools_used
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("tools_used encode: {e}")))?;
    let other_json = match &patch.other_tools {
        None => None,
        Some(None) => Some(None),
        Some(Some(names)) if names.is_empty() => Some(None),
        Some(Some(names)) => Some(Some(
            serde_json::to_string(names)
                .map_err(|e| Error::Internal(format!("other_tools encode: {e}")))?,
        )),
    };

    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE entries SET ");
    let mut sep = qb.separated(", ");

    if let Some(v) = patch.function_id {
        sep.push("function_id = ");
        sep.push_bind_unseparated(v);
    }
    if let Some(v) = patch.team_id {
        sep.push("team_id = ");
        sep.push_bind_unseparated(v);
    }
    if let Some(v) = patch.method_type {
        sep.push("method_type = ");
        sep.push_bind_unseparated(v.as_str());
    }
    if let Some(v) = patch.capability_id {
        sep.push("capability_id = ");
        sep.push_bind_unseparated(v);
    }
    if let Some(v) = &patch.capability_other {
        sep.push("capability_other = ");
        sep.push_bind_unseparated(v.clone());
    }
    if let Some(v) = &patch.description {
        sep.push("description = ");
        sep.push_bind_unseparated(v.clone());
    }
    if let Some(v) = &tools_json {
        sep.push("tools_used = ");
        sep.push_bind_unseparated(v.clone());
    }
    if let Some(v) = &other_json {
        sep.push("other_tools = ");
        sep.push_bind_unseparated(v.clone());
    }
    if let Some(slots) = &slots {
        for (i, slot) in slots.iter().enumerate() {
            let n = i + 1;
            sep.push(format!("impact{n}_type = "));
            sep.push_bind_unseparated(slot.impact_type.map(|t| t.as_str()));
            sep.push(format!("impact{n}_value = "));
            sep.push_bind_unseparated(slot.value);
            sep.push(format!("impact{n}_frequency = "));
            sep.push_bind_unseparated(slot.frequency.filter(|f| f.storable()).map(|f| f.as_str()));
            sep.push(format!("impact{n}_time_unit = "));
            sep.push_bind_unseparated(slot.time_unit.clone());
            sep.push(format!("impact{n}_annual_value = "));
            sep.push_bind_unseparated(slot.annual_value);
            sep.push(format!("impact{n}_description = "));
            sep.push_bind_unseparated(slot.description.clone());
        }
    }
    if let Some(v) = &patch.submitted_by {
        sep.push("submitted_by = ");
        sep.push_bind_unseparated(v.clone());
    }

    sep.push("updated_at = ");
    sep.push_bind_unseparated(now_timestamp());

    qb.push(" WHERE id = ");
    qb.push_bind(id);
    qb.build().execute(pool).await?;

    get_entry(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Entry {id}")))
}

pub async fn delete_entry(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM entries WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Entry {id}")));
    }
    Ok(())
}

/// Remove every entry (replace-mode import)
pub async fn clear_entries(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM entries").execute(pool).await?;
    Ok(result.rows_affected())
}
