//! Export entries and taxonomies as CSV or JSON.
//!
//! Exports are self-describing: every foreign key renders as its
//! human-readable name. Tool ids resolve to names with the same
//! fallback substitution the dashboard uses; an id with no matching
//! row renders as `Unknown(id)`.

use std::collections::HashMap;

use catalog_common::db::models::{Entry, Impact, Tool};
use catalog_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::store::taxonomy;

pub const ENTRY_CSV_HEADERS: [&str; 35] = [
    "function",
    "team",
    "method_type",
    "capability",
    "capability_other",
    "description",
    "tools_used",
    "other_tools",
    "impact1_type",
    "impact1_value",
    "impact1_frequency",
    "impact1_time_unit",
    "impact1_annual_value",
    "impact1_description",
    "impact2_type",
    "impact2_value",
    "impact2_frequency",
    "impact2_time_unit",
    "impact2_annual_value",
    "impact2_description",
    "impact3_type",
    "impact3_value",
    "impact3_frequency",
    "impact3_time_unit",
    "impact3_annual_value",
    "impact3_description",
    "impact4_type",
    "impact4_value",
    "impact4_frequency",
    "impact4_time_unit",
    "impact4_annual_value",
    "impact4_description",
    "submitted_by",
    "submitted_at",
    "updated_at",
];

/// Which taxonomy a config export/import targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxonomyKind {
    Functions,
    Teams,
    Tools,
    Capabilities,
}

impl TaxonomyKind {
    pub fn parse(s: &str) -> Option<TaxonomyKind> {
        match s {
            "functions" => Some(TaxonomyKind::Functions),
            "teams" => Some(TaxonomyKind::Teams),
            "tools" => Some(TaxonomyKind::Tools),
            "capabilities" => Some(TaxonomyKind::Capabilities),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonomyKind::Functions => "functions",
            TaxonomyKind::Teams => "teams",
            TaxonomyKind::Tools => "tools",
            TaxonomyKind::Capabilities => "capabilities",
        }
    }
}

/// Resolve an entry's tool ids to display names. A fallback tool is
/// replaced by the entry's free-text names (or keeps its own name when
/// there are none); a missing id renders as `Unknown(id)`.
pub fn resolved_tool_names(entry: &Entry, tools_by_id: &HashMap<i64, &Tool>) -> Vec<String> {
    let mut names = Vec::new();
    for id in &entry.tools_used {
        match tools_by_id.get(id) {
            Some(tool) if tool.is_fallback => {
                if entry.other_tools.is_empty() {
                    names.push(tool.name.clone());
                } else {
                    names.extend(entry.other_tools.iter().cloned());
                }
            }
            Some(tool) => names.push(tool.name.clone()),
            None => names.push(format!("Unknown({id})")),
        }
    }
    names
}

fn opt_f64(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn impact_fields(slot: &Impact) -> [String; 6] {
    [
        slot.impact_type.map(|t| t.as_str().to_string()).unwrap_or_default(),
        opt_f64(slot.value),
        slot.frequency.map(|f| f.as_str().to_string()).unwrap_or_default(),
        slot.time_unit.clone().unwrap_or_default(),
        opt_f64(slot.annual_value),
        slot.description.clone().unwrap_or_default(),
    ]
}

pub fn entries_to_csv(entries: &[Entry], tools: &[Tool]) -> Result<String> {
    let tools_by_id: HashMap<i64, &Tool> = tools.iter().map(|t| (t.id, t)).collect();
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(ENTRY_CSV_HEADERS)
        .map_err(|e| Error::Internal(format!("CSV write: {e}")))?;

    for entry in entries {
        let mut record: Vec<String> = vec![
            entry.function_name.clone(),
            entry.team_name.clone().unwrap_or_default(),
            entry.method_type.to_string(),
            entry.capability_name.clone(),
            entry.capability_other.clone().unwrap_or_default(),
            entry.description.clone(),
            resolved_tool_names(entry, &tools_by_id).join(", "),
            entry.other_tools.join(", "),
        ];
        for slot in &entry.impacts {
            record.extend(impact_fields(slot));
        }
        record.push(entry.submitted_by.clone().unwrap_or_default());
        record.push(entry.submitted_at.clone());
        record.push(entry.updated_at.clone());

        writer
            .write_record(&record)
            .map_err(|e| Error::Internal(format!("CSV write: {e}")))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Internal(format!("CSV flush: {e}")))?;
    String::from_utf8(bytes).map_err(|e| Error::Internal(format!("CSV encoding: {e}")))
}

#[derive(Debug, Serialize)]
struct EntryExportRow {
    function: String,
    team: Option<String>,
    method_type: String,
    capability: String,
    capability_other: Option<String>,
    description: String,
    tools_used: Vec<String>,
    other_tools: Vec<String>,
    /// Populated slots only
    impacts: Vec<Impact>,
    submitted_by: Option<String>,
    submitted_at: String,
    updated_at: String,
}

pub fn entries_to_json(entries: &[Entry], tools: &[Tool]) -> Result<String> {
    let tools_by_id: HashMap<i64, &Tool> = tools.iter().map(|t| (t.id, t)).collect();
    let rows: Vec<EntryExportRow> = entries
        .iter()
        .map(|entry| EntryExportRow {
            function: entry.function_name.clone(),
            team: entry.team_name.clone(),
            method_type: entry.method_type.to_string(),
            capability: entry.capability_name.clone(),
            capability_other: entry.capability_other.clone(),
            description: entry.description.clone(),
            tools_used: resolved_tool_names(entry, &tools_by_id),
            other_tools: entry.other_tools.clone(),
            impacts: entry.impacts.iter().filter(|i| !i.is_empty()).cloned().collect(),
            submitted_by: entry.submitted_by.clone(),
            submitted_at: entry.submitted_at.clone(),
            updated_at: entry.updated_at.clone(),
        })
        .collect();
    serde_json::to_string_pretty(&rows).map_err(|e| Error::Internal(format!("JSON encode: {e}")))
}

/// Taxonomy rows as `name` CSV (teams as `function,team`)
pub async fn taxonomy_to_csv(pool: &SqlitePool, kind: TaxonomyKind) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let write_err = |e: csv::Error| Error::Internal(format!("CSV write: {e}"));

    match kind {
        TaxonomyKind::Teams => {
            writer.write_record(["function", "team"]).map_err(write_err)?;
            for team in taxonomy::list_teams(pool, None, false).await? {
                writer
                    .write_record([team.function_name.clone().unwrap_or_default(), team.name])
                    .map_err(write_err)?;
            }
        }
        TaxonomyKind::Functions => {
            writer.write_record(["name"]).map_err(write_err)?;
            for f in taxonomy::list_functions(pool, false).await? {
                writer.write_record([f.name]).map_err(write_err)?;
            }
        }
        TaxonomyKind::Tools => {
            writer.write_record(["name"]).map_err(write_err)?;
            for t in taxonomy::list_tools(pool, false).await? {
                writer.write_record([t.name]).map_err(write_err)?;
            }
        }
        TaxonomyKind::Capabilities => {
            writer.write_record(["name"]).map_err(write_err)?;
            for c in taxonomy::list_capabilities(pool, false).await? {
                writer.write_record([c.name]).map_err(write_err)?;
            }
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Internal(format!("CSV flush: {e}")))?;
    String::from_utf8(bytes).map_err(|e| Error::Internal(format!("CSV encoding: {e}")))
}

pub async fn taxonomy_to_json(pool: &SqlitePool, kind: TaxonomyKind) -> Result<String> {
    let encode = |v: serde_json::Value| {
        serde_json::to_string_pretty(&v).map_err(|e| Error::Internal(format!("JSON encode: {e}")))
    };

    match kind {
        TaxonomyKind::Teams => {
            let rows: Vec<serde_json::Value> = taxonomy::list_teams(pool, None, false)
                .await?
                .into_iter()
                .map(|t| {
                    serde_json::json!({
                        "function": t.function_name.unwrap_or_default(),
                        "team": t.name,
                    })
                })
                .collect();
            encode(serde_json::Value::Array(rows))
        }
        TaxonomyKind::Functions => {
            let rows: Vec<serde_json::Value> = taxonomy::list_functions(pool, false)
                .await?
                .into_iter()
                .map(|f| serde_json::json!({ "name": f.name }))
                .collect();
            encode(serde_json::Value::Array(rows))
        }
        TaxonomyKind::Tools => {
            let rows: Vec<serde_json::Value> = taxonomy::list_tools(pool, false)
                .await?
                .into_iter()
                .map(|t| serde_json::json!({ "name": t.name }))
                .collect();
            encode(serde_json::Value::Array(rows))
        }
        TaxonomyKind::Capabilities => {
            let rows: Vec<serde_json::Value> = taxonomy::list_capabilities(pool, false)
                .await?
                .into_iter()
                .map(|c| serde_json::json!({ "name": c.name, "icon": c.icon }))
                .collect();
            encode(serde_json::Value::Array(rows))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_common::db::models::{Frequency, ImpactType, MethodType};

    fn tool(id: i64, name: &str, fallback: bool) -> Tool {
        Tool {
            id,
            name: name.to_string(),
            is_fallback: fallback,
            active: true,
            created_at: String::new(),
        }
    }

    fn entry() -> Entry {
        let mut impacts: [Impact; 4] = Default::default();
        impacts[0] = Impact {
            impact_type: Some(ImpactType::CostSavings),
            value: Some(500.0),
            frequency: Some(Frequency::Monthly),
            time_unit: None,
            annual_value: Some(6000.0),
            description: Some("licence savings".to_string()),
        };
        Entry {
            id: 1,
            function_id: 1,
            team_id: None,
            method_type: MethodType::Workflow,
            capability_id: 1,
            capability_other: None,
            description: "Automated report triage".to_string(),
            tools_used: vec![1, 2],
            other_tools: vec!["Internal GPT wrapper".to_string()],
            impacts,
            submitted_by: Some("sam".to_string()),
            submitted_at: "2026-01-05 09:30:00".to_string(),
            updated_at: "2026-01-05 09:30:00".to_string(),
            function_name: "Engineering".to_string(),
            team_name: None,
            capability_name: "Coding".to_string(),
        }
    }

    #[test]
    fn fallback_tool_substituted_in_export() {
        let tools = vec![tool(1, "Copilot", false), tool(2, "Other", true)];
        let by_id: HashMap<i64, &Tool> = tools.iter().map(|t| (t.id, t)).collect();
        let names = resolved_tool_names(&entry(), &by_id);
        assert_eq!(names, vec!["Copilot", "Internal GPT wrapper"]);
    }

    #[test]
    fn missing_tool_id_renders_labeled() {
        let tools = vec![tool(1, "Copilot", false)];
        let by_id: HashMap<i64, &Tool> = tools.iter().map(|t| (t.id, t)).collect();
        let mut e = entry();
        e.tools_used = vec![1, 42];
        let names = resolved_tool_names(&e, &by_id);
        assert_eq!(names, vec!["Copilot", "Unknown(42)"]);
    }

    #[test]
    fn csv_export_carries_header_and_flattened_impacts() {
        let tools = vec![tool(1, "Copilot", false), tool(2, "Other", true)];
        let csv = entries_to_csv(&[entry()], &tools).unwrap();
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("function,team,method_type"));
        assert!(header.contains("impact4_description"));
        let row = lines.next().unwrap();
        assert!(row.contains("Engineering"));
        assert!(row.contains("cost_savings"));
        assert!(row.contains("6000"));
    }

    #[test]
    fn json_export_keeps_only_populated_impacts() {
        let tools = vec![tool(1, "Copilot", false), tool(2, "Other", true)];
        let json = entries_to_json(&[entry()], &tools).unwrap();
        let rows: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(rows[0]["impacts"].as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["function"], "Engineering");
    }
}
