//! Tolerant bulk import of entries and taxonomies.
//!
//! Structural problems (an undecodable file, the wrong shape) fail the
//! whole request. Everything at row level is tolerated: a failing row
//! reports all of its problems at once and never stops the rows after
//! it. Numeric and enum impact fields degrade to null rather than
//! failing the row.

use catalog_common::db::models::{
    Frequency, Impact, ImpactType, MethodType, NewEntry, IMPACT_SLOTS,
};
use catalog_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::store::{entries, taxonomy};
use crate::transfer::export::TaxonomyKind;
use crate::transfer::resolve::NameResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Json,
}

/// Content-Type wins when it names a format; otherwise sniff the body
/// (a JSON payload is always an array, so it starts with `[`)
pub fn detect_format(content_type: Option<&str>, bytes: &[u8]) -> Format {
    if let Some(ct) = content_type {
        if ct.contains("json") {
            return Format::Json;
        }
        if ct.contains("csv") {
            return Format::Csv;
        }
    }
    match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'[') => Format::Json,
        _ => Format::Csv,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryImportMode {
    Append,
    Replace,
}

impl EntryImportMode {
    pub fn parse(s: &str) -> Option<EntryImportMode> {
        match s {
            "append" => Some(EntryImportMode::Append),
            "replace" => Some(EntryImportMode::Replace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryImportMode::Append => "append",
            EntryImportMode::Replace => "replace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxonomyImportMode {
    Merge,
    Replace,
}

impl TaxonomyImportMode {
    pub fn parse(s: &str) -> Option<TaxonomyImportMode> {
        match s {
            "merge" => Some(TaxonomyImportMode::Merge),
            "replace" => Some(TaxonomyImportMode::Replace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonomyImportMode::Merge => "merge",
            TaxonomyImportMode::Replace => "replace",
        }
    }
}

/// Where a row error occurred: a 1-based data position (CSV positions
/// start at 2, after the header line), or a phase label for failures
/// with no single source row
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RowMarker {
    Line(usize),
    Label(&'static str),
}

#[derive(Debug, Serialize)]
pub struct RowError {
    pub row: RowMarker,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub success: usize,
    pub skipped: usize,
    pub errors: Vec<RowError>,
    pub mode: String,
    pub total_rows: usize,
}

// ============ Raw rows ============

#[derive(Debug, Default)]
struct RawImpact {
    impact_type: String,
    value: String,
    frequency: String,
    time_unit: String,
    annual_value: String,
    description: String,
}

#[derive(Debug, Default)]
struct RawEntryRow {
    function: String,
    team: String,
    method_type: String,
    capability: String,
    capability_other: String,
    description: String,
    tool_names: Vec<String>,
    other_tools: Vec<String>,
    impacts: Vec<RawImpact>,
    submitted_by: String,
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accept "1000", " $1,000 ", "1000.5"; anything else degrades to None
fn lenient_f64(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

fn json_scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn parse_csv_entries(bytes: &[u8]) -> Result<Vec<(usize, RawEntryRow)>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| Error::InvalidInput(format!("Could not parse CSV: {e}")))?
        .clone();

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| Error::InvalidInput(format!("Could not parse CSV: {e}")))?;
        let field = |name: &str| -> String {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .and_then(|idx| record.get(idx))
                .unwrap_or("")
                .trim()
                .to_string()
        };

        let mut impacts = Vec::new();
        for n in 1..=IMPACT_SLOTS {
            impacts.push(RawImpact {
                impact_type: field(&format!("impact{n}_type")),
                value: field(&format!("impact{n}_value")),
                frequency: field(&format!("impact{n}_frequency")),
                time_unit: field(&format!("impact{n}_time_unit")),
                annual_value: field(&format!("impact{n}_annual_value")),
                description: field(&format!("impact{n}_description")),
            });
        }

        rows.push((
            // position 1 is the header line
            i + 2,
            RawEntryRow {
                function: field("function"),
                team: field("team"),
                method_type: field("method_type"),
                capability: field("capability"),
                capability_other: field("capability_other"),
                description: field("description"),
                tool_names: split_list(&field("tools_used")),
                other_tools: split_list(&field("other_tools")),
                impacts,
                submitted_by: field("submitted_by"),
            },
        ));
    }
    Ok(rows)
}

fn parse_json_entries(bytes: &[u8]) -> Result<Vec<(usize, RawEntryRow)>> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::InvalidInput(format!("Could not parse JSON: {e}")))?;
    let array = value
        .as_array()
        .ok_or_else(|| Error::InvalidInput("Expected a JSON array of entries".to_string()))?;

    let mut rows = Vec::new();
    for (i, item) in array.iter().enumerate() {
        let obj = item
            .as_object()
            .ok_or_else(|| Error::InvalidInput(format!("Entry {} is not an object", i + 1)))?;

        let field = |name: &str| -> String {
            obj.get(name)
                .map(json_scalar_to_string)
                .unwrap_or_default()
                .trim()
                .to_string()
        };
        // Lists arrive as arrays in native exports, but a comma-joined
        // string is accepted for hand-edited files
        let list = |name: &str| -> Vec<String> {
            match obj.get(name) {
                Some(serde_json::Value::Array(items)) => items
                    .iter()
                    .map(json_scalar_to_string)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                Some(other) => split_list(&json_scalar_to_string(other)),
                None => Vec::new(),
            }
        };

        let impacts = match obj.get("impacts") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_object())
                .map(|imp| {
                    let ifield = |name: &str| -> String {
                        imp.get(name)
                            .map(json_scalar_to_string)
                            .unwrap_or_default()
                            .trim()
                            .to_string()
                    };
                    RawImpact {
                        impact_type: ifield("type"),
                        value: ifield("value"),
                        frequency: ifield("frequency"),
                        time_unit: ifield("time_unit"),
                        annual_value: ifield("annual_value"),
                        description: ifield("description"),
                    }
                })
                .collect(),
            _ => Vec::new(),
        };

        rows.push((
            i + 1,
            RawEntryRow {
                function: field("function"),
                team: field("team"),
                method_type: field("method_type"),
                capability: field("capability"),
                capability_other: field("capability_other"),
                description: field("description"),
                tool_names: list("tools_used"),
                other_tools: list("other_tools"),
                impacts,
                submitted_by: field("submitted_by"),
            },
        ));
    }
    Ok(rows)
}

/// Invalid enum values and unparsable numbers degrade to null,
/// never a row error
fn normalize_impact(raw: &RawImpact) -> Impact {
    Impact {
        impact_type: ImpactType::parse(&raw.impact_type.trim().to_lowercase()),
        value: lenient_f64(&raw.value),
        frequency: Frequency::parse(&raw.frequency.trim().to_lowercase()),
        time_unit: (!raw.time_unit.is_empty()).then(|| raw.time_unit.clone()),
        annual_value: lenient_f64(&raw.annual_value),
        description: (!raw.description.is_empty()).then(|| raw.description.clone()),
    }
}

/// Resolve one raw row against the taxonomy. Collects every problem
/// the row has rather than stopping at the first.
fn resolve_row(
    raw: &RawEntryRow,
    resolver: &NameResolver,
) -> std::result::Result<NewEntry, Vec<String>> {
    let mut errors = Vec::new();

    let function_id = if raw.function.is_empty() {
        errors.push("Missing function".to_string());
        None
    } else {
        let id = resolver.function(&raw.function);
        if id.is_none() {
            errors.push(format!("Unknown function: {}", raw.function));
        }
        id
    };

    // Team lookup is scoped to the function, so an unresolved function
    // short-circuits it rather than producing a misleading second error
    let mut team_id = None;
    if !raw.team.is_empty() {
        if let Some(fid) = function_id {
            match resolver.team(fid, &raw.team) {
                Some(id) => team_id = Some(id),
                None => errors.push(format!(
                    "Unknown team: {} (for function {})",
                    raw.team, raw.function
                )),
            }
        }
    }

    let capability_id = if raw.capability.is_empty() {
        errors.push("Missing capability".to_string());
        None
    } else {
        let id = resolver.capability(&raw.capability);
        if id.is_none() {
            errors.push(format!("Unknown capability: {}", raw.capability));
        }
        id
    };

    let method_type = MethodType::parse(&raw.method_type.trim().to_lowercase());
    if method_type.is_none() {
        errors.push(format!("Invalid method_type: {}", raw.method_type));
    }

    let mut tools_used = Vec::new();
    for name in &raw.tool_names {
        match resolver.tool(name) {
            Some(id) => tools_used.push(id),
            None => errors.push(format!("Unknown tool: {name}")),
        }
    }

    if raw.description.is_empty() {
        errors.push("Missing description".to_string());
    }

    match (function_id, capability_id, method_type) {
        (Some(function_id), Some(capability_id), Some(method_type)) if errors.is_empty() => {
            let impacts: Vec<Impact> = raw
                .impacts
                .iter()
                .take(IMPACT_SLOTS)
                .map(normalize_impact)
                .filter(|i| !i.is_empty())
                .collect();
            Ok(NewEntry {
                function_id,
                team_id,
                method_type,
                capability_id,
                capability_other: (!raw.capability_other.is_empty())
                    .then(|| raw.capability_other.clone()),
                description: raw.description.clone(),
                tools_used,
                other_tools: raw.other_tools.clone(),
                impacts,
                submitted_by: (!raw.submitted_by.is_empty()).then(|| raw.submitted_by.clone()),
            })
        }
        _ => Err(errors),
    }
}

pub async fn import_entries(
    pool: &SqlitePool,
    bytes: &[u8],
    mode: EntryImportMode,
    content_type: Option<&str>,
) -> Result<ImportSummary> {
    let rows = match detect_format(content_type, bytes) {
        Format::Json => parse_json_entries(bytes)?,
        Format::Csv => parse_csv_entries(bytes)?,
    };
    let total_rows = rows.len();

    let resolver = NameResolver::load(pool).await?;
    let mut errors = Vec::new();
    let mut staged = Vec::new();
    for (position, raw) in &rows {
        match resolve_row(raw, &resolver) {
            Ok(entry) => staged.push(entry),
            Err(row_errors) => errors.push(RowError {
                row: RowMarker::Line(*position),
                errors: row_errors,
            }),
        }
    }

    // Replace only destroys existing data once something valid is
    // there to take its place
    if mode == EntryImportMode::Replace && !staged.is_empty() {
        let cleared = entries::clear_entries(pool).await?;
        info!(cleared, "cleared entries for replace-mode import");
    }

    let mut success = 0;
    for entry in &staged {
        match entries::create_entry(pool, entry).await {
            Ok(_) => success += 1,
            Err(err) => errors.push(RowError {
                row: RowMarker::Label("commit"),
                errors: vec![err.to_string()],
            }),
        }
    }

    info!(success, failed = errors.len(), total_rows, mode = mode.as_str(), "entry import finished");
    Ok(ImportSummary {
        success,
        skipped: 0,
        errors,
        mode: mode.as_str().to_string(),
        total_rows,
    })
}

// ============ Taxonomy import ============

/// Name-only row (teams carry the owning function's name as well)
#[derive(Debug)]
struct RawTaxonomyRow {
    function: String,
    name: String,
    icon: Option<String>,
}

fn parse_csv_taxonomy(bytes: &[u8], kind: TaxonomyKind) -> Result<Vec<(usize, RawTaxonomyRow)>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| Error::InvalidInput(format!("Could not parse CSV: {e}")))?
        .clone();
    let position_of = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| Error::InvalidInput(format!("Could not parse CSV: {e}")))?;
        let get = |idx: Option<usize>, fallback: usize| -> String {
            idx.or(Some(fallback))
                .and_then(|idx| record.get(idx))
                .unwrap_or("")
                .trim()
                .to_string()
        };
        let row = match kind {
            TaxonomyKind::Teams => RawTaxonomyRow {
                function: get(position_of("function"), 0),
                name: get(position_of("team"), 1),
                icon: None,
            },
            _ => RawTaxonomyRow {
                function: String::new(),
                name: get(position_of("name"), 0),
                icon: None,
            },
        };
        rows.push((i + 2, row));
    }
    Ok(rows)
}

fn parse_json_taxonomy(bytes: &[u8], kind: TaxonomyKind) -> Result<Vec<(usize, RawTaxonomyRow)>> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::InvalidInput(format!("Could not parse JSON: {e}")))?;
    let array = value
        .as_array()
        .ok_or_else(|| Error::InvalidInput("Expected a JSON array".to_string()))?;

    let mut rows = Vec::new();
    for (i, item) in array.iter().enumerate() {
        let row = match item {
            // bare string rows, e.g. ["Engineering", "Sales"]
            serde_json::Value::String(s) if kind != TaxonomyKind::Teams => RawTaxonomyRow {
                function: String::new(),
                name: s.trim().to_string(),
                icon: None,
            },
            serde_json::Value::Object(obj) => {
                let field = |name: &str| -> String {
                    obj.get(name)
                        .map(json_scalar_to_string)
                        .unwrap_or_default()
                        .trim()
                        .to_string()
                };
                match kind {
                    TaxonomyKind::Teams => RawTaxonomyRow {
                        function: field("function"),
                        name: field("team"),
                        icon: None,
                    },
                    _ => {
                        let icon = field("icon");
                        RawTaxonomyRow {
                            function: String::new(),
                            name: field("name"),
                            icon: (!icon.is_empty()).then_some(icon),
                        }
                    }
                }
            }
            _ => {
                return Err(Error::InvalidInput(format!(
                    "Row {} has an unsupported shape",
                    i + 1
                )))
            }
        };
        rows.push((i + 1, row));
    }
    Ok(rows)
}

/// Replace mode wipes the target taxonomy, which is only safe while
/// nothing references it. Checked up front so the caller gets a named
/// blocker instead of a raw foreign-key failure from the delete.
async fn replace_guard(pool: &SqlitePool, kind: TaxonomyKind) -> Result<()> {
    let blocked = |what: &str, count: i64| {
        Error::HasDependents(format!(
            "cannot replace {}: {what} still reference {count} row(s)",
            kind.as_str()
        ))
    };

    match kind {
        TaxonomyKind::Functions => {
            let teams: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM teams")
                .fetch_one(pool)
                .await?;
            if teams > 0 {
                return Err(blocked("teams", teams));
            }
            let entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
                .fetch_one(pool)
                .await?;
            if entries > 0 {
                return Err(blocked("entries", entries));
            }
        }
        TaxonomyKind::Teams => {
            let entries: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE team_id IS NOT NULL")
                    .fetch_one(pool)
                    .await?;
            if entries > 0 {
                return Err(blocked("entries", entries));
            }
        }
        TaxonomyKind::Capabilities => {
            let entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
                .fetch_one(pool)
                .await?;
            if entries > 0 {
                return Err(blocked("entries", entries));
            }
        }
        // entries reference tools through a serialized id list, not a
        // foreign key, so a tool wipe cannot be blocked
        TaxonomyKind::Tools => {}
    }
    Ok(())
}

pub async fn import_taxonomy(
    pool: &SqlitePool,
    kind: TaxonomyKind,
    bytes: &[u8],
    mode: TaxonomyImportMode,
    content_type: Option<&str>,
) -> Result<ImportSummary> {
    let rows = match detect_format(content_type, bytes) {
        Format::Json => parse_json_taxonomy(bytes, kind)?,
        Format::Csv => parse_csv_taxonomy(bytes, kind)?,
    };
    let total_rows = rows.len();

    if mode == TaxonomyImportMode::Replace {
        replace_guard(pool, kind).await?;
        match kind {
            TaxonomyKind::Functions => taxonomy::clear_functions(pool).await?,
            TaxonomyKind::Teams => taxonomy::clear_teams(pool).await?,
            TaxonomyKind::Tools => taxonomy::clear_tools(pool).await?,
            TaxonomyKind::Capabilities => taxonomy::clear_capabilities(pool).await?,
        }
    }

    // Known names, lowercased; duplicates (in the table or in the file)
    // are counted as skipped, never as errors
    let mut known: std::collections::HashSet<String> = match kind {
        TaxonomyKind::Functions => taxonomy::list_functions(pool, false)
            .await?
            .into_iter()
            .map(|f| f.name.to_lowercase())
            .collect(),
        TaxonomyKind::Teams => taxonomy::list_teams(pool, None, false)
            .await?
            .into_iter()
            .map(|t| format!("{}\u{1f}{}", t.function_id, t.name.to_lowercase()))
            .collect(),
        TaxonomyKind::Tools => taxonomy::list_tools(pool, false)
            .await?
            .into_iter()
            .map(|t| t.name.to_lowercase())
            .collect(),
        TaxonomyKind::Capabilities => taxonomy::list_capabilities(pool, false)
            .await?
            .into_iter()
            .map(|c| c.name.to_lowercase())
            .collect(),
    };

    let functions = taxonomy::list_functions(pool, false).await?;

    let mut success = 0;
    let mut skipped = 0;
    let mut errors = Vec::new();

    for (position, row) in rows {
        if row.name.is_empty() {
            errors.push(RowError {
                row: RowMarker::Line(position),
                errors: vec!["Missing name".to_string()],
            });
            continue;
        }

        let result = match kind {
            TaxonomyKind::Teams => {
                let function_id = match functions
                    .iter()
                    .find(|f| f.name.eq_ignore_ascii_case(&row.function))
                {
                    Some(f) => f.id,
                    None => {
                        errors.push(RowError {
                            row: RowMarker::Line(position),
                            errors: vec![format!("Unknown function: {}", row.function)],
                        });
                        continue;
                    }
                };
                let key = format!("{}\u{1f}{}", function_id, row.name.to_lowercase());
                if known.contains(&key) {
                    skipped += 1;
                    continue;
                }
                known.insert(key);
                taxonomy::create_team(pool, function_id, &row.name).await.map(|_| ())
            }
            _ => {
                let key = row.name.to_lowercase();
                if known.contains(&key) {
                    skipped += 1;
                    continue;
                }
                known.insert(key);
                match kind {
                    TaxonomyKind::Functions => {
                        taxonomy::create_function(pool, &row.name).await.map(|_| ())
                    }
                    TaxonomyKind::Tools => taxonomy::create_tool(pool, &row.name).await.map(|_| ()),
                    TaxonomyKind::Capabilities => {
                        taxonomy::create_capability(pool, &row.name, row.icon.as_deref())
                            .await
                            .map(|_| ())
                    }
                    TaxonomyKind::Teams => unreachable!(),
                }
            }
        };

        match result {
            Ok(()) => success += 1,
            Err(err) => errors.push(RowError {
                row: RowMarker::Line(position),
                errors: vec![err.to_string()],
            }),
        }
    }

    info!(
        kind = kind.as_str(),
        success, skipped, failed = errors.len(), mode = mode.as_str(),
        "taxonomy import finished"
    );
    Ok(ImportSummary {
        success,
        skipped,
        errors,
        mode: mode.as_str().to_string(),
        total_rows,
    })
}
