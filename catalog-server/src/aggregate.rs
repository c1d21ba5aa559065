//! Dashboard aggregation over fetched entries.
//!
//! Everything here is a pure function over slices, so the two counting
//! rules stay in one place: monetary and time impacts are summed across
//! all four slots of every entry, while quality and new-capability
//! impacts count distinct entries (an entry with two quality slots is
//! one quality improvement, not two).

use std::collections::HashMap;

use catalog_common::db::models::{
    Capability, Entry, Function, ImpactType, MethodType, Team, Tool,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total_entries: usize,
    pub workflows: usize,
    pub tasks: usize,
    pub experiments: usize,
    pub total_cost_savings: f64,
    pub total_time_savings: f64,
    pub quality_improvements: usize,
    pub new_capabilities: usize,
}

#[derive(Debug, Serialize)]
pub struct FunctionBreakdown {
    pub function: String,
    pub entry_count: usize,
    pub workflows: usize,
    pub tasks: usize,
    pub experiments: usize,
    pub cost_savings: f64,
    pub time_savings: f64,
}

#[derive(Debug, Serialize)]
pub struct TeamBreakdown {
    pub team: String,
    pub function: String,
    pub entry_count: usize,
    pub cost_savings: f64,
    pub time_savings: f64,
}

#[derive(Debug, Serialize)]
pub struct CategoryStats {
    pub count: usize,
    pub cost_savings: f64,
    pub time_savings: f64,
    /// Entry-distinct counts per impact type within the category
    pub impact_breakdown: HashMap<&'static str, usize>,
}

#[derive(Debug, Serialize)]
pub struct CategoryBreakdown {
    pub workflow: CategoryStats,
    pub task: CategoryStats,
    pub experiment: CategoryStats,
}

#[derive(Debug, Serialize)]
pub struct ImpactTypeCount {
    pub impact_type: &'static str,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ToolUsage {
    pub tool: String,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct CapabilityUsage {
    pub capability: String,
    pub icon: Option<String>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct TeamSubBreakdown {
    pub team: String,
    pub entry_count: usize,
    pub workflows: usize,
    pub tasks: usize,
    pub experiments: usize,
    pub cost_savings: f64,
    pub time_savings: f64,
}

#[derive(Debug, Serialize)]
pub struct FunctionWithTeams {
    #[serde(flatten)]
    pub breakdown: FunctionBreakdown,
    pub teams: Vec<TeamSubBreakdown>,
    pub has_no_teams: bool,
}

/// Sum `annual_value` across every populated slot of the given type.
/// A populated slot without an annual value contributes zero.
fn slot_sum(entries: &[Entry], impact_type: ImpactType) -> f64 {
    let total: f64 = entries
        .iter()
        .flat_map(|e| e.impacts.iter())
        .filter(|slot| slot.impact_type == Some(impact_type))
        .map(|slot| slot.annual_value.unwrap_or(0.0))
        .sum();
    // a stored -0.0 would otherwise surface as "-0.0" in JSON
    total + 0.0
}

/// Count entries with at least one slot of the given type
fn entries_with_impact(entries: &[Entry], impact_type: ImpactType) -> usize {
    entries
        .iter()
        .filter(|e| e.impacts.iter().any(|slot| slot.impact_type == Some(impact_type)))
        .count()
}

fn method_count(entries: &[Entry], method: MethodType) -> usize {
    entries.iter().filter(|e| e.method_type == method).count()
}

pub fn summary(entries: &[Entry]) -> Summary {
    Summary {
        total_entries: entries.len(),
        workflows: method_count(entries, MethodType::Workflow),
        tasks: method_count(entries, MethodType::Task),
        experiments: method_count(entries, MethodType::Experiment),
        total_cost_savings: slot_sum(entries, ImpactType::CostSavings),
        total_time_savings: slot_sum(entries, ImpactType::TimeSavings),
        quality_improvements: entries_with_impact(entries, ImpactType::Quality),
        new_capabilities: entries_with_impact(entries, ImpactType::NewCapability),
    }
}

fn function_breakdown_for(function: &Function, entries: &[Entry]) -> FunctionBreakdown {
    let owned: Vec<Entry> = entries
        .iter()
        .filter(|e| e.function_id == function.id)
        .cloned()
        .collect();
    FunctionBreakdown {
        function: function.name.clone(),
        entry_count: owned.len(),
        workflows: method_count(&owned, MethodType::Workflow),
        tasks: method_count(&owned, MethodType::Task),
        experiments: method_count(&owned, MethodType::Experiment),
        cost_savings: slot_sum(&owned, ImpactType::CostSavings),
        time_savings: slot_sum(&owned, ImpactType::TimeSavings),
    }
}

/// Per active function, ordered by entry count descending (name breaks ties)
pub fn by_function(entries: &[Entry], functions: &[Function]) -> Vec<FunctionBreakdown> {
    let mut rows: Vec<FunctionBreakdown> = functions
        .iter()
        .filter(|f| f.active)
        .map(|f| function_breakdown_for(f, entries))
        .collect();
    rows.sort_by(|a, b| {
        b.entry_count
            .cmp(&a.entry_count)
            .then_with(|| a.function.cmp(&b.function))
    });
    rows
}

/// Per active team, ordered by function name then entry count descending
pub fn by_team(entries: &[Entry], teams: &[Team]) -> Vec<TeamBreakdown> {
    let mut rows: Vec<TeamBreakdown> = teams
        .iter()
        .filter(|t| t.active)
        .map(|t| {
            let owned: Vec<Entry> = entries
                .iter()
                .filter(|e| e.team_id == Some(t.id))
                .cloned()
                .collect();
            TeamBreakdown {
                team: t.name.clone(),
                function: t.function_name.clone().unwrap_or_default(),
                entry_count: owned.len(),
                cost_savings: slot_sum(&owned, ImpactType::CostSavings),
                time_savings: slot_sum(&owned, ImpactType::TimeSavings),
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        a.function
            .cmp(&b.function)
            .then_with(|| b.entry_count.cmp(&a.entry_count))
            .then_with(|| a.team.cmp(&b.team))
    });
    rows
}

fn category_stats(entries: &[Entry], method: MethodType) -> CategoryStats {
    let owned: Vec<Entry> = entries
        .iter()
        .filter(|e| e.method_type == method)
        .cloned()
        .collect();
    let impact_breakdown = ImpactType::ALL
        .iter()
        .map(|&t| (t.as_str(), entries_with_impact(&owned, t)))
        .collect();
    CategoryStats {
        count: owned.len(),
        cost_savings: slot_sum(&owned, ImpactType::CostSavings),
        time_savings: slot_sum(&owned, ImpactType::TimeSavings),
        impact_breakdown,
    }
}

pub fn by_category(entries: &[Entry]) -> CategoryBreakdown {
    CategoryBreakdown {
        workflow: category_stats(entries, MethodType::Workflow),
        task: category_stats(entries, MethodType::Task),
        experiment: category_stats(entries, MethodType::Experiment),
    }
}

/// One labeled row per impact type, entry-distinct counts
pub fn impact_types(entries: &[Entry]) -> Vec<ImpactTypeCount> {
    ImpactType::ALL
        .iter()
        .map(|&t| ImpactTypeCount {
            impact_type: t.label(),
            count: entries_with_impact(entries, t),
        })
        .collect()
}

/// Tally tool usage by final display name.
///
/// A fallback tool is replaced by the entry's free-text `other_tools`
/// names, each counting as its own bucket (an entry with an empty
/// `other_tools` keeps the fallback tool's own name). An id with no
/// matching tool row buckets under `Unknown(id)`.
pub fn tools_used(entries: &[Entry], tools: &[Tool]) -> Vec<ToolUsage> {
    let by_id: HashMap<i64, &Tool> = tools.iter().map(|t| (t.id, t)).collect();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        for id in &entry.tools_used {
            match by_id.get(id) {
                Some(tool) if tool.is_fallback => {
                    if entry.other_tools.is_empty() {
                        *counts.entry(tool.name.clone()).or_default() += 1;
                    } else {
                        for name in &entry.other_tools {
                            *counts.entry(name.clone()).or_default() += 1;
                        }
                    }
                }
                Some(tool) => *counts.entry(tool.name.clone()).or_default() += 1,
                None => *counts.entry(format!("Unknown({id})")).or_default() += 1,
            }
        }
    }

    let mut rows: Vec<ToolUsage> = counts
        .into_iter()
        .map(|(tool, count)| ToolUsage { tool, count })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tool.cmp(&b.tool)));
    rows
}

/// Per active capability, zero-count rows excluded, descending by count
pub fn capabilities(entries: &[Entry], caps: &[Capability]) -> Vec<CapabilityUsage> {
    let mut rows: Vec<CapabilityUsage> = caps
        .iter()
        .filter(|c| c.active)
        .map(|c| CapabilityUsage {
            capability: c.name.clone(),
            icon: c.icon.clone(),
            count: entries.iter().filter(|e| e.capability_id == c.id).count(),
        })
        .filter(|row| row.count > 0)
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.capability.cmp(&b.capability)));
    rows
}

/// `by_function` rows enriched with per-team sub-breakdowns. Both levels
/// share `by_function`'s ordering: entry count descending, name tiebreak.
pub fn functions_with_teams(
    entries: &[Entry],
    functions: &[Function],
    teams: &[Team],
) -> Vec<FunctionWithTeams> {
    let mut rows: Vec<FunctionWithTeams> = functions
        .iter()
        .filter(|f| f.active)
        .map(|f| {
            let breakdown = function_breakdown_for(f, entries);
            let mut team_rows: Vec<TeamSubBreakdown> = teams
                .iter()
                .filter(|t| t.active && t.function_id == f.id)
                .map(|t| {
                    let owned: Vec<Entry> = entries
                        .iter()
                        .filter(|e| e.team_id == Some(t.id))
                        .cloned()
                        .collect();
                    TeamSubBreakdown {
                        team: t.name.clone(),
                        entry_count: owned.len(),
                        workflows: method_count(&owned, MethodType::Workflow),
                        tasks: method_count(&owned, MethodType::Task),
                        experiments: method_count(&owned, MethodType::Experiment),
                        cost_savings: slot_sum(&owned, ImpactType::CostSavings),
                        time_savings: slot_sum(&owned, ImpactType::TimeSavings),
                    }
                })
                .collect();
            team_rows.sort_by(|a, b| {
                b.entry_count
                    .cmp(&a.entry_count)
                    .then_with(|| a.team.cmp(&b.team))
            });
            let has_no_teams = team_rows.is_empty();
            FunctionWithTeams { breakdown, teams: team_rows, has_no_teams }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.breakdown
            .entry_count
            .cmp(&a.breakdown.entry_count)
            .then_with(|| a.breakdown.function.cmp(&b.breakdown.function))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_common::db::models::{Frequency, Impact, IMPACT_SLOTS};

    fn impact(t: ImpactType, annual: Option<f64>) -> Impact {
        Impact {
            impact_type: Some(t),
            value: annual,
            frequency: Some(Frequency::Monthly),
            time_unit: None,
            annual_value: annual,
            description: None,
        }
    }

    fn entry(
        id: i64,
        function_id: i64,
        team_id: Option<i64>,
        method: MethodType,
        impacts: Vec<Impact>,
    ) -> Entry {
        let mut slots: [Impact; IMPACT_SLOTS] = Default::default();
        for (slot, value) in slots.iter_mut().zip(impacts) {
            *slot = value;
        }
        Entry {
            id,
            function_id,
            team_id,
            method_type: method,
            capability_id: 1,
            capability_other: None,
            description: format!("entry {id}"),
            tools_used: vec![],
            other_tools: vec![],
            impacts: slots,
            submitted_by: None,
            submitted_at: "2026-01-01 00:00:00".to_string(),
            updated_at: "2026-01-01 00:00:00".to_string(),
            function_name: "Engineering".to_string(),
            team_name: None,
            capability_name: "Coding".to_string(),
        }
    }

    fn tool(id: i64, name: &str, fallback: bool) -> Tool {
        Tool {
            id,
            name: name.to_string(),
            is_fallback: fallback,
            active: true,
            created_at: String::new(),
        }
    }

    #[test]
    fn cost_and_time_sum_across_slots() {
        let entries = vec![
            entry(
                1,
                1,
                None,
                MethodType::Workflow,
                vec![
                    impact(ImpactType::CostSavings, Some(1000.0)),
                    impact(ImpactType::CostSavings, Some(500.0)),
                ],
            ),
            entry(
                2,
                1,
                None,
                MethodType::Task,
                vec![impact(ImpactType::TimeSavings, Some(40.0))],
            ),
        ];
        let s = summary(&entries);
        assert_eq!(s.total_cost_savings, 1500.0);
        assert_eq!(s.total_time_savings, 40.0);
        assert_eq!(s.workflows, 1);
        assert_eq!(s.tasks, 1);
    }

    #[test]
    fn quality_counts_entries_not_slots() {
        let entries = vec![entry(
            1,
            1,
            None,
            MethodType::Workflow,
            vec![
                impact(ImpactType::Quality, None),
                impact(ImpactType::Quality, None),
            ],
        )];
        assert_eq!(summary(&entries).quality_improvements, 1);
    }

    #[test]
    fn missing_annual_value_contributes_zero() {
        let entries = vec![entry(
            1,
            1,
            None,
            MethodType::Task,
            vec![
                impact(ImpactType::CostSavings, None),
                impact(ImpactType::CostSavings, Some(250.0)),
            ],
        )];
        assert_eq!(summary(&entries).total_cost_savings, 250.0);
    }

    #[test]
    fn fallback_tool_substitutes_free_text_names() {
        let tools = vec![tool(1, "Copilot", false), tool(2, "Other", true)];
        let mut e = entry(1, 1, None, MethodType::Workflow, vec![]);
        e.tools_used = vec![1, 2];
        e.other_tools = vec!["Internal GPT wrapper".to_string()];

        let usage = tools_used(&[e], &tools);
        let names: Vec<&str> = usage.iter().map(|u| u.tool.as_str()).collect();
        assert!(names.contains(&"Copilot"));
        assert!(names.contains(&"Internal GPT wrapper"));
        assert!(!names.contains(&"Other"));
    }

    #[test]
    fn fallback_tool_without_free_text_keeps_own_name() {
        let tools = vec![tool(2, "Other", true)];
        let mut e = entry(1, 1, None, MethodType::Workflow, vec![]);
        e.tools_used = vec![2];

        let usage = tools_used(&[e], &tools);
        assert_eq!(usage[0].tool, "Other");
    }

    #[test]
    fn unresolvable_tool_id_gets_labeled_bucket() {
        let mut e = entry(1, 1, None, MethodType::Workflow, vec![]);
        e.tools_used = vec![99];
        let usage = tools_used(&[e], &[]);
        assert_eq!(usage[0].tool, "Unknown(99)");
    }

    #[test]
    fn impact_type_rows_use_labels() {
        let entries = vec![entry(
            1,
            1,
            None,
            MethodType::Workflow,
            vec![impact(ImpactType::NewCapability, None)],
        )];
        let rows = impact_types(&entries);
        assert_eq!(rows.len(), 4);
        let new_cap = rows.iter().find(|r| r.impact_type == "New Capability").unwrap();
        assert_eq!(new_cap.count, 1);
    }

    #[test]
    fn functions_ordered_by_entry_count() {
        let functions = vec![
            Function { id: 1, name: "Engineering".into(), active: true, created_at: String::new() },
            Function { id: 2, name: "Sales".into(), active: true, created_at: String::new() },
            Function { id: 3, name: "Retired".into(), active: false, created_at: String::new() },
        ];
        let entries = vec![
            entry(1, 2, None, MethodType::Task, vec![]),
            entry(2, 2, None, MethodType::Task, vec![]),
            entry(3, 1, None, MethodType::Workflow, vec![]),
        ];
        let rows = by_function(&entries, &functions);
        assert_eq!(rows.len(), 2, "inactive functions excluded");
        assert_eq!(rows[0].function, "Sales");
        assert_eq!(rows[0].entry_count, 2);
    }

    #[test]
    fn zero_count_capabilities_excluded() {
        let caps = vec![
            Capability {
                id: 1,
                name: "Coding".into(),
                icon: None,
                is_fallback: false,
                active: true,
                created_at: String::new(),
            },
            Capability {
                id: 2,
                name: "Unused".into(),
                icon: None,
                is_fallback: false,
                active: true,
                created_at: String::new(),
            },
        ];
        let entries = vec![entry(1, 1, None, MethodType::Task, vec![])];
        let rows = capabilities(&entries, &caps);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].capability, "Coding");
    }

    #[test]
    fn functions_with_teams_ordered_by_entry_count_at_both_levels() {
        let functions = vec![
            Function { id: 1, name: "Alpha".into(), active: true, created_at: String::new() },
            Function { id: 2, name: "Zulu".into(), active: true, created_at: String::new() },
        ];
        let teams = vec![
            Team {
                id: 10,
                function_id: 2,
                name: "Apps".into(),
                active: true,
                created_at: String::new(),
                function_name: Some("Zulu".into()),
            },
            Team {
                id: 11,
                function_id: 2,
                name: "Infra".into(),
                active: true,
                created_at: String::new(),
                function_name: Some("Zulu".into()),
            },
        ];
        let entries = vec![
            entry(1, 1, None, MethodType::Task, vec![]),
            entry(2, 2, Some(10), MethodType::Task, vec![]),
            entry(3, 2, Some(11), MethodType::Task, vec![]),
            entry(4, 2, Some(11), MethodType::Workflow, vec![]),
        ];

        let rows = functions_with_teams(&entries, &functions, &teams);
        assert_eq!(rows[0].breakdown.function, "Zulu", "busiest function first");
        assert_eq!(rows[0].breakdown.entry_count, 3);
        assert_eq!(rows[1].breakdown.function, "Alpha");
        assert_eq!(rows[0].teams[0].team, "Infra", "busiest team first");
        assert_eq!(rows[0].teams[0].entry_count, 2);
        assert_eq!(rows[0].teams[1].team, "Apps");
    }

    #[test]
    fn zero_totals_never_serialize_with_a_negative_sign() {
        let entries = vec![entry(
            1,
            1,
            None,
            MethodType::Task,
            vec![impact(ImpactType::CostSavings, Some(-0.0))],
        )];
        let s = summary(&entries);
        assert!(s.total_cost_savings.is_sign_positive());
        assert_eq!(
            serde_json::to_value(&s).unwrap()["total_cost_savings"],
            0.0
        );
    }

    #[test]
    fn function_without_teams_is_flagged() {
        let functions = vec![Function {
            id: 1,
            name: "Engineering".into(),
            active: true,
            created_at: String::new(),
        }];
        let rows = functions_with_teams(&[], &functions, &[]);
        assert!(rows[0].has_no_teams);
        assert!(rows[0].teams.is_empty());
    }
}
