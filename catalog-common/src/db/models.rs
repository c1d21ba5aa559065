//! Database models for the catalog domain

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Number of fixed impact slots carried by every entry
pub const IMPACT_SLOTS: usize = 4;

/// Maturity/repeatability classification of a submitted method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodType {
    Workflow,
    Task,
    Experiment,
}

impl MethodType {
    pub const ALL: [MethodType; 3] = [MethodType::Workflow, MethodType::Task, MethodType::Experiment];

    pub fn as_str(&self) -> &'static str {
        match self {
            MethodType::Workflow => "workflow",
            MethodType::Task => "task",
            MethodType::Experiment => "experiment",
        }
    }

    /// Parse a stored/imported value; `None` for anything outside the domain
    pub fn parse(s: &str) -> Option<MethodType> {
        match s {
            "workflow" => Some(MethodType::Workflow),
            "task" => Some(MethodType::Task),
            "experiment" => Some(MethodType::Experiment),
            _ => None,
        }
    }
}

impl std::fmt::Display for MethodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MethodType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MethodType::parse(s).ok_or_else(|| Error::InvalidInput(format!("Invalid method_type: {s}")))
    }
}

/// Outcome classification of one impact slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactType {
    CostSavings,
    TimeSavings,
    Quality,
    NewCapability,
}

impl ImpactType {
    pub const ALL: [ImpactType; 4] = [
        ImpactType::CostSavings,
        ImpactType::TimeSavings,
        ImpactType::Quality,
        ImpactType::NewCapability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactType::CostSavings => "cost_savings",
            ImpactType::TimeSavings => "time_savings",
            ImpactType::Quality => "quality",
            ImpactType::NewCapability => "new_capability",
        }
    }

    /// Human-readable label used by the impact-type dashboard breakdown
    pub fn label(&self) -> &'static str {
        match self {
            ImpactType::CostSavings => "Cost Savings",
            ImpactType::TimeSavings => "Time Savings",
            ImpactType::Quality => "Quality Improvement",
            ImpactType::NewCapability => "New Capability",
        }
    }

    pub fn parse(s: &str) -> Option<ImpactType> {
        match s {
            "cost_savings" => Some(ImpactType::CostSavings),
            "time_savings" => Some(ImpactType::TimeSavings),
            "quality" => Some(ImpactType::Quality),
            "new_capability" => Some(ImpactType::NewCapability),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImpactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How often the reported raw magnitude recurs.
///
/// `Quarterly` is accepted at the model level for forward compatibility but
/// is not stored: the entries table CHECK constraint and the import
/// normalizer both restrict persisted values to the first four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    OneTime,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::OneTime => "one_time",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
        }
    }

    pub fn parse(s: &str) -> Option<Frequency> {
        match s {
            "one_time" => Some(Frequency::OneTime),
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            "monthly" => Some(Frequency::Monthly),
            "quarterly" => Some(Frequency::Quarterly),
            _ => None,
        }
    }

    /// True for values the entries table accepts
    pub fn storable(&self) -> bool {
        !matches!(self, Frequency::Quarterly)
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Taxonomy entities ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub id: i64,
    pub name: String,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub function_id: i64,
    pub name: String,
    pub active: bool,
    pub created_at: String,
    /// Owning function's name, resolved on read
    pub function_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub id: i64,
    pub name: String,
    /// Marks the free-text fallback row (historically the row named "Other")
    pub is_fallback: bool,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub id: i64,
    pub name: String,
    pub icon: Option<String>,
    /// Marks the free-text fallback row (historically the row named "Other")
    pub is_fallback: bool,
    pub active: bool,
    pub created_at: String,
}

/// A taxonomy row named "other" (any case) is the free-text fallback.
/// Creates and renames derive the flag from this so legacy import files
/// keep working without a dedicated column in their format.
pub fn derives_fallback(name: &str) -> bool {
    name.eq_ignore_ascii_case("other")
}

// ============ Entries ============

/// One of up to four independent outcome records attached to an entry.
/// A slot is populated iff `impact_type` is set; the other fields are
/// meaningless without it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Impact {
    #[serde(rename = "type")]
    pub impact_type: Option<ImpactType>,
    pub value: Option<f64>,
    pub frequency: Option<Frequency>,
    pub time_unit: Option<String>,
    /// Pre-normalized annual rate, computed by the submitting client
    pub annual_value: Option<f64>,
    pub description: Option<String>,
}

impl Impact {
    pub fn is_empty(&self) -> bool {
        self.impact_type.is_none()
    }
}

/// Convert a client-supplied impact list (0..=4 slots) into the fixed array
pub fn impact_slots(impacts: Vec<Impact>) -> Result<[Impact; IMPACT_SLOTS]> {
    if impacts.len() > IMPACT_SLOTS {
        return Err(Error::InvalidInput(format!(
            "At most {IMPACT_SLOTS} impact slots are supported, got {}",
            impacts.len()
        )));
    }
    let mut slots: [Impact; IMPACT_SLOTS] = Default::default();
    for (slot, impact) in slots.iter_mut().zip(impacts) {
        *slot = impact;
    }
    Ok(slots)
}

/// A single submitted record of one AI-assisted method (read model)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub function_id: i64,
    /// Null means "function-level, no team"
    pub team_id: Option<i64>,
    pub method_type: MethodType,
    pub capability_id: i64,
    /// Free text used when the capability resolves to the fallback row
    pub capability_other: Option<String>,
    pub description: String,
    /// Ordered tool ids; stale ids are tolerated at read time
    pub tools_used: Vec<i64>,
    /// Free-text tool names used when `tools_used` contains the fallback tool
    pub other_tools: Vec<String>,
    pub impacts: [Impact; IMPACT_SLOTS],
    pub submitted_by: Option<String>,
    pub submitted_at: String,
    pub updated_at: String,
    pub function_name: String,
    pub team_name: Option<String>,
    pub capability_name: String,
}

/// Payload for creating an entry (direct submission or bulk import)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntry {
    pub function_id: i64,
    #[serde(default)]
    pub team_id: Option<i64>,
    pub method_type: MethodType,
    pub capability_id: i64,
    #[serde(default)]
    pub capability_other: Option<String>,
    pub description: String,
    #[serde(default)]
    pub tools_used: Vec<i64>,
    #[serde(default)]
    pub other_tools: Vec<String>,
    #[serde(default)]
    pub impacts: Vec<Impact>,
    #[serde(default)]
    pub submitted_by: Option<String>,
}

/// Partial update for an entry. Every field is tri-state: a field absent
/// from the payload is left untouched, an explicit `null` clears a nullable
/// field, and a value replaces it. Nullable fields use double-`Option` so
/// the first two cases stay distinguishable after deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryPatch {
    #[serde(default)]
    pub function_id: Option<i64>,
    #[serde(default, with = "serde_with::rust::double_option")]
    pub team_id: Option<Option<i64>>,
    #[serde(default)]
    pub method_type: Option<MethodType>,
    #[serde(default)]
    pub capability_id: Option<i64>,
    #[serde(default, with = "serde_with::rust::double_option")]
    pub capability_other: Option<Option<String>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tools_used: Option<Vec<i64>>,
    #[serde(default, with = "serde_with::rust::double_option")]
    pub other_tools: Option<Option<Vec<String>>>,
    /// Replaces all four slots when present
    #[serde(default)]
    pub impacts: Option<Vec<Impact>>,
    #[serde(default, with = "serde_with::rust::double_option")]
    pub submitted_by: Option<Option<String>>,
}

// ============ Users & sessions ============

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub active: bool,
    pub must_change_password: bool,
    pub failed_attempts: i64,
    pub locked_until: Option<String>,
    pub created_at: String,
}

/// An authenticated session joined to its user
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub username: String,
    pub role: String,
    pub must_change_password: bool,
    pub expires_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_type_round_trips_through_strings() {
        for mt in MethodType::ALL {
            assert_eq!(MethodType::parse(mt.as_str()), Some(mt));
        }
        assert_eq!(MethodType::parse("bogus"), None);
    }

    #[test]
    fn impact_type_labels_are_distinct() {
        let labels: std::collections::HashSet<_> =
            ImpactType::ALL.iter().map(|t| t.label()).collect();
        assert_eq!(labels.len(), 4);
    }

    #[test]
    fn patch_distinguishes_absent_from_null() {
        let patch: EntryPatch = serde_json::from_str(r#"{"description": "updated"}"#).unwrap();
        assert_eq!(patch.description.as_deref(), Some("updated"));
        assert!(patch.team_id.is_none(), "absent field must stay untouched");

        let patch: EntryPatch = serde_json::from_str(r#"{"team_id": null}"#).unwrap();
        assert_eq!(patch.team_id, Some(None), "explicit null must clear the field");

        let patch: EntryPatch = serde_json::from_str(r#"{"team_id": 7}"#).unwrap();
        assert_eq!(patch.team_id, Some(Some(7)));
    }

    #[test]
    fn impact_slots_pads_and_rejects_overflow() {
        let one = vec![Impact { impact_type: Some(ImpactType::Quality), ..Default::default() }];
        let slots = impact_slots(one).unwrap();
        assert!(!slots[0].is_empty());
        assert!(slots[1].is_empty() && slots[2].is_empty() && slots[3].is_empty());

        let five = vec![Impact::default(); 5];
        assert!(impact_slots(five).is_err());
    }

    #[test]
    fn fallback_derivation_is_case_insensitive() {
        assert!(derives_fallback("Other"));
        assert!(derives_fallback("OTHER"));
        assert!(!derives_fallback("Gemini"));
    }

    #[test]
    fn quarterly_is_model_only() {
        assert_eq!(Frequency::parse("quarterly"), Some(Frequency::Quarterly));
        assert!(!Frequency::Quarterly.storable());
        assert!(Frequency::Monthly.storable());
    }
}
