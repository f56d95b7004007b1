use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::dates::calendar_date;
use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WinCategory {
    Delivery,
    Stakeholder,
    Leadership,
    Process,
    Ai,
    Risk,
}

impl WinCategory {
    pub const ALL: [WinCategory; 6] = [
        WinCategory::Delivery,
        WinCategory::Stakeholder,
        WinCategory::Leadership,
        WinCategory::Process,
        WinCategory::Ai,
        WinCategory::Risk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WinCategory::Delivery => "delivery",
            WinCategory::Stakeholder => "stakeholder",
            WinCategory::Leadership => "leadership",
            WinCategory::Process => "process",
            WinCategory::Ai => "ai",
            WinCategory::Risk => "risk",
        }
    }

    /// Human-readable label used in summaries.
    pub fn label(&self) -> &'static str {
        match self {
            WinCategory::Delivery => "Delivery",
            WinCategory::Stakeholder => "Stakeholder",
            WinCategory::Leadership => "Leadership",
            WinCategory::Process => "Process Improvement",
            WinCategory::Ai => "AI / Automation",
            WinCategory::Risk => "Risk Mitigation",
        }
    }
}

impl FromStr for WinCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WinCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("category", s))
    }
}

impl fmt::Display for WinCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImpactType {
    TimeSaved,
    CostAvoided,
    RiskReduced,
    QualityImproved,
    CustomerSatisfaction,
}

impl ImpactType {
    pub const ALL: [ImpactType; 5] = [
        ImpactType::TimeSaved,
        ImpactType::CostAvoided,
        ImpactType::RiskReduced,
        ImpactType::QualityImproved,
        ImpactType::CustomerSatisfaction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactType::TimeSaved => "time-saved",
            ImpactType::CostAvoided => "cost-avoided",
            ImpactType::RiskReduced => "risk-reduced",
            ImpactType::QualityImproved => "quality-improved",
            ImpactType::CustomerSatisfaction => "customer-satisfaction",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ImpactType::TimeSaved => "Time Saved",
            ImpactType::CostAvoided => "Cost Avoided",
            ImpactType::RiskReduced => "Risk Reduced",
            ImpactType::QualityImproved => "Quality Improved",
            ImpactType::CustomerSatisfaction => "Customer Satisfaction",
        }
    }
}

impl FromStr for ImpactType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImpactType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("impact type", s))
    }
}

/// Records created before the field existed carry none and read as `Medium`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImpactLevel {
    High,
    #[default]
    Medium,
    Low,
}

impl ImpactLevel {
    pub const ALL: [ImpactLevel; 3] = [ImpactLevel::High, ImpactLevel::Medium, ImpactLevel::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::High => "High",
            ImpactLevel::Medium => "Medium",
            ImpactLevel::Low => "Low",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ImpactLevel::High => "High Impact",
            ImpactLevel::Medium => "Medium Impact",
            ImpactLevel::Low => "Low Impact",
        }
    }

    /// High 3, Medium 2, Low 1.
    pub fn weight(&self) -> u8 {
        match self {
            ImpactLevel::High => 3,
            ImpactLevel::Medium => 2,
            ImpactLevel::Low => 1,
        }
    }
}

impl FromStr for ImpactLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "High" => Ok(ImpactLevel::High),
            "Medium" => Ok(ImpactLevel::Medium),
            "Low" => Ok(ImpactLevel::Low),
            other => Err(UnknownVariant::new("impact level", other)),
        }
    }
}

/// One selectable value with its display label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Choice {
    pub value: &'static str,
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u8>,
}

/// Every category, impact type and impact level a client can offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Taxonomy {
    pub categories: Vec<Choice>,
    pub impact_types: Vec<Choice>,
    pub impact_levels: Vec<Choice>,
    pub default_impact_level: ImpactLevel,
}

impl Taxonomy {
    pub fn new() -> Self {
        Self {
            categories: WinCategory::ALL
                .iter()
                .map(|c| Choice {
                    value: c.as_str(),
                    label: c.label(),
                    weight: None,
                })
                .collect(),
            impact_types: ImpactType::ALL
                .iter()
                .map(|t| Choice {
                    value: t.as_str(),
                    label: t.label(),
                    weight: None,
                })
                .collect(),
            impact_levels: ImpactLevel::ALL
                .iter()
                .map(|l| Choice {
                    value: l.as_str(),
                    label: l.label(),
                    weight: Some(l.weight()),
                })
                .collect(),
            default_impact_level: ImpactLevel::default(),
        }
    }
}

/// A single logged achievement (Challenge / Action / Result).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Win {
    pub id: String,
    #[serde(with = "calendar_date")]
    pub date: NaiveDate,
    pub category: WinCategory,
    pub situation: String,
    pub action: String,
    pub impact: String,
    pub impact_type: ImpactType,
    #[serde(default)]
    pub impact_level: ImpactLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Win {
    pub fn from_draft(id: String, draft: NewWin, now: DateTime<Utc>) -> Self {
        Self {
            id,
            date: draft.date,
            category: draft.category,
            situation: draft.situation,
            action: draft.action,
            impact: draft.impact,
            impact_type: draft.impact_type,
            impact_level: draft.impact_level.unwrap_or_default(),
            evidence: draft.evidence,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merges the provided fields and refreshes `updated_at`.
    pub fn apply(&mut self, patch: &WinPatch, now: DateTime<Utc>) {
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(situation) = &patch.situation {
            self.situation = situation.clone();
        }
        if let Some(action) = &patch.action {
            self.action = action.clone();
        }
        if let Some(impact) = &patch.impact {
            self.impact = impact.clone();
        }
        if let Some(impact_type) = patch.impact_type {
            self.impact_type = impact_type;
        }
        if let Some(level) = patch.impact_level {
            self.impact_level = level;
        }
        if let Some(evidence) = &patch.evidence {
            self.evidence = Some(evidence.clone());
        }
        self.updated_at = now;
    }
}

/// Input for creating a win; `id` and the audit timestamps are assigned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWin {
    #[serde(with = "calendar_date")]
    pub date: NaiveDate,
    pub category: WinCategory,
    pub situation: String,
    pub action: String,
    pub impact: String,
    pub impact_type: ImpactType,
    #[serde(default)]
    pub impact_level: Option<ImpactLevel>,
    #[serde(default)]
    pub evidence: Option<String>,
}

/// Partial update. `id` and `createdAt` are not patchable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinPatch {
    #[serde(default, with = "calendar_date::option")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub category: Option<WinCategory>,
    #[serde(default)]
    pub situation: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub impact_type: Option<ImpactType>,
    #[serde(default)]
    pub impact_level: Option<ImpactLevel>,
    #[serde(default)]
    pub evidence: Option<String>,
}

/// A win as stored in the cloud `wins` table.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct WinRow {
    pub id: String,
    pub owner_id: String,
    pub date: NaiveDate,
    pub category: String,
    pub situation: String,
    pub action: String,
    pub impact: String,
    pub impact_type: String,
    pub impact_level: Option<String>,
    pub evidence: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<WinRow> for Win {
    type Error = UnknownVariant;

    fn try_from(row: WinRow) -> Result<Self, Self::Error> {
        Ok(Win {
            category: row.category.parse()?,
            impact_type: row.impact_type.parse()?,
            impact_level: row
                .impact_level
                .as_deref()
                .map(str::parse::<ImpactLevel>)
                .transpose()?
                .unwrap_or_default(),
            id: row.id,
            date: row.date,
            situation: row.situation,
            action: row.action,
            impact: row.impact,
            evidence: row.evidence,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Win {
        let at = DateTime::parse_from_rfc3339("2024-01-08T09:15:00Z")
            .unwrap()
            .with_timezone(&Utc);
        Win {
            id: "w-1".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            category: WinCategory::Ai,
            situation: "Manual triage took hours".into(),
            action: "I built an auto-labeller".into(),
            impact: "Triage time down 80%".into(),
            impact_type: ImpactType::TimeSaved,
            impact_level: ImpactLevel::High,
            evidence: Some("https://example.com/dash".into()),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_local_json_round_trip() {
        let win = sample();
        let text = serde_json::to_string(&win).unwrap();
        let back: Win = serde_json::from_str(&text).unwrap();
        assert_eq!(back, win);
    }

    #[test]
    fn test_wire_names() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["date"], "2024-01-08");
        assert_eq!(value["impactType"], "time-saved");
        assert_eq!(value["impactLevel"], "High");
        assert_eq!(value["category"], "ai");
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn test_legacy_record_without_impact_level() {
        let legacy = json!({
            "id": "old",
            "date": "2023-11-02T00:00:00.000Z",
            "category": "process",
            "situation": "s",
            "action": "a",
            "impact": "i",
            "impactType": "quality-improved",
            "createdAt": "2023-11-02T10:00:00.000Z",
            "updatedAt": "2023-11-02T10:00:00.000Z"
        });
        let win: Win = serde_json::from_value(legacy).unwrap();
        assert_eq!(win.impact_level, ImpactLevel::Medium);
        assert_eq!(win.evidence, None);

        let served = serde_json::to_value(&win).unwrap();
        assert_eq!(served["impactLevel"], "Medium");
    }

    #[test]
    fn test_cloud_row_without_level_reads_medium() {
        let win = sample();
        let row = WinRow {
            id: win.id,
            owner_id: "u".into(),
            date: win.date,
            category: "ai".into(),
            situation: win.situation,
            action: win.action,
            impact: win.impact,
            impact_type: "time-saved".into(),
            impact_level: None,
            evidence: None,
            created_at: win.created_at,
            updated_at: win.updated_at,
        };
        assert_eq!(Win::try_from(row).unwrap().impact_level, ImpactLevel::Medium);
    }

    #[test]
    fn test_draft_accepts_timestamp_dates() {
        let draft: NewWin = serde_json::from_value(json!({
            "date": "2024-01-08T12:00:00.000Z",
            "category": "delivery",
            "situation": "s",
            "action": "a",
            "impact": "i",
            "impactType": "time-saved"
        }))
        .unwrap();
        assert_eq!(draft.date, NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
        assert_eq!(draft.impact_level, None);

        let patch: WinPatch =
            serde_json::from_value(json!({"date": "2024-01-09T12:00:00.000Z"})).unwrap();
        assert_eq!(patch.date, NaiveDate::from_ymd_opt(2024, 1, 9));
        let empty: WinPatch = serde_json::from_value(json!({"impact": "x"})).unwrap();
        assert_eq!(empty.date, None);
    }

    #[test]
    fn test_labels_and_weights() {
        assert_eq!(ImpactType::CustomerSatisfaction.label(), "Customer Satisfaction");
        assert_eq!(ImpactLevel::High.label(), "High Impact");
        let weights: Vec<u8> = ImpactLevel::ALL.iter().map(|l| l.weight()).collect();
        assert_eq!(weights, vec![3, 2, 1]);
        assert_eq!(ImpactLevel::default(), ImpactLevel::Medium);
    }

    #[test]
    fn test_taxonomy_lists_every_choice() {
        let value = serde_json::to_value(Taxonomy::new()).unwrap();
        assert_eq!(value["categories"].as_array().unwrap().len(), 6);
        assert_eq!(value["categories"][4], json!({"value": "ai", "label": "AI / Automation"}));
        assert_eq!(value["impactTypes"][0]["label"], "Time Saved");
        assert_eq!(
            value["impactLevels"][0],
            json!({"value": "High", "label": "High Impact", "weight": 3})
        );
        assert_eq!(value["defaultImpactLevel"], "Medium");
    }

    #[test]
    fn test_apply_patch_refreshes_updated_at() {
        let mut win = sample();
        let later = win.updated_at + chrono::Duration::hours(2);
        let patch = WinPatch {
            impact: Some("Triage time down 90%".into()),
            ..Default::default()
        };
        win.apply(&patch, later);
        assert_eq!(win.impact, "Triage time down 90%");
        assert_eq!(win.action, "I built an auto-labeller");
        assert_eq!(win.updated_at, later);
        assert_ne!(win.created_at, later);
    }

    #[test]
    fn test_row_conversion_rejects_unknown_category() {
        let win = sample();
        let row = WinRow {
            id: win.id,
            owner_id: "u".into(),
            date: win.date,
            category: "sales".into(),
            situation: win.situation,
            action: win.action,
            impact: win.impact,
            impact_type: "time-saved".into(),
            impact_level: None,
            evidence: None,
            created_at: win.created_at,
            updated_at: win.updated_at,
        };
        let err = Win::try_from(row).unwrap_err();
        assert_eq!(err, UnknownVariant::new("category", "sales"));
    }

    #[test]
    fn test_enum_strings_match_serde() {
        for category in WinCategory::ALL {
            let json = serde_json::to_value(category).unwrap();
            assert_eq!(json, category.as_str());
            assert_eq!(category.as_str().parse::<WinCategory>().unwrap(), category);
        }
        for impact_type in ImpactType::ALL {
            let json = serde_json::to_value(impact_type).unwrap();
            assert_eq!(json, impact_type.as_str());
        }
    }
}
