use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::dates::calendar_date;

/// Weekly retrospective. Append-only.
///
/// `went_well`, `unblocked` and `proud_of` belong to the first reflection
/// format and are kept so older entries still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyReflection {
    pub id: String,
    #[serde(with = "calendar_date")]
    pub week_start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub went_well: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unblocked: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proud_of: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focused_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carry_forward: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WeeklyReflection {
    pub fn from_draft(id: String, draft: NewReflection, now: DateTime<Utc>) -> Self {
        Self {
            id,
            week_start_date: draft.week_start_date,
            went_well: draft.went_well,
            unblocked: draft.unblocked,
            proud_of: draft.proud_of,
            focused_on: draft.focused_on,
            contributed: draft.contributed,
            impact: draft.impact,
            learned: draft.learned,
            carry_forward: draft.carry_forward,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReflection {
    #[serde(with = "calendar_date")]
    pub week_start_date: NaiveDate,
    #[serde(default)]
    pub went_well: Option<String>,
    #[serde(default)]
    pub unblocked: Option<String>,
    #[serde(default)]
    pub proud_of: Option<String>,
    #[serde(default)]
    pub focused_on: Option<String>,
    #[serde(default)]
    pub contributed: Option<String>,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub learned: Option<String>,
    #[serde(default)]
    pub carry_forward: Option<String>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ReflectionRow {
    pub id: String,
    pub owner_id: String,
    pub week_start_date: NaiveDate,
    pub went_well: Option<String>,
    pub unblocked: Option<String>,
    pub proud_of: Option<String>,
    pub focused_on: Option<String>,
    pub contributed: Option<String>,
    pub impact: Option<String>,
    pub learned: Option<String>,
    pub carry_forward: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ReflectionRow> for WeeklyReflection {
    fn from(row: ReflectionRow) -> Self {
        Self {
            id: row.id,
            week_start_date: row.week_start_date,
            went_well: row.went_well,
            unblocked: row.unblocked,
            proud_of: row.proud_of,
            focused_on: row.focused_on,
            contributed: row.contributed,
            impact: row.impact,
            learned: row.learned,
            carry_forward: row.carry_forward,
            created_at: row.created_at,
        }
    }
}
