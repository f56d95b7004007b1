// Manager-ready text summary and JSON backup documents.

pub mod handlers;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::models::dates::DateRange;
use crate::models::profile::UserProfile;
use crate::models::reflection::WeeklyReflection;
use crate::models::win::Win;
use crate::store::stats::wins_in_range;

/// Wins shown in a summary.
pub const TOP_WINS: usize = 5;

fn format_entry(index: usize, win: &Win) -> String {
    format!(
        "{}. {}\n   Problem: {}\n   Action: {}\n   Impact: {}",
        index + 1,
        win.category.label(),
        win.situation,
        win.action,
        win.impact
    )
}

/// The newest `TOP_WINS` wins in `range` as copy-ready text. `None` when the
/// range holds no wins.
pub fn manager_summary(wins: &[Win], range: DateRange) -> Option<String> {
    let selected = wins_in_range(wins, range);
    if selected.is_empty() {
        return None;
    }
    let header = format!(
        "📊 Impact Summary ({} - {})",
        range.start.format("%b %-d"),
        range.end.format("%b %-d, %Y")
    );
    let entries: Vec<String> = selected
        .iter()
        .take(TOP_WINS)
        .enumerate()
        .map(|(i, win)| format_entry(i, win))
        .collect();
    Some(format!("{header}\n\n{}", entries.join("\n\n")))
}

pub fn summary_filename(today: NaiveDate) -> String {
    format!("impact-summary-{}.txt", today.format("%Y-%m-%d"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub exported_at: DateTime<Utc>,
    pub wins: Vec<Win>,
    pub reflections: Vec<WeeklyReflection>,
    pub profile: UserProfile,
}

pub fn backup_filename(now: DateTime<Utc>) -> String {
    format!("ImpactLog_Backup_{}.json", now.format("%Y-%m-%dT%H-%M"))
}
