// Derived dashboard statistics. Pure functions over the current record set;
// nothing is cached.

use std::collections::HashSet;

use chrono::{Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::dates::DateRange;
use crate::models::win::{ImpactLevel, Win, WinCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinStats {
    pub wins_this_week: usize,
    pub wins_this_month: usize,
    pub categories_covered: usize,
}

impl WinStats {
    pub fn compute(wins: &[Win], today: NaiveDate) -> Self {
        Self {
            wins_this_week: wins_this_week(wins, today),
            wins_this_month: wins_this_month(wins, today),
            categories_covered: categories_covered(wins, today),
        }
    }
}

pub fn count_in_range(wins: &[Win], range: DateRange) -> usize {
    wins.iter().filter(|w| range.contains(w.date)).count()
}

pub fn wins_this_week(wins: &[Win], today: NaiveDate) -> usize {
    count_in_range(wins, DateRange::week_of(today))
}

pub fn wins_this_month(wins: &[Win], today: NaiveDate) -> usize {
    count_in_range(wins, DateRange::month_of(today))
}

/// Distinct categories among this month's wins.
pub fn categories_covered(wins: &[Win], today: NaiveDate) -> usize {
    let month = DateRange::month_of(today);
    wins.iter()
        .filter(|w| month.contains(w.date))
        .map(|w| w.category)
        .collect::<HashSet<_>>()
        .len()
}

/// Wins inside `range`, newest first. Ties keep their stored order.
pub fn wins_in_range(wins: &[Win], range: DateRange) -> Vec<Win> {
    let mut selected: Vec<Win> = wins
        .iter()
        .filter(|w| range.contains(w.date))
        .cloned()
        .collect();
    selected.sort_by(|a, b| b.date.cmp(&a.date));
    selected
}

/// Timeline date presets. `Week` and `ThreeMonths` look back from today with
/// no upper bound; `Month` is the current calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePreset {
    All,
    Week,
    Month,
    #[serde(rename = "3months")]
    ThreeMonths,
}

impl DatePreset {
    pub fn range(self, today: NaiveDate) -> Option<DateRange> {
        match self {
            DatePreset::All => None,
            DatePreset::Week => Some(DateRange::new(today - Duration::days(7), NaiveDate::MAX)),
            DatePreset::Month => Some(DateRange::month_of(today)),
            DatePreset::ThreeMonths => {
                let start = today.checked_sub_months(Months::new(3)).unwrap_or(NaiveDate::MIN);
                Some(DateRange::new(start, NaiveDate::MAX))
            }
        }
    }
}

/// Timeline filter; every criterion left out matches all wins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinFilter {
    pub preset: Option<DatePreset>,
    pub category: Option<WinCategory>,
    pub impact_level: Option<ImpactLevel>,
    /// Case-insensitive substring of situation, action or impact.
    pub q: Option<String>,
}

impl WinFilter {
    pub fn matches(&self, win: &Win, today: NaiveDate) -> bool {
        if let Some(range) = self.preset.and_then(|p| p.range(today)) {
            if !range.contains(win.date) {
                return false;
            }
        }
        if self.category.is_some_and(|c| c != win.category) {
            return false;
        }
        if self.impact_level.is_some_and(|l| l != win.impact_level) {
            return false;
        }
        match self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let q = q.to_lowercase();
                [&win.situation, &win.action, &win.impact]
                    .iter()
                    .any(|text| text.to_lowercase().contains(&q))
            }
            None => true,
        }
    }
}

/// Wins passing `filter`, newest first.
pub fn filter_wins(wins: &[Win], filter: &WinFilter, today: NaiveDate) -> Vec<Win> {
    let mut selected: Vec<Win> = wins
        .iter()
        .filter(|w| filter.matches(w, today))
        .cloned()
        .collect();
    selected.sort_by(|a, b| b.date.cmp(&a.date));
    selected
}
