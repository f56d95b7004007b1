use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone, Weekday};

/// Weeks start on Monday everywhere in ImpactLog.
pub const WEEK_STARTS_ON: Weekday = Weekday::Mon;

/// Serde adapter for calendar dates.
///
/// Writes `YYYY-MM-DD`. Reads that form or a full ISO-8601 timestamp, which is
/// how records written before the date-only format stored the field.
pub mod calendar_date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(super::DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_calendar_date(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid calendar date '{raw}'")))
    }

    /// Same formats for optional fields; `null` and a missing field read as `None`.
    pub mod option {
        use chrono::NaiveDate;
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            date: &Option<NaiveDate>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match date {
                Some(date) => super::serialize(date, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDate>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| {
                    crate::models::dates::parse_calendar_date(&raw)
                        .ok_or_else(|| de::Error::custom(format!("invalid calendar date '{raw}'")))
                })
                .transpose()
        }
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses `YYYY-MM-DD` or an RFC 3339 timestamp into a calendar date.
/// Timestamps are read in the server's local time zone, the same calendar
/// that decides "today".
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    parse_calendar_date_in(raw, &Local)
}

pub fn parse_calendar_date_in<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok().or_else(|| {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(tz).date_naive())
    })
}

/// Closed interval of calendar dates, inclusive at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// The Monday-start week containing `day`.
    pub fn week_of(day: NaiveDate) -> Self {
        let week = day.week(WEEK_STARTS_ON);
        Self::new(week.first_day(), week.last_day())
    }

    /// The calendar month containing `day`.
    pub fn month_of(day: NaiveDate) -> Self {
        let first = day.with_day(1).unwrap_or(day);
        let next_month = if first.month() == 12 {
            NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
        };
        let last = next_month
            .map(|d| d - Duration::days(1))
            .unwrap_or(first);
        Self::new(first, last)
    }

    /// The `days` days leading up to and including `today`.
    pub fn trailing_days(today: NaiveDate, days: i64) -> Self {
        Self::new(today - Duration::days(days), today)
    }
}

/// Monday of the week containing `day`; reflections are keyed by it.
pub fn week_start(day: NaiveDate) -> NaiveDate {
    day.week(WEEK_STARTS_ON).first_day()
}
