use std::fmt;
use std::fmt::Display;

use chrono::DateTime;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::Utc;
use chronoutil::RelativeDuration;
use serde::Deserialize;
use serde::Serialize;

use crate::error::CommonError;
use crate::error::Result;

pub mod cohort;
pub mod funnel;
pub mod stickiness;
pub mod trends;

/// Operators applied to property values.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PropValueOperation {
    Exact,
    Eq,
    IsNot,
    Icontains,
    NotIcontains,
    Regex,
    NotRegex,
    Gt,
    Gte,
    Lt,
    Lte,
    IsSet,
    IsNotSet,
}

/// Reference to an event or an action the condition targets.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum EventRef {
    Event(String),
    Action(u64),
}

impl EventRef {
    pub fn name(&self) -> String {
        match self {
            EventRef::Event(name) => name.to_owned(),
            EventRef::Action(id) => id.to_string(),
        }
    }
}

/// Numeric payload field that may arrive as a JSON number or a string.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum IntOrString {
    Int(i64),
    String(String),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeIntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeIntervalUnit {
    pub fn seconds(&self) -> i64 {
        match self {
            TimeIntervalUnit::Second => 1,
            TimeIntervalUnit::Minute => 60,
            TimeIntervalUnit::Hour => 3600,
            TimeIntervalUnit::Day => 86400,
            TimeIntervalUnit::Week => 604800,
            TimeIntervalUnit::Month => 2592000,
            TimeIntervalUnit::Year => 31536000,
        }
    }

    pub fn relative_duration(&self, n: i64) -> RelativeDuration {
        match self {
            TimeIntervalUnit::Second => RelativeDuration::seconds(n),
            TimeIntervalUnit::Minute => RelativeDuration::minutes(n),
            TimeIntervalUnit::Hour => RelativeDuration::hours(n),
            TimeIntervalUnit::Day => RelativeDuration::days(n),
            TimeIntervalUnit::Week => RelativeDuration::weeks(n),
            TimeIntervalUnit::Month => RelativeDuration::months(n as i32),
            TimeIntervalUnit::Year => RelativeDuration::years(n as i32),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TimeIntervalUnit::Second => "second",
            TimeIntervalUnit::Minute => "minute",
            TimeIntervalUnit::Hour => "hour",
            TimeIntervalUnit::Day => "day",
            TimeIntervalUnit::Week => "week",
            TimeIntervalUnit::Month => "month",
            TimeIntervalUnit::Year => "year",
        }
    }

    /// Single-letter form used in relative date literals, `-30d` style.
    pub fn abbrev(&self) -> &str {
        match self {
            TimeIntervalUnit::Second => "s",
            TimeIntervalUnit::Minute => "min",
            TimeIntervalUnit::Hour => "h",
            TimeIntervalUnit::Day => "d",
            TimeIntervalUnit::Week => "w",
            TimeIntervalUnit::Month => "m",
            TimeIntervalUnit::Year => "y",
        }
    }

    pub fn interval_name(&self) -> &str {
        match self {
            TimeIntervalUnit::Second => "SECOND",
            TimeIntervalUnit::Minute => "MINUTE",
            TimeIntervalUnit::Hour => "HOUR",
            TimeIntervalUnit::Day => "DAY",
            TimeIntervalUnit::Week => "WEEK",
            TimeIntervalUnit::Month => "MONTH",
            TimeIntervalUnit::Year => "YEAR",
        }
    }
}

/// A point in time, either anchored to the query's current time or absolute.
///
/// Relative values keep their `-30d` form until rendering so the same plan
/// can be resolved against different current times.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum DateValue {
    Relative { n: i64, unit: TimeIntervalUnit },
    Absolute(DateTime<Utc>),
}

impl DateValue {
    /// Parses a datetime literal: `-Nd`/`-Nw`/`-Nm`/`-Ny`/`-Nh` relative
    /// forms, `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or RFC 3339.
    pub fn parse(value: &str) -> Result<DateValue> {
        if let Some(rest) = value.strip_prefix('-') {
            if rest.len() >= 2 && rest.is_char_boundary(rest.len() - 1) {
                let (digits, suffix) = rest.split_at(rest.len() - 1);
                let unit = match suffix {
                    "h" => Some(TimeIntervalUnit::Hour),
                    "d" => Some(TimeIntervalUnit::Day),
                    "w" => Some(TimeIntervalUnit::Week),
                    "m" => Some(TimeIntervalUnit::Month),
                    "y" => Some(TimeIntervalUnit::Year),
                    _ => None,
                };
                if let (Some(unit), Ok(n)) = (unit, digits.parse::<i64>()) {
                    if n > 0 {
                        return Ok(DateValue::Relative { n, unit });
                    }
                }
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            let dt = date.and_hms_opt(0, 0, 0).unwrap_or_default();
            return Ok(DateValue::Absolute(DateTime::from_naive_utc_and_offset(dt, Utc)));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
            return Ok(DateValue::Absolute(DateTime::from_naive_utc_and_offset(dt, Utc)));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(DateValue::Absolute(dt.with_timezone(&Utc)));
        }
        Err(CommonError::BadRequest(format!(
            "{value:?} is not a valid datetime literal"
        )))
    }

    /// Resolves to an absolute instant against the given current time.
    pub fn resolve(&self, cur_time: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DateValue::Relative { n, unit } => cur_time - unit.relative_duration(*n),
            DateValue::Absolute(dt) => *dt,
        }
    }
}

impl Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DateValue::Relative { n, unit } => write!(f, "-{}{}", n, unit.abbrev()),
            DateValue::Absolute(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Half-open window over the event timeline. A missing `to` means "until now".
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub from: DateValue,
    pub to: Option<DateValue>,
}

impl DateRange {
    pub fn since(from: DateValue) -> Self {
        DateRange { from, to: None }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterScope {
    #[default]
    Event,
    Person,
}

/// A single property predicate applied to the rows an event match scans.
///
/// Person-scoped filters address person attributes denormalized onto event
/// rows and are the vehicle for person-property pushdown.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PropertyFilter {
    pub key: String,
    pub value: Option<serde_json::Value>,
    pub operator: Option<PropValueOperation>,
    #[serde(rename = "type", default)]
    pub scope: FilterScope,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum SeriesMath {
    Total,
    FirstTimeForActor,
}

/// One step of an insight query: the event match plus its filters.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Series {
    pub event: EventRef,
    pub math: Option<SeriesMath>,
    pub filters: Option<Vec<PropertyFilter>>,
}

impl Series {
    pub fn new(event: EventRef) -> Self {
        Series {
            event,
            math: None,
            filters: None,
        }
    }
}
