use common::query::cohort::BehavioralProperty;
use common::query::DateValue;
use common::query::EventRef;
use common::query::IntOrString;
use common::query::TimeIntervalUnit;

use crate::error::QueryError;
use crate::Result;

/// validates a caller-supplied count or time value, naming the field
pub fn parse_and_validate_positive_integer(
    value: Option<&IntOrString>,
    field: &str,
) -> Result<i64> {
    let parsed = match value {
        Some(IntOrString::Int(n)) => Some(*n),
        Some(IntOrString::String(s)) => s.parse::<i64>().ok(),
        None => None,
    };
    match parsed {
        Some(n) if n > 0 => Ok(n),
        _ => Err(QueryError::Validation(format!(
            "{field} must be a positive integer"
        ))),
    }
}

/// validates a caller-supplied interval, naming the field
pub fn validate_interval(value: Option<&str>, field: &str) -> Result<TimeIntervalUnit> {
    match value {
        Some("day") => Ok(TimeIntervalUnit::Day),
        Some("week") => Ok(TimeIntervalUnit::Week),
        Some("month") => Ok(TimeIntervalUnit::Month),
        Some("year") => Ok(TimeIntervalUnit::Year),
        _ => Err(QueryError::Validation(format!(
            "{field} must be one of day, week, month or year"
        ))),
    }
}

pub fn date_value(value: &str, field: &str) -> Result<DateValue> {
    DateValue::parse(value).map_err(|_| {
        QueryError::Validation(format!("{value:?} is not a valid value for {field}"))
    })
}

pub fn event_ref(prop: &BehavioralProperty) -> Result<EventRef> {
    to_event_ref(prop.event_type.as_deref(), &prop.key)
}

pub fn seq_event_ref(prop: &BehavioralProperty) -> Result<EventRef> {
    let seq_event = prop
        .seq_event
        .as_deref()
        .ok_or_else(|| QueryError::Validation("seq_event must be set".to_string()))?;
    to_event_ref(prop.seq_event_type.as_deref(), seq_event)
}

fn to_event_ref(event_type: Option<&str>, key: &str) -> Result<EventRef> {
    match event_type {
        Some("events") => Ok(EventRef::Event(key.to_owned())),
        Some("actions") => key.parse::<u64>().map(EventRef::Action).map_err(|_| {
            QueryError::Validation(format!("{key:?} is not a valid action id"))
        }),
        _ => Err(QueryError::Validation(
            "Event type must be 'events' or 'actions'".to_string(),
        )),
    }
}
