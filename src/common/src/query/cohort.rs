use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::query::IntOrString;
use crate::query::PropValueOperation;
use crate::query::PropertyFilter;

/// Boolean combinator of a property group.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupOperator {
    And,
    Or,
}

/// Node of the cohort condition tree: a boolean combination of nested groups
/// and leaf conditions. A group with no children lowers to "no condition".
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PropertyGroup {
    #[serde(rename = "type")]
    pub operator: GroupOperator,
    pub values: Vec<PropertyGroupValue>,
}

impl PropertyGroup {
    pub fn new(operator: GroupOperator, values: Vec<PropertyGroupValue>) -> Self {
        PropertyGroup { operator, values }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Materializes a stored cohort definition payload into the typed tree.
    pub fn from_json(raw: &serde_json::Value) -> Result<PropertyGroup> {
        Ok(serde_json::from_value(raw.to_owned())?)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum PropertyGroupValue {
    Group(PropertyGroup),
    Property(Property),
}

/// A leaf condition. Closed over the three condition kinds so the lowering
/// engine matches exhaustively.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Property {
    #[serde(rename = "behavioral")]
    Behavioral(BehavioralProperty),
    #[serde(rename = "person")]
    Person(PersonProperty),
    #[serde(rename = "static-cohort")]
    StaticCohort(StaticCohortProperty),
}

/// Behavioral primitive tag. New primitives added here force every dispatch
/// site to handle them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BehavioralType {
    PerformedEvent,
    PerformedEventFirstTime,
    PerformedEventMultiple,
    PerformedEventSequence,
    StoppedPerformingEvent,
    RestartedPerformingEvent,
    PerformedEventRegularly,
}

/// A predicate over an actor's event history.
///
/// Fields carrying caller input stay loosely typed (`event_type`,
/// `time_interval`, the numeric fields): the lowering engine validates them
/// and reports the offending field, instead of rejecting the whole payload at
/// parse time. When both `explicit_datetime` and `time_value`/`time_interval`
/// are set, `explicit_datetime` takes precedence.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BehavioralProperty {
    pub value: BehavioralType,
    pub key: String,
    pub event_type: Option<String>,
    pub time_value: Option<IntOrString>,
    pub time_interval: Option<String>,
    pub explicit_datetime: Option<String>,
    pub seq_event: Option<String>,
    pub seq_event_type: Option<String>,
    pub seq_time_value: Option<IntOrString>,
    pub seq_time_interval: Option<String>,
    pub operator: Option<PropValueOperation>,
    pub operator_value: Option<IntOrString>,
    pub min_periods: Option<IntOrString>,
    pub event_filters: Option<Vec<PropertyFilter>>,
}

impl BehavioralProperty {
    /// Returns a copy whose occurrence window is the sequence window.
    ///
    /// `explicit_datetime` is cleared so the override applies even when the
    /// base property carried an explicit datetime.
    pub fn with_sequence_time_window(&self) -> Self {
        BehavioralProperty {
            time_value: self.seq_time_value.clone(),
            time_interval: self.seq_time_interval.clone(),
            explicit_datetime: None,
            ..self.clone()
        }
    }
}

/// An attribute predicate over the actor itself.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PersonProperty {
    pub key: String,
    pub value: Option<serde_json::Value>,
    pub operator: Option<PropValueOperation>,
}

/// Membership in a precomputed static cohort.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StaticCohortProperty {
    pub key: String,
    pub value: u64,
}
