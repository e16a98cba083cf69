use serde::Deserialize;
use serde::Serialize;

use crate::query::DateRange;
use crate::query::PropValueOperation;
use crate::query::Series;
use crate::query::TimeIntervalUnit;

/// Regularity query specification: how many distinct periods of `interval`
/// granularity an actor was active in, where "active" means the per-period
/// occurrence count satisfies the criteria.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StickinessQuery {
    pub series: Vec<Series>,
    pub date_range: DateRange,
    pub interval: TimeIntervalUnit,
    pub criteria: StickinessCriteria,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StickinessCriteria {
    pub operator: PropValueOperation,
    pub value: i64,
}
