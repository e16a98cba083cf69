use serde::Deserialize;
use serde::Serialize;

use crate::query::DateRange;
use crate::query::Series;

/// Occurrence query specification: which actors emitted the series events
/// inside the date range.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TrendsQuery {
    pub series: Vec<Series>,
    pub date_range: DateRange,
}
