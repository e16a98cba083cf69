use serde::Deserialize;
use serde::Serialize;

use crate::query::DateRange;
use crate::query::Series;
use crate::query::TimeIntervalUnit;

/// Sequential-steps query specification. Steps must complete in order within
/// the conversion window, counted from the first step's occurrence.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FunnelsQuery {
    pub series: Vec<Series>,
    pub date_range: DateRange,
    pub window: FunnelWindow,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FunnelWindow {
    pub interval: i64,
    pub unit: TimeIntervalUnit,
}

impl FunnelWindow {
    pub fn seconds(&self) -> i64 {
        self.interval * self.unit.seconds()
    }
}

/// Maps a required step count or range to actor membership.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum StepSelector {
    /// Completed at least the given step (1-based).
    Reached(i64),
    /// Completed the step before the given one, but not the step itself.
    DroppedOffAt(i64),
    /// Deepest completed step is one of the given set.
    Steps(Vec<i64>),
}
