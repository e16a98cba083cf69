use chrono::DateTime;
use chrono::Utc;

/// How person attributes are materialized relative to event rows.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub enum PersonsOnEventsMode {
    #[default]
    Disabled,
    /// Person attributes are denormalized onto each event row; person filters
    /// belong inside the event query itself.
    PersonIdNoOverridePropertiesOnEvents,
    PersonIdOverridePropertiesOnEvents,
}

#[derive(Default, Clone)]
pub struct Context {
    pub team_id: u64,
    pub cur_time: DateTime<Utc>,
    pub enable_subqueries: bool,
    pub persons_on_events_mode: PersonsOnEventsMode,
}

impl Context {
    pub fn new(team_id: u64) -> Self {
        Self {
            team_id,
            enable_subqueries: true,
            ..Default::default()
        }
    }
}
