pub const TABLE_EVENTS: &str = "events";
pub const TABLE_PERSONS: &str = "persons";
pub const TABLE_STATIC_COHORT: &str = "person_static_cohort";

pub const COLUMN_TEAM_ID: &str = "team_id";
pub const COLUMN_TIMESTAMP: &str = "timestamp";
pub const COLUMN_EVENT: &str = "event";
pub const COLUMN_PERSON_ID: &str = "person_id";
pub const COLUMN_PERSON_PK: &str = "id";
pub const COLUMN_PROPERTIES: &str = "properties";
pub const COLUMN_PERSON_PROPERTIES: &str = "person_properties";
pub const COLUMN_COHORT_ID: &str = "cohort_id";
