pub mod actors;
pub mod funnel;
pub mod stickiness;
pub mod trends;
