pub use cohort::CohortQuery;
pub use context::Context;
pub use context::PersonsOnEventsMode;
pub use error::Result;
pub use printer::Dialect;

pub mod ast;
pub mod cohort;
pub mod context;
pub mod error;
pub mod expr;
pub mod printer;
pub mod provider;
pub mod queries;
