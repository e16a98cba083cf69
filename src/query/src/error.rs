use std::result;

use common::error::CommonError;
use thiserror::Error;

pub type Result<T> = result::Result<T, QueryError>;

#[derive(Error, Debug)]
pub enum QueryError {
    /// Caller-input defect detected at lowering time.
    #[error("validation {0:?}")]
    Validation(String),
    /// Degenerate condition tree that cannot be folded into a plan.
    #[error("composition {0:?}")]
    Composition(String),
    /// Plan construct unsupported by the requested dialect or context.
    #[error("render {0:?}")]
    Render(String),
    #[error("common {0:?}")]
    Common(#[from] CommonError),
}
