use thiserror::Error;

use crate::model::PeriodType;

/// Failures raised by [`HabitService`](crate::HabitService) mutations.
#[derive(Debug, Error)]
pub enum HabitError {
    #[error("task title must not be empty")]
    EmptyTitle,
    #[error("unknown task template `{0}`")]
    UnknownTemplate(String),
    #[error("task `{template_id}` is not due in period `{period_key}`")]
    TaskNotDue {
        template_id: String,
        period_key: String,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// A habit document that failed validation. Remote documents are never
/// adopted unless they decode and validate cleanly.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("malformed habit document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("template id `{0}` appears more than once")]
    DuplicateTemplate(String),
    #[error("template `{0}` has a deletion time but is still marked active")]
    DeletedButActive(String),
    #[error("snapshot stored under `{key}` carries period key `{period_key}`")]
    KeyMismatch { key: String, period_key: String },
    #[error("`{key}` is not a valid {period_type} period key")]
    InvalidPeriodKey { key: String, period_type: PeriodType },
    #[error("snapshot `{key}` lists due task `{id}` more than once")]
    DuplicateDueTask { key: String, id: String },
    #[error("snapshot `{key}` contains one-off task id `{id}` more than once")]
    DuplicateOneOff { key: String, id: String },
    #[error("unknown period type `{0}`")]
    UnknownPeriodType(String),
}
