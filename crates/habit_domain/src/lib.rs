pub mod clock;
pub mod error;
pub mod export;
pub mod model;
pub mod period;
pub mod service;
pub mod snapshot;
pub mod stats;
pub mod validity;

pub use crate::error::{HabitError, SchemaError};
pub use crate::model::{AppState, OneOffTask, PeriodSnapshot, PeriodType, TaskTemplate};
pub use crate::service::{
    ConfirmationGate, HabitService, HabitServiceBuilder, NonDuePolicy, PendingWrite,
};
