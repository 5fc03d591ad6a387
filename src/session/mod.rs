//! Sessions: data model, derived entities, storage and the state machine.

pub mod entities;
mod error;
mod machine;
mod model;
mod store;

pub use entities::DerivedEntities;
pub use error::SessionError;
pub use machine::{
    Advance, PartProgress, Progress, SessionMachine, SessionSummary, StepProgress, StepView,
    SummaryStep,
};
pub use model::{
    ContextEntry, ContextSnapshot, Problem, Session, SessionStatus, StepResult, StepStatus,
};
pub use store::{JsonDirPersistence, MemoryPersistence, SessionPersistence, SessionStore};
