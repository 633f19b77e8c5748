pub mod coordinator;
pub mod errors;

pub use coordinator::{CoordinatorSettings, INTERRUPTED_MESSAGE, JobCoordinator, RecoveryReport, SubmitRequest, SubmittedJob};
pub use errors::Error;
