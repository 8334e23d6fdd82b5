//! Cooperative multi-stage operations.

pub mod progress;
pub mod runner;
pub mod stage;
pub mod worker;

pub use progress::{ChannelReporter, OperationEvent, OperationKind, OperationReporter};
pub use runner::{ErrorFlag, Operation, OperationState, UserSettings};
pub use stage::Stage;
pub use worker::WorkerOperation;
