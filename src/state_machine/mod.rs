mod phase;
mod task;

pub use phase::{Phase, PollOutcome, TaskStatus, TransitionError};
pub use task::{ErrorDetail, ErrorKind, Task};
