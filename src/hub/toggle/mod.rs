mod actuator;
mod queue;
mod types;

pub use actuator::{Actuator, HttpActuator, VirtualActuator};
pub use queue::{QueueSettings, ToggleQueue};
pub use types::{QueueItemView, QueueSnapshot, QueueStats, ToggleOutcome, ToggleTarget};
