//! Leasing engine: allocation, completion, lease reclamation and the
//! rate-limited proxy rotation queue.

pub mod allocator;
pub mod clock;
pub mod completion;
pub mod keys;
mod lifecycle;
pub mod reclaimer;
pub mod rescan;
pub mod services;
pub mod toggle;

#[cfg(test)]
pub(crate) mod tests;

pub use allocator::Allocator;
pub use completion::CompletionHandler;
pub use reclaimer::LeaseReclaimer;
pub use rescan::SaturationRescan;
pub use services::HubServices;
pub use toggle::{Actuator, HttpActuator, ToggleQueue, ToggleTarget};
