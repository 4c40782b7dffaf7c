//! Service layer: annotation, scheduling, and the broker-facing flows.
//!
//! Nothing here touches the terminal; the CLI drives these services and
//! renders their results.

pub mod aggregate;
pub mod annotation;
pub mod coordinator;
pub mod producer;
pub mod relay;
pub mod retry;

pub use aggregate::{Aggregator, FinalReport};
pub use coordinator::{Coordinator, CoordinatorError, CoordinatorOptions};
pub use relay::{Disposition, Relay, RelayOptions, RelayStats};
