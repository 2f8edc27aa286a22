//! Service layer
//!
//! Services contain the delivery logic of the runner: shaping payloads,
//! batching logs, collecting them from `tracing` and keeping secrets out
//! of every output.
//!
//! Collaborators sit behind traits (`Transport`, `LogCollector`,
//! `AmbientContext`) so each piece can be tested on its own.

pub mod ambient;
pub mod delivery;
pub mod dispatch;
pub mod log_collector;
pub mod payload;
pub mod secrets;

// Re-export traits
pub use log_collector::LogCollector;

// Re-export implementations
pub use ambient::PipelineEnvironment;
pub use delivery::{Delivery, DeliveryTarget};
pub use log_collector::{CollectorLayer, InMemoryLogCollector};
pub use secrets::{MaskingMakeWriter, SecretRegistry};
