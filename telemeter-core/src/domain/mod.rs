//! Core domain types
//!
//! These types are produced while a step runs and handed to the delivery
//! subsystem once the step has finished.

pub mod log;
pub mod telemetry;
