//! Data Transfer Objects for the collector wire format
//!
//! DTOs are serialized fresh for every outbound request and never
//! persisted.

pub mod envelope;
