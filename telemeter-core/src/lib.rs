//! Telemeter Core
//!
//! Core types shared by the collector client and the step runner.
//!
//! This crate contains:
//! - Domain types: telemetry records and captured log messages
//! - DTOs: the envelopes sent to the collector

pub mod domain;
pub mod dto;
