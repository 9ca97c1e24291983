//! Testbed orchestrator service: configuration, wiring and HTTP surface

pub mod api;
pub mod config;
