//! Prometheus metrics for trust-manager
//!
//! This module exposes metrics for monitoring controller health and
//! reconciliation performance.

pub mod prometheus;

pub use prometheus::*;
