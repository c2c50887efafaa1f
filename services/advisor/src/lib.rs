//! Bus rebalancing advisor library.
//!
//! This crate ships the `advisor` binary, but exposes its pieces so the
//! pipeline can be assembled with test doubles and driven from integration
//! tests.

pub mod advisor;
pub mod api;
pub mod approval;
pub mod config;
pub mod distance;
pub mod expiry;
pub mod loader;
pub mod notify;
pub mod state;
