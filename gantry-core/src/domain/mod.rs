//! Core domain types
//!
//! This module contains the core domain structures used across Gantry crates.
//! Definitions are produced by the loader (gantry-lua), run state is owned by
//! the runner and served read-only by the orchestrator.

pub mod cache;
pub mod event;
pub mod log;
pub mod pipeline;
pub mod run;
