//! Data Transfer Objects for the orchestrator API
//!
//! Request and response bodies exchanged between the orchestrator and its
//! clients (CLI, webhooks). Run state itself travels as
//! [`crate::domain::run::RunState`].

pub mod pipeline;
pub mod run;
