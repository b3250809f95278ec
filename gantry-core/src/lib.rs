//! Gantry Core
//!
//! Core types and abstractions for the Gantry CI/CD engine.
//!
//! This crate contains:
//! - Domain types: events, pipeline definitions, run state, cache entries
//! - DTOs: request/response bodies shared by the orchestrator and its clients
//! - The pipeline graph (gating validation and topological batches)
//! - The trigger evaluator deciding which events start a run

pub mod domain;
pub mod dto;
pub mod error;
pub mod graph;
pub mod source;
pub mod trigger;

pub use error::DefinitionError;
pub use graph::{PipelineGraph, TopologicalBatches};
pub use source::{PipelineSource, StaticSource};
pub use trigger::{AdmissionDecision, AdmissionReason, TriggerPolicy};
