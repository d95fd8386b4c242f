//! Pipeline building and execution.
//!
//! This module provides:
//! - The typed [`PipelineBuilder`] with stage name validation
//! - Immutable, reusable [`Pipeline`] definitions
//! - The sequential orchestrator loop
//! - [`Invocation`] handles with cancellation, deadlines and a query surface

mod builder;
mod config;
mod definition;
mod invocation;
mod orchestrator;


pub use builder::PipelineBuilder;
pub use config::PipelineConfig;
pub use definition::{run_pipeline, Pipeline};
pub use invocation::Invocation;
