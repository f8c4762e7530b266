//! flowkit - durable flow state, a checkpointing flow runtime and evaluators
//!
//! - [adk] - errors and model adapters shared by everything else
//! - [flowkit] - state store, flow runtime, evaluators, introspection server

pub mod adk;
pub mod flowkit;
