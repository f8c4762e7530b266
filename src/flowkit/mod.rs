// SPDX-License-Identifier: MIT

//! Flow runtime components
//!
//! - [state] - `FlowStateStore` and its memory and file backends
//! - [flow] - checkpointing runner and the sample `JokeFlow`
//! - [eval] - deterministic and judge-based evaluators
//! - [server] - read-only HTTP view of stored flows
//! - [config] - `FLOWKIT_*` environment settings

pub mod config;
pub mod eval;
pub mod flow;
pub mod server;
pub mod state;
