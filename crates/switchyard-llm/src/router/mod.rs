//! Router - fallback routing across providers
//!
//! # Module Structure
//!
//! - `types`: Health snapshots and call options
//! - `orchestrator`: The [`Orchestrator`] entry points
//! - `mock`: Scripted executor for testing

mod mock;
mod orchestrator;
mod types;


pub use mock::ScriptedExecutor;
pub use orchestrator::Orchestrator;
pub use types::{CallOptions, ProviderHealth};
