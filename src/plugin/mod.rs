//! Log plugin host: fans out a job's log lines concurrently to a static
//! set of plugins, with per-plugin bounded processing and memory-pressure
//! short-circuiting.
//!
//! See [`host::Host`] for the entry point and [`lifecycle::Plugin`] for
//! the trait implementers must provide.

pub mod context;
pub mod host;
pub mod isolation;
pub mod latch;
pub mod lifecycle;
pub mod pressure;
pub mod queue;
pub mod trace;
pub mod worker;

pub use context::{PluginContext, Step, StepTable};
pub use host::{Host, HostError, HostTuning};
pub use isolation::PluginError;
pub use lifecycle::{Plugin, PluginRuntimeState};
pub use trace::PluginTrace;

/// Convenience re-exports for implementing a plugin.
pub mod prelude {
    pub use super::context::{PluginContext, Step};
    pub use super::lifecycle::Plugin;
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}
