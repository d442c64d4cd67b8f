//! In-process log line dispatcher that fans a job's log stream out to a
//! static set of plugins, with memory-pressure short-circuiting. See
//! [`Host`] for the entry point.

pub mod config;
pub mod plugin;

pub use config::HostConfig;
pub use plugin::{Host, HostError, HostTuning, Plugin, PluginContext, PluginError, PluginTrace, Step};
