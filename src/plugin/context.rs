//! Per-plugin context and the step reference table.

use std::collections::HashMap;
use std::sync::Arc;

use super::trace::{PluginTrace, PrefixedTrace};

/// A job-defined unit of work, referenced by id from each log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub id: String,
    pub name: String,
}

impl Step {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Immutable mapping from step id to [`Step`], supplied whole at Host
/// construction.
pub type StepTable = Arc<HashMap<String, Step>>;

/// Per-plugin immutable handle carrying the opaque service context, the
/// step table, read-only endpoint/repository/variable maps, and a trace
/// prefixed with the plugin's friendly name.
///
/// `S` is the opaque `ServiceContext` the enclosing job runner hands the
/// host at construction (credentials, HTTP client, proxy/cert
/// configuration); this crate never inspects it.
pub struct PluginContext<S> {
    pub service: Arc<S>,
    pub steps: StepTable,
    pub endpoints: Arc<HashMap<String, String>>,
    pub repositories: Arc<HashMap<String, String>>,
    pub variables: Arc<HashMap<String, String>>,
    trace: PrefixedTrace,
}

impl<S> Clone for PluginContext<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            steps: Arc::clone(&self.steps),
            endpoints: Arc::clone(&self.endpoints),
            repositories: Arc::clone(&self.repositories),
            variables: Arc::clone(&self.variables),
            trace: self.trace.clone(),
        }
    }
}

impl<S> PluginContext<S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        service: Arc<S>,
        steps: StepTable,
        endpoints: Arc<HashMap<String, String>>,
        repositories: Arc<HashMap<String, String>>,
        variables: Arc<HashMap<String, String>>,
        host_trace: &PluginTrace,
        friendly_name: &str,
    ) -> Self {
        Self {
            service,
            steps,
            endpoints,
            repositories,
            variables,
            trace: host_trace.prefixed(friendly_name),
        }
    }

    /// Look up a step by id. Lookup failure is not treated as an error
    /// here; the Worker decides what to do with `None`.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.get(id)
    }

    pub fn trace(&self, message: &str) {
        self.trace.trace(message);
    }

    pub fn output(&self, message: &str) {
        self.trace.output(message);
    }
}
