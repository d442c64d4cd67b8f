//! Plugin Isolation and Panic Safety
//!
//! Panics raised inside plugin-supplied async methods are caught with
//! `catch_unwind` and converted into `PluginError::Panic`, preventing one
//! faulty plugin from taking down its Worker task.
//!
//! # Safety Considerations
//!
//! - `catch_unwind` only catches panics, not aborts. The workspace's
//!   release profile must not set `panic = "abort"`.
//! - Only the direct poll path is protected; panics inside tasks spawned
//!   by a plugin are not caught here.

use std::any::Any;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Plugin-specific error type.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Plugin panicked during execution.
    #[error("plugin panicked: {0}")]
    Panic(String),

    /// `initialize` returned false or failed.
    #[error("plugin initialization failed: {0}")]
    InitializationFailed(String),

    /// Step id on a log line was not present in the step table.
    #[error("unknown step id: {0}")]
    UnknownStep(String),

    /// Any other plugin-reported failure, carried verbatim.
    #[error("{0}")]
    Internal(String),
}

impl From<anyhow::Error> for PluginError {
    fn from(err: anyhow::Error) -> Self {
        PluginError::Internal(err.to_string())
    }
}

/// Await a plugin-supplied future, catching panics raised during polling.
///
/// Returns `Err(PluginError::Panic(..))` if the future panics instead of
/// propagating the unwind to the caller.
pub async fn call_plugin_safely_async<Fut, T>(fut: Fut) -> Result<T, PluginError>
where
    Fut: Future<Output = Result<T, anyhow::Error>>,
{
    match CatchUnwind(AssertUnwindSafe(fut)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(PluginError::Internal(e.to_string())),
        Err(panic_info) => {
            let msg = extract_panic_message(&panic_info);
            tracing::error!(message = %msg, "plugin panicked during async execution");
            Err(PluginError::Panic(msg))
        }
    }
}

/// Future adapter that catches panics raised while polling the inner future.
struct CatchUnwind<F>(AssertUnwindSafe<F>);

impl<F: Future> Future for CatchUnwind<F> {
    type Output = Result<F::Output, Box<dyn Any + Send>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: projecting to the single wrapped field, never moved out.
        let inner = unsafe { self.map_unchecked_mut(|s| &mut s.0.0) };
        match catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
            Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(panic_info) => Poll::Ready(Err(panic_info)),
        }
    }
}

/// Extract a human-readable message from panic info.
fn extract_panic_message(panic_info: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic (non-string payload)".to_string()
    }
}
