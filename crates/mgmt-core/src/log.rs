//! Log sink for non-fatal anomalies

use std::error::Error;

/// Where the bridge reports anomalies it deliberately does not propagate
pub trait LogHandler: Send + Sync {
    fn info(&self, message: &str);

    fn error(&self, message: &str, cause: Option<&(dyn Error + 'static)>);
}

/// Forwards to `tracing` under the `bridge` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogHandler;

impl LogHandler for TracingLogHandler {
    fn info(&self, message: &str) {
        tracing::info!(target: "bridge", "{}", message);
    }

    fn error(&self, message: &str, cause: Option<&(dyn Error + 'static)>) {
        match cause {
            Some(cause) => tracing::error!(target: "bridge", error = %cause, "{}", message),
            None => tracing::error!(target: "bridge", "{}", message),
        }
    }
}
