//! Diagnostic log sink.
//!
//! The client reports connection phases, per-chunk progress and error
//! descriptions as human-readable lines to a sink injected at construction.
//! Sinks are for display only; nothing they do feeds back into the client.

use std::sync::Arc;

/// Receiver of human-readable diagnostic lines.
pub trait LogSink: Send + Sync {
    /// Accept one diagnostic line.
    fn log(&self, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn log(&self, message: &str) {
        self(message)
    }
}

/// Sink that forwards every line to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, message: &str) {
        tracing::info!(target: "voltage_s7", "{}", message);
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _message: &str) {}
}

/// Shared sink handle.
pub type SharedSink = Arc<dyn LogSink>;
