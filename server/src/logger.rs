//! Caller-supplied log sink
//!
//! The session server never picks its own output destination. Whoever starts
//! it hands over a [`Logger`]; the dedicated binary passes [`LogFacade`] so
//! everything ends up in `env_logger`, an embedding game passes its own sink.

/// Four-level sink the session server reports through
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
    fn fatal(&self, message: &str);
}

/// Forwards to the `log` crate macros under the `session` target
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFacade;

impl Logger for LogFacade {
    fn info(&self, message: &str) {
        log::info!(target: "session", "{}", message);
    }

    fn warning(&self, message: &str) {
        log::warn!(target: "session", "{}", message);
    }

    fn error(&self, message: &str) {
        log::error!(target: "session", "{}", message);
    }

    fn fatal(&self, message: &str) {
        log::error!(target: "session", "FATAL: {}", message);
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentLogger;

impl Logger for SilentLogger {
    fn info(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn fatal(&self, _message: &str) {}
}
