//! User-facing error reporting.

/// Where user-visible failures go. Only parse failures reach it.
pub trait Diagnostics: Send + Sync {
    /// Pop-up style error message.
    fn show_error(&self, message: &str);

    /// Line on the active debug console, if there is one.
    fn console_line(&self, message: &str);
}

/// Routes everything through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn show_error(&self, message: &str) {
        log::error!("{message}");
    }

    fn console_line(&self, message: &str) {
        log::info!(target: "svdview::console", "{message}");
    }
}
