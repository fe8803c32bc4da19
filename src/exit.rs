//! Fatal exit codes.
//!
//! DESIGN
//! ======
//! Conditions the process cannot recover from (no process control for this
//! OS, TLS setup failure, port bind failure, missing helper executable,
//! repeated handshake failures) each map to one stable exit code. Components
//! never call `std::process::exit` themselves: they raise the code on a
//! `FatalSignal`, and `main` logs it and exits.

use tokio::sync::mpsc;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    NoProcessHandler,
    HelperExecutableNotFound,
    CertificateSetupFailed,
    ServerBindFailed,
    ModuleLoadFailed,
    RepeatedConnectionFailures,
}

impl ExitCode {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::NoProcessHandler => 400,
            Self::HelperExecutableNotFound => 404,
            Self::CertificateSetupFailed => 495,
            Self::ServerBindFailed => 500,
            Self::ModuleLoadFailed => 507,
            Self::RepeatedConnectionFailures => 522,
        }
    }

    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::NoProcessHandler => "no process handler available for this OS",
            Self::HelperExecutableNotFound => "client helper executable not found",
            Self::CertificateSetupFailed => "certificate setup failed",
            Self::ServerBindFailed => "server bind failed",
            Self::ModuleLoadFailed => "failed to load data modules",
            Self::RepeatedConnectionFailures => "multiple connection attempts failed",
        }
    }

    /// Log the condition and terminate the process.
    pub fn exit(self) -> ! {
        error!(code = self.code(), reason = self.message(), "exiting");
        std::process::exit(self.code())
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

// =============================================================================
// FATAL SIGNAL
// =============================================================================

/// Handle for raising a fatal condition from inside a running component.
#[derive(Clone)]
pub struct FatalSignal {
    tx: mpsc::UnboundedSender<ExitCode>,
}

impl FatalSignal {
    /// Create a signal and the receiver `main` waits on.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExitCode>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn raise(&self, code: ExitCode) {
        error!(code = code.code(), reason = code.message(), "fatal condition raised");
        let _ = self.tx.send(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            ExitCode::NoProcessHandler,
            ExitCode::HelperExecutableNotFound,
            ExitCode::CertificateSetupFailed,
            ExitCode::ServerBindFailed,
            ExitCode::ModuleLoadFailed,
            ExitCode::RepeatedConnectionFailures,
        ];
        let mut seen: Vec<i32> = codes.iter().map(|c| c.code()).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), codes.len());
    }

    #[tokio::test]
    async fn fatal_signal_delivers_code() {
        let (signal, mut rx) = FatalSignal::channel();
        signal.raise(ExitCode::RepeatedConnectionFailures);
        assert_eq!(rx.recv().await, Some(ExitCode::RepeatedConnectionFailures));
    }

    #[test]
    fn display_includes_code() {
        assert_eq!(ExitCode::ServerBindFailed.to_string(), "server bind failed (500)");
    }
}
