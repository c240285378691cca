//! Structured error taxonomy for the remote scanner and transfer engine driver.
//!
//! Every component surfaces only these kinds; raw I/O messages are captured
//! and attached for diagnosis but never leaked untyped past a component
//! boundary.

/// Low-level SSH/SFTP failure classified from captured output.
#[derive(Debug, Clone)]
pub enum TransportError {
    BadHostname(String),
    ConnectionRefused(String),
    IncorrectPassword,
    /// No local private key under `~/.ssh` could authenticate; distinct
    /// from `IncorrectPassword` because no credential was ever rejected.
    NoUsableKey,
    /// Wall-clock timeout in seconds, and the command that was running.
    Timeout(f64),
    LoginShellMissing { candidates: Vec<String> },
    Other(String),
}

impl TransportError {
    pub fn message(&self) -> String {
        match self {
            TransportError::BadHostname(h) => format!("Bad hostname: {h}"),
            TransportError::ConnectionRefused(m) => {
                if m.is_empty() {
                    "Connection refused by server".to_string()
                } else {
                    format!("Connection refused by server - {m}")
                }
            }
            TransportError::IncorrectPassword => "Incorrect password".to_string(),
            TransportError::NoUsableKey => {
                "No usable private key found under ~/.ssh; add one or configure pub_key_path".to_string()
            }
            TransportError::Timeout(secs) => format!("Timed out after {secs:.0}s"),
            TransportError::LoginShellMissing { candidates } => {
                if candidates.is_empty() {
                    "Remote user's login shell not found and no common shells could be detected"
                        .to_string()
                } else {
                    format!(
                        "Remote user's login shell not found. Available shells on the remote server: {}",
                        candidates.join(", ")
                    )
                }
            }
            TransportError::Other(m) => m.clone(),
        }
    }

    /// True for the transient, retry-worthy subset of transport failures,
    /// matched by the same substrings the scan retry classifier looks for.
    pub fn is_transient(&self) -> bool {
        let m = self.message();
        m.contains("Timed out") || m.contains("Connection refused") || m.contains("lost connection")
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for TransportError {}

/// Helper upload or digest-check failure. Always fatal.
#[derive(Debug, Clone)]
pub enum InstallError {
    ShellDetectionFailed(TransportError),
    DiagnosticsFailed(TransportError),
    DigestCheckFailed(TransportError),
    UploadFailed(TransportError),
    MissingLocalHelper(std::path::PathBuf),
    PortableRuntimeUnavailable(TransportError),
}

impl std::fmt::Display for InstallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallError::ShellDetectionFailed(e) => write!(f, "shell detection failed: {e}"),
            InstallError::DiagnosticsFailed(e) => write!(f, "remote diagnostics probe failed: {e}"),
            InstallError::DigestCheckFailed(e) => write!(f, "remote digest check failed: {e}"),
            InstallError::UploadFailed(e) => write!(f, "helper upload failed: {e}"),
            InstallError::MissingLocalHelper(p) => {
                write!(f, "local helper not found at {}", p.display())
            }
            InstallError::PortableRuntimeUnavailable(e) => {
                write!(f, "portable runtime unavailable on remote: {e}")
            }
        }
    }
}

impl std::error::Error for InstallError {}

/// Why a scan failed fatally (no automatic retry possible).
#[derive(Debug, Clone)]
pub enum FatalScanCause {
    FirstScanFailed(TransportError),
    ScannerRejected(String),
    Deserialize(String),
    Install(InstallError),
    NoPortableFallback(TransportError),
}

impl std::fmt::Display for FatalScanCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FatalScanCause::FirstScanFailed(e) => write!(f, "first scan failed: {e}"),
            FatalScanCause::ScannerRejected(m) => write!(f, "helper rejected scan: {m}"),
            FatalScanCause::Deserialize(m) => write!(f, "could not decode helper output: {m}"),
            FatalScanCause::Install(e) => write!(f, "{e}"),
            FatalScanCause::NoPortableFallback(e) => {
                write!(f, "binary execution failed and no portable fallback available: {e}")
            }
        }
    }
}

/// Outcome of a scan attempt: recoverable (caller may retry later) or fatal.
#[derive(Debug, Clone)]
pub enum ScanError {
    Recoverable(TransportError),
    Fatal(FatalScanCause),
}

impl ScanError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ScanError::Recoverable(_))
    }
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::Recoverable(e) => write!(f, "scan failed, may retry later: {e}"),
            ScanError::Fatal(c) => write!(f, "scan failed fatally: {c}"),
        }
    }
}

impl std::error::Error for ScanError {}

/// Transfer-engine driver failure. Self-healing by restart where possible;
/// surfaces to the caller no later than the command following the one that
/// produced it (see the pending-error buffer in `engine`).
#[derive(Debug, Clone)]
pub enum EngineError {
    AccessFailed(String),
    LoginIncorrect(String),
    TimeoutStorm,
    ProcessDead(String),
    StatusUnparseable(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::AccessFailed(m) => write!(f, "transfer engine reported: {m}"),
            EngineError::LoginIncorrect(m) => write!(f, "transfer engine login failed: {m}"),
            EngineError::TimeoutStorm => {
                write!(f, "transfer engine restarted after 3 consecutive prompt timeouts")
            }
            EngineError::ProcessDead(m) => write!(f, "transfer engine process is not running: {m}"),
            EngineError::StatusUnparseable(m) => {
                write!(f, "could not parse transfer engine status after 2 tolerated errors: {m}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Raised by the job status parser on its 3rd consecutive unparseable input.
#[derive(Debug, Clone)]
pub enum ParseError {
    Unparseable(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Unparseable(m) => write!(f, "could not parse job status output: {m}"),
        }
    }
}

impl std::error::Error for ParseError {}
