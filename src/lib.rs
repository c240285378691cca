pub mod config;
pub mod engine;
pub mod engine_setting;
pub mod error;
pub mod filenode;
pub mod installer;
pub mod job_status;
pub mod scanner;
pub mod transport;

pub use error::{EngineError, FatalScanCause, InstallError, ParseError, ScanError, TransportError};
