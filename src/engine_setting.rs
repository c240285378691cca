//! Settings cache entries and helper-variant bookkeeping owned by C2/C4.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSetting {
    pub name: String,
    pub value: String,
}

/// Which scanner helper is currently active. Once PORTABLE is selected it
/// is sticky for the lifetime of the owning `RemoteScanner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperVariant {
    Native,
    Portable,
}

/// Recognised transfer-engine setting keys, named exactly as the engine's
/// own `set` command expects them.
pub mod setting_keys {
    pub const PARALLEL_TRANSFER_COUNT: &str = "mirror:parallel-transfer-count";
    pub const PGET_N: &str = "pget:default-n";
    pub const MIRROR_USE_PGET_N: &str = "mirror:use-pget-n";
    pub const CONNECTION_LIMIT: &str = "net:connection-limit";
    pub const LIMIT_RATE: &str = "net:limit-rate";
    pub const MIN_CHUNK_SIZE: &str = "pget:min-chunk-size";
    pub const QUEUE_PARALLEL: &str = "cmd:queue-parallel";
    pub const MOVE_BACKGROUND_ON_EXIT: &str = "cmd:move-background";
    pub const COMMAND_AT_EXIT: &str = "cmd:at-exit";
    pub const USE_TEMP_FILE: &str = "xfer:use-temp-file";
    pub const TEMP_FILE_NAME: &str = "xfer:temp-file-name";
    pub const SFTP_AUTO_CONFIRM: &str = "sftp:auto-confirm";
    pub const SFTP_CONNECT_PROGRAM: &str = "sftp:connect-program";
    pub const NET_SOCKET_BUFFER: &str = "net:socket-buffer";
    pub const MIRROR_PARALLEL_DIRECTORIES: &str = "mirror:parallel-directories";
    pub const NET_TIMEOUT: &str = "net:timeout";
    pub const NET_MAX_RETRIES: &str = "net:max-retries";
    pub const NET_RECONNECT_INTERVAL_BASE: &str = "net:reconnect-interval-base";
    pub const NET_RECONNECT_INTERVAL_MULTIPLIER: &str = "net:reconnect-interval-multiplier";
}
