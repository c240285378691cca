//! C3: drives the remote helper to build a `FileNode` tree, classifying
//! failures as fatal or recoverable and retrying the recoverable ones with
//! exponential backoff.

use std::time::Duration;

use crate::error::{FatalScanCause, InstallError, ScanError, TransportError};
use crate::filenode::FileNode;
use crate::installer::{HelperInstaller, HelperPaths};
use crate::transport::{ShellExec, ShellTransport};

const BACKOFF_BASE: Duration = Duration::from_secs(2);
const BACKOFF_CAP: Duration = Duration::from_secs(30);
const MAX_TRANSIENT_RETRIES: u32 = 3;

const TRANSIENT_MARKERS: [&str; 3] = ["Timed out", "Connection refused", "lost connection"];

fn is_transient(message: &str) -> bool {
    TRANSIENT_MARKERS.iter().any(|m| message.contains(m))
}

fn backoff_for_attempt(attempt: u32) -> Duration {
    let scaled = BACKOFF_BASE.saturating_mul(1 << attempt.min(4));
    scaled.min(BACKOFF_CAP)
}

pub struct RemoteScanner<'a, E: ShellExec> {
    transport: &'a mut ShellTransport<E>,
    scanner_remote_path: String,
    scan_root: String,
    ever_succeeded: bool,
    sleep: Box<dyn Fn(Duration) + 'a>,
}

impl<'a, E: ShellExec> RemoteScanner<'a, E> {
    pub fn new(
        transport: &'a mut ShellTransport<E>,
        scanner_remote_path: impl Into<String>,
        scan_root: impl Into<String>,
    ) -> Self {
        RemoteScanner {
            transport,
            scanner_remote_path: scanner_remote_path.into(),
            scan_root: scan_root.into(),
            ever_succeeded: false,
            sleep: Box::new(std::thread::sleep),
        }
    }

    #[cfg(test)]
    fn with_sleep(mut self, sleep: impl Fn(Duration) + 'a) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    /// Runs the helper once over the configured scan root and deserialises
    /// its output. Quoting policy follows the remote path: tilde-rooted
    /// paths are double-quoted with `$HOME` expansion, everything else is
    /// single-quoted literally. Returns the scan root's children directly,
    /// so an empty remote directory decodes to an empty list rather than a
    /// single wrapped root node.
    fn run_once(&mut self) -> Result<Vec<FileNode>, ScanError> {
        let quoted_root = if self.scan_root.starts_with('~') {
            crate::transport::escape_remote_path_double(&self.scan_root)
        } else {
            crate::transport::escape_remote_path_single(&self.scan_root)
        };
        let command = format!("{} {}", self.scanner_remote_path, quoted_root);

        let output = self.transport.shell(&command).map_err(|e| self.classify_transport_error(e))?;

        if let Some(rest) = output.trim().strip_prefix("SystemScannerError:") {
            return Err(ScanError::Fatal(FatalScanCause::ScannerRejected(rest.trim().to_string())));
        }

        let bytes = match decode_base64(output.trim()) {
            Some(b) => b,
            None => return Err(ScanError::Fatal(FatalScanCause::Deserialize("output was not valid base64".into()))),
        };
        let (root, _) = FileNode::decode(&bytes)
            .map_err(|e| ScanError::Fatal(FatalScanCause::Deserialize(e)))?;
        Ok(root.children)
    }

    fn classify_transport_error(&self, err: TransportError) -> ScanError {
        if !self.ever_succeeded {
            ScanError::Fatal(FatalScanCause::FirstScanFailed(err))
        } else {
            ScanError::Recoverable(err)
        }
    }

    /// Scans the remote root, retrying recoverable failures with
    /// exponential backoff (2s, 4s, 8s, capped at 30s) up to 3 attempts.
    /// The very first scan of this scanner's lifetime never retries: any
    /// failure there is fatal, since there's no evidence the helper can
    /// ever succeed against this remote. An empty remote directory yields
    /// an empty list, not an error.
    pub fn scan(&mut self) -> Result<Vec<FileNode>, ScanError> {
        let mut attempt = 0u32;
        loop {
            match self.run_once() {
                Ok(entries) => {
                    self.ever_succeeded = true;
                    return Ok(entries);
                }
                Err(ScanError::Recoverable(e)) if is_transient(&e.message()) && attempt < MAX_TRANSIENT_RETRIES => {
                    (self.sleep)(backoff_for_attempt(attempt));
                    attempt += 1;
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Invoked when a scan attempt reports a binary-execution failure.
    /// Switches the installer to the PORTABLE helper variant, reinstalls,
    /// and retries the scan once. The PORTABLE variant remains sticky on
    /// the installer for the rest of this process's lifetime.
    pub fn recover_with_portable_helper(
        &mut self,
        installer: &mut HelperInstaller<'_, E>,
        paths: &HelperPaths,
        local_digest_fn: impl Fn(&[u8]) -> String,
    ) -> Result<Vec<FileNode>, ScanError> {
        installer
            .fall_back_to_portable(paths, local_digest_fn)
            .map_err(|e: InstallError| ScanError::Fatal(FatalScanCause::Install(e)))?;
        self.scan()
    }
}

fn decode_base64(s: &str) -> Option<Vec<u8>> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut lookup = [255u8; 256];
    for (i, &b) in ALPHABET.iter().enumerate() {
        lookup[b as usize] = i as u8;
    }
    let clean: Vec<u8> = s.bytes().filter(|b| *b != b'\n' && *b != b'\r').collect();
    if clean.is_empty() || clean.iter().any(|b| *b != b'=' && lookup[*b as usize] == 255) {
        return None;
    }
    let mut out = Vec::new();
    for chunk in clean.chunks(4) {
        if chunk.len() < 2 {
            return None;
        }
        let b0 = lookup[chunk[0] as usize];
        let b1 = lookup[chunk[1] as usize];
        out.push((b0 << 2) | (b1 >> 4));
        if chunk.len() > 2 && chunk[2] != b'=' {
            let b2 = lookup[chunk[2] as usize];
            out.push((b1 << 4) | (b2 >> 2));
            if chunk.len() > 3 && chunk[3] != b'=' {
                let b3 = lookup[chunk[3] as usize];
                out.push((b2 << 6) | b3);
            }
        }
    }
    Some(out)
}
